//! End-to-end behaviour of the scoring engine against in-memory collaborators.

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use propensity_score::Result;
use propensity_score::config::{AppConfig, BatchConfig, WorkerPoolConfig};
use propensity_score::domain::{DateRange, LeaveRecord, RuleId, Score};
use propensity_score::rules::{EvaluationFailure, RuleModel, RuleSet};
use propensity_score::scoring::{
    JobLookup, JobState, JobStatus, RecordSource, ScoreSink, ScoringService,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Source returning a fixed set of records, optionally held back by a gate.
struct TestSource {
    records: Vec<LeaveRecord>,
    gate: Option<Arc<Semaphore>>,
    fetches: AtomicUsize,
}

impl TestSource {
    fn new(records: Vec<LeaveRecord>) -> Self {
        Self {
            records,
            gate: None,
            fetches: AtomicUsize::new(0),
        }
    }

    fn gated(records: Vec<LeaveRecord>, gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(records)
        }
    }
}

#[async_trait]
impl RecordSource for TestSource {
    async fn fetch(&self, _range: DateRange) -> Result<Vec<LeaveRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        Ok(self.records.clone())
    }
}

/// Sink recording every block it receives.
#[derive(Default)]
struct TestSink {
    blocks: Mutex<Vec<Vec<Score>>>,
    reject_record: Option<String>,
    delay: Option<Duration>,
}

impl TestSink {
    fn block_sizes(&self) -> Vec<usize> {
        self.blocks.lock().iter().map(Vec::len).collect()
    }

    fn scores(&self) -> Vec<Score> {
        self.blocks.lock().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl ScoreSink for TestSink {
    async fn upsert(&self, score: &Score) -> Result<()> {
        if self.reject_record.as_deref() == Some(score.record_id.as_str()) {
            return Err(propensity_score::Error::Persistence(format!(
                "rejected {}",
                score.record_id
            )));
        }
        Ok(())
    }

    async fn upsert_block(&self, block: &[Score]) -> Vec<Result<()>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.blocks.lock().push(block.to_vec());
        let mut results = Vec::with_capacity(block.len());
        for score in block {
            results.push(self.upsert(score).await);
        }
        results
    }
}

/// Rule scoring every record with its rest days and counting calls.
struct CountingRule {
    id: RuleId,
    calls: Arc<AtomicUsize>,
    exclude: Option<String>,
}

impl CountingRule {
    fn new(id: &str, calls: Arc<AtomicUsize>) -> Self {
        Self {
            id: RuleId::new(id),
            calls,
            exclude: None,
        }
    }
}

impl RuleModel for CountingRule {
    fn id(&self) -> &RuleId {
        &self.id
    }

    fn evaluate(&self, record: &LeaveRecord) -> std::result::Result<f64, EvaluationFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.exclude.as_deref() == Some(record.id.as_str()) {
            return Err(EvaluationFailure::Excluded("flagged".to_string()));
        }
        Ok(record.rest_days.unwrap_or_default() as f64)
    }
}

/// Rule whose code panics on records with odd rest days.
struct PanickingRule(RuleId);

impl RuleModel for PanickingRule {
    fn id(&self) -> &RuleId {
        &self.0
    }

    fn evaluate(&self, record: &LeaveRecord) -> std::result::Result<f64, EvaluationFailure> {
        let days = record.rest_days.unwrap_or_default();
        if days % 2 == 1 {
            let table: Vec<f64> = Vec::new();
            return Ok(table[days as usize]);
        }
        Ok(0.0)
    }
}

fn records(count: usize) -> Vec<LeaveRecord> {
    let issued = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    (0..count)
        .map(|i| {
            LeaveRecord::new(format!("L-{i:04}"), format!("F-{}", i % 7))
                .with_rest_days(i as i64)
                .with_issued_at(issued)
        })
        .collect()
}

fn config(block_size: usize, max_concurrent_jobs: usize) -> AppConfig {
    AppConfig {
        batch: BatchConfig { block_size },
        worker_pool: WorkerPoolConfig {
            max_concurrent_jobs,
        },
        ..AppConfig::default()
    }
}

fn service(
    source: Arc<TestSource>,
    sink: Arc<TestSink>,
    models: Vec<Arc<dyn RuleModel>>,
    config: &AppConfig,
) -> ScoringService {
    let rules = RuleSet::new(models).unwrap();
    ScoringService::with_collaborators(source, sink, rules, config)
}

async fn wait_for(
    service: &ScoringService,
    start: &str,
    end: &str,
    done: impl Fn(&JobState) -> bool,
) -> JobState {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let JobLookup::Found(state) = service.query(start, end).unwrap() {
                if done(&state) {
                    return state;
                }
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("job did not reach the expected state in time")
}

async fn wait_terminal(service: &ScoringService, start: &str, end: &str) -> JobState {
    wait_for(service, start, end, JobState::is_terminal).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_run_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let source = Arc::new(TestSource::gated(records(20), gate.clone()));
    let sink = Arc::new(TestSink::default());
    let service = Arc::new(service(
        source.clone(),
        sink.clone(),
        vec![
            Arc::new(CountingRule::new("a", calls.clone())),
            Arc::new(CountingRule::new("b", calls.clone())),
        ],
        &config(100, 4),
    ));

    let mut handles = Vec::new();
    for _ in 0..32 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.submit("2024-03-01", "2024-03-31").unwrap()
        }));
    }
    for handle in handles {
        let state = handle.await.unwrap();
        assert!(matches!(
            state.status,
            JobStatus::Starting | JobStatus::Extracting
        ));
    }

    gate.add_permits(1);
    let state = wait_terminal(&service, "2024-03-01", "2024-03-31").await;
    service.shutdown().await;

    assert_eq!(state.status, JobStatus::Completed);
    assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 40);
    assert_eq!(sink.scores().len(), 40);
    assert_eq!(service.registry().len(), 1);
}

#[tokio::test]
async fn test_completed_job_is_not_rerun() {
    let calls = Arc::new(AtomicUsize::new(0));
    let source = Arc::new(TestSource::new(records(5)));
    let service = service(
        source.clone(),
        Arc::new(TestSink::default()),
        vec![Arc::new(CountingRule::new("a", calls.clone()))],
        &config(100, 1),
    );

    service.submit("2024-03-01", "2024-03-31").unwrap();
    let done = wait_terminal(&service, "2024-03-01", "2024-03-31").await;

    let again = service.submit("2024-03-01", "2024-03-31").unwrap();
    service.shutdown().await;

    assert_eq!(again.status, JobStatus::Completed);
    assert_eq!(again.per_model_count, done.per_model_count);
    assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_progress_is_monotonic() {
    let calls = Arc::new(AtomicUsize::new(0));
    let sink = Arc::new(TestSink {
        delay: Some(Duration::from_millis(1)),
        ..TestSink::default()
    });
    let service = service(
        Arc::new(TestSource::new(records(120))),
        sink,
        vec![
            Arc::new(CountingRule::new("a", calls.clone())),
            Arc::new(CountingRule::new("b", calls.clone())),
        ],
        &config(5, 1),
    );
    let a = RuleId::new("a");
    let b = RuleId::new("b");

    service.submit("2024-03-01", "2024-03-31").unwrap();

    let mut last_total = None;
    let mut last = (0, 0);
    let final_state = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let state = service
                .query("2024-03-01", "2024-03-31")
                .unwrap()
                .into_state()
                .unwrap();

            if let Some(previous) = last_total {
                assert_eq!(state.total, Some(previous));
            }
            last_total = state.total;

            let current = (state.count_for(&a), state.count_for(&b));
            assert!(current.0 >= last.0 && current.1 >= last.1);
            if let Some(total) = state.total {
                assert!(current.0 <= total && current.1 <= total);
            }
            last = current;

            if state.is_terminal() {
                return state;
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    service.shutdown().await;

    assert_eq!(final_state.status, JobStatus::Completed);
    assert_eq!(final_state.total, Some(120));
    assert_eq!(final_state.count_for(&a), 120);
    assert_eq!(final_state.count_for(&b), 120);
}

#[tokio::test]
async fn test_empty_range_completes_without_writes() {
    let calls = Arc::new(AtomicUsize::new(0));
    let sink = Arc::new(TestSink::default());
    let service = service(
        Arc::new(TestSource::new(Vec::new())),
        sink.clone(),
        vec![Arc::new(CountingRule::new("a", calls.clone()))],
        &config(100, 1),
    );

    service.submit("2024-03-01", "2024-03-31").unwrap();
    let state = wait_terminal(&service, "2024-03-01", "2024-03-31").await;
    service.shutdown().await;

    assert_eq!(state.status, JobStatus::Completed);
    assert_eq!(state.total, Some(0));
    assert!(state.per_model_count.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(sink.block_sizes().is_empty());
}

#[tokio::test]
async fn test_scores_flushed_in_blocks() {
    let calls = Arc::new(AtomicUsize::new(0));
    let sink = Arc::new(TestSink::default());
    let service = service(
        Arc::new(TestSource::new(records(250))),
        sink.clone(),
        vec![Arc::new(CountingRule::new("a", calls))],
        &config(100, 1),
    );

    service.submit("2024-03-01", "2024-03-31").unwrap();
    let state = wait_terminal(&service, "2024-03-01", "2024-03-31").await;
    service.shutdown().await;

    assert_eq!(state.status, JobStatus::Completed);
    assert_eq!(sink.block_sizes(), vec![100, 100, 50]);

    let ids: Vec<String> = sink.scores().into_iter().map(|s| s.record_id).collect();
    let expected: Vec<String> = records(250).into_iter().map(|r| r.id).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_failed_pairs_are_isolated() {
    let calls = Arc::new(AtomicUsize::new(0));
    let sink = Arc::new(TestSink {
        reject_record: Some("L-0003".to_string()),
        ..TestSink::default()
    });
    let mut flaky = CountingRule::new("flaky", calls.clone());
    flaky.exclude = Some("L-0001".to_string());
    let service = service(
        Arc::new(TestSource::new(records(6))),
        sink.clone(),
        vec![
            Arc::new(CountingRule::new("steady", calls.clone())),
            Arc::new(flaky),
        ],
        &config(4, 1),
    );

    service.submit("2024-03-01", "2024-03-31").unwrap();
    let state = wait_terminal(&service, "2024-03-01", "2024-03-31").await;
    service.shutdown().await;

    let steady = RuleId::new("steady");
    let flaky = RuleId::new("flaky");
    assert_eq!(state.status, JobStatus::Completed);
    assert_eq!(state.count_for(&steady), 6);
    assert_eq!(state.count_for(&flaky), 5);
    assert_eq!(state.per_model_failures.get(&flaky), Some(&1));
    assert_eq!(state.persist_failures, 2);
    assert!(state.error_reason.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 12);

    let stored = sink.scores();
    assert_eq!(stored.len(), 11);
    assert!(
        !stored
            .iter()
            .any(|s| s.record_id == "L-0001" && s.rule_id == flaky)
    );
}

#[tokio::test]
async fn test_snapshots_are_isolated() {
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let service = service(
        Arc::new(TestSource::gated(records(3), gate.clone())),
        Arc::new(TestSink::default()),
        vec![Arc::new(CountingRule::new("a", calls))],
        &config(100, 1),
    );

    let mut submitted = service.submit("2024-03-01", "2024-03-31").unwrap();
    submitted.status = JobStatus::Completed;
    submitted.total = Some(99);

    let mut polled = service
        .query("2024-03-01", "2024-03-31")
        .unwrap()
        .into_state()
        .unwrap();
    assert!(!polled.is_terminal());
    assert_ne!(polled.total, Some(99));
    polled.per_model_count.insert(RuleId::new("a"), 1_000);

    gate.add_permits(1);
    let state = wait_terminal(&service, "2024-03-01", "2024-03-31").await;
    service.shutdown().await;

    assert_eq!(state.status, JobStatus::Completed);
    assert_eq!(state.total, Some(3));
    assert_eq!(state.count_for(&RuleId::new("a")), 3);
}

#[tokio::test]
async fn test_unknown_job_reports_not_found() {
    let service = service(
        Arc::new(TestSource::new(Vec::new())),
        Arc::new(TestSink::default()),
        vec![Arc::new(CountingRule::new("a", Arc::new(AtomicUsize::new(0))))],
        &config(100, 1),
    );

    let lookup = service.query("2030-01-01", "2030-01-31").unwrap();
    assert!(lookup.state().is_none());
    assert_eq!(
        serde_json::to_value(&lookup).unwrap(),
        serde_json::json!({ "status": "not_found" })
    );

    assert!(service.submit("2024-13-01", "2024-03-31").is_err());
    assert!(service.registry().is_empty());
}

#[tokio::test]
async fn test_jobs_wait_for_free_worker() {
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let service = service(
        Arc::new(TestSource::gated(records(4), gate.clone())),
        Arc::new(TestSink::default()),
        vec![Arc::new(CountingRule::new("a", calls.clone()))],
        &config(100, 1),
    );

    service.submit("2024-03-01", "2024-03-31").unwrap();
    service.submit("2024-04-01", "2024-04-30").unwrap();

    wait_for(&service, "2024-03-01", "2024-03-31", |s| {
        s.status == JobStatus::Extracting
    })
    .await;
    let queued = service
        .query("2024-04-01", "2024-04-30")
        .unwrap()
        .into_state()
        .unwrap();
    assert_eq!(queued.status, JobStatus::Starting);
    assert_eq!(service.launcher().available_slots(), 0);

    gate.add_permits(2);
    service.shutdown().await;

    for (start, end) in [("2024-03-01", "2024-03-31"), ("2024-04-01", "2024-04-30")] {
        let state = service.query(start, end).unwrap().into_state().unwrap();
        assert_eq!(state.status, JobStatus::Completed);
        assert_eq!(state.total, Some(4));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 8);
    assert_eq!(service.launcher().active_jobs(), 0);
}

#[tokio::test]
async fn test_panicking_rule_still_reaches_terminal_state() {
    let calls = Arc::new(AtomicUsize::new(0));
    let sink = Arc::new(TestSink::default());
    let service = service(
        Arc::new(TestSource::new(records(4))),
        sink.clone(),
        vec![
            Arc::new(CountingRule::new("a", calls.clone())),
            Arc::new(PanickingRule(RuleId::new("b"))),
        ],
        &config(100, 1),
    );

    service.submit("2024-03-01", "2024-03-31").unwrap();
    service.shutdown().await;

    let state = service
        .query("2024-03-01", "2024-03-31")
        .unwrap()
        .into_state()
        .unwrap();
    assert_eq!(state.status, JobStatus::Error);
    assert!(state.error_reason.as_ref().unwrap().contains("panicked"));
    assert_eq!(state.count_for(&RuleId::new("a")), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(service.launcher().active_jobs(), 0);

    // A later submission for the same range returns the failed job.
    let again = service.submit("2024-03-01", "2024-03-31").unwrap();
    assert_eq!(again.status, JobStatus::Error);
}

