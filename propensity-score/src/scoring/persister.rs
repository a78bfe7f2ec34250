//! Block-wise persistence of scores.
//!
//! The persister buffers scores produced by one job and hands them to the
//! sink in fixed-size blocks, followed by a final partial block when the job
//! finishes.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::Result;
use crate::domain::Score;

/// Destination of persisted scores.
#[async_trait]
pub trait ScoreSink: Send + Sync {
    /// Insert or overwrite the score stored for `(record_id, rule_id)`.
    async fn upsert(&self, score: &Score) -> Result<()>;

    /// Persist one block, returning the outcome of each item in order.
    ///
    /// One item failing does not stop the remaining items.
    async fn upsert_block(&self, block: &[Score]) -> Vec<Result<()>> {
        let mut results = Vec::with_capacity(block.len());
        for score in block {
            results.push(self.upsert(score).await);
        }
        results
    }
}

/// Result of flushing one block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    pub written: usize,
    pub failed: usize,
}

/// Totals across every block flushed by a persister.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistStats {
    pub blocks: usize,
    pub written: usize,
    pub failed: usize,
}

/// Buffers scores and flushes them when the block is full.
///
/// Owned by a single job runner; not shared between jobs.
pub struct BatchPersister {
    sink: Arc<dyn ScoreSink>,
    block_size: usize,
    buffer: Vec<Score>,
    stats: PersistStats,
}

impl BatchPersister {
    pub fn new(sink: Arc<dyn ScoreSink>, block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            sink,
            block_size,
            buffer: Vec::with_capacity(block_size),
            stats: PersistStats::default(),
        }
    }

    /// Add a score, flushing if the block is now full.
    pub async fn add(&mut self, score: Score) -> Option<FlushOutcome> {
        self.buffer.push(score);

        if self.buffer.len() >= self.block_size {
            Some(self.flush().await)
        } else {
            None
        }
    }

    /// Flush whatever is buffered. Called once when the job finishes.
    pub async fn flush_remainder(&mut self) -> Option<FlushOutcome> {
        if self.buffer.is_empty() {
            return None;
        }
        Some(self.flush().await)
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> PersistStats {
        self.stats
    }

    async fn flush(&mut self) -> FlushOutcome {
        let block = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.block_size));
        let results = self.sink.upsert_block(&block).await;

        let mut outcome = FlushOutcome::default();
        for (index, score) in block.iter().enumerate() {
            match results.get(index) {
                Some(Ok(())) => outcome.written += 1,
                Some(Err(e)) => {
                    warn!(
                        record_id = %score.record_id,
                        rule_id = %score.rule_id,
                        error = %e,
                        "Failed to persist score"
                    );
                    outcome.failed += 1;
                }
                None => {
                    warn!(
                        record_id = %score.record_id,
                        rule_id = %score.rule_id,
                        "Sink reported no outcome for score"
                    );
                    outcome.failed += 1;
                }
            }
        }

        self.stats.blocks += 1;
        self.stats.written += outcome.written;
        self.stats.failed += outcome.failed;

        debug!(
            size = block.len(),
            written = outcome.written,
            failed = outcome.failed,
            "Flushed score block"
        );

        outcome
    }
}
