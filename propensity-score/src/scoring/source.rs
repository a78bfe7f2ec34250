//! Record source consumed by the job runner.

use async_trait::async_trait;

use crate::Result;
use crate::domain::{DateRange, LeaveRecord};

/// Source of the records selected by a date range.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch every record in `range`, in a stable order.
    ///
    /// An empty range yields an empty vector. Returned records must be fully
    /// loaded; the runner never goes back to the source for more fields.
    async fn fetch(&self, range: DateRange) -> Result<Vec<LeaveRecord>>;
}
