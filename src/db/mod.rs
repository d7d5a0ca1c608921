mod repository;
mod schema;

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::models::{SummaryRecord, UserId};

pub use repository::Repository;

/// Hands out summary ids. Implementations must never return the same value
/// twice, even to callers in different processes.
#[async_trait]
pub trait IdAllocator: Send + Sync {
    async fn allocate_next_id(&self) -> Result<i64, PipelineError>;
}

#[async_trait]
pub trait SummaryStore: Send + Sync {
    async fn save(&self, record: &SummaryRecord) -> Result<(), PipelineError>;

    /// All records owned by `user_id`, newest first.
    async fn fetch_by_user(&self, user_id: &UserId) -> Result<Vec<SummaryRecord>, PipelineError>;
}
