//! The unit of work applied to each row.

use async_trait::async_trait;

use crate::error::WorkError;
use crate::models::{WorkItem, WorkOutput};

/// Caller-supplied per-row operation, usually an external API call.
///
/// Implementations classify failures through [`WorkError`]; the processor
/// retries `RateLimited` and `Transient`, and records everything else.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn process(&self, item: &WorkItem) -> Result<WorkOutput, WorkError>;
}

#[async_trait]
impl<T: UnitOfWork + ?Sized> UnitOfWork for &T {
    async fn process(&self, item: &WorkItem) -> Result<WorkOutput, WorkError> {
        (**self).process(item).await
    }
}

#[async_trait]
impl<T: UnitOfWork + ?Sized> UnitOfWork for Box<T> {
    async fn process(&self, item: &WorkItem) -> Result<WorkOutput, WorkError> {
        (**self).process(item).await
    }
}
