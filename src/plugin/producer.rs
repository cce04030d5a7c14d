use crate::error::Result;
use crate::store::BatchWrite;
use async_trait::async_trait;
use std::future::Future;

/// The data-acquisition half of a plugin.
///
/// A producer fetches whatever external data its plugin tracks and turns it
/// into batch writes, one per table it touches. It never executes them itself.
#[async_trait]
pub trait Producer: Send + Sync {
    async fn produce(&self) -> Result<Vec<BatchWrite>>;
}

#[async_trait]
impl<F, Fut> Producer for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<BatchWrite>>> + Send,
{
    async fn produce(&self) -> Result<Vec<BatchWrite>> {
        (self)().await
    }
}
