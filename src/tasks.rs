use std::future::Future;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Spawns a background task whose error or panic is logged under `name` instead of vanishing.
pub fn spawn_supervised<F>(name: String, fut: F) -> JoinHandle<()>
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let inner = tokio::spawn(fut);
    tokio::spawn(async move {
        match inner.await {
            Ok(Ok(())) => debug!("Task {} finished", name),
            Ok(Err(e)) => error!("Task {} failed: {:#}", name, e),
            Err(e) if e.is_panic() => error!("Task {} panicked: {}", name, e),
            Err(e) => error!("Task {} was cancelled: {}", name, e),
        }
    })
}
