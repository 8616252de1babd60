use crate::Model;
use futures::{future::BoxFuture, Future, FutureExt};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::debug;

type ModelFactory<T> = Box<dyn Fn() -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;

/// Holds at most one instance of a model, created on demand by `factory`.
pub(crate) struct ModelLoader<T>
where
    T: Model,
{
    slot: Mutex<Option<T>>,
    factory: ModelFactory<T>,
}

impl<T> ModelLoader<T>
where
    T: Model + Send + 'static,
{
    pub fn new<F, TFut>(factory: F) -> Self
    where
        F: Fn() -> TFut + Send + Sync + 'static,
        TFut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            slot: Mutex::new(None),
            factory: Box::new(move || factory().boxed()),
        }
    }

    /// Locks the slot, creating the model first if it is empty.
    ///
    /// A failed creation leaves the slot empty so the next call retries.
    pub async fn acquire(&self) -> anyhow::Result<MappedMutexGuard<'_, T>> {
        let mut slot = self.slot.lock().await;

        if slot.is_none() {
            debug!("creating model instance");
            *slot = Some((self.factory)().await?);
        }

        MutexGuard::try_map(slot, |v| v.as_mut())
            .map_err(|_| anyhow::anyhow!("model slot empty after creation"))
    }

    /// Drops the held instance. Returns whether there was one.
    pub async fn release(&self) -> bool {
        let released = self.slot.lock().await.take().is_some();
        if released {
            debug!("model instance released");
        }
        released
    }

    pub async fn is_loaded(&self) -> bool {
        self.slot.lock().await.is_some()
    }
}
