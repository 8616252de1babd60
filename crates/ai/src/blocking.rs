/// Runs synchronous inference work on tokio's blocking pool, keeping the
/// async workers free while a session loads or a forward pass runs.
pub(crate) async fn run_blocking<F, R>(f: F) -> anyhow::Result<R>
where
    F: FnOnce() -> anyhow::Result<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| anyhow::anyhow!("inference task aborted: {}", e))?
}
