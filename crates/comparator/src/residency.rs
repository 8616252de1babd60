use crate::{executor::MAX_LOGGED_ERROR_CHARS, result::truncate_chars};
use llm::{LoadedModel, ResidencyControl};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Keeps at most one local model resident on the local backend.
///
/// Before a local model runs, every other loaded model is unloaded through
/// the backend's own query/unload API.
pub struct ResidencyManager {
    control: Arc<dyn ResidencyControl>,
    resident: Mutex<Option<String>>,
}

fn format_size(size_bytes: u64) -> String {
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;
    const MB: f64 = 1024.0 * 1024.0;

    let size = size_bytes as f64;
    if size >= GB {
        format!("{:.1} GB", size / GB)
    } else {
        format!("{:.0} MB", size / MB)
    }
}

impl ResidencyManager {
    pub fn new(control: Arc<dyn ResidencyControl>) -> Self {
        Self {
            control,
            resident: Mutex::new(None),
        }
    }

    pub async fn resident(&self) -> Option<String> {
        self.resident.lock().await.clone()
    }

    /// Log what the backend currently holds in memory.
    pub async fn log_memory_status(&self) -> Option<Vec<LoadedModel>> {
        match self.control.loaded_models().await {
            Ok(models) if models.is_empty() => {
                info!("no local models loaded, memory is free");
                Some(models)
            }
            Ok(models) => {
                for model in models.iter() {
                    info!(
                        "local model {} is loaded, using {}",
                        model.name,
                        format_size(model.size_bytes)
                    );
                }
                Some(models)
            }
            Err(e) => {
                warn!(
                    "failed to query loaded local models: {}",
                    truncate_chars(&e.to_string(), MAX_LOGGED_ERROR_CHARS)
                );
                None
            }
        }
    }

    /// Make room for `model_name`, returning whether anything was evicted.
    ///
    /// Unload failures are logged and do not stop the run.
    pub async fn prepare(&self, model_name: &str) -> bool {
        let loaded = self.log_memory_status().await;
        let mut resident = self.resident.lock().await;

        let mut to_evict: Vec<String> = loaded
            .unwrap_or_default()
            .into_iter()
            .map(|v| v.name)
            .filter(|v| v != model_name)
            .collect();
        if let Some(name) = resident.as_ref() {
            if name != model_name && !to_evict.contains(name) {
                to_evict.push(name.clone());
            }
        }

        if to_evict.is_empty() {
            return false;
        }

        info!(
            model = %model_name,
            "unloading {} local model(s) before loading {}",
            to_evict.len(),
            model_name
        );

        for name in to_evict.iter() {
            match self.control.unload(name).await {
                Ok(_) => debug!("unloaded local model {}", name),
                Err(e) => warn!(
                    model = %name,
                    "failed to unload local model: {}",
                    truncate_chars(&e.to_string(), MAX_LOGGED_ERROR_CHARS)
                ),
            }
        }

        if resident.as_deref() != Some(model_name) {
            *resident = None;
        }

        true
    }

    pub async fn mark_resident(&self, model_name: &str) {
        *self.resident.lock().await = Some(model_name.to_string());
    }
}
