use crate::{
    config::ComparatorConfig,
    payload::{ImageMetadata, ImagePayload},
    request::ModelRequest,
    result::{truncate_chars, ModelResult},
};
use anyhow::{anyhow, bail};
use llm::{has_vision_capability, CloudModel, LLMMessage, LocalModel, Provider, ResidencyControl};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub(crate) const MAX_LOGGED_ERROR_CHARS: usize = 100;

pub const SYSTEM_PROMPT: &str = r#"You are an expert at analyzing images.
Your task is to extract and summarize only the explicit, visible content of a single image.

Guidelines:
- Focus on the main idea or subject of the image.
- Use clear, factual language based strictly on what appears in the image.
- Do NOT make assumptions or add outside knowledge.
- Do NOT speculate or interpret implied meanings.

Return only a well-structured summary of the visible content of the image, in English."#;

/// User prompt for a model, depending on whether it receives the image itself.
pub fn build_prompt(provider: Provider, vision: bool, metadata: &ImageMetadata) -> String {
    match (provider, vision) {
        (Provider::Gemini, _) => {
            "Analyze this image according to the system instructions.".to_string()
        }
        (_, true) => format!(
            "Analyze this image according to the system instructions. \
            The image is in {} format with dimensions {}x{} pixels.",
            metadata.format, metadata.width, metadata.height
        ),
        (_, false) => format!(
            "Analyze an image with the following characteristics: \
            Format: {}, Size: {}x{} pixels, Color mode: {}. \
            Provide a detailed analysis of what an image with these technical characteristics could contain.",
            metadata.format, metadata.width, metadata.height, metadata.mode
        ),
    }
}

/// Source of inference clients, keyed by provider and resolved model name.
pub trait ClientProvider: Send + Sync {
    fn chat_client(&self, provider: Provider, model_name: &str)
        -> anyhow::Result<Arc<dyn llm::Chat>>;

    /// Query/unload handle of the local backend, if this provider has one.
    fn residency_control(&self) -> Option<Arc<dyn ResidencyControl>> {
        None
    }
}

/// Builds cloud and local clients from configuration and keeps them for reuse.
///
/// The cache lives as long as the registry, never in process-wide state.
pub struct ClientRegistry {
    config: Arc<ComparatorConfig>,
    clients: Mutex<HashMap<(Provider, String), Arc<dyn llm::Chat>>>,
}

impl ClientRegistry {
    pub fn new(config: Arc<ComparatorConfig>) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn build_client(
        &self,
        provider: Provider,
        model_name: &str,
    ) -> anyhow::Result<Arc<dyn llm::Chat>> {
        let client: Arc<dyn llm::Chat> = match provider {
            Provider::Gemini => Arc::new(CloudModel::new(
                &self.config.cloud.base_url,
                self.config.cloud.api_key.as_deref(),
                model_name,
            )?),
            Provider::Ollama => Arc::new(LocalModel::new(
                &self.config.local.base_url,
                model_name,
                has_vision_capability(provider, Some(model_name)),
            )?),
        };

        Ok(client)
    }
}

impl ClientProvider for ClientRegistry {
    fn chat_client(
        &self,
        provider: Provider,
        model_name: &str,
    ) -> anyhow::Result<Arc<dyn llm::Chat>> {
        let mut clients = self
            .clients
            .lock()
            .map_err(|e| anyhow!("client cache poisoned: {}", e))?;

        let key = (provider, model_name.to_string());
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        debug!("creating {} client for {}", provider, model_name);
        let client = self.build_client(provider, model_name)?;
        clients.insert(key, client.clone());

        Ok(client)
    }

    fn residency_control(&self) -> Option<Arc<dyn ResidencyControl>> {
        match LocalModel::new(
            &self.config.local.base_url,
            &self.config.local.default_model,
            false,
        ) {
            Ok(v) => Some(Arc::new(v)),
            Err(e) => {
                warn!("local backend unavailable for residency control: {}", e);
                None
            }
        }
    }
}

/// Runs one model request against one image.
pub struct Executor {
    clients: Arc<dyn ClientProvider>,
    config: Arc<ComparatorConfig>,
}

impl Executor {
    pub fn new(clients: Arc<dyn ClientProvider>, config: Arc<ComparatorConfig>) -> Self {
        Self { clients, config }
    }

    /// Never fails: errors and timeouts come back as a failed [`ModelResult`]
    /// carrying the time elapsed until the failure.
    pub async fn execute(&self, request: &ModelRequest, image: &ImagePayload) -> ModelResult {
        let model_name = self.config.resolve_model_name(request);
        let start = Instant::now();

        let outcome = self.run(request.provider, &model_name, image).await;
        let execution_time = start.elapsed().as_secs_f64();

        match outcome {
            Ok(text) => {
                info!(
                    model = %model_name,
                    "model responded in {:.2}s with {} chars",
                    execution_time,
                    text.len()
                );
                ModelResult::success(model_name, request.provider, text, execution_time)
            }
            Err(e) => {
                let error = e.to_string();
                warn!(
                    model = %model_name,
                    "model execution failed after {:.2}s: {}",
                    execution_time,
                    truncate_chars(&error, MAX_LOGGED_ERROR_CHARS)
                );
                ModelResult::failure(model_name, request.provider, error, execution_time)
            }
        }
    }

    async fn run(
        &self,
        provider: Provider,
        model_name: &str,
        image: &ImagePayload,
    ) -> anyhow::Result<String> {
        let client = self.clients.chat_client(provider, model_name)?;

        let vision = has_vision_capability(provider, Some(model_name));
        let prompt = build_prompt(provider, vision, image.metadata());
        let images = vision.then(|| vec![image.to_llm_content()]);

        let history = vec![
            LLMMessage::System(SYSTEM_PROMPT.to_string()),
            LLMMessage::User(prompt),
        ];

        let completion = tokio::time::timeout(
            self.config.inference_timeout,
            client.get_completion(history, images, None),
        )
        .await
        .map_err(|_| {
            anyhow!(
                "inference timed out after {}s",
                self.config.inference_timeout.as_secs()
            )
        })??;

        if completion.trim().is_empty() {
            bail!("empty response from {}", model_name);
        }

        Ok(completion)
    }
}
