use crate::{Chat, LLMImageContent, LLMMessage, LLMParams, LoadedModel, ResidencyControl};
use anyhow::{anyhow, bail};
use async_trait::async_trait;
use reqwest::{self, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use tracing::debug;

/// Client for a locally hosted Ollama server.
///
/// Chat goes through the OpenAI compatible `v1/chat/completions` route,
/// residency queries through the native `api/ps` and `api/generate` routes.
pub struct LocalModel {
    api_endpoint: Url,
    model: String,
    is_multimodal: bool,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct CompletionPayload {
    model: String,
    messages: Vec<Value>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct PsModel {
    name: String,
    #[serde(default)]
    size: u64,
}

#[derive(Deserialize)]
struct PsResponse {
    #[serde(default)]
    models: Vec<PsModel>,
}

impl CompletionPayload {
    fn from(
        model: &str,
        history: Vec<LLMMessage>,
        images: Option<Vec<LLMImageContent>>,
        params: Option<LLMParams>,
    ) -> Self {
        let params = params.unwrap_or_default();
        let images = images.unwrap_or_default();

        let messages = history
            .into_iter()
            .map(|v| match v {
                LLMMessage::System(v) => json!({"role": "system", "content": v}),
                LLMMessage::Assistant(v) => json!({"role": "assistant", "content": v}),
                LLMMessage::User(v) if images.is_empty() => json!({"role": "user", "content": v}),
                LLMMessage::User(v) => {
                    let mut content = vec![json!({"type": "text", "text": v})];
                    content.extend(images.iter().map(|image| {
                        json!({"type": "image_url", "image_url": {"url": image.data_url()}})
                    }));
                    json!({"role": "user", "content": content})
                }
            })
            .collect();

        Self {
            model: model.to_string(),
            messages,
            stream: false,
            temperature: params.temperature,
            seed: params.seed,
            max_tokens: params.max_tokens,
        }
    }
}

fn extract_content(resp: CompletionResponse) -> anyhow::Result<String> {
    resp.choices
        .into_iter()
        .next()
        .and_then(|v| v.message.content)
        .ok_or(anyhow!("empty completion from local model"))
}

#[async_trait]
impl Chat for LocalModel {
    async fn get_completion(
        &self,
        history: Vec<LLMMessage>,
        images: Option<Vec<LLMImageContent>>,
        params: Option<LLMParams>,
    ) -> anyhow::Result<String> {
        let payload = CompletionPayload::from(&self.model, history, images, params);

        let resp = self
            .client
            .post(self.api_endpoint.join("v1/chat/completions")?)
            .json(&payload)
            .send()
            .await?;

        if resp.status() != reqwest::StatusCode::OK {
            bail!("error from local model server: {}", resp.text().await?);
        }

        extract_content(resp.json::<CompletionResponse>().await?)
    }

    fn is_multimodal(&self) -> bool {
        self.is_multimodal
    }
}

#[async_trait]
impl ResidencyControl for LocalModel {
    async fn loaded_models(&self) -> anyhow::Result<Vec<LoadedModel>> {
        let resp = self
            .client
            .get(self.api_endpoint.join("api/ps")?)
            .send()
            .await?;

        if resp.status() != reqwest::StatusCode::OK {
            bail!("failed to query loaded models: {}", resp.text().await?);
        }

        let resp = resp.json::<PsResponse>().await?;

        Ok(resp
            .models
            .into_iter()
            .map(|v| LoadedModel {
                name: v.name,
                size_bytes: v.size,
            })
            .collect())
    }

    async fn unload(&self, model_name: &str) -> anyhow::Result<()> {
        debug!("unloading local model {}", model_name);

        // an empty generate request with keep_alive 0 evicts the model immediately
        let resp = self
            .client
            .post(self.api_endpoint.join("api/generate")?)
            .json(&json!({"model": model_name, "keep_alive": 0}))
            .send()
            .await?;

        if resp.status() != reqwest::StatusCode::OK {
            bail!("failed to unload {}: {}", model_name, resp.text().await?);
        }

        Ok(())
    }
}

impl LocalModel {
    pub fn new(api_endpoint: &str, model: &str, is_multimodal: bool) -> anyhow::Result<Self> {
        let api_endpoint = if api_endpoint.ends_with('/') {
            api_endpoint.to_string()
        } else {
            format!("{}/", api_endpoint)
        };

        Ok(Self {
            api_endpoint: Url::from_str(&api_endpoint)?,
            model: model.to_string(),
            is_multimodal,
            client: reqwest::Client::new(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}
