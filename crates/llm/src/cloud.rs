use crate::{Chat, LLMImageContent, LLMMessage, LLMParams};
use anyhow::{anyhow, bail};
use async_trait::async_trait;
use reqwest::{self, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;

/// Gemini `generateContent` client.
pub struct CloudModel {
    api_endpoint: Url,
    api_secret: Option<String>,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Value>,
    contents: Vec<Value>,
    generation_config: Value,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

impl GenerateContentPayload {
    fn from(
        history: Vec<LLMMessage>,
        images: Option<Vec<LLMImageContent>>,
        params: Option<LLMParams>,
    ) -> Self {
        let params = params.unwrap_or_default();
        let images = images.unwrap_or_default();

        let mut system_parts = vec![];
        let mut contents = vec![];

        for message in history {
            match message {
                LLMMessage::System(v) => system_parts.push(json!({"text": v})),
                LLMMessage::User(v) => {
                    let mut parts = vec![json!({"text": v})];
                    parts.extend(images.iter().map(|image| {
                        json!({"inline_data": {"mime_type": image.mime_type, "data": image.data}})
                    }));
                    contents.push(json!({"role": "user", "parts": parts}));
                }
                LLMMessage::Assistant(v) => {
                    contents.push(json!({"role": "model", "parts": [{"text": v}]}))
                }
            }
        }

        let mut generation_config = json!({});
        if let Some(temperature) = params.temperature {
            generation_config["temperature"] = json!(temperature);
        }
        if let Some(seed) = params.seed {
            generation_config["seed"] = json!(seed);
        }
        if let Some(max_tokens) = params.max_tokens {
            generation_config["maxOutputTokens"] = json!(max_tokens);
        }

        Self {
            system_instruction: if system_parts.is_empty() {
                None
            } else {
                Some(json!({ "parts": system_parts }))
            },
            contents,
            generation_config,
        }
    }
}

fn extract_text(resp: GenerateContentResponse) -> anyhow::Result<String> {
    let content = resp
        .candidates
        .into_iter()
        .next()
        .and_then(|v| v.content)
        .ok_or(anyhow!("no candidate in cloud model response"))?;

    let text = content
        .parts
        .into_iter()
        .filter_map(|v| v.text)
        .collect::<Vec<_>>()
        .join("");

    if text.is_empty() {
        bail!("cloud model returned no text");
    }

    Ok(text)
}

#[async_trait]
impl Chat for CloudModel {
    async fn get_completion(
        &self,
        history: Vec<LLMMessage>,
        images: Option<Vec<LLMImageContent>>,
        params: Option<LLMParams>,
    ) -> anyhow::Result<String> {
        let api_secret = self
            .api_secret
            .as_ref()
            .ok_or(anyhow!("no api key configured for {}", self.model))?;

        let payload = GenerateContentPayload::from(history, images, params);

        let resp = self
            .client
            .post(
                self.api_endpoint
                    .join(&format!("models/{}:generateContent", self.model))?,
            )
            .header("x-goog-api-key", api_secret)
            .json(&payload)
            .send()
            .await?;

        if resp.status() != reqwest::StatusCode::OK {
            bail!("error from cloud model: {}", resp.text().await?);
        }

        extract_text(resp.json::<GenerateContentResponse>().await?)
    }

    fn is_multimodal(&self) -> bool {
        true
    }
}

impl CloudModel {
    pub fn new(api_endpoint: &str, api_secret: Option<&str>, model: &str) -> anyhow::Result<Self> {
        let api_endpoint = if api_endpoint.ends_with('/') {
            api_endpoint.to_string()
        } else {
            format!("{}/", api_endpoint)
        };

        Ok(Self {
            api_endpoint: Url::from_str(&api_endpoint)?,
            api_secret: api_secret.map(|v| v.into()),
            model: model.to_string(),
            client: reqwest::Client::new(),
        })
    }
}
