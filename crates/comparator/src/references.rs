use crate::{
    executor::MAX_LOGGED_ERROR_CHARS,
    payload::ImagePayload,
    result::truncate_chars,
};
use async_trait::async_trait;
use llm::{Chat, LLMMessage, LLMParams};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

pub const REFERENCE_CAPTION_COUNT: usize = 5;

const CANNED_CAPTIONS: [&str; REFERENCE_CAPTION_COUNT] = [
    "A photograph.",
    "An image with several visible objects.",
    "A picture showing a scene.",
    "An image with colors and shapes.",
    "A view of something in a setting.",
];

const REFERENCE_PROMPT: &str = r#"Write 5 short, literal captions for this image.

Rules:
- One caption per line, no numbering and no bullets.
- Describe only what is visible, in English.
- At most 15 words per caption."#;

/// Produces the reference captions every model response is measured against.
#[async_trait]
pub trait ReferenceGenerator: Send + Sync {
    async fn generate(&self, image: &ImagePayload) -> Vec<String>;
}

pub fn canned_captions() -> Vec<String> {
    CANNED_CAPTIONS.iter().map(|v| v.to_string()).collect()
}

/// Generic captions, used when no reference model is configured.
pub struct CannedReferences;

#[async_trait]
impl ReferenceGenerator for CannedReferences {
    async fn generate(&self, _image: &ImagePayload) -> Vec<String> {
        canned_captions()
    }
}

/// Asks a vision model for captions and falls back to the canned ones on any problem.
pub struct ChatReferenceGenerator {
    client: Arc<dyn Chat>,
    timeout: Duration,
}

fn parse_captions(completion: &str) -> Vec<String> {
    completion
        .lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| c.is_ascii_digit() || "-*.) ".contains(c))
                .trim()
        })
        .filter(|line| !line.is_empty())
        .take(REFERENCE_CAPTION_COUNT)
        .map(|line| line.to_string())
        .collect()
}

impl ChatReferenceGenerator {
    pub fn new(client: Arc<dyn Chat>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn request_captions(&self, image: &ImagePayload) -> anyhow::Result<Vec<String>> {
        let completion = tokio::time::timeout(
            self.timeout,
            self.client.get_completion(
                vec![LLMMessage::User(REFERENCE_PROMPT.to_string())],
                Some(vec![image.to_llm_content()]),
                Some(LLMParams {
                    temperature: Some(0.0),
                    ..Default::default()
                }),
            ),
        )
        .await
        .map_err(|_| anyhow::anyhow!("reference generation timed out"))??;

        Ok(parse_captions(&completion))
    }
}

#[async_trait]
impl ReferenceGenerator for ChatReferenceGenerator {
    async fn generate(&self, image: &ImagePayload) -> Vec<String> {
        match self.request_captions(image).await {
            Ok(captions) if !captions.is_empty() => {
                info!("generated {} reference captions", captions.len());
                captions
            }
            Ok(_) => {
                warn!("reference model returned no captions, using canned captions");
                canned_captions()
            }
            Err(e) => {
                warn!(
                    "reference generation failed, using canned captions: {}",
                    truncate_chars(&e.to_string(), MAX_LOGGED_ERROR_CHARS)
                );
                canned_captions()
            }
        }
    }
}
