pub mod cloud;
pub mod local;
pub mod model;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use cloud::CloudModel;
pub use local::LocalModel;
pub use model::{available_models, has_vision_capability, Capability, Provider};

#[derive(Debug, Clone)]
pub enum LLMMessage {
    System(String),
    User(String),
    Assistant(String),
}

/// Inline image attached to a user turn, already base64 encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMImageContent {
    pub mime_type: String,
    pub data: String,
}

impl LLMImageContent {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LLMParams {
    pub temperature: Option<f32>,
    pub seed: Option<u32>,
    pub max_tokens: Option<u32>,
}

#[async_trait]
pub trait Chat: Send + Sync {
    async fn get_completion(
        &self,
        history: Vec<LLMMessage>,
        images: Option<Vec<LLMImageContent>>,
        params: Option<LLMParams>,
    ) -> anyhow::Result<String>;

    fn is_multimodal(&self) -> bool;
}

/// A model currently held in memory by a local inference backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadedModel {
    pub name: String,
    pub size_bytes: u64,
}

/// Query and evict resident models of a local backend.
#[async_trait]
pub trait ResidencyControl: Send + Sync {
    async fn loaded_models(&self) -> anyhow::Result<Vec<LoadedModel>>;

    async fn unload(&self, model_name: &str) -> anyhow::Result<()>;
}
