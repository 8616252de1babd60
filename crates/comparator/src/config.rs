use crate::{
    error::{ComparisonError, ComparisonResult},
    request::ModelRequest,
};
use ai::blip_itm::{BlipItmModel, ItmOutputContract};
use llm::{
    model::{DEFAULT_CLOUD_MODEL, DEFAULT_LOCAL_MODEL},
    Provider,
};
use std::{path::PathBuf, str::FromStr, time::Duration};

#[derive(Debug, Clone)]
pub struct CloudConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct LocalConfig {
    pub base_url: String,
    pub default_model: String,
    /// Local model used to write shared reference captions, if any.
    pub reference_model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ItmConfig {
    pub disabled: bool,
    pub model: BlipItmModel,
    pub resources_dir: PathBuf,
    pub download_url: Option<String>,
    pub output_contract: ItmOutputContract,
}

#[derive(Debug, Clone)]
pub struct ComparatorConfig {
    pub cloud: CloudConfig,
    pub local: LocalConfig,
    pub itm: ItmConfig,
    pub inference_timeout: Duration,
    pub local_model_cooldown: Duration,
    pub inter_model_pause: Duration,
}

impl Default for ComparatorConfig {
    fn default() -> Self {
        Self {
            cloud: CloudConfig {
                api_key: None,
                base_url: "https://generativelanguage.googleapis.com/v1beta/".to_string(),
                model: DEFAULT_CLOUD_MODEL.to_string(),
            },
            local: LocalConfig {
                base_url: "http://localhost:11434/".to_string(),
                default_model: DEFAULT_LOCAL_MODEL.to_string(),
                reference_model: None,
            },
            itm: ItmConfig {
                disabled: false,
                model: BlipItmModel::BaseCoco,
                resources_dir: PathBuf::from("resources"),
                download_url: None,
                output_contract: ItmOutputContract::LogitPair,
            },
            inference_timeout: Duration::from_secs(300),
            local_model_cooldown: Duration::from_secs(3),
            inter_model_pause: Duration::from_millis(500),
        }
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str) -> ComparisonResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    env_var(key)
        .map(|v| {
            v.parse::<T>()
                .map_err(|e| ComparisonError::Config(format!("{}={}: {}", key, v, e)))
        })
        .transpose()
}

impl ComparatorConfig {
    /// Read overrides from the process environment on top of the defaults.
    pub fn from_env() -> ComparisonResult<Self> {
        let mut config = Self::default();

        config.cloud.api_key = env_var("GOOGLE_API_KEY").or_else(|| env_var("GCP_API_KEY"));
        if let Some(v) = env_var("GEMINI_MODEL") {
            config.cloud.model = v;
        }
        if let Some(v) = env_var("GEMINI_BASE_URL") {
            config.cloud.base_url = v;
        }

        if let Some(v) = env_var("OLLAMA_BASE_URL") {
            config.local.base_url = v;
        }
        if let Some(v) = env_var("OLLAMA_DEFAULT_MODEL") {
            config.local.default_model = v;
        }
        config.local.reference_model = env_var("REFERENCE_MODEL");

        if let Some(v) = parse_env::<u64>("INFERENCE_TIMEOUT_SECS")? {
            config.inference_timeout = Duration::from_secs(v);
        }
        if let Some(v) = parse_env::<u64>("LOCAL_MODEL_COOLDOWN_MS")? {
            config.local_model_cooldown = Duration::from_millis(v);
        }
        if let Some(v) = parse_env::<u64>("INTER_MODEL_PAUSE_MS")? {
            config.inter_model_pause = Duration::from_millis(v);
        }

        if let Some(v) = parse_env::<bool>("ITM_DISABLED")? {
            config.itm.disabled = v;
        }
        if let Some(v) = parse_env::<BlipItmModel>("ITM_MODEL")? {
            config.itm.model = v;
        }
        if let Some(v) = env_var("ITM_RESOURCES_DIR") {
            config.itm.resources_dir = PathBuf::from(v);
        }
        config.itm.download_url = env_var("ITM_DOWNLOAD_URL");
        if let Some(v) = parse_env::<ItmOutputContract>("ITM_OUTPUT_CONTRACT")? {
            config.itm.output_contract = v;
        }

        Ok(config)
    }

    /// Name a request's model is known by in results and reports.
    pub fn resolve_model_name(&self, request: &ModelRequest) -> String {
        match request.provider {
            Provider::Gemini => self.cloud.model.clone(),
            Provider::Ollama => request
                .model_name
                .clone()
                .unwrap_or_else(|| self.local.default_model.clone()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_resolve_model_name() {
        let config = ComparatorConfig::default();

        let cloud = ModelRequest::new(Provider::Gemini, Some("ignored"));
        assert_eq!(config.resolve_model_name(&cloud), "gemini-1.5-flash");

        let local = ModelRequest::new(Provider::Ollama, None);
        assert_eq!(config.resolve_model_name(&local), "gemma3:4b");

        let local = ModelRequest::new(Provider::Ollama, Some("qwen2.5vl:7b"));
        assert_eq!(config.resolve_model_name(&local), "qwen2.5vl:7b");
    }

    #[test]
    fn test_defaults() {
        let config = ComparatorConfig::default();
        assert_eq!(config.local_model_cooldown, Duration::from_secs(3));
        assert_eq!(config.inter_model_pause, Duration::from_millis(500));
        assert_eq!(config.itm.output_contract, ItmOutputContract::LogitPair);
        assert!(config.cloud.api_key.is_none());
    }
}
