use serde::Serialize;
use std::collections::BTreeMap;

pub const DEFAULT_CLOUD_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_LOCAL_MODEL: &str = "gemma3:4b";

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Provider {
    Gemini,
    Ollama,
}

impl Provider {
    pub fn is_local(self) -> bool {
        match self {
            Self::Ollama => true,
            Self::Gemini => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Capability {
    Text,
    Vision,
}

const KNOWN_LOCAL_MODELS: [&str; 2] = ["gemma3:4b", "qwen2.5vl:7b"];

pub fn model_capabilities(provider: Provider, model_name: Option<&str>) -> Vec<Capability> {
    match (provider, model_name) {
        (Provider::Gemini, _) => vec![Capability::Text, Capability::Vision],
        (Provider::Ollama, Some(name)) if KNOWN_LOCAL_MODELS.contains(&name) => {
            vec![Capability::Text, Capability::Vision]
        }
        _ => vec![Capability::Text],
    }
}

pub fn has_vision_capability(provider: Provider, model_name: Option<&str>) -> bool {
    model_capabilities(provider, model_name).contains(&Capability::Vision)
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderModels {
    pub provider: Provider,
    pub models: Vec<String>,
    pub capabilities: BTreeMap<String, Vec<Capability>>,
}

/// Static listing of every provider and the models it is known to serve.
pub fn available_models() -> Vec<ProviderModels> {
    let gemini = ProviderModels {
        provider: Provider::Gemini,
        models: vec![DEFAULT_CLOUD_MODEL.to_string()],
        capabilities: BTreeMap::from([(
            DEFAULT_CLOUD_MODEL.to_string(),
            model_capabilities(Provider::Gemini, None),
        )]),
    };

    let ollama = ProviderModels {
        provider: Provider::Ollama,
        models: KNOWN_LOCAL_MODELS.iter().map(|v| v.to_string()).collect(),
        capabilities: KNOWN_LOCAL_MODELS
            .iter()
            .map(|v| {
                (
                    v.to_string(),
                    model_capabilities(Provider::Ollama, Some(v)),
                )
            })
            .collect(),
    };

    vec![gemini, ollama]
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_provider_parse() {
        assert_eq!(Provider::from_str("gemini").unwrap(), Provider::Gemini);
        assert_eq!(Provider::from_str("ollama").unwrap(), Provider::Ollama);
        assert!(Provider::from_str("openai").is_err());
        assert_eq!(Provider::Ollama.to_string(), "ollama");
    }

    #[test]
    fn test_vision_capability() {
        assert!(has_vision_capability(Provider::Gemini, None));
        assert!(has_vision_capability(Provider::Ollama, Some("qwen2.5vl:7b")));
        assert!(!has_vision_capability(Provider::Ollama, Some("llama3:8b")));
        assert!(!has_vision_capability(Provider::Ollama, None));
    }

    #[test]
    fn test_available_models() {
        let models = available_models();
        assert_eq!(models.len(), 2);
        assert_eq!(models[1].models, vec!["gemma3:4b", "qwen2.5vl:7b"]);
        assert_eq!(
            models[1].capabilities["gemma3:4b"],
            vec![Capability::Text, Capability::Vision]
        );
    }
}
