use crate::{
    config::ComparatorConfig,
    error::{ComparisonError, ComparisonResult},
};
use llm::Provider;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, str::FromStr};

pub const MIN_MODELS_TO_COMPARE: usize = 2;
const VALID_PROVIDERS: [Provider; 2] = [Provider::Gemini, Provider::Ollama];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRequest {
    pub provider: Provider,
    pub model_name: Option<String>,
}

impl ModelRequest {
    pub fn new(provider: Provider, model_name: Option<&str>) -> Self {
        Self {
            provider,
            model_name: model_name.map(|v| v.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct RawModelRequest {
    provider: Option<String>,
    model_name: Option<String>,
}

fn valid_providers() -> String {
    VALID_PROVIDERS
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn parse_provider(provider: &str) -> ComparisonResult<Provider> {
    Provider::from_str(provider.trim()).map_err(|_| {
        ComparisonError::InvalidRequest(format!(
            "unsupported provider: {}. valid providers: {}",
            provider,
            valid_providers()
        ))
    })
}

/// Parse a JSON array such as `[{"provider":"gemini"},{"provider":"ollama","model_name":"gemma3:4b"}]`.
pub fn parse_model_requests(models_json: &str) -> ComparisonResult<Vec<ModelRequest>> {
    let raw: Vec<serde_json::Value> = serde_json::from_str(models_json)
        .map_err(|e| ComparisonError::InvalidRequest(format!("malformed model list: {}", e)))?;

    raw.into_iter()
        .map(|value| {
            if !value.is_object() {
                return Err(ComparisonError::InvalidRequest(
                    "each model entry must be an object with 'provider'".to_string(),
                ));
            }
            let raw: RawModelRequest = serde_json::from_value(value)
                .map_err(|e| ComparisonError::InvalidRequest(e.to_string()))?;
            let provider = raw.provider.ok_or(ComparisonError::InvalidRequest(
                "each model entry must be an object with 'provider'".to_string(),
            ))?;

            Ok(ModelRequest {
                provider: parse_provider(&provider)?,
                model_name: raw.model_name.filter(|v| !v.trim().is_empty()),
            })
        })
        .collect()
}

/// Reject request lists that cannot produce a comparison.
///
/// Two requests resolving to the same model name would collide in the report,
/// so duplicates are refused here rather than silently overwritten.
pub fn validate_requests(
    requests: &[ModelRequest],
    config: &ComparatorConfig,
) -> ComparisonResult<()> {
    if requests.len() < MIN_MODELS_TO_COMPARE {
        return Err(ComparisonError::InvalidRequest(format!(
            "at least {} models are required to compare, got {}",
            MIN_MODELS_TO_COMPARE,
            requests.len()
        )));
    }

    let mut seen = HashSet::new();
    for request in requests {
        let name = config.resolve_model_name(request);
        if !seen.insert(name.clone()) {
            return Err(ComparisonError::InvalidRequest(format!(
                "model {} requested more than once",
                name
            )));
        }
    }

    Ok(())
}
