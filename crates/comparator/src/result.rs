use llm::Provider;
use serde::Serialize;

pub const MAX_ERROR_CHARS: usize = 200;

/// Outcome of one model run against one image.
///
/// A failed run carries the failure text in `error` and an empty `response_text`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelResult {
    pub model_name: String,
    pub provider: Provider,
    pub response_text: String,
    pub execution_time_seconds: f64,
    pub success: bool,
    pub error: Option<String>,
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

impl ModelResult {
    pub fn success(
        model_name: impl Into<String>,
        provider: Provider,
        response_text: impl Into<String>,
        execution_time_seconds: f64,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            provider,
            response_text: response_text.into(),
            execution_time_seconds,
            success: true,
            error: None,
        }
    }

    pub fn failure(
        model_name: impl Into<String>,
        provider: Provider,
        error: impl AsRef<str>,
        execution_time_seconds: f64,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            provider,
            response_text: String::new(),
            execution_time_seconds,
            success: false,
            error: Some(truncate_chars(error.as_ref(), MAX_ERROR_CHARS)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_failure_truncates_error() {
        let long = "é".repeat(500);
        let result = ModelResult::failure("gemma3:4b", Provider::Ollama, &long, 1.5);

        assert!(!result.success);
        assert!(result.response_text.is_empty());
        assert_eq!(result.error.unwrap().chars().count(), MAX_ERROR_CHARS);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abc", 5), "abc");
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }
}
