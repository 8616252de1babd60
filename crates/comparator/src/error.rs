use thiserror::Error;

pub type ComparisonResult<T> = std::result::Result<T, ComparisonError>;

/// Errors that escape a comparison run.
///
/// Provider and scoring failures never show up here, they are folded into
/// zero-scored results instead.
#[derive(Error, Debug)]
pub enum ComparisonError {
    #[error("invalid model request: {0}")]
    InvalidRequest(String),

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("no model could process the image")]
    NoResults,

    #[error("configuration error: {0}")]
    Config(String),
}
