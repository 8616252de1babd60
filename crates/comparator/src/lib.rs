mod config;
mod content;
mod error;
mod executor;
mod metrics;
mod orchestrator;
mod payload;
mod references;
mod report;
mod request;
mod residency;
mod result;

pub use config::{CloudConfig, ComparatorConfig, ItmConfig, LocalConfig};
pub use content::{analyze, ContentSignals};
pub use error::{ComparisonError, ComparisonResult};
pub use executor::{build_prompt, ClientProvider, ClientRegistry, Executor, SYSTEM_PROMPT};
pub use metrics::{
    aggregate, model_metrics, overall_score, performance_score, quality_score, text_score,
    ComparisonReport, MetricsByModel, ModelMetrics, NOT_APPLICABLE, NO_SUCCESSFUL_MODEL,
};
pub use orchestrator::{build_itm_scorer, Orchestrator};
pub use payload::{validate_content_type, ImageMetadata, ImagePayload};
pub use references::{
    canned_captions, CannedReferences, ChatReferenceGenerator, ReferenceGenerator,
};
pub use report::{
    recommendation, ComparisonResponse, ComparisonSummary, ModelMetricsSummary,
    RecommendationTier, SharedReferences,
};
pub use request::{parse_model_requests, parse_provider, validate_requests, ModelRequest};
pub use residency::ResidencyManager;
pub use result::ModelResult;

pub use llm::{available_models, Provider};
