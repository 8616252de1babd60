use crate::{
    metrics::{ComparisonReport, ModelMetrics},
    payload::ImageMetadata,
    result::ModelResult,
};
use llm::Provider;
use serde::Serialize;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RecommendationTier {
    Unsatisfactory,
    Moderate,
    Good,
    Excellent,
}

impl RecommendationTier {
    pub fn from_score(overall_score: f64) -> Self {
        match overall_score {
            v if v < 3.0 => Self::Unsatisfactory,
            v if v < 6.0 => Self::Moderate,
            v if v < 8.0 => Self::Good,
            _ => Self::Excellent,
        }
    }
}

/// Human-readable verdict on the winner of a comparison.
pub fn recommendation(report: &ComparisonReport) -> String {
    let (name, tier) = match report.winner_metrics() {
        Some(winner) => (
            winner.model_name(),
            RecommendationTier::from_score(winner.overall_score),
        ),
        None => (report.winner.as_str(), RecommendationTier::Unsatisfactory),
    };

    match tier {
        RecommendationTier::Unsatisfactory => {
            "No model showed satisfactory performance. Consider reviewing the image or the models."
                .to_string()
        }
        RecommendationTier::Moderate => format!(
            "{} was the best, but with moderate performance. There is room for improvement.",
            name
        ),
        RecommendationTier::Good => format!(
            "{} showed good overall performance. Satisfactory results.",
            name
        ),
        RecommendationTier::Excellent => format!(
            "{} showed excellent performance. High-quality results.",
            name
        ),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelMetricsSummary {
    pub name: String,
    pub provider: Provider,
    pub execution_time: f64,
    pub success_rate: f64,
    pub quality_score: f64,
    pub word_count: usize,
    pub has_detailed_description: bool,
    pub uses_target_language: bool,
    pub itm_score: f64,
    pub overall_score: f64,
}

impl From<&ModelMetrics> for ModelMetricsSummary {
    fn from(metrics: &ModelMetrics) -> Self {
        Self {
            name: metrics.result.model_name.clone(),
            provider: metrics.result.provider,
            execution_time: metrics.result.execution_time_seconds,
            success_rate: metrics.success_rate(),
            quality_score: metrics.quality_score,
            word_count: metrics.signals.word_count,
            has_detailed_description: metrics.signals.has_detailed_description,
            uses_target_language: metrics.signals.uses_target_language,
            itm_score: metrics.itm_score,
            overall_score: metrics.overall_score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonSummary {
    pub total_models: usize,
    pub winner: String,
    pub fastest_model: String,
    pub slowest_model: String,
    pub most_detailed_model: String,
    pub highest_quality_model: String,
    pub recommendation: String,
    pub metrics_summary: Vec<ModelMetricsSummary>,
}

impl From<&ComparisonReport> for ComparisonSummary {
    fn from(report: &ComparisonReport) -> Self {
        Self {
            total_models: report.total_models,
            winner: report.winner.clone(),
            fastest_model: report.fastest_model.clone(),
            slowest_model: report.slowest_model.clone(),
            most_detailed_model: report.most_detailed_model.clone(),
            highest_quality_model: report.highest_quality_model.clone(),
            recommendation: recommendation(report),
            metrics_summary: report
                .metrics_by_model
                .iter()
                .map(ModelMetricsSummary::from)
                .collect(),
        }
    }
}

/// Reference captions shared by every model in a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SharedReferences {
    pub captions: Vec<String>,
    /// Mean ITM score of the captions, absent when no scorer ran.
    pub baseline_itm: Option<f64>,
}

/// Everything a caller gets back from one comparison run.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonResponse {
    pub results: Vec<ModelResult>,
    pub total_execution_time: f64,
    pub image_info: ImageMetadata,
    pub summary: ComparisonSummary,
    pub references: SharedReferences,
    #[serde(skip)]
    pub report: ComparisonReport,
}
