use crate::{
    content::{self, ContentSignals},
    result::ModelResult,
};
use serde::{ser::SerializeMap, Serialize, Serializer};
use std::collections::HashMap;

pub const NO_SUCCESSFUL_MODEL: &str = "no successful model";
pub const NOT_APPLICABLE: &str = "not applicable";

pub const MAX_SCORE: f64 = 10.0;
const TEXT_WEIGHT: f64 = 0.7;
const ITM_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelMetrics {
    #[serde(flatten)]
    pub result: ModelResult,
    #[serde(flatten)]
    pub signals: ContentSignals,
    pub itm_score: f64,
    pub text_score: f64,
    pub performance_score: f64,
    pub quality_score: f64,
    pub overall_score: f64,
}

impl ModelMetrics {
    pub fn model_name(&self) -> &str {
        &self.result.model_name
    }

    pub fn success_rate(&self) -> f64 {
        if self.result.success {
            1.0
        } else {
            0.0
        }
    }
}

/// Lexical score in `[0, 10]`.
pub fn text_score(signals: &ContentSignals) -> f64 {
    let mut score = match signals.word_count {
        20..=200 => 2.0,
        10..=19 => 1.0,
        n if n > 200 => 1.5,
        _ => 0.0,
    };

    if signals.has_detailed_description {
        score += 2.0;
    }
    if signals.well_structured {
        score += 2.0;
    }
    if signals.uses_target_language {
        score += 1.5;
    }
    if signals.has_specific_details {
        score += 1.5;
    }
    score += 0.5 * signals.mention_variety() as f64;

    score.min(MAX_SCORE)
}

/// 70% lexical, 30% image-text match, in `[0, 10]`.
pub fn quality_score(text_score: f64, itm_score: f64) -> f64 {
    (TEXT_WEIGHT * text_score + ITM_WEIGHT * itm_score * MAX_SCORE).min(MAX_SCORE)
}

pub fn performance_score(execution_time_seconds: f64, success: bool) -> f64 {
    if !success {
        return 0.0;
    }

    match execution_time_seconds {
        t if t <= 3.0 => 10.0,
        t if t <= 5.0 => 9.5,
        t if t <= 10.0 => 9.0,
        t if t <= 15.0 => 8.0,
        t if t <= 30.0 => 7.0,
        t if t <= 60.0 => 5.0,
        t if t <= 120.0 => 3.0,
        _ => 1.0,
    }
}

/// Slow models are judged more on quality than on speed.
pub fn overall_score(quality_score: f64, performance_score: f64, execution_time_seconds: f64) -> f64 {
    let (quality_weight, performance_weight) = if execution_time_seconds < 10.0 {
        (0.5, 0.5)
    } else if execution_time_seconds > 60.0 {
        (0.7, 0.3)
    } else {
        (0.6, 0.4)
    };

    (quality_weight * quality_score + performance_weight * performance_score).min(MAX_SCORE)
}

fn sanitize_itm(itm_score: f64) -> f64 {
    if itm_score.is_finite() {
        itm_score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

pub fn model_metrics(result: &ModelResult, itm_score: f64) -> ModelMetrics {
    let itm_score = sanitize_itm(itm_score);

    if !result.success {
        return ModelMetrics {
            result: result.clone(),
            signals: ContentSignals::default(),
            itm_score,
            text_score: 0.0,
            performance_score: 0.0,
            quality_score: 0.0,
            overall_score: 0.0,
        };
    }

    let signals = content::analyze(&result.response_text);
    let text_score = text_score(&signals);
    let quality_score = quality_score(text_score, itm_score);
    let performance_score = performance_score(result.execution_time_seconds, result.success);
    let overall_score = overall_score(
        quality_score,
        performance_score,
        result.execution_time_seconds,
    );

    ModelMetrics {
        result: result.clone(),
        signals,
        itm_score,
        text_score,
        performance_score,
        quality_score,
        overall_score,
    }
}

/// Metrics keyed by model name, iterated in insertion order.
///
/// Inserting an existing name replaces the entry in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsByModel(Vec<ModelMetrics>);

impl MetricsByModel {
    pub fn insert(&mut self, metrics: ModelMetrics) {
        match self
            .0
            .iter_mut()
            .find(|v| v.model_name() == metrics.model_name())
        {
            Some(existing) => *existing = metrics,
            None => self.0.push(metrics),
        }
    }

    pub fn get(&self, model_name: &str) -> Option<&ModelMetrics> {
        self.0.iter().find(|v| v.model_name() == model_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelMetrics> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for MetricsByModel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for metrics in &self.0 {
            map.serialize_entry(metrics.model_name(), metrics)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub total_models: usize,
    pub fastest_model: String,
    pub slowest_model: String,
    pub most_detailed_model: String,
    pub highest_quality_model: String,
    pub winner: String,
    pub metrics_by_model: MetricsByModel,
}

impl ComparisonReport {
    pub fn has_winner(&self) -> bool {
        self.metrics_by_model.get(&self.winner).is_some()
    }

    pub fn winner_metrics(&self) -> Option<&ModelMetrics> {
        self.metrics_by_model.get(&self.winner)
    }
}

// Ties keep the earlier entry, so the caller's request order decides.
fn first_max_by<'a, F>(items: impl Iterator<Item = &'a ModelMetrics>, key: F) -> Option<&'a ModelMetrics>
where
    F: Fn(&ModelMetrics) -> f64,
{
    items.fold(None, |best, m| match best {
        Some(b) if key(m) <= key(b) => Some(b),
        _ => Some(m),
    })
}

fn first_min_by<'a, F>(items: impl Iterator<Item = &'a ModelMetrics>, key: F) -> Option<&'a ModelMetrics>
where
    F: Fn(&ModelMetrics) -> f64,
{
    items.fold(None, |best, m| match best {
        Some(b) if key(m) >= key(b) => Some(b),
        _ => Some(m),
    })
}

fn name_or(metrics: Option<&ModelMetrics>, fallback: &str) -> String {
    metrics
        .map(|v| v.model_name().to_string())
        .unwrap_or_else(|| fallback.to_string())
}

/// Scores every result and picks the category winners.
///
/// Pure: the same results and ITM scores always yield the same report.
pub fn aggregate(results: &[ModelResult], itm_scores: &HashMap<String, f64>) -> ComparisonReport {
    let mut metrics_by_model = MetricsByModel::default();
    for result in results {
        let itm_score = itm_scores.get(&result.model_name).copied().unwrap_or(0.0);
        metrics_by_model.insert(model_metrics(result, itm_score));
    }

    let execution_time = |m: &ModelMetrics| m.result.execution_time_seconds;
    let successes = || metrics_by_model.iter().filter(|m| m.result.success);

    let slowest_model = name_or(
        first_max_by(metrics_by_model.iter(), execution_time),
        NOT_APPLICABLE,
    );

    let (fastest_model, most_detailed_model, highest_quality_model, winner) =
        if successes().next().is_none() {
            (
                name_or(
                    first_min_by(metrics_by_model.iter(), execution_time),
                    NOT_APPLICABLE,
                ),
                NOT_APPLICABLE.to_string(),
                NOT_APPLICABLE.to_string(),
                NO_SUCCESSFUL_MODEL.to_string(),
            )
        } else {
            (
                name_or(first_min_by(successes(), execution_time), NOT_APPLICABLE),
                name_or(
                    first_max_by(successes(), |m| m.signals.word_count as f64),
                    NOT_APPLICABLE,
                ),
                name_or(
                    first_max_by(successes(), |m| m.quality_score),
                    NOT_APPLICABLE,
                ),
                name_or(
                    first_max_by(successes(), |m| m.overall_score),
                    NO_SUCCESSFUL_MODEL,
                ),
            )
        };

    ComparisonReport {
        total_models: results.len(),
        fastest_model,
        slowest_model,
        most_detailed_model,
        highest_quality_model,
        winner,
        metrics_by_model,
    }
}
