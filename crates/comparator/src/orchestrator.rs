use crate::{
    config::{ComparatorConfig, ItmConfig},
    error::{ComparisonError, ComparisonResult},
    executor::{ClientProvider, ClientRegistry, Executor, MAX_LOGGED_ERROR_CHARS},
    metrics::aggregate,
    payload::ImagePayload,
    references::{CannedReferences, ChatReferenceGenerator, ReferenceGenerator},
    report::{ComparisonResponse, ComparisonSummary, SharedReferences},
    request::{validate_requests, ModelRequest},
    residency::ResidencyManager,
    result::{truncate_chars, ModelResult},
};
use ai::{
    blip_itm::BlipItm,
    itm::ItmScorer,
    ImageTextMatch, ItmImage,
};
use llm::Provider;
use std::{collections::HashMap, sync::Arc};
use tokio::time::Instant;
use tracing::{info, warn};

/// Build the ITM scorer, or `None` when scoring is disabled or cannot start.
///
/// Model weights are not touched here, they are loaded per scoring session.
pub fn build_itm_scorer(config: &ItmConfig) -> Option<Arc<dyn ImageTextMatch>> {
    if config.disabled {
        info!("itm scoring disabled");
        return None;
    }

    if let Err(e) = std::fs::create_dir_all(&config.resources_dir) {
        warn!(
            "failed to prepare itm resources dir {}: {}",
            config.resources_dir.display(),
            e
        );
        return None;
    }

    let model = config.model;
    if !model.resources_available(&config.resources_dir, config.download_url.as_deref()) {
        warn!(
            "itm model {} not found in {} and ITM_DOWNLOAD_URL is not set, itm scoring disabled",
            model,
            config.resources_dir.display()
        );
        return None;
    }

    let resources_dir = config.resources_dir.clone();
    let download_url = config.download_url.clone();
    let contract = config.output_contract;

    let scorer = ItmScorer::new(model.to_string(), move || {
        let resources_dir = resources_dir.clone();
        let download_url = download_url.clone();
        async move { BlipItm::new(model, resources_dir, download_url, contract).await }
    });

    Some(Arc::new(scorer))
}

/// Runs a whole comparison: every requested model in order, then shared
/// references, one ITM session and the aggregation.
pub struct Orchestrator {
    config: Arc<ComparatorConfig>,
    executor: Executor,
    residency: Option<ResidencyManager>,
    itm: Option<Arc<dyn ImageTextMatch>>,
    references: Arc<dyn ReferenceGenerator>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<ComparatorConfig>,
        clients: Arc<dyn ClientProvider>,
        itm: Option<Arc<dyn ImageTextMatch>>,
        references: Arc<dyn ReferenceGenerator>,
    ) -> Self {
        Self {
            residency: clients.residency_control().map(ResidencyManager::new),
            executor: Executor::new(clients, config.clone()),
            config,
            itm,
            references,
        }
    }

    pub fn from_config(config: ComparatorConfig) -> Self {
        let config = Arc::new(config);
        let clients = Arc::new(ClientRegistry::new(config.clone()));
        let itm = build_itm_scorer(&config.itm);

        let references: Arc<dyn ReferenceGenerator> = match &config.local.reference_model {
            Some(model) => match clients.chat_client(Provider::Ollama, model) {
                Ok(client) => Arc::new(ChatReferenceGenerator::new(
                    client,
                    config.inference_timeout,
                )),
                Err(e) => {
                    warn!("reference model {} unavailable: {}", model, e);
                    Arc::new(CannedReferences)
                }
            },
            None => Arc::new(CannedReferences),
        };

        Self::new(config, clients, itm, references)
    }

    pub fn has_itm_scorer(&self) -> bool {
        self.itm.is_some()
    }

    async fn make_room_for(&self, model_name: &str) {
        let Some(residency) = self.residency.as_ref() else {
            return;
        };

        if residency.prepare(model_name).await {
            info!(
                "waiting {}ms for local memory to be released",
                self.config.local_model_cooldown.as_millis()
            );
            tokio::time::sleep(self.config.local_model_cooldown).await;
        }
    }

    async fn mark_resident(&self, model_name: &str) {
        if let Some(residency) = self.residency.as_ref() {
            residency.mark_resident(model_name).await;
        }
    }

    async fn execute_all(
        &self,
        requests: &[ModelRequest],
        image: &ImagePayload,
    ) -> Vec<ModelResult> {
        let mut results = Vec::with_capacity(requests.len());

        for (idx, request) in requests.iter().enumerate() {
            let model_name = self.config.resolve_model_name(request);
            info!(
                model = %model_name,
                "processing model {}/{}",
                idx + 1,
                requests.len()
            );

            if request.provider.is_local() {
                self.make_room_for(&model_name).await;
            }

            let result = self.executor.execute(request, image).await;

            // a timed out or failed local run may still have loaded the model
            if request.provider.is_local() {
                self.mark_resident(&model_name).await;
            }

            results.push(result);
            tokio::time::sleep(self.config.inter_model_pause).await;
        }

        results
    }

    async fn shared_references(&self, image: &ImagePayload) -> Vec<String> {
        if let Some(model) = self.config.local.reference_model.as_ref() {
            self.make_room_for(model).await;
            let captions = self.references.generate(image).await;
            self.mark_resident(model).await;
            captions
        } else {
            self.references.generate(image).await
        }
    }

    /// One ITM session over every successful response plus the reference
    /// captions. Without a scorer or a successful response there is no
    /// session: every model gets 0.0 and no baseline.
    async fn score_itm(
        &self,
        results: &[ModelResult],
        captions: &[String],
        image: &ImagePayload,
    ) -> (HashMap<String, f64>, Option<f64>) {
        let Some(itm) = self.itm.as_ref() else {
            warn!("itm scorer unavailable, every model gets an itm score of 0");
            return (HashMap::new(), None);
        };

        let successes: Vec<&ModelResult> = results.iter().filter(|v| v.success).collect();
        if successes.is_empty() {
            info!("no successful responses, skipping itm scoring");
            return (HashMap::new(), None);
        }

        let texts: Vec<String> = successes
            .iter()
            .map(|v| v.response_text.clone())
            .chain(captions.iter().cloned())
            .collect();

        let scores = itm.score_batch(&ItmImage::Rgb(image.rgb()), &texts).await;
        if scores.len() != texts.len() {
            warn!(
                "itm scorer returned {} scores for {} captions",
                scores.len(),
                texts.len()
            );
        }

        let itm_scores = successes
            .iter()
            .zip(scores.iter())
            .map(|(result, score)| (result.model_name.clone(), *score as f64))
            .collect::<HashMap<_, _>>();

        let reference_scores = scores.get(successes.len()..).unwrap_or_default();
        let baseline_itm = (!reference_scores.is_empty()).then(|| {
            reference_scores.iter().map(|v| *v as f64).sum::<f64>()
                / reference_scores.len() as f64
        });

        (itm_scores, baseline_itm)
    }

    /// Compare the requested models on one image.
    ///
    /// Only request validation and an empty result set are errors, individual
    /// model failures show up as zero-scored entries in the response.
    #[tracing::instrument(name = "Orchestrator::compare", skip_all, fields(models = requests.len()))]
    pub async fn compare(
        &self,
        requests: &[ModelRequest],
        image: &ImagePayload,
    ) -> ComparisonResult<ComparisonResponse> {
        validate_requests(requests, &self.config)?;

        info!("starting comparison of {} models", requests.len());
        let start = Instant::now();
        let results = self.execute_all(requests, image).await;
        let total_execution_time = start.elapsed().as_secs_f64();

        if results.is_empty() {
            return Err(ComparisonError::NoResults);
        }

        for result in results.iter().filter(|v| !v.success) {
            warn!(
                model = %result.model_name,
                "model failed: {}",
                truncate_chars(
                    result.error.as_deref().unwrap_or_default(),
                    MAX_LOGGED_ERROR_CHARS
                )
            );
        }

        let captions = self.shared_references(image).await;
        let (itm_scores, baseline_itm) = self.score_itm(&results, &captions, image).await;

        let report = aggregate(&results, &itm_scores);
        info!(
            winner = %report.winner,
            "comparison finished in {:.2}s",
            total_execution_time
        );

        Ok(ComparisonResponse {
            summary: ComparisonSummary::from(&report),
            results,
            total_execution_time,
            image_info: image.metadata().clone(),
            references: SharedReferences {
                captions,
                baseline_itm,
            },
            report,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        executor::test::{FakeClients, Reply},
        metrics::NO_SUCCESSFUL_MODEL,
        payload::test_png,
        residency::test::FakeResidency,
    };
    use ai::{itm::NEUTRAL_ITM_SCORE, ItmInput, ItmOutput, Model};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const SCENE: &str = "The image shows a red car on the road near a man walking.";
    const LONG_SCENE: &str = "The photograph shows a busy street. A man in a blue jacket is walking \
        his dog past a parked red car. Behind them a woman is sitting on a bench near a tall tree.";

    /// Scores by caption text, 0.1 for anything unknown; records every session.
    #[derive(Default)]
    struct FakeItm {
        scores: HashMap<String, f32>,
        sessions: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl ImageTextMatch for FakeItm {
        async fn score_batch(&self, _image: &ItmImage, captions: &[String]) -> Vec<f32> {
            self.sessions.lock().unwrap().push(captions.to_vec());
            captions
                .iter()
                .map(|v| self.scores.get(v).copied().unwrap_or(0.1))
                .collect()
        }
    }

    struct UnloadableModel;

    impl Model for UnloadableModel {
        type Item = ItmInput;
        type Output = ItmOutput;

        fn batch_size_limit(&self) -> usize {
            1
        }

        async fn process(
            &mut self,
            _items: Vec<Self::Item>,
        ) -> anyhow::Result<Vec<anyhow::Result<Self::Output>>> {
            Ok(vec![])
        }
    }

    fn payload() -> ImagePayload {
        ImagePayload::from_bytes(test_png(4, 4), Some("red.png"), Some("image/png")).unwrap()
    }

    fn orchestrator(
        clients: FakeClients,
        itm: Option<Arc<dyn ImageTextMatch>>,
    ) -> Orchestrator {
        Orchestrator::new(
            Arc::new(ComparatorConfig::default()),
            Arc::new(clients),
            itm,
            Arc::new(CannedReferences),
        )
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_partial_failure_keeps_running() {
        let clients = FakeClients::default()
            .with("gemini-1.5-flash", Reply::Fail("quota exceeded".into()), 1.0)
            .with("gemma3:4b", Reply::Text(SCENE.into()), 4.0)
            .with("qwen2.5vl:7b", Reply::Text(LONG_SCENE.into()), 70.0);
        let itm = Arc::new(FakeItm {
            scores: HashMap::from([(SCENE.to_string(), 0.8), (LONG_SCENE.to_string(), 0.6)]),
            ..Default::default()
        });
        let orchestrator = orchestrator(clients, Some(itm.clone()));

        let requests = vec![
            ModelRequest::new(Provider::Gemini, None),
            ModelRequest::new(Provider::Ollama, None),
            ModelRequest::new(Provider::Ollama, Some("qwen2.5vl:7b")),
        ];
        let response = orchestrator.compare(&requests, &payload()).await.unwrap();

        let names: Vec<_> = response.results.iter().map(|v| v.model_name.as_str()).collect();
        assert_eq!(names, vec!["gemini-1.5-flash", "gemma3:4b", "qwen2.5vl:7b"]);
        assert!(!response.results[0].success);
        assert_eq!(response.results[0].error.as_deref(), Some("quota exceeded"));

        // no residency control: no cooldown, only the pause after each model
        assert!((response.total_execution_time - 76.5).abs() < 0.01);

        let report = &response.report;
        assert_eq!(report.total_models, 3);
        assert_eq!(report.fastest_model, "gemma3:4b");
        assert_eq!(report.slowest_model, "qwen2.5vl:7b");
        assert_eq!(report.most_detailed_model, "qwen2.5vl:7b");
        assert_eq!(report.winner, "gemma3:4b");

        let gemma = report.metrics_by_model.get("gemma3:4b").unwrap();
        assert!((gemma.itm_score - 0.8).abs() < 1e-6);
        assert!((gemma.overall_score - 8.05).abs() < 1e-6);
        let gemini = report.metrics_by_model.get("gemini-1.5-flash").unwrap();
        assert_eq!(gemini.overall_score, 0.0);
        assert_eq!(gemini.itm_score, 0.0);

        // one session: two responses then the five references
        let sessions = itm.sessions.lock().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].len(), 7);
        assert_eq!(sessions[0][0], SCENE);
        assert!((response.references.baseline_itm.unwrap() - 0.1).abs() < 1e-6);
        assert_eq!(response.references.captions.len(), 5);

        assert_eq!(response.summary.winner, "gemma3:4b");
        assert_eq!(
            response.summary.recommendation,
            "gemma3:4b showed excellent performance. High-quality results."
        );
        assert_eq!(response.image_info.filename.as_deref(), Some("red.png"));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_without_itm_scorer() {
        let clients = FakeClients::default()
            .with("gemini-1.5-flash", Reply::Text(SCENE.into()), 2.0)
            .with("gemma3:4b", Reply::Text(LONG_SCENE.into()), 3.0);
        let orchestrator = orchestrator(clients, None);
        assert!(!orchestrator.has_itm_scorer());

        let requests = vec![
            ModelRequest::new(Provider::Gemini, None),
            ModelRequest::new(Provider::Ollama, None),
        ];
        let response = orchestrator.compare(&requests, &payload()).await.unwrap();

        for metrics in response.report.metrics_by_model.iter() {
            assert!(metrics.result.success);
            assert_eq!(metrics.itm_score, 0.0);
        }
        assert!(response.references.baseline_itm.is_none());
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_unloadable_itm_model_is_neutral() {
        let clients = FakeClients::default()
            .with("gemini-1.5-flash", Reply::Text(SCENE.into()), 2.0)
            .with("gemma3:4b", Reply::Fail("connection refused".into()), 0.0);
        let scorer = ItmScorer::new("unloadable", || async {
            Err::<UnloadableModel, _>(anyhow!("weights missing"))
        });
        let orchestrator = orchestrator(clients, Some(Arc::new(scorer)));

        let requests = vec![
            ModelRequest::new(Provider::Gemini, None),
            ModelRequest::new(Provider::Ollama, None),
        ];
        let response = orchestrator.compare(&requests, &payload()).await.unwrap();

        let report = &response.report;
        let gemini = report.metrics_by_model.get("gemini-1.5-flash").unwrap();
        assert_eq!(gemini.itm_score, NEUTRAL_ITM_SCORE as f64);
        // failed responses are never scored
        assert_eq!(report.metrics_by_model.get("gemma3:4b").unwrap().itm_score, 0.0);
        assert_eq!(
            response.references.baseline_itm,
            Some(NEUTRAL_ITM_SCORE as f64)
        );
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_local_models_are_evicted_between_runs() {
        let residency = Arc::new(FakeResidency::with_loaded(&["llava:7b"]));
        let mut clients = FakeClients::default()
            .with("gemma3:4b", Reply::Text(SCENE.into()), 1.0)
            .with("gemini-1.5-flash", Reply::Text(SCENE.into()), 1.0)
            .with("qwen2.5vl:7b", Reply::Text(SCENE.into()), 1.0);
        clients.residency = Some(residency.clone());
        let orchestrator = orchestrator(clients, None);

        let requests = vec![
            ModelRequest::new(Provider::Ollama, None),
            ModelRequest::new(Provider::Gemini, None),
            ModelRequest::new(Provider::Ollama, Some("qwen2.5vl:7b")),
        ];
        let response = orchestrator.compare(&requests, &payload()).await.unwrap();

        assert_eq!(
            *residency.unloaded.lock().unwrap(),
            vec!["llava:7b".to_string(), "gemma3:4b".to_string()]
        );
        // three runs, three pauses and two cooldowns
        assert!((response.total_execution_time - 10.5).abs() < 0.01);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_reference_model_takes_its_turn_in_local_memory() {
        let residency = Arc::new(FakeResidency::default());
        let mut clients = FakeClients::default()
            .with("gemma3:4b", Reply::Text(SCENE.into()), 1.0)
            .with("qwen2.5vl:7b", Reply::Text(LONG_SCENE.into()), 1.0)
            .with(
                "llava:7b",
                Reply::Text("1. A red square.\n2. A plain red image.".into()),
                2.0,
            );
        clients.residency = Some(residency.clone());
        let reference_client = clients.clients["llava:7b"].clone();

        let mut config = ComparatorConfig::default();
        config.local.reference_model = Some("llava:7b".to_string());
        let config = Arc::new(config);
        let itm = Arc::new(FakeItm::default());
        let orchestrator = Orchestrator::new(
            config.clone(),
            Arc::new(clients),
            Some(itm.clone()),
            Arc::new(ChatReferenceGenerator::new(
                reference_client.clone(),
                config.inference_timeout,
            )),
        );

        let requests = vec![
            ModelRequest::new(Provider::Ollama, None),
            ModelRequest::new(Provider::Ollama, Some("qwen2.5vl:7b")),
        ];
        let start = Instant::now();
        let response = orchestrator.compare(&requests, &payload()).await.unwrap();
        let elapsed = start.elapsed().as_secs_f64();

        // gemma makes room for qwen, qwen makes room for the reference model
        assert_eq!(
            *residency.unloaded.lock().unwrap(),
            vec!["gemma3:4b".to_string(), "qwen2.5vl:7b".to_string()]
        );
        // runs: 1 + 0.5 + 3 (cooldown) + 1 + 0.5
        assert!((response.total_execution_time - 6.0).abs() < 0.01);
        // references: 3 (cooldown) + 2
        assert!((elapsed - 11.0).abs() < 0.01);

        assert_eq!(reference_client.calls.lock().unwrap().len(), 1);
        assert_eq!(
            response.references.captions,
            vec!["A red square.".to_string(), "A plain red image.".to_string()]
        );

        let sessions = itm.sessions.lock().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].len(), 4);
        assert_eq!(sessions[0][2], "A red square.");
        assert!((response.references.baseline_itm.unwrap() - 0.1).abs() < 1e-6);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_all_failed_is_not_an_error() {
        let clients = FakeClients::default()
            .with("gemini-1.5-flash", Reply::Fail("quota exceeded".into()), 1.0)
            .with("gemma3:4b", Reply::Fail("out of memory".into()), 2.0);
        let itm = Arc::new(FakeItm::default());
        let orchestrator = orchestrator(clients, Some(itm.clone()));

        let requests = vec![
            ModelRequest::new(Provider::Gemini, None),
            ModelRequest::new(Provider::Ollama, None),
        ];
        let response = orchestrator.compare(&requests, &payload()).await.unwrap();

        assert_eq!(response.summary.winner, NO_SUCCESSFUL_MODEL);
        assert_eq!(response.summary.fastest_model, "gemini-1.5-flash");
        assert_eq!(response.summary.slowest_model, "gemma3:4b");

        // nothing to score, the itm model is never loaded
        assert!(itm.sessions.lock().unwrap().is_empty());
        assert!(response.references.baseline_itm.is_none());
        assert_eq!(response.references.captions.len(), 5);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_invalid_requests_run_nothing() {
        let clients = FakeClients::default().with("gemini-1.5-flash", Reply::Text(SCENE.into()), 1.0);
        let orchestrator = orchestrator(clients, None);

        let single = vec![ModelRequest::new(Provider::Gemini, None)];
        let err = orchestrator.compare(&single, &payload()).await.unwrap_err();
        assert!(matches!(err, ComparisonError::InvalidRequest(_)));

        let duplicated = vec![
            ModelRequest::new(Provider::Gemini, None),
            ModelRequest::new(Provider::Gemini, Some("other")),
        ];
        let err = orchestrator.compare(&duplicated, &payload()).await.unwrap_err();
        assert!(matches!(err, ComparisonError::InvalidRequest(_)));
    }

    #[test]
    fn test_build_itm_scorer() {
        let mut config = ComparatorConfig::default().itm;
        config.disabled = true;
        assert!(build_itm_scorer(&config).is_none());

        // weights neither on disk nor downloadable
        config.disabled = false;
        config.download_url = None;
        config.resources_dir = std::env::temp_dir().join("comparator-itm-test");
        std::fs::remove_dir_all(&config.resources_dir).ok();
        assert!(build_itm_scorer(&config).is_none());

        config.download_url = Some("https://example.com/itm".to_string());
        assert!(build_itm_scorer(&config).is_some());

        let (model_uri, tokenizer_uri) = config.model.model_uri();
        for uri in [model_uri, tokenizer_uri] {
            let path = config.resources_dir.join(uri);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "").unwrap();
        }
        config.download_url = None;
        assert!(build_itm_scorer(&config).is_some());
    }
}
