use crate::{loader::ModelLoader, ImageTextMatch, ItmImage, ItmInput, ItmOutput, Model};
use async_trait::async_trait;
use futures::Future;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Returned for every caption when the model cannot be loaded.
pub const NEUTRAL_ITM_SCORE: ItmOutput = 0.5;
/// Returned for a caption whose forward pass failed.
pub const FAILED_ITM_SCORE: ItmOutput = 0.0;

/// Scoring sessions over a heavyweight ITM model.
///
/// Weights are loaded at the start of each session and offloaded at its end,
/// so they are never resident between two sessions. Sessions are serialized.
pub struct ItmScorer<T>
where
    T: Model<Item = ItmInput, Output = ItmOutput>,
{
    model_id: String,
    loader: ModelLoader<T>,
    session: Mutex<()>,
}

impl<T> ItmScorer<T>
where
    T: Model<Item = ItmInput, Output = ItmOutput> + Send + 'static,
{
    pub fn new<F, TFut>(model_id: impl Into<String>, create_model: F) -> Self
    where
        F: Fn() -> TFut + Send + Sync + 'static,
        TFut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            model_id: model_id.into(),
            loader: ModelLoader::new(create_model),
            session: Mutex::new(()),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub async fn is_loaded(&self) -> bool {
        self.loader.is_loaded().await
    }

    async fn run_session(&self, image: &ItmImage, captions: &[String]) -> Vec<ItmOutput> {
        let mut model = match self.loader.acquire().await {
            Ok(model) => model,
            Err(e) => {
                warn!(
                    model_id = %self.model_id,
                    "failed to load itm model, using neutral score: {}", e
                );
                return vec![NEUTRAL_ITM_SCORE; captions.len()];
            }
        };

        let mut scores = Vec::with_capacity(captions.len());
        let batch_size = model.batch_size_limit().max(1);

        for chunk in captions.chunks(batch_size) {
            let items = chunk
                .iter()
                .map(|caption| ItmInput {
                    image: image.clone(),
                    caption: caption.clone(),
                })
                .collect();

            match model.process(items).await {
                Ok(results) => {
                    for idx in 0..chunk.len() {
                        let score = match results.get(idx) {
                            Some(Ok(v)) if v.is_finite() => v.clamp(0.0, 1.0),
                            Some(Ok(v)) => {
                                warn!(model_id = %self.model_id, "non finite itm score {}", v);
                                FAILED_ITM_SCORE
                            }
                            Some(Err(e)) => {
                                warn!(model_id = %self.model_id, "itm scoring failed: {}", e);
                                FAILED_ITM_SCORE
                            }
                            None => FAILED_ITM_SCORE,
                        };
                        scores.push(score);
                    }
                }
                Err(e) => {
                    warn!(model_id = %self.model_id, "itm batch failed: {}", e);
                    scores.extend(std::iter::repeat(FAILED_ITM_SCORE).take(chunk.len()));
                }
            }
        }

        scores
    }
}

#[async_trait]
impl<T> ImageTextMatch for ItmScorer<T>
where
    T: Model<Item = ItmInput, Output = ItmOutput> + Send + 'static,
{
    #[tracing::instrument(name = "ItmScorer::score_batch", skip_all, fields(model_id = %self.model_id, captions = captions.len()))]
    async fn score_batch(&self, image: &ItmImage, captions: &[String]) -> Vec<ItmOutput> {
        if captions.is_empty() {
            return vec![];
        }

        let _session = self.session.lock().await;
        let scores = self.run_session(image, captions).await;

        let released = self.loader.release().await;
        debug!(model_id = %self.model_id, released, "itm session finished");

        scores
    }
}
