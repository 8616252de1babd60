mod output;
mod preprocess;

pub use output::ItmOutputContract;
pub use preprocess::preprocess_rgb8_image;

use crate::{blocking::run_blocking, ItmInput, ItmOutput, Model};
use anyhow::{anyhow, bail};
use ndarray::{Array2, Axis};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokenizers::Tokenizer;
use tracing::debug;

// BLIP text encoder position embeddings
const MAX_TEXT_LENGTH: usize = 512;
const INTRA_THREADS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum BlipItmModel {
    BaseCoco,
    LargeCoco,
}

impl BlipItmModel {
    /// (model uri, tokenizer uri) relative to the resources dir
    pub fn model_uri(self) -> (PathBuf, PathBuf) {
        let dir = match self {
            Self::BaseCoco => "blip-itm-base-coco",
            Self::LargeCoco => "blip-itm-large-coco",
        };

        (
            Path::new(dir).join("model.onnx"),
            Path::new(dir).join("tokenizer.json"),
        )
    }

    /// Whether weights and tokenizer are on disk or can be downloaded.
    pub fn resources_available(
        self,
        resources_dir: impl AsRef<Path>,
        download_url: Option<&str>,
    ) -> bool {
        let (model_uri, tokenizer_uri) = self.model_uri();
        let download = file_downloader::FileDownload::new(resources_dir.as_ref(), download_url);
        download.can_provide(model_uri) && download.can_provide(tokenizer_uri)
    }
}

/// BLIP image-text matching head exported to ONNX.
///
/// Inputs are `pixel_values`, `input_ids` and `attention_mask`; the output
/// tensor is read according to the configured [`ItmOutputContract`].
/// Session creation and every forward pass run on the blocking pool.
pub struct BlipItm {
    inner: Arc<BlipItmSession>,
}

struct BlipItmSession {
    session: ::ort::Session,
    tokenizer: Tokenizer,
    contract: ItmOutputContract,
}

impl Model for BlipItm {
    type Item = ItmInput;
    type Output = ItmOutput;

    fn batch_size_limit(&self) -> usize {
        1
    }

    async fn process(
        &mut self,
        items: Vec<Self::Item>,
    ) -> anyhow::Result<Vec<anyhow::Result<Self::Output>>> {
        if items.len() > self.batch_size_limit() {
            bail!("too many items");
        }

        let inner = self.inner.clone();
        run_blocking(move || {
            Ok(items
                .iter()
                .map(|item| inner.get_match_probability(item))
                .collect())
        })
        .await
    }
}

impl BlipItm {
    pub async fn new(
        model: BlipItmModel,
        resources_dir: impl AsRef<Path>,
        download_url: Option<String>,
        contract: ItmOutputContract,
    ) -> anyhow::Result<Self> {
        let (model_uri, tokenizer_uri) = model.model_uri();

        let download =
            file_downloader::FileDownload::new(resources_dir.as_ref(), download_url.as_deref());
        let mut paths = download
            .ensure_all(&[model_uri, tokenizer_uri])
            .await?
            .into_iter();
        let (Some(model_path), Some(tokenizer_path)) = (paths.next(), paths.next()) else {
            bail!("unexpected number of downloaded resources");
        };

        run_blocking(move || Self::from_file(model_path, tokenizer_path, contract)).await
    }

    pub fn from_file(
        model_path: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        contract: ItmOutputContract,
    ) -> anyhow::Result<Self> {
        let session = ::ort::Session::builder()?
            .with_intra_threads(INTRA_THREADS)?
            .with_optimization_level(::ort::GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path)?;

        let mut tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow!("failed to initialize tokenizer: {}", e))?;
        let truncation = tokenizers::utils::truncation::TruncationParams {
            max_length: MAX_TEXT_LENGTH,
            ..Default::default()
        };
        tokenizer
            .with_truncation(Some(truncation))
            .map_err(|e| anyhow!("failed to set truncation: {}", e))?;

        Ok(Self {
            inner: Arc::new(BlipItmSession {
                session,
                tokenizer,
                contract,
            }),
        })
    }
}

impl BlipItmSession {
    fn get_match_probability(&self, item: &ItmInput) -> anyhow::Result<ItmOutput> {
        debug!(
            "itm scoring caption of {} chars",
            item.caption.chars().count()
        );

        let pixel_values = preprocess_rgb8_image(item.image.as_rgb8()).insert_axis(Axis(0));

        let encoding = self
            .tokenizer
            .encode(item.caption.as_str(), true)
            .map_err(|e| anyhow!(e))?;
        let ids: Vec<i64> = encoding.get_ids().iter().map(|v| *v as i64).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|v| *v as i64)
            .collect();
        let len = ids.len();
        let input_ids = Array2::from_shape_vec((1, len), ids)?;
        let attention_mask = Array2::from_shape_vec((1, len), attention_mask)?;

        let outputs = self.session.run(::ort::inputs![
            "pixel_values" => pixel_values.view(),
            "input_ids" => input_ids.view(),
            "attention_mask" => attention_mask.view(),
        ]?)?;

        let output = outputs
            .get(self.contract.output_name())
            .ok_or(anyhow!("output {} not found", self.contract.output_name()))?
            .try_extract_tensor::<f32>()?;

        let probability = self.contract.extract(output.view())?;
        debug!("itm match probability: {:.4}", probability);

        Ok(probability)
    }
}
