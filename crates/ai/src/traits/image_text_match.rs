use async_trait::async_trait;
use image::RgbImage;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum ItmImage {
    Rgb(Arc<RgbImage>),
}

impl ItmImage {
    pub fn as_rgb8(&self) -> &RgbImage {
        match self {
            Self::Rgb(image) => image.as_ref(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ItmInput {
    pub image: ItmImage,
    pub caption: String,
}

pub type ItmOutput = f32;

/// Image-text matching as a black box: the probability in `[0, 1]` that a
/// caption describes the image.
#[async_trait]
pub trait ImageTextMatch: Send + Sync {
    /// Scores every caption against the same image within one session.
    /// Never fails, the returned vector has one entry per caption.
    async fn score_batch(&self, image: &ItmImage, captions: &[String]) -> Vec<ItmOutput>;

    async fn score(&self, image: &ItmImage, caption: &str) -> ItmOutput {
        self.score_batch(image, &[caption.to_string()])
            .await
            .into_iter()
            .next()
            .unwrap_or(0.0)
    }
}
