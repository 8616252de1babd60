use crate::error::{ComparisonError, ComparisonResult};
use base64::Engine;
use image::{ColorType, ImageFormat, ImageReader, RgbImage};
use llm::LLMImageContent;
use serde::Serialize;
use std::{io::Cursor, sync::Arc};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageMetadata {
    pub filename: Option<String>,
    pub format: String,
    pub mime_type: String,
    pub mode: String,
    pub width: u32,
    pub height: u32,
    pub size_bytes: usize,
}

/// An uploaded image, decoded once and shared by every model in a run.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    bytes: Arc<Vec<u8>>,
    rgb: Arc<RgbImage>,
    metadata: ImageMetadata,
}

fn color_mode(color: ColorType) -> &'static str {
    match color {
        ColorType::L8 | ColorType::L16 => "L",
        ColorType::La8 | ColorType::La16 => "LA",
        ColorType::Rgb8 | ColorType::Rgb16 | ColorType::Rgb32F => "RGB",
        ColorType::Rgba8 | ColorType::Rgba16 | ColorType::Rgba32F => "RGBA",
        _ => "unknown",
    }
}

fn format_name(format: ImageFormat) -> String {
    format!("{:?}", format).to_uppercase()
}

pub fn validate_content_type(content_type: Option<&str>) -> ComparisonResult<()> {
    match content_type {
        Some(v) if !v.starts_with("image/") => Err(ComparisonError::InvalidImage(format!(
            "content type {} is not an image",
            v
        ))),
        _ => Ok(()),
    }
}

impl ImagePayload {
    pub fn from_bytes(
        bytes: Vec<u8>,
        filename: Option<&str>,
        content_type: Option<&str>,
    ) -> ComparisonResult<Self> {
        validate_content_type(content_type)?;

        let reader = ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .map_err(|e| ComparisonError::InvalidImage(e.to_string()))?;
        let format = reader.format().ok_or(ComparisonError::InvalidImage(
            "unrecognized image format".to_string(),
        ))?;
        let image = reader
            .decode()
            .map_err(|e| ComparisonError::InvalidImage(e.to_string()))?;

        let metadata = ImageMetadata {
            filename: filename.map(|v| v.to_string()),
            format: format_name(format),
            mime_type: format.to_mime_type().to_string(),
            mode: color_mode(image.color()).to_string(),
            width: image.width(),
            height: image.height(),
            size_bytes: bytes.len(),
        };

        Ok(Self {
            rgb: Arc::new(image.to_rgb8()),
            bytes: Arc::new(bytes),
            metadata,
        })
    }

    pub fn metadata(&self) -> &ImageMetadata {
        &self.metadata
    }

    pub fn rgb(&self) -> Arc<RgbImage> {
        self.rgb.clone()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.bytes.as_slice())
    }

    pub fn to_llm_content(&self) -> LLMImageContent {
        LLMImageContent {
            mime_type: self.metadata.mime_type.clone(),
            data: self.to_base64(),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, image::Rgb([200, 30, 30]));
    let mut bytes = vec![];
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_decode_png() {
        let payload =
            ImagePayload::from_bytes(test_png(8, 6), Some("red.png"), Some("image/png")).unwrap();
        let metadata = payload.metadata();

        assert_eq!(metadata.format, "PNG");
        assert_eq!(metadata.mime_type, "image/png");
        assert_eq!(metadata.mode, "RGB");
        assert_eq!((metadata.width, metadata.height), (8, 6));
        assert_eq!(metadata.filename.as_deref(), Some("red.png"));
        assert_eq!(payload.rgb().dimensions(), (8, 6));

        let content = payload.to_llm_content();
        assert_eq!(content.mime_type, "image/png");
        assert_eq!(
            base64::engine::general_purpose::STANDARD
                .decode(content.data)
                .unwrap(),
            payload.bytes()
        );
    }

    #[test]
    fn test_rejects_non_image() {
        let err = ImagePayload::from_bytes(test_png(2, 2), None, Some("text/plain")).unwrap_err();
        assert!(matches!(err, ComparisonError::InvalidImage(_)));

        let err = ImagePayload::from_bytes(b"definitely not an image".to_vec(), None, None)
            .unwrap_err();
        assert!(matches!(err, ComparisonError::InvalidImage(_)));
    }
}
