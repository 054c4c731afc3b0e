//! Lossy re-encoding of captured frames before upload.

use crate::error::{RecognitionError, RecognitionResult};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, GenericImageView};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Image encoder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// JPEG quality, 1 to 100.
    pub jpeg_quality: u8,
    /// Frames whose longest side exceeds this are downscaled. 0 disables.
    pub max_side: u32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 80,
            max_side: 640,
        }
    }
}

/// Decodes whatever the camera produced and re-encodes it as a JPEG.
#[derive(Debug, Clone, Default)]
pub struct ImageEncoder {
    config: EncoderConfig,
}

impl ImageEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Re-encodes `bytes` synchronously.
    pub fn encode(&self, bytes: &[u8]) -> RecognitionResult<Vec<u8>> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| RecognitionError::Encode(format!("decoding frame: {e}")))?;

        let (w, h) = img.dimensions();
        let max_side = self.config.max_side;
        let img = if max_side > 0 && w.max(h) > max_side {
            img.resize(max_side, max_side, FilterType::Triangle)
        } else {
            img
        };

        let rgb = img.to_rgb8();
        let mut out = Vec::with_capacity(bytes.len() / 2);
        let quality = self.config.jpeg_quality.clamp(1, 100);
        JpegEncoder::new_with_quality(&mut out, quality)
            .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
            .map_err(|e| RecognitionError::Encode(format!("encoding jpeg: {e}")))?;

        debug!(
            input = bytes.len(),
            output = out.len(),
            width = rgb.width(),
            height = rgb.height(),
            "Re-encoded frame"
        );
        Ok(out)
    }

    /// Re-encodes on the blocking pool.
    pub async fn encode_owned(&self, bytes: Vec<u8>) -> RecognitionResult<Vec<u8>> {
        let encoder = self.clone();
        tokio::task::spawn_blocking(move || encoder.encode(&bytes))
            .await
            .map_err(|e| RecognitionError::Encode(format!("encoder task failed: {e}")))?
    }
}
