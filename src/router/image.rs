//! Local image re-encoding for inline vision requests.

use std::io::Cursor;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

use crate::config::ImageConfig;
use crate::error::ImageError;

/// A JPEG ready to embed in a request.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub data_url: String,
    pub width: u32,
    pub height: u32,
    pub byte_len: usize,
}

/// Re-encode on the blocking pool so the event loop keeps serving others.
pub async fn reencode(bytes: Arc<[u8]>, config: ImageConfig) -> Result<EncodedImage, ImageError> {
    tokio::task::spawn_blocking(move || reencode_blocking(&bytes, &config))
        .await
        .map_err(|e| ImageError::Worker(e.to_string()))?
}

/// Decode, convert to RGB, shrink to the configured long edge and encode as
/// JPEG. Images already within bounds keep their size.
pub fn reencode_blocking(bytes: &[u8], config: &ImageConfig) -> Result<EncodedImage, ImageError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| ImageError::Decode(e.to_string()))?;
    let rgb = decoded.to_rgb8();
    let (width, height) = fit_within(rgb.width(), rgb.height(), config.max_edge);

    let resized = if (width, height) == rgb.dimensions() {
        rgb
    } else {
        tracing::debug!(
            from = ?rgb.dimensions(),
            to = ?(width, height),
            "Downscaling image"
        );
        image::imageops::resize(&rgb, width, height, FilterType::Lanczos3)
    };

    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, config.quality)
        .encode_image(&resized)
        .map_err(|e| ImageError::Encode(e.to_string()))?;
    let jpeg = buf.into_inner();

    Ok(EncodedImage {
        data_url: format!("data:image/jpeg;base64,{}", BASE64.encode(&jpeg)),
        width,
        height,
        byte_len: jpeg.len(),
    })
}

/// Scale `(width, height)` down so the long edge is at most `max_edge`,
/// keeping the aspect ratio. Never scales up.
fn fit_within(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    let long = width.max(height);
    if long <= max_edge || long == 0 {
        return (width, height);
    }
    let scale = f64::from(max_edge) / f64::from(long);
    let scaled = |side: u32| ((f64::from(side) * scale).round() as u32).clamp(1, max_edge);
    (scaled(width), scaled(height))
}
