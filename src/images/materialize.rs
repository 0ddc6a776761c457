//! Download and normalise the selected image.
//!
//! Every stored image is a baseline RGB JPEG at a fixed quality. Images
//! with an alpha channel (including palette images, which the decoder
//! expands to RGBA) are composited over white first. The file is written
//! under a temporary name and renamed into place, so a failed run never
//! leaves a partial `image.jpg` behind.

use crate::http::{FetchError, Fetcher};
use crate::models::MaterializedImage;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageError, RgbImage};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{info, instrument};

pub const JPEG_EXTENSION: &str = "jpg";

#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    #[error("download failed: {0}")]
    Download(#[from] FetchError),
    #[error("could not decode image: {0}")]
    Decode(#[source] ImageError),
    #[error("could not encode JPEG: {0}")]
    Encode(#[source] ImageError),
    #[error("could not write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("image worker panicked")]
    Worker(#[from] tokio::task::JoinError),
}

pub struct ImageMaterializer {
    fetcher: Arc<dyn Fetcher>,
    quality: u8,
}

impl ImageMaterializer {
    pub fn new(fetcher: Arc<dyn Fetcher>, quality: u8) -> Self {
        Self {
            fetcher,
            quality: quality.clamp(1, 100),
        }
    }

    /// Fetch `url` and store it as `<dest_dir>/<file_stem>.jpg`.
    #[instrument(level = "info", skip_all, fields(%url, dest = %dest_dir.display()))]
    pub async fn materialize(
        &self,
        url: &str,
        dest_dir: &Path,
        file_stem: &str,
    ) -> Result<MaterializedImage, MaterializeError> {
        let bytes = self.fetcher.get(url).await?.body;
        let quality = self.quality;
        let (jpeg, width, height) = tokio::task::spawn_blocking(move || reencode(&bytes, quality)).await??;

        let path = dest_dir.join(format!("{file_stem}.{JPEG_EXTENSION}"));
        let partial = dest_dir.join(format!("{file_stem}.{JPEG_EXTENSION}.part"));
        let write_err = |source| MaterializeError::Write {
            path: path.display().to_string(),
            source,
        };

        if let Err(e) = fs::write(&partial, &jpeg).await {
            let _ = fs::remove_file(&partial).await;
            return Err(write_err(e));
        }
        if let Err(e) = fs::rename(&partial, &path).await {
            let _ = fs::remove_file(&partial).await;
            return Err(write_err(e));
        }

        info!(path = %path.display(), width, height, bytes = jpeg.len(), "Stored image");
        Ok(MaterializedImage {
            path,
            encoding: "jpeg",
            quality,
            width,
            height,
        })
    }
}

/// Decode any supported format and re-encode as RGB JPEG.
pub fn reencode(bytes: &[u8], quality: u8) -> Result<(Vec<u8>, u32, u32), MaterializeError> {
    let decoded = image::load_from_memory(bytes).map_err(MaterializeError::Decode)?;
    let rgb = flatten(decoded);
    let (width, height) = rgb.dimensions();

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(&rgb)
        .map_err(MaterializeError::Encode)?;
    Ok((out, width, height))
}

/// Drop alpha by compositing over an opaque white background.
fn flatten(img: DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = u16::from(a);
        let blend = |c: u8| ((u16::from(c) * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}
