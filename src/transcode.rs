//! Normalises provider output to PNG before it becomes an artifact.

use crate::error::ProviderFailure;
use crate::mime::{detect_image_mime, PNG};
use image::ImageFormat;
use std::io::Cursor;

/// PNG input is returned untouched; anything else is decoded and re-encoded.
pub fn to_png_sync(bytes: Vec<u8>) -> Result<Vec<u8>, ProviderFailure> {
    if detect_image_mime(&bytes) == Some(PNG) {
        return Ok(bytes);
    }

    let image = image::load_from_memory(&bytes)
        .map_err(|e| ProviderFailure::Undecodable(e.to_string()))?;
    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| ProviderFailure::Undecodable(e.to_string()))?;

    tracing::debug!(
        "Transcoded {} bytes of {} to {} bytes of PNG",
        bytes.len(),
        detect_image_mime(&bytes).unwrap_or("unknown data"),
        png.len()
    );
    Ok(png)
}

/// Runs [`to_png_sync`] on the blocking pool.
pub async fn to_png(bytes: Vec<u8>) -> Result<Vec<u8>, ProviderFailure> {
    tokio::task::spawn_blocking(move || to_png_sync(bytes))
        .await
        .map_err(|e| ProviderFailure::Undecodable(format!("transcode task join error: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(format: ImageFormat) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(12, 8, image::Rgb([180, 90, 40]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        bytes
    }

    #[test]
    fn test_png_passes_through_unchanged() {
        let png = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00];
        assert_eq!(to_png_sync(png.clone()).unwrap(), png);
    }

    #[tokio::test]
    async fn test_jpeg_is_reencoded_as_png() {
        let jpeg = encode(ImageFormat::Jpeg);
        assert_eq!(detect_image_mime(&jpeg), Some("image/jpeg"));

        let png = to_png(jpeg).await.unwrap();
        assert_eq!(detect_image_mime(&png), Some(PNG));

        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (12, 8));
    }

    #[test]
    fn test_gif_is_reencoded_as_png() {
        let png = to_png_sync(encode(ImageFormat::Gif)).unwrap();
        assert_eq!(detect_image_mime(&png), Some(PNG));
    }

    #[test]
    fn test_undecodable_payload_is_provider_failure() {
        let err = to_png_sync(vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x01]).unwrap_err();
        assert!(matches!(err, ProviderFailure::Undecodable(_)));

        let err = to_png_sync(b"not an image at all".to_vec()).unwrap_err();
        assert!(matches!(err, ProviderFailure::Undecodable(_)));
    }
}
