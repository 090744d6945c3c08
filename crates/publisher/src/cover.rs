//! Cover images
//!
//! Either validates an author upload (JPEG, PNG or WEBP under the configured
//! size limit) or generates abstract cover art seeded from the title and
//! author, so the same article always gets the same cover.

use crate::pipeline::{CoverArtifact, CoverSource};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scholarmint_common::errors::{AppError, Result};
use sha2::{Digest, Sha256};
use std::io::Cursor;
use tracing::debug;

pub const COVER_WIDTH: u32 = 600;
pub const COVER_HEIGHT: u32 = 800;

const PALETTES: [[[u8; 3]; 3]; 5] = [
    [[18, 24, 56], [120, 40, 140], [250, 190, 70]],
    [[10, 50, 60], [40, 150, 140], [240, 230, 200]],
    [[60, 12, 20], [200, 60, 50], [250, 220, 160]],
    [[20, 20, 24], [90, 90, 110], [230, 90, 60]],
    [[30, 60, 30], [150, 180, 80], [250, 245, 220]],
];

/// Check an uploaded cover and read its dimensions
pub fn validate_upload(bytes: Vec<u8>, max_bytes: usize) -> Result<CoverArtifact> {
    if bytes.len() > max_bytes {
        return Err(AppError::PayloadTooLarge {
            size: bytes.len(),
            limit: max_bytes,
        });
    }

    let format = image::guess_format(&bytes).map_err(|_| AppError::InvalidFormat {
        message: "Cover must be a JPEG, PNG or WEBP image".to_string(),
    })?;

    let mime = match format {
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Png => "image/png",
        ImageFormat::WebP => "image/webp",
        other => {
            return Err(AppError::InvalidFormat {
                message: format!("Unsupported cover format {:?}; use JPEG, PNG or WEBP", other),
            })
        }
    };

    let decoded = image::load_from_memory_with_format(&bytes, format).map_err(|e| {
        AppError::InvalidFormat {
            message: format!("Cover image could not be decoded: {}", e),
        }
    })?;

    debug!(mime, width = decoded.width(), height = decoded.height(), "Accepted cover upload");

    Ok(CoverArtifact {
        width: decoded.width(),
        height: decoded.height(),
        bytes,
        mime: mime.to_string(),
        source: CoverSource::Uploaded,
    })
}

/// Generate a PNG cover from the title and author
pub fn generate_cover(title: &str, author: &str) -> Result<CoverArtifact> {
    let seed: [u8; 32] = Sha256::new()
        .chain_update(title.trim().as_bytes())
        .chain_update([0u8])
        .chain_update(author.trim().as_bytes())
        .finalize()
        .into();
    let mut rng = StdRng::from_seed(seed);

    let palette = PALETTES[rng.gen_range(0..PALETTES.len())];
    let mut img = RgbImage::new(COVER_WIDTH, COVER_HEIGHT);

    // Vertical gradient between the first two palette colors
    for y in 0..COVER_HEIGHT {
        let t = y as f32 / (COVER_HEIGHT - 1) as f32;
        let row = mix(palette[0], palette[1], t);
        for x in 0..COVER_WIDTH {
            img.put_pixel(x, y, Rgb(row));
        }
    }

    let circles = rng.gen_range(4..9);
    for _ in 0..circles {
        let cx = rng.gen_range(0..COVER_WIDTH) as f32;
        let cy = rng.gen_range(0..COVER_HEIGHT * 3 / 4) as f32;
        let radius = rng.gen_range(40..180) as f32;
        let alpha = rng.gen_range(0.15..0.45);
        let color = if rng.gen_bool(0.5) { palette[2] } else { palette[1] };
        blend_circle(&mut img, cx, cy, radius, color, alpha);
    }

    // Title band
    let band_top = COVER_HEIGHT * 3 / 4;
    for y in band_top..band_top + 6 {
        for x in 40..COVER_WIDTH - 40 {
            img.put_pixel(x, y, Rgb(palette[2]));
        }
    }

    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| AppError::Render {
            message: format!("Cover encoding failed: {}", e),
        })?;

    debug!(size = bytes.len(), circles, "Generated cover");

    Ok(CoverArtifact {
        bytes,
        mime: "image/png".to_string(),
        width: COVER_WIDTH,
        height: COVER_HEIGHT,
        source: CoverSource::Generated,
    })
}

fn mix(a: [u8; 3], b: [u8; 3], t: f32) -> [u8; 3] {
    let lerp = |x: u8, y: u8| (x as f32 + (y as f32 - x as f32) * t).round().clamp(0.0, 255.0) as u8;
    [lerp(a[0], b[0]), lerp(a[1], b[1]), lerp(a[2], b[2])]
}

fn blend_circle(img: &mut RgbImage, cx: f32, cy: f32, radius: f32, color: [u8; 3], alpha: f32) {
    let x0 = (cx - radius).max(0.0) as u32;
    let x1 = ((cx + radius) as u32).min(img.width() - 1);
    let y0 = (cy - radius).max(0.0) as u32;
    let y1 = ((cy + radius) as u32).min(img.height() - 1);

    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            if dx * dx + dy * dy <= radius * radius {
                let pixel = img.get_pixel_mut(x, y);
                pixel.0 = mix(pixel.0, color, alpha);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_generated_cover_is_deterministic() {
        let a = generate_cover("Krump as Research", "Tight Eyez").unwrap();
        let b = generate_cover("Krump as Research", "Tight Eyez").unwrap();
        assert_eq!(a.bytes, b.bytes);
        assert_eq!(a.mime, "image/png");
        assert_eq!((a.width, a.height), (COVER_WIDTH, COVER_HEIGHT));
        assert_eq!(a.source, CoverSource::Generated);
    }

    #[test]
    fn test_generated_cover_varies_by_title() {
        let a = generate_cover("Stomps", "Anonymous").unwrap();
        let b = generate_cover("Arm Swings", "Anonymous").unwrap();
        assert_ne!(a.bytes, b.bytes);
    }

    #[test]
    fn test_generated_cover_decodes() {
        let cover = generate_cover("Krump", "Anonymous").unwrap();
        let validated = validate_upload(cover.bytes, 5 * 1024 * 1024).unwrap();
        assert_eq!(validated.width, COVER_WIDTH);
        assert_eq!(validated.source, CoverSource::Uploaded);
    }

    #[test]
    fn test_upload_accepts_png() {
        let cover = validate_upload(png(32, 48), 1024 * 1024).unwrap();
        assert_eq!(cover.mime, "image/png");
        assert_eq!((cover.width, cover.height), (32, 48));
        assert_eq!(cover.extension(), "png");
    }

    #[test]
    fn test_upload_too_large() {
        let bytes = png(32, 32);
        let limit = bytes.len() - 1;
        assert!(matches!(
            validate_upload(bytes, limit),
            Err(AppError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_upload_rejects_non_images() {
        assert!(matches!(
            validate_upload(b"%PDF-1.5 not an image".to_vec(), 1024),
            Err(AppError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_upload_rejects_gif() {
        let mut gif = b"GIF89a".to_vec();
        gif.extend_from_slice(&[0u8; 16]);
        assert!(matches!(
            validate_upload(gif, 1024),
            Err(AppError::InvalidFormat { .. })
        ));
    }
}
