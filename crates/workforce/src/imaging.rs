//! Image normalisation, group-mode cropping, and stored-image key layout.

use crate::attendance::PunchType;
use attend_core::{Error, Result};
use chrono::{DateTime, Utc};
use image::{imageops::FilterType, DynamicImage, ImageFormat};
use std::io::Cursor;

/// Side length of re-encoded face crops sent to the gallery search.
pub const CROP_SIZE: u32 = 600;
/// Fractional padding applied around a detected face box before cropping.
pub const CROP_PADDING: f32 = 0.25;

/// A detected face's bounding box as fractions of the frame, the shape face
/// services report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// Pixel-space crop rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Decodes the upload and applies EXIF orientation so downstream face
/// operations see an upright pixel buffer.
pub fn normalize(bytes: &[u8]) -> Result<DynamicImage> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| Error::validation("Invalid image data").with_details(e.to_string()))?;

    Ok(match exif_orientation(bytes) {
        Some(2) => img.fliph(),
        Some(3) => img.rotate180(),
        Some(4) => img.flipv(),
        Some(5) => img.rotate90().fliph(),
        Some(6) => img.rotate90(),
        Some(7) => img.rotate270().fliph(),
        Some(8) => img.rotate270(),
        _ => img,
    })
}

fn exif_orientation(bytes: &[u8]) -> Option<u32> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .ok()?;
    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
}

/// Expands a fractional face box by [`CROP_PADDING`] on every side and clips
/// it to the frame.
pub fn padded_crop_rect(face: &FaceBox, frame_width: u32, frame_height: u32) -> CropRect {
    let fw = frame_width as f32;
    let fh = frame_height as f32;

    let pad_x = face.width * CROP_PADDING;
    let pad_y = face.height * CROP_PADDING;

    let left = ((face.left - pad_x) * fw).max(0.0);
    let top = ((face.top - pad_y) * fh).max(0.0);
    let right = ((face.left + face.width + pad_x) * fw).min(fw);
    let bottom = ((face.top + face.height + pad_y) * fh).min(fh);

    CropRect {
        x: left as u32,
        y: top as u32,
        width: ((right - left).max(1.0)) as u32,
        height: ((bottom - top).max(1.0)) as u32,
    }
}

/// Crops one face out of the frame and re-encodes it at the gallery search
/// size.
pub fn crop_face(frame: &DynamicImage, face: &FaceBox) -> Result<Vec<u8>> {
    let rect = padded_crop_rect(face, frame.width(), frame.height());
    let crop = frame.crop_imm(rect.x, rect.y, rect.width, rect.height);
    let resized = crop.resize_exact(CROP_SIZE, CROP_SIZE, FilterType::Triangle);
    encode_jpeg(&resized)
}

pub fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    img.to_rgb8()
        .write_to(&mut out, ImageFormat::Jpeg)
        .map_err(|e| Error::internal("Failed to encode image").with_details(e.to_string()))?;
    Ok(out.into_inner())
}

/// Lowercased, ascii-only, non-alphanumerics collapsed to single dashes.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut last_dash = true;
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("unknown");
    }
    slug
}

/// Deterministic object key for a punch image:
/// `YYYY/MM/DD/<emp-slug>/<location-slug>/<punch>_<capture-ts>_<location-slug>.jpg`.
/// Retries carry a fresh capture timestamp and therefore a fresh key.
pub fn punch_image_key(
    date_prefix: &str,
    employee_name: &str,
    location: Option<&str>,
    punch: PunchType,
    captured_at: DateTime<Utc>,
) -> String {
    let emp_slug = slugify(employee_name);
    let loc_slug = slugify(location.unwrap_or("unknown-location"));
    format!(
        "{}/{}/{}/{}_{}_{}.jpg",
        date_prefix,
        emp_slug,
        loc_slug,
        punch.key_fragment(),
        captured_at.format("%Y%m%dT%H%M%S"),
        loc_slug
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn slugify_folds_and_collapses() {
        assert_eq!(slugify("Ravi Kumar"), "ravi-kumar");
        assert_eq!(slugify("  MG Road, Sector 7 "), "mg-road-sector-7");
        assert_eq!(slugify("A__B--C"), "a-b-c");
        assert_eq!(slugify("!!!"), "unknown");
    }

    #[test]
    fn punch_image_key_shape() {
        let at = Utc.with_ymd_and_hms(2023, 6, 15, 10, 30, 45).unwrap();
        let key = punch_image_key(
            "2023/06/15",
            "Ravi Kumar",
            Some("MG Road"),
            PunchType::In,
            at,
        );
        assert_eq!(
            key,
            "2023/06/15/ravi-kumar/mg-road/in_20230615T103045_mg-road.jpg"
        );
    }

    #[test]
    fn missing_location_uses_placeholder_slug() {
        let at = Utc.with_ymd_and_hms(2023, 6, 15, 10, 30, 45).unwrap();
        let key = punch_image_key("2023/06/15", "Asha", None, PunchType::Out, at);
        assert!(key.contains("/unknown-location/"));
        assert!(key.starts_with("2023/06/15/asha/"));
        assert!(key.ends_with("_unknown-location.jpg"));
    }

    #[test]
    fn padded_crop_expands_by_quarter() {
        let face = FaceBox {
            left: 0.4,
            top: 0.4,
            width: 0.2,
            height: 0.2,
        };
        let rect = padded_crop_rect(&face, 1000, 1000);
        assert_eq!(rect.x, 350);
        assert_eq!(rect.y, 350);
        assert_eq!(rect.width, 300);
        assert_eq!(rect.height, 300);
    }

    #[test]
    fn padded_crop_clips_to_frame() {
        let face = FaceBox {
            left: 0.0,
            top: 0.0,
            width: 0.4,
            height: 0.4,
        };
        let rect = padded_crop_rect(&face, 800, 600);
        assert_eq!(rect.x, 0);
        assert_eq!(rect.y, 0);
        // Right/bottom edges padded but clipped at the frame bounds.
        assert_eq!(rect.width, 400);
        assert_eq!(rect.height, 300);
    }

    #[test]
    fn crop_face_emits_square_jpeg() {
        let frame = DynamicImage::new_rgb8(640, 480);
        let face = FaceBox {
            left: 0.25,
            top: 0.25,
            width: 0.5,
            height: 0.5,
        };
        let bytes = crop_face(&frame, &face).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.width(), CROP_SIZE);
        assert_eq!(decoded.height(), CROP_SIZE);
    }

    #[test]
    fn normalize_rejects_garbage() {
        let err = normalize(b"definitely not an image").unwrap_err();
        assert_eq!(err.http_status(), 400);
    }
}
