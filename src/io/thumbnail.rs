//! Accident still encoding - small JPEG thumbnails for the incident viewer

use crate::domain::types::Frame;
use anyhow::{bail, Context};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;

/// Thumbnail height in pixels; width keeps the frame's aspect ratio
pub const THUMBNAIL_HEIGHT: u32 = 50;

const JPEG_QUALITY: u8 = 85;

/// Resize a BGR frame to thumbnail height and encode as JPEG
pub fn encode_thumbnail(frame: &Frame) -> anyhow::Result<Vec<u8>> {
    if frame.width == 0 || frame.height == 0 {
        bail!("cannot encode empty frame");
    }
    let rgb: Vec<u8> = frame.data.chunks_exact(3).flat_map(|px| [px[2], px[1], px[0]]).collect();
    let img = RgbImage::from_raw(frame.width, frame.height, rgb)
        .context("frame buffer does not match its dimensions")?;

    let scale = THUMBNAIL_HEIGHT as f64 / frame.height as f64;
    let width = ((frame.width as f64 * scale) as u32).max(1);
    let thumb = imageops::resize(&img, width, THUMBNAIL_HEIGHT, FilterType::Triangle);

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode_image(&thumb)
        .context("JPEG encoding failed")?;
    Ok(out)
}

/// Thumbnail of a black 100x100 frame, stored when no real frame exists
pub fn placeholder_thumbnail() -> Vec<u8> {
    encode_thumbnail(&Frame::black(100, 100)).unwrap_or_default()
}
