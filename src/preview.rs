// src/preview.rs
//
// JPEG encoding for the periodic base64 previews attached to frame records
// and for the MJPEG output sink. Quality 50 keeps preview payloads small
// enough for live streaming consumers.

use anyhow::{ensure, Context, Result};
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

pub const PREVIEW_JPEG_QUALITY: u8 = 50;

/// Encode raw RGB8 pixels as JPEG.
pub fn encode_jpeg(pixels: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>> {
    ensure!(
        pixels.len() == width as usize * height as usize * 3,
        "pixel buffer is {} bytes, expected {}x{}x3",
        pixels.len(),
        width,
        height
    );

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality)
        .encode(pixels, width, height, ExtendedColorType::Rgb8)
        .context("JPEG encoding failed")?;
    Ok(jpeg)
}

/// Base64 JPEG payload for a frame record's `image` field.
pub fn encode_preview(pixels: &[u8], width: u32, height: u32) -> Result<String> {
    let jpeg = encode_jpeg(pixels, width, height, PREVIEW_JPEG_QUALITY)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(jpeg))
}
