// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic image and stream content for the virtual backend

use crate::backends::camera::types::{BackendError, BackendResult, Resolution};
use crate::constants::virtual_camera::{JPEG_QUALITY, MAX_PHOTO_WIDTH};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};

/// Render a colour-bar test pattern and encode it as JPEG
///
/// Zoom narrows the visible slice of the pattern; flash brightens it.
pub fn render_jpeg(resolution: Resolution, zoom: f32, flash: bool) -> BackendResult<Vec<u8>> {
    let (width, height) = scaled_size(resolution);
    let zoom = zoom.max(1.0);
    let boost: u16 = if flash { 60 } else { 0 };

    let image = RgbImage::from_fn(width, height, |x, y| {
        // Sample the pattern around its centre, scaled by zoom
        let u = 0.5 + (x as f32 / width as f32 - 0.5) / zoom;
        let v = 0.5 + (y as f32 / height as f32 - 0.5) / zoom;
        let bar = (u * 8.0).clamp(0.0, 7.0) as u8;
        let shade = (v * 255.0).clamp(0.0, 255.0) as u16;

        let on = |bit: u8| if bar & bit != 0 { 255u16 } else { shade / 4 };
        let channel = |value: u16| (value + boost).min(255) as u8;
        Rgb([channel(on(4)), channel(on(2)), channel(on(1))])
    });

    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY);
    DynamicImage::ImageRgb8(image)
        .write_with_encoder(encoder)
        .map_err(|e| BackendError::Other(format!("JPEG encoding failed: {}", e)))?;
    Ok(bytes)
}

/// Keep aspect ratio, cap the width
fn scaled_size(resolution: Resolution) -> (u32, u32) {
    if resolution.width <= MAX_PHOTO_WIDTH {
        return (resolution.width, resolution.height);
    }
    let height = (resolution.height as u64 * MAX_PHOTO_WIDTH as u64 / resolution.width as u64)
        .max(1) as u32;
    (MAX_PHOTO_WIDTH, height)
}

/// One synthetic recording chunk: frame counter header plus filler
pub fn chunk(frame: u64, size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size.max(8));
    data.extend_from_slice(&frame.to_le_bytes());
    data.extend((8..size).map(|i| (frame as usize + i) as u8));
    data
}
