// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Image files, sent to the vision model

use base64::{engine::general_purpose, Engine as _};
use std::path::Path;
use tracing::debug;

use crate::describer::ContentPayload;
use crate::Result;

const MAX_SIDE: u32 = 1024;

/// Encode the image for the describer, downscaled when it can be decoded
pub fn extract(path: &Path) -> Result<ContentPayload> {
    let data = match prepare_image(path) {
        Ok(data) => data,
        Err(e) => {
            debug!("Sending {:?} undecoded: {}", path, e);
            std::fs::read(path)?
        }
    };

    Ok(ContentPayload::Image {
        base64: general_purpose::STANDARD.encode(&data),
    })
}

/// Resize large images and re-encode as JPEG
fn prepare_image(path: &Path) -> Result<Vec<u8>> {
    let img = image::open(path)?;

    let img = if img.width() > MAX_SIDE || img.height() > MAX_SIDE {
        img.resize(MAX_SIDE, MAX_SIDE, image::imageops::FilterType::Triangle)
    } else {
        img
    };

    // JPEG has no alpha channel
    let rgb = image::DynamicImage::ImageRgb8(img.to_rgb8());

    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    rgb.write_to(&mut cursor, image::ImageFormat::Jpeg)?;

    Ok(buffer)
}
