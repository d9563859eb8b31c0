//! # QR Output
//!
//! Renders payloads as scannable codes for display, download or print. This
//! is the write side of what [`scanner::QrDecoder`](crate::scanner::QrDecoder)
//! reads.

use image::{GrayImage, ImageFormat, Luma};
use qrcode::render::unicode::Dense1x2;
use qrcode::QrCode;
use std::path::Path;
use thiserror::Error;

use crate::config;
use crate::intent::TransactionIntent;

#[derive(Debug, Error)]
pub enum QrError {
    #[error("payload cannot be encoded as a QR code: {0}")]
    Encode(String),

    #[error("failed to write QR image: {0}")]
    Image(#[from] image::ImageError),
}

/// How an intent is written into the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadEncoding {
    /// `{"subjectId":"…","counterpartId":"…"}`
    #[default]
    Structured,
    /// `subject:counterpart`
    Delimited,
}

/// The text to put in a code for `intent`.
pub fn encode_payload(intent: &TransactionIntent, encoding: PayloadEncoding) -> String {
    match encoding {
        PayloadEncoding::Structured => serde_json::json!({
            "subjectId": intent.subject_id(),
            "counterpartId": intent.counterpart_id(),
        })
        .to_string(),
        PayloadEncoding::Delimited => intent.to_string(),
    }
}

fn code_for(payload: &str) -> Result<QrCode, QrError> {
    QrCode::new(payload.as_bytes()).map_err(|e| QrError::Encode(e.to_string()))
}

/// Renders a greyscale image with the standard quiet zone.
pub fn render_image(payload: &str) -> Result<GrayImage, QrError> {
    Ok(code_for(payload)?
        .render::<Luma<u8>>()
        .min_dimensions(config::QR_MIN_DIMENSION, config::QR_MIN_DIMENSION)
        .build())
}

/// Writes the code as a PNG file.
pub fn render_png(payload: &str, path: &Path) -> Result<(), QrError> {
    render_image(payload)?.save_with_format(path, ImageFormat::Png)?;
    tracing::info!(path = %path.display(), "QR image written");
    Ok(())
}

/// Renders the code with half-block characters for a terminal.
pub fn render_terminal(payload: &str) -> Result<String, QrError> {
    Ok(code_for(payload)?
        .render::<Dense1x2>()
        .dark_color(Dense1x2::Light)
        .light_color(Dense1x2::Dark)
        .build())
}
