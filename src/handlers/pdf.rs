// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! PDF documents

use std::path::Path;

use crate::{Result, SmartParseError};

/// Extract text from PDF
pub fn extract(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let text = pdf_extract::extract_text_from_mem(&bytes)
        .map_err(|e| SmartParseError::Pdf(format!("Text extraction failed: {}", e)))?;

    if text.trim().is_empty() {
        return Err(SmartParseError::Pdf("No extractable text".to_string()));
    }
    Ok(text)
}
