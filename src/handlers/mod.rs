// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Per-category content extraction

pub mod image;
pub mod office;
pub mod pdf;
pub mod text;

use std::path::Path;

use crate::describer::ContentPayload;
use crate::dispatcher::Category;
use crate::Result;

/// Extract the payload handed to the describer for a file of `category`
pub fn extract(category: Category, path: &Path, excerpt_chars: usize) -> Result<ContentPayload> {
    match category {
        Category::Image => image::extract(path),
        Category::Pdf => pdf::extract(path).map(|t| excerpt(&t, excerpt_chars)),
        Category::Text => text::extract(path).map(|t| excerpt(&t, excerpt_chars)),
        Category::Office => office::extract(path).map(|t| excerpt(&t, excerpt_chars)),
    }
}

/// Content hash recorded alongside successful renames
pub fn content_hash(path: &Path) -> Result<String> {
    let data = std::fs::read(path)?;
    Ok(blake3::hash(&data).to_hex().to_string())
}

/// Collapse whitespace and cut to at most `max_chars` characters
fn excerpt(text: &str, max_chars: usize) -> ContentPayload {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let excerpt = if collapsed.chars().count() > max_chars {
        let mut cut: String = collapsed.chars().take(max_chars).collect();
        cut.push_str("...");
        cut
    } else {
        collapsed
    };
    ContentPayload::Text { excerpt }
}
