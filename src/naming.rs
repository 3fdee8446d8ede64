// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Filename composition from describer output

use chrono::{DateTime, Local};

use crate::config::NamingConfig;
use crate::dispatcher::Category;

/// Timestamp segment of every produced name
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H.%M.%S";

/// Everything needed to name one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamePlan {
    /// Lowercase words separated by single spaces, never underscores
    pub description: String,
    /// Category keyword; `None` when the keyword is only kept as metadata
    pub keyword: Option<String>,
    pub timestamp: String,
    /// Extension without the dot, may be empty
    pub extension: String,
}

impl RenamePlan {
    /// File name for the given collision attempt; attempt 0 is the plain name,
    /// later attempts append `-2`, `-3`, ... after the timestamp.
    pub fn file_name(&self, attempt: u32) -> String {
        let mut name = self.description.clone();
        if let Some(keyword) = &self.keyword {
            name.push('_');
            name.push_str(keyword);
        }
        name.push('_');
        name.push_str(&self.timestamp);
        if attempt > 0 {
            name.push_str(&format!("-{}", attempt + 1));
        }
        if !self.extension.is_empty() {
            name.push('.');
            name.push_str(&self.extension);
        }
        name
    }
}

/// Builds rename plans according to the naming configuration
#[derive(Debug, Clone)]
pub struct NameBuilder {
    config: NamingConfig,
}

impl NameBuilder {
    pub fn new(config: &NamingConfig) -> Self {
        Self { config: config.clone() }
    }

    pub fn plan(
        &self,
        raw_description: &str,
        fallback_stem: &str,
        category: Category,
        taken_at: DateTime<Local>,
        extension: &str,
    ) -> RenamePlan {
        let max_words = self.config.max_words.for_category(category);

        let mut description = sanitize_description(raw_description, max_words);
        if description.is_empty() {
            description = sanitize_description(fallback_stem, max_words);
        }
        if description.is_empty() {
            description = "untitled".to_string();
        }

        let keyword = self.keyword_for(&description, category);

        RenamePlan {
            description,
            keyword: self.config.include_keyword.then_some(keyword),
            timestamp: taken_at.format(TIMESTAMP_FORMAT).to_string(),
            extension: extension.to_lowercase(),
        }
    }

    /// First configured keyword appearing as a word of the description,
    /// otherwise the category's default
    pub fn keyword_for(&self, description: &str, category: Category) -> String {
        self.config
            .keywords
            .iter()
            .map(|k| keyword_token(k))
            .find(|k| !k.is_empty() && description.split(' ').any(|w| w == k))
            .unwrap_or_else(|| category.default_keyword().to_string())
    }
}

/// Turn a free-form describer reply into filename-safe words.
///
/// Lowercases, drops apostrophes, treats every other non-alphanumeric
/// character as a word break and keeps at most `max_words` words.
pub fn sanitize_description(raw: &str, max_words: usize) -> String {
    let text = raw.trim().replace(['\n', '\r'], " ");
    let text = strip_label(&text);

    let cleaned: String = text
        .chars()
        .filter(|c| *c != '\'' && *c != '\u{2019}')
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase();

    cleaned
        .split_whitespace()
        .take(max_words.max(1))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Labels models like to put in front of their answer
const REPLY_LABELS: &[&str] = &[
    "filename", "file name", "name", "title", "description", "caption", "summary",
];

/// Drop a leading `Label:` when the label is a known one; other colons
/// (times, ratios) are left for the word splitter
fn strip_label(text: &str) -> &str {
    let trimmed = text.trim_start_matches(|c: char| c == '"' || c == '*' || c.is_whitespace());
    match trimmed.split_once(':') {
        Some((label, rest)) => {
            let label = label.trim().trim_end_matches('*').to_lowercase();
            if REPLY_LABELS.contains(&label.as_str()) {
                rest
            } else {
                text
            }
        }
        None => text,
    }
}

fn keyword_token(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn taken_at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap()
    }

    #[test]
    fn test_sanitize_strips_punctuation_and_underscores() {
        assert_eq!(
            sanitize_description("  \"Grocery_Receipt -- Trader Joe's!\"  ", 8),
            "grocery receipt trader joes"
        );
        assert_eq!(sanitize_description("Filename: Big   Blue\nWhale", 8), "big blue whale");
    }

    #[test]
    fn test_colons_inside_the_description_are_kept() {
        assert_eq!(
            sanitize_description("Meeting at 10:30 with the design team", 8),
            "meeting at 10 30 with the design team"
        );
        assert_eq!(sanitize_description("Aspect ratio 16:9 wallpaper", 8), "aspect ratio 16 9 wallpaper");
        assert_eq!(sanitize_description("**Title:** Lease renewal", 8), "lease renewal");
        assert_eq!(sanitize_description("NAME: lease", 8), "lease");
    }

    #[test]
    fn test_sanitize_truncates_words() {
        assert_eq!(sanitize_description("one two three four five six", 3), "one two three");
    }

    #[test]
    fn test_plan_matches_naming_pattern() {
        let builder = NameBuilder::new(&NamingConfig::default());
        let plan = builder.plan(
            "A receipt for coffee, beans & filters",
            "IMG_0001",
            Category::Image,
            taken_at(),
            "JPG",
        );

        let name = plan.file_name(0);
        assert_eq!(name, "a receipt for coffee beans_receipt_2025-03-14_09.26.53.jpg");

        // description segment carries no underscore; exactly one separates it
        let (description, rest) = name.split_once('_').unwrap();
        assert!(!description.contains('_'));
        assert!(rest.starts_with("receipt_"));
        assert_eq!(name.matches('_').count(), 3);
    }

    #[test]
    fn test_keyword_can_be_metadata_only() {
        let config = NamingConfig { include_keyword: false, ..NamingConfig::default() };
        let builder = NameBuilder::new(&config);
        let plan = builder.plan("quarterly report", "x", Category::Pdf, taken_at(), "pdf");

        assert_eq!(plan.keyword, None);
        assert_eq!(plan.file_name(0), "quarterly report_2025-03-14_09.26.53.pdf");
        assert_eq!(builder.keyword_for(&plan.description, Category::Pdf), "report");
    }

    #[test]
    fn test_default_keyword_and_fallbacks() {
        let builder = NameBuilder::new(&NamingConfig::default());

        let plan = builder.plan("!!!", "Meeting_Notes-v2", Category::Text, taken_at(), "md");
        assert_eq!(plan.description, "meeting notes v2");
        assert_eq!(plan.keyword.as_deref(), Some("notes"));

        let plan = builder.plan("", "___", Category::Office, taken_at(), "docx");
        assert_eq!(plan.description, "untitled");
        assert_eq!(plan.keyword.as_deref(), Some("document"));
    }

    #[test]
    fn test_collision_attempts_are_distinct() {
        let builder = NameBuilder::new(&NamingConfig::default());
        let plan = builder.plan("sunset", "x", Category::Image, taken_at(), "png");

        assert_eq!(plan.file_name(0), "sunset_image_2025-03-14_09.26.53.png");
        assert_eq!(plan.file_name(1), "sunset_image_2025-03-14_09.26.53-2.png");
        assert_ne!(plan.file_name(1), plan.file_name(2));
    }
}
