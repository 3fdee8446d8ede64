// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Extension classification and describer request construction

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::AppConfig;
use crate::describer::{ContentPayload, DescribeRequest};
use crate::task::{FileTask, TaskState};
use crate::{Result, SmartParseError};

/// Content class of a supported file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Image,
    Pdf,
    Text,
    Office,
}

impl Category {
    pub const ALL: [Category; 4] = [Category::Image, Category::Pdf, Category::Text, Category::Office];

    /// Destination subfolder under the output root
    pub fn folder(&self) -> &'static str {
        match self {
            Category::Image => "images",
            Category::Pdf => "pdfs",
            Category::Text => "text",
            Category::Office => "office",
        }
    }

    /// Keyword used when the description names none of the configured ones
    pub fn default_keyword(&self) -> &'static str {
        match self {
            Category::Image => "image",
            Category::Pdf | Category::Office => "document",
            Category::Text => "note",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Image => "image",
            Category::Pdf => "pdf",
            Category::Text => "text",
            Category::Office => "office",
        };
        f.write_str(name)
    }
}

/// The single extension lookup table
const EXTENSIONS: &[(&str, Category)] = &[
    ("jpg", Category::Image),
    ("jpeg", Category::Image),
    ("png", Category::Image),
    ("webp", Category::Image),
    ("gif", Category::Image),
    ("bmp", Category::Image),
    ("tiff", Category::Image),
    ("tif", Category::Image),
    ("pdf", Category::Pdf),
    ("txt", Category::Text),
    ("md", Category::Text),
    ("markdown", Category::Text),
    ("csv", Category::Text),
    ("rst", Category::Text),
    ("json", Category::Text),
    ("log", Category::Text),
    ("docx", Category::Office),
    ("xlsx", Category::Office),
    ("pptx", Category::Office),
    ("odt", Category::Office),
    ("ods", Category::Office),
    ("odp", Category::Office),
];

/// Look up the category for a lowercase extension
pub fn category_for(extension: &str) -> Option<Category> {
    EXTENSIONS
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, category)| *category)
}

/// Routes ready tasks to a category and builds their description requests
pub struct Dispatcher {
    config: AppConfig,
}

impl Dispatcher {
    pub fn new(config: &AppConfig) -> Self {
        Self { config: config.clone() }
    }

    /// Resolve a task's category, or fail with `UnsupportedType`.
    ///
    /// Legacy binary office formats (doc, xls, ppt, rtf) are not in the
    /// table and fail here like any unknown extension.
    pub fn classify(&self, task: &mut FileTask) -> Result<Category> {
        match category_for(&task.extension) {
            Some(category) => {
                task.category = Some(category);
                Ok(category)
            }
            None => Err(SmartParseError::UnsupportedType(task.extension.clone())),
        }
    }

    /// Classify a ready task and advance it to Dispatched
    pub fn dispatch(&self, task: &mut FileTask) -> Result<Category> {
        let category = self.classify(task)?;
        task.advance(TaskState::Dispatched);
        Ok(category)
    }

    /// Word budget for a category's descriptions
    pub fn max_words(&self, category: Category) -> usize {
        self.config.naming.max_words.for_category(category)
    }

    /// Build the request handed to the content describer
    pub fn request(&self, task: &FileTask, category: Category, payload: ContentPayload) -> DescribeRequest {
        DescribeRequest {
            path: task.path.clone(),
            category,
            prompt: self.config.prompts.for_category(category).to_string(),
            max_words: self.max_words(category),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_lookup_table() {
        assert_eq!(category_for("jpeg"), Some(Category::Image));
        assert_eq!(category_for("pdf"), Some(Category::Pdf));
        assert_eq!(category_for("md"), Some(Category::Text));
        assert_eq!(category_for("docx"), Some(Category::Office));
        assert_eq!(category_for("doc"), None);
        assert_eq!(category_for("xls"), None);
        assert_eq!(category_for("exe"), None);
    }

    #[test]
    fn test_dispatch_sets_category_and_state() {
        let dispatcher = Dispatcher::new(&AppConfig::default());
        let mut task = FileTask::discovered(PathBuf::from("/inbox/Scan.PNG"));
        task.advance(TaskState::Ready);

        let category = dispatcher.dispatch(&mut task).unwrap();
        assert_eq!(category, Category::Image);
        assert_eq!(task.category, Some(Category::Image));
        assert_eq!(task.state, TaskState::Dispatched);
    }

    #[test]
    fn test_legacy_format_is_unsupported() {
        let dispatcher = Dispatcher::new(&AppConfig::default());
        let mut task = FileTask::discovered(PathBuf::from("/inbox/old.doc"));

        let err = dispatcher.classify(&mut task).unwrap_err();
        assert!(err.to_string().contains("unsupported type"));
        assert_eq!(task.category, None);
    }

    #[test]
    fn test_request_uses_category_bounds() {
        let mut config = AppConfig::default();
        config.naming.max_words.pdf = 3;
        let dispatcher = Dispatcher::new(&config);
        let task = FileTask::discovered(PathBuf::from("/inbox/a.pdf"));

        let request = dispatcher.request(
            &task,
            Category::Pdf,
            ContentPayload::Text { excerpt: "hello".to_string() },
        );
        assert_eq!(request.max_words, 3);
        assert_eq!(request.prompt, config.prompts.pdf);
    }
}
