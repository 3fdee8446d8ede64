// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for SmartParse

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dispatcher::Category;

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Directory tree to ingest from
    pub watch_path: String,

    /// Root for the category folders (defaults to the watch directory)
    #[serde(default)]
    pub output_root: Option<String>,

    /// Append-only operation log
    #[serde(default = "default_log_path")]
    pub log_path: String,

    /// Extra glob patterns (matched against file names) that are never ingested
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub stability: StabilityConfig,

    #[serde(default)]
    pub naming: NamingConfig,

    #[serde(default)]
    pub mover: MoverConfig,

    /// AI engine configuration
    pub ai_engine: EngineConfig,

    /// Prompt templates
    #[serde(default)]
    pub prompts: PromptConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Window in which repeated watcher events for one path collapse
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StabilityConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Consecutive identical size samples needed before a file is ready
    #[serde(default = "default_required_matches")]
    pub required_matches: usize,
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NamingConfig {
    /// Put the category keyword in the filename; otherwise it only goes to the log
    #[serde(default = "default_true")]
    pub include_keyword: bool,
    #[serde(default = "default_failure_marker")]
    pub failure_marker: String,
    #[serde(default)]
    pub max_words: WordBounds,
    /// Keywords recognised in descriptions, first match wins
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
}

/// Per-category description length, in words
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WordBounds {
    #[serde(default = "default_image_words")]
    pub image: usize,
    #[serde(default = "default_document_words")]
    pub pdf: usize,
    #[serde(default = "default_document_words")]
    pub text: usize,
    #[serde(default = "default_document_words")]
    pub office: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MoverConfig {
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_mover_backoff_ms")]
    pub backoff_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    pub url: String,
    pub models: ModelConfig,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_engine_backoff_ms")]
    pub backoff_ms: u64,
    /// Name of the environment variable holding the service credential
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Characters of extracted text sent along with the prompt
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    pub vision: String,
    #[serde(default = "default_text_model")]
    pub text: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_image_prompt")]
    pub image: String,
    #[serde(default = "default_pdf_prompt")]
    pub pdf: String,
    #[serde(default = "default_text_prompt")]
    pub text: String,
    #[serde(default = "default_office_prompt")]
    pub office: String,
}

// Default value functions
fn default_log_path() -> String { "smartparse_log.jsonl".to_string() }
fn default_batch_size() -> usize { 20 }
fn default_queue_capacity() -> usize { 100 }
fn default_debounce_ms() -> u64 { 500 }
fn default_poll_interval_ms() -> u64 { 1000 }
fn default_required_matches() -> usize { 3 }
fn default_max_wait_secs() -> u64 { 120 }
fn default_true() -> bool { true }
fn default_failure_marker() -> String { "failed_".to_string() }
fn default_image_words() -> usize { 5 }
fn default_document_words() -> usize { 8 }
fn default_retries() -> u32 { 3 }
fn default_mover_backoff_ms() -> u64 { 200 }
fn default_engine_backoff_ms() -> u64 { 1000 }
fn default_timeout() -> u64 { 120 }
fn default_excerpt_chars() -> usize { 2000 }
fn default_text_model() -> String { "llama3.2:3b".to_string() }

fn default_keywords() -> Vec<String> {
    [
        "receipt", "invoice", "statement", "contract", "letter", "resume",
        "manual", "diagram", "chart", "screenshot", "photo", "notes", "report",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_image_prompt() -> String {
    "Describe this image in a short phrase suitable for a filename. \
     Return ONLY the phrase.".to_string()
}

fn default_pdf_prompt() -> String {
    "Summarize this PDF document in a short phrase suitable for a filename. \
     Return ONLY the phrase.".to_string()
}

fn default_text_prompt() -> String {
    "Summarize this text file in a short phrase suitable for a filename. \
     Return ONLY the phrase.".to_string()
}

fn default_office_prompt() -> String {
    "Summarize this office document in a short phrase suitable for a filename. \
     Return ONLY the phrase.".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            watch_path: "./watch".to_string(),
            output_root: None,
            log_path: default_log_path(),
            ignore_patterns: Vec::new(),
            scheduler: SchedulerConfig::default(),
            stability: StabilityConfig::default(),
            naming: NamingConfig::default(),
            mover: MoverConfig::default(),
            ai_engine: EngineConfig {
                url: "http://localhost:11434/api/generate".to_string(),
                models: ModelConfig {
                    vision: "moondream".to_string(),
                    text: default_text_model(),
                },
                timeout_secs: default_timeout(),
                retries: default_retries(),
                backoff_ms: default_engine_backoff_ms(),
                api_key_env: None,
                excerpt_chars: default_excerpt_chars(),
            },
            prompts: PromptConfig::default(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            queue_capacity: default_queue_capacity(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            required_matches: default_required_matches(),
            max_wait_secs: default_max_wait_secs(),
        }
    }
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            include_keyword: true,
            failure_marker: default_failure_marker(),
            max_words: WordBounds::default(),
            keywords: default_keywords(),
        }
    }
}

impl Default for WordBounds {
    fn default() -> Self {
        Self {
            image: default_image_words(),
            pdf: default_document_words(),
            text: default_document_words(),
            office: default_document_words(),
        }
    }
}

impl Default for MoverConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            backoff_ms: default_mover_backoff_ms(),
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            image: default_image_prompt(),
            pdf: default_pdf_prompt(),
            text: default_text_prompt(),
            office: default_office_prompt(),
        }
    }
}

impl WordBounds {
    pub fn for_category(&self, category: Category) -> usize {
        match category {
            Category::Image => self.image,
            Category::Pdf => self.pdf,
            Category::Text => self.text,
            Category::Office => self.office,
        }
    }
}

impl PromptConfig {
    pub fn for_category(&self, category: Category) -> &str {
        match category {
            Category::Image => &self.image,
            Category::Pdf => &self.pdf,
            Category::Text => &self.text,
            Category::Office => &self.office,
        }
    }
}

impl StabilityConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::SmartParseError::Config(format!("Failed to parse config: {}", e)))?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        let fail = |msg: &str| Err(crate::SmartParseError::Config(msg.to_string()));

        if self.scheduler.batch_size == 0 {
            return fail("scheduler.batch_size must be at least 1");
        }
        if self.scheduler.queue_capacity == 0 {
            return fail("scheduler.queue_capacity must be at least 1");
        }
        if self.stability.required_matches == 0 {
            return fail("stability.required_matches must be at least 1");
        }
        if self.stability.poll_interval_ms == 0 {
            return fail("stability.poll_interval_ms must be positive");
        }
        if self.naming.failure_marker.is_empty() {
            return fail("naming.failure_marker must not be empty");
        }
        for pattern in &self.ignore_patterns {
            if let Err(e) = glob::Pattern::new(pattern) {
                return Err(crate::SmartParseError::Config(format!(
                    "invalid ignore pattern {:?}: {}",
                    pattern, e
                )));
            }
        }
        Ok(())
    }

    pub fn watch_root(&self) -> PathBuf {
        PathBuf::from(&self.watch_path)
    }

    pub fn output_root(&self) -> PathBuf {
        self.output_root
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.watch_root())
    }

    /// Read the describer credential from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        self.ai_engine
            .api_key_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let json = r#"{
            "watch_path": "/tmp/inbox",
            "scheduler": { "batch_size": 5 },
            "ai_engine": { "url": "http://localhost:11434", "models": { "vision": "llava" } }
        }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.scheduler.batch_size, 5);
        assert_eq!(config.scheduler.queue_capacity, 100);
        assert_eq!(config.stability.required_matches, 3);
        assert_eq!(config.naming.failure_marker, "failed_");
        assert_eq!(config.output_root(), PathBuf::from("/tmp/inbox"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut config = AppConfig::default();
        config.scheduler.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_glob() {
        let mut config = AppConfig::default();
        config.ignore_patterns = vec!["[".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = AppConfig::default();
        config.naming.include_keyword = false;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert!(!loaded.naming.include_keyword);
        assert_eq!(loaded.naming.max_words.for_category(Category::Image), 5);
    }
}
