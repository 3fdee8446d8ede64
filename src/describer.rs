// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Content description capability and its retrying wrapper

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::config::EngineConfig;
use crate::dispatcher::Category;
use crate::{Result, SmartParseError};

/// Content extracted from a file for the describer
#[derive(Debug, Clone)]
pub enum ContentPayload {
    /// Base64-encoded image bytes
    Image { base64: String },
    /// Extracted text, already cut to the excerpt budget
    Text { excerpt: String },
}

/// One description call
#[derive(Debug, Clone)]
pub struct DescribeRequest {
    pub path: PathBuf,
    pub category: Category,
    pub prompt: String,
    pub max_words: usize,
    pub payload: ContentPayload,
}

/// Turns file content into a natural-language description
#[async_trait]
pub trait ContentDescriber: Send + Sync {
    /// Name of this describer
    fn name(&self) -> &'static str;

    async fn describe(&self, request: &DescribeRequest) -> Result<String>;
}

/// Retry policy with exponential backoff
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            retries: config.retries,
            base_delay: Duration::from_millis(config.backoff_ms),
        }
    }

    /// Delay before the given attempt (attempt 1 is the first retry)
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Wraps a describer with bounded retries; exhaustion becomes `ExternalService`
pub struct ResilientDescriber<D> {
    inner: D,
    policy: RetryPolicy,
}

impl<D: ContentDescriber> ResilientDescriber<D> {
    pub fn new(inner: D, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }
}

#[async_trait]
impl<D: ContentDescriber> ContentDescriber for ResilientDescriber<D> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn describe(&self, request: &DescribeRequest) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..=self.policy.retries {
            if attempt > 0 {
                let delay = self.policy.delay(attempt);
                warn!(
                    "Retrying {} for {:?} in {:?} (attempt {})",
                    self.inner.name(),
                    request.path,
                    delay,
                    attempt + 1
                );
                tokio::time::sleep(delay).await;
            }

            match self.inner.describe(request).await {
                Ok(description) => return Ok(description),
                Err(e) => last_error = Some(e),
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());
        Err(SmartParseError::ExternalService(format!(
            "{} failed after {} attempt(s): {}",
            self.inner.name(),
            self.policy.retries + 1,
            reason
        )))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Scripted describer: returns queued replies, then the fixed reply,
    /// and counts its calls.
    #[derive(Clone)]
    pub struct FakeDescriber {
        replies: Arc<Mutex<Vec<Result<String>>>>,
        fallback: String,
        calls: Arc<AtomicUsize>,
    }

    impl FakeDescriber {
        pub fn always(reply: &str) -> Self {
            Self {
                replies: Arc::new(Mutex::new(Vec::new())),
                fallback: reply.to_string(),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Queue replies returned before falling back to the fixed reply
        pub fn then(self, reply: Result<String>) -> Self {
            self.replies.lock().unwrap().push(reply);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ContentDescriber for FakeDescriber {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn describe(&self, _request: &DescribeRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Ok(self.fallback.clone())
            } else {
                replies.remove(0)
            }
        }
    }
}
