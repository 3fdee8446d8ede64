// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Ollama-compatible API client used as the default content describer

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::{AppConfig, ModelConfig};
use crate::describer::{ContentDescriber, ContentPayload, DescribeRequest};
use crate::{Result, SmartParseError};

/// Ollama API client
pub struct OllamaClient {
    client: Client,
    base_url: String,
    models: ModelConfig,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<&'a str>>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Deserialize)]
struct ModelInfo {
    name: String,
}

impl OllamaClient {
    /// Create a client from the engine section of the configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.ai_engine.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: normalize_base_url(&config.ai_engine.url),
            models: config.ai_engine.models.clone(),
            api_key: config.api_key(),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Check if the service is reachable
    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.base_url);

        self.authorized(self.client.get(&url))
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| {
                SmartParseError::ExternalService(format!(
                    "Cannot connect to {}: {}",
                    self.base_url, e
                ))
            })?;

        Ok(())
    }

    /// List available models
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.authorized(self.client.get(&url)).send().await?;

        let tags: TagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn generate(&self, model: &str, prompt: String, image_base64: Option<&str>) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
            images: image_base64.map(|image| vec![image]),
        };

        debug!("Sending request to Ollama: model={}", model);

        let response = self
            .authorized(self.client.post(&url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SmartParseError::ExternalService(format!(
                "Ollama returned status {}",
                response.status()
            )));
        }

        let result: GenerateResponse = response.json().await?;
        Ok(result.response)
    }
}

#[async_trait]
impl ContentDescriber for OllamaClient {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn describe(&self, request: &DescribeRequest) -> Result<String> {
        let prompt = format!(
            "{} Use at most {} words.",
            request.prompt.trim_end(),
            request.max_words
        );

        match &request.payload {
            ContentPayload::Image { base64 } => {
                self.generate(&self.models.vision, prompt, Some(base64.as_str())).await
            }
            ContentPayload::Text { excerpt } => {
                let prompt = format!("{}\n\nContent:\n{}", prompt, excerpt);
                self.generate(&self.models.text, prompt, None).await
            }
        }
    }
}

fn normalize_base_url(url: &str) -> String {
    url.trim_end_matches('/')
        .replace("/api/generate", "")
        .replace("/api/chat", "")
}
