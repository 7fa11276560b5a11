use anyhow::anyhow;
use async_trait::async_trait;
use medilens_flow::ImageInput;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::VisionModel;
use crate::config::ModelSettings;

/// Vision calls against an OpenRouter-compatible chat completions endpoint
#[derive(Clone)]
pub struct OpenRouterVision {
    client: Client,
    base_url: String,
    api_key: String,
    settings: ModelSettings,
}

impl OpenRouterVision {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        settings: ModelSettings,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            settings,
        }
    }

    fn payload(&self, image: &ImageInput, prompt: &str) -> Value {
        json!({
            "model": self.settings.model,
            "messages": [
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": prompt },
                        {
                            "type": "image_url",
                            "image_url": {
                                "url": image.to_data_url(),
                                "detail": "high"
                            }
                        }
                    ]
                }
            ],
            "temperature": self.settings.temperature,
            "max_tokens": self.settings.max_tokens
        })
    }
}

#[async_trait]
impl VisionModel for OpenRouterVision {
    fn name(&self) -> &str {
        &self.settings.model
    }

    async fn analyze(&self, image: &ImageInput, prompt: &str) -> anyhow::Result<String> {
        debug!(
            model = %self.settings.model,
            width = image.width,
            height = image.height,
            "sending image to vision model"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.payload(image, prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("vision API request failed: {} {}", status, body));
        }

        let response_json: Value = response.json().await?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("Invalid response format from vision model"))?;

        info!(
            model = %self.settings.model,
            characters = content.len(),
            "vision analysis received"
        );
        Ok(content.to_string())
    }
}
