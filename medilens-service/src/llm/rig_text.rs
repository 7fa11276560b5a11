use async_trait::async_trait;
use rig::{client::CompletionClient, completion::Prompt, providers::openrouter};
use tracing::info;

use super::TextModel;
use crate::config::ModelSettings;

/// Text generation through a rig OpenRouter agent
pub struct RigTextModel {
    client: openrouter::Client,
    base_url: String,
    settings: ModelSettings,
}

impl RigTextModel {
    /// `base_url` is the OpenRouter-compatible endpoint shared with the vision client
    pub fn new(base_url: &str, api_key: &str, settings: ModelSettings) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            client: openrouter::Client::builder(api_key)
                .base_url(&base_url)
                .build()
                .expect("OpenRouter client should build"),
            base_url,
            settings,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl TextModel for RigTextModel {
    fn name(&self) -> &str {
        &self.settings.model
    }

    async fn generate(&self, preamble: &str, prompt: &str) -> anyhow::Result<String> {
        let agent = self
            .client
            .agent(&self.settings.model)
            .preamble(preamble)
            .temperature(self.settings.temperature)
            .max_tokens(u64::from(self.settings.max_tokens))
            .build();

        let response = agent.prompt(prompt).await?;
        info!(
            model = %self.settings.model,
            characters = response.len(),
            "text generation completed"
        );
        Ok(response.trim().to_string())
    }
}
