//! Client handles for the hosted models.
//!
//! Both traits are object-safe so the workflow can hold `Arc<dyn ...>` handles that are
//! created once at startup and shared by every request.

pub mod openrouter;
pub mod rig_text;

use async_trait::async_trait;
use medilens_flow::ImageInput;

pub use openrouter::OpenRouterVision;
pub use rig_text::RigTextModel;

/// A hosted vision-language model: image + prompt in, text out
#[async_trait]
pub trait VisionModel: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze(&self, image: &ImageInput, prompt: &str) -> anyhow::Result<String>;
}

/// A hosted text-generation model
#[async_trait]
pub trait TextModel: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, preamble: &str, prompt: &str) -> anyhow::Result<String>;
}
