//! Service configuration resolved from environment variables.
//!
//! Resolution order: process environment (after `.env` is loaded by the binaries) → defaults.
//! `OPENROUTER_API_KEY` is the only required variable.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-4o";
const DEFAULT_TEMPERATURE: f64 = 0.1;
const DEFAULT_MAX_TOKENS: u32 = 1000;
const DEFAULT_TOP_K: usize = 5;
const DEFAULT_CHUNK_SIZE: usize = 1000;
const DEFAULT_CHUNK_OVERLAP: usize = 200;
const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Model name and sampling parameters for one hosted model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Which retrieval implementation backs the retriever stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalBackend {
    /// Retrieval stage is not part of the graph
    None,
    /// Keyword-scored in-memory corpus
    Static,
    /// Embedding similarity search
    Vector,
}

impl FromStr for RetrievalBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" | "off" | "disabled" => Ok(Self::None),
            "static" | "simulated" | "keyword" => Ok(Self::Static),
            "vector" | "embedding" => Ok(Self::Vector),
            other => Err(format!("unknown retrieval backend `{}`", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalSettings {
    pub backend: RetrievalBackend,
    pub knowledge_base_path: PathBuf,
    pub top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

#[derive(Clone)]
pub struct ServiceConfig {
    pub openrouter_api_key: String,
    pub openrouter_base_url: String,
    pub vision: ModelSettings,
    pub text: ModelSettings,
    pub retrieval: RetrievalSettings,
    pub reports_dir: PathBuf,
    pub port: u16,
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("openrouter_api_key", &"<redacted>")
            .field("openrouter_base_url", &self.openrouter_base_url)
            .field("vision", &self.vision)
            .field("text", &self.text)
            .field("retrieval", &self.retrieval)
            .field("reports_dir", &self.reports_dir)
            .field("port", &self.port)
            .finish()
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let openrouter_api_key =
            get("OPENROUTER_API_KEY").ok_or(ConfigError::Missing("OPENROUTER_API_KEY"))?;

        let temperature = parse_or(&get, "TEMPERATURE", DEFAULT_TEMPERATURE)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(invalid("TEMPERATURE", temperature, "must be between 0 and 2"));
        }
        let max_tokens = parse_or(&get, "MAX_TOKENS", DEFAULT_MAX_TOKENS)?;

        let model_settings = |name: &'static str| ModelSettings {
            model: get(name).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature,
            max_tokens,
        };

        let backend = match get("RETRIEVAL_BACKEND") {
            Some(value) => value
                .parse::<RetrievalBackend>()
                .map_err(|reason| invalid("RETRIEVAL_BACKEND", &value, &reason))?,
            None => RetrievalBackend::Static,
        };

        let top_k = parse_or(&get, "MAX_RETRIEVED_DOCS", DEFAULT_TOP_K)?;
        if top_k == 0 {
            return Err(invalid("MAX_RETRIEVED_DOCS", top_k, "must be at least 1"));
        }
        let chunk_size = parse_or(&get, "CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;
        let chunk_overlap = parse_or(&get, "CHUNK_OVERLAP", DEFAULT_CHUNK_OVERLAP)?;
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(invalid(
                "CHUNK_OVERLAP",
                chunk_overlap,
                "must be smaller than a non-zero CHUNK_SIZE",
            ));
        }

        Ok(Self {
            openrouter_api_key,
            openrouter_base_url: get("OPENROUTER_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            vision: model_settings("VISION_MODEL"),
            text: model_settings("TEXT_MODEL"),
            retrieval: RetrievalSettings {
                backend,
                knowledge_base_path: get("KNOWLEDGE_BASE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("./data/medical_knowledge")),
                top_k,
                chunk_size,
                chunk_overlap,
            },
            reports_dir: get("REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("reports")),
            port: parse_or(&get, "PORT", DEFAULT_PORT)?,
        })
    }
}

fn parse_or<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(name, &value, &e.to_string())),
        None => Ok(default),
    }
}

fn invalid(name: &'static str, value: impl fmt::Display, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ServiceConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn applies_defaults() {
        let config = config_from(&[("OPENROUTER_API_KEY", "key")]).unwrap();

        assert_eq!(config.openrouter_base_url, DEFAULT_BASE_URL);
        assert_eq!(config.vision.model, DEFAULT_MODEL);
        assert_eq!(config.text.max_tokens, 1000);
        assert_eq!(config.retrieval.backend, RetrievalBackend::Static);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.chunk_overlap, 200);
        assert_eq!(config.reports_dir, PathBuf::from("reports"));
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn api_key_is_required() {
        assert!(matches!(
            config_from(&[("OPENROUTER_API_KEY", "  ")]),
            Err(ConfigError::Missing("OPENROUTER_API_KEY"))
        ));
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            ("OPENROUTER_API_KEY", "key"),
            ("VISION_MODEL", "google/gemini-2.5-flash"),
            ("TEXT_MODEL", "openai/gpt-4.1-mini"),
            ("RETRIEVAL_BACKEND", "Vector"),
            ("MAX_RETRIEVED_DOCS", "3"),
            ("PORT", "8080"),
        ])
        .unwrap();

        assert_eq!(config.vision.model, "google/gemini-2.5-flash");
        assert_eq!(config.text.model, "openai/gpt-4.1-mini");
        assert_eq!(config.retrieval.backend, RetrievalBackend::Vector);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn rejects_invalid_numbers_and_backends() {
        let err = config_from(&[("OPENROUTER_API_KEY", "key"), ("MAX_TOKENS", "lots")]).unwrap_err();
        assert!(err.to_string().contains("MAX_TOKENS"));

        assert!(config_from(&[("OPENROUTER_API_KEY", "key"), ("RETRIEVAL_BACKEND", "chroma")]).is_err());
        assert!(config_from(&[("OPENROUTER_API_KEY", "key"), ("CHUNK_OVERLAP", "1000")]).is_err());
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let config = config_from(&[("OPENROUTER_API_KEY", "sk-secret")]).unwrap();
        assert!(!format!("{:?}", config).contains("sk-secret"));
    }
}
