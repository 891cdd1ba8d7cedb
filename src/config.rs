//! Configuration for the evaluation harness.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.

use crate::error::{EvalError, Result};
use crate::llm::ANSWER_DELIMITER;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Model endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL for the OpenAI-compatible API (e.g., "http://localhost:8000")
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Model name as served by the endpoint
    pub model: String,

    /// Maximum new tokens per generation
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_max_tokens() -> u32 {
    50
}

fn default_temperature() -> f32 {
    0.0
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            model: "med-flamingo".to_string(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// Scoring and reporting knobs for the evaluation loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Emit a running-accuracy line every this many processed samples.
    pub log_interval: usize,

    /// Number of leading characters of the answer used for matching.
    pub compact_len: usize,

    /// Marker that precedes the answer in a decoded generation.
    pub answer_delimiter: String,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            log_interval: 100,
            compact_len: 6,
            answer_delimiter: ANSWER_DELIMITER.to_string(),
        }
    }
}

impl EvalConfig {
    /// Reject settings the evaluation loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.log_interval == 0 {
            return Err(EvalError::Config(
                "log_interval must be at least 1".to_string(),
            ));
        }

        if self.compact_len == 0 {
            return Err(EvalError::Config(
                "compact_len must be at least 1".to_string(),
            ));
        }

        if self.answer_delimiter.is_empty() {
            return Err(EvalError::Config(
                "answer_delimiter must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Model endpoint settings
    pub model: ModelConfig,
    /// Evaluation loop settings
    pub eval: EvalConfig,
}

/// Configuration file structure (YAML format).
#[derive(Debug, Deserialize)]
struct ConfigFile {
    model: Option<ModelFileSection>,
    eval: Option<EvalFileSection>,
}

#[derive(Debug, Deserialize)]
struct ModelFileSection {
    api_base: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct EvalFileSection {
    log_interval: Option<usize>,
    compact_len: Option<usize>,
    answer_delimiter: Option<String>,
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (LLM_API_BASE, LLM_API_KEY, LLM_MODEL, EVAL_*)
    /// 2. Config file (explicit path, else ~/.config/mcq-eval/config.yaml)
    /// 3. Default values
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::config_file_path() {
                Some(default_path) if default_path.exists() => {
                    Self::load_from_file(&default_path)?
                }
                _ => Config::default(),
            },
        };

        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(api_base) = env::var("LLM_API_BASE") {
            self.model.api_base = api_base;
        }

        if let Ok(api_key) = env::var("LLM_API_KEY") {
            self.model.api_key = api_key;
        }

        if let Ok(model) = env::var("LLM_MODEL") {
            self.model.model = model;
        }

        if let Ok(max_tokens) = env::var("LLM_MAX_TOKENS") {
            if let Ok(tokens) = max_tokens.parse() {
                self.model.max_tokens = tokens;
            }
        }

        if let Ok(temperature) = env::var("LLM_TEMPERATURE") {
            if let Ok(temp) = temperature.parse() {
                self.model.temperature = temp;
            }
        }

        if let Ok(interval) = env::var("EVAL_LOG_INTERVAL") {
            if let Ok(interval) = interval.parse() {
                self.eval.log_interval = interval;
            }
        }

        if let Ok(len) = env::var("EVAL_COMPACT_LEN") {
            if let Ok(len) = len.parse() {
                self.eval.compact_len = len;
            }
        }

        if let Ok(delimiter) = env::var("EVAL_ANSWER_DELIMITER") {
            self.eval.answer_delimiter = delimiter;
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
        Self::from_yaml(&content)
    }

    fn from_yaml(content: &str) -> Result<Self> {
        let file_config: ConfigFile = serde_yaml::from_str(content)
            .map_err(|e| EvalError::Config(format!("Failed to parse config file: {}", e)))?;

        let mut config = Config::default();

        if let Some(model) = file_config.model {
            if let Some(api_base) = model.api_base {
                config.model.api_base = api_base;
            }
            if let Some(api_key) = model.api_key {
                config.model.api_key = api_key;
            }
            if let Some(name) = model.model {
                config.model.model = name;
            }
            if let Some(max_tokens) = model.max_tokens {
                config.model.max_tokens = max_tokens;
            }
            if let Some(temperature) = model.temperature {
                config.model.temperature = temperature;
            }
        }

        if let Some(eval) = file_config.eval {
            if let Some(interval) = eval.log_interval {
                config.eval.log_interval = interval;
            }
            if let Some(len) = eval.compact_len {
                config.eval.compact_len = len;
            }
            if let Some(delimiter) = eval.answer_delimiter {
                config.eval.answer_delimiter = delimiter;
            }
        }

        Ok(config)
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "mcq-eval")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate the evaluation settings.
    pub fn validate(&self) -> Result<()> {
        self.eval.validate()
    }

    /// Validate that the model endpoint is configured.
    pub fn validate_model(&self) -> Result<()> {
        if self.model.api_base.is_empty() {
            return Err(EvalError::Config(
                "Model API base URL is required. Set LLM_API_BASE environment variable or add to config file.".to_string()
            ));
        }

        if self.model.api_key.is_empty() {
            return Err(EvalError::Config(
                "Model API key is required. Set LLM_API_KEY environment variable or add to config file.".to_string()
            ));
        }

        if self.model.model.is_empty() {
            return Err(EvalError::Config(
                "Model name is required. Set LLM_MODEL environment variable or add to config file."
                    .to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.model.api_base.is_empty());
        assert_eq!(config.model.max_tokens, 50);
        assert_eq!(config.eval.log_interval, 100);
        assert_eq!(config.eval.compact_len, 6);
        assert_eq!(config.eval.answer_delimiter, "### Answer:");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_model_fails_without_required_fields() {
        let config = Config::default();
        assert!(config.validate_model().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.eval.log_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
model:
  api_base: "http://localhost:8000"
  api_key: "secret"
eval:
  log_interval: 10
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.model.api_base, "http://localhost:8000");
        assert_eq!(config.model.model, "med-flamingo");
        assert_eq!(config.eval.log_interval, 10);
        assert_eq!(config.eval.compact_len, 6);
        assert!(config.validate_model().is_ok());
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(
            Config::from_yaml("model: [unterminated"),
            Err(EvalError::Config(_))
        ));
    }
}
