//! Configuration management for callsight
//!
//! TOML file with section structs, environment overrides in
//! `CALLSIGHT_SECTION__KEY` form, and validation collecting every problem at
//! once instead of failing on the first.

use crate::error::{CallsightError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub server: ServerConfig,
    pub openai: OpenAiConfig,
    pub retrieval: RetrievalConfig,
    pub conversation: ConversationConfig,
    pub qdrant: QdrantConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// HTTP server bind configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// OpenAI-compatible completion backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Base URL of the `/chat/completions` endpoint (OpenAI, vLLM, ...).
    pub api_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    /// Deadline for one blocking completion call.
    pub timeout_secs: u64,
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Hits requested per sub-query search.
    pub topn: usize,
}

/// Conversation store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    pub redis_url: String,
    /// Maximum messages retained per conversation; oldest are dropped.
    pub history_limit: usize,
    /// Deadline for one store command.
    pub timeout_secs: u64,
}

/// Qdrant hybrid index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantConfig {
    pub url: String,
    pub collection_name: String,
    pub dense_model: String,
    pub sparse_model: String,
    pub dense_vector_name: String,
    pub sparse_vector_name: String,
    /// Payload field carrying the owner identity for scoped search.
    pub owner_field: String,
    pub timeout_secs: u64,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CallsightError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CallsightError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| CallsightError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: CALLSIGHT_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("CALLSIGHT_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "SERVER__HOST" => {
                self.server.host = value.to_string();
            }
            "SERVER__PORT" => {
                self.server.port =
                    value
                        .parse()
                        .map_err(|_| CallsightError::InvalidConfigValue {
                            path: path.to_string(),
                            message: format!("Cannot parse '{}' as port", value),
                        })?;
            }
            "OPENAI__API_URL" => {
                self.openai.api_url = value.to_string();
            }
            "OPENAI__MODEL" => {
                self.openai.model = value.to_string();
            }
            "CONVERSATION__REDIS_URL" => {
                self.conversation.redis_url = value.to_string();
            }
            "QDRANT__URL" => {
                self.qdrant.url = value.to_string();
            }
            "QDRANT__COLLECTION_NAME" => {
                self.qdrant.collection_name = value.to_string();
            }
            "RETRIEVAL__TOPN" => {
                self.retrieval.topn =
                    value
                        .parse()
                        .map_err(|_| CallsightError::InvalidConfigValue {
                            path: path.to_string(),
                            message: format!("Cannot parse '{}' as integer", value),
                        })?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CallsightError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("callsight").join("config.toml"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            openai: OpenAiConfig {
                api_url: "https://api.openai.com/v1".to_string(),
                api_key_env: "OPENAI_API_KEY".to_string(),
                model: "gpt-4o-mini".to_string(),
                max_tokens: 1024,
                temperature: 0.2,
                top_p: 0.9,
                frequency_penalty: 0.0,
                presence_penalty: 0.0,
                timeout_secs: 60,
            },
            retrieval: RetrievalConfig { topn: 10 },
            conversation: ConversationConfig {
                redis_url: "redis://localhost:6379/0".to_string(),
                history_limit: 10,
                timeout_secs: 5,
            },
            qdrant: QdrantConfig {
                url: "http://localhost:6334".to_string(),
                collection_name: "earning_calls".to_string(),
                dense_model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
                sparse_model: "prithivida/Splade_PP_en_v1".to_string(),
                dense_vector_name: "dense".to_string(),
                sparse_vector_name: "sparse".to_string(),
                owner_field: "user_id".to_string(),
                timeout_secs: 15,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::default();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.server.port, config.server.port);
        assert_eq!(loaded.qdrant.collection_name, config.qdrant.collection_name);
        assert_eq!(loaded.conversation.history_limit, 10);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/callsight.toml"));
        assert!(matches!(
            result,
            Err(CallsightError::ConfigNotFound { .. })
        ));
    }
}
