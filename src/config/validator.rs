use crate::config::Config;
use crate::error::{CallsightError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every failure.
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_server(config, &mut errors);
        Self::validate_openai(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_conversation(config, &mut errors);
        Self::validate_qdrant(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CallsightError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_server(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.server.host.is_empty() {
            errors.push(ValidationError::new("server.host", "Host cannot be empty"));
        }
        if config.server.port == 0 {
            errors.push(ValidationError::new("server.port", "Port cannot be 0"));
        }
    }

    fn validate_openai(config: &Config, errors: &mut Vec<ValidationError>) {
        let openai = &config.openai;
        if openai.api_url.is_empty() {
            errors.push(ValidationError::new(
                "openai.api_url",
                "API URL cannot be empty",
            ));
        }
        if openai.model.is_empty() {
            errors.push(ValidationError::new("openai.model", "Model cannot be empty"));
        }
        if openai.max_tokens == 0 {
            errors.push(ValidationError::new(
                "openai.max_tokens",
                "max_tokens must be at least 1",
            ));
        }
        if !(0.0..=2.0).contains(&openai.temperature) {
            errors.push(ValidationError::new(
                "openai.temperature",
                format!("Temperature must be in [0, 2], got {}", openai.temperature),
            ));
        }
        if !(0.0..=1.0).contains(&openai.top_p) {
            errors.push(ValidationError::new(
                "openai.top_p",
                format!("top_p must be in [0, 1], got {}", openai.top_p),
            ));
        }
        if openai.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "openai.timeout_secs",
                "Timeout must be at least 1s",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.retrieval.topn == 0 {
            errors.push(ValidationError::new(
                "retrieval.topn",
                "topn must be at least 1",
            ));
        }
    }

    fn validate_conversation(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.conversation.redis_url.is_empty() {
            errors.push(ValidationError::new(
                "conversation.redis_url",
                "Redis URL cannot be empty",
            ));
        }
        if config.conversation.history_limit == 0 {
            errors.push(ValidationError::new(
                "conversation.history_limit",
                "History limit must be at least 1",
            ));
        }
    }

    fn validate_qdrant(config: &Config, errors: &mut Vec<ValidationError>) {
        let qdrant = &config.qdrant;
        if qdrant.url.is_empty() {
            errors.push(ValidationError::new("qdrant.url", "URL cannot be empty"));
        }
        if qdrant.collection_name.is_empty() {
            errors.push(ValidationError::new(
                "qdrant.collection_name",
                "Collection name cannot be empty",
            ));
        }
        if qdrant.dense_vector_name.is_empty() || qdrant.sparse_vector_name.is_empty() {
            errors.push(ValidationError::new(
                "qdrant.vector_names",
                "Vector names cannot be empty",
            ));
        }
        if qdrant.owner_field.is_empty() {
            errors.push(ValidationError::new(
                "qdrant.owner_field",
                "Owner field cannot be empty",
            ));
        }
    }
}
