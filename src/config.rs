use anyhow::{Result, anyhow};
use serde::Deserialize;
use std::env;
use tracing::{info, warn};

// Import logging macros
use crate::{log_system_event, log_validation};

/// Complete application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub ai: AiConfig,
    pub logging: LoggingConfig,
}

/// Key-value store backing database.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Generative AI service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub backend: AiBackendKind,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub enum AiBackendKind {
    Gemini,
    OpenAi,
}

/// Logging system configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        log_system_event!(config, "Loading application configuration from environment variables");

        let config = Config {
            database: DatabaseConfig::from_env()?,
            ai: AiConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        };

        log_system_event!(config, "Configuration loaded successfully");
        config.log_configuration_summary();

        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data).
    fn log_configuration_summary(&self) {
        info!(
            database_url_masked = %mask_sensitive_data(&self.database.url),
            ai_backend = ?self.ai.backend,
            ai_model = ?self.ai.model,
            log_level = %self.logging.level,
            "Configuration summary"
        );
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if !self.database.url.contains("sqlite:") {
            return Err(anyhow!("DATABASE_URL must start with 'sqlite:'"));
        }

        if self.ai.api_key.is_empty() || self.ai.api_key == "your-api-key" {
            warn!("AI API key appears to be placeholder or empty - content generation may not work");
        }

        if !["trace", "debug", "info", "warn", "error"]
            .iter()
            .any(|lvl| self.logging.level.to_lowercase().starts_with(lvl))
        {
            warn!(
                "Log level '{}' does not start with a known level, relying on env-filter parsing",
                self.logging.level
            );
        }

        log_validation!(success, "configuration", "Configuration validation completed successfully");
        Ok(())
    }
}

impl DatabaseConfig {
    fn from_env() -> Result<Self> {
        let url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:study_catalyst.db".to_string());

        Ok(DatabaseConfig { url })
    }
}

impl AiConfig {
    fn from_env() -> Result<Self> {
        let api_key = env::var("AI_API_KEY").unwrap_or_else(|_| "your-api-key".to_string());
        let base_url = env::var("AI_BASE_URL").ok();

        let backend_str = env::var("AI_BACKEND").unwrap_or_else(|_| "gemini".to_string());
        let backend = match backend_str.to_lowercase().as_str() {
            "gemini" | "google" => AiBackendKind::Gemini,
            "openai" | "chatgpt" | "gpt" => AiBackendKind::OpenAi,
            _ => {
                info!("Unknown AI backend '{}', defaulting to Gemini", backend_str);
                AiBackendKind::Gemini
            }
        };

        let model = env::var("AI_MODEL").ok();

        Ok(AiConfig {
            api_key,
            base_url,
            backend,
            model,
        })
    }
}

impl LoggingConfig {
    fn from_env() -> Result<Self> {
        let level =
            env::var("RUST_LOG").unwrap_or_else(|_| "info,study_catalyst=debug".to_string());

        let file_enabled = env::var("LOG_FILE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let console_enabled = env::var("LOG_CONSOLE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let log_directory = env::var("LOG_DIRECTORY").unwrap_or_else(|_| "logs".to_string());

        Ok(LoggingConfig {
            level,
            file_enabled,
            console_enabled,
            log_directory,
        })
    }
}

/// Mask sensitive data in configuration for safe logging.
fn mask_sensitive_data(data: &str) -> String {
    if data.len() <= 8 {
        "*".repeat(data.len())
    } else {
        format!("{}***{}", &data[..4], &data[data.len() - 4..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_sensitive_data() {
        assert_eq!(mask_sensitive_data("short"), "*****");
        assert_eq!(mask_sensitive_data("sqlite:study_catalyst.db"), "sqli***t.db");
    }

    #[test]
    fn test_database_config_defaults() {
        unsafe {
            env::remove_var("DATABASE_URL");
        }

        let config = DatabaseConfig::from_env().unwrap();
        assert_eq!(config.url, "sqlite:study_catalyst.db");
    }

    #[test]
    fn test_ai_backend_parsing() {
        let test_cases = vec![
            ("gemini", AiBackendKind::Gemini),
            ("Google", AiBackendKind::Gemini),
            ("openai", AiBackendKind::OpenAi),
            ("chatgpt", AiBackendKind::OpenAi),
            ("gpt", AiBackendKind::OpenAi),
            ("unknown", AiBackendKind::Gemini), // defaults to Gemini
        ];

        for (input, expected) in test_cases {
            unsafe {
                env::set_var("AI_BACKEND", input);
            }
            let config = AiConfig::from_env().unwrap();
            assert_eq!(
                config.backend, expected,
                "Input '{}' should map to {:?}",
                input, expected
            );
        }

        unsafe {
            env::remove_var("AI_BACKEND");
        }
    }

    #[test]
    fn test_config_validation() {
        let config = Config {
            database: DatabaseConfig {
                url: "sqlite:test.db".to_string(),
            },
            ai: AiConfig {
                api_key: "sk-valid-key".to_string(),
                base_url: None,
                backend: AiBackendKind::Gemini,
                model: None,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_enabled: false,
                console_enabled: true,
                log_directory: "logs".to_string(),
            },
        };

        assert!(config.validate().is_ok());

        let mut invalid = config.clone();
        invalid.database.url = "postgres://somewhere/db".to_string();
        assert!(invalid.validate().is_err());
    }
}
