use crate::features::FeatureKind;
use secrecy::SecretString;
use std::str::FromStr;
use tracing::Level;

pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent";
pub const DEFAULT_MODEL: &str = "models/gemini-2.0-flash-exp";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// How the model should answer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReplyMode {
    #[default]
    Audio,
    Text,
}

impl FromStr for ReplyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "audio" => Ok(ReplyMode::Audio),
            "text" => Ok(ReplyMode::Text),
            other => Err(format!("'{other}' is not one of audio, text")),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Debug)]
pub struct Config {
    pub api_key: SecretString,
    pub endpoint: String,
    pub model: String,
    pub reply_mode: ReplyMode,
    pub voice_name: Option<String>,
    pub features: Vec<FeatureKind>,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))?;

        let endpoint =
            std::env::var("LIVE_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        if !(endpoint.starts_with("wss://") || endpoint.starts_with("ws://")) {
            return Err(ConfigError::InvalidValue(
                "LIVE_ENDPOINT".to_string(),
                format!("'{endpoint}' is not a websocket URL"),
            ));
        }

        let model = std::env::var("LIVE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let reply_mode = match std::env::var("RESPONSE_MODALITY") {
            Ok(value) => value
                .parse::<ReplyMode>()
                .map_err(|e| ConfigError::InvalidValue("RESPONSE_MODALITY".to_string(), e))?,
            Err(_) => ReplyMode::default(),
        };

        let voice_name = std::env::var("VOICE_NAME")
            .ok()
            .filter(|name| !name.trim().is_empty());

        let features = match std::env::var("ASSISTANT_FEATURES") {
            Ok(list) => FeatureKind::parse_list(&list)
                .map_err(|e| ConfigError::InvalidValue("ASSISTANT_FEATURES".to_string(), e))?,
            Err(_) => FeatureKind::ALL.to_vec(),
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            api_key,
            endpoint,
            model,
            reply_mode,
            voice_name,
            features,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::env;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("GEMINI_API_KEY");
            env::remove_var("LIVE_ENDPOINT");
            env::remove_var("LIVE_MODEL");
            env::remove_var("RESPONSE_MODALITY");
            env::remove_var("VOICE_NAME");
            env::remove_var("ASSISTANT_FEATURES");
            env::remove_var("RUST_LOG");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    fn test_reply_mode_parsing() {
        assert_eq!("AUDIO".parse::<ReplyMode>(), Ok(ReplyMode::Audio));
        assert_eq!(" text ".parse::<ReplyMode>(), Ok(ReplyMode::Text));
        assert!("video".parse::<ReplyMode>().is_err());
    }

    #[test]
    #[serial]
    fn test_config_from_env_minimal() {
        clear_env_vars();
        unsafe {
            env::set_var("GEMINI_API_KEY", "test-gemini-key");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.api_key.expose_secret(), "test-gemini-key");
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.reply_mode, ReplyMode::Audio);
        assert_eq!(config.voice_name, None);
        assert_eq!(config.features, FeatureKind::ALL.to_vec());
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("GEMINI_API_KEY", "custom-key");
            env::set_var("LIVE_ENDPOINT", "ws://127.0.0.1:9000/live");
            env::set_var("LIVE_MODEL", "models/custom");
            env::set_var("RESPONSE_MODALITY", "text");
            env::set_var("VOICE_NAME", "Puck");
            env::set_var("ASSISTANT_FEATURES", "youtube, calendar");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.endpoint, "ws://127.0.0.1:9000/live");
        assert_eq!(config.model, "models/custom");
        assert_eq!(config.reply_mode, ReplyMode::Text);
        assert_eq!(config.voice_name.as_deref(), Some("Puck"));
        assert_eq!(
            config.features,
            vec![FeatureKind::YouTube, FeatureKind::Calendar]
        );
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_config_missing_api_key() {
        clear_env_vars();

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(msg) => assert!(msg.contains("GEMINI_API_KEY")),
            _ => panic!("Expected MissingVar for GEMINI_API_KEY"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_endpoint() {
        clear_env_vars();
        unsafe {
            env::set_var("GEMINI_API_KEY", "test-gemini-key");
            env::set_var("LIVE_ENDPOINT", "https://example.com");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "LIVE_ENDPOINT"),
            _ => panic!("Expected InvalidValue for LIVE_ENDPOINT"),
        }
    }

    #[test]
    #[serial]
    fn test_config_unknown_feature() {
        clear_env_vars();
        unsafe {
            env::set_var("GEMINI_API_KEY", "test-gemini-key");
            env::set_var("ASSISTANT_FEATURES", "calendar,weather");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, msg) => {
                assert_eq!(var, "ASSISTANT_FEATURES");
                assert!(msg.contains("weather"));
            }
            _ => panic!("Expected InvalidValue for ASSISTANT_FEATURES"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        unsafe {
            env::set_var("GEMINI_API_KEY", "test-gemini-key");
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
    }
}
