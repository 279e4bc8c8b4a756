use secrecy::SecretString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;
use voice_relay_core::{
    RelaySettings, protocol::backend::TurnDetectionMode, settings,
};

pub const DEFAULT_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime?model=gpt-realtime";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub openai_api_key: SecretString,
    pub realtime_url: String,
    pub voice: String,
    pub turn_detection: TurnDetectionMode,
    pub temperature: f32,
    pub settle_delay: Duration,
    pub grace_delay: Duration,
    pub instructions_path: Option<PathBuf>,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:5050".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;

        let realtime_url =
            std::env::var("REALTIME_URL").unwrap_or_else(|_| DEFAULT_REALTIME_URL.to_string());
        if !realtime_url.starts_with("wss://") && !realtime_url.starts_with("ws://") {
            return Err(ConfigError::InvalidValue(
                "REALTIME_URL".to_string(),
                format!("'{}' is not a websocket URL", realtime_url),
            ));
        }

        let voice = std::env::var("VOICE").unwrap_or_else(|_| settings::DEFAULT_VOICE.to_string());

        let turn_detection = match std::env::var("TURN_DETECTION") {
            Ok(raw) => raw
                .parse::<TurnDetectionMode>()
                .map_err(|e| ConfigError::InvalidValue("TURN_DETECTION".to_string(), e))?,
            Err(_) => TurnDetectionMode::default(),
        };

        let temperature = match std::env::var("TEMPERATURE") {
            Ok(raw) => raw.parse::<f32>().map_err(|e| {
                ConfigError::InvalidValue("TEMPERATURE".to_string(), e.to_string())
            })?,
            Err(_) => settings::DEFAULT_TEMPERATURE,
        };

        let settle_delay = duration_ms_var("SESSION_SETTLE_MS", settings::DEFAULT_SETTLE_DELAY)?;
        let grace_delay = duration_ms_var("END_CALL_GRACE_MS", settings::DEFAULT_GRACE_DELAY)?;

        let instructions_path = std::env::var("INSTRUCTIONS_PATH").ok().map(PathBuf::from);

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            openai_api_key,
            realtime_url,
            voice,
            turn_detection,
            temperature,
            settle_delay,
            grace_delay,
            instructions_path,
            log_level,
        })
    }

    /// Builds the per-call settings, reading the instructions file if one is configured.
    pub fn relay_settings(&self) -> Result<RelaySettings, ConfigError> {
        let instructions = match &self.instructions_path {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                ConfigError::InvalidValue(
                    "INSTRUCTIONS_PATH".to_string(),
                    format!("{}: {}", path.display(), e),
                )
            })?,
            None => settings::DEFAULT_INSTRUCTIONS.to_string(),
        };

        Ok(RelaySettings {
            voice: self.voice.clone(),
            instructions,
            turn_detection: self.turn_detection,
            temperature: self.temperature,
            settle_delay: self.settle_delay,
            grace_delay: self.grace_delay,
        })
    }
}

fn duration_ms_var(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::env;
    use tracing::Level;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("BIND_ADDRESS");
            env::remove_var("OPENAI_API_KEY");
            env::remove_var("REALTIME_URL");
            env::remove_var("VOICE");
            env::remove_var("TURN_DETECTION");
            env::remove_var("TEMPERATURE");
            env::remove_var("SESSION_SETTLE_MS");
            env::remove_var("END_CALL_GRACE_MS");
            env::remove_var("INSTRUCTIONS_PATH");
            env::remove_var("RUST_LOG");
        }
    }

    fn set_minimal_env() {
        unsafe {
            env::set_var("OPENAI_API_KEY", "test-openai-key");
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
    #[serial]
    fn test_config_from_env_minimal() {
        clear_env_vars();
        set_minimal_env();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:5050");
        assert_eq!(config.openai_api_key.expose_secret(), "test-openai-key");
        assert_eq!(config.realtime_url, DEFAULT_REALTIME_URL);
        assert_eq!(config.voice, "sage");
        assert_eq!(config.turn_detection, TurnDetectionMode::SemanticVad);
        assert_eq!(config.temperature, 0.8);
        assert_eq!(config.settle_delay, Duration::from_millis(250));
        assert_eq!(config.grace_delay, Duration::from_millis(5000));
        assert_eq!(config.instructions_path, None);
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("REALTIME_URL", "ws://localhost:9000/realtime");
            env::set_var("VOICE", "alloy");
            env::set_var("TURN_DETECTION", "server_vad");
            env::set_var("TEMPERATURE", "0.6");
            env::set_var("SESSION_SETTLE_MS", "100");
            env::set_var("END_CALL_GRACE_MS", "1500");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.realtime_url, "ws://localhost:9000/realtime");
        assert_eq!(config.voice, "alloy");
        assert_eq!(config.turn_detection, TurnDetectionMode::ServerVad);
        assert_eq!(config.temperature, 0.6);
        assert_eq!(config.settle_delay, Duration::from_millis(100));
        assert_eq!(config.grace_delay, Duration::from_millis(1500));
        assert_eq!(config.log_level, Level::DEBUG);

        let settings = config.relay_settings().unwrap();
        assert_eq!(settings.voice, "alloy");
        assert_eq!(settings.grace_delay, Duration::from_millis(1500));
        assert_eq!(settings.instructions, settings::DEFAULT_INSTRUCTIONS);
    }

    #[test]
    #[serial]
    fn test_config_missing_openai_key() {
        clear_env_vars();

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(msg) => assert!(msg.contains("OPENAI_API_KEY")),
            _ => panic!("Expected MissingVar for OPENAI_API_KEY"),
        }
    }

    #[test]
    #[serial]
    fn test_config_blank_openai_key_is_missing() {
        clear_env_vars();
        unsafe {
            env::set_var("OPENAI_API_KEY", "   ");
        }

        assert!(matches!(
            Config::from_env().unwrap_err(),
            ConfigError::MissingVar(_)
        ));
    }

    #[test]
    #[serial]
    fn test_config_invalid_values() {
        let cases = [
            ("BIND_ADDRESS", "not-a-valid-address"),
            ("REALTIME_URL", "https://api.openai.com/v1/realtime"),
            ("TURN_DETECTION", "push_to_talk"),
            ("TEMPERATURE", "warm"),
            ("END_CALL_GRACE_MS", "-5"),
            ("SESSION_SETTLE_MS", "soon"),
            ("RUST_LOG", "not-a-level"),
        ];

        for (var, value) in cases {
            clear_env_vars();
            set_minimal_env();
            unsafe {
                env::set_var(var, value);
            }

            match Config::from_env().unwrap_err() {
                ConfigError::InvalidValue(name, _) => assert_eq!(name, var),
                other => panic!("Expected InvalidValue for {}, got {:?}", var, other),
            }
        }
    }

    #[test]
    #[serial]
    fn test_relay_settings_reads_instructions_file() {
        clear_env_vars();
        set_minimal_env();
        let path = env::temp_dir().join(format!("relay-instructions-{}.md", std::process::id()));
        std::fs::write(&path, "Answer in one sentence.").unwrap();
        unsafe {
            env::set_var("INSTRUCTIONS_PATH", &path);
        }

        let config = Config::from_env().unwrap();
        let settings = config.relay_settings().unwrap();
        assert_eq!(settings.instructions, "Answer in one sentence.");

        std::fs::remove_file(&path).unwrap();
        match config.relay_settings().unwrap_err() {
            ConfigError::InvalidValue(name, _) => assert_eq!(name, "INSTRUCTIONS_PATH"),
            other => panic!("Expected InvalidValue, got {:?}", other),
        }
    }
}
