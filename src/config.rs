//! Configuration management
//!
//! All configuration is sourced from the environment. There is no config file
//! and nothing is persisted: a session's state lives only as long as the
//! WebSocket connection that created it.

use crate::error::ProxyError;
use anyhow::{Context, Result};
use std::time::Duration;

/// Main configuration structure, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub stt_api_key: String,
    pub llm_api_key: String,
    pub tts_api_key: String,
    pub listen_addr: String,
    pub listen_port: u16,
    pub quiet_ms: u64,
    pub llm_model: String,
    pub stt_model: String,
    pub tts_model: String,
    pub provider_timeout: Duration,
}

fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    3000
}

fn default_quiet_ms() -> u64 {
    1000
}

fn default_llm_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_stt_model() -> String {
    "nova-2".to_string()
}

fn default_tts_model() -> String {
    "aura-asteria-en".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    15
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Fails fast with a [`ProxyError::ConfigError`] if a required API key is
    /// missing rather than letting a session fail later against an
    /// unauthenticated provider.
    pub fn from_env() -> Result<Self> {
        let stt_api_key = required_env("STT_API_KEY")?;
        let llm_api_key = required_env("LLM_API_KEY")?;
        let tts_api_key = required_env("TTS_API_KEY")?;

        let listen_addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| default_listen_addr());
        let listen_port = std::env::var("LISTEN_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_listen_port);
        let quiet_ms = std::env::var("QUIET_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_quiet_ms);
        let llm_model = std::env::var("LLM_MODEL").unwrap_or_else(|_| default_llm_model());
        let stt_model = std::env::var("STT_MODEL").unwrap_or_else(|_| default_stt_model());
        let tts_model = std::env::var("TTS_MODEL").unwrap_or_else(|_| default_tts_model());
        let provider_timeout_secs = std::env::var("PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_provider_timeout_secs);

        Ok(Self {
            stt_api_key,
            llm_api_key,
            tts_api_key,
            listen_addr,
            listen_port,
            quiet_ms,
            llm_model,
            stt_model,
            tts_model,
            provider_timeout: Duration::from_secs(provider_timeout_secs),
        })
    }

    pub fn quiet_duration(&self) -> Duration {
        Duration::from_millis(self.quiet_ms)
    }
}

fn required_env(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| ProxyError::ConfigError(format!("missing required environment variable {key}")))
        .context("loading configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            "STT_API_KEY",
            "LLM_API_KEY",
            "TTS_API_KEY",
            "LISTEN_ADDR",
            "LISTEN_PORT",
            "QUIET_MS",
            "LLM_MODEL",
            "STT_MODEL",
            "TTS_MODEL",
            "PROVIDER_TIMEOUT_SECS",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn missing_required_key_fails() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("STT_API_KEY"));
    }

    #[test]
    fn defaults_apply_when_optional_keys_absent() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("STT_API_KEY", "stt-key");
        std::env::set_var("LLM_API_KEY", "llm-key");
        std::env::set_var("TTS_API_KEY", "tts-key");

        let config = Config::from_env().unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0");
        assert_eq!(config.listen_port, 3000);
        assert_eq!(config.quiet_ms, 1000);
        assert_eq!(config.provider_timeout, Duration::from_secs(15));

        clear_env();
    }

    #[test]
    fn overrides_are_honored() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("STT_API_KEY", "stt-key");
        std::env::set_var("LLM_API_KEY", "llm-key");
        std::env::set_var("TTS_API_KEY", "tts-key");
        std::env::set_var("QUIET_MS", "250");
        std::env::set_var("LISTEN_PORT", "9090");

        let config = Config::from_env().unwrap();
        assert_eq!(config.quiet_ms, 250);
        assert_eq!(config.listen_port, 9090);

        clear_env();
    }
}
