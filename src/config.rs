//! Configuration types for the Krishi Mitra voice core.

use crate::error::{KrishiError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV_VAR: &str = "KRISHI_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KrishiConfig {
    /// Locale detection settings.
    pub locale: LocaleConfig,
    /// Speech transport settings.
    pub speech: SpeechConfig,
    /// Dialogue controller settings.
    pub dialogue: DialogueConfig,
    /// Host bridge settings.
    pub host: HostConfig,
}

/// Locale resolver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocaleConfig {
    /// Upper bound on waiting for the device position.
    pub geolocation_timeout_ms: u64,
    /// Upper bound on the reverse-geocoding request.
    pub reverse_geocode_timeout_ms: u64,
    /// Upper bound on the IP-geolocation request.
    pub ip_lookup_timeout_ms: u64,
    /// Reverse-geocoding endpoint (queried with `latitude`, `longitude`,
    /// `localityLanguage`).
    pub reverse_geocode_url: String,
    /// IP-geolocation endpoint (queried with no parameters).
    pub ip_lookup_url: String,
    /// Request a high-accuracy fix from the position source.
    pub high_accuracy: bool,
    /// Device latitude supplied by the host, if it has one.
    pub latitude: Option<f64>,
    /// Device longitude supplied by the host, if it has one.
    pub longitude: Option<f64>,
    /// Run one resolution pass when the runtime starts.
    pub resolve_on_start: bool,
}

impl Default for LocaleConfig {
    fn default() -> Self {
        Self {
            geolocation_timeout_ms: 10_000,
            reverse_geocode_timeout_ms: 5_000,
            ip_lookup_timeout_ms: 5_000,
            reverse_geocode_url: "https://api.bigdatacloud.net/data/reverse-geocode-client"
                .to_owned(),
            ip_lookup_url: "https://ipapi.co/json/".to_owned(),
            high_accuracy: false,
            latitude: None,
            longitude: None,
            resolve_on_start: true,
        }
    }
}

impl LocaleConfig {
    #[must_use]
    pub fn geolocation_timeout(&self) -> Duration {
        Duration::from_millis(self.geolocation_timeout_ms)
    }

    #[must_use]
    pub fn reverse_geocode_timeout(&self) -> Duration {
        Duration::from_millis(self.reverse_geocode_timeout_ms)
    }

    #[must_use]
    pub fn ip_lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.ip_lookup_timeout_ms)
    }
}

/// Speech transport configuration.
/// Accepted range for the synthesis rate and pitch multipliers.
pub const SPEECH_MULTIPLIER_RANGE: std::ops::RangeInclusive<f32> = 0.1..=10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Whether the host can capture speech.
    pub recognition: bool,
    /// Whether the host can play synthesized speech.
    pub synthesis: bool,
    /// Synthesis rate multiplier (1.0 = engine default).
    pub rate: f32,
    /// Synthesis pitch multiplier (1.0 = engine default).
    pub pitch: f32,
    /// Speaking speed used to estimate how long an utterance holds the
    /// output device.
    pub words_per_minute: u32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            recognition: true,
            synthesis: true,
            rate: 0.9,
            pitch: 1.0,
            words_per_minute: 150,
        }
    }
}

/// Dialogue controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogueConfig {
    /// Buffered commands before callers wait.
    pub command_capacity: usize,
    /// Broadcast buffer for dialogue events.
    pub event_capacity: usize,
    /// Adopt the language chosen by the locale resolver.
    pub follow_locale: bool,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            command_capacity: 32,
            event_capacity: 128,
            follow_locale: true,
        }
    }
}

/// Host bridge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Request channel capacity.
    pub request_capacity: usize,
    /// Event broadcast channel capacity.
    pub event_capacity: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            request_capacity: 64,
            event_capacity: 128,
        }
    }
}

impl KrishiConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| KrishiError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| KrishiError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from `KRISHI_CONFIG` or the default path; a missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file is unreadable or invalid.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(Self::default_config_path);
        if path.exists() {
            tracing::info!(path = %path.display(), "loading config");
            Self::from_file(&path)
        } else {
            tracing::info!(path = %path.display(), "no config file; using defaults");
            Ok(Self::default())
        }
    }

    /// Returns the default config file path: `~/.config/krishi-mitra/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("krishi-mitra").join("config.toml")
        } else if let Some(config) = dirs::config_dir() {
            config.join("krishi-mitra").join("config.toml")
        } else {
            PathBuf::from("/tmp/krishi-mitra-config/config.toml")
        }
    }

    /// Reject values that would stall or disable the core.
    ///
    /// # Errors
    ///
    /// Returns [`KrishiError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let locale = &self.locale;
        for (name, value) in [
            ("locale.geolocation_timeout_ms", locale.geolocation_timeout_ms),
            (
                "locale.reverse_geocode_timeout_ms",
                locale.reverse_geocode_timeout_ms,
            ),
            ("locale.ip_lookup_timeout_ms", locale.ip_lookup_timeout_ms),
        ] {
            if value == 0 {
                return Err(KrishiError::Config(format!("{name} must be positive")));
            }
        }
        if locale.latitude.is_some() != locale.longitude.is_some() {
            return Err(KrishiError::Config(
                "locale.latitude and locale.longitude must be set together".to_owned(),
            ));
        }
        if let Some(lat) = locale.latitude
            && !(-90.0..=90.0).contains(&lat)
        {
            return Err(KrishiError::Config(format!(
                "locale.latitude {lat} out of range"
            )));
        }
        if let Some(lon) = locale.longitude
            && !(-180.0..=180.0).contains(&lon)
        {
            return Err(KrishiError::Config(format!(
                "locale.longitude {lon} out of range"
            )));
        }
        for (name, value) in [("rate", self.speech.rate), ("pitch", self.speech.pitch)] {
            if !SPEECH_MULTIPLIER_RANGE.contains(&value) {
                return Err(KrishiError::Config(format!(
                    "speech.{name} {value} outside {}..={}",
                    SPEECH_MULTIPLIER_RANGE.start(),
                    SPEECH_MULTIPLIER_RANGE.end()
                )));
            }
        }
        if self.speech.words_per_minute == 0 {
            return Err(KrishiError::Config(
                "speech.words_per_minute must be positive".to_owned(),
            ));
        }
        if self.dialogue.command_capacity == 0
            || self.dialogue.event_capacity == 0
            || self.host.request_capacity == 0
            || self.host.event_capacity == 0
        {
            return Err(KrishiError::Config(
                "channel capacities must be positive".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = KrishiConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.locale.geolocation_timeout(), Duration::from_secs(10));
        assert!(!config.locale.high_accuracy);
        assert!(config.speech.recognition && config.speech.synthesis);
        assert!((config.speech.rate - 0.9).abs() < f32::EPSILON);
        assert!(config.dialogue.follow_locale);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = KrishiConfig::default();
        config.locale.latitude = Some(30.9);
        config.locale.longitude = Some(75.85);
        config.locale.ip_lookup_timeout_ms = 2_500;
        config.speech.synthesis = false;

        config.save_to_file(&path).unwrap();
        let loaded = KrishiConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[speech]\nrecognition = false\n").unwrap();

        let loaded = KrishiConfig::from_file(&path).unwrap();
        assert!(!loaded.speech.recognition);
        assert!(loaded.speech.synthesis);
        assert_eq!(loaded.locale, LocaleConfig::default());
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[locale\n").unwrap();

        match KrishiConfig::from_file(&path) {
            Err(KrishiError::Config(_)) => {}
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_zero_timeouts() {
        let mut config = KrishiConfig::default();
        config.locale.reverse_geocode_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("reverse_geocode_timeout_ms"));
    }

    #[test]
    fn validate_rejects_half_a_coordinate() {
        let mut config = KrishiConfig::default();
        config.locale.latitude = Some(12.0);
        assert!(config.validate().is_err());

        config.locale.longitude = Some(500.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_positive_rate() {
        let mut config = KrishiConfig::default();
        config.speech.rate = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_bounds_rate_and_pitch() {
        let mut config = KrishiConfig::default();
        config.speech.rate = 1e-30;
        assert!(matches!(config.validate(), Err(KrishiError::Config(_))));

        config.speech.rate = f32::NAN;
        assert!(config.validate().is_err());

        config.speech.rate = 10.0;
        config.speech.pitch = 20.0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("speech.pitch"));

        config.speech.pitch = 0.1;
        assert!(config.validate().is_ok());
    }
}
