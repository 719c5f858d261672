use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Environment variables consulted for the generation credential, in order.
pub const CREDENTIAL_ENV_VARS: [&str; 2] = ["API_KEY", "GEMINI_API_KEY"];

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub greeting: GreetingConfig,
    pub timings: SceneTimings,
    pub effects: EffectConfig,
    pub audio: AudioConfig,
    pub generation: GenerationConfig,
}

impl AppConfig {
    /// Loads configuration from an optional TOML file, then fills the
    /// generation credential from the environment when the file left it unset.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                Self::from_toml(&raw)?
            }
            None => Self::default(),
        };

        if config.generation.api_key.is_none() {
            config.generation.api_key = credential_from_env();
        }

        tracing::debug!(
            recipient = %config.greeting.recipient,
            has_credential = config.generation.api_key.is_some(),
            "configuration loaded"
        );
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

fn credential_from_env() -> Option<String> {
    CREDENTIAL_ENV_VARS
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

/// Who the greeting is for and who it is from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GreetingConfig {
    pub recipient: String,
    pub sender: String,
}

impl Default for GreetingConfig {
    fn default() -> Self {
        Self {
            recipient: "Tosin".to_string(),
            sender: "Bryan".to_string(),
        }
    }
}

/// Auto-advance delays, in milliseconds, for the timer-driven scenes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneTimings {
    pub balloons_ms: u64,
    pub cake_drop_ms: u64,
    pub candles_ms: u64,
    pub wish_time_ms: u64,
}

impl Default for SceneTimings {
    fn default() -> Self {
        Self {
            balloons_ms: 8_000,
            cake_drop_ms: 2_000,
            candles_ms: 2_500,
            wish_time_ms: 4_500,
        }
    }
}

/// Tuning for the decorative effects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectConfig {
    pub pop_tick_ms: u64,
    pub pop_probability: f64,
    pub fireworks_window_ms: u64,
    pub fireworks_period_ms: u64,
    pub fireworks_peak_particles: f32,
    pub card_burst_particles: u32,
    /// Fixed seed for every random decoration. Unset means entropy.
    pub seed: Option<u64>,
}

impl EffectConfig {
    pub fn pop_tick(&self) -> Duration {
        Duration::from_millis(self.pop_tick_ms.max(1))
    }

    /// Per-tick pop probability clamped to `[0, 1]`. A non-finite value
    /// (TOML accepts `nan` and `inf`) means the balloons never pop.
    pub fn pop_chance(&self) -> f64 {
        if self.pop_probability.is_finite() {
            self.pop_probability.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn fireworks_window(&self) -> Duration {
        Duration::from_millis(self.fireworks_window_ms)
    }

    pub fn fireworks_period(&self) -> Duration {
        Duration::from_millis(self.fireworks_period_ms.max(1))
    }
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            pop_tick_ms: 500,
            pop_probability: 0.3,
            fireworks_window_ms: 5_000,
            fireworks_period_ms: 250,
            fireworks_peak_particles: 50.0,
            card_burst_particles: 200,
            seed: None,
        }
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub song_url: String,
    pub song_volume: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            song_url: "https://upload.wikimedia.org/wikipedia/commons/6/6e/Happy_Birthday_to_You_-_C_Major.ogg"
                .to_string(),
            song_volume: 0.4,
        }
    }
}

/// Settings for the message-generation backend.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
    pub api_key: Option<String>,
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-2.5-flash".to_string(),
            timeout_secs: 20,
            api_key: None,
        }
    }
}

// Keeps the credential out of logs.
impl std::fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_original_timeline() {
        let config = AppConfig::default();
        assert_eq!(config.timings.balloons_ms, 8_000);
        assert_eq!(config.timings.cake_drop_ms, 2_000);
        assert_eq!(config.timings.candles_ms, 2_500);
        assert_eq!(config.timings.wish_time_ms, 4_500);
        assert_eq!(config.effects.pop_tick(), Duration::from_millis(500));
        assert_eq!(config.generation.model, "gemini-2.5-flash");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [greeting]
            recipient = "Ada"

            [timings]
            candles_ms = 100
            "#,
        )
        .unwrap();

        assert_eq!(config.greeting.recipient, "Ada");
        assert_eq!(config.greeting.sender, "Bryan");
        assert_eq!(config.timings.candles_ms, 100);
        assert_eq!(config.timings.balloons_ms, 8_000);
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = AppConfig::from_toml("[timings]\ncandles_ms = \"soon\"").unwrap_err();
        assert!(format!("{err}").starts_with("invalid configuration"));
    }

    #[test]
    fn non_finite_pop_probability_never_pops() {
        let config = AppConfig::from_toml("[effects]\npop_probability = nan").unwrap();
        assert!(config.effects.pop_probability.is_nan());
        assert_eq!(config.effects.pop_chance(), 0.0);

        let config = AppConfig::from_toml("[effects]\npop_probability = inf").unwrap();
        assert_eq!(config.effects.pop_chance(), 0.0);

        let config = AppConfig::from_toml("[effects]\npop_probability = 1.5").unwrap();
        assert_eq!(config.effects.pop_chance(), 1.0);
    }

    #[test]
    fn debug_output_redacts_credential() {
        let generation = GenerationConfig {
            api_key: Some("super-secret".to_string()),
            ..GenerationConfig::default()
        };
        let rendered = format!("{generation:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
