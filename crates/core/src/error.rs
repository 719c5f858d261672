/// Result alias that carries the custom [`GreetingError`] type.
pub type Result<T> = std::result::Result<T, GreetingError>;

/// Common error type for the core crate.
///
/// Most of these never reach the user. Decorative failures are logged and
/// dropped, and generation failures collapse into a fallback message. Only
/// configuration and rendering errors surface to the front end.
#[derive(Debug, thiserror::Error)]
pub enum GreetingError {
    /// Free-form error used where no dedicated variant fits.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// The configuration file could not be decoded.
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
    /// Transport or status failure talking to the generation service.
    #[error("generation request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// A JSON body, from the generation backend or the timeline dump, could
    /// not be encoded or decoded.
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
    /// No API credential was configured for the generation service.
    #[error("generation credential is missing")]
    MissingCredential,
    /// The generation service answered without any usable text.
    #[error("generation service returned no text")]
    EmptyResponse,
    /// A decorative effect (sound, particles) failed to play.
    #[error("effect `{effect}` failed: {reason}")]
    Effect {
        effect: &'static str,
        reason: String,
    },
    /// The front end could not draw a frame.
    #[error("render failed: {0}")]
    Render(String),
}

impl GreetingError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// A decorative effect (`"pop"`, `"song"`, `"burst"`...) failed to play.
    /// The scheduler logs these and carries on.
    pub fn effect(effect: &'static str, reason: impl Into<String>) -> Self {
        Self::Effect {
            effect,
            reason: reason.into(),
        }
    }
}

impl From<&str> for GreetingError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for GreetingError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effect_errors_name_the_effect() {
        let err = GreetingError::effect("pop", "device unplugged");
        assert_eq!(format!("{err}"), "effect `pop` failed: device unplugged");
    }

    #[test]
    fn converts_plain_strings() {
        let err: GreetingError = "boom".into();
        assert!(matches!(err, GreetingError::Message(ref m) if m == "boom"));
    }
}
