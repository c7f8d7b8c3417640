//! Error types for the animation layers.
//!
//! Every failure here is local to one decorative layer. Callers log the error
//! and carry on without that layer; nothing in this module should ever take
//! the daemon down.

use std::fmt;

#[derive(Debug)]
pub enum AnimError {
    /// No GPU or shared-memory drawing context could be obtained for a surface.
    SurfaceUnavailable {
        /// Which layer asked for the surface ("starfield", "comet").
        layer: &'static str,
        reason: String,
    },

    /// A configuration value is outside the range the renderer accepts.
    InvalidConfig {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    /// A surface handle was registered twice under the same output id.
    DuplicateSurface { id: String },

    /// The Wayland connection or a required global is missing.
    Wayland(String),

    /// Reading the config file or writing a still image failed.
    Io(std::io::Error),

    /// The config file is not valid TOML for our schema.
    Config(toml::de::Error),
}

impl AnimError {
    pub fn surface(layer: &'static str, reason: impl fmt::Display) -> Self {
        AnimError::SurfaceUnavailable {
            layer,
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for AnimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnimError::SurfaceUnavailable { layer, reason } => {
                write!(f, "no drawing surface for {} layer: {}", layer, reason)
            }
            AnimError::InvalidConfig {
                field,
                value,
                expected,
            } => write!(f, "invalid {}: {} (expected {})", field, value, expected),
            AnimError::DuplicateSurface { id } => {
                write!(f, "surface for '{}' is already registered", id)
            }
            AnimError::Wayland(msg) => write!(f, "wayland: {}", msg),
            AnimError::Io(e) => write!(f, "i/o error: {}", e),
            AnimError::Config(e) => write!(f, "config parse error: {}", e),
        }
    }
}

impl std::error::Error for AnimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AnimError::Io(e) => Some(e),
            AnimError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AnimError {
    fn from(e: std::io::Error) -> Self {
        AnimError::Io(e)
    }
}

impl From<toml::de::Error> for AnimError {
    fn from(e: toml::de::Error) -> Self {
        AnimError::Config(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_layer() {
        let err = AnimError::surface("starfield", "no adapter");
        assert_eq!(
            err.to_string(),
            "no drawing surface for starfield layer: no adapter"
        );
    }

    #[test]
    fn io_errors_keep_their_source() {
        let err: AnimError = std::io::Error::other("disk gone").into();
        assert!(std::error::Error::source(&err).is_some());
    }
}
