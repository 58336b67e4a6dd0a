//! Configuration structures.
//!
//! Configuration is built in code or loaded from a JSON file. Every field
//! has a default, so partial documents are accepted.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::errors::{ErrorKind, Result};

/// Global skill configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Echo session attributes back in every response.
    pub persistent_session: bool,

    /// Protocol version written into the response document.
    pub version: String,

    /// Spoken recovery messages, one per error kind.
    pub messages: Messages,

    /// Observability configuration.
    pub observability: ObservabilityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            persistent_session: true,
            version: "1.0".to_string(),
            messages: Messages::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Config {
    /// Parse a JSON configuration document.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Load a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

/// Recovery message table.
///
/// A `None` entry disables local recovery for that kind, so the turn fails
/// with the wrapped-exception reason instead of speaking an apology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Messages {
    pub no_intent_found: Option<String>,
    pub no_launch_function: Option<String>,
    pub invalid_request_type: Option<String>,
    pub no_session_available: Option<String>,
    /// Prefix of the rejection reason for unhandled errors.
    pub unhandled_exception: Option<String>,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            no_intent_found: Some("Sorry, the requested intent not found.".to_string()),
            no_launch_function: Some(
                "Try telling the application what to do instead of opening it".to_string(),
            ),
            invalid_request_type: Some("Error: not a valid request".to_string()),
            no_session_available: Some(
                "Sorry, this conversation has no session to remember that in.".to_string(),
            ),
            unhandled_exception: Some("Unhandled exception".to_string()),
        }
    }
}

impl Messages {
    /// Table with every entry disabled.
    pub fn none() -> Self {
        Self {
            no_intent_found: None,
            no_launch_function: None,
            invalid_request_type: None,
            no_session_available: None,
            unhandled_exception: None,
        }
    }

    pub fn get(&self, kind: ErrorKind) -> Option<&str> {
        self.slot(kind).as_deref()
    }

    pub fn set(&mut self, kind: ErrorKind, message: Option<String>) {
        *self.slot_mut(kind) = message;
    }

    fn slot(&self, kind: ErrorKind) -> &Option<String> {
        match kind {
            ErrorKind::NoIntentFound => &self.no_intent_found,
            ErrorKind::NoLaunchFunction => &self.no_launch_function,
            ErrorKind::InvalidRequestType => &self.invalid_request_type,
            ErrorKind::NoSessionAvailable => &self.no_session_available,
            ErrorKind::UnhandledException => &self.unhandled_exception,
        }
    }

    fn slot_mut(&mut self, kind: ErrorKind) -> &mut Option<String> {
        match kind {
            ErrorKind::NoIntentFound => &mut self.no_intent_found,
            ErrorKind::NoLaunchFunction => &mut self.no_launch_function,
            ErrorKind::InvalidRequestType => &mut self.invalid_request_type,
            ErrorKind::NoSessionAvailable => &mut self.no_session_available,
            ErrorKind::UnhandledException => &mut self.unhandled_exception,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
