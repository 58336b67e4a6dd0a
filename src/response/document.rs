//! Outbound response document, serialized in the platform's camelCase shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::card::Card;
use super::directives::Directive;

/// Top-level response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDocument {
    pub version: String,

    #[serde(default)]
    pub session_attributes: Map<String, Value>,

    pub response: ResponseBody,
}

impl ResponseDocument {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            session_attributes: Map::new(),
            response: ResponseBody::default(),
        }
    }

    pub fn to_value(&self) -> crate::types::Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl Default for ResponseDocument {
    fn default() -> Self {
        Self::new("1.0")
    }
}

/// Nested `response` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_speech: Option<OutputSpeech>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reprompt: Option<Reprompt>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub card: Option<Card>,

    #[serde(default)]
    pub directives: Vec<Directive>,

    pub should_end_session: bool,
}

impl Default for ResponseBody {
    fn default() -> Self {
        Self {
            output_speech: None,
            reprompt: None,
            card: None,
            directives: Vec::new(),
            should_end_session: true,
        }
    }
}

/// Spoken output. Always markup-wrapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutputSpeech {
    #[serde(rename = "SSML")]
    Ssml { ssml: String },
}

impl OutputSpeech {
    pub fn ssml(&self) -> &str {
        match self {
            OutputSpeech::Ssml { ssml } => ssml,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reprompt {
    pub output_speech: OutputSpeech,
}
