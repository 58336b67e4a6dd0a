//! Media-player directives appended to a response.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a play directive interacts with the current queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayBehavior {
    #[default]
    ReplaceAll,
    Enqueue,
    ReplaceEnqueued,
}

/// What a clear-queue directive removes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClearBehavior {
    #[default]
    ClearEnqueued,
    ClearAll,
}

/// Audio stream reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    pub url: String,
    pub token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_previous_token: Option<String>,

    #[serde(default)]
    pub offset_in_milliseconds: i64,
}

impl Stream {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            expected_previous_token: None,
            offset_in_milliseconds: 0,
        }
    }

    pub fn with_offset(mut self, offset_in_milliseconds: i64) -> Self {
        self.offset_in_milliseconds = offset_in_milliseconds;
        self
    }

    pub fn with_expected_previous_token(mut self, token: impl Into<String>) -> Self {
        self.expected_previous_token = Some(token.into());
        self
    }

    /// Platform constraints on a playable stream.
    pub fn validate(&self) -> Result<(), StreamError> {
        if !self.url.starts_with("https://") {
            return Err(StreamError::InsecureUrl(self.url.clone()));
        }
        if self.token.is_empty() {
            return Err(StreamError::MissingToken);
        }
        if self.offset_in_milliseconds < 0 {
            return Err(StreamError::NegativeOffset(self.offset_in_milliseconds));
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("stream url must use https: {0}")]
    InsecureUrl(String),

    #[error("stream token is required")]
    MissingToken,

    #[error("stream offset must be non-negative, got {0}")]
    NegativeOffset(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioItem {
    pub stream: Stream,
}

/// A directive in the response's `directives` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Directive {
    #[serde(rename = "AudioPlayer.Play", rename_all = "camelCase")]
    Play {
        play_behavior: PlayBehavior,
        audio_item: AudioItem,
    },

    #[serde(rename = "AudioPlayer.Stop")]
    Stop,

    #[serde(rename = "AudioPlayer.ClearQueue", rename_all = "camelCase")]
    ClearQueue { clear_behavior: ClearBehavior },
}
