//! Typed view over an inbound request envelope.
//!
//! The body stays a raw `serde_json::Value`; accessors dig into it
//! defensively and report `None` on any missing or mistyped field. The
//! session-derived fields are snapshots taken at construction and do not
//! track later [`Session::set`] calls.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::session::{Session, SessionDetails};

/// Category prefix shared by every media-player event.
pub const AUDIO_PLAYER_PREFIX: &str = "AudioPlayer.";

/// Classified request category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind<'a> {
    Intent,
    Launch,
    SessionEnded,
    /// Media-player event, with the prefix stripped.
    AudioPlayer(&'a str),
    Unknown(&'a str),
}

impl<'a> RequestKind<'a> {
    pub fn classify(category: &'a str) -> Self {
        match category {
            "IntentRequest" => RequestKind::Intent,
            "LaunchRequest" => RequestKind::Launch,
            "SessionEndedRequest" => RequestKind::SessionEnded,
            other => match other.strip_prefix(AUDIO_PLAYER_PREFIX) {
                Some(event) => RequestKind::AudioPlayer(event),
                None => RequestKind::Unknown(other),
            },
        }
    }
}

#[derive(Debug)]
struct RequestInner {
    body: Value,
    session: Session,
    // Frozen at construction.
    is_new_session: bool,
    session_attributes: Map<String, Value>,
    session_details: SessionDetails,
    session_id: Option<String>,
}

/// Shared handle to one inbound request.
#[derive(Debug, Clone)]
pub struct Request {
    inner: Arc<RequestInner>,
}

impl Request {
    pub fn new(body: Value, session: Session) -> Self {
        let is_new_session = session.is_new().unwrap_or(false);
        let session_attributes = session.attributes();
        let session_details = session.details().clone();
        let session_id = session.session_id().map(str::to_string);
        Self {
            inner: Arc::new(RequestInner {
                body,
                session,
                is_new_session,
                session_attributes,
                session_details,
                session_id,
            }),
        }
    }

    /// Build from a full envelope, deriving the session from its `session` block.
    pub fn from_envelope(body: Value) -> Self {
        let session = Session::from_envelope(body.get("session"));
        Self::new(body, session)
    }

    /// Raw decoded body.
    pub fn data(&self) -> &Value {
        &self.inner.body
    }

    /// Request category (`request.type`), or `None` when the body has no
    /// such string.
    pub fn category(&self) -> Option<&str> {
        self.str_at("/request/type")
    }

    pub fn kind(&self) -> Option<RequestKind<'_>> {
        self.category().map(RequestKind::classify)
    }

    pub fn is_audio_player(&self) -> bool {
        self.category()
            .is_some_and(|c| c.starts_with(AUDIO_PLAYER_PREFIX))
    }

    /// `request.intent.name`, read straight from the body.
    pub fn intent_name(&self) -> Option<&str> {
        self.str_at("/request/intent/name")
    }

    /// `request.intent.slots[name].value`.
    pub fn slot(&self, name: &str) -> Option<&str> {
        self.inner
            .body
            .pointer("/request/intent/slots")
            .and_then(|slots| slots.get(name))
            .and_then(|slot| slot.get("value"))
            .and_then(Value::as_str)
    }

    pub fn slot_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.slot(name).unwrap_or(default)
    }

    pub fn has_session(&self) -> bool {
        self.inner.session.is_available()
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// User id from the context block, falling back to the session.
    pub fn user_id(&self) -> Option<&str> {
        self.str_at("/context/System/user/userId")
            .or_else(|| self.str_at("/session/user/userId"))
    }

    /// Application id from the context block, falling back to the session.
    pub fn application_id(&self) -> Option<&str> {
        self.str_at("/context/System/application/applicationId")
            .or_else(|| self.str_at("/session/application/applicationId"))
    }

    pub fn request_id(&self) -> Option<&str> {
        self.str_at("/request/requestId")
    }

    pub fn locale(&self) -> Option<&str> {
        self.str_at("/request/locale")
    }

    /// `request.timestamp` parsed as RFC 3339.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let raw = self.str_at("/request/timestamp")?;
        match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(e) => {
                tracing::debug!("unparseable request timestamp {:?}: {}", raw, e);
                None
            }
        }
    }

    // Snapshots taken when the request was built.

    pub fn is_new_session(&self) -> bool {
        self.inner.is_new_session
    }

    pub fn initial_session_attributes(&self) -> &Map<String, Value> {
        &self.inner.session_attributes
    }

    pub fn initial_session_details(&self) -> &SessionDetails {
        &self.inner.session_details
    }

    pub fn initial_session_id(&self) -> Option<&str> {
        self.inner.session_id.as_deref()
    }

    fn str_at(&self, pointer: &str) -> Option<&str> {
        self.inner.body.pointer(pointer).and_then(Value::as_str)
    }
}
