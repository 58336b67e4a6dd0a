//! Per-turn session attribute store.
//!
//! A [`Session`] is rebuilt from the inbound envelope on every request and
//! lives for one dispatch. Handles are cheap clones sharing one store, so
//! the request, the response builder and the handler all see the same
//! attributes. Reads hand out owned copies; only [`Session::set`] and
//! [`Session::clear`] change what later reads observe.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::types::{Error, Result};

/// Platform-provided session details.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Raw attributes exactly as they arrived.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl SessionDetails {
    fn from_payload(session: &Value) -> Self {
        let text = |ptr: &str| session.pointer(ptr).and_then(Value::as_str).map(str::to_string);
        Self {
            access_token: text("/user/accessToken"),
            attributes: session.get("attributes").cloned(),
            application_id: text("/application/applicationId"),
            new: session.get("new").cloned(),
            session_id: text("/sessionId"),
            user_id: text("/user/userId"),
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    attributes: Map<String, Value>,
}

/// Shared handle to one turn's session.
#[derive(Debug, Clone)]
pub struct Session {
    available: bool,
    details: Arc<SessionDetails>,
    state: Arc<Mutex<SessionState>>,
}

impl Session {
    /// Build from the envelope's `session` block. `None` or JSON `null`
    /// produces an unavailable session.
    pub fn from_envelope(session: Option<&Value>) -> Self {
        match session {
            Some(payload) if !payload.is_null() => {
                let attributes = payload
                    .get("attributes")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                Self {
                    available: true,
                    details: Arc::new(SessionDetails::from_payload(payload)),
                    state: Arc::new(Mutex::new(SessionState { attributes })),
                }
            }
            _ => Self::unavailable(),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            details: Arc::new(SessionDetails::default()),
            state: Arc::new(Mutex::new(SessionState::default())),
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    /// True only when the platform sent `"new": true`.
    pub fn is_new(&self) -> Result<bool> {
        self.require()?;
        Ok(matches!(self.details.new, Some(Value::Bool(true))))
    }

    /// Copy of one attribute.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        self.require()?;
        Ok(self.lock().attributes.get(key).cloned())
    }

    /// Copy of the whole attribute mapping; empty when unavailable.
    pub fn attributes(&self) -> Map<String, Value> {
        self.lock().attributes.clone()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        self.require()?;
        self.lock().attributes.insert(key.into(), value.into());
        Ok(())
    }

    /// Remove `key` if present; with no key, or an absent one, reset the
    /// whole mapping.
    pub fn clear(&self, key: Option<&str>) -> Result<()> {
        self.require()?;
        let mut state = self.lock();
        match key {
            Some(k) if state.attributes.contains_key(k) => {
                state.attributes.remove(k);
            }
            _ => state.attributes.clear(),
        }
        Ok(())
    }

    pub fn details(&self) -> &SessionDetails {
        &self.details
    }

    pub fn session_id(&self) -> Option<&str> {
        self.details.session_id.as_deref()
    }

    fn require(&self) -> Result<()> {
        if self.available {
            Ok(())
        } else {
            Err(Error::NoSessionAvailable)
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
