//! Response builder.
//!
//! [`Response`] is a cheap, clonable handle over one turn's outbound
//! document. Builder methods take `&self` and return `&Self`, so handlers
//! can chain calls on a shared handle:
//!
//! ```
//! use skill_core::response::Response;
//! use skill_core::session::Session;
//!
//! let response = Response::new(Session::unavailable());
//! response.say("Hello").say(" world").should_end_session(false, Some("Anything else?"));
//! assert_eq!(response.speech().as_deref(), Some("<speak>Hello world</speak>"));
//! ```
//!
//! `send` and `fail` are the terminal operations. On a response created by
//! the dispatch engine they settle the turn; the first call wins.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::dispatch::turn::{Settlement, Turn};
use crate::session::Session;
use crate::ssml;

pub mod card;
pub mod directives;
pub mod document;

pub use card::{Card, CardError, CardImage, CardKind, CardSpec};
pub use directives::{AudioItem, ClearBehavior, Directive, PlayBehavior, Stream, StreamError};
pub use document::{OutputSpeech, Reprompt, ResponseBody, ResponseDocument};

/// Shared handle to the outbound response of one turn.
#[derive(Debug, Clone)]
pub struct Response {
    document: Arc<Mutex<ResponseDocument>>,
    session: Session,
    turn: Option<Arc<Turn>>,
}

impl Response {
    /// Standalone builder not bound to any dispatch.
    pub fn new(session: Session) -> Self {
        Self {
            document: Arc::new(Mutex::new(ResponseDocument::default())),
            session,
            turn: None,
        }
    }

    pub(crate) fn attached(session: Session, version: &str, turn: Arc<Turn>) -> Self {
        Self {
            document: Arc::new(Mutex::new(ResponseDocument::new(version))),
            session,
            turn: Some(turn),
        }
    }

    // =========================================================================
    // Speech
    // =========================================================================

    /// Append to the output speech, keeping a single `<speak>` envelope.
    pub fn say(&self, text: &str) -> &Self {
        let mut doc = self.lock();
        let current = doc.response.output_speech.as_ref().map(|s| s.ssml().to_string());
        doc.response.output_speech = Some(OutputSpeech::Ssml {
            ssml: ssml::append(current.as_deref(), text),
        });
        self
    }

    /// Reset the output speech to an empty envelope.
    pub fn clear(&self) -> &Self {
        self.lock().response.output_speech = Some(OutputSpeech::Ssml {
            ssml: ssml::wrap(""),
        });
        self
    }

    /// Append to the reprompt speech.
    pub fn reprompt(&self, text: &str) -> &Self {
        let mut doc = self.lock();
        let current = doc
            .response
            .reprompt
            .as_ref()
            .map(|r| r.output_speech.ssml().to_string());
        doc.response.reprompt = Some(Reprompt {
            output_speech: OutputSpeech::Ssml {
                ssml: ssml::append(current.as_deref(), text),
            },
        });
        self
    }

    pub fn should_end_session(&self, end: bool, reprompt: Option<&str>) -> &Self {
        self.lock().response.should_end_session = end;
        if let Some(text) = reprompt {
            self.reprompt(text);
        }
        self
    }

    // =========================================================================
    // Cards
    // =========================================================================

    /// Attach a card. An invalid descriptor is logged and ignored.
    pub fn card(&self, spec: CardSpec) -> &Self {
        match spec.validate() {
            Ok(card) => self.lock().response.card = Some(card),
            Err(e) => tracing::error!(?spec, "invalid card, response left unchanged: {}", e),
        }
        self
    }

    pub fn link_account(&self) -> &Self {
        self.lock().response.card = Some(Card::LinkAccount);
        self
    }

    // =========================================================================
    // Media-player directives
    // =========================================================================

    pub fn play(&self, play_behavior: PlayBehavior, audio_item: AudioItem) -> &Self {
        self.push_directive(Directive::Play {
            play_behavior,
            audio_item,
        })
    }

    /// Play a stream after checking it against platform constraints. An
    /// invalid stream is logged and ignored.
    pub fn play_stream(&self, play_behavior: PlayBehavior, stream: Stream) -> &Self {
        if let Err(e) = stream.validate() {
            tracing::error!(?stream, "invalid stream, directive skipped: {}", e);
            return self;
        }
        self.play(play_behavior, AudioItem { stream })
    }

    pub fn stop(&self) -> &Self {
        self.push_directive(Directive::Stop)
    }

    pub fn clear_queue(&self, clear_behavior: ClearBehavior) -> &Self {
        self.push_directive(Directive::ClearQueue { clear_behavior })
    }

    fn push_directive(&self, directive: Directive) -> &Self {
        self.lock().response.directives.push(directive);
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Snapshot of the document as built so far.
    pub fn document(&self) -> ResponseDocument {
        self.lock().clone()
    }

    pub fn speech(&self) -> Option<String> {
        self.lock()
            .response
            .output_speech
            .as_ref()
            .map(|s| s.ssml().to_string())
    }

    /// Whether the owning turn has settled. Always `false` when detached.
    pub fn is_resolved(&self) -> bool {
        self.turn.as_ref().is_some_and(|t| t.is_settled())
    }

    // =========================================================================
    // Terminal operations
    // =========================================================================

    /// Resolve the turn with this document. Returns `true` if this call
    /// settled it.
    pub fn send(&self) -> bool {
        self.finish(Settlement::Resolve { cause: None })
    }

    /// Reject the turn with `reason`. Returns `true` if this call settled it.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.finish(Settlement::Reject {
            reason: reason.into(),
            cause: None,
        })
    }

    fn finish(&self, settlement: Settlement) -> bool {
        match &self.turn {
            Some(turn) => turn.settle(self, settlement),
            None => {
                tracing::warn!("response is not attached to a dispatch; nothing to settle");
                false
            }
        }
    }

    /// Copy the session attributes into the document.
    pub(crate) fn prepare(&self, persist_session: bool) {
        let attributes = if persist_session {
            self.session.attributes()
        } else {
            serde_json::Map::new()
        };
        self.lock().session_attributes = attributes;
    }

    fn lock(&self) -> MutexGuard<'_, ResponseDocument> {
        self.document.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
