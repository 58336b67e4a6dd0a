//! Per-request dispatch state.
//!
//! A [`Turn`] is shared (through `Arc`) by the engine, the turn's
//! [`Response`] and its [`Done`](super::Done) callback. It owns the
//! settlement latch and the sender half of the channel the engine awaits.
//! Dropping the last handle without settling closes that channel.

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use tracing::Span;

use super::latch::{Latch, LatchState};
use super::recovery::with_recovery;
use super::Registry;
use crate::request::{Request, AUDIO_PLAYER_PREFIX};
use crate::response::{Response, ResponseDocument};
use crate::types::{Error, ErrorKind, Rejection};

pub(crate) type TurnResult = std::result::Result<ResponseDocument, Rejection>;

/// How a turn is being settled.
#[derive(Debug)]
pub(crate) enum Settlement {
    Resolve {
        cause: Option<Error>,
    },
    Reject {
        reason: String,
        cause: Option<Error>,
    },
}

impl Settlement {
    fn cause(&self) -> Option<&Error> {
        match self {
            Settlement::Resolve { cause } | Settlement::Reject { cause, .. } => cause.as_ref(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Turn {
    registry: Arc<Registry>,
    request: Request,
    category: Option<String>,
    span: Span,
    latch: Latch,
    outcome: Mutex<Option<oneshot::Sender<TurnResult>>>,
}

impl Turn {
    pub(crate) fn new(
        registry: Arc<Registry>,
        request: Request,
        category: Option<String>,
        span: Span,
        outcome: oneshot::Sender<TurnResult>,
    ) -> Self {
        Self {
            registry,
            request,
            category,
            span,
            latch: Latch::new(),
            outcome: Mutex::new(Some(outcome)),
        }
    }

    pub(crate) fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.latch.is_settled()
    }

    fn is_audio_player(&self) -> bool {
        self.category()
            .is_some_and(|c| c.starts_with(AUDIO_PLAYER_PREFIX))
    }

    /// FINALIZING: claim the latch, then snapshot session attributes, run the
    /// post hook and deliver the result. Only the call that claims the latch
    /// does any of this. Returns `true` if this call settled the turn.
    pub(crate) fn settle(&self, response: &Response, settlement: Settlement) -> bool {
        let _entered = self.span.enter();

        let target = match settlement {
            Settlement::Resolve { .. } => LatchState::Resolved,
            Settlement::Reject { .. } => LatchState::Rejected,
        };
        if !self.latch.try_settle(target) {
            tracing::debug!("turn already settled; ignoring {:?}", target);
            return false;
        }

        response.prepare(self.registry.config.persistent_session);
        self.fire_post(response, settlement.cause());

        let result = match settlement {
            Settlement::Resolve { .. } => Ok(response.document()),
            Settlement::Reject { reason, cause } => Err(Rejection::new(reason, cause)),
        };
        tracing::debug!(state = ?target, "turn settled");

        let sender = self
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sender) = sender {
            if sender.send(result).is_err() {
                tracing::debug!("dispatch caller went away before the turn settled");
            }
        }
        true
    }

    fn fire_post(&self, response: &Response, cause: Option<&Error>) {
        let Some(post) = &self.registry.post else {
            return;
        };
        let fired = with_recovery(
            || {
                post(&self.request, response, self.category(), cause);
                Ok(())
            },
            "post hook",
        );
        if let Err(e) = fired {
            tracing::warn!("post hook failed: {}", e);
        }
    }

    /// ERROR: route a handler, hook or dispatch error to the error hook or
    /// the message table, and fail the turn if it is still pending after that.
    pub(crate) fn handle_error(&self, error: Error, response: &Response) {
        let _entered = self.span.enter();

        if self.is_settled() {
            tracing::warn!("error after turn settled, ignoring: {}", error);
            return;
        }
        let kind = error.kind();
        tracing::error!(kind = %kind, "turn failed: {}", error);

        let config = &self.registry.config;
        if let Some(hook) = &self.registry.error_hook {
            let handled = with_recovery(
                || {
                    hook(&error, &self.request, response);
                    Ok(())
                },
                "error hook",
            );
            if let Err(e) = handled {
                tracing::warn!("error hook failed: {}", e);
            }
        } else if kind != ErrorKind::UnhandledException {
            if let Some(message) = config.messages.get(kind) {
                if self.is_audio_player() {
                    // Media-player turns cannot carry speech.
                    self.settle(
                        response,
                        Settlement::Reject {
                            reason: message.to_string(),
                            cause: Some(error),
                        },
                    );
                } else {
                    response.say(message);
                    self.settle(response, Settlement::Resolve { cause: Some(error) });
                }
                return;
            }
        }

        if !self.is_settled() {
            let prefix = config
                .messages
                .get(ErrorKind::UnhandledException)
                .unwrap_or("Unhandled exception");
            self.settle(
                response,
                Settlement::Reject {
                    reason: format!("{prefix}: {error}."),
                    cause: Some(error),
                },
            );
        }
    }
}
