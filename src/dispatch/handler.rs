//! Handler signatures and the completion callback.

use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::turn::Turn;
use crate::request::Request;
use crate::response::Response;
use crate::types::{Error, Result};

/// Future returned by asynchronous handlers.
pub type HandlerFuture = BoxFuture<'static, Result<()>>;

/// Intent, launch, session-ended and media-player event handler.
pub type Handler = Arc<dyn Fn(Request, Response, Done) -> HandlerOutcome + Send + Sync>;

/// Runs before dispatch; may settle the response to skip the handler.
pub type PreHook = Arc<dyn Fn(&Request, &Response, Option<&str>) -> Result<()> + Send + Sync>;

/// Runs once per turn just before it settles. Never awaited.
pub type PostHook =
    Arc<dyn Fn(&Request, &Response, Option<&str>, Option<&Error>) + Send + Sync>;

/// Replaces the built-in recovery for handler errors.
pub type ErrorHook = Arc<dyn Fn(&Error, &Request, &Response) + Send + Sync>;

/// What a handler hands back to the engine.
pub enum HandlerOutcome {
    /// Finished before returning; the engine completes the turn with this result.
    Sync(Result<()>),

    /// Legacy mode: nothing is auto-completed. The handler keeps its
    /// [`Done`] or [`Response`] and finishes the turn later. Deprecated in
    /// favour of [`HandlerOutcome::Async`].
    Deferred,

    /// The engine awaits the future and completes the turn with its output.
    Async(HandlerFuture),
}

impl HandlerOutcome {
    /// Immediate success.
    pub fn done() -> Self {
        HandlerOutcome::Sync(Ok(()))
    }

    pub fn future<F>(future: F) -> Self
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        HandlerOutcome::Async(Box::pin(future))
    }
}

impl From<Result<()>> for HandlerOutcome {
    fn from(result: Result<()>) -> Self {
        HandlerOutcome::Sync(result)
    }
}

impl fmt::Debug for HandlerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerOutcome::Sync(result) => f.debug_tuple("Sync").field(result).finish(),
            HandlerOutcome::Deferred => f.write_str("Deferred"),
            HandlerOutcome::Async(_) => f.write_str("Async(..)"),
        }
    }
}

/// Completion callback handed to every handler.
///
/// Clones share one guard: the first [`Done::complete`] wins, later calls
/// only log a warning.
#[derive(Clone)]
pub struct Done {
    turn: Arc<Turn>,
    response: Response,
    called: Arc<AtomicBool>,
}

impl Done {
    pub(crate) fn new(turn: Arc<Turn>, response: Response) -> Self {
        Self {
            turn,
            response,
            called: Arc::new(AtomicBool::new(false)),
        }
    }

    /// `Ok` sends the response; `Err` enters the error path.
    pub fn complete(&self, outcome: Result<()>) {
        if self.called.swap(true, Ordering::AcqRel) {
            let _entered = self.turn.span().enter();
            tracing::warn!("done callback invoked more than once; ignoring");
            return;
        }
        match outcome {
            Ok(()) => {
                self.response.send();
            }
            Err(error) => self.turn.handle_error(error, &self.response),
        }
    }

    pub fn succeed(&self) {
        self.complete(Ok(()));
    }

    pub fn fail(&self, error: Error) {
        self.complete(Err(error));
    }

    pub fn is_called(&self) -> bool {
        self.called.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Done {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Done")
            .field("called", &self.is_called())
            .field("settled", &self.turn.is_settled())
            .finish()
    }
}
