//! Dispatch engine.
//!
//! A [`SkillBuilder`] collects handlers and hooks; [`SkillBuilder::build`]
//! freezes them into an immutable, `Arc`-shared registry inside a
//! [`Skill`]. Each call to [`Skill::dispatch`] runs one turn:
//!
//! ```text
//!  PENDING → RUNNING_PRE → DISPATCHING → AWAITING_HANDLER → FINALIZING → RESOLVED
//!                 │              │               │                   └──→ REJECTED
//!                 └──────────────┴───────────────┴──→ ERROR ──→ FINALIZING
//! ```
//!
//! Whatever fires first (the handler's return value, its [`Done`] callback,
//! or `Response::send`/`fail`) settles the turn; everything after that is
//! ignored. The post hook runs exactly once, inside the winning completion,
//! before the result is delivered.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::Instrument;
use uuid::Uuid;

use crate::request::{Request, RequestKind};
use crate::response::{Response, ResponseDocument};
use crate::types::{Config, Error, Rejection, Result};

mod handler;
mod latch;
mod recovery;
pub(crate) mod turn;

pub use handler::{
    Done, ErrorHook, Handler, HandlerFuture, HandlerOutcome, PostHook, PreHook,
};
pub use latch::LatchState;
pub use recovery::{with_recovery, with_recovery_async};

use turn::Turn;

// =============================================================================
// Registry
// =============================================================================

/// Frozen handler tables and hooks.
pub(crate) struct Registry {
    pub(crate) config: Config,
    intents: HashMap<String, Handler>,
    audio_player: HashMap<String, Handler>,
    launch: Option<Handler>,
    session_ended: Option<Handler>,
    pub(crate) pre: Option<PreHook>,
    pub(crate) post: Option<PostHook>,
    pub(crate) error_hook: Option<ErrorHook>,
}

impl Registry {
    fn new(config: Config) -> Self {
        Self {
            config,
            intents: HashMap::new(),
            audio_player: HashMap::new(),
            launch: None,
            session_ended: None,
            pre: None,
            post: None,
            error_hook: None,
        }
    }

    /// DISPATCHING: pick the handler for this request. `Ok(None)` means the
    /// category has no required handler and the turn succeeds unchanged.
    fn locate(&self, request: &Request, category: Option<&str>) -> Result<Option<Handler>> {
        match category.map(RequestKind::classify) {
            Some(RequestKind::Intent) => {
                let name = request.intent_name().unwrap_or_default();
                tracing::debug!(intent = name, "dispatching intent");
                self.intents
                    .get(name)
                    .cloned()
                    .map(Some)
                    .ok_or_else(|| Error::NoIntentFound(name.to_string()))
            }
            Some(RequestKind::Launch) => self
                .launch
                .clone()
                .map(Some)
                .ok_or(Error::NoLaunchFunction),
            Some(RequestKind::SessionEnded) => Ok(self.session_ended.clone()),
            Some(RequestKind::AudioPlayer(event)) => {
                let handler = self.audio_player.get(event).cloned();
                if handler.is_none() {
                    tracing::debug!(event, "no media-player handler registered");
                }
                Ok(handler)
            }
            Some(RequestKind::Unknown(other)) => {
                Err(Error::InvalidRequestType(Some(other.to_string())))
            }
            None => Err(Error::InvalidRequestType(None)),
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut intents: Vec<&String> = self.intents.keys().collect();
        intents.sort();
        let mut events: Vec<&String> = self.audio_player.keys().collect();
        events.sort();
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("intents", &intents)
            .field("audio_player", &events)
            .field("launch", &self.launch.is_some())
            .field("session_ended", &self.session_ended.is_some())
            .field("pre", &self.pre.is_some())
            .field("post", &self.post.is_some())
            .field("error_hook", &self.error_hook.is_some())
            .finish()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Collects registrations before serving.
#[derive(Debug)]
pub struct SkillBuilder {
    registry: Registry,
}

impl SkillBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            registry: Registry::new(config),
        }
    }

    /// Register the handler for an intent name.
    pub fn intent<F>(&mut self, name: impl Into<String>, handler: F) -> Result<&mut Self>
    where
        F: Fn(Request, Response, Done) -> HandlerOutcome + Send + Sync + 'static,
    {
        let name = name.into();
        register(&mut self.registry.intents, "intent", name, Arc::new(handler))?;
        Ok(self)
    }

    /// Register the handler for a media-player event (`PlaybackStarted`,
    /// `PlaybackFinished`, ...), named without the `AudioPlayer.` prefix.
    pub fn audio_player<F>(&mut self, event: impl Into<String>, handler: F) -> Result<&mut Self>
    where
        F: Fn(Request, Response, Done) -> HandlerOutcome + Send + Sync + 'static,
    {
        let event = event.into();
        register(
            &mut self.registry.audio_player,
            "media-player event",
            event,
            Arc::new(handler),
        )?;
        Ok(self)
    }

    pub fn launch<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(Request, Response, Done) -> HandlerOutcome + Send + Sync + 'static,
    {
        if self.registry.launch.replace(Arc::new(handler)).is_some() {
            tracing::warn!("launch handler replaced");
        }
        self
    }

    pub fn session_ended<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(Request, Response, Done) -> HandlerOutcome + Send + Sync + 'static,
    {
        if self.registry.session_ended.replace(Arc::new(handler)).is_some() {
            tracing::warn!("session-ended handler replaced");
        }
        self
    }

    pub fn pre<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&Request, &Response, Option<&str>) -> Result<()> + Send + Sync + 'static,
    {
        self.registry.pre = Some(Arc::new(hook));
        self
    }

    pub fn post<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&Request, &Response, Option<&str>, Option<&Error>) + Send + Sync + 'static,
    {
        self.registry.post = Some(Arc::new(hook));
        self
    }

    pub fn error<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&Error, &Request, &Response) + Send + Sync + 'static,
    {
        self.registry.error_hook = Some(Arc::new(hook));
        self
    }

    /// Freeze registrations.
    pub fn build(self) -> Skill {
        tracing::debug!(
            intents = self.registry.intents.len(),
            audio_player_events = self.registry.audio_player.len(),
            "skill built"
        );
        Skill {
            registry: Arc::new(self.registry),
        }
    }
}

impl Default for SkillBuilder {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

fn register(
    table: &mut HashMap<String, Handler>,
    what: &str,
    name: String,
    handler: Handler,
) -> Result<()> {
    if name.is_empty() {
        return Err(Error::validation(format!("{what} name cannot be empty")));
    }
    if table.contains_key(&name) {
        return Err(Error::validation(format!(
            "{what} handler already registered: {name}"
        )));
    }
    tracing::debug!("registered {} handler: {}", what, name);
    table.insert(name, handler);
    Ok(())
}

// =============================================================================
// Skill
// =============================================================================

/// Immutable dispatch engine. Cheap to clone and safe to share across tasks.
#[derive(Debug, Clone)]
pub struct Skill {
    registry: Arc<Registry>,
}

impl Skill {
    pub fn builder(config: Config) -> SkillBuilder {
        SkillBuilder::new(config)
    }

    pub fn config(&self) -> &Config {
        &self.registry.config
    }

    pub fn has_intent(&self, name: &str) -> bool {
        self.registry.intents.contains_key(name)
    }

    /// Registered intent names, sorted.
    pub fn intent_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.intents.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run one turn for a decoded request envelope.
    ///
    /// Resolves with the response document, or rejects with the reason the
    /// turn failed. Settles exactly once whatever the handler does.
    pub async fn dispatch(&self, body: Value) -> std::result::Result<ResponseDocument, Rejection> {
        let (tx, rx) = oneshot::channel();
        let request = Request::from_envelope(body);
        let category = request.category().map(str::to_string);
        let span = tracing::info_span!(
            "turn",
            turn_id = %Uuid::new_v4(),
            category = category.as_deref().unwrap_or("<none>"),
        );
        if category.is_none() {
            tracing::error!(parent: &span, "request envelope has no request.type; cannot classify");
        }

        let turn = Arc::new(Turn::new(
            self.registry.clone(),
            request.clone(),
            category,
            span.clone(),
            tx,
        ));
        let response = Response::attached(
            request.session().clone(),
            &self.registry.config.version,
            turn.clone(),
        );

        let pending = span.in_scope(|| self.begin(&turn, &request, &response));
        if let Some((future, done)) = pending {
            let outcome = with_recovery_async(future, "handler")
                .instrument(span.clone())
                .await;
            done.complete(outcome);
        }

        // Only handles held by the handler may still settle the turn.
        drop(response);
        drop(turn);

        match rx.await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(parent: &span, "turn abandoned: every completion handle dropped");
                Err(Rejection::abandoned())
            }
        }
    }

    /// RUNNING_PRE → DISPATCHING → AWAITING_HANDLER. Returns the handler's
    /// future when completion is asynchronous.
    fn begin(
        &self,
        turn: &Arc<Turn>,
        request: &Request,
        response: &Response,
    ) -> Option<(HandlerFuture, Done)> {
        if let Some(pre) = &self.registry.pre {
            let outcome = with_recovery(|| pre(request, response, turn.category()), "pre hook");
            if let Err(e) = outcome {
                turn.handle_error(e, response);
                return None;
            }
            if turn.is_settled() {
                tracing::debug!("pre hook settled the turn; skipping dispatch");
                return None;
            }
        }

        let handler = match self.registry.locate(request, turn.category()) {
            Ok(Some(handler)) => handler,
            Ok(None) => {
                response.send();
                return None;
            }
            Err(e) => {
                turn.handle_error(e, response);
                return None;
            }
        };

        let done = Done::new(turn.clone(), response.clone());
        let returned = with_recovery(
            || Ok(handler(request.clone(), response.clone(), done.clone())),
            "handler",
        );
        match returned {
            Err(e) => {
                turn.handle_error(e, response);
                None
            }
            Ok(HandlerOutcome::Sync(outcome)) => {
                done.complete(outcome);
                None
            }
            Ok(HandlerOutcome::Deferred) => {
                tracing::warn!(
                    "handler returned HandlerOutcome::Deferred; this completion mode is \
                     deprecated, return HandlerOutcome::Async instead"
                );
                None
            }
            Ok(HandlerOutcome::Async(future)) => Some((future, done)),
        }
    }
}
