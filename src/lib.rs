//! # Skill Core - Voice-Assistant Request Dispatch
//!
//! Routes decoded voice-assistant request envelopes to registered handlers
//! and assembles the structured response document:
//! - Intent, launch, session-ended and media-player event dispatch
//! - Pre/post hooks and a pluggable error hook
//! - Built-in recovery messages per error kind
//! - Response builder for speech, reprompts, cards and media directives
//! - Session attribute tracking echoed back on every response
//!
//! ## Architecture
//!
//! ```text
//!                     ┌──────────────────────────────────────┐
//!   request JSON  →   │                Skill                 │
//!                     │  ┌──────────┐  ┌──────────────────┐  │
//!                     │  │ Registry │  │ Turn (per call)  │  │
//!                     │  │ handlers │→ │ latch, post hook │  │  → ResponseDocument
//!                     │  │  hooks   │  │ error recovery   │  │    or Rejection
//!                     │  └──────────┘  └──────────────────┘  │
//!                     └──────────────────────────────────────┘
//! ```
//!
//! Transport is out of scope: callers decode the body, call
//! [`Skill::dispatch`], and serialize whatever comes back.

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod dispatch;
pub mod request;
pub mod response;
pub mod session;
pub mod ssml;
pub mod types;

// Internal utilities
pub mod observability;

pub use dispatch::{Done, HandlerOutcome, Skill, SkillBuilder};
pub use request::Request;
pub use response::{Response, ResponseDocument};
pub use session::Session;
pub use types::{Config, Error, ErrorKind, Messages, Rejection, Result};
