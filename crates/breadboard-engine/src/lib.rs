/*!
 * Breadboard Engine
 *
 * This crate turns a device document into a running system: the registry
 * that owns every device, the dispatcher every action goes through, chains,
 * state-triggered event rules with their webhook adapter, a transport-agnostic
 * request router and the control loop that ties them together.
 */

#![warn(missing_docs)]

// Re-export core types
pub use breadboard_core::prelude;

// Re-export types from breadboard_core for convenience
pub use breadboard_core::types::{Parameters, Value};

pub mod action;
pub mod api;
pub mod chain;
pub mod document;
pub mod error;
pub mod events;
pub mod registry;
pub mod runtime;
pub mod webhook;

// Re-export main types for convenience
pub use action::{dispatch, ActionSpec};
pub use api::{Request, Response};
pub use document::{ChainDefinition, Document, EventAction, NetworkSettings, RuleDefinition};
pub use error::{
    ChainError, DispatchError, Error, EventActionError, Result, RuleError, StatusClass, WebhookError,
};
pub use events::{CascadeOverflow, EventReport, EventRule, RuleOutcome, RuleState};
pub use registry::Registry;
pub use runtime::{Runtime, RuntimeHandle};
pub use webhook::{
    HttpWebhookClient, Method, RecordingWebhookClient, WebhookClient, WebhookRequest, WebhookSpec,
};

/// Breadboard engine crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
