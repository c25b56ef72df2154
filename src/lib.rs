//! A Conductor-style task-worker runtime: poll for work, dispatch to
//! user-supplied handlers, and report results back to the server.
//!
//! See [`application::Supervisor`] for the embedding entry point.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::models::config::{HandlerDefaults, ResolvedOptions};
pub use domain::models::handler::{Handler, HandlerError, HandlerKind, HandlerOutcome, TaskContext, TypedHandler};
pub use domain::ports::{ServerClient, TaskDef};
