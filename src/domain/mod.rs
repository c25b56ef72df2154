//! Domain layer: core types and the ports the application layer depends on.
//!
//! Mirrors the hexagonal split of the surrounding crate: `models` holds
//! plain data, `ports` holds the trait seams implemented by
//! `infrastructure`.

pub mod models;
pub mod ports;

pub use models::config::{HandlerDefaults, ResolvedOptions};
pub use models::event::Event;
pub use models::handler::{
    Handler, HandlerError, HandlerKind, HandlerOutcome, TaskContext, TypedHandler,
};
pub use models::task::{LogEntry, TaskInstance, TaskResult, TaskStatus};
pub use ports::{ServerClient, TaskDef};
