//! External collaborators: config resolution, HTTP transport, logging.

pub mod config;
pub mod http;
pub mod logging;
