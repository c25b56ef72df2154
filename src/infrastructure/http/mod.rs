pub mod auth;
pub mod client;
pub mod error;

pub use client::ServerClientImpl;
pub use error::HttpError;
