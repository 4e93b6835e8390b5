#![forbid(unsafe_code)]

//! Agent execution progress pipeline: runs an external coding-agent CLI,
//! normalizes its event stream, and relays progress to chat clients over
//! Server-Sent Events, persisting successful runs as reusable resources.

pub mod agent;
pub mod client;
pub mod config;
pub mod errors;
pub mod http;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod resources;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
