//! Domain model module declarations.

pub mod auth;
pub mod conversation;
pub mod progress;
pub mod resource;
