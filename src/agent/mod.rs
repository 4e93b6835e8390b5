//! External coding-agent execution.
//!
//! - `codec`: bounded line framing for agent stdout and stderr.
//! - `normalizer`: agent JSON events to [`AgentProgressUpdate`](crate::models::progress::AgentProgressUpdate)s.
//! - `recovery`: remediation advice for failed runs.
//! - `spawner`: process creation with environment isolation.
//! - `driver`: the per-run state machine producing the progress stream.

pub mod codec;
pub mod driver;
pub mod normalizer;
pub mod recovery;
pub mod spawner;

pub use driver::{AgentDriver, AgentRun};
