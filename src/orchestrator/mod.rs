//! Execution orchestration.
//!
//! Turns an approved `agent_request` message into an agent run, forwards its
//! progress, and persists the outcome.

pub mod execution;

pub use execution::{ExecuteRequest, ExecutionEvent, ExecutionOrchestrator, PreparedExecution};
