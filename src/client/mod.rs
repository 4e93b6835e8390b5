//! Client side of the execution stream.
//!
//! - `frame`: byte-level SSE frame reassembly.
//! - `timeline`: decoded events applied to an incremental timeline.
//! - `http`: a `reqwest` client that runs an execution end to end.

pub mod frame;
pub mod http;
pub mod timeline;

pub use frame::{FrameDecoder, SseFrame};
pub use http::RelayClient;
pub use timeline::{ClientEvent, ExecutionTimeline};
