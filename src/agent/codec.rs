//! Line codec for agent output streams.
//!
//! Frames raw bytes on `\n` with [`tokio_util::codec::AnyDelimiterCodec`] and
//! a maximum line length, so a misbehaving agent cannot make the server
//! buffer an unterminated line of unbounded size. Lines are decoded lossily:
//! invalid UTF-8 becomes `U+FFFD` instead of an error. Both stdout (JSON
//! events) and stderr (diagnostics) are framed with it.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder};

use crate::{AppError, Result};

/// Maximum line length accepted from the agent: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Newline-delimited decoder with a fixed [`MAX_LINE_BYTES`] limit.
///
/// Lines longer than the limit decode to
/// [`AppError::Agent`]`("line too long: …")`; the codec then discards the
/// remainder of that line and resumes framing at the next newline.
#[derive(Debug)]
pub struct AgentLineCodec(AnyDelimiterCodec);

impl AgentLineCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(AnyDelimiterCodec::new_with_max_length(
            b"\n".to_vec(),
            Vec::new(),
            MAX_LINE_BYTES,
        ))
    }
}

impl Default for AgentLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for AgentLineCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0
            .decode(src)
            .map(|chunk| chunk.map(decode_line))
            .map_err(map_codec_error)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0
            .decode_eof(src)
            .map(|chunk| chunk.map(decode_line))
            .map_err(map_codec_error)
    }
}

fn decode_line(chunk: Bytes) -> String {
    let bytes = chunk.strip_suffix(b"\r").unwrap_or(&chunk[..]);
    String::from_utf8_lossy(bytes).into_owned()
}

fn map_codec_error(e: AnyDelimiterCodecError) -> AppError {
    match e {
        AnyDelimiterCodecError::MaxChunkLengthExceeded => {
            AppError::Agent(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
        }
        AnyDelimiterCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
