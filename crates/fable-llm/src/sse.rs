//! Server-Sent Events line reader shared by both protocol families.
//!
//! - buffers raw bytes until a full line is available
//! - yields the payload of `data:` lines
//! - skips blank lines, comments, other fields and the `[DONE]` sentinel
//! - flushes a trailing line that arrived without a newline

use std::fmt::Display;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};

use fable_core::errors::GatewayError;

/// Longest silence tolerated between body chunks.
pub const SSE_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// A `data:` payload that could not be understood. Never fatal to the stream.
#[derive(Debug, thiserror::Error)]
#[error("malformed stream chunk: {0}")]
pub struct StreamFormatError(pub String);

impl From<serde_json::Error> for StreamFormatError {
    fn from(err: serde_json::Error) -> Self {
        Self(err.to_string())
    }
}

/// Split a chunked body into SSE `data:` payloads.
///
/// A body read error or an idle gap longer than `idle_timeout` yields one
/// [`GatewayError::Network`] and ends the stream.
pub fn sse_data_lines<S, E>(
    byte_stream: S,
    idle_timeout: Duration,
) -> impl Stream<Item = Result<String, GatewayError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: Display,
{
    futures::stream::unfold(
        (byte_stream, BytesMut::with_capacity(8192), false),
        move |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }

            loop {
                if let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let mut line = buffer.split_to(newline_pos + 1);
                    line.truncate(newline_pos);
                    if line.last() == Some(&b'\r') {
                        line.truncate(line.len() - 1);
                    }
                    // Invalid UTF-8 lines are dropped.
                    if let Some(data) = std::str::from_utf8(&line).ok().and_then(extract_sse_data) {
                        return Some((Ok(data), (stream, buffer, false)));
                    }
                    continue;
                }

                match tokio::time::timeout(idle_timeout, stream.next()).await {
                    Ok(Some(Ok(chunk))) => buffer.extend_from_slice(&chunk),
                    Ok(Some(Err(e))) => {
                        let err = GatewayError::Network(format!("stream read failed: {e}"));
                        return Some((Err(err), (stream, buffer, true)));
                    }
                    Ok(None) => {
                        let rest = buffer.split();
                        let data = std::str::from_utf8(&rest).ok().and_then(extract_sse_data)?;
                        return Some((Ok(data), (stream, buffer, true)));
                    }
                    Err(_) => {
                        let err = GatewayError::Network(format!(
                            "idle timeout after {}s",
                            idle_timeout.as_secs()
                        ));
                        return Some((Err(err), (stream, buffer, true)));
                    }
                }
            }
        },
    )
}

/// Payload of a `data:` line, or `None` for anything that carries no data.
pub fn extract_sse_data(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }
    let data = trimmed.strip_prefix("data:")?.trim_start();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    Some(data.to_string())
}
