//! [`ResponseConsumer`](crate::reactor::ResponseConsumer) implementations.
//!
//! [`BufferingConsumer`] collects the whole body and leaves shaping and decoding to the engine.
//! [`StreamingResponseConsumer`] hands the response over as soon as the head is known and pipes
//! the body to the caller while it arrives.

mod buffering;
mod streaming;

pub use buffering::BufferingConsumer;
pub use streaming::{ReadyCallback, StreamPhase, StreamingResponseConsumer};

use http::HeaderMap;
use http::header::CONTENT_ENCODING;

/// The `Content-Encoding` header as a string, `None` if absent or not visible ASCII.
fn content_encoding(headers: &HeaderMap) -> Option<String> {
    headers.get(CONTENT_ENCODING).and_then(|value| value.to_str().ok()).map(str::to_owned)
}
