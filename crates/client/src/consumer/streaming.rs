use std::fmt;
use std::mem;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH};
use http::{HeaderMap, StatusCode, Version};
use micro_client_wire::protocol::ResponseHeader;
use tracing::{debug, trace, warn};

use super::content_encoding;
use crate::decoding::ContentDecoder;
use crate::error::{PipeClosed, StreamError, TransportError};
use crate::pipe::{PipeWriter, pipe};
use crate::reactor::{RawBody, RawResponse, ResponseConsumer};

/// Receives the response as soon as its head is known, with the body as a [`BodyStream`](crate::pipe::BodyStream).
pub type ReadyCallback = Box<dyn FnOnce(RawResponse) + Send>;

/// Where a [`StreamingResponseConsumer`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    AwaitingHeaders,
    /// The response was handed over, body bytes are being piped
    Streaming,
    ClosedComplete,
    ClosedError,
}

enum State {
    AwaitingHeaders,
    Streaming { writer: PipeWriter, decoder: Option<ContentDecoder> },
    ClosedComplete,
    ClosedError,
}

/// Hands a response to the caller at the moment its head arrives and pipes the body after it.
///
/// The response passed to the ready callback carries the read end of a bounded pipe. Body chunks
/// are written to the pipe as the reactor delivers them; a full pipe suspends
/// [`content_received`](ResponseConsumer::content_received), which stops the reactor from
/// reading further. Completion closes the pipe cleanly, while a failure or cancellation after
/// the head closes it with an error the reader observes once it has drained what was buffered.
/// If the reader goes away the next write aborts the exchange instead of waiting forever.
///
/// With decompression on, a body with a known `Content-Encoding` is decoded on its way into the
/// pipe. The exposed headers then lose `Content-Encoding` and `Content-Length`; the coding is
/// still reported in [`RawResponse::content_encoding`].
pub struct StreamingResponseConsumer {
    capacity: usize,
    decompress: bool,
    on_ready: Option<ReadyCallback>,
    delivered: Option<(StatusCode, Version, HeaderMap, Option<String>)>,
    state: State,
}

impl StreamingResponseConsumer {
    pub fn new<F>(capacity: usize, decompress: bool, on_ready: F) -> Self
    where
        F: FnOnce(RawResponse) + Send + 'static,
    {
        Self { capacity, decompress, on_ready: Some(Box::new(on_ready)), delivered: None, state: State::AwaitingHeaders }
    }

    pub fn phase(&self) -> StreamPhase {
        match self.state {
            State::AwaitingHeaders => StreamPhase::AwaitingHeaders,
            State::Streaming { .. } => StreamPhase::Streaming,
            State::ClosedComplete => StreamPhase::ClosedComplete,
            State::ClosedError => StreamPhase::ClosedError,
        }
    }

    fn close_with(&mut self, err: StreamError) {
        if let State::Streaming { writer, .. } = mem::replace(&mut self.state, State::ClosedError) {
            writer.fail(err);
        }
    }
}

async fn forward(writer: &mut PipeWriter, decoder: Option<&mut ContentDecoder>, chunk: Bytes) -> Result<(), StreamError> {
    let data = match decoder {
        Some(decoder) => {
            decoder.write(&chunk).map_err(StreamError::decode)?;
            decoder.take()
        }
        None => chunk,
    };
    if data.is_empty() {
        return Ok(());
    }
    writer.write(data).await.map_err(|PipeClosed| StreamError::Closed)
}

#[async_trait]
impl ResponseConsumer for StreamingResponseConsumer {
    fn response_received(&mut self, head: ResponseHeader) -> Result<(), TransportError> {
        if !matches!(self.state, State::AwaitingHeaders) {
            return Err(TransportError::protocol("received a second response head"));
        }

        let (status, version, mut headers) = head.into_parts();
        let content_encoding = content_encoding(&headers);
        let decoder = content_encoding.as_deref().filter(|_| self.decompress).and_then(ContentDecoder::select);
        if let Some(decoder) = &decoder {
            trace!(encoding = decoder.name(), "decoding streamed response body");
            headers.remove(CONTENT_ENCODING);
            headers.remove(CONTENT_LENGTH);
        }

        let (writer, reader) = pipe(self.capacity);
        self.state = State::Streaming { writer, decoder };
        self.delivered = Some((status, version, headers.clone(), content_encoding.clone()));

        let response = RawResponse { status, version, headers, content_encoding, body: RawBody::Stream(reader) };
        match self.on_ready.take() {
            Some(on_ready) => {
                debug!(%status, "response head ready, streaming body");
                on_ready(response);
            }
            None => warn!(%status, "streamed response has nobody to receive it"),
        }
        Ok(())
    }

    async fn content_received(&mut self, chunk: Bytes) -> Result<(), TransportError> {
        let result = match &mut self.state {
            State::Streaming { writer, decoder } => forward(writer, decoder.as_mut(), chunk).await,
            State::AwaitingHeaders => return Err(TransportError::protocol("received body before the response head")),
            State::ClosedComplete | State::ClosedError => return Err(TransportError::protocol("received body after the stream was closed")),
        };

        result.map_err(|e| {
            debug!(cause = %e, "stopped streaming response body");
            self.close_with(e.clone());
            TransportError::consumer_aborted(e)
        })
    }

    async fn build_result(&mut self) -> Result<RawResponse, TransportError> {
        let (mut writer, decoder) = match mem::replace(&mut self.state, State::ClosedComplete) {
            State::Streaming { writer, decoder } => (writer, decoder),
            previous => {
                self.state = previous;
                return Err(TransportError::protocol("response completed before its head"));
            }
        };

        if let Some(decoder) = decoder {
            let tail = match decoder.finish() {
                Ok(tail) => tail,
                Err(e) => {
                    let e = StreamError::decode(e);
                    self.state = State::ClosedError;
                    writer.fail(e.clone());
                    return Err(TransportError::consumer_aborted(e));
                }
            };
            if !tail.is_empty() && writer.write(tail).await.is_err() {
                self.state = State::ClosedError;
                return Err(TransportError::consumer_aborted(StreamError::Closed));
            }
        }
        writer.finish();
        trace!("streamed response body complete");

        let (status, version, headers, content_encoding) =
            self.delivered.take().ok_or_else(|| TransportError::protocol("response completed before its head"))?;
        Ok(RawResponse { status, version, headers, content_encoding, body: RawBody::Streamed })
    }

    fn failed(&mut self, cause: &TransportError) {
        match self.state {
            State::Streaming { .. } => {
                debug!(cause = %cause, "response body failed after the head was handed over");
                self.close_with(StreamError::from(cause.clone()));
            }
            State::AwaitingHeaders => self.state = State::ClosedError,
            State::ClosedComplete | State::ClosedError => {}
        }
    }

    fn cancelled(&mut self) {
        match self.state {
            State::Streaming { .. } => {
                debug!("response body cancelled after the head was handed over");
                self.close_with(StreamError::Cancelled);
            }
            State::AwaitingHeaders => self.state = State::ClosedError,
            State::ClosedComplete | State::ClosedError => {}
        }
    }
}

impl fmt::Debug for StreamingResponseConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingResponseConsumer")
            .field("capacity", &self.capacity)
            .field("decompress", &self.decompress)
            .field("phase", &self.phase())
            .finish()
    }
}
