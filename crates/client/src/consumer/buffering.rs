use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use micro_client_wire::protocol::ResponseHeader;
use tracing::trace;

use super::content_encoding;
use crate::error::TransportError;
use crate::reactor::{RawBody, RawResponse, ResponseConsumer};

/// Collects the complete response body in memory.
#[derive(Debug, Default)]
pub struct BufferingConsumer {
    head: Option<ResponseHeader>,
    body: BytesMut,
}

impl BufferingConsumer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResponseConsumer for BufferingConsumer {
    fn response_received(&mut self, head: ResponseHeader) -> Result<(), TransportError> {
        if self.head.is_some() {
            return Err(TransportError::protocol("received a second response head"));
        }
        self.head = Some(head);
        Ok(())
    }

    async fn content_received(&mut self, chunk: Bytes) -> Result<(), TransportError> {
        if self.head.is_none() {
            return Err(TransportError::protocol("received body before the response head"));
        }
        self.body.extend_from_slice(&chunk);
        Ok(())
    }

    async fn build_result(&mut self) -> Result<RawResponse, TransportError> {
        let head = self.head.take().ok_or_else(|| TransportError::protocol("response completed without a head"))?;
        let (status, version, headers) = head.into_parts();
        let content_encoding = content_encoding(&headers);
        trace!(%status, body_size = self.body.len(), "buffered response");
        Ok(RawResponse { status, version, headers, content_encoding, body: RawBody::Buffered(self.body.split().freeze()) })
    }

    fn failed(&mut self, cause: &TransportError) {
        trace!(cause = %cause, buffered = self.body.len(), "discarding buffered response");
        self.body.clear();
    }

    fn cancelled(&mut self) {
        self.body.clear();
    }
}
