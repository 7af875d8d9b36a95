use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;

use super::{ChunkedEncoder, LengthEncoder};
use crate::protocol::{PayloadItem, PayloadSize, SendError};

/// Request body encoder for whichever framing the request head announced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEncoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Length(LengthEncoder),
    Chunked(ChunkedEncoder),
    NoBody,
}

impl PayloadEncoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedEncoder::new()) }
    }

    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthEncoder::new(size)) }
    }

    pub fn is_finish(&self) -> bool {
        match &self.kind {
            Kind::Length(encoder) => encoder.is_finish(),
            Kind::Chunked(encoder) => encoder.is_finish(),
            Kind::NoBody => true,
        }
    }
}

impl TryFrom<PayloadSize> for PayloadEncoder {
    type Error = SendError;

    fn try_from(payload_size: PayloadSize) -> Result<Self, Self::Error> {
        match payload_size {
            PayloadSize::Length(size) => Ok(PayloadEncoder::fix_length(size)),
            PayloadSize::Chunked => Ok(PayloadEncoder::chunked()),
            PayloadSize::Empty => Ok(PayloadEncoder::empty()),
            PayloadSize::UntilClose => Err(SendError::invalid_head("a request body can't be delimited by closing the connection")),
        }
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for PayloadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match &mut self.kind {
            Kind::Length(encoder) => encoder.encode(item, dst),
            Kind::Chunked(encoder) => encoder.encode(item, dst),
            Kind::NoBody => Ok(()),
        }
    }
}
