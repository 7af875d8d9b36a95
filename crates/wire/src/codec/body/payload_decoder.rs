use bytes::BytesMut;
use tokio_util::codec::Decoder;

use super::{ChunkedDecoder, LengthDecoder, UntilCloseDecoder};
use crate::protocol::{ParseError, PayloadItem, PayloadSize};

/// Response body decoder for whichever framing the response head announced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadDecoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Length(LengthDecoder),
    Chunked(ChunkedDecoder),
    UntilClose(UntilCloseDecoder),
    NoBody,
}

impl PayloadDecoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedDecoder::new()) }
    }

    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthDecoder::new(size)) }
    }

    pub fn until_close() -> Self {
        Self { kind: Kind::UntilClose(UntilCloseDecoder::new()) }
    }
}

impl From<PayloadSize> for PayloadDecoder {
    fn from(payload_size: PayloadSize) -> Self {
        match payload_size {
            PayloadSize::Length(size) => PayloadDecoder::fix_length(size),
            PayloadSize::Chunked => PayloadDecoder::chunked(),
            PayloadSize::UntilClose => PayloadDecoder::until_close(),
            PayloadSize::Empty => PayloadDecoder::empty(),
        }
    }
}

impl Decoder for PayloadDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Length(decoder) => decoder.decode(src),
            Kind::Chunked(decoder) => decoder.decode(src),
            Kind::UntilClose(decoder) => decoder.decode(src),
            Kind::NoBody => Ok(Some(PayloadItem::Eof)),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Length(decoder) => decoder.decode_eof(src),
            Kind::Chunked(decoder) => decoder.decode_eof(src),
            Kind::UntilClose(decoder) => decoder.decode_eof(src),
            Kind::NoBody => Ok(Some(PayloadItem::Eof)),
        }
    }
}
