//! Bodies delimited by `Content-Length`, see
//! [RFC 9112 Section 6.2](https://www.rfc-editor.org/rfc/rfc9112#section-6.2).

use std::cmp;

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::protocol::{ParseError, PayloadItem};

/// Yields whatever part of the remaining `length` is buffered, then `Eof`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    length: u64,
}

impl LengthDecoder {
    pub fn new(length: u64) -> Self {
        Self { length }
    }
}

impl Decoder for LengthDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.length == 0 {
            return Ok(Some(PayloadItem::Eof));
        }

        if src.is_empty() {
            return Ok(None);
        }

        let len = usize::try_from(cmp::min(self.length, src.len() as u64)).unwrap_or(src.len());
        let bytes = src.split_to(len).freeze();

        self.length -= bytes.len() as u64;
        Ok(Some(PayloadItem::Chunk(bytes)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None => Err(ParseError::UnexpectedEof),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_exactly_at_length() {
        let mut buffer = BytesMut::from(&b"1012345678HTTP/1.1 200 OK"[..]);

        let mut decoder = LengthDecoder::new(10);
        let item = decoder.decode(&mut buffer).unwrap().unwrap();

        assert_eq!(item.as_bytes().unwrap().as_ref(), b"1012345678");
        assert_eq!(&buffer[..], b"HTTP/1.1 200 OK");
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn partial_then_rest() {
        let mut decoder = LengthDecoder::new(6);
        let mut buffer = BytesMut::from(&b"abc"[..]);
        assert_eq!(decoder.decode(&mut buffer).unwrap(), Some(PayloadItem::Chunk("abc".into())));
        assert_eq!(decoder.length, 3);
        assert_eq!(decoder.decode(&mut buffer).unwrap(), None);

        buffer.extend_from_slice(b"def");
        assert_eq!(decoder.decode(&mut buffer).unwrap(), Some(PayloadItem::Chunk("def".into())));
        assert_eq!(decoder.decode(&mut buffer).unwrap(), Some(PayloadItem::Eof));
    }

    #[test]
    fn closed_before_length_reached() {
        let mut decoder = LengthDecoder::new(6);
        let mut buffer = BytesMut::from(&b"abc"[..]);
        assert!(decoder.decode_eof(&mut buffer).unwrap().unwrap().is_chunk());
        assert!(matches!(decoder.decode_eof(&mut buffer), Err(ParseError::UnexpectedEof)));
    }
}
