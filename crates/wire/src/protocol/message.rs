use bytes::{Buf, Bytes};

/// One frame of an HTTP message: either its head or a piece of its payload.
///
/// `T` is the head type, a request head on the sending side and a [`super::ResponseHeader`]
/// on the receiving side.
#[derive(Debug)]
pub enum Message<T, Data: Buf = Bytes> {
    Header(T),
    Payload(PayloadItem<Data>),
}

/// A piece of payload, or the marker that the payload is complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    Chunk(Data),
    Eof,
}

/// How the payload following a head is framed on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Exactly this many bytes, announced by `Content-Length`
    Length(u64),
    /// `Transfer-Encoding: chunked`
    Chunked,
    /// The payload runs until the peer closes the connection; only valid for responses
    UntilClose,
    /// No payload at all
    Empty,
}

impl PayloadSize {
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }

    /// Picks the framing for a body from its `size_hint`.
    pub fn from_exact(exact: Option<u64>) -> Self {
        match exact {
            Some(0) => PayloadSize::Empty,
            Some(length) => PayloadSize::Length(length),
            None => PayloadSize::Chunked,
        }
    }
}

impl<T> Message<T> {
    /// Returns the payload item, or `None` when this is a head
    pub fn into_payload_item(self) -> Option<PayloadItem> {
        match self {
            Message::Header(_) => None,
            Message::Payload(payload_item) => Some(payload_item),
        }
    }
}

impl<T> From<Bytes> for Message<T> {
    fn from(bytes: Bytes) -> Self {
        Self::Payload(PayloadItem::Chunk(bytes))
    }
}

impl<D: Buf> PayloadItem<D> {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }
}

impl PayloadItem {
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_hint_maps_to_framing() {
        assert_eq!(PayloadSize::from_exact(Some(0)), PayloadSize::Empty);
        assert_eq!(PayloadSize::from_exact(Some(12)), PayloadSize::Length(12));
        assert!(PayloadSize::from_exact(None).is_chunked());
    }
}
