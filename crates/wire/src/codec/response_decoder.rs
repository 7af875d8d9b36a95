use bytes::BytesMut;
use http::Method;
use tokio_util::codec::Decoder;

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeadDecoder;
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, ResponseHeader};

/// Decodes the response to a single request.
///
/// The decoder is created with the method of the request it answers, since that decides
/// whether the response can carry a body. While `payload_decoder` is `None` it is reading a
/// head; afterwards it yields payload items until `Eof`.
#[derive(Debug)]
pub struct ResponseDecoder {
    head_decoder: HeadDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl ResponseDecoder {
    pub fn new(request_method: &Method) -> Self {
        Self { head_decoder: HeadDecoder::new(request_method), payload_decoder: None }
    }

    fn decode_payload(&mut self, item: Option<PayloadItem>) -> Option<Message<(ResponseHeader, PayloadSize)>> {
        match item {
            Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
            Some(item @ PayloadItem::Eof) => {
                self.payload_decoder.take();
                Some(Message::Payload(item))
            }
            None => None,
        }
    }
}

impl Decoder for ResponseDecoder {
    type Item = Message<(ResponseHeader, PayloadSize)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let item = payload_decoder.decode(src)?;
            return Ok(self.decode_payload(item));
        }

        let message = match self.head_decoder.decode(src)? {
            Some((header, payload_size)) => {
                self.payload_decoder = Some(payload_size.into());
                Some(Message::Header((header, payload_size)))
            }
            None => None,
        };

        Ok(message)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let item = payload_decoder.decode_eof(src)?;
            return Ok(self.decode_payload(item));
        }

        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() => Ok(None),
            None => Err(ParseError::UnexpectedEof),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::StatusCode;
    use indoc::indoc;

    fn collect(decoder: &mut ResponseDecoder, buffer: &mut BytesMut, at_eof: bool) -> Vec<Message<(ResponseHeader, PayloadSize)>> {
        let mut messages = vec![];
        loop {
            let next = if at_eof { decoder.decode_eof(buffer) } else { decoder.decode(buffer) };
            match next.unwrap() {
                Some(message) => {
                    let done = matches!(&message, Message::Payload(PayloadItem::Eof));
                    messages.push(message);
                    if done {
                        return messages;
                    }
                }
                None => return messages,
            }
        }
    }

    #[test]
    fn chunked_response() {
        let str = indoc! {"
            HTTP/1.1 200 OK
            Content-Type: text/plain
            Transfer-Encoding: chunked

            7
            Mozilla
            9
            Developer
            0

            "};
        let mut buffer = BytesMut::from(str);
        let mut decoder = ResponseDecoder::new(&Method::GET);
        let mut messages = collect(&mut decoder, &mut buffer, false).into_iter();

        let Some(Message::Header((header, payload_size))) = messages.next() else { panic!("expect header") };
        assert_eq!(header.status(), StatusCode::OK);
        assert!(payload_size.is_chunked());

        let body: Vec<PayloadItem> = messages.filter_map(Message::into_payload_item).collect();
        assert_eq!(
            body,
            vec![PayloadItem::Chunk(Bytes::from_static(b"Mozilla")), PayloadItem::Chunk(Bytes::from_static(b"Developer")), PayloadItem::Eof]
        );
    }

    #[test]
    fn body_until_close() {
        let mut buffer = BytesMut::from(&b"HTTP/1.0 200 OK\r\n\r\nall of it"[..]);
        let mut decoder = ResponseDecoder::new(&Method::GET);

        let messages = collect(&mut decoder, &mut buffer, false);
        assert_eq!(messages.len(), 2);

        let tail = collect(&mut decoder, &mut buffer, true);
        assert_eq!(tail.len(), 1);
        assert!(matches!(tail[0], Message::Payload(PayloadItem::Eof)));
        assert!(decoder.decode_eof(&mut buffer).unwrap().is_none());
    }

    #[test]
    fn close_inside_head() {
        let mut buffer = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-"[..]);
        let mut decoder = ResponseDecoder::new(&Method::GET);
        assert!(matches!(decoder.decode_eof(&mut buffer), Err(ParseError::UnexpectedEof)));
    }
}
