use std::fmt::Display;

use futures::{SinkExt, StreamExt};
use http::{Method, Request};
use http_body::Body;
use http_body_util::BodyExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::trace;

use crate::codec::{RequestEncoder, ResponseDecoder};
use crate::protocol::{HttpError, Message, ParseError, PayloadItem, PayloadSize, RequestHead, ResponseHeader, SendError};

/// Client end of a single HTTP/1.1 exchange.
///
/// The connection writes one request and reads back the response to it: first the head with
/// [`read_head`](Self::read_head), then the body with repeated calls to
/// [`read_payload`](Self::read_payload) until it yields [`PayloadItem::Eof`]. Connections are
/// not reused afterwards.
///
/// # Type Parameters
///
/// * `R`: the readable half of the transport
/// * `W`: the writable half of the transport
#[derive(Debug)]
pub struct ClientConnection<R, W> {
    framed_read: FramedRead<R, ResponseDecoder>,
    framed_write: FramedWrite<W, RequestEncoder>,
}

impl<R, W> ClientConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a connection whose response decoding follows the rules for `request_method`
    pub fn new(reader: R, writer: W, request_method: &Method) -> Self {
        Self {
            framed_read: FramedRead::with_capacity(reader, ResponseDecoder::new(request_method), 8 * 1024),
            framed_write: FramedWrite::new(writer, RequestEncoder::new()),
        }
    }

    /// Writes a full request and flushes it.
    ///
    /// The framing follows the body's `size_hint`: an exact size is sent with
    /// `Content-Length`, anything else with chunked transfer coding.
    pub async fn send_request<B>(&mut self, request: Request<B>) -> Result<(), HttpError>
    where
        B: Body + Unpin,
        B::Error: Display,
    {
        let (parts, mut body) = request.into_parts();
        let payload_size = PayloadSize::from_exact(body.size_hint().exact());

        let head = Message::<_, B::Data>::Header((RequestHead::from_parts(parts, ()), payload_size));
        if payload_size.is_empty() {
            self.framed_write.send(head).await?;
            return Ok(());
        }
        // buffered until the first chunk is written, so small requests leave in one write
        self.framed_write.feed(head).await?;

        loop {
            match body.frame().await {
                Some(Ok(frame)) => {
                    let Ok(data) = frame.into_data() else {
                        trace!("skip non data frame in request body");
                        continue;
                    };
                    self.framed_write
                        .send(Message::<(RequestHead, PayloadSize), B::Data>::Payload(PayloadItem::Chunk(data)))
                        .await
                        .map_err(|e| SendError::invalid_body(format!("can't send request body: {e}")))?;
                }
                Some(Err(e)) => return Err(SendError::invalid_body(format!("resolve request body error: {e}")).into()),
                None => {
                    self.framed_write
                        .send(Message::<(RequestHead, PayloadSize), B::Data>::Payload(PayloadItem::Eof))
                        .await
                        .map_err(|e| SendError::invalid_body(format!("can't send request body eof: {e}")))?;
                    return Ok(());
                }
            }
        }
    }

    /// Waits for the response head.
    pub async fn read_head(&mut self) -> Result<ResponseHeader, ParseError> {
        match self.framed_read.next().await {
            Some(Ok(Message::Header((header, payload_size)))) => {
                trace!(status = %header.status(), ?payload_size, "received response head");
                Ok(header)
            }
            Some(Ok(Message::Payload(_))) => Err(ParseError::invalid_body("received payload before the response head")),
            Some(Err(e)) => Err(e),
            None => Err(ParseError::UnexpectedEof),
        }
    }

    /// Reads the next piece of the response body.
    ///
    /// Must only be called after [`read_head`](Self::read_head) succeeded, and not again after
    /// it returned `Eof`.
    pub async fn read_payload(&mut self) -> Result<PayloadItem, ParseError> {
        match self.framed_read.next().await {
            Some(Ok(Message::Payload(item))) => Ok(item),
            Some(Ok(Message::Header(_))) => Err(ParseError::invalid_header("received a second response head")),
            Some(Err(e)) => Err(e),
            None => Err(ParseError::UnexpectedEof),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::{Empty, Full, StreamBody};
    use http_body::Frame;
    use std::convert::Infallible;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    #[tokio::test]
    async fn exchange_over_duplex() {
        let (client, mut server) = duplex(4096);
        let (reader, writer) = tokio::io::split(client);
        let mut connection = ClientConnection::new(reader, writer, &Method::POST);

        let request = Request::post("http://localhost/echo").body(Full::new(Bytes::from_static(b"ping"))).unwrap();
        connection.send_request(request).await.unwrap();

        let mut received = vec![0u8; 256];
        let n = server.read(&mut received).await.unwrap();
        let received = std::str::from_utf8(&received[..n]).unwrap();
        assert!(received.starts_with("POST /echo HTTP/1.1\r\n"));
        assert!(received.contains("content-length: 4\r\n"));
        assert!(received.ends_with("\r\n\r\nping"));

        server.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\npong").await.unwrap();

        let head = connection.read_head().await.unwrap();
        assert_eq!(head.status(), StatusCode::OK);
        assert_eq!(connection.read_payload().await.unwrap(), PayloadItem::Chunk(Bytes::from_static(b"pong")));
        assert_eq!(connection.read_payload().await.unwrap(), PayloadItem::Eof);
    }

    #[tokio::test]
    async fn streamed_body_is_chunked() {
        let (client, mut server) = duplex(4096);
        let (reader, writer) = tokio::io::split(client);
        let mut connection = ClientConnection::new(reader, writer, &Method::PUT);

        let frames = futures::stream::iter(vec![
            Ok::<_, Infallible>(Frame::data(Bytes::from_static(b"hello "))),
            Ok(Frame::data(Bytes::from_static(b"world"))),
        ]);
        let request = Request::put("http://localhost/stream").body(StreamBody::new(frames)).unwrap();
        connection.send_request(request).await.unwrap();
        drop(connection);

        let mut received = String::new();
        server.read_to_string(&mut received).await.unwrap();
        assert!(received.contains("transfer-encoding: chunked\r\n"));
        assert!(received.ends_with("\r\n\r\n6\r\nhello \r\n5\r\nworld\r\n0\r\n\r\n"));
    }

    #[tokio::test]
    async fn server_closes_without_answer() {
        let (client, server) = duplex(1024);
        let (reader, writer) = tokio::io::split(client);
        let mut connection = ClientConnection::new(reader, writer, &Method::GET);

        connection.send_request(Request::get("http://localhost/").body(Empty::<Bytes>::new()).unwrap()).await.unwrap();
        drop(server);

        assert!(matches!(connection.read_head().await, Err(ParseError::UnexpectedEof | ParseError::Io { .. })));
    }
}
