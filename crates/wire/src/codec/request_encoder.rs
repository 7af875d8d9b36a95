use std::io;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;
use tracing::error;

use crate::codec::body::PayloadEncoder;
use crate::codec::header::HeadEncoder;
use crate::protocol::{Message, PayloadSize, RequestHead, SendError};

/// Encodes one request: its head, then payload items until `Eof`.
///
/// Sending a head while the previous body is unfinished, or payload without a head, is
/// rejected with an `InvalidInput` I/O error.
#[derive(Debug)]
pub struct RequestEncoder {
    head_encoder: HeadEncoder,
    payload_encoder: Option<PayloadEncoder>,
}

impl RequestEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for RequestEncoder {
    fn default() -> Self {
        Self { head_encoder: HeadEncoder, payload_encoder: None }
    }
}

impl<D: Buf> Encoder<Message<(RequestHead, PayloadSize), D>> for RequestEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(RequestHead, PayloadSize), D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, payload_size)) => {
                if self.payload_encoder.is_some() {
                    error!("expect payload item but receive request head");
                    return Err(io::Error::from(io::ErrorKind::InvalidInput).into());
                }

                let payload_encoder = PayloadEncoder::try_from(payload_size)?;
                self.head_encoder.encode((head, payload_size), dst)?;
                if !payload_encoder.is_finish() {
                    self.payload_encoder = Some(payload_encoder);
                }
                Ok(())
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("expect request head but receive payload item");
                    return Err(io::Error::from(io::ErrorKind::InvalidInput).into());
                };

                let result = payload_encoder.encode(payload_item, dst);
                if payload_encoder.is_finish() {
                    self.payload_encoder.take();
                }
                result
            }
        }
    }
}
