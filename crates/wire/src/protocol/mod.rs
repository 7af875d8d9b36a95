//! Protocol types exchanged between the codec and its callers.
//!
//! - [`Message`], [`PayloadItem`] and [`PayloadSize`] describe a message as a head followed by body chunks
//! - [`RequestHead`] and [`ResponseHeader`] are the typed heads on each side of an exchange
//! - [`ParseError`], [`SendError`] and [`HttpError`] are the failures of reading, writing, or both

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RequestHead;
pub use request::method_permits_empty_length;

mod response;
pub use response::ResponseHeader;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;
