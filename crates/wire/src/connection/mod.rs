//! One request/response exchange over an established byte stream.

mod client_connection;

pub use client_connection::ClientConnection;
