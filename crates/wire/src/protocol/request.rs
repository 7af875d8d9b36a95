use http::{Method, Request};

/// The head of an outgoing request; the body travels separately as payload items.
pub type RequestHead = Request<()>;

/// Whether an empty body should still be announced with `Content-Length: 0`.
///
/// Servers commonly answer a bodyless `POST` without a length with `411 Length Required`,
/// while a `GET` carrying `Content-Length: 0` is merely odd. Only the methods that normally
/// carry content get the explicit zero.
pub fn method_permits_empty_length(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}
