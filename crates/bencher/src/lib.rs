//! Canned responses for the decoder benchmarks.

/// How the body of a fixture is framed on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Framing {
    NoBody,
    ContentLength,
    Chunked,
}

#[derive(Debug, Copy, Clone)]
pub struct Fixture {
    name: &'static str,
    file_name: &'static str,
    framing: Framing,
    content: &'static str,
}

impl Fixture {
    pub const fn new(name: &'static str, file_name: &'static str, framing: Framing, content: &'static str) -> Self {
        Self { name, file_name, framing, content }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn file_name(&self) -> &'static str {
        self.file_name
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn content(&self) -> &'static str {
        self.content
    }

    /// Size of the raw response in bytes.
    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}
