//! Bounded in-process pipe carrying a response body from the reactor to the caller.
//!
//! The pipe is a bounded [`mpsc`] channel of at most `capacity` chunks, each at most
//! [`MAX_CHUNK_SIZE`] bytes, so a body that is produced faster than it is read costs bounded
//! memory: once the channel is full the writer waits, which is what slows the reactor down to
//! the pace of the reader.
//!
//! Both ends work from either world. The writer has an async [`PipeWriter::write`] for
//! reactor tasks and [`PipeWriter::blocking_write`] for thread based producers. The reader,
//! [`BodyStream`], is a blocking [`Read`], a [`Stream`] of chunks and an [`http_body::Body`].
//!
//! Termination is explicit. [`PipeWriter::finish`] ends the body cleanly and
//! [`PipeWriter::fail`] ends it with an error; a writer dropped without either leaves the
//! reader with [`StreamError::Truncated`], never a clean end of stream. The outcome is recorded
//! before the sender goes away, so the reader sees it only after every chunk written before it.
//! In the other direction, once every [`BodyStream`] handle is dropped or one of them is
//! [`closed`](BodyStream::close), writes fail fast with [`PipeClosed`].

use std::io;
use std::io::Read;
use std::mem;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, TryLockError};
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures::Stream;
use futures::executor::block_on;
use futures::future::poll_fn;
use http_body::{Body, Frame};
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{PipeClosed, StreamError};

/// Default number of chunks a pipe buffers.
pub const DEFAULT_PIPE_CAPACITY: usize = 16;

/// Largest chunk stored in a pipe slot; bigger writes are split.
pub const MAX_CHUNK_SIZE: usize = 8 * 1024;

type Termination = Arc<OnceLock<Result<(), StreamError>>>;

/// Creates a pipe buffering up to `capacity` chunks.
pub fn pipe(capacity: usize) -> (PipeWriter, BodyStream) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let termination = Termination::default();
    let writer = PipeWriter { sender, termination: Arc::clone(&termination) };
    let read_end = ReadEnd { receiver, pending: Bytes::new() };
    let reader = BodyStream {
        shared: Arc::new(Shared { read_end: Mutex::new(read_end), closed: AtomicBool::new(false), termination }),
        done: false,
    };
    (writer, reader)
}

fn split(mut bytes: Bytes) -> impl Iterator<Item = Bytes> {
    std::iter::from_fn(move || (!bytes.is_empty()).then(|| bytes.split_to(bytes.len().min(MAX_CHUNK_SIZE))))
}

/// Write end of a pipe, owned by the response consumer.
#[derive(Debug)]
pub struct PipeWriter {
    sender: mpsc::Sender<Bytes>,
    termination: Termination,
}

impl PipeWriter {
    /// Appends `bytes`, waiting while the pipe is full.
    pub async fn write(&mut self, bytes: Bytes) -> Result<(), PipeClosed> {
        for chunk in split(bytes) {
            self.sender.send(chunk).await?;
        }
        Ok(())
    }

    /// Appends `bytes`, blocking the current thread while the pipe is full.
    ///
    /// Must not be called from an async task; use [`write`](Self::write) there.
    pub fn blocking_write(&mut self, bytes: Bytes) -> Result<(), PipeClosed> {
        for chunk in split(bytes) {
            self.sender.blocking_send(chunk)?;
        }
        Ok(())
    }

    /// Whether every reader is gone, so further writes would fail.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Ends the body cleanly.
    pub fn finish(self) {
        self.end(Ok(()));
    }

    /// Ends the body with `err`, which every reader observes after the buffered chunks.
    pub fn fail(self, err: StreamError) {
        self.end(Err(err));
    }

    fn end(&self, outcome: Result<(), StreamError>) {
        // first outcome wins, a dropped writer only records one when nothing else did
        let _ = self.termination.set(outcome);
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.end(Err(StreamError::Truncated));
    }
}

#[derive(Debug)]
struct Shared {
    read_end: Mutex<ReadEnd>,
    closed: AtomicBool,
    termination: Termination,
}

#[derive(Debug)]
struct ReadEnd {
    receiver: mpsc::Receiver<Bytes>,
    // rest of a chunk a blocking read only partly consumed
    pending: Bytes,
}

impl ReadEnd {
    fn shut(&mut self) {
        self.receiver.close();
        while self.receiver.try_recv().is_ok() {}
        self.pending.clear();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ReadEnd> {
        self.read_end.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn poll_next(&self, read_end: &mut ReadEnd, cx: &mut Context<'_>) -> Poll<Option<Result<Bytes, StreamError>>> {
        if self.closed.load(Ordering::Acquire) {
            read_end.shut();
            return Poll::Ready(Some(Err(StreamError::Closed)));
        }
        if !read_end.pending.is_empty() {
            return Poll::Ready(Some(Ok(mem::take(&mut read_end.pending))));
        }
        match ready!(read_end.receiver.poll_recv(cx)) {
            Some(chunk) => Poll::Ready(Some(Ok(chunk))),
            None => Poll::Ready(match self.termination.get() {
                Some(Ok(())) => None,
                Some(Err(e)) => Some(Err(e.clone())),
                None => Some(Err(StreamError::Truncated)),
            }),
        }
    }
}

/// Read end of a pipe: the body of a streamed response.
///
/// Clones share the same read end, so bytes read through one clone are not seen by the others.
/// Reading blocks the calling thread; use the [`Stream`] or [`Body`] implementations from
/// async code instead of [`Read`].
#[derive(Debug, Clone)]
pub struct BodyStream {
    shared: Arc<Shared>,
    done: bool,
}

impl BodyStream {
    /// Closes the read end for every clone and discards buffered bytes; the writer fails fast.
    pub fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            trace!("body stream reader closed");
        }
        // a clone blocked in `read` holds the lock and shuts the channel itself once it wakes
        match self.shared.read_end.try_lock() {
            Ok(mut read_end) => read_end.shut(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().shut(),
            Err(TryLockError::WouldBlock) => {}
        }
    }

    /// Polls for the next chunk; `None` after a clean end of the body.
    pub fn poll_chunk(&self, cx: &mut Context<'_>) -> Poll<Option<Result<Bytes, StreamError>>> {
        self.shared.poll_next(&mut self.shared.lock(), cx)
    }

    /// Next chunk of the body, waiting asynchronously.
    pub async fn chunk(&self) -> Option<Result<Bytes, StreamError>> {
        poll_fn(|cx| self.poll_chunk(cx)).await
    }

    /// Number of chunks currently buffered.
    pub fn buffered_len(&self) -> usize {
        let read_end = self.shared.lock();
        read_end.receiver.len() + usize::from(!read_end.pending.is_empty())
    }
}

impl Read for BodyStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let shared = &self.shared;
        let mut read_end = shared.lock();
        // not tokio's `blocking_recv`, which panics on runtime threads
        let chunk = match block_on(poll_fn(|cx| shared.poll_next(&mut read_end, cx))) {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(0),
        };

        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        read_end.pending = chunk.slice(n..);
        Ok(n)
    }
}

impl Stream for BodyStream {
    type Item = Result<Bytes, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        let item = ready!(this.poll_chunk(cx));
        if !matches!(item, Some(Ok(_))) {
            this.done = true;
        }
        Poll::Ready(item)
    }
}

impl Body for BodyStream {
    type Data = Bytes;
    type Error = StreamError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.poll_next(cx).map(|item| item.map(|chunk| chunk.map(Frame::data)))
    }

    fn is_end_stream(&self) -> bool {
        self.done
    }
}

impl From<Bytes> for BodyStream {
    /// A stream over `bytes` that is already complete.
    fn from(bytes: Bytes) -> Self {
        let chunks: Vec<Bytes> = split(bytes).collect();
        let (writer, reader) = pipe(chunks.len());
        for chunk in chunks {
            // a slot for every chunk and a live reader, so this can neither wait nor fail
            let _ = writer.sender.try_send(chunk);
        }
        writer.finish();
        reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn bytes_then_clean_eof() {
        let (mut writer, mut reader) = pipe(4);
        writer.blocking_write(Bytes::from_static(b"hello ")).unwrap();
        writer.blocking_write(Bytes::from_static(b"world")).unwrap();
        writer.finish();

        let mut body = String::new();
        reader.read_to_string(&mut body).unwrap();
        assert_eq!(body, "hello world");
    }

    #[test]
    fn large_writes_are_split() {
        let (mut writer, reader) = pipe(4);
        writer.blocking_write(Bytes::from(vec![7u8; MAX_CHUNK_SIZE * 2 + 1])).unwrap();
        assert_eq!(reader.buffered_len(), 3);
    }

    #[test]
    fn small_reads_keep_the_rest_of_a_chunk() {
        let (mut writer, mut reader) = pipe(2);
        writer.blocking_write(Bytes::from_static(b"abcdef")).unwrap();
        writer.finish();

        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(reader.buffered_len(), 1);
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn blocking_read_waits_for_the_writer() {
        let (mut writer, mut reader) = pipe(2);
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            writer.blocking_write(Bytes::from_static(b"late")).unwrap();
            writer.finish();
        });

        let mut body = String::new();
        reader.read_to_string(&mut body).unwrap();
        producer.join().unwrap();
        assert_eq!(body, "late");
    }

    #[test]
    fn dropped_writer_truncates() {
        let (mut writer, mut reader) = pipe(4);
        writer.blocking_write(Bytes::from_static(b"partial")).unwrap();
        drop(writer);

        let mut body = Vec::new();
        let err = reader.read_to_end(&mut body).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(body, b"partial");
    }

    #[test]
    fn failure_after_buffered_bytes() {
        let (mut writer, mut reader) = pipe(4);
        writer.blocking_write(Bytes::from_static(b"abc")).unwrap();
        writer.fail(StreamError::Cancelled);

        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 3);
        assert_eq!(reader.read(&mut buf).unwrap_err().kind(), io::ErrorKind::ConnectionAborted);
    }

    #[test]
    fn writer_fails_fast_without_readers() {
        let (mut writer, reader) = pipe(1);
        writer.blocking_write(Bytes::from_static(b"fills the pipe")).unwrap();

        let handle = thread::spawn(move || writer.blocking_write(Bytes::from_static(b"would block forever")));
        thread::sleep(Duration::from_millis(50));
        drop(reader);

        assert!(handle.join().unwrap().is_err());
    }

    #[test]
    fn close_is_shared_by_clones() {
        let (mut writer, reader) = pipe(2);
        let mut clone = reader.clone();
        drop(reader);
        assert!(!writer.is_closed());

        clone.close();
        assert!(writer.is_closed());
        assert!(writer.blocking_write(Bytes::from_static(b"x")).is_err());
        assert!(clone.read(&mut [0u8; 4]).is_err());
    }

    #[test]
    fn blocking_write_waits_for_a_read() {
        let (mut writer, mut reader) = pipe(1);
        let read_started = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&read_started);
        let producer = thread::spawn(move || {
            writer.blocking_write(Bytes::from_static(b"one")).unwrap();
            writer.blocking_write(Bytes::from_static(b"two")).unwrap();
            assert!(flag.load(Ordering::SeqCst), "second write returned before any read");
            writer.finish();
        });

        thread::sleep(Duration::from_millis(100));
        read_started.store(true, Ordering::SeqCst);

        let mut body = String::new();
        reader.read_to_string(&mut body).unwrap();
        producer.join().unwrap();
        assert_eq!(body, "onetwo");
    }

    #[test]
    fn complete_stream_from_bytes() {
        let mut reader = BodyStream::from(Bytes::from(vec![1u8; MAX_CHUNK_SIZE + 10]));
        let mut body = Vec::new();
        reader.read_to_end(&mut body).unwrap();
        assert_eq!(body.len(), MAX_CHUNK_SIZE + 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn async_writer_and_stream_reader() {
        let (mut writer, mut reader) = pipe(1);

        let producer = tokio::spawn(async move {
            for piece in ["a", "b", "c"] {
                writer.write(Bytes::from_static(piece.as_bytes())).await.unwrap();
            }
            writer.finish();
        });

        let mut chunks = vec![];
        while let Some(chunk) = reader.next().await {
            chunks.push(chunk.unwrap());
        }
        producer.await.unwrap();

        assert_eq!(chunks, vec![Bytes::from_static(b"a"), Bytes::from_static(b"b"), Bytes::from_static(b"c")]);
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn async_writer_sees_closed_reader() {
        let (mut writer, reader) = pipe(1);
        writer.write(Bytes::from_static(b"full")).await.unwrap();

        let blocked = tokio::spawn(async move { writer.write(Bytes::from_static(b"more")).await });
        tokio::task::yield_now().await;
        reader.close();

        assert!(blocked.await.unwrap().is_err());
    }
}
