//! Line framing for server-sent event bodies.
//!
//! Handles:
//! - Partial lines across TCP chunks
//! - Several lines coalesced into one chunk
//! - CRLF and LF line endings
//! - Buffer compaction to prevent unbounded growth

use crate::error::Error;
use bytes::{Buf, Bytes, BytesMut};
use futures::Stream;
use memchr::memchr;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Splits a chunked byte stream into lines with minimal copying.
pub struct LineBuffer {
    buffer: BytesMut,
    /// Offset of unconsumed data in buffer.
    consumed: usize,
}

impl LineBuffer {
    /// Create a new buffer with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(8192)
    }

    /// Create a new buffer with specified initial capacity.
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(cap),
            consumed: 0,
        }
    }

    /// Feed bytes into the buffer.
    #[inline]
    pub fn feed(&mut self, data: &[u8]) {
        if self.consumed > self.buffer.len() / 2 && self.consumed > 4096 {
            self.compact();
        }
        self.buffer.extend_from_slice(data);
    }

    fn compact(&mut self) {
        if self.consumed > 0 {
            self.buffer.advance(self.consumed);
            self.consumed = 0;
        }
    }

    /// Take the next complete line, without its terminator.
    /// Returns `None` if more data is needed.
    pub fn next_line(&mut self) -> Option<Bytes> {
        let pending = &self.buffer[self.consumed..];
        let end = memchr(b'\n', pending)?;
        let line = strip_cr(&pending[..end]);
        let line = Bytes::copy_from_slice(line);
        self.consumed += end + 1;
        Some(line)
    }

    /// Take whatever remains as a final unterminated line, emptying the buffer.
    pub fn finish(&mut self) -> Option<Bytes> {
        let rest = strip_cr(&self.buffer[self.consumed..]);
        let line = if rest.is_empty() {
            None
        } else {
            Some(Bytes::copy_from_slice(rest))
        };
        self.buffer.clear();
        self.consumed = 0;
        line
    }

    /// Bytes buffered but not yet returned as a line.
    pub fn buffer_len(&self) -> usize {
        self.buffer.len() - self.consumed
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

pin_project! {
    /// Adapts a chunked HTTP body into a stream of lines.
    ///
    /// A body error is yielded once and ends the stream.
    pub struct SseLines<S> {
        #[pin]
        inner: S,
        lines: LineBuffer,
        done: bool,
    }
}

impl<S> SseLines<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            lines: LineBuffer::new(),
            done: false,
        }
    }
}

impl<S, E> Stream for SseLines<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<Error>,
{
    type Item = Result<Bytes, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            if let Some(line) = this.lines.next_line() {
                return Poll::Ready(Some(Ok(line)));
            }
            if *this.done {
                return Poll::Ready(None);
            }
            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => this.lines.feed(&chunk),
                Poll::Ready(Some(Err(e))) => {
                    *this.done = true;
                    // Discard buffered lines; the stream ends at the error.
                    drop(this.lines.finish());
                    return Poll::Ready(Some(Err(e.into())));
                }
                Poll::Ready(None) => {
                    *this.done = true;
                    return Poll::Ready(this.lines.finish().map(Ok));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
