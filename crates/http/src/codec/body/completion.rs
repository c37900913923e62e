//! Completion of request bodies that arrived shorter than their `Content-Length`.
//!
//! The first read of a connection often carries only part of the body. [`BodyCompletion`]
//! keeps polling a [`BodySource`] for more bytes with a retry budget spent only by polls
//! that bring nothing, and an optional overall deadline. The step function
//! ([`BodyCompletion::check`]) is pure, so the retry policy can be tested without a socket.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::protocol::ParseError;

/// Default number of fruitless polls before a short body is given up on.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;

/// Default time each poll waits for more bytes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Most a single source read reserves up front.
const READ_CHUNK: usize = 64 * 1024;

/// Something more body bytes can be pulled from.
#[async_trait]
pub trait BodySource: Send {
    /// Appends up to `want` bytes to `dst`, waiting at most `wait` for the first of them,
    /// and returns the number of bytes appended. Bytes past `want` are left in the source.
    /// `Ok(0)` means nothing arrived in time or the peer closed its side.
    async fn read_available(&mut self, dst: &mut BytesMut, want: usize, wait: Duration) -> io::Result<usize>;
}

/// A source that never yields any bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBody;

#[async_trait]
impl BodySource for NoBody {
    async fn read_available(&mut self, _dst: &mut BytesMut, _want: usize, _wait: Duration) -> io::Result<usize> {
        Ok(0)
    }
}

/// Adapts an [`AsyncRead`] half of a connection into a [`BodySource`].
#[derive(Debug)]
pub struct ReadSource<'a, R> {
    reader: &'a mut R,
    eof: bool,
}

impl<'a, R> ReadSource<'a, R> {
    pub fn new(reader: &'a mut R) -> Self {
        Self { reader, eof: false }
    }

    /// Whether the peer closed its side while reading.
    pub fn is_eof(&self) -> bool {
        self.eof
    }
}

#[async_trait]
impl<R> BodySource for ReadSource<'_, R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn read_available(&mut self, dst: &mut BytesMut, want: usize, wait: Duration) -> io::Result<usize> {
        if self.eof || want == 0 {
            return Ok(0);
        }
        let mut read = match tokio::time::timeout(wait, read_at_most(&mut *self.reader, dst, want)).await {
            Ok(Ok(0)) => {
                self.eof = true;
                return Ok(0);
            }
            Ok(result) => result?,
            Err(_elapsed) => return Ok(0),
        };

        // drain what is already there without waiting again
        while read < want {
            match read_at_most(&mut *self.reader, dst, want - read).now_or_never() {
                None => break,
                Some(Ok(0)) => {
                    self.eof = true;
                    break;
                }
                Some(result) => read += result?,
            }
        }
        Ok(read)
    }
}

async fn read_at_most<R>(reader: &mut R, dst: &mut BytesMut, limit: usize) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    // reservation is capped per read, whatever Content-Length claims
    dst.reserve(limit.min(READ_CHUNK));
    let mut limited = reader.take(u64::try_from(limit).unwrap_or(u64::MAX));
    limited.read_buf(dst).await
}

/// Outcome of one [`BodyCompletion::check`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// At least `Content-Length` bytes are buffered.
    Complete,
    /// Poll the source again.
    Pending,
    /// The retry budget or the deadline ran out.
    Exhausted,
}

/// Bounded retry loop that waits for the rest of a body.
#[derive(Debug, Clone)]
pub struct BodyCompletion {
    expected: usize,
    max_attempts: u32,
    poll_interval: Duration,
    deadline: Option<Instant>,
    attempts: u32,
    last_received: Option<usize>,
}

impl BodyCompletion {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            deadline: None,
            attempts: 0,
            last_received: None,
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Number of polls so far that brought no bytes.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Decides the next step for a body of `received` bytes at time `now`.
    ///
    /// A call that sees no more bytes than the previous one consumes one attempt.
    pub fn check(&mut self, received: usize, now: Instant) -> Completion {
        if received >= self.expected {
            return Completion::Complete;
        }
        if self.last_received.is_some_and(|last| received <= last) {
            self.attempts += 1;
        }
        self.last_received = Some(received);

        if self.attempts >= self.max_attempts || self.deadline.is_some_and(|deadline| now >= deadline) {
            return Completion::Exhausted;
        }
        Completion::Pending
    }

    /// How long the next poll may wait, never past the deadline.
    fn next_wait(&self, now: Instant) -> Duration {
        match self.deadline {
            Some(deadline) => self.poll_interval.min(deadline.saturating_duration_since(now)),
            None => self.poll_interval,
        }
    }

    /// Polls `source` until `body` holds `expected` bytes, then truncates it to exactly
    /// that length.
    ///
    /// # Errors
    ///
    /// [`ParseError::IncompleteBody`] when the budget runs out, [`ParseError::Io`] when
    /// the source fails.
    pub async fn complete<S>(&mut self, body: &mut BytesMut, source: &mut S) -> Result<(), ParseError>
    where
        S: BodySource + ?Sized,
    {
        loop {
            let now = Instant::now();
            match self.check(body.len(), now) {
                Completion::Complete => {
                    body.truncate(self.expected);
                    trace!(expected = self.expected, attempts = self.attempts, "body completed");
                    return Ok(());
                }
                Completion::Exhausted => {
                    debug!(expected = self.expected, received = body.len(), attempts = self.attempts, "body incomplete");
                    return Err(ParseError::incomplete_body(self.expected, body.len()));
                }
                Completion::Pending => {
                    let wait = self.next_wait(now);
                    let read = source.read_available(body, self.expected - body.len(), wait).await?;
                    if read == 0 {
                        tokio::time::sleep(wait).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Hands out one scripted chunk per poll.
    struct Scripted {
        chunks: VecDeque<&'static [u8]>,
        polls: usize,
    }

    #[async_trait]
    impl BodySource for Scripted {
        async fn read_available(&mut self, dst: &mut BytesMut, _want: usize, _wait: Duration) -> io::Result<usize> {
            self.polls += 1;
            let chunk = self.chunks.pop_front().unwrap_or_default();
            dst.extend_from_slice(chunk);
            Ok(chunk.len())
        }
    }

    #[test]
    fn check_counts_attempts() {
        let now = Instant::now();
        let mut completion = BodyCompletion::new(10).with_max_attempts(2);

        assert_eq!(completion.check(3, now), Completion::Pending);
        // progress is free
        assert_eq!(completion.check(5, now), Completion::Pending);
        assert_eq!(completion.attempts(), 0);
        assert_eq!(completion.check(5, now), Completion::Pending);
        assert_eq!(completion.check(5, now), Completion::Exhausted);
        assert_eq!(completion.check(10, now), Completion::Complete);
        assert_eq!(completion.attempts(), 2);
    }

    #[test]
    fn deadline_stops_polling() {
        let now = Instant::now();
        let mut completion = BodyCompletion::new(10).with_deadline(Some(now));
        assert_eq!(completion.check(0, now), Completion::Exhausted);
        assert_eq!(completion.attempts(), 0);
    }

    #[tokio::test]
    async fn full_body_never_polls() {
        let mut source = Scripted { chunks: VecDeque::new(), polls: 0 };
        let mut body = BytesMut::from(&b"hello world and more"[..]);

        BodyCompletion::new(11).complete(&mut body, &mut source).await.unwrap();

        assert_eq!(&body[..], b"hello world");
        assert_eq!(source.polls, 0);
    }

    #[tokio::test]
    async fn completes_across_polls() {
        let mut source = Scripted { chunks: VecDeque::from([&b"lo "[..], &b"world"[..]]), polls: 0 };
        let mut body = BytesMut::from(&b"hel"[..]);

        BodyCompletion::new(11).complete(&mut body, &mut source).await.unwrap();

        assert_eq!(&body[..], b"hello world");
        assert_eq!(source.polls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_budget() {
        let mut source = Scripted { chunks: VecDeque::new(), polls: 0 };
        let mut body = BytesMut::from(&b"abc"[..]);

        let result = BodyCompletion::new(10).complete(&mut body, &mut source).await;

        assert!(matches!(result, Err(ParseError::IncompleteBody { expected: 10, received: 3 })));
        assert_eq!(source.polls, DEFAULT_MAX_ATTEMPTS as usize);
    }

    #[tokio::test]
    async fn read_source_reads_stream() {
        let data = b"rest of body".to_vec();
        let mut reader = &data[..];
        let mut source = ReadSource::new(&mut reader);
        let mut body = BytesMut::from(&b"the "[..]);

        BodyCompletion::new(16).complete(&mut body, &mut source).await.unwrap();
        assert_eq!(&body[..], b"the rest of body");
    }

    #[tokio::test]
    async fn read_source_completes_large_body() {
        let data = vec![b'x'; 64 * 1024];
        let mut reader = &data[..];
        let mut source = ReadSource::new(&mut reader);
        let mut body = BytesMut::new();

        BodyCompletion::new(data.len()).complete(&mut body, &mut source).await.unwrap();
        assert_eq!(body.len(), data.len());
    }

    #[tokio::test]
    async fn read_source_leaves_bytes_past_the_body() {
        let data = b"world\r\nGET /next HTTP/1.1\r\n\r\n".to_vec();
        let mut reader = &data[..];
        let mut body = BytesMut::from(&b"hello "[..]);

        BodyCompletion::new(11).complete(&mut body, &mut ReadSource::new(&mut reader)).await.unwrap();

        assert_eq!(&body[..], b"hello world");
        assert_eq!(reader, b"\r\nGET /next HTTP/1.1\r\n\r\n");
    }

    #[tokio::test(start_paused = true)]
    async fn trickling_body_is_not_cut_short() {
        let chunks: VecDeque<&'static [u8]> = std::iter::repeat_n(&b"ab"[..], 10).collect();
        let mut source = Scripted { chunks, polls: 0 };
        let mut body = BytesMut::new();

        BodyCompletion::new(20).complete(&mut body, &mut source).await.unwrap();

        assert_eq!(body.len(), 20);
        assert_eq!(source.polls, 10);
    }
}
