//! Fragmenting connection decorator
//!
//! [`FragmentWriter`] wraps an outbound connection and rewrites each logical
//! write according to a shared [`FragmentSpec`]:
//!
//! - TLS-hello mode re-frames the first handshake record of the connection
//!   into several smaller records.
//! - All-packets and ranged modes cut selected writes into raw sub-slices.
//!
//! Every chunk is followed by a jittered pause. Reads, flushes, shutdown,
//! addresses and deadlines go straight to the wrapped connection.

use crate::constants::TLS_RECORD_HEADER_SIZE;
use crate::fragment::jitter;
use crate::fragment::record::RecordHeader;
use crate::fragment::spec::{FragmentSpec, Packets};
use crate::transport::Connection;
use std::future::{poll_fn, Future};
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{sleep, Instant, Sleep};
use tracing::{debug, trace};

/// A logical write that failed part-way.
///
/// `written` counts the bytes of the caller's buffer that reached the
/// connection before the failure, so they are not sent twice.
#[derive(Error, Debug)]
#[error("fragmented write failed after {written} bytes: {source}")]
pub struct WriteError {
    pub written: usize,
    #[source]
    pub source: io::Error,
}

impl WriteError {
    fn new(written: usize, source: io::Error) -> Self {
        Self { written, source }
    }

    pub fn kind(&self) -> io::ErrorKind {
        self.source.kind()
    }
}

impl From<WriteError> for io::Error {
    fn from(err: WriteError) -> Self {
        err.source
    }
}

/// How one logical write is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Plan {
    Passthrough,
    Segment,
    Record(RecordHeader),
}

impl Plan {
    fn choose(spec: &FragmentSpec, seq: u64, buf: &[u8]) -> Self {
        match spec.packets() {
            Packets::TlsHello => {
                if seq != 1 || buf.len() <= TLS_RECORD_HEADER_SIZE {
                    return Plan::Passthrough;
                }
                match RecordHeader::parse(buf) {
                    // A record longer than the buffer may already be split upstream
                    Some(header)
                        if header.is_handshake()
                            && header.length > 0
                            && header.record_len() <= buf.len() =>
                    {
                        Plan::Record(header)
                    }
                    _ => Plan::Passthrough,
                }
            }
            packets if packets.segments(seq) => Plan::Segment,
            _ => Plan::Passthrough,
        }
    }
}

enum Frame {
    /// Raw sub-slice of a segmented write, paced
    Chunk { start: usize, end: usize },
    /// Re-framed TLS record carrying the payload up to `end`, paced
    Record { bytes: Vec<u8>, end: usize },
    /// Unmodified tail of the write, finishes it
    Raw { start: usize },
}

enum Step {
    Draw,
    Send { frame: Frame, sent: usize },
    Pause(Pin<Box<Sleep>>),
}

/// Progress of the logical write currently being driven.
///
/// Positions are offsets into the whole logical buffer. Once `acked` bytes
/// have been reported to an `AsyncWrite` caller, the slice handed back to
/// [`InFlight::poll_drive`] starts at `acked`.
struct InFlight {
    seq: u64,
    len: usize,
    plan: Plan,
    /// Next buffer byte not yet cut into a chunk
    cursor: usize,
    /// End of the region being fragmented
    end: usize,
    /// Buffer bytes confirmed delivered
    written: usize,
    /// Buffer bytes already reported to the caller
    acked: usize,
    /// Bytes the caller owes on its next `poll_write` to continue this write
    resume: Option<Vec<u8>>,
    step: Step,
}

impl InFlight {
    fn start(spec: &FragmentSpec, seq: u64, buf: &[u8]) -> Self {
        let plan = Plan::choose(spec, seq, buf);
        let (cursor, end, step) = match plan {
            Plan::Passthrough => (0, 0, Step::Send { frame: Frame::Raw { start: 0 }, sent: 0 }),
            Plan::Segment => (0, buf.len(), Step::Draw),
            Plan::Record(header) => {
                debug!(
                    seq,
                    record_len = header.record_len(),
                    "fragmenting TLS handshake record"
                );
                (TLS_RECORD_HEADER_SIZE, header.record_len(), Step::Draw)
            }
        };
        Self {
            seq,
            len: buf.len(),
            plan,
            cursor,
            end,
            written: 0,
            acked: 0,
            resume: None,
            step,
        }
    }

    fn resumes_with(&self, buf: &[u8]) -> bool {
        self.resume.as_deref() == Some(buf)
    }

    /// Hand the bytes delivered since the last report back to the caller.
    ///
    /// `buf` is the slice the caller passed; the remainder of it is what the
    /// next call must carry for this write to continue.
    fn acknowledge(&mut self, buf: &[u8]) -> usize {
        let delivered = self.written - self.acked;
        self.acked = self.written;
        self.resume = Some(buf[delivered..].to_vec());
        delivered
    }

    /// Drive the write forward. `buf` covers the logical buffer from `acked`
    /// on; results count bytes of `buf`.
    fn poll_drive<C>(
        &mut self,
        inner: &mut C,
        spec: &FragmentSpec,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, WriteError>>
    where
        C: AsyncWrite + Unpin,
    {
        let base = self.acked;
        loop {
            let next = match &mut self.step {
                Step::Draw => {
                    if self.cursor < self.end {
                        let start = self.cursor;
                        let end = start
                            + jitter::chunk_len(
                                spec.length_min(),
                                spec.length_max(),
                                self.end - start,
                            );
                        let frame = match self.plan {
                            Plan::Record(header) => {
                                // Payload of a record fits in its u16 length field
                                let length = u16::try_from(end - start).unwrap_or(u16::MAX);
                                let end = start + usize::from(length);
                                Frame::Record {
                                    bytes: header
                                        .with_length(length)
                                        .encode(&buf[start - base..end - base]),
                                    end,
                                }
                            }
                            _ => Frame::Chunk { start, end },
                        };
                        Step::Send { frame, sent: 0 }
                    } else if matches!(self.plan, Plan::Record(_)) && self.end < self.len {
                        Step::Send {
                            frame: Frame::Raw { start: self.end },
                            sent: 0,
                        }
                    } else {
                        return Poll::Ready(Ok(self.len - base));
                    }
                }
                Step::Send { frame, sent } => {
                    let counts_raw = !matches!(frame, Frame::Record { .. });
                    // `acked` never passes `written`, so the unsent part lies within `buf`
                    let unsent = match &*frame {
                        Frame::Chunk { start, end } => &buf[*start + *sent - base..*end - base],
                        Frame::Record { bytes, .. } => &bytes[*sent..],
                        Frame::Raw { start } => &buf[*start + *sent - base..],
                    };
                    let mut done = 0;
                    while done < unsent.len() {
                        let polled = Pin::new(&mut *inner).poll_write(cx, &unsent[done..]);
                        let n = match ready!(polled) {
                            Ok(0) => {
                                let err = io::Error::from(io::ErrorKind::WriteZero);
                                return Poll::Ready(Err(WriteError::new(self.written - base, err)));
                            }
                            Ok(n) => n,
                            Err(err) => {
                                return Poll::Ready(Err(WriteError::new(self.written - base, err)))
                            }
                        };
                        done += n;
                        *sent += n;
                        if counts_raw {
                            self.written += n;
                        }
                    }

                    let chunk_end = match &*frame {
                        Frame::Raw { .. } => return Poll::Ready(Ok(self.len - base)),
                        Frame::Chunk { end, .. } => *end,
                        Frame::Record { end, .. } => {
                            self.written = *end;
                            *end
                        }
                    };
                    trace!(seq = self.seq, bytes = *sent, "chunk sent");
                    self.cursor = chunk_end;

                    let pause = jitter::pause(spec.interval_min(), spec.interval_max());
                    if pause.is_zero() {
                        Step::Draw
                    } else {
                        Step::Pause(Box::pin(sleep(pause)))
                    }
                }
                Step::Pause(timer) => {
                    ready!(timer.as_mut().poll(cx));
                    Step::Draw
                }
            };
            self.step = next;
        }
    }
}

/// Connection decorator that fragments outbound writes.
///
/// One writer per connection. The write counter is plain state behind
/// `&mut self`, so only one task may write at a time.
pub struct FragmentWriter<C> {
    inner: C,
    spec: Arc<FragmentSpec>,
    count: u64,
    in_flight: Option<InFlight>,
    deferred: Option<io::Error>,
}

impl<C> FragmentWriter<C> {
    pub fn new(inner: C, spec: Arc<FragmentSpec>) -> Self {
        Self {
            inner,
            spec,
            count: 0,
            in_flight: None,
            deferred: None,
        }
    }

    pub fn spec(&self) -> &FragmentSpec {
        &self.spec
    }

    /// Number of logical writes started on this connection
    pub fn write_count(&self) -> u64 {
        self.count
    }

    pub fn get_ref(&self) -> &C {
        &self.inner
    }
}

impl<C: AsyncWrite + Unpin> FragmentWriter<C> {
    /// Write the whole of `buf`, fragmenting it if the spec selects this call.
    ///
    /// Returns `buf.len()` on success. On failure the error carries the number
    /// of buffer bytes already delivered; no further chunk is sent.
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize, WriteError> {
        if let Some(err) = self.deferred.take() {
            return Err(WriteError::new(0, err));
        }
        if self.in_flight.take().is_some() {
            debug!(seq = self.count, "dropping interrupted write");
        }
        poll_fn(|cx| self.poll_logical_write(cx, buf)).await
    }

    fn poll_logical_write(
        &mut self,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, WriteError>> {
        if self.in_flight.is_none() {
            self.count += 1;
        }
        let job = self
            .in_flight
            .get_or_insert_with(|| InFlight::start(&self.spec, self.count, buf));

        let result = ready!(job.poll_drive(&mut self.inner, &self.spec, cx, buf));
        self.in_flight = None;
        Poll::Ready(result)
    }

    /// Deal with a write left in flight by an earlier `poll_write` before
    /// `buf` is taken on.
    ///
    /// A write whose bytes all went out still owes its last pause, which is
    /// waited out here. Any other write the caller walked away from ends.
    fn poll_settle(&mut self, cx: &mut Context<'_>, buf: &[u8]) -> Poll<()> {
        let Some(job) = self.in_flight.as_mut() else {
            return Poll::Ready(());
        };
        if job.resumes_with(buf) {
            return Poll::Ready(());
        }
        if job.acked == job.len {
            let _ = ready!(job.poll_drive(&mut self.inner, &self.spec, cx, &[]));
        } else {
            debug!(seq = job.seq, "write abandoned mid-flight, starting a new one");
        }
        self.in_flight = None;
        Poll::Ready(())
    }
}

impl<C: AsyncRead + Unpin> AsyncRead for FragmentWriter<C> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

/// Every chunk that reached the connection is reported as written: a pause
/// or a stalled connection after a chunk gives a short write, and the caller
/// continues the same logical write by passing the rest of its buffer. A
/// failure after a partial delivery is reported as a short write too; the
/// error itself comes back from the next write or `poll_flush`.
impl<C: AsyncWrite + Unpin> AsyncWrite for FragmentWriter<C> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if let Some(err) = this.deferred.take() {
            return Poll::Ready(Err(err));
        }
        ready!(this.poll_settle(cx, buf));

        match this.poll_logical_write(cx, buf) {
            Poll::Ready(Ok(n)) => Poll::Ready(Ok(n)),
            Poll::Ready(Err(err)) if err.written > 0 => {
                let written = err.written;
                this.deferred = Some(err.source);
                Poll::Ready(Ok(written))
            }
            Poll::Ready(Err(err)) => Poll::Ready(Err(err.source)),
            // Pending must mean nothing was taken, so delivered chunks are reported now
            Poll::Pending => match this.in_flight.as_mut().map(|job| job.acknowledge(buf)) {
                Some(delivered) if delivered > 0 => Poll::Ready(Ok(delivered)),
                _ => Poll::Pending,
            },
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Some(err) = this.deferred.take() {
            return Poll::Ready(Err(err));
        }
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl<C: Connection> Connection for FragmentWriter<C> {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.peer_addr()
    }

    fn set_read_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()> {
        self.inner.set_read_deadline(deadline)
    }

    fn set_write_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()> {
        self.inner.set_write_deadline(deadline)
    }

    fn set_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()> {
        self.inner.set_deadline(deadline)
    }
}
