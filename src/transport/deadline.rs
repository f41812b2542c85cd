//! Deadline-enforcing stream wrapper
//!
//! tokio streams have no notion of an absolute deadline; [`DeadlineStream`]
//! adds one per direction so a dialed TCP connection offers the full
//! [`Connection`] capability set.

use super::conn::Connection;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::{sleep_until, Instant, Sleep};

struct Deadline {
    at: Instant,
    timer: Pin<Box<Sleep>>,
}

impl Deadline {
    fn new(at: Instant) -> Self {
        Self {
            at,
            timer: Box::pin(sleep_until(at)),
        }
    }

    /// Also registers the waker so a pending operation is woken at `at`
    fn poll_expired(&mut self, cx: &mut Context<'_>) -> bool {
        Instant::now() >= self.at || self.timer.as_mut().poll(cx).is_ready()
    }
}

fn deadline_error(
    deadline: &mut Option<Deadline>,
    cx: &mut Context<'_>,
    what: &str,
) -> Option<io::Error> {
    let expired = match deadline {
        Some(d) => d.poll_expired(cx),
        None => false,
    };
    expired.then(|| {
        io::Error::new(io::ErrorKind::TimedOut, format!("{} deadline exceeded", what))
    })
}

/// Stream with independent read and write deadlines.
pub struct DeadlineStream<S> {
    inner: S,
    read_deadline: Option<Deadline>,
    write_deadline: Option<Deadline>,
}

impl<S> DeadlineStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            read_deadline: None,
            write_deadline: None,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    fn set_read(&mut self, at: Option<Instant>) {
        self.read_deadline = at.map(Deadline::new);
    }

    fn set_write(&mut self, at: Option<Instant>) {
        self.write_deadline = at.map(Deadline::new);
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for DeadlineStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if let Some(err) = deadline_error(&mut this.read_deadline, cx, "read") {
            return Poll::Ready(Err(err));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for DeadlineStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        if let Some(err) = deadline_error(&mut this.write_deadline, cx, "write") {
            return Poll::Ready(Err(err));
        }
        Pin::new(&mut this.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if let Some(err) = deadline_error(&mut this.write_deadline, cx, "write") {
            return Poll::Ready(Err(err));
        }
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl Connection for DeadlineStream<TcpStream> {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.peer_addr()
    }

    fn set_read_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()> {
        self.set_read(deadline);
        Ok(())
    }

    fn set_write_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()> {
        self.set_write(deadline);
        Ok(())
    }
}
