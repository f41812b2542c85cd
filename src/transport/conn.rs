//! Duplex connection capability set
//!
//! Everything the fragmentation layer needs from an outbound connection:
//! byte-stream I/O, endpoint addresses and absolute deadlines.

use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;

/// An established duplex byte-stream connection.
///
/// Deadlines are absolute. Once a deadline has passed, pending and future
/// operations in that direction fail with [`io::ErrorKind::TimedOut`] until
/// the deadline is moved or cleared with `None`.
pub trait Connection: AsyncRead + AsyncWrite + Unpin + Send {
    fn local_addr(&self) -> io::Result<SocketAddr>;

    fn peer_addr(&self) -> io::Result<SocketAddr>;

    fn set_read_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()>;

    fn set_write_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()>;

    /// Set both the read and the write deadline
    fn set_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()> {
        self.set_read_deadline(deadline)?;
        self.set_write_deadline(deadline)
    }
}
