//! Local TCP forwarder
//!
//! Accepts client connections on a local address, dials the configured
//! remote for each one and relays bytes in both directions. The outbound
//! connection is wrapped by the [`Fragmenter`] when fragmentation is on, so
//! whatever the client sends first (typically a TLS ClientHello) leaves the
//! machine fragmented.

use super::conn::Connection;
use super::deadline::DeadlineStream;
use super::ip4p::lookup_ip4p;
use crate::config::ForwardConfig;
use crate::fragment::Fragmenter;
use anyhow::anyhow;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::copy_bidirectional;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Relay from a local listener to one remote endpoint
pub struct Forwarder {
    config: ForwardConfig,
    fragmenter: Option<Fragmenter>,
}

impl Forwarder {
    pub fn new(config: ForwardConfig, fragmenter: Option<Fragmenter>) -> Self {
        Self { config, fragmenter }
    }

    /// Bind the configured listen address and serve until Ctrl-C
    pub async fn run(self) -> anyhow::Result<()> {
        if self.config.remote.trim().is_empty() {
            return Err(anyhow!("No remote address configured"));
        }
        let listener = TcpListener::bind(&self.config.listen)
            .await
            .map_err(|e| anyhow!("Failed to bind forwarder on {}: {}", self.config.listen, e))?;
        info!("Forwarding {} -> {}", self.config.listen, self.config.remote);

        self.serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Signal handler error: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received, stopping forwarder");
        })
        .await
    }

    /// Accept connections from `listener` until `shutdown` completes
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let this = Arc::new(self);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (socket, peer_addr) = result?;
                    debug!("Accepted connection from {}", peer_addr);
                    let this = Arc::clone(&this);
                    tokio::spawn(async move {
                        if let Err(e) = this.handle(socket, peer_addr).await {
                            warn!("Connection error from {}: {}", peer_addr, e);
                        }
                    });
                }
                _ = &mut shutdown => break,
            }
        }

        Ok(())
    }

    async fn handle(&self, mut socket: TcpStream, peer_addr: SocketAddr) -> anyhow::Result<()> {
        let remote = self.dial().await?;
        debug!(
            "{} connected to {}",
            peer_addr,
            remote.peer_addr().map_or_else(|_| self.config.remote.clone(), |a| a.to_string())
        );

        let (up, down) = match &self.fragmenter {
            Some(fragmenter) => relay(&mut socket, fragmenter.wrap(remote)).await?,
            None => relay(&mut socket, remote).await?,
        };
        debug!("{} closed ({} bytes up, {} bytes down)", peer_addr, up, down);
        Ok(())
    }

    /// Open the outbound connection to the configured remote
    pub async fn dial(&self) -> anyhow::Result<DeadlineStream<TcpStream>> {
        let target = if self.config.ip4p {
            lookup_ip4p(&self.config.remote).await
        } else {
            self.config.remote.clone()
        };

        let timeout = Duration::from_secs(self.config.connect_timeout);
        let stream = tokio::time::timeout(timeout, TcpStream::connect(&target))
            .await
            .map_err(|_| anyhow!("Connect to {} timed out after {:?}", target, timeout))?
            .map_err(|e| anyhow!("Failed to connect to {}: {}", target, e))?;

        if self.config.tcp_nodelay {
            stream.set_nodelay(true)?;
        }
        Ok(DeadlineStream::new(stream))
    }
}

async fn relay<C: Connection>(local: &mut TcpStream, mut remote: C) -> anyhow::Result<(u64, u64)> {
    Ok(copy_bidirectional(local, &mut remote).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::FragmentSpec;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;

    fn forward_config(remote: SocketAddr) -> ForwardConfig {
        ForwardConfig {
            remote: remote.to_string(),
            ..Default::default()
        }
    }

    /// Remote that collects everything until EOF, then answers and closes
    async fn collecting_remote() -> (SocketAddr, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            socket.read_to_end(&mut received).await.unwrap();
            socket.write_all(b"bye").await.unwrap();
            received
        });
        (addr, handle)
    }

    async fn run_through(fragmenter: Option<Fragmenter>, payload: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let (remote_addr, remote) = collecting_remote().await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let local_addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let forwarder = Forwarder::new(forward_config(remote_addr), fragmenter);
        let server = tokio::spawn(forwarder.serve(listener, async move {
            let _ = stop_rx.await;
        }));

        let mut client = TcpStream::connect(local_addr).await.unwrap();
        client.write_all(payload).await.unwrap();
        client.shutdown().await.unwrap();
        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();

        let received = remote.await.unwrap();
        let _ = stop_tx.send(());
        server.await.unwrap().unwrap();
        (received, reply)
    }

    #[tokio::test]
    async fn test_relays_fragmented_hello() {
        let mut hello = vec![22, 3, 1, 0, 64];
        hello.extend((0..64).map(|i| i as u8));
        let spec = FragmentSpec::parse("tlshello", "3-9", "1-2").unwrap();

        let (received, reply) = run_through(Some(Fragmenter::new(spec)), &hello).await;

        // Re-framed records carry the original payload in order
        let mut payload = Vec::new();
        let mut rest = received.as_slice();
        while !rest.is_empty() {
            let len = usize::from(u16::from_be_bytes([rest[3], rest[4]]));
            assert_eq!(&rest[..3], &[22, 3, 1]);
            payload.extend_from_slice(&rest[5..5 + len]);
            rest = &rest[5 + len..];
        }
        assert_eq!(payload, hello[5..].to_vec());
        assert_eq!(reply, b"bye");
    }

    #[tokio::test]
    async fn test_relays_segmented_stream_unchanged() {
        let spec = FragmentSpec::parse("", "1-16", "0").unwrap();
        let payload: Vec<u8> = (0..200).map(|i| (i * 7) as u8).collect();

        let (received, reply) = run_through(Some(Fragmenter::new(spec)), &payload).await;

        assert_eq!(received, payload);
        assert_eq!(reply, b"bye");
    }

    #[tokio::test]
    async fn test_relays_without_fragmentation() {
        let (received, reply) = run_through(None, b"plain bytes").await;
        assert_eq!(received, b"plain bytes");
        assert_eq!(reply, b"bye");
    }

    #[tokio::test]
    async fn test_dial_sets_nodelay() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let forwarder = Forwarder::new(forward_config(listener.local_addr().unwrap()), None);

        let stream = forwarder.dial().await.unwrap();
        assert!(stream.get_ref().nodelay().unwrap());
    }

    #[tokio::test]
    async fn test_dial_refused() {
        // Bind then drop to get a port with no listener
        let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
        let forwarder = Forwarder::new(forward_config(addr), None);
        assert!(forwarder.dial().await.is_err());
    }

    #[tokio::test]
    async fn test_run_requires_remote() {
        let forwarder = Forwarder::new(ForwardConfig::default(), None);
        assert!(forwarder.run().await.is_err());
    }
}
