//! Peer client that sends one message to a running service endpoint.
//!
//! Used by `drinksbar send` and by the integration tests to play the
//! part of the peer on either transport.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::net::{UnixDatagram, UnixStream};
use tracing::debug;

/// Errors from the peer client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("no socket found at {}", .0.display())]
    NotRunning(PathBuf),

    #[error("failed to reach socket at {}: {source}", path.display())]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Client for one service endpoint.
#[derive(Debug, Clone)]
pub struct PeerClient {
    socket_path: PathBuf,
}

impl PeerClient {
    /// Create a client targeting the given socket path.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Check whether something exists at the endpoint path.
    pub fn endpoint_available(&self) -> bool {
        self.socket_path.exists()
    }

    fn ensure_available(&self) -> Result<(), ClientError> {
        if self.endpoint_available() {
            Ok(())
        } else {
            Err(ClientError::NotRunning(self.socket_path.clone()))
        }
    }

    fn connect_error(&self, source: std::io::Error) -> ClientError {
        ClientError::Connect {
            path: self.socket_path.clone(),
            source,
        }
    }

    /// Connect to a stream endpoint, write the whole message, and hang up.
    pub async fn send_stream(&self, message: &[u8]) -> Result<(), ClientError> {
        self.ensure_available()?;

        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| self.connect_error(e))?;
        stream.write_all(message).await?;
        stream.shutdown().await?;

        debug!(path = %self.socket_path.display(), bytes = message.len(), "Sent stream message");
        Ok(())
    }

    /// Send one datagram from an unbound socket. Returns the bytes sent.
    pub async fn send_datagram(&self, message: &[u8]) -> Result<usize, ClientError> {
        self.ensure_available()?;

        let socket = UnixDatagram::unbound()?;
        let sent = socket
            .send_to(message, &self.socket_path)
            .await
            .map_err(|e| self.connect_error(e))?;

        debug!(path = %self.socket_path.display(), bytes = sent, "Sent datagram");
        Ok(sent)
    }
}
