//! Connection-oriented channel manager.
//!
//! Serves exactly one peer per run: accept one connection, read once,
//! close. This is a readiness gate, not an accept loop.

use std::fmt;
use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};

use nix::sys::socket::Backlog;
use tokio::io::AsyncReadExt;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info};

use super::{ChannelError, TransferError, TransportKind, bind_socket, create_socket};
use crate::payload::{Payload, PayloadLimit};

const KIND: TransportKind = TransportKind::Stream;

/// Observable lifecycle position of a [`StreamChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Unconfigured,
    Created,
    Bound,
    Listening,
    Accepted,
    Received,
    Closed,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StreamState {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::Created => "created",
            Self::Bound => "bound",
            Self::Listening => "listening",
            Self::Accepted => "accepted",
            Self::Received => "received",
            Self::Closed => "closed",
        }
    }
}

/// One accepted client connection.
#[derive(Debug)]
pub struct PeerConnection {
    stream: UnixStream,
}

impl PeerConnection {
    /// Process id of the connected peer, when the platform reports it.
    pub fn peer_pid(&self) -> Option<i32> {
        self.stream.peer_cred().ok().and_then(|cred| cred.pid())
    }

    /// User id of the connected peer.
    pub fn peer_uid(&self) -> Option<u32> {
        self.stream.peer_cred().ok().map(|cred| cred.uid())
    }
}

enum Handle {
    Unconfigured,
    Created(OwnedFd),
    Bound(OwnedFd),
    Listening(UnixListener),
    Accepted {
        listener: UnixListener,
        peer: PeerConnection,
    },
    Received(UnixListener),
    Closed,
}

impl Handle {
    fn state(&self) -> StreamState {
        match self {
            Self::Unconfigured => StreamState::Unconfigured,
            Self::Created(_) => StreamState::Created,
            Self::Bound(_) => StreamState::Bound,
            Self::Listening(_) => StreamState::Listening,
            Self::Accepted { .. } => StreamState::Accepted,
            Self::Received(_) => StreamState::Received,
            Self::Closed => StreamState::Closed,
        }
    }
}

/// Owner of the stream endpoint at one filesystem path.
pub struct StreamChannel {
    path: PathBuf,
    handle: Handle,
}

impl StreamChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            handle: Handle::Unconfigured,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> StreamState {
        self.handle.state()
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.handle, Handle::Closed)
    }

    /// Move out the current handle, leaving `Closed` behind.
    ///
    /// Every transition goes through here so that an early return leaves
    /// the channel closed with its handle already dropped.
    fn take(&mut self) -> Handle {
        std::mem::replace(&mut self.handle, Handle::Closed)
    }

    fn invalid(op: &'static str, found: Handle) -> ChannelError {
        ChannelError::InvalidState {
            kind: KIND,
            op,
            state: found.state().as_str(),
        }
    }

    fn address_error(&self, op: &'static str, source: std::io::Error) -> ChannelError {
        ChannelError::Address {
            kind: KIND,
            op,
            path: self.path.clone(),
            source,
        }
    }

    /// Allocate the socket handle.
    pub fn create(&mut self) -> Result<(), ChannelError> {
        match self.take() {
            Handle::Unconfigured => {
                self.handle = Handle::Created(create_socket(KIND)?);
                Ok(())
            }
            other => Err(Self::invalid("create", other)),
        }
    }

    /// Unlink any stale object at the path and bind to it.
    pub fn bind(&mut self) -> Result<(), ChannelError> {
        match self.take() {
            Handle::Created(fd) => {
                bind_socket(KIND, &fd, &self.path)?;
                self.handle = Handle::Bound(fd);
                Ok(())
            }
            other => Err(Self::invalid("bind", other)),
        }
    }

    /// Mark the bound socket ready to accept.
    ///
    /// Registers the listener with the tokio reactor, so this must run
    /// inside a runtime.
    pub fn listen(&mut self, backlog: i32) -> Result<(), ChannelError> {
        let fd = match self.take() {
            Handle::Bound(fd) => fd,
            other => return Err(Self::invalid("listen", other)),
        };

        let backlog = Backlog::new(backlog).map_err(|e| self.address_error("listen", e.into()))?;
        nix::sys::socket::listen(&fd, backlog).map_err(|e| self.address_error("listen", e.into()))?;

        let listener = std::os::unix::net::UnixListener::from(fd);
        listener
            .set_nonblocking(true)
            .map_err(|e| self.address_error("listen", e))?;
        let listener =
            UnixListener::from_std(listener).map_err(|e| self.address_error("listen", e))?;

        info!(path = %self.path.display(), "Stream socket listening");
        self.handle = Handle::Listening(listener);
        Ok(())
    }

    /// Block until one peer connects.
    pub async fn accept_one(&mut self) -> Result<(), TransferError> {
        let listener = match self.take() {
            Handle::Listening(listener) => listener,
            other => {
                return Err(TransferError::InvalidState {
                    kind: KIND,
                    op: "accept",
                    state: other.state().as_str(),
                });
            }
        };

        let (stream, _) = listener.accept().await.map_err(TransferError::Accept)?;
        let peer = PeerConnection { stream };
        debug!(
            path = %self.path.display(),
            pid = ?peer.peer_pid(),
            uid = ?peer.peer_uid(),
            "Accepted stream peer"
        );

        self.handle = Handle::Accepted { listener, peer };
        Ok(())
    }

    /// Read once from the accepted peer, then drop the connection.
    pub async fn receive_one(&mut self, limit: &PayloadLimit) -> Result<Payload, TransferError> {
        let (listener, mut peer) = match self.take() {
            Handle::Accepted { listener, peer } => (listener, peer),
            other => {
                return Err(TransferError::InvalidState {
                    kind: KIND,
                    op: "receive",
                    state: other.state().as_str(),
                });
            }
        };

        let mut buf = limit.buffer();
        let n = peer
            .stream
            .read(&mut buf)
            .await
            .map_err(TransferError::Receive)?;
        drop(peer);

        let payload = limit.admit(&buf[..n])?;
        debug!(bytes = payload.len(), truncated = payload.is_truncated(), "Stream payload read");

        self.handle = Handle::Received(listener);
        Ok(payload)
    }

    /// Release the peer connection and listening handle.
    ///
    /// Returns `true` if this call released a handle; `false` if there was
    /// nothing left to release.
    pub fn close(&mut self) -> bool {
        match self.take() {
            Handle::Unconfigured | Handle::Closed => false,
            Handle::Received(listener) => {
                debug!(
                    path = %self.path.display(),
                    local = ?listener.local_addr().ok(),
                    "Stream channel closed after receive"
                );
                true
            }
            _ => {
                debug!(path = %self.path.display(), "Stream channel closed");
                true
            }
        }
    }
}

impl fmt::Debug for StreamChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamChannel")
            .field("path", &self.path)
            .field("state", &self.state())
            .finish()
    }
}
