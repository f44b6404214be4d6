//! Connectionless channel manager.
//!
//! There is no listen step: the socket can receive as soon as it is bound.
//! One datagram is read per run. The sender address is kept on the channel
//! for inspection but nothing replies to it.

use std::fmt;
use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};

use tokio::net::UnixDatagram;
use tokio::net::unix::SocketAddr;
use tracing::{debug, info};

use super::{ChannelError, TransferError, TransportKind, bind_socket, create_socket};
use crate::payload::{Payload, PayloadLimit};

const KIND: TransportKind = TransportKind::Datagram;

/// Observable lifecycle position of a [`DatagramChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatagramState {
    Unconfigured,
    Created,
    Bound,
    Received,
    Closed,
}

impl DatagramState {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::Created => "created",
            Self::Bound => "bound",
            Self::Received => "received",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for DatagramState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

enum Handle {
    Unconfigured,
    Created(OwnedFd),
    Bound(UnixDatagram),
    Received {
        socket: UnixDatagram,
        sender: SocketAddr,
    },
    Closed,
}

impl Handle {
    fn state(&self) -> DatagramState {
        match self {
            Self::Unconfigured => DatagramState::Unconfigured,
            Self::Created(_) => DatagramState::Created,
            Self::Bound(_) => DatagramState::Bound,
            Self::Received { .. } => DatagramState::Received,
            Self::Closed => DatagramState::Closed,
        }
    }
}

/// Owner of the datagram endpoint at one filesystem path.
pub struct DatagramChannel {
    path: PathBuf,
    handle: Handle,
}

impl DatagramChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            handle: Handle::Unconfigured,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> DatagramState {
        self.handle.state()
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.handle, Handle::Closed)
    }

    /// Filesystem address of the last sender, if it had bound one.
    pub fn sender(&self) -> Option<&Path> {
        match &self.handle {
            Handle::Received { sender, .. } => sender.as_pathname(),
            _ => None,
        }
    }

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
    ///
    /// On success the socket is registered with the tokio reactor and
    /// ready to receive.
    pub fn bind(&mut self) -> Result<(), ChannelError> {
        let fd = match self.take() {
            Handle::Created(fd) => fd,
            other => return Err(Self::invalid("bind", other)),
        };

        bind_socket(KIND, &fd, &self.path)?;

        let address_error = |source: std::io::Error| ChannelError::Address {
            kind: KIND,
            op: "bind",
            path: self.path.clone(),
            source,
        };
        let socket = std::os::unix::net::UnixDatagram::from(fd);
        socket.set_nonblocking(true).map_err(address_error)?;
        let socket = UnixDatagram::from_std(socket).map_err(address_error)?;

        info!(path = %self.path.display(), "Datagram socket bound");
        self.handle = Handle::Bound(socket);
        Ok(())
    }

    /// Block until one datagram arrives.
    pub async fn receive_one(&mut self, limit: &PayloadLimit) -> Result<Payload, TransferError> {
        let socket = match self.take() {
            Handle::Bound(socket) => socket,
            other => {
                return Err(TransferError::InvalidState {
                    kind: KIND,
                    op: "receive",
                    state: other.state().as_str(),
                });
            }
        };

        let mut buf = limit.buffer();
        let (n, sender) = socket
            .recv_from(&mut buf)
            .await
            .map_err(TransferError::Receive)?;
        debug!(bytes = n, sender = ?sender.as_pathname(), "Datagram received");

        let payload = limit.admit(&buf[..n])?;
        self.handle = Handle::Received { socket, sender };
        Ok(payload)
    }

    /// Release the socket handle.
    ///
    /// Returns `true` if this call released a handle.
    pub fn close(&mut self) -> bool {
        match self.take() {
            Handle::Unconfigured | Handle::Closed => false,
            Handle::Received { socket, sender } => {
                debug!(
                    path = %self.path.display(),
                    local = ?socket.local_addr().ok(),
                    sender = ?sender.as_pathname(),
                    "Datagram channel closed after receive"
                );
                true
            }
            _ => {
                debug!(path = %self.path.display(), "Datagram channel closed");
                true
            }
        }
    }
}

impl fmt::Debug for DatagramChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatagramChannel")
            .field("path", &self.path)
            .field("state", &self.state())
            .finish()
    }
}
