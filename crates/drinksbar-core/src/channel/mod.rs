//! Local socket channels: one connection-oriented, one connectionless.
//!
//! Each manager owns exactly one filesystem-addressed endpoint and walks it
//! through an explicit lifecycle:
//!
//! ```text
//! stream:   Unconfigured → Created → Bound → Listening → (Accepted → Received)? → Closed
//! datagram: Unconfigured → Created → Bound → (Received)? → Closed
//! ```
//!
//! A failure in any state moves the manager straight to `Closed`, dropping
//! whatever handle it held. Setup failures (`create`, `bind`, `listen`)
//! surface as [`ChannelError`]; data-phase failures (`accept`, `receive`)
//! surface as [`TransferError`] and are not meant to abort the service.

pub mod datagram;
pub mod stream;

use std::fmt;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd};
use std::path::{Path, PathBuf};

use nix::sys::socket::{AddressFamily, SockFlag, SockType, UnixAddr};
use tracing::debug;

pub use datagram::DatagramChannel;
pub use stream::{PeerConnection, StreamChannel};

/// Listen backlog for the stream endpoint.
pub const STREAM_BACKLOG: i32 = 5;

/// The two transport kinds served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Stream,
    Datagram,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream => write!(f, "stream"),
            Self::Datagram => write!(f, "datagram"),
        }
    }
}

/// Setup-phase failures. Fatal for an activated transport.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("socket ({kind}): {source}")]
    Resource {
        kind: TransportKind,
        source: io::Error,
    },

    #[error("{op} ({kind}) at {}: {source}", path.display())]
    Address {
        kind: TransportKind,
        op: &'static str,
        path: PathBuf,
        source: io::Error,
    },

    #[error("{kind} channel cannot {op} while {state}")]
    InvalidState {
        kind: TransportKind,
        op: &'static str,
        state: &'static str,
    },
}

/// Data-phase failures. Reported as "nothing received", never fatal.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),

    #[error("peer sent no data")]
    Empty,

    #[error("message exceeds {max} bytes and was discarded")]
    Oversize { max: usize },

    #[error("{kind} channel cannot {op} while {state}")]
    InvalidState {
        kind: TransportKind,
        op: &'static str,
        state: &'static str,
    },
}

/// Allocate an unbound `AF_UNIX` socket of the given kind.
fn create_socket(kind: TransportKind) -> Result<OwnedFd, ChannelError> {
    let ty = match kind {
        TransportKind::Stream => SockType::Stream,
        TransportKind::Datagram => SockType::Datagram,
    };
    nix::sys::socket::socket(AddressFamily::Unix, ty, SockFlag::empty(), None).map_err(|errno| {
        ChannelError::Resource {
            kind,
            source: errno.into(),
        }
    })
}

/// Remove whatever sits at `path`, then bind `fd` to it.
///
/// A missing path is fine. Any other unlink error is left for `bind` to
/// report.
fn bind_socket(kind: TransportKind, fd: &OwnedFd, path: &Path) -> Result<(), ChannelError> {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(%kind, path = %path.display(), "Removed stale socket path"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => debug!(%kind, path = %path.display(), error = %e, "Could not remove stale path"),
    }

    let address_error = |source: io::Error| ChannelError::Address {
        kind,
        op: "bind",
        path: path.to_path_buf(),
        source,
    };

    let addr = UnixAddr::new(path).map_err(|errno| address_error(errno.into()))?;
    nix::sys::socket::bind(fd.as_raw_fd(), &addr).map_err(|errno| address_error(errno.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kind_display() {
        assert_eq!(TransportKind::Stream.to_string(), "stream");
        assert_eq!(TransportKind::Datagram.to_string(), "datagram");
    }

    #[test]
    fn test_bind_replaces_stale_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("stale.sock");
        std::fs::write(&path, b"left over").unwrap();

        let fd = create_socket(TransportKind::Datagram).unwrap();
        bind_socket(TransportKind::Datagram, &fd, &path).unwrap();

        let metadata = std::fs::symlink_metadata(&path).unwrap();
        assert!(!metadata.is_file());
    }

    #[test]
    fn test_bind_rejects_overlong_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("x".repeat(200));

        let fd = create_socket(TransportKind::Stream).unwrap();
        let err = bind_socket(TransportKind::Stream, &fd, &path).unwrap_err();
        assert!(matches!(err, ChannelError::Address { op: "bind", .. }));
    }

    #[test]
    fn test_setup_error_messages_name_the_transport() {
        let err = ChannelError::Address {
            kind: TransportKind::Stream,
            op: "bind",
            path: PathBuf::from("/nope/s1"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("bind (stream) at /nope/s1"));
    }
}
