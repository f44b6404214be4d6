#![deny(unsafe_code)]

//! drinksbar core service runtime.
//!
//! Exposes two local endpoints addressed by filesystem path, one stream and
//! one datagram, and serves a single peer interaction on each per run. The
//! [`Service`] drives the channel managers in order under an optional
//! [`DeadlineGuard`]; the CLI is a thin shell around it.

/// Stream and datagram channel managers.
pub mod channel;
/// Peer-side client for sending one message to an endpoint.
pub mod client;
/// Overall deadline for a service run.
pub mod deadline;
/// Bounded receive buffers and the oversize policy.
pub mod payload;
/// Service orchestrator and progress events.
pub mod service;

pub use channel::{ChannelError, DatagramChannel, StreamChannel, TransferError, TransportKind};
pub use client::{ClientError, PeerClient};
pub use deadline::{DeadlineExceeded, DeadlineGuard};
pub use payload::{Payload, PayloadLimit};
pub use service::{
    ReceiveOutcome, Service, ServiceError, ServiceEvent, ServiceSummary, ShutdownSignal,
};
