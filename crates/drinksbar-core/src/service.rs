//! Service orchestrator. Validates configuration, arms the deadline, then
//! drives each configured channel through its lifecycle in turn.
//!
//! The stream lifecycle always completes (or fails) before the datagram
//! lifecycle starts. Setup failures on an activated transport end the run
//! immediately; failures while waiting for data are reported as "nothing
//! received" and the run carries on.

use std::path::{Path, PathBuf};

use tokio::sync::broadcast;
use tracing::{info, warn};

use drinksbar_config::{AppConfig, ConfigError};

use crate::channel::{
    ChannelError, DatagramChannel, STREAM_BACKLOG, StreamChannel, TransferError, TransportKind,
};
use crate::deadline::{DeadlineExceeded, DeadlineGuard};
use crate::payload::{Payload, PayloadLimit};

/// Progress notifications published while the service runs.
#[derive(Debug, Clone)]
pub enum ServiceEvent {
    /// The endpoint is bound (and listening, for stream) at `path`.
    Ready { kind: TransportKind, path: PathBuf },
    /// A payload arrived.
    Received {
        kind: TransportKind,
        payload: Payload,
    },
    /// The data phase ended without a payload.
    NothingReceived { kind: TransportKind, reason: String },
    /// The channel is closed. Sent once per transport that was attempted,
    /// whether its lifecycle succeeded or failed.
    Closed { kind: TransportKind },
}

/// How the data phase of one transport ended.
#[derive(Debug)]
pub enum ReceiveOutcome {
    Received(Payload),
    NothingReceived(TransferError),
}

impl ReceiveOutcome {
    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Self::Received(payload) => Some(payload),
            Self::NothingReceived(_) => None,
        }
    }
}

/// Result of a completed run. `None` means the transport was not configured.
#[derive(Debug, Default)]
pub struct ServiceSummary {
    pub stream: Option<ReceiveOutcome>,
    pub datagram: Option<ReceiveOutcome>,
}

/// Request to stop a running service, as if Ctrl-C had been pressed.
#[derive(Debug, Clone)]
pub struct ShutdownSignal;

/// Errors that end a service run with failure status.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    DeadlineExceeded(#[from] DeadlineExceeded),

    #[error("interrupted before completion")]
    Interrupted,
}

impl ServiceError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        1
    }
}

/// The dual-transport local socket service.
pub struct Service {
    config: AppConfig,
    events_tx: broadcast::Sender<ServiceEvent>,
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
}

impl Service {
    /// Create a new service instance with the given configuration.
    pub fn new(config: AppConfig) -> Self {
        let (events_tx, _) = broadcast::channel(64);
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            events_tx,
            shutdown_tx,
        }
    }

    /// Get a reference to the service's configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Subscribe to progress events. Subscribe before calling [`run`].
    ///
    /// [`run`]: Service::run
    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.events_tx.subscribe()
    }

    /// Get a sender that interrupts [`run`] when signalled.
    ///
    /// Only signals sent while `run` is in progress are seen.
    ///
    /// [`run`]: Service::run
    pub fn shutdown_sender(&self) -> broadcast::Sender<ShutdownSignal> {
        self.shutdown_tx.clone()
    }

    /// Request that an in-progress [`run`] stop.
    ///
    /// [`run`]: Service::run
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(ShutdownSignal);
    }

    fn emit(&self, event: ServiceEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Run both lifecycles once.
    ///
    /// Nothing is bound if the configuration is invalid. When a deadline is
    /// configured, the whole run is cancelled once it passes and every open
    /// channel is closed on the way out. Ctrl-C or a [`shutdown`] request
    /// cancels the run the same way and returns [`ServiceError::Interrupted`].
    ///
    /// [`shutdown`]: Service::shutdown
    pub async fn run(&self) -> Result<ServiceSummary, ServiceError> {
        self.config.validate()?;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let mut guard = DeadlineGuard::disarmed();
        if let Some(deadline) = self.config.service.deadline() {
            guard.arm(deadline);
            info!(secs = deadline.as_secs(), "Timeout set");
        }

        info!(
            stream = ?self.config.uds.stream_path(),
            datagram = ?self.config.uds.datagram_path(),
            "drinksbar service starting"
        );

        tokio::select! {
            outcome = guard.guard(self.drive()) => outcome?,
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, closing channels");
                Err(ServiceError::Interrupted)
            }
            Ok(()) = tokio::signal::ctrl_c() => {
                warn!("Ctrl-C received, closing channels");
                Err(ServiceError::Interrupted)
            }
        }
    }

    async fn drive(&self) -> Result<ServiceSummary, ServiceError> {
        let limit = PayloadLimit::from(&self.config.payload);
        let mut summary = ServiceSummary::default();

        if !self.config.has_endpoints() {
            warn!("No socket paths configured, nothing to serve");
        }

        if let Some(path) = self.config.uds.stream_path() {
            summary.stream = Some(self.drive_stream(path, &limit).await?);
        }
        if let Some(path) = self.config.uds.datagram_path() {
            summary.datagram = Some(self.drive_datagram(path, &limit).await?);
        }

        info!("drinksbar service finished");
        Ok(summary)
    }

    async fn drive_stream(
        &self,
        path: &Path,
        limit: &PayloadLimit,
    ) -> Result<ReceiveOutcome, ChannelError> {
        let mut channel = StreamChannel::new(path);
        let outcome = self.stream_lifecycle(&mut channel, limit).await;
        channel.close();
        self.emit(ServiceEvent::Closed {
            kind: TransportKind::Stream,
        });
        outcome
    }

    async fn stream_lifecycle(
        &self,
        channel: &mut StreamChannel,
        limit: &PayloadLimit,
    ) -> Result<ReceiveOutcome, ChannelError> {
        channel.create()?;
        channel.bind()?;
        channel.listen(STREAM_BACKLOG)?;
        self.emit(ServiceEvent::Ready {
            kind: TransportKind::Stream,
            path: channel.path().to_path_buf(),
        });

        let received = match channel.accept_one().await {
            Ok(()) => channel.receive_one(limit).await,
            Err(e) => Err(e),
        };
        Ok(self.settle(TransportKind::Stream, received))
    }

    async fn drive_datagram(
        &self,
        path: &Path,
        limit: &PayloadLimit,
    ) -> Result<ReceiveOutcome, ChannelError> {
        let mut channel = DatagramChannel::new(path);
        let outcome = self.datagram_lifecycle(&mut channel, limit).await;
        channel.close();
        self.emit(ServiceEvent::Closed {
            kind: TransportKind::Datagram,
        });
        outcome
    }

    async fn datagram_lifecycle(
        &self,
        channel: &mut DatagramChannel,
        limit: &PayloadLimit,
    ) -> Result<ReceiveOutcome, ChannelError> {
        channel.create()?;
        channel.bind()?;
        self.emit(ServiceEvent::Ready {
            kind: TransportKind::Datagram,
            path: channel.path().to_path_buf(),
        });

        let received = channel.receive_one(limit).await;
        Ok(self.settle(TransportKind::Datagram, received))
    }

    /// Absorb a data-phase result into an outcome and announce it.
    fn settle(
        &self,
        kind: TransportKind,
        received: Result<Payload, TransferError>,
    ) -> ReceiveOutcome {
        match received {
            Ok(payload) => {
                info!(%kind, bytes = payload.len(), truncated = payload.is_truncated(), "Payload received");
                self.emit(ServiceEvent::Received {
                    kind,
                    payload: payload.clone(),
                });
                ReceiveOutcome::Received(payload)
            }
            Err(e) => {
                info!(%kind, reason = %e, "Nothing received");
                self.emit(ServiceEvent::NothingReceived {
                    kind,
                    reason: e.to_string(),
                });
                ReceiveOutcome::NothingReceived(e)
            }
        }
    }
}
