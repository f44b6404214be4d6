//! Socket fixtures for service tests.
//!
//! [`TestSockets`] owns a temporary directory to put endpoint paths in, and
//! [`spawn_service`] starts a [`Service`] on a background task with an event
//! subscription taken before it runs, so tests can wait for readiness
//! instead of sleeping.

use std::path::{Path, PathBuf};
use std::time::Duration;

use drinksbar_config::AppConfig;
use drinksbar_core::{
    Service, ServiceError, ServiceEvent, ServiceSummary, ShutdownSignal, TransportKind,
};
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// How long helpers wait for an event before giving up.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// A test-scoped directory for socket paths.
///
/// The directory is deleted automatically when this value is dropped,
/// guaranteeing cleanup even on panic.
pub struct TestSockets {
    _temp_dir: TempDir,
    dir: PathBuf,
}

impl TestSockets {
    pub fn new() -> Self {
        let temp_dir = tempfile::Builder::new()
            .prefix("drinksbar")
            .tempdir()
            .expect("failed to create temp dir");
        let dir = temp_dir.path().to_path_buf();
        Self {
            _temp_dir: temp_dir,
            dir,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// A path inside the directory. Nothing is created.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn stream_path(&self) -> PathBuf {
        self.path("bar.stream")
    }

    pub fn datagram_path(&self) -> PathBuf {
        self.path("bar.dgram")
    }

    /// A path whose parent directory does not exist, so binding fails.
    pub fn unbindable_path(&self) -> PathBuf {
        self.dir.join("missing").join("bar.sock")
    }
}

impl Default for TestSockets {
    fn default() -> Self {
        Self::new()
    }
}

/// A service running on a background task.
pub struct RunningService {
    pub events: broadcast::Receiver<ServiceEvent>,
    pub handle: JoinHandle<Result<ServiceSummary, ServiceError>>,
    shutdown: broadcast::Sender<ShutdownSignal>,
}

impl RunningService {
    /// Wait for the `Ready` event of `kind` and return the announced path.
    pub async fn ready(&mut self, kind: TransportKind) -> PathBuf {
        tokio::time::timeout(EVENT_TIMEOUT, async {
            loop {
                match self.events.recv().await {
                    Ok(ServiceEvent::Ready { kind: k, path }) if k == kind => return path,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => {
                        panic!("service stopped before {kind} was ready")
                    }
                }
            }
        })
        .await
        .expect("timed out waiting for readiness")
    }

    /// Wait for the next event, whatever it is.
    pub async fn next_event(&mut self) -> ServiceEvent {
        tokio::time::timeout(EVENT_TIMEOUT, self.events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event channel closed")
    }

    /// Collect every remaining event until the service drops its sender.
    pub async fn drain_events(&mut self) -> Vec<ServiceEvent> {
        let mut seen = Vec::new();
        tokio::time::timeout(EVENT_TIMEOUT, async {
            loop {
                match self.events.recv().await {
                    Ok(event) => seen.push(event),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
        .await
        .expect("service kept its event channel open");
        seen
    }

    /// Interrupt the run, as Ctrl-C would.
    pub fn interrupt(&self) {
        self.shutdown
            .send(ShutdownSignal)
            .expect("service is not running");
    }

    /// Wait for the run to finish.
    pub async fn finish(self) -> Result<ServiceSummary, ServiceError> {
        tokio::time::timeout(EVENT_TIMEOUT, self.handle)
            .await
            .expect("service did not finish in time")
            .expect("service task panicked")
    }
}

/// Start a service for `config` on a background task.
pub fn spawn_service(config: AppConfig) -> RunningService {
    let service = Service::new(config);
    let events = service.subscribe();
    let shutdown = service.shutdown_sender();
    let handle = tokio::spawn(async move { service.run().await });
    RunningService {
        events,
        handle,
        shutdown,
    }
}
