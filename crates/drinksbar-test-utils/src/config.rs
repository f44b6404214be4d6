//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values
//! without repeating boilerplate across crate boundaries. The builder starts
//! from a config that already passes validation.

use std::path::PathBuf;

use drinksbar_config::{AppConfig, OversizePolicy};

/// Ports used by every builder unless overridden.
pub const TEST_TCP_PORT: u16 = 5555;
pub const TEST_UDP_PORT: u16 = 6666;

/// Fluent builder for [`AppConfig`] in tests.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .stream_path(sockets.stream_path())
///     .timeout_secs(2)
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        let mut config = AppConfig::default();
        config.ports.tcp_port = Some(TEST_TCP_PORT);
        config.ports.udp_port = Some(TEST_UDP_PORT);
        Self { config }
    }

    pub fn without_ports(mut self) -> Self {
        self.config.ports.tcp_port = None;
        self.config.ports.udp_port = None;
        self
    }

    pub fn stream_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.uds.stream_path = Some(path.into());
        self
    }

    pub fn datagram_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.uds.datagram_path = Some(path.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.service.timeout_secs = secs;
        self
    }

    pub fn max_payload(mut self, max_bytes: usize, oversize: OversizePolicy) -> Self {
        self.config.payload.max_bytes = max_bytes;
        self.config.payload.oversize = oversize;
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
