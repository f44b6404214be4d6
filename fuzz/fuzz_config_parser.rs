//! Fuzz target for the TOML configuration loader.
//!
//! Run with: cargo +nightly fuzz run fuzz_config_parser
//!
//! Feeds arbitrary text through `AppConfig::parse()` and, for anything that
//! parses, through `validate()` and the path accessors.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(config) = drinksbar_config::AppConfig::parse(s) else {
        return;
    };
    if config.validate().is_ok() {
        assert!(config.ports.tcp_port.is_some() && config.ports.udp_port.is_some());
        if let (Some(a), Some(b)) = (config.uds.stream_path(), config.uds.datagram_path()) {
            assert_ne!(a, b);
        }
    }
    let _ = config.service.deadline();
});
