#![deny(unsafe_code)]

//! Shared test utilities for the drinksbar workspace.
//!
//! Provides config builders, throwaway socket directories, event waiters,
//! and tracing helpers so that individual crate tests stay concise.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! drinksbar-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod sockets;
pub mod tracing_setup;
