//! Registry Relayer - Library interface
//!
//! Re-exports internal modules for use in integration tests.

pub mod config;
pub mod metrics;
pub mod relay;
pub mod server;

pub use config::Config;
pub use relay::{MirrorOutcome, PollReport, RelaySettings, TransferRelay};
