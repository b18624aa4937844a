//! Shared plumbing for the `decipherment-learn` and `decipherment-apply`
//! binaries: tracing setup, shard partitioning, and the training and
//! decoding drivers.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(clippy::module_name_repetitions)]

pub mod decoding;
pub mod sharding;
pub mod training;

use tracing_subscriber::EnvFilter;

/// Initializes a compact, `RUST_LOG`-driven tracing subscriber, the way
/// every binary in this workspace starts up.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).compact().init();
}
