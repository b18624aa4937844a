//! Expectation-maximization training for the decipherment cascade:
//! posterior accumulation ([`expectations`]) and the forward/backward
//! pass that drives it ([`cascade`]).

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

pub mod cascade;
pub mod expectations;

pub use cascade::{load_cascade, CompositionStrategy, DeciphermentCascade, ObservationResult};
pub use expectations::Expectations;
