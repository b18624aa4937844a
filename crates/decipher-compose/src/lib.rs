//! Composition layer: the dense arc matcher and triple state table the
//! three-way composer is built from, the exact (non-beam) standard
//! composer used as both a correctness reference and the decoding
//! cascade builder, and the beam-pruned three-way composer used during
//! training.

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

pub mod dense_matcher;
pub mod standard_compose;
pub mod three_way_compose;
pub mod triple_state_table;

pub use dense_matcher::DenseMatcher;
pub use standard_compose::{compose_pair, ComposeResult, StandardComposer};
pub use three_way_compose::{compose as three_way_compose, ThreeWayOptions, ThreeWayResult};
pub use triple_state_table::{StateTuple, TripleStateTable};
