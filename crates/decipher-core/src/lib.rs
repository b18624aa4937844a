//! WFST substrate shared by the composer, EM trainer, synthetic corpus
//! generator and CLI: semirings, the `Arc`/`Fst` types, the dense
//! `Table<T>`, and the handful of FST algorithms (epsilon removal,
//! shortest-distance, pruning, determinization, minimization) the
//! decipherment pipeline treats as given primitives.
//!
//! No generic third-party WFST crate is pinned here: the composition
//! and EM algorithms this workspace is built around are specific enough
//! (triple-state-table beam search, asymmetric deletion detection in the
//! M-step) that they are implemented directly against this substrate
//! rather than adapted to an external library's trait hierarchy.

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

pub mod algorithms;
pub mod fst;
pub mod io;
pub mod semiring;
pub mod table;

pub use algorithms::{
    connect, determinize, minimize, prune, project_input, project_output, rm_epsilon,
    remove_weights, shortest_distance, shortest_path,
};
pub use fst::{Arc, Fst, Label, StateId, EPSILON, NO_LABEL, NO_STATE_ID, SILENCE};
pub use semiring::{log_to_tropical, tropical_to_log, Log64Weight, LogWeight, Semiring, TropicalWeight};
pub use table::Table;
