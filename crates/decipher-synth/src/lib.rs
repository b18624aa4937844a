//! Synthetic corpus, lexicon, alignment and language-model generation,
//! used by the CLI's `--synthesize` helper and by integration tests
//! that need a toy cipher with a known answer to check EM convergence
//! against.

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

pub mod generator;

pub use generator::{
    flat_language_model_fst, generate_corpus, uniform_alignment_fst, uniform_lexicon_fst, Cipher,
    CorpusOptions, SyntheticCorpus,
};
