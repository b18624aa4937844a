//! `transcripts-to-fsts`: converts a whitespace-separated integer
//! transcript file into a keyed archive of linear acceptor FSTs, one
//! per utterance id.
//!
//! Grounded on `transcripts-to-fsts.cc`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use decipher_core::io::{read_transcripts, transcript_to_linear_fst, write_fst_archive};
use decipher_core::LogWeight;

/// Converts an integer transcript file into a keyed FST archive.
#[derive(Parser, Debug)]
#[command(name = "transcripts-to-fsts", version, about)]
struct Args {
    /// Path to a whitespace-separated integer transcript file, one
    /// utterance per line: `utt_id sym1 sym2 ...`.
    transcripts_in: PathBuf,

    /// Path to write the keyed FST archive (JSON or CBOR, by
    /// extension).
    fsts_out: PathBuf,
}

fn main() -> Result<()> {
    decipher_cli::init_tracing();
    let args = Args::parse();

    let transcripts = read_transcripts(&args.transcripts_in).context("reading transcripts")?;
    let archive: std::collections::BTreeMap<String, decipher_core::Fst<LogWeight>> = transcripts
        .iter()
        .map(|(utt_id, syms)| (utt_id.clone(), transcript_to_linear_fst(syms)))
        .collect();

    info!(count = archive.len(), "converted transcripts to FSTs");
    write_fst_archive(&args.fsts_out, &archive).context("writing FST archive")?;
    Ok(())
}
