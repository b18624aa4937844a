//! `decipherment-learn`: runs EM training over a lexicon and alignment
//! FST against a fixed language model and a corpus of observations.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use decipher_cli::sharding::round_robin_shards;
use decipher_cli::training::train;
use decipher_core::io::{read_transcripts, transcript_to_linear_fst, write_fst};
use decipher_core::LogWeight;
use decipher_em::{load_cascade, CompositionStrategy};

/// Trains a decipherment cascade's lexicon and/or alignment FST by EM.
#[derive(Parser, Debug)]
#[command(name = "decipherment-learn", version, about)]
struct Args {
    /// Size of the source (plaintext) alphabet, including epsilon and silence.
    #[arg(long)]
    num_source_symbols: u32,

    /// Size of the target (ciphertext) alphabet, including epsilon and silence.
    #[arg(long)]
    num_target_symbols: u32,

    /// Re-estimate the lexicon FST's weights.
    #[arg(long, default_value_t = true)]
    train_lex: bool,

    /// Re-estimate the alignment FST's weights.
    #[arg(long, default_value_t = true)]
    train_ali: bool,

    /// Number of EM iterations to run.
    #[arg(long, default_value_t = 10)]
    num_iters: usize,

    /// Number of worker threads (and training shards) to use.
    #[arg(long, default_value_t = 1)]
    num_threads: usize,

    /// Use the beam-pruned three-way composer instead of the exact
    /// standard composer.
    #[arg(long, default_value_t = false)]
    threeway: bool,

    /// Equivalence-class beam for the three-way composer, in -log units.
    #[arg(long, default_value_t = 8.0)]
    prune_beam: f64,

    /// Virtual prior mass seeded into each iteration's expectations
    /// when `--threeway` is set.
    #[arg(long, default_value_t = 1000.0)]
    smoothing: f64,

    /// Path to the initial lexicon FST (JSON or CBOR, by extension).
    lexicon_in: PathBuf,

    /// Path to the initial alignment FST.
    alignment_in: PathBuf,

    /// Path to the fixed language model FST.
    lm_in: PathBuf,

    /// Path to a whitespace-separated integer transcript file, one
    /// utterance per line: `utt_id sym1 sym2 ...`.
    observations: PathBuf,

    /// Path to write the re-estimated lexicon FST.
    lexicon_out: PathBuf,

    /// Path to write the re-estimated alignment FST.
    alignment_out: PathBuf,
}

fn main() -> Result<()> {
    decipher_cli::init_tracing();
    let args = Args::parse();

    if args.num_source_symbols == 0 || args.num_target_symbols == 0 {
        anyhow::bail!("--num-source-symbols and --num-target-symbols must both be positive");
    }

    let mut cascade = load_cascade(
        &args.lexicon_in,
        &args.alignment_in,
        &args.lm_in,
        args.train_lex,
        args.train_ali,
        args.num_target_symbols as usize,
    )
    .context("loading cascade")?;
    cascade
        .validate(args.num_source_symbols as usize)
        .context("validating cascade against declared alphabet sizes")?;

    let transcripts = read_transcripts(&args.observations).context("reading observations")?;
    let observations: Vec<decipher_core::Fst<LogWeight>> = transcripts
        .values()
        .map(|syms| transcript_to_linear_fst(syms))
        .collect();
    info!(count = observations.len(), "loaded observations");

    let shards = round_robin_shards(&observations, args.num_threads);
    let strategy = if args.threeway {
        CompositionStrategy::ThreeWay(decipher_compose::ThreeWayOptions {
            prune_beam: args.prune_beam,
            early_stop_single_best: false,
        })
    } else {
        CompositionStrategy::Standard
    };

    let _stats = train(
        &mut cascade,
        &shards,
        args.num_iters,
        strategy,
        args.smoothing,
        args.num_source_symbols as usize,
        args.num_target_symbols as usize,
    );

    write_fst(&args.lexicon_out, &cascade.lex_fst).context("writing lexicon FST")?;
    write_fst(&args.alignment_out, &cascade.ali_fst).context("writing alignment FST")?;
    Ok(())
}
