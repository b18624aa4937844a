//! `decipherment-apply`: decodes ciphertext observations against a
//! trained lexicon/alignment cascade and a fixed language model.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use decipher_cli::decoding::{decode_one, power_map_lexicon, DecodeOptions};
use decipher_compose::compose_pair;
use decipher_core::io::{read_fst, read_transcripts, transcript_to_linear_fst, write_fst_archive};
use decipher_core::TropicalWeight;

/// Decodes a corpus of ciphertext observations into plaintext
/// hypotheses using a trained lexicon and alignment FST.
#[derive(Parser, Debug)]
#[command(name = "decipherment-apply", version, about)]
struct Args {
    /// Temperature applied to the lexicon's arc weights before
    /// composition; higher values trust the lexicon's own confidence
    /// more sharply.
    #[arg(long, default_value_t = 2.5)]
    power: f64,

    /// Equivalence-class beam for the three-way composer, in -log units.
    #[arg(long, default_value_t = 8.0)]
    prune_beam: f64,

    /// Beam used when pruning the kept output lattice (distinct from
    /// the search beam above).
    #[arg(long, default_value_t = 4.0)]
    output_prune_beam: f64,

    /// Prune the output lattice after decoding.
    #[arg(long, default_value_t = true)]
    prune_output: bool,

    /// Drop weights from the output lattice after decoding.
    #[arg(long, default_value_t = true)]
    remove_weights: bool,

    /// Path to the trained lexicon FST.
    lexicon_in: PathBuf,

    /// Path to the trained alignment FST.
    alignment_in: PathBuf,

    /// Path to the fixed language model FST.
    lm_in: PathBuf,

    /// Path to a whitespace-separated integer transcript file of
    /// ciphertext observations.
    observations: PathBuf,

    /// Path to write one decoded hypothesis per utterance, as a
    /// whitespace-separated integer transcript file.
    hypotheses_out: PathBuf,

    /// Optional path to write each utterance's pruned output lattice
    /// as a keyed FST archive.
    #[arg(long)]
    output_fst: Option<PathBuf>,
}

fn main() -> Result<()> {
    decipher_cli::init_tracing();
    let args = Args::parse();

    let lex: decipher_core::Fst<TropicalWeight> =
        read_fst(&args.lexicon_in).context("reading lexicon FST")?;
    let ali: decipher_core::Fst<TropicalWeight> =
        read_fst(&args.alignment_in).context("reading alignment FST")?;
    let lm: decipher_core::Fst<TropicalWeight> =
        read_fst(&args.lm_in).context("reading language model FST")?;

    let powered_lex = power_map_lexicon(&lex, args.power);
    let lex_ali = compose_pair(&powered_lex, &ali).fst;

    let opts = DecodeOptions {
        power: args.power,
        prune_beam: args.prune_beam,
        output_prune_beam: args.output_prune_beam,
        prune_output: args.prune_output,
        remove_weights: args.remove_weights,
    };

    let transcripts = read_transcripts(&args.observations).context("reading observations")?;
    let mut hypotheses = String::new();
    let mut lattices = std::collections::BTreeMap::new();
    let mut num_empty = 0usize;

    for (utt_id, syms) in &transcripts {
        let observation: decipher_core::Fst<TropicalWeight> = transcript_to_linear_fst(syms);
        let result = decode_one(&observation, &lex_ali, &lm, opts);
        if result.hypothesis.is_empty() {
            num_empty += 1;
        }
        let words: Vec<String> = result.hypothesis.iter().map(ToString::to_string).collect();
        hypotheses.push_str(utt_id);
        hypotheses.push(' ');
        hypotheses.push_str(&words.join(" "));
        hypotheses.push('\n');
        if let Some(lattice) = result.lattice {
            lattices.insert(utt_id.clone(), lattice);
        }
    }

    std::fs::write(&args.hypotheses_out, hypotheses).context("writing hypotheses")?;
    if let Some(output_fst) = &args.output_fst {
        write_fst_archive(output_fst, &lattices).context("writing output lattices")?;
    }

    info!(
        total = transcripts.len(),
        empty = num_empty,
        "decoding complete"
    );
    if num_empty == transcripts.len() && !transcripts.is_empty() {
        anyhow::bail!("every observation failed to decode");
    }
    Ok(())
}
