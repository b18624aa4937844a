//! The decoding driver: applies a trained cascade to ciphertext
//! observations and extracts the best plaintext hypothesis.
//!
//! Grounded on `decipherment-apply.cc`: the lexicon's arc weights are
//! raised to `power` (a temperature controlling how sharply the model
//! trusts its own lexicon, distinct from the alignment/LM weights),
//! `lex . ali` is precomposed once, and every observation is then
//! three-way composed against that and the language model, best-pathed,
//! and optionally pruned/projected/epsilon-removed/determinized/
//! minimized before being written out.

use decipher_compose::{three_way_compose, ThreeWayOptions};
use decipher_core::io::linear_output_sequence;
use decipher_core::{
    determinize, minimize, project_output, prune, remove_weights, rm_epsilon, shortest_path, Fst,
    Semiring, TropicalWeight,
};

/// Tuning knobs named after `decipherment-apply`'s CLI flags.
#[derive(Clone, Copy, Debug)]
pub struct DecodeOptions {
    pub power: f64,
    pub prune_beam: f64,
    pub output_prune_beam: f64,
    pub prune_output: bool,
    pub remove_weights: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            power: 2.5,
            prune_beam: 8.0,
            output_prune_beam: 4.0,
            prune_output: true,
            remove_weights: true,
        }
    }
}

/// Raises every lexicon arc weight to `power` (tropical weights are
/// `-log` costs, so this is a multiplication, not an exponentiation of
/// the stored value).
pub fn power_map_lexicon(lex: &Fst<TropicalWeight>, power: f64) -> Fst<TropicalWeight> {
    let mut out = Fst::new();
    for _ in 0..lex.num_states() {
        out.add_state();
    }
    if let Some(start) = lex.start() {
        out.set_start(start);
    }
    for s in lex.states() {
        if lex.is_final(s) {
            out.set_final(s, lex.final_weight(s));
        }
        for arc in lex.arcs(s) {
            out.add_arc(
                s,
                decipher_core::Arc::new(arc.ilabel, arc.olabel, TropicalWeight(arc.weight.value() * power), arc.nextstate),
            );
        }
    }
    out
}

/// The result of decoding one observation.
pub struct DecodeResult {
    /// The best-path target symbol sequence, empty if no path survived
    /// composition (an unreachable or totally-pruned observation).
    pub hypothesis: Vec<u32>,
    /// The optionally pruned/cleaned output lattice, if the caller
    /// wants to keep it (e.g. for `--output_fst`).
    pub lattice: Option<Fst<TropicalWeight>>,
}

/// Decodes one observation against `lex_ali` (lexicon already power-
/// mapped and precomposed with the alignment FST) and `lm`.
pub fn decode_one(
    observation: &Fst<TropicalWeight>,
    lex_ali: &Fst<TropicalWeight>,
    lm: &Fst<TropicalWeight>,
    opts: DecodeOptions,
) -> DecodeResult {
    let composed = three_way_compose(
        observation,
        lex_ali,
        lm,
        ThreeWayOptions {
            prune_beam: opts.prune_beam,
            early_stop_single_best: true,
        },
    )
    .fst;

    let Some(best) = shortest_path(&composed) else {
        return DecodeResult {
            hypothesis: Vec::new(),
            lattice: None,
        };
    };
    let hypothesis = linear_output_sequence(&best);
    if hypothesis.is_empty() {
        return DecodeResult {
            hypothesis,
            lattice: None,
        };
    }

    let mut lattice = composed;
    if opts.prune_output {
        lattice = prune(&lattice, opts.output_prune_beam);
    }
    project_output(&mut lattice);
    if opts.remove_weights {
        remove_weights(&mut lattice);
    }
    lattice = rm_epsilon(&lattice);
    lattice = determinize(&lattice);
    lattice = minimize(&lattice);

    DecodeResult {
        hypothesis,
        lattice: Some(lattice),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use decipher_core::io::transcript_to_linear_fst;
    use decipher_core::Arc;

    fn lex_ali() -> Fst<TropicalWeight> {
        let mut fst = Fst::new();
        let s0 = fst.add_state();
        fst.set_start(s0);
        fst.set_final(s0, TropicalWeight::one());
        fst.add_arc(s0, Arc::new(2, 5, TropicalWeight(0.1), s0));
        fst
    }

    fn lm() -> Fst<TropicalWeight> {
        let mut fst = Fst::new();
        let s0 = fst.add_state();
        fst.set_start(s0);
        fst.set_final(s0, TropicalWeight::one());
        fst.add_arc(s0, Arc::new(5, 5, TropicalWeight(0.1), s0));
        fst
    }

    #[test]
    fn decode_toy_cipher_produces_hypothesis() {
        let observation: Fst<TropicalWeight> = transcript_to_linear_fst(&[2, 2]);
        let result = decode_one(&observation, &lex_ali(), &lm(), DecodeOptions::default());
        assert_eq!(result.hypothesis, vec![5, 5]);
    }

    #[test]
    fn power_map_scales_weights() {
        let lex = lex_ali();
        let mapped = power_map_lexicon(&lex, 2.0);
        let start = mapped.start().unwrap();
        assert!((mapped.arcs(start)[0].weight.value() - 0.2).abs() < 1e-9);
    }
}
