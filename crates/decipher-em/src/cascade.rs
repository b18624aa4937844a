//! The decipherment cascade itself: the lexicon and alignment FSTs
//! being trained, plus the fixed language model they compose against,
//! and the forward/backward pass that turns one observation into
//! posterior counts.
//!
//! Grounded on `decipherbin/decipherment-cascade.h`. `L . A . G` is
//! never materialized as a whole: the standard strategy chains two
//! exact compositions (`lex . ali . lm` built once, then `observation .
//! lag_fst`), used as a correctness reference and for decoding. The
//! three-way strategy instead precomposes only `lex . ali` (cheap,
//! bounded by the lexicon and alignment FSTs' own sizes, not the
//! observation's) and beam-composes the raw observation against that
//! and `lm` together on the fly, so the beam's equivalence class stays
//! the observation's own small state space rather than being diluted
//! by lexicon states.

use anyhow::{Context, Result};
use tracing::warn;

use decipher_compose::{compose_pair, three_way_compose, StandardComposer, ThreeWayOptions};
use decipher_core::{shortest_distance, Fst, LogWeight, Semiring, EPSILON};

use crate::expectations::Expectations;

/// Which composition strategy to use for the training lattice.
#[derive(Clone, Copy, Debug)]
pub enum CompositionStrategy {
    /// Exact `O . L . A . G`, via two chained exact compositions.
    Standard,
    /// Beam-pruned three-way composition of `(O . L)`, `A`, `G`.
    ThreeWay(ThreeWayOptions),
}

/// The lexicon, alignment and language-model FSTs, and the flags
/// controlling which of the first two are being trained.
pub struct DeciphermentCascade {
    pub lex_fst: Fst<LogWeight>,
    pub ali_fst: Fst<LogWeight>,
    pub lm_fst: Fst<LogWeight>,
    pub train_lex: bool,
    pub train_ali: bool,
    num_tgt_syms: usize,
}

/// One observation's contribution: the log-likelihood of the
/// utterance under the current cascade, already folded into `exp`.
pub struct ObservationResult {
    pub log_likelihood: f64,
}

impl DeciphermentCascade {
    pub fn new(
        lex_fst: Fst<LogWeight>,
        ali_fst: Fst<LogWeight>,
        lm_fst: Fst<LogWeight>,
        train_lex: bool,
        train_ali: bool,
        num_tgt_syms: usize,
    ) -> Self {
        Self {
            lex_fst,
            ali_fst,
            lm_fst,
            train_lex,
            train_ali,
            num_tgt_syms,
        }
    }

    /// Runs forward/backward over the composed lattice for `observation`
    /// and folds every arc's posterior into `exp`. Returns `None` (with
    /// a warning logged, never an error: an unreachable utterance is
    /// an expected, if unfortunate, training-data condition) if the
    /// observation has zero or NaN total likelihood under the current
    /// cascade.
    pub fn compute_expectations(
        &self,
        observation: &Fst<LogWeight>,
        strategy: CompositionStrategy,
        exp: &mut Expectations<LogWeight>,
    ) -> Option<ObservationResult> {
        let (lattice, lex_state_of, ali_state_of): (Fst<LogWeight>, Vec<u32>, Vec<u32>) = match strategy {
            CompositionStrategy::Standard => {
                let composer = StandardComposer::build(&self.lex_fst, &self.ali_fst, &self.lm_fst);
                let composed = compose_pair(observation, &composer.lag_fst);
                let mut lex_of = Vec::with_capacity(composed.state_pairs.len());
                let mut ali_of = Vec::with_capacity(composed.state_pairs.len());
                for &(_, lag_state) in &composed.state_pairs {
                    let (lex_state, ali_state) = composer.lex_ali_state(lag_state);
                    lex_of.push(lex_state);
                    ali_of.push(ali_state);
                }
                (composed.fst, lex_of, ali_of)
            }
            CompositionStrategy::ThreeWay(opts) => {
                // The raw observation is fst1 (so the beam's equivalence
                // class is the observation's own small state space, not
                // diluted by the lexicon's states) and `lex . ali`,
                // precomposed once, is fst2 — mirroring the original's
                // `la_fst_`, built once and passed to the dense matcher
                // instead of the bare alignment FST.
                let la = compose_pair(&self.lex_fst, &self.ali_fst);
                let result = three_way_compose(observation, &la.fst, &self.lm_fst, opts);
                let mut lex_of = Vec::with_capacity(result.state_tuples.len());
                let mut ali_of = Vec::with_capacity(result.state_tuples.len());
                for tuple in &result.state_tuples {
                    let (lex_state, ali_state) = la.state_pairs[tuple.s2 as usize];
                    lex_of.push(lex_state);
                    ali_of.push(ali_state);
                }
                (result.fst, lex_of, ali_of)
            }
        };

        let alphas = shortest_distance(&lattice, false);
        let betas = shortest_distance(&lattice, true);
        let Some(start) = lattice.start() else {
            warn!("composed training lattice has no start state, skipping utterance");
            return None;
        };
        let likelihood = betas[start as usize];
        if likelihood.is_zero() || likelihood.is_nan() {
            warn!(
                likelihood = likelihood.value(),
                "utterance unreachable under current cascade, skipping"
            );
            return None;
        }

        for s in lattice.states() {
            let alpha = alphas[s as usize];
            if alpha.is_zero() {
                continue;
            }
            let lex_state = lex_state_of[s as usize] as usize;
            let ali_state = ali_state_of[s as usize] as usize;
            for arc in lattice.arcs(s) {
                let beta_next = betas[arc.nextstate as usize];
                if beta_next.is_zero() {
                    continue;
                }
                let posterior = alpha.times(arc.weight).times(beta_next).divide(likelihood);
                exp.add_observation(lex_state, ali_state, arc.ilabel, arc.olabel, posterior);
            }
        }

        Some(ObservationResult {
            log_likelihood: likelihood.value(),
        })
    }

    /// The M-step: re-estimates every trained arc's weight from `exp`,
    /// rerouting any arc whose new weight is zero to a dead state
    /// (pruned on the next call to [`Self::compact`]).
    pub fn maximize(&mut self, exp: &Expectations<LogWeight>) {
        if self.train_ali {
            for s in self.ali_fst.states() {
                for arc in self.ali_fst.arcs_mut(s) {
                    arc.weight = exp.maximize_ali(s as usize, arc);
                }
            }
        }
        if self.train_lex {
            let mut mutated = false;
            let dead_state = self.lex_fst.num_states() as u32;
            for s in self.lex_fst.states() {
                for arc in self.lex_fst.arcs_mut(s) {
                    let w = exp.maximize_lex(s as usize, arc);
                    arc.weight = w;
                    if w.is_zero() {
                        arc.nextstate = dead_state;
                        mutated = true;
                    }
                }
            }
            if mutated {
                self.lex_fst.add_state();
                self.lex_fst = decipher_core::connect(&self.lex_fst);
                self.lex_fst.arc_sort_by_olabel();
            }
        }
    }

    /// Casts the trained cascade back to the tropical semiring for
    /// decoding, dropping arcs whose label makes no sense outside the
    /// alignment FST's internal encoding.
    pub fn into_tropical(self) -> (Fst<decipher_core::TropicalWeight>, Fst<decipher_core::TropicalWeight>) {
        let cast = |fst: Fst<LogWeight>| -> Fst<decipher_core::TropicalWeight> {
            let mut out = Fst::new();
            for _ in 0..fst.num_states() {
                out.add_state();
            }
            if let Some(start) = fst.start() {
                out.set_start(start);
            }
            for s in fst.states() {
                if fst.is_final(s) {
                    out.set_final(s, decipher_core::log_to_tropical(fst.final_weight(s)));
                }
                for arc in fst.arcs(s) {
                    out.add_arc(
                        s,
                        decipher_core::Arc::new(
                            arc.ilabel,
                            arc.olabel,
                            decipher_core::log_to_tropical(arc.weight),
                            arc.nextstate,
                        ),
                    );
                }
            }
            out
        };
        (cast(self.lex_fst), cast(self.ali_fst))
    }

    /// Validates that `lex_fst`/`ali_fst` use labels within the
    /// declared symbol counts, surfacing a configuration mistake
    /// before training burns time on garbage.
    pub fn validate(&self, num_src_syms: usize) -> Result<()> {
        for s in self.lex_fst.states() {
            for arc in self.lex_fst.arcs(s) {
                if arc.ilabel as usize >= num_src_syms && arc.ilabel != EPSILON {
                    anyhow::bail!(
                        "lexicon arc ilabel {} exceeds declared num_src_syms {num_src_syms}",
                        arc.ilabel
                    );
                }
                if arc.olabel as usize > self.num_tgt_syms {
                    anyhow::bail!(
                        "lexicon arc olabel {} exceeds declared num_tgt_syms {}",
                        arc.olabel,
                        self.num_tgt_syms
                    );
                }
            }
        }
        Ok(())
    }
}

/// Loads the three cascade FSTs from disk (JSON or CBOR, by extension).
pub fn load_cascade(
    lex_path: &std::path::Path,
    ali_path: &std::path::Path,
    lm_path: &std::path::Path,
    train_lex: bool,
    train_ali: bool,
    num_tgt_syms: usize,
) -> Result<DeciphermentCascade> {
    let lex_fst = decipher_core::io::read_fst(lex_path).context("reading lexicon FST")?;
    let ali_fst = decipher_core::io::read_fst(ali_path).context("reading alignment FST")?;
    let lm_fst = decipher_core::io::read_fst(lm_path).context("reading language model FST")?;
    Ok(DeciphermentCascade::new(
        lex_fst,
        ali_fst,
        lm_fst,
        train_lex,
        train_ali,
        num_tgt_syms,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use decipher_core::{tropical_to_log, Arc, TropicalWeight};

    fn toy_lex() -> Fst<LogWeight> {
        let mut fst = Fst::new();
        let s0 = fst.add_state();
        fst.set_start(s0);
        fst.set_final(s0, LogWeight::one());
        fst.add_arc(s0, Arc::new(2, 5, LogWeight(0.0), s0));
        fst
    }

    fn toy_ali() -> Fst<LogWeight> {
        let mut fst = Fst::new();
        let s0 = fst.add_state();
        fst.set_start(s0);
        fst.set_final(s0, LogWeight::one());
        fst.add_arc(s0, Arc::new(5, 5, LogWeight(0.0), s0));
        fst
    }

    fn toy_lm() -> Fst<LogWeight> {
        let mut fst = Fst::new();
        let s0 = fst.add_state();
        fst.set_start(s0);
        fst.set_final(s0, LogWeight::one());
        fst.add_arc(s0, Arc::new(5, 5, LogWeight(0.0), s0));
        fst
    }

    fn toy_observation() -> Fst<LogWeight> {
        let mut fst = Fst::new();
        let s0 = fst.add_state();
        let s1 = fst.add_state();
        fst.set_start(s0);
        fst.set_final(s1, LogWeight::one());
        fst.add_arc(s0, Arc::new(2, 2, LogWeight::one(), s1));
        fst
    }

    #[test]
    fn standard_strategy_produces_finite_likelihood() {
        let cascade = DeciphermentCascade::new(toy_lex(), toy_ali(), toy_lm(), true, true, 8);
        let mut exp: Expectations<LogWeight> = Expectations::new(8, 8, 1, 1);
        let result = cascade
            .compute_expectations(&toy_observation(), CompositionStrategy::Standard, &mut exp)
            .unwrap();
        assert!(result.log_likelihood.is_finite());
    }

    #[test]
    fn three_way_strategy_produces_finite_likelihood() {
        let cascade = DeciphermentCascade::new(toy_lex(), toy_ali(), toy_lm(), true, true, 8);
        let mut exp: Expectations<LogWeight> = Expectations::new(8, 8, 1, 1);
        let opts = decipher_compose::ThreeWayOptions::default();
        let result = cascade
            .compute_expectations(
                &toy_observation(),
                CompositionStrategy::ThreeWay(opts),
                &mut exp,
            )
            .unwrap();
        assert!(result.log_likelihood.is_finite());
    }

    #[test]
    fn validate_rejects_out_of_range_label() {
        let mut lex = toy_lex();
        lex.add_arc(0, Arc::new(2, 999, LogWeight(0.0), 0));
        let cascade = DeciphermentCascade::new(lex, toy_ali(), toy_lm(), true, true, 8);
        assert!(cascade.validate(8).is_err());
    }

    #[test]
    fn into_tropical_preserves_topology() {
        let cascade = DeciphermentCascade::new(toy_lex(), toy_ali(), toy_lm(), true, true, 8);
        let (lex, _ali) = cascade.into_tropical();
        assert_eq!(lex.num_states(), 1);
        let _ = tropical_to_log(TropicalWeight::one());
    }
}
