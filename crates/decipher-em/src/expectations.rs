//! Posterior expectation accumulation for the EM M-step.
//!
//! Grounded on `decipherbin/expectations.h`. Every composed arc that
//! survives a forward/backward pass is classified into one of three
//! alignment classes (insertion, deletion, substitution/match — silence
//! and epsilon arcs are free and never accumulated) and folded into two
//! tables: a per-alignment-state 3-way class table, and a
//! per-lexicon-state `(source symbol, target symbol)` table. Sums are
//! kept alongside both tables so the M-step is a single divide per arc
//! rather than a second pass over the data; the lexicon table's sum is
//! a *column* total over the target axis (`lex_sum(lex_state,
//! tgt_col)`), not a row total over the source axis — the M-step
//! re-estimates `P(source | target)` for the `L: target -> source`
//! cascade stage, so the denominator has to range over every source
//! symbol for a fixed target symbol.
//!
//! The accumulator deliberately preserves an asymmetry from the
//! original: during accumulation, a deletion is identified by
//! `olabel == EPSILON` on the *composed cascade* arc (no target symbol
//! was produced), and is written into the lexicon table's extra column
//! at index `num_tgt_syms` rather than column `0`. During the M-step, a
//! deletion is instead identified by `ilabel == num_tgt_syms` on the
//! *alignment FST's own* arc — a different label space (the alignment
//! FST encodes "delete" as a dedicated sentinel symbol one past the
//! real target alphabet, rather than reusing epsilon). Unifying these
//! would be a backwards-incompatible change to the alignment FST's
//! symbol convention, so both call sites keep their own detection rule.

use decipher_core::{Arc, Semiring, Table, EPSILON, SILENCE};

const INSERTION: usize = 0;
const DELETION: usize = 1;
const MATCH: usize = 2;

/// Accumulates posterior mass over one or more training utterances,
/// ready to drive an M-step.
pub struct Expectations<W> {
    num_src_syms: usize,
    num_tgt_syms: usize,
    ali_expectations: Table<W>,
    ali_sum: Table<W>,
    lex_expectations: Table<W>,
    lex_sum: Table<W>,
}

impl<W: Semiring> Expectations<W> {
    pub fn new(num_src_syms: usize, num_tgt_syms: usize, num_ali_states: usize, num_lex_states: usize) -> Self {
        Self {
            num_src_syms,
            num_tgt_syms,
            ali_expectations: Table::new2(num_ali_states, 3, W::zero()),
            ali_sum: Table::new1(num_ali_states, W::zero()),
            lex_expectations: Table::new3(num_lex_states, num_src_syms, num_tgt_syms + 1, W::zero()),
            lex_sum: Table::new2(num_lex_states, num_tgt_syms + 1, W::zero()),
        }
    }

    /// Seeds every row with `constant` worth of virtual prior mass,
    /// spread evenly across the 3 alignment classes and the
    /// `num_src_syms - 2` real (non-epsilon, non-silence) source
    /// symbols, so no cell of the M-step ever divides by a true zero.
    pub fn reset(&mut self, constant: W) {
        let ali_share = W::from_value(constant.value() + 3.0_f64.ln());
        for v in self.ali_expectations.iter_mut() {
            *v = ali_share;
        }
        for v in self.ali_sum.iter_mut() {
            *v = W::from_value(ali_share.value() + 3.0_f64.ln());
        }
        let real_src_syms = (self.num_src_syms.saturating_sub(2)).max(1) as f64;
        let lex_share = W::from_value(constant.value() + real_src_syms.ln());
        for v in self.lex_expectations.iter_mut() {
            *v = lex_share;
        }
        for v in self.lex_sum.iter_mut() {
            *v = W::from_value(lex_share.value() + real_src_syms.ln());
        }
    }

    /// Classifies one composed arc observation and folds `posterior`
    /// into the relevant cells. `lex_state`/`ali_state` are the
    /// lexicon- and alignment-FST states the composed state descends
    /// from (see [`decipher_compose::StandardComposer::lex_ali_state`]
    /// and the three-way composer's own state tuple).
    pub fn add_observation(
        &mut self,
        lex_state: usize,
        ali_state: usize,
        ilabel: u32,
        olabel: u32,
        posterior: W,
    ) {
        if (ilabel == EPSILON && olabel == EPSILON) || (ilabel == SILENCE && olabel == SILENCE) {
            return;
        }

        let ali_class = if ilabel == EPSILON {
            INSERTION
        } else if olabel == EPSILON {
            DELETION
        } else {
            MATCH
        };
        let cell = *self.ali_expectations.get2(ali_state, ali_class);
        self.ali_expectations.set2(ali_state, ali_class, cell.plus(posterior));
        let sum = *self.ali_sum.get1(ali_state);
        self.ali_sum.set1(ali_state, sum.plus(posterior));

        let (src_col, tgt_col) = if ilabel == EPSILON {
            (0usize, olabel as usize)
        } else if olabel == EPSILON {
            (ilabel as usize, self.num_tgt_syms)
        } else {
            (ilabel as usize, olabel as usize)
        };
        let cell = *self.lex_expectations.get3(lex_state, src_col, tgt_col);
        self.lex_expectations.set3(lex_state, src_col, tgt_col, cell.plus(posterior));
        let sum = *self.lex_sum.get2(lex_state, tgt_col);
        self.lex_sum.set2(lex_state, tgt_col, sum.plus(posterior));
    }

    /// Merges `other`'s counts into `self` (shard reduction after
    /// parallel training, in shard-index order for determinism).
    pub fn merge(&mut self, other: &Expectations<W>) {
        for (a, b) in self.ali_expectations.iter_mut().zip(other.ali_expectations.iter()) {
            *a = a.plus(*b);
        }
        for (a, b) in self.ali_sum.iter_mut().zip(other.ali_sum.iter()) {
            *a = a.plus(*b);
        }
        for (a, b) in self.lex_expectations.iter_mut().zip(other.lex_expectations.iter()) {
            *a = a.plus(*b);
        }
        for (a, b) in self.lex_sum.iter_mut().zip(other.lex_sum.iter()) {
            *a = a.plus(*b);
        }
    }

    /// The re-estimated weight for an alignment-FST arc leaving
    /// `ali_state`. Silence and epsilon self-loops are free; the
    /// deletion class is identified by `arc.ilabel == num_tgt_syms`,
    /// the alignment FST's own "delete" sentinel (see the module-level
    /// doc comment on the accumulation/M-step asymmetry).
    pub fn maximize_ali(&self, ali_state: usize, arc: &Arc<W>) -> W {
        if arc.is_epsilon() || (arc.ilabel == SILENCE && arc.olabel == SILENCE) {
            return W::one();
        }
        let class = if arc.ilabel == EPSILON {
            INSERTION
        } else if arc.ilabel as usize == self.num_tgt_syms {
            DELETION
        } else {
            MATCH
        };
        let numerator = self.ali_expectations.get2(ali_state, class);
        let denominator = self.ali_sum.get1(ali_state);
        numerator.divide(*denominator)
    }

    /// The re-estimated weight for a lexicon-FST arc leaving
    /// `lex_state`. A silence self-loop is free; a zero-expectation arc
    /// maps to `W::zero()`, signalling the caller to reroute it to a
    /// dead state and prune it.
    pub fn maximize_lex(&self, lex_state: usize, arc: &Arc<W>) -> W {
        if arc.ilabel == SILENCE && arc.olabel == SILENCE {
            return W::one();
        }
        let tgt_col = if arc.olabel == EPSILON {
            self.num_tgt_syms
        } else {
            arc.olabel as usize
        };
        let numerator = self.lex_expectations.get3(lex_state, arc.ilabel as usize, tgt_col);
        if numerator.is_zero() {
            return W::zero();
        }
        let denominator = self.lex_sum.get2(lex_state, tgt_col);
        numerator.divide(*denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use decipher_core::LogWeight;

    #[test]
    fn substitution_is_accumulated_and_normalized() {
        let mut exp: Expectations<LogWeight> = Expectations::new(4, 4, 1, 1);
        exp.add_observation(0, 0, 2, 3, LogWeight(0.0));
        exp.add_observation(0, 0, 2, 2, LogWeight(0.0));
        let arc = Arc::new(2, 3, LogWeight::zero(), 0);
        let w = exp.maximize_lex(0, &arc);
        assert!(w.value().is_finite());
    }

    #[test]
    fn silence_arc_is_free_in_both_tables() {
        let mut exp: Expectations<LogWeight> = Expectations::new(4, 4, 1, 1);
        exp.add_observation(0, 0, SILENCE, SILENCE, LogWeight(0.0));
        let ali_arc = Arc::new(SILENCE, SILENCE, LogWeight::zero(), 0);
        assert_eq!(exp.maximize_ali(0, &ali_arc).value(), 0.0);
        let lex_arc = Arc::new(SILENCE, SILENCE, LogWeight::zero(), 0);
        assert_eq!(exp.maximize_lex(0, &lex_arc).value(), 0.0);
    }

    #[test]
    fn deletion_uses_different_detection_rules_by_call_site() {
        let mut exp: Expectations<LogWeight> = Expectations::new(4, 4, 1, 1);
        // A cascade arc with olabel == EPSILON is a deletion during accumulation.
        exp.add_observation(0, 0, 3, EPSILON, LogWeight(0.0));
        // The alignment FST's own deletion arc uses ilabel == num_tgt_syms, not EPSILON.
        let ali_delete_arc = Arc::new(4, 0, LogWeight::zero(), 0);
        let w = exp.maximize_ali(0, &ali_delete_arc);
        assert!(w.value().is_finite());
    }

    #[test]
    fn merge_sums_two_shards() {
        let mut a: Expectations<LogWeight> = Expectations::new(4, 4, 1, 1);
        let mut b: Expectations<LogWeight> = Expectations::new(4, 4, 1, 1);
        a.add_observation(0, 0, 2, 3, LogWeight(0.0));
        b.add_observation(0, 0, 2, 3, LogWeight(0.0));
        a.merge(&b);
        let arc = Arc::new(2, 3, LogWeight::zero(), 0);
        let merged = a.maximize_lex(0, &arc);
        let solo_b = b.maximize_lex(0, &arc);
        assert!((merged.value() - solo_b.value()).abs() < 1e-9);
    }
}
