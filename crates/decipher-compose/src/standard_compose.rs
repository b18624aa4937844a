//! Generic two-way composition with an epsilon filter, and the
//! `StandardComposer` built on top of it.
//!
//! Grounded on `decipherbin/composer.h`'s `StandardComposer`, which
//! composes `lex_fst x ali_fst -> la_fst`, then `la_fst x lm_fst ->
//! lag_fst`, keeping the component-state table at each step so that,
//! given an output state of the final composition, the corresponding
//! lexicon state and alignment state can be recovered by walking the
//! kept tables backwards.
//!
//! The pairwise composition itself uses the standard three-state
//! epsilon filter (a transducer composed with an unfiltered epsilon
//! match can otherwise generate the same output path once per
//! epsilon-epsilon "interleaving", double-counting its weight): filter
//! state `0` is neutral, `1` means the left side just took an epsilon
//! step the right side treats as a no-op, `2` is the mirror image.

use std::collections::HashMap;
use std::collections::VecDeque;

use decipher_core::{Arc, Fst, Semiring, StateId, EPSILON};

/// A state in the unfiltered two-way product before compaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct ProductState {
    s1: StateId,
    s2: StateId,
    filter: u8,
}

/// The result of composing `fst1` and `fst2`: the output FST plus, for
/// every output state, the `(state_in_fst1, state_in_fst2)` pair it was
/// derived from.
pub struct ComposeResult<W> {
    pub fst: Fst<W>,
    pub state_pairs: Vec<(StateId, StateId)>,
}

/// Composes `fst1` (matched on its output tape) with `fst2` (matched on
/// its input tape): `fst1 . fst2`.
pub fn compose_pair<W: Semiring>(fst1: &Fst<W>, fst2: &Fst<W>) -> ComposeResult<W> {
    let (Some(start1), Some(start2)) = (fst1.start(), fst2.start()) else {
        return ComposeResult {
            fst: Fst::new(),
            state_pairs: Vec::new(),
        };
    };

    let mut out: Fst<W> = Fst::new();
    let mut ids: HashMap<ProductState, StateId> = HashMap::new();
    let mut state_pairs = Vec::new();
    let mut queue = VecDeque::new();

    let start_ps = ProductState {
        s1: start1,
        s2: start2,
        filter: 0,
    };
    let start_out = out.add_state();
    ids.insert(start_ps, start_out);
    state_pairs.push((start1, start2));
    out.set_start(start_out);
    queue.push_back(start_ps);

    while let Some(ps) = queue.pop_front() {
        let out_state = ids[&ps];
        let f1 = fst1.final_weight(ps.s1);
        let f2 = fst2.final_weight(ps.s2);
        if fst1.is_final(ps.s1) && fst2.is_final(ps.s2) {
            out.set_final(out_state, f1.times(f2));
        }

        let mut find_or_queue = |ids: &mut HashMap<ProductState, StateId>,
                                  out: &mut Fst<W>,
                                  state_pairs: &mut Vec<(StateId, StateId)>,
                                  queue: &mut VecDeque<ProductState>,
                                  next: ProductState| {
            *ids.entry(next).or_insert_with(|| {
                let id = out.add_state();
                state_pairs.push((next.s1, next.s2));
                queue.push_back(next);
                id
            })
        };

        // Real-label matches: always allowed, resets filter to neutral.
        for a1 in fst1.arcs(ps.s1) {
            if a1.olabel == EPSILON {
                continue;
            }
            for a2 in fst2.arcs(ps.s2) {
                if a2.ilabel != a1.olabel {
                    continue;
                }
                let next = ProductState {
                    s1: a1.nextstate,
                    s2: a2.nextstate,
                    filter: 0,
                };
                let target = find_or_queue(&mut ids, &mut out, &mut state_pairs, &mut queue, next);
                out.add_arc(out_state, Arc::new(a1.ilabel, a2.olabel, a1.weight.times(a2.weight), target));
            }
        }

        // fst1 takes an epsilon-output step; fst2 stays put (a no-op
        // the filter represents implicitly). Disallowed right after
        // fst2 took its own no-op step, to avoid generating the same
        // epsilon-epsilon interleaving twice.
        if ps.filter != 2 {
            for a1 in fst1.arcs(ps.s1) {
                if a1.olabel != EPSILON {
                    continue;
                }
                let next = ProductState {
                    s1: a1.nextstate,
                    s2: ps.s2,
                    filter: 1,
                };
                let target = find_or_queue(&mut ids, &mut out, &mut state_pairs, &mut queue, next);
                out.add_arc(out_state, Arc::new(a1.ilabel, EPSILON, a1.weight, target));
            }
        }

        // Mirror image: fst2 takes an epsilon-input step, fst1 stays put.
        if ps.filter != 1 {
            for a2 in fst2.arcs(ps.s2) {
                if a2.ilabel != EPSILON {
                    continue;
                }
                let next = ProductState {
                    s1: ps.s1,
                    s2: a2.nextstate,
                    filter: 2,
                };
                let target = find_or_queue(&mut ids, &mut out, &mut state_pairs, &mut queue, next);
                out.add_arc(out_state, Arc::new(EPSILON, a2.olabel, a2.weight, target));
            }
        }
    }

    ComposeResult {
        fst: out,
        state_pairs,
    }
}

/// Pre-composes `lex . ali . lm` and remembers, for every state of the
/// final cascade, the lexicon and alignment state it descends from —
/// the information posterior extraction needs to classify an arc
/// without re-walking the whole cascade.
pub struct StandardComposer<W> {
    pub lag_fst: Fst<W>,
    lag_to_la: Vec<(StateId, StateId)>,
    la_to_lex_ali: Vec<(StateId, StateId)>,
}

impl<W: Semiring> StandardComposer<W> {
    /// Builds the cascade `lex_fst . ali_fst . lm_fst`, keeping the
    /// state tables needed to recover `(lex_state, ali_state)` for any
    /// state of the resulting `lag_fst`.
    pub fn build(lex_fst: &Fst<W>, ali_fst: &Fst<W>, lm_fst: &Fst<W>) -> Self {
        let la = compose_pair(lex_fst, ali_fst);
        let lag = compose_pair(&la.fst, lm_fst);
        let mut lag_fst = lag.fst;
        lag_fst.arc_sort_by_ilabel();
        Self {
            lag_fst,
            lag_to_la: lag.state_pairs,
            la_to_lex_ali: la.state_pairs,
        }
    }

    /// Recovers `(lex_state, ali_state)` for a state of `lag_fst`.
    pub fn lex_ali_state(&self, lag_state: StateId) -> (StateId, StateId) {
        let (la_state, _lm_state) = self.lag_to_la[lag_state as usize];
        self.la_to_lex_ali[la_state as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use decipher_core::TropicalWeight;

    fn single_arc_fst(ilabel: u32, olabel: u32, weight: f64) -> Fst<TropicalWeight> {
        let mut fst = Fst::new();
        let s0 = fst.add_state();
        let s1 = fst.add_state();
        fst.set_start(s0);
        fst.add_arc(s0, Arc::new(ilabel, olabel, TropicalWeight(weight), s1));
        fst.set_final(s1, TropicalWeight::one());
        fst
    }

    #[test]
    fn compose_matches_on_shared_label() {
        let a = single_arc_fst(1, 2, 0.5);
        let b = single_arc_fst(2, 3, 0.25);
        let result = compose_pair(&a, &b);
        assert_eq!(result.fst.num_arcs(), 1);
        let arc = &result.fst.arcs(result.fst.start().unwrap())[0];
        assert_eq!((arc.ilabel, arc.olabel), (1, 3));
        assert!((arc.weight.value() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn compose_mismatched_labels_yields_no_path() {
        let a = single_arc_fst(1, 2, 0.0);
        let b = single_arc_fst(9, 3, 0.0);
        let result = compose_pair(&a, &b);
        assert!(!result.fst.is_final(result.fst.start().unwrap()));
    }

    #[test]
    fn standard_composer_recovers_lex_ali_states() {
        let lex = single_arc_fst(1, 5, 0.1);
        let ali = single_arc_fst(5, 5, 0.2);
        let lm = single_arc_fst(5, 5, 0.3);
        let composer = StandardComposer::build(&lex, &ali, &lm);
        let (lex_state, ali_state) = composer.lex_ali_state(composer.lag_fst.start().unwrap());
        assert_eq!(lex_state, 0);
        assert_eq!(ali_state, 0);
    }
}
