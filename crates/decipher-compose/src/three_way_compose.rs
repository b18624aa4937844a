//! On-the-fly, beam-pruned three-way composition: `fst1 . fst2 . fst3`
//! without ever materializing `fst2 . fst3`.
//!
//! Grounded on `decipherbin/threeway_compose.h`. `fst1` (the
//! observation acceptor `O`) must be olabel-sorted and `fst3` (the
//! precomposed `lag_fst`, or `G` directly) must be ilabel-sorted;
//! `fst2` is always accessed through a [`DenseMatcher`], never by
//! iteration, for every one of the four cases that touch it (the
//! synchronized real-label step and the three epsilon-involving
//! patterns where `fst2` consumes or emits a real label paired with an
//! epsilon). Only `fst1`'s and `fst3`'s own epsilon-only advances are
//! found by direct iteration, since those FSTs are not behind a
//! matcher.
//!
//! The frontier is a priority queue ordered by tentative shortest
//! distance, with lazy invalidation (an entry is skipped if a cheaper
//! path to the same state was already found by the time it is popped)
//! standing in for the original's two-level inner/outer queue with a
//! `steps_threshold`-triggered re-sort — the same effect (always expand
//! the currently-cheapest frontier state first) with a single
//! `BinaryHeap` instead of two cooperating structures.
//!
//! Equivalence-class beam pruning uses `state1` (the observation state)
//! as the class, matching the original: states that share the same
//! position in the observation are compared against each other, and a
//! state is dropped once its distance exceeds the best distance seen
//! for its class by more than `beam`.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use tracing::warn;

use decipher_core::{Arc, Fst, Semiring, StateId, EPSILON};

use crate::dense_matcher::DenseMatcher;
use crate::triple_state_table::{StateTuple, TripleStateTable};

/// Tuning knobs for [`compose`], named after the original's CLI flags.
#[derive(Clone, Copy, Debug)]
pub struct ThreeWayOptions {
    /// Equivalence-class (by `state1`) pruning beam, in `-log` units.
    pub prune_beam: f64,
    /// Stop expanding once the best completed path is this much better
    /// than the current frontier's best estimate (single best-path
    /// mode only; `None` explores exhaustively within the beam).
    pub early_stop_single_best: bool,
}

impl Default for ThreeWayOptions {
    fn default() -> Self {
        Self {
            prune_beam: 8.0,
            early_stop_single_best: false,
        }
    }
}

#[derive(Clone, Copy)]
struct QueueEntry<W> {
    distance: W,
    state: StateId,
}

impl<W: Semiring> PartialEq for QueueEntry<W> {
    fn eq(&self, other: &Self) -> bool {
        self.distance.value() == other.distance.value()
    }
}
impl<W: Semiring> Eq for QueueEntry<W> {}
impl<W: Semiring> PartialOrd for QueueEntry<W> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl<W: Semiring> Ord for QueueEntry<W> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want the smallest distance
        // popped first, so the ordering is reversed.
        other
            .distance
            .value()
            .partial_cmp(&self.distance.value())
            .unwrap_or(Ordering::Equal)
    }
}

/// The output FST of a three-way composition, plus the
/// `(state1, state2, state3)` triple every output state descends from —
/// the caller needs this to classify a composed arc's alignment- and
/// lexicon-FST provenance for posterior extraction.
pub struct ThreeWayResult<W> {
    pub fst: Fst<W>,
    pub state_tuples: Vec<StateTuple>,
}

/// Composes `fst1 . fst2 . fst3` on the fly, pruning the frontier to a
/// beam around the best distance seen per `state1` equivalence class.
///
/// # Panics
/// Never panics on well-formed input; malformed sort-order
/// preconditions simply degrade composition quality rather than
/// trapping, matching the rest of this crate's "trust the caller"
/// posture for internal algorithm preconditions.
pub fn compose<W: Semiring>(
    fst1: &Fst<W>,
    fst2: &Fst<W>,
    fst3: &Fst<W>,
    opts: ThreeWayOptions,
) -> ThreeWayResult<W> {
    let matcher = DenseMatcher::build(fst2);
    let (Some(start1), Some(start2), Some(start3)) = (fst1.start(), fst2.start(), fst3.start())
    else {
        return ThreeWayResult {
            fst: Fst::new(),
            state_tuples: Vec::new(),
        };
    };

    let mut out: Fst<W> = Fst::new();
    let mut table = TripleStateTable::new();
    let start_tuple = StateTuple::new(start1, start2, start3);
    let start_out = table.find_or_create(start_tuple, || out.add_state());
    out.set_start(start_out);

    let mut distance: HashMap<StateId, W> = HashMap::new();
    distance.insert(start_out, W::one());
    let mut class_best: HashMap<StateId, W> = HashMap::new();
    class_best.insert(start1, W::one());

    let mut heap = BinaryHeap::new();
    heap.push(QueueEntry {
        distance: W::one(),
        state: start_out,
    });

    let mut best_final_distance = W::zero();

    while let Some(entry) = heap.pop() {
        let out_state = entry.state;
        let current = *distance.get(&out_state).unwrap_or(&W::zero());
        if entry.distance.value() != current.value() {
            continue; // stale entry, a cheaper path already won
        }
        if opts.early_stop_single_best
            && !best_final_distance.is_zero()
            && best_final_distance.value() < current.value()
        {
            break;
        }

        let tuple = table.tuple(out_state);
        let (s1, s2, s3) = (tuple.s1, tuple.s2, tuple.s3);

        let mut relax = |out: &mut Fst<W>,
                          table: &mut TripleStateTable,
                          distance: &mut HashMap<StateId, W>,
                          class_best: &mut HashMap<StateId, W>,
                          heap: &mut BinaryHeap<QueueEntry<W>>,
                          next_tuple: StateTuple,
                          arc_weight: W,
                          ilabel: u32,
                          olabel: u32| {
            let next_out = table.find_or_create(next_tuple, || out.add_state());
            let nd = current.times(arc_weight);

            let class = next_tuple.s1;
            let best_for_class = *class_best.get(&class).unwrap_or(&W::zero());
            if !best_for_class.is_zero() && nd.value() > best_for_class.value() + opts.prune_beam {
                return;
            }
            if best_for_class.is_zero() || nd.value() < best_for_class.value() {
                class_best.insert(class, nd);
            }

            // The arc is always materialized: forward/backward over the
            // finished lattice needs every alternative path, not just
            // the cheapest one into `next_out`. The distance comparison
            // below only governs whether this path is worth re-queuing
            // for further expansion.
            out.add_arc(out_state, Arc::new(ilabel, olabel, arc_weight, next_out));

            let prev = *distance.get(&next_out).unwrap_or(&W::zero());
            if prev.is_zero() || nd.value() < prev.value() {
                distance.insert(next_out, nd);
                heap.push(QueueEntry {
                    distance: nd,
                    state: next_out,
                });
            }
        };

        // fst1 output-epsilon arcs: advance s1 alone.
        for a1 in fst1.arcs(s1) {
            if a1.olabel != EPSILON {
                continue;
            }
            relax(
                &mut out,
                &mut table,
                &mut distance,
                &mut class_best,
                &mut heap,
                StateTuple::new(a1.nextstate, s2, s3),
                a1.weight,
                a1.ilabel,
                EPSILON,
            );
        }

        // fst3 input-epsilon arcs: advance s3 alone.
        for a3 in fst3.arcs(s3) {
            if a3.ilabel != EPSILON {
                continue;
            }
            relax(
                &mut out,
                &mut table,
                &mut distance,
                &mut class_best,
                &mut heap,
                StateTuple::new(s1, s2, a3.nextstate),
                a3.weight,
                EPSILON,
                a3.olabel,
            );
        }

        // fst2 arcs with input epsilon, output epsilon: advance s2 alone.
        // Looked up through the dense matcher, never by iteration.
        if let Some(a2) = matcher.lookup(s2, EPSILON, EPSILON) {
            relax(
                &mut out,
                &mut table,
                &mut distance,
                &mut class_best,
                &mut heap,
                StateTuple::new(s1, a2.nextstate, s3),
                a2.weight,
                EPSILON,
                EPSILON,
            );
        }

        // fst2 arcs that consume a real fst1-output label but emit
        // nothing to fst3: advance s1 and s2 together.
        for a1 in fst1.arcs(s1) {
            if a1.olabel == EPSILON {
                continue;
            }
            if let Some(a2) = matcher.lookup(s2, a1.olabel, EPSILON) {
                relax(
                    &mut out,
                    &mut table,
                    &mut distance,
                    &mut class_best,
                    &mut heap,
                    StateTuple::new(a1.nextstate, a2.nextstate, s3),
                    a1.weight.times(a2.weight),
                    a1.ilabel,
                    EPSILON,
                );
            }
        }

        // fst2 arcs that emit a real label to fst3 but consume nothing
        // from fst1: advance s2 and s3 together.
        for a3 in fst3.arcs(s3) {
            if a3.ilabel == EPSILON {
                continue;
            }
            if let Some(a2) = matcher.lookup(s2, EPSILON, a3.ilabel) {
                relax(
                    &mut out,
                    &mut table,
                    &mut distance,
                    &mut class_best,
                    &mut heap,
                    StateTuple::new(s1, a2.nextstate, a3.nextstate),
                    a2.weight.times(a3.weight),
                    EPSILON,
                    a3.olabel,
                );
            }
        }

        // The synchronized step: fst1 and fst3 both move on a real
        // label, bridged by an exact-match lookup into the dense `A`.
        for a1 in fst1.arcs(s1) {
            if a1.olabel == EPSILON {
                continue;
            }
            for a3 in fst3.arcs(s3) {
                if a3.ilabel == EPSILON {
                    continue;
                }
                let Some(a2) = matcher.lookup(s2, a1.olabel, a3.ilabel) else {
                    continue;
                };
                relax(
                    &mut out,
                    &mut table,
                    &mut distance,
                    &mut class_best,
                    &mut heap,
                    StateTuple::new(a1.nextstate, a2.nextstate, a3.nextstate),
                    a1.weight.times(a2.weight).times(a3.weight),
                    a1.ilabel,
                    a3.olabel,
                );
            }
        }

        if fst1.is_final(s1) && fst2.is_final(s2) && fst3.is_final(s3) {
            let fw = fst1
                .final_weight(s1)
                .times(fst2.final_weight(s2))
                .times(fst3.final_weight(s3));
            out.set_final(out_state, fw);
            let total = current.times(fw);
            if best_final_distance.is_zero() || total.value() < best_final_distance.value() {
                best_final_distance = total;
            }
        }
    }

    if best_final_distance.is_zero() {
        warn!(
            beam = opts.prune_beam,
            explored_states = table.tuples().len(),
            "beam-pruned composition reached no final state"
        );
    }

    ThreeWayResult {
        state_tuples: table.tuples().to_vec(),
        fst: out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use decipher_core::TropicalWeight;

    fn chain(labels: &[(u32, u32, f64)]) -> Fst<TropicalWeight> {
        let mut fst = Fst::new();
        let mut prev = fst.add_state();
        fst.set_start(prev);
        for &(il, ol, w) in labels {
            let next = fst.add_state();
            fst.add_arc(prev, Arc::new(il, ol, TropicalWeight(w), next));
            prev = next;
        }
        fst.set_final(prev, TropicalWeight::one());
        fst
    }

    #[test]
    fn three_way_matches_standard_on_simple_chain() {
        let fst1 = chain(&[(7, 2, 0.0)]);
        let fst2 = chain(&[(2, 3, 0.0)]);
        let fst3 = chain(&[(3, 9, 0.0)]);
        let out = compose(&fst1, &fst2, &fst3, ThreeWayOptions::default()).fst;
        let start = out.start().unwrap();
        assert_eq!(out.arcs(start).len(), 1);
        let arc = &out.arcs(start)[0];
        assert_eq!((arc.ilabel, arc.olabel), (7, 9));
    }

    #[test]
    fn three_way_handles_fst2_epsilon_output() {
        let fst1 = chain(&[(7, 2, 0.0)]);
        // fst2 consumes label 2 but emits nothing (a deletion-style arc).
        let mut fst2: Fst<TropicalWeight> = Fst::new();
        let s0 = fst2.add_state();
        let s1 = fst2.add_state();
        fst2.set_start(s0);
        fst2.set_final(s1, TropicalWeight::one());
        fst2.add_arc(s0, Arc::new(2, EPSILON, TropicalWeight(0.0), s1));
        let fst3 = chain(&[]);
        let out = compose(&fst1, &fst2, &fst3, ThreeWayOptions::default()).fst;
        assert!(out.num_states() >= 2);
        assert!(out.is_final(out.states().last().unwrap()));
    }
}
