//! The dense arc matcher: a flattened `(state, ilabel, olabel) -> arc`
//! lookup table built once over the small, dense alignment FST `A`.
//!
//! Grounded on `decipherbin/composer.h`'s `DenseMatcher<Arc>`: because
//! `A` has few states and a small, bounded label alphabet, a linear
//! scan per lookup (as a sorted-arc matcher would do) is wasteful next
//! to a flat array indexed directly by label pair. The sentinel arc
//! (`NO_LABEL`, `NO_LABEL`, zero weight, no target) marks "no arc here"
//! so a lookup is a single table read, no branch on state.

use decipher_core::{Arc, Fst, Semiring, Table, NO_LABEL, NO_STATE_ID};

/// A dense `(state, ilabel, olabel) -> Arc` lookup table over a small
/// FST, used as the matcher for the middle term of `L . A . G`.
pub struct DenseMatcher<W> {
    table: Table<Arc<W>>,
    num_states: usize,
}

impl<W: Semiring> DenseMatcher<W> {
    /// Builds the matcher from `fst`, failing loudly (via an empty
    /// table with zero states) only if `fst` itself has no states.
    pub fn build(fst: &Fst<W>) -> Self {
        let num_states = fst.num_states();
        let mut max_ilabel = 0u32;
        let mut max_olabel = 0u32;
        for s in fst.states() {
            for arc in fst.arcs(s) {
                max_ilabel = max_ilabel.max(arc.ilabel);
                max_olabel = max_olabel.max(arc.olabel);
            }
        }
        let sentinel = Arc::new(NO_LABEL, NO_LABEL, W::zero(), NO_STATE_ID);
        let mut table = Table::new3(
            num_states.max(1),
            max_ilabel as usize + 1,
            max_olabel as usize + 1,
            sentinel,
        );
        for s in fst.states() {
            for arc in fst.arcs(s) {
                table.set3(s as usize, arc.ilabel as usize, arc.olabel as usize, *arc);
            }
        }
        Self { table, num_states }
    }

    /// Looks up the arc leaving `state` labeled `(ilabel, olabel)`, if
    /// any. `None` both when the label pair is out of the table's
    /// bounds (never occurred while building) and when the cell holds
    /// the sentinel.
    pub fn lookup(&self, state: u32, ilabel: u32, olabel: u32) -> Option<&Arc<W>> {
        if state as usize >= self.num_states {
            return None;
        }
        let (_, dim_i, dim_o) = self.table.dims();
        if ilabel as usize >= dim_i || olabel as usize >= dim_o {
            return None;
        }
        let arc = self.table.get3(state as usize, ilabel as usize, olabel as usize);
        if arc.ilabel == NO_LABEL && arc.olabel == NO_LABEL {
            None
        } else {
            Some(arc)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use decipher_core::TropicalWeight;

    #[test]
    fn lookup_finds_exact_arc() {
        let mut fst: Fst<TropicalWeight> = Fst::new();
        let s0 = fst.add_state();
        let s1 = fst.add_state();
        fst.add_arc(s0, Arc::new(2, 3, TropicalWeight(1.5), s1));
        let matcher = DenseMatcher::build(&fst);
        let found = matcher.lookup(0, 2, 3).unwrap();
        assert_eq!(found.nextstate, s1);
    }

    #[test]
    fn lookup_misses_return_none() {
        let mut fst: Fst<TropicalWeight> = Fst::new();
        let s0 = fst.add_state();
        let s1 = fst.add_state();
        fst.add_arc(s0, Arc::new(2, 3, TropicalWeight(1.5), s1));
        let matcher = DenseMatcher::build(&fst);
        assert!(matcher.lookup(0, 9, 9).is_none());
        assert!(matcher.lookup(5, 2, 3).is_none());
    }
}
