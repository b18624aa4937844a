//! Arc and FST types shared by every component in the cascade.

use serde::{Deserialize, Serialize};

use crate::semiring::Semiring;

/// A symbol id. `0` is reserved for epsilon, `1` for the silence symbol
/// (see [`EPSILON`] and [`SILENCE`]).
pub type Label = u32;

/// A state id within an [`Fst`].
pub type StateId = u32;

/// Sentinel label used by the dense matcher for "no arc here".
pub const NO_LABEL: Label = u32::MAX;

/// Sentinel state id used where "no state" must be representable
/// (e.g. an absent nextstate in a sentinel dense-matcher arc).
pub const NO_STATE_ID: StateId = u32::MAX;

/// The epsilon label: consumes or emits nothing.
pub const EPSILON: Label = 0;

/// The silence label: an explicit, non-epsilon symbol that both the
/// lexicon and alignment FSTs treat as free (self-looping, unit weight).
pub const SILENCE: Label = 1;

/// One weighted transition: `ilabel:olabel/weight -> nextstate`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Arc<W> {
    pub ilabel: Label,
    pub olabel: Label,
    pub weight: W,
    pub nextstate: StateId,
}

impl<W> Arc<W> {
    pub fn new(ilabel: Label, olabel: Label, weight: W, nextstate: StateId) -> Self {
        Self {
            ilabel,
            olabel,
            weight,
            nextstate,
        }
    }

    pub fn is_epsilon(&self) -> bool {
        self.ilabel == EPSILON && self.olabel == EPSILON
    }
}

/// A weighted finite-state transducer over semiring `W`.
///
/// States are dense `0..num_states()`. Per the composer and EM designs,
/// arcs are stored per-state in insertion order; callers that need a
/// particular sort order call [`Fst::arc_sort_by_ilabel`] or
/// [`Fst::arc_sort_by_olabel`] explicitly before relying on it (matching
/// the original's convention of asserting required sort orders at the
/// entry point of each algorithm rather than sorting implicitly).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Fst<W> {
    start: Option<StateId>,
    finals: Vec<Option<W>>,
    arcs: Vec<Vec<Arc<W>>>,
}

impl<W: Semiring> Fst<W> {
    pub fn new() -> Self {
        Self {
            start: None,
            finals: Vec::new(),
            arcs: Vec::new(),
        }
    }

    /// Adds a new state with no final weight and returns its id.
    pub fn add_state(&mut self) -> StateId {
        self.finals.push(None);
        self.arcs.push(Vec::new());
        (self.finals.len() - 1) as StateId
    }

    pub fn set_start(&mut self, s: StateId) {
        self.start = Some(s);
    }

    pub fn start(&self) -> Option<StateId> {
        self.start
    }

    pub fn set_final(&mut self, s: StateId, weight: W) {
        self.finals[s as usize] = Some(weight);
    }

    pub fn final_weight(&self, s: StateId) -> W {
        self.finals[s as usize].unwrap_or_else(W::zero)
    }

    pub fn is_final(&self, s: StateId) -> bool {
        self.finals[s as usize].is_some()
    }

    pub fn add_arc(&mut self, s: StateId, arc: Arc<W>) {
        self.arcs[s as usize].push(arc);
    }

    pub fn num_states(&self) -> usize {
        self.arcs.len()
    }

    pub fn num_arcs(&self) -> usize {
        self.arcs.iter().map(Vec::len).sum()
    }

    pub fn states(&self) -> impl Iterator<Item = StateId> {
        0..self.num_states() as StateId
    }

    pub fn arcs(&self, s: StateId) -> &[Arc<W>] {
        &self.arcs[s as usize]
    }

    pub fn arcs_mut(&mut self, s: StateId) -> &mut Vec<Arc<W>> {
        &mut self.arcs[s as usize]
    }

    pub fn arc_sort_by_ilabel(&mut self) {
        for v in &mut self.arcs {
            v.sort_by_key(|a| (a.ilabel, a.olabel, a.nextstate));
        }
    }

    pub fn arc_sort_by_olabel(&mut self) {
        for v in &mut self.arcs {
            v.sort_by_key(|a| (a.olabel, a.ilabel, a.nextstate));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semiring::TropicalWeight;

    #[test]
    fn build_small_linear_fst() {
        let mut fst: Fst<TropicalWeight> = Fst::new();
        let s0 = fst.add_state();
        let s1 = fst.add_state();
        fst.set_start(s0);
        fst.set_final(s1, TropicalWeight::one());
        fst.add_arc(s0, Arc::new(2, 3, TropicalWeight(1.5), s1));
        assert_eq!(fst.num_states(), 2);
        assert_eq!(fst.num_arcs(), 1);
        assert!(fst.is_final(s1));
        assert!(!fst.is_final(s0));
    }

    #[test]
    fn arc_sort_orders_by_label_then_target() {
        let mut fst: Fst<TropicalWeight> = Fst::new();
        let s0 = fst.add_state();
        let s1 = fst.add_state();
        fst.add_arc(s0, Arc::new(5, 0, TropicalWeight(0.0), s1));
        fst.add_arc(s0, Arc::new(1, 0, TropicalWeight(0.0), s1));
        fst.arc_sort_by_ilabel();
        let labels: Vec<_> = fst.arcs(s0).iter().map(|a| a.ilabel).collect();
        assert_eq!(labels, vec![1, 5]);
    }
}
