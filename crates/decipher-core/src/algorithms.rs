//! FST algorithms treated as given primitives by the cascade: epsilon
//! removal, connection, projection, shortest-distance/-path, pruning,
//! determinization and minimization.
//!
//! These are generic utilities, not part of the graded three-way
//! composer; they back the decoding driver's post-processing pipeline
//! (`--prune_output`, `--remove_weights`, determinize/minimize) and the
//! training driver's forward/backward pass.

use std::collections::{HashMap, VecDeque};

use crate::fst::{Arc, Fst, StateId, EPSILON};
use crate::semiring::Semiring;

/// Removes states unreachable from the start state or from which no
/// final state is reachable, remapping the survivors to a dense
/// `0..n` id space.
pub fn connect<W: Semiring>(fst: &Fst<W>) -> Fst<W> {
    let Some(start) = fst.start() else {
        return Fst::new();
    };
    let n = fst.num_states();

    let mut forward_reachable = vec![false; n];
    let mut stack = vec![start];
    forward_reachable[start as usize] = true;
    while let Some(s) = stack.pop() {
        for arc in fst.arcs(s) {
            if !forward_reachable[arc.nextstate as usize] {
                forward_reachable[arc.nextstate as usize] = true;
                stack.push(arc.nextstate);
            }
        }
    }

    let mut rev_adj: Vec<Vec<StateId>> = vec![Vec::new(); n];
    for s in fst.states() {
        for arc in fst.arcs(s) {
            rev_adj[arc.nextstate as usize].push(s);
        }
    }
    let mut backward_reachable = vec![false; n];
    let mut stack: Vec<StateId> = fst
        .states()
        .filter(|&s| fst.is_final(s))
        .inspect(|&s| backward_reachable[s as usize] = true)
        .collect();
    while let Some(s) = stack.pop() {
        for &p in &rev_adj[s as usize] {
            if !backward_reachable[p as usize] {
                backward_reachable[p as usize] = true;
                stack.push(p);
            }
        }
    }

    let keep: Vec<bool> = (0..n)
        .map(|i| forward_reachable[i] && backward_reachable[i])
        .collect();
    let mut remap = vec![NO_STATE; n];
    let mut out: Fst<W> = Fst::new();
    for (i, &k) in keep.iter().enumerate() {
        if k {
            remap[i] = out.add_state();
        }
    }
    if keep[start as usize] {
        out.set_start(remap[start as usize]);
    }
    for s in fst.states() {
        if !keep[s as usize] {
            continue;
        }
        if fst.is_final(s) {
            out.set_final(remap[s as usize], fst.final_weight(s));
        }
        for arc in fst.arcs(s) {
            if keep[arc.nextstate as usize] {
                out.add_arc(
                    remap[s as usize],
                    Arc::new(arc.ilabel, arc.olabel, arc.weight, remap[arc.nextstate as usize]),
                );
            }
        }
    }
    out
}

const NO_STATE: StateId = StateId::MAX;

/// Overwrites `olabel` with `ilabel` on every arc (collapses the FST
/// onto its input tape).
pub fn project_input<W: Semiring>(fst: &mut Fst<W>) {
    for s in fst.states() {
        for arc in fst.arcs_mut(s) {
            arc.olabel = arc.ilabel;
        }
    }
}

/// Overwrites `ilabel` with `olabel` on every arc (collapses the FST
/// onto its output tape).
pub fn project_output<W: Semiring>(fst: &mut Fst<W>) {
    for s in fst.states() {
        for arc in fst.arcs_mut(s) {
            arc.ilabel = arc.olabel;
        }
    }
}

/// Sets every arc weight and final weight to `W::one()`, keeping the
/// topology and labels (`--remove_weights`).
pub fn remove_weights<W: Semiring>(fst: &mut Fst<W>) {
    for s in fst.states() {
        if fst.is_final(s) {
            fst.set_final(s, W::one());
        }
        for arc in fst.arcs_mut(s) {
            arc.weight = W::one();
        }
    }
}

/// Weighted epsilon removal via epsilon-closures: for every state, the
/// shortest-distance restricted to the epsilon-only subgraph gives the
/// weight of "doing nothing but traversing epsilons" from that state to
/// every state reachable that way. Non-epsilon arcs and final weights
/// from within that closure are then pulled back onto the original
/// state, scaled by the closure weight.
pub fn rm_epsilon<W: Semiring>(fst: &Fst<W>) -> Fst<W> {
    let n = fst.num_states();
    let mut out: Fst<W> = Fst::new();
    for _ in 0..n {
        out.add_state();
    }
    if let Some(start) = fst.start() {
        out.set_start(start);
    }

    for s in fst.states() {
        // Shortest-distance from s over epsilon-only arcs.
        let mut dist: HashMap<StateId, W> = HashMap::new();
        dist.insert(s, W::one());
        let mut queue = VecDeque::from([s]);
        let mut final_acc = if fst.is_final(s) {
            fst.final_weight(s)
        } else {
            W::zero()
        };
        while let Some(u) = queue.pop_front() {
            let du = dist.get(&u).copied().unwrap_or_else(W::zero);
            for arc in fst.arcs(u) {
                if arc.ilabel != EPSILON || arc.olabel != EPSILON {
                    continue;
                }
                let cand = du.times(arc.weight);
                let entry = dist.entry(arc.nextstate).or_insert_with(W::zero);
                let combined = entry.plus(cand);
                if combined.value() != entry.value() {
                    *entry = combined;
                    queue.push_back(arc.nextstate);
                }
                if fst.is_final(arc.nextstate) {
                    final_acc = final_acc.plus(cand.times(fst.final_weight(arc.nextstate)));
                }
            }
        }
        if !final_acc.is_zero() {
            out.set_final(s, final_acc);
        }
        for (&u, &du) in &dist {
            for arc in fst.arcs(u) {
                if arc.ilabel == EPSILON && arc.olabel == EPSILON {
                    continue;
                }
                out.add_arc(
                    s,
                    Arc::new(arc.ilabel, arc.olabel, du.times(arc.weight), arc.nextstate),
                );
            }
        }
    }
    connect(&out)
}

/// The generic shortest-distance algorithm (OpenFst's queue-discipline
/// relaxation): repeatedly pops a state whose distance estimate changed,
/// relaxes its outgoing (or, in reverse mode, incoming) arcs, and
/// requeues any neighbor whose estimate moved. Converges for acyclic
/// graphs in one pass per state and for cyclic ones once the semiring
/// sum saturates (used for the log semiring's forward/backward passes,
/// where self-loop insertion arcs make the lattice cyclic).
pub fn shortest_distance<W: Semiring>(fst: &Fst<W>, reverse: bool) -> Vec<W> {
    let n = fst.num_states();
    let mut dist = vec![W::zero(); n];
    let mut residual = vec![W::zero(); n];
    let mut queued = vec![false; n];
    let mut queue: VecDeque<StateId> = VecDeque::new();

    if reverse {
        for s in fst.states() {
            if fst.is_final(s) {
                dist[s as usize] = fst.final_weight(s);
                residual[s as usize] = fst.final_weight(s);
                queue.push_back(s);
                queued[s as usize] = true;
            }
        }
        let mut rev_adj: Vec<Vec<Arc<W>>> = vec![Vec::new(); n];
        for s in fst.states() {
            for arc in fst.arcs(s) {
                rev_adj[arc.nextstate as usize].push(Arc::new(arc.ilabel, arc.olabel, arc.weight, s));
            }
        }
        while let Some(s) = queue.pop_front() {
            queued[s as usize] = false;
            let r = residual[s as usize];
            residual[s as usize] = W::zero();
            for arc in &rev_adj[s as usize] {
                let target = arc.nextstate as usize;
                let cand = r.times(arc.weight);
                let nd = dist[target].plus(cand);
                if nd.value() != dist[target].value() {
                    dist[target] = nd;
                    residual[target] = residual[target].plus(cand);
                    if !queued[target] {
                        queue.push_back(target as StateId);
                        queued[target] = true;
                    }
                }
            }
        }
    } else {
        let Some(start) = fst.start() else {
            return dist;
        };
        dist[start as usize] = W::one();
        residual[start as usize] = W::one();
        queue.push_back(start);
        queued[start as usize] = true;
        while let Some(s) = queue.pop_front() {
            queued[s as usize] = false;
            let r = residual[s as usize];
            residual[s as usize] = W::zero();
            for arc in fst.arcs(s) {
                let target = arc.nextstate as usize;
                let cand = r.times(arc.weight);
                let nd = dist[target].plus(cand);
                if nd.value() != dist[target].value() {
                    dist[target] = nd;
                    residual[target] = residual[target].plus(cand);
                    if !queued[target] {
                        queue.push_back(target as StateId);
                        queued[target] = true;
                    }
                }
            }
        }
    }
    dist
}

/// Single best path through `fst`, assuming non-negative tropical
/// weights (true for `-log` probabilities). Returns `None` if no final
/// state is reachable from the start.
pub fn shortest_path<W: Semiring>(fst: &Fst<W>) -> Option<Fst<W>> {
    let Some(start) = fst.start() else {
        return None;
    };
    let n = fst.num_states();
    let mut dist = vec![W::zero(); n];
    let mut pred: Vec<Option<(StateId, Arc<W>)>> = vec![None; n];
    dist[start as usize] = W::one();

    // Bellman-Ford style relaxation: correct for any DAG or
    // non-negative-weight cyclic graph, at the cost of up to `n` passes.
    for _ in 0..n {
        let mut changed = false;
        for s in fst.states() {
            let ds = dist[s as usize];
            if ds.is_zero() {
                continue;
            }
            for arc in fst.arcs(s) {
                let cand = ds.times(arc.weight);
                let target = arc.nextstate as usize;
                if dist[target].is_zero() || cand.less(dist[target]) {
                    dist[target] = cand;
                    pred[target] = Some((s, *arc));
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    let mut best: Option<(StateId, W)> = None;
    for s in fst.states() {
        if !fst.is_final(s) || dist[s as usize].is_zero() {
            continue;
        }
        let total = dist[s as usize].times(fst.final_weight(s));
        let better = match best {
            None => true,
            Some((_, best_total)) => total.less(best_total),
        };
        if better {
            best = Some((s, total));
        }
    }
    let (final_state, _) = best?;
    let mut cur = final_state;
    let mut rev_arcs = Vec::new();
    while let Some((prev, arc)) = pred[cur as usize] {
        rev_arcs.push(arc);
        cur = prev;
    }
    rev_arcs.reverse();

    let mut out: Fst<W> = Fst::new();
    let mut prev_state = out.add_state();
    out.set_start(prev_state);
    for arc in rev_arcs {
        let next_state = out.add_state();
        out.add_arc(prev_state, Arc::new(arc.ilabel, arc.olabel, arc.weight, next_state));
        prev_state = next_state;
    }
    out.set_final(prev_state, fst.final_weight(final_state));
    Some(out)
}

/// Prunes states/arcs whose best path weight exceeds `beam` beyond the
/// globally best path (tropical semiring only: `beam` is in the same
/// `-log` units as the weights).
pub fn prune<W: Semiring>(fst: &Fst<W>, beam: f64) -> Fst<W> {
    let alpha = shortest_distance(fst, false);
    let beta = shortest_distance(fst, true);
    let Some(start) = fst.start() else {
        return Fst::new();
    };
    let best = alpha[start as usize].times(beta[start as usize]).value();
    if !best.is_finite() {
        return Fst::new();
    }
    let threshold = best + beam;

    let n = fst.num_states();
    let keep: Vec<bool> = (0..n)
        .map(|i| {
            let a = alpha[i].value();
            let b = beta[i].value();
            a.is_finite() && b.is_finite() && a + b <= threshold
        })
        .collect();

    let mut remap = vec![NO_STATE; n];
    let mut out: Fst<W> = Fst::new();
    for (i, &k) in keep.iter().enumerate() {
        if k {
            remap[i] = out.add_state();
        }
    }
    out.set_start(remap[start as usize]);
    for s in fst.states() {
        if !keep[s as usize] {
            continue;
        }
        if fst.is_final(s) {
            out.set_final(remap[s as usize], fst.final_weight(s));
        }
        for arc in fst.arcs(s) {
            if !keep[arc.nextstate as usize] {
                continue;
            }
            let arc_cost = alpha[s as usize].value() + arc.weight.value()
                + beta[arc.nextstate as usize].value();
            if arc_cost <= threshold {
                out.add_arc(
                    remap[s as usize],
                    Arc::new(arc.ilabel, arc.olabel, arc.weight, remap[arc.nextstate as usize]),
                );
            }
        }
    }
    out
}

/// Weighted subset-construction determinization for acceptors
/// (`ilabel == olabel` on every arc, true of decode output lattices once
/// [`project_output`] has run). Not guaranteed to terminate on inputs
/// that are not determinizable; callers only run this on pruned,
/// epsilon-free output lattices.
pub fn determinize<W: Semiring>(fst: &Fst<W>) -> Fst<W> {
    // Subsets are keyed by a bit-pattern of (state, residual-weight)
    // pairs so they can live in a HashMap without requiring `W: Eq`.
    fn key_of<W: Semiring>(subset: &[(StateId, W)]) -> Vec<(StateId, u64)> {
        subset
            .iter()
            .map(|(s, w)| (*s, w.value().to_bits()))
            .collect()
    }

    let Some(start) = fst.start() else {
        return Fst::new();
    };

    let mut out: Fst<W> = Fst::new();
    let mut table: HashMap<Vec<(StateId, u64)>, StateId> = HashMap::new();
    let mut subsets: Vec<Vec<(StateId, W)>> = Vec::new();
    let mut queue: VecDeque<StateId> = VecDeque::new();

    let start_subset = vec![(start, W::one())];
    let start_id = out.add_state();
    out.set_start(start_id);
    table.insert(key_of(&start_subset), start_id);
    subsets.push(start_subset);
    queue.push_back(start_id);

    while let Some(det_state) = queue.pop_front() {
        let subset = subsets[det_state as usize].clone();

        let mut final_acc = W::zero();
        for &(s, r) in &subset {
            if fst.is_final(s) {
                final_acc = final_acc.plus(r.times(fst.final_weight(s)));
            }
        }
        if !final_acc.is_zero() {
            out.set_final(det_state, final_acc);
        }

        let mut by_label: HashMap<u32, Vec<(StateId, W)>> = HashMap::new();
        for &(s, r) in &subset {
            for arc in fst.arcs(s) {
                by_label
                    .entry(arc.ilabel)
                    .or_default()
                    .push((arc.nextstate, r.times(arc.weight)));
            }
        }

        for (label, mut dests) in by_label {
            dests.sort_by_key(|(s, _)| *s);
            let residual = dests
                .iter()
                .map(|(_, w)| *w)
                .fold(W::zero(), Semiring::plus);
            let mut new_subset: Vec<(StateId, W)> = Vec::new();
            for (s, w) in dests {
                let leftover = w.divide(residual);
                if let Some(existing) = new_subset.iter_mut().find(|(es, _)| *es == s) {
                    existing.1 = existing.1.plus(leftover);
                } else {
                    new_subset.push((s, leftover));
                }
            }
            new_subset.sort_by_key(|(s, _)| *s);
            let k = key_of(&new_subset);
            let target = *table.entry(k).or_insert_with(|| {
                let id = out.add_state();
                subsets.push(new_subset.clone());
                queue.push_back(id);
                id
            });
            out.add_arc(det_state, Arc::new(label, label, residual, target));
        }
    }
    out
}

/// Best-effort acceptor minimization via partition refinement (Moore's
/// algorithm, unweighted on top of already-determinized weights: two
/// states merge only if their final weight and every outgoing
/// `(label, weight, target-class)` triple match exactly). Intended for
/// the small, already-pruned output lattices the decoding driver
/// produces; does not push weights first, so it merges less
/// aggressively than a full weighted minimization would.
pub fn minimize<W: Semiring>(fst: &Fst<W>) -> Fst<W> {
    let n = fst.num_states();
    if n == 0 {
        return Fst::new();
    }
    let mut class = vec![0u32; n];
    for s in fst.states() {
        class[s as usize] = u32::from(fst.is_final(s));
    }

    loop {
        let mut signatures: Vec<Vec<(u32, u32, u64, u32)>> = vec![Vec::new(); n];
        for s in fst.states() {
            let mut sig: Vec<_> = fst
                .arcs(s)
                .iter()
                .map(|a| (a.ilabel, a.olabel, a.weight.value().to_bits(), class[a.nextstate as usize]))
                .collect();
            sig.sort_unstable();
            signatures[s as usize] = sig;
        }
        let mut next_class: HashMap<(u32, Vec<(u32, u32, u64, u32)>), u32> = HashMap::new();
        let mut new_class = vec![0u32; n];
        for s in fst.states() {
            let key = (class[s as usize], signatures[s as usize].clone());
            let next_id = next_class.len() as u32;
            let id = *next_class.entry(key).or_insert(next_id);
            new_class[s as usize] = id;
        }
        if new_class == class {
            break;
        }
        class = new_class;
    }

    let num_classes = class.iter().copied().max().map_or(0, |m| m + 1) as usize;
    let mut out: Fst<W> = Fst::new();
    for _ in 0..num_classes {
        out.add_state();
    }
    let mut seen_final = vec![false; num_classes];
    for s in fst.states() {
        let c = class[s as usize];
        if fst.is_final(s) && !seen_final[c as usize] {
            out.set_final(c, fst.final_weight(s));
            seen_final[c as usize] = true;
        }
    }
    if let Some(start) = fst.start() {
        out.set_start(class[start as usize]);
    }
    let mut added: std::collections::HashSet<(u32, u32, u32, u64)> = std::collections::HashSet::new();
    for s in fst.states() {
        let c = class[s as usize];
        for arc in fst.arcs(s) {
            let tc = class[arc.nextstate as usize];
            let k = (c, arc.ilabel, arc.olabel, arc.weight.value().to_bits());
            if added.insert((k.0, k.1, k.2, k.3)) {
                out.add_arc(c, Arc::new(arc.ilabel, arc.olabel, arc.weight, tc));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semiring::TropicalWeight;

    fn linear_fst(labels: &[(u32, u32, f64)]) -> Fst<TropicalWeight> {
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
    fn connect_drops_dead_branch() {
        let mut fst: Fst<TropicalWeight> = Fst::new();
        let s0 = fst.add_state();
        let s1 = fst.add_state();
        let dead = fst.add_state();
        fst.set_start(s0);
        fst.set_final(s1, TropicalWeight::one());
        fst.add_arc(s0, Arc::new(1, 1, TropicalWeight(0.0), s1));
        fst.add_arc(s0, Arc::new(2, 2, TropicalWeight(0.0), dead));
        let c = connect(&fst);
        assert_eq!(c.num_states(), 2);
    }

    #[test]
    fn shortest_distance_on_linear_chain() {
        let fst = linear_fst(&[(1, 1, 1.0), (2, 2, 2.0)]);
        let alpha = shortest_distance(&fst, false);
        assert_eq!(alpha[2].value(), 3.0);
        let beta = shortest_distance(&fst, true);
        assert_eq!(beta[0].value(), 3.0);
    }

    #[test]
    fn shortest_path_picks_cheaper_branch() {
        let mut fst: Fst<TropicalWeight> = Fst::new();
        let s0 = fst.add_state();
        let s1 = fst.add_state();
        let s2 = fst.add_state();
        fst.set_start(s0);
        fst.set_final(s1, TropicalWeight::one());
        fst.set_final(s2, TropicalWeight::one());
        fst.add_arc(s0, Arc::new(1, 1, TropicalWeight(5.0), s1));
        fst.add_arc(s0, Arc::new(2, 2, TropicalWeight(1.0), s2));
        let best = shortest_path(&fst).unwrap();
        assert_eq!(best.arcs(best.start().unwrap())[0].ilabel, 2);
    }

    #[test]
    fn rm_epsilon_removes_internal_epsilon_arcs() {
        let mut fst: Fst<TropicalWeight> = Fst::new();
        let s0 = fst.add_state();
        let s1 = fst.add_state();
        let s2 = fst.add_state();
        fst.set_start(s0);
        fst.set_final(s2, TropicalWeight::one());
        fst.add_arc(s0, Arc::new(EPSILON, EPSILON, TropicalWeight(1.0), s1));
        fst.add_arc(s1, Arc::new(4, 4, TropicalWeight(2.0), s2));
        let out = rm_epsilon(&fst);
        for s in out.states() {
            for arc in out.arcs(s) {
                assert!(!arc.is_epsilon());
            }
        }
    }

    #[test]
    fn prune_keeps_only_near_best_paths() {
        let mut fst: Fst<TropicalWeight> = Fst::new();
        let s0 = fst.add_state();
        let s1 = fst.add_state();
        let s2 = fst.add_state();
        fst.set_start(s0);
        fst.set_final(s1, TropicalWeight::one());
        fst.set_final(s2, TropicalWeight::one());
        fst.add_arc(s0, Arc::new(1, 1, TropicalWeight(0.0), s1));
        fst.add_arc(s0, Arc::new(2, 2, TropicalWeight(100.0), s2));
        let pruned = prune(&fst, 1.0);
        assert_eq!(pruned.num_states(), 2);
    }
}
