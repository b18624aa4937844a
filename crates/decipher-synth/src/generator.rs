//! Synthetic toy-cipher generation: a random substitution permutation,
//! a noisy channel (insertion/deletion/substitution), and a corpus of
//! ciphertext observations with known plaintext for evaluating
//! training convergence.
//!
//! Grounded on `sezkp-trace::generator::generate_trace`'s style: a
//! single seeded `StdRng`, driven with `random_range`/`random_bool`
//! rather than hand-rolled arithmetic, so a given seed always
//! reproduces the same corpus.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use decipher_core::{Arc, Fst, LogWeight, Semiring, EPSILON, SILENCE};

/// A random bijection from source symbols `2..num_src_syms` to target
/// symbols `2..num_tgt_syms` (symbols `0` and `1` stay reserved for
/// epsilon and silence on both alphabets).
#[derive(Clone, Debug)]
pub struct Cipher {
    pub mapping: Vec<u32>,
}

impl Cipher {
    /// Builds a uniformly random permutation cipher over the real
    /// (non-epsilon, non-silence) symbols of a `num_syms`-size
    /// alphabet, using a Fisher-Yates shuffle.
    pub fn random(rng: &mut StdRng, num_syms: u32) -> Self {
        let mut mapping: Vec<u32> = (2..num_syms).collect();
        for i in (1..mapping.len()).rev() {
            let j = rng.random_range(0..=i);
            mapping.swap(i, j);
        }
        Self { mapping }
    }

    /// The target symbol a source symbol maps to.
    pub fn encode(&self, src_symbol: u32) -> u32 {
        self.mapping[(src_symbol - 2) as usize]
    }
}

/// A synthetic corpus: plaintext transcripts, their ciphertext
/// observations (after noisy-channel corruption), and the ground-truth
/// cipher used to generate them.
pub struct SyntheticCorpus {
    pub cipher: Cipher,
    pub plaintexts: Vec<Vec<u32>>,
    pub observations: Vec<Vec<u32>>,
}

/// Parameters controlling corpus generation.
#[derive(Clone, Copy, Debug)]
pub struct CorpusOptions {
    pub num_utterances: usize,
    pub min_len: usize,
    pub max_len: usize,
    pub num_src_syms: u32,
    pub num_tgt_syms: u32,
    pub insertion_prob: f64,
    pub deletion_prob: f64,
}

impl Default for CorpusOptions {
    fn default() -> Self {
        Self {
            num_utterances: 50,
            min_len: 3,
            max_len: 8,
            num_src_syms: 10,
            num_tgt_syms: 10,
            insertion_prob: 0.05,
            deletion_prob: 0.05,
        }
    }
}

/// Generates a reproducible synthetic corpus for `seed`.
pub fn generate_corpus(seed: u64, opts: CorpusOptions) -> SyntheticCorpus {
    let mut rng = StdRng::seed_from_u64(seed);
    let cipher = Cipher::random(&mut rng, opts.num_src_syms.max(opts.num_tgt_syms));

    let mut plaintexts = Vec::with_capacity(opts.num_utterances);
    let mut observations = Vec::with_capacity(opts.num_utterances);

    for _ in 0..opts.num_utterances {
        let len = rng.random_range(opts.min_len..=opts.max_len);
        let plaintext: Vec<u32> = (0..len)
            .map(|_| rng.random_range(2..opts.num_src_syms))
            .collect();

        let mut observation = Vec::with_capacity(len + 2);
        for &sym in &plaintext {
            if rng.random_bool(opts.deletion_prob) {
                continue;
            }
            observation.push(cipher.encode(sym));
            if rng.random_bool(opts.insertion_prob) {
                observation.push(rng.random_range(2..opts.num_tgt_syms));
            }
        }

        plaintexts.push(plaintext);
        observations.push(observation);
    }

    SyntheticCorpus {
        cipher,
        plaintexts,
        observations,
    }
}

/// Builds an uninformative (uniform) lexicon FST over `num_src_syms x
/// num_tgt_syms`: a single self-looping state with one arc per
/// `(source, target)` pair plus a silence self-loop, ready to be
/// trained from scratch by EM.
pub fn uniform_lexicon_fst(num_src_syms: u32, num_tgt_syms: u32) -> Fst<LogWeight> {
    let num_real_src = (num_src_syms - 2).max(1);
    let num_real_tgt = (num_tgt_syms - 2).max(1);
    let uniform_weight = LogWeight::from_value(f64::from(num_real_src * num_real_tgt).ln());

    let mut fst = Fst::new();
    let s0 = fst.add_state();
    fst.set_start(s0);
    fst.set_final(s0, LogWeight::one());
    fst.add_arc(s0, Arc::new(SILENCE, SILENCE, LogWeight::one(), s0));
    for src in 2..num_src_syms {
        for tgt in 2..num_tgt_syms {
            fst.add_arc(s0, Arc::new(src, tgt, uniform_weight, s0));
        }
        // Deletion: consumes a source symbol, emits nothing.
        fst.add_arc(s0, Arc::new(src, EPSILON, uniform_weight, s0));
    }
    fst
}

/// Builds a trivial alignment FST: a single state with a self-loop
/// match arc per target symbol, plus insertion and deletion arcs,
/// where the deletion arc uses the `num_tgt_syms` sentinel ilabel per
/// the alignment FST's own symbol convention (distinct from the
/// lexicon FST's `olabel == EPSILON` deletion marker).
pub fn uniform_alignment_fst(num_tgt_syms: u32) -> Fst<LogWeight> {
    let mut fst = Fst::new();
    let s0 = fst.add_state();
    fst.set_start(s0);
    fst.set_final(s0, LogWeight::one());
    fst.add_arc(s0, Arc::new(SILENCE, SILENCE, LogWeight::one(), s0));
    for tgt in 2..num_tgt_syms {
        fst.add_arc(s0, Arc::new(tgt, tgt, LogWeight::one(), s0));
    }
    fst.add_arc(s0, Arc::new(EPSILON, num_tgt_syms, LogWeight::one(), s0)); // insertion
    fst.add_arc(s0, Arc::new(num_tgt_syms, EPSILON, LogWeight::one(), s0)); // deletion
    fst
}

/// Builds a flat (unigram, uniform) language model over the target
/// alphabet: every real target symbol is equally likely at every
/// position.
pub fn flat_language_model_fst(num_tgt_syms: u32) -> Fst<LogWeight> {
    let num_real_tgt = (num_tgt_syms - 2).max(1);
    let uniform_weight = LogWeight::from_value(f64::from(num_real_tgt).ln());
    let mut fst = Fst::new();
    let s0 = fst.add_state();
    fst.set_start(s0);
    fst.set_final(s0, LogWeight::one());
    fst.add_arc(s0, Arc::new(SILENCE, SILENCE, LogWeight::one(), s0));
    for tgt in 2..num_tgt_syms {
        fst.add_arc(s0, Arc::new(tgt, tgt, uniform_weight, s0));
    }
    fst
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_yields_same_corpus() {
        let opts = CorpusOptions::default();
        let a = generate_corpus(42, opts);
        let b = generate_corpus(42, opts);
        assert_eq!(a.plaintexts, b.plaintexts);
        assert_eq!(a.observations, b.observations);
        assert_eq!(a.cipher.mapping, b.cipher.mapping);
    }

    #[test]
    fn different_seeds_usually_differ() {
        let opts = CorpusOptions::default();
        let a = generate_corpus(1, opts);
        let b = generate_corpus(2, opts);
        assert_ne!(a.cipher.mapping, b.cipher.mapping);
    }

    #[test]
    fn cipher_is_a_bijection_over_real_symbols() {
        let mut rng = StdRng::seed_from_u64(7);
        let cipher = Cipher::random(&mut rng, 10);
        let mut seen: Vec<u32> = cipher.mapping.clone();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), cipher.mapping.len());
    }

    #[test]
    fn lexicon_fst_has_silence_self_loop() {
        let fst = uniform_lexicon_fst(6, 6);
        let start = fst.start().unwrap();
        assert!(fst
            .arcs(start)
            .iter()
            .any(|a| a.ilabel == SILENCE && a.olabel == SILENCE));
    }
}
