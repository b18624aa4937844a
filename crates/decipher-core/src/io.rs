//! FST I/O: single-file and archive reading/writing, with JSON or CBOR
//! chosen by file extension. Mirrors `sezkp-core::io`'s
//! extension-sniffing convention (`.json` -> JSON, anything else ->
//! CBOR) and its `Versioned<T>` wrapper, applied to FSTs and transcripts
//! instead of block summaries.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};

use crate::fst::{Arc, Fst, EPSILON};
use crate::semiring::Semiring;

/// Wraps a serialized payload with a format version, so future releases
/// can detect and migrate older archives.
#[derive(Serialize, serde::Deserialize)]
pub struct Versioned<T> {
    pub version: u32,
    pub payload: T,
}

const CURRENT_VERSION: u32 = 1;

fn ext_lower(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating parent dir for {}", path.display()))?;
        }
    }
    Ok(())
}

fn write_versioned<T: Serialize>(path: &Path, payload: T) -> Result<()> {
    ensure_parent_dir(path)?;
    let versioned = Versioned {
        version: CURRENT_VERSION,
        payload,
    };
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let writer = BufWriter::new(file);
    if ext_lower(path) == "json" {
        serde_json::to_writer_pretty(writer, &versioned)
            .with_context(|| format!("writing json to {}", path.display()))?;
    } else {
        ciborium::into_writer(&versioned, writer)
            .map_err(|e| anyhow::anyhow!("writing cbor to {}: {e}", path.display()))?;
    }
    Ok(())
}

fn read_versioned<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = BufReader::new(file);
    let versioned: Versioned<T> = if ext_lower(path) == "json" {
        serde_json::from_reader(reader)
            .with_context(|| format!("parsing json from {}", path.display()))?
    } else {
        ciborium::from_reader(reader)
            .map_err(|e| anyhow::anyhow!("parsing cbor from {}: {e}", path.display()))?
    };
    Ok(versioned.payload)
}

/// Writes a single FST to `path` (JSON if the extension is `.json`,
/// CBOR otherwise).
pub fn write_fst<W: Semiring + Serialize>(path: &Path, fst: &Fst<W>) -> Result<()> {
    write_versioned(path, fst)
}

/// Reads a single FST from `path`.
pub fn read_fst<W: Semiring + DeserializeOwned>(path: &Path) -> Result<Fst<W>> {
    read_versioned(path)
}

/// Writes a keyed archive of FSTs (one entry per utterance id), used
/// for transcript-to-FST batches and per-utterance decode lattices.
pub fn write_fst_archive<W: Semiring + Serialize>(
    path: &Path,
    archive: &BTreeMap<String, Fst<W>>,
) -> Result<()> {
    write_versioned(path, archive)
}

/// Reads a keyed archive of FSTs.
pub fn read_fst_archive<W: Semiring + DeserializeOwned>(
    path: &Path,
) -> Result<BTreeMap<String, Fst<W>>> {
    read_versioned(path)
}

/// Builds a linear acceptor FST for an integer-symbol transcript
/// (`transcripts-to-fsts`'s `MakeLinearAcceptor`): one state per symbol
/// boundary, each consuming one symbol with unit weight.
pub fn transcript_to_linear_fst<W: Semiring>(transcript: &[u32]) -> Fst<W> {
    let mut fst = Fst::new();
    let mut prev = fst.add_state();
    fst.set_start(prev);
    for &sym in transcript {
        let next = fst.add_state();
        fst.add_arc(prev, Arc::new(sym, sym, W::one(), next));
        prev = next;
    }
    fst.set_final(prev, W::one());
    fst
}

/// Reads a whitespace-separated integer transcript file (one utterance
/// per line, `utt_id sym1 sym2 ...`), the plain-text counterpart of the
/// original's Kaldi table format.
pub fn read_transcripts(path: &Path) -> Result<BTreeMap<String, Vec<u32>>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading transcripts from {}", path.display()))?;
    let mut out = BTreeMap::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        let key = fields
            .next()
            .with_context(|| format!("{}:{}: missing utterance id", path.display(), lineno + 1))?
            .to_string();
        let syms: Result<Vec<u32>> = fields
            .map(|f| {
                f.parse::<u32>()
                    .with_context(|| format!("{}:{}: bad symbol {f:?}", path.display(), lineno + 1))
            })
            .collect();
        out.insert(key, syms?);
    }
    Ok(out)
}

/// Extracts the output-tape symbol sequence from a linear (single-path)
/// FST, dropping epsilons (`GetLinearSymbolSequence`).
pub fn linear_output_sequence<W: Semiring>(fst: &Fst<W>) -> Vec<u32> {
    let mut out = Vec::new();
    let Some(mut state) = fst.start() else {
        return out;
    };
    loop {
        let arcs = fst.arcs(state);
        let Some(arc) = arcs.first() else { break };
        if arc.olabel != EPSILON {
            out.push(arc.olabel);
        }
        state = arc.nextstate;
        if fst.is_final(state) && fst.arcs(state).is_empty() {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semiring::TropicalWeight;
    use std::env;

    #[test]
    fn json_round_trip() {
        let fst: Fst<TropicalWeight> = transcript_to_linear_fst(&[3, 4, 5]);
        let path = env::temp_dir().join(format!("decipher-test-{}.json", std::process::id()));
        write_fst(&path, &fst).unwrap();
        let back: Fst<TropicalWeight> = read_fst(&path).unwrap();
        assert_eq!(back.num_states(), fst.num_states());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn cbor_round_trip() {
        let fst: Fst<TropicalWeight> = transcript_to_linear_fst(&[1, 2]);
        let path = env::temp_dir().join(format!("decipher-test-{}.cbor", std::process::id()));
        write_fst(&path, &fst).unwrap();
        let back: Fst<TropicalWeight> = read_fst(&path).unwrap();
        assert_eq!(back.num_arcs(), fst.num_arcs());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn linear_sequence_skips_epsilon() {
        let mut fst: Fst<TropicalWeight> = Fst::new();
        let s0 = fst.add_state();
        let s1 = fst.add_state();
        let s2 = fst.add_state();
        fst.set_start(s0);
        fst.add_arc(s0, Arc::new(EPSILON, EPSILON, TropicalWeight::one(), s1));
        fst.add_arc(s1, Arc::new(7, 9, TropicalWeight::one(), s2));
        fst.set_final(s2, TropicalWeight::one());
        assert_eq!(linear_output_sequence(&fst), vec![9]);
    }
}
