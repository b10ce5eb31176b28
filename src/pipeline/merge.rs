// src/pipeline/merge.rs

//! Offline reconciliation of independently harvested key sets.
//!
//! Parallel runs on one category keep separate checkpoint slots; this batch
//! step unions them after the fact. Deliberately not part of the live loop:
//! temporary over-counting across processes is cheaper than a shared lock.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::error::Result;
use crate::models::{HarvestState, PhoneKey, phone};

/// One input collection, in file order.
#[derive(Debug, Clone)]
pub struct MergeSource {
    pub name: String,
    pub keys: Vec<PhoneKey>,
}

/// Union of all inputs with first-seen ordering and provenance.
#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// Deduplicated keys; first writer (source order, then position) wins
    pub keys: Vec<PhoneKey>,
    /// Every source each key was seen in, in source order
    pub provenance: HashMap<PhoneKey, Vec<String>>,
}

impl MergeOutcome {
    pub fn count(&self) -> usize {
        self.keys.len()
    }
}

/// Union the sources by key.
pub fn merge_sources(sources: &[MergeSource]) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();
    let mut seen: HashSet<PhoneKey> = HashSet::new();

    for source in sources {
        for key in &source.keys {
            if seen.insert(key.clone()) {
                outcome.keys.push(key.clone());
            }
            let entry = outcome.provenance.entry(key.clone()).or_default();
            // Sources are walked in order, so only the tail can repeat.
            if entry.last() != Some(&source.name) {
                entry.push(source.name.clone());
            }
        }
    }

    outcome
}

/// Load a merge input from a checkpoint JSON or an exported CSV.
///
/// CSV cells are re-normalized on load, so sets exported by older versions
/// (or hand-edited) still merge on canonical keys.
pub fn load_source(path: &Path) -> Result<MergeSource> {
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let text = std::fs::read_to_string(path)?;

    let keys = if path.extension().is_some_and(|ext| ext == "json") {
        let state: HarvestState = serde_json::from_str(&text)?;
        state.phones
    } else {
        // Column layouts differ between exports (category-first vs
        // provenance-last), so take the first cell that normalizes.
        text.lines()
            .skip_while(|line| is_header(line))
            .filter_map(|line| line.split(',').find_map(phone::normalize))
            .collect()
    };

    Ok(MergeSource { name, keys })
}

fn is_header(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower.contains("phone") && !lower.chars().any(|c| c.is_ascii_digit())
}
