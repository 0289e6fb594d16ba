//! Append-only archive of settled rounds.
//!
//! Entries are written exactly once at settlement and never mutated. The
//! in-memory store is bounded; an optional JSONL file keeps the full audit
//! trail when configured.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;
use updraft_types::{RoundHistoryEntry, RoundId};

pub struct HistoryStore {
    entries: BTreeMap<RoundId, RoundHistoryEntry>,
    depth: usize,
    path: Option<PathBuf>,
}

impl HistoryStore {
    pub fn new(depth: usize, path: Option<PathBuf>) -> Self {
        Self {
            entries: BTreeMap::new(),
            depth,
            path,
        }
    }

    /// Record a settled round. Oldest in-memory entries are pruned beyond
    /// the configured depth; the JSONL file, if any, keeps everything.
    pub fn append(&mut self, entry: RoundHistoryEntry) {
        if let Some(path) = &self.path {
            match serde_json::to_string(&entry) {
                Ok(line) => {
                    let result = OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(path)
                        .and_then(|mut file| writeln!(file, "{line}"));
                    if let Err(e) = result {
                        warn!(round = entry.round_id, error = %e, "failed to append history file");
                    }
                }
                Err(e) => {
                    warn!(round = entry.round_id, error = %e, "failed to encode history entry");
                }
            }
        }
        self.entries.insert(entry.round_id, entry);
        while self.entries.len() > self.depth {
            let oldest = match self.entries.keys().next() {
                Some(id) => *id,
                None => break,
            };
            self.entries.remove(&oldest);
        }
    }

    pub fn get(&self, round_id: RoundId) -> Option<&RoundHistoryEntry> {
        self.entries.get(&round_id)
    }

    /// Most recent entries first.
    pub fn recent(&self, limit: usize) -> Vec<RoundHistoryEntry> {
        self.entries.values().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use updraft_types::Multiplier;

    fn create_test_entry(round_id: RoundId) -> RoundHistoryEntry {
        RoundHistoryEntry {
            round_id,
            crash_point: Multiplier::from_bps(15_000),
            server_seed: "aa".to_string(),
            server_seed_hash: "bb".to_string(),
            client_seed: String::new(),
            started_at: round_id * 1000,
            crashed_at: round_id * 1000 + 500,
            total_bets: 2,
            total_wagered: 200,
            total_payout: 150,
        }
    }

    #[test]
    fn test_recent_newest_first() {
        let mut store = HistoryStore::new(10, None);
        for id in 1..=5 {
            store.append(create_test_entry(id));
        }
        let recent = store.recent(3);
        let ids: Vec<RoundId> = recent.iter().map(|e| e.round_id).collect();
        assert_eq!(ids, vec![5, 4, 3]);
    }

    #[test]
    fn test_depth_prunes_oldest() {
        let mut store = HistoryStore::new(3, None);
        for id in 1..=5 {
            store.append(create_test_entry(id));
        }
        assert_eq!(store.len(), 3);
        assert!(store.get(1).is_none());
        assert!(store.get(2).is_none());
        assert!(store.get(3).is_some());
        assert!(store.get(5).is_some());
    }

    #[test]
    fn test_jsonl_append() {
        let dir = std::env::temp_dir().join(format!("updraft-history-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join("rounds.jsonl");
        let _ = std::fs::remove_file(&path);

        let mut store = HistoryStore::new(10, Some(path.clone()));
        store.append(create_test_entry(1));
        store.append(create_test_entry(2));

        let contents = std::fs::read_to_string(&path).expect("read history file");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: RoundHistoryEntry =
            serde_json::from_str(lines[0]).expect("decode history line");
        assert_eq!(first, create_test_entry(1));

        let _ = std::fs::remove_file(&path);
    }
}
