//! Per-user memory journal.
//!
//! One JSON file holds every user's record. The persisted form is rewritten
//! in full on each save, so every read-modify-write goes through one mutex;
//! an unserialized save would silently drop interleaved updates.

use clawbot_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Newest-kept cap on learned facts.
const FACTS_CAP: usize = 20;
/// Newest-kept cap on conversation history entries.
const HISTORY_CAP: usize = 50;
/// Stored message bodies are clipped to this many characters.
const CONTENT_CAP: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
    pub time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    #[serde(default)]
    pub name: String,
    pub first_seen: String,
    #[serde(default)]
    pub last_seen: Option<String>,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub facts: Vec<String>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl MemoryRecord {
    fn new() -> Self {
        Self {
            name: String::new(),
            first_seen: chrono::Utc::now().to_rfc3339(),
            last_seen: None,
            message_count: 0,
            facts: Vec::new(),
            history: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MemoryData {
    #[serde(default)]
    users: HashMap<String, MemoryRecord>,
}

/// Append-only, size-capped journal of turns and learned facts, keyed by user.
pub struct MemoryStore {
    path: PathBuf,
    inner: Mutex<MemoryData>,
}

fn clip(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}

impl MemoryStore {
    /// Open the journal at `path`, loading existing data if present.
    /// A corrupt file is treated as empty rather than refusing to start.
    pub fn open(path: PathBuf) -> Self {
        let data = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<MemoryData>(&content) {
                Ok(data) => data,
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "Corrupt memory file, starting empty");
                    MemoryData::default()
                }
            },
            Err(_) => MemoryData::default(),
        };
        Self {
            path,
            inner: Mutex::new(data),
        }
    }

    /// Record one side of an exchange. Truncates the stored body, bumps the
    /// message counter, evicts oldest history past the cap, and persists.
    pub fn add_message(&self, user_id: &str, role: &str, content: &str) -> Result<()> {
        let mut data = self.inner.lock().map_err(|_| poisoned())?;
        let user = data
            .users
            .entry(user_id.to_string())
            .or_insert_with(MemoryRecord::new);
        user.history.push(HistoryEntry {
            role: role.to_string(),
            content: clip(content, CONTENT_CAP),
            time: chrono::Utc::now().to_rfc3339(),
        });
        if user.history.len() > HISTORY_CAP {
            let excess = user.history.len() - HISTORY_CAP;
            user.history.drain(0..excess);
        }
        user.message_count += 1;
        user.last_seen = Some(chrono::Utc::now().to_rfc3339());
        self.persist(&data)
    }

    /// Store a fact about the user. Duplicates are ignored; oldest facts are
    /// evicted past the cap.
    pub fn learn_fact(&self, user_id: &str, fact: &str) -> Result<()> {
        let mut data = self.inner.lock().map_err(|_| poisoned())?;
        let user = data
            .users
            .entry(user_id.to_string())
            .or_insert_with(MemoryRecord::new);
        if user.facts.iter().any(|f| f == fact) {
            return Ok(());
        }
        user.facts.push(fact.to_string());
        if user.facts.len() > FACTS_CAP {
            let excess = user.facts.len() - FACTS_CAP;
            user.facts.drain(0..excess);
        }
        debug!(user_id, fact, "Learned fact");
        self.persist(&data)
    }

    /// Set the user's display name.
    pub fn set_name(&self, user_id: &str, name: &str) -> Result<()> {
        let mut data = self.inner.lock().map_err(|_| poisoned())?;
        let user = data
            .users
            .entry(user_id.to_string())
            .or_insert_with(MemoryRecord::new);
        user.name = name.to_string();
        self.persist(&data)
    }

    /// Render known facts and the most recent `limit` exchanges as a prompt
    /// prefix. Returns an empty string for unknown users.
    pub fn get_context(&self, user_id: &str, limit: usize) -> String {
        let data = match self.inner.lock() {
            Ok(d) => d,
            Err(_) => return String::new(),
        };
        let user = match data.users.get(user_id) {
            Some(u) => u,
            None => return String::new(),
        };

        let mut parts = Vec::new();
        if !user.facts.is_empty() {
            let recent: Vec<&str> = user
                .facts
                .iter()
                .rev()
                .take(5)
                .rev()
                .map(|s| s.as_str())
                .collect();
            parts.push(format!("Known about this user: {}", recent.join(", ")));
        }
        if !user.history.is_empty() {
            let start = user.history.len().saturating_sub(limit);
            let lines: Vec<String> = user.history[start..]
                .iter()
                .map(|h| format!("{}: {}", h.role, clip(&h.content, 200)))
                .collect();
            parts.push(format!("Recent conversation:\n{}", lines.join("\n")));
        }
        parts.join("\n\n")
    }

    /// Snapshot of a user's record for status displays.
    pub fn get_record(&self, user_id: &str) -> Option<MemoryRecord> {
        self.inner.lock().ok()?.users.get(user_id).cloned()
    }

    fn persist(&self, data: &MemoryData) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(data)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

fn poisoned() -> Error {
    Error::Storage("memory store lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn temp_store() -> (tempfile::TempDir, MemoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::open(dir.path().join("memory.json"));
        (dir, store)
    }

    #[test]
    fn test_add_message_counts_and_caps() {
        let (_dir, store) = temp_store();
        for i in 0..60 {
            store.add_message("u1", "user", &format!("msg {}", i)).unwrap();
        }
        let rec = store.get_record("u1").unwrap();
        assert_eq!(rec.message_count, 60);
        assert_eq!(rec.history.len(), 50);
        // FIFO eviction: the oldest ten are gone.
        assert_eq!(rec.history[0].content, "msg 10");
        assert_eq!(rec.history.last().unwrap().content, "msg 59");
    }

    #[test]
    fn test_facts_cap_and_dedup() {
        let (_dir, store) = temp_store();
        for i in 0..25 {
            store.learn_fact("u1", &format!("fact {}", i)).unwrap();
        }
        store.learn_fact("u1", "fact 24").unwrap(); // duplicate
        let rec = store.get_record("u1").unwrap();
        assert_eq!(rec.facts.len(), 20);
        assert_eq!(rec.facts[0], "fact 5");
        assert_eq!(rec.facts.last().unwrap(), "fact 24");
    }

    #[test]
    fn test_content_truncated_on_store() {
        let (_dir, store) = temp_store();
        let long = "x".repeat(5000);
        store.add_message("u1", "user", &long).unwrap();
        let rec = store.get_record("u1").unwrap();
        assert_eq!(rec.history[0].content.chars().count(), 1000);
    }

    #[test]
    fn test_get_context_unknown_user_empty() {
        let (_dir, store) = temp_store();
        assert_eq!(store.get_context("nobody", 10), "");
    }

    #[test]
    fn test_get_context_includes_facts_and_history() {
        let (_dir, store) = temp_store();
        store.learn_fact("u1", "likes rust").unwrap();
        store.add_message("u1", "user", "hello").unwrap();
        store.add_message("u1", "assistant", "hi there").unwrap();
        let ctx = store.get_context("u1", 10);
        assert!(ctx.contains("likes rust"));
        assert!(ctx.contains("user: hello"));
        assert!(ctx.contains("assistant: hi there"));
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        {
            let store = MemoryStore::open(path.clone());
            store.add_message("u1", "user", "remember me").unwrap();
            store.learn_fact("u1", "is persistent").unwrap();
        }
        let reopened = MemoryStore::open(path);
        let rec = reopened.get_record("u1").unwrap();
        assert_eq!(rec.history.len(), 1);
        assert_eq!(rec.facts, vec!["is persistent"]);
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = MemoryStore::open(path);
        assert!(store.get_record("u1").is_none());
    }

    #[test]
    fn test_concurrent_appends_lose_nothing() {
        let (_dir, store) = temp_store();
        let store = Arc::new(store);
        let mut handles = Vec::new();
        for t in 0..4 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..10 {
                    store
                        .add_message("shared", "user", &format!("t{} m{}", t, i))
                        .unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let rec = store.get_record("shared").unwrap();
        assert_eq!(rec.message_count, 40);
        assert_eq!(rec.history.len(), 40);
    }

    #[test]
    fn test_separate_users_independent() {
        let (_dir, store) = temp_store();
        store.add_message("a", "user", "for a").unwrap();
        store.add_message("b", "user", "for b").unwrap();
        assert_eq!(store.get_record("a").unwrap().history.len(), 1);
        assert_eq!(store.get_record("b").unwrap().history.len(), 1);
    }
}
