use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, anyhow};
use refinevoice_engine::traits::{InteractionKind, InteractionLog, InteractionRecord, UserStats};

use crate::fs_util::write_json_atomic;

/// Interaction records kept in a single JSON array on disk.
///
/// Appends are serialized through a mutex so concurrent runs never interleave
/// a read-modify-write of the file.
#[derive(Debug)]
pub struct JsonInteractionLog {
    path: PathBuf,
    max_entries: usize,
    lock: Mutex<()>,
}

impl JsonInteractionLog {
    pub fn at_path(path: PathBuf) -> Self {
        Self {
            path,
            max_entries: 1000,
            lock: Mutex::new(()),
        }
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> anyhow::Result<Vec<InteractionRecord>> {
        if !self.path.exists() {
            return Ok(vec![]);
        }

        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read interactions: {}", self.path.display()))?;
        let entries: Vec<InteractionRecord> = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse interactions: {}", self.path.display()))?;
        Ok(entries)
    }

    pub fn append(&self, record: InteractionRecord) -> anyhow::Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("interaction log lock poisoned"))?;

        let mut entries = self.load()?;
        entries.push(record);
        if entries.len() > self.max_entries {
            let start = entries.len() - self.max_entries;
            entries = entries.split_off(start);
        }

        write_json_atomic(&self.path, &entries)
    }

    /// Most recent records for `user_id`, newest first.
    pub fn recent(&self, user_id: &str, limit: usize) -> anyhow::Result<Vec<InteractionRecord>> {
        Ok(self
            .load()?
            .into_iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .take(limit)
            .collect())
    }

    pub fn clear(&self) -> anyhow::Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("failed to remove interactions: {}", self.path.display()))?;
        }
        Ok(())
    }
}

impl InteractionLog for JsonInteractionLog {
    fn record(&self, record: InteractionRecord) -> anyhow::Result<()> {
        self.append(record)
    }

    fn stats(&self, user_id: &str) -> anyhow::Result<UserStats> {
        let mut stats = UserStats::default();
        for r in self.load()?.iter().filter(|r| r.user_id == user_id) {
            match r.kind {
                InteractionKind::Audio => stats.audio_count += 1,
                InteractionKind::Text => stats.text_count += 1,
            }
            stats.first_use_ms = Some(stats.first_use_ms.map_or(r.ts_unix_ms, |t| t.min(r.ts_unix_ms)));
            stats.last_use_ms = Some(stats.last_use_ms.map_or(r.ts_unix_ms, |t| t.max(r.ts_unix_ms)));
        }
        Ok(stats)
    }
}
