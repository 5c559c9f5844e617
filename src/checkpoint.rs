//! Resumable validation cursor.
//!
//! Persisted as JSON between runs so a run cut short by its time budget can
//! be continued by the next one.

use crate::errors::PipelineError;
use crate::output::write_atomic;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunProgress {
    /// Index of the first probe target not yet covered in the current sweep
    pub last_processed_index: usize,
    #[serde(default)]
    pub last_processed_time: String,
    /// Consecutive failed probes per URL, across runs
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failure_counts: BTreeMap<String, u32>,
    /// Latency in microseconds of every URL confirmed live by its latest
    /// probe. Carries results across runs so a resumed sweep still emits them.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub confirmed_latencies: BTreeMap<String, u64>,
}

impl RunProgress {
    /// Missing file starts a fresh sweep; a corrupt one does too, with a warning.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return RunProgress::default(),
        };
        match serde_json::from_str(&content) {
            Ok(progress) => progress,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt progress file, starting over");
                RunProgress::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::Checkpoint(e.to_string()))?;
        write_atomic(path, json.as_bytes())
    }

    /// Cursor to start from for a target list of `len` entries
    pub fn start_index(&self, len: usize) -> usize {
        if self.last_processed_index >= len {
            0
        } else {
            self.last_processed_index
        }
    }

    /// Move the cursor; reaching the end wraps back to the start
    pub fn advance_to(&mut self, index: usize, len: usize, now: DateTime<Local>) {
        self.last_processed_index = if index >= len { 0 } else { index };
        self.last_processed_time = now.format("%Y-%m-%d %H:%M:%S").to_string();
    }

    /// Returns the new consecutive failure count
    pub fn note_failure(&mut self, url: &str) -> u32 {
        let count = self.failure_counts.entry(url.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn note_success(&mut self, url: &str) {
        self.failure_counts.remove(url);
    }

    pub fn confirm(&mut self, url: &str, latency: Duration) {
        self.confirmed_latencies
            .insert(url.to_string(), u64::try_from(latency.as_micros()).unwrap_or(u64::MAX));
    }

    pub fn forget_confirmed(&mut self, url: &str) {
        self.confirmed_latencies.remove(url);
    }

    pub fn confirmed(&self, url: &str) -> Option<Duration> {
        self.confirmed_latencies
            .get(url)
            .map(|micros| Duration::from_micros(*micros))
    }

    /// Drop carried results for URLs no longer offered by any source
    pub fn retain_confirmed<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.confirmed_latencies.retain(|url, _| keep(url));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let progress = RunProgress {
            last_processed_index: 7,
            last_processed_time: "2026-10-17 08:00:00".into(),
            ..RunProgress::default()
        };
        let json = serde_json::to_value(&progress).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"lastProcessedIndex": 7, "lastProcessedTime": "2026-10-17 08:00:00"})
        );
    }

    #[test]
    fn test_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let mut progress = RunProgress::default();
        progress.advance_to(3, 10, Local::now());
        progress.note_failure("http://a/1");
        progress.save(&path).unwrap();

        let loaded = RunProgress::load(&path);
        assert_eq!(loaded, progress);
    }

    #[test]
    fn test_corrupt_or_missing_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        assert_eq!(RunProgress::load(&path), RunProgress::default());
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(RunProgress::load(&path), RunProgress::default());
    }

    #[test]
    fn test_cursor_wraps() {
        let mut progress = RunProgress::default();
        progress.advance_to(10, 10, Local::now());
        assert_eq!(progress.last_processed_index, 0);

        progress.last_processed_index = 12;
        assert_eq!(progress.start_index(5), 0);
        progress.last_processed_index = 4;
        assert_eq!(progress.start_index(5), 4);
    }

    #[test]
    fn test_confirmed_latencies_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let mut progress = RunProgress::default();
        progress.confirm("http://a/1", Duration::from_millis(250));
        progress.confirm("http://gone/1", Duration::from_millis(10));
        progress.retain_confirmed(|url| url != "http://gone/1");
        progress.save(&path).unwrap();

        let loaded = RunProgress::load(&path);
        assert_eq!(loaded.confirmed("http://a/1"), Some(Duration::from_millis(250)));
        assert_eq!(loaded.confirmed("http://gone/1"), None);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["confirmedLatencies"]["http://a/1"], serde_json::json!(250_000));
    }

    #[test]
    fn test_failure_strikes_reset_on_success() {
        let mut progress = RunProgress::default();
        assert_eq!(progress.note_failure("u"), 1);
        assert_eq!(progress.note_failure("u"), 2);
        progress.note_success("u");
        assert_eq!(progress.note_failure("u"), 1);
    }
}
