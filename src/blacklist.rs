//! Append-only journal of URLs that keep failing validation.
//!
//! Lines use the same `label,url` layout as hand-maintained blacklists so
//! the journal can be listed under `blacklists` too.

use crate::dictionary::UrlList;
use crate::errors::{PipelineError, ProbeFailure};
use crate::text;
use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct BlacklistJournal {
    path: PathBuf,
    known: UrlList,
}

impl BlacklistJournal {
    /// Existing entries, duplicates included, are read as already known
    pub fn open(path: &Path) -> Self {
        let known = text::read_lines(path)
            .map(UrlList::from_lines)
            .unwrap_or_default();
        Self {
            path: path.to_path_buf(),
            known,
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.known.contains_exact(url)
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Append `url` unless already journalled. Returns whether a line was written.
    pub fn append(
        &mut self,
        url: &str,
        failure: &ProbeFailure,
        at: DateTime<Local>,
    ) -> Result<bool, PipelineError> {
        if url.is_empty() || self.known.contains_exact(url) {
            return Ok(false);
        }

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| PipelineError::write(&self.path, e))?;
        }

        // Commas would shift the url out of the second field
        let reason = failure.to_string().replace(',', ";");
        let line = format!(
            "{} {} {},{}\n",
            at.format("%Y-%m-%d %H:%M:%S"),
            failure.tag(),
            reason,
            url
        );

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| PipelineError::write(&self.path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| PipelineError::write(&self.path, e))?;

        self.known.insert(url);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ConnectionStage;

    #[test]
    fn test_append_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blacklist_auto.txt");
        let failure = ProbeFailure::Timeout {
            stage: ConnectionStage::TcpConnection,
        };

        let mut journal = BlacklistJournal::open(&path);
        assert!(journal.append("http://dead/1", &failure, Local::now()).unwrap());
        assert!(!journal.append("http://dead/1", &failure, Local::now()).unwrap());

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.trim_end().ends_with(",http://dead/1"));

        // A fresh open sees the journalled entry
        let reopened = BlacklistJournal::open(&path);
        assert!(reopened.contains("http://dead/1"));
    }

    #[test]
    fn test_duplicate_lines_on_disk_do_not_break_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blacklist_auto.txt");
        std::fs::write(&path, "x,http://dup/1\ny,http://dup/1\n").unwrap();

        let mut journal = BlacklistJournal::open(&path);
        assert_eq!(journal.len(), 1);
        let failure = ProbeFailure::Status(500);
        assert!(!journal.append("http://dup/1", &failure, Local::now()).unwrap());
    }

    #[test]
    fn test_reason_with_comma_keeps_url_in_second_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auto.txt");
        let failure = ProbeFailure::Http("a, b".into());
        let mut journal = BlacklistJournal::open(&path);
        journal.append("http://x/1", &failure, Local::now()).unwrap();

        let list = UrlList::from_lines(text::read_lines(&path).unwrap());
        assert!(list.contains_exact("http://x/1"));
    }
}
