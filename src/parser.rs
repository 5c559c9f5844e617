//! Entry Parser: turns one playlist source into raw `(name, url)` pairs.
//!
//! Two syntaxes are recognised by the first non-empty line: `#EXTM3U`
//! selects tag/URL pairs, anything else the flat `name,url` format.

use once_cell::sync::Lazy;
use regex::Regex;
use std::str::Lines;

const M3U_MARKER: &str = "#EXTM3U";
const EXTINF: &str = "#EXTINF";
const GENRE_MARKER: &str = "#genre#";
const SCHEME_SEP: &str = "://";
/// Separator bundling alternate endpoints in one URL field
const ALT_SEP: char = '#';
/// Everything after the last one of these is vendor noise
const STRIP_MARKER: char = '$';

/// `name,url` lines embedded in files that claim to be M3U
static FLAT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^,]+,\S+://\S+$").expect("FLAT_LINE is a valid regex"));

/// Raw pair as found in a source, before normalization
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RawEntry {
    pub name: String,
    pub url: String,
}

impl RawEntry {
    fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            url: url.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    M3u,
    Text,
}

pub fn detect_format(source: &str) -> SourceFormat {
    let first = source
        .lines()
        .map(|l| l.trim_start_matches('\u{feff}').trim())
        .find(|l| !l.is_empty());
    match first {
        Some(line) if line.starts_with(M3U_MARKER) => SourceFormat::M3u,
        _ => SourceFormat::Text,
    }
}

/// Drop everything from the last `$` on and trim
pub fn clean_url(url: &str) -> &str {
    let url = match url.rfind(STRIP_MARKER) {
        Some(idx) => &url[..idx],
        None => url,
    };
    url.trim()
}

/// Lazy, restartable iterator over the entries of one source.
///
/// Malformed lines are skipped and counted; see [`Entries::dropped`].
pub struct Entries<'a> {
    lines: Lines<'a>,
    format: SourceFormat,
    pending_name: Option<String>,
    queued: Vec<RawEntry>,
    dropped: usize,
}

/// Parse a playlist source. Stateless: call again to restart.
pub fn parse_entries(source: &str) -> Entries<'_> {
    Entries {
        lines: source.lines(),
        format: detect_format(source),
        pending_name: None,
        queued: Vec::new(),
        dropped: 0,
    }
}

impl<'a> Entries<'a> {
    pub fn format(&self) -> SourceFormat {
        self.format
    }

    /// Lines or URL fragments discarded so far
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Queue one pair per alternate endpoint, reversing for `pop`
    fn expand(&mut self, name: &str, url_field: &str) {
        let name = name.trim();
        if name.is_empty() {
            self.dropped += 1;
            return;
        }

        let mut found = Vec::new();
        let mut discarded = 0;
        for part in url_field.split(ALT_SEP) {
            let url = clean_url(part);
            if url.contains(SCHEME_SEP) {
                found.push(RawEntry::new(name, url));
            } else if !url.is_empty() {
                discarded += 1;
            }
        }

        if found.is_empty() && discarded == 0 {
            discarded = 1;
        }
        self.dropped += discarded;
        found.reverse();
        self.queued.extend(found);
    }

    fn feed_text(&mut self, line: &str) {
        if line.starts_with('#') || line.contains(GENRE_MARKER) {
            return;
        }
        match line.split_once(',') {
            Some((name, url)) => self.expand(name, url),
            None => self.dropped += 1,
        }
    }

    fn feed_m3u(&mut self, line: &str) {
        if line.starts_with(EXTINF) {
            // Display name is whatever follows the last comma
            let name = line.rsplit(',').next().unwrap_or("").trim();
            self.pending_name = Some(name.to_string());
            return;
        }
        if line.starts_with('#') {
            return;
        }

        if let Some(name) = self.pending_name.take() {
            self.expand(&name, line);
        } else if !line.contains(GENRE_MARKER) && FLAT_LINE.is_match(line) {
            if let Some((name, url)) = line.split_once(',') {
                self.expand(name, url);
            }
        } else {
            self.dropped += 1;
        }
    }
}

impl<'a> Iterator for Entries<'a> {
    type Item = RawEntry;

    fn next(&mut self) -> Option<RawEntry> {
        loop {
            if let Some(entry) = self.queued.pop() {
                return Some(entry);
            }

            let line = self.lines.next()?.trim_start_matches('\u{feff}').trim();
            if line.is_empty() {
                continue;
            }
            match self.format {
                SourceFormat::M3u => self.feed_m3u(line),
                SourceFormat::Text => self.feed_text(line),
            }
        }
    }
}

/// Convert a source of either syntax into flat `name,url` lines
pub fn m3u_to_text(source: &str) -> String {
    parse_entries(source)
        .map(|e| format!("{},{}", e.name, e.url))
        .collect::<Vec<_>>()
        .join("\n")
}
