//! Dictionary Store: category membership lists, the name-correction map and
//! URL black/white lists. Loaded once per run and read-only afterwards.

use crate::config::{AppConfig, CategoryKind};
use crate::text;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

/// Category group: membership and output order in one list
#[derive(Debug, Clone)]
pub struct Category {
    pub name: String,
    pub kind: CategoryKind,
    members: Vec<String>,
    positions: HashMap<String, usize>,
    pub keywords: Vec<String>,
}

impl Category {
    pub fn new(name: &str, kind: CategoryKind, members: Vec<String>) -> Self {
        let mut positions = HashMap::with_capacity(members.len());
        for (i, m) in members.iter().enumerate() {
            positions.entry(m.clone()).or_insert(i);
        }
        Self {
            name: name.to_string(),
            kind,
            members,
            positions,
            keywords: Vec::new(),
        }
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.positions.contains_key(channel)
    }

    /// Position in the dictionary, used as the within-category sort key
    pub fn position(&self, channel: &str) -> Option<usize> {
        self.positions.get(channel).copied()
    }

    pub fn matches_keyword(&self, channel: &str) -> bool {
        self.keywords
            .iter()
            .any(|k| !k.is_empty() && channel.contains(k.as_str()))
    }
}

/// alias → canonical channel name
#[derive(Debug, Clone, Default)]
pub struct CorrectionMap {
    aliases: HashMap<String, String>,
}

impl CorrectionMap {
    /// Parse `canonical,alias1,alias2,...` lines
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut aliases = HashMap::new();
        for line in lines {
            let line = line.as_ref().trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split(',').map(str::trim);
            let Some(canonical) = parts.next().filter(|c| !c.is_empty()) else {
                continue;
            };
            for alias in parts.filter(|a| !a.is_empty()) {
                aliases.insert(alias.to_string(), canonical.to_string());
            }
        }
        Self { aliases }
    }

    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.aliases.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

/// Set of URLs or URL substrings read from `label,url` lines
#[derive(Debug, Clone, Default)]
pub struct UrlList {
    entries: Vec<String>,
    exact: HashSet<String>,
}

impl UrlList {
    /// Only the second field of each `label,url` line is kept
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = UrlList::default();
        for line in lines {
            let line = line.as_ref().trim();
            if line.starts_with('#') {
                continue;
            }
            if let Some((_, url)) = line.split_once(',') {
                list.insert(url.trim());
            }
        }
        list
    }

    pub fn insert(&mut self, url: &str) -> bool {
        if url.is_empty() || !self.exact.insert(url.to_string()) {
            return false;
        }
        self.entries.push(url.to_string());
        true
    }

    pub fn extend(&mut self, other: UrlList) {
        for e in other.entries {
            self.insert(&e);
        }
    }

    /// Substring match, used for blacklisting
    pub fn matches(&self, url: &str) -> bool {
        self.exact.contains(url) || self.entries.iter().any(|e| url.contains(e.as_str()))
    }

    /// Exact match, used for whitelist cap bypass
    pub fn contains_exact(&self, url: &str) -> bool {
        self.exact.contains(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything the classifier and emitter consult
#[derive(Debug, Clone, Default)]
pub struct Dictionaries {
    /// Declared output order
    pub categories: Vec<Category>,
    pub satellite_keywords: Vec<String>,
    pub corrections: CorrectionMap,
    /// Substring-matched, from hand-maintained blacklists
    pub blacklist: UrlList,
    /// Exact URLs journalled as dead by earlier runs
    pub dead_urls: UrlList,
    pub whitelist: UrlList,
}

impl Dictionaries {
    /// Load every file named by `config`. Unreadable files become empty
    /// sets with a warning rather than failing the run.
    pub fn load(config: &AppConfig) -> Self {
        let categories: Vec<Category> = config
            .categories
            .iter()
            .map(|spec| {
                let members = spec
                    .dictionary
                    .as_deref()
                    .map(|p| read_or_warn(p, "dictionary"))
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .collect();
                Category::new(&spec.name, spec.kind, members).with_keywords(spec.keywords.clone())
            })
            .collect();

        let corrections = config
            .corrections
            .as_deref()
            .map(|p| CorrectionMap::from_lines(read_or_warn(p, "corrections")))
            .unwrap_or_default();

        let mut blacklist = UrlList::default();
        for path in &config.blacklists {
            blacklist.extend(UrlList::from_lines(read_or_warn(path, "blacklist")));
        }
        let dead_urls = config
            .auto_blacklist
            .as_deref()
            .filter(|journal| journal.exists())
            .map(|journal| UrlList::from_lines(read_or_warn(journal, "blacklist")))
            .unwrap_or_default();

        let mut whitelist = UrlList::default();
        for path in &config.whitelists {
            whitelist.extend(UrlList::from_lines(read_or_warn(path, "whitelist")));
        }

        info!(
            categories = categories.len(),
            corrections = corrections.len(),
            blacklist = blacklist.len(),
            dead_urls = dead_urls.len(),
            whitelist = whitelist.len(),
            "dictionaries loaded"
        );

        Self {
            categories,
            satellite_keywords: config.satellite_keywords.clone(),
            corrections,
            blacklist,
            dead_urls,
            whitelist,
        }
    }

    /// Hand-maintained entries match as substrings, journalled ones only exactly
    pub fn is_blacklisted(&self, url: &str) -> bool {
        self.blacklist.matches(url) || self.dead_urls.contains_exact(url)
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }
}

fn read_or_warn(path: &Path, what: &str) -> Vec<String> {
    match text::read_lines(path) {
        Some(lines) => lines,
        None => {
            warn!(path = %path.display(), kind = what, "unreadable file, treating as empty");
            Vec::new()
        }
    }
}
