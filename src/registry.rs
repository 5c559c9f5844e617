//! SourceRegistry: accepted candidates per channel, and the probe outcomes
//! recorded against them by the worker pool.

use crate::prober::ProbeOutcome;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// One URL offered for one channel
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSource {
    pub url: String,
    pub channel: String,
    /// Global discovery sequence number, the ranking tie-breaker
    pub discovery: usize,
    pub latency: Option<Duration>,
    pub valid: bool,
}

#[derive(Debug, Clone)]
pub struct ChannelBucket {
    pub category: String,
    /// Discovery number of the first accepted candidate
    pub first_seen: usize,
    pub candidates: Vec<CandidateSource>,
}

impl ChannelBucket {
    fn has_url(&self, url: &str) -> bool {
        self.candidates.iter().any(|c| c.url == url)
    }
}

/// Pre-probe registry. Created at run start and consumed by ranking.
#[derive(Debug)]
pub struct SourceRegistry {
    cap: usize,
    channels: HashMap<String, ChannelBucket>,
    category_urls: HashMap<String, HashSet<String>>,
    next_seq: usize,
    /// Unique URLs in discovery order; one probe each
    probe_targets: Vec<String>,
    seen_targets: HashSet<String>,
    outcomes: Mutex<HashMap<String, ProbeOutcome>>,
}

impl SourceRegistry {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            channels: HashMap::new(),
            category_urls: HashMap::new(),
            next_seq: 0,
            probe_targets: Vec::new(),
            seen_targets: HashSet::new(),
            outcomes: Mutex::new(HashMap::new()),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn contains(&self, channel: &str, url: &str) -> bool {
        self.channels
            .get(channel)
            .map(|b| b.has_url(url))
            .unwrap_or(false)
    }

    /// Whether any channel of `category` already carries `url`
    pub fn category_has_url(&self, category: &str, url: &str) -> bool {
        self.category_urls
            .get(category)
            .map(|urls| urls.contains(url))
            .unwrap_or(false)
    }

    pub fn accepted_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map(|b| b.candidates.len())
            .unwrap_or(0)
    }

    /// Register an accepted pair. Returns false for a duplicate.
    ///
    /// A channel keeps the category it was first registered under.
    pub fn register(&mut self, channel: &str, category: &str, url: &str) -> bool {
        if self.contains(channel, url) {
            return false;
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        let bucket = self
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| ChannelBucket {
                category: category.to_string(),
                first_seen: seq,
                candidates: Vec::new(),
            });
        bucket.candidates.push(CandidateSource {
            url: url.to_string(),
            channel: channel.to_string(),
            discovery: seq,
            latency: None,
            valid: false,
        });

        self.category_urls
            .entry(bucket.category.clone())
            .or_default()
            .insert(url.to_string());

        if self.seen_targets.insert(url.to_string()) {
            self.probe_targets.push(url.to_string());
        }
        true
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelBucket> {
        self.channels.get(name)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn candidate_count(&self) -> usize {
        self.next_seq
    }

    pub fn probe_targets(&self) -> &[String] {
        &self.probe_targets
    }

    pub fn is_target(&self, url: &str) -> bool {
        self.seen_targets.contains(url)
    }

    /// Record a probe result. Safe to call from concurrent probe tasks.
    pub fn record(&self, url: &str, outcome: ProbeOutcome) {
        let mut outcomes = self.outcomes.lock().unwrap_or_else(PoisonError::into_inner);
        outcomes.insert(url.to_string(), outcome);
    }

    pub fn outcome(&self, url: &str) -> Option<ProbeOutcome> {
        let outcomes = self.outcomes.lock().unwrap_or_else(PoisonError::into_inner);
        outcomes.get(url).cloned()
    }

    pub fn probed_count(&self) -> usize {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Fold recorded outcomes into the candidates. Unprobed candidates keep
    /// `valid = false` and no latency.
    pub fn into_resolved(self) -> HashMap<String, ChannelBucket> {
        let outcomes = self
            .outcomes
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let mut channels = self.channels;
        for bucket in channels.values_mut() {
            for cand in bucket.candidates.iter_mut() {
                if let Some(outcome) = outcomes.get(&cand.url) {
                    cand.valid = outcome.valid;
                    cand.latency = outcome.latency;
                }
            }
        }
        channels
    }
}
