//! Source Ranker: keeps the fastest valid sources of each channel.

use crate::dictionary::UrlList;
use crate::registry::{CandidateSource, ChannelBucket};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SourceRanker<'a> {
    cap: usize,
    whitelist: Option<&'a UrlList>,
}

impl<'a> SourceRanker<'a> {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            whitelist: None,
        }
    }

    /// Exact whitelist matches are kept even past the cap
    pub fn with_whitelist(mut self, whitelist: &'a UrlList) -> Self {
        self.whitelist = Some(whitelist);
        self
    }

    fn is_whitelisted(&self, url: &str) -> bool {
        self.whitelist
            .map(|w| w.contains_exact(url))
            .unwrap_or(false)
    }

    /// Invalid or unprobed results are discarded; the rest are ordered by
    /// ascending latency, ties by discovery order, and truncated to the cap.
    pub fn rank(&self, results: &[CandidateSource]) -> Vec<CandidateSource> {
        let mut valid: Vec<&CandidateSource> = results
            .iter()
            .filter(|c| c.valid && c.latency.is_some())
            .collect();
        valid.sort_by_key(|c| (c.latency.unwrap_or(Duration::MAX), c.discovery));

        let mut kept = Vec::with_capacity(valid.len().min(self.cap));
        let mut regular = 0;
        for cand in valid {
            if regular < self.cap {
                regular += 1;
                kept.push(cand.clone());
            } else if self.is_whitelisted(&cand.url) {
                kept.push(cand.clone());
            }
        }
        kept
    }

    pub fn rank_urls(&self, results: &[CandidateSource]) -> Vec<String> {
        self.rank(results).into_iter().map(|c| c.url).collect()
    }
}

#[derive(Debug, Clone)]
pub struct RankedChannel {
    pub name: String,
    pub category: String,
    pub first_seen: usize,
    pub sources: Vec<CandidateSource>,
}

/// Final per-channel source lists. Channels left without a valid source
/// are absent.
#[derive(Debug, Clone, Default)]
pub struct RankedRegistry {
    channels: HashMap<String, RankedChannel>,
}

impl RankedRegistry {
    pub fn from_resolved(resolved: HashMap<String, ChannelBucket>, ranker: &SourceRanker<'_>) -> Self {
        let channels = resolved
            .into_iter()
            .filter_map(|(name, bucket)| {
                let sources = ranker.rank(&bucket.candidates);
                if sources.is_empty() {
                    return None;
                }
                Some((
                    name.clone(),
                    RankedChannel {
                        name,
                        category: bucket.category,
                        first_seen: bucket.first_seen,
                        sources,
                    },
                ))
            })
            .collect();
        Self { channels }
    }

    pub fn get(&self, channel: &str) -> Option<&RankedChannel> {
        self.channels.get(channel)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Channels of one category in discovery order
    pub fn channels_in(&self, category: &str) -> Vec<&RankedChannel> {
        let mut found: Vec<_> = self
            .channels
            .values()
            .filter(|c| c.category == category)
            .collect();
        found.sort_by_key(|c| c.first_seen);
        found
    }

    /// Every category present, ordered by its earliest channel
    pub fn categories(&self) -> Vec<&str> {
        let mut firsts: HashMap<&str, usize> = HashMap::new();
        for ch in self.channels.values() {
            let entry = firsts.entry(ch.category.as_str()).or_insert(ch.first_seen);
            *entry = (*entry).min(ch.first_seen);
        }
        let mut cats: Vec<_> = firsts.into_iter().collect();
        cats.sort_by_key(|&(_, first)| first);
        cats.into_iter().map(|(name, _)| name).collect()
    }

    pub fn source_count(&self) -> usize {
        self.channels.values().map(|c| c.sources.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(url: &str, discovery: usize, latency_ms: Option<u64>, valid: bool) -> CandidateSource {
        CandidateSource {
            url: url.to_string(),
            channel: "CCTV1".to_string(),
            discovery,
            latency: latency_ms.map(Duration::from_millis),
            valid,
        }
    }

    #[test]
    fn test_orders_by_latency_and_drops_invalid() {
        let results = vec![
            cand("http://a/1", 0, Some(400), true),
            cand("http://dead/1", 1, None, false),
            cand("http://b/2", 2, Some(100), true),
        ];
        assert_eq!(
            SourceRanker::new(10).rank_urls(&results),
            vec!["http://b/2".to_string(), "http://a/1".to_string()]
        );
    }

    #[test]
    fn test_ties_keep_discovery_order() {
        let results = vec![
            cand("http://late/1", 5, Some(200), true),
            cand("http://early/1", 1, Some(200), true),
            cand("http://fast/1", 9, Some(50), true),
        ];
        assert_eq!(
            SourceRanker::new(10).rank_urls(&results),
            vec!["http://fast/1", "http://early/1", "http://late/1"]
        );
    }

    #[test]
    fn test_truncates_to_cap_unless_whitelisted() {
        let results: Vec<_> = (0..5)
            .map(|i| cand(&format!("http://h/{i}"), i, Some(10 * (i as u64 + 1)), true))
            .collect();
        assert_eq!(SourceRanker::new(2).rank(&results).len(), 2);

        let whitelist = UrlList::from_lines(["keep,http://h/4"]);
        let ranked = SourceRanker::new(2).with_whitelist(&whitelist).rank_urls(&results);
        assert_eq!(ranked, vec!["http://h/0", "http://h/1", "http://h/4"]);
    }

    #[test]
    fn test_channels_without_valid_sources_are_absent() {
        let mut resolved = HashMap::new();
        resolved.insert(
            "CCTV1".to_string(),
            ChannelBucket {
                category: "央视频道".into(),
                first_seen: 0,
                candidates: vec![cand("http://dead/1", 0, None, false)],
            },
        );
        let ranked = RankedRegistry::from_resolved(resolved, &SourceRanker::new(10));
        assert!(ranked.is_empty());
    }
}
