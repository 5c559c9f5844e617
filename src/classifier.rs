//! Category assignment and entry filtering ahead of probing.

use crate::config::{AppConfig, CategoryKind, UnmatchedPolicy};
use crate::dictionary::Dictionaries;
use crate::errors::Rejection;
use crate::registry::SourceRegistry;
use std::collections::BTreeMap;

/// An entry that passed every filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub channel: String,
    pub category: String,
}

pub struct Classifier<'d> {
    dicts: &'d Dictionaries,
    /// Category indices in matching priority order
    priority: Vec<usize>,
    satellite: Option<usize>,
    policy: UnmatchedPolicy,
    unmatched_category: String,
    reject_loopback: bool,
}

impl<'d> Classifier<'d> {
    pub fn new(dicts: &'d Dictionaries, config: &AppConfig) -> Self {
        let mut priority: Vec<usize> = (0..dicts.categories.len()).collect();
        // Stable: declared order breaks ties within a priority class
        priority.sort_by_key(|&i| dicts.categories[i].kind.priority());

        let satellite = dicts
            .categories
            .iter()
            .position(|c| c.kind == CategoryKind::Satellite);

        Self {
            dicts,
            priority,
            satellite,
            policy: config.unmatched,
            unmatched_category: config.unmatched_category.clone(),
            reject_loopback: config.reject_loopback,
        }
    }

    fn is_satellite_name(&self, channel: &str) -> bool {
        self.dicts
            .satellite_keywords
            .iter()
            .any(|k| !k.is_empty() && channel.contains(k.as_str()))
    }

    /// Category for a canonical channel name, `None` when nothing matches
    pub fn categorize(&self, channel: &str) -> Option<&str> {
        for &idx in &self.priority {
            let cat = &self.dicts.categories[idx];
            if !(cat.contains(channel) || cat.matches_keyword(channel)) {
                continue;
            }
            // Regional and network-wide categories are mutually exclusive
            if cat.kind == CategoryKind::Region && self.is_satellite_name(channel) {
                if let Some(sat) = self.satellite {
                    return Some(self.dicts.categories[sat].name.as_str());
                }
            }
            return Some(cat.name.as_str());
        }

        match self.policy {
            UnmatchedPolicy::Keep => Some(self.unmatched_category.as_str()),
            UnmatchedPolicy::Drop => None,
        }
    }

    fn is_unmatched_bucket(&self, category: &str) -> bool {
        self.policy == UnmatchedPolicy::Keep
            && category == self.unmatched_category
            && self.dicts.category(category).is_none()
    }

    fn is_malformed(&self, url: &str) -> bool {
        if url.is_empty() || !url.contains("://") {
            return true;
        }
        match url::Url::parse(url) {
            Ok(parsed) => {
                self.reject_loopback
                    && matches!(parsed.host_str(), Some("127.0.0.1") | Some("localhost"))
            }
            Err(_) => true,
        }
    }

    /// Assign a category, then apply the filters in order: malformed,
    /// blacklisted, duplicate, channel full (whitelisted URLs bypass the cap).
    pub fn classify(
        &self,
        channel: &str,
        url: &str,
        registry: &SourceRegistry,
    ) -> Result<Accepted, Rejection> {
        let category = self.categorize(channel).ok_or(Rejection::Unmatched)?;

        if self.is_malformed(url) {
            return Err(Rejection::EmptyUrl);
        }

        if self.dicts.is_blacklisted(url) {
            return Err(Rejection::Blacklisted);
        }

        let duplicate = if self.is_unmatched_bucket(category) {
            registry.category_has_url(category, url)
        } else {
            registry.contains(channel, url)
        };
        if duplicate {
            return Err(Rejection::Duplicate);
        }

        if registry.accepted_count(channel) >= registry.cap()
            && !self.dicts.whitelist.contains_exact(url)
        {
            return Err(Rejection::ChannelFull);
        }

        Ok(Accepted {
            channel: channel.to_string(),
            category: category.to_string(),
        })
    }
}

/// Counts of rejected entries by reason
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub accepted: usize,
    pub rejected: BTreeMap<Rejection, usize>,
}

impl FilterStats {
    pub fn record(&mut self, result: &Result<Accepted, Rejection>) {
        match result {
            Ok(_) => self.accepted += 1,
            Err(reason) => *self.rejected.entry(*reason).or_insert(0) += 1,
        }
    }

    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }

    pub fn count(&self, reason: Rejection) -> usize {
        self.rejected.get(&reason).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::{Category, UrlList};

    fn dictionaries() -> Dictionaries {
        Dictionaries {
            categories: vec![
                Category::new("央视频道", CategoryKind::General, vec!["CCTV1".into(), "CCTV2".into()]),
                Category::new("卫视频道", CategoryKind::Satellite, vec!["湖南卫视".into()]),
                Category::new("广东频道", CategoryKind::Region, vec!["广东珠江".into()])
                    .with_keywords(vec!["广东".into()]),
                Category::new("直播中国", CategoryKind::Special, vec!["CCTV2".into()]),
            ],
            satellite_keywords: vec!["卫视".into()],
            blacklist: UrlList::from_lines(["bad,http://blocked.example"]),
            whitelist: UrlList::from_lines(["vip,http://vip.example/1"]),
            ..Default::default()
        }
    }

    #[test]
    fn test_special_group_wins_over_general() {
        let dicts = dictionaries();
        let c = Classifier::new(&dicts, &AppConfig::default());
        assert_eq!(c.categorize("CCTV2"), Some("直播中国"));
        assert_eq!(c.categorize("CCTV1"), Some("央视频道"));
    }

    #[test]
    fn test_region_keyword_with_satellite_keyword_goes_to_satellite() {
        let dicts = dictionaries();
        let c = Classifier::new(&dicts, &AppConfig::default());
        assert_eq!(c.categorize("广东珠江"), Some("广东频道"));
        assert_eq!(c.categorize("广东体育"), Some("广东频道"));
        assert_eq!(c.categorize("广东卫视"), Some("卫视频道"));
    }

    #[test]
    fn test_unmatched_policy() {
        let dicts = dictionaries();
        let drop = Classifier::new(&dicts, &AppConfig::default());
        assert_eq!(drop.categorize("Random TV"), None);

        let mut config = AppConfig::default();
        config.unmatched = UnmatchedPolicy::Keep;
        let keep = Classifier::new(&dicts, &config);
        assert_eq!(keep.categorize("Random TV"), Some("其他"));
    }

    #[test]
    fn test_filters_apply_in_order() {
        let dicts = dictionaries();
        let c = Classifier::new(&dicts, &AppConfig::default());
        let mut reg = SourceRegistry::new(1);

        assert_eq!(c.classify("Nope", "http://a/1", &reg), Err(Rejection::Unmatched));
        assert_eq!(c.classify("CCTV1", "", &reg), Err(Rejection::EmptyUrl));
        assert_eq!(c.classify("CCTV1", "http://127.0.0.1:8080/x", &reg), Err(Rejection::EmptyUrl));
        assert_eq!(
            c.classify("CCTV1", "http://blocked.example/live", &reg),
            Err(Rejection::Blacklisted)
        );

        let ok = c.classify("CCTV1", "http://a/1", &reg).unwrap();
        reg.register(&ok.channel, &ok.category, "http://a/1");

        assert_eq!(c.classify("CCTV1", "http://a/1", &reg), Err(Rejection::Duplicate));
        assert_eq!(c.classify("CCTV1", "http://a/2", &reg), Err(Rejection::ChannelFull));
        assert!(c.classify("CCTV1", "http://vip.example/1", &reg).is_ok());
    }

    #[test]
    fn test_journalled_url_does_not_block_longer_urls() {
        let mut dicts = dictionaries();
        dicts.dead_urls = UrlList::from_lines(["dead,http://h.example/live/1"]);
        let c = Classifier::new(&dicts, &AppConfig::default());
        let reg = SourceRegistry::new(10);

        assert_eq!(
            c.classify("CCTV1", "http://h.example/live/1", &reg),
            Err(Rejection::Blacklisted)
        );
        assert!(c.classify("CCTV2", "http://h.example/live/12", &reg).is_ok());
    }

    #[test]
    fn test_unmatched_bucket_dedups_by_url_only() {
        let dicts = dictionaries();
        let mut config = AppConfig::default();
        config.unmatched = UnmatchedPolicy::Keep;
        let c = Classifier::new(&dicts, &config);
        let mut reg = SourceRegistry::new(10);

        let ok = c.classify("Foo", "http://x/1", &reg).unwrap();
        reg.register(&ok.channel, &ok.category, "http://x/1");
        assert_eq!(c.classify("Bar", "http://x/1", &reg), Err(Rejection::Duplicate));
    }

    #[test]
    fn test_filter_stats() {
        let mut stats = FilterStats::default();
        stats.record(&Err(Rejection::Duplicate));
        stats.record(&Err(Rejection::Duplicate));
        stats.record(&Ok(Accepted {
            channel: "a".into(),
            category: "b".into(),
        }));
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.count(Rejection::Duplicate), 2);
        assert_eq!(stats.rejected_total(), 2);
    }
}
