use crate::config::{AppConfig, RewriteRule};
use crate::dictionary::CorrectionMap;
use regex::Regex;
use std::sync::Arc;
use tracing::warn;

/// Upper bound on normalization passes; stops rule sets that cycle
const MAX_PASSES: usize = 8;

/// Script-variant canonicalization (e.g. traditional → simplified).
///
/// Returning `None` means the converter could not handle the text; the
/// normalizer then keeps the input unchanged.
pub trait ScriptConverter: Send + Sync {
    fn convert(&self, text: &str) -> Option<String>;
}

/// Converter used when no conversion tables are installed
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl ScriptConverter for Passthrough {
    fn convert(&self, text: &str) -> Option<String> {
        Some(text.to_string())
    }
}

/// Character-for-character table, enough for small alias sets
#[derive(Debug, Default, Clone)]
pub struct CharTable {
    pairs: std::collections::HashMap<char, char>,
}

impl CharTable {
    pub fn new<I: IntoIterator<Item = (char, char)>>(pairs: I) -> Self {
        Self {
            pairs: pairs.into_iter().collect(),
        }
    }
}

impl ScriptConverter for CharTable {
    fn convert(&self, text: &str) -> Option<String> {
        Some(
            text.chars()
                .map(|c| *self.pairs.get(&c).unwrap_or(&c))
                .collect(),
        )
    }
}

#[derive(Debug, Clone)]
enum Rewrite {
    Literal { from: String, to: String },
    Pattern { re: Regex, to: String },
}

impl Rewrite {
    fn apply(&self, name: &str) -> String {
        match self {
            Rewrite::Literal { from, to } => name.replace(from.as_str(), to),
            Rewrite::Pattern { re, to } => re.replace_all(name, to.as_str()).into_owned(),
        }
    }
}

/// Canonicalizes raw channel labels into channel names
#[derive(Clone)]
pub struct NameNormalizer {
    removal_list: Vec<String>,
    rewrites: Vec<Rewrite>,
    converter: Arc<dyn ScriptConverter>,
    corrections: CorrectionMap,
}

impl std::fmt::Debug for NameNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameNormalizer")
            .field("removal_list", &self.removal_list)
            .field("rewrites", &self.rewrites)
            .field("corrections", &self.corrections.len())
            .finish()
    }
}

impl NameNormalizer {
    /// Rules with an invalid regex are skipped with a warning
    pub fn new(removal_list: Vec<String>, rules: &[RewriteRule], corrections: CorrectionMap) -> Self {
        let rewrites = rules
            .iter()
            .filter_map(|rule| {
                if rule.regex {
                    match Regex::new(&rule.pattern) {
                        Ok(re) => Some(Rewrite::Pattern {
                            re,
                            to: rule.replacement.clone(),
                        }),
                        Err(e) => {
                            warn!(pattern = %rule.pattern, error = %e, "skipping invalid rewrite rule");
                            None
                        }
                    }
                } else if rule.pattern.is_empty() {
                    None
                } else {
                    Some(Rewrite::Literal {
                        from: rule.pattern.clone(),
                        to: rule.replacement.clone(),
                    })
                }
            })
            .collect();

        Self {
            removal_list: removal_list.into_iter().filter(|s| !s.is_empty()).collect(),
            rewrites,
            converter: Arc::new(Passthrough),
            corrections,
        }
    }

    pub fn from_config(config: &AppConfig, corrections: CorrectionMap) -> Self {
        Self::new(config.removal_list.clone(), &config.rewrites, corrections)
    }

    pub fn with_converter(mut self, converter: Arc<dyn ScriptConverter>) -> Self {
        self.converter = converter;
        self
    }

    /// Script conversion, decoration stripping, rewrites, then correction,
    /// repeated until the name stops changing. `normalize(normalize(x))`
    /// equals `normalize(x)` unless the rules cycle, in which case the
    /// result after `MAX_PASSES` is returned.
    pub fn normalize(&self, raw: &str) -> String {
        let mut name = self.pass(raw);
        for _ in 1..MAX_PASSES {
            let next = self.pass(&name);
            if next == name {
                break;
            }
            name = next;
        }
        name
    }

    fn pass(&self, raw: &str) -> String {
        let mut name = self
            .converter
            .convert(raw)
            .unwrap_or_else(|| raw.to_string());

        for item in &self.removal_list {
            name = name.replace(item.as_str(), "");
        }

        for rewrite in &self.rewrites {
            name = rewrite.apply(&name);
        }

        let name = name.trim();
        match self.corrections.lookup(name) {
            Some(canonical) => canonical.trim().to_string(),
            None => name.to_string(),
        }
    }
}
