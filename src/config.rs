use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Priority class of a category group during classification
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKind {
    /// Checked first ("live in country" style groups)
    Special,
    #[default]
    General,
    Region,
    /// Target of the region → satellite tie-break
    Satellite,
}

impl CategoryKind {
    /// Lower ranks are tried first when assigning a category
    pub fn priority(&self) -> u8 {
        match self {
            CategoryKind::Special => 0,
            CategoryKind::General => 1,
            CategoryKind::Satellite => 1,
            CategoryKind::Region => 2,
        }
    }
}

/// One output category and the dictionary that defines its members
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct CategorySpec {
    pub name: String,
    #[serde(default)]
    pub kind: CategoryKind,
    /// One channel name per line; order is the output order
    pub dictionary: Option<PathBuf>,
    /// Substring matchers in addition to exact dictionary membership
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Ordered name rewrite; literal unless `regex` is set
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RewriteRule {
    pub pattern: String,
    pub replacement: String,
    #[serde(default)]
    pub regex: bool,
}

impl RewriteRule {
    pub fn literal(pattern: &str, replacement: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            replacement: replacement.to_string(),
            regex: false,
        }
    }
}

/// What happens to entries that match no category
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnmatchedPolicy {
    #[default]
    Drop,
    Keep,
}

fn default_satellite_keywords() -> Vec<String> {
    vec!["卫视".to_string()]
}

fn default_removal_list() -> Vec<String> {
    [
        "「IPV4」", "「IPV6」", "[ipv6]", "[ipv4]", "_电信", "电信", "（HD）", "[超清]", "高清",
        "超清", "-HD", "(HK)", "AKtv", "@", "IPV6", "🎞️", "🎦", " ", "[BD]", "[VGA]", "[HD]",
        "[SD]", "(1080p)", "(720p)", "(480p)",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_rewrites() -> Vec<RewriteRule> {
    vec![
        RewriteRule::literal("CCTV-", "CCTV"),
        RewriteRule::literal("CCTV0", "CCTV"),
        RewriteRule::literal("PLUS", "+"),
        RewriteRule::literal("NewTV-", "NewTV"),
        RewriteRule::literal("iHOT-", "iHOT"),
        RewriteRule::literal("NEW", "New"),
        RewriteRule::literal("New_", "New"),
    ]
}

fn default_unmatched_category() -> String {
    "其他".to_string()
}

fn default_blacklist_after_failures() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_cap() -> usize {
    10
}

fn default_workers() -> usize {
    32
}

fn default_timeout_secs() -> f64 {
    3.0
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string()
}

fn default_content_types() -> Vec<String> {
    [
        "video",
        "audio",
        "application/octet-stream",
        "application/vnd.apple.mpegurl",
        "application/x-mpegurl",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_output_text() -> PathBuf {
    PathBuf::from("live.txt")
}

fn default_output_m3u() -> PathBuf {
    PathBuf::from("live.m3u")
}

fn default_progress_file() -> PathBuf {
    PathBuf::from("progress.json")
}

fn default_logo_template() -> String {
    "https://epg.112114.xyz/logo/{name}.png".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    /// Playlist locations, file paths or http(s) URLs, in ingest order
    #[serde(default)]
    pub sources: Vec<String>,
    /// Declared output order
    #[serde(default)]
    pub categories: Vec<CategorySpec>,
    #[serde(default = "default_satellite_keywords")]
    pub satellite_keywords: Vec<String>,
    #[serde(default)]
    pub corrections: Option<PathBuf>,
    #[serde(default)]
    pub blacklists: Vec<PathBuf>,
    #[serde(default)]
    pub whitelists: Vec<PathBuf>,
    #[serde(default)]
    pub auto_blacklist: Option<PathBuf>,
    #[serde(default = "default_blacklist_after_failures")]
    pub blacklist_after_failures: u32,

    #[serde(default = "default_removal_list")]
    pub removal_list: Vec<String>,
    #[serde(default = "default_rewrites")]
    pub rewrites: Vec<RewriteRule>,

    #[serde(default)]
    pub unmatched: UnmatchedPolicy,
    #[serde(default = "default_unmatched_category")]
    pub unmatched_category: String,
    #[serde(default = "default_true")]
    pub reject_loopback: bool,

    #[serde(default = "default_cap")]
    pub cap: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_timeout_secs")]
    pub probe_timeout_secs: f64,
    #[serde(default = "default_timeout_secs")]
    pub http_timeout_secs: f64,
    #[serde(default)]
    pub max_run_secs: Option<u64>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_true")]
    pub accept_invalid_certs: bool,
    #[serde(default = "default_content_types")]
    pub content_types: Vec<String>,

    #[serde(default = "default_output_text")]
    pub output_text: PathBuf,
    #[serde(default = "default_output_m3u")]
    pub output_m3u: PathBuf,
    #[serde(default = "default_progress_file")]
    pub progress_file: PathBuf,
    #[serde(default = "default_logo_template")]
    pub logo_template: String,
    #[serde(default)]
    pub epg_url: Option<String>,
    #[serde(default)]
    pub update_stamp: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            categories: Vec::new(),
            satellite_keywords: default_satellite_keywords(),
            corrections: None,
            blacklists: Vec::new(),
            whitelists: Vec::new(),
            auto_blacklist: None,
            blacklist_after_failures: default_blacklist_after_failures(),
            removal_list: default_removal_list(),
            rewrites: default_rewrites(),
            unmatched: UnmatchedPolicy::default(),
            unmatched_category: default_unmatched_category(),
            reject_loopback: true,
            cap: default_cap(),
            workers: default_workers(),
            probe_timeout_secs: default_timeout_secs(),
            http_timeout_secs: default_timeout_secs(),
            max_run_secs: None,
            user_agent: default_user_agent(),
            accept_invalid_certs: true,
            content_types: default_content_types(),
            output_text: default_output_text(),
            output_m3u: default_output_m3u(),
            progress_file: default_progress_file(),
            logo_template: default_logo_template(),
            epg_url: None,
            update_stamp: None,
        }
    }
}

impl AppConfig {
    /// Default location: `<config_dir>/config.json`
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "iptv", "iptv-aggregator")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Load from `path`, or from the default location when `None`.
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, anyhow::Error> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => return Ok(AppConfig::default()),
            },
        };

        if !path.exists() {
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&path)?;
        let mut config: AppConfig = serde_json::from_str(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), anyhow::Error> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Dictionary and list paths in a config file are relative to that file
    pub fn resolve_relative_to(&mut self, base: &Path) {
        let fix = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };

        for cat in self.categories.iter_mut() {
            if let Some(dict) = cat.dictionary.as_mut() {
                fix(dict);
            }
        }
        if let Some(c) = self.corrections.as_mut() {
            fix(c);
        }
        self.blacklists.iter_mut().for_each(fix);
        self.whitelists.iter_mut().for_each(fix);
        if let Some(a) = self.auto_blacklist.as_mut() {
            fix(a);
        }
        for source in self.sources.iter_mut() {
            let remote = source.starts_with("http://") || source.starts_with("https://");
            if !remote && Path::new(source.as_str()).is_relative() {
                *source = base.join(source.as_str()).display().to_string();
            }
        }
    }

    /// Point every output artefact into `dir`
    pub fn set_output_dir(&mut self, dir: &Path) {
        let rebase = |p: &PathBuf| -> PathBuf {
            match p.file_name() {
                Some(name) => dir.join(name),
                None => p.clone(),
            }
        };
        self.output_text = rebase(&self.output_text);
        self.output_m3u = rebase(&self.output_m3u);
        self.progress_file = rebase(&self.progress_file);
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.probe_timeout_secs.max(0.1))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.http_timeout_secs.max(0.1))
    }

    pub fn max_run_time(&self) -> Option<Duration> {
        self.max_run_secs.map(Duration::from_secs)
    }
}
