//! Aggregator/Emitter: renders the ranked registry as a flat text playlist
//! and as M3U. Pure: the same registry always renders the same bytes.

use crate::config::AppConfig;
use crate::dictionary::Category;
use crate::ranker::RankedRegistry;

const GENRE_MARKER: &str = "#genre#";
const STAMP_CATEGORY: &str = "更新时间";

/// One `<Category>,#genre#` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub category: String,
    pub rows: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emitted {
    pub text: String,
    pub m3u: String,
}

#[derive(Debug, Clone, Default)]
pub struct EmitOptions {
    /// `{name}` is replaced by the channel name
    pub logo_template: String,
    pub epg_url: Option<String>,
    /// `(timestamp, url)` for a leading update-time section
    pub stamp: Option<(String, String)>,
}

impl EmitOptions {
    pub fn from_config(config: &AppConfig, timestamp: Option<String>) -> Self {
        Self {
            logo_template: config.logo_template.clone(),
            epg_url: config.epg_url.clone(),
            stamp: match (timestamp, config.update_stamp.clone()) {
                (Some(ts), Some(url)) => Some((ts, url)),
                _ => None,
            },
        }
    }

    pub fn logo_url(&self, channel: &str) -> String {
        self.logo_template.replace("{name}", channel)
    }
}

pub struct Emitter<'a> {
    categories: &'a [Category],
    options: EmitOptions,
}

impl<'a> Emitter<'a> {
    pub fn new(categories: &'a [Category], options: EmitOptions) -> Self {
        Self {
            categories,
            options,
        }
    }

    /// Declared categories first, in order, with channels in dictionary
    /// order (names not in the dictionary follow, in discovery order).
    /// Categories the configuration does not declare come last.
    pub fn sections(&self, registry: &RankedRegistry) -> Vec<Section> {
        let mut sections = Vec::new();

        if let Some((ts, url)) = &self.options.stamp {
            sections.push(Section {
                category: STAMP_CATEGORY.to_string(),
                rows: vec![(ts.clone(), url.clone())],
            });
        }

        for cat in self.categories {
            let mut channels = registry.channels_in(&cat.name);
            channels.sort_by_key(|c| (cat.position(&c.name).unwrap_or(usize::MAX), c.first_seen));
            push_section(&mut sections, &cat.name, channels);
        }

        for name in registry.categories() {
            if self.categories.iter().any(|c| c.name == name) {
                continue;
            }
            push_section(&mut sections, name, registry.channels_in(name));
        }

        sections
    }

    pub fn emit(&self, registry: &RankedRegistry) -> Emitted {
        let sections = self.sections(registry);
        Emitted {
            text: render_text(&sections),
            m3u: render_m3u(&sections, &self.options),
        }
    }
}

fn push_section(
    sections: &mut Vec<Section>,
    category: &str,
    channels: Vec<&crate::ranker::RankedChannel>,
) {
    let rows: Vec<(String, String)> = channels
        .into_iter()
        .flat_map(|ch| {
            ch.sources
                .iter()
                .map(move |s| (ch.name.clone(), s.url.clone()))
        })
        .collect();
    if !rows.is_empty() {
        sections.push(Section {
            category: category.to_string(),
            rows,
        });
    }
}

pub fn render_text(sections: &[Section]) -> String {
    let mut out = String::new();
    for (i, section) in sections.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format!("{},{}\n", section.category, GENRE_MARKER));
        for (name, url) in &section.rows {
            out.push_str(&format!("{name},{url}\n"));
        }
    }
    out
}

/// Make `value` safe inside a double-quoted `#EXTINF` attribute
fn attr(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '"' => '\'',
            '\r' | '\n' => ' ',
            c => c,
        })
        .collect()
}

pub fn render_m3u(sections: &[Section], options: &EmitOptions) -> String {
    let mut out = match &options.epg_url {
        Some(epg) => format!("#EXTM3U x-tvg-url=\"{}\"\n", attr(epg)),
        None => "#EXTM3U\n".to_string(),
    };
    for section in sections {
        for (name, url) in &section.rows {
            out.push_str(&format!(
                "#EXTINF:-1 tvg-name=\"{}\" tvg-logo=\"{}\" group-title=\"{}\",{name}\n{url}\n",
                attr(name),
                attr(&options.logo_url(name)),
                attr(&section.category)
            ));
        }
    }
    out
}

/// Read a flat text playlist back into sections; `#genre#` lines open a
/// section, rows before the first header land in an unnamed one.
pub fn parse_sections(text: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some((left, right)) = line.split_once(',') else {
            continue;
        };
        if right.trim() == GENRE_MARKER {
            sections.push(Section {
                category: left.trim().to_string(),
                rows: Vec::new(),
            });
            continue;
        }
        if !right.contains("://") {
            continue;
        }
        if sections.is_empty() {
            sections.push(Section {
                category: String::new(),
                rows: Vec::new(),
            });
        }
        if let Some(current) = sections.last_mut() {
            current.rows.push((left.trim().to_string(), right.trim().to_string()));
        }
    }
    sections
}

/// Derive an M3U playlist from a flat text playlist
pub fn text_to_m3u(text: &str, options: &EmitOptions) -> String {
    render_m3u(&parse_sections(text), options)
}
