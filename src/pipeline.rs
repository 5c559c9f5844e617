//! One aggregation run: ingest sources, validate, rank, emit.

use crate::blacklist::BlacklistJournal;
use crate::checkpoint::RunProgress;
use crate::classifier::{Classifier, FilterStats};
use crate::config::AppConfig;
use crate::dictionary::{Category, Dictionaries};
use crate::emitter::{EmitOptions, Emitted, Emitter};
use crate::errors::PipelineError;
use crate::normalizer::{NameNormalizer, ScriptConverter};
use crate::output::write_atomic;
use crate::parser::parse_entries;
use crate::prober::Probe;
use crate::ranker::{RankedRegistry, SourceRanker};
use crate::registry::SourceRegistry;
use crate::sweep::{run_sweep, SweepOptions, SweepReport};
use chrono::Local;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

const STAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Counts for one ingested source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub parsed: usize,
    pub malformed: usize,
    pub accepted: usize,
}

/// Summary of a finished run
#[derive(Debug, Default)]
pub struct RunReport {
    pub sources: usize,
    pub parsed: usize,
    pub malformed: usize,
    pub filter: FilterStats,
    pub sweep: SweepReport,
    pub channels: usize,
    pub kept_sources: usize,
    /// Emitted channels per category
    pub per_category: BTreeMap<String, usize>,
}

pub struct PipelineRun {
    config: AppConfig,
    dicts: Dictionaries,
    normalizer: NameNormalizer,
    registry: SourceRegistry,
    filter: FilterStats,
    sources: usize,
    parsed: usize,
    malformed: usize,
}

impl PipelineRun {
    pub fn new(config: AppConfig) -> Self {
        let dicts = Dictionaries::load(&config);
        Self::with_dictionaries(config, dicts)
    }

    pub fn with_dictionaries(config: AppConfig, dicts: Dictionaries) -> Self {
        let normalizer = NameNormalizer::from_config(&config, dicts.corrections.clone());
        let registry = SourceRegistry::new(config.cap);
        Self {
            config,
            dicts,
            normalizer,
            registry,
            filter: FilterStats::default(),
            sources: 0,
            parsed: 0,
            malformed: 0,
        }
    }

    pub fn with_converter(mut self, converter: Arc<dyn ScriptConverter>) -> Self {
        self.normalizer = self.normalizer.with_converter(converter);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn filter_stats(&self) -> &FilterStats {
        &self.filter
    }

    /// Parse, normalize, classify and register every entry of one source.
    /// Sources are ingested in the order given; that order decides ties.
    pub fn ingest(&mut self, source: &str) -> IngestStats {
        let classifier = Classifier::new(&self.dicts, &self.config);
        let mut stats = IngestStats::default();
        let mut entries = parse_entries(source);

        for raw in entries.by_ref() {
            stats.parsed += 1;
            let channel = self.normalizer.normalize(&raw.name);
            if channel.is_empty() {
                stats.malformed += 1;
                continue;
            }

            let result = classifier.classify(&channel, &raw.url, &self.registry);
            match &result {
                Ok(accepted) => {
                    self.registry
                        .register(&accepted.channel, &accepted.category, &raw.url);
                    stats.accepted += 1;
                }
                Err(reason) => debug!(channel = %channel, url = %raw.url, %reason, "entry rejected"),
            }
            self.filter.record(&result);
        }
        stats.malformed += entries.dropped();

        self.sources += 1;
        self.parsed += stats.parsed;
        self.malformed += stats.malformed;
        info!(
            format = ?entries.format(),
            parsed = stats.parsed,
            accepted = stats.accepted,
            malformed = stats.malformed,
            "source ingested"
        );
        stats
    }

    /// Probe pending targets within the configured time budget
    pub async fn validate<P>(
        &self,
        prober: &P,
        progress: &mut RunProgress,
        journal: Option<&mut BlacklistJournal>,
    ) -> SweepReport
    where
        P: Probe + ?Sized,
    {
        let options = SweepOptions {
            workers: self.config.workers,
            budget: self.config.max_run_time(),
            blacklist_after_failures: self.config.blacklist_after_failures,
        };
        run_sweep(&self.registry, prober, options, progress, journal).await
    }

    /// Consume the registry into ranked per-channel lists
    pub fn finish(self) -> FinishedRun {
        let ranker = SourceRanker::new(self.config.cap).with_whitelist(&self.dicts.whitelist);
        let ranked = RankedRegistry::from_resolved(self.registry.into_resolved(), &ranker);

        let per_category = ranked
            .categories()
            .into_iter()
            .map(|name| (name.to_string(), ranked.channels_in(name).len()))
            .collect();

        let report = RunReport {
            sources: self.sources,
            parsed: self.parsed,
            malformed: self.malformed,
            filter: self.filter,
            channels: ranked.len(),
            kept_sources: ranked.source_count(),
            per_category,
            ..RunReport::default()
        };

        FinishedRun {
            config: self.config,
            categories: self.dicts.categories,
            ranked,
            report,
        }
    }
}

pub struct FinishedRun {
    config: AppConfig,
    categories: Vec<Category>,
    ranked: RankedRegistry,
    report: RunReport,
}

impl FinishedRun {
    pub fn ranked(&self) -> &RankedRegistry {
        &self.ranked
    }

    /// Render both playlists. `timestamp` feeds the optional update stamp.
    pub fn emit(&self, timestamp: Option<String>) -> Emitted {
        let options = EmitOptions::from_config(&self.config, timestamp);
        Emitter::new(&self.categories, options).emit(&self.ranked)
    }

    /// Replace the text playlist, then the M3U playlist
    pub fn write(&self, emitted: &Emitted) -> Result<(), PipelineError> {
        write_atomic(&self.config.output_text, emitted.text.as_bytes())?;
        write_atomic(&self.config.output_m3u, emitted.m3u.as_bytes())?;
        info!(
            text = %self.config.output_text.display(),
            m3u = %self.config.output_m3u.display(),
            channels = self.ranked.len(),
            sources = self.ranked.source_count(),
            "playlists written"
        );
        Ok(())
    }

    pub fn into_report(self) -> RunReport {
        self.report
    }
}

/// Run the whole pipeline over already-loaded source bodies.
///
/// The progress file is only advanced once both playlists are in place, so
/// a failed write repeats the same slice of targets next time.
pub async fn run<P>(
    config: AppConfig,
    sources: &[String],
    prober: &P,
) -> Result<RunReport, PipelineError>
where
    P: Probe + ?Sized,
{
    let mut progress = RunProgress::load(&config.progress_file);
    let mut journal = config.auto_blacklist.as_deref().map(BlacklistJournal::open);
    let progress_path = config.progress_file.clone();

    let mut pipeline = PipelineRun::new(config);
    for body in sources {
        pipeline.ingest(body);
    }
    info!(
        channels = pipeline.registry().channel_count(),
        candidates = pipeline.registry().candidate_count(),
        targets = pipeline.registry().probe_targets().len(),
        rejected = pipeline.filter_stats().rejected_total(),
        "ingest complete"
    );

    let sweep = pipeline
        .validate(prober, &mut progress, journal.as_mut())
        .await;

    let finished = pipeline.finish();
    let emitted = finished.emit(Some(Local::now().format(STAMP_FORMAT).to_string()));
    finished.write(&emitted)?;
    progress.save(&progress_path)?;

    let mut report = finished.into_report();
    report.sweep = sweep;
    if let Some(err) = report.sweep.journal_errors.drain(..).next() {
        return Err(err);
    }
    Ok(report)
}
