//! Worker pool that drives the prober over the registry's probe targets.
//!
//! Targets are launched in order from the resume cursor with at most
//! `workers` probes in flight. Once the time budget is spent no new probe
//! starts; probes already running are allowed to finish. Launched targets
//! therefore always form a contiguous run, which keeps the cursor exact.
//!
//! Targets outside the launched slice keep the result of their latest probe
//! from earlier runs, so a resumed sweep never drops sources it already
//! confirmed live.

use crate::blacklist::BlacklistJournal;
use crate::checkpoint::RunProgress;
use crate::errors::PipelineError;
use crate::prober::{Probe, ProbeOutcome};
use crate::registry::SourceRegistry;
use chrono::Local;
use futures::{future, stream, StreamExt};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct SweepOptions {
    pub workers: usize,
    /// Wall-clock budget for launching probes; `None` runs to the end
    pub budget: Option<Duration>,
    /// Consecutive failures before a URL is journalled; 0 disables
    pub blacklist_after_failures: u32,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            workers: 32,
            budget: None,
            blacklist_after_failures: 3,
        }
    }
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub targets: usize,
    pub start: usize,
    pub launched: usize,
    /// Targets before the cursor served by a result from an earlier run
    pub carried: usize,
    pub valid: usize,
    pub invalid: usize,
    /// True when the sweep reached the end of the target list
    pub completed: bool,
    pub journalled: usize,
    /// Journal appends that failed; the run is reported as failed
    pub journal_errors: Vec<PipelineError>,
}

impl SweepReport {
    pub fn skipped(&self) -> usize {
        self.targets.saturating_sub(self.launched)
    }
}

/// Probe every pending target once, record outcomes in `registry` and move
/// the cursor in `progress`.
pub async fn run_sweep<P>(
    registry: &SourceRegistry,
    prober: &P,
    options: SweepOptions,
    progress: &mut RunProgress,
    mut journal: Option<&mut BlacklistJournal>,
) -> SweepReport
where
    P: Probe + ?Sized,
{
    let targets = registry.probe_targets();
    let start = progress.start_index(targets.len());
    let deadline = options.budget.map(|b| Instant::now() + b);
    let workers = options.workers.max(1);

    info!(
        targets = targets.len(),
        start,
        workers,
        budget_secs = options.budget.map(|b| b.as_secs_f64()),
        "starting validation sweep"
    );

    // Fresh probes below overwrite whatever is carried here
    progress.retain_confirmed(|url| registry.is_target(url));
    let mut carried = 0;
    for url in &targets[..start] {
        if let Some(latency) = progress.confirmed(url) {
            registry.record(url, ProbeOutcome::valid(latency));
            carried += 1;
        }
    }
    for url in &targets[start..] {
        if let Some(latency) = progress.confirmed(url) {
            registry.record(url, ProbeOutcome::valid(latency));
        }
    }

    let mut results: Vec<(usize, ProbeOutcome)> = stream::iter(targets[start..].iter().enumerate())
        .take_while(|_| future::ready(deadline.map_or(true, |d| Instant::now() < d)))
        .map(|(offset, url)| async move {
            let outcome = prober.probe(url).await;
            match &outcome.failure {
                Some(failure) => debug!(url = %url, reason = %failure, "probe failed"),
                None => debug!(url = %url, latency_ms = ?outcome.latency.map(|l| l.as_millis()), "probe ok"),
            }
            registry.record(url, outcome.clone());
            (offset, outcome)
        })
        .buffer_unordered(workers)
        .collect()
        .await;
    results.sort_by_key(|(offset, _)| *offset);

    let mut report = SweepReport {
        targets: targets.len(),
        start,
        launched: results.len(),
        carried,
        ..SweepReport::default()
    };

    let now = Local::now();
    for (offset, outcome) in &results {
        let url = &targets[start + offset];
        let failure = match &outcome.failure {
            None if outcome.valid => {
                report.valid += 1;
                progress.note_success(url);
                if let Some(latency) = outcome.latency {
                    progress.confirm(url, latency);
                }
                continue;
            }
            Some(failure) => failure,
            None => {
                report.invalid += 1;
                progress.forget_confirmed(url);
                continue;
            }
        };
        report.invalid += 1;
        progress.forget_confirmed(url);

        let strikes = progress.note_failure(url);
        if options.blacklist_after_failures == 0 || strikes < options.blacklist_after_failures {
            continue;
        }
        let Some(journal) = journal.as_deref_mut() else {
            continue;
        };
        match journal.append(url, failure, now) {
            Ok(true) => {
                report.journalled += 1;
                progress.note_success(url);
            }
            Ok(false) => {}
            Err(e) => {
                warn!(url = %url, error = %e, "failed to journal dead source");
                report.journal_errors.push(e);
            }
        }
    }

    let end = start + report.launched;
    report.completed = end >= targets.len();
    progress.advance_to(end, targets.len(), now);

    if report.completed {
        info!(
            launched = report.launched,
            valid = report.valid,
            invalid = report.invalid,
            "validation sweep complete"
        );
    } else {
        info!(
            launched = report.launched,
            valid = report.valid,
            invalid = report.invalid,
            resume_at = end,
            "time budget exhausted, sweep will resume next run"
        );
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProbeFailure;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        calls: AtomicUsize,
        delay: Duration,
    }

    impl Scripted {
        fn new(delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay,
            }
        }
    }

    #[async_trait]
    impl Probe for Scripted {
        async fn probe(&self, url: &str) -> ProbeOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if url.contains("dead") {
                ProbeOutcome::invalid(ProbeFailure::Status(404))
            } else {
                ProbeOutcome::valid(Duration::from_millis(url.len() as u64))
            }
        }
    }

    fn registry(urls: &[&str]) -> SourceRegistry {
        let mut reg = SourceRegistry::new(10);
        for url in urls {
            reg.register("CCTV1", "央视频道", url);
        }
        reg
    }

    #[tokio::test]
    async fn test_full_sweep_wraps_cursor() {
        let reg = registry(&["http://a/1", "http://dead/2", "http://c/3"]);
        let prober = Scripted::new(Duration::ZERO);
        let mut progress = RunProgress::default();

        let report = run_sweep(&reg, &prober, SweepOptions::default(), &mut progress, None).await;

        assert!(report.completed);
        assert_eq!((report.valid, report.invalid), (2, 1));
        assert_eq!(progress.last_processed_index, 0);
        assert_eq!(reg.probed_count(), 3);
        assert_eq!(progress.failure_counts.get("http://dead/2"), Some(&1));
    }

    #[tokio::test]
    async fn test_shared_url_probed_once() {
        let mut reg = SourceRegistry::new(10);
        reg.register("CCTV1", "央视频道", "http://shared/1");
        reg.register("CCTV1综合", "央视频道", "http://shared/1");
        let prober = Scripted::new(Duration::ZERO);
        let mut progress = RunProgress::default();

        run_sweep(&reg, &prober, SweepOptions::default(), &mut progress, None).await;
        assert_eq!(prober.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_budget_launches_nothing_and_keeps_cursor() {
        let reg = registry(&["http://a/1", "http://b/2"]);
        let prober = Scripted::new(Duration::ZERO);
        let mut progress = RunProgress {
            last_processed_index: 1,
            ..RunProgress::default()
        };
        let options = SweepOptions {
            budget: Some(Duration::ZERO),
            ..SweepOptions::default()
        };

        let report = run_sweep(&reg, &prober, options, &mut progress, None).await;
        assert_eq!(report.launched, 0);
        assert!(!report.completed);
        assert_eq!(report.skipped(), 2);
        assert_eq!(progress.last_processed_index, 1);
    }

    #[tokio::test]
    async fn test_budget_cut_resumes_where_it_stopped() {
        let urls: Vec<String> = (0..6).map(|i| format!("http://h/{i}")).collect();
        let refs: Vec<&str> = urls.iter().map(String::as_str).collect();
        let reg = registry(&refs);
        let prober = Scripted::new(Duration::from_millis(150));
        let mut progress = RunProgress::default();
        let options = SweepOptions {
            workers: 1,
            budget: Some(Duration::from_millis(200)),
            ..SweepOptions::default()
        };

        let first = run_sweep(&reg, &prober, options, &mut progress, None).await;
        assert!(!first.completed);
        assert!(first.launched >= 1 && first.launched < 6);
        assert_eq!(progress.last_processed_index, first.launched);

        let rest = SweepOptions {
            workers: 4,
            budget: None,
            ..options
        };
        let second = run_sweep(&reg, &prober, rest, &mut progress, None).await;
        assert!(second.completed);
        assert_eq!(first.launched + second.launched, 6);
        assert_eq!(progress.last_processed_index, 0);
    }

    #[tokio::test]
    async fn test_resumed_sweep_keeps_earlier_live_results() {
        let urls: Vec<String> = (0..4).map(|i| format!("http://h/{i}")).collect();
        let refs: Vec<&str> = urls.iter().map(String::as_str).collect();
        let prober = Scripted::new(Duration::ZERO);
        let mut progress = RunProgress::default();
        progress.confirm("http://h/0", Duration::from_millis(40));
        progress.confirm("http://h/1", Duration::from_millis(50));
        progress.confirm("http://gone/9", Duration::from_millis(10));
        progress.last_processed_index = 2;

        // A fresh registry, as built by the next run
        let reg = registry(&refs);
        let report = run_sweep(&reg, &prober, SweepOptions::default(), &mut progress, None).await;

        assert_eq!(report.launched, 2);
        assert_eq!(report.carried, 2);
        assert_eq!(prober.calls.load(Ordering::SeqCst), 2);
        let carried = reg.outcome("http://h/1").map(|o| (o.valid, o.latency));
        assert_eq!(carried, Some((true, Some(Duration::from_millis(50)))));
        assert!(reg.outcome("http://h/3").is_some_and(|o| o.valid));
        assert_eq!(progress.confirmed("http://gone/9"), None);
        assert_eq!(progress.confirmed("http://h/3"), Some(Duration::from_millis(10)));
    }

    #[tokio::test]
    async fn test_failed_source_loses_its_carried_result() {
        let reg = registry(&["http://dead/1"]);
        let prober = Scripted::new(Duration::ZERO);
        let mut progress = RunProgress::default();
        progress.confirm("http://dead/1", Duration::from_millis(30));

        run_sweep(&reg, &prober, SweepOptions::default(), &mut progress, None).await;
        assert_eq!(progress.confirmed("http://dead/1"), None);
        assert!(reg.outcome("http://dead/1").is_some_and(|o| !o.valid));
    }

    #[tokio::test]
    async fn test_repeat_failures_land_in_journal() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = BlacklistJournal::open(&dir.path().join("auto.txt"));
        let reg = registry(&["http://dead/1"]);
        let prober = Scripted::new(Duration::ZERO);
        let mut progress = RunProgress::default();
        let options = SweepOptions {
            blacklist_after_failures: 2,
            ..SweepOptions::default()
        };

        let first = run_sweep(&reg, &prober, options, &mut progress, Some(&mut journal)).await;
        assert_eq!(first.journalled, 0);
        let second = run_sweep(&reg, &prober, options, &mut progress, Some(&mut journal)).await;
        assert_eq!(second.journalled, 1);
        assert!(journal.contains("http://dead/1"));
        assert!(progress.failure_counts.is_empty());
    }
}
