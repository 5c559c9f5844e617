use std::path::PathBuf;

use anyhow::Context;
use iptv_aggregator_lib::sources::SourceLoader;
use iptv_aggregator_lib::{AppConfig, LivenessProber, ProbeSettings, RunReport};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(clap::Parser, Debug)]
#[command(version, about = "Aggregate, validate and rank IPTV playlist sources", long_about = None)]
struct Args {
    /// Playlist files or http(s) URLs; replaces the configured sources
    sources: Vec<String>,

    /// Configuration file (defaults to the per-user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for the playlists and the progress file
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Per-probe connect timeout in seconds
    #[arg(long)]
    timeout: Option<f64>,

    /// Probes in flight at once
    #[arg(short, long)]
    workers: Option<usize>,

    /// Stop launching probes after this many seconds
    #[arg(long)]
    max_run_time: Option<u64>,

    /// Sources kept per channel
    #[arg(long)]
    cap: Option<usize>,

    /// Write the effective configuration back to the config file
    #[arg(long)]
    save_config: bool,

    #[arg(short, long)]
    verbose: bool,

    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        if !self.sources.is_empty() {
            config.sources = self.sources.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.set_output_dir(dir);
        }
        if let Some(t) = self.timeout {
            config.probe_timeout_secs = t;
            config.http_timeout_secs = t;
        }
        if let Some(w) = self.workers {
            config.workers = w;
        }
        if let Some(secs) = self.max_run_time {
            config.max_run_secs = Some(secs);
        }
        if let Some(cap) = self.cap {
            config.cap = cap;
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

fn print_report(report: &RunReport) {
    println!("Sources ingested: {}", report.sources);
    println!("Entries parsed:   {} ({} malformed)", report.parsed, report.malformed);
    println!("Accepted:         {}", report.filter.accepted);
    for (reason, count) in &report.filter.rejected {
        println!("  rejected, {reason}: {count}");
    }
    println!(
        "Probed:           {} of {} ({} valid, {} invalid)",
        report.sweep.launched, report.sweep.targets, report.sweep.valid, report.sweep.invalid
    );
    if !report.sweep.completed {
        println!("Time budget exhausted; {} targets left for the next run", report.sweep.skipped());
    }
    println!("Channels emitted: {} ({} sources)", report.channels, report.kept_sources);
    for (category, count) in &report.per_category {
        println!("  {category}: {count}");
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    use clap::Parser;
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let config_path = args.config.clone().or_else(AppConfig::default_path);
    let mut config = AppConfig::load(config_path.as_deref())
        .with_context(|| format!("loading configuration {:?}", config_path))?;
    args.apply(&mut config);

    if args.save_config {
        if let Some(path) = &config_path {
            config.save(path)?;
            info!(path = %path.display(), "configuration saved");
        }
    }

    if config.sources.is_empty() {
        anyhow::bail!("no sources given; pass playlist paths or URLs, or list them in the config");
    }

    let loader = SourceLoader::new(&config.user_agent);
    let bodies: Vec<String> = loader
        .load_all(&config.sources)
        .await
        .into_iter()
        .map(|(_, body)| body)
        .collect();
    if bodies.is_empty() {
        warn!("no source could be loaded; playlists will be empty");
    }

    let prober = LivenessProber::new(ProbeSettings::from_config(&config))?;
    let report = iptv_aggregator_lib::run(config, &bodies, &prober).await?;

    if !args.quiet {
        print_report(&report);
    }
    Ok(())
}
