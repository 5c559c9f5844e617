use iptv_aggregator_lib::{AppConfig, LivenessProber, Probe, ProbeSettings};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        println!("usage: diagnose_url <url>...");
        return Ok(());
    }

    let config = AppConfig::load(AppConfig::default_path().as_deref())?;
    let prober = LivenessProber::new(ProbeSettings::from_config(&config))?;

    for url in &urls {
        println!("\n--- {} ---", url);
        let outcome = prober.probe(url).await;
        match (&outcome.failure, outcome.latency) {
            (None, Some(latency)) => println!("LIVE in {} ms", latency.as_millis()),
            (Some(failure), _) => println!("DEAD [{}]: {}", failure.tag(), failure),
            (None, None) => println!("DEAD: no response"),
        }
    }

    Ok(())
}
