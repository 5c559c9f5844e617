//! Fetching playlist sources from disk or over HTTP(S).

use crate::text;
use anyhow::{bail, Context};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

pub struct SourceLoader {
    client: reqwest::Client,
}

impl SourceLoader {
    pub fn new(user_agent: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    fn is_remote(location: &str) -> bool {
        location.starts_with("http://") || location.starts_with("https://")
    }

    /// Load one source as decoded text
    pub async fn load(&self, location: &str) -> Result<String, anyhow::Error> {
        let bytes = if Self::is_remote(location) {
            let resp = self
                .client
                .get(location)
                .send()
                .await
                .with_context(|| format!("fetching {location}"))?;
            if !resp.status().is_success() {
                bail!("fetching {location}: HTTP {}", resp.status());
            }
            resp.bytes().await?.to_vec()
        } else {
            tokio::fs::read(Path::new(location))
                .await
                .with_context(|| format!("reading {location}"))?
        };
        Ok(text::decode(&bytes))
    }

    /// Load every source, in order. Unreachable sources are logged and skipped.
    pub async fn load_all(&self, locations: &[String]) -> Vec<(String, String)> {
        let mut loaded = Vec::with_capacity(locations.len());
        for location in locations {
            match self.load(location).await {
                Ok(body) => {
                    info!(source = %location, bytes = body.len(), "loaded source");
                    loaded.push((location.clone(), body));
                }
                Err(e) => warn!(source = %location, error = %e, "skipping source"),
            }
        }
        loaded
    }
}
