//! Liveness Prober: cheap reachability and latency check for one URL.
//!
//! Step 1 dials TCP. Step 2, for HTTP(S) only, asks for a small byte range
//! and inspects status and content type. Failures are values, not errors.

use crate::config::AppConfig;
use crate::errors::{ConnectionStage, PipelineError, ProbeFailure};
use async_trait::async_trait;
use reqwest::{header, redirect, Client, StatusCode};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant as Deadline};
use url::{Host, Url};

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub valid: bool,
    pub latency: Option<Duration>,
    pub failure: Option<ProbeFailure>,
}

impl ProbeOutcome {
    pub fn valid(latency: Duration) -> Self {
        Self {
            valid: true,
            latency: Some(latency),
            failure: None,
        }
    }

    pub fn invalid(failure: ProbeFailure) -> Self {
        Self {
            valid: false,
            latency: None,
            failure: Some(failure),
        }
    }
}

/// Anything that can judge a URL. The pipeline only sees this trait.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, url: &str) -> ProbeOutcome;
}

#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub connect_timeout: Duration,
    pub http_timeout: Duration,
    pub user_agent: String,
    pub accept_invalid_certs: bool,
    /// Substrings accepted in a declared `Content-Type`
    pub content_types: Vec<String>,
    /// Bytes requested through the `Range` header
    pub range_bytes: u64,
}

impl ProbeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            connect_timeout: config.probe_timeout(),
            http_timeout: config.http_timeout(),
            user_agent: config.user_agent.clone(),
            accept_invalid_certs: config.accept_invalid_certs,
            content_types: config.content_types.clone(),
            range_bytes: 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LivenessProber {
    settings: ProbeSettings,
    client: Client,
}

fn default_port(scheme: &str) -> u16 {
    match scheme {
        "https" => 443,
        "rtmp" => 1935,
        "rtsp" => 554,
        _ => 80,
    }
}

impl LivenessProber {
    pub fn new(settings: ProbeSettings) -> Result<Self, PipelineError> {
        // Redirects are judged, not followed
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .redirect(redirect::Policy::none())
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.http_timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("http client: {e}")))?;
        Ok(Self { settings, client })
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    /// `deadline` covers resolution and every dial attempt together
    async fn resolve(&self, url: &Url, deadline: Deadline) -> Result<Vec<SocketAddr>, ProbeFailure> {
        let port = url.port().unwrap_or_else(|| default_port(url.scheme()));
        match url.host() {
            Some(Host::Ipv4(ip)) => Ok(vec![SocketAddr::from((ip, port))]),
            Some(Host::Ipv6(ip)) => Ok(vec![SocketAddr::from((ip, port))]),
            Some(Host::Domain(domain)) => {
                let lookup = tokio::net::lookup_host((domain, port));
                match timeout_at(deadline, lookup).await {
                    Ok(Ok(addrs)) => {
                        let addrs: Vec<_> = addrs.collect();
                        if addrs.is_empty() {
                            Err(ProbeFailure::Dns(format!("no addresses for {domain}")))
                        } else {
                            Ok(addrs)
                        }
                    }
                    Ok(Err(e)) => Err(ProbeFailure::Dns(e.to_string())),
                    Err(_) => Err(ProbeFailure::Timeout {
                        stage: ConnectionStage::DnsResolution,
                    }),
                }
            }
            None => Err(ProbeFailure::InvalidUrl("missing host".to_string())),
        }
    }

    /// Step 1: the first address that accepts a connection wins
    async fn dial(&self, addrs: &[SocketAddr], deadline: Deadline) -> Result<(), ProbeFailure> {
        let mut last = ProbeFailure::Connect {
            stage: ConnectionStage::TcpConnection,
            reason: "no address".to_string(),
        };
        for addr in addrs {
            match timeout_at(deadline, TcpStream::connect(addr)).await {
                Ok(Ok(_stream)) => return Ok(()),
                Ok(Err(e)) => {
                    last = ProbeFailure::Connect {
                        stage: ConnectionStage::TcpConnection,
                        reason: e.to_string(),
                    }
                }
                Err(_) => {
                    return Err(ProbeFailure::Timeout {
                        stage: ConnectionStage::TcpConnection,
                    })
                }
            }
        }
        Err(last)
    }

    fn content_type_allowed(&self, content_type: &str) -> bool {
        let ct = content_type.to_ascii_lowercase();
        self.settings
            .content_types
            .iter()
            .any(|allowed| ct.contains(&allowed.to_ascii_lowercase()))
    }

    /// Step 2: partial-content request
    async fn confirm_http(&self, url: &Url) -> Result<(), ProbeFailure> {
        let range = format!("bytes=0-{}", self.settings.range_bytes);
        let resp = self
            .client
            .get(url.as_str())
            .header(header::RANGE, range)
            .header(header::ACCEPT, "*/*")
            .header(header::CONNECTION, "close")
            .send()
            .await
            .map_err(|e| request_failure(&e, ConnectionStage::HttpHandshake))?;

        let status = resp.status();
        if matches!(
            status,
            StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::TEMPORARY_REDIRECT
        ) {
            return Ok(());
        }
        if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
            return Err(ProbeFailure::Status(status.as_u16()));
        }

        // Only checked when the server bothers to declare one
        if let Some(ct) = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.trim().is_empty())
        {
            if !self.content_type_allowed(ct) {
                return Err(ProbeFailure::ContentType(ct.to_string()));
            }
        }

        let mut resp = resp;
        resp.chunk()
            .await
            .map_err(|e| request_failure(&e, ConnectionStage::ResponseBody))?;
        Ok(())
    }
}

fn request_failure(err: &reqwest::Error, stage: ConnectionStage) -> ProbeFailure {
    if err.is_timeout() {
        ProbeFailure::Timeout { stage }
    } else if err.is_connect() {
        ProbeFailure::Connect {
            stage,
            reason: err.to_string(),
        }
    } else {
        ProbeFailure::Http(err.to_string())
    }
}

#[async_trait]
impl Probe for LivenessProber {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(e) => return ProbeOutcome::invalid(ProbeFailure::InvalidUrl(e.to_string())),
        };

        let start = Instant::now();
        let deadline = Deadline::now() + self.settings.connect_timeout;

        let addrs = match self.resolve(&parsed, deadline).await {
            Ok(addrs) => addrs,
            Err(failure) => return ProbeOutcome::invalid(failure),
        };
        if let Err(failure) = self.dial(&addrs, deadline).await {
            return ProbeOutcome::invalid(failure);
        }

        // Other schemes stop after a successful dial
        if matches!(parsed.scheme(), "http" | "https") {
            if let Err(failure) = self.confirm_http(&parsed).await {
                return ProbeOutcome::invalid(failure);
            }
        }

        ProbeOutcome::valid(start.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn settings() -> ProbeSettings {
        ProbeSettings::from_config(&AppConfig::default())
    }

    /// Serve one canned HTTP response per connection
    async fn serve(response: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 2048];
                    let _ = sock.read(&mut buf).await;
                    let _ = sock.write_all(response.as_bytes()).await;
                    let _ = sock.shutdown().await;
                });
            }
        });
        addr
    }

    async fn closed_port() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr
    }

    #[tokio::test]
    async fn test_partial_content_stream_is_valid() {
        let addr = serve(
            "HTTP/1.1 206 Partial Content\r\nContent-Type: video/mp2t\r\nContent-Length: 4\r\n\r\nabcd",
        )
        .await;
        let prober = LivenessProber::new(settings()).unwrap();
        let outcome = prober.probe(&format!("http://{addr}/live.ts")).await;
        assert!(outcome.valid, "{:?}", outcome.failure);
        assert!(outcome.latency.is_some());
    }

    #[tokio::test]
    async fn test_html_page_is_rejected() {
        let addr = serve(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 2\r\n\r\nhi",
        )
        .await;
        let prober = LivenessProber::new(settings()).unwrap();
        let outcome = prober.probe(&format!("http://{addr}/index.html")).await;
        assert!(!outcome.valid);
        assert_eq!(
            outcome.failure,
            Some(ProbeFailure::ContentType("text/html".to_string()))
        );
    }

    #[tokio::test]
    async fn test_redirect_is_provisionally_valid() {
        let addr = serve(
            "HTTP/1.1 302 Found\r\nLocation: http://elsewhere.invalid/\r\nContent-Length: 0\r\n\r\n",
        )
        .await;
        let prober = LivenessProber::new(settings()).unwrap();
        assert!(prober.probe(&format!("http://{addr}/r")).await.valid);
    }

    #[tokio::test]
    async fn test_error_status_is_invalid() {
        let addr = serve("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n").await;
        let prober = LivenessProber::new(settings()).unwrap();
        let outcome = prober.probe(&format!("http://{addr}/gone")).await;
        assert_eq!(outcome.failure, Some(ProbeFailure::Status(404)));
    }

    #[tokio::test]
    async fn test_refused_connection_stops_at_tcp() {
        let addr = closed_port().await;
        let prober = LivenessProber::new(settings()).unwrap();
        let outcome = prober.probe(&format!("http://{addr}/x")).await;
        assert!(!outcome.valid);
        assert!(matches!(
            outcome.failure,
            Some(ProbeFailure::Connect {
                stage: ConnectionStage::TcpConnection,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_non_http_scheme_only_needs_tcp() {
        // Plain listener that never speaks HTTP
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });
        let prober = LivenessProber::new(settings()).unwrap();
        assert!(prober.probe(&format!("rtmp://{addr}/live/1")).await.valid);
    }

    #[tokio::test]
    async fn test_dial_attempts_share_one_deadline() {
        let prober = LivenessProber::new(settings()).unwrap();
        // Unroutable; each attempt either hangs or fails at once
        let addrs: Vec<SocketAddr> = (81..85)
            .map(|port| SocketAddr::from(([10, 255, 255, 1], port)))
            .collect();
        let started = Instant::now();
        let result = prober
            .dial(&addrs, Deadline::now() + Duration::from_millis(300))
            .await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_millis(900), "{:?}", started.elapsed());
    }

    #[tokio::test]
    async fn test_spent_deadline_fails_at_dns() {
        let prober = LivenessProber::new(settings()).unwrap();
        let url = Url::parse("http://localhost/live").unwrap();
        let result = prober.resolve(&url, Deadline::now()).await;
        assert_eq!(
            result,
            Err(ProbeFailure::Timeout {
                stage: ConnectionStage::DnsResolution
            })
        );
    }

    #[tokio::test]
    async fn test_unparseable_url_is_invalid() {
        let prober = LivenessProber::new(settings()).unwrap();
        let outcome = prober.probe("not a url").await;
        assert!(matches!(outcome.failure, Some(ProbeFailure::InvalidUrl(_))));
    }
}
