use std::path::PathBuf;
use thiserror::Error;

/// Stage of a liveness probe at which it gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStage {
    /// Host name did not resolve
    DnsResolution,
    /// TCP dial to host:port failed
    TcpConnection,
    /// HTTP request did not produce a response head
    HttpHandshake,
    /// Response head arrived but the body did not
    ResponseBody,
}

impl std::fmt::Display for ConnectionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl ConnectionStage {
    pub fn display_name(&self) -> &'static str {
        match self {
            ConnectionStage::DnsResolution => "DNS Resolution",
            ConnectionStage::TcpConnection => "TCP Connection",
            ConnectionStage::HttpHandshake => "HTTP Handshake",
            ConnectionStage::ResponseBody => "Response Body",
        }
    }
}

/// Why a candidate URL was judged invalid.
///
/// Probe failures never leave the worker pool as errors; they are folded
/// into a [`crate::prober::ProbeOutcome`] and, when persistent, their
/// `Display` text becomes the reason recorded in the blacklist journal.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProbeFailure {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("dns resolution failed: {0}")]
    Dns(String),

    #[error("connection failed at {stage}: {reason}")]
    Connect {
        stage: ConnectionStage,
        reason: String,
    },

    #[error("timed out at {stage}")]
    Timeout { stage: ConnectionStage },

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("unexpected content type {0}")]
    ContentType(String),

    #[error("http error: {0}")]
    Http(String),
}

impl ProbeFailure {
    /// Short tag suitable for the label column of a blacklist line
    pub fn tag(&self) -> &'static str {
        match self {
            ProbeFailure::InvalidUrl(_) => "invalid-url",
            ProbeFailure::Dns(_) => "dns",
            ProbeFailure::Connect { .. } => "connect",
            ProbeFailure::Timeout { .. } => "timeout",
            ProbeFailure::Status(_) => "status",
            ProbeFailure::ContentType(_) => "content-type",
            ProbeFailure::Http(_) => "http",
        }
    }
}

/// Reason an entry was not registered for probing
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Rejection {
    #[error("empty or malformed url")]
    EmptyUrl,
    #[error("url is blacklisted")]
    Blacklisted,
    #[error("url already registered for channel")]
    Duplicate,
    #[error("channel already holds the maximum number of sources")]
    ChannelFull,
    #[error("channel matches no category")]
    Unmatched,
}

/// Run-level failures. Anything here fails the run as a whole.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to write {path}: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),
}

impl PipelineError {
    pub fn write(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        PipelineError::Write {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}
