pub mod blacklist;
pub mod checkpoint;
pub mod classifier;
pub mod config;
pub mod dictionary;
pub mod emitter;
pub mod errors;
pub mod normalizer;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod prober;
pub mod ranker;
pub mod registry;
pub mod sources;
pub mod sweep;
pub mod text;

pub use config::AppConfig;
pub use errors::{PipelineError, ProbeFailure, Rejection};
pub use pipeline::{run, PipelineRun, RunReport};
pub use prober::{LivenessProber, Probe, ProbeOutcome, ProbeSettings};
