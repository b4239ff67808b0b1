use thiserror::Error;

/// Fatal job errors.
///
/// Per-trial failures (tool crash, timeout) and per-segment failures
/// (quality unreachable) are represented as data (`TrialStatus`,
/// `SearchOutcome`) so the search can make policy decisions; only errors
/// that end the whole job live here.
#[derive(Debug, Clone, Error)]
pub enum AppError {
    /// Invalid or unloadable configuration
    #[error("config error: {0}")]
    Config(String),

    /// Source could not be probed (corrupt container, missing file)
    #[error("analysis failed: {0}")]
    Analysis(String),

    /// Segment extraction failed; no further analysis is possible
    #[error("sampling failed: {0}")]
    Sampling(String),

    /// No segment produced a single scored trial
    #[error("aggregation inconsistency: {0}")]
    AggregationInconsistency(String),

    /// The production encode itself failed after parameters were chosen
    #[error("final encode failed: {0}")]
    FinalEncode(String),

    /// The configured job-level deadline elapsed
    #[error("job timed out after {0}s")]
    JobTimeout(u64),
}

impl From<toml::de::Error> for AppError {
    fn from(e: toml::de::Error) -> Self {
        AppError::Config(format!("invalid TOML: {}", e))
    }
}

impl From<toml::ser::Error> for AppError {
    fn from(e: toml::ser::Error) -> Self {
        AppError::Config(format!("failed to serialize TOML: {}", e))
    }
}
