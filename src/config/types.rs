use serde::{Deserialize, Serialize};

/// Quality target configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Target VMAF score (0-100); trials must meet or exceed this
    pub target_vmaf: f64,
    /// VMAF frame subsampling for trial scoring (1 = every frame)
    pub vmaf_subsample: u32,
    /// Run a full-length VMAF verification after the final encode
    pub verify_final: bool,
    /// VMAF frame subsampling for the final verification pass
    pub verify_subsample: u32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            target_vmaf: 96.0,
            vmaf_subsample: 1,
            verify_final: true,
            verify_subsample: 10,
        }
    }
}

/// CRF search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Lowest CRF to try (highest quality bound)
    pub crf_min: u8,
    /// Highest CRF to try (highest compression bound)
    pub crf_max: u8,
    /// Hard cap on trials per segment, retries included
    pub max_trials_per_segment: u32,
    /// Retries per candidate before it is treated as unscoreable
    pub max_retries: u32,
    /// Spread of converged CRFs that still collapses to one global value
    pub crf_tolerance: u8,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            crf_min: 12,
            crf_max: 36,
            max_trials_per_segment: 10,
            max_retries: 2,
            crf_tolerance: 2,
        }
    }
}

/// Segment sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Number of sample windows to spread across the timeline
    pub segment_count: u32,
    /// Duration of each sample window in seconds
    pub segment_duration_secs: f64,
    /// Fraction of total duration skipped at each end (intro/credits)
    pub edge_margin_fraction: f64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            segment_count: 6,
            segment_duration_secs: 12.0,
            edge_margin_fraction: 0.05,
        }
    }
}

/// Performance and scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Ceiling on concurrently live external subprocesses
    pub concurrency: usize,
    /// Per-trial deadline in seconds (encode + score)
    pub trial_timeout_secs: u64,
    /// Optional whole-job deadline in seconds
    pub job_timeout_secs: Option<u64>,
    /// x265 preset ("medium", "slow", "veryslow", ...)
    pub x265_preset: String,
    /// VMAF threads per scoring invocation
    pub vmaf_threads: u32,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            trial_timeout_secs: 600,
            job_timeout_secs: None,
            x265_preset: "slow".to_string(),
            vmaf_threads: 4,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Suffix appended to the source stem when no output path is given
    pub suffix: String,
    /// Output container extension
    pub container: String,
    /// Write a machine-readable JSON summary next to the output
    pub write_summary: bool,
    /// Warn before the final encode if the predicted size reduction is
    /// below this fraction of the source size
    pub efficiency_threshold: f64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            suffix: "_hevc".to_string(),
            container: "mp4".to_string(),
            write_summary: true,
            efficiency_threshold: 0.28,
        }
    }
}
