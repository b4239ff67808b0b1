use serde::Deserialize;
use std::path::Path;

/// VMAF quality result
#[derive(Debug, Clone)]
pub struct VmafScore {
    /// Mean VMAF score (0-100, higher is better)
    pub score: f64,
    /// Minimum frame score
    pub min_score: f64,
    /// Maximum frame score
    pub max_score: f64,
}

impl VmafScore {
    /// Check if quality meets threshold
    pub fn meets_threshold(&self, threshold: f64) -> bool {
        self.score >= threshold
    }

    /// Get human-readable quality grade
    pub fn quality_grade(&self) -> &'static str {
        match self.score as u32 {
            95..=100 => "Excellent",
            90..=94 => "Very Good",
            80..=89 => "Good",
            70..=79 => "Fair",
            60..=69 => "Poor",
            _ => "Bad",
        }
    }
}

impl std::fmt::Display for VmafScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "VMAF: {:.2} ({}) [min: {:.2}, max: {:.2}]",
            self.score,
            self.quality_grade(),
            self.min_score,
            self.max_score
        )
    }
}

/// Select the built-in libvmaf model for a source resolution.
///
/// The NEG (no-enhancement-gain) variants are the strict models suited
/// to transparency targets; sources above 1080p use the 4K model.
pub fn select_model(width: u32, height: u32) -> &'static str {
    if width > 1920 || height > 1080 {
        "vmaf_4k_v0.6.1neg"
    } else {
        "vmaf_v0.6.1neg"
    }
}

/// Build the libvmaf filter graph comparing a distorted encode against
/// its reference. Both inputs are normalized to the same pixel format
/// and have their timestamps reset so container offsets cannot skew
/// frame pairing.
pub fn build_vmaf_filter(
    log_path: &Path,
    model: &str,
    pixel_format: &str,
    threads: u32,
    subsample: u32,
) -> String {
    format!(
        "[0:v]format={pf},setpts=PTS-STARTPTS[ref];\
         [1:v]format={pf},setpts=PTS-STARTPTS[dist];\
         [ref][dist]libvmaf=log_path={log}:log_fmt=json:n_threads={threads}:n_subsample={subsample}:model='version={model}'",
        pf = pixel_format,
        log = log_path.to_string_lossy(),
        threads = threads,
        subsample = subsample,
        model = model,
    )
}

/// Parse the pooled metrics out of a libvmaf JSON log
pub fn parse_vmaf_log(json_content: &str) -> Result<VmafScore, String> {
    let vmaf_data: VmafJson = serde_json::from_str(json_content)
        .map_err(|e| format!("Failed to parse VMAF JSON: {}", e))?;

    Ok(VmafScore {
        score: vmaf_data.pooled_metrics.vmaf.mean,
        min_score: vmaf_data.pooled_metrics.vmaf.min,
        max_score: vmaf_data.pooled_metrics.vmaf.max,
    })
}

// JSON deserialization structures

#[derive(Debug, Deserialize)]
struct VmafJson {
    pooled_metrics: PooledMetrics,
}

#[derive(Debug, Deserialize)]
struct PooledMetrics {
    vmaf: MetricStats,
}

#[derive(Debug, Deserialize)]
struct MetricStats {
    mean: f64,
    min: f64,
    max: f64,
}
