use crate::aggregate::FinalDecision;
use chrono::{DateTime, Utc};
use humansize::{DECIMAL, format_size};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Machine-readable summary of a completed job, written next to the
/// output file and printed to the user
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub source_bytes: u64,
    pub output_bytes: u64,
    pub saved_bytes: u64,
    pub saved_percent: f64,
    pub target_vmaf: f64,
    pub decision: FinalDecision,
    /// Full-length verification score, when the verify pass ran
    pub measured_vmaf: Option<f64>,
    pub segments_sampled: usize,
    pub trials_total: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub wall_secs: f64,
}

impl JobReport {
    /// Size reduction as (saved bytes, percent of source)
    pub fn size_reduction(source_bytes: u64, output_bytes: u64) -> (u64, f64) {
        let saved = source_bytes.saturating_sub(output_bytes);
        let percent = if source_bytes > 0 {
            saved as f64 / source_bytes as f64 * 100.0
        } else {
            0.0
        };
        (saved, percent)
    }

    /// Write the JSON summary sidecar
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!("Wrote summary to {}", path.display());
        Ok(())
    }

    /// Sidecar path for a given output file
    pub fn summary_path(output: &Path) -> PathBuf {
        let mut name = output.as_os_str().to_owned();
        name.push(".summary.json");
        PathBuf::from(name)
    }

    /// Human-readable wrap-up lines
    pub fn print_human(&self) {
        println!(
            "Done: {} -> {}",
            self.input.display(),
            self.output.display()
        );
        println!(
            "Size: {} -> {} (saved {}, {:.1}%)",
            format_size(self.source_bytes, DECIMAL),
            format_size(self.output_bytes, DECIMAL),
            format_size(self.saved_bytes, DECIMAL),
            self.saved_percent
        );
        match self.decision.global_crf() {
            Some(crf) => println!("Parameters: global crf {}", crf),
            None => println!("Parameters: per-region crf map (see summary)"),
        }
        match self.measured_vmaf {
            Some(measured) => println!(
                "Quality: measured VMAF {:.2} (target {:.1}, predicted {:.2})",
                measured, self.target_vmaf, self.decision.predicted_vmaf
            ),
            None => println!(
                "Quality: predicted VMAF {:.2} (target {:.1})",
                self.decision.predicted_vmaf, self.target_vmaf
            ),
        }
        if !self.decision.fallback_segments.is_empty() {
            println!(
                "Warning: segment(s) {:?} used conservative fallback parameters; \
                 those regions may sit below the target",
                self.decision.fallback_segments
            );
        }
        println!(
            "Searched {} segment(s) with {} trial encode(s) in {:.0}s",
            self.segments_sampled, self.trials_total, self.wall_secs
        );
    }
}
