use crate::analyzer::ffprobe;
use std::path::Path;

/// Duration drift allowed between source and encoded output, seconds
const DURATION_TOLERANCE_SECS: f64 = 1.0;

/// Validation result after the final encode
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether durations match (within tolerance)
    pub duration_match: bool,
    /// Whether the output file exists and is non-empty
    pub file_integrity: bool,
    /// Source duration in seconds
    pub source_duration: f64,
    /// Output duration in seconds
    pub output_duration: f64,
    /// Validation messages
    pub messages: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.duration_match && self.file_integrity
    }
}

/// Validate an encoded video file against the source duration.
///
/// A truncated encode (tool died mid-write but exited zero, or a
/// container was finalized early) shows up as a duration mismatch.
pub fn validate_output(output_path: &Path, source_duration: f64) -> ValidationResult {
    let mut messages = Vec::new();

    let file_integrity = output_path.exists()
        && output_path
            .metadata()
            .map(|m| m.len() > 0)
            .unwrap_or(false);

    if !file_integrity {
        messages.push("Output file is missing or empty".to_string());
        return ValidationResult {
            duration_match: false,
            file_integrity: false,
            source_duration,
            output_duration: 0.0,
            messages,
        };
    }

    let output_duration = ffprobe::get_duration(output_path).unwrap_or(0.0);
    let duration_match = if source_duration > 0.0 && output_duration > 0.0 {
        let diff = (source_duration - output_duration).abs();
        if diff > DURATION_TOLERANCE_SECS {
            messages.push(format!(
                "Duration mismatch: source {:.1}s, output {:.1}s (diff: {:.1}s)",
                source_duration, output_duration, diff
            ));
            false
        } else {
            true
        }
    } else {
        // Can't verify, assume OK
        true
    };

    ValidationResult {
        duration_match,
        file_integrity,
        source_duration,
        output_duration,
        messages,
    }
}
