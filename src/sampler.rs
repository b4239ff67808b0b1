use crate::analyzer::VideoAsset;
use crate::config::SamplingConfig;
use crate::encoder::EncodeOutcome;
use crate::error::AppError;
use crate::tools::ToolSuite;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One representative time window extracted from the source.
///
/// Segments are non-overlapping and ordered by start offset; the
/// extracted sample file lives in the job temp dir and is cleaned up
/// with it.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Position in the ordered segment sequence
    pub index: usize,
    /// Start offset in the source, seconds
    pub start_secs: f64,
    /// Window duration, seconds
    pub duration_secs: f64,
    /// Extracted sample media
    pub sample_path: PathBuf,
}

/// A planned but not yet extracted window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub start_secs: f64,
    pub duration_secs: f64,
}

/// Plan sample windows: fixed stride across the usable timeline with a
/// margin skipped at each end. Always returns at least one window; a
/// source too short for two windows is covered whole.
pub fn plan_windows(duration_secs: f64, config: &SamplingConfig) -> Vec<Window> {
    let window_len = config.segment_duration_secs;

    // Degenerate case: cover the whole video as a single segment
    if duration_secs <= window_len * 2.0 {
        return vec![Window {
            start_secs: 0.0,
            duration_secs,
        }];
    }

    let mut margin = duration_secs * config.edge_margin_fraction;
    let mut usable = duration_secs - margin * 2.0;
    if usable < window_len {
        margin = 0.0;
        usable = duration_secs;
    }

    // Clamp the window count to what the usable timeline can hold
    let max_windows = (usable / window_len).floor() as u32;
    let count = config.segment_count.min(max_windows).max(1) as usize;

    let stride = usable / count as f64;
    (0..count)
        .map(|i| {
            // Center each window inside its stride cell
            let cell_start = margin + stride * i as f64;
            Window {
                start_secs: cell_start + (stride - window_len) / 2.0,
                duration_secs: window_len,
            }
        })
        .collect()
}

/// Extract the planned windows to sample files via stream copy.
///
/// Stream copy cuts on keyframes, which is accurate enough for trial
/// scoring and avoids a decode/encode cycle per sample. Any extraction
/// failure is fatal: the search has nothing representative to work on.
pub async fn extract_segments(
    asset: &VideoAsset,
    config: &SamplingConfig,
    temp_dir: &Path,
    tools: &dyn ToolSuite,
) -> Result<Vec<Segment>, AppError> {
    let windows = plan_windows(asset.metadata.duration_secs, config);
    info!(
        "Sampling {} segment(s) of ~{:.0}s from {:.0}s source",
        windows.len(),
        config.segment_duration_secs,
        asset.metadata.duration_secs
    );

    let mut segments = Vec::with_capacity(windows.len());
    for (index, window) in windows.iter().enumerate() {
        let sample_path = temp_dir.join(format!("seg{:02}_at{:.0}s.mkv", index, window.start_secs));
        match tools.extract(&asset.path, window, &sample_path).await {
            EncodeOutcome::Success { .. } => {}
            EncodeOutcome::Failure { diagnostic } => {
                return Err(AppError::Sampling(format!(
                    "Segment extraction at {:.1}s failed: {}",
                    window.start_secs, diagnostic
                )));
            }
        }
        debug!(
            "Extracted segment {} [{:.1}s +{:.1}s] -> {}",
            index,
            window.start_secs,
            window.duration_secs,
            sample_path.display()
        );
        segments.push(Segment {
            index,
            start_secs: window.start_secs,
            duration_secs: window.duration_secs,
            sample_path,
        });
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(count: u32, len: f64, margin: f64) -> SamplingConfig {
        SamplingConfig {
            segment_count: count,
            segment_duration_secs: len,
            edge_margin_fraction: margin,
        }
    }

    fn assert_ordered_non_overlapping(windows: &[Window]) {
        for pair in windows.windows(2) {
            assert!(
                pair[0].start_secs + pair[0].duration_secs <= pair[1].start_secs + 1e-9,
                "windows overlap: {:?}",
                pair
            );
        }
    }

    #[test]
    fn windows_are_ordered_and_non_overlapping() {
        let windows = plan_windows(3600.0, &config(6, 12.0, 0.05));
        assert_eq!(windows.len(), 6);
        assert_ordered_non_overlapping(&windows);
    }

    #[test]
    fn windows_respect_edge_margins() {
        let duration = 3600.0;
        let windows = plan_windows(duration, &config(6, 12.0, 0.05));
        let margin = duration * 0.05;
        assert!(windows.first().unwrap().start_secs >= margin);
        let last = windows.last().unwrap();
        assert!(last.start_secs + last.duration_secs <= duration - margin + 1e-9);
    }

    #[test]
    fn windows_spread_beyond_the_head_of_the_file() {
        let windows = plan_windows(3600.0, &config(6, 12.0, 0.05));
        // Representative sampling: the last window must sit in the
        // back half of the timeline, not near the start.
        assert!(windows.last().unwrap().start_secs > 1800.0);
    }

    #[test]
    fn short_source_collapses_to_single_whole_segment() {
        let windows = plan_windows(15.0, &config(6, 12.0, 0.05));
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].start_secs, 0.0);
        assert_eq!(windows[0].duration_secs, 15.0);
    }

    #[test]
    fn window_count_clamped_for_medium_sources() {
        // 60s source cannot hold 6 non-overlapping 12s windows plus margins
        let windows = plan_windows(60.0, &config(6, 12.0, 0.05));
        assert!(windows.len() >= 1 && windows.len() < 6);
        assert_ordered_non_overlapping(&windows);
    }

    #[test]
    fn always_at_least_one_window() {
        let windows = plan_windows(0.5, &config(6, 12.0, 0.05));
        assert_eq!(windows.len(), 1);
    }
}
