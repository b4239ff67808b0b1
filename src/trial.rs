use crate::encoder::{EncodeMode, EncodeOutcome, EncodeRequest};
use crate::sampler::Segment;
use crate::tools::{ScoreOutcome, ScoreProfile, ToolSuite};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Exit disposition of one trial
#[derive(Debug, Clone, PartialEq)]
pub enum TrialStatus {
    /// Encode and score both completed
    Completed,
    /// Encoder or metric exited abnormally
    ToolFailure { diagnostic: String },
    /// The per-trial deadline elapsed; the subprocess was terminated
    Timeout,
}

/// Result of one trial encode+score. Created once, never mutated; a
/// re-run produces a new result.
#[derive(Debug, Clone)]
pub struct TrialResult {
    pub segment_index: usize,
    pub crf: u8,
    pub attempt: u32,
    pub output_bytes: Option<u64>,
    pub score: Option<f64>,
    pub status: TrialStatus,
    pub wall: Duration,
}

impl TrialResult {
    /// Whether this trial produced a usable (size, score) pair
    pub fn is_scored(&self) -> bool {
        self.status == TrialStatus::Completed && self.score.is_some() && self.output_bytes.is_some()
    }
}

/// Runs trials against the external tools under the global subprocess
/// ceiling and the per-trial deadline.
pub struct TrialRunner {
    tools: Arc<dyn ToolSuite>,
    permits: Arc<Semaphore>,
    trial_timeout: Duration,
    score_profile: ScoreProfile,
    preset: String,
    pixel_format: &'static str,
    artifacts_dir: PathBuf,
}

impl TrialRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tools: Arc<dyn ToolSuite>,
        permits: Arc<Semaphore>,
        trial_timeout: Duration,
        score_profile: ScoreProfile,
        preset: String,
        pixel_format: &'static str,
        artifacts_dir: PathBuf,
    ) -> Self {
        Self {
            tools,
            permits,
            trial_timeout,
            score_profile,
            preset,
            pixel_format,
            artifacts_dir,
        }
    }

    /// Encode one segment at one CRF and score the result.
    ///
    /// Holds one pool permit across both subprocesses (they run
    /// sequentially, so one permit equals one live subprocess). The
    /// deadline spans the whole trial; on expiry the in-flight child is
    /// killed and the attempt is reported as `Timeout`.
    pub async fn run_trial(&self, segment: &Segment, crf: u8, attempt: u32) -> TrialResult {
        let started = Instant::now();

        let Ok(_permit) = self.permits.acquire().await else {
            // Pool closed: the job is shutting down
            return self.finish(
                segment,
                crf,
                attempt,
                None,
                None,
                TrialStatus::ToolFailure {
                    diagnostic: "worker pool closed".to_string(),
                },
                started,
            );
        };

        let artifact = self.artifact_path(segment.index, crf, attempt);
        let req = EncodeRequest {
            input: segment.sample_path.clone(),
            output: artifact.clone(),
            crf,
            preset: self.preset.clone(),
            pixel_format: self.pixel_format,
            mode: EncodeMode::Trial,
        };

        let encode = match timeout(self.trial_timeout, self.tools.encode(&req, None)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    "Trial seg {} crf {} timed out after {:?} during encode",
                    segment.index, crf, self.trial_timeout
                );
                let _ = std::fs::remove_file(&artifact);
                return self.finish(segment, crf, attempt, None, None, TrialStatus::Timeout, started);
            }
        };

        let output_bytes = match encode {
            EncodeOutcome::Success { output_bytes } => output_bytes,
            EncodeOutcome::Failure { diagnostic } => {
                return self.finish(
                    segment,
                    crf,
                    attempt,
                    None,
                    None,
                    TrialStatus::ToolFailure { diagnostic },
                    started,
                );
            }
        };

        let remaining = self.trial_timeout.saturating_sub(started.elapsed());
        let score = match timeout(
            remaining,
            self.tools
                .score(&segment.sample_path, &artifact, &self.score_profile),
        )
        .await
        {
            Ok(ScoreOutcome::Scored(vmaf)) => vmaf.score,
            Ok(ScoreOutcome::Failure { diagnostic }) => {
                return self.finish(
                    segment,
                    crf,
                    attempt,
                    Some(output_bytes),
                    None,
                    TrialStatus::ToolFailure { diagnostic },
                    started,
                );
            }
            Err(_) => {
                warn!(
                    "Trial seg {} crf {} timed out after {:?} during scoring",
                    segment.index, crf, self.trial_timeout
                );
                return self.finish(
                    segment,
                    crf,
                    attempt,
                    Some(output_bytes),
                    None,
                    TrialStatus::Timeout,
                    started,
                );
            }
        };

        debug!(
            "Trial seg {} crf {} -> vmaf {:.2}, {} bytes in {:?}",
            segment.index,
            crf,
            score,
            output_bytes,
            started.elapsed()
        );

        self.finish(
            segment,
            crf,
            attempt,
            Some(output_bytes),
            Some(score),
            TrialStatus::Completed,
            started,
        )
    }

    /// Unique artifact path per (segment, crf, attempt)
    fn artifact_path(&self, segment_index: usize, crf: u8, attempt: u32) -> PathBuf {
        self.artifacts_dir.join(format!(
            "seg{:02}_crf{}_try{}_{}.mkv",
            segment_index,
            crf,
            attempt,
            uuid::Uuid::new_v4().simple()
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        segment: &Segment,
        crf: u8,
        attempt: u32,
        output_bytes: Option<u64>,
        score: Option<f64>,
        status: TrialStatus,
        started: Instant,
    ) -> TrialResult {
        TrialResult {
            segment_index: segment.index,
            crf,
            attempt,
            output_bytes,
            score,
            status,
            wall: started.elapsed(),
        }
    }
}
