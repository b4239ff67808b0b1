use crate::aggregate::{self, DecisionKind};
use crate::analyzer::{ResolutionTier, is_hevc_codec};
use crate::config::AppConfig;
use crate::encoder::{EncodeMode, EncodeOutcome, EncodeRequest, build_zones};
use crate::error::AppError;
use crate::report::JobReport;
use crate::sampler;
use crate::search::{SearchController, SearchState};
use crate::tools::{ScoreOutcome, ScoreProfile, ToolSuite};
use crate::trial::TrialRunner;
use crate::utils::disk_space;
use crate::verifier::{validator, vmaf};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Lifecycle of one encode job
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobStatus {
    Pending,
    Sampling,
    Searching,
    Aggregating,
    FinalEncoding,
    Done,
    Failed,
}

/// Process-wide state for the life of one run
#[derive(Debug)]
pub struct EncodeJob {
    pub status: JobStatus,
    pub started_at: chrono::DateTime<Utc>,
    pub finished_at: Option<chrono::DateTime<Utc>>,
    pub error: Option<AppError>,
}

impl EncodeJob {
    fn new() -> Self {
        Self {
            status: JobStatus::Pending,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    /// Move to the next pipeline stage. Transitions are forward-only.
    fn advance(&mut self, to: JobStatus) {
        debug_assert!(to > self.status, "{:?} -> {:?} is not forward", self.status, to);
        info!("Job stage: {:?} -> {:?}", self.status, to);
        self.status = to;
        if matches!(to, JobStatus::Done) {
            self.finished_at = Some(Utc::now());
        }
    }

    fn fail(&mut self, err: AppError) {
        error!("Job failed during {:?}: {}", self.status, err);
        self.status = JobStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(err);
    }
}

/// Sequences the pipeline end-to-end and owns all process-wide
/// resources: the subprocess ceiling, the job temp dir, the job
/// deadline. Nothing else allocates those.
pub struct Orchestrator {
    config: AppConfig,
    tools: Arc<dyn ToolSuite>,
}

impl Orchestrator {
    pub fn new(config: AppConfig, tools: Arc<dyn ToolSuite>) -> Self {
        Self { config, tools }
    }

    /// Run one job: sample -> search -> aggregate -> final encode.
    ///
    /// Temp artifacts are removed on every exit path, success or
    /// failure, when the job temp dir drops.
    pub async fn run(&self, input: &Path, output: &Path) -> Result<JobReport, AppError> {
        let mut job = EncodeJob::new();
        let started = Instant::now();
        let deadline = self
            .config
            .performance
            .job_timeout_secs
            .map(Duration::from_secs);

        let result = self
            .run_pipeline(&mut job, input, output, started, deadline)
            .await;

        match &result {
            Ok(_) => job.advance(JobStatus::Done),
            Err(e) => job.fail(e.clone()),
        }

        let wall = job
            .finished_at
            .map(|end| (end - job.started_at).num_seconds())
            .unwrap_or_default();
        match &job.error {
            Some(error) => info!("Job {:?} after {}s: {}", job.status, wall, error),
            None => info!("Job {:?} after {}s", job.status, wall),
        }
        result
    }

    async fn run_pipeline(
        &self,
        job: &mut EncodeJob,
        input: &Path,
        output: &Path,
        started: Instant,
        deadline: Option<Duration>,
    ) -> Result<JobReport, AppError> {
        // ---- Sampling ----
        job.advance(JobStatus::Sampling);
        let asset = self.tools.probe(input)?;
        info!(
            "Source: {} ({} {}, {}, {}, {}, {:.0}s)",
            asset.file_name(),
            asset.metadata.resolution_string(),
            ResolutionTier::from_dimensions(asset.metadata.width, asset.metadata.height),
            asset.metadata.codec_name,
            asset.metadata.hdr_type.display_string(),
            asset.metadata.frame_rate_string(),
            asset.metadata.duration_secs
        );
        if is_hevc_codec(&asset.metadata.codec_name) {
            warn!("Source is already HEVC; re-encoding may yield limited savings");
        }
        let space_probe_dir = output.parent().unwrap_or(Path::new("."));
        if !disk_space::has_enough_space(space_probe_dir, asset.size_bytes) {
            warn!(
                "Free space near {} looks below the source size; the final encode may fail",
                space_probe_dir.display()
            );
        }

        let temp_dir = tempfile::Builder::new()
            .prefix("hevcpress_")
            .tempdir()
            .map_err(|e| AppError::Sampling(format!("Failed to create temp dir: {}", e)))?;

        let segments = sampler::extract_segments(
            &asset,
            &self.config.sampling,
            temp_dir.path(),
            self.tools.as_ref(),
        )
        .await?;

        // ---- Searching ----
        job.advance(JobStatus::Searching);
        let score_profile = ScoreProfile {
            model: vmaf::select_model(asset.metadata.width, asset.metadata.height),
            pixel_format: asset.encode_pixel_format(),
            threads: self.config.performance.vmaf_threads,
            subsample: self.config.quality.vmaf_subsample,
        };
        // One pool for every search; total load is independent of the
        // segment count
        let permits = Arc::new(Semaphore::new(self.config.performance.concurrency));
        let runner = Arc::new(TrialRunner::new(
            self.tools.clone(),
            permits,
            Duration::from_secs(self.config.performance.trial_timeout_secs),
            score_profile.clone(),
            self.config.performance.x265_preset.clone(),
            asset.encode_pixel_format(),
            temp_dir.path().to_path_buf(),
        ));
        let controller = Arc::new(SearchController::new(
            runner,
            self.config.search.clone(),
            self.config.quality.target_vmaf,
        ));

        let mut tasks = JoinSet::new();
        for segment in segments.clone() {
            let controller = controller.clone();
            tasks.spawn(async move { controller.run(&segment).await });
        }

        let mut states = match deadline {
            Some(limit) => {
                let remaining = limit.saturating_sub(started.elapsed());
                match timeout(remaining, collect_states(&mut tasks)).await {
                    Ok(states) => states?,
                    Err(_) => {
                        // Cancel in-flight trials and pending searches;
                        // children die with their dropped tasks
                        tasks.abort_all();
                        return Err(AppError::JobTimeout(limit.as_secs()));
                    }
                }
            }
            None => collect_states(&mut tasks).await?,
        };
        states.sort_by_key(|s| s.segment_index);

        // ---- Aggregating ----
        job.advance(JobStatus::Aggregating);
        let decision = aggregate::aggregate(
            &states,
            &segments,
            asset.metadata.duration_secs,
            self.config.search.crf_tolerance,
        )?;
        info!(
            "Decision: {}; predicted size {} bytes, predicted VMAF {:.2}",
            decision
                .global_crf()
                .map_or("per-region crf map".to_string(), |crf| format!(
                    "global crf {}",
                    crf
                )),
            decision.predicted_output_bytes,
            decision.predicted_vmaf
        );

        let threshold = self.config.output.efficiency_threshold;
        if threshold > 0.0
            && decision.predicted_output_bytes as f64 > asset.size_bytes as f64 * (1.0 - threshold)
        {
            warn!(
                "Predicted reduction is below {:.0}% of source size; encoding anyway",
                threshold * 100.0
            );
        }

        // ---- FinalEncoding ----
        job.advance(JobStatus::FinalEncoding);
        let (base_crf, zones) = match &decision.kind {
            DecisionKind::Global { crf } => (*crf, None),
            DecisionKind::PerRegion { regions } => {
                let base = regions
                    .iter()
                    .map(|r| r.crf)
                    .min()
                    .unwrap_or(self.config.search.crf_min);
                let fps = asset.metadata.frame_rate();
                if fps > 0.0 {
                    (base, Some(build_zones(regions, fps)))
                } else {
                    // Frame-accurate zones need a frame rate; fall back
                    // to the most conservative region value everywhere
                    warn!("Source frame rate unknown; encoding whole file at crf {}", base);
                    (base, None)
                }
            }
        };

        let request = EncodeRequest {
            input: asset.path.clone(),
            output: output.to_path_buf(),
            crf: base_crf,
            preset: self.config.performance.x265_preset.clone(),
            pixel_format: asset.encode_pixel_format(),
            mode: EncodeMode::Production { zones },
        };
        info!("Final encode: crf {} preset {}", base_crf, request.preset);
        match self
            .tools
            .encode(&request, Some(asset.metadata.duration_secs))
            .await
        {
            EncodeOutcome::Success { .. } => {}
            EncodeOutcome::Failure { diagnostic } => {
                let _ = std::fs::remove_file(output);
                return Err(AppError::FinalEncode(diagnostic));
            }
        }

        let validation = validator::validate_output(output, asset.metadata.duration_secs);
        if !validation.is_valid() {
            let _ = std::fs::remove_file(output);
            return Err(AppError::FinalEncode(validation.messages.join("; ")));
        }
        info!(
            "Output validated: {:.1}s against {:.1}s source",
            validation.output_duration, validation.source_duration
        );

        let measured_vmaf = if self.config.quality.verify_final {
            let verify_profile = ScoreProfile {
                subsample: self.config.quality.verify_subsample,
                ..score_profile
            };
            match self.tools.score(input, output, &verify_profile).await {
                ScoreOutcome::Scored(score) => {
                    info!("Final verification: {}", score);
                    if !score.meets_threshold(self.config.quality.target_vmaf) {
                        warn!(
                            "Measured VMAF {:.2} is below target {:.1}",
                            score.score, self.config.quality.target_vmaf
                        );
                    }
                    Some(score.score)
                }
                ScoreOutcome::Failure { diagnostic } => {
                    warn!(
                        "Final VMAF verification failed: {}. Reporting without a measured score.",
                        diagnostic
                    );
                    None
                }
            }
        } else {
            None
        };

        let output_bytes = std::fs::metadata(output).map(|m| m.len()).unwrap_or(0);
        let (saved_bytes, saved_percent) = JobReport::size_reduction(asset.size_bytes, output_bytes);
        let finished_at = Utc::now();
        let report = JobReport {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            source_bytes: asset.size_bytes,
            output_bytes,
            saved_bytes,
            saved_percent,
            target_vmaf: self.config.quality.target_vmaf,
            decision,
            measured_vmaf,
            segments_sampled: segments.len(),
            trials_total: states.iter().map(|s| s.trials_used()).sum(),
            started_at: job.started_at,
            finished_at,
            wall_secs: started.elapsed().as_secs_f64(),
        };

        if self.config.output.write_summary {
            let summary_path = JobReport::summary_path(output);
            if let Err(e) = report.write_json(&summary_path) {
                warn!("Failed to write summary {}: {}", summary_path.display(), e);
            }
        }

        Ok(report)
    }
}

/// Drain the per-segment search tasks. A panicked task leaves the run
/// without a terminal state for its segment, which the pipeline treats
/// as fatal.
async fn collect_states(tasks: &mut JoinSet<SearchState>) -> Result<Vec<SearchState>, AppError> {
    let mut states = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(state) => states.push(state),
            Err(e) => {
                return Err(AppError::AggregationInconsistency(format!(
                    "segment search task failed: {}",
                    e
                )));
            }
        }
    }
    Ok(states)
}
