use crate::analyzer::{self, VideoAsset};
use crate::encoder::{self, EncodeOutcome, EncodeRequest};
#[cfg(test)]
use crate::encoder::EncodeMode;
use crate::error::AppError;
use crate::sampler::Window;
use crate::verifier::vmaf;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Outcome of one quality-metric invocation
#[derive(Debug, Clone)]
pub enum ScoreOutcome {
    /// Metric completed with a pooled score
    Scored(vmaf::VmafScore),
    /// Tool exited nonzero or produced unparseable output
    Failure { diagnostic: String },
}

/// Parameters for one metric invocation, derived from the probed source
#[derive(Debug, Clone)]
pub struct ScoreProfile {
    /// libvmaf model version
    pub model: &'static str,
    /// Pixel format both inputs are normalized to
    pub pixel_format: &'static str,
    /// Metric worker threads
    pub threads: u32,
    /// Frame subsampling (1 = every frame)
    pub subsample: u32,
}

/// The external tools the engine drives, as one opaque capability.
///
/// Every subprocess the pipeline runs goes through this trait, so tests
/// can substitute deterministic implementations and the search logic
/// never touches a real encoder.
#[async_trait]
pub trait ToolSuite: Send + Sync {
    /// Probe a source file's stream and container metadata
    fn probe(&self, input: &Path) -> Result<VideoAsset, AppError>;

    /// Extract one sample window by stream copy
    async fn extract(&self, input: &Path, window: &Window, output: &Path) -> EncodeOutcome;

    /// Run one encoder invocation
    async fn encode(&self, req: &EncodeRequest, duration_hint: Option<f64>) -> EncodeOutcome;

    /// Score a distorted encode against its reference
    async fn score(&self, reference: &Path, distorted: &Path, profile: &ScoreProfile)
    -> ScoreOutcome;
}

/// Production tool suite backed by ffmpeg/ffprobe with libx265 and libvmaf
pub struct FfmpegTools;

#[async_trait]
impl ToolSuite for FfmpegTools {
    fn probe(&self, input: &Path) -> Result<VideoAsset, AppError> {
        analyzer::probe(input)
    }

    async fn extract(&self, input: &Path, window: &Window, output: &Path) -> EncodeOutcome {
        let args = encoder::build_extract_args(input, window, output);
        let result = Command::new("ffmpeg")
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        let out = match result {
            Ok(out) => out,
            Err(e) => {
                return EncodeOutcome::Failure {
                    diagnostic: format!("Failed to run ffmpeg: {}", e),
                };
            }
        };

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return EncodeOutcome::Failure {
                diagnostic: stderr.lines().last().unwrap_or("unknown error").to_string(),
            };
        }

        match std::fs::metadata(output) {
            Ok(meta) if meta.len() > 0 => EncodeOutcome::Success {
                output_bytes: meta.len(),
            },
            _ => EncodeOutcome::Failure {
                diagnostic: "extraction produced an empty file".to_string(),
            },
        }
    }

    async fn encode(&self, req: &EncodeRequest, duration_hint: Option<f64>) -> EncodeOutcome {
        encoder::encode_media(req, duration_hint).await
    }

    async fn score(
        &self,
        reference: &Path,
        distorted: &Path,
        profile: &ScoreProfile,
    ) -> ScoreOutcome {
        let log_path = std::env::temp_dir().join(format!(
            "hevcpress_vmaf_{}_{}.json",
            std::process::id(),
            uuid::Uuid::new_v4().simple()
        ));

        let filter = vmaf::build_vmaf_filter(
            &log_path,
            profile.model,
            profile.pixel_format,
            profile.threads,
            profile.subsample,
        );

        debug!(
            "Scoring {} against {} (model {})",
            distorted.display(),
            reference.display(),
            profile.model
        );

        let result = Command::new("ffmpeg")
            .arg("-nostdin")
            .arg("-i")
            .arg(reference)
            .arg("-i")
            .arg(distorted)
            .args(["-lavfi", &filter, "-f", "null", "-"])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        let out = match result {
            Ok(out) => out,
            Err(e) => {
                let _ = std::fs::remove_file(&log_path);
                return ScoreOutcome::Failure {
                    diagnostic: format!("Failed to run ffmpeg for VMAF: {}", e),
                };
            }
        };

        if !out.status.success() {
            let _ = std::fs::remove_file(&log_path);
            let stderr = String::from_utf8_lossy(&out.stderr);
            if stderr.contains("No such filter: 'libvmaf'") || stderr.contains("Unknown libvmaf") {
                return ScoreOutcome::Failure {
                    diagnostic: "VMAF not available. FFmpeg must be compiled with libvmaf support."
                        .to_string(),
                };
            }
            return ScoreOutcome::Failure {
                diagnostic: format!(
                    "VMAF calculation failed: {}",
                    stderr.lines().last().unwrap_or("unknown error")
                ),
            };
        }

        let json_content = match std::fs::read_to_string(&log_path) {
            Ok(content) => content,
            Err(e) => {
                return ScoreOutcome::Failure {
                    diagnostic: format!("Failed to read VMAF output: {}", e),
                };
            }
        };
        let _ = std::fs::remove_file(&log_path);

        match vmaf::parse_vmaf_log(&json_content) {
            Ok(score) => ScoreOutcome::Scored(score),
            Err(e) => ScoreOutcome::Failure { diagnostic: e },
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use crate::analyzer::{HdrType, VideoMetadata};
    use std::sync::Arc;
    use std::time::Duration;

    /// What the mock encoder does for one invocation
    #[derive(Debug, Clone)]
    pub enum MockEncode {
        Ok,
        Fail,
        Hang,
    }

    /// One mock encoder invocation, reconstructed from the request
    #[derive(Debug, Clone)]
    pub enum MockCall {
        Trial {
            segment: usize,
            crf: u8,
            attempt: u32,
        },
        Production {
            crf: u8,
        },
    }

    type ScoreFn = dyn Fn(usize, u8) -> Option<f64> + Send + Sync;
    type BytesFn = dyn Fn(usize, u8) -> u64 + Send + Sync;
    type EncodeFn = dyn Fn(&MockCall) -> MockEncode + Send + Sync;

    /// Deterministic in-test tool suite. Scores and sizes come from
    /// closures over (segment index, crf); encode behavior is keyed on
    /// the reconstructed invocation so transient failures, hangs and
    /// production-only crashes can all be simulated.
    pub struct MockTools {
        pub duration_secs: f64,
        score_fn: Arc<ScoreFn>,
        bytes_fn: Arc<BytesFn>,
        encode_fn: Arc<EncodeFn>,
    }

    impl MockTools {
        pub fn new(score_fn: impl Fn(usize, u8) -> Option<f64> + Send + Sync + 'static) -> Self {
            Self {
                duration_secs: 600.0,
                score_fn: Arc::new(score_fn),
                // Size falls as crf rises: the monotonicity the search assumes
                bytes_fn: Arc::new(|_, crf| 40_000_000u64.saturating_sub(crf as u64 * 700_000)),
                encode_fn: Arc::new(|_| MockEncode::Ok),
            }
        }

        pub fn with_bytes(
            mut self,
            bytes_fn: impl Fn(usize, u8) -> u64 + Send + Sync + 'static,
        ) -> Self {
            self.bytes_fn = Arc::new(bytes_fn);
            self
        }

        pub fn with_encode(
            mut self,
            encode_fn: impl Fn(&MockCall) -> MockEncode + Send + Sync + 'static,
        ) -> Self {
            self.encode_fn = Arc::new(encode_fn);
            self
        }

        pub fn with_duration(mut self, duration_secs: f64) -> Self {
            self.duration_secs = duration_secs;
            self
        }

        fn synthetic_asset(&self, input: &Path) -> VideoAsset {
            VideoAsset {
                path: input.to_path_buf(),
                size_bytes: 4_000_000_000,
                metadata: VideoMetadata {
                    width: 1920,
                    height: 1080,
                    hdr_type: HdrType::Sdr,
                    codec_name: "h264".to_string(),
                    pixel_format: Some("yuv420p".to_string()),
                    frame_rate_num: 24000,
                    frame_rate_den: 1001,
                    duration_secs: self.duration_secs,
                    bitrate: Some(8_000_000),
                },
            }
        }
    }

    /// Recover (segment index, crf, attempt) from an artifact path
    /// produced by the trial runner's naming scheme
    pub fn parse_artifact(path: &Path) -> Option<(usize, u8, u32)> {
        let name = path.file_name()?.to_str()?;
        let rest = name.strip_prefix("seg")?;
        let (idx, rest) = rest.split_once("_crf")?;
        let (crf, rest) = rest.split_once("_try")?;
        let (attempt, _) = rest.split_once('_')?;
        Some((idx.parse().ok()?, crf.parse().ok()?, attempt.parse().ok()?))
    }

    #[async_trait]
    impl ToolSuite for MockTools {
        fn probe(&self, input: &Path) -> Result<VideoAsset, AppError> {
            Ok(self.synthetic_asset(input))
        }

        async fn extract(&self, _input: &Path, _window: &Window, _output: &Path) -> EncodeOutcome {
            // No media is written; downstream mocks key off paths alone
            EncodeOutcome::Success { output_bytes: 1024 }
        }

        async fn encode(&self, req: &EncodeRequest, _duration_hint: Option<f64>) -> EncodeOutcome {
            let call = match req.mode {
                EncodeMode::Production { .. } => MockCall::Production { crf: req.crf },
                EncodeMode::Trial => {
                    let (segment, crf, attempt) =
                        parse_artifact(&req.output).unwrap_or((0, req.crf, 0));
                    MockCall::Trial {
                        segment,
                        crf,
                        attempt,
                    }
                }
            };
            let segment_index = match &call {
                MockCall::Trial { segment, .. } => *segment,
                MockCall::Production { .. } => 0,
            };
            match (self.encode_fn)(&call) {
                MockEncode::Ok => {
                    // Production outputs must exist on disk for the
                    // post-encode validation to inspect
                    if matches!(req.mode, EncodeMode::Production { .. }) {
                        let _ = std::fs::write(&req.output, b"mock production output");
                    }
                    EncodeOutcome::Success {
                        output_bytes: (self.bytes_fn)(segment_index, req.crf),
                    }
                }
                MockEncode::Fail => EncodeOutcome::Failure {
                    diagnostic: "mock encoder crashed".to_string(),
                },
                MockEncode::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    EncodeOutcome::Failure {
                        diagnostic: "unreachable".to_string(),
                    }
                }
            }
        }

        async fn score(
            &self,
            _reference: &Path,
            distorted: &Path,
            _profile: &ScoreProfile,
        ) -> ScoreOutcome {
            let Some((segment_index, crf, _)) = parse_artifact(distorted) else {
                return ScoreOutcome::Failure {
                    diagnostic: format!("unrecognized artifact path: {}", distorted.display()),
                };
            };
            match (self.score_fn)(segment_index, crf) {
                Some(score) => ScoreOutcome::Scored(vmaf::VmafScore {
                    score,
                    min_score: score - 1.0,
                    max_score: (score + 1.0).min(100.0),
                }),
                None => ScoreOutcome::Failure {
                    diagnostic: "mock metric failed".to_string(),
                },
            }
        }
    }
}
