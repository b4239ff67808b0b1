use crate::encoder::command_builder::{EncodeMode, EncodeRequest, build_ffmpeg_args};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Outcome of one external encoder invocation.
///
/// Failures are data, not errors: the caller decides whether a failed
/// invocation is fatal (production encode) or merely a bad trial.
#[derive(Debug, Clone)]
pub enum EncodeOutcome {
    /// Encode completed; output size in bytes
    Success { output_bytes: u64 },
    /// Tool exited nonzero or could not be started
    Failure { diagnostic: String },
}

/// Run one encoder invocation to completion.
///
/// Production encodes write a progress file that is polled so long
/// encodes surface their position in the log; trial encodes run quiet.
/// The child is killed if the returned future is dropped, which is how
/// per-trial timeouts terminate a stuck encoder.
pub async fn encode_media(req: &EncodeRequest, duration_hint: Option<f64>) -> EncodeOutcome {
    let mut args = build_ffmpeg_args(req);

    let progress_file = match req.mode {
        EncodeMode::Production { .. } => {
            let path = std::env::temp_dir().join(format!(
                "hevcpress_progress_{}_{}",
                std::process::id(),
                uuid::Uuid::new_v4().simple()
            ));
            if std::fs::File::create(&path).is_ok() {
                // Insert progress args after -nostdin
                args.insert(2, "-progress".to_string());
                args.insert(3, path.to_string_lossy().to_string());
                Some(path)
            } else {
                None
            }
        }
        EncodeMode::Trial => None,
    };

    debug!(
        "Encoding: {} -> {} (crf {})",
        req.input.display(),
        req.output.display(),
        req.crf
    );

    let child = Command::new("ffmpeg")
        .args(&args)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let mut child = match child {
        Ok(c) => c,
        Err(e) => {
            cleanup_progress(progress_file.as_deref());
            return EncodeOutcome::Failure {
                diagnostic: format!("Failed to start ffmpeg: {}", e),
            };
        }
    };

    let stderr = child.stderr.take();

    // Drain stderr concurrently so a chatty encoder cannot fill the
    // pipe and stall; keep only the tail for diagnostics.
    let stderr_task = tokio::spawn(async move {
        use tokio::io::AsyncReadExt;
        let mut buf = String::new();
        if let Some(mut pipe) = stderr {
            let _ = pipe.read_to_string(&mut buf).await;
        }
        buf
    });

    let result = match &progress_file {
        Some(path) => wait_with_progress(&mut child, path, duration_hint).await,
        None => child.wait().await,
    };

    let stderr_text = stderr_task.await.unwrap_or_default();
    cleanup_progress(progress_file.as_deref());

    let status = match result {
        Ok(status) => status,
        Err(e) => {
            return EncodeOutcome::Failure {
                diagnostic: format!("Failed to wait for ffmpeg: {}", e),
            };
        }
    };

    if !status.success() {
        let _ = std::fs::remove_file(&req.output);
        let diagnostic = if stderr_text.is_empty() {
            format!("ffmpeg failed with status: {}", status)
        } else {
            stderr_tail(&stderr_text, 5)
        };
        return EncodeOutcome::Failure { diagnostic };
    }

    match std::fs::metadata(&req.output) {
        Ok(meta) if meta.len() > 0 => EncodeOutcome::Success {
            output_bytes: meta.len(),
        },
        _ => EncodeOutcome::Failure {
            diagnostic: "ffmpeg exited zero but produced no output".to_string(),
        },
    }
}

/// Wait for the child while polling the progress file, logging at
/// roughly 10% steps
async fn wait_with_progress(
    child: &mut tokio::process::Child,
    progress_file: &Path,
    duration_hint: Option<f64>,
) -> std::io::Result<std::process::ExitStatus> {
    let mut last_logged_decile = 0u32;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }

        if let Some(duration) = duration_hint
            && duration > 0.0
            && let Ok(content) = std::fs::read_to_string(progress_file)
        {
            let mut latest_time_us: Option<f64> = None;
            for line in content.lines() {
                if let Some(value) = line.strip_prefix("out_time_us=")
                    && let Ok(time_us) = value.trim().parse::<f64>()
                    && time_us > 0.0
                {
                    latest_time_us = Some(time_us);
                }
            }

            if let Some(time_us) = latest_time_us {
                let percent = (time_us / 1_000_000.0 / duration * 100.0).min(100.0);
                let decile = (percent / 10.0) as u32;
                if decile > last_logged_decile {
                    last_logged_decile = decile;
                    info!("Final encode progress: {:.0}%", percent);
                }
            }
        }

        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

/// Last lines of an ffmpeg stderr dump, newest last
fn stderr_tail(stderr: &str, lines: usize) -> String {
    let tail: Vec<&str> = stderr.lines().rev().take(lines).collect();
    tail.into_iter().rev().collect::<Vec<_>>().join("\n")
}

fn cleanup_progress(path: Option<&Path>) {
    if let Some(path) = path {
        let _ = std::fs::remove_file(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_tail_keeps_last_lines_in_order() {
        let text = "one\ntwo\nthree\nfour\nfive\nsix";
        assert_eq!(stderr_tail(text, 3), "four\nfive\nsix");
        assert_eq!(stderr_tail("only", 3), "only");
    }
}
