use crate::analyzer::metadata::{HdrType, VideoAsset, VideoMetadata};
use crate::error::AppError;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::process::Command;

/// Probe a source video using ffprobe
pub fn probe(input_path: &Path) -> Result<VideoAsset, AppError> {
    let size_bytes = std::fs::metadata(input_path)
        .map_err(|e| AppError::Analysis(format!("Cannot stat {}: {}", input_path.display(), e)))?
        .len();

    let metadata = probe_video_stream(input_path)?;
    tracing::debug!(
        "Probed {}: {} {}, {:.3}s, bitrate {}",
        input_path.display(),
        metadata.codec_name,
        metadata.resolution_string(),
        metadata.duration_secs,
        metadata
            .bitrate
            .map(|b| format!("{} b/s", b))
            .unwrap_or_else(|| "unknown".to_string())
    );

    Ok(VideoAsset {
        path: input_path.to_path_buf(),
        size_bytes,
        metadata,
    })
}

/// Probe the primary video stream
fn probe_video_stream(input_path: &Path) -> Result<VideoMetadata, AppError> {
    let args = [
        "-v",
        "error",
        "-select_streams",
        "v:0",
        "-show_entries",
        "stream=width,height,pix_fmt,color_primaries,color_transfer,color_space,codec_name,r_frame_rate,avg_frame_rate,bit_rate,side_data_list",
        "-show_entries",
        "format=duration,bit_rate",
        "-of",
        "json",
    ];

    let output = run_ffprobe(&args, input_path)?;
    let data: FfprobeOutput = serde_json::from_str(&output)
        .map_err(|e| AppError::Analysis(format!("Failed to parse ffprobe output: {}", e)))?;

    let stream = data
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Analysis("No video stream found".to_string()))?;

    // Check for Dolby Vision
    let is_dolby_vision = stream
        .side_data_list
        .as_ref()
        .map(|list| list.iter().any(|v| v.to_string().contains("Dolby Vision")))
        .unwrap_or(false);

    // Determine HDR type
    let hdr_type = if is_dolby_vision {
        HdrType::DolbyVision
    } else {
        match stream.color_transfer.as_deref() {
            Some("smpte2084") => HdrType::Pq,
            Some("arib-std-b67") => HdrType::Hlg,
            _ => HdrType::Sdr,
        }
    };

    // Parse frame rate
    let (frame_rate_num, frame_rate_den) = parse_frame_rate(
        stream
            .r_frame_rate
            .as_deref()
            .or(stream.avg_frame_rate.as_deref()),
    );

    // Parse duration
    let duration_secs = data
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    if duration_secs <= 0.0 {
        return Err(AppError::Analysis(
            "Source has no usable duration".to_string(),
        ));
    }

    // Parse bitrate from format, falling back to the stream
    let bitrate = data
        .format
        .as_ref()
        .and_then(|f| f.bit_rate.as_deref())
        .and_then(|b| b.parse::<u64>().ok())
        .or_else(|| {
            stream
                .bit_rate
                .as_deref()
                .and_then(|b| b.parse::<u64>().ok())
        });

    Ok(VideoMetadata {
        width: stream.width,
        height: stream.height,
        hdr_type,
        codec_name: stream.codec_name.unwrap_or_else(|| "unknown".to_string()),
        pixel_format: stream.pix_fmt,
        frame_rate_num,
        frame_rate_den,
        duration_secs,
        bitrate,
    })
}

/// Parse frame rate from ffprobe format
fn parse_frame_rate(rate_str: Option<&str>) -> (u32, u32) {
    rate_str
        .and_then(|s| {
            let parts: Vec<&str> = s.split('/').collect();
            if parts.len() == 2 {
                let num = parts[0].parse::<u32>().ok()?;
                let den = parts[1].parse::<u32>().ok()?;
                if den > 0 {
                    return Some((num, den));
                }
            }
            None
        })
        .unwrap_or((0, 1))
}

/// Get a media file's duration in seconds via ffprobe
pub fn get_duration(path: &Path) -> Option<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .ok()?;

    String::from_utf8_lossy(&output.stdout).trim().parse().ok()
}

/// Run ffprobe with arguments
fn run_ffprobe(args: &[&str], input_path: &Path) -> Result<String, AppError> {
    let output = Command::new("ffprobe")
        .args(args)
        .arg(input_path)
        .output()
        .map_err(|e| AppError::Analysis(format!("Failed to execute ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::Analysis(format!("ffprobe failed: {}", stderr)));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

// JSON deserialization structures

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    streams: Vec<VideoStream>,
    format: Option<FormatInfo>,
}

#[derive(Debug, Deserialize)]
struct FormatInfo {
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(unused)]
struct VideoStream {
    width: u32,
    height: u32,
    codec_name: Option<String>,
    pix_fmt: Option<String>,
    color_primaries: Option<String>,
    color_transfer: Option<String>,
    color_space: Option<String>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    bit_rate: Option<String>,
    side_data_list: Option<Vec<Value>>,
}
