use crate::aggregate::Region;
use crate::sampler::Window;
use std::path::{Path, PathBuf};

/// Parameters for one encoder invocation
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Quantization level (libx265 CRF)
    pub crf: u8,
    /// x265 preset
    pub preset: String,
    /// Encoding pixel format (8-bit SDR or 10-bit HDR)
    pub pixel_format: &'static str,
    pub mode: EncodeMode,
}

/// What kind of encode this request is
#[derive(Debug, Clone)]
pub enum EncodeMode {
    /// Trial encode of an extracted sample: video stream only
    Trial,
    /// Full-length production encode: audio copied, metadata and
    /// chapters mapped, streaming-friendly container flags
    Production {
        /// x265 zones string for per-region quantization, if any
        zones: Option<String>,
    },
}

/// Build FFmpeg arguments for an encode request
pub fn build_ffmpeg_args(req: &EncodeRequest) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-nostdin".to_string(),
        "-i".to_string(),
        req.input.to_string_lossy().to_string(),
        "-map".to_string(),
        "0:v:0".to_string(),
    ];

    match &req.mode {
        EncodeMode::Trial => {
            args.extend(["-an".to_string(), "-sn".to_string()]);
        }
        EncodeMode::Production { .. } => {
            args.extend(["-map".to_string(), "0:a?".to_string()]);
        }
    }

    args.extend(["-c:v".to_string(), "libx265".to_string()]);
    args.extend(["-preset".to_string(), req.preset.clone()]);

    let mut x265_params = format!("crf={}", req.crf);
    if let EncodeMode::Production { zones: Some(zones) } = &req.mode {
        x265_params.push_str(&format!(":zones={}", zones));
    }
    args.extend(["-x265-params".to_string(), x265_params]);

    args.extend(["-pix_fmt".to_string(), req.pixel_format.to_string()]);

    if let EncodeMode::Production { .. } = req.mode {
        let profile = if req.pixel_format.ends_with("10le") {
            "main10"
        } else {
            "main"
        };
        args.extend([
            "-tag:v".to_string(),
            "hvc1".to_string(),
            "-profile:v".to_string(),
            profile.to_string(),
            "-level:v".to_string(),
            "5.1".to_string(),
            "-c:a".to_string(),
            "copy".to_string(),
            "-map_metadata".to_string(),
            "0".to_string(),
            "-map_chapters".to_string(),
            "0".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
        ]);
    }

    args.push(req.output.to_string_lossy().to_string());
    args
}

/// Build the x265 zones string realizing per-region quantization.
///
/// Zones take frame ranges and a fixed `q`; at equal values q is a
/// close, slightly conservative stand-in for CRF within a region.
pub fn build_zones(regions: &[Region], fps: f64) -> String {
    regions
        .iter()
        .map(|region| {
            let start_frame = (region.start_secs * fps).round() as u64;
            let end_frame = ((region.end_secs * fps).round() as u64)
                .saturating_sub(1)
                .max(start_frame);
            format!("{},{},q={}", start_frame, end_frame, region.crf)
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Build FFmpeg arguments for stream-copy extraction of a sample window
pub fn build_extract_args(input: &Path, window: &Window, output: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-nostdin".to_string(),
        "-ss".to_string(),
        format!("{:.3}", window.start_secs),
        "-t".to_string(),
        format!("{:.3}", window.duration_secs),
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-map".to_string(),
        "0:v:0".to_string(),
        "-an".to_string(),
        "-sn".to_string(),
        "-c".to_string(),
        "copy".to_string(),
        output.to_string_lossy().to_string(),
    ]
}
