use std::path::PathBuf;

/// HDR type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HdrType {
    /// Standard Dynamic Range
    #[default]
    Sdr,
    /// PQ (Perceptual Quantizer) - HDR10/HDR10+
    Pq,
    /// HLG (Hybrid Log-Gamma)
    Hlg,
    /// Dolby Vision
    DolbyVision,
}

impl HdrType {
    /// Check if this is any HDR format
    pub fn is_hdr(&self) -> bool {
        !matches!(self, HdrType::Sdr)
    }

    /// Get display string for this HDR type
    pub fn display_string(&self) -> &'static str {
        match self {
            HdrType::Sdr => "SDR",
            HdrType::Pq => "HDR10",
            HdrType::Hlg => "HLG",
            HdrType::DolbyVision => "Dolby Vision",
        }
    }
}

/// Video metadata from analysis
#[derive(Debug, Clone)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub hdr_type: HdrType,
    pub codec_name: String,
    pub pixel_format: Option<String>,
    pub frame_rate_num: u32,
    pub frame_rate_den: u32,
    pub duration_secs: f64,
    pub bitrate: Option<u64>,
}

impl VideoMetadata {
    /// Get resolution string
    pub fn resolution_string(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Frame rate as a float, 0.0 if unknown
    pub fn frame_rate(&self) -> f64 {
        if self.frame_rate_den > 0 {
            self.frame_rate_num as f64 / self.frame_rate_den as f64
        } else {
            0.0
        }
    }

    /// Get frame rate string
    pub fn frame_rate_string(&self) -> String {
        let frame_rate = self.frame_rate();
        if frame_rate > 0.0 {
            format!("{:.3} fps", frame_rate)
        } else {
            "Unknown".to_string()
        }
    }
}

/// A probed source video. Immutable once loaded; read by the sampler
/// and every downstream stage.
#[derive(Debug, Clone)]
pub struct VideoAsset {
    /// Source file path
    pub path: PathBuf,
    /// Source file size in bytes
    pub size_bytes: u64,
    /// Probed stream/container metadata
    pub metadata: VideoMetadata,
}

impl VideoAsset {
    /// Pixel format for encoding: 10-bit when the source is HDR or
    /// already carries 10-bit samples, 8-bit otherwise
    pub fn encode_pixel_format(&self) -> &'static str {
        let source_is_10bit = self
            .metadata
            .pixel_format
            .as_deref()
            .is_some_and(|pf| pf.contains("10"));
        if self.metadata.hdr_type.is_hdr() || source_is_10bit {
            "yuv420p10le"
        } else {
            "yuv420p"
        }
    }

    /// File name for display
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn asset(hdr_type: HdrType, pixel_format: Option<&str>) -> VideoAsset {
        VideoAsset {
            path: PathBuf::from("/library/movie.mkv"),
            size_bytes: 1_000,
            metadata: VideoMetadata {
                width: 1920,
                height: 1080,
                hdr_type,
                codec_name: "h264".to_string(),
                pixel_format: pixel_format.map(str::to_string),
                frame_rate_num: 24,
                frame_rate_den: 1,
                duration_secs: 600.0,
                bitrate: None,
            },
        }
    }

    #[test]
    fn sdr_8bit_source_encodes_8bit() {
        assert_eq!(
            asset(HdrType::Sdr, Some("yuv420p")).encode_pixel_format(),
            "yuv420p"
        );
    }

    #[test]
    fn hdr_and_10bit_sources_encode_10bit() {
        assert_eq!(
            asset(HdrType::Pq, Some("yuv420p10le")).encode_pixel_format(),
            "yuv420p10le"
        );
        // 10-bit SDR keeps its depth
        assert_eq!(
            asset(HdrType::Sdr, Some("yuv420p10le")).encode_pixel_format(),
            "yuv420p10le"
        );
    }
}
