use std::process::Command;

/// Status of the external tools the pipeline needs
#[derive(Debug, Clone)]
pub struct DependencyStatus {
    pub ffmpeg: bool,
    pub ffprobe: bool,
    pub libvmaf: bool,
    pub libx265: bool,
}

impl DependencyStatus {
    /// Check all dependencies
    pub fn check() -> Self {
        Self {
            ffmpeg: check_command("ffmpeg", &["-version"]),
            ffprobe: check_command("ffprobe", &["-version"]),
            libvmaf: check_vmaf_available(),
            libx265: check_x265_available(),
        }
    }

    pub fn all_available(&self) -> bool {
        self.ffmpeg && self.ffprobe && self.libvmaf && self.libx265
    }

    /// Names of the missing pieces, for the startup error message
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.ffmpeg {
            missing.push("ffmpeg");
        }
        if !self.ffprobe {
            missing.push("ffprobe");
        }
        if !self.libvmaf {
            missing.push("ffmpeg libvmaf filter");
        }
        if !self.libx265 {
            missing.push("ffmpeg libx265 encoder");
        }
        missing
    }
}

/// Check if a command is available
fn check_command(cmd: &str, args: &[&str]) -> bool {
    Command::new(cmd)
        .args(args)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

/// Check if VMAF is available in FFmpeg
fn check_vmaf_available() -> bool {
    Command::new("ffmpeg")
        .args(["-filters"])
        .output()
        .ok()
        .map(|o| String::from_utf8_lossy(&o.stdout).contains("libvmaf"))
        .unwrap_or(false)
}

/// Check if the x265 encoder is available in FFmpeg
fn check_x265_available() -> bool {
    Command::new("ffmpeg")
        .args(["-encoders"])
        .output()
        .ok()
        .map(|o| String::from_utf8_lossy(&o.stdout).contains("libx265"))
        .unwrap_or(false)
}
