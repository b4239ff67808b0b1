pub mod classifier;
pub mod ffprobe;
pub mod metadata;

pub use classifier::{ResolutionTier, is_hevc_codec};
pub use ffprobe::probe;
pub use metadata::{HdrType, VideoAsset, VideoMetadata};
