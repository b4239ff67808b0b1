pub mod command_builder;
pub mod ffmpeg;

pub use command_builder::{EncodeMode, EncodeRequest, build_extract_args, build_ffmpeg_args, build_zones};
pub use ffmpeg::{EncodeOutcome, encode_media};
