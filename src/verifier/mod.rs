pub mod validator;
pub mod vmaf;

pub use validator::{ValidationResult, validate_output};
pub use vmaf::{VmafScore, build_vmaf_filter, parse_vmaf_log, select_model};
