//! Stage recorders. Each one appends its commands to the frame context and
//! reports whether it ran. Degradations (missing pass, kernel or format,
//! skipped upstream stage) become `StageStatus::Skipped`; only backend
//! failures are returned as errors.

/// Unwrap a `Result<_, SkipReason>` or return the skip from the stage.
macro_rules! require {
    ($e:expr) => {
        match $e {
            Ok(value) => value,
            Err(reason) => return Ok($crate::report::StageStatus::Skipped(reason)),
        }
    };
}

pub mod blur;
pub mod composite;
pub mod debug;
pub mod depth;
pub mod ray_march;
pub mod resolve;
