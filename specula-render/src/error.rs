use specula_gpu_shared::shaders::{ComputeKernel, ShaderPass};
use thiserror::Error;

use crate::pipeline::Phase;
use crate::targets::{TargetFormat, TargetKey};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SsrError {
    #[error("format {format:?} for target {key:?} is not supported by the backend")]
    UnsupportedFormat { key: TargetKey, format: TargetFormat },

    #[error("shader {0} is not available")]
    MissingShaderPass(ShaderPass),

    #[error("compute kernel {0} is not available")]
    MissingKernel(ComputeKernel),

    #[error("target {0:?} was not allocated this frame")]
    MissingTarget(TargetKey),

    #[error("camera resolution {width}x{height} is empty")]
    EmptyResolution { width: u32, height: u32 },

    #[error("{call} called in phase {phase:?}")]
    Lifecycle { call: &'static str, phase: Phase },

    #[error("backend error: {0}")]
    Backend(String),
}

impl SsrError {
    /// Errors that only disable the stages depending on the missing piece.
    /// Everything else fails the frame.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            SsrError::UnsupportedFormat { .. }
                | SsrError::MissingShaderPass(_)
                | SsrError::MissingKernel(_)
        )
    }
}

impl From<String> for SsrError {
    fn from(message: String) -> Self {
        SsrError::Backend(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degradable_classification() {
        assert!(SsrError::MissingKernel(ComputeKernel::GetHiZ).is_degradable());
        assert!(SsrError::MissingShaderPass(ShaderPass::Resolve).is_degradable());
        assert!(SsrError::UnsupportedFormat {
            key: TargetKey::HitData,
            format: TargetFormat::Rgba32Float
        }
        .is_degradable());
        assert!(!SsrError::Backend("device lost".into()).is_degradable());
        assert!(!SsrError::EmptyResolution { width: 0, height: 4 }.is_degradable());
    }

    #[test]
    fn test_messages() {
        let e = SsrError::MissingKernel(ComputeKernel::LerpDownUpTex);
        assert_eq!(e.to_string(), "compute kernel LerpDownUpTex is not available");
        let e: SsrError = String::from("queue closed").into();
        assert_eq!(e.to_string(), "backend error: queue closed");
    }
}
