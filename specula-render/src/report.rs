//! Per-frame outcome of every stage.

use std::collections::HashSet;
use std::fmt;

use specula_gpu_shared::shaders::{ComputeKernel, ShaderPass};

use crate::targets::TargetKey;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    CopySource,
    CopyDepth,
    HiZ,
    RayMarch,
    Debug,
    Resolve,
    Temporal,
    Blur,
    Composite,
}

impl Stage {
    pub const ALL: [Stage; 9] = [
        Stage::CopySource,
        Stage::CopyDepth,
        Stage::HiZ,
        Stage::RayMarch,
        Stage::Debug,
        Stage::Resolve,
        Stage::Temporal,
        Stage::Blur,
        Stage::Composite,
    ];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SkipReason {
    MissingShaderPass(ShaderPass),
    MissingKernel(ComputeKernel),
    UnsupportedFormat(TargetKey),
    /// A stage this one reads from did not run.
    UpstreamSkipped(Stage),
    /// Turned off by settings.
    Disabled,
    /// Replaced by the debug view.
    DebugOverride,
}

impl SkipReason {
    /// Reasons that are only a consequence of another skip.
    fn is_derived(&self) -> bool {
        matches!(
            self,
            SkipReason::UpstreamSkipped(_) | SkipReason::Disabled | SkipReason::DebugOverride
        )
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingShaderPass(pass) => write!(f, "missing shader {pass}"),
            SkipReason::MissingKernel(kernel) => write!(f, "missing kernel {kernel}"),
            SkipReason::UnsupportedFormat(key) => write!(f, "unsupported format for {key:?}"),
            SkipReason::UpstreamSkipped(stage) => write!(f, "upstream {stage:?} skipped"),
            SkipReason::Disabled => f.write_str("disabled"),
            SkipReason::DebugOverride => f.write_str("replaced by debug view"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageStatus {
    Completed,
    Skipped(SkipReason),
}

impl StageStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, StageStatus::Completed)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameReport {
    pub frame_index: u64,
    pub stages: Vec<(Stage, StageStatus)>,
    pub commands_submitted: usize,
}

impl FrameReport {
    pub fn new(frame_index: u64) -> Self {
        Self {
            frame_index,
            ..Default::default()
        }
    }

    pub fn record(&mut self, stage: Stage, status: StageStatus) {
        match status {
            StageStatus::Completed => {
                log::debug!("SSR frame {}: {stage:?} completed", self.frame_index)
            }
            StageStatus::Skipped(reason) => {
                log::debug!("SSR frame {}: {stage:?} skipped ({reason})", self.frame_index)
            }
        }
        self.stages.push((stage, status));
    }

    pub fn status(&self, stage: Stage) -> Option<StageStatus> {
        self.stages.iter().find(|(s, _)| *s == stage).map(|(_, st)| *st)
    }

    pub fn completed(&self, stage: Stage) -> bool {
        self.status(stage).is_some_and(|s| s.is_completed())
    }

    pub fn skipped(&self) -> impl Iterator<Item = (Stage, SkipReason)> + '_ {
        self.stages.iter().filter_map(|(stage, status)| match status {
            StageStatus::Skipped(reason) => Some((*stage, *reason)),
            StageStatus::Completed => None,
        })
    }

    /// Root-cause skip reasons of this frame.
    pub fn degradations(&self) -> Vec<SkipReason> {
        let mut out = Vec::new();
        for (_, reason) in self.skipped() {
            if !reason.is_derived() && !out.contains(&reason) {
                out.push(reason);
            }
        }
        out
    }
}

/// Remembers which degradations were already reported so each distinct one
/// is warned about once per pipeline, not every frame.
#[derive(Debug, Default)]
pub struct DegradeLog {
    seen: HashSet<SkipReason>,
}

impl DegradeLog {
    /// Returns how many new reasons were logged.
    pub fn observe(&mut self, report: &FrameReport) -> usize {
        let mut fresh = 0;
        for reason in report.degradations() {
            if self.seen.insert(reason) {
                log::warn!("SSR degraded: {reason}; dependent stages are skipped");
                fresh += 1;
            }
        }
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_queries() {
        let mut report = FrameReport::new(3);
        let missing = SkipReason::MissingKernel(ComputeKernel::GetHiZ);
        report.record(Stage::HiZ, StageStatus::Skipped(missing));
        report.record(
            Stage::RayMarch,
            StageStatus::Skipped(SkipReason::UpstreamSkipped(Stage::HiZ)),
        );
        report.record(Stage::Composite, StageStatus::Completed);
        assert!(report.completed(Stage::Composite));
        assert!(!report.completed(Stage::HiZ));
        assert_eq!(report.status(Stage::Blur), None);
        assert_eq!(report.skipped().count(), 2);
        assert_eq!(
            report.degradations(),
            vec![SkipReason::MissingKernel(ComputeKernel::GetHiZ)]
        );
    }

    #[test]
    fn test_degrade_log_warns_once() {
        let mut report = FrameReport::new(0);
        let unsupported = SkipReason::UnsupportedFormat(TargetKey::BlurOutput);
        report.record(Stage::Blur, StageStatus::Skipped(unsupported));
        let mut log = DegradeLog::default();
        assert_eq!(log.observe(&report), 1);
        assert_eq!(log.observe(&report), 0);
    }
}
