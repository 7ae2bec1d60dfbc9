//! Per-camera SSR pipeline and its setup / execute / cleanup lifecycle.

use std::collections::BTreeMap;

use crate::backend::SsrBackend;
use crate::commands::Command;
use crate::error::SsrError;
use crate::frame::{frame_uniforms, CameraFrame, FrameContext};
use crate::jitter::HaltonJitter;
use crate::report::{DegradeLog, FrameReport, SkipReason, Stage, StageStatus};
use crate::resources::FrameResources;
use crate::settings::SsrSettings;
use crate::stages;
use crate::targets::{frame_target_spec, TargetKey};
use crate::temporal::TemporalState;

/// Where a pipeline is within the current frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// No frame in flight; frame targets released.
    Idle,
    /// Targets allocated for the current camera frame.
    Ready,
    /// Commands submitted; waiting for cleanup.
    Executed,
}

/// Per-camera frame callbacks, called in order once per camera per frame.
pub trait CameraPass {
    fn setup(
        &mut self,
        backend: &mut dyn SsrBackend,
        camera: &CameraFrame,
    ) -> Result<(), SsrError>;

    fn execute(&mut self, backend: &mut dyn SsrBackend) -> Result<FrameReport, SsrError>;

    fn cleanup(&mut self, backend: &mut dyn SsrBackend) -> Result<(), SsrError>;

    /// Drives one whole frame. Cleanup runs even when setup or execute fail.
    fn run_frame(
        &mut self,
        backend: &mut dyn SsrBackend,
        camera: &CameraFrame,
    ) -> Result<FrameReport, SsrError> {
        let result = self
            .setup(backend, camera)
            .and_then(|()| self.execute(backend));
        let cleanup = self.cleanup(backend);
        let report = result?;
        cleanup?;
        Ok(report)
    }
}

pub struct SsrPipeline {
    settings: SsrSettings,
    /// Settings handed in while a frame is in flight, applied at cleanup.
    pending_settings: Option<SsrSettings>,
    resources: FrameResources,
    temporal: TemporalState,
    jitter: HaltonJitter,
    phase: Phase,
    camera: Option<CameraFrame>,
    setup_failures: BTreeMap<TargetKey, SkipReason>,
    frame_index: u64,
    degrade_log: DegradeLog,
}

impl SsrPipeline {
    pub fn new(settings: SsrSettings) -> Self {
        Self {
            settings: settings.sanitized(),
            pending_settings: None,
            resources: FrameResources::new(),
            temporal: TemporalState::new(),
            jitter: HaltonJitter::new(),
            phase: Phase::Idle,
            camera: None,
            setup_failures: BTreeMap::new(),
            frame_index: 0,
            degrade_log: DegradeLog::default(),
        }
    }

    /// Settings the current frame runs with.
    pub fn settings(&self) -> &SsrSettings {
        &self.settings
    }

    /// Takes effect at the next setup. A frame already set up keeps the
    /// settings its targets were sized for until cleanup.
    pub fn set_settings(&mut self, settings: SsrSettings) {
        let settings = settings.sanitized();
        if self.phase == Phase::Idle {
            self.settings = settings;
        } else {
            self.pending_settings = Some(settings);
        }
    }

    pub fn pending_settings(&self) -> Option<&SsrSettings> {
        self.pending_settings.as_ref()
    }

    fn apply_pending_settings(&mut self) {
        if let Some(settings) = self.pending_settings.take() {
            self.settings = settings;
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn temporal(&self) -> &TemporalState {
        &self.temporal
    }

    pub fn jitter(&self) -> &HaltonJitter {
        &self.jitter
    }

    pub fn resources(&self) -> &FrameResources {
        &self.resources
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Drops every target including history. Used when the camera goes away.
    pub fn release(&mut self, backend: &mut dyn SsrBackend) {
        self.resources.release_all(backend);
        self.temporal.reset();
        self.jitter.reset();
        self.phase = Phase::Idle;
        self.camera = None;
        self.setup_failures.clear();
        self.apply_pending_settings();
    }

    fn lifecycle(&self, call: &'static str) -> SsrError {
        SsrError::Lifecycle {
            call,
            phase: self.phase,
        }
    }

    fn record_stages(ctx: &mut FrameContext<'_>) -> Result<(), SsrError> {
        let debug = ctx.settings.debug_mode.is_enabled();

        let status = stages::depth::copy_source(ctx)?;
        ctx.report.record(Stage::CopySource, status);
        let status = stages::depth::copy_depth(ctx)?;
        ctx.report.record(Stage::CopyDepth, status);
        let status = stages::depth::build_hiz(ctx)?;
        ctx.report.record(Stage::HiZ, status);
        let status = stages::ray_march::ray_march(ctx)?;
        ctx.report.record(Stage::RayMarch, status);

        if debug {
            let status = stages::debug::debug_view(ctx)?;
            ctx.report.record(Stage::Debug, status);
            for stage in [Stage::Resolve, Stage::Temporal, Stage::Blur, Stage::Composite] {
                ctx.report
                    .record(stage, StageStatus::Skipped(SkipReason::DebugOverride));
            }
            return Ok(());
        }

        ctx.report
            .record(Stage::Debug, StageStatus::Skipped(SkipReason::Disabled));
        let status = stages::resolve::resolve(ctx)?;
        ctx.report.record(Stage::Resolve, status);
        let status = stages::resolve::temporal(ctx)?;
        ctx.report.record(Stage::Temporal, status);
        let status = stages::blur::blur(ctx)?;
        ctx.report.record(Stage::Blur, status);
        let status = stages::composite::composite(ctx)?;
        ctx.report.record(Stage::Composite, status);
        Ok(())
    }
}

impl Default for SsrPipeline {
    fn default() -> Self {
        Self::new(SsrSettings::default())
    }
}

impl CameraPass for SsrPipeline {
    /// Allocates or resizes the frame targets. Calling it again in the same
    /// frame with the same camera changes nothing.
    fn setup(
        &mut self,
        backend: &mut dyn SsrBackend,
        camera: &CameraFrame,
    ) -> Result<(), SsrError> {
        if self.phase == Phase::Executed {
            return Err(self.lifecycle("setup"));
        }
        let resolution = camera.resolution;
        if resolution.is_empty() {
            return Err(SsrError::EmptyResolution {
                width: resolution.width,
                height: resolution.height,
            });
        }

        self.setup_failures.clear();
        for key in TargetKey::FRAME_TARGETS {
            let Some(spec) = frame_target_spec(key, self.settings.down_sample) else {
                continue;
            };
            match self
                .resources
                .ensure(backend, key, spec.describe(resolution), spec.lifetime)
            {
                Ok(allocation) => {
                    if key == TargetKey::TaaHistory && allocation.fresh {
                        self.temporal.invalidate_history();
                    }
                }
                Err(e) if e.is_degradable() => {
                    log::debug!("SSR target {key:?} unavailable: {e}");
                    self.setup_failures
                        .insert(key, SkipReason::UnsupportedFormat(key));
                }
                Err(e) => {
                    log::error!("SSR setup failed allocating {key:?}: {e}");
                    return Err(e);
                }
            }
        }

        self.camera = Some(*camera);
        self.phase = Phase::Ready;
        Ok(())
    }

    fn execute(&mut self, backend: &mut dyn SsrBackend) -> Result<FrameReport, SsrError> {
        let camera = match (self.phase, self.camera) {
            (Phase::Ready, Some(camera)) => camera,
            _ => return Err(self.lifecycle("execute")),
        };
        self.phase = Phase::Executed;
        let frame_index = self.frame_index;
        self.frame_index += 1;

        self.temporal.begin_frame(camera.view_proj());
        let jitter = self.jitter.next_offset();

        let mut ctx = FrameContext::new(
            &mut *backend,
            &mut self.resources,
            &self.settings,
            &camera,
            &self.setup_failures,
            frame_index,
        );
        let uniforms =
            frame_uniforms(&self.settings, &camera, &ctx.sizes, &self.temporal, jitter);
        ctx.commands.push(Command::SetFrameUniforms(Box::new(uniforms)));

        let recorded = Self::record_stages(&mut ctx);
        let FrameContext {
            commands,
            mut report,
            transients,
            ..
        } = ctx;

        if let Err(e) = recorded {
            log::error!("SSR frame {frame_index} recording failed: {e}");
            for id in transients {
                backend.release_target(id);
            }
            return Err(e);
        }

        report.commands_submitted = commands.len();
        if let Err(e) = backend.submit(commands) {
            log::error!("SSR frame {frame_index} submission failed: {e}");
            return Err(e);
        }

        if report.completed(Stage::Temporal) {
            self.temporal.commit();
        }
        self.degrade_log.observe(&report);
        Ok(report)
    }

    fn cleanup(&mut self, backend: &mut dyn SsrBackend) -> Result<(), SsrError> {
        if self.phase == Phase::Idle {
            return Err(self.lifecycle("cleanup"));
        }
        self.resources.release_frame_targets(backend);
        self.camera = None;
        self.phase = Phase::Idle;
        self.apply_pending_settings();
        Ok(())
    }
}
