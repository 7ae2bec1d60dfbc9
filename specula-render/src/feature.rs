//! Renderer-feature level entry point: shared settings plus one isolated
//! pipeline per camera.

use std::collections::HashMap;

use crate::backend::SsrBackend;
use crate::error::SsrError;
use crate::frame::CameraFrame;
use crate::pipeline::{CameraPass, SsrPipeline};
use crate::report::FrameReport;
use crate::settings::{RenderEvent, SsrSettings};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CameraId(pub u64);

/// Inputs the host must produce before the pipeline runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostInputs(u8);

impl HostInputs {
    pub const DEPTH: HostInputs = HostInputs(1);
    pub const NORMAL: HostInputs = HostInputs(1 << 1);
    pub const MOTION: HostInputs = HostInputs(1 << 2);

    pub const fn union(self, other: HostInputs) -> HostInputs {
        HostInputs(self.0 | other.0)
    }

    pub const fn contains(self, other: HostInputs) -> bool {
        self.0 & other.0 == other.0
    }
}

pub struct SsrFeature {
    settings: SsrSettings,
    cameras: HashMap<CameraId, SsrPipeline>,
}

impl SsrFeature {
    pub const REQUIRED_INPUTS: HostInputs = HostInputs::DEPTH.union(HostInputs::MOTION);

    pub fn new(settings: SsrSettings) -> Self {
        Self {
            settings: settings.sanitized(),
            cameras: HashMap::new(),
        }
    }

    pub fn settings(&self) -> &SsrSettings {
        &self.settings
    }

    /// Applies to every camera from its next setup on.
    pub fn set_settings(&mut self, settings: SsrSettings) {
        self.settings = settings.sanitized();
        for pipeline in self.cameras.values_mut() {
            pipeline.set_settings(self.settings.clone());
        }
    }

    pub fn render_event(&self) -> RenderEvent {
        self.settings.render_event
    }

    pub fn camera_count(&self) -> usize {
        self.cameras.len()
    }

    pub fn pipeline(&self, camera: CameraId) -> Option<&SsrPipeline> {
        self.cameras.get(&camera)
    }

    /// Pipeline of a camera, created on first use.
    pub fn pipeline_mut(&mut self, camera: CameraId) -> &mut SsrPipeline {
        let settings = &self.settings;
        self.cameras.entry(camera).or_insert_with(|| {
            log::debug!("SSR pipeline created for camera {}", camera.0);
            SsrPipeline::new(settings.clone())
        })
    }

    /// Setup, execute and cleanup for one camera.
    pub fn render_camera(
        &mut self,
        backend: &mut dyn SsrBackend,
        camera: CameraId,
        frame: &CameraFrame,
    ) -> Result<FrameReport, SsrError> {
        self.pipeline_mut(camera).run_frame(backend, frame)
    }

    /// Releases everything the camera held, history included.
    pub fn remove_camera(&mut self, backend: &mut dyn SsrBackend, camera: CameraId) -> bool {
        match self.cameras.remove(&camera) {
            Some(mut pipeline) => {
                pipeline.release(backend);
                true
            }
            None => false,
        }
    }

    pub fn release_all(&mut self, backend: &mut dyn SsrBackend) {
        for (_, mut pipeline) in self.cameras.drain() {
            pipeline.release(backend);
        }
    }
}

impl Default for SsrFeature {
    fn default() -> Self {
        Self::new(SsrSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_inputs() {
        assert!(SsrFeature::REQUIRED_INPUTS.contains(HostInputs::DEPTH));
        assert!(SsrFeature::REQUIRED_INPUTS.contains(HostInputs::MOTION));
        assert!(!SsrFeature::REQUIRED_INPUTS.contains(HostInputs::NORMAL));
    }

    #[test]
    fn test_settings_propagate() {
        let mut feature = SsrFeature::default();
        feature.pipeline_mut(CameraId(1));
        feature.pipeline_mut(CameraId(2));
        feature.set_settings(SsrSettings {
            down_sample: 3,
            ..Default::default()
        });
        assert_eq!(feature.pipeline(CameraId(1)).unwrap().settings().down_sample, 3);
        assert_eq!(feature.pipeline(CameraId(2)).unwrap().settings().down_sample, 3);
        assert_eq!(feature.camera_count(), 2);
    }
}
