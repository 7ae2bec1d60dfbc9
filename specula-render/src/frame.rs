//! Per-frame host inputs and the context threaded through every stage.

use std::collections::BTreeMap;

use glam::{Mat4, Vec2};
use specula_gpu_shared::shaders::{ComputeKernel, ShaderPass};
use specula_gpu_shared::uniforms::SsrFrameUniforms;

use crate::backend::{SsrBackend, TextureId};
use crate::commands::{CommandList, FrameBindings};
use crate::report::{FrameReport, SkipReason, Stage};
use crate::resources::FrameResources;
use crate::settings::SsrSettings;
use crate::targets::{Lifetime, TargetDesc, TargetKey};
use crate::temporal::TemporalState;
use crate::texture_size::TextureSize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlueNoise {
    pub texture: TextureId,
    pub size: TextureSize,
}

/// What the host hands the pipeline for one camera and frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraFrame {
    pub color: TextureId,
    pub depth: TextureId,
    pub gbuffer: [TextureId; 3],
    pub resolution: TextureSize,
    pub view: Mat4,
    /// Projection already adjusted for the GPU's clip-space conventions.
    pub projection: Mat4,
    pub blue_noise: Option<BlueNoise>,
}

impl CameraFrame {
    pub fn view_proj(&self) -> Mat4 {
        self.projection * self.view
    }
}

/// Size vectors of the targets the kernels address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSizes {
    pub view: TextureSize,
    pub ray_march: TextureSize,
    pub resolved: TextureSize,
    pub taa: TextureSize,
}

impl FrameSizes {
    pub fn new(resolution: TextureSize, down_sample: u32) -> Self {
        Self {
            view: resolution,
            ray_march: resolution,
            resolved: resolution.downsampled(down_sample, down_sample),
            taa: resolution,
        }
    }
}

/// Uniform block of one frame. `jitter` is the offset drawn for this frame.
pub fn frame_uniforms(
    settings: &SsrSettings,
    camera: &CameraFrame,
    sizes: &FrameSizes,
    temporal: &TemporalState,
    jitter: Vec2,
) -> SsrFrameUniforms {
    let view_proj = camera.view_proj();
    SsrFrameUniforms {
        view: camera.view.to_cols_array_2d(),
        inv_view: camera.view.inverse().to_cols_array_2d(),
        projection: camera.projection.to_cols_array_2d(),
        inv_projection: camera.projection.inverse().to_cols_array_2d(),
        view_proj: view_proj.to_cols_array_2d(),
        inv_view_proj: view_proj.inverse().to_cols_array_2d(),
        prev_view_proj: temporal.reprojection_matrix().to_cols_array_2d(),
        view_size: sizes.view.params_array(),
        ray_march_size: sizes.ray_march.params_array(),
        resolved_size: sizes.resolved.params_array(),
        taa_size: sizes.taa.params_array(),
        blue_noise_size: camera
            .blue_noise
            .map(|b| b.size.params_array())
            .unwrap_or([0.0; 4]),
        jitter: jitter.to_array(),
        max_step: settings.max_step,
        binary_count: settings.binary_count,
        thickness: settings.thickness,
        max_distance: settings.max_distance,
        min_smoothness: settings.min_smoothness,
        brdf_bias: settings.brdf_bias,
        taa_scale: settings.taa_scale,
        taa_weight: settings.taa_weight,
        history_valid: temporal.history_valid() as u32,
        _pad0: 0,
    }
}

/// Everything a stage reads or writes while recording.
pub struct FrameContext<'a> {
    pub backend: &'a mut dyn SsrBackend,
    pub resources: &'a mut FrameResources,
    pub settings: &'a SsrSettings,
    pub camera: &'a CameraFrame,
    pub sizes: FrameSizes,
    /// Textures produced so far this frame.
    pub bindings: FrameBindings,
    pub commands: CommandList,
    pub report: FrameReport,
    /// Stage-local targets allocated while recording. Their releases are
    /// recorded commands; the list is only used to free them when recording
    /// fails.
    pub transients: Vec<TextureId>,
    setup_failures: &'a BTreeMap<TargetKey, SkipReason>,
}

impl<'a> FrameContext<'a> {
    pub fn new(
        backend: &'a mut dyn SsrBackend,
        resources: &'a mut FrameResources,
        settings: &'a SsrSettings,
        camera: &'a CameraFrame,
        setup_failures: &'a BTreeMap<TargetKey, SkipReason>,
        frame_index: u64,
    ) -> Self {
        let bindings = FrameBindings {
            camera_depth: Some(camera.depth),
            gbuffer: camera.gbuffer.map(Some),
            blue_noise: camera.blue_noise.map(|b| b.texture),
            ..Default::default()
        };
        Self {
            backend,
            resources,
            settings,
            camera,
            sizes: FrameSizes::new(camera.resolution, settings.down_sample),
            bindings,
            commands: CommandList::new(settings.profiler_tag.clone()),
            report: FrameReport::new(frame_index),
            transients: Vec::new(),
            setup_failures,
        }
    }

    /// A frame target allocated at setup.
    pub fn target(&self, key: TargetKey) -> Result<TextureId, SkipReason> {
        match self.resources.get(key) {
            Some(id) => Ok(id),
            None => Err(self
                .setup_failures
                .get(&key)
                .copied()
                .unwrap_or(SkipReason::UnsupportedFormat(key))),
        }
    }

    pub fn pass(&self, pass: ShaderPass) -> Result<(), SkipReason> {
        if self.backend.has_shader_pass(pass) {
            Ok(())
        } else {
            Err(SkipReason::MissingShaderPass(pass))
        }
    }

    pub fn kernel(&self, kernel: ComputeKernel) -> Result<[u32; 3], SkipReason> {
        self.backend
            .kernel_group_size(kernel)
            .ok_or(SkipReason::MissingKernel(kernel))
    }

    pub fn upstream(&self, stage: Stage) -> Result<(), SkipReason> {
        if self.report.completed(stage) {
            Ok(())
        } else {
            Err(SkipReason::UpstreamSkipped(stage))
        }
    }

    /// Fails with the key of the first descriptor the backend cannot create.
    pub fn check_supported(&self, descs: &[(TargetKey, TargetDesc)]) -> Result<(), SkipReason> {
        match descs.iter().find(|(_, d)| !self.backend.supports_target(d)) {
            Some((key, _)) => Err(SkipReason::UnsupportedFormat(*key)),
            None => Ok(()),
        }
    }

    /// Allocate a stage-local target. It is not registered afterwards; the
    /// stage records its `Release` command.
    pub fn allocate_transient(
        &mut self,
        key: TargetKey,
        desc: TargetDesc,
    ) -> Result<TextureId, crate::error::SsrError> {
        let allocation = self.resources.ensure(&mut *self.backend, key, desc, Lifetime::Frame)?;
        self.resources.take(key);
        self.transients.push(allocation.id);
        Ok(allocation.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn camera() -> CameraFrame {
        CameraFrame {
            color: TextureId(1),
            depth: TextureId(2),
            gbuffer: [TextureId(3), TextureId(4), TextureId(5)],
            resolution: TextureSize::new(1920, 1080),
            view: Mat4::look_at_rh(Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO, Vec3::Y),
            projection: Mat4::perspective_rh(1.0, 16.0 / 9.0, 0.1, 100.0),
            blue_noise: Some(BlueNoise {
                texture: TextureId(6),
                size: TextureSize::new(256, 256),
            }),
        }
    }

    #[test]
    fn test_sizes_follow_downsample() {
        let sizes = FrameSizes::new(TextureSize::new(1920, 1080), 2);
        assert_eq!(sizes.resolved, TextureSize::new(960, 540));
        assert_eq!(sizes.taa, TextureSize::new(1920, 1080));
        assert_eq!(sizes.ray_march, sizes.view);
    }

    #[test]
    fn test_uniforms_carry_matrices_and_tunables() {
        let cam = camera();
        let settings = SsrSettings {
            down_sample: 2,
            ..Default::default()
        };
        let sizes = FrameSizes::new(cam.resolution, settings.down_sample);
        let mut temporal = TemporalState::new();
        temporal.begin_frame(cam.view_proj());
        let u = frame_uniforms(&settings, &cam, &sizes, &temporal, Vec2::new(0.5, 0.25));

        assert_eq!(u.view_proj, (cam.projection * cam.view).to_cols_array_2d());
        assert_eq!(u.prev_view_proj, u.view_proj);
        assert_eq!(u.history_valid, 0);
        assert_eq!(u.resolved_size[0], 960.0);
        assert_eq!(u.blue_noise_size[1], 256.0);
        assert_eq!(u.jitter, [0.5, 0.25]);
        assert_eq!(u.max_step, 16);
        assert_eq!(u.taa_weight, 0.99);

        let inv = Mat4::from_cols_array_2d(&u.inv_view_proj) * cam.view_proj();
        assert!(inv.abs_diff_eq(Mat4::IDENTITY, 1e-4));
    }
}
