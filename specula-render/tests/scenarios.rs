//! End-to-end frames recorded against the GPU-free backend.

use glam::{Mat4, Vec3};
use specula_gpu_shared::shaders::{ComputeKernel, ShaderPass};
use specula_gpu_shared::uniforms::SsrFrameUniforms;
use specula_render::targets::StorageAccess;
use specula_render::{
    CameraFrame, CameraId, CameraPass, Command, CommandList, DebugMode, RecordingBackend,
    SkipReason, SsrFeature, SsrPipeline, SsrSettings, Stage, StageStatus, TargetFormat,
    TargetKey, TextureSize,
};

fn camera(backend: &mut RecordingBackend, width: u32, height: u32) -> CameraFrame {
    let size = TextureSize::new(width, height);
    CameraFrame {
        color: backend.import_texture(size),
        depth: backend.import_texture(size),
        gbuffer: [
            backend.import_texture(size),
            backend.import_texture(size),
            backend.import_texture(size),
        ],
        resolution: size,
        view: Mat4::look_at_rh(Vec3::new(0.0, 1.0, 4.0), Vec3::ZERO, Vec3::Y),
        projection: Mat4::perspective_rh(1.0, width as f32 / height as f32, 0.1, 100.0),
        blue_noise: None,
    }
}

fn moved(camera: &CameraFrame, x: f32) -> CameraFrame {
    CameraFrame {
        view: Mat4::look_at_rh(Vec3::new(x, 1.0, 4.0), Vec3::ZERO, Vec3::Y),
        ..*camera
    }
}

fn uniforms(list: &CommandList) -> SsrFrameUniforms {
    list.iter()
        .find_map(|c| match c {
            Command::SetFrameUniforms(u) => Some(**u),
            _ => None,
        })
        .expect("frame uniforms recorded")
}

fn count_kernel(list: &CommandList, kernel: ComputeKernel) -> usize {
    list.dispatches().into_iter().filter(|k| *k == kernel).count()
}

#[test]
fn downsampled_resolve_keeps_full_size_taa_and_combine() {
    let mut backend = RecordingBackend::new();
    let cam = camera(&mut backend, 1920, 1080);
    let mut pipeline = SsrPipeline::new(SsrSettings {
        down_sample: 2,
        ..Default::default()
    });

    pipeline.setup(&mut backend, &cam).unwrap();
    let res = pipeline.resources();
    assert_eq!(res.desc(TargetKey::Resolved).unwrap().size, TextureSize::new(960, 540));
    assert_eq!(res.desc(TargetKey::TaaCurrent).unwrap().size, TextureSize::new(1920, 1080));
    assert_eq!(res.desc(TargetKey::TaaHistory).unwrap().size, TextureSize::new(1920, 1080));
    assert_eq!(res.desc(TargetKey::Combine).unwrap().size, TextureSize::new(1920, 1080));
    assert_eq!(res.desc(TargetKey::HiZ).unwrap().mip_levels, 7);

    let report = pipeline.execute(&mut backend).unwrap();
    pipeline.cleanup(&mut backend).unwrap();
    for stage in [
        Stage::CopySource,
        Stage::CopyDepth,
        Stage::HiZ,
        Stage::RayMarch,
        Stage::Resolve,
        Stage::Temporal,
        Stage::Blur,
        Stage::Composite,
    ] {
        assert!(report.completed(stage), "{stage:?}");
    }

    let u = uniforms(backend.last_submission().unwrap());
    assert_eq!(u.resolved_size[..2], [960.0, 540.0]);
    assert_eq!(u.taa_size[..2], [1920.0, 1080.0]);
}

#[test]
fn settings_changed_mid_frame_wait_for_the_next_frame() {
    let mut backend = RecordingBackend::new();
    let cam = camera(&mut backend, 1920, 1080);
    let mut pipeline = SsrPipeline::default();

    pipeline.setup(&mut backend, &cam).unwrap();
    pipeline.set_settings(SsrSettings {
        down_sample: 4,
        debug_mode: DebugMode::HitMask,
        ..Default::default()
    });
    assert_eq!(pipeline.settings().down_sample, 1);

    let report = pipeline.execute(&mut backend).unwrap();
    let full = TextureSize::new(1920, 1080);
    assert_eq!(pipeline.resources().desc(TargetKey::Resolved).unwrap().size, full);
    let u = uniforms(backend.last_submission().unwrap());
    assert_eq!(u.resolved_size[..2], [1920.0, 1080.0]);
    assert_eq!(
        report.status(Stage::Debug),
        Some(StageStatus::Skipped(SkipReason::Disabled))
    );
    assert!(report.completed(Stage::Composite));
    pipeline.cleanup(&mut backend).unwrap();

    assert!(pipeline.pending_settings().is_none());
    assert_eq!(pipeline.settings().down_sample, 4);
    pipeline.setup(&mut backend, &cam).unwrap();
    let quarter = TextureSize::new(480, 270);
    assert_eq!(pipeline.resources().desc(TargetKey::Resolved).unwrap().size, quarter);
    let report = pipeline.execute(&mut backend).unwrap();
    pipeline.cleanup(&mut backend).unwrap();
    assert!(report.completed(Stage::Debug));
}

#[test]
fn hiz_builds_six_reduction_levels_into_mips() {
    let mut backend = RecordingBackend::new();
    let cam = camera(&mut backend, 1920, 1080);
    let mut pipeline = SsrPipeline::default();
    pipeline.run_frame(&mut backend, &cam).unwrap();

    let list = backend.last_submission().unwrap();
    assert_eq!(count_kernel(list, ComputeKernel::GetHiZ), 6);
    let mips: Vec<u32> = list
        .iter()
        .filter_map(|c| match c {
            Command::CopyTexture {
                target_mip, size, ..
            } if *target_mip > 0 => Some((*target_mip, *size)),
            _ => None,
        })
        .map(|(mip, size)| {
            assert_eq!(size, TextureSize::new((1920 >> mip).max(1), (1080 >> mip).max(1)));
            mip
        })
        .collect();
    assert_eq!(mips, vec![1, 2, 3, 4, 5, 6]);

    // first dispatch reads the full-size level, groups ceil-divided by 8
    let first = list
        .iter()
        .find_map(|c| match c {
            Command::Dispatch { groups, .. } => Some(*groups),
            _ => None,
        })
        .unwrap();
    assert_eq!(first, [120, 68, 1]);
}

#[test]
fn half_intensity_blur_builds_four_level_pyramid() {
    let mut backend = RecordingBackend::new();
    let cam = camera(&mut backend, 1920, 1080);
    let imported = backend.live_count();
    let mut pipeline = SsrPipeline::new(SsrSettings {
        blur_intensity: 0.5,
        blur_max_radius: 32.0,
        ..Default::default()
    });
    let report = pipeline.run_frame(&mut backend, &cam).unwrap();
    assert!(report.completed(Stage::Blur));

    let list = backend.last_submission().unwrap();
    assert_eq!(count_kernel(list, ComputeKernel::DualBlurDownSample), 5);
    assert_eq!(count_kernel(list, ComputeKernel::DualBlurUpSample), 5);
    assert_eq!(count_kernel(list, ComputeKernel::LerpDownUpTex), 1);

    let lerp_ratio = list
        .iter()
        .find_map(|c| match c {
            Command::Dispatch {
                kernel: ComputeKernel::LerpDownUpTex,
                params: specula_render::commands::KernelParams::DualBlur(p),
                ..
            } => Some(p.blur_offset),
            _ => None,
        })
        .unwrap();
    assert!((lerp_ratio - 0.0875).abs() < 1e-3);

    // every transient was released inside the frame; only history survives cleanup
    assert_eq!(backend.live_count(), imported + 1);
    assert_eq!(backend.live_keys(), vec![TargetKey::TaaHistory]);
}

#[test]
fn small_radius_takes_single_level_path() {
    let mut backend = RecordingBackend::new();
    let cam = camera(&mut backend, 640, 360);
    let mut pipeline = SsrPipeline::new(SsrSettings {
        blur_intensity: 0.01,
        blur_max_radius: 32.0,
        ..Default::default()
    });
    pipeline.run_frame(&mut backend, &cam).unwrap();
    let list = backend.last_submission().unwrap();
    assert_eq!(count_kernel(list, ComputeKernel::DualBlurDownSample), 1);
    assert_eq!(count_kernel(list, ComputeKernel::DualBlurUpSample), 1);
    assert_eq!(count_kernel(list, ComputeKernel::LerpDownUpTex), 1);

    // The lerp blends against the blur input (the TAA result), never the camera.
    let source_of = |wanted: ComputeKernel| {
        list.iter()
            .find_map(|c| match c {
                Command::Dispatch { kernel, source, .. } if *kernel == wanted => Some(*source),
                _ => None,
            })
            .unwrap()
    };
    let blur_input = source_of(ComputeKernel::DualBlurDownSample);
    assert_eq!(source_of(ComputeKernel::LerpDownUpTex), blur_input);
    assert_ne!(blur_input, cam.color);
}

#[test]
fn debug_hit_mask_replaces_composite_and_preserves_history() {
    let mut backend = RecordingBackend::new();
    let cam = camera(&mut backend, 320, 240);
    let mut pipeline = SsrPipeline::default();

    let frame_a = moved(&cam, 0.0);
    pipeline.run_frame(&mut backend, &frame_a).unwrap();

    pipeline.set_settings(SsrSettings {
        debug_mode: DebugMode::HitMask,
        ..Default::default()
    });
    let frame_b = moved(&cam, 1.0);
    let report = pipeline.run_frame(&mut backend, &frame_b).unwrap();
    assert!(report.completed(Stage::Debug));
    assert_eq!(
        report.status(Stage::Composite),
        Some(StageStatus::Skipped(SkipReason::DebugOverride))
    );

    let list = backend.last_submission().unwrap();
    assert!(!list.passes().contains(&ShaderPass::Composite));
    assert!(!list.passes().contains(&ShaderPass::TemporalBlend));
    let hit_mask = list
        .iter()
        .find_map(|c| match c {
            Command::DrawRenderers { color_targets, .. } => Some(color_targets[1]),
            _ => None,
        })
        .unwrap();
    match list.iter().last().unwrap() {
        Command::Blit {
            source,
            target,
            pass,
            ..
        } => {
            assert_eq!(*source, Some(hit_mask));
            assert_eq!(*target, cam.color);
            assert_eq!(*pass, Some(ShaderPass::DebugHitMask));
        }
        other => panic!("unexpected last command {other:?}"),
    }
    assert_eq!(pipeline.temporal().previous(), Some(frame_a.view_proj()));

    pipeline.set_settings(SsrSettings::default());
    let frame_c = moved(&cam, 2.0);
    pipeline.run_frame(&mut backend, &frame_c).unwrap();
    let u = uniforms(backend.last_submission().unwrap());
    assert_eq!(u.prev_view_proj, frame_a.view_proj().to_cols_array_2d());
    assert_eq!(u.history_valid, 1);
}

#[test]
fn zero_intensity_skips_blur_and_composites_temporal_result() {
    let mut backend = RecordingBackend::new();
    let cam = camera(&mut backend, 256, 256);
    let mut pipeline = SsrPipeline::new(SsrSettings {
        blur_intensity: 0.0,
        ..Default::default()
    });
    pipeline.setup(&mut backend, &cam).unwrap();
    let taa_current = pipeline.resources().get(TargetKey::TaaCurrent).unwrap();
    let report = pipeline.execute(&mut backend).unwrap();
    pipeline.cleanup(&mut backend).unwrap();

    assert_eq!(report.status(Stage::Blur), Some(StageStatus::Skipped(SkipReason::Disabled)));
    assert!(report.completed(Stage::Composite));

    let list = backend.last_submission().unwrap();
    assert_eq!(count_kernel(list, ComputeKernel::DualBlurDownSample), 0);
    assert_eq!(count_kernel(list, ComputeKernel::LerpDownUpTex), 0);
    let composite_reads = list
        .iter()
        .find_map(|c| match c {
            Command::Blit {
                pass: Some(ShaderPass::Composite),
                bindings,
                ..
            } => Some(bindings.taa_current),
            _ => None,
        })
        .unwrap();
    assert_eq!(composite_reads, Some(taa_current));
}

#[test]
fn previous_view_projection_lags_one_frame() {
    let mut backend = RecordingBackend::new();
    let cam = camera(&mut backend, 128, 128);
    let mut pipeline = SsrPipeline::default();

    let mut last_vp = None;
    for i in 0..5 {
        let frame = moved(&cam, i as f32 * 0.5);
        pipeline.run_frame(&mut backend, &frame).unwrap();
        let u = uniforms(backend.last_submission().unwrap());
        match last_vp {
            None => {
                assert_eq!(u.history_valid, 0);
                assert_eq!(u.prev_view_proj, frame.view_proj().to_cols_array_2d());
            }
            Some(prev) => {
                assert_eq!(u.history_valid, 1);
                assert_eq!(u.prev_view_proj, Mat4::to_cols_array_2d(&prev));
            }
        }
        last_vp = Some(frame.view_proj());
    }
}

#[test]
fn repeated_setup_allocates_nothing_new() {
    let mut backend = RecordingBackend::new();
    let cam = camera(&mut backend, 800, 600);
    let mut pipeline = SsrPipeline::default();

    pipeline.setup(&mut backend, &cam).unwrap();
    let allocations = backend.allocation_count();
    let ids: Vec<_> = TargetKey::FRAME_TARGETS
        .iter()
        .map(|k| pipeline.resources().get(*k))
        .collect();
    let live = backend.live_count();

    pipeline.setup(&mut backend, &cam).unwrap();
    assert_eq!(backend.allocation_count(), allocations);
    assert_eq!(backend.live_count(), live);
    let again: Vec<_> = TargetKey::FRAME_TARGETS
        .iter()
        .map(|k| pipeline.resources().get(*k))
        .collect();
    assert_eq!(ids, again);
    assert_eq!(pipeline.resources().len(), TargetKey::FRAME_TARGETS.len());
}

#[test]
fn resize_reallocates_history_and_invalidates_it() {
    let mut backend = RecordingBackend::new();
    let big = camera(&mut backend, 640, 480);
    let small = camera(&mut backend, 320, 240);
    let imported = backend.live_count();
    let mut pipeline = SsrPipeline::default();

    pipeline.run_frame(&mut backend, &big).unwrap();
    pipeline.run_frame(&mut backend, &big).unwrap();
    assert_eq!(uniforms(backend.last_submission().unwrap()).history_valid, 1);

    pipeline.run_frame(&mut backend, &small).unwrap();
    let u = uniforms(backend.last_submission().unwrap());
    assert_eq!(u.history_valid, 0);
    assert_eq!(u.view_size[..2], [320.0, 240.0]);
    assert_eq!(backend.live_count(), imported + 1);
    let history = pipeline.resources().desc(TargetKey::TaaHistory).unwrap();
    assert_eq!(history.size, TextureSize::new(320, 240));
}

#[test]
fn missing_hiz_kernel_skips_everything_downstream() {
    let mut backend = RecordingBackend::new();
    backend.disable_kernel(ComputeKernel::GetHiZ);
    let cam = camera(&mut backend, 64, 64);
    let mut pipeline = SsrPipeline::default();
    let report = pipeline.run_frame(&mut backend, &cam).unwrap();

    assert_eq!(
        report.status(Stage::HiZ),
        Some(StageStatus::Skipped(SkipReason::MissingKernel(ComputeKernel::GetHiZ)))
    );
    assert_eq!(
        report.status(Stage::RayMarch),
        Some(StageStatus::Skipped(SkipReason::UpstreamSkipped(Stage::HiZ)))
    );
    assert!(!report.completed(Stage::Composite));
    assert_eq!(
        report.degradations(),
        vec![SkipReason::MissingKernel(ComputeKernel::GetHiZ)]
    );

    let list = backend.last_submission().unwrap();
    assert!(list.dispatches().is_empty());
    let writes_camera = list.iter().any(|c| match c {
        Command::Blit { target, .. } => *target == cam.color,
        _ => false,
    });
    assert!(!writes_camera);
    assert!(!pipeline.temporal().history_valid());
}

#[test]
fn missing_blend_pass_forwards_resolved_colour() {
    let mut backend = RecordingBackend::new();
    backend.disable_shader_pass(ShaderPass::TemporalBlend);
    let cam = camera(&mut backend, 64, 64);
    let mut pipeline = SsrPipeline::default();
    let report = pipeline.run_frame(&mut backend, &cam).unwrap();

    assert_eq!(
        report.status(Stage::Temporal),
        Some(StageStatus::Skipped(SkipReason::MissingShaderPass(
            ShaderPass::TemporalBlend
        )))
    );
    assert!(report.completed(Stage::Blur));
    assert!(report.completed(Stage::Composite));
    assert_eq!(pipeline.temporal().previous(), None);
}

#[test]
fn missing_read_write_storage_degrades_blur_only() {
    let mut backend = RecordingBackend::new();
    backend.set_read_write_storage(false);
    let cam = camera(&mut backend, 64, 64);
    let mut pipeline = SsrPipeline::default();
    let report = pipeline.run_frame(&mut backend, &cam).unwrap();

    assert_eq!(
        report.status(Stage::Blur),
        Some(StageStatus::Skipped(SkipReason::UnsupportedFormat(
            TargetKey::BlurIntermediate
        )))
    );
    assert!(report.completed(Stage::Composite));
    let list = backend.last_submission().unwrap();
    assert_eq!(count_kernel(list, ComputeKernel::DualBlurDownSample), 0);
}

#[test]
fn unsupported_hit_data_format_skips_ray_march() {
    let mut backend = RecordingBackend::new();
    backend.disable_format(TargetFormat::Rgba32Float);
    let cam = camera(&mut backend, 64, 64);
    let mut pipeline = SsrPipeline::default();
    let report = pipeline.run_frame(&mut backend, &cam).unwrap();

    assert!(report.completed(Stage::HiZ));
    assert_eq!(
        report.status(Stage::RayMarch),
        Some(StageStatus::Skipped(SkipReason::UnsupportedFormat(TargetKey::HitData)))
    );
    assert!(!report.completed(Stage::Composite));
}

#[test]
fn ray_march_is_a_scoped_two_target_draw() {
    let mut backend = RecordingBackend::new();
    let cam = camera(&mut backend, 64, 64);
    let mut pipeline = SsrPipeline::new(SsrSettings {
        layer_mask: specula_render::LayerMask(0b101),
        ..Default::default()
    });
    pipeline.setup(&mut backend, &cam).unwrap();
    let hit_data = pipeline.resources().get(TargetKey::HitData).unwrap();
    let hit_mask = pipeline.resources().get(TargetKey::HitMask).unwrap();
    let hit_desc = *pipeline.resources().desc(TargetKey::HitData).unwrap();
    pipeline.execute(&mut backend).unwrap();
    pipeline.cleanup(&mut backend).unwrap();

    assert_eq!(hit_desc.depth_bits, 24);
    assert_eq!(hit_desc.format, TargetFormat::Rgba32Float);

    let list = backend.last_submission().unwrap();
    let draw = list
        .iter()
        .position(|c| matches!(c, Command::DrawRenderers { .. }))
        .unwrap();
    assert!(matches!(
        &list.commands()[draw - 1],
        Command::BeginSample(name) if name == "SSR Ray March"
    ));
    assert!(matches!(
        &list.commands()[draw + 1],
        Command::EndSample(name) if name == "SSR Ray March"
    ));
    match &list.commands()[draw] {
        Command::DrawRenderers {
            pass,
            color_targets,
            filter,
            ..
        } => {
            assert_eq!(*pass, ShaderPass::RayMarch);
            assert_eq!(*color_targets, [hit_data, hit_mask]);
            assert_eq!(filter.layer_mask.0, 0b101);
        }
        _ => unreachable!(),
    }
}

#[test]
fn composite_is_the_final_camera_write() {
    let mut backend = RecordingBackend::new();
    let cam = camera(&mut backend, 64, 64);
    let mut pipeline = SsrPipeline::default();
    pipeline.setup(&mut backend, &cam).unwrap();
    let combine = pipeline.resources().get(TargetKey::Combine).unwrap();
    pipeline.execute(&mut backend).unwrap();
    pipeline.cleanup(&mut backend).unwrap();

    let list = backend.last_submission().unwrap();
    let n = list.len();
    assert!(matches!(
        &list.commands()[n - 2],
        Command::Blit { target, pass: Some(ShaderPass::Composite), .. } if *target == combine
    ));
    assert!(matches!(
        &list.commands()[n - 1],
        Command::Blit { source: Some(s), target, pass: None, .. }
            if *s == combine && *target == cam.color
    ));
}

#[test]
fn feature_isolates_cameras_and_releases_removed_history() {
    let mut backend = RecordingBackend::new();
    let main = camera(&mut backend, 128, 64);
    let mirror = camera(&mut backend, 64, 32);
    let imported = backend.live_count();
    let mut feature = SsrFeature::default();

    feature.render_camera(&mut backend, CameraId(0), &main).unwrap();
    feature.render_camera(&mut backend, CameraId(1), &mirror).unwrap();
    assert_eq!(backend.live_count(), imported + 2);

    let main_pipeline = feature.pipeline(CameraId(0)).unwrap();
    assert_eq!(main_pipeline.temporal().previous(), Some(main.view_proj()));
    assert_eq!(main_pipeline.jitter().sample_index(), 1);

    assert!(feature.remove_camera(&mut backend, CameraId(1)));
    assert!(!feature.remove_camera(&mut backend, CameraId(1)));
    assert_eq!(backend.live_count(), imported + 1);
    feature.release_all(&mut backend);
    assert_eq!(backend.live_count(), imported);
}

#[test]
fn history_target_is_persistent_and_frame_targets_are_not() {
    let mut backend = RecordingBackend::new();
    let cam = camera(&mut backend, 64, 64);
    let mut pipeline = SsrPipeline::default();
    pipeline.run_frame(&mut backend, &cam).unwrap();
    let keys: Vec<_> = pipeline.resources().keys().collect();
    assert_eq!(keys, vec![TargetKey::TaaHistory]);
    let desc = pipeline.resources().desc(TargetKey::TaaHistory).unwrap();
    assert_eq!(desc.storage, StorageAccess::None);
}
