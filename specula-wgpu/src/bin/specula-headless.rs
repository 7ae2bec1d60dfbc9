//! Offscreen SSR driver.
//!
//! Rasterizes a checkered floor in front of a wall on the CPU, feeds the
//! colour, depth and G-buffer to the wgpu backend as imported textures and
//! renders a short orbit, printing the stage report of every frame.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, ValueEnum};
use glam::{Mat4, Vec3, Vec4};
use specula_render::commands::RendererFilter;
use specula_render::{
    CameraFrame, CameraId, DebugMode, FrameReport, SsrSettings, TextureId, TextureSize,
};
use specula_wgpu::{GeometrySource, GpuContext, ShaderLibrary, SsrRenderer};
use wgpu::util::DeviceExt;

const FLOOR_LAYER: u32 = 0;
const FLOOR_EXTENT: f32 = 20.0;
const WALL_Z: f32 = -8.0;
const WALL_HEIGHT: f32 = 6.0;
const Z_NEAR: f32 = 0.1;
const Z_FAR: f32 = 100.0;

const FLOOR_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];

#[derive(Parser)]
#[command(
    name = "specula-headless",
    about = "Render screen-space reflections offscreen and print per-frame reports",
    version
)]
struct Cli {
    /// Number of frames to render
    #[arg(short, long, default_value_t = 8)]
    frames: u32,

    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Directory holding ssr.wgsl, hiz.wgsl and dual_blur.wgsl (built-in kernels if omitted)
    #[arg(short, long)]
    kernels: Option<PathBuf>,

    /// Ray-march resolution divisor
    #[arg(long, default_value_t = 1)]
    down_sample: u32,

    #[arg(long, default_value_t = 1.0)]
    blur_intensity: f32,

    #[arg(long, value_enum, default_value_t = DebugView::None)]
    debug: DebugView,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DebugView {
    None,
    HitUv,
    HitDepth,
    HitMask,
}

impl From<DebugView> for DebugMode {
    fn from(view: DebugView) -> Self {
        match view {
            DebugView::None => DebugMode::None,
            DebugView::HitUv => DebugMode::HitUv,
            DebugView::HitDepth => DebugMode::HitDepth,
            DebugView::HitMask => DebugMode::HitMask,
        }
    }
}

/// The only reflective renderer in the scene.
struct FloorPlane {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    object_bgl: wgpu::BindGroupLayout,
    object_bind_group: wgpu::BindGroup,
    layouts: [wgpu::VertexBufferLayout<'static>; 1],
}

impl FloorPlane {
    fn new(device: &wgpu::Device) -> Self {
        let vertices: [[f32; 3]; 4] = [
            [-1.0, 0.0, -1.0],
            [1.0, 0.0, -1.0],
            [1.0, 0.0, 1.0],
            [-1.0, 0.0, 1.0],
        ];
        let indices: [u16; 6] = [0, 2, 1, 0, 3, 2];

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Floor Vertices"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Floor Indices"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let model = Mat4::from_scale(Vec3::new(FLOOR_EXTENT, 1.0, FLOOR_EXTENT));
        let model_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Floor Model"),
            contents: bytemuck::cast_slice(&model.to_cols_array()),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let object_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Floor Object BGL"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let object_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Floor Object BG"),
            layout: &object_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: model_buffer.as_entire_binding(),
            }],
        });

        Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
            object_bgl,
            object_bind_group,
            layouts: [wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &FLOOR_ATTRIBUTES,
            }],
        }
    }
}

impl GeometrySource for FloorPlane {
    fn vertex_layouts(&self) -> &[wgpu::VertexBufferLayout<'static>] {
        &self.layouts
    }

    fn object_bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.object_bgl
    }

    fn draw_filtered(&self, pass: &mut wgpu::RenderPass<'_>, filter: &RendererFilter) {
        if !filter.layer_mask.contains(FLOOR_LAYER) {
            return;
        }
        pass.set_bind_group(1, &self.object_bind_group, &[]);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

#[derive(Clone, Copy)]
enum Surface {
    Floor,
    Wall,
}

/// Camera colour, depth and G-buffer owned by the host and refilled every
/// frame.
struct SceneTextures {
    size: TextureSize,
    color: Arc<wgpu::Texture>,
    depth: Arc<wgpu::Texture>,
    gbuffer: [Arc<wgpu::Texture>; 3],
}

impl SceneTextures {
    fn new(device: &wgpu::Device, size: TextureSize) -> Self {
        let create = |label: &str, format: wgpu::TextureFormat, usage: wgpu::TextureUsages| {
            Arc::new(device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: size.width,
                    height: size.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            }))
        };
        let sampled = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST;

        Self {
            size,
            color: create(
                "Camera Color",
                wgpu::TextureFormat::Rgba8Unorm,
                sampled | wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::RENDER_ATTACHMENT,
            ),
            depth: create("Camera Depth", wgpu::TextureFormat::Depth16Unorm, sampled),
            gbuffer: [
                create("GBuffer Albedo", wgpu::TextureFormat::Rgba8Unorm, sampled),
                create("GBuffer Specular", wgpu::TextureFormat::Rgba8Unorm, sampled),
                create("GBuffer Normal", wgpu::TextureFormat::Rgba8Unorm, sampled),
            ],
        }
    }

    fn upload(&self, queue: &wgpu::Queue, view_proj: Mat4) {
        let (width, height) = (self.size.width, self.size.height);
        let pixels = (width * height) as usize;
        let inv_view_proj = view_proj.inverse();

        let mut color = vec![0u8; pixels * 4];
        let mut albedo = vec![0u8; pixels * 4];
        let mut specular = vec![0u8; pixels * 4];
        let mut normal = vec![0u8; pixels * 4];
        let mut depth = vec![u16::MAX; pixels];

        for y in 0..height {
            for x in 0..width {
                let i = (y * width + x) as usize;
                let texel = i * 4..i * 4 + 4;
                let ndc_x = (x as f32 + 0.5) / width as f32 * 2.0 - 1.0;
                let ndc_y = 1.0 - (y as f32 + 0.5) / height as f32 * 2.0;

                let Some((world, surface)) = scene_hit(inv_view_proj, ndc_x, ndc_y) else {
                    let t = y as f32 / height as f32;
                    let sky = [(90.0 + 80.0 * t) as u8, (140.0 + 60.0 * t) as u8, 230, 255];
                    color[texel].copy_from_slice(&sky);
                    continue;
                };

                let clip = view_proj * world.extend(1.0);
                depth[i] = ((clip.z / clip.w).clamp(0.0, 1.0) * u16::MAX as f32) as u16;

                let base = match surface {
                    Surface::Floor => {
                        let checker = (world.x.floor() + world.z.floor()) as i32;
                        if checker.rem_euclid(2) == 0 {
                            [200, 80, 60, 255]
                        } else {
                            [235, 235, 220, 255]
                        }
                    }
                    Surface::Wall => {
                        let stripe = (world.x * 0.5).floor() as i32;
                        if stripe.rem_euclid(2) == 0 {
                            [40, 120, 200, 255]
                        } else {
                            [250, 200, 40, 255]
                        }
                    }
                };
                color[texel.clone()].copy_from_slice(&base);
                albedo[texel.clone()].copy_from_slice(&base);
                match surface {
                    Surface::Floor => {
                        specular[texel.clone()].copy_from_slice(&[128, 128, 128, 230]);
                        normal[texel].copy_from_slice(&[128, 255, 128, 255]);
                    }
                    Surface::Wall => {
                        specular[texel.clone()].copy_from_slice(&[10, 10, 10, 20]);
                        normal[texel].copy_from_slice(&[128, 128, 255, 255]);
                    }
                }
            }
        }

        write_rgba8(queue, &self.color, &color, self.size);
        write_rgba8(queue, &self.gbuffer[0], &albedo, self.size);
        write_rgba8(queue, &self.gbuffer[1], &specular, self.size);
        write_rgba8(queue, &self.gbuffer[2], &normal, self.size);
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.depth,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::DepthOnly,
            },
            bytemuck::cast_slice(&depth),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(width * 2),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }
}

fn write_rgba8(queue: &wgpu::Queue, texture: &wgpu::Texture, data: &[u8], size: TextureSize) {
    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(size.width * 4),
            rows_per_image: Some(size.height),
        },
        wgpu::Extent3d {
            width: size.width,
            height: size.height,
            depth_or_array_layers: 1,
        },
    );
}

/// Nearest of the floor (y = 0) and the back wall along the pixel's view ray.
fn scene_hit(inv_view_proj: Mat4, ndc_x: f32, ndc_y: f32) -> Option<(Vec3, Surface)> {
    let near = inv_view_proj * Vec4::new(ndc_x, ndc_y, 0.0, 1.0);
    let far = inv_view_proj * Vec4::new(ndc_x, ndc_y, 1.0, 1.0);
    let near = near.truncate() / near.w;
    let dir = far.truncate() / far.w - near;

    let along = |origin: f32, step: f32, plane: f32| -> Option<f32> {
        if step.abs() < 1e-6 {
            return None;
        }
        let t = (plane - origin) / step;
        (0.0..=1.0).contains(&t).then_some(t)
    };

    let floor = along(near.y, dir.y, 0.0).filter(|t| {
        let p = near + dir * *t;
        p.x.abs() <= FLOOR_EXTENT && p.z.abs() <= FLOOR_EXTENT
    });
    let wall = along(near.z, dir.z, WALL_Z).filter(|t| {
        let p = near + dir * *t;
        p.x.abs() <= FLOOR_EXTENT && (0.0..=WALL_HEIGHT).contains(&p.y)
    });

    let (t, surface) = match (floor, wall) {
        (Some(f), Some(w)) if w < f => (w, Surface::Wall),
        (Some(f), _) => (f, Surface::Floor),
        (None, Some(w)) => (w, Surface::Wall),
        (None, None) => return None,
    };
    Some((near + dir * t, surface))
}

/// Slow orbit around the origin, one step per frame.
fn orbit_camera(frame: u32, size: TextureSize) -> (Mat4, Mat4) {
    let angle = frame as f32 * 0.02;
    let eye = Vec3::new(6.0 * angle.sin(), 2.5, 6.0 * angle.cos());
    let view = Mat4::look_at_rh(eye, Vec3::new(0.0, 1.0, WALL_Z * 0.5), Vec3::Y);
    let aspect = size.width as f32 / size.height.max(1) as f32;
    let projection = Mat4::perspective_rh(60f32.to_radians(), aspect, Z_NEAR, Z_FAR);
    (view, projection)
}

fn print_report(report: &FrameReport) {
    let completed: Vec<String> = report
        .stages
        .iter()
        .filter(|(_, status)| status.is_completed())
        .map(|(stage, _)| format!("{stage:?}"))
        .collect();
    println!(
        "frame {}: {} commands, completed [{}]",
        report.frame_index,
        report.commands_submitted,
        completed.join(", ")
    );
    for (stage, reason) in report.skipped() {
        println!("  skipped {stage:?}: {reason}");
    }
    let degradations = report.degradations();
    if !degradations.is_empty() {
        let reasons: Vec<String> = degradations.iter().map(|r| r.to_string()).collect();
        println!("  degraded: {}", reasons.join("; "));
    }
}

fn main() -> Result<()> {
    let _ = env_logger::try_init();
    let cli = Cli::parse();
    if cli.width == 0 || cli.height == 0 {
        return Err(anyhow!("resolution must be non-zero, got {}x{}", cli.width, cli.height));
    }

    let context = GpuContext::new_headless().map_err(|e| anyhow!(e))?;
    // The scene depth is uploaded from the CPU every frame.
    context.check_depth_upload().map_err(|e| anyhow!(e))?;
    let library = match &cli.kernels {
        Some(dir) => ShaderLibrary::from_dir(dir),
        None => ShaderLibrary::builtin(),
    }
    .map_err(|e| anyhow!(e))?;

    let settings = SsrSettings {
        down_sample: cli.down_sample,
        blur_intensity: cli.blur_intensity,
        debug_mode: cli.debug.into(),
        ..Default::default()
    };
    let mut renderer = SsrRenderer::new(&context, library, settings);

    let size = TextureSize::new(cli.width, cli.height);
    let scene = SceneTextures::new(&context.device, size);
    let backend = renderer.backend_mut();
    backend.set_geometry_source(Box::new(FloorPlane::new(&context.device)));
    let color = backend.import_texture(scene.color.clone());
    let depth = backend.import_texture(scene.depth.clone());
    let gbuffer: [TextureId; 3] = [
        backend.import_texture(scene.gbuffer[0].clone()),
        backend.import_texture(scene.gbuffer[1].clone()),
        backend.import_texture(scene.gbuffer[2].clone()),
    ];

    let camera = CameraId(0);
    for index in 0..cli.frames {
        let (view, projection) = orbit_camera(index, size);
        scene.upload(&context.queue, projection * view);
        let frame = CameraFrame {
            color,
            depth,
            gbuffer,
            resolution: size,
            view,
            projection,
            blue_noise: None,
        };
        let report = renderer.render_camera(camera, &frame)?;
        print_report(&report);
    }
    let _ = context.device.poll(wgpu::Maintain::Wait);

    let stats = renderer.backend().pool_stats();
    println!(
        "pool: {} created, {} reused, {} free ({} bytes)",
        stats.created, stats.reused, stats.free, stats.free_bytes
    );
    renderer.release_all();
    Ok(())
}
