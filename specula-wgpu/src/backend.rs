//! wgpu implementation of [`SsrBackend`].
//!
//! Owns the texture pool, the pipeline cache and the shared bind resources,
//! and replays each frame's command list into a single command encoder. Host
//! textures (camera colour and depth, G-buffer, blue noise) are imported once
//! and addressed by [`TextureId`] like pooled targets.

use std::collections::HashMap;
use std::sync::Arc;

use specula_gpu_shared::shaders::{bindings, ComputeKernel, ShaderPass};
use specula_gpu_shared::uniforms::SsrFrameUniforms;
use specula_render::commands::{
    Command, CommandList, FrameBindings, KernelParams, RendererFilter,
};
use specula_render::targets::{TargetDesc, TargetKey};
use specula_render::{SsrBackend, SsrError, TextureId, TextureSize};
use wgpu::util::DeviceExt;

use crate::geometry::GeometrySource;
use crate::passes;
use crate::pipeline::{self, PipelineCache};
use crate::render_targets::{self, FormatSupport, GpuTarget, PoolStats, TexturePool};
use crate::shader_library::ShaderLibrary;

/// Host texture made visible to the pipeline.
pub struct ImportedTexture {
    pub texture: Arc<wgpu::Texture>,
    /// All mips; depth aspect only for combined depth-stencil formats.
    pub view: wgpu::TextureView,
    /// Mip 0, used when the texture is written or read as a single level.
    pub attachment_view: wgpu::TextureView,
}

enum Resident {
    Target { key: TargetKey, target: GpuTarget },
    Imported(ImportedTexture),
}

impl Resident {
    fn texture(&self) -> &wgpu::Texture {
        match self {
            Resident::Target { target, .. } => &target.texture,
            Resident::Imported(imported) => &imported.texture,
        }
    }

    fn view(&self) -> &wgpu::TextureView {
        match self {
            Resident::Target { target, .. } => &target.view,
            Resident::Imported(imported) => &imported.view,
        }
    }

    fn mip_view(&self, mip: u32) -> Option<&wgpu::TextureView> {
        match self {
            Resident::Target { target, .. } => target.mip_views.get(mip as usize),
            Resident::Imported(imported) => (mip == 0).then_some(&imported.attachment_view),
        }
    }

    fn depth_view(&self) -> Option<&wgpu::TextureView> {
        match self {
            Resident::Target { target, .. } => target.depth_view.as_ref(),
            Resident::Imported(_) => None,
        }
    }

    fn format(&self) -> wgpu::TextureFormat {
        self.texture().format()
    }
}

fn resident(
    textures: &HashMap<TextureId, Resident>,
    id: TextureId,
) -> Result<&Resident, SsrError> {
    textures
        .get(&id)
        .ok_or_else(|| SsrError::Backend(format!("unknown texture {id}")))
}

fn mip_view(texture: &Resident, id: TextureId, mip: u32) -> Result<&wgpu::TextureView, SsrError> {
    texture
        .mip_view(mip)
        .ok_or_else(|| SsrError::Backend(format!("{id} has no mip {mip}")))
}

/// Uniform buffer, samplers and stand-ins shared by every pass.
struct SharedBindings {
    frame_uniforms: wgpu::Buffer,
    point_sampler: wgpu::Sampler,
    linear_sampler: wgpu::Sampler,
    _dummy_color: wgpu::Texture,
    dummy_color_view: wgpu::TextureView,
    _dummy_depth: wgpu::Texture,
    dummy_depth_view: wgpu::TextureView,
}

impl SharedBindings {
    fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let frame_uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("SSR Frame Uniforms"),
            size: std::mem::size_of::<SsrFrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let point_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("SSR Point Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let linear_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("SSR Linear Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let (dummy_color, dummy_color_view) =
            render_targets::create_dummy_color_texture(device, queue);
        let (dummy_depth, dummy_depth_view) =
            render_targets::create_dummy_depth_texture(device, queue);

        Self {
            frame_uniforms,
            point_sampler,
            linear_sampler,
            _dummy_color: dummy_color,
            dummy_color_view,
            _dummy_depth: dummy_depth,
            dummy_depth_view,
        }
    }

    /// View bound at `slot`. Empty slots, and slots holding one of the pass's
    /// own attachments, get a stand-in.
    fn slot_view<'a>(
        &'a self,
        textures: &'a HashMap<TextureId, Resident>,
        slot: u32,
        id: Option<TextureId>,
        attachments: &[TextureId],
    ) -> Result<&'a wgpu::TextureView, SsrError> {
        match id {
            Some(id) if !attachments.contains(&id) => Ok(resident(textures, id)?.view()),
            _ if slot == bindings::CAMERA_DEPTH => Ok(&self.dummy_depth_view),
            _ => Ok(&self.dummy_color_view),
        }
    }

    /// Group 0 for a fullscreen or geometry pass.
    fn frame_bind_group(
        &self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        textures: &HashMap<TextureId, Resident>,
        blit_source: Option<TextureId>,
        frame: &FrameBindings,
        attachments: &[TextureId],
    ) -> Result<wgpu::BindGroup, SsrError> {
        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: bindings::FRAME_UNIFORMS,
                resource: self.frame_uniforms.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: bindings::POINT_SAMPLER,
                resource: wgpu::BindingResource::Sampler(&self.point_sampler),
            },
            wgpu::BindGroupEntry {
                binding: bindings::BLIT_SOURCE,
                resource: wgpu::BindingResource::TextureView(self.slot_view(
                    textures,
                    bindings::BLIT_SOURCE,
                    blit_source,
                    attachments,
                )?),
            },
        ];
        for (slot, id) in frame.slots() {
            entries.push(wgpu::BindGroupEntry {
                binding: slot,
                resource: wgpu::BindingResource::TextureView(
                    self.slot_view(textures, slot, id, attachments)?,
                ),
            });
        }

        Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SSR Frame BG"),
            layout,
            entries: &entries,
        }))
    }
}

pub struct WgpuSsrBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    formats: FormatSupport,
    library: ShaderLibrary,
    pipelines: PipelineCache,
    geometry: Option<Box<dyn GeometrySource>>,
    shared: SharedBindings,
    pool: TexturePool,
    textures: HashMap<TextureId, Resident>,
    next_id: u64,
}

impl WgpuSsrBackend {
    pub fn new(
        adapter: &wgpu::Adapter,
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        library: ShaderLibrary,
    ) -> Self {
        let formats = FormatSupport::query(adapter, &device);
        let pipelines = PipelineCache::new(&device, &library);
        let shared = SharedBindings::new(&device, &queue);

        let info = adapter.get_info();
        log::info!("SSR wgpu backend ready on {} ({:?})", info.name, info.backend);

        Self {
            device,
            queue,
            formats,
            library,
            pipelines,
            geometry: None,
            shared,
            pool: TexturePool::new(),
            textures: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    pub fn library(&self) -> &ShaderLibrary {
        &self.library
    }

    /// Scene geometry for the ray march. Without one the ray-march pass is
    /// reported missing.
    pub fn set_geometry_source(&mut self, geometry: Box<dyn GeometrySource>) {
        self.geometry = Some(geometry);
        self.pipelines.reset_ray_march();
    }

    fn next_id(&mut self) -> TextureId {
        let id = TextureId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn import_texture(&mut self, texture: Arc<wgpu::Texture>) -> TextureId {
        let aspect = if texture.format().is_combined_depth_stencil_format() {
            wgpu::TextureAspect::DepthOnly
        } else {
            wgpu::TextureAspect::All
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            aspect,
            ..Default::default()
        });
        let attachment_view = texture.create_view(&wgpu::TextureViewDescriptor {
            aspect,
            base_mip_level: 0,
            mip_level_count: Some(1),
            ..Default::default()
        });

        let id = self.next_id();
        self.textures.insert(
            id,
            Resident::Imported(ImportedTexture {
                texture,
                view,
                attachment_view,
            }),
        );
        id
    }

    /// Drops an imported texture. Returns false for unknown ids and pooled
    /// targets.
    pub fn forget_texture(&mut self, id: TextureId) -> bool {
        if matches!(self.textures.get(&id), Some(Resident::Imported(_))) {
            self.textures.remove(&id);
            return true;
        }
        false
    }

    pub fn texture(&self, id: TextureId) -> Option<&wgpu::Texture> {
        self.textures.get(&id).map(Resident::texture)
    }

    pub fn texture_size(&self, id: TextureId) -> Option<TextureSize> {
        self.texture(id)
            .map(|t| TextureSize::new(t.width(), t.height()))
    }

    pub fn live_count(&self) -> usize {
        self.textures.len()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn trim_pool(&mut self) {
        self.pool.trim();
    }

    // ============================================================
    // Command encoding
    // ============================================================

    fn encode(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        command: Command,
    ) -> Result<(), SsrError> {
        match command {
            Command::SetFrameUniforms(uniforms) => {
                self.queue.write_buffer(
                    &self.shared.frame_uniforms,
                    0,
                    bytemuck::bytes_of(uniforms.as_ref()),
                );
                Ok(())
            }
            Command::Blit {
                source,
                target,
                pass: None,
                ..
            } => self.encode_blit(encoder, source, target),
            Command::Blit {
                source,
                target,
                pass: Some(pass),
                bindings,
            } => self.encode_fullscreen(encoder, pass, source, target, &bindings),
            Command::CopyTexture {
                source,
                source_mip,
                target,
                target_mip,
                size,
            } => {
                let src = resident(&self.textures, source)?;
                let dst = resident(&self.textures, target)?;
                passes::copy::copy_texture_mip(
                    encoder,
                    src.texture(),
                    source_mip,
                    dst.texture(),
                    target_mip,
                    size,
                );
                Ok(())
            }
            Command::Dispatch {
                kernel,
                source,
                source_mip,
                target,
                params,
                groups,
            } => {
                let source = (source, source_mip);
                self.encode_dispatch(encoder, kernel, source, target, &params, groups)
            }
            Command::DrawRenderers {
                pass,
                color_targets,
                filter,
                bindings,
            } => self.encode_ray_march(encoder, pass, color_targets, &filter, &bindings),
            Command::BeginSample(_) | Command::EndSample(_) | Command::Release(_) => Ok(()),
        }
    }

    fn encode_blit(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        source: Option<TextureId>,
        target: TextureId,
    ) -> Result<(), SsrError> {
        let Self {
            ref device,
            ref mut pipelines,
            ref textures,
            ref shared,
            ..
        } = *self;
        let source = source
            .ok_or_else(|| SsrError::Backend(format!("blit into {target} without source")))?;
        let src = resident(textures, source)?;
        let dst = resident(textures, target)?;
        let target_view = mip_view(dst, target, 0)?;

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SSR Blit BG"),
            layout: &pipelines.blit_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(src.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&shared.linear_sampler),
                },
            ],
        });
        let pipeline = pipelines.blit(device, dst.format());
        passes::fullscreen::render_fullscreen_pass(
            encoder,
            "SSR Blit",
            target_view,
            pipeline,
            &bind_group,
        );
        Ok(())
    }

    fn encode_fullscreen(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        pass: ShaderPass,
        source: Option<TextureId>,
        target: TextureId,
        frame: &FrameBindings,
    ) -> Result<(), SsrError> {
        let Self {
            ref device,
            ref mut pipelines,
            ref textures,
            ref shared,
            ..
        } = *self;
        let dst = resident(textures, target)?;
        let target_view = mip_view(dst, target, 0)?;

        let bind_group = shared.frame_bind_group(
            device,
            &pipelines.frame_bgl,
            textures,
            source,
            frame,
            &[target],
        )?;
        let pipeline = pipelines.fullscreen(device, pass, dst.format())?;
        passes::fullscreen::render_fullscreen_pass(
            encoder,
            pass.label(),
            target_view,
            pipeline,
            &bind_group,
        );
        Ok(())
    }

    fn encode_dispatch(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        kernel: ComputeKernel,
        (source, source_mip): (TextureId, u32),
        target: TextureId,
        params: &KernelParams,
        groups: [u32; 3],
    ) -> Result<(), SsrError> {
        let Self {
            ref device,
            ref mut pipelines,
            ref textures,
            ref shared,
            ..
        } = *self;
        let src = resident(textures, source)?;
        let dst = resident(textures, target)?;
        if dst.format() != pipeline::kernel_storage_format(kernel) {
            return Err(SsrError::Backend(format!(
                "{kernel} cannot write {target} of format {:?}",
                dst.format()
            )));
        }
        let source_view = mip_view(src, source, source_mip)?;
        let target_view = mip_view(dst, target, 0)?;

        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("SSR Kernel Params"),
            contents: params.as_bytes(),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let sampler = if pipeline::kernel_filters(kernel) {
            &shared.linear_sampler
        } else {
            &shared.point_sampler
        };

        let (compute_pipeline, bgl) = pipelines.kernel(device, kernel)?;
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("SSR {kernel} BG")),
            layout: bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: bindings::KERNEL_PARAMS,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: bindings::KERNEL_SOURCE,
                    resource: wgpu::BindingResource::TextureView(source_view),
                },
                wgpu::BindGroupEntry {
                    binding: bindings::KERNEL_TARGET,
                    resource: wgpu::BindingResource::TextureView(target_view),
                },
                wgpu::BindGroupEntry {
                    binding: bindings::KERNEL_SAMPLER,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });
        passes::compute::dispatch_kernel(
            encoder,
            kernel.entry_point(),
            compute_pipeline,
            &bind_group,
            groups,
        );
        Ok(())
    }

    fn encode_ray_march(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        pass: ShaderPass,
        color_targets: [TextureId; 2],
        filter: &RendererFilter,
        frame: &FrameBindings,
    ) -> Result<(), SsrError> {
        if pass != ShaderPass::RayMarch {
            return Err(SsrError::Backend(format!("{pass} is not a geometry pass")));
        }
        let Self {
            ref device,
            ref mut pipelines,
            ref textures,
            ref shared,
            ref geometry,
            ..
        } = *self;
        let geometry = geometry
            .as_deref()
            .ok_or(SsrError::MissingShaderPass(ShaderPass::RayMarch))?;

        let [hit_id, mask_id] = color_targets;
        let hit = resident(textures, hit_id)?;
        let mask = resident(textures, mask_id)?;
        let depth = hit
            .depth_view()
            .ok_or_else(|| SsrError::Backend(format!("{hit_id} has no depth companion")))?;
        let targets = passes::ray_march::RayMarchTargets {
            hit_data: mip_view(hit, hit_id, 0)?,
            hit_mask: mip_view(mask, mask_id, 0)?,
            depth,
        };

        let bind_group = shared.frame_bind_group(
            device,
            &pipelines.frame_bgl,
            textures,
            None,
            frame,
            &color_targets,
        )?;
        let pipeline = pipelines.ray_march(device, geometry)?;
        passes::ray_march::render_ray_march_pass(
            encoder,
            targets,
            pipeline,
            &bind_group,
            geometry,
            filter,
        );
        Ok(())
    }
}

impl SsrBackend for WgpuSsrBackend {
    fn supports_target(&self, desc: &TargetDesc) -> bool {
        self.formats.supports(desc)
    }

    fn allocate_target(
        &mut self,
        key: TargetKey,
        desc: &TargetDesc,
    ) -> Result<TextureId, SsrError> {
        if !self.formats.supports(desc) {
            return Err(SsrError::UnsupportedFormat {
                key,
                format: desc.format,
            });
        }
        let target = self
            .pool
            .acquire(&self.device, &format!("SSR {key:?}"), desc);
        let id = self.next_id();
        log::trace!("Allocated {key:?} {} as {id}", desc.size);
        self.textures.insert(id, Resident::Target { key, target });
        Ok(id)
    }

    fn release_target(&mut self, id: TextureId) {
        match self.textures.remove(&id) {
            Some(Resident::Target { key, target }) => {
                log::trace!("Released {key:?} ({id})");
                self.pool.recycle(target);
            }
            Some(imported @ Resident::Imported(_)) => {
                log::warn!("Release of imported texture {id} ignored");
                self.textures.insert(id, imported);
            }
            None => log::warn!("Release of unknown texture {id}"),
        }
    }

    fn has_shader_pass(&self, pass: ShaderPass) -> bool {
        self.library.has_pass(pass) && (pass != ShaderPass::RayMarch || self.geometry.is_some())
    }

    fn kernel_group_size(&self, kernel: ComputeKernel) -> Option<[u32; 3]> {
        self.library.kernel_group_size(kernel)
    }

    fn submit(&mut self, commands: CommandList) -> Result<(), SsrError> {
        let label = commands.label().to_string();
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(&label) });

        let mut failure = None;
        let mut open_samples = 0usize;
        for command in commands {
            match command {
                Command::Release(id) => self.release_target(id),
                _ if failure.is_some() => {}
                Command::BeginSample(name) => {
                    encoder.push_debug_group(&name);
                    open_samples += 1;
                }
                Command::EndSample(_) => {
                    if open_samples > 0 {
                        encoder.pop_debug_group();
                        open_samples -= 1;
                    }
                }
                other => {
                    if let Err(e) = self.encode(&mut encoder, other) {
                        failure = Some(e);
                    }
                }
            }
        }

        if let Some(error) = failure {
            drop(encoder);
            let _ = pollster::block_on(self.device.pop_error_scope());
            log::error!("SSR submission '{label}' failed: {error}");
            return Err(error);
        }

        for _ in 0..open_samples {
            encoder.pop_debug_group();
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        match pollster::block_on(self.device.pop_error_scope()) {
            Some(error) => {
                log::error!("SSR submission '{label}' rejected by wgpu: {error}");
                Err(SsrError::Backend(format!("{label}: {error}")))
            }
            None => Ok(()),
        }
    }
}
