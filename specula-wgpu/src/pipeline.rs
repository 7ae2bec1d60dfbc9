//! Bind group layouts and pipeline creation for the SSR passes and kernels.
//! Fullscreen pipelines are keyed by pass and output format since the debug
//! views and the final blit write the host's camera format.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use specula_gpu_shared::shaders::{self, bindings, ComputeKernel, ComputeModule, ShaderPass};

use crate::geometry::GeometrySource;
use crate::render_targets::DEPTH_FORMAT;
use crate::shader_library::ShaderLibrary;

/// Colour formats of the ray-march draw: hit data then hit mask.
pub const RAY_MARCH_FORMATS: [wgpu::TextureFormat; 2] =
    [wgpu::TextureFormat::Rgba32Float, wgpu::TextureFormat::R32Float];

/// Shared fullscreen triangle vertex state (vertex-index based, no buffers).
fn fullscreen_vertex_state(module: &wgpu::ShaderModule) -> wgpu::VertexState<'_> {
    wgpu::VertexState {
        module,
        entry_point: Some(shaders::FULLSCREEN_VERT_ENTRY),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        buffers: &[],
    }
}

fn texture_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    sample_type: wgpu::TextureSampleType,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

// ============================================================
// Bind group layouts
// ============================================================

/// Group 0 of every fullscreen pass and of the ray-march draw:
///   0: uniform SsrFrameUniforms
///   1: sampler (non-filtering)
///   2: blit source
///   3: texture_depth_2d camera depth
///   4-14: unfilterable float textures (G-buffer, Hi-Z, hits, TAA, noise, scene colour)
pub fn create_frame_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let visibility = wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT;
    let unfilterable = wgpu::TextureSampleType::Float { filterable: false };

    let mut entries = vec![
        uniform_entry(bindings::FRAME_UNIFORMS, visibility),
        wgpu::BindGroupLayoutEntry {
            binding: bindings::POINT_SAMPLER,
            visibility,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
            count: None,
        },
        texture_entry(bindings::BLIT_SOURCE, visibility, unfilterable),
        texture_entry(bindings::CAMERA_DEPTH, visibility, wgpu::TextureSampleType::Depth),
    ];
    for binding in bindings::GBUFFER[0]..=bindings::SOURCE_COLOR {
        entries.push(texture_entry(binding, visibility, unfilterable));
    }

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("SSR Frame BGL"),
        entries: &entries,
    })
}

/// Plain copy: 0 source texture, 1 linear sampler.
pub fn create_blit_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("SSR Blit BGL"),
        entries: &[
            texture_entry(
                0,
                wgpu::ShaderStages::FRAGMENT,
                wgpu::TextureSampleType::Float { filterable: true },
            ),
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

/// Storage format a kernel writes.
pub fn kernel_storage_format(kernel: ComputeKernel) -> wgpu::TextureFormat {
    match kernel.module() {
        ComputeModule::HiZ => wgpu::TextureFormat::R32Float,
        ComputeModule::DualBlur => wgpu::TextureFormat::Rgba16Float,
    }
}

/// Blur kernels sample their source bilinearly; the Hi-Z reduction reads
/// exact texels.
pub fn kernel_filters(kernel: ComputeKernel) -> bool {
    kernel.module() == ComputeModule::DualBlur
}

/// Kernel group 0:
///   0: uniform params
///   1: source texture
///   2: storage target
///   3: sampler
pub fn create_kernel_bind_group_layout(
    device: &wgpu::Device,
    kernel: ComputeKernel,
) -> wgpu::BindGroupLayout {
    let filters = kernel_filters(kernel);
    let access = if kernel.target_is_read_write() {
        wgpu::StorageTextureAccess::ReadWrite
    } else {
        wgpu::StorageTextureAccess::WriteOnly
    };
    let sampler = if filters {
        wgpu::SamplerBindingType::Filtering
    } else {
        wgpu::SamplerBindingType::NonFiltering
    };

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(&format!("SSR {kernel} BGL")),
        entries: &[
            uniform_entry(bindings::KERNEL_PARAMS, wgpu::ShaderStages::COMPUTE),
            texture_entry(
                bindings::KERNEL_SOURCE,
                wgpu::ShaderStages::COMPUTE,
                wgpu::TextureSampleType::Float { filterable: filters },
            ),
            wgpu::BindGroupLayoutEntry {
                binding: bindings::KERNEL_TARGET,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access,
                    format: kernel_storage_format(kernel),
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: bindings::KERNEL_SAMPLER,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Sampler(sampler),
                count: None,
            },
        ],
    })
}

// ============================================================
// Pipelines
// ============================================================

pub fn create_fullscreen_effect_pipeline(
    device: &wgpu::Device,
    label: &str,
    vert_module: &wgpu::ShaderModule,
    frag_module: &wgpu::ShaderModule,
    frag_entry: &str,
    bgl: &wgpu::BindGroupLayout,
    output_format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&format!("{label} Layout")),
        bind_group_layouts: &[bgl],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&layout),
        vertex: fullscreen_vertex_state(vert_module),
        fragment: Some(wgpu::FragmentState {
            module: frag_module,
            entry_point: Some(frag_entry),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: output_format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

/// Geometry draw of pass 1 into hit data and hit mask with a depth test
/// against the hit-data depth companion.
pub fn create_ray_march_pipeline(
    device: &wgpu::Device,
    module: &wgpu::ShaderModule,
    frame_bgl: &wgpu::BindGroupLayout,
    geometry: &dyn GeometrySource,
) -> Result<wgpu::RenderPipeline, String> {
    let vertex_entry = ShaderPass::RayMarch
        .vertex_entry()
        .ok_or_else(|| "ray march has no vertex entry".to_string())?;

    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("SSR Ray March Layout"),
        bind_group_layouts: &[frame_bgl, geometry.object_bind_group_layout()],
        push_constant_ranges: &[],
    });

    let targets = RAY_MARCH_FORMATS.map(|format| {
        Some(wgpu::ColorTargetState {
            format,
            blend: None,
            write_mask: wgpu::ColorWrites::ALL,
        })
    });

    Ok(device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(ShaderPass::RayMarch.label()),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some(vertex_entry),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            buffers: geometry.vertex_layouts(),
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some(ShaderPass::RayMarch.fragment_entry()),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            targets: &targets,
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    }))
}

pub fn create_kernel_pipeline(
    device: &wgpu::Device,
    module: &wgpu::ShaderModule,
    kernel: ComputeKernel,
    bgl: &wgpu::BindGroupLayout,
) -> wgpu::ComputePipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&format!("SSR {kernel} Layout")),
        bind_group_layouts: &[bgl],
        push_constant_ranges: &[],
    });

    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(&format!("SSR {kernel}")),
        layout: Some(&layout),
        module,
        entry_point: Some(kernel.entry_point()),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    })
}

// ============================================================
// Cache
// ============================================================

/// Shader modules, layouts and every pipeline built so far.
pub struct PipelineCache {
    fullscreen_module: wgpu::ShaderModule,
    blit_module: wgpu::ShaderModule,
    ssr_module: Option<wgpu::ShaderModule>,
    compute_modules: HashMap<ComputeModule, wgpu::ShaderModule>,
    pub frame_bgl: wgpu::BindGroupLayout,
    pub blit_bgl: wgpu::BindGroupLayout,
    kernel_bgls: HashMap<ComputeKernel, wgpu::BindGroupLayout>,
    fullscreen: HashMap<(ShaderPass, wgpu::TextureFormat), wgpu::RenderPipeline>,
    blit: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
    ray_march: Option<wgpu::RenderPipeline>,
    kernels: HashMap<ComputeKernel, wgpu::ComputePipeline>,
}

fn create_module(device: &wgpu::Device, label: &str, source: &str) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    })
}

impl PipelineCache {
    pub fn new(device: &wgpu::Device, library: &ShaderLibrary) -> Self {
        let ssr_module = library
            .ssr()
            .map(|m| create_module(device, &m.label, &m.source));
        let compute_modules = [ComputeModule::HiZ, ComputeModule::DualBlur]
            .into_iter()
            .filter_map(|module| {
                library
                    .compute(module)
                    .map(|m| (module, create_module(device, &m.label, &m.source)))
            })
            .collect();

        Self {
            fullscreen_module: create_module(
                device,
                "SSR Fullscreen Vert",
                shaders::FULLSCREEN_TRIANGLE_VERT,
            ),
            blit_module: create_module(device, "SSR Blit", shaders::BLIT_FRAG),
            ssr_module,
            compute_modules,
            frame_bgl: create_frame_bind_group_layout(device),
            blit_bgl: create_blit_bind_group_layout(device),
            kernel_bgls: HashMap::new(),
            fullscreen: HashMap::new(),
            blit: HashMap::new(),
            ray_march: None,
            kernels: HashMap::new(),
        }
    }

    pub fn fullscreen(
        &mut self,
        device: &wgpu::Device,
        pass: ShaderPass,
        format: wgpu::TextureFormat,
    ) -> Result<&wgpu::RenderPipeline, String> {
        match self.fullscreen.entry((pass, format)) {
            Entry::Occupied(e) => Ok(&*e.into_mut()),
            Entry::Vacant(e) => {
                let module = self
                    .ssr_module
                    .as_ref()
                    .ok_or_else(|| format!("no SSR shader module for {pass}"))?;
                log::debug!("Creating {} pipeline for {format:?}", pass.label());
                Ok(&*e.insert(create_fullscreen_effect_pipeline(
                    device,
                    pass.label(),
                    &self.fullscreen_module,
                    module,
                    pass.fragment_entry(),
                    &self.frame_bgl,
                    format,
                )))
            }
        }
    }

    pub fn blit(
        &mut self,
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
    ) -> &wgpu::RenderPipeline {
        match self.blit.entry(format) {
            Entry::Occupied(e) => &*e.into_mut(),
            Entry::Vacant(e) => &*e.insert(create_fullscreen_effect_pipeline(
                device,
                "SSR Blit",
                &self.fullscreen_module,
                &self.blit_module,
                shaders::BLIT_FRAG_ENTRY,
                &self.blit_bgl,
                format,
            )),
        }
    }

    pub fn ray_march(
        &mut self,
        device: &wgpu::Device,
        geometry: &dyn GeometrySource,
    ) -> Result<&wgpu::RenderPipeline, String> {
        if self.ray_march.is_none() {
            let module = self
                .ssr_module
                .as_ref()
                .ok_or_else(|| "no SSR shader module for the ray march".to_string())?;
            self.ray_march = Some(create_ray_march_pipeline(
                device,
                module,
                &self.frame_bgl,
                geometry,
            )?);
        }
        self.ray_march
            .as_ref()
            .ok_or_else(|| "ray march pipeline unavailable".to_string())
    }

    /// The ray-march pipeline bakes the geometry's vertex layouts; a new
    /// geometry source rebuilds it on next use.
    pub fn reset_ray_march(&mut self) {
        self.ray_march = None;
    }

    /// Pipeline and bind group layout of `kernel`.
    pub fn kernel(
        &mut self,
        device: &wgpu::Device,
        kernel: ComputeKernel,
    ) -> Result<(&wgpu::ComputePipeline, &wgpu::BindGroupLayout), String> {
        let bgl: &wgpu::BindGroupLayout = self
            .kernel_bgls
            .entry(kernel)
            .or_insert_with(|| create_kernel_bind_group_layout(device, kernel));
        let pipeline: &wgpu::ComputePipeline = match self.kernels.entry(kernel) {
            Entry::Occupied(e) => &*e.into_mut(),
            Entry::Vacant(e) => {
                let module = self
                    .compute_modules
                    .get(&kernel.module())
                    .ok_or_else(|| format!("no shader module for kernel {kernel}"))?;
                log::debug!("Creating compute pipeline for {kernel}");
                &*e.insert(create_kernel_pipeline(device, module, kernel, bgl))
            }
        };
        Ok((pipeline, bgl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_storage_formats() {
        assert_eq!(
            kernel_storage_format(ComputeKernel::GetHiZ),
            wgpu::TextureFormat::R32Float
        );
        for kernel in [
            ComputeKernel::DualBlurDownSample,
            ComputeKernel::DualBlurUpSample,
            ComputeKernel::LerpDownUpTex,
        ] {
            assert_eq!(kernel_storage_format(kernel), wgpu::TextureFormat::Rgba16Float);
            assert!(kernel_filters(kernel));
        }
        assert!(!kernel_filters(ComputeKernel::GetHiZ));
    }

    #[test]
    fn test_ray_march_formats_match_targets() {
        use specula_render::targets::{frame_target_spec, TargetKey};
        let hit = frame_target_spec(TargetKey::HitData, 1).unwrap();
        let mask = frame_target_spec(TargetKey::HitMask, 1).unwrap();
        assert_eq!(crate::render_targets::wgpu_format(hit.format), RAY_MARCH_FORMATS[0]);
        assert_eq!(crate::render_targets::wgpu_format(mask.format), RAY_MARCH_FORMATS[1]);
        assert!(hit.depth_bits > 0);
    }
}
