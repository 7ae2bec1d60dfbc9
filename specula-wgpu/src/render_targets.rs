//! Render target creation for the SSR pipeline.
//! Maps logical target descriptions to wgpu textures, keeps per-mip views for
//! compute and attachment use, and pools textures between frames.

use std::collections::HashMap;

use specula_render::targets::{StorageAccess, TargetDesc, TargetFormat};
use specula_render::TextureSize;

/// Depth companion format of geometry-pass targets.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;
/// Format of the 1x1 stand-in bound to unused colour slots.
pub const DUMMY_COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
/// Format of the 1x1 stand-in bound to an unused depth slot.
pub const DUMMY_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Free textures kept per description once released.
const MAX_FREE_PER_DESC: usize = 4;

pub fn wgpu_format(format: TargetFormat) -> wgpu::TextureFormat {
    match format {
        TargetFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TargetFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        TargetFormat::R32Float => wgpu::TextureFormat::R32Float,
    }
}

pub fn extent(size: TextureSize) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: size.width,
        height: size.height,
        depth_or_array_layers: 1,
    }
}

/// Usages a target needs: every target is sampled and copied, attachments and
/// storage images add their own usage.
pub fn target_usages(desc: &TargetDesc) -> wgpu::TextureUsages {
    let mut usage = wgpu::TextureUsages::TEXTURE_BINDING
        | wgpu::TextureUsages::COPY_SRC
        | wgpu::TextureUsages::COPY_DST;
    if desc.render_target {
        usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }
    if desc.storage != StorageAccess::None {
        usage |= wgpu::TextureUsages::STORAGE_BINDING;
    }
    usage
}

// ============================================================
// Format capabilities
// ============================================================

/// Capabilities of the three target formats on one device.
#[derive(Clone, Debug)]
pub struct FormatSupport {
    features: HashMap<wgpu::TextureFormat, wgpu::TextureFormatFeatures>,
    max_dimension: u32,
}

impl FormatSupport {
    const FORMATS: [TargetFormat; 3] = [
        TargetFormat::Rgba16Float,
        TargetFormat::Rgba32Float,
        TargetFormat::R32Float,
    ];

    /// Adapter-reported capabilities when the device enabled them, the
    /// WebGPU-guaranteed set otherwise.
    pub fn query(adapter: &wgpu::Adapter, device: &wgpu::Device) -> Self {
        let adapter_specific = device
            .features()
            .contains(wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES);
        let features = Self::FORMATS
            .iter()
            .map(|f| {
                let format = wgpu_format(*f);
                let caps = if adapter_specific {
                    adapter.get_texture_format_features(format)
                } else {
                    format.guaranteed_format_features(device.features())
                };
                (format, caps)
            })
            .collect();
        Self {
            features,
            max_dimension: device.limits().max_texture_dimension_2d,
        }
    }

    pub fn guaranteed(device_features: wgpu::Features, max_dimension: u32) -> Self {
        let features = Self::FORMATS
            .iter()
            .map(|f| {
                let format = wgpu_format(*f);
                (format, format.guaranteed_format_features(device_features))
            })
            .collect();
        Self {
            features,
            max_dimension,
        }
    }

    pub fn supports(&self, desc: &TargetDesc) -> bool {
        if desc.size.is_empty()
            || desc.size.width > self.max_dimension
            || desc.size.height > self.max_dimension
        {
            return false;
        }
        let Some(caps) = self.features.get(&wgpu_format(desc.format)) else {
            return false;
        };
        if !caps.allowed_usages.contains(target_usages(desc)) {
            return false;
        }
        if desc.storage == StorageAccess::ReadWrite
            && !caps
                .flags
                .contains(wgpu::TextureFormatFeatureFlags::STORAGE_READ_WRITE)
        {
            return false;
        }
        true
    }
}

// ============================================================
// Targets
// ============================================================

/// A pooled colour target with its views and optional depth companion.
pub struct GpuTarget {
    pub texture: wgpu::Texture,
    /// All mips, bound as a sampled texture.
    pub view: wgpu::TextureView,
    /// One view per mip, used as attachment, storage image or kernel source.
    pub mip_views: Vec<wgpu::TextureView>,
    pub depth_texture: Option<wgpu::Texture>,
    pub depth_view: Option<wgpu::TextureView>,
    pub desc: TargetDesc,
}

pub fn create_target(device: &wgpu::Device, label: &str, desc: &TargetDesc) -> GpuTarget {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: extent(desc.size),
        mip_level_count: desc.mip_levels.max(1),
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu_format(desc.format),
        usage: target_usages(desc),
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let mip_views = (0..desc.mip_levels.max(1))
        .map(|mip| {
            texture.create_view(&wgpu::TextureViewDescriptor {
                base_mip_level: mip,
                mip_level_count: Some(1),
                ..Default::default()
            })
        })
        .collect();

    let (depth_texture, depth_view) = if desc.depth_bits > 0 {
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("{label} Depth")),
            size: extent(desc.size),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());
        (Some(depth), Some(depth_view))
    } else {
        (None, None)
    };

    GpuTarget {
        texture,
        view,
        mip_views,
        depth_texture,
        depth_view,
        desc: *desc,
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub created: u64,
    pub reused: u64,
    pub free: usize,
    pub free_bytes: u64,
}

/// Free lists of released targets keyed by their exact description.
#[derive(Default)]
pub struct TexturePool {
    free: HashMap<TargetDesc, Vec<GpuTarget>>,
    created: u64,
    reused: u64,
}

impl TexturePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&mut self, device: &wgpu::Device, label: &str, desc: &TargetDesc) -> GpuTarget {
        if let Some(target) = self.free.get_mut(desc).and_then(|list| list.pop()) {
            self.reused += 1;
            return target;
        }
        self.created += 1;
        create_target(device, label, desc)
    }

    /// Returns a target for reuse; drops it when its free list is full.
    pub fn recycle(&mut self, target: GpuTarget) {
        let list = self.free.entry(target.desc).or_default();
        if list.len() < MAX_FREE_PER_DESC {
            list.push(target);
        }
    }

    /// Drops every free texture.
    pub fn trim(&mut self) {
        let dropped: usize = self.free.values().map(Vec::len).sum();
        self.free.clear();
        if dropped > 0 {
            log::debug!("SSR texture pool trimmed {dropped} free targets");
        }
    }

    pub fn stats(&self) -> PoolStats {
        let free = self.free.values().map(Vec::len).sum();
        let free_bytes = self
            .free
            .iter()
            .map(|(desc, list)| desc.byte_size() * list.len() as u64)
            .sum();
        PoolStats {
            created: self.created,
            reused: self.reused,
            free,
            free_bytes,
        }
    }
}

// ============================================================
// Stand-ins for unbound slots
// ============================================================

/// 1x1 zero colour texture for frame slots with no texture this pass.
pub fn create_dummy_color_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("SSR Dummy Color"),
        size: extent(TextureSize::new(1, 1)),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DUMMY_COLOR_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &[0u8; 8],
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(8),
            rows_per_image: Some(1),
        },
        extent(TextureSize::new(1, 1)),
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

/// 1x1 depth texture cleared to the far plane.
pub fn create_dummy_depth_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("SSR Dummy Depth"),
        size: extent(TextureSize::new(1, 1)),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DUMMY_DEPTH_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("SSR Dummy Depth Clear"),
    });
    {
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("SSR Dummy Depth Clear"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            ..Default::default()
        });
    }
    queue.submit(std::iter::once(encoder.finish()));

    (texture, view)
}
