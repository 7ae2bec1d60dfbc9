//! Shader-stage contract between the SSR orchestration and its kernels.
//!
//! Fullscreen and geometry passes are addressed by pass index, compute work by
//! kernel entry-point name. The SSR kernels live with the backend that loads
//! them; only the utility shaders shared by every backend are embedded here.

use std::fmt;

pub const FULLSCREEN_TRIANGLE_VERT: &str = include_str!("../shaders/fullscreen_triangle.wgsl");
pub const BLIT_FRAG: &str = include_str!("../shaders/blit.wgsl");

pub const FULLSCREEN_VERT_ENTRY: &str = "vs_fullscreen";
pub const BLIT_FRAG_ENTRY: &str = "fs_blit";

/// Material pass indices of the SSR shader.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderPass {
    CopyDepth = 0,
    RayMarch = 1,
    DebugHitUv = 2,
    DebugHitDepth = 3,
    DebugHitMask = 4,
    Resolve = 5,
    TemporalBlend = 6,
    Composite = 7,
}

impl ShaderPass {
    pub const ALL: [ShaderPass; 8] = [
        ShaderPass::CopyDepth,
        ShaderPass::RayMarch,
        ShaderPass::DebugHitUv,
        ShaderPass::DebugHitDepth,
        ShaderPass::DebugHitMask,
        ShaderPass::Resolve,
        ShaderPass::TemporalBlend,
        ShaderPass::Composite,
    ];

    pub fn index(self) -> u32 {
        self as u32
    }

    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// WGSL fragment entry point implementing this pass.
    pub fn fragment_entry(self) -> &'static str {
        match self {
            ShaderPass::CopyDepth => "fs_copy_depth",
            ShaderPass::RayMarch => "fs_ray_march",
            ShaderPass::DebugHitUv => "fs_debug_hit_uv",
            ShaderPass::DebugHitDepth => "fs_debug_hit_depth",
            ShaderPass::DebugHitMask => "fs_debug_hit_mask",
            ShaderPass::Resolve => "fs_resolve",
            ShaderPass::TemporalBlend => "fs_temporal_blend",
            ShaderPass::Composite => "fs_composite",
        }
    }

    /// Only the ray march draws scene geometry; every other pass uses the
    /// built-in fullscreen triangle.
    pub fn vertex_entry(self) -> Option<&'static str> {
        match self {
            ShaderPass::RayMarch => Some("vs_ray_march"),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ShaderPass::CopyDepth => "SSR Copy Depth",
            ShaderPass::RayMarch => "SSR Ray March",
            ShaderPass::DebugHitUv => "SSR Debug Hit UV",
            ShaderPass::DebugHitDepth => "SSR Debug Hit Depth",
            ShaderPass::DebugHitMask => "SSR Debug Hit Mask",
            ShaderPass::Resolve => "SSR Resolve",
            ShaderPass::TemporalBlend => "SSR Temporal Blend",
            ShaderPass::Composite => "SSR Composite",
        }
    }
}

impl fmt::Display for ShaderPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pass {} ({})", self.index(), self.fragment_entry())
    }
}

/// Compute shader asset a kernel lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComputeModule {
    HiZ,
    DualBlur,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComputeKernel {
    GetHiZ,
    DualBlurDownSample,
    DualBlurUpSample,
    LerpDownUpTex,
}

impl ComputeKernel {
    pub const ALL: [ComputeKernel; 4] = [
        ComputeKernel::GetHiZ,
        ComputeKernel::DualBlurDownSample,
        ComputeKernel::DualBlurUpSample,
        ComputeKernel::LerpDownUpTex,
    ];

    pub fn entry_point(self) -> &'static str {
        match self {
            ComputeKernel::GetHiZ => "GetHiZ",
            ComputeKernel::DualBlurDownSample => "DualBlurDownSample",
            ComputeKernel::DualBlurUpSample => "DualBlurUpSample",
            ComputeKernel::LerpDownUpTex => "LerpDownUpTex",
        }
    }

    pub fn module(self) -> ComputeModule {
        match self {
            ComputeKernel::GetHiZ => ComputeModule::HiZ,
            _ => ComputeModule::DualBlur,
        }
    }

    /// `LerpDownUpTex` blends into its target in place.
    pub fn target_is_read_write(self) -> bool {
        matches!(self, ComputeKernel::LerpDownUpTex)
    }
}

impl fmt::Display for ComputeKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.entry_point())
    }
}

/// Bind group slots. Fullscreen and geometry passes share group 0:
///   0: uniform SsrFrameUniforms
///   1: sampler (non-filtering, clamp)
///   2: texture_2d<f32>   blit source
///   3: texture_depth_2d  camera depth
///   4-6: texture_2d<f32> G-buffer 0..2
///   7: texture_2d<f32>   Hi-Z chain (all mips)
///   8: texture_2d<f32>   hit data (uv.xy, z, unused)
///   9: texture_2d<f32>   hit mask
///   10: texture_2d<f32>  resolved
///   11: texture_2d<f32>  TAA current
///   12: texture_2d<f32>  TAA history
///   13: texture_2d<f32>  blue noise
///   14: texture_2d<f32>  scene colour copy
/// Compute kernels use their own group 0:
///   0: uniform HiZParams / DualBlurParams
///   1: texture_2d<f32>   _SourceTex
///   2: texture_storage_2d _RW_TargetTex (read_write for LerpDownUpTex)
///   3: sampler (non-filtering, clamp)
pub mod bindings {
    pub const FRAME_UNIFORMS: u32 = 0;
    pub const POINT_SAMPLER: u32 = 1;
    pub const BLIT_SOURCE: u32 = 2;
    pub const CAMERA_DEPTH: u32 = 3;
    pub const GBUFFER: [u32; 3] = [4, 5, 6];
    pub const HIZ_DEPTH: u32 = 7;
    pub const HIT_DATA: u32 = 8;
    pub const HIT_MASK: u32 = 9;
    pub const RESOLVED: u32 = 10;
    pub const TAA_CURRENT: u32 = 11;
    pub const TAA_HISTORY: u32 = 12;
    pub const BLUE_NOISE: u32 = 13;
    pub const SOURCE_COLOR: u32 = 14;

    /// Per-object data of the ray-march draw is bound by the host in this group.
    pub const OBJECT_GROUP: u32 = 1;

    pub const KERNEL_PARAMS: u32 = 0;
    pub const KERNEL_SOURCE: u32 = 1;
    pub const KERNEL_TARGET: u32 = 2;
    pub const KERNEL_SAMPLER: u32 = 3;
}
