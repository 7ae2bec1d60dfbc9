use bytemuck::{Pod, Zeroable};

/// Per-frame SSR uniform block at group 0, binding 0 of every fullscreen pass
/// and of the ray-march draw. Size is a multiple of 16 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SsrFrameUniforms {
    pub view: [[f32; 4]; 4],
    pub inv_view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub inv_projection: [[f32; 4]; 4],
    pub view_proj: [[f32; 4]; 4],
    pub inv_view_proj: [[f32; 4]; 4],
    /// View-projection captured at the end of the previous frame's temporal step.
    pub prev_view_proj: [[f32; 4]; 4],
    /// (w, h, 1/w, 1/h) of the camera target.
    pub view_size: [f32; 4],
    pub ray_march_size: [f32; 4],
    pub resolved_size: [f32; 4],
    pub taa_size: [f32; 4],
    pub blue_noise_size: [f32; 4],
    pub jitter: [f32; 2],
    pub max_step: u32,
    pub binary_count: u32,
    pub thickness: f32,
    pub max_distance: f32,
    pub min_smoothness: f32,
    pub brdf_bias: f32,
    pub taa_scale: f32,
    pub taa_weight: f32,
    /// 0 on the first frame and after the history target was reallocated.
    pub history_valid: u32,
    pub _pad0: u32,
}

/// `GetHiZ` parameters: (1/src_w, 1/src_h, 1/dst_w, 1/dst_h).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct HiZParams {
    pub tex_size: [f32; 4],
}

/// Dual-filter blur parameters shared by the down, up and lerp kernels.
/// `blur_offset` is the sample offset for down/up and the interpolation
/// factor for `LerpDownUpTex`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DualBlurParams {
    pub source_size: [f32; 4],
    pub target_size: [f32; 4],
    pub blur_offset: f32,
    pub _pad1: f32,
    pub _pad2: f32,
    pub _pad3: f32,
}
