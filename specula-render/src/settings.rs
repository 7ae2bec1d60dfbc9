//! Tunables of the reflection pipeline.
//!
//! A frame reads the settings but never writes them. Values outside the
//! documented ranges are clamped by [`SsrSettings::sanitized`] before a
//! pipeline takes them.

use specula_gpu_shared::shaders::ShaderPass;

/// What the debug view writes to the camera target instead of the composite.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DebugMode {
    HitUv,
    HitDepth,
    HitMask,
    #[default]
    None,
}

impl DebugMode {
    pub fn shader_pass(self) -> Option<ShaderPass> {
        match self {
            DebugMode::HitUv => Some(ShaderPass::DebugHitUv),
            DebugMode::HitDepth => Some(ShaderPass::DebugHitDepth),
            DebugMode::HitMask => Some(ShaderPass::DebugHitMask),
            DebugMode::None => None,
        }
    }

    pub fn is_enabled(self) -> bool {
        self != DebugMode::None
    }
}

/// Bit set of renderer layers that take part in the ray march.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LayerMask(pub u32);

impl LayerMask {
    pub const ALL: LayerMask = LayerMask(u32::MAX);
    pub const NONE: LayerMask = LayerMask(0);

    pub fn contains(self, layer: u32) -> bool {
        layer < 32 && self.0 & (1 << layer) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl Default for LayerMask {
    fn default() -> Self {
        LayerMask::ALL
    }
}

/// Point in the host's frame where the pipeline is scheduled. Ordering only
/// matters to the host scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderEvent(pub i32);

impl RenderEvent {
    pub const AFTER_OPAQUES: RenderEvent = RenderEvent(300);
    pub const AFTER_SKYBOX: RenderEvent = RenderEvent(400);
    pub const AFTER_TRANSPARENTS: RenderEvent = RenderEvent(500);
    pub const BEFORE_POST_PROCESSING: RenderEvent = RenderEvent(550);
}

impl Default for RenderEvent {
    fn default() -> Self {
        RenderEvent::AFTER_TRANSPARENTS
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SsrSettings {
    /// Label used for profiler scopes.
    pub profiler_tag: String,
    pub render_event: RenderEvent,
    /// Resolution divisor of the resolved target, 1..=10.
    pub down_sample: u32,
    pub thickness: f32,
    pub max_distance: f32,
    pub max_step: u32,
    pub binary_count: u32,
    pub min_smoothness: f32,
    pub brdf_bias: f32,
    pub taa_scale: f32,
    pub taa_weight: f32,
    pub blur_intensity: f32,
    pub blur_max_radius: f32,
    pub layer_mask: LayerMask,
    pub debug_mode: DebugMode,
}

impl Default for SsrSettings {
    fn default() -> Self {
        Self {
            profiler_tag: "SSR".to_string(),
            render_event: RenderEvent::AFTER_TRANSPARENTS,
            down_sample: 1,
            thickness: 0.01,
            max_distance: 100.0,
            max_step: 16,
            binary_count: 4,
            min_smoothness: 0.25,
            brdf_bias: 0.7,
            taa_scale: 1.0,
            taa_weight: 0.99,
            blur_intensity: 1.0,
            blur_max_radius: 32.0,
            layer_mask: LayerMask::ALL,
            debug_mode: DebugMode::None,
        }
    }
}

fn clamp_f32(name: &str, value: f32, min: f32, max: f32) -> f32 {
    // NaN falls back to the lower bound
    let clamped = if value.is_nan() { min } else { value.clamp(min, max) };
    if clamped != value {
        log::warn!("SSR setting {name} = {value} out of range [{min}, {max}], using {clamped}");
    }
    clamped
}

fn clamp_u32(name: &str, value: u32, min: u32, max: u32) -> u32 {
    let clamped = value.clamp(min, max);
    if clamped != value {
        log::warn!("SSR setting {name} = {value} out of range [{min}, {max}], using {clamped}");
    }
    clamped
}

impl SsrSettings {
    /// Copy with every tunable clamped into its range.
    pub fn sanitized(&self) -> Self {
        Self {
            profiler_tag: self.profiler_tag.clone(),
            render_event: self.render_event,
            down_sample: clamp_u32("down_sample", self.down_sample, 1, 10),
            thickness: clamp_f32("thickness", self.thickness, 0.0, 1.0),
            max_distance: clamp_f32("max_distance", self.max_distance, 0.0, 1000.0),
            max_step: clamp_u32("max_step", self.max_step, 1, 64),
            binary_count: clamp_u32("binary_count", self.binary_count, 1, 16),
            min_smoothness: clamp_f32("min_smoothness", self.min_smoothness, 0.0, 1.0),
            brdf_bias: clamp_f32("brdf_bias", self.brdf_bias, 0.0, 1.0),
            taa_scale: clamp_f32("taa_scale", self.taa_scale, 1.0, 5.0),
            taa_weight: clamp_f32("taa_weight", self.taa_weight, 0.0, 0.99),
            blur_intensity: clamp_f32("blur_intensity", self.blur_intensity, 0.0, 1.0),
            blur_max_radius: clamp_f32("blur_max_radius", self.blur_max_radius, 0.0, 255.0),
            layer_mask: self.layer_mask,
            debug_mode: self.debug_mode,
        }
    }

    /// Blur radius in texels: `intensity * max_radius`.
    pub fn effective_blur_radius(&self) -> f32 {
        self.blur_intensity * self.blur_max_radius
    }

    pub fn blur_enabled(&self) -> bool {
        self.blur_intensity != 0.0 && self.blur_max_radius != 0.0
    }
}
