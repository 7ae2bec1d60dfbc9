//! Dual-filter (Kawase) blur planning.
//!
//! A radius `r` maps to `floor(log2(r + 1))` extra downsample levels; the
//! fractional part of `log2(r + 1)` blends the last two upsample results so
//! the blur strength changes continuously with the radius.

use specula_gpu_shared::uniforms::DualBlurParams;

use crate::backend::TextureId;
use crate::targets::{FilterMode, StorageAccess, TargetDesc, TargetFormat, TargetKey};
use crate::texture_size::TextureSize;

pub const BLUR_FORMAT: TargetFormat = TargetFormat::Rgba16Float;

#[derive(Clone, Debug, PartialEq)]
pub struct BlurPlan {
    pub radius: f32,
    pub down_sample_count: u32,
    pub offset_ratio: f32,
    /// `sizes[0]` is the full-size output, `sizes[1..]` the downsample
    /// pyramid, each dimension `ceil(prev / 2)`.
    pub sizes: Vec<TextureSize>,
}

impl BlurPlan {
    pub fn new(radius: f32, base: TextureSize) -> Self {
        let amount = (radius.max(0.0) + 1.0).log2();
        let down_sample_count = amount.floor() as u32;
        let offset_ratio = amount - down_sample_count as f32;

        let mut sizes = Vec::with_capacity(down_sample_count as usize + 2);
        sizes.push(base);
        for i in 0..=down_sample_count as usize {
            let next = sizes[i].ceil_halved();
            sizes.push(next);
        }

        Self {
            radius,
            down_sample_count,
            offset_ratio,
            sizes,
        }
    }

    pub fn base(&self) -> TextureSize {
        self.sizes[0]
    }

    /// One downsample, one upsample and a lerp against the unblurred input.
    pub fn is_single_level(&self) -> bool {
        self.down_sample_count == 0
    }

    /// Downsample levels (`down_sample_count + 1`).
    pub fn level_count(&self) -> usize {
        self.sizes.len() - 1
    }

    /// Output plus pyramid levels.
    pub fn pyramid_target_count(&self) -> usize {
        self.sizes.len()
    }

    /// Size of the ping-pong partner of the smallest upsample target.
    pub fn intermediate_size(&self) -> TextureSize {
        self.sizes[self.down_sample_count as usize]
    }

    pub fn output_desc(&self) -> TargetDesc {
        let access = if self.is_single_level() {
            StorageAccess::ReadWrite
        } else {
            StorageAccess::WriteOnly
        };
        TargetDesc::storage(self.base(), BLUR_FORMAT, access).with_filter(FilterMode::Bilinear)
    }

    pub fn level_desc(&self, level: usize) -> TargetDesc {
        TargetDesc::storage(self.sizes[level], BLUR_FORMAT, StorageAccess::WriteOnly)
            .with_filter(FilterMode::Bilinear)
    }

    pub fn intermediate_desc(&self) -> Option<TargetDesc> {
        (!self.is_single_level()).then(|| {
            TargetDesc::storage(self.intermediate_size(), BLUR_FORMAT, StorageAccess::ReadWrite)
                .with_filter(FilterMode::Bilinear)
        })
    }

    /// Every target the blur allocates this frame, output first.
    pub fn targets(&self) -> Vec<(TargetKey, TargetDesc)> {
        let mut targets = vec![(TargetKey::BlurOutput, self.output_desc())];
        for level in 1..self.sizes.len() {
            targets.push((TargetKey::BlurLevel(level as u8), self.level_desc(level)));
        }
        if let Some(desc) = self.intermediate_desc() {
            targets.push((TargetKey::BlurIntermediate, desc));
        }
        targets
    }
}

/// Parameters of a down or up sample from `source` into `target`.
pub fn sample_params(source: TextureSize, target: TextureSize, offset: f32) -> DualBlurParams {
    DualBlurParams {
        source_size: source.params_array(),
        target_size: target.params_array(),
        blur_offset: offset,
        ..bytemuck::Zeroable::zeroed()
    }
}

/// Parameters of `LerpDownUpTex`; the dispatch covers `size`.
pub fn lerp_params(size: TextureSize, ratio: f32) -> DualBlurParams {
    sample_params(size, size, ratio)
}

/// Two buffers of the same size, one readable (front) while the other is
/// written (back).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PingPong {
    buffers: [TextureId; 2],
    front: usize,
}

impl PingPong {
    pub fn new(front: TextureId, back: TextureId) -> Self {
        Self {
            buffers: [front, back],
            front: 0,
        }
    }

    pub fn front(&self) -> TextureId {
        self.buffers[self.front]
    }

    pub fn back(&self) -> TextureId {
        self.buffers[1 - self.front]
    }

    pub fn swap(&mut self) {
        self.front = 1 - self.front;
    }
}
