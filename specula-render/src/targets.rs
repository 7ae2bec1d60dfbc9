//! Logical render targets of one camera frame and the policy that sizes them.
//!
//! Every size is derived from the camera's base resolution and the downsample
//! factor, so two frames with the same inputs describe identical targets.

use crate::texture_size::TextureSize;

pub const MAX_HIZ_LEVELS: u32 = 7;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetKey {
    /// Copy of the camera colour before any SSR write.
    Source,
    /// Hi-Z chain, mip i holds level i.
    HiZ,
    /// Storage-writable scratch for Hi-Z level i (i >= 1).
    HiZLevel(u8),
    /// Hit UV in xy, hit depth in z.
    HitData,
    HitMask,
    Resolved,
    TaaCurrent,
    TaaHistory,
    Combine,
    /// Full-size output of the blur pyramid.
    BlurOutput,
    BlurLevel(u8),
    BlurIntermediate,
}

impl TargetKey {
    /// Frame targets allocated at setup, in allocation order.
    pub const FRAME_TARGETS: [TargetKey; 8] = [
        TargetKey::Source,
        TargetKey::HiZ,
        TargetKey::HitData,
        TargetKey::HitMask,
        TargetKey::Resolved,
        TargetKey::TaaCurrent,
        TargetKey::TaaHistory,
        TargetKey::Combine,
    ];

    pub fn is_stage_transient(self) -> bool {
        matches!(
            self,
            TargetKey::HiZLevel(_)
                | TargetKey::BlurOutput
                | TargetKey::BlurLevel(_)
                | TargetKey::BlurIntermediate
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetFormat {
    /// Half-float colour.
    Rgba16Float,
    Rgba32Float,
    R32Float,
}

impl TargetFormat {
    pub fn bytes_per_texel(self) -> u32 {
        match self {
            TargetFormat::Rgba16Float => 8,
            TargetFormat::Rgba32Float => 16,
            TargetFormat::R32Float => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FilterMode {
    #[default]
    Point,
    Bilinear,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StorageAccess {
    #[default]
    None,
    WriteOnly,
    ReadWrite,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// Released at camera cleanup.
    #[default]
    Frame,
    /// Survives cleanup; reallocated only when its descriptor changes.
    Persistent,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MipLevels {
    #[default]
    One,
    /// Full chain for the size, capped at the given count.
    Chain(u32),
}

/// Concrete, backend-facing description of a target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TargetDesc {
    pub size: TextureSize,
    pub format: TargetFormat,
    /// 0 or 24. A non-zero value asks for a depth companion usable as the
    /// depth attachment of a geometry pass into this target.
    pub depth_bits: u8,
    pub mip_levels: u32,
    pub filter: FilterMode,
    pub storage: StorageAccess,
    /// Written as a colour attachment by a fullscreen or geometry pass.
    pub render_target: bool,
}

impl TargetDesc {
    /// Single-mip, point-filtered render target.
    pub fn color(size: TextureSize, format: TargetFormat) -> Self {
        Self {
            size,
            format,
            depth_bits: 0,
            mip_levels: 1,
            filter: FilterMode::Point,
            storage: StorageAccess::None,
            render_target: true,
        }
    }

    /// Compute-only scratch target.
    pub fn storage(size: TextureSize, format: TargetFormat, access: StorageAccess) -> Self {
        Self {
            size,
            format,
            depth_bits: 0,
            mip_levels: 1,
            filter: FilterMode::Point,
            storage: access,
            render_target: false,
        }
    }

    pub fn with_filter(mut self, filter: FilterMode) -> Self {
        self.filter = filter;
        self
    }

    /// Approximate GPU memory of the colour chain, used for pool statistics.
    pub fn byte_size(&self) -> u64 {
        let mut total = 0u64;
        let mut size = self.size;
        for _ in 0..self.mip_levels {
            total += size.texel_count() * self.format.bytes_per_texel() as u64;
            size = size.mip_halved();
        }
        total
    }
}

/// Allocation policy of a frame target relative to the camera resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetSpec {
    pub down_sample_x: u32,
    pub down_sample_y: u32,
    pub format: TargetFormat,
    pub depth_bits: u8,
    pub mip_levels: MipLevels,
    pub filter: FilterMode,
    pub storage: StorageAccess,
    pub render_target: bool,
    pub lifetime: Lifetime,
}

impl TargetSpec {
    pub const fn full(format: TargetFormat) -> Self {
        Self {
            down_sample_x: 1,
            down_sample_y: 1,
            format,
            depth_bits: 0,
            mip_levels: MipLevels::One,
            filter: FilterMode::Point,
            storage: StorageAccess::None,
            render_target: true,
            lifetime: Lifetime::Frame,
        }
    }

    pub const fn down_sampled(mut self, factor: u32) -> Self {
        self.down_sample_x = factor;
        self.down_sample_y = factor;
        self
    }

    pub const fn with_depth(mut self, bits: u8) -> Self {
        self.depth_bits = bits;
        self
    }

    pub const fn with_mips(mut self, mips: MipLevels) -> Self {
        self.mip_levels = mips;
        self
    }

    pub const fn persistent(mut self) -> Self {
        self.lifetime = Lifetime::Persistent;
        self
    }

    pub fn describe(&self, base: TextureSize) -> TargetDesc {
        let size = base.downsampled(self.down_sample_x, self.down_sample_y);
        let mip_levels = match self.mip_levels {
            MipLevels::One => 1,
            MipLevels::Chain(max) => size.full_mip_count().min(max.max(1)),
        };
        TargetDesc {
            size,
            format: self.format,
            depth_bits: self.depth_bits,
            mip_levels,
            filter: self.filter,
            storage: self.storage,
            render_target: self.render_target,
        }
    }
}

/// Spec of each frame target for a downsample factor.
pub fn frame_target_spec(key: TargetKey, down_sample: u32) -> Option<TargetSpec> {
    let spec = match key {
        TargetKey::Source => TargetSpec::full(TargetFormat::Rgba16Float),
        TargetKey::HiZ => {
            TargetSpec::full(TargetFormat::R32Float).with_mips(MipLevels::Chain(MAX_HIZ_LEVELS))
        }
        TargetKey::HitData => TargetSpec::full(TargetFormat::Rgba32Float).with_depth(24),
        TargetKey::HitMask => TargetSpec::full(TargetFormat::R32Float),
        TargetKey::Resolved => {
            TargetSpec::full(TargetFormat::Rgba16Float).down_sampled(down_sample)
        }
        TargetKey::TaaCurrent => TargetSpec::full(TargetFormat::Rgba16Float),
        TargetKey::TaaHistory => TargetSpec::full(TargetFormat::Rgba16Float).persistent(),
        TargetKey::Combine => TargetSpec::full(TargetFormat::Rgba16Float),
        _ => return None,
    };
    Some(spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downsampled_resolved() {
        let base = TextureSize::new(1920, 1080);
        let resolved = frame_target_spec(TargetKey::Resolved, 2).unwrap().describe(base);
        assert_eq!(resolved.size, TextureSize::new(960, 540));
        let taa = frame_target_spec(TargetKey::TaaCurrent, 2).unwrap().describe(base);
        assert_eq!(taa.size, base);
        let combine = frame_target_spec(TargetKey::Combine, 2).unwrap().describe(base);
        assert_eq!(combine.size, base);
    }

    #[test]
    fn test_hiz_mip_chain_is_capped() {
        let spec = frame_target_spec(TargetKey::HiZ, 1).unwrap();
        assert_eq!(spec.describe(TextureSize::new(1920, 1080)).mip_levels, 7);
        assert_eq!(spec.describe(TextureSize::new(16, 8)).mip_levels, 5);
        assert_eq!(spec.describe(TextureSize::new(1, 1)).mip_levels, 1);
    }

    #[test]
    fn test_frame_specs() {
        for key in TargetKey::FRAME_TARGETS {
            assert!(frame_target_spec(key, 1).is_some(), "{key:?}");
            assert!(!key.is_stage_transient());
        }
        assert!(frame_target_spec(TargetKey::BlurOutput, 1).is_none());
        assert_eq!(
            frame_target_spec(TargetKey::TaaHistory, 1).unwrap().lifetime,
            Lifetime::Persistent
        );
        assert_eq!(frame_target_spec(TargetKey::HitData, 1).unwrap().depth_bits, 24);
    }

    #[test]
    fn test_byte_size_counts_mips() {
        let desc = TargetDesc {
            mip_levels: 2,
            ..TargetDesc::color(TextureSize::new(4, 4), TargetFormat::R32Float)
        };
        assert_eq!(desc.byte_size(), (16 + 4) * 4);
    }
}
