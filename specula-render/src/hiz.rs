//! Hi-Z (max depth) chain planning and a CPU reference of the reduction.
//!
//! Level 0 is the full-resolution depth copy. Level i is the max over the 2x2
//! block of level i-1, each dimension halved with floor and clamped to one.

use specula_gpu_shared::uniforms::HiZParams;

use crate::targets::MAX_HIZ_LEVELS;
use crate::texture_size::TextureSize;

/// Levels built for a base resolution, never more than [`MAX_HIZ_LEVELS`].
pub fn level_count(base: TextureSize) -> u32 {
    base.full_mip_count().min(MAX_HIZ_LEVELS)
}

pub fn level_size(base: TextureSize, level: u32) -> TextureSize {
    TextureSize::new((base.width >> level).max(1), (base.height >> level).max(1))
}

/// One `GetHiZ` dispatch: reads level `index - 1`, writes level `index`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HiZLevel {
    pub index: u32,
    pub source_size: TextureSize,
    pub size: TextureSize,
}

impl HiZLevel {
    /// `(1/src_w, 1/src_h, 1/dst_w, 1/dst_h)`.
    pub fn params(&self) -> HiZParams {
        let src = self.source_size.params();
        let dst = self.size.params();
        HiZParams {
            tex_size: [src.z, src.w, dst.z, dst.w],
        }
    }
}

/// Reduction levels 1.. for a base resolution.
pub fn plan_levels(base: TextureSize) -> Vec<HiZLevel> {
    (1..level_count(base))
        .map(|index| HiZLevel {
            index,
            source_size: level_size(base, index - 1),
            size: level_size(base, index),
        })
        .collect()
}

/// Row-major single-channel depth image.
#[derive(Clone, Debug, PartialEq)]
pub struct DepthImage {
    pub size: TextureSize,
    pub texels: Vec<f32>,
}

impl DepthImage {
    /// `None` unless `texels` holds exactly one value per texel.
    pub fn new(size: TextureSize, texels: Vec<f32>) -> Option<Self> {
        (texels.len() as u64 == size.texel_count()).then_some(Self { size, texels })
    }

    pub fn from_fn(size: TextureSize, f: impl Fn(u32, u32) -> f32) -> Self {
        let mut texels = Vec::with_capacity(size.texel_count() as usize);
        for y in 0..size.height {
            for x in 0..size.width {
                texels.push(f(x, y));
            }
        }
        Self { size, texels }
    }

    /// Clamped fetch. An empty image reads as the far plane.
    pub fn get(&self, x: u32, y: u32) -> f32 {
        let x = x.min(self.size.width.saturating_sub(1));
        let y = y.min(self.size.height.saturating_sub(1));
        self.texels
            .get((y * self.size.width + x) as usize)
            .copied()
            .unwrap_or(1.0)
    }
}

/// Max over each 2x2 block; out-of-range taps clamp to the last row/column.
pub fn reduce_max(src: &DepthImage) -> DepthImage {
    let size = src.size.mip_halved();
    DepthImage::from_fn(size, |x, y| {
        let (x0, y0) = (2 * x, 2 * y);
        src.get(x0, y0)
            .max(src.get(x0 + 1, y0))
            .max(src.get(x0, y0 + 1))
            .max(src.get(x0 + 1, y0 + 1))
    })
}

/// Whole chain starting from level 0.
pub fn build_chain(level0: DepthImage) -> Vec<DepthImage> {
    let count = level_count(level0.size) as usize;
    let mut chain = Vec::with_capacity(count);
    chain.push(level0);
    while chain.len() < count {
        let next = reduce_max(&chain[chain.len() - 1]);
        chain.push(next);
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduce_two_planes() {
        // top half at 1.0, bottom half at 5.0
        let src =
            DepthImage::from_fn(TextureSize::new(4, 4), |_, y| if y < 2 { 1.0 } else { 5.0 });
        let mip1 = reduce_max(&src);
        assert_eq!(mip1.size, TextureSize::new(2, 2));
        assert_eq!(mip1.texels, vec![1.0, 1.0, 5.0, 5.0]);
    }

    #[test]
    fn test_new_rejects_mismatched_texels() {
        let size = TextureSize::new(3, 2);
        assert!(DepthImage::new(size, vec![0.5; 5]).is_none());
        assert!(DepthImage::new(size, vec![0.5; 7]).is_none());
        let image = DepthImage::new(size, vec![0.5; 6]).unwrap();
        assert_eq!(image.get(9, 9), 0.5);
    }

    #[test]
    fn test_each_level_is_block_max() {
        let base = TextureSize::new(37, 23);
        let level0 =
            DepthImage::from_fn(base, |x, y| ((x * 7919 + y * 104_729) % 1000) as f32 / 1000.0);
        let chain = build_chain(level0);
        assert_eq!(chain.len(), level_count(base) as usize);
        for pair in chain.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            for y in 0..next.size.height {
                for x in 0..next.size.width {
                    let expected = [(0, 0), (1, 0), (0, 1), (1, 1)]
                        .iter()
                        .map(|(dx, dy)| prev.get(2 * x + dx, 2 * y + dy))
                        .fold(f32::MIN, f32::max);
                    assert_eq!(next.get(x, y), expected);
                    assert!(next.get(x, y) >= prev.get(2 * x, 2 * y));
                }
            }
        }
    }

    #[test]
    fn test_chain_length_capped() {
        assert_eq!(level_count(TextureSize::new(1920, 1080)), 7);
        assert_eq!(level_count(TextureSize::new(8, 8)), 4);
        assert_eq!(level_count(TextureSize::new(1, 1)), 1);
        assert!(plan_levels(TextureSize::new(1, 1)).is_empty());
    }

    #[test]
    fn test_level_sizes_and_params() {
        let base = TextureSize::new(1920, 1080);
        let levels = plan_levels(base);
        assert_eq!(levels.len(), 6);
        assert_eq!(levels[0].size, TextureSize::new(960, 540));
        assert_eq!(levels[5].size, TextureSize::new(30, 16));
        let p = levels[0].params().tex_size;
        assert_eq!(p[0], 1.0 / 1920.0);
        assert_eq!(p[3], 1.0 / 540.0);
    }
}
