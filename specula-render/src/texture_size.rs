//! Texture size descriptor used wherever a kernel needs reciprocal dimensions.

use glam::Vec4;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TextureSize {
    pub width: u32,
    pub height: u32,
}

impl TextureSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// `(w, h, 1/w, 1/h)` as the kernels expect it.
    pub fn params(&self) -> Vec4 {
        let w = self.width.max(1) as f32;
        let h = self.height.max(1) as f32;
        Vec4::new(w, h, 1.0 / w, 1.0 / h)
    }

    pub fn params_array(&self) -> [f32; 4] {
        self.params().to_array()
    }

    /// Integer division per axis, never below one texel.
    pub fn downsampled(&self, factor_x: u32, factor_y: u32) -> Self {
        Self {
            width: (self.width / factor_x.max(1)).max(1),
            height: (self.height / factor_y.max(1)).max(1),
        }
    }

    /// Next mip size: `floor(n / 2)`, clamped to one.
    pub fn mip_halved(&self) -> Self {
        Self {
            width: (self.width / 2).max(1),
            height: (self.height / 2).max(1),
        }
    }

    /// Pyramid size for the blur: `ceil(n / 2)`.
    pub fn ceil_halved(&self) -> Self {
        Self {
            width: self.width.div_ceil(2).max(1),
            height: self.height.div_ceil(2).max(1),
        }
    }

    /// Number of mips a full chain for this size would have.
    pub fn full_mip_count(&self) -> u32 {
        let max_dim = self.width.max(self.height).max(1);
        32 - max_dim.leading_zeros()
    }

    pub fn texel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl From<(u32, u32)> for TextureSize {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for TextureSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_are_reciprocal() {
        let p = TextureSize::new(1920, 1080).params();
        assert_eq!(p.x, 1920.0);
        assert_eq!(p.y, 1080.0);
        assert!((p.z - 1.0 / 1920.0).abs() < 1e-9);
        assert!((p.w - 1.0 / 1080.0).abs() < 1e-9);
    }

    #[test]
    fn test_downsample_and_halving() {
        let s = TextureSize::new(1921, 1081);
        assert_eq!(s.downsampled(2, 2), TextureSize::new(960, 540));
        assert_eq!(s.mip_halved(), TextureSize::new(960, 540));
        assert_eq!(s.ceil_halved(), TextureSize::new(961, 541));
        assert_eq!(TextureSize::new(1, 1).mip_halved(), TextureSize::new(1, 1));
        assert_eq!(TextureSize::new(3, 7).downsampled(10, 10), TextureSize::new(1, 1));
    }

    #[test]
    fn test_full_mip_count() {
        assert_eq!(TextureSize::new(1, 1).full_mip_count(), 1);
        assert_eq!(TextureSize::new(4, 2).full_mip_count(), 3);
        assert_eq!(TextureSize::new(1920, 1080).full_mip_count(), 11);
    }
}
