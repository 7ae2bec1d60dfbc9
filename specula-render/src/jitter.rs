//! Halton(2, 3) sub-pixel jitter with a period of 64 samples.

use glam::Vec2;

pub const JITTER_SAMPLE_COUNT: u32 = 64;

/// Radical inverse of `index` in base `radix`. Always in `[0, 1)`.
pub fn halton(mut index: u32, radix: u32) -> f32 {
    let mut result = 0.0f32;
    let mut fraction = 1.0 / radix as f32;

    while index > 0 {
        result += (index % radix) as f32 * fraction;
        index /= radix;
        fraction /= radix as f32;
    }

    result
}

/// Jitter sequence state. Owned by one camera pipeline; advanced exactly once
/// per executed frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HaltonJitter {
    sample_index: u32,
}

impl HaltonJitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_index(&self) -> u32 {
        self.sample_index
    }

    /// Offset for the current index, then advance the index modulo 64.
    pub fn next_offset(&mut self) -> Vec2 {
        let i = self.sample_index & 1023;
        let offset = Vec2::new(halton(i, 2), halton(i, 3));

        self.sample_index += 1;
        if self.sample_index >= JITTER_SAMPLE_COUNT {
            self.sample_index = 0;
        }

        offset
    }

    pub fn reset(&mut self) {
        self.sample_index = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halton_known_values() {
        assert_eq!(halton(0, 2), 0.0);
        assert_eq!(halton(1, 2), 0.5);
        assert_eq!(halton(2, 2), 0.25);
        assert_eq!(halton(3, 2), 0.75);
        assert!((halton(1, 3) - 1.0 / 3.0).abs() < 1e-6);
        assert!((halton(2, 3) - 2.0 / 3.0).abs() < 1e-6);
        assert!((halton(4, 3) - 4.0 / 9.0).abs() < 1e-6);
    }

    #[test]
    fn test_jitter_in_unit_square() {
        let mut jitter = HaltonJitter::new();
        for _ in 0..JITTER_SAMPLE_COUNT {
            let o = jitter.next_offset();
            assert!((0.0..1.0).contains(&o.x));
            assert!((0.0..1.0).contains(&o.y));
        }
    }

    #[test]
    fn test_jitter_period_is_64() {
        let mut jitter = HaltonJitter::new();
        let first: Vec<Vec2> = (0..JITTER_SAMPLE_COUNT).map(|_| jitter.next_offset()).collect();
        assert_eq!(jitter.sample_index(), 0);
        let second: Vec<Vec2> = (0..JITTER_SAMPLE_COUNT).map(|_| jitter.next_offset()).collect();
        assert_eq!(first, second);
        assert_eq!(first[0], Vec2::ZERO);
        assert_eq!(first[1], Vec2::new(0.5, 1.0 / 3.0));
    }
}
