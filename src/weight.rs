// weight.rs — Per-pixel density derived from the source image.
//
// Dark pixels should attract stipples, so the weight is the inverted,
// normalized intensity, optionally lifted by a floor:
//
//   w = floor + (1 − floor) · (1 − v / 255)
//
// With the default floor of 0, a pure white region has zero weight and any
// site stranded there keeps its position with mass 0 (see lloyd::feedback).
//
// The field is computed once on the CPU and uploaded once; every iteration
// reads the same data. Derivation is a pure per-pixel map, so deriving twice
// from the same image yields bit-identical output.

use crate::image::Image;

/// Scalar weight per pixel in [0, 1], top-down rows.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightField {
    image: Image<f32>,
}

impl WeightField {
    /// Derive the weight field from a decoded grayscale image.
    pub fn from_image(src: &Image<u8>, floor: f32) -> Self {
        let floor = floor.clamp(0.0, 1.0);
        let data = src
            .as_slice()
            .iter()
            .map(|&v| floor + (1.0 - floor) * (1.0 - v as f32 / 255.0))
            .collect();
        WeightField { image: Image::from_vec(src.width(), src.height(), data) }
    }

    /// Constant weight everywhere. Used by tests and benchmarks.
    pub fn uniform(width: usize, height: usize, weight: f32) -> Self {
        WeightField { image: Image::filled(width, height, weight.clamp(0.0, 1.0)) }
    }

    /// Wrap precomputed weights. Values are clamped into [0, 1].
    pub fn from_weights(width: usize, height: usize, mut weights: Vec<f32>) -> Self {
        for w in &mut weights {
            *w = w.clamp(0.0, 1.0);
        }
        WeightField { image: Image::from_vec(width, height, weights) }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.image.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.image.height()
    }

    /// Weight at column `x`, top-down row `y`.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.image.get(x, y)
    }

    /// Row-major weights, top row first.
    pub fn as_slice(&self) -> &[f32] {
        self.image.as_slice()
    }

    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        self.as_slice().iter().map(|&w| w as f64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_black_is_heavy_white_is_empty() {
        let img = Image::from_vec(2, 1, vec![0u8, 255]);
        let wf = WeightField::from_image(&img, 0.0);
        assert_eq!(wf.get(0, 0), 1.0);
        assert_eq!(wf.get(1, 0), 0.0);
    }

    #[test]
    fn test_floor_lifts_white() {
        let img = Image::from_vec(2, 1, vec![0u8, 255]);
        let wf = WeightField::from_image(&img, 0.01);
        assert!((wf.get(1, 0) - 0.01).abs() < 1e-7);
        assert!((wf.get(0, 0) - 1.0).abs() < 1e-7);
    }

    #[test]
    fn test_weights_in_unit_interval() {
        let img = Image::from_vec(16, 16, (0..=255u8).collect());
        let wf = WeightField::from_image(&img, 0.0);
        assert!(wf.as_slice().iter().all(|w| (0.0..=1.0).contains(w)));
    }

    #[test]
    fn test_uniform_total() {
        let wf = WeightField::uniform(10, 5, 0.5);
        assert!((wf.total() - 25.0).abs() < 1e-9);
    }
}
