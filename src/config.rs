// config.rs — Run configuration and the tunable constants of the pipeline.
//
// `Config` is built once from the decoded image size and the command-line
// options, validated, and then shared read-only by every stage (CPU and GPU).
//
// ASPECT SCALE
// ─────────────
// Sites live in the unit square regardless of the image shape. To keep cones
// (and therefore cells) round in *pixel* space, the cone is stretched along
// the shorter image axis:
//
//   w > h  →  sx = 1,    sy = w / h
//   w ≤ h  →  sx = h / w, sy = 1
//
// The longer axis always has scale 1.
//
// NORMALIZATION
// ──────────────
// Historical variants of this algorithm disagree on how a pixel coordinate
// is mapped into [0, 1] before weighting, and on whether a small weight floor
// is added so white regions still attract a few sites. Both are exposed as
// configuration instead of being baked into the shaders.

use std::fmt;
use std::path::PathBuf;

/// Largest image side and site count. Site ids are packed into three 8-bit
/// channels, which would allow 2^24 ids; the tighter cap keeps the N×H
/// accumulator and the W×H raster within what GPUs can allocate.
pub const MAX_DIMENSION: u32 = 65535;

/// Largest accepted site count.
pub const MAX_SITES: u32 = 65535;

/// Default number of sites.
pub const DEFAULT_SITES: u32 = 1000;

/// Default cone tessellation (rim segments).
pub const DEFAULT_RESOLUTION: u32 = 256;

/// Fewest rim segments for which a radius-4 cone still covers the whole
/// viewport from any apex position.
pub const MIN_RESOLUTION: u32 = 8;

/// Largest accepted cone tessellation.
pub const MAX_RESOLUTION: u32 = 4096;

/// Default stipple radius as a fraction of the shorter image side.
pub const DEFAULT_BASE_RADIUS: f32 = 0.01;

/// Default weight floor: none. `weight = floor + (1 - floor) * (1 - intensity)`.
pub const DEFAULT_WEIGHT_FLOOR: f32 = 0.0;

/// Default coordinate normalization.
pub const DEFAULT_NORMALIZATION: Normalization = Normalization::Size;

/// How a pixel index is mapped into the unit interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    /// Pixel centres: `(i + 0.5) / size`. Symmetric, never touches 0 or 1.
    Size,
    /// Integer coordinates stretched to the edges: `i / (size - 1)`.
    /// A one-pixel axis maps to 0.
    SizeMinusOne,
}

impl Normalization {
    /// `(offset, scale)` such that `coord = (i + offset) * scale`.
    ///
    /// The same pair is uploaded to the reduction shader, so the CPU
    /// reference and the GPU kernel use one definition.
    pub fn offset_and_scale(self, size: u32) -> (f32, f32) {
        match self {
            Normalization::Size => (0.5, 1.0 / size.max(1) as f32),
            Normalization::SizeMinusOne => {
                if size > 1 {
                    (0.0, 1.0 / (size - 1) as f32)
                } else {
                    (0.0, 0.0)
                }
            }
        }
    }

    #[cfg(test)]
    fn coord(self, index: u32, size: u32) -> f32 {
        let (offset, scale) = self.offset_and_scale(size);
        (index as f32 + offset) * scale
    }
}

/// How the initial site positions are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seeding {
    /// Uniform in the unit square.
    Uniform,
    /// Rejection sampling against the weight field, so the initial density
    /// roughly follows the image.
    Weighted,
}

/// Iteration mode chosen from the `-i` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Run exactly this many iterations headless, then export.
    Batch { iterations: u32 },
    /// Run until the preview window is closed.
    Interactive,
}

impl RunMode {
    /// Negative counts select interactive mode.
    pub fn from_iterations(iterations: i64) -> Self {
        if iterations < 0 {
            RunMode::Interactive
        } else {
            RunMode::Batch { iterations: iterations.min(u32::MAX as i64) as u32 }
        }
    }
}

/// Full run configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub width: u32,
    pub height: u32,
    pub samples: u32,
    pub resolution: u32,
    pub sx: f32,
    pub sy: f32,
    pub base_radius: f32,
    pub mode: RunMode,
    pub output: Option<PathBuf>,
    pub normalization: Normalization,
    pub weight_floor: f32,
    pub seeding: Seeding,
    pub seed: u64,
}

impl Config {
    /// Build a configuration with default tunables for an image of the
    /// given size.
    pub fn new(width: u32, height: u32, samples: u32) -> Result<Self, ConfigError> {
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(ConfigError::ImageSize { width, height });
        }
        if samples == 0 || samples > MAX_SITES {
            return Err(ConfigError::SampleCount(samples));
        }
        let (sx, sy) = aspect_scale(width, height);
        Ok(Config {
            width,
            height,
            samples,
            resolution: DEFAULT_RESOLUTION,
            sx,
            sy,
            base_radius: DEFAULT_BASE_RADIUS,
            mode: RunMode::Interactive,
            output: None,
            normalization: DEFAULT_NORMALIZATION,
            weight_floor: DEFAULT_WEIGHT_FLOOR,
            seeding: Seeding::Weighted,
            seed: 0,
        })
    }

    pub fn with_resolution(mut self, resolution: u32) -> Result<Self, ConfigError> {
        if !(MIN_RESOLUTION..=MAX_RESOLUTION).contains(&resolution) {
            return Err(ConfigError::Resolution(resolution));
        }
        self.resolution = resolution;
        Ok(self)
    }

    pub fn with_base_radius(mut self, base_radius: f32) -> Result<Self, ConfigError> {
        if !base_radius.is_finite() || base_radius < 0.0 {
            return Err(ConfigError::Radius(base_radius));
        }
        self.base_radius = base_radius;
        Ok(self)
    }

    pub fn with_weight_floor(mut self, floor: f32) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&floor) {
            return Err(ConfigError::WeightFloor(floor));
        }
        self.weight_floor = floor;
        Ok(self)
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_output(mut self, output: Option<PathBuf>) -> Self {
        self.output = output;
        self
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn with_seeding(mut self, seeding: Seeding, seed: u64) -> Self {
        self.seeding = seeding;
        self.seed = seed;
        self
    }

    /// Stipple radius in output pixels for a site of the given mass.
    #[inline]
    pub fn stipple_radius(&self, mass: f32) -> f32 {
        self.base_radius * self.sx.min(self.sy) * self.width.min(self.height) as f32 * mass
    }
}

/// Aspect scale `(sx, sy)` for an image of the given size.
pub fn aspect_scale(width: u32, height: u32) -> (f32, f32) {
    if width > height {
        (1.0, width as f32 / height as f32)
    } else {
        (height as f32 / width as f32, 1.0)
    }
}

// ============================================================
// Error type
// ============================================================

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Zero-sized image, or a side above `MAX_DIMENSION`.
    ImageSize { width: u32, height: u32 },
    /// Site count outside `1..=MAX_SITES`.
    SampleCount(u32),
    /// Cone resolution outside `MIN_RESOLUTION..=MAX_RESOLUTION`.
    Resolution(u32),
    /// Negative or non-finite radius.
    Radius(f32),
    /// Weight floor outside [0, 1].
    WeightFloor(f32),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ImageSize { width, height } => write!(
                f,
                "image size {width}×{height} is unsupported (each side must be 1..={MAX_DIMENSION})"
            ),
            ConfigError::SampleCount(n) => {
                write!(f, "sample count {n} is out of range (1..={MAX_SITES})")
            }
            ConfigError::Resolution(r) => write!(
                f,
                "cone resolution {r} is out of range ({MIN_RESOLUTION}..={MAX_RESOLUTION})"
            ),
            ConfigError::Radius(r) => write!(f, "radius {r} must be finite and non-negative"),
            ConfigError::WeightFloor(w) => write!(f, "weight floor {w} must lie in [0, 1]"),
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_scale_wide() {
        let (sx, sy) = aspect_scale(200, 100);
        assert_eq!(sx, 1.0);
        assert_eq!(sy, 2.0);
    }

    #[test]
    fn test_aspect_scale_tall_and_square() {
        assert_eq!(aspect_scale(100, 400), (4.0, 1.0));
        assert_eq!(aspect_scale(64, 64), (1.0, 1.0));
    }

    #[test]
    fn test_config_rejects_oversized_image() {
        let err = Config::new(70000, 10, 10).unwrap_err();
        assert!(matches!(err, ConfigError::ImageSize { width: 70000, .. }));
        assert!(Config::new(0, 10, 10).is_err());
    }

    #[test]
    fn test_config_rejects_sample_count() {
        assert_eq!(Config::new(10, 10, 0).unwrap_err(), ConfigError::SampleCount(0));
        assert_eq!(
            Config::new(10, 10, 100_000).unwrap_err(),
            ConfigError::SampleCount(100_000)
        );
        assert!(Config::new(10, 10, MAX_SITES).is_ok());
    }

    #[test]
    fn test_resolution_bounds() {
        let cfg = Config::new(10, 10, 1).unwrap();
        assert!(cfg.clone().with_resolution(4).is_err());
        assert_eq!(cfg.with_resolution(64).unwrap().resolution, 64);
    }

    #[test]
    fn test_normalization_size() {
        let (o, s) = Normalization::Size.offset_and_scale(4);
        assert_eq!(o, 0.5);
        assert_eq!(s, 0.25);
        assert_eq!(Normalization::Size.coord(0, 4), 0.125);
        assert_eq!(Normalization::Size.coord(3, 4), 0.875);
    }

    #[test]
    fn test_normalization_size_minus_one() {
        assert_eq!(Normalization::SizeMinusOne.coord(0, 5), 0.0);
        assert_eq!(Normalization::SizeMinusOne.coord(4, 5), 1.0);
        // Degenerate single-pixel axis must not divide by zero.
        assert_eq!(Normalization::SizeMinusOne.coord(0, 1), 0.0);
    }

    #[test]
    fn test_run_mode_from_iterations() {
        assert_eq!(RunMode::from_iterations(-1), RunMode::Interactive);
        assert_eq!(RunMode::from_iterations(-7), RunMode::Interactive);
        assert_eq!(RunMode::from_iterations(0), RunMode::Batch { iterations: 0 });
        assert_eq!(RunMode::from_iterations(50), RunMode::Batch { iterations: 50 });
    }

    #[test]
    fn test_stipple_radius_square() {
        let cfg = Config::new(100, 100, 1).unwrap();
        assert!((cfg.stipple_radius(1.0) - 1.0).abs() < 1e-6);
        assert_eq!(cfg.stipple_radius(0.0), 0.0);
    }
}
