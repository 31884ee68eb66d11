// site.rs — The relaxing point set and its initial placement.
//
// `Site` is the only state carried from one iteration to the next. The
// record layout is shared verbatim with the GPU: it is the per-instance
// vertex input of the cone and preview passes, and an
// `array<Site>` storage binding in feedback.wgsl.
//
//   offset 0: x     (f32)  ┐ position in [0,1]², origin bottom-left
//   offset 4: y     (f32)  ┘
//   offset 8: mass  (f32)  average weight of the cell, sizes the stipple
//   offset 12: _pad (f32)  keeps the stride at 16 bytes (WGSL array rule)
//
// SEEDING
// ────────
// Uniform seeding scatters sites evenly, so dark regions start
// under-populated and need many iterations to fill. Weighted seeding draws
// a uniform point and accepts it with probability equal to the local
// weight, so the initial density already follows the image. Rejection
// sampling stalls on nearly blank images; after a bounded number of
// attempts the remaining sites fall back to uniform placement. A blank
// image (total weight 0) skips sampling and is placed uniformly at once.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::Seeding;
use crate::weight::WeightField;

/// Attempts per site before weighted seeding gives up on that site.
const MAX_REJECTIONS_PER_SITE: u32 = 1000;

/// One stipple / Voronoi generator.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Site {
    pub x: f32,
    pub y: f32,
    pub mass: f32,
    pub _pad: f32,
}

impl Site {
    pub fn new(x: f32, y: f32) -> Self {
        Site { x, y, mass: 0.0, _pad: 0.0 }
    }

    pub fn with_mass(x: f32, y: f32, mass: f32) -> Self {
        Site { x, y, mass, _pad: 0.0 }
    }

    /// True if position and mass are all finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.mass.is_finite()
    }
}

/// Draw `count` initial sites.
pub fn seed_sites(count: u32, weights: &WeightField, seeding: Seeding, seed: u64) -> Vec<Site> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    match seeding {
        Seeding::Uniform => seed_uniform(count, &mut rng),
        Seeding::Weighted => seed_weighted(count, weights, &mut rng),
    }
}

fn seed_uniform<R: Rng>(count: u32, rng: &mut R) -> Vec<Site> {
    (0..count)
        .map(|_| Site::new(rng.gen::<f32>(), rng.gen::<f32>()))
        .collect()
}

fn seed_weighted<R: Rng>(count: u32, weights: &WeightField, rng: &mut R) -> Vec<Site> {
    if weights.total() <= 0.0 {
        log::warn!("weighted seeding: image is blank, placing {count} sites uniformly");
        return seed_uniform(count, rng);
    }

    let w = weights.width();
    let h = weights.height();
    let mut sites = Vec::with_capacity(count as usize);
    let mut fallbacks = 0u32;

    for _ in 0..count {
        let mut placed = None;
        for _ in 0..MAX_REJECTIONS_PER_SITE {
            let x: f32 = rng.gen();
            let y: f32 = rng.gen();
            // y is bottom-up; weight rows are top-down.
            let col = ((x * w as f32) as usize).min(w - 1);
            let row = ((y * h as f32) as usize).min(h - 1);
            if rng.gen::<f32>() < weights.get(col, h - 1 - row) {
                placed = Some(Site::new(x, y));
                break;
            }
        }
        let site = placed.unwrap_or_else(|| {
            fallbacks += 1;
            Site::new(rng.gen(), rng.gen())
        });
        sites.push(site);
    }

    if fallbacks > 0 {
        log::warn!("weighted seeding: {fallbacks} of {count} sites placed uniformly (image nearly blank)");
    }
    sites
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_layout_is_16_bytes() {
        assert_eq!(std::mem::size_of::<Site>(), 16);
        let s = Site::with_mass(0.25, 0.5, 1.0);
        let bytes: &[u8] = bytemuck::bytes_of(&s);
        assert_eq!(&bytes[0..4], &0.25f32.to_ne_bytes());
        assert_eq!(&bytes[8..12], &1.0f32.to_ne_bytes());
    }

    #[test]
    fn test_seeding_is_reproducible() {
        let wf = WeightField::uniform(32, 32, 1.0);
        let a = seed_sites(50, &wf, Seeding::Weighted, 42);
        let b = seed_sites(50, &wf, Seeding::Weighted, 42);
        assert_eq!(a, b);
        let c = seed_sites(50, &wf, Seeding::Weighted, 43);
        assert_ne!(a, c);
    }

    #[test]
    fn test_seeds_in_unit_square() {
        let wf = WeightField::uniform(8, 8, 1.0);
        for seeding in [Seeding::Uniform, Seeding::Weighted] {
            let sites = seed_sites(200, &wf, seeding, 7);
            assert_eq!(sites.len(), 200);
            assert!(sites.iter().all(|s| (0.0..1.0).contains(&s.x) && (0.0..1.0).contains(&s.y)));
            assert!(sites.iter().all(|s| s.mass == 0.0));
        }
    }

    #[test]
    fn test_weighted_seeding_avoids_white() {
        // Left half black (weight 1), right half white (weight 0).
        let mut weights = vec![0.0f32; 64 * 64];
        for y in 0..64 {
            for x in 0..32 {
                weights[y * 64 + x] = 1.0;
            }
        }
        let wf = WeightField::from_weights(64, 64, weights);
        let sites = seed_sites(300, &wf, Seeding::Weighted, 1);
        assert!(sites.iter().all(|s| s.x < 0.5), "a site landed on zero weight");
    }

    #[test]
    fn test_weighted_seeding_falls_back_on_blank_image() {
        let wf = WeightField::uniform(16, 16, 0.0);
        let sites = seed_sites(10, &wf, Seeding::Weighted, 3);
        assert_eq!(sites.len(), 10);
        assert_eq!(sites, seed_sites(10, &wf, Seeding::Uniform, 3));
    }
}
