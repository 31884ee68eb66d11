// lloyd.rs — CPU reference implementation of one weighted Lloyd step.
//
// This module mirrors the three GPU stages one-to-one, with identical data
// layout, so every kernel in `gpu/` can be validated against it:
//
//   assign()   ↔ gpu::cone::ConeRasterizer      (W×H id raster)
//   reduce()   ↔ gpu::reduce::WeightedReducer   (N×H accumulator)
//   feedback() ↔ gpu::feedback::CentroidFeedback (in-place site update)
//
// The CPU version uses an exact brute-force nearest-site search instead of
// cones, so it is O(W·H·N) per iteration. It is the authority for
// correctness, not a production path.
//
// COORDINATES
// ────────────
// Rasters are stored top-down. Texture row `t` is bottom-up row
// `row = H − 1 − t`. The geometric centre of pixel (c, t) in site space is
// ((c + 0.5) / W, (row + 0.5) / H); that is what the cones measure
// distance from. The reduction uses the configured `Normalization` to map
// (c, row) to centroid coordinates.
//
// ACCUMULATOR LAYOUT
// ───────────────────
// N columns (one per site) × H rows (one per texture row), row-major, each
// texel (Σx·w, Σy·w, count, Σw). This is exactly the readback layout of the
// `Rgba32Float` target written by reduce.wgsl.

use std::convert::Infallible;

use crate::config::{Config, Normalization};
use crate::image::Image;
use crate::site::Site;
use crate::stipple::RelaxationBackend;
use crate::weight::WeightField;

/// Per-(site, row) partial sums.
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulator {
    sites: usize,
    rows: usize,
    texels: Vec<[f32; 4]>,
}

impl Accumulator {
    /// All-zero accumulator.
    pub fn new(sites: usize, rows: usize) -> Self {
        Accumulator { sites, rows, texels: vec![[0.0; 4]; sites * rows] }
    }

    /// Wrap texels read back from the GPU (row-major, `sites` per row).
    ///
    /// # Panics
    /// Panics if `texels.len() != sites * rows`.
    pub fn from_texels(sites: usize, rows: usize, texels: Vec<[f32; 4]>) -> Self {
        assert_eq!(texels.len(), sites * rows, "accumulator size mismatch");
        Accumulator { sites, rows, texels }
    }

    #[inline]
    pub fn sites(&self) -> usize {
        self.sites
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Texel for `site` in texture row `row`.
    #[inline]
    pub fn get(&self, site: usize, row: usize) -> [f32; 4] {
        self.texels[row * self.sites + site]
    }

    #[inline]
    fn get_mut(&mut self, site: usize, row: usize) -> &mut [f32; 4] {
        &mut self.texels[row * self.sites + site]
    }

    /// Sum over all rows of one site's column, in row order.
    pub fn column_sum(&self, site: usize) -> [f32; 4] {
        let mut sum = [0.0f32; 4];
        for row in 0..self.rows {
            let t = self.get(site, row);
            for c in 0..4 {
                sum[c] += t[c];
            }
        }
        sum
    }
}

// ---------------------------------------------------------------------------
// Stage 1: nearest-site assignment
// ---------------------------------------------------------------------------

/// Label every pixel with the index of its nearest site (pixel-space
/// Euclidean distance, ties to the lower index).
///
/// # Panics
/// Panics if `sites` is empty.
pub fn assign(sites: &[Site], width: usize, height: usize) -> Image<u32> {
    assert!(!sites.is_empty(), "cannot assign pixels without sites");
    let mut out = Image::new(width, height);
    let (w, h) = (width as f32, height as f32);

    for t in 0..height {
        let row = height - 1 - t;
        let py = (row as f32 + 0.5) / h;
        for c in 0..width {
            let px = (c as f32 + 0.5) / w;
            let mut best = 0u32;
            let mut best_d = f32::INFINITY;
            for (i, s) in sites.iter().enumerate() {
                let dx = (px - s.x) * w;
                let dy = (py - s.y) * h;
                let d = dx * dx + dy * dy;
                if d < best_d {
                    best_d = d;
                    best = i as u32;
                }
            }
            out.set(c, t, best);
        }
    }
    out
}

/// Number of pixels owned by each site.
///
/// # Panics
/// Panics if the raster contains an id `>= site_count`.
pub fn ownership_counts(assignment: &Image<u32>, site_count: usize) -> Vec<u64> {
    let mut counts = vec![0u64; site_count];
    for &id in assignment.as_slice() {
        assert!((id as usize) < site_count, "raster holds id {id} but only {site_count} sites exist");
        counts[id as usize] += 1;
    }
    counts
}

// ---------------------------------------------------------------------------
// Stage 2: per-(site, row) weighted reduction
// ---------------------------------------------------------------------------

/// Build the N×H accumulator from an assignment raster and the weights.
///
/// Ids outside `0..site_count` contribute nothing, matching the GPU
/// kernel, which only ever compares against its own output column.
pub fn reduce(
    assignment: &Image<u32>,
    weights: &WeightField,
    site_count: usize,
    normalization: Normalization,
) -> Accumulator {
    let width = assignment.width();
    let height = assignment.height();
    assert_eq!(
        (width, height),
        (weights.width(), weights.height()),
        "assignment and weight field sizes differ"
    );

    let (x_off, x_scale) = normalization.offset_and_scale(width as u32);
    let (y_off, y_scale) = normalization.offset_and_scale(height as u32);
    let mut acc = Accumulator::new(site_count, height);

    for t in 0..height {
        let y = ((height - 1 - t) as f32 + y_off) * y_scale;
        let ids = assignment.row(t);
        for (c, &id) in ids.iter().enumerate() {
            let id = id as usize;
            if id >= site_count {
                continue;
            }
            let w = weights.get(c, t);
            let x = (c as f32 + x_off) * x_scale;
            let texel = acc.get_mut(id, t);
            texel[0] += x * w;
            texel[1] += y * w;
            texel[2] += 1.0;
            texel[3] += w;
        }
    }
    acc
}

// ---------------------------------------------------------------------------
// Stage 3: centroid feedback
// ---------------------------------------------------------------------------

/// Overwrite every site with its cell's weighted centroid and mass.
///
/// A cell with zero total weight keeps its previous position and gets
/// mass 0; no division happens on that path.
pub fn feedback(acc: &Accumulator, sites: &mut [Site]) {
    assert_eq!(acc.sites(), sites.len(), "accumulator/site count mismatch");
    for (i, site) in sites.iter_mut().enumerate() {
        let [sx, sy, count, sw] = acc.column_sum(i);
        if sw > 0.0 {
            site.x = sx / sw;
            site.y = sy / sw;
            site.mass = sw / count;
        } else {
            site.mass = 0.0;
        }
    }
}

/// One full relaxation step. Returns the assignment raster it used.
pub fn step(sites: &mut [Site], weights: &WeightField, normalization: Normalization) -> Image<u32> {
    let assignment = assign(sites, weights.width(), weights.height());
    let acc = reduce(&assignment, weights, sites.len(), normalization);
    feedback(&acc, sites);
    assignment
}

// ---------------------------------------------------------------------------
// CpuPipeline
// ---------------------------------------------------------------------------

/// The CPU reference packaged as a relaxation backend.
pub struct CpuPipeline {
    config: Config,
    weights: WeightField,
    sites: Vec<Site>,
    assignment: Option<Image<u32>>,
}

impl CpuPipeline {
    pub fn new(config: &Config, weights: WeightField, sites: Vec<Site>) -> Self {
        assert_eq!(sites.len(), config.samples as usize, "site count mismatch");
        CpuPipeline { config: config.clone(), weights, sites, assignment: None }
    }

    /// Current sites (no copy).
    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub fn step(&mut self) {
        let assignment = step(&mut self.sites, &self.weights, self.config.normalization);
        self.assignment = Some(assignment);
    }

    /// Render the preview frame (see preview.rs) into `out`.
    pub fn render_preview(&mut self, out: &mut Vec<u32>) {
        if self.assignment.is_none() {
            self.assignment = Some(assign(&self.sites, self.weights.width(), self.weights.height()));
        }
        if let Some(assignment) = &self.assignment {
            crate::preview::render(&self.config, assignment, &self.sites, out);
        }
    }
}

impl RelaxationBackend for CpuPipeline {
    type Error = Infallible;

    fn size(&self) -> (usize, usize) {
        (self.weights.width(), self.weights.height())
    }

    fn step(&mut self) -> Result<(), Infallible> {
        CpuPipeline::step(self);
        Ok(())
    }

    fn sites(&mut self) -> Result<Vec<Site>, Infallible> {
        Ok(self.sites.clone())
    }

    fn render_preview(&mut self, out: &mut Vec<u32>) -> Result<(), Infallible> {
        CpuPipeline::render_preview(self, out);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_site_owns_everything() {
        let a = assign(&[Site::new(0.1, 0.9)], 7, 5);
        assert!(a.as_slice().iter().all(|&id| id == 0));
    }

    #[test]
    fn test_two_sites_split_left_right() {
        let sites = [Site::new(0.25, 0.5), Site::new(0.75, 0.5)];
        let a = assign(&sites, 8, 4);
        for t in 0..4 {
            assert_eq!(a.row(t), &[0, 0, 0, 0, 1, 1, 1, 1]);
        }
    }

    #[test]
    fn test_bottom_site_owns_bottom_rows() {
        // Site space is bottom-up, rasters are top-down.
        let sites = [Site::new(0.5, 0.1), Site::new(0.5, 0.9)];
        let a = assign(&sites, 2, 4);
        assert_eq!(a.row(0), &[1, 1]); // top row → upper site
        assert_eq!(a.row(3), &[0, 0]); // bottom row → lower site
    }

    #[test]
    fn test_tie_goes_to_lower_index() {
        // Both sites at the same spot.
        let sites = [Site::new(0.5, 0.5), Site::new(0.5, 0.5)];
        let a = assign(&sites, 4, 4);
        assert!(a.as_slice().iter().all(|&id| id == 0));
    }

    #[test]
    fn test_reduce_uniform_single_site() {
        let wf = WeightField::uniform(4, 2, 1.0);
        let a = Image::filled(4, 2, 0u32);
        let acc = reduce(&a, &wf, 1, Normalization::Size);
        // Top texture row is bottom-up row 1 → y = 1.5 / 2.
        let top = acc.get(0, 0);
        assert!((top[0] - (0.125 + 0.375 + 0.625 + 0.875)).abs() < 1e-6);
        assert!((top[1] - 4.0 * 0.75).abs() < 1e-6);
        assert_eq!(top[2], 4.0);
        assert_eq!(top[3], 4.0);
        let bottom = acc.get(0, 1);
        assert!((bottom[1] - 4.0 * 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_reduce_empty_row_is_zero() {
        let wf = WeightField::uniform(4, 2, 1.0);
        let a = Image::filled(4, 2, 0u32);
        let acc = reduce(&a, &wf, 2, Normalization::Size);
        assert_eq!(acc.get(1, 0), [0.0; 4]);
        assert_eq!(acc.get(1, 1), [0.0; 4]);
    }

    #[test]
    fn test_feedback_uniform_centroid_is_centre() {
        let wf = WeightField::uniform(10, 10, 1.0);
        let mut sites = vec![Site::new(0.1, 0.1)];
        step(&mut sites, &wf, Normalization::Size);
        assert!((sites[0].x - 0.5).abs() < 1e-5);
        assert!((sites[0].y - 0.5).abs() < 1e-5);
        assert!((sites[0].mass - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_feedback_zero_weight_keeps_position() {
        let acc = Accumulator::new(1, 3);
        let mut sites = vec![Site::with_mass(0.3, 0.7, 0.9)];
        feedback(&acc, &mut sites);
        assert_eq!(sites[0], Site::with_mass(0.3, 0.7, 0.0));
    }

    #[test]
    fn test_mass_is_average_weight() {
        let wf = WeightField::uniform(6, 6, 0.25);
        let mut sites = vec![Site::new(0.5, 0.5)];
        step(&mut sites, &wf, Normalization::Size);
        assert!((sites[0].mass - 0.25).abs() < 1e-6);
    }
}
