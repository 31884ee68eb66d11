// preview.rs — Live preview composition shared by the CPU and GPU backends.
//
// The preview shows the current Voronoi cells in light pastel tints with a
// black disc on every site:
//
//   cell colour  = 0.9 + 0.1 · hash(id)   per channel
//   disc radius  = baseRadius · min(W, H) · (0.2 + 0.8 · mass)  pixels
//
// The 0.2 floor keeps sites with tiny mass visible while relaxing. The hash
// is a 32-bit integer mix (PCG output permutation), reproduced bit-for-bit
// in preview.wgsl, so both backends tint the same cell the same way.
//
// Output pixels are packed `0x00RRGGBB`, the format `minifb` presents.

use crate::config::Config;
use crate::image::Image;
use crate::site::Site;

/// Minimum marker size as a fraction of the full stipple radius.
pub const MARKER_MASS_FLOOR: f32 = 0.2;

/// Integer hash of a site id. Mirrors `hash_id` in preview.wgsl.
#[inline]
pub fn hash_id(id: u32) -> u32 {
    let state = id.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

/// Pastel RGB tint for a cell.
pub fn cell_color(id: u32) -> [u8; 3] {
    let h = hash_id(id);
    let tint = |byte: u32| -> u8 {
        let c = byte as f32 / 255.0;
        (255.0 * (0.9 + 0.1 * c)).round() as u8
    };
    [tint(h & 0xFF), tint((h >> 8) & 0xFF), tint((h >> 16) & 0xFF)]
}

/// Pack RGB into a `0x00RRGGBB` word.
#[inline]
pub fn pack_rgb(rgb: [u8; 3]) -> u32 {
    (rgb[0] as u32) << 16 | (rgb[1] as u32) << 8 | rgb[2] as u32
}

/// Marker radius in pixels for a site of the given mass.
#[inline]
pub fn marker_radius(config: &Config, mass: f32) -> f32 {
    config.base_radius
        * config.width.min(config.height) as f32
        * (MARKER_MASS_FLOOR + (1.0 - MARKER_MASS_FLOOR) * mass)
}

/// Compose a preview frame on the CPU.
pub fn render(config: &Config, assignment: &Image<u32>, sites: &[Site], out: &mut Vec<u32>) {
    let w = assignment.width();
    let h = assignment.height();
    out.clear();
    out.extend(assignment.as_slice().iter().map(|&id| pack_rgb(cell_color(id))));

    for site in sites {
        let r = marker_radius(config, site.mass);
        // Marker centre in top-down pixel coordinates.
        let cx = site.x * w as f32;
        let cy = (1.0 - site.y) * h as f32;
        let x0 = (cx - r).floor().max(0.0) as usize;
        let x1 = ((cx + r).ceil().max(0.0) as usize).min(w);
        let y0 = (cy - r).floor().max(0.0) as usize;
        let y1 = ((cy + r).ceil().max(0.0) as usize).min(h);
        for y in y0..y1 {
            for x in x0..x1 {
                let dx = x as f32 + 0.5 - cx;
                let dy = y as f32 + 0.5 - cy;
                if dx * dx + dy * dy <= r * r {
                    out[y * w + x] = 0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_color_is_pastel() {
        for id in [0u32, 1, 2, 1000, 65534] {
            let rgb = cell_color(id);
            assert!(rgb.iter().all(|&c| c >= 229), "id {id} gave {rgb:?}");
        }
    }

    #[test]
    fn test_neighbouring_ids_differ() {
        assert_ne!(hash_id(0), hash_id(1));
        assert_ne!(cell_color(10), cell_color(11));
    }

    #[test]
    fn test_render_draws_marker() {
        let cfg = Config::new(20, 20, 1).unwrap().with_base_radius(0.1).unwrap();
        let assignment = Image::filled(20, 20, 0u32);
        let sites = [Site::with_mass(0.5, 0.5, 1.0)];
        let mut out = Vec::new();
        render(&cfg, &assignment, &sites, &mut out);
        assert_eq!(out.len(), 400);
        // Radius 2 px around (10, 10).
        assert_eq!(out[10 * 20 + 10], 0);
        assert_ne!(out[0], 0);
    }
}
