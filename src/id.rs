// id.rs — Site index ↔ RGB packing used by the assignment raster.
//
// The cone pass writes the drawing instance's index into an `Rgba8Uint`
// colour target:
//
//   r = id        & 0xFF
//   g = (id >> 8)  & 0xFF
//   b = (id >> 16) & 0xFF
//   a = 255 (unused)
//
// and every later stage decodes `id = r + g·256 + b·65536`.
//
// The texture MUST be an unnormalized integer format. With `Rgba8Unorm` the
// value would pass through a float conversion, and any filtering,
// compression or sRGB conversion would silently move a pixel to a
// neighbouring id. `cone.wgsl` and `reduce.wgsl` contain the same three
// lines of arithmetic as this file.

/// Number of distinct ids representable in three 8-bit channels.
pub const ID_SPACE: u32 = 1 << 24;

/// Pack a site index into RGBA8 channels. Bits above 24 are dropped.
#[inline]
pub fn encode_id(id: u32) -> [u8; 4] {
    [
        (id & 0xFF) as u8,
        ((id >> 8) & 0xFF) as u8,
        ((id >> 16) & 0xFF) as u8,
        0xFF,
    ]
}

/// Unpack a site index from RGBA8 channels. Alpha is ignored.
#[inline]
pub fn decode_id(rgba: [u8; 4]) -> u32 {
    rgba[0] as u32 | (rgba[1] as u32) << 8 | (rgba[2] as u32) << 16
}

/// Decode a tightly packed RGBA8 raster (4 bytes per pixel) into ids.
pub fn decode_raster(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|px| decode_id([px[0], px[1], px[2], px[3]]))
        .collect()
}
