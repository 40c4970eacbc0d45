//! Pixel grid to ASCII art.

use crate::traits::PixelGrid;

/// Darkest to brightest.
pub const ASCII_RAMP: &[char] = &[' ', '.', ':', '-', '=', '+', '*', '#', '%', '@'];

/// Map one RGB pixel to a ramp character by its mean luminance.
pub fn luminance_char([r, g, b]: [u8; 3]) -> char {
    let lum = (u32::from(r) + u32::from(g) + u32::from(b)) as f64 / 3.0;
    let index = (lum / 255.0 * (ASCII_RAMP.len() - 1) as f64).floor() as usize;
    ASCII_RAMP[index.min(ASCII_RAMP.len() - 1)]
}

/// Render a grid as text, one line per pixel row, each ending in `\n`.
pub fn grid_to_ascii(grid: &PixelGrid) -> String {
    let mut out = String::with_capacity((grid.width() as usize + 1) * grid.height() as usize);
    for y in 0..grid.height() {
        for x in 0..grid.width() {
            out.push(luminance_char(grid.pixel_at(x, y)));
        }
        out.push('\n');
    }
    out
}
