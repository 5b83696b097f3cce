//! Offline fallback image used when no provider delivers.
//!
//! Rendering is deterministic: the same dimensions always encode to the same
//! PNG bytes. If rendering itself fails the pre-baked PNG in
//! `data/placeholder.png` is returned instead, so this stage never errors.

use crate::{Error, Result};
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

/// Minimal grey PNG shipped inside the binary.
pub const EMBEDDED_PLACEHOLDER: &[u8] = include_bytes!("../data/placeholder.png");

pub const DEFAULT_SIZE: u32 = 512;
const MAX_SIZE: u32 = 4096;

const BACKGROUND: Rgb<u8> = Rgb([0xE4, 0xE2, 0xDE]);
const BORDER: Rgb<u8> = Rgb([0x9A, 0x96, 0x90]);
const INK: Rgb<u8> = Rgb([0x4A, 0x47, 0x44]);

const MESSAGE: &[&str] = &["NO EXTERNAL MODEL CONFIGURED", "OR ALL PROVIDERS FAILED"];

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;

/// 5x7 bitmap glyphs; each row uses the low five bits, MSB on the left.
fn glyph(c: char) -> [u8; 7] {
    match c {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        _ => [0x00; 7],
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PlaceholderGenerator {
    width: u32,
    height: u32,
}

impl PlaceholderGenerator {
    pub fn new() -> Self {
        Self::with_size(DEFAULT_SIZE, DEFAULT_SIZE)
    }

    pub fn with_size(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns PNG bytes; never fails.
    pub fn generate(&self) -> Vec<u8> {
        match self.render() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Placeholder rendering failed, using embedded image: {}", e);
                EMBEDDED_PLACEHOLDER.to_vec()
            }
        }
    }

    pub fn render(&self) -> Result<Vec<u8>> {
        if self.width == 0 || self.height == 0 || self.width > MAX_SIZE || self.height > MAX_SIZE
        {
            return Err(Error::Invariant(format!(
                "placeholder size {}x{} outside 1..={}",
                self.width, self.height, MAX_SIZE
            )));
        }

        let mut canvas = RgbImage::from_pixel(self.width, self.height, BACKGROUND);
        draw_border(&mut canvas, (self.width.min(self.height) / 64).max(1));
        draw_message(&mut canvas);

        let mut bytes = Vec::new();
        canvas.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }
}

impl Default for PlaceholderGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn draw_border(canvas: &mut RgbImage, thickness: u32) {
    let (width, height) = canvas.dimensions();
    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        if x < thickness || y < thickness || x >= width - thickness || y >= height - thickness {
            *pixel = BORDER;
        }
    }
}

/// Centers each message line, scaling the glyphs to fit the canvas width.
fn draw_message(canvas: &mut RgbImage) {
    let (width, height) = canvas.dimensions();
    let longest = MESSAGE.iter().map(|line| line.len()).max().unwrap_or(1) as u32;
    // Glyph cell is 6 columns wide (5 + 1 spacing); leave a 10% margin.
    let scale = (width * 9 / 10 / (longest * (GLYPH_WIDTH + 1))).max(1);
    let line_height = (GLYPH_HEIGHT + 3) * scale;
    let block_height = line_height * MESSAGE.len() as u32;
    let mut top = height.saturating_sub(block_height) / 2;

    for line in MESSAGE {
        let line_width = line.len() as u32 * (GLYPH_WIDTH + 1) * scale;
        let mut left = width.saturating_sub(line_width) / 2;
        for c in line.chars() {
            draw_glyph(canvas, glyph(c), left, top, scale);
            left += (GLYPH_WIDTH + 1) * scale;
        }
        top += line_height;
    }
}

fn draw_glyph(canvas: &mut RgbImage, rows: [u8; 7], left: u32, top: u32, scale: u32) {
    let (width, height) = canvas.dimensions();
    for (row, bits) in rows.iter().enumerate() {
        for col in 0..GLYPH_WIDTH {
            if bits & (0x10 >> col) == 0 {
                continue;
            }
            let x0 = left + col * scale;
            let y0 = top + row as u32 * scale;
            for y in y0..(y0 + scale).min(height) {
                for x in x0..(x0 + scale).min(width) {
                    canvas.put_pixel(x, y, INK);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_byte_identical() {
        let generator = PlaceholderGenerator::new();
        assert_eq!(generator.generate(), generator.generate());
    }

    #[test]
    fn test_generate_is_decodable_png_of_fixed_size() {
        let bytes = PlaceholderGenerator::new().generate();
        assert_eq!(crate::mime::detect_image_mime(&bytes), Some("image/png"));

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.width(), DEFAULT_SIZE);
        assert_eq!(decoded.height(), DEFAULT_SIZE);
    }

    #[test]
    fn test_message_is_drawn() {
        let bytes = PlaceholderGenerator::new().render().unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
        assert!(decoded.pixels().any(|p| *p == INK));
        assert_eq!(*decoded.get_pixel(0, 0), BORDER);
        assert_eq!(*decoded.get_pixel(DEFAULT_SIZE / 2, 20), BACKGROUND);
    }

    #[test]
    fn test_render_failure_falls_back_to_embedded_image() {
        let generator = PlaceholderGenerator::with_size(0, 0);
        assert!(generator.render().is_err());
        assert_eq!(generator.generate(), EMBEDDED_PLACEHOLDER);
    }

    #[test]
    fn test_embedded_image_is_valid_png() {
        let decoded = image::load_from_memory(EMBEDDED_PLACEHOLDER).unwrap();
        assert_eq!(decoded.width(), 64);
    }

    #[test]
    fn test_unknown_glyph_is_blank() {
        assert_eq!(glyph('?'), [0u8; 7]);
        assert_ne!(glyph('Q'), [0u8; 7]);
    }
}
