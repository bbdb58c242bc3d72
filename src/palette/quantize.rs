//! NeuQuant color reduction.

use color_quant::NeuQuant;

use super::{ColorFormat, Palette};

/// NeuQuant accepts sampling factors in this range; 1 reads every pixel.
pub const MIN_QUALITY: u32 = 1;
pub const MAX_QUALITY: u32 = 30;

/// Reduce RGBA `pixels` to at most `budget` colors.
///
/// `quality` is NeuQuant's sampling factor: lower reads more pixels and
/// gives a better palette. Fully transparent pixels are not learned from,
/// and each network color is snapped to `format` so the palette only holds
/// values the format can express.
pub fn quantize(pixels: &[u8], budget: usize, format: ColorFormat, quality: u32) -> Palette {
    let budget = budget.clamp(1, format.max_colors());
    let opaque: Vec<u8> = pixels
        .chunks_exact(4)
        .filter(|px| px[3] != 0)
        .flatten()
        .copied()
        .collect();
    if opaque.is_empty() {
        return Palette::default();
    }

    let samplefac = quality.clamp(MIN_QUALITY, MAX_QUALITY) as i32;
    let quant = NeuQuant::new(samplefac, budget, &opaque);
    Palette::from_colors(
        quant
            .color_map_rgb()
            .chunks_exact(3)
            .map(|c| format.snap([c[0], c[1], c[2]])),
    )
}
