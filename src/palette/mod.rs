//! Global color palette for indexed output.
//!
//! A run builds exactly one [`Palette`] and uses it for every animation frame
//! and for the thumbnail, so colors never shift between frames.
//!
//! - `quantize` reduces a rendered sample to a bounded palette (NeuQuant)
//! - `dither` maps full-color frames onto palette indices, with optional
//!   Floyd-Steinberg diffusion

pub mod dither;
pub mod quantize;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

pub use dither::map_frame;
pub use quantize::quantize;

/// Hard ceiling on palette entries for 8-bit indexed output.
pub const MAX_INDEXED_COLORS: usize = 256;

/// Per-sample color budget while dithering. Error diffusion synthesizes
/// in-between shades, so fewer entries go further.
pub const DITHERED_SAMPLE_BUDGET: usize = 128;
pub const UNDITHERED_SAMPLE_BUDGET: usize = 256;

/// Channel layout the palette is snapped to before quantization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorFormat {
    Rgb888,
    #[default]
    Rgb565,
    Rgb444,
}

impl ColorFormat {
    pub fn max_colors(self) -> usize {
        MAX_INDEXED_COLORS
    }

    /// Reduce a color to this format's channel depth, replicating the high
    /// bits into the low ones so full intensity stays at 255.
    pub fn snap(self, [r, g, b]: [u8; 3]) -> [u8; 3] {
        match self {
            ColorFormat::Rgb888 => [r, g, b],
            ColorFormat::Rgb565 => [expand(r, 5), expand(g, 6), expand(b, 5)],
            ColorFormat::Rgb444 => [expand(r, 4), expand(g, 4), expand(b, 4)],
        }
    }
}

impl std::str::FromStr for ColorFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rgb888" => Ok(ColorFormat::Rgb888),
            "rgb565" => Ok(ColorFormat::Rgb565),
            "rgb444" => Ok(ColorFormat::Rgb444),
            other => Err(format!("unknown color format '{other}'")),
        }
    }
}

fn expand(v: u8, bits: i32) -> u8 {
    let high = (v >> (8 - bits)) as u16;
    let mut out = high << (8 - bits);
    let mut shift = 8 - bits;
    while shift > 0 {
        shift -= bits;
        out |= if shift >= 0 {
            high << shift
        } else {
            high >> -shift
        };
    }
    out as u8
}

pub fn sample_budget(dither: bool) -> usize {
    if dither {
        DITHERED_SAMPLE_BUDGET
    } else {
        UNDITHERED_SAMPLE_BUDGET
    }
}

/// Ordered set of distinct RGB colors.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<[u8; 3]>,
}

impl Palette {
    /// Build a palette from colors in order, dropping exact repeats.
    pub fn from_colors(colors: impl IntoIterator<Item = [u8; 3]>) -> Self {
        let mut seen = HashSet::new();
        let colors = colors.into_iter().filter(|c| seen.insert(*c)).collect();
        Self { colors }
    }

    pub fn colors(&self) -> &[[u8; 3]] {
        &self.colors
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn contains(&self, color: &[u8; 3]) -> bool {
        self.colors.contains(color)
    }

    /// Merge two sample palettes into one.
    ///
    /// The larger palette is kept whole as the base, `front` winning ties.
    /// Colors of the other one are appended only if no identical tuple is
    /// already present, and the result is cut at `limit`.
    pub fn merge(front: Palette, back: Palette, limit: usize) -> Palette {
        let (mut base, other) = if back.len() > front.len() {
            (back, front)
        } else {
            (front, back)
        };
        let mut present: HashSet<[u8; 3]> = base.colors.iter().copied().collect();
        for color in other.colors {
            if base.colors.len() >= limit {
                break;
            }
            if present.insert(color) {
                base.colors.push(color);
            }
        }
        base.colors.truncate(limit);
        base
    }

    /// Index of the closest entry by squared RGB distance. The first entry
    /// wins on equal distance.
    pub fn nearest(&self, [r, g, b]: [i32; 3]) -> u8 {
        let mut best = 0usize;
        let mut best_dist = i32::MAX;
        for (i, c) in self.colors.iter().enumerate() {
            let dr = r - c[0] as i32;
            let dg = g - c[1] as i32;
            let db = b - c[2] as i32;
            let dist = dr * dr + dg * dg + db * db;
            if dist < best_dist {
                best_dist = dist;
                best = i;
                if dist == 0 {
                    break;
                }
            }
        }
        best as u8
    }

    /// Flat `r,g,b,r,g,b,...` bytes as a GIF color table expects them.
    pub fn to_rgb_bytes(&self) -> Vec<u8> {
        self.colors.iter().flat_map(|c| c.iter().copied()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapping_keeps_extremes() {
        for format in [ColorFormat::Rgb888, ColorFormat::Rgb565, ColorFormat::Rgb444] {
            assert_eq!(format.snap([255, 255, 255]), [255, 255, 255]);
            assert_eq!(format.snap([0, 0, 0]), [0, 0, 0]);
            assert_eq!(format.snap([255, 0, 0]), [255, 0, 0]);
        }
    }

    #[test]
    fn snapping_reduces_channel_depth() {
        assert_eq!(ColorFormat::Rgb444.snap([0x12, 0x34, 0x56]), [0x11, 0x33, 0x55]);
        assert_eq!(ColorFormat::Rgb565.snap([0x08, 0x04, 0x08]), [0x08, 0x04, 0x08]);
        assert_eq!(ColorFormat::Rgb565.snap([0x0F, 0x07, 0x0F]), [0x08, 0x04, 0x08]);
    }

    #[test]
    fn merge_keeps_larger_base_and_appends_new_colors() {
        let front = Palette::from_colors([[1, 1, 1], [2, 2, 2]]);
        let back = Palette::from_colors([[2, 2, 2], [3, 3, 3], [4, 4, 4]]);
        let merged = Palette::merge(front, back, 256);
        assert_eq!(
            merged.colors(),
            &[[2, 2, 2], [3, 3, 3], [4, 4, 4], [1, 1, 1]]
        );
    }

    #[test]
    fn merge_prefers_front_on_ties() {
        let front = Palette::from_colors([[9, 9, 9], [8, 8, 8]]);
        let back = Palette::from_colors([[1, 1, 1], [8, 8, 8]]);
        let merged = Palette::merge(front, back, 256);
        assert_eq!(merged.colors(), &[[9, 9, 9], [8, 8, 8], [1, 1, 1]]);
    }

    #[test]
    fn merge_never_exceeds_limit_nor_shrinks_base() {
        let front = Palette::from_colors((0..200u8).map(|i| [i, 0, 0]));
        let back = Palette::from_colors((0..200u8).map(|i| [0, i, 1]));
        let merged = Palette::merge(front, back, MAX_INDEXED_COLORS);
        assert_eq!(merged.len(), MAX_INDEXED_COLORS);
        assert_eq!(&merged.colors()[..200], Palette::from_colors((0..200u8).map(|i| [i, 0, 0])).colors());
    }

    #[test]
    fn near_duplicates_are_not_collapsed() {
        let front = Palette::from_colors([[10, 10, 10]]);
        let back = Palette::from_colors([[10, 10, 11]]);
        assert_eq!(Palette::merge(front, back, 256).len(), 2);
    }

    #[test]
    fn nearest_picks_closest_entry() {
        let palette = Palette::from_colors([[0, 0, 0], [255, 0, 0], [0, 255, 0]]);
        assert_eq!(palette.nearest([250, 10, 5]), 1);
        assert_eq!(palette.nearest([3, 200, 3]), 2);
        assert_eq!(palette.nearest([1, 1, 1]), 0);
    }
}
