//! Mapping full-color frames onto palette indices.
//!
//! [`Palette`] is an [`imageops::ColorMap`], so both plain nearest-entry
//! mapping and Floyd-Steinberg error diffusion come from the `image` crate.

use image::{Rgba, RgbaImage, imageops};

use super::Palette;

impl imageops::ColorMap for Palette {
    type Color = Rgba<u8>;

    fn index_of(&self, color: &Rgba<u8>) -> usize {
        let [r, g, b, _] = color.0;
        self.nearest([r as i32, g as i32, b as i32]) as usize
    }

    fn lookup(&self, index: usize) -> Option<Rgba<u8>> {
        self.colors().get(index).map(|&[r, g, b]| Rgba([r, g, b, 255]))
    }

    fn has_lookup(&self) -> bool {
        true
    }

    fn map_color(&self, color: &mut Rgba<u8>) {
        if let Some(mapped) = self.lookup(self.index_of(color)) {
            *color = mapped;
        }
    }
}

/// Index buffer for one rendered frame, row-major.
///
/// Error diffusion needs a neighbour on both axes; single-row or
/// single-column frames are mapped plainly.
pub fn map_frame(frame: &RgbaImage, palette: &Palette, dither: bool) -> Vec<u8> {
    if dither && frame.width() > 1 && frame.height() > 1 {
        let mut diffused = frame.clone();
        imageops::dither(&mut diffused, palette);
        imageops::index_colors(&diffused, palette).into_raw()
    } else {
        imageops::index_colors(frame, palette).into_raw()
    }
}
