//! Run configuration.
//!
//! [`RenderOptions`] mirrors the option set a caller passes at construction.
//! Every field has a default, so a JSON file only needs to name the values it
//! changes.

use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, TurntableError},
    palette::{
        ColorFormat,
        quantize::{MAX_QUALITY, MIN_QUALITY},
    },
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Fill color (0xRRGGBB) used to pad textures during aspect normalization.
    pub color: u32,
    /// Scene clear color (0xRRGGBB) until a hook assigns another background.
    pub background: u32,
    pub fps: u32,
    /// Animation length in seconds. `0` renders a single static frame.
    pub duration: f64,
    /// Promotes pipeline progress messages from `debug` to `info`.
    pub verbose: bool,
    /// NeuQuant sampling factor while building the palette, `1..=30`: 1 is best, higher is faster.
    pub quality: u32,
    pub format: ColorFormat,
    /// Fetch each distinct texture URI once and alias repeated ones.
    pub optimize: bool,
    /// Floyd-Steinberg error diffusion against the global palette.
    pub dither: bool,
    /// Emit a still `.thumb` sibling next to the animation.
    pub thumbnail: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            color: 0x000000,
            background: 0x111111,
            fps: 30,
            duration: 0.0,
            verbose: false,
            quality: 2,
            format: ColorFormat::default(),
            optimize: false,
            dither: false,
            thumbnail: false,
        }
    }
}

impl RenderOptions {
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fps == 0 {
            return Err(TurntableError::options("fps must be >= 1"));
        }
        if !self.duration.is_finite() || self.duration < 0.0 {
            return Err(TurntableError::options(
                "duration must be a finite number of seconds >= 0",
            ));
        }
        if !(MIN_QUALITY..=MAX_QUALITY).contains(&self.quality) {
            return Err(TurntableError::options(format!(
                "quality must be within {MIN_QUALITY}..={MAX_QUALITY}, got {}",
                self.quality
            )));
        }
        Ok(())
    }

    /// Level used for pipeline progress messages.
    pub fn log_level(&self) -> log::Level {
        if self.verbose {
            log::Level::Info
        } else {
            log::Level::Debug
        }
    }
}

/// Split `0xRRGGBB` into its channels.
pub fn rgb_from_hex(hex: u32) -> [u8; 3] {
    [(hex >> 16) as u8, (hex >> 8) as u8, hex as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_overrides_only_named_fields() {
        let opts = RenderOptions::from_json(r#"{ "fps": 12, "dither": true, "format": "rgb444" }"#)
            .unwrap();
        assert_eq!(opts.fps, 12);
        assert!(opts.dither);
        assert_eq!(opts.format, ColorFormat::Rgb444);
        assert_eq!(opts.quality, 2);
        assert_eq!(opts.duration, 0.0);
    }

    #[test]
    fn rejects_zero_fps_and_negative_duration() {
        let opts = RenderOptions {
            fps: 0,
            ..Default::default()
        };
        assert!(opts.validate().is_err());
        let opts = RenderOptions {
            duration: -1.0,
            ..Default::default()
        };
        assert!(opts.validate().is_err());
        assert!(RenderOptions::default().validate().is_ok());
    }

    #[test]
    fn quality_must_be_a_neuquant_sampling_factor() {
        for (quality, ok) in [(0, false), (1, true), (30, true), (31, false)] {
            let opts = RenderOptions {
                quality,
                ..Default::default()
            };
            assert_eq!(opts.validate().is_ok(), ok, "quality {quality}");
        }
    }

    #[test]
    fn hex_colors_split_into_channels() {
        assert_eq!(rgb_from_hex(0xCFE2F3), [0xCF, 0xE2, 0xF3]);
        assert_eq!(rgb_from_hex(0x000000), [0, 0, 0]);
    }
}
