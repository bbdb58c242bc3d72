//! Scene lights.
//!
//! Colors are given as sRGB hex like a material editor would show them and
//! converted to linear radiance once, when the light is created.

use cgmath::{InnerSpace, Point3, Vector3};

use crate::{data_structures::texture::srgb_to_linear, options::rgb_from_hex};

#[derive(Clone, Debug, PartialEq)]
pub enum Light {
    /// Uniform light from every direction.
    Ambient { color: [f32; 3], intensity: f32 },
    /// Parallel light travelling from `position` towards `target`.
    Directional {
        color: [f32; 3],
        intensity: f32,
        position: Point3<f32>,
        target: Point3<f32>,
    },
}

impl Light {
    pub fn ambient(hex: u32, intensity: f32) -> Self {
        Light::Ambient {
            color: linear_rgb(hex),
            intensity,
        }
    }

    pub fn directional(hex: u32, intensity: f32, position: Point3<f32>, target: Point3<f32>) -> Self {
        Light::Directional {
            color: linear_rgb(hex),
            intensity,
            position,
            target,
        }
    }

    /// Unit vector from a lit surface towards the light, if the light has a direction.
    pub fn direction_to_light(&self) -> Option<Vector3<f32>> {
        match self {
            Light::Ambient { .. } => None,
            Light::Directional {
                position, target, ..
            } => {
                let d = *position - *target;
                if d.magnitude2() == 0.0 {
                    // Degenerate aim; light straight down like the default placement.
                    Some(Vector3::unit_y())
                } else {
                    Some(d.normalize())
                }
            }
        }
    }
}

/// Directional lights beyond this count are dropped from the frame uniform.
pub const MAX_DIRECTIONAL_LIGHTS: usize = 4;

/// Shading terms for one frame, laid out like `Lights` in `basic.wgsl`.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniform {
    /// Summed ambient radiance; `w` unused.
    pub ambient: [f32; 4],
    /// Unit vectors towards each light; `w` unused.
    pub directions: [[f32; 4]; MAX_DIRECTIONAL_LIGHTS],
    pub radiance: [[f32; 4]; MAX_DIRECTIONAL_LIGHTS],
    pub count: u32,
    // Uniform structs are sized in multiples of 16 bytes.
    _padding: [u32; 3],
}

impl LightUniform {
    pub fn from_lights(lights: &[Light]) -> Self {
        let mut uniform = LightUniform::default();
        for light in lights {
            match light {
                Light::Ambient { color, intensity } => {
                    for c in 0..3 {
                        uniform.ambient[c] += color[c] * intensity;
                    }
                }
                Light::Directional {
                    color, intensity, ..
                } => {
                    let slot = uniform.count as usize;
                    if slot == MAX_DIRECTIONAL_LIGHTS {
                        log::warn!("more than {MAX_DIRECTIONAL_LIGHTS} directional lights, extra ones ignored");
                        continue;
                    }
                    if let Some(dir) = light.direction_to_light() {
                        uniform.directions[slot] = [dir.x, dir.y, dir.z, 0.0];
                        uniform.radiance[slot] = [color[0] * intensity, color[1] * intensity, color[2] * intensity, 0.0];
                        uniform.count += 1;
                    }
                }
            }
        }
        uniform
    }
}

fn linear_rgb(hex: u32) -> [f32; 3] {
    let [r, g, b] = rgb_from_hex(hex);
    [srgb_to_linear(r), srgb_to_linear(g), srgb_to_linear(b)]
}
