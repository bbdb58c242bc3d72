//! Render pipelines.
//!
//! - `basic` rasterizes and shades opaque meshes
//! - `composite` redraws non-square textures onto square render targets
//! - `light` holds scene lights and the per-frame shading terms

pub mod basic;
pub mod composite;
pub mod light;
