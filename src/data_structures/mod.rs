//! Scene data: models, meshes, textures, and transforms.
//!
//! - `model` contains mesh, vertex, and material definitions
//! - `texture` holds CPU textures, sampler state, and sRGB conversion
//! - `instance` holds decomposed per-node transforms
//! - `scene_graph` is the owned node hierarchy of a loaded model

pub mod instance;
pub mod model;
pub mod scene_graph;
pub mod texture;
