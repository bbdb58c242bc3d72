//! flow-turntable
//!
//! Renders a textured mesh with wgpu on a headless device and writes it as
//! an animated, palette-indexed GIF turntable, optionally with a still
//! thumbnail that shares the animation's palette. Callers steer the scene through the hooks
//! of a [`TurntableFlow`].
//!
//! High-level modules
//! - `camera`: eye pose and perspective projection
//! - `context`: the scene a frame is rendered from (camera, lights, background, model)
//! - `data_structures`: meshes, materials, textures, transforms and the node graph
//! - `encode`: GIF output with no partial files on failure
//! - `flow`: lifecycle hooks of a run
//! - `gpu`: headless device creation and texture readback
//! - `palette`: global palette building, quantization and dithering
//! - `pipelines`: the mesh and texture compositing render pipelines, and lighting
//! - `resources`: loading meshes and textures from files, URLs and data URIs
//! - `render`: the offscreen targets and per-frame scene rendering
//! - `turntable`: the pipeline that ties it all together
//!

pub mod camera;
pub mod context;
pub mod data_structures;
pub mod encode;
pub mod error;
pub mod flow;
pub mod gpu;
pub mod options;
pub mod palette;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod turntable;

// Re-exports commonly used types for convenience in downstream code.
pub use context::{Background, Context};
pub use data_structures::scene_graph::{Model, Node};
pub use error::{Result, TurntableError};
pub use flow::{FrameTick, Spin, Still, TurntableFlow};
pub use options::RenderOptions;
pub use palette::{ColorFormat, Palette};
pub use resources::{
    source::{AssetSource, DefaultSource},
    texture::{TextureSource, TextureSources},
};
pub use turntable::{AnimationClock, Phase, Turntable};
pub use cgmath;
