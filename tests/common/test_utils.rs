use std::{
    collections::HashMap,
    io::Cursor,
    path::{Path, PathBuf},
    sync::Mutex,
};

use flow_turntable::{
    AssetSource, Context, FrameTick, Model, Node, TurntableFlow,
    data_structures::model::{Material, Mesh, ModelVertex},
};
use futures::future::BoxFuture;
use image::{ImageFormat, RgbaImage};

/// Axis-aligned cube centered on the origin, four vertices per face so every
/// face keeps its own normal and full 0..1 texture coordinates.
pub fn cube_mesh(name: &str, half: f32, material: &str) -> Mesh {
    // (normal, u, v) with u x v = normal, so faces wind counter-clockwise seen from outside.
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]),
    ];
    let corners = [(-1.0, -1.0, [0.0, 1.0]), (1.0, -1.0, [1.0, 1.0]), (1.0, 1.0, [1.0, 0.0]), (-1.0, 1.0, [0.0, 0.0])];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (n, u, v) in faces {
        let base = vertices.len() as u32;
        for (su, sv, tex_coords) in corners {
            let position = [
                (n[0] + su * u[0] + sv * v[0]) * half,
                (n[1] + su * u[1] + sv * v[1]) * half,
                (n[2] + su * u[2] + sv * v[2]) * half,
            ];
            vertices.push(ModelVertex {
                position,
                tex_coords,
                normal: n,
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    Mesh {
        name: name.to_string(),
        vertices,
        indices,
        material: Some(Material::new(material)),
    }
}

/// One cube node per material, all sharing the origin.
pub fn cube_model(materials: &[&str]) -> Model {
    let nodes = materials
        .iter()
        .map(|material| Node::new(*material).with_mesh(cube_mesh(material, 0.5, material)))
        .collect();
    Model::new("cube", nodes)
}

pub fn png_bytes(color: [u8; 4], width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, image::Rgba(color));
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .expect("png encoding of an in-memory image");
    out.into_inner()
}

/// Serves assets from memory and counts how often each URI was fetched.
#[derive(Default)]
pub struct MemorySource {
    assets: HashMap<String, Vec<u8>>,
    fetches: Mutex<HashMap<String, usize>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, uri: &str, bytes: Vec<u8>) -> Self {
        self.assets.insert(uri.to_string(), bytes);
        self
    }

    pub fn fetch_count(&self, uri: &str) -> usize {
        self.fetches.lock().unwrap().get(uri).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().unwrap().values().sum()
    }
}

impl AssetSource for MemorySource {
    fn fetch<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, anyhow::Result<Vec<u8>>> {
        Box::pin(async move {
            *self.fetches.lock().unwrap().entry(uri.to_string()).or_default() += 1;
            self.assets
                .get(uri)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no asset at {uri}"))
        })
    }
}

/// Records every hook invocation. Optionally spins the model and replaces
/// the default lights with a single ambient light.
#[derive(Default)]
pub struct RecordingFlow {
    pub camera: Option<[f32; 3]>,
    pub ambient_only: Option<(u32, f32)>,
    pub spin: bool,
    pub setups: u32,
    pub ticks: Vec<FrameTick>,
    pub completed: Vec<PathBuf>,
    pub lights_at_setup: usize,
}

impl RecordingFlow {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TurntableFlow for RecordingFlow {
    async fn on_setup(&mut self, ctx: &mut Context, _model: &mut Model) -> anyhow::Result<()> {
        self.setups += 1;
        self.lights_at_setup = ctx.lights.len();
        if let Some([x, y, z]) = self.camera {
            ctx.camera.set_position(x, y, z);
        }
        if let Some((hex, intensity)) = self.ambient_only {
            ctx.purge_lights();
            ctx.add_light(flow_turntable::pipelines::light::Light::ambient(hex, intensity));
        }
        Ok(())
    }

    async fn on_animation_frame(&mut self, mut model: Model, tick: FrameTick) -> anyhow::Result<Model> {
        self.ticks.push(tick);
        if self.spin {
            model.pose.rotate_y(flow_turntable::cgmath::Rad(-tick.delta_rotation));
        }
        Ok(model)
    }

    async fn on_complete(&mut self, path: &Path) -> anyhow::Result<()> {
        self.completed.push(path.to_path_buf());
        Ok(())
    }
}

/// Decoded frames of a GIF as palette indices, plus its global palette.
pub struct DecodedGif {
    pub palette: Vec<[u8; 3]>,
    pub frames: Vec<Vec<u8>>,
    pub width: u16,
    pub height: u16,
}

impl DecodedGif {
    pub fn color_at(&self, frame: usize, x: usize, y: usize) -> [u8; 3] {
        let index = self.frames[frame][y * self.width as usize + x];
        self.palette[index as usize]
    }
}

pub fn decode_gif(path: &Path) -> DecodedGif {
    let file = std::fs::File::open(path).expect("output gif exists");
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::Indexed);
    let mut decoder = options.read_info(file).expect("valid gif header");
    let palette = decoder
        .global_palette()
        .expect("global palette")
        .chunks_exact(3)
        .map(|c| [c[0], c[1], c[2]])
        .collect();
    let (width, height) = (decoder.width(), decoder.height());
    let mut frames = Vec::new();
    while let Some(frame) = decoder.read_next_frame().expect("readable frame") {
        frames.push(frame.buffer.to_vec());
    }
    DecodedGif {
        palette,
        frames,
        width,
        height,
    }
}
