//! Scene context.
//!
//! The [`Context`] owns everything a frame is rendered from: camera and
//! projection, lights, the background, and the model once it has joined the
//! scene. Flows receive it in `on_setup` to place the camera, swap the
//! background, or replace the default lights.

use std::sync::Arc;

use cgmath::Point3;
use image::RgbaImage;

use crate::{
    camera::{self, Camera, Projection},
    data_structures::scene_graph::Model,
    options::rgb_from_hex,
    pipelines::light::Light,
};

pub const DEFAULT_AMBIENT_COLOR: u32 = 0xCFE2F3;
pub const DEFAULT_AMBIENT_INTENSITY: f32 = 1.5;
pub const DEFAULT_DIRECTIONAL_COLOR: u32 = 0xFFFFFF;
pub const DEFAULT_DIRECTIONAL_INTENSITY: f32 = 2.5;

/// What fills the frame behind the model.
#[derive(Clone, Debug)]
pub enum Background {
    /// Solid sRGB color.
    Color([u8; 3]),
    /// Image stretched over the whole viewport.
    Image(Arc<RgbaImage>),
}

#[derive(Debug)]
pub struct Context {
    pub camera: Camera,
    pub projection: Projection,
    pub lights: Vec<Light>,
    pub background: Background,
    model: Option<Model>,
}

impl Context {
    pub fn new(width: u32, height: u32, background: u32) -> Self {
        Self {
            camera: Camera::origin(),
            projection: Projection::new(
                width,
                height,
                cgmath::Deg(camera::DEFAULT_FOVY),
                camera::DEFAULT_ZNEAR,
                camera::DEFAULT_ZFAR,
            ),
            lights: Vec::new(),
            background: Background::Color(rgb_from_hex(background)),
            model: None,
        }
    }

    /// Ambient fill plus a directional light from straight above, aimed at `target`.
    pub fn create_default_lights(&mut self, target: Point3<f32>) {
        self.lights.push(Light::ambient(DEFAULT_AMBIENT_COLOR, DEFAULT_AMBIENT_INTENSITY));
        self.lights.push(Light::directional(
            DEFAULT_DIRECTIONAL_COLOR,
            DEFAULT_DIRECTIONAL_INTENSITY,
            Point3::new(0.0, 1.0, 0.0),
            target,
        ));
    }

    /// Remove every light from the scene.
    pub fn purge_lights(&mut self) {
        self.lights.clear();
    }

    pub fn add_light(&mut self, light: Light) {
        self.lights.push(light);
    }

    pub fn set_background_image(&mut self, image: RgbaImage) {
        self.background = Background::Image(Arc::new(image));
    }

    /// Make `model` part of the renderable scene, replacing any previous one.
    pub fn attach(&mut self, model: Model) -> &mut Model {
        self.model.insert(model)
    }

    pub fn detach(&mut self) -> Option<Model> {
        self.model.take()
    }

    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    pub fn model_mut(&mut self) -> Option<&mut Model> {
        self.model.as_mut()
    }
}
