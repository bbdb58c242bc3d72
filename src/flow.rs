//! Lifecycle hooks of a turntable run.
//!
//! A "flow" is the caller's side of a run: it places the camera and the model
//! before the first frame, moves the model between frames, and hears about
//! the finished file. The pipeline awaits every hook before continuing, so
//! hooks never run concurrently with each other or with rendering.
//!
//! # Lifecycle
//!
//! 1. `on_setup()` once, after the default lights exist and before the model
//!    joins the scene; configure the context (camera, background, lights) and
//!    the starting pose here
//! 2. `on_animation_frame()` between two encoded frames, with the model the
//!    next frame will show; a run of N frames calls it N-1 times
//! 3. `on_complete()` once every output file is in place

use std::path::Path;

use crate::{context::Context, data_structures::scene_graph::Model};

/// Timing of the frame that was just encoded.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameTick {
    /// 1-based index of the frame the hook prepares for.
    pub frame: u32,
    /// Seconds since the animation started, `frame * delta_time`.
    pub elapsed: f32,
    /// Seconds per frame.
    pub delta_time: f32,
    /// Radians per frame for one full revolution over the animation. Zero for
    /// single-frame output.
    pub delta_rotation: f32,
}

/// Caller hooks. Every method has a no-op default.
pub trait TurntableFlow {
    /// Configure the scene before the model is attached.
    fn on_setup(
        &mut self,
        ctx: &mut Context,
        model: &mut Model,
    ) -> impl Future<Output = anyhow::Result<()>> {
        let _ = (ctx, model);
        async { Ok(()) }
    }

    /// Update the model between frames and hand it back.
    fn on_animation_frame(
        &mut self,
        model: Model,
        tick: FrameTick,
    ) -> impl Future<Output = anyhow::Result<Model>> {
        let _ = tick;
        async move { Ok(model) }
    }

    /// Called once the output file has been finalized at `path`.
    fn on_complete(&mut self, path: &Path) -> impl Future<Output = anyhow::Result<()>> {
        let _ = path;
        async { Ok(()) }
    }
}

/// Leaves the scene exactly as configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct Still;

impl TurntableFlow for Still {}

/// Spins the model about the world Y axis by the per-frame rotation delta.
#[derive(Clone, Copy, Debug)]
pub struct Spin {
    /// `1.0` turns counter-clockwise seen from above, `-1.0` clockwise.
    pub direction: f32,
}

impl Default for Spin {
    fn default() -> Self {
        Self { direction: -1.0 }
    }
}

impl TurntableFlow for Spin {
    async fn on_animation_frame(&mut self, mut model: Model, tick: FrameTick) -> anyhow::Result<Model> {
        model.pose.rotate_y(cgmath::Rad(self.direction * tick.delta_rotation));
        Ok(model)
    }
}
