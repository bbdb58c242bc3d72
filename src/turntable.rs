//! The turntable run: load, light, texture, build the palette, encode.
//!
//! [`Turntable`] drives one run end to end. It owns the caller's flow and
//! awaits each hook in order; rendering and encoding happen on the calling
//! task between hooks. The GPU device is only requested once every texture
//! has been fetched, so a broken asset fails the run before any rendering.

use std::{
    f32::consts::TAU,
    path::{Path, PathBuf},
    sync::Arc,
};

use cgmath::{Deg, EuclideanSpace, Point3};
use image::RgbaImage;
use log::log;

use crate::{
    context::Context,
    data_structures::scene_graph::Model,
    encode::{GifSink, finish_all, thumbnail_path},
    error::{Result, TurntableError},
    flow::{FrameTick, TurntableFlow},
    gpu::Gpu,
    options::{RenderOptions, rgb_from_hex},
    palette::{self, Palette, map_frame, quantize, sample_budget},
    pipelines::composite::{Compositor, SquarePredicate, default_square_predicate},
    render::Renderer,
    resources::{
        load_model,
        source::{AssetSource, DefaultSource},
        texture::{TextureSources, apply_textures, normalize_textures, resolve_textures},
    },
};

/// `fps * duration` is shrunk by this relative amount before rounding up, so
/// products that land a rounding error above an integer keep that integer.
const FRAME_COUNT_EPSILON: f64 = 1e-9;

/// Frame count and per-frame deltas, fixed at construction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnimationClock {
    pub frames: u32,
    /// Seconds per frame.
    pub delta_time: f32,
    /// Radians per frame; one full turn over the animation.
    pub delta_rotation: f32,
    /// Frame delay in GIF centiseconds.
    pub delay: u16,
    /// Whether the output carries the infinite-loop extension.
    pub looping: bool,
}

impl AnimationClock {
    pub fn new(fps: u32, duration: f64) -> Self {
        let fps = fps.max(1);
        let animated = duration > 0.0;
        let frames = if animated {
            (fps as f64 * duration * (1.0 - FRAME_COUNT_EPSILON)).ceil().max(1.0) as u32
        } else {
            1
        };
        Self {
            frames,
            delta_time: 1.0 / fps as f32,
            delta_rotation: if animated { TAU / frames as f32 } else { 0.0 },
            delay: (100.0 / fps as f32).round() as u16,
            looping: animated,
        }
    }

    /// Timing handed to the hook after `frame` frames have been encoded.
    /// Hooks only run between frames, so `frame` is in `1..frames`.
    pub fn tick(&self, frame: u32) -> FrameTick {
        FrameTick {
            frame,
            elapsed: frame as f32 * self.delta_time,
            delta_time: self.delta_time,
            delta_rotation: self.delta_rotation,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Encoding the frame with this 0-based index.
    Rendering(u32),
    Finalizing,
    Done,
}

enum MeshInput {
    Uri(String),
    Model(Model),
}

pub struct Turntable<F: TurntableFlow> {
    mesh: MeshInput,
    output: PathBuf,
    sources: TextureSources,
    width: u32,
    height: u32,
    options: RenderOptions,
    flow: F,
    asset_source: Arc<dyn AssetSource>,
    square: Box<SquarePredicate>,
    clock: AnimationClock,
    phase: Phase,
}

impl<F: TurntableFlow> Turntable<F> {
    /// Prepare a run. Options and dimensions are validated here, so a
    /// `Turntable` that exists can always start.
    pub fn new(
        mesh_uri: impl Into<String>,
        output: impl Into<PathBuf>,
        sources: TextureSources,
        width: u32,
        height: u32,
        options: RenderOptions,
        flow: F,
    ) -> Result<Self> {
        options.validate()?;
        for (name, value) in [("width", width), ("height", height)] {
            if value == 0 || value > u16::MAX as u32 {
                return Err(TurntableError::options(format!(
                    "{name} must be within 1..={}, got {value}",
                    u16::MAX
                )));
            }
        }
        let level = options.log_level();
        let clock = AnimationClock::new(options.fps, options.duration);
        log!(
            level,
            "caching animation values: {} frames, {:.4} rad per frame",
            clock.frames,
            clock.delta_rotation
        );
        Ok(Self {
            mesh: MeshInput::Uri(mesh_uri.into()),
            output: output.into(),
            sources,
            width,
            height,
            options,
            flow,
            asset_source: Arc::new(DefaultSource::new()),
            square: Box::new(default_square_predicate),
            clock,
            phase: Phase::Idle,
        })
    }

    /// Render an already loaded model instead of fetching the mesh URI.
    pub fn with_model(mut self, model: Model) -> Self {
        self.mesh = MeshInput::Model(model);
        self
    }

    /// Fetch meshes and textures through `source` instead of the default
    /// file/network source.
    pub fn with_asset_source(mut self, source: Arc<dyn AssetSource>) -> Self {
        self.asset_source = source;
        self
    }

    /// Textures whose short/long side ratio is above `threshold` are used as is.
    pub fn with_square_threshold(self, threshold: f32) -> Self {
        self.with_square_predicate(move |ratio| ratio > threshold)
    }

    pub fn with_square_predicate(mut self, predicate: impl Fn(f32) -> bool + Send + Sync + 'static) -> Self {
        self.square = Box::new(predicate);
        self
    }

    pub fn clock(&self) -> &AnimationClock {
        &self.clock
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn flow(&self) -> &F {
        &self.flow
    }

    pub fn into_flow(self) -> F {
        self.flow
    }

    /// Run the whole pipeline and return the path of the finished GIF.
    pub async fn run(&mut self) -> Result<PathBuf> {
        let level = self.options.log_level();
        let started = instant::Instant::now();

        log!(level, "loading");
        let mut model = match &self.mesh {
            MeshInput::Uri(uri) => load_model(&*self.asset_source, uri)
                .await
                .map_err(|e| TurntableError::load(uri.as_str(), e))?,
            MeshInput::Model(model) => model.clone(),
        };

        let mut ctx = Context::new(self.width, self.height, self.options.background);
        log!(level, "creating default lights");
        ctx.create_default_lights(Point3::from_vec(model.position()));

        log!(level, "setup");
        self.flow
            .on_setup(&mut ctx, &mut model)
            .await
            .map_err(TurntableError::Hook)?;
        ctx.attach(model);

        let textures = if self.sources.is_empty() {
            Vec::new()
        } else {
            log!(level, "loading textures");
            let mut sources = self.sources.clone();
            if self.options.optimize {
                sources.dedup();
            }
            resolve_textures(&*self.asset_source, &sources).await?
        };

        log!(level, "requesting gpu");
        let gpu = Arc::new(Gpu::new().await.map_err(TurntableError::Render)?);

        if !textures.is_empty() {
            log!(level, "texturing");
            let compositor = Compositor::new(&gpu.device);
            let fill = rgb_from_hex(self.options.color);
            let textures = normalize_textures(&gpu, &compositor, textures, fill, &*self.square).await?;
            if let Some(model) = ctx.model_mut() {
                apply_textures(model, &textures)?;
            }
        }

        let mut renderer = Renderer::new(gpu, self.width, self.height).map_err(TurntableError::Render)?;
        log!(level, "building palette");
        let palette = self.build_palette(&mut ctx, &mut renderer).await?;
        log!(level, "palette holds {} colors", palette.len());

        let thumbnail = if self.options.thumbnail {
            log!(level, "rendering thumbnail");
            let image = render_back_pose(&mut ctx, &mut renderer).await?;
            Some(map_frame(&image, &palette, self.options.dither))
        } else {
            None
        };

        log!(level, "rendering");
        let (w, h) = (self.width as u16, self.height as u16);
        let mut sink = GifSink::create(&self.output, w, h, &palette, self.clock.looping, self.clock.delay)?;
        for i in 0..self.clock.frames {
            self.phase = Phase::Rendering(i);
            let frame = renderer.render(&ctx).await.map_err(TurntableError::Render)?;
            sink.push_frame(map_frame(&frame, &palette, self.options.dither))?;
            log!(level, "frame {}/{}", i + 1, self.clock.frames);

            if i + 1 == self.clock.frames {
                break;
            }
            if let Some(model) = ctx.detach() {
                let model = self
                    .flow
                    .on_animation_frame(model, self.clock.tick(i + 1))
                    .await
                    .map_err(TurntableError::Hook)?;
                ctx.attach(model);
            }
        }

        self.phase = Phase::Finalizing;
        log!(level, "compiling");
        let mut sinks = vec![sink];
        if let Some(indices) = thumbnail {
            let mut thumb = GifSink::create(&thumbnail_path(&self.output), w, h, &palette, false, self.clock.delay)?;
            thumb.push_frame(indices)?;
            sinks.push(thumb);
        }
        for written in finish_all(sinks)? {
            log!(level, "{} written", written.display());
        }
        let path = self.output.clone();

        self.phase = Phase::Done;
        log!(
            level,
            "finished {} in {:.2}s",
            path.display(),
            started.elapsed().as_secs_f32()
        );
        self.flow.on_complete(&path).await.map_err(TurntableError::Hook)?;
        Ok(path)
    }

    /// One palette for the whole run, sampled from the front and back poses.
    async fn build_palette(&self, ctx: &mut Context, renderer: &mut Renderer) -> Result<Palette> {
        let budget = sample_budget(self.options.dither);
        let quality = self.options.quality;
        let format = self.options.format;

        let front_image = renderer.render(ctx).await.map_err(TurntableError::Render)?;
        let front = quantize(front_image.as_raw(), budget, format, quality);
        let back_image = render_back_pose(ctx, renderer).await?;
        let back = quantize(back_image.as_raw(), budget, format, quality);

        let merged = Palette::merge(front, back, format.max_colors());
        if merged.is_empty() {
            // Only reachable when nothing opaque was rendered; the GIF still needs a color table.
            return Ok(Palette::from_colors([[0, 0, 0]]));
        }
        debug_assert!(merged.len() <= palette::MAX_INDEXED_COLORS);
        Ok(merged)
    }
}

/// Render with the model turned 180° about the world Y axis, then restore
/// its pose.
async fn render_back_pose(ctx: &mut Context, renderer: &mut Renderer) -> Result<RgbaImage> {
    let saved = ctx.model_mut().map(|model| {
        let saved = model.pose;
        model.pose.rotate_y(Deg(180.0));
        saved
    });
    let image = renderer.render(ctx).await;
    if let (Some(saved), Some(model)) = (saved, ctx.model_mut()) {
        model.pose = saved;
    }
    image.map_err(TurntableError::Render)
}
