use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::Parser;
use flow_turntable::{
    ColorFormat, Context, FrameTick, Model, RenderOptions, TextureSources, Turntable, TurntableFlow,
    cgmath,
};

#[derive(Parser, Debug)]
#[command(name = "turntable", version, about = "Render a textured mesh into a turntable GIF")]
struct Cli {
    /// Mesh asset (.gltf, .glb or .obj) as a path, file:// or http(s):// URI.
    mesh: String,

    /// Output GIF path.
    #[arg(long, short)]
    out: PathBuf,

    /// Texture for a material as MATERIAL=URI. Repeatable.
    #[arg(long = "texture", short = 't', value_parser = parse_texture)]
    textures: Vec<(String, String)>,

    /// Texture URI for the `Front` material.
    #[arg(long, short)]
    front: Option<String>,

    /// Texture URI for the `Back` material.
    #[arg(long, short)]
    back: Option<String>,

    #[arg(long, default_value_t = 256)]
    width: u32,

    #[arg(long, default_value_t = 256)]
    height: u32,

    #[arg(long)]
    fps: Option<u32>,

    /// Animation length in seconds; 0 writes a single still frame.
    #[arg(long)]
    duration: Option<f64>,

    /// NeuQuant sampling factor, 1..=30: 1 is best, higher is faster.
    #[arg(long)]
    quality: Option<u32>,

    /// Palette channel depth: rgb888, rgb565 or rgb444.
    #[arg(long)]
    format: Option<ColorFormat>,

    /// Padding color for non-square textures, as hex (0x000000).
    #[arg(long, value_parser = parse_hex)]
    color: Option<u32>,

    /// Scene clear color as hex.
    #[arg(long = "clear", value_parser = parse_hex)]
    background: Option<u32>,

    /// Fetch repeated texture URIs only once.
    #[arg(long)]
    optimize: bool,

    /// Floyd-Steinberg dithering against the palette.
    #[arg(long)]
    dither: bool,

    /// Also write a still `.thumb` GIF of the back side.
    #[arg(long)]
    thumbnail: bool,

    /// Camera position as X,Y,Z.
    #[arg(long, value_parser = parse_vec3, default_value = "0,0,0.6", allow_hyphen_values = true)]
    camera: [f32; 3],

    /// Model position as X,Y,Z.
    #[arg(long, value_parser = parse_vec3, default_value = "0,-0.2,0", allow_hyphen_values = true)]
    offset: [f32; 3],

    /// Image stretched behind the model.
    #[arg(long)]
    background_image: Option<PathBuf>,

    /// JSON file with render options; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

fn parse_texture(s: &str) -> Result<(String, String), String> {
    let (material, uri) = s
        .split_once('=')
        .ok_or_else(|| format!("expected MATERIAL=URI, got '{s}'"))?;
    if material.is_empty() || uri.trim().is_empty() {
        return Err(format!("expected MATERIAL=URI, got '{s}'"));
    }
    Ok((material.to_string(), uri.to_string()))
}

fn parse_hex(s: &str) -> Result<u32, String> {
    let digits = s
        .trim_start_matches("0x")
        .trim_start_matches("0X")
        .trim_start_matches('#');
    u32::from_str_radix(digits, 16)
        .ok()
        .filter(|v| *v <= 0xFFFFFF)
        .ok_or_else(|| format!("'{s}' is not a 24-bit hex color"))
}

fn parse_vec3(s: &str) -> Result<[f32; 3], String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("'{s}': {e}"))?;
    match parts.as_slice() {
        [x, y, z] => Ok([*x, *y, *z]),
        _ => Err(format!("expected X,Y,Z, got '{s}'")),
    }
}

impl Cli {
    fn options(&self) -> anyhow::Result<RenderOptions> {
        let mut options = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                RenderOptions::from_json(&text)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => RenderOptions::default(),
        };
        if let Some(fps) = self.fps {
            options.fps = fps;
        }
        if let Some(duration) = self.duration {
            options.duration = duration;
        }
        if let Some(quality) = self.quality {
            options.quality = quality;
        }
        if let Some(format) = self.format {
            options.format = format;
        }
        if let Some(color) = self.color {
            options.color = color;
        }
        if let Some(background) = self.background {
            options.background = background;
        }
        options.optimize |= self.optimize;
        options.dither |= self.dither;
        options.thumbnail |= self.thumbnail;
        options.verbose |= self.verbose;
        Ok(options)
    }

    fn sources(&self) -> TextureSources {
        let mut sources = TextureSources::new();
        if let Some(front) = &self.front {
            sources.insert("Front", front.as_str());
        }
        if let Some(back) = &self.back {
            sources.insert("Back", back.as_str());
        }
        for (material, uri) in &self.textures {
            sources.insert(material.as_str(), uri.as_str());
        }
        sources
    }
}

/// Places camera and model, loads the backdrop, and spins the model clockwise.
struct CliFlow {
    camera: [f32; 3],
    offset: [f32; 3],
    background_image: Option<PathBuf>,
}

impl TurntableFlow for CliFlow {
    async fn on_setup(&mut self, ctx: &mut Context, model: &mut Model) -> anyhow::Result<()> {
        let [x, y, z] = self.camera;
        ctx.camera.set_position(x, y, z);
        model.pose.position = self.offset.into();

        if let Some(path) = &self.background_image {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("reading background {}", path.display()))?;
            let image = image::load_from_memory(&bytes)
                .with_context(|| format!("decoding background {}", path.display()))?;
            ctx.set_background_image(image.to_rgba8());
        }
        Ok(())
    }

    async fn on_animation_frame(&mut self, mut model: Model, tick: FrameTick) -> anyhow::Result<Model> {
        model.pose.rotate_y(cgmath::Rad(-tick.delta_rotation));
        Ok(model)
    }

    async fn on_complete(&mut self, path: &Path) -> anyhow::Result<()> {
        log::info!("complete {}", path.display());
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let options = cli.options()?;
    let flow = CliFlow {
        camera: cli.camera,
        offset: cli.offset,
        background_image: cli.background_image.clone(),
    };
    let mut turntable = Turntable::new(
        cli.mesh.as_str(),
        cli.out.clone(),
        cli.sources(),
        cli.width,
        cli.height,
        options,
        flow,
    )?;
    let path = turntable.run().await?;
    println!("{}", path.display());
    Ok(())
}
