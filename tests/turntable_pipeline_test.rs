use std::sync::Arc;
#[cfg(feature = "integration-tests")]
use std::f32::consts::{PI, TAU};

#[cfg(feature = "integration-tests")]
use flow_turntable::{FrameTick, Model, Phase, TurntableFlow, encode::thumbnail_path};
use flow_turntable::{RenderOptions, TextureSources, Turntable, TurntableError, encode::tmp_path};

#[cfg(feature = "integration-tests")]
use crate::common::test_utils::decode_gif;
use crate::common::test_utils::{MemorySource, RecordingFlow, cube_model, png_bytes};

mod common;

#[cfg(feature = "integration-tests")]
fn red_cube_flow() -> RecordingFlow {
    RecordingFlow {
        camera: Some([0.0, 0.0, 1.5]),
        // Lambert divides by PI, so PI of white ambient reproduces the albedo.
        ambient_only: Some((0xFFFFFF, PI)),
        ..RecordingFlow::new()
    }
}

fn red_source() -> Arc<MemorySource> {
    Arc::new(MemorySource::new().with("red.png", png_bytes([255, 0, 0, 255], 4, 4)))
}

#[tokio::test]
#[cfg(feature = "integration-tests")]
async fn red_cube_renders_red_through_the_palette() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("cube.gif");
    let sources: TextureSources = [("Front", "red.png")].into_iter().collect();

    let mut turntable = Turntable::new("cube", &out, sources, 32, 32, RenderOptions::default(), red_cube_flow())
        .unwrap()
        .with_model(cube_model(&["Front"]))
        .with_asset_source(red_source());
    let path = turntable.run().await.unwrap();
    assert_eq!(path, out);
    assert_eq!(turntable.phase(), Phase::Done);

    let gif = decode_gif(&out);
    assert_eq!((gif.width, gif.height), (32, 32));
    assert_eq!(gif.frames.len(), 1);
    assert!(gif.palette.contains(&[255, 0, 0]));
    assert_eq!(gif.color_at(0, 16, 16), [255, 0, 0]);
    // Corners show the clear color, snapped to the default rgb565 palette format.
    assert_eq!(gif.color_at(0, 0, 0), [0x10, 0x10, 0x10]);

    let flow = turntable.into_flow();
    assert_eq!(flow.setups, 1);
    assert_eq!(flow.lights_at_setup, 2);
    assert_eq!(flow.completed, vec![out]);
}

#[tokio::test]
#[cfg(feature = "integration-tests")]
async fn animation_hooks_run_between_frames() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("spin.gif");
    let options = RenderOptions {
        fps: 10,
        duration: 1.0,
        ..Default::default()
    };
    let flow = RecordingFlow {
        spin: true,
        ..red_cube_flow()
    };

    let mut turntable = Turntable::new("cube", &out, TextureSources::new(), 16, 16, options, flow)
        .unwrap()
        .with_model(cube_model(&["Front"]));
    assert_eq!(turntable.clock().frames, 10);
    turntable.run().await.unwrap();

    let flow = turntable.into_flow();
    let frames: Vec<u32> = flow.ticks.iter().map(|t| t.frame).collect();
    assert_eq!(frames, (1..10).collect::<Vec<_>>());
    // The last frame shows the model one step short of a full turn.
    let total: f32 = flow.ticks.iter().map(|t| t.delta_rotation).sum();
    assert!((total - TAU * 9.0 / 10.0).abs() < 1e-4, "total rotation {total}");

    assert_eq!(decode_gif(&out).frames.len(), 10);
    let bytes = std::fs::read(&out).unwrap();
    assert!(bytes.windows(11).any(|w| w == b"NETSCAPE2.0"));
}

#[tokio::test]
#[cfg(feature = "integration-tests")]
async fn static_output_has_no_loop_extension_nor_hook_calls() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("still.gif");

    let mut turntable = Turntable::new("cube", &out, TextureSources::new(), 16, 16, RenderOptions::default(), red_cube_flow())
        .unwrap()
        .with_model(cube_model(&["Front"]));
    assert_eq!(turntable.clock().delta_rotation, 0.0);
    turntable.run().await.unwrap();

    let flow = turntable.into_flow();
    assert!(flow.ticks.is_empty());
    assert_eq!(flow.completed.len(), 1);
    let bytes = std::fs::read(&out).unwrap();
    assert!(!bytes.windows(11).any(|w| w == b"NETSCAPE2.0"));
    assert_eq!(decode_gif(&out).frames.len(), 1);
}

#[tokio::test]
#[cfg(feature = "integration-tests")]
async fn thumbnail_shares_the_animation_palette() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("thumbed.gif");
    let options = RenderOptions {
        thumbnail: true,
        fps: 4,
        duration: 0.5,
        ..Default::default()
    };
    let sources: TextureSources = [("Front", "red.png")].into_iter().collect();

    let mut turntable = Turntable::new("cube", &out, sources, 24, 24, options, red_cube_flow())
        .unwrap()
        .with_model(cube_model(&["Front"]))
        .with_asset_source(red_source());
    turntable.run().await.unwrap();

    let thumb = thumbnail_path(&out);
    assert!(thumb.exists());
    let animation = decode_gif(&out);
    let still = decode_gif(&thumb);
    assert_eq!(animation.frames.len(), 2);
    assert_eq!(still.frames.len(), 1);
    assert_eq!(still.palette, animation.palette);
    // The back of a uniformly red cube is red as well.
    assert_eq!(still.color_at(0, 12, 12), [255, 0, 0]);
}

#[tokio::test]
#[cfg(feature = "integration-tests")]
async fn failed_thumbnail_commit_leaves_no_animation() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("blocked.gif");
    // A directory where the thumbnail should go makes its rename fail.
    std::fs::create_dir(thumbnail_path(&out)).unwrap();
    let options = RenderOptions {
        thumbnail: true,
        ..Default::default()
    };

    let mut turntable = Turntable::new("cube", &out, TextureSources::new(), 8, 8, options, RecordingFlow::new())
        .unwrap()
        .with_model(cube_model(&["Front"]));
    let err = turntable.run().await.unwrap_err();
    assert!(matches!(err, TurntableError::Encoding(_)), "{err:?}");
    assert!(!out.exists());
    assert!(!tmp_path(&out).exists());
    assert!(!tmp_path(&thumbnail_path(&out)).exists());
    assert!(turntable.flow().completed.is_empty());
}

#[tokio::test]
#[cfg(feature = "integration-tests")]
async fn optimize_fetches_each_uri_once() {
    let dir = tempfile::tempdir().unwrap();
    let sources: TextureSources = [("Front", "red.png"), ("Back", "red.png")].into_iter().collect();

    for (optimize, expected) in [(false, 2), (true, 1)] {
        let source = red_source();
        let options = RenderOptions {
            optimize,
            ..Default::default()
        };
        let out = dir.path().join(format!("dedup-{optimize}.gif"));
        let mut turntable = Turntable::new("cube", &out, sources.clone(), 8, 8, options, RecordingFlow::new())
            .unwrap()
            .with_model(cube_model(&["Front", "Back"]))
            .with_asset_source(source.clone());
        turntable.run().await.unwrap();
        assert_eq!(source.fetch_count("red.png"), expected, "optimize = {optimize}");
    }
}

#[tokio::test]
async fn failed_texture_load_leaves_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("missing.gif");
    let sources: TextureSources = [("Front", "red.png"), ("Back", "nowhere.png")].into_iter().collect();

    let mut turntable = Turntable::new("cube", &out, sources, 8, 8, RenderOptions::default(), RecordingFlow::new())
        .unwrap()
        .with_model(cube_model(&["Front", "Back"]))
        .with_asset_source(red_source());
    let err = turntable.run().await.unwrap_err();
    match err {
        TurntableError::Load { uri, .. } => assert_eq!(uri, "nowhere.png"),
        other => panic!("expected a load error, got {other:?}"),
    }
    assert!(!out.exists());
    assert!(!tmp_path(&out).exists());
    assert!(turntable.flow().completed.is_empty());
}

#[tokio::test]
#[cfg(feature = "integration-tests")]
async fn unmatched_texture_is_an_application_error() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("unmatched.gif");
    let sources: TextureSources = [("Front", "red.png"), ("Sleeve", "red.png")].into_iter().collect();

    let mut turntable = Turntable::new("cube", &out, sources, 8, 8, RenderOptions::default(), RecordingFlow::new())
        .unwrap()
        .with_model(cube_model(&["Front"]))
        .with_asset_source(red_source());
    let err = turntable.run().await.unwrap_err();
    assert!(matches!(err, TurntableError::Application { unmatched: 1 }), "{err:?}");
    assert!(!out.exists());
}

/// Fails on the given frame, after earlier frames were already encoded.
#[cfg(feature = "integration-tests")]
struct FailingFlow {
    fail_at: u32,
}

#[cfg(feature = "integration-tests")]
impl TurntableFlow for FailingFlow {
    async fn on_animation_frame(&mut self, model: Model, tick: FrameTick) -> anyhow::Result<Model> {
        if tick.frame == self.fail_at {
            anyhow::bail!("hook gave up on frame {}", tick.frame);
        }
        Ok(model)
    }
}

#[tokio::test]
#[cfg(feature = "integration-tests")]
async fn hook_failure_mid_animation_removes_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("partial.gif");
    let options = RenderOptions {
        fps: 10,
        duration: 1.0,
        ..Default::default()
    };

    let mut turntable = Turntable::new("cube", &out, TextureSources::new(), 8, 8, options, FailingFlow { fail_at: 3 })
        .unwrap()
        .with_model(cube_model(&["Front"]));
    let err = turntable.run().await.unwrap_err();
    assert!(matches!(err, TurntableError::Hook(_)), "{err:?}");
    // The hook after the third frame (index 2) failed.
    assert_eq!(turntable.phase(), Phase::Rendering(2));
    assert!(!out.exists());
    assert!(!tmp_path(&out).exists());
}

#[tokio::test]
async fn invalid_options_are_rejected_up_front() {
    let options = RenderOptions {
        quality: 0,
        ..Default::default()
    };
    let result = Turntable::new("cube.gltf", "out.gif", TextureSources::new(), 8, 8, options, RecordingFlow::new());
    assert!(matches!(result, Err(TurntableError::Options(_))));
}
