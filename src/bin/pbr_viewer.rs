//! Interactive viewer for the deferred renderer.
//!
//! ```bash
//! # Skybox from six face images
//! pbr-viewer --skybox res/cubemaps/mountainlake
//!
//! # Equirectangular HDR environment, four point lights
//! pbr-viewer --hdr res/hdr/newport_loft.hdr --point-lights 4
//!
//! # No window: render three frames into the recording backend and report
//! pbr-viewer --headless --max-frames 3
//! ```

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use glam::Vec3;
use winit::event_loop::EventLoop;

use deferred_renderer::scene::demo::{self, DemoConfig, Environment};
use deferred_renderer::scene::{CameraInput, FreeCamera};
use deferred_renderer::{
    window, GpuContext, GraphicsBackend, RecordingBackend, RenderResult, Renderer, Scene, ViewerConfig,
    WgpuBackend, Window,
};

#[derive(Parser, Debug)]
#[command(name = "pbr-viewer", about = "Deferred PBR renderer viewer", version)]
struct Args {
    #[arg(long, default_value = "1280")]
    width: u32,

    #[arg(long, default_value = "720")]
    height: u32,

    #[arg(long)]
    no_vsync: bool,

    /// Equirectangular .hdr environment
    #[arg(long, conflicts_with = "skybox")]
    hdr: Option<PathBuf>,

    /// Directory holding right/left/top/bottom/front/back.jpg
    #[arg(long)]
    skybox: Option<PathBuf>,

    /// Asset root holding textures/ and cubemaps/
    #[arg(long, default_value = "res")]
    assets: PathBuf,

    #[arg(long, default_value = "1.0")]
    exposure: f32,

    /// Override the directional light's shadow far plane
    #[arg(long)]
    shadow_far_plane: Option<f32>,

    #[arg(long)]
    no_ibl: bool,

    #[arg(long)]
    no_bloom: bool,

    #[arg(long, default_value = "2")]
    point_lights: usize,

    /// Exit after this many frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Render into the recording backend instead of a window
    #[arg(long)]
    headless: bool,

    /// Log filter, same syntax as RUST_LOG
    #[arg(long)]
    log: Option<String>,
}

impl Args {
    fn environment(&self) -> Environment {
        match (&self.hdr, &self.skybox) {
            (Some(hdr), _) => Environment::Hdr(hdr.clone()),
            (None, Some(dir)) => Environment::Skybox(dir.clone()),
            (None, None) => Environment::Skybox(self.assets.join("cubemaps/mountainlake")),
        }
    }

    /// Every window, renderer and runtime knob taken from the command line.
    fn viewer_config(&self) -> ViewerConfig {
        let mut config = ViewerConfig {
            vsync: !self.no_vsync,
            ..Default::default()
        };
        let renderer = &mut config.renderer;
        renderer.width = self.width;
        renderer.height = self.height;
        renderer.point_lights = self.point_lights;
        renderer.settings.exposure = self.exposure;
        renderer.settings.shadow_far_plane = self.shadow_far_plane;
        renderer.settings.ibl_enabled = !self.no_ibl;
        renderer.settings.bloom_enabled = !self.no_bloom;
        config
    }

    fn demo_config(&self) -> DemoConfig {
        DemoConfig {
            assets: self.assets.clone(),
            environment: self.environment(),
            point_lights: self.point_lights,
        }
    }
}

struct Viewer<B: GraphicsBackend> {
    ctx: GpuContext<B>,
    renderer: Renderer,
    scene: Scene,
    camera: FreeCamera,
    frames: u64,
}

impl<B: GraphicsBackend> Viewer<B> {
    fn new(backend: B, config: &ViewerConfig, demo_config: &DemoConfig) -> RenderResult<Self> {
        let config = config.renderer.clone();
        let mut ctx = GpuContext::with_ring_capacity(backend, config.ring_capacity)?;
        let mut scene = demo::build(&mut ctx, demo_config)?;

        let mut renderer = Renderer::new(&mut ctx, config)?;
        if renderer.settings().ibl_enabled {
            if let Err(e) = renderer.precompute_ibl(&mut ctx, &mut scene.cubemap) {
                log::error!("Image-based lighting unavailable: {}", e);
                renderer.settings_mut().ibl_enabled = false;
            }
        }

        Ok(Self {
            ctx,
            renderer,
            scene,
            camera: FreeCamera::new(Vec3::new(0.0, 1.5, 4.0)),
            frames: 0,
        })
    }

    fn frame(&mut self, input: &CameraInput, dt: f32) -> RenderResult<()> {
        self.camera.update(input, dt);
        let camera = self.camera.state();
        self.renderer.begin_draw(&mut self.ctx, &self.scene, &camera)?;
        self.frames += 1;
        Ok(())
    }
}

fn run_headless(args: &Args) -> Result<(), Box<dyn Error>> {
    let backend = RecordingBackend::new(args.width, args.height);
    let mut viewer = Viewer::new(backend, &args.viewer_config(), &args.demo_config())?;
    let input = CameraInput::new();
    for _ in 0..args.max_frames.unwrap_or(1) {
        viewer.frame(&input, 1.0 / 60.0)?;
        let stats = viewer.ctx.stats();
        log::info!(
            "Frame {}: {} passes, {} draws, {} copies",
            viewer.frames,
            stats.passes.len(),
            stats.total_draws(),
            stats.copies
        );
    }
    Ok(())
}

fn run_windowed(args: Args) -> Result<(), Box<dyn Error>> {
    let config = args.viewer_config();
    let event_loop = EventLoop::new()?;
    let window = Window::new(&event_loop, &config.title, args.width, args.height)?;
    let backend = WgpuBackend::new(window.handle(), config.vsync)?;
    let mut viewer = Viewer::new(backend, &config, &args.demo_config())?;
    let max_frames = args.max_frames;

    window::run(event_loop, window, move |window, dt| {
        if let Some((width, height)) = window.take_resize() {
            if let Err(e) = viewer.renderer.resize(&mut viewer.ctx, width, height) {
                log::error!("Resize failed: {}", e);
            }
        }
        if let Err(e) = viewer.frame(window.input(), dt) {
            log::error!("Frame failed: {}", e);
            window.close();
        }
        if max_frames.is_some_and(|max| viewer.frames >= max) {
            window.close();
        }
    })?;
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let filter = args.log.clone().unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let result = if args.headless {
        run_headless(&args)
    } else {
        run_windowed(args)
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
