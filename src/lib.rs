//! Deferred Renderer - a physically based deferred renderer on wgpu
//!
//! Every frame goes through a fixed sequence of passes:
//! - Directional and point light shadow maps
//! - G-buffer geometry pass and a fullscreen PBR lighting pass
//! - Image-based lighting from a precomputed environment (irradiance, prefiltered
//!   specular and a BRDF lookup table)
//! - Skybox, bloom and exposure tone mapping
//!
//! Passes are written against [`GpuContext`], a small stateful layer over a
//! [`GraphicsBackend`]. [`WgpuBackend`] draws to a window; [`RecordingBackend`]
//! records commands instead, for headless runs and tests.

pub mod backend;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod render_graph;
pub mod resources;
pub mod scene;
pub mod shader;
pub mod window;

pub use backend::{GraphicsBackend, RecordingBackend, WgpuBackend};
pub use context::GpuContext;
pub use error::{RenderError, RenderResult, ShaderError};
pub use pipeline::{IblConfig, RenderSettings, Renderer, RendererConfig};
pub use scene::{CameraState, Scene};
pub use window::Window;

/// Configuration of the viewer window
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    /// Window title
    pub title: String,
    /// Enable vsync
    pub vsync: bool,
    pub renderer: RendererConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            title: "PBR Viewer".to_string(),
            vsync: true,
            renderer: RendererConfig::default(),
        }
    }
}
