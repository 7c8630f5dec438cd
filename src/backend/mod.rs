//! Backend abstraction layer
//!
//! Provides common traits and types implemented by the wgpu backend and by the
//! recording backend used for headless runs and tests.

pub mod recording;
pub mod traits;
pub mod types;
pub mod wgpu_backend;

pub use recording::RecordingBackend;
pub use traits::*;
pub use types::*;
pub use wgpu_backend::WgpuBackend;
