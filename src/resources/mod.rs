//! GPU resources
//!
//! Vertex buffers and their layouts, textures, render targets, meshes,
//! materials, models and environment cube maps.

pub mod buffer;
pub mod cubemap;
pub mod handle;
pub mod material;
pub mod mesh;
pub mod model;
pub mod render_target;
pub mod texture;
pub mod vertex_layout;

pub use buffer::GpuBuffer;
pub use cubemap::{Cubemap, CubemapPrograms, CubemapSource, CubemapStage};
pub use handle::{Owned, ReleaseQueue};
pub use material::{Material, MaterialParams};
pub use mesh::{Mesh, MeshData};
pub use model::Model;
pub use render_target::{BindKind, RenderTarget};
pub use texture::{Texture, TextureData};
pub use vertex_layout::{LayoutMode, VertexLayout};
