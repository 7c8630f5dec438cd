//! The [`GraphicsBackend`] trait and the handle and binding types it speaks.
//!
//! Resources live inside the backend and are referred to by opaque ids. Render
//! passes are opened and closed explicitly, and state set between the two
//! applies to the draws that follow it in the same pass.

use std::ops::Range;

use thiserror::Error;

use crate::backend::types::{flag_set, *};

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("No usable GPU adapter: {0}")]
    NoAdapter(String),
    #[error("Surface error: {0}")]
    Surface(String),
    #[error("Device request failed: {0}")]
    Device(String),
    #[error("Surface lost")]
    SurfaceLost,
    #[error("Out of GPU memory")]
    OutOfMemory,
    #[error("Invalid {kind} {label:?}: {reason}")]
    InvalidDescriptor {
        kind: &'static str,
        label: Option<String>,
        reason: String,
    },
    #[error("Unknown {kind} handle {id}")]
    UnknownHandle { kind: &'static str, id: u64 },
}

pub type BackendResult<T> = Result<T, BackendError>;

macro_rules! handles {
    ($($(#[$meta:meta])* $name:ident),+ $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub(crate) u64);

            impl $name {
                pub fn id(self) -> u64 {
                    self.0
                }
            }
        )+
    };
}

handles! {
    BufferHandle,
    TextureHandle,
    /// Views die with the texture they were created from.
    TextureViewHandle,
    SamplerHandle,
    BindGroupLayoutHandle,
    BindGroupHandle,
    RenderPipelineHandle,
}

// ============================================================================
// Bindings
// ============================================================================

flag_set! {
    /// Stages a binding is visible to.
    ShaderStageFlags { VERTEX = 0, FRAGMENT = 1 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSampleType {
    Float { filterable: bool },
    Depth,
    Sint,
    Uint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingType {
    UniformBuffer {
        /// Offset supplied at `set_bind_group` time
        dynamic_offset: bool,
        min_binding_size: Option<u64>,
    },
    Texture {
        sample_type: TextureSampleType,
        dimension: ViewDimension,
    },
    Sampler {
        comparison: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindGroupLayoutEntry {
    pub binding: u32,
    pub visibility: ShaderStageFlags,
    pub ty: BindingType,
}

/// The resource bound at one binding slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindGroupEntry {
    Buffer {
        buffer: BufferHandle,
        offset: u64,
        size: Option<u64>,
    },
    Texture(TextureViewHandle),
    Sampler(SamplerHandle),
}

// ============================================================================
// Pipelines
// ============================================================================

/// WGSL source for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderStageSource {
    pub label: Option<String>,
    pub source: String,
    pub entry_point: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub format: TextureFormat,
    pub depth_write_enabled: bool,
    pub depth_compare: CompareFunction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorTargetState {
    pub format: TextureFormat,
    pub blend: Option<BlendState>,
    /// Targets the fragment stage doesn't write keep their contents.
    pub write_enabled: bool,
}

/// Triangles are wound counter-clockwise.
#[derive(Debug, Clone)]
pub struct RenderPipelineDescriptor {
    pub label: Option<String>,
    pub vertex: ShaderStageSource,
    pub fragment: Option<ShaderStageSource>,
    pub vertex_layouts: Vec<VertexBufferLayout>,
    pub bind_group_layouts: Vec<BindGroupLayoutHandle>,
    pub primitive_topology: PrimitiveTopology,
    pub cull_mode: CullMode,
    pub depth_stencil: Option<DepthStencilState>,
    pub color_targets: Vec<ColorTargetState>,
}

// ============================================================================
// Passes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp {
    /// RGBA clear color; depth attachments take their clear value from the attachment
    Clear([f32; 4]),
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    Discard,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorAttachment {
    pub view: TextureViewHandle,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepthStencilAttachment {
    pub view: TextureViewHandle,
    pub depth_load_op: LoadOp,
    pub depth_store_op: StoreOp,
    pub depth_clear_value: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassDescriptor {
    pub label: Option<String>,
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_stencil_attachment: Option<DepthStencilAttachment>,
}

/// The presentable image of the frame in flight.
///
/// Both views alias the same image. Writing through the sRGB one encodes
/// linear values on store.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    pub swapchain_view: TextureViewHandle,
    pub swapchain_srgb_view: TextureViewHandle,
    pub width: u32,
    pub height: u32,
}

// ============================================================================
// Backend
// ============================================================================

pub trait GraphicsBackend {
    // Surface

    /// Zero-sized requests are ignored.
    fn resize(&mut self, width: u32, height: u32);

    /// The configured surface size, which may be smaller than requested.
    fn surface_size(&self) -> (u32, u32);

    fn swapchain_format(&self) -> TextureFormat;

    fn begin_frame(&mut self) -> BackendResult<FrameContext>;

    /// Close any open pass, submit and present.
    fn end_frame(&mut self) -> BackendResult<()>;

    // Resources

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle>;

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]);

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    fn create_texture_view(
        &mut self,
        texture: TextureHandle,
        desc: &TextureViewDescriptor,
    ) -> BackendResult<TextureViewHandle>;

    /// Upload tightly packed rows to one layer of one mip.
    fn write_texture(&mut self, texture: TextureHandle, region: TextureRegion, data: &[u8]);

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle>;

    fn create_bind_group_layout(&mut self, entries: &[BindGroupLayoutEntry]) -> BackendResult<BindGroupLayoutHandle>;

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle>;

    fn create_render_pipeline(&mut self, desc: &RenderPipelineDescriptor) -> BackendResult<RenderPipelineHandle>;

    fn destroy_buffer(&mut self, buffer: BufferHandle);

    fn destroy_texture(&mut self, texture: TextureHandle);

    // Commands

    /// Opening a pass closes the previous one.
    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor);

    fn end_render_pass(&mut self);

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle);

    /// `dynamic_offsets` are given in binding order.
    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle, dynamic_offsets: &[u32]);

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64);

    /// Indices are always 32-bit.
    fn set_index_buffer(&mut self, buffer: BufferHandle, offset: u64);

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>);

    /// Copy mip 0, layer 0 between two textures of the same format. Closes any open pass.
    fn copy_texture_to_texture(&mut self, source: TextureHandle, destination: TextureHandle, width: u32, height: u32);

    /// Submit recorded work without presenting.
    fn submit(&mut self);
}

// ============================================================================
// Validation shared by every backend
// ============================================================================

pub(crate) fn validate_buffer(desc: &BufferDescriptor) -> BackendResult<()> {
    if desc.size == 0 {
        return Err(invalid("buffer", &desc.label, "zero size".into()));
    }
    Ok(())
}

pub(crate) fn validate_texture(desc: &TextureDescriptor) -> BackendResult<()> {
    if desc.width == 0 || desc.height == 0 {
        return Err(invalid("texture", &desc.label, format!("extent {}x{}", desc.width, desc.height)));
    }
    if desc.kind == TextureKind::Cube && (desc.layers == 0 || desc.layers % 6 != 0) {
        return Err(invalid(
            "texture",
            &desc.label,
            format!("cube texture with {} layers", desc.layers),
        ));
    }
    Ok(())
}

/// Resolve the mip and layer counts a view covers, rejecting ranges outside the texture.
pub(crate) fn resolve_view_range(
    texture: &TextureDescriptor,
    view: &TextureViewDescriptor,
) -> BackendResult<(Range<u32>, Range<u32>)> {
    let mips = view.base_mip_level
        ..view.base_mip_level
            + view
                .mip_level_count
                .unwrap_or_else(|| texture.mip_levels.saturating_sub(view.base_mip_level));
    let layers = view.base_array_layer
        ..view.base_array_layer
            + view
                .array_layer_count
                .unwrap_or_else(|| texture.layers.saturating_sub(view.base_array_layer));
    if mips.is_empty() || mips.end > texture.mip_levels || layers.is_empty() || layers.end > texture.layers {
        return Err(invalid(
            "texture view",
            &texture.label,
            format!("mips {mips:?} of {}, layers {layers:?} of {}", texture.mip_levels, texture.layers),
        ));
    }
    Ok((mips, layers))
}

fn invalid(kind: &'static str, label: &Option<String>, reason: String) -> BackendError {
    BackendError::InvalidDescriptor {
        kind,
        label: label.clone(),
        reason,
    }
}
