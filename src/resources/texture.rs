//! Textures: image loading, render targets, cube maps.

use std::path::Path;

use half::f16;

use crate::backend::*;
use crate::context::{GpuContext, SampledView, Sampling};
use crate::error::{RenderError, RenderResult};
use crate::resources::handle::Owned;

/// Number of mip levels of a full chain for a `size` x `size` texture.
pub fn mip_count(size: u32) -> u32 {
    32 - size.max(1).leading_zeros()
}

/// Edge length of mip `level` of a texture with base size `size`.
pub fn mip_size(size: u32, level: u32) -> u32 {
    (size >> level).max(1)
}

/// Decoded image, ready for upload.
#[derive(Debug, Clone)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub data: Vec<u8>,
}

impl TextureData {
    /// Load an 8-bit image, expanded to RGBA.
    pub fn from_file<P: AsRef<Path>>(path: P, srgb: bool) -> RenderResult<Self> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|source| RenderError::Asset {
            path: path.to_path_buf(),
            source,
        })?;
        let rgba = image.to_rgba8();
        Ok(Self {
            width: rgba.width(),
            height: rgba.height(),
            format: if srgb {
                TextureFormat::Rgba8UnormSrgb
            } else {
                TextureFormat::Rgba8Unorm
            },
            data: rgba.into_raw(),
        })
    }

    /// Load a high dynamic range image into half floats.
    pub fn from_hdr_file<P: AsRef<Path>>(path: P) -> RenderResult<Self> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|source| RenderError::Asset {
            path: path.to_path_buf(),
            source,
        })?;
        let rgba = image.to_rgba32f();
        let (width, height) = rgba.dimensions();
        let texels: Vec<f16> = rgba.into_raw().into_iter().map(f16::from_f32).collect();
        Ok(Self {
            width,
            height,
            format: TextureFormat::Rgba16Float,
            data: bytemuck::cast_slice(&texels).to_vec(),
        })
    }

    pub fn solid(color: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8Unorm,
            data: color.to_vec(),
        }
    }
}

/// A texture with its default view and, for render targets with several
/// layers or mips, one 2D view per (layer, mip). Textures with a mip chain
/// also keep one sampled view per mip.
pub struct Texture {
    label: String,
    texture: Owned<TextureHandle>,
    view: TextureViewHandle,
    face_views: Vec<TextureViewHandle>,
    mip_views: Vec<TextureViewHandle>,
    width: u32,
    height: u32,
    layers: u32,
    mip_levels: u32,
    format: TextureFormat,
    dimension: ViewDimension,
    sampling: Sampling,
}

impl Texture {
    pub fn new<B: GraphicsBackend>(
        ctx: &mut GpuContext<B>,
        desc: &TextureDescriptor,
        dimension: ViewDimension,
        sampling: Sampling,
    ) -> RenderResult<Self> {
        let label = desc.label.clone().unwrap_or_else(|| "texture".to_string());
        let texture = ctx.create_texture(desc)?;
        let view = ctx.create_view(
            texture.handle(),
            &TextureViewDescriptor {
                label: Some(label.clone()),
                dimension: Some(dimension),
                ..Default::default()
            },
        )?;

        let mut face_views = Vec::new();
        let attachable = desc.usage.contains(TextureUsage::RENDER_ATTACHMENT);
        if attachable && (desc.layers > 1 || desc.mip_levels > 1) {
            for layer in 0..desc.layers {
                for mip in 0..desc.mip_levels {
                    face_views.push(ctx.create_view(texture.handle(), &TextureViewDescriptor::face(layer, mip))?);
                }
            }
        }

        let mut mip_views = Vec::new();
        if desc.mip_levels > 1 {
            for mip in 0..desc.mip_levels {
                mip_views.push(ctx.create_view(
                    texture.handle(),
                    &TextureViewDescriptor {
                        label: Some(format!("{label} mip {mip}")),
                        dimension: Some(dimension),
                        base_mip_level: mip,
                        mip_level_count: Some(1),
                        ..Default::default()
                    },
                )?);
            }
        }

        Ok(Self {
            label,
            texture,
            view,
            face_views,
            mip_views,
            width: desc.width,
            height: desc.height,
            layers: desc.layers,
            mip_levels: desc.mip_levels,
            format: desc.format,
            dimension,
            sampling,
        })
    }

    /// A 2D texture that can be drawn into and sampled afterwards.
    pub fn render_target<B: GraphicsBackend>(
        ctx: &mut GpuContext<B>,
        label: &str,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> RenderResult<Self> {
        Self::new(
            ctx,
            &TextureDescriptor {
                label: Some(label.to_string()),
                width,
                height,
                format,
                usage: TextureUsage::RENDER_ATTACHMENT
                    | TextureUsage::TEXTURE_BINDING
                    | TextureUsage::COPY_SRC
                    | TextureUsage::COPY_DST,
                ..Default::default()
            },
            ViewDimension::D2,
            Sampling::default(),
        )
    }

    /// A sampleable 2D depth buffer.
    pub fn depth<B: GraphicsBackend>(
        ctx: &mut GpuContext<B>,
        label: &str,
        width: u32,
        height: u32,
    ) -> RenderResult<Self> {
        Self::render_target(ctx, label, width, height, TextureFormat::Depth32Float)
    }

    /// A cube render target with `mip_levels` levels.
    pub fn cube<B: GraphicsBackend>(
        ctx: &mut GpuContext<B>,
        label: &str,
        size: u32,
        mip_levels: u32,
        format: TextureFormat,
    ) -> RenderResult<Self> {
        Self::new(
            ctx,
            &TextureDescriptor {
                label: Some(label.to_string()),
                width: size,
                height: size,
                layers: 6,
                mip_levels,
                kind: TextureKind::Cube,
                format,
                usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
            },
            ViewDimension::Cube,
            Sampling::default(),
        )
    }

    /// `count` depth cubes in one array, face `f` of cube `c` at layer `6c + f`.
    pub fn depth_cube_array<B: GraphicsBackend>(
        ctx: &mut GpuContext<B>,
        label: &str,
        size: u32,
        count: u32,
    ) -> RenderResult<Self> {
        Self::new(
            ctx,
            &TextureDescriptor {
                label: Some(label.to_string()),
                width: size,
                height: size,
                layers: 6 * count.max(1),
                mip_levels: 1,
                kind: TextureKind::Cube,
                format: TextureFormat::Depth32Float,
                usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
            },
            ViewDimension::CubeArray,
            Sampling::default(),
        )
    }

    /// Upload decoded image data into a new 2D texture.
    pub fn from_data<B: GraphicsBackend>(
        ctx: &mut GpuContext<B>,
        label: &str,
        data: &TextureData,
        sampling: Sampling,
    ) -> RenderResult<Self> {
        let texture = Self::new(
            ctx,
            &TextureDescriptor {
                label: Some(label.to_string()),
                width: data.width,
                height: data.height,
                format: data.format,
                usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
                ..Default::default()
            },
            ViewDimension::D2,
            sampling,
        )?;
        texture.write_layer(ctx, 0, &data.data);
        Ok(texture)
    }

    /// Load an image file. On failure the error is logged and a black texture
    /// is returned in its place.
    pub fn load_or_black<B: GraphicsBackend, P: AsRef<Path>>(
        ctx: &mut GpuContext<B>,
        path: P,
        srgb: bool,
    ) -> RenderResult<Self> {
        let path = path.as_ref();
        let label = path.display().to_string();
        let data = match TextureData::from_file(path, srgb) {
            Ok(data) => {
                log::debug!("Loaded texture {} ({}x{})", label, data.width, data.height);
                data
            }
            Err(e) => {
                log::error!("{}", e);
                TextureData::solid([0, 0, 0, 255])
            }
        };
        Self::from_data(ctx, &label, &data, Sampling::repeat())
    }

    /// Write one whole layer of mip 0.
    pub fn write_layer<B: GraphicsBackend>(&self, ctx: &mut GpuContext<B>, layer: u32, data: &[u8]) {
        let region = TextureRegion {
            mip_level: 0,
            layer,
            width: self.width,
            height: self.height,
        };
        ctx.backend_mut().write_texture(self.texture.handle(), region, data);
    }

    /// The view shown to a texture unit.
    pub fn sampled(&self) -> SampledView {
        SampledView {
            view: self.view,
            format: self.format,
            dimension: self.dimension,
            sampling: self.sampling,
        }
    }

    pub fn bind<B: GraphicsBackend>(&self, ctx: &mut GpuContext<B>, unit: u32) {
        ctx.bind_texture_unit(unit, self.sampled());
    }

    /// A sampled view restricted to a single mip level.
    pub fn mip_view(&self, mip: u32) -> Option<SampledView> {
        if mip >= self.mip_levels {
            return None;
        }
        let view = self.mip_views.get(mip as usize).copied().unwrap_or(self.view);
        Some(SampledView { view, ..self.sampled() })
    }

    /// 2D view of one layer and mip, for use as an attachment.
    pub fn face_view(&self, layer: u32, mip: u32) -> Option<TextureViewHandle> {
        if layer >= self.layers || mip >= self.mip_levels {
            return None;
        }
        if self.face_views.is_empty() {
            return Some(self.view);
        }
        self.face_views.get((layer * self.mip_levels + mip) as usize).copied()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn handle(&self) -> TextureHandle {
        self.texture.handle()
    }

    pub fn view(&self) -> TextureViewHandle {
        self.view
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layers(&self) -> u32 {
        self.layers
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn dimension(&self) -> ViewDimension {
        self.dimension
    }

    pub fn sampling(&self) -> Sampling {
        self.sampling
    }

    pub fn set_sampling(&mut self, sampling: Sampling) {
        self.sampling = sampling;
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("label", &self.label)
            .field("handle", &self.texture.handle())
            .field("size", &(self.width, self.height))
            .field("layers", &self.layers)
            .field("mips", &self.mip_levels)
            .field("format", &self.format)
            .finish()
    }
}
