//! Backend descriptors to wgpu types.

use std::num::NonZeroU64;

use crate::backend::traits::*;
use crate::backend::types::*;

impl From<TextureFormat> for wgpu::TextureFormat {
    fn from(format: TextureFormat) -> Self {
        match format {
            TextureFormat::Rgba8Unorm => Self::Rgba8Unorm,
            TextureFormat::Rgba8UnormSrgb => Self::Rgba8UnormSrgb,
            TextureFormat::Bgra8Unorm => Self::Bgra8Unorm,
            TextureFormat::Bgra8UnormSrgb => Self::Bgra8UnormSrgb,
            TextureFormat::Rgba16Float => Self::Rgba16Float,
            TextureFormat::Rgba32Float => Self::Rgba32Float,
            TextureFormat::Depth32Float => Self::Depth32Float,
        }
    }
}

/// The surface's format as the renderer sees it. Surfaces only ever offer
/// 8-bit color or half floats, anything exotic is treated as BGRA.
pub(super) fn surface_format(format: wgpu::TextureFormat) -> TextureFormat {
    match format {
        wgpu::TextureFormat::Rgba8Unorm => TextureFormat::Rgba8Unorm,
        wgpu::TextureFormat::Rgba8UnormSrgb => TextureFormat::Rgba8UnormSrgb,
        wgpu::TextureFormat::Bgra8UnormSrgb => TextureFormat::Bgra8UnormSrgb,
        wgpu::TextureFormat::Rgba16Float => TextureFormat::Rgba16Float,
        _ => TextureFormat::Bgra8Unorm,
    }
}

const BUFFER_USAGES: [(BufferUsage, wgpu::BufferUsages); 4] = [
    (BufferUsage::COPY_DST, wgpu::BufferUsages::COPY_DST),
    (BufferUsage::INDEX, wgpu::BufferUsages::INDEX),
    (BufferUsage::VERTEX, wgpu::BufferUsages::VERTEX),
    (BufferUsage::UNIFORM, wgpu::BufferUsages::UNIFORM),
];

const TEXTURE_USAGES: [(TextureUsage, wgpu::TextureUsages); 4] = [
    (TextureUsage::COPY_SRC, wgpu::TextureUsages::COPY_SRC),
    (TextureUsage::COPY_DST, wgpu::TextureUsages::COPY_DST),
    (TextureUsage::TEXTURE_BINDING, wgpu::TextureUsages::TEXTURE_BINDING),
    (TextureUsage::RENDER_ATTACHMENT, wgpu::TextureUsages::RENDER_ATTACHMENT),
];

const SHADER_STAGES: [(ShaderStageFlags, wgpu::ShaderStages); 2] = [
    (ShaderStageFlags::VERTEX, wgpu::ShaderStages::VERTEX),
    (ShaderStageFlags::FRAGMENT, wgpu::ShaderStages::FRAGMENT),
];

impl From<BufferUsage> for wgpu::BufferUsages {
    fn from(usage: BufferUsage) -> Self {
        BUFFER_USAGES
            .iter()
            .filter(|(flag, _)| usage.contains(*flag))
            .fold(Self::empty(), |acc, (_, bits)| acc | *bits)
    }
}

impl From<TextureUsage> for wgpu::TextureUsages {
    fn from(usage: TextureUsage) -> Self {
        TEXTURE_USAGES
            .iter()
            .filter(|(flag, _)| usage.contains(*flag))
            .fold(Self::empty(), |acc, (_, bits)| acc | *bits)
    }
}

impl From<ShaderStageFlags> for wgpu::ShaderStages {
    fn from(stages: ShaderStageFlags) -> Self {
        SHADER_STAGES
            .iter()
            .filter(|(flag, _)| stages.contains(*flag))
            .fold(Self::empty(), |acc, (_, bits)| acc | *bits)
    }
}

impl From<ViewDimension> for wgpu::TextureViewDimension {
    fn from(dimension: ViewDimension) -> Self {
        match dimension {
            ViewDimension::D2 => Self::D2,
            ViewDimension::D2Array => Self::D2Array,
            ViewDimension::Cube => Self::Cube,
            ViewDimension::CubeArray => Self::CubeArray,
        }
    }
}

impl From<VertexFormat> for wgpu::VertexFormat {
    fn from(format: VertexFormat) -> Self {
        match format {
            VertexFormat::Float32 => Self::Float32,
            VertexFormat::Float32x2 => Self::Float32x2,
            VertexFormat::Float32x3 => Self::Float32x3,
            VertexFormat::Float32x4 => Self::Float32x4,
        }
    }
}

impl From<CompareFunction> for wgpu::CompareFunction {
    fn from(function: CompareFunction) -> Self {
        match function {
            CompareFunction::Less => Self::Less,
            CompareFunction::LessEqual => Self::LessEqual,
            CompareFunction::Always => Self::Always,
        }
    }
}

impl From<FilterMode> for wgpu::FilterMode {
    fn from(mode: FilterMode) -> Self {
        match mode {
            FilterMode::Nearest => Self::Nearest,
            FilterMode::Linear => Self::Linear,
        }
    }
}

impl From<AddressMode> for wgpu::AddressMode {
    fn from(mode: AddressMode) -> Self {
        match mode {
            AddressMode::ClampToEdge => Self::ClampToEdge,
            AddressMode::Repeat => Self::Repeat,
        }
    }
}

impl From<BlendFactor> for wgpu::BlendFactor {
    fn from(factor: BlendFactor) -> Self {
        match factor {
            BlendFactor::Zero => Self::Zero,
            BlendFactor::One => Self::One,
            BlendFactor::SrcAlpha => Self::SrcAlpha,
            BlendFactor::OneMinusSrcAlpha => Self::OneMinusSrcAlpha,
        }
    }
}

impl From<BlendState> for wgpu::BlendState {
    fn from(state: BlendState) -> Self {
        let component = |c: BlendComponent| wgpu::BlendComponent {
            src_factor: c.src_factor.into(),
            dst_factor: c.dst_factor.into(),
            operation: wgpu::BlendOperation::Add,
        };
        Self {
            color: component(state.color),
            alpha: component(state.alpha),
        }
    }
}

impl From<StoreOp> for wgpu::StoreOp {
    fn from(op: StoreOp) -> Self {
        match op {
            StoreOp::Store => Self::Store,
            StoreOp::Discard => Self::Discard,
        }
    }
}

pub(super) fn primitive(topology: PrimitiveTopology, cull_mode: CullMode) -> wgpu::PrimitiveState {
    wgpu::PrimitiveState {
        topology: match topology {
            PrimitiveTopology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
            PrimitiveTopology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        },
        front_face: wgpu::FrontFace::Ccw,
        cull_mode: match cull_mode {
            CullMode::None => None,
            CullMode::Front => Some(wgpu::Face::Front),
            CullMode::Back => Some(wgpu::Face::Back),
        },
        ..Default::default()
    }
}

pub(super) fn color_load(op: LoadOp) -> wgpu::LoadOp<wgpu::Color> {
    match op {
        LoadOp::Clear([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
            r: r.into(),
            g: g.into(),
            b: b.into(),
            a: a.into(),
        }),
        LoadOp::Load => wgpu::LoadOp::Load,
    }
}

pub(super) fn depth_load(op: LoadOp, clear_value: f32) -> wgpu::LoadOp<f32> {
    match op {
        LoadOp::Clear(_) => wgpu::LoadOp::Clear(clear_value),
        LoadOp::Load => wgpu::LoadOp::Load,
    }
}

pub(super) fn color_target(target: &ColorTargetState) -> Option<wgpu::ColorTargetState> {
    Some(wgpu::ColorTargetState {
        format: target.format.into(),
        blend: target.blend.map(Into::into),
        write_mask: if target.write_enabled {
            wgpu::ColorWrites::ALL
        } else {
            wgpu::ColorWrites::empty()
        },
    })
}

pub(super) fn depth_stencil(state: &DepthStencilState) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: state.format.into(),
        depth_write_enabled: state.depth_write_enabled,
        depth_compare: state.depth_compare.into(),
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

pub(super) fn vertex_attributes(layout: &VertexBufferLayout) -> Vec<wgpu::VertexAttribute> {
    layout
        .attributes
        .iter()
        .map(|attribute| wgpu::VertexAttribute {
            format: attribute.format.into(),
            offset: attribute.offset,
            shader_location: attribute.location,
        })
        .collect()
}

pub(super) fn layout_entry(entry: &BindGroupLayoutEntry) -> wgpu::BindGroupLayoutEntry {
    let ty = match entry.ty {
        BindingType::UniformBuffer {
            dynamic_offset,
            min_binding_size,
        } => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: dynamic_offset,
            min_binding_size: min_binding_size.and_then(NonZeroU64::new),
        },
        BindingType::Texture {
            sample_type,
            dimension,
        } => wgpu::BindingType::Texture {
            sample_type: match sample_type {
                TextureSampleType::Float { filterable } => wgpu::TextureSampleType::Float { filterable },
                TextureSampleType::Depth => wgpu::TextureSampleType::Depth,
                TextureSampleType::Sint => wgpu::TextureSampleType::Sint,
                TextureSampleType::Uint => wgpu::TextureSampleType::Uint,
            },
            view_dimension: dimension.into(),
            multisampled: false,
        },
        BindingType::Sampler { comparison: true } => {
            wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison)
        }
        BindingType::Sampler { comparison: false } => {
            wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
        }
    };
    wgpu::BindGroupLayoutEntry {
        binding: entry.binding,
        visibility: entry.visibility.into(),
        ty,
        count: None,
    }
}

pub(super) fn buffer_size(size: Option<u64>) -> Option<wgpu::BufferSize> {
    size.and_then(NonZeroU64::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_flags_translate_bit_by_bit() {
        let usage = TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING;
        assert_eq!(
            wgpu::TextureUsages::from(usage),
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING
        );
        assert_eq!(
            wgpu::BufferUsages::from(BufferUsage::UNIFORM | BufferUsage::COPY_DST),
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST
        );
        assert_eq!(wgpu::ShaderStages::from(ShaderStageFlags::empty()), wgpu::ShaderStages::NONE);
    }

    #[test]
    fn test_surface_format_round_trips_known_formats() {
        for format in [
            TextureFormat::Rgba8Unorm,
            TextureFormat::Bgra8Unorm,
            TextureFormat::Bgra8UnormSrgb,
        ] {
            assert_eq!(surface_format(format.into()), format);
        }
    }

    #[test]
    fn test_depth_clear_uses_attachment_value() {
        assert_eq!(depth_load(LoadOp::Clear([0.0; 4]), 1.0), wgpu::LoadOp::Clear(1.0));
    }
}
