//! Plain-data descriptors passed across the [`GraphicsBackend`](super::GraphicsBackend) boundary.
//!
//! Only the formats and states the renderer actually asks for are modelled.
//! Each backend translates them to its own API.

/// Declares a small bit-set newtype with named flags.
macro_rules! flag_set {
    ($(#[$meta:meta])* $name:ident { $($flag:ident = $bit:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(u32);

        impl $name {
            $(pub const $flag: Self = Self(1 << $bit);)+

            pub const fn empty() -> Self {
                Self(0)
            }

            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl std::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }
    };
}

pub(crate) use flag_set;

// ============================================================================
// Formats
// ============================================================================

/// Texel formats used by the render targets, material maps and environment maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    /// Every intermediate HDR and G-buffer attachment
    Rgba16Float,
    Rgba32Float,
    Depth32Float,
}

impl TextureFormat {
    pub const fn is_depth(self) -> bool {
        matches!(self, Self::Depth32Float)
    }

    pub const fn is_srgb(self) -> bool {
        matches!(self, Self::Rgba8UnormSrgb | Self::Bgra8UnormSrgb)
    }

    /// 32-bit float color can't go through a filtering sampler on baseline hardware.
    pub const fn is_filterable(self) -> bool {
        !matches!(self, Self::Rgba32Float)
    }

    /// Same memory layout, decoded from sRGB on read and encoded on write.
    pub const fn srgb_variant(self) -> Option<Self> {
        match self {
            Self::Rgba8Unorm | Self::Rgba8UnormSrgb => Some(Self::Rgba8UnormSrgb),
            Self::Bgra8Unorm | Self::Bgra8UnormSrgb => Some(Self::Bgra8UnormSrgb),
            Self::Rgba16Float | Self::Rgba32Float | Self::Depth32Float => None,
        }
    }

    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::Rgba32Float => 16,
            Self::Rgba16Float => 8,
            _ => 4,
        }
    }
}

/// Float vertex attribute widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
}

impl VertexFormat {
    const BY_WIDTH: [Self; 4] = [Self::Float32, Self::Float32x2, Self::Float32x3, Self::Float32x4];

    pub fn components(self) -> u32 {
        match self {
            Self::Float32 => 1,
            Self::Float32x2 => 2,
            Self::Float32x3 => 3,
            Self::Float32x4 => 4,
        }
    }

    pub fn size(self) -> u64 {
        self.components() as u64 * 4
    }

    pub fn from_width(width: u32) -> Option<Self> {
        let index = (width as usize).checked_sub(1)?;
        Self::BY_WIDTH.get(index).copied()
    }
}

// ============================================================================
// Buffers and textures
// ============================================================================

flag_set! {
    /// What a buffer may be bound as.
    BufferUsage { COPY_DST = 0, INDEX = 1, VERTEX = 2, UNIFORM = 3 }
}

flag_set! {
    /// What a texture may be bound as.
    TextureUsage { COPY_SRC = 0, COPY_DST = 1, TEXTURE_BINDING = 2, RENDER_ATTACHMENT = 3 }
}

#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    pub size: u64,
    pub usage: BufferUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    D2,
    /// Layers come in groups of six faces, one group per cube
    Cube,
}

#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub mip_levels: u32,
    pub kind: TextureKind,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl Default for TextureDescriptor {
    /// A sampled 1x1 RGBA8 texture that can be uploaded to.
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            layers: 1,
            mip_levels: 1,
            kind: TextureKind::D2,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        }
    }
}

impl TextureDescriptor {
    /// The view dimension a default view of this texture gets.
    pub fn natural_dimension(&self) -> ViewDimension {
        match (self.kind, self.layers) {
            (TextureKind::D2, 0 | 1) => ViewDimension::D2,
            (TextureKind::D2, _) => ViewDimension::D2Array,
            (TextureKind::Cube, 0..=6) => ViewDimension::Cube,
            (TextureKind::Cube, _) => ViewDimension::CubeArray,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewDimension {
    D2,
    D2Array,
    Cube,
    CubeArray,
}

/// Subresource range and dimension of a texture view.
///
/// `None` counts extend to the end of the texture and a `None` dimension
/// means [`TextureDescriptor::natural_dimension`].
#[derive(Debug, Clone, Default)]
pub struct TextureViewDescriptor {
    pub label: Option<String>,
    pub dimension: Option<ViewDimension>,
    pub base_mip_level: u32,
    pub mip_level_count: Option<u32>,
    pub base_array_layer: u32,
    pub array_layer_count: Option<u32>,
}

impl TextureViewDescriptor {
    /// One layer of one mip as a plain 2D view, for rendering into a cube face.
    pub fn face(layer: u32, mip: u32) -> Self {
        Self {
            dimension: Some(ViewDimension::D2),
            base_mip_level: mip,
            mip_level_count: Some(1),
            base_array_layer: layer,
            array_layer_count: Some(1),
            ..Default::default()
        }
    }
}

/// Destination of a tightly packed texel upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureRegion {
    pub mip_level: u32,
    pub layer: u32,
    pub width: u32,
    pub height: u32,
}

// ============================================================================
// Fixed-function state
// ============================================================================

/// One attribute inside a vertex buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u64,
}

/// A per-vertex buffer binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexBufferLayout {
    pub array_stride: u64,
    pub attributes: Vec<VertexAttribute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    TriangleList,
    TriangleStrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Less,
    LessEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
}

/// `src * src_factor + dst * dst_factor`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendComponent {
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
}

impl BlendComponent {
    pub const REPLACE: Self = Self {
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::Zero,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub color: BlendComponent,
    pub alpha: BlendComponent,
}

impl BlendState {
    pub const ALPHA_BLENDING: Self = Self {
        color: BlendComponent {
            src_factor: BlendFactor::SrcAlpha,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
        },
        alpha: BlendComponent {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
        },
    };

    pub const ADDITIVE: Self = Self {
        color: BlendComponent {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::One,
        },
        alpha: BlendComponent::REPLACE,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    ClampToEdge,
    Repeat,
}

/// Samplers filter and wrap the same way along every axis and mip chain.
#[derive(Debug, Clone)]
pub struct SamplerDescriptor {
    pub label: Option<String>,
    pub filter: FilterMode,
    pub address_mode: AddressMode,
    /// Depth comparison, for shadow map lookups
    pub compare: Option<CompareFunction>,
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            filter: FilterMode::Linear,
            address_mode: AddressMode::ClampToEdge,
            compare: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, None)]
    #[case(1, Some(VertexFormat::Float32))]
    #[case(3, Some(VertexFormat::Float32x3))]
    #[case(4, Some(VertexFormat::Float32x4))]
    #[case(5, None)]
    fn test_vertex_format_from_width(#[case] width: u32, #[case] expected: Option<VertexFormat>) {
        assert_eq!(VertexFormat::from_width(width), expected);
        if let Some(format) = expected {
            assert_eq!(format.size(), width as u64 * 4);
        }
    }

    #[test]
    fn test_usage_flags_combine() {
        let usage = TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING;
        assert!(usage.contains(TextureUsage::RENDER_ATTACHMENT));
        assert!(!usage.contains(TextureUsage::COPY_DST));
        assert!(!usage.contains(TextureUsage::COPY_DST | TextureUsage::TEXTURE_BINDING));
        assert!(BufferUsage::empty().is_empty());
    }

    #[rstest]
    #[case(TextureKind::D2, 1, ViewDimension::D2)]
    #[case(TextureKind::D2, 4, ViewDimension::D2Array)]
    #[case(TextureKind::Cube, 6, ViewDimension::Cube)]
    #[case(TextureKind::Cube, 24, ViewDimension::CubeArray)]
    fn test_natural_dimension(#[case] kind: TextureKind, #[case] layers: u32, #[case] expected: ViewDimension) {
        let desc = TextureDescriptor {
            kind,
            layers,
            ..Default::default()
        };
        assert_eq!(desc.natural_dimension(), expected);
    }

    #[test]
    fn test_only_unorm_color_has_srgb_variant() {
        assert_eq!(TextureFormat::Bgra8Unorm.srgb_variant(), Some(TextureFormat::Bgra8UnormSrgb));
        assert_eq!(TextureFormat::Rgba16Float.srgb_variant(), None);
        assert_eq!(TextureFormat::Depth32Float.srgb_variant(), None);
    }
}
