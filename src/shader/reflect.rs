//! WGSL compilation and resource reflection through naga.

use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{AddressSpace, Binding, Handle, ImageClass, ImageDimension, ScalarKind, Type, TypeInner, VectorSize};

use super::uniform::UniformType;
use super::ShaderStage;
use crate::backend::{TextureSampleType, ViewDimension};
use crate::error::ShaderError;

/// One member of a uniform block, flattened to a GLSL-style name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformField {
    /// `a`, `a.b`, `a[2]` or `a[2].b`
    pub name: String,
    pub offset: u32,
    pub ty: UniformType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReflectedKind {
    Uniform { size: u32, fields: Vec<UniformField> },
    Texture { sample_type: TextureSampleType, dimension: ViewDimension },
    Sampler { comparison: bool },
}

/// A resource binding statically used by an entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReflectedResource {
    pub group: u32,
    pub binding: u32,
    pub name: String,
    pub kind: ReflectedKind,
}

/// What a compiled stage needs from the pipeline.
#[derive(Debug, Clone)]
pub(crate) struct StageReflection {
    pub entry_point: String,
    pub resources: Vec<ReflectedResource>,
    /// Vertex input locations (vertex stage) or color output locations (fragment stage)
    pub locations: Vec<u32>,
}

/// Parse and validate `source`, then reflect the entry point for `stage`.
pub(crate) fn compile(path: &str, source: &str, stage: ShaderStage) -> Result<StageReflection, ShaderError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| ShaderError::Compile {
        path: path.to_string(),
        stage,
        message: e.emit_to_string(source),
    })?;

    let info = Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|e| ShaderError::Validation {
            path: path.to_string(),
            stage,
            message: e.to_string(),
        })?;

    let naga_stage = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };
    let (index, entry) = module
        .entry_points
        .iter()
        .enumerate()
        .find(|(_, entry)| entry.stage == naga_stage)
        .ok_or_else(|| ShaderError::MissingEntryPoint {
            path: path.to_string(),
            stage,
        })?;
    let usage = info.get_entry_point(index);

    let mut resources = Vec::new();
    for (handle, var) in module.global_variables.iter() {
        if usage[handle].is_empty() {
            continue;
        }
        let Some(binding) = &var.binding else {
            continue;
        };
        let name = var.name.clone().unwrap_or_default();
        let inner = &module.types[var.ty].inner;
        let kind = match (var.space, inner) {
            (AddressSpace::Uniform, _) => {
                let mut fields = Vec::new();
                let prefix = if matches!(inner, TypeInner::Struct { .. }) { "" } else { name.as_str() };
                flatten(&module, prefix, var.ty, 0, &mut fields);
                ReflectedKind::Uniform {
                    size: inner.size(module.to_ctx()),
                    fields,
                }
            }
            (AddressSpace::Handle, TypeInner::Image { dim, arrayed, class }) => {
                let dimension = match (dim, arrayed) {
                    (ImageDimension::D2, false) => ViewDimension::D2,
                    (ImageDimension::D2, true) => ViewDimension::D2Array,
                    (ImageDimension::Cube, false) => ViewDimension::Cube,
                    (ImageDimension::Cube, true) => ViewDimension::CubeArray,
                    _ => return Err(unsupported(path, stage, &name, "texture dimension")),
                };
                let sample_type = match class {
                    ImageClass::Sampled { kind: ScalarKind::Float, .. } => TextureSampleType::Float { filterable: true },
                    ImageClass::Sampled { kind: ScalarKind::Sint, .. } => TextureSampleType::Sint,
                    ImageClass::Sampled { kind: ScalarKind::Uint, .. } => TextureSampleType::Uint,
                    ImageClass::Depth { .. } => TextureSampleType::Depth,
                    _ => return Err(unsupported(path, stage, &name, "texture class")),
                };
                ReflectedKind::Texture { sample_type, dimension }
            }
            (AddressSpace::Handle, TypeInner::Sampler { comparison }) => ReflectedKind::Sampler {
                comparison: *comparison,
            },
            _ => return Err(unsupported(path, stage, &name, "resource type")),
        };
        resources.push(ReflectedResource {
            group: binding.group,
            binding: binding.binding,
            name,
            kind,
        });
    }

    let mut locations = Vec::new();
    match stage {
        ShaderStage::Vertex => {
            for argument in &entry.function.arguments {
                collect_locations(&module, argument.binding.as_ref(), argument.ty, &mut locations);
            }
        }
        ShaderStage::Fragment => {
            if let Some(result) = &entry.function.result {
                collect_locations(&module, result.binding.as_ref(), result.ty, &mut locations);
            }
        }
    }
    locations.sort_unstable();

    Ok(StageReflection {
        entry_point: entry.name.clone(),
        resources,
        locations,
    })
}

fn unsupported(path: &str, stage: ShaderStage, name: &str, what: &str) -> ShaderError {
    ShaderError::Validation {
        path: path.to_string(),
        stage,
        message: format!("`{name}`: unsupported {what}"),
    }
}

fn flatten(module: &naga::Module, prefix: &str, ty: Handle<Type>, offset: u32, out: &mut Vec<UniformField>) {
    let inner = &module.types[ty].inner;
    let aggregate = matches!(inner, TypeInner::Struct { .. } | TypeInner::Array { .. });
    // Aggregates are addressable as a whole, so they can be written as raw bytes.
    if aggregate && !prefix.is_empty() {
        out.push(UniformField {
            name: prefix.to_string(),
            offset,
            ty: UniformType::Other {
                size: inner.size(module.to_ctx()),
            },
        });
    }
    match inner {
        TypeInner::Struct { members, .. } => {
            for member in members {
                let name = member.name.as_deref().unwrap_or_default();
                let name = if prefix.is_empty() {
                    name.to_string()
                } else {
                    format!("{prefix}.{name}")
                };
                flatten(module, &name, member.ty, offset + member.offset, out);
            }
        }
        TypeInner::Array {
            base,
            size: naga::ArraySize::Constant(count),
            stride,
        } => {
            for i in 0..count.get() {
                flatten(module, &format!("{prefix}[{i}]"), *base, offset + i * stride, out);
            }
        }
        _ => out.push(UniformField {
            name: prefix.to_string(),
            offset,
            ty: uniform_type(module, inner),
        }),
    }
}

fn uniform_type(module: &naga::Module, inner: &TypeInner) -> UniformType {
    match *inner {
        TypeInner::Scalar(scalar) if scalar.width == 4 => match scalar.kind {
            ScalarKind::Float => UniformType::Float,
            ScalarKind::Sint => UniformType::Int,
            ScalarKind::Uint => UniformType::Uint,
            _ => UniformType::Other { size: 4 },
        },
        TypeInner::Vector { size, scalar } if scalar.kind == ScalarKind::Float && scalar.width == 4 => {
            match size {
                VectorSize::Bi => UniformType::Vec2,
                VectorSize::Tri => UniformType::Vec3,
                VectorSize::Quad => UniformType::Vec4,
            }
        }
        TypeInner::Matrix { columns, rows, scalar } if columns == rows && scalar.width == 4 => match columns {
            VectorSize::Bi => UniformType::Mat2,
            VectorSize::Tri => UniformType::Mat3,
            VectorSize::Quad => UniformType::Mat4,
        },
        _ => UniformType::Other {
            size: inner.size(module.to_ctx()),
        },
    }
}

fn collect_locations(module: &naga::Module, binding: Option<&Binding>, ty: Handle<Type>, out: &mut Vec<u32>) {
    match binding {
        Some(Binding::Location { location, .. }) => out.push(*location),
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(module, member.binding.as_ref(), member.ty, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIGHTS: &str = r#"
struct PointLight {
    position: vec4<f32>,
    color: vec4<f32>,
    intensity: f32,
    radius: f32,
}

struct Uniforms {
    model: mat4x4<f32>,
    normal_matrix: mat3x3<f32>,
    exposure: f32,
    lights: array<PointLight, 2>,
}

@group(0) @binding(0) var<uniform> u: Uniforms;
@group(0) @binding(1) var shadow_map: texture_depth_2d;
@group(0) @binding(2) var shadow_map_sampler: sampler_comparison;
@group(0) @binding(3) var unused_map: texture_2d<f32>;

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) color: vec4<f32>,
}

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(2) uv: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip = u.model * vec4<f32>(position, 1.0);
    out.color = u.lights[1].color * u.exposure + vec4<f32>(uv, u.normal_matrix[0].x, 0.0);
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let lit = textureSampleCompareLevel(shadow_map, shadow_map_sampler, in.color.xy, 0.5);
    return in.color * lit;
}
"#;

    fn field<'a>(resource: &'a ReflectedResource, name: &str) -> &'a UniformField {
        match &resource.kind {
            ReflectedKind::Uniform { fields, .. } => fields.iter().find(|f| f.name == name).unwrap(),
            other => panic!("not a uniform block: {other:?}"),
        }
    }

    #[test]
    fn test_uniform_block_is_flattened() {
        let vertex = compile("lights.wgsl", LIGHTS, ShaderStage::Vertex).unwrap();
        let block = vertex.resources.iter().find(|r| r.binding == 0).unwrap();

        assert_eq!(field(block, "model").offset, 0);
        assert_eq!(field(block, "model").ty, UniformType::Mat4);
        assert_eq!(field(block, "normal_matrix").offset, 64);
        assert_eq!(field(block, "normal_matrix").ty, UniformType::Mat3);
        assert_eq!(field(block, "exposure").offset, 112);
        // Arrays of structs are 16-byte aligned and 48 bytes per element.
        assert_eq!(field(block, "lights[0].position").offset, 128);
        assert_eq!(field(block, "lights[1].color").offset, 128 + 48 + 16);
        assert_eq!(field(block, "lights[1].radius").ty, UniformType::Float);
    }

    #[test]
    fn test_aggregates_are_addressable() {
        let vertex = compile("lights.wgsl", LIGHTS, ShaderStage::Vertex).unwrap();
        let block = vertex.resources.iter().find(|r| r.binding == 0).unwrap();

        assert_eq!(field(block, "lights").offset, 128);
        assert_eq!(field(block, "lights").ty, UniformType::Other { size: 96 });
        assert_eq!(field(block, "lights[1]").offset, 176);
        assert_eq!(field(block, "lights[1]").ty, UniformType::Other { size: 48 });
    }

    #[test]
    fn test_stage_usage_filters_resources() {
        let vertex = compile("lights.wgsl", LIGHTS, ShaderStage::Vertex).unwrap();
        let fragment = compile("lights.wgsl", LIGHTS, ShaderStage::Fragment).unwrap();

        assert_eq!(vertex.resources.len(), 1);
        assert_eq!(vertex.locations, vec![0, 2]);

        let names: Vec<_> = fragment.resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["shadow_map", "shadow_map_sampler"]);
        assert_eq!(fragment.locations, vec![0]);
        assert_eq!(
            fragment.resources[0].kind,
            ReflectedKind::Texture {
                sample_type: TextureSampleType::Depth,
                dimension: ViewDimension::D2
            }
        );
        assert_eq!(fragment.resources[1].kind, ReflectedKind::Sampler { comparison: true });
    }

    #[test]
    fn test_parse_error_names_file_and_stage() {
        let err = compile("broken.frag", "fn main( {", ShaderStage::Fragment).unwrap_err();
        match err {
            ShaderError::Compile { path, stage, .. } => {
                assert_eq!(path, "broken.frag");
                assert_eq!(stage, ShaderStage::Fragment);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_entry_point() {
        let source = "@vertex fn vs_main() -> @builtin(position) vec4<f32> { return vec4<f32>(0.0); }";
        let err = compile("only.vert", source, ShaderStage::Fragment).unwrap_err();
        assert!(matches!(err, ShaderError::MissingEntryPoint { .. }));
    }
}
