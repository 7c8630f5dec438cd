//! Linked shader programs and their uniform interface.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::{Mat2, Mat3, Mat4, Vec2, Vec3, Vec4};

use super::library;
use super::reflect::{self, ReflectedKind, ReflectedResource, StageReflection, UniformField};
use super::uniform::{UniformType, UniformValue};
use super::ShaderStage;
use crate::backend::*;
use crate::context::GpuContext;
use crate::error::ShaderError;

static NEXT_PROGRAM_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a linked program, used to key pipeline caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(u64);

impl ProgramId {
    fn next() -> Self {
        Self(NEXT_PROGRAM_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// What kind of resource a binding slot holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingKind {
    /// Index into [`ShaderProgram::uniform_blocks`]
    Uniform { block: usize },
    Texture {
        sample_type: TextureSampleType,
        dimension: ViewDimension,
    },
    /// `texture` names the texture binding this sampler is paired with (`<texture>_sampler`)
    Sampler { comparison: bool, texture: Option<String> },
}

/// One resource binding of a linked program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceBinding {
    pub group: u32,
    pub binding: u32,
    pub name: String,
    pub kind: BindingKind,
    pub visibility: ShaderStageFlags,
}

/// Where a named uniform lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformLocation {
    pub block: usize,
    pub offset: u32,
    pub ty: UniformType,
}

/// CPU staging copy of one uniform buffer binding.
#[derive(Debug, Clone)]
pub struct UniformBlock {
    name: String,
    data: Vec<u8>,
}

impl UniformBlock {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// A vertex stage, an optional fragment stage, and everything reflected from them.
///
/// Uniform values are staged on the CPU and uploaded by [`GpuContext::draw`]. Texture
/// bindings are fed from texture units, assigned with [`ShaderProgram::set_sampler`].
pub struct ShaderProgram {
    id: ProgramId,
    label: String,
    vertex: ShaderStageSource,
    fragment: Option<ShaderStageSource>,
    vertex_inputs: Vec<u32>,
    color_outputs: Vec<u32>,
    bindings: Vec<ResourceBinding>,
    blocks: Vec<UniformBlock>,
    uniforms: HashMap<String, UniformLocation>,
    sampler_units: HashMap<String, u32>,
    bind_group_layouts: Vec<BindGroupLayoutHandle>,
    warned: HashSet<String>,
}

/// One compiled stage waiting to be linked.
struct CompiledStage {
    path: String,
    stage: ShaderStage,
    source: String,
    reflection: StageReflection,
}

impl ShaderProgram {
    /// Compile and link the stages in `paths`, inferring each stage from its extension.
    pub fn from_files<B: GraphicsBackend, P: AsRef<Path>>(
        ctx: &mut GpuContext<B>,
        paths: &[P],
    ) -> Result<Self, ShaderError> {
        let mut sources = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let display = path.display().to_string();
            let source = std::fs::read_to_string(path).map_err(|source| {
                log::error!("Failed to read shader {}: {}", display, source);
                ShaderError::Io {
                    path: display.clone(),
                    source,
                }
            })?;
            sources.push((display, source));
        }
        let label = label_for(sources.iter().map(|(path, _)| path.as_str()));
        Self::link(ctx, &label, &sources)
    }

    /// Compile and link in-memory sources; each name's extension selects its stage.
    pub fn from_sources<B: GraphicsBackend>(
        ctx: &mut GpuContext<B>,
        label: &str,
        sources: &[(&str, &str)],
    ) -> Result<Self, ShaderError> {
        let sources: Vec<(String, String)> = sources
            .iter()
            .map(|(name, source)| (name.to_string(), source.to_string()))
            .collect();
        Self::link(ctx, label, &sources)
    }

    /// Link a program from two built-in stages.
    pub fn builtin<B: GraphicsBackend>(
        ctx: &mut GpuContext<B>,
        vertex: &str,
        fragment: &str,
    ) -> Result<Self, ShaderError> {
        let sources = [
            (vertex.to_string(), library::source(vertex)?.to_string()),
            (fragment.to_string(), library::source(fragment)?.to_string()),
        ];
        let label = label_for([vertex, fragment].into_iter());
        Self::link(ctx, &label, &sources)
    }

    fn link<B: GraphicsBackend>(
        ctx: &mut GpuContext<B>,
        label: &str,
        sources: &[(String, String)],
    ) -> Result<Self, ShaderError> {
        let result = compile_all(sources).and_then(|stages| Self::link_stages(ctx, label, stages));
        match &result {
            Ok(program) => log::debug!(
                "Linked program '{}' ({} bindings, {} uniforms)",
                label,
                program.bindings.len(),
                program.uniforms.len()
            ),
            Err(e) => log::error!("{}", e),
        }
        result
    }

    fn link_stages<B: GraphicsBackend>(
        ctx: &mut GpuContext<B>,
        label: &str,
        stages: Vec<CompiledStage>,
    ) -> Result<Self, ShaderError> {
        let link_error = |message: String| ShaderError::Link {
            program: label.to_string(),
            message,
        };

        let mut vertex = None;
        let mut fragment = None;
        for stage in stages {
            let slot = match stage.stage {
                ShaderStage::Vertex => &mut vertex,
                ShaderStage::Fragment => &mut fragment,
            };
            if let Some(previous) = slot.replace(stage) {
                return Err(link_error(format!(
                    "more than one {} stage ({})",
                    previous.stage, previous.path
                )));
            }
        }
        let vertex: CompiledStage = vertex.ok_or_else(|| link_error("no vertex stage".into()))?;

        // Merge the resources of both stages by (group, binding).
        let mut merged: Vec<(ReflectedResource, ShaderStageFlags)> = Vec::new();
        let stage_resources = std::iter::once((&vertex, ShaderStageFlags::VERTEX))
            .chain(fragment.as_ref().map(|f| (f, ShaderStageFlags::FRAGMENT)));
        for (stage, flag) in stage_resources {
            for resource in &stage.reflection.resources {
                let existing = merged
                    .iter_mut()
                    .find(|(r, _)| r.group == resource.group && r.binding == resource.binding);
                match existing {
                    Some((known, visibility)) => {
                        if *known != *resource {
                            return Err(link_error(format!(
                                "@group({}) @binding({}) is `{}` in one stage and `{}` in {}",
                                resource.group, resource.binding, known.name, resource.name, stage.path
                            )));
                        }
                        *visibility |= flag;
                    }
                    None => {
                        if merged.iter().any(|(r, _)| r.name == resource.name) {
                            return Err(link_error(format!(
                                "`{}` is declared at two different bindings",
                                resource.name
                            )));
                        }
                        merged.push((resource.clone(), flag));
                    }
                }
            }
        }
        merged.sort_by_key(|(r, _)| (r.group, r.binding));

        let texture_names: HashSet<String> = merged
            .iter()
            .filter(|(r, _)| matches!(r.kind, ReflectedKind::Texture { .. }))
            .map(|(r, _)| r.name.clone())
            .collect();

        let mut bindings = Vec::with_capacity(merged.len());
        let mut blocks = Vec::new();
        let mut uniforms = HashMap::new();
        for (resource, visibility) in merged {
            let kind = match resource.kind {
                ReflectedKind::Uniform { size, fields } => {
                    let block = blocks.len();
                    for UniformField { name, offset, ty } in fields {
                        let location = UniformLocation { block, offset, ty };
                        if uniforms.insert(name.clone(), location).is_some() {
                            return Err(link_error(format!("uniform `{name}` is declared in two blocks")));
                        }
                    }
                    blocks.push(UniformBlock {
                        name: resource.name.clone(),
                        data: vec![0; size as usize],
                    });
                    BindingKind::Uniform { block }
                }
                ReflectedKind::Texture { sample_type, dimension } => BindingKind::Texture {
                    sample_type,
                    dimension,
                },
                ReflectedKind::Sampler { comparison } => BindingKind::Sampler {
                    comparison,
                    texture: resource
                        .name
                        .strip_suffix("_sampler")
                        .filter(|texture| texture_names.contains(*texture))
                        .map(str::to_string),
                },
            };
            bindings.push(ResourceBinding {
                group: resource.group,
                binding: resource.binding,
                name: resource.name,
                kind,
                visibility,
            });
        }

        let bind_group_layouts = create_layouts(ctx, &bindings, &blocks)?;

        let stage_source = |stage: &CompiledStage| ShaderStageSource {
            label: Some(stage.path.clone()),
            source: stage.source.clone(),
            entry_point: stage.reflection.entry_point.clone(),
        };
        Ok(Self {
            id: ProgramId::next(),
            label: label.to_string(),
            vertex: stage_source(&vertex),
            fragment: fragment.as_ref().map(stage_source),
            vertex_inputs: vertex.reflection.locations.clone(),
            color_outputs: fragment
                .as_ref()
                .map(|f| f.reflection.locations.clone())
                .unwrap_or_default(),
            bindings,
            blocks,
            uniforms,
            sampler_units: HashMap::new(),
            bind_group_layouts,
            warned: HashSet::new(),
        })
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn vertex_stage(&self) -> &ShaderStageSource {
        &self.vertex
    }

    pub fn fragment_stage(&self) -> Option<&ShaderStageSource> {
        self.fragment.as_ref()
    }

    pub fn bind_group_layouts(&self) -> &[BindGroupLayoutHandle] {
        &self.bind_group_layouts
    }

    pub fn bindings(&self) -> &[ResourceBinding] {
        &self.bindings
    }

    pub fn uniform_blocks(&self) -> &[UniformBlock] {
        &self.blocks
    }

    /// Vertex input locations the vertex stage reads.
    pub fn vertex_inputs(&self) -> &[u32] {
        &self.vertex_inputs
    }

    /// Whether the fragment stage writes color output `location`.
    pub fn writes_color(&self, location: u32) -> bool {
        self.color_outputs.contains(&location)
    }

    pub fn uniform(&self, name: &str) -> Option<UniformLocation> {
        self.uniforms.get(name).copied()
    }

    /// Staged bytes of a uniform, sized to its type.
    pub fn uniform_data(&self, name: &str) -> Option<&[u8]> {
        let location = self.uniforms.get(name)?;
        let start = location.offset as usize;
        let end = start + location.ty.size() as usize;
        self.blocks[location.block].data.get(start..end)
    }

    /// Write a typed value into the uniform called `name`.
    pub fn try_set<V: UniformValue>(&mut self, name: &str, value: V) -> Result<(), ShaderError> {
        let location = self.location(name)?;
        if !V::accepts(location.ty) {
            return Err(ShaderError::TypeMismatch {
                program: self.label.clone(),
                name: name.to_string(),
                expected: location.ty,
                found: V::NAME,
            });
        }
        let start = location.offset as usize;
        let end = start + location.ty.size() as usize;
        value.write(location.ty, &mut self.blocks[location.block].data[start..end]);
        Ok(())
    }

    /// Like [`try_set`](Self::try_set), but logs failures once per name instead of returning them.
    pub fn set<V: UniformValue>(&mut self, name: &str, value: V) {
        if let Err(e) = self.try_set(name, value) {
            self.warn_once(name, e);
        }
    }

    pub fn set_bool(&mut self, name: &str, value: bool) {
        self.set(name, value);
    }

    pub fn set_int(&mut self, name: &str, value: i32) {
        self.set(name, value);
    }

    pub fn set_uint(&mut self, name: &str, value: u32) {
        self.set(name, value);
    }

    pub fn set_float(&mut self, name: &str, value: f32) {
        self.set(name, value);
    }

    pub fn set_vec2(&mut self, name: &str, value: Vec2) {
        self.set(name, value);
    }

    pub fn set_vec3(&mut self, name: &str, value: Vec3) {
        self.set(name, value);
    }

    pub fn set_vec4(&mut self, name: &str, value: Vec4) {
        self.set(name, value);
    }

    pub fn set_mat2(&mut self, name: &str, value: Mat2) {
        self.set(name, value);
    }

    pub fn set_mat3(&mut self, name: &str, value: Mat3) {
        self.set(name, value);
    }

    pub fn set_mat4(&mut self, name: &str, value: Mat4) {
        self.set(name, value);
    }

    /// Copy raw bytes over the start of a uniform (usually a struct or an array).
    pub fn try_set_bytes(&mut self, name: &str, bytes: &[u8]) -> Result<(), ShaderError> {
        let location = self.location(name)?;
        if bytes.len() > location.ty.size() as usize {
            return Err(ShaderError::TypeMismatch {
                program: self.label.clone(),
                name: name.to_string(),
                expected: location.ty,
                found: "oversized byte slice",
            });
        }
        let start = location.offset as usize;
        self.blocks[location.block].data[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn set_bytes(&mut self, name: &str, bytes: &[u8]) {
        if let Err(e) = self.try_set_bytes(name, bytes) {
            self.warn_once(name, e);
        }
    }

    /// Feed the texture binding `name` from texture unit `unit`.
    pub fn try_set_sampler(&mut self, name: &str, unit: u32) -> Result<(), ShaderError> {
        let known = self
            .bindings
            .iter()
            .any(|b| b.name == name && matches!(b.kind, BindingKind::Texture { .. }));
        if !known {
            return Err(ShaderError::UnknownSampler {
                program: self.label.clone(),
                name: name.to_string(),
            });
        }
        self.sampler_units.insert(name.to_string(), unit);
        Ok(())
    }

    pub fn set_sampler(&mut self, name: &str, unit: u32) {
        if let Err(e) = self.try_set_sampler(name, unit) {
            self.warn_once(name, e);
        }
    }

    /// Texture unit assigned to the texture binding `name`.
    pub fn sampler_unit(&self, name: &str) -> Option<u32> {
        self.sampler_units.get(name).copied()
    }

    fn location(&self, name: &str) -> Result<UniformLocation, ShaderError> {
        self.uniforms
            .get(name)
            .copied()
            .ok_or_else(|| ShaderError::UnknownUniform {
                program: self.label.clone(),
                name: name.to_string(),
            })
    }

    fn warn_once(&mut self, name: &str, error: ShaderError) {
        if self.warned.insert(name.to_string()) {
            log::warn!("{}", error);
        }
    }
}

impl std::fmt::Debug for ShaderProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderProgram")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("bindings", &self.bindings.len())
            .field("uniforms", &self.uniforms.len())
            .finish()
    }
}

/// Stages a source file contributes, from its extension.
fn stages_for(path: &str) -> Result<&'static [ShaderStage], ShaderError> {
    let extension = Path::new(path).extension().and_then(|e| e.to_str()).unwrap_or_default();
    match extension {
        "vert" => Ok(&[ShaderStage::Vertex]),
        "frag" => Ok(&[ShaderStage::Fragment]),
        "wgsl" => Ok(&[ShaderStage::Vertex, ShaderStage::Fragment]),
        "geom" => Err(ShaderError::UnsupportedStage {
            path: path.to_string(),
            stage: "geometry",
        }),
        "comp" => Err(ShaderError::UnsupportedStage {
            path: path.to_string(),
            stage: "compute",
        }),
        _ => Err(ShaderError::UnknownExtension { path: path.to_string() }),
    }
}

fn compile_all(sources: &[(String, String)]) -> Result<Vec<CompiledStage>, ShaderError> {
    let mut stages = Vec::new();
    for (path, source) in sources {
        let candidates = stages_for(path)?;
        let combined = candidates.len() > 1;
        for &stage in candidates {
            match reflect::compile(path, source, stage) {
                Ok(reflection) => stages.push(CompiledStage {
                    path: path.clone(),
                    stage,
                    source: source.clone(),
                    reflection,
                }),
                // A combined file only has to provide the stages it defines.
                Err(ShaderError::MissingEntryPoint { .. }) if combined => {}
                Err(e) => return Err(e),
            }
        }
    }
    Ok(stages)
}

fn create_layouts<B: GraphicsBackend>(
    ctx: &mut GpuContext<B>,
    bindings: &[ResourceBinding],
    blocks: &[UniformBlock],
) -> Result<Vec<BindGroupLayoutHandle>, ShaderError> {
    let group_count = bindings.iter().map(|b| b.group + 1).max().unwrap_or(0);
    let mut layouts = Vec::with_capacity(group_count as usize);
    for group in 0..group_count {
        let entries: Vec<BindGroupLayoutEntry> = bindings
            .iter()
            .filter(|b| b.group == group)
            .map(|b| BindGroupLayoutEntry {
                binding: b.binding,
                visibility: b.visibility,
                ty: match &b.kind {
                    BindingKind::Uniform { block } => BindingType::UniformBuffer {
                        dynamic_offset: true,
                        min_binding_size: Some(blocks[*block].size()),
                    },
                    BindingKind::Texture { sample_type, dimension } => BindingType::Texture {
                        sample_type: *sample_type,
                        dimension: *dimension,
                    },
                    BindingKind::Sampler { comparison, .. } => BindingType::Sampler {
                        comparison: *comparison,
                    },
                },
            })
            .collect();
        layouts.push(ctx.backend_mut().create_bind_group_layout(&entries)?);
    }
    Ok(layouts)
}

fn label_for<'a>(paths: impl Iterator<Item = &'a str>) -> String {
    let names: Vec<&str> = paths
        .map(|path| {
            Path::new(path)
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or(path)
        })
        .collect();
    let mut unique = names.clone();
    unique.dedup();
    unique.join("+")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    const VERTEX: &str = r#"
struct VertexUniforms {
    model: mat4x4<f32>,
    normal_matrix: mat3x3<f32>,
}
@group(0) @binding(0) var<uniform> vu: VertexUniforms;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return vu.model * vec4<f32>(vu.normal_matrix * position, 1.0);
}
"#;

    const FRAGMENT: &str = r#"
struct FragmentUniforms {
    tint: vec3<f32>,
    enabled: u32,
}
@group(0) @binding(1) var<uniform> fu: FragmentUniforms;
@group(0) @binding(2) var albedo_map: texture_2d<f32>;
@group(0) @binding(3) var albedo_map_sampler: sampler;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    let texel = textureSampleLevel(albedo_map, albedo_map_sampler, vec2<f32>(0.5), 0.0);
    return vec4<f32>(fu.tint * texel.rgb * f32(fu.enabled), 1.0);
}
"#;

    fn context() -> GpuContext<RecordingBackend> {
        GpuContext::new(RecordingBackend::default()).unwrap()
    }

    fn program(ctx: &mut GpuContext<RecordingBackend>) -> ShaderProgram {
        ShaderProgram::from_sources(ctx, "test", &[("test.vert", VERTEX), ("test.frag", FRAGMENT)]).unwrap()
    }

    #[test]
    fn test_link_merges_stages() {
        let mut ctx = context();
        let program = program(&mut ctx);

        let names: Vec<_> = program.bindings().iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["vu", "fu", "albedo_map", "albedo_map_sampler"]);
        assert_eq!(program.bindings()[0].visibility, ShaderStageFlags::VERTEX);
        assert_eq!(program.bindings()[1].visibility, ShaderStageFlags::FRAGMENT);
        assert_eq!(
            program.bindings()[3].kind,
            BindingKind::Sampler {
                comparison: false,
                texture: Some("albedo_map".into())
            }
        );
        assert_eq!(program.uniform_blocks().len(), 2);
        assert_eq!(program.vertex_inputs(), &[0]);
        assert!(program.writes_color(0));
        assert!(!program.writes_color(1));

        let layout = ctx
            .backend()
            .bind_group_layout_entries(program.bind_group_layouts()[0])
            .unwrap();
        assert_eq!(layout.len(), 4);
        assert_eq!(
            layout[0].ty,
            BindingType::UniformBuffer {
                dynamic_offset: true,
                min_binding_size: Some(112)
            }
        );
    }

    #[test]
    fn test_setters_write_staging_bytes() {
        let mut ctx = context();
        let mut program = program(&mut ctx);

        program.try_set("tint", Vec3::new(1.0, 2.0, 3.0)).unwrap();
        program.set_bool("enabled", true);
        let tint = program.uniform_data("tint").unwrap();
        assert_eq!(&tint[4..8], &2.0f32.to_ne_bytes());
        assert_eq!(program.uniform_data("enabled").unwrap(), &1u32.to_ne_bytes());
        assert_eq!(program.uniform("enabled").unwrap().offset, 12);
    }

    #[test]
    fn test_setter_errors_are_typed() {
        let mut ctx = context();
        let mut program = program(&mut ctx);

        assert!(matches!(
            program.try_set("missing", 1.0f32),
            Err(ShaderError::UnknownUniform { .. })
        ));
        assert!(matches!(
            program.try_set("tint", 1.0f32),
            Err(ShaderError::TypeMismatch { .. })
        ));
        assert!(matches!(
            program.try_set_sampler("fu", 0),
            Err(ShaderError::UnknownSampler { .. })
        ));
        // The logging setters swallow the error.
        program.set_float("missing", 1.0);
    }

    #[test]
    fn test_sampler_units() {
        let mut ctx = context();
        let mut program = program(&mut ctx);
        assert_eq!(program.sampler_unit("albedo_map"), None);
        program.set_sampler("albedo_map", 3);
        assert_eq!(program.sampler_unit("albedo_map"), Some(3));
    }

    #[test]
    fn test_stage_inference() {
        let mut ctx = context();
        let geometry = ShaderProgram::from_sources(&mut ctx, "g", &[("a.geom", VERTEX)]);
        assert!(matches!(
            geometry,
            Err(ShaderError::UnsupportedStage { stage: "geometry", .. })
        ));
        let unknown = ShaderProgram::from_sources(&mut ctx, "u", &[("a.glsl", VERTEX)]);
        assert!(matches!(unknown, Err(ShaderError::UnknownExtension { .. })));

        let combined = format!("{VERTEX}\n{FRAGMENT}");
        let program = ShaderProgram::from_sources(&mut ctx, "c", &[("both.wgsl", combined.as_str())]).unwrap();
        assert!(program.fragment_stage().is_some());
    }

    #[test]
    fn test_missing_vertex_stage_fails_to_link() {
        let mut ctx = context();
        let result = ShaderProgram::from_sources(&mut ctx, "f", &[("only.frag", FRAGMENT)]);
        assert!(matches!(result, Err(ShaderError::Link { .. })));
    }

    #[test]
    fn test_builtin_programs_link() {
        let mut ctx = context();
        for (vertex, fragment) in [
            ("gbuffer.vert", "gbuffer.frag"),
            ("fullscreen.vert", "lighting.frag"),
            ("cubemap.vert", "prefilter.frag"),
            ("brdf.vert", "brdf.frag"),
        ] {
            let program = ShaderProgram::builtin(&mut ctx, vertex, fragment).unwrap();
            assert!(program.fragment_stage().is_some(), "{vertex} + {fragment}");
        }
    }
}
