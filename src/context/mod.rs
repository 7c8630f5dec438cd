//! Shared GPU context.
//!
//! [`GpuContext`] wraps a [`GraphicsBackend`] and turns it into the stateful,
//! immediate-mode surface the render passes are written against: a texture unit
//! table, toggleable depth/cull/blend/sRGB state, a bound draw target and a bound
//! read target. Render passes are opened lazily by `clear` and `draw`, pipelines
//! and bind groups are resolved from the current state and cached, and uniform
//! data is streamed through a ring buffer with dynamic offsets.

mod ring;
mod state;
mod stats;

pub use ring::{align_up, RingAllocation, UniformRing};
pub use state::{Capability, PipelineState};
pub use stats::{FrameStats, PassStats};

use std::collections::{HashMap, HashSet};

use crate::backend::*;
use crate::error::{RenderError, RenderResult, ShaderError};
use crate::resources::handle::{Owned, ReleaseQueue};
use crate::resources::vertex_layout::VertexLayout;
use crate::shader::{BindingKind, ProgramId, ShaderProgram};

/// Number of texture units in the unit table.
pub const MAX_TEXTURE_UNITS: u32 = 32;

/// Default uniform ring capacity (4 MiB).
pub const DEFAULT_RING_CAPACITY: u64 = 4 << 20;

/// How a texture wants to be filtered and addressed when sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sampling {
    pub filter: FilterMode,
    pub address_mode: AddressMode,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            filter: FilterMode::Linear,
            address_mode: AddressMode::ClampToEdge,
        }
    }
}

impl Sampling {
    pub fn repeat() -> Self {
        Self {
            address_mode: AddressMode::Repeat,
            ..Default::default()
        }
    }
}

/// A texture view as seen by a texture unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampledView {
    pub view: TextureViewHandle,
    pub format: TextureFormat,
    pub dimension: ViewDimension,
    pub sampling: Sampling,
}

/// One attachment of a bound render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentView {
    pub texture: TextureHandle,
    pub view: TextureViewHandle,
    pub format: TextureFormat,
}

/// Attachments of an offscreen render target, as bound into the context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetBinding {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub colors: Vec<AttachmentView>,
    pub depth: Option<AttachmentView>,
}

/// Where draws and reads are directed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawTarget {
    /// The presentable surface of the current frame
    Display,
    Offscreen(TargetBinding),
}

/// Element range of a draw call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawRange {
    /// Non-indexed draw of `count` vertices
    Vertices(u32),
    /// Indexed draw of `count` indices
    Indexed(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramId,
    vertex_layouts: Vec<VertexBufferLayout>,
    colors: Vec<TextureFormat>,
    depth: Option<TextureFormat>,
    state: PipelineState,
}

/// The pass currently recording, and the formats its pipelines must match.
struct OpenPass {
    colors: Vec<TextureFormat>,
    depth: Option<TextureFormat>,
}

/// Textures bound in place of units that have nothing compatible bound.
struct Fallbacks {
    white: SampledView,
    black_cube: SampledView,
    depth: SampledView,
    depth_cube_array: SampledView,
    _textures: Vec<Owned<TextureHandle>>,
}

impl Fallbacks {
    fn find(&self, sample_type: TextureSampleType, dimension: ViewDimension) -> Option<SampledView> {
        match (sample_type, dimension) {
            (TextureSampleType::Float { .. }, ViewDimension::D2) => Some(self.white),
            (TextureSampleType::Float { .. }, ViewDimension::Cube) => Some(self.black_cube),
            (TextureSampleType::Depth, ViewDimension::D2) => Some(self.depth),
            (TextureSampleType::Depth, ViewDimension::CubeArray) => Some(self.depth_cube_array),
            _ => None,
        }
    }
}

/// Stateful front end over a graphics backend.
pub struct GpuContext<B: GraphicsBackend> {
    backend: B,
    frame: Option<FrameContext>,
    state: PipelineState,
    units: Vec<Option<SampledView>>,
    draw_target: DrawTarget,
    read_target: Option<DrawTarget>,
    pass: Option<OpenPass>,
    pass_label: String,
    clear_color: [f32; 4],
    pipelines: HashMap<PipelineKey, RenderPipelineHandle>,
    bind_groups: HashMap<(BindGroupLayoutHandle, Vec<(u32, BindGroupEntry)>), BindGroupHandle>,
    samplers: HashMap<(Sampling, bool), SamplerHandle>,
    ring: UniformRing,
    releases: ReleaseQueue,
    fallbacks: Option<Fallbacks>,
    stats: FrameStats,
    warned: HashSet<String>,
}

impl<B: GraphicsBackend> GpuContext<B> {
    pub fn new(backend: B) -> RenderResult<Self> {
        Self::with_ring_capacity(backend, DEFAULT_RING_CAPACITY)
    }

    pub fn with_ring_capacity(mut backend: B, ring_capacity: u64) -> RenderResult<Self> {
        let ring = UniformRing::new(&mut backend, ring_capacity)?;
        let mut ctx = Self {
            backend,
            frame: None,
            state: PipelineState::default(),
            units: vec![None; MAX_TEXTURE_UNITS as usize],
            draw_target: DrawTarget::Display,
            read_target: None,
            pass: None,
            pass_label: String::from("Unnamed Pass"),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            pipelines: HashMap::new(),
            bind_groups: HashMap::new(),
            samplers: HashMap::new(),
            ring,
            releases: ReleaseQueue::new(),
            fallbacks: None,
            stats: FrameStats::default(),
            warned: HashSet::new(),
        };
        ctx.fallbacks = Some(ctx.create_fallbacks()?);
        log::info!(
            "GPU context ready ({} texture units, {} KiB uniform ring)",
            MAX_TEXTURE_UNITS,
            ctx.ring.capacity() / 1024
        );
        Ok(ctx)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn release_queue(&self) -> &ReleaseQueue {
        &self.releases
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn surface_size(&self) -> (u32, u32) {
        self.backend.surface_size()
    }

    // Resource helpers

    pub fn create_texture(&mut self, desc: &TextureDescriptor) -> RenderResult<Owned<TextureHandle>> {
        let handle = self.backend.create_texture(desc)?;
        Ok(self.releases.own(handle))
    }

    pub fn create_view(
        &mut self,
        texture: TextureHandle,
        desc: &TextureViewDescriptor,
    ) -> RenderResult<TextureViewHandle> {
        Ok(self.backend.create_texture_view(texture, desc)?)
    }

    pub fn create_buffer(&mut self, desc: &BufferDescriptor) -> RenderResult<Owned<BufferHandle>> {
        let handle = self.backend.create_buffer(desc)?;
        Ok(self.releases.own(handle))
    }

    // Frame lifecycle

    pub fn begin_frame(&mut self) -> RenderResult<FrameContext> {
        let frame = self.backend.begin_frame()?;
        self.frame = Some(frame);
        self.stats = FrameStats::default();
        self.draw_target = DrawTarget::Display;
        self.read_target = None;
        Ok(frame)
    }

    /// Flush uniforms, submit and present.
    pub fn end_frame(&mut self) -> RenderResult<()> {
        self.end_pass();
        self.ring.flush(&mut self.backend);
        self.backend.end_frame()?;
        self.stats.submits += 1;
        self.frame = None;
        self.releases.drain(&mut self.backend);
        Ok(())
    }

    /// Flush uniforms and submit everything recorded so far without presenting.
    pub fn submit(&mut self) {
        self.end_pass();
        self.ring.flush(&mut self.backend);
        self.backend.submit();
        self.stats.submits += 1;
        self.releases.drain(&mut self.backend);
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.end_pass();
        self.backend.resize(width, height);
    }

    // State

    /// Label given to the next render pass that opens.
    pub fn set_pass_label(&mut self, label: &str) {
        if self.pass_label != label {
            self.end_pass();
            self.pass_label = label.to_string();
        }
    }

    pub fn set_state(&mut self, state: PipelineState) {
        self.set_srgb_internal(state.srgb);
        self.state = state;
    }

    pub fn enable(&mut self, capability: Capability) {
        self.set_capability(capability, true);
    }

    pub fn disable(&mut self, capability: Capability) {
        self.set_capability(capability, false);
    }

    fn set_capability(&mut self, capability: Capability, enabled: bool) {
        if capability == Capability::FramebufferSrgb {
            self.set_srgb_internal(enabled);
        }
        self.state.set(capability, enabled);
    }

    fn set_srgb_internal(&mut self, enabled: bool) {
        if self.state.srgb == enabled {
            return;
        }
        let offscreen = match &self.draw_target {
            DrawTarget::Display => None,
            DrawTarget::Offscreen(target) => Some(target.label.clone()),
        };
        match offscreen {
            // The display pass was opened with the other view of the swapchain image.
            None => self.end_pass(),
            Some(label) if enabled => {
                if self.warned.insert(format!("srgb:{label}")) {
                    log::warn!(
                        "sRGB framebuffer enabled while drawing into {}; only the display target is encoded",
                        label
                    );
                }
            }
            Some(_) => {}
        }
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    pub fn bind_texture_unit(&mut self, unit: u32, view: SampledView) {
        match self.units.get_mut(unit as usize) {
            Some(slot) => *slot = Some(view),
            None => log::error!("Texture unit {} out of range (max {})", unit, MAX_TEXTURE_UNITS),
        }
    }

    pub fn unbind_texture_unit(&mut self, unit: u32) {
        if let Some(slot) = self.units.get_mut(unit as usize) {
            *slot = None;
        }
    }

    pub fn texture_unit(&self, unit: u32) -> Option<SampledView> {
        self.units.get(unit as usize).copied().flatten()
    }

    pub fn bind_draw_target(&mut self, target: DrawTarget) {
        if self.draw_target != target {
            self.end_pass();
            self.draw_target = target;
        }
    }

    pub fn bind_read_target(&mut self, target: DrawTarget) {
        self.read_target = Some(target);
    }

    pub fn bind_display_target(&mut self) {
        self.bind_draw_target(DrawTarget::Display);
    }

    pub fn draw_target(&self) -> &DrawTarget {
        &self.draw_target
    }

    /// Clear every attachment of the draw target, opening a new pass.
    pub fn clear(&mut self) -> RenderResult<()> {
        self.end_pass();
        let load = LoadOp::Clear(self.clear_color);
        self.open_pass(load, LoadOp::Clear([1.0; 4]))
    }

    /// Copy the depth attachment of the read target into the draw target's.
    pub fn blit_depth(&mut self) -> RenderResult<()> {
        let source = match &self.read_target {
            Some(DrawTarget::Offscreen(target)) => target.depth.map(|d| (d, target.width, target.height)),
            _ => None,
        };
        let destination = match &self.draw_target {
            DrawTarget::Offscreen(target) => target.depth.map(|d| (d, target.width, target.height)),
            DrawTarget::Display => None,
        };
        let (Some((src, sw, sh)), Some((dst, dw, dh))) = (source, destination) else {
            return Err(RenderError::IncompleteTarget {
                label: self.target_label(),
                reason: "depth blit needs a depth attachment on both read and draw targets".into(),
            });
        };
        if src.format != dst.format {
            return Err(RenderError::IncompleteTarget {
                label: self.target_label(),
                reason: format!("depth formats differ: {:?} vs {:?}", src.format, dst.format),
            });
        }
        self.end_pass();
        self.backend
            .copy_texture_to_texture(src.texture, dst.texture, sw.min(dw), sh.min(dh));
        self.stats.copies += 1;
        Ok(())
    }

    /// Issue a draw with `program`, its current uniforms, and the current state.
    pub fn draw(
        &mut self,
        program: &ShaderProgram,
        vertices: Option<&VertexLayout>,
        range: DrawRange,
    ) -> RenderResult<()> {
        let offsets = self.upload_uniforms(program)?;
        if self.pass.is_none() {
            self.open_pass(LoadOp::Load, LoadOp::Load)?;
        }
        let pipeline = self.pipeline_for(program, vertices)?;
        let groups = self.bind_groups_for(program, &offsets)?;

        self.backend.set_render_pipeline(pipeline);
        for (index, (group, dynamic_offsets)) in groups.iter().enumerate() {
            self.backend.set_bind_group(index as u32, *group, dynamic_offsets);
        }
        if let Some(layout) = vertices {
            layout.bind(&mut self.backend);
        }
        match range {
            DrawRange::Vertices(count) => self.backend.draw(0..count, 0..1),
            DrawRange::Indexed(count) => self.backend.draw_indexed(0..count, 0, 0..1),
        }
        self.stats.record_draw();
        Ok(())
    }

    // Internals

    fn target_label(&self) -> String {
        match &self.draw_target {
            DrawTarget::Display => "display".to_string(),
            DrawTarget::Offscreen(target) => target.label.clone(),
        }
    }

    fn end_pass(&mut self) {
        if self.pass.take().is_some() {
            self.backend.end_render_pass();
        }
    }

    fn open_pass(&mut self, color_load: LoadOp, depth_load: LoadOp) -> RenderResult<()> {
        let (color_attachments, depth_stencil_attachment, colors, depth) = match &self.draw_target {
            DrawTarget::Display => {
                let frame = self.frame.ok_or_else(|| RenderError::IncompleteTarget {
                    label: "display".into(),
                    reason: "no frame in flight".into(),
                })?;
                let linear = self.backend.swapchain_format();
                let (view, format) = match (self.state.srgb, linear.srgb_variant()) {
                    (true, Some(srgb)) => (frame.swapchain_srgb_view, srgb),
                    _ => (frame.swapchain_view, linear),
                };
                let attachment = ColorAttachment {
                    view,
                    load_op: color_load,
                    store_op: StoreOp::Store,
                };
                (vec![attachment], None, vec![format], None)
            }
            DrawTarget::Offscreen(target) => {
                let colors = target
                    .colors
                    .iter()
                    .map(|c| ColorAttachment {
                        view: c.view,
                        load_op: color_load,
                        store_op: StoreOp::Store,
                    })
                    .collect();
                let depth = target.depth.map(|d| DepthStencilAttachment {
                    view: d.view,
                    depth_load_op: depth_load,
                    depth_store_op: StoreOp::Store,
                    depth_clear_value: 1.0,
                });
                (
                    colors,
                    depth,
                    target.colors.iter().map(|c| c.format).collect(),
                    target.depth.map(|d| d.format),
                )
            }
        };

        log::debug!("Begin pass '{}' on {}", self.pass_label, self.target_label());
        self.backend.begin_render_pass(&RenderPassDescriptor {
            label: Some(self.pass_label.clone()),
            color_attachments,
            depth_stencil_attachment,
        });
        self.stats.begin_pass(&self.pass_label);
        self.pass = Some(OpenPass { colors, depth });
        Ok(())
    }

    /// Copy every uniform block of `program` into the ring. Returns one offset per block.
    fn upload_uniforms(&mut self, program: &ShaderProgram) -> RenderResult<Vec<u32>> {
        let mut offsets = Vec::with_capacity(program.uniform_blocks().len());
        for block in program.uniform_blocks() {
            let allocation = match self.ring.push(block.data()) {
                Ok(allocation) => allocation,
                Err(RenderError::UniformRingExhausted { .. }) if self.ring.used() > 0 => {
                    // Push what was recorded so far and start over with an empty ring.
                    log::debug!("Uniform ring full, submitting early");
                    self.submit();
                    return self.upload_uniforms(program);
                }
                Err(e) => return Err(e),
            };
            offsets.push(allocation.offset as u32);
        }
        Ok(offsets)
    }

    fn pipeline_for(
        &mut self,
        program: &ShaderProgram,
        vertices: Option<&VertexLayout>,
    ) -> RenderResult<RenderPipelineHandle> {
        let pass = self.pass.as_ref().ok_or_else(|| RenderError::IncompleteTarget {
            label: self.target_label(),
            reason: "no open pass".into(),
        })?;
        let vertex_layouts = vertices
            .map(|layout| layout.buffer_layouts().to_vec())
            .unwrap_or_default();
        let key = PipelineKey {
            program: program.id(),
            vertex_layouts,
            colors: pass.colors.clone(),
            depth: pass.depth,
            state: self.state,
        };
        if let Some(pipeline) = self.pipelines.get(&key) {
            return Ok(*pipeline);
        }

        for location in program.vertex_inputs() {
            let provided = key
                .vertex_layouts
                .iter()
                .flat_map(|layout| layout.attributes.iter())
                .any(|attribute| attribute.location == *location);
            if !provided {
                return Err(ShaderError::Link {
                    program: program.label().to_string(),
                    message: format!("vertex input @location({location}) is not provided by the bound vertex layout"),
                }
                .into());
            }
        }

        let color_targets = key
            .colors
            .iter()
            .enumerate()
            .map(|(index, format)| {
                let written = program.writes_color(index as u32);
                ColorTargetState {
                    format: *format,
                    blend: if written { self.state.blend } else { None },
                    write_enabled: written,
                }
            })
            .collect();
        let depth_stencil = key.depth.map(|format| {
            if self.state.depth_test {
                DepthStencilState {
                    format,
                    depth_write_enabled: self.state.depth_write,
                    depth_compare: self.state.depth_compare,
                }
            } else {
                DepthStencilState {
                    format,
                    depth_write_enabled: false,
                    depth_compare: CompareFunction::Always,
                }
            }
        });

        let pipeline = self.backend.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some(program.label().to_string()),
            vertex: program.vertex_stage().clone(),
            fragment: program.fragment_stage().cloned(),
            vertex_layouts: key.vertex_layouts.clone(),
            bind_group_layouts: program.bind_group_layouts().to_vec(),
            primitive_topology: self.state.topology,
            cull_mode: self.state.cull_mode,
            depth_stencil,
            color_targets,
        })?;
        log::debug!(
            "Created pipeline for '{}' ({} cached)",
            program.label(),
            self.pipelines.len() + 1
        );
        self.pipelines.insert(key, pipeline);
        Ok(pipeline)
    }

    fn bind_groups_for(
        &mut self,
        program: &ShaderProgram,
        block_offsets: &[u32],
    ) -> RenderResult<Vec<(BindGroupHandle, Vec<u32>)>> {
        let layouts = program.bind_group_layouts().to_vec();
        let mut groups = Vec::with_capacity(layouts.len());
        for (group, layout) in layouts.into_iter().enumerate() {
            let mut entries = Vec::new();
            let mut dynamic_offsets = Vec::new();
            for binding in program.bindings().iter().filter(|b| b.group == group as u32) {
                let entry = match &binding.kind {
                    BindingKind::Uniform { block } => {
                        dynamic_offsets.push(block_offsets[*block]);
                        BindGroupEntry::Buffer {
                            buffer: self.ring.buffer(),
                            offset: 0,
                            size: Some(program.uniform_blocks()[*block].size()),
                        }
                    }
                    BindingKind::Texture {
                        sample_type,
                        dimension,
                    } => {
                        let view = self.resolve_texture(program, &binding.name, *sample_type, *dimension)?;
                        BindGroupEntry::Texture(view.view)
                    }
                    BindingKind::Sampler {
                        comparison,
                        texture,
                    } => {
                        let sampling = texture
                            .as_deref()
                            .and_then(|name| program.sampler_unit(name))
                            .and_then(|unit| self.texture_unit(unit))
                            .map(|view| view.sampling)
                            .unwrap_or_default();
                        BindGroupEntry::Sampler(self.sampler(sampling, *comparison)?)
                    }
                };
                entries.push((binding.binding, entry));
            }

            let key = (layout, entries);
            let handle = match self.bind_groups.get(&key).copied() {
                Some(handle) => handle,
                None => {
                    let handle = self.backend.create_bind_group(layout, &key.1)?;
                    self.bind_groups.insert(key, handle);
                    handle
                }
            };
            groups.push((handle, dynamic_offsets));
        }
        Ok(groups)
    }

    fn resolve_texture(
        &mut self,
        program: &ShaderProgram,
        name: &str,
        sample_type: TextureSampleType,
        dimension: ViewDimension,
    ) -> RenderResult<SampledView> {
        let bound = program
            .sampler_unit(name)
            .and_then(|unit| self.texture_unit(unit));
        if let Some(view) = bound {
            if is_compatible(&view, sample_type, dimension) {
                return Ok(view);
            }
            let key = format!("{}:{}:incompatible", program.label(), name);
            if self.warned.insert(key) {
                log::warn!(
                    "{}: texture bound for `{}` is {:?} {:?}, shader expects {:?} {:?}",
                    program.label(),
                    name,
                    view.format,
                    view.dimension,
                    sample_type,
                    dimension
                );
            }
        }
        self.fallbacks
            .as_ref()
            .and_then(|fallbacks| fallbacks.find(sample_type, dimension))
            .ok_or_else(|| {
                ShaderError::Link {
                    program: program.label().to_string(),
                    message: format!("no texture bound for `{name}` and no {dimension:?} fallback exists"),
                }
                .into()
            })
    }

    fn sampler(&mut self, sampling: Sampling, comparison: bool) -> RenderResult<SamplerHandle> {
        if let Some(sampler) = self.samplers.get(&(sampling, comparison)) {
            return Ok(*sampler);
        }
        let sampler = self.backend.create_sampler(&SamplerDescriptor {
            label: None,
            filter: sampling.filter,
            address_mode: sampling.address_mode,
            compare: comparison.then_some(CompareFunction::LessEqual),
        })?;
        self.samplers.insert((sampling, comparison), sampler);
        Ok(sampler)
    }

    fn create_fallbacks(&mut self) -> RenderResult<Fallbacks> {
        let (white_texture, white) = self.fallback_color("fallback_white", TextureKind::D2, [255; 4])?;
        let (cube_texture, black_cube) =
            self.fallback_color("fallback_black_cube", TextureKind::Cube, [0, 0, 0, 255])?;
        let (depth_texture, depth) = self.fallback_depth("fallback_depth", ViewDimension::D2)?;
        let (array_texture, depth_cube_array) =
            self.fallback_depth("fallback_depth_cube_array", ViewDimension::CubeArray)?;

        Ok(Fallbacks {
            white,
            black_cube,
            depth,
            depth_cube_array,
            _textures: vec![white_texture, cube_texture, depth_texture, array_texture],
        })
    }

    fn fallback_color(
        &mut self,
        label: &str,
        kind: TextureKind,
        texel: [u8; 4],
    ) -> RenderResult<(Owned<TextureHandle>, SampledView)> {
        let layers = if kind == TextureKind::Cube { 6 } else { 1 };
        let texture = self.create_texture(&TextureDescriptor {
            label: Some(label.to_string()),
            layers,
            kind,
            format: TextureFormat::Rgba8Unorm,
            ..Default::default()
        })?;
        for layer in 0..layers {
            let region = TextureRegion {
                mip_level: 0,
                layer,
                width: 1,
                height: 1,
            };
            self.backend.write_texture(texture.handle(), region, &texel);
        }
        let view = self.create_view(texture.handle(), &TextureViewDescriptor::default())?;
        let dimension = match kind {
            TextureKind::Cube => ViewDimension::Cube,
            TextureKind::D2 => ViewDimension::D2,
        };
        let sampled = SampledView {
            view,
            format: TextureFormat::Rgba8Unorm,
            dimension,
            sampling: Sampling::default(),
        };
        Ok((texture, sampled))
    }

    fn fallback_depth(
        &mut self,
        label: &str,
        dimension: ViewDimension,
    ) -> RenderResult<(Owned<TextureHandle>, SampledView)> {
        let (kind, layers) = match dimension {
            ViewDimension::CubeArray | ViewDimension::Cube => (TextureKind::Cube, 6),
            ViewDimension::D2 | ViewDimension::D2Array => (TextureKind::D2, 1),
        };
        let texture = self.create_texture(&TextureDescriptor {
            label: Some(label.to_string()),
            layers,
            kind,
            format: TextureFormat::Depth32Float,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::RENDER_ATTACHMENT,
            ..Default::default()
        })?;
        // Depth textures can't be uploaded to, every layer is cleared to the far plane instead.
        for layer in 0..layers {
            let view = self.create_view(texture.handle(), &TextureViewDescriptor::face(layer, 0))?;
            self.backend.begin_render_pass(&RenderPassDescriptor {
                label: Some("Fallback Clear".into()),
                color_attachments: Vec::new(),
                depth_stencil_attachment: Some(DepthStencilAttachment {
                    view,
                    depth_load_op: LoadOp::Clear([1.0; 4]),
                    depth_store_op: StoreOp::Store,
                    depth_clear_value: 1.0,
                }),
            });
            self.backend.end_render_pass();
        }
        let view = self.create_view(
            texture.handle(),
            &TextureViewDescriptor {
                dimension: Some(dimension),
                ..Default::default()
            },
        )?;
        let sampled = SampledView {
            view,
            format: TextureFormat::Depth32Float,
            dimension,
            sampling: Sampling::default(),
        };
        Ok((texture, sampled))
    }
}

fn is_compatible(view: &SampledView, sample_type: TextureSampleType, dimension: ViewDimension) -> bool {
    if view.dimension != dimension {
        return false;
    }
    match sample_type {
        TextureSampleType::Depth => view.format.is_depth(),
        TextureSampleType::Float { filterable } => {
            !view.format.is_depth() && (!filterable || view.format.is_filterable())
        }
        TextureSampleType::Sint | TextureSampleType::Uint => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(label: &str, color_format: TextureFormat) -> TargetBinding {
        TargetBinding {
            label: label.to_string(),
            width: 4,
            height: 4,
            colors: vec![AttachmentView {
                texture: TextureHandle(1000),
                view: TextureViewHandle(1001),
                format: color_format,
            }],
            depth: None,
        }
    }

    #[test]
    fn test_clear_opens_labeled_pass() {
        let mut ctx = GpuContext::new(RecordingBackend::default()).unwrap();
        ctx.backend_mut().clear_events();
        ctx.bind_draw_target(DrawTarget::Offscreen(target("hdr", TextureFormat::Rgba16Float)));
        ctx.set_pass_label("Lighting");
        ctx.clear().unwrap();
        ctx.submit();

        let passes: Vec<_> = ctx.backend().passes().collect();
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].label(), "Lighting");
        assert_eq!(
            passes[0].descriptor.color_attachments[0].load_op,
            LoadOp::Clear([0.0, 0.0, 0.0, 1.0])
        );
    }

    #[test]
    fn test_display_requires_frame() {
        let mut ctx = GpuContext::new(RecordingBackend::default()).unwrap();
        ctx.bind_display_target();
        assert!(matches!(ctx.clear(), Err(RenderError::IncompleteTarget { .. })));
    }

    #[test]
    fn test_srgb_selects_display_view() {
        let mut ctx = GpuContext::new(RecordingBackend::default()).unwrap();
        let frame = ctx.begin_frame().unwrap();
        ctx.bind_display_target();
        ctx.enable(Capability::FramebufferSrgb);
        ctx.clear().unwrap();
        ctx.end_frame().unwrap();

        let pass = ctx.backend().passes().last().unwrap().clone();
        assert_eq!(pass.descriptor.color_attachments[0].view, frame.swapchain_srgb_view);
    }

    #[test]
    fn test_blit_depth_needs_depth_on_both_sides() {
        let mut ctx = GpuContext::new(RecordingBackend::default()).unwrap();
        ctx.bind_read_target(DrawTarget::Offscreen(target("a", TextureFormat::Rgba16Float)));
        ctx.bind_draw_target(DrawTarget::Offscreen(target("b", TextureFormat::Rgba16Float)));
        assert!(ctx.blit_depth().is_err());
    }

    #[test]
    fn test_fallbacks_cover_renderer_bindings() {
        let ctx = GpuContext::new(RecordingBackend::default()).unwrap();
        let fallbacks = ctx.fallbacks.as_ref().unwrap();
        let float = TextureSampleType::Float { filterable: true };
        assert!(fallbacks.find(float, ViewDimension::D2).is_some());
        assert!(fallbacks.find(float, ViewDimension::Cube).is_some());
        assert!(fallbacks.find(TextureSampleType::Depth, ViewDimension::D2).is_some());
        assert!(fallbacks.find(TextureSampleType::Depth, ViewDimension::CubeArray).is_some());
        assert!(fallbacks.find(float, ViewDimension::D2Array).is_none());
    }
}
