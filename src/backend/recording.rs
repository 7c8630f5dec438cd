//! Recording GPU backend for testing and headless runs.
//!
//! This backend doesn't perform any GPU work. Buffers keep their bytes in memory
//! and every pass, draw and copy is recorded so tests can inspect exactly what
//! the renderer would have submitted.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

use crate::backend::traits::*;
use crate::backend::types::*;

/// A draw call together with the pass state bound when it was issued
#[derive(Debug, Clone)]
pub struct DrawRecord {
    pub pipeline: Option<RenderPipelineHandle>,
    /// Bound bind groups by index, with the dynamic offsets they were bound with
    pub bind_groups: BTreeMap<u32, (BindGroupHandle, Vec<u32>)>,
    /// Bound vertex buffers by slot
    pub vertex_buffers: BTreeMap<u32, (BufferHandle, u64)>,
    pub index_buffer: Option<(BufferHandle, u64)>,
    pub call: DrawCall,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawCall {
    Vertices {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    Indexed {
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    },
}

impl DrawCall {
    /// Number of vertices (or indices) consumed by one instance
    pub fn element_count(&self) -> u32 {
        match self {
            DrawCall::Vertices { vertices, .. } => vertices.end - vertices.start,
            DrawCall::Indexed { indices, .. } => indices.end - indices.start,
        }
    }
}

/// A finished render pass
#[derive(Debug, Clone)]
pub struct PassRecord {
    pub descriptor: RenderPassDescriptor,
    pub draws: Vec<DrawRecord>,
}

impl PassRecord {
    pub fn label(&self) -> &str {
        self.descriptor.label.as_deref().unwrap_or("")
    }
}

/// Everything the backend was asked to do, in submission order
#[derive(Debug, Clone)]
pub enum RecordedEvent {
    Pass(PassRecord),
    Copy {
        source: TextureHandle,
        destination: TextureHandle,
        width: u32,
        height: u32,
    },
    Submit,
    Present,
}

#[derive(Default)]
struct PassState {
    pipeline: Option<RenderPipelineHandle>,
    bind_groups: BTreeMap<u32, (BindGroupHandle, Vec<u32>)>,
    vertex_buffers: BTreeMap<u32, (BufferHandle, u64)>,
    index_buffer: Option<(BufferHandle, u64)>,
}

/// Headless backend that records commands instead of executing them.
pub struct RecordingBackend {
    width: u32,
    height: u32,
    format: TextureFormat,
    next_id: u64,
    frame: Option<FrameContext>,

    buffers: HashMap<u64, (BufferDescriptor, Vec<u8>)>,
    textures: HashMap<u64, TextureDescriptor>,
    texture_views: HashMap<u64, (TextureHandle, TextureViewDescriptor)>,
    samplers: HashMap<u64, SamplerDescriptor>,
    bind_group_layouts: HashMap<u64, Vec<BindGroupLayoutEntry>>,
    bind_groups: HashMap<u64, (BindGroupLayoutHandle, Vec<(u32, BindGroupEntry)>)>,
    render_pipelines: HashMap<u64, RenderPipelineDescriptor>,
    texture_writes: Vec<(TextureHandle, TextureRegion, usize)>,

    pending_pass: Option<(PassRecord, PassState)>,
    events: Vec<RecordedEvent>,
    destroyed_buffers: usize,
    destroyed_textures: usize,
}

impl RecordingBackend {
    /// Create a new recording backend with a virtual surface of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            format: TextureFormat::Bgra8Unorm,
            next_id: 1,
            frame: None,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            texture_views: HashMap::new(),
            samplers: HashMap::new(),
            bind_group_layouts: HashMap::new(),
            bind_groups: HashMap::new(),
            render_pipelines: HashMap::new(),
            texture_writes: Vec::new(),
            pending_pass: None,
            events: Vec::new(),
            destroyed_buffers: 0,
            destroyed_textures: 0,
        }
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        "Recording Backend"
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// All recorded events in order
    pub fn events(&self) -> &[RecordedEvent] {
        &self.events
    }

    /// Recorded render passes in order
    pub fn passes(&self) -> impl Iterator<Item = &PassRecord> {
        self.events.iter().filter_map(|event| match event {
            RecordedEvent::Pass(pass) => Some(pass),
            _ => None,
        })
    }

    /// Recorded passes with the given label
    pub fn passes_labeled<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a PassRecord> {
        self.passes().filter(move |pass| pass.label() == label)
    }

    /// Forget everything recorded so far (resources are kept)
    pub fn clear_events(&mut self) {
        self.events.clear();
        self.texture_writes.clear();
    }

    pub fn presented_frames(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, RecordedEvent::Present))
            .count()
    }

    /// Current contents of a buffer
    pub fn buffer_data(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer.0).map(|(_, data)| data.as_slice())
    }

    pub fn buffer_descriptor(&self, buffer: BufferHandle) -> Option<&BufferDescriptor> {
        self.buffers.get(&buffer.0).map(|(desc, _)| desc)
    }

    pub fn texture_descriptor(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&texture.0)
    }

    /// Texture and descriptor a view was created from
    pub fn view_source(&self, view: TextureViewHandle) -> Option<&(TextureHandle, TextureViewDescriptor)> {
        self.texture_views.get(&view.0)
    }

    /// Format a view renders with, including the swapchain views of the current frame
    pub fn view_format(&self, view: TextureViewHandle) -> Option<TextureFormat> {
        if let Some(frame) = &self.frame {
            if view == frame.swapchain_view {
                return Some(self.format);
            }
            if view == frame.swapchain_srgb_view {
                return self.format.srgb_variant();
            }
        }
        let (texture, _) = self.texture_views.get(&view.0)?;
        self.textures.get(&texture.0).map(|desc| desc.format)
    }

    /// Whether the view is one of the swapchain views of the most recent frame
    pub fn is_swapchain_view(&self, view: TextureViewHandle) -> bool {
        self.frame
            .map(|frame| view == frame.swapchain_view || view == frame.swapchain_srgb_view)
            .unwrap_or(false)
    }

    pub fn pipeline_descriptor(&self, pipeline: RenderPipelineHandle) -> Option<&RenderPipelineDescriptor> {
        self.render_pipelines.get(&pipeline.0)
    }

    pub fn bind_group_entries(&self, bind_group: BindGroupHandle) -> Option<&[(u32, BindGroupEntry)]> {
        self.bind_groups
            .get(&bind_group.0)
            .map(|(_, entries)| entries.as_slice())
    }

    pub fn bind_group_layout_entries(&self, layout: BindGroupLayoutHandle) -> Option<&[BindGroupLayoutEntry]> {
        self.bind_group_layouts.get(&layout.0).map(|e| e.as_slice())
    }

    pub fn sampler_descriptor(&self, sampler: SamplerHandle) -> Option<&SamplerDescriptor> {
        self.samplers.get(&sampler.0)
    }

    pub fn texture_writes(&self) -> &[(TextureHandle, TextureRegion, usize)] {
        &self.texture_writes
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn destroyed_textures(&self) -> usize {
        self.destroyed_textures
    }

    pub fn destroyed_buffers(&self) -> usize {
        self.destroyed_buffers
    }
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl GraphicsBackend for RecordingBackend {
    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.width = width;
            self.height = height;
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn begin_frame(&mut self) -> BackendResult<FrameContext> {
        let swapchain_view = TextureViewHandle(self.allocate_id());
        let swapchain_srgb_view = TextureViewHandle(self.allocate_id());
        let frame = FrameContext {
            swapchain_view,
            swapchain_srgb_view,
            width: self.width,
            height: self.height,
        };
        log::trace!("RecordingBackend: begin frame {}x{}", self.width, self.height);
        self.frame = Some(frame);
        Ok(frame)
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        self.submit();
        self.events.push(RecordedEvent::Present);
        Ok(())
    }

    fn swapchain_format(&self) -> TextureFormat {
        self.format
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        validate_buffer(desc)?;
        log::trace!(
            "RecordingBackend: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );
        let id = self.allocate_id();
        self.buffers
            .insert(id, (desc.clone(), vec![0; desc.size as usize]));
        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        let Some((desc, contents)) = self.buffers.get_mut(&buffer.0) else {
            log::warn!("RecordingBackend: write to unknown buffer {}", buffer.0);
            return;
        };
        let start = offset as usize;
        let end = start + data.len();
        if end > contents.len() {
            log::error!(
                "RecordingBackend: write of {} bytes at {} overruns {:?} ({} bytes)",
                data.len(),
                offset,
                desc.label,
                contents.len()
            );
            return;
        }
        contents[start..end].copy_from_slice(data);
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        validate_texture(desc)?;
        log::trace!(
            "RecordingBackend: creating texture {:?} ({}x{}x{}, {} mips)",
            desc.label,
            desc.width,
            desc.height,
            desc.layers,
            desc.mip_levels
        );
        let id = self.allocate_id();
        self.textures.insert(id, desc.clone());
        Ok(TextureHandle(id))
    }

    fn create_texture_view(
        &mut self,
        texture: TextureHandle,
        desc: &TextureViewDescriptor,
    ) -> BackendResult<TextureViewHandle> {
        let source = self
            .textures
            .get(&texture.0)
            .ok_or(BackendError::UnknownHandle { kind: "texture", id: texture.0 })?;
        resolve_view_range(source, desc)?;
        let id = self.allocate_id();
        self.texture_views.insert(id, (texture, desc.clone()));
        Ok(TextureViewHandle(id))
    }

    fn write_texture(&mut self, texture: TextureHandle, region: TextureRegion, data: &[u8]) {
        self.texture_writes.push((texture, region, data.len()));
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        log::trace!("RecordingBackend: creating sampler {:?}", desc.label);
        let id = self.allocate_id();
        self.samplers.insert(id, desc.clone());
        Ok(SamplerHandle(id))
    }

    fn create_bind_group_layout(
        &mut self,
        entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle> {
        let id = self.allocate_id();
        self.bind_group_layouts.insert(id, entries.to_vec());
        Ok(BindGroupLayoutHandle(id))
    }

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        if !self.bind_group_layouts.contains_key(&layout.0) {
            return Err(BackendError::UnknownHandle { kind: "bind group layout", id: layout.0 });
        }
        let id = self.allocate_id();
        self.bind_groups.insert(id, (layout, entries.to_vec()));
        Ok(BindGroupHandle(id))
    }

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineHandle> {
        log::trace!("RecordingBackend: creating pipeline {:?}", desc.label);
        let id = self.allocate_id();
        self.render_pipelines.insert(id, desc.clone());
        Ok(RenderPipelineHandle(id))
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        if self.pending_pass.is_some() {
            self.end_render_pass();
        }
        log::trace!("RecordingBackend: begin pass {:?}", desc.label);
        self.pending_pass = Some((
            PassRecord {
                descriptor: desc.clone(),
                draws: Vec::new(),
            },
            PassState::default(),
        ));
    }

    fn end_render_pass(&mut self) {
        if let Some((pass, _)) = self.pending_pass.take() {
            self.events.push(RecordedEvent::Pass(pass));
        }
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        if let Some((_, state)) = self.pending_pass.as_mut() {
            state.pipeline = Some(pipeline);
        }
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle, dynamic_offsets: &[u32]) {
        if let Some((_, state)) = self.pending_pass.as_mut() {
            state
                .bind_groups
                .insert(index, (bind_group, dynamic_offsets.to_vec()));
        }
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64) {
        if let Some((_, state)) = self.pending_pass.as_mut() {
            state.vertex_buffers.insert(slot, (buffer, offset));
        }
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, offset: u64) {
        if let Some((_, state)) = self.pending_pass.as_mut() {
            state.index_buffer = Some((buffer, offset));
        }
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        if let Some((pass, state)) = self.pending_pass.as_mut() {
            pass.draws.push(DrawRecord {
                pipeline: state.pipeline,
                bind_groups: state.bind_groups.clone(),
                vertex_buffers: state.vertex_buffers.clone(),
                index_buffer: state.index_buffer,
                call: DrawCall::Vertices { vertices, instances },
            });
        }
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        if let Some((pass, state)) = self.pending_pass.as_mut() {
            pass.draws.push(DrawRecord {
                pipeline: state.pipeline,
                bind_groups: state.bind_groups.clone(),
                vertex_buffers: state.vertex_buffers.clone(),
                index_buffer: state.index_buffer,
                call: DrawCall::Indexed {
                    indices,
                    base_vertex,
                    instances,
                },
            });
        }
    }

    fn copy_texture_to_texture(
        &mut self,
        source: TextureHandle,
        destination: TextureHandle,
        width: u32,
        height: u32,
    ) {
        self.end_render_pass();
        self.events.push(RecordedEvent::Copy {
            source,
            destination,
            width,
            height,
        });
    }

    fn submit(&mut self) {
        self.end_render_pass();
        self.events.push(RecordedEvent::Submit);
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(&buffer.0).is_some() {
            self.destroyed_buffers += 1;
        }
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture.0).is_some() {
            self.destroyed_textures += 1;
            self.texture_views.retain(|_, (source, _)| *source != texture);
        }
    }
}
