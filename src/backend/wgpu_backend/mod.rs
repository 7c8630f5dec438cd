//! [`GraphicsBackend`] on wgpu, presenting to a winit window.
//!
//! The surface is configured with a linear format and also exposes its sRGB
//! twin as a view format, so only the pass that targets the sRGB view encodes.

mod convert;
mod pass;
mod registry;

use std::ops::Range;
use std::sync::Arc;

use winit::window::Window;

use crate::backend::traits::*;
use crate::backend::types::*;
use pass::{Command, RecordedPass};
use registry::{Registry, Resource, TextureEntry};

/// The surface image acquired for the frame in flight and its two views.
struct Frame {
    texture: wgpu::SurfaceTexture,
    linear: TextureViewHandle,
    srgb: TextureViewHandle,
}

pub struct WgpuBackend {
    _instance: wgpu::Instance,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    srgb_view_format: Option<wgpu::TextureFormat>,
    registry: Registry,
    frame: Option<Frame>,
    encoder: Option<wgpu::CommandEncoder>,
    pass: Option<RecordedPass>,
}

/// Prefer a linear surface format and pair it with its sRGB counterpart.
fn pick_surface_format(
    formats: &[wgpu::TextureFormat],
) -> BackendResult<(wgpu::TextureFormat, Option<wgpu::TextureFormat>)> {
    let format = formats
        .iter()
        .copied()
        .find(|format| !format.is_srgb())
        .or_else(|| formats.first().copied())
        .ok_or_else(|| BackendError::Surface("no supported formats".into()))?;
    let srgb = format.add_srgb_suffix();
    Ok((format, (srgb != format).then_some(srgb)))
}

/// Shrink `width` x `height` to fit in `max` along both axes, keeping the aspect ratio.
fn fit_within(width: u32, height: u32, max: u32) -> (u32, u32) {
    let largest = width.max(height);
    if largest <= max {
        return (width.max(1), height.max(1));
    }
    let scale = max as f64 / largest as f64;
    let shrink = |side: u32| ((side as f64 * scale) as u32).clamp(1, max);
    (shrink(width), shrink(height))
}

fn encoder_for<'a>(slot: &'a mut Option<wgpu::CommandEncoder>, device: &wgpu::Device) -> &'a mut wgpu::CommandEncoder {
    slot.get_or_insert_with(|| {
        device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Renderer Commands"),
        })
    })
}

fn base_level(texture: &wgpu::Texture) -> wgpu::ImageCopyTexture<'_> {
    wgpu::ImageCopyTexture {
        texture,
        mip_level: 0,
        origin: wgpu::Origin3d::ZERO,
        aspect: wgpu::TextureAspect::All,
    }
}

impl WgpuBackend {
    pub fn new(window: Arc<Window>, vsync: bool) -> BackendResult<Self> {
        pollster::block_on(Self::new_async(window, vsync))
    }

    /// `WGPU_BACKEND` and `WGPU_POWER_PREF` override the adapter choice.
    pub async fn new_async(window: Arc<Window>, vsync: bool) -> BackendResult<Self> {
        let backends = wgpu::util::backend_bits_from_env().unwrap_or(wgpu::Backends::all());
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });
        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| BackendError::Surface(e.to_string()))?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::util::power_preference_from_env()
                    .unwrap_or(wgpu::PowerPreference::HighPerformance),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::NoAdapter(format!("none of {backends:?} can present to this window")))?;

        let info = adapter.get_info();
        log::info!("Using {} on {:?}", info.name, info.backend);

        // Point light shadows live in one cube array.
        if !adapter
            .get_downlevel_capabilities()
            .flags
            .contains(wgpu::DownlevelFlags::CUBE_ARRAY_TEXTURES)
        {
            return Err(BackendError::NoAdapter(format!("{} lacks cube array textures", info.name)));
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Deferred Renderer"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::Device(e.to_string()))?;

        let caps = surface.get_capabilities(&adapter);
        let (format, srgb_view_format) = pick_surface_format(&caps.formats)?;
        let size = window.inner_size();
        let (width, height) = fit_within(size.width, size.height, device.limits().max_texture_dimension_2d);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode: if vsync {
                wgpu::PresentMode::AutoVsync
            } else {
                wgpu::PresentMode::AutoNoVsync
            },
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: srgb_view_format.into_iter().collect(),
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        log::info!("Surface {:?} {}x{}, sRGB view {:?}", format, width, height, srgb_view_format);

        Ok(Self {
            _instance: instance,
            surface,
            device,
            queue,
            config,
            srgb_view_format,
            registry: Registry::default(),
            frame: None,
            encoder: None,
            pass: None,
        })
    }

    fn record(&mut self, command: Command) {
        match self.pass.as_mut() {
            Some(pass) => pass.push(command),
            None => log::warn!("Pass command issued outside a render pass"),
        }
    }

    fn surface_view(&mut self, texture: &wgpu::SurfaceTexture, format: Option<wgpu::TextureFormat>) -> TextureViewHandle {
        let view = texture.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Swapchain"),
            format,
            ..Default::default()
        });
        TextureViewHandle(self.registry.insert(Resource::View(view)))
    }
}

impl GraphicsBackend for WgpuBackend {
    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        let (width, height) = fit_within(width, height, self.device.limits().max_texture_dimension_2d);
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn swapchain_format(&self) -> TextureFormat {
        convert::surface_format(self.config.format)
    }

    fn begin_frame(&mut self) -> BackendResult<FrameContext> {
        let texture = self.surface.get_current_texture().map_err(|e| match e {
            wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                self.surface.configure(&self.device, &self.config);
                BackendError::SurfaceLost
            }
            wgpu::SurfaceError::OutOfMemory => BackendError::OutOfMemory,
            _ => BackendError::Surface(e.to_string()),
        })?;
        let linear = self.surface_view(&texture, None);
        let srgb = self.surface_view(&texture, self.srgb_view_format);
        self.frame = Some(Frame { texture, linear, srgb });
        Ok(FrameContext {
            swapchain_view: linear,
            swapchain_srgb_view: srgb,
            width: self.config.width,
            height: self.config.height,
        })
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        self.submit();
        if let Some(frame) = self.frame.take() {
            self.registry.remove(frame.linear.0);
            self.registry.remove(frame.srgb.0);
            frame.texture.present();
        }
        Ok(())
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        validate_buffer(desc)?;
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: desc.label.as_deref(),
            size: desc.size,
            usage: desc.usage.into(),
            mapped_at_creation: false,
        });
        Ok(BufferHandle(self.registry.insert(Resource::Buffer(buffer))))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        match self.registry.buffer(buffer) {
            Ok(target) => self.queue.write_buffer(target, offset, data),
            Err(e) => log::warn!("Buffer write dropped: {}", e),
        }
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        validate_texture(desc)?;
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.layers.max(1),
            },
            mip_level_count: desc.mip_levels.max(1),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format.into(),
            usage: desc.usage.into(),
            view_formats: &[],
        });
        let entry = TextureEntry {
            texture,
            desc: desc.clone(),
            views: Vec::new(),
        };
        Ok(TextureHandle(self.registry.insert(Resource::Texture(entry))))
    }

    fn create_texture_view(
        &mut self,
        texture: TextureHandle,
        desc: &TextureViewDescriptor,
    ) -> BackendResult<TextureViewHandle> {
        let entry = self.registry.texture(texture)?;
        let (mips, layers) = resolve_view_range(&entry.desc, desc)?;
        let view = entry.texture.create_view(&wgpu::TextureViewDescriptor {
            label: desc.label.as_deref(),
            format: None,
            dimension: Some(desc.dimension.unwrap_or_else(|| entry.desc.natural_dimension()).into()),
            aspect: if entry.desc.format.is_depth() {
                wgpu::TextureAspect::DepthOnly
            } else {
                wgpu::TextureAspect::All
            },
            base_mip_level: mips.start,
            mip_level_count: Some(mips.end - mips.start),
            base_array_layer: layers.start,
            array_layer_count: Some(layers.end - layers.start),
        });
        self.registry.add_view(texture, view)
    }

    fn write_texture(&mut self, texture: TextureHandle, region: TextureRegion, data: &[u8]) {
        let entry = match self.registry.texture(texture) {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Texture upload dropped: {}", e);
                return;
            }
        };
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &entry.texture,
                mip_level: region.mip_level,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: region.layer,
                },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(region.width * entry.desc.format.bytes_per_pixel()),
                rows_per_image: Some(region.height),
            },
            wgpu::Extent3d {
                width: region.width,
                height: region.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        let filter = desc.filter.into();
        let address = desc.address_mode.into();
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: desc.label.as_deref(),
            address_mode_u: address,
            address_mode_v: address,
            address_mode_w: address,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: filter,
            compare: desc.compare.map(Into::into),
            ..Default::default()
        });
        Ok(SamplerHandle(self.registry.insert(Resource::Sampler(sampler))))
    }

    fn create_bind_group_layout(&mut self, entries: &[BindGroupLayoutEntry]) -> BackendResult<BindGroupLayoutHandle> {
        let entries: Vec<_> = entries.iter().map(convert::layout_entry).collect();
        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor { label: None, entries: &entries });
        Ok(BindGroupLayoutHandle(self.registry.insert(Resource::BindGroupLayout(layout))))
    }

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        let registry = &self.registry;
        let resources = entries
            .iter()
            .map(|(binding, entry)| {
                let resource = match entry {
                    BindGroupEntry::Buffer { buffer, offset, size } => {
                        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: registry.buffer(*buffer)?,
                            offset: *offset,
                            size: convert::buffer_size(*size),
                        })
                    }
                    BindGroupEntry::Texture(view) => wgpu::BindingResource::TextureView(registry.view(*view)?),
                    BindGroupEntry::Sampler(sampler) => wgpu::BindingResource::Sampler(registry.sampler(*sampler)?),
                };
                Ok::<_, BackendError>(wgpu::BindGroupEntry {
                    binding: *binding,
                    resource,
                })
            })
            .collect::<BackendResult<Vec<_>>>()?;
        let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout: registry.bind_group_layout(layout)?,
            entries: &resources,
        });
        Ok(BindGroupHandle(self.registry.insert(Resource::BindGroup(group))))
    }

    fn create_render_pipeline(&mut self, desc: &RenderPipelineDescriptor) -> BackendResult<RenderPipelineHandle> {
        let module = |stage: &ShaderStageSource| {
            self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: stage.label.as_deref(),
                source: wgpu::ShaderSource::Wgsl(stage.source.as_str().into()),
            })
        };
        let vertex_module = module(&desc.vertex);
        let fragment = desc.fragment.as_ref().map(|stage| (stage, module(stage)));

        let bind_group_layouts = desc
            .bind_group_layouts
            .iter()
            .map(|handle| self.registry.bind_group_layout(*handle))
            .collect::<BackendResult<Vec<_>>>()?;
        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: desc.label.as_deref(),
            bind_group_layouts: &bind_group_layouts,
            push_constant_ranges: &[],
        });

        let attributes: Vec<_> = desc.vertex_layouts.iter().map(convert::vertex_attributes).collect();
        let buffers: Vec<_> = desc
            .vertex_layouts
            .iter()
            .zip(&attributes)
            .map(|(layout, attributes)| wgpu::VertexBufferLayout {
                array_stride: layout.array_stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes,
            })
            .collect();
        let targets: Vec<_> = desc.color_targets.iter().map(convert::color_target).collect();

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: desc.label.as_deref(),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: &desc.vertex.entry_point,
                buffers: &buffers,
                compilation_options: Default::default(),
            },
            fragment: fragment.as_ref().map(|(stage, module)| wgpu::FragmentState {
                module,
                entry_point: &stage.entry_point,
                targets: &targets,
                compilation_options: Default::default(),
            }),
            primitive: convert::primitive(desc.primitive_topology, desc.cull_mode),
            depth_stencil: desc.depth_stencil.as_ref().map(convert::depth_stencil),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });
        Ok(RenderPipelineHandle(self.registry.insert(Resource::Pipeline(pipeline))))
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.registry.remove(buffer.0);
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.registry.remove_texture(texture);
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        self.end_render_pass();
        self.pass = Some(RecordedPass::new(desc));
    }

    fn end_render_pass(&mut self) {
        if let Some(pass) = self.pass.take() {
            pass.encode(encoder_for(&mut self.encoder, &self.device), &self.registry);
        }
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        self.record(Command::Pipeline(pipeline));
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle, dynamic_offsets: &[u32]) {
        self.record(Command::BindGroup {
            index,
            group: bind_group,
            offsets: dynamic_offsets.to_vec(),
        });
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64) {
        self.record(Command::VertexBuffer { slot, buffer, offset });
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, offset: u64) {
        self.record(Command::IndexBuffer { buffer, offset });
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.record(Command::Draw { vertices, instances });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.record(Command::DrawIndexed {
            indices,
            base_vertex,
            instances,
        });
    }

    fn copy_texture_to_texture(&mut self, source: TextureHandle, destination: TextureHandle, width: u32, height: u32) {
        self.end_render_pass();
        let (source, destination) = match (self.registry.texture(source), self.registry.texture(destination)) {
            (Ok(source), Ok(destination)) => (source, destination),
            (Err(e), _) | (_, Err(e)) => {
                log::warn!("Texture copy dropped: {}", e);
                return;
            }
        };
        encoder_for(&mut self.encoder, &self.device).copy_texture_to_texture(
            base_level(&source.texture),
            base_level(&destination.texture),
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn submit(&mut self) {
        self.end_render_pass();
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(Some(encoder.finish()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::fits(1280, 720, 8192, (1280, 720))]
    #[case::zero(0, 0, 8192, (1, 1))]
    #[case::wide(16384, 4096, 8192, (8192, 2048))]
    #[case::tall(1000, 4000, 2000, (500, 2000))]
    fn test_fit_within(#[case] width: u32, #[case] height: u32, #[case] max: u32, #[case] expected: (u32, u32)) {
        assert_eq!(fit_within(width, height, max), expected);
    }

    #[test]
    fn test_linear_surface_format_preferred() {
        let formats = [wgpu::TextureFormat::Bgra8UnormSrgb, wgpu::TextureFormat::Bgra8Unorm];
        let (format, srgb) = pick_surface_format(&formats).unwrap();
        assert_eq!(format, wgpu::TextureFormat::Bgra8Unorm);
        assert_eq!(srgb, Some(wgpu::TextureFormat::Bgra8UnormSrgb));
    }

    #[test]
    fn test_surface_without_srgb_twin() {
        let (format, srgb) = pick_surface_format(&[wgpu::TextureFormat::Rgba16Float]).unwrap();
        assert_eq!(format, wgpu::TextureFormat::Rgba16Float);
        assert_eq!(srgb, None);
        assert!(pick_surface_format(&[]).is_err());
    }
}
