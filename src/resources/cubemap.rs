//! Environment cube maps and their image-based lighting derivatives.
//!
//! A [`Cubemap`] moves through [`CubemapStage`] in order: a source is loaded
//! (six face images or one equirectangular HDR image), captured into an HDR
//! environment cube with a full mip chain, convolved into a small irradiance cube,
//! and prefiltered into a roughness-indexed specular cube. Each step renders the
//! six faces of its output through one reusable capture [`RenderTarget`].

use std::path::Path;

use glam::{Mat4, Vec3};

use crate::backend::{GraphicsBackend, TextureDescriptor, TextureFormat, TextureKind, TextureUsage, ViewDimension};
use crate::context::{GpuContext, PipelineState, SampledView, Sampling};
use crate::error::{RenderError, RenderResult, ShaderError};
use crate::resources::mesh::{Mesh, MeshData};
use crate::resources::render_target::RenderTarget;
use crate::resources::texture::{mip_count, mip_size, Texture, TextureData};
use crate::shader::ShaderProgram;

/// Texture unit the capture programs read their source from.
pub const CAPTURE_UNIT: u32 = 0;

/// Format of every derived cube.
pub const HDR_FORMAT: TextureFormat = TextureFormat::Rgba16Float;

/// Viewing direction and up vector of each face, in cube face order
/// `+X, -X, +Y, -Y, +Z, -Z`.
pub const CUBE_FACES: [(Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::NEG_Y),
    (Vec3::NEG_X, Vec3::NEG_Y),
    (Vec3::Y, Vec3::Z),
    (Vec3::NEG_Y, Vec3::NEG_Z),
    (Vec3::Z, Vec3::NEG_Y),
    (Vec3::NEG_Z, Vec3::NEG_Y),
];

/// View matrices looking from `eye` through each cube face.
pub fn face_views(eye: Vec3) -> [Mat4; 6] {
    CUBE_FACES.map(|(direction, up)| Mat4::look_at_rh(eye, eye + direction, up))
}

/// View matrices of a capture from the origin.
pub fn capture_views() -> [Mat4; 6] {
    face_views(Vec3::ZERO)
}

/// 90 degree square projection for rendering into a cube face.
///
/// Row 0 of a face is its top edge, so the projection flips Y; this also flips
/// triangle winding, so face captures run without culling.
pub fn cube_projection(near: f32, far: f32) -> Mat4 {
    Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0)) * Mat4::perspective_rh(90f32.to_radians(), 1.0, near, far)
}

pub fn capture_projection() -> Mat4 {
    cube_projection(0.1, 10.0)
}

/// Lifecycle of a [`Cubemap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CubemapStage {
    Unloaded,
    Loaded,
    EnvironmentCaptured,
    IrradianceConvolved,
    SpecularPrefiltered,
}

/// What a cubemap was loaded from.
#[derive(Debug)]
pub enum CubemapSource {
    /// Six faces, already a cube
    Faces(Texture),
    /// One 2D image in latitude/longitude layout
    Equirectangular(Texture),
}

/// Programs used by the capture steps.
pub struct CubemapPrograms {
    pub equirect: ShaderProgram,
    pub cube_copy: ShaderProgram,
    pub irradiance: ShaderProgram,
    pub prefilter: ShaderProgram,
}

impl CubemapPrograms {
    pub fn new<B: GraphicsBackend>(ctx: &mut GpuContext<B>) -> Result<Self, ShaderError> {
        let mut equirect = ShaderProgram::builtin(ctx, "cubemap.vert", "equirect_to_cube.frag")?;
        equirect.try_set_sampler("equirectangular_map", CAPTURE_UNIT)?;
        let mut cube_copy = ShaderProgram::builtin(ctx, "cubemap.vert", "cube_copy.frag")?;
        cube_copy.try_set_sampler("source_map", CAPTURE_UNIT)?;
        let mut irradiance = ShaderProgram::builtin(ctx, "cubemap.vert", "irradiance.frag")?;
        irradiance.try_set_sampler("environment_map", CAPTURE_UNIT)?;
        let mut prefilter = ShaderProgram::builtin(ctx, "cubemap.vert", "prefilter.frag")?;
        prefilter.try_set_sampler("environment_map", CAPTURE_UNIT)?;

        let projection = capture_projection();
        for program in [&mut equirect, &mut cube_copy, &mut irradiance, &mut prefilter] {
            program.try_set("projection", projection)?;
        }
        Ok(Self {
            equirect,
            cube_copy,
            irradiance,
            prefilter,
        })
    }
}

pub struct Cubemap {
    stage: CubemapStage,
    source: Option<CubemapSource>,
    environment: Option<Texture>,
    irradiance: Option<Texture>,
    prefilter: Option<Texture>,
    cube: Mesh,
}

impl Cubemap {
    pub fn new<B: GraphicsBackend>(ctx: &mut GpuContext<B>) -> RenderResult<Self> {
        Ok(Self {
            stage: CubemapStage::Unloaded,
            source: None,
            environment: None,
            irradiance: None,
            prefilter: None,
            cube: Mesh::upload(ctx, &MeshData::skybox_cube())?,
        })
    }

    /// Load six face images, in `+X, -X, +Y, -Y, +Z, -Z` order.
    ///
    /// A face that fails to load is logged and left black.
    pub fn load_faces<B: GraphicsBackend, P: AsRef<Path>>(
        &mut self,
        ctx: &mut GpuContext<B>,
        paths: &[P; 6],
    ) -> RenderResult<()> {
        let faces = paths.each_ref().map(|path| match TextureData::from_file(path, true) {
            Ok(data) => Some(data),
            Err(e) => {
                log::error!("Skybox face: {}", e);
                None
            }
        });
        self.load_face_data(ctx, faces)
    }

    /// Build the source cube from decoded faces. `None` faces are black.
    pub fn load_face_data<B: GraphicsBackend>(
        &mut self,
        ctx: &mut GpuContext<B>,
        faces: [Option<TextureData>; 6],
    ) -> RenderResult<()> {
        let (size, format) = faces
            .iter()
            .flatten()
            .next()
            .map(|face| (face.width, face.format))
            .unwrap_or((1, TextureFormat::Rgba8UnormSrgb));
        let texture = Texture::new(
            ctx,
            &TextureDescriptor {
                label: Some("Skybox Faces".into()),
                width: size,
                height: size,
                layers: 6,
                mip_levels: 1,
                kind: TextureKind::Cube,
                format,
                usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
            },
            ViewDimension::Cube,
            Sampling::default(),
        )?;

        let texel_size = format.bytes_per_pixel() as usize;
        let black: Vec<u8> = [0, 0, 0, 255]
            .into_iter()
            .cycle()
            .take(size as usize * size as usize * texel_size)
            .collect();
        for (layer, face) in faces.iter().enumerate() {
            match face {
                Some(face) if face.width == size && face.height == size && face.format == format => {
                    texture.write_layer(ctx, layer as u32, &face.data)
                }
                Some(face) => {
                    log::error!(
                        "Skybox face {} is {}x{} {:?}, expected {}x{} {:?}; left black",
                        layer,
                        face.width,
                        face.height,
                        face.format,
                        size,
                        size,
                        format
                    );
                    texture.write_layer(ctx, layer as u32, &black);
                }
                None => texture.write_layer(ctx, layer as u32, &black),
            }
        }

        log::info!("Loaded skybox faces ({}x{})", size, size);
        self.set_source(CubemapSource::Faces(texture));
        Ok(())
    }

    /// Load an equirectangular HDR image. A load failure is logged and leaves a black source.
    pub fn load_hdr<B: GraphicsBackend, P: AsRef<Path>>(
        &mut self,
        ctx: &mut GpuContext<B>,
        path: P,
    ) -> RenderResult<()> {
        let data = match TextureData::from_hdr_file(path.as_ref()) {
            Ok(data) => data,
            Err(e) => {
                log::error!("Environment: {}", e);
                TextureData {
                    width: 1,
                    height: 1,
                    format: HDR_FORMAT,
                    data: vec![0; HDR_FORMAT.bytes_per_pixel() as usize],
                }
            }
        };
        self.load_hdr_data(ctx, &data)
    }

    pub fn load_hdr_data<B: GraphicsBackend>(
        &mut self,
        ctx: &mut GpuContext<B>,
        data: &TextureData,
    ) -> RenderResult<()> {
        let texture = Texture::from_data(ctx, "Equirectangular Environment", data, Sampling::default())?;
        log::info!("Loaded HDR environment ({}x{})", data.width, data.height);
        self.set_source(CubemapSource::Equirectangular(texture));
        Ok(())
    }

    fn set_source(&mut self, source: CubemapSource) {
        self.source = Some(source);
        self.environment = None;
        self.irradiance = None;
        self.prefilter = None;
        self.stage = CubemapStage::Loaded;
    }

    /// Render the source into a `size` cube and fill its mip chain.
    pub fn capture_environment<B: GraphicsBackend>(
        &mut self,
        ctx: &mut GpuContext<B>,
        capture: &mut RenderTarget,
        programs: &mut CubemapPrograms,
        size: u32,
    ) -> RenderResult<()> {
        self.require("capture_environment", CubemapStage::Loaded)?;
        let environment = Texture::cube(ctx, "Environment", size, mip_count(size), HDR_FORMAT)?;

        let (program, source) = match &self.source {
            Some(CubemapSource::Faces(faces)) => (&mut programs.cube_copy, faces.sampled()),
            Some(CubemapSource::Equirectangular(image)) => (&mut programs.equirect, image.sampled()),
            None => {
                return Err(RenderError::InvalidCubemapStage {
                    operation: "capture_environment",
                    required: CubemapStage::Loaded,
                    current: CubemapStage::Unloaded,
                })
            }
        };
        ctx.set_pass_label("Environment Capture");
        ctx.bind_texture_unit(CAPTURE_UNIT, source);
        render_faces(ctx, capture, &environment, 0, program, &self.cube)?;

        // Each level is a filtered copy of the one above it.
        ctx.set_pass_label("Environment Mips");
        for mip in 1..environment.mip_levels() {
            let above = environment.mip_view(mip - 1).ok_or_else(|| RenderError::IncompleteTarget {
                label: environment.label().to_string(),
                reason: format!("no mip {}", mip - 1),
            })?;
            ctx.bind_texture_unit(CAPTURE_UNIT, above);
            render_faces(ctx, capture, &environment, mip, &mut programs.cube_copy, &self.cube)?;
        }

        log::info!(
            "Captured environment ({}x{}, {} mips)",
            size,
            size,
            environment.mip_levels()
        );
        self.environment = Some(environment);
        self.irradiance = None;
        self.prefilter = None;
        self.stage = CubemapStage::EnvironmentCaptured;
        Ok(())
    }

    /// Cosine-convolve the environment into a `size` irradiance cube.
    pub fn irradiance_convolution<B: GraphicsBackend>(
        &mut self,
        ctx: &mut GpuContext<B>,
        capture: &mut RenderTarget,
        programs: &mut CubemapPrograms,
        size: u32,
    ) -> RenderResult<()> {
        self.require("irradiance_convolution", CubemapStage::EnvironmentCaptured)?;
        let irradiance = Texture::cube(ctx, "Irradiance", size, 1, HDR_FORMAT)?;
        self.bind_environment(ctx, CAPTURE_UNIT);
        ctx.set_pass_label("Irradiance Convolution");
        render_faces(ctx, capture, &irradiance, 0, &mut programs.irradiance, &self.cube)?;

        log::info!("Convolved irradiance ({}x{})", size, size);
        self.irradiance = Some(irradiance);
        self.stage = self.stage.max(CubemapStage::IrradianceConvolved);
        Ok(())
    }

    /// Prefilter the environment into `levels` mips of a `size` cube, mip `m`
    /// at roughness `m / (levels - 1)`.
    pub fn specular_prefilter<B: GraphicsBackend>(
        &mut self,
        ctx: &mut GpuContext<B>,
        capture: &mut RenderTarget,
        programs: &mut CubemapPrograms,
        size: u32,
        levels: u32,
    ) -> RenderResult<()> {
        self.require("specular_prefilter", CubemapStage::IrradianceConvolved)?;
        let levels = levels.clamp(1, mip_count(size));
        let prefilter = Texture::cube(ctx, "Prefiltered Environment", size, levels, HDR_FORMAT)?;
        let resolution = self.environment.as_ref().map_or(size, |e| e.width());

        self.bind_environment(ctx, CAPTURE_UNIT);
        ctx.set_pass_label("Specular Prefilter");
        programs.prefilter.try_set("resolution", resolution as f32)?;
        for mip in 0..levels {
            programs.prefilter.try_set("roughness", prefilter_roughness(mip, levels))?;
            render_faces(ctx, capture, &prefilter, mip, &mut programs.prefilter, &self.cube)?;
        }

        log::info!("Prefiltered specular ({}x{}, {} levels)", size, size, levels);
        self.prefilter = Some(prefilter);
        self.stage = CubemapStage::SpecularPrefiltered;
        Ok(())
    }

    /// Draw the sky cube with `program`, which reads the cube from `unit`.
    ///
    /// Before capture, a face source is drawn as is; an HDR source has no cube
    /// yet and the unit is left to the context's black fallback.
    pub fn draw<B: GraphicsBackend>(
        &self,
        ctx: &mut GpuContext<B>,
        program: &ShaderProgram,
        unit: u32,
    ) -> RenderResult<()> {
        if self.stage == CubemapStage::Unloaded {
            return Err(RenderError::InvalidCubemapStage {
                operation: "draw",
                required: CubemapStage::Loaded,
                current: self.stage,
            });
        }
        match self.sky_view() {
            Some(view) => ctx.bind_texture_unit(unit, view),
            None => ctx.unbind_texture_unit(unit),
        }
        self.cube.draw(ctx, program)
    }

    fn bind_environment<B: GraphicsBackend>(&self, ctx: &mut GpuContext<B>, unit: u32) {
        if let Some(environment) = &self.environment {
            environment.bind(ctx, unit);
        }
    }

    fn require(&self, operation: &'static str, required: CubemapStage) -> RenderResult<()> {
        if self.stage < required {
            let err = RenderError::InvalidCubemapStage {
                operation,
                required,
                current: self.stage,
            };
            log::error!("{}", err);
            return Err(err);
        }
        Ok(())
    }

    /// The cube the sky shows: the captured environment, else the raw faces.
    pub fn sky_view(&self) -> Option<SampledView> {
        match (&self.environment, &self.source) {
            (Some(environment), _) => Some(environment.sampled()),
            (None, Some(CubemapSource::Faces(faces))) => Some(faces.sampled()),
            _ => None,
        }
    }

    pub fn stage(&self) -> CubemapStage {
        self.stage
    }

    pub fn source(&self) -> Option<&CubemapSource> {
        self.source.as_ref()
    }

    pub fn environment(&self) -> Option<&Texture> {
        self.environment.as_ref()
    }

    pub fn irradiance(&self) -> Option<&Texture> {
        self.irradiance.as_ref()
    }

    pub fn prefilter(&self) -> Option<&Texture> {
        self.prefilter.as_ref()
    }

    /// Highest mip of the prefiltered cube, the LOD for roughness 1.
    pub fn max_reflection_lod(&self) -> f32 {
        self.prefilter
            .as_ref()
            .map_or(0.0, |p| p.mip_levels().saturating_sub(1) as f32)
    }
}

impl std::fmt::Debug for Cubemap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cubemap")
            .field("stage", &self.stage)
            .field("source", &self.source)
            .finish()
    }
}

/// Roughness a prefilter mip is integrated for.
pub fn prefilter_roughness(mip: u32, levels: u32) -> f32 {
    if levels <= 1 {
        0.0
    } else {
        mip as f32 / (levels - 1) as f32
    }
}

/// Draw `cube` once per face of `target` at `mip`, through `capture`.
fn render_faces<B: GraphicsBackend>(
    ctx: &mut GpuContext<B>,
    capture: &mut RenderTarget,
    target: &Texture,
    mip: u32,
    program: &mut ShaderProgram,
    cube: &Mesh,
) -> RenderResult<()> {
    let size = mip_size(target.width(), mip);
    capture.resize(ctx, size, size)?;
    ctx.set_state(PipelineState::fullscreen());
    for (face, view) in capture_views().into_iter().enumerate() {
        capture.attach_color_face(target, face as u32, mip)?;
        capture.is_complete()?;
        capture.clear(ctx)?;
        program.try_set("view", view)?;
        cube.draw(ctx, program)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    fn setup() -> (GpuContext<RecordingBackend>, RenderTarget, CubemapPrograms, Cubemap) {
        let mut ctx = GpuContext::new(RecordingBackend::default()).unwrap();
        let programs = CubemapPrograms::new(&mut ctx).unwrap();
        let cubemap = Cubemap::new(&mut ctx).unwrap();
        (ctx, RenderTarget::new("IBL Capture"), programs, cubemap)
    }

    fn hdr(width: u32, height: u32) -> TextureData {
        TextureData {
            width,
            height,
            format: HDR_FORMAT,
            data: vec![0; (width * height * 8) as usize],
        }
    }

    #[test]
    fn test_steps_must_run_in_order() {
        let (mut ctx, mut capture, mut programs, mut cubemap) = setup();
        assert!(matches!(
            cubemap.capture_environment(&mut ctx, &mut capture, &mut programs, 16),
            Err(RenderError::InvalidCubemapStage {
                required: CubemapStage::Loaded,
                current: CubemapStage::Unloaded,
                ..
            })
        ));

        cubemap.load_hdr_data(&mut ctx, &hdr(8, 4)).unwrap();
        assert!(matches!(
            cubemap.specular_prefilter(&mut ctx, &mut capture, &mut programs, 16, 5),
            Err(RenderError::InvalidCubemapStage {
                current: CubemapStage::Loaded,
                ..
            })
        ));

        cubemap.capture_environment(&mut ctx, &mut capture, &mut programs, 16).unwrap();
        cubemap.irradiance_convolution(&mut ctx, &mut capture, &mut programs, 4).unwrap();
        cubemap.specular_prefilter(&mut ctx, &mut capture, &mut programs, 16, 5).unwrap();
        assert_eq!(cubemap.stage(), CubemapStage::SpecularPrefiltered);
        assert_eq!(cubemap.max_reflection_lod(), 4.0);

        // Re-running a finished step keeps the later stage.
        cubemap.irradiance_convolution(&mut ctx, &mut capture, &mut programs, 4).unwrap();
        assert_eq!(cubemap.stage(), CubemapStage::SpecularPrefiltered);
    }

    #[test]
    fn test_capture_draws_six_faces_per_mip() {
        let (mut ctx, mut capture, mut programs, mut cubemap) = setup();
        cubemap.load_hdr_data(&mut ctx, &hdr(8, 4)).unwrap();
        ctx.backend_mut().clear_events();
        cubemap.capture_environment(&mut ctx, &mut capture, &mut programs, 16).unwrap();
        ctx.submit();

        assert_eq!(ctx.backend().passes_labeled("Environment Capture").count(), 6);
        // 16 -> 8 -> 4 -> 2 -> 1
        assert_eq!(ctx.backend().passes_labeled("Environment Mips").count(), 6 * 4);
        for pass in ctx.backend().passes() {
            assert_eq!(pass.draws.len(), 1);
            assert_eq!(pass.draws[0].call.element_count(), 36);
        }
        assert_eq!(capture.depth_size(), Some((1, 1)));
    }

    #[test]
    fn test_missing_faces_are_black() {
        let (mut ctx, _, _, mut cubemap) = setup();
        let face = TextureData {
            width: 2,
            height: 2,
            format: TextureFormat::Rgba8UnormSrgb,
            data: vec![255; 16],
        };
        let faces = [Some(face.clone()), None, Some(face.clone()), None, Some(face), None];
        cubemap.load_face_data(&mut ctx, faces).unwrap();
        assert_eq!(cubemap.stage(), CubemapStage::Loaded);

        let writes = ctx.backend().texture_writes();
        let face_writes: Vec<_> = writes[writes.len() - 6..].to_vec();
        for (layer, (_, region, len)) in face_writes.iter().enumerate() {
            assert_eq!(region.layer, layer as u32);
            assert_eq!(*len, 16);
        }
        assert!(cubemap.sky_view().is_some());
    }

    #[test]
    fn test_prefilter_roughness_spans_unit_range() {
        let roughness: Vec<f32> = (0..5).map(|mip| prefilter_roughness(mip, 5)).collect();
        assert_eq!(roughness, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(prefilter_roughness(0, 1), 0.0);
    }
}
