//! The viewer's built-in scene.

use std::f32::consts::TAU;
use std::path::{Path, PathBuf};

use glam::Vec3;

use crate::backend::GraphicsBackend;
use crate::context::GpuContext;
use crate::error::RenderResult;
use crate::resources::{Cubemap, Material, MaterialParams, MeshData, Model, Texture};

use super::{DirectionalLight, PointLight, Scene, SpotLight, Transform};

/// Skybox face files inside a skybox directory, in cube face order.
pub const SKYBOX_FACES: [&str; 6] = ["right.jpg", "left.jpg", "top.jpg", "bottom.jpg", "front.jpg", "back.jpg"];

/// Where the environment comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    /// Directory holding the six [`SKYBOX_FACES`]
    Skybox(PathBuf),
    /// Equirectangular `.hdr` image
    Hdr(PathBuf),
}

#[derive(Debug, Clone)]
pub struct DemoConfig {
    /// Root holding `textures/`
    pub assets: PathBuf,
    pub environment: Environment,
    pub point_lights: usize,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            assets: PathBuf::from("res"),
            environment: Environment::Skybox(PathBuf::from("res/cubemaps/mountainlake")),
            point_lights: 2,
        }
    }
}

/// Point lights of the demo: two above the front corners, then a ring.
pub fn point_lights(count: usize) -> Vec<PointLight> {
    const FIXED: [Vec3; 2] = [Vec3::new(-2.0, 3.0, 3.0), Vec3::new(2.0, 3.0, 3.0)];
    let ring = count.saturating_sub(FIXED.len()).max(1) as f32;
    (0..count)
        .map(|i| {
            let position = FIXED.get(i).copied().unwrap_or_else(|| {
                let angle = TAU * (i - FIXED.len()) as f32 / ring;
                Vec3::new(4.0 * angle.cos(), 3.0, 4.0 * angle.sin())
            });
            PointLight::new(position, Vec3::ONE, 10.0, 10.0)
        })
        .collect()
}

/// Textured cubes around a metal floor with a sphere in the middle.
///
/// Missing texture or environment files leave black textures behind.
pub fn build<B: GraphicsBackend>(ctx: &mut GpuContext<B>, config: &DemoConfig) -> RenderResult<Scene> {
    let mut cubemap = Cubemap::new(ctx)?;
    match &config.environment {
        Environment::Skybox(dir) => {
            let faces = SKYBOX_FACES.map(|face| dir.join(face));
            cubemap.load_faces(ctx, &faces)?;
        }
        Environment::Hdr(path) => cubemap.load_hdr(ctx, path)?,
    }

    let mut scene = Scene::new(cubemap);
    let textures = config.assets.join("textures");
    let cubes = [
        ("red.jpg", Vec3::new(-2.0, 0.15, -2.0), 0.2),
        ("white.jpg", Vec3::new(2.0, 0.15, -2.0), 0.2),
        ("brickwall.jpg", Vec3::new(2.0, 0.45, 2.0), 0.75),
        ("green.jpg", Vec3::new(-2.0, 0.15, 2.0), 0.2),
    ];
    for (file, position, scale) in cubes {
        let material = Material::new().with_albedo_map(albedo(ctx, &textures, file)?);
        let model = Model::from_mesh(ctx, &MeshData::cube(), material)?;
        scene.add_model(model, Transform::from_position_scale(position, Vec3::splat(scale)));
    }

    let floor = Material::new()
        .with_params(MaterialParams {
            metallic: 0.8,
            roughness: 0.4,
            ..Default::default()
        })
        .with_albedo_map(albedo(ctx, &textures, "metal.png")?);
    let floor = Model::from_mesh(ctx, &MeshData::quad(), floor)?;
    scene.add_model(floor, Transform::from_position_scale(Vec3::new(0.0, 0.05, 0.0), Vec3::new(3.0, 1.0, 3.0)));

    let sphere = Material::new().with_params(MaterialParams {
        albedo: Vec3::new(0.9, 0.6, 0.2),
        metallic: 1.0,
        roughness: 0.3,
        ao: 1.0,
    });
    let sphere = Model::from_mesh(ctx, &MeshData::sphere(64, 64), sphere)?;
    scene.add_model(sphere, Transform::from_position_scale(Vec3::new(0.0, 0.55, 0.0), Vec3::splat(0.5)));

    scene.directional_light = DirectionalLight::new(Vec3::new(2.0, -4.0, 1.0), Vec3::ONE, 1.0);
    for light in point_lights(config.point_lights) {
        scene.add_point_light(light);
    }
    scene.spot_light = Some(SpotLight::default());

    log::info!(
        "Demo scene: {} models, {} point lights",
        scene.models().len(),
        scene.point_lights().len()
    );
    Ok(scene)
}

fn albedo<B: GraphicsBackend>(ctx: &mut GpuContext<B>, dir: &Path, file: &str) -> RenderResult<Texture> {
    Texture::load_or_black(ctx, dir.join(file), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::resources::CubemapStage;

    #[test]
    fn test_point_light_placement() {
        let lights = point_lights(5);
        assert_eq!(lights.len(), 5);
        assert_eq!(lights[0].position(), Vec3::new(-2.0, 3.0, 3.0));
        assert_eq!(lights[1].position(), Vec3::new(2.0, 3.0, 3.0));
        assert!((lights[2].position() - Vec3::new(4.0, 3.0, 0.0)).length() < 1e-5);
        assert!(point_lights(0).is_empty());
    }

    #[test]
    fn test_build_with_missing_assets() {
        let mut ctx = GpuContext::new(RecordingBackend::default()).unwrap();
        let config = DemoConfig {
            assets: PathBuf::from("does/not/exist"),
            environment: Environment::Hdr(PathBuf::from("does/not/exist.hdr")),
            point_lights: 3,
        };
        let scene = build(&mut ctx, &config).unwrap();
        assert_eq!(scene.models().len(), 6);
        assert_eq!(scene.point_lights().len(), 3);
        assert_eq!(scene.cubemap.stage(), CubemapStage::Loaded);
        assert!(scene.spot_light.is_some());
    }
}
