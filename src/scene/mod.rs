//! Scene content consumed by the renderer

mod camera;
mod camera_controller;
pub mod demo;
mod light;
mod transform;

pub use camera::*;
pub use camera_controller::*;
pub use light::*;
pub use transform::*;

use glam::Vec3;

use crate::resources::{Cubemap, Model};

/// Models with their transforms, the lights and the environment.
///
/// The renderer sizes its point shadow storage from the point light count it was
/// built with; a scene drawn by that renderer must keep the same count.
pub struct Scene {
    models: Vec<Model>,
    transforms: Vec<Transform>,
    pub directional_light: DirectionalLight,
    point_lights: Vec<PointLight>,
    /// Flashlight, moved to the camera every frame when present
    pub spot_light: Option<SpotLight>,
    pub cubemap: Cubemap,
}

impl Scene {
    pub fn new(cubemap: Cubemap) -> Self {
        Self {
            models: Vec::new(),
            transforms: Vec::new(),
            directional_light: DirectionalLight::default(),
            point_lights: Vec::new(),
            spot_light: None,
            cubemap,
        }
    }

    /// Add a model and return its index.
    pub fn add_model(&mut self, model: Model, transform: Transform) -> usize {
        self.models.push(model);
        self.transforms.push(transform);
        self.models.len() - 1
    }

    pub fn add_point_light(&mut self, light: PointLight) {
        self.point_lights.push(light);
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    pub fn transform_mut(&mut self, index: usize) -> Option<&mut Transform> {
        self.transforms.get_mut(index)
    }

    pub fn models_mut(&mut self) -> &mut [Model] {
        &mut self.models
    }

    /// Models paired with their transforms, in insertion order.
    pub fn objects(&self) -> impl Iterator<Item = (&Model, &Transform)> {
        self.models.iter().zip(&self.transforms)
    }

    pub fn point_lights(&self) -> &[PointLight] {
        &self.point_lights
    }

    pub fn point_lights_mut(&mut self) -> &mut [PointLight] {
        &mut self.point_lights
    }

    /// World-space bounds of every model, `None` for an empty scene.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        self.objects()
            .filter_map(|(model, transform)| model.bounds().map(|b| transform.transform_bounds(b)))
            .reduce(|(min_a, max_a), (min_b, max_b)| (min_a.min(min_b), max_a.max(max_b)))
    }

    /// Center and radius of a sphere enclosing every model.
    pub fn bounding_sphere(&self) -> (Vec3, f32) {
        match self.bounds() {
            Some((min, max)) => ((min + max) * 0.5, ((max - min) * 0.5).length()),
            None => (Vec3::ZERO, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::context::GpuContext;
    use crate::resources::{Material, MeshData};

    #[test]
    fn test_bounds_follow_transforms() {
        let mut ctx = GpuContext::new(RecordingBackend::default()).unwrap();
        let mut scene = Scene::new(Cubemap::new(&mut ctx).unwrap());
        assert_eq!(scene.bounding_sphere(), (Vec3::ZERO, 1.0));

        let cube = |ctx: &mut GpuContext<RecordingBackend>| {
            Model::from_mesh(ctx, &MeshData::cube(), Material::new()).unwrap()
        };
        let a = cube(&mut ctx);
        let b = cube(&mut ctx);
        scene.add_model(a, Transform::from_position(Vec3::new(-2.0, 0.0, 0.0)));
        let index = scene.add_model(b, Transform::from_position(Vec3::new(2.0, 0.0, 0.0)));
        assert_eq!(index, 1);
        assert_eq!(scene.objects().count(), 2);

        let (min, max) = scene.bounds().unwrap();
        assert!((min - Vec3::new(-2.5, -0.5, -0.5)).length() < 1e-6);
        assert!((max - Vec3::new(2.5, 0.5, 0.5)).length() < 1e-6);
        let (center, radius) = scene.bounding_sphere();
        assert!(center.length() < 1e-6);
        assert!(radius > 2.5);
    }
}
