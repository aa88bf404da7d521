use std::f32::consts::{FRAC_PI_2, FRAC_PI_3, PI};

use glam::{Mat4, Quat, Vec3, Vec4};

use super::aabb::Aabb;
use super::scene_tree::{Scene, SceneNodeId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective {
        yfov: f32,
        znear: f32,
        /// `None` projects to infinity.
        zfar: Option<f32>,
        aspect_ratio: Option<f32>,
    },
    Orthographic {
        xmag: f32,
        ymag: f32,
        znear: f32,
        zfar: f32,
    },
}

impl Projection {
    /// Projection for the current viewport. The viewport aspect always wins over
    /// an authored `aspectRatio` so presets do not stretch on resize.
    pub fn matrix(&self, viewport_aspect: f32) -> Mat4 {
        match *self {
            Projection::Perspective { yfov, znear, zfar: Some(zfar), .. } => {
                Mat4::perspective_rh(yfov, viewport_aspect, znear, zfar)
            }
            Projection::Perspective { yfov, znear, zfar: None, .. } => {
                Mat4::perspective_infinite_rh(yfov, viewport_aspect, znear)
            }
            Projection::Orthographic { ymag, znear, zfar, .. } => Mat4::from_cols(
                Vec4::new(1.0 / (ymag * viewport_aspect), 0.0, 0.0, 0.0),
                Vec4::new(0.0, 1.0 / ymag, 0.0, 0.0),
                Vec4::new(0.0, 0.0, 1.0 / (znear - zfar), 0.0),
                Vec4::new(0.0, 0.0, znear / (znear - zfar), 1.0),
            ),
        }
    }
}

/// A camera authored in the asset, bound to the node that carries it.
#[derive(Debug, Clone)]
pub struct PresetCamera {
    pub node: SceneNodeId,
    pub projection: Projection,
    pub view: Mat4,
    pub eye: Vec3,
    /// Set whenever the node's global transform changed since `update_view`.
    pub needs_update: bool,
}

impl PresetCamera {
    pub fn new(node: SceneNodeId, projection: Projection) -> Self {
        Self { node, projection, view: Mat4::IDENTITY, eye: Vec3::ZERO, needs_update: true }
    }

    pub fn update_view(&mut self, global_transform: &Mat4) {
        self.eye = global_transform.transform_point3(Vec3::ZERO);
        self.view = global_transform.inverse();
        self.needs_update = false;
    }
}

/// User-controlled camera orbiting the scene bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitCamera {
    pub center: Vec3,
    pub radius: f32,
    /// Radius the camera was framed with; zoom never goes below a sixteenth of it.
    pub base_radius: f32,
    pub theta: f32,
    pub phi: f32,
    pub yfov: f32,
    pub needs_update: bool,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            radius: 3.0,
            base_radius: 3.0,
            theta: 0.0,
            phi: 0.0,
            yfov: FRAC_PI_3,
            needs_update: true,
        }
    }
}

impl OrbitCamera {
    pub fn framing(aabb: &Aabb) -> Self {
        let mut camera = Self::default();
        camera.reset(aabb);
        camera
    }

    pub fn reset(&mut self, aabb: &Aabb) {
        self.center = aabb.center();
        self.radius = aabb.radius();
        self.base_radius = self.radius;
        self.theta = 0.0;
        self.phi = 0.0;
        self.yfov = FRAC_PI_3;
        self.needs_update = true;
    }

    /// Rotates by a drag expressed as a fraction of the viewport size.
    pub fn orbit(&mut self, dx: f32, dy: f32) {
        self.theta -= dx * PI * 2.0;
        self.phi = (self.phi - dy * PI).clamp(-FRAC_PI_2 + 0.1, FRAC_PI_2 - 0.1);
        self.needs_update = true;
    }

    pub fn zoom(&mut self, delta: f32) {
        self.radius = (self.radius + delta * 0.001 * self.base_radius).max(self.base_radius / 16.0);
        self.needs_update = true;
    }

    pub fn eye(&self) -> Vec3 {
        let rotation = Quat::from_rotation_y(self.theta) * Quat::from_rotation_x(self.phi);
        self.center + rotation * Vec3::new(0.0, 0.0, self.radius)
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), self.center, Vec3::Y)
    }

    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_infinite_rh(self.yfov, aspect, self.base_radius / 100.0)
    }
}

/// The active viewpoint: one of the scene's preset cameras or the orbit camera.
#[derive(Debug, Clone)]
pub enum Camera {
    Preset(usize),
    Orbit(OrbitCamera),
}

impl Camera {
    pub fn needs_update(&self, scene: &Scene) -> bool {
        match self {
            Camera::Preset(slot) => scene.cameras.get(*slot).is_some_and(|c| c.needs_update),
            Camera::Orbit(orbit) => orbit.needs_update,
        }
    }

    /// Refreshes the view if needed and returns `(projection * view, eye)`.
    pub fn update(&mut self, scene: &mut Scene, aspect: f32) -> Option<(Mat4, Vec3)> {
        match self {
            Camera::Preset(slot) => {
                let global = scene.cameras.get(*slot).and_then(|c| scene.global_transform(c.node))?;
                let camera = scene.cameras.get_mut(*slot)?;
                if camera.needs_update {
                    camera.update_view(&global);
                }
                Some((camera.projection.matrix(aspect) * camera.view, camera.eye))
            }
            Camera::Orbit(orbit) => {
                orbit.needs_update = false;
                Some((orbit.projection(aspect) * orbit.view(), orbit.eye()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-4
    }

    #[test]
    fn orbit_frames_the_bounds() {
        let camera = OrbitCamera::framing(&Aabb::new([-1.0, 0.0, -1.0], [1.0, 2.0, 1.0]));
        assert_eq!(camera.center, Vec3::new(0.0, 1.0, 0.0));
        assert!((camera.radius - 12f32.sqrt()).abs() < 1e-5);
        assert!(close(camera.eye(), Vec3::new(0.0, 1.0, 12f32.sqrt())));
        assert!(close(camera.view().transform_point3(camera.center), Vec3::new(0.0, 0.0, -camera.radius)));
    }

    #[test]
    fn orbit_pitch_is_clamped_and_zoom_bounded() {
        let mut camera = OrbitCamera::default();
        camera.orbit(0.0, -10.0);
        assert_eq!(camera.phi, FRAC_PI_2 - 0.1);
        camera.zoom(-1.0e9);
        assert_eq!(camera.radius, camera.base_radius / 16.0);
        // quarter turn right puts the eye on -x
        let mut camera = OrbitCamera::default();
        camera.orbit(0.25, 0.0);
        assert!(close(camera.eye(), Vec3::new(-3.0, 0.0, 0.0)));
    }

    #[test]
    fn dragging_down_raises_the_eye() {
        let mut camera = OrbitCamera::default();
        camera.orbit(0.0, 0.25);
        assert!(camera.eye().y > 0.0);
    }

    #[test]
    fn preset_view_inverts_the_node_transform() {
        let mut arena = generational_arena::Arena::new();
        let node = SceneNodeId(arena.insert(()));
        let mut camera = PresetCamera::new(
            node,
            Projection::Perspective { yfov: 1.0, znear: 0.1, zfar: None, aspect_ratio: None },
        );
        let global = Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0));
        camera.update_view(&global);
        assert!(!camera.needs_update);
        assert_eq!(camera.eye, Vec3::new(0.0, 0.0, 5.0));
        assert!(close(camera.view.transform_point3(Vec3::ZERO), Vec3::new(0.0, 0.0, -5.0)));
    }

    #[test]
    fn orthographic_depth_maps_near_to_zero_and_far_to_one() {
        let projection = Projection::Orthographic { xmag: 2.0, ymag: 2.0, znear: 1.0, zfar: 11.0 };
        let m = projection.matrix(2.0);
        let near = m.project_point3(Vec3::new(4.0, 2.0, -1.0));
        let far = m.project_point3(Vec3::new(0.0, 0.0, -11.0));
        assert!(close(near, Vec3::new(1.0, 1.0, 0.0)));
        assert!((far.z - 1.0).abs() < 1e-5);
    }
}
