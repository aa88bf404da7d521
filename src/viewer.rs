use glam::{Mat4, Vec3};
use log::{debug, info};

use crate::config::LoaderConfig;
use crate::error::{DeviceError, LoadError};
use crate::gltf::asset::Asset;
use crate::gltf::loader::{self, Fetch};
use crate::resource_manager::device::{BufferDescriptor, BufferId, BufferUsage, RenderDevice};
use crate::resource_manager::pipeline_cache::PipelineCache;
use crate::resource_manager::scene_resources::SceneResources;
use crate::scene::aabb::Aabb;
use crate::scene::animator::Animator;
use crate::scene::camera::{Camera, OrbitCamera};
use crate::scene::scene_tree::Scene;

/// Issued by `Viewer::begin_load`; only the newest ticket may install a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LoadTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Installed,
    /// A newer load was started before this one finished; nothing changed.
    Superseded,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub proj_view: [[f32; 4]; 4],
    pub eye: [f32; 4],
}

impl CameraUniform {
    pub fn new(proj_view: Mat4, eye: Vec3) -> Self {
        Self { proj_view: proj_view.to_cols_array_2d(), eye: eye.extend(1.0).to_array() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub nodes_updated: usize,
    pub buffers_written: usize,
}

/// A decoded asset with its scene, device objects and playback state.
pub struct InstalledScene {
    pub asset: Asset,
    pub scene: Scene,
    pub resources: SceneResources,
    pub animator: Option<Animator>,
    pub camera: Camera,
}

pub struct Viewer<D: RenderDevice> {
    pub device: D,
    pub config: LoaderConfig,
    pipelines: PipelineCache,
    current: Option<InstalledScene>,
    generation: u64,
    camera_buffer: Option<BufferId>,
    last_aspect: Option<f32>,
}

impl<D: RenderDevice> Viewer<D> {
    pub fn new(device: D, config: LoaderConfig) -> Self {
        Self {
            device,
            config,
            pipelines: PipelineCache::new(),
            current: None,
            generation: 0,
            camera_buffer: None,
            last_aspect: None,
        }
    }

    pub fn current(&self) -> Option<&InstalledScene> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut InstalledScene> {
        self.current.as_mut()
    }

    pub fn pipelines(&self) -> &PipelineCache {
        &self.pipelines
    }

    /// Starts a load, superseding every load started before it.
    pub fn begin_load(&mut self) -> LoadTicket {
        self.generation += 1;
        LoadTicket(self.generation)
    }

    pub fn is_current(&self, ticket: LoadTicket) -> bool {
        ticket.0 == self.generation
    }

    /// Installs the result of the load `ticket` was issued for. Stale tickets are
    /// ignored; errors leave the current scene running.
    pub fn finish_load(&mut self, ticket: LoadTicket, result: Result<Asset, LoadError>) -> Result<LoadOutcome, LoadError> {
        if !self.is_current(ticket) {
            debug!("load {} superseded by load {}", ticket.0, self.generation);
            return Ok(LoadOutcome::Superseded);
        }
        self.install(result?)?;
        Ok(LoadOutcome::Installed)
    }

    /// Fetches, decodes and installs `uri`. The viewer stays borrowed until the
    /// load completes; to let a newer load supersede one still in flight, call
    /// `begin_load`, run `loader::load` and hand the result to `finish_load`.
    pub async fn load<F: Fetch>(&mut self, fetcher: &F, uri: &str) -> Result<LoadOutcome, LoadError> {
        let ticket = self.begin_load();
        let config = self.config.clone();
        let result = loader::load(fetcher, uri, &config).await;
        self.finish_load(ticket, result)
    }

    pub fn load_blocking<F: Fetch>(&mut self, fetcher: &F, uri: &str) -> Result<LoadOutcome, LoadError> {
        pollster::block_on(self.load(fetcher, uri))
    }

    /// Builds the new scene's device objects first and only then releases the
    /// previous scene, so pipelines both use survive the swap.
    fn install(&mut self, asset: Asset) -> Result<(), LoadError> {
        let scene = Scene::instantiate(&asset, self.config.scene)?;
        let resources = SceneResources::build(&asset, &scene, &mut self.pipelines, &mut self.device)?;
        let animator = self
            .config
            .autoplay
            .filter(|&clip| clip < asset.animations.len())
            .map(|clip| Animator::new(clip, self.config.time_wrap, self.config.speed));
        let camera = Camera::Orbit(scene.aabb().map(|aabb| OrbitCamera::framing(&aabb)).unwrap_or_default());
        info!(
            "installed scene {:?}: {} nodes, {} meshes instanced, {} pipelines cached",
            scene.name,
            scene.nodes.len(),
            scene.mesh_instances.len(),
            self.pipelines.len()
        );

        let installed = InstalledScene { asset, scene, resources, animator, camera };
        if let Some(previous) = self.current.replace(installed) {
            previous.resources.destroy(&mut self.pipelines, &mut self.device);
        }
        Ok(())
    }

    /// Releases the current scene's device objects.
    pub fn unload(&mut self) {
        if let Some(previous) = self.current.take() {
            previous.resources.destroy(&mut self.pipelines, &mut self.device);
        }
    }

    /// Advances playback by `dt` seconds, propagates transforms and re-uploads
    /// the instance buffers that changed.
    pub fn tick(&mut self, dt: f32) -> Result<FrameStats, DeviceError> {
        let Some(current) = &mut self.current else { return Ok(FrameStats::default()) };
        let nodes_updated = match &mut current.animator {
            Some(animator) => match current.asset.animations.get(animator.clip) {
                Some(clip) => animator.tick(dt, clip, &mut current.scene),
                None => current.scene.update_transforms(),
            },
            None => current.scene.update_transforms(),
        };
        let buffers_written = current.resources.sync_transforms(&mut current.scene, &mut self.device)?;
        Ok(FrameStats { nodes_updated, buffers_written })
    }

    /// Writes the active camera into the camera uniform when it moved or the
    /// viewport aspect changed. Returns whether a write happened.
    pub fn update_camera(&mut self, aspect: f32) -> Result<bool, DeviceError> {
        let Some(current) = &mut self.current else { return Ok(false) };
        if !current.camera.needs_update(&current.scene) && self.last_aspect == Some(aspect) {
            return Ok(false);
        }
        let Some((proj_view, eye)) = current.camera.update(&mut current.scene, aspect) else { return Ok(false) };
        let uniform = CameraUniform::new(proj_view, eye);
        match self.camera_buffer {
            Some(buffer) => self.device.write_buffer(buffer, 0, bytemuck::bytes_of(&uniform))?,
            None => {
                self.camera_buffer = Some(self.device.create_buffer(&BufferDescriptor {
                    label: "camera",
                    usage: BufferUsage::Uniform,
                    contents: bytemuck::bytes_of(&uniform),
                })?);
            }
        }
        self.last_aspect = Some(aspect);
        Ok(true)
    }

    pub fn camera_buffer(&self) -> Option<BufferId> {
        self.camera_buffer
    }

    /// Switches to preset camera `slot`, or back to the orbit camera with `None`.
    pub fn use_camera(&mut self, slot: Option<usize>) {
        let Some(current) = &mut self.current else { return };
        current.camera = match slot {
            Some(slot) if slot < current.scene.cameras.len() => {
                if let Some(preset) = current.scene.cameras.get_mut(slot) {
                    preset.needs_update = true;
                }
                Camera::Preset(slot)
            }
            _ => Camera::Orbit(current.scene.aabb().map(|aabb| OrbitCamera::framing(&aabb)).unwrap_or_default()),
        };
    }

    pub fn orbit(&mut self, dx: f32, dy: f32) {
        if let Some(InstalledScene { camera: Camera::Orbit(orbit), .. }) = &mut self.current {
            orbit.orbit(dx, dy);
        }
    }

    pub fn zoom(&mut self, delta: f32) {
        if let Some(InstalledScene { camera: Camera::Orbit(orbit), .. }) = &mut self.current {
            orbit.zoom(delta);
        }
    }

    /// World bounds of the current scene.
    pub fn aabb(&self) -> Option<Aabb> {
        self.current.as_ref().and_then(|c| c.scene.aabb())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::gltf::asset::{Mesh, NodeDesc, SceneDesc};
    use crate::gltf::primitive::Primitive;
    use crate::resource_manager::device::{HeadlessDevice, LiveCounts};
    use crate::scene::camera::Projection;

    fn asset(x: f32) -> Asset {
        let primitive = Primitive {
            vertex_count: 3,
            indices: None,
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            uvs: None,
            uv1s: None,
            tangents: None,
            colors: None,
            material: None,
            bounding_box: Some(Aabb::new([0.0; 3], [1.0, 1.0, 0.0])),
        };
        Asset {
            meshes: vec![Mesh { bounding_box: primitive.bounding_box, primitives: vec![primitive], name: None }],
            nodes: vec![
                NodeDesc { translation: Vec3::new(x, 0.0, 0.0), mesh: Some(0), ..Default::default() },
                NodeDesc { camera: Some(0), translation: Vec3::new(0.0, 0.0, 5.0), ..Default::default() },
            ],
            scenes: vec![SceneDesc { name: None, nodes: vec![0, 1] }],
            cameras: vec![Projection::Perspective { yfov: 1.0, znear: 0.1, zfar: Some(100.0), aspect_ratio: None }],
            ..Default::default()
        }
    }

    #[test]
    fn stale_ticket_is_superseded() {
        let mut viewer = Viewer::new(HeadlessDevice::new(), LoaderConfig::default());
        let first = viewer.begin_load();
        let second = viewer.begin_load();
        assert_eq!(viewer.finish_load(first, Ok(asset(1.0))).unwrap(), LoadOutcome::Superseded);
        assert!(viewer.current().is_none());
        assert_eq!(viewer.device.live_counts(), LiveCounts::default());
        assert_eq!(viewer.finish_load(second, Ok(asset(2.0))).unwrap(), LoadOutcome::Installed);
        assert_eq!(viewer.aabb().unwrap().min.x, 2.0);
    }

    #[test]
    fn failed_load_keeps_the_previous_scene() {
        let mut viewer = Viewer::new(HeadlessDevice::new(), LoaderConfig::default());
        let ticket = viewer.begin_load();
        viewer.finish_load(ticket, Ok(asset(1.0))).unwrap();
        let counts = viewer.device.live_counts();

        let ticket = viewer.begin_load();
        let failed = viewer.finish_load(ticket, Err(FetchError::NotFound("x.gltf".into()).into()));
        assert!(matches!(failed, Err(LoadError::Fetch(_))));
        assert_eq!(viewer.aabb().unwrap().min.x, 1.0);
        assert_eq!(viewer.device.live_counts(), counts);
    }

    #[test]
    fn reload_keeps_live_counts_and_pipeline_identity() {
        let mut viewer = Viewer::new(HeadlessDevice::new(), LoaderConfig::default());
        let ticket = viewer.begin_load();
        viewer.finish_load(ticket, Ok(asset(0.0))).unwrap();
        let counts = viewer.device.live_counts();
        let pipeline = viewer.current().unwrap().resources.draws().next().unwrap().pipeline;
        for _ in 0..3 {
            let ticket = viewer.begin_load();
            viewer.finish_load(ticket, Ok(asset(0.0))).unwrap();
            assert_eq!(viewer.device.live_counts(), counts);
            assert_eq!(viewer.current().unwrap().resources.draws().next().unwrap().pipeline, pipeline);
        }
        viewer.unload();
        assert_eq!(viewer.device.live_counts(), LiveCounts::default());
    }

    #[test]
    fn camera_uniform_written_only_on_change() {
        let mut viewer = Viewer::new(HeadlessDevice::new(), LoaderConfig::default());
        let ticket = viewer.begin_load();
        viewer.finish_load(ticket, Ok(asset(0.0))).unwrap();
        assert!(viewer.update_camera(1.5).unwrap());
        assert!(!viewer.update_camera(1.5).unwrap());
        viewer.orbit(0.1, 0.0);
        assert!(viewer.update_camera(1.5).unwrap());
        assert!(viewer.update_camera(2.0).unwrap());

        viewer.use_camera(Some(0));
        assert!(viewer.update_camera(2.0).unwrap());
        assert!(!viewer.update_camera(2.0).unwrap());
        let buffer = viewer.device.buffer(viewer.camera_buffer().unwrap()).unwrap();
        let eye = &buffer.data[64..76];
        assert_eq!(eye, bytemuck::cast_slice::<f32, u8>(&[0.0, 0.0, 5.0]));
    }
}
