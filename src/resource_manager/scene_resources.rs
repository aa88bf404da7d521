use std::collections::{BTreeMap, HashMap};

use log::{info, trace};

use crate::error::DeviceError;
use crate::gltf::accessor::Indices;
use crate::gltf::asset::Asset;
use crate::gltf::material::Sampler;
use crate::scene::scene_tree::Scene;

use super::device::{BufferDescriptor, BufferId, BufferUsage, PipelineId, RenderDevice, SamplerId, TextureDescriptor, TextureId};
use super::pipeline_cache::PipelineCache;
use super::signature::MaterialSignature;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundTexture {
    pub texture: TextureId,
    pub sampler: SamplerId,
    pub tex_coord: usize,
}

/// Device side of a material: factors uniform plus bound textures, in slot order
/// base color, metallic-roughness, normal, occlusion, emissive.
#[derive(Debug, Clone)]
pub struct MaterialBinding {
    pub uniform: BufferId,
    pub textures: Vec<BoundTexture>,
}

#[derive(Debug, Clone)]
pub struct PrimitiveResources {
    pub vertex_buffer: BufferId,
    pub index_buffer: Option<(BufferId, IndexFormat)>,
    /// Indices drawn, or vertices when the primitive is not indexed.
    pub element_count: usize,
    /// Key into `SceneResources::materials`, `None` for the default material.
    pub material: Option<usize>,
    pub signature: MaterialSignature,
    pub pipeline: PipelineId,
}

#[derive(Debug, Clone)]
pub struct MeshResources {
    pub instance_buffer: BufferId,
    pub instance_count: usize,
    pub primitives: Vec<PrimitiveResources>,
}

/// One instanced draw.
#[derive(Debug, Clone, Copy)]
pub struct Draw<'a> {
    pub mesh: usize,
    pub pipeline: PipelineId,
    pub primitive: &'a PrimitiveResources,
    pub material: Option<&'a MaterialBinding>,
    pub instance_buffer: BufferId,
    pub instance_count: usize,
}

/// Device objects owned by one instantiated scene. Pipelines are borrowed from
/// a `PipelineCache` and released by `destroy`.
#[derive(Debug, Default)]
pub struct SceneResources {
    /// image index -> texture
    pub textures: HashMap<usize, TextureId>,
    pub samplers: HashMap<Sampler, SamplerId>,
    pub materials: HashMap<Option<usize>, MaterialBinding>,
    pub meshes: BTreeMap<usize, MeshResources>,
    buffers: Vec<BufferId>,
    acquired: Vec<MaterialSignature>,
}

/// Buffers are sized in multiples of four bytes.
fn padded(bytes: &[u8]) -> Vec<u8> {
    let mut padded = bytes.to_vec();
    padded.resize((bytes.len() + 3) & !3, 0);
    padded
}

impl SceneResources {
    /// Creates everything `scene` draws with. On failure the objects created so
    /// far are destroyed again before the error is returned.
    pub fn build<D: RenderDevice>(
        asset: &Asset,
        scene: &Scene,
        pipelines: &mut PipelineCache,
        device: &mut D,
    ) -> Result<Self, DeviceError> {
        let mut resources = Self::default();
        if let Err(err) = resources.populate(asset, scene, pipelines, device) {
            resources.destroy(pipelines, device);
            return Err(err);
        }
        info!(
            "built scene resources: {} meshes, {} materials, {} textures, {} samplers, {} pipeline refs",
            resources.meshes.len(),
            resources.materials.len(),
            resources.textures.len(),
            resources.samplers.len(),
            resources.acquired.len()
        );
        Ok(resources)
    }

    fn populate<D: RenderDevice>(
        &mut self,
        asset: &Asset,
        scene: &Scene,
        pipelines: &mut PipelineCache,
        device: &mut D,
    ) -> Result<(), DeviceError> {
        for (&mesh_idx, instances) in &scene.mesh_instances {
            let Some(mesh) = asset.meshes.get(mesh_idx) else { continue };
            let mut primitives = vec![];
            for (prim_idx, primitive) in mesh.primitives.iter().enumerate() {
                self.material_binding(asset, primitive.material, device)?;

                let label = format!("mesh {} primitive {}", mesh_idx, prim_idx);
                let vertex_buffer = self.create_buffer(
                    device,
                    &BufferDescriptor {
                        label: &label,
                        usage: BufferUsage::Vertex,
                        contents: bytemuck::cast_slice(&primitive.vertices()),
                    },
                )?;
                let (index_buffer, element_count) = match &primitive.indices {
                    Some(indices) => {
                        let format = match indices {
                            Indices::U16(_) => IndexFormat::Uint16,
                            Indices::U32(_) => IndexFormat::Uint32,
                        };
                        let buffer = self.create_buffer(
                            device,
                            &BufferDescriptor {
                                label: &label,
                                usage: BufferUsage::Index,
                                contents: &padded(indices.as_bytes()),
                            },
                        )?;
                        (Some((buffer, format)), indices.len())
                    }
                    None => (None, primitive.vertex_count),
                };

                let signature = MaterialSignature::new(primitive, asset.material(primitive.material));
                let pipeline = pipelines.acquire(&signature, device)?;
                self.acquired.push(signature);

                primitives.push(PrimitiveResources {
                    vertex_buffer,
                    index_buffer,
                    element_count,
                    material: primitive.material,
                    signature,
                    pipeline,
                });
            }

            let instance_buffer = self.create_buffer(
                device,
                &BufferDescriptor {
                    label: &format!("mesh {} instances", mesh_idx),
                    usage: BufferUsage::Instance,
                    contents: bytemuck::cast_slice(&instances.instances),
                },
            )?;
            self.meshes.insert(
                mesh_idx,
                MeshResources { instance_buffer, instance_count: instances.instances.len(), primitives },
            );
        }
        Ok(())
    }

    /// Every buffer goes through here so `destroy` sees it even when a later
    /// creation fails.
    fn create_buffer<D: RenderDevice>(&mut self, device: &mut D, desc: &BufferDescriptor) -> Result<BufferId, DeviceError> {
        let buffer = device.create_buffer(desc)?;
        self.buffers.push(buffer);
        Ok(buffer)
    }

    fn material_binding<D: RenderDevice>(
        &mut self,
        asset: &Asset,
        material_idx: Option<usize>,
        device: &mut D,
    ) -> Result<(), DeviceError> {
        if self.materials.contains_key(&material_idx) {
            return Ok(());
        }
        let material = asset.material(material_idx);
        let mut textures = vec![];
        for binding in material.textures() {
            let texture = match self.textures.get(&binding.image) {
                Some(texture) => *texture,
                None => {
                    let label = format!("image {}", binding.image);
                    let bitmap = asset.images.get(binding.image).ok_or_else(|| DeviceError::TextureCreationFailed {
                        label: label.clone(),
                        reason: "image was not decoded".to_string(),
                    })?;
                    let texture = device.create_texture(&TextureDescriptor { label: &label, bitmap })?;
                    self.textures.insert(binding.image, texture);
                    texture
                }
            };
            let sampler = match self.samplers.get(&binding.sampler) {
                Some(sampler) => *sampler,
                None => {
                    let sampler = device.create_sampler(&binding.sampler)?;
                    self.samplers.insert(binding.sampler, sampler);
                    sampler
                }
            };
            textures.push(BoundTexture { texture, sampler, tex_coord: binding.tex_coord });
        }
        let uniform = self.create_buffer(
            device,
            &BufferDescriptor {
                label: &format!("material {:?}", material_idx),
                usage: BufferUsage::Uniform,
                contents: bytemuck::bytes_of(&material.uniform()),
            },
        )?;
        self.materials.insert(material_idx, MaterialBinding { uniform, textures });
        Ok(())
    }

    /// Rewrites the instance buffers of the meshes the last propagation touched.
    /// Returns the number of buffers written.
    pub fn sync_transforms<D: RenderDevice>(&self, scene: &mut Scene, device: &mut D) -> Result<usize, DeviceError> {
        let mut written = 0;
        for mesh in scene.take_dirty_meshes() {
            let (Some(resources), Some(instances)) = (self.meshes.get(&mesh), scene.mesh_instances.get(&mesh)) else {
                continue;
            };
            device.write_buffer(resources.instance_buffer, 0, bytemuck::cast_slice(&instances.instances))?;
            trace!("uploaded {} instances of mesh {}", instances.instances.len(), mesh);
            written += 1;
        }
        Ok(written)
    }

    pub fn draws(&self) -> impl Iterator<Item = Draw<'_>> {
        self.meshes.iter().flat_map(move |(&mesh, resources)| {
            resources.primitives.iter().map(move |primitive| Draw {
                mesh,
                pipeline: primitive.pipeline,
                primitive,
                material: self.materials.get(&primitive.material),
                instance_buffer: resources.instance_buffer,
                instance_count: resources.instance_count,
            })
        })
    }

    /// Releases every object this scene created and its pipeline references.
    pub fn destroy<D: RenderDevice>(self, pipelines: &mut PipelineCache, device: &mut D) {
        for buffer in &self.buffers {
            device.destroy_buffer(*buffer);
        }
        for texture in self.textures.values() {
            device.destroy_texture(*texture);
        }
        for sampler in self.samplers.values() {
            device.destroy_sampler(*sampler);
        }
        for signature in &self.acquired {
            pipelines.release(signature, device);
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::gltf::asset::{Mesh, NodeDesc, SceneDesc};
    use crate::gltf::material::{Bitmap, Material, TextureBinding};
    use crate::gltf::primitive::Primitive;
    use crate::resource_manager::device::{HeadlessDevice, LiveCounts};
    use crate::scene::scene_tree::Instance;

    fn triangle(material: Option<usize>, indexed: bool) -> Primitive {
        Primitive {
            vertex_count: 3,
            indices: indexed.then(|| Indices::U16(vec![0, 1, 2])),
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            uvs: Some(vec![[0.0; 2]; 3]),
            uv1s: None,
            tangents: None,
            colors: None,
            material,
            bounding_box: None,
        }
    }

    fn textured(image: usize) -> Material {
        Material {
            base_color_texture: Some(TextureBinding { image, sampler: Sampler::default(), tex_coord: 0 }),
            ..Default::default()
        }
    }

    /// Two meshes: mesh 0 instanced twice, mesh 1 once. Materials 0 and 1 share
    /// image 0; mesh 1 has a second primitive with the default material.
    fn asset() -> Asset {
        let node = |x: f32, mesh| NodeDesc { translation: Vec3::new(x, 0.0, 0.0), mesh: Some(mesh), ..Default::default() };
        Asset {
            meshes: vec![
                Mesh { primitives: vec![triangle(Some(0), true)], ..Default::default() },
                Mesh { primitives: vec![triangle(Some(1), false), triangle(None, true)], ..Default::default() },
            ],
            materials: vec![textured(0), textured(0)],
            images: vec![Bitmap { width: 1, height: 1, rgba: vec![255; 4] }],
            nodes: vec![node(0.0, 0), node(2.0, 0), node(4.0, 1)],
            scenes: vec![SceneDesc { name: None, nodes: vec![0, 1, 2] }],
            ..Default::default()
        }
    }

    #[test]
    fn shares_textures_samplers_and_pipelines() {
        let asset = asset();
        let scene = Scene::instantiate(&asset, None).unwrap();
        let mut device = HeadlessDevice::new();
        let mut pipelines = PipelineCache::new();
        let resources = SceneResources::build(&asset, &scene, &mut pipelines, &mut device).unwrap();

        assert_eq!(resources.textures.len(), 1);
        assert_eq!(resources.samplers.len(), 1);
        assert_eq!(resources.materials.len(), 3);
        // 3 vertex + 2 index + 2 instance + 3 uniform
        assert_eq!(
            device.live_counts(),
            LiveCounts { buffers: 10, textures: 1, samplers: 1, pipelines: 2 }
        );
        let textured_signature = resources.meshes[&0].primitives[0].signature;
        assert_eq!(pipelines.ref_count(&textured_signature), 2);

        let draws: Vec<_> = resources.draws().collect();
        assert_eq!(draws.len(), 3);
        assert_eq!(draws[0].instance_count, 2);
        assert_eq!(draws[0].primitive.index_buffer.map(|(_, f)| f), Some(IndexFormat::Uint16));
        assert_eq!(draws[1].primitive.element_count, 3);
        assert_eq!(draws[0].pipeline, draws[1].pipeline);
        assert_ne!(draws[1].pipeline, draws[2].pipeline);
        assert!(draws[2].material.unwrap().textures.is_empty());
    }

    #[test]
    fn index_buffers_are_padded() {
        let asset = asset();
        let scene = Scene::instantiate(&asset, None).unwrap();
        let mut device = HeadlessDevice::new();
        let mut pipelines = PipelineCache::new();
        let resources = SceneResources::build(&asset, &scene, &mut pipelines, &mut device).unwrap();
        let (index_buffer, _) = resources.meshes[&0].primitives[0].index_buffer.unwrap();
        assert_eq!(device.buffer(index_buffer).unwrap().data, vec![0, 0, 1, 0, 2, 0, 0, 0]);
    }

    #[test]
    fn destroy_releases_everything() {
        let asset = asset();
        let scene = Scene::instantiate(&asset, None).unwrap();
        let mut device = HeadlessDevice::new();
        let mut pipelines = PipelineCache::new();
        for _ in 0..3 {
            let resources = SceneResources::build(&asset, &scene, &mut pipelines, &mut device).unwrap();
            resources.destroy(&mut pipelines, &mut device);
            assert_eq!(device.live_counts(), LiveCounts::default());
            assert!(pipelines.is_empty());
        }
        assert_eq!(device.allocated_bytes(), 0);
    }

    #[test]
    fn failed_build_leaves_nothing_behind() {
        let asset = asset();
        let scene = Scene::instantiate(&asset, None).unwrap();
        let mut pipelines = PipelineCache::new();
        for limit in [0, 8, 100, 300, 1000] {
            let mut device = HeadlessDevice::with_memory_limit(limit);
            assert!(SceneResources::build(&asset, &scene, &mut pipelines, &mut device).is_err());
            assert_eq!(device.live_counts(), LiveCounts::default());
            assert!(pipelines.is_empty());
        }
    }

    #[test]
    fn only_dirty_meshes_are_uploaded() {
        let asset = asset();
        let mut scene = Scene::instantiate(&asset, None).unwrap();
        let mut device = HeadlessDevice::new();
        let mut pipelines = PipelineCache::new();
        let resources = SceneResources::build(&asset, &scene, &mut pipelines, &mut device).unwrap();
        assert_eq!(resources.sync_transforms(&mut scene, &mut device).unwrap(), 0);

        let node = scene.find_node(1).unwrap();
        scene.node_mut(node).unwrap().set_translation(Vec3::new(0.0, 3.0, 0.0));
        scene.update_transforms();
        assert_eq!(resources.sync_transforms(&mut scene, &mut device).unwrap(), 1);

        let moved = device.buffer(resources.meshes[&0].instance_buffer).unwrap();
        assert_eq!(moved.writes, 1);
        let instances = &scene.mesh_instances[&0].instances;
        assert_eq!(instances[1].m4[3][..3], [0.0, 3.0, 0.0]);
        assert_eq!(moved.data, bytemuck::cast_slice::<Instance, u8>(instances));
        assert_eq!(device.buffer(resources.meshes[&1].instance_buffer).unwrap().writes, 0);
    }
}
