use std::collections::BTreeMap;

use generational_arena::{Arena, Index};
use glam::{Mat4, Quat, Vec3};
use log::trace;

use crate::error::{FormatError, FormatResult};
use crate::gltf::asset::Asset;

use super::aabb::{fold_aabb, Aabb};
use super::camera::PresetCamera;

#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug)]
pub struct SceneNodeId(pub Index);
impl From<SceneNodeId> for Index {
    fn from(id: SceneNodeId) -> Index {
        id.0
    }
}

/// Per-instance data of a mesh: model matrix and its inverse transpose.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Instance {
    pub m4: [[f32; 4]; 4],
    pub itr: [[f32; 4]; 4],
}

impl Default for Instance {
    fn default() -> Self {
        Self::from_transform(Mat4::IDENTITY)
    }
}

impl Instance {
    pub fn from_transform(transform: Mat4) -> Self {
        let itr = if transform.determinant().abs() < f32::EPSILON {
            Mat4::ZERO
        } else {
            transform.inverse().transpose()
        };
        Instance { m4: transform.to_cols_array_2d(), itr: itr.to_cols_array_2d() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MeshInstances {
    pub instances: Vec<Instance>,
    /// Set when any slot was rewritten since the last `take_dirty_meshes`.
    pub dirty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshRef {
    pub mesh: usize,
    /// Slot of this node in the mesh's instance list.
    pub slot: usize,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: Option<String>,
    /// Index of the node in the source asset.
    pub source: usize,
    pub parent: Option<SceneNodeId>,
    pub children: Vec<SceneNodeId>,
    translation: Vec3,
    rotation: Quat,
    scale: Vec3,
    global_transform: Mat4,
    local_dirty: bool,
    pub mesh: Option<MeshRef>,
    /// Slot in `Scene::cameras`.
    pub camera: Option<usize>,
    /// World-space bounds of this node's subtree.
    pub aabb: Option<Aabb>,
}

impl Node {
    pub fn translation(&self) -> Vec3 { self.translation }
    pub fn rotation(&self) -> Quat { self.rotation }
    pub fn scale(&self) -> Vec3 { self.scale }

    pub fn local_transform(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    pub fn global_transform(&self) -> &Mat4 {
        &self.global_transform
    }

    pub fn is_dirty(&self) -> bool {
        self.local_dirty
    }

    pub fn set_translation(&mut self, translation: Vec3) {
        if self.translation != translation {
            self.translation = translation;
            self.local_dirty = true;
        }
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        if self.rotation != rotation {
            self.rotation = rotation;
            self.local_dirty = true;
        }
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        if self.scale != scale {
            self.scale = scale;
            self.local_dirty = true;
        }
    }
}

/// The instantiated node hierarchy of one glTF scene.
pub struct Scene {
    pub name: Option<String>,
    pub nodes: Arena<Node>,
    pub roots: Vec<SceneNodeId>,
    /// asset node index -> scene node, `None` for nodes outside this scene
    node_ids: Vec<Option<SceneNodeId>>,
    /// mesh index -> instances, in traversal order
    pub mesh_instances: BTreeMap<usize, MeshInstances>,
    mesh_bounds: Vec<Option<Aabb>>,
    pub cameras: Vec<PresetCamera>,
}

impl Scene {
    /// Instantiates `scene_override`, else the asset's default scene, else scene 0.
    /// Assets without scenes use every parentless node as a root.
    pub fn instantiate(asset: &Asset, scene_override: Option<usize>) -> FormatResult<Self> {
        let (name, root_indices) = asset.scene_roots(scene_override)?;
        let mut scene = Scene {
            name,
            nodes: Arena::new(),
            roots: vec![],
            node_ids: vec![None; asset.nodes.len()],
            mesh_instances: BTreeMap::new(),
            mesh_bounds: asset.meshes.iter().map(|m| m.bounding_box).collect(),
            cameras: vec![],
        };
        for node_idx in root_indices {
            let id = scene.instantiate_node(asset, node_idx, None, Mat4::IDENTITY)?;
            scene.roots.push(id);
        }
        for root in scene.roots.clone() {
            scene.update_aabb(root);
        }
        for instances in scene.mesh_instances.values_mut() {
            instances.dirty = false;
        }
        Ok(scene)
    }

    fn instantiate_node(
        &mut self,
        asset: &Asset,
        node_idx: usize,
        parent: Option<SceneNodeId>,
        parent_transform: Mat4,
    ) -> FormatResult<SceneNodeId> {
        if self.node_ids[node_idx].is_some() {
            return Err(FormatError::NodeReused(node_idx));
        }
        let desc = &asset.nodes[node_idx];
        let local = Mat4::from_scale_rotation_translation(desc.scale, desc.rotation, desc.translation);
        let global_transform = parent_transform * local;

        let id = SceneNodeId(self.nodes.insert(Node {
            name: desc.name.clone(),
            source: node_idx,
            parent,
            children: vec![],
            translation: desc.translation,
            rotation: desc.rotation,
            scale: desc.scale,
            global_transform,
            local_dirty: false,
            mesh: None,
            camera: None,
            aabb: None,
        }));
        self.node_ids[node_idx] = Some(id);

        let mesh = desc.mesh.map(|mesh| {
            let entry = self.mesh_instances.entry(mesh).or_default();
            entry.instances.push(Instance::from_transform(global_transform));
            MeshRef { mesh, slot: entry.instances.len() - 1 }
        });
        let camera = desc.camera.map(|camera| {
            self.cameras.push(PresetCamera::new(id, asset.cameras[camera]));
            self.cameras.len() - 1
        });

        let mut children = vec![];
        for &child_idx in &desc.children {
            children.push(self.instantiate_node(asset, child_idx, Some(id), global_transform)?);
        }
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.mesh = mesh;
            node.camera = camera;
            node.children = children;
        }
        Ok(id)
    }

    pub fn node(&self, id: SceneNodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: SceneNodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    /// Scene node instantiated from asset node `node_idx`, if it is part of this scene.
    pub fn find_node(&self, node_idx: usize) -> Option<SceneNodeId> {
        self.node_ids.get(node_idx).copied().flatten()
    }

    pub fn global_transform(&self, id: SceneNodeId) -> Option<Mat4> {
        self.node(id).map(|n| n.global_transform)
    }

    /// Bounds of the whole scene, `None` when it has no geometry.
    pub fn aabb(&self) -> Option<Aabb> {
        fold_aabb(self.roots.iter().filter_map(|r| self.node(*r)).filter_map(|n| n.aabb.as_ref()))
    }

    /// Recomputes global transforms below every node whose local transform changed.
    /// Untouched branches are skipped. Returns the number of nodes recomputed.
    pub fn update_transforms(&mut self) -> usize {
        let mut updated = 0;
        let mut stack: Vec<(SceneNodeId, Mat4, bool)> =
            self.roots.iter().rev().map(|r| (*r, Mat4::IDENTITY, false)).collect();
        while let Some((id, parent_global, parent_changed)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(id.0) else { continue };
            let changed = parent_changed || node.local_dirty;
            if changed {
                node.global_transform = parent_global * node.local_transform();
                node.local_dirty = false;
                updated += 1;
                if let Some(MeshRef { mesh, slot }) = node.mesh {
                    if let Some(instances) = self.mesh_instances.get_mut(&mesh) {
                        instances.instances[slot] = Instance::from_transform(node.global_transform);
                        instances.dirty = true;
                    }
                }
                if let Some(camera) = node.camera.and_then(|c| self.cameras.get_mut(c)) {
                    camera.needs_update = true;
                }
            }
            let global = node.global_transform;
            for child in node.children.iter().rev() {
                stack.push((*child, global, changed));
            }
        }
        if updated > 0 {
            trace!("propagated transforms to {} nodes", updated);
            for root in self.roots.clone() {
                self.update_aabb(root);
            }
        }
        updated
    }

    fn update_aabb(&mut self, id: SceneNodeId) -> Option<Aabb> {
        let (children, own) = match self.node(id) {
            Some(node) => (
                node.children.clone(),
                node.mesh
                    .and_then(|m| self.mesh_bounds.get(m.mesh).copied().flatten())
                    .map(|b| b.transformed(&node.global_transform)),
            ),
            None => return None,
        };
        let child_boxes: Vec<Aabb> = children.into_iter().filter_map(|c| self.update_aabb(c)).collect();
        let aabb = fold_aabb(own.iter().chain(child_boxes.iter()));
        if let Some(node) = self.node_mut(id) {
            node.aabb = aabb;
        }
        aabb
    }

    /// Meshes whose instance data changed since the last call, clearing the flags.
    pub fn take_dirty_meshes(&mut self) -> Vec<usize> {
        self.mesh_instances
            .iter_mut()
            .filter(|(_, instances)| instances.dirty)
            .map(|(mesh, instances)| {
                instances.dirty = false;
                *mesh
            })
            .collect()
    }
}
