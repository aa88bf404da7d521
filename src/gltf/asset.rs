use glam::{Mat4, Quat, Vec3};
use log::info;

use crate::config::LoaderConfig;
use crate::error::{FormatError, FormatResult};
use crate::scene::aabb::{fold_aabb, Aabb};
use crate::scene::animator::AnimationClip;
use crate::scene::camera::Projection;

use super::accessor::AccessorReader;
use super::material::{material_from_schema, Bitmap, Material};
use super::primitive::{build_primitive, Primitive};
use super::schema::{self, Document};

#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub name: Option<String>,
    pub primitives: Vec<Primitive>,
    /// Union of the primitives' local boxes.
    pub bounding_box: Option<Aabb>,
}

/// A node in TRS form. A raw matrix is decomposed; explicit TRS fields override
/// the decomposed parts.
#[derive(Debug, Clone)]
pub struct NodeDesc {
    pub name: Option<String>,
    pub mesh: Option<usize>,
    pub camera: Option<usize>,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub children: Vec<usize>,
}

impl Default for NodeDesc {
    fn default() -> Self {
        Self {
            name: None,
            mesh: None,
            camera: None,
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            children: vec![],
        }
    }
}

impl NodeDesc {
    pub fn from_schema(node: &schema::Node) -> Self {
        let (mut scale, mut rotation, mut translation) = match node.matrix {
            Some(m) => Mat4::from_cols_array(&m).to_scale_rotation_translation(),
            None => (Vec3::ONE, Quat::IDENTITY, Vec3::ZERO),
        };
        if let Some(t) = node.translation { translation = Vec3::from(t); }
        if let Some(r) = node.rotation { rotation = Quat::from_array(r); }
        if let Some(s) = node.scale { scale = Vec3::from(s); }
        Self {
            name: node.name.clone(),
            mesh: node.mesh,
            camera: node.camera,
            translation,
            rotation,
            scale,
            children: node.children.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SceneDesc {
    pub name: Option<String>,
    pub nodes: Vec<usize>,
}

/// Everything decoded from one glTF asset, before instantiation.
#[derive(Debug, Clone, Default)]
pub struct Asset {
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    /// Used by primitives without a material.
    pub default_material: Material,
    pub images: Vec<Bitmap>,
    pub nodes: Vec<NodeDesc>,
    pub scenes: Vec<SceneDesc>,
    pub default_scene: Option<usize>,
    pub cameras: Vec<Projection>,
    pub animations: Vec<AnimationClip>,
}

fn projection_from_schema(camera: &schema::Camera) -> Projection {
    match (&camera.perspective, &camera.orthographic) {
        (Some(p), _) => Projection::Perspective {
            yfov: p.yfov,
            znear: p.znear,
            zfar: p.zfar,
            aspect_ratio: p.aspect_ratio,
        },
        (None, Some(o)) => Projection::Orthographic { xmag: o.xmag, ymag: o.ymag, znear: o.znear, zfar: o.zfar },
        (None, None) => Projection::Perspective { yfov: std::f32::consts::FRAC_PI_3, znear: 0.01, zfar: None, aspect_ratio: None },
    }
}

impl Asset {
    /// Decodes a validated document. `buffers` are indexed like `document.buffers`
    /// and `images` like `document.images`.
    pub fn from_document(
        document: &Document,
        buffers: &[Vec<u8>],
        images: Vec<Bitmap>,
        config: &LoaderConfig,
    ) -> FormatResult<Self> {
        let reader = AccessorReader::new(document, buffers);

        let mut meshes = vec![];
        for mesh in &document.meshes {
            let mut primitives = vec![];
            for primitive in &mesh.primitives {
                primitives.push(build_primitive(&reader, primitive, config.normals)?);
            }
            let bounding_box = fold_aabb(primitives.iter().filter_map(|p| p.bounding_box.as_ref()));
            meshes.push(Mesh { name: mesh.name.clone(), primitives, bounding_box });
        }

        let materials = (0..document.materials.len())
            .map(|i| material_from_schema(document, i))
            .collect::<FormatResult<Vec<_>>>()?;

        let animations = (0..document.animations.len())
            .map(|i| AnimationClip::from_schema(&reader, i))
            .collect::<FormatResult<Vec<_>>>()?;

        let asset = Self {
            meshes,
            materials,
            default_material: Material::default(),
            images,
            nodes: document.nodes.iter().map(NodeDesc::from_schema).collect(),
            scenes: document
                .scenes
                .iter()
                .map(|s| SceneDesc { name: s.name.clone(), nodes: s.nodes.clone() })
                .collect(),
            default_scene: document.scene,
            cameras: document.cameras.iter().map(projection_from_schema).collect(),
            animations,
        };
        info!(
            "decoded asset: {} meshes, {} materials, {} images, {} nodes, {} clips",
            asset.meshes.len(),
            asset.materials.len(),
            asset.images.len(),
            asset.nodes.len(),
            asset.animations.len()
        );
        Ok(asset)
    }

    pub fn material(&self, index: Option<usize>) -> &Material {
        index.and_then(|i| self.materials.get(i)).unwrap_or(&self.default_material)
    }

    /// Name and root node indices of the scene to instantiate.
    pub fn scene_roots(&self, scene_override: Option<usize>) -> FormatResult<(Option<String>, Vec<usize>)> {
        if self.scenes.is_empty() {
            let mut has_parent = vec![false; self.nodes.len()];
            for node in &self.nodes {
                for &child in &node.children {
                    if let Some(flag) = has_parent.get_mut(child) {
                        *flag = true;
                    }
                }
            }
            let roots = (0..self.nodes.len()).filter(|&i| !has_parent[i]).collect();
            return Ok((None, roots));
        }
        let index = scene_override.or(self.default_scene).unwrap_or(0);
        let scene = self.scenes.get(index).ok_or(FormatError::IndexOutOfRange {
            kind: "scene",
            index,
            len: self.scenes.len(),
        })?;
        Ok((scene.name.clone(), scene.nodes.clone()))
    }
}
