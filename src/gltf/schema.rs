use std::collections::HashMap;

use serde::Deserialize;
use serde_repr::Deserialize_repr;

use crate::error::{FormatError, FormatResult};

fn default_tex_coord() -> usize { 0 }
fn default_scale() -> f32 { 1.0 }
fn default_strength() -> f32 { 1.0 }
fn default_alpha_cutoff() -> f32 { 0.5 }

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum ComponentType {
    SignedByte = 5120,
    UnsignedByte = 5121,
    SignedShort = 5122,
    UnsignedShort = 5123,
    UnsignedInt = 5125,
    Float = 5126,
}

impl ComponentType {
    // size in bytes
    pub fn size(self) -> usize {
        match self {
            ComponentType::SignedByte => 1,
            ComponentType::UnsignedByte => 1,
            ComponentType::SignedShort => 2,
            ComponentType::UnsignedShort => 2,
            ComponentType::UnsignedInt => 4,
            ComponentType::Float => 4,
        }
    }
}

impl TryFrom<u32> for ComponentType {
    type Error = FormatError;

    fn try_from(code: u32) -> FormatResult<Self> {
        match code {
            5120 => Ok(ComponentType::SignedByte),
            5121 => Ok(ComponentType::UnsignedByte),
            5122 => Ok(ComponentType::SignedShort),
            5123 => Ok(ComponentType::UnsignedShort),
            5125 => Ok(ComponentType::UnsignedInt),
            5126 => Ok(ComponentType::Float),
            _ => Err(FormatError::UnknownComponentType(code)),
        }
    }
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessorType {
    #[serde(rename = "SCALAR")]
    Scalar,
    #[serde(rename = "VEC2")]
    Vec2,
    #[serde(rename = "VEC3")]
    Vec3,
    #[serde(rename = "VEC4")]
    Vec4,
    #[serde(rename = "MAT2")]
    Mat2,
    #[serde(rename = "MAT3")]
    Mat3,
    #[serde(rename = "MAT4")]
    Mat4,
}

impl AccessorType {
    pub fn arity(self) -> usize {
        match self {
            AccessorType::Scalar => 1,
            AccessorType::Vec2 => 2,
            AccessorType::Vec3 => 3,
            AccessorType::Vec4 => 4,
            AccessorType::Mat2 => 4,
            AccessorType::Mat3 => 9,
            AccessorType::Mat4 => 16,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Accessor {
    #[serde(rename = "bufferView")]
    pub buffer_view: Option<usize>,
    #[serde(rename = "byteOffset", default)]
    pub byte_offset: usize,
    // kept as the raw code so an unknown value surfaces as UnknownComponentType
    #[serde(rename = "componentType")]
    pub component_type: u32,
    #[serde(default)]
    pub normalized: bool,
    pub count: usize,
    #[serde(rename = "type")]
    pub accessor_type: AccessorType,
    pub min: Option<Vec<f32>>,
    pub max: Option<Vec<f32>>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AssetInfo {
    pub generator: Option<String>,
    pub version: String,
}

#[derive(Deserialize_repr, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum BufferViewTarget {
    ArrayBuffer = 34962,
    ElementArrayBuffer = 34963,
}

#[derive(Deserialize, Debug, Clone)]
pub struct BufferView {
    pub buffer: usize,
    #[serde(rename = "byteLength")]
    pub byte_length: usize,
    #[serde(rename = "byteOffset", default)]
    pub byte_offset: usize,
    #[serde(rename = "byteStride")]
    pub byte_stride: Option<usize>,
    pub target: Option<BufferViewTarget>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Buffer {
    #[serde(rename = "byteLength")]
    pub byte_length: usize,
    pub uri: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct PrimitiveAttributes {
    #[serde(rename = "POSITION")]
    pub position: Option<usize>,
    #[serde(rename = "NORMAL")]
    pub normal: Option<usize>,
    #[serde(rename = "TANGENT")]
    pub tangent: Option<usize>,

    /* The rest of the fields can't be mapped so they're collected in a hashmap:
    * TEXCOORD_n
    * COLOR_n
    * JOINTS_n, WEIGHTS_n (ignored)
    */
    #[serde(flatten)]
    pub additional_fields: HashMap<String, usize>,
}

impl PrimitiveAttributes {
    pub fn tex_coord(&self, set: usize) -> Option<usize> {
        self.additional_fields.get(&format!("TEXCOORD_{}", set)).copied()
    }

    pub fn color(&self) -> Option<usize> {
        self.additional_fields.get("COLOR_0").copied()
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Primitive {
    pub indices: Option<usize>,
    pub attributes: PrimitiveAttributes,
    pub material: Option<usize>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Mesh {
    pub name: Option<String>,
    pub primitives: Vec<Primitive>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TextureInfo {
    pub index: usize,
    #[serde(rename = "texCoord", default = "default_tex_coord")]
    pub tex_coord: usize,
}

#[derive(Deserialize, Debug, Clone)]
pub struct NormalTextureInfo {
    pub index: usize,
    #[serde(rename = "texCoord", default = "default_tex_coord")]
    pub tex_coord: usize,
    #[serde(default = "default_scale")]
    pub scale: f32,
}

#[derive(Deserialize, Debug, Clone)]
pub struct OcclusionTextureInfo {
    pub index: usize,
    #[serde(rename = "texCoord", default = "default_tex_coord")]
    pub tex_coord: usize,
    #[serde(default = "default_strength")]
    pub strength: f32,
}

/*
* Green channel = roughness
* Blue channel = metalness
*/
#[derive(Deserialize, Debug, Clone, Default)]
pub struct PbrMetallicRoughness {
    #[serde(rename = "baseColorFactor")]
    pub base_color_factor: Option<[f32; 4]>,
    #[serde(rename = "metallicFactor")]
    pub metallic_factor: Option<f32>,
    #[serde(rename = "roughnessFactor")]
    pub roughness_factor: Option<f32>,
    #[serde(rename = "baseColorTexture")]
    pub base_color_texture: Option<TextureInfo>,
    #[serde(rename = "metallicRoughnessTexture")]
    pub metallic_roughness_texture: Option<TextureInfo>,
}

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AlphaMode {
    #[default]
    #[serde(rename = "OPAQUE")]
    Opaque,
    #[serde(rename = "MASK")]
    Mask,
    #[serde(rename = "BLEND")]
    Blend,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Material {
    pub name: Option<String>,
    #[serde(rename = "pbrMetallicRoughness")]
    pub pbr_metallic_roughness: Option<PbrMetallicRoughness>,
    #[serde(rename = "normalTexture")]
    pub normal_texture: Option<NormalTextureInfo>,
    #[serde(rename = "occlusionTexture")]
    pub occlusion_texture: Option<OcclusionTextureInfo>,
    #[serde(rename = "emissiveTexture")]
    pub emissive_texture: Option<TextureInfo>,
    #[serde(rename = "emissiveFactor")]
    pub emissive_factor: Option<[f32; 3]>,
    #[serde(rename = "alphaMode", default)]
    pub alpha_mode: AlphaMode,
    #[serde(rename = "alphaCutoff", default = "default_alpha_cutoff")]
    pub alpha_cutoff: f32,
    #[serde(rename = "doubleSided", default)]
    pub double_sided: bool,
}

impl Material {
    /// Every texture index the material references, for validation.
    fn texture_indices(&self) -> impl Iterator<Item = usize> + '_ {
        let pbr = self.pbr_metallic_roughness.as_ref();
        [
            pbr.and_then(|p| p.base_color_texture.as_ref()).map(|t| t.index),
            pbr.and_then(|p| p.metallic_roughness_texture.as_ref()).map(|t| t.index),
            self.normal_texture.as_ref().map(|t| t.index),
            self.occlusion_texture.as_ref().map(|t| t.index),
            self.emissive_texture.as_ref().map(|t| t.index),
        ]
        .into_iter()
        .flatten()
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Node {
    pub name: Option<String>,
    pub mesh: Option<usize>,
    pub camera: Option<usize>,
    pub translation: Option<[f32; 3]>,
    pub rotation: Option<[f32; 4]>,
    pub scale: Option<[f32; 3]>,
    pub matrix: Option<[f32; 16]>,
    #[serde(default)]
    pub children: Vec<usize>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Scene {
    pub name: Option<String>,
    #[serde(default)]
    pub nodes: Vec<usize>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Texture {
    pub source: usize,
    pub sampler: Option<usize>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Sampler {
    #[serde(rename = "magFilter")]
    pub mag_filter: Option<u32>,
    #[serde(rename = "minFilter")]
    pub min_filter: Option<u32>,
    #[serde(rename = "wrapS")]
    pub wrap_s: Option<u32>,
    #[serde(rename = "wrapT")]
    pub wrap_t: Option<u32>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Image {
    pub uri: Option<String>,
    #[serde(rename = "bufferView")]
    pub buffer_view: Option<usize>,
    #[serde(rename = "mimeType")]
    pub mime_type: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Perspective {
    #[serde(rename = "aspectRatio")]
    pub aspect_ratio: Option<f32>,
    pub yfov: f32,
    pub zfar: Option<f32>,
    pub znear: f32,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Orthographic {
    pub xmag: f32,
    pub ymag: f32,
    pub zfar: f32,
    pub znear: f32,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Camera {
    pub name: Option<String>,
    pub perspective: Option<Perspective>,
    pub orthographic: Option<Orthographic>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetPath {
    #[serde(rename = "translation")]
    Translation,
    #[serde(rename = "rotation")]
    Rotation,
    #[serde(rename = "scale")]
    Scale,
    #[serde(rename = "weights")]
    Weights,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ChannelTarget {
    pub node: Option<usize>,
    pub path: TargetPath,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AnimationChannel {
    pub sampler: usize,
    pub target: ChannelTarget,
}

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Interpolation {
    #[default]
    #[serde(rename = "LINEAR")]
    Linear,
    #[serde(rename = "STEP")]
    Step,
    #[serde(rename = "CUBICSPLINE")]
    CubicSpline,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AnimationSampler {
    pub input: usize,
    pub output: usize,
    #[serde(default)]
    pub interpolation: Interpolation,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Animation {
    pub name: Option<String>,
    pub channels: Vec<AnimationChannel>,
    pub samplers: Vec<AnimationSampler>,
}

/// The root glTF JSON object. Arrays that an asset may omit default to empty.
#[derive(Deserialize, Debug, Clone)]
pub struct Document {
    pub asset: AssetInfo,
    pub scene: Option<usize>,
    #[serde(default)]
    pub scenes: Vec<Scene>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub meshes: Vec<Mesh>,
    #[serde(default)]
    pub accessors: Vec<Accessor>,
    #[serde(rename = "bufferViews", default)]
    pub buffer_views: Vec<BufferView>,
    #[serde(default)]
    pub buffers: Vec<Buffer>,
    #[serde(default)]
    pub materials: Vec<Material>,
    #[serde(default)]
    pub textures: Vec<Texture>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub samplers: Vec<Sampler>,
    #[serde(default)]
    pub cameras: Vec<Camera>,
    #[serde(default)]
    pub animations: Vec<Animation>,
}

fn check(kind: &'static str, index: usize, len: usize) -> FormatResult<()> {
    if index < len {
        Ok(())
    } else {
        Err(FormatError::IndexOutOfRange { kind, index, len })
    }
}

impl Document {
    pub fn from_slice(json: &[u8]) -> FormatResult<Self> {
        let document: Document = serde_json::from_slice(json)?;
        document.validate()?;
        Ok(document)
    }

    /// Checks every cross-reference once so later stages can index freely.
    pub fn validate(&self) -> FormatResult<()> {
        if let Some(scene) = self.scene {
            check("scene", scene, self.scenes.len())?;
        }
        for scene in &self.scenes {
            for &node in &scene.nodes {
                check("node", node, self.nodes.len())?;
            }
        }
        for node in &self.nodes {
            if let Some(mesh) = node.mesh {
                check("mesh", mesh, self.meshes.len())?;
            }
            if let Some(camera) = node.camera {
                check("camera", camera, self.cameras.len())?;
            }
            for &child in &node.children {
                check("node", child, self.nodes.len())?;
            }
        }
        for mesh in &self.meshes {
            for primitive in &mesh.primitives {
                let attributes = &primitive.attributes;
                let accessor_refs = primitive
                    .indices
                    .into_iter()
                    .chain(attributes.position)
                    .chain(attributes.normal)
                    .chain(attributes.tangent)
                    .chain(attributes.additional_fields.values().copied());
                for accessor in accessor_refs {
                    check("accessor", accessor, self.accessors.len())?;
                }
                if let Some(material) = primitive.material {
                    check("material", material, self.materials.len())?;
                }
            }
        }
        for accessor in &self.accessors {
            ComponentType::try_from(accessor.component_type)?;
            if let Some(view) = accessor.buffer_view {
                check("bufferView", view, self.buffer_views.len())?;
            }
        }
        for view in &self.buffer_views {
            check("buffer", view.buffer, self.buffers.len())?;
        }
        for material in &self.materials {
            for texture in material.texture_indices() {
                check("texture", texture, self.textures.len())?;
            }
        }
        for texture in &self.textures {
            check("image", texture.source, self.images.len())?;
            if let Some(sampler) = texture.sampler {
                check("sampler", sampler, self.samplers.len())?;
            }
        }
        for (index, image) in self.images.iter().enumerate() {
            match (&image.uri, image.buffer_view) {
                (_, Some(view)) => check("bufferView", view, self.buffer_views.len())?,
                (Some(_), None) => {}
                (None, None) => return Err(FormatError::ImageWithoutSource(index)),
            }
        }
        for animation in &self.animations {
            for channel in &animation.channels {
                check("animation sampler", channel.sampler, animation.samplers.len())?;
                if let Some(node) = channel.target.node {
                    check("node", node, self.nodes.len())?;
                }
            }
            for sampler in &animation.samplers {
                check("accessor", sampler.input, self.accessors.len())?;
                check("accessor", sampler.output, self.accessors.len())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "asset": { "version": "2.0" },
        "scenes": [ { "nodes": [0] } ],
        "nodes": [ { "mesh": 0 } ],
        "meshes": [ { "primitives": [ { "attributes": { "POSITION": 0, "TEXCOORD_0": 1 } } ] } ],
        "accessors": [
            { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3" },
            { "componentType": 5126, "count": 3, "type": "VEC2" }
        ],
        "bufferViews": [ { "buffer": 0, "byteLength": 36, "target": 34962 } ],
        "buffers": [ { "byteLength": 36 } ]
    }"#;

    #[test]
    fn parses_minimal_document_with_defaults() {
        let document = Document::from_slice(MINIMAL.as_bytes()).unwrap();
        assert_eq!(document.scene, None);
        assert_eq!(document.accessors[0].byte_offset, 0);
        assert_eq!(document.accessors[0].accessor_type.arity(), 3);
        assert!(!document.accessors[0].normalized);
        assert_eq!(document.buffer_views[0].target, Some(BufferViewTarget::ArrayBuffer));
        assert_eq!(document.meshes[0].primitives[0].attributes.tex_coord(0), Some(1));
        assert_eq!(document.meshes[0].primitives[0].attributes.tex_coord(1), None);
        assert!(document.animations.is_empty());
    }

    #[test]
    fn material_defaults() {
        let material: Material = serde_json::from_str("{}").unwrap();
        assert_eq!(material.alpha_mode, AlphaMode::Opaque);
        assert_eq!(material.alpha_cutoff, 0.5);
        assert!(!material.double_sided);

        let normal: NormalTextureInfo = serde_json::from_str(r#"{ "index": 2 }"#).unwrap();
        assert_eq!(normal.scale, 1.0);
        assert_eq!(normal.tex_coord, 0);
    }

    #[test]
    fn sampler_interpolation_defaults_to_linear() {
        let sampler: AnimationSampler = serde_json::from_str(r#"{ "input": 0, "output": 1 }"#).unwrap();
        assert_eq!(sampler.interpolation, Interpolation::Linear);
    }

    #[test]
    fn rejects_dangling_references() {
        let mut document = Document::from_slice(MINIMAL.as_bytes()).unwrap();
        document.nodes[0].mesh = Some(4);
        assert!(matches!(
            document.validate(),
            Err(FormatError::IndexOutOfRange { kind: "mesh", index: 4, len: 1 })
        ));

        let mut document = Document::from_slice(MINIMAL.as_bytes()).unwrap();
        document.buffer_views[0].buffer = 1;
        assert!(matches!(
            document.validate(),
            Err(FormatError::IndexOutOfRange { kind: "buffer", .. })
        ));

        let mut document = Document::from_slice(MINIMAL.as_bytes()).unwrap();
        document.scene = Some(1);
        assert!(matches!(
            document.validate(),
            Err(FormatError::IndexOutOfRange { kind: "scene", .. })
        ));
    }

    #[test]
    fn rejects_unknown_component_type() {
        let json = MINIMAL.replace("5126, \"count\": 3, \"type\": \"VEC2\"", "5127, \"count\": 3, \"type\": \"VEC2\"");
        assert!(matches!(
            Document::from_slice(json.as_bytes()),
            Err(FormatError::UnknownComponentType(5127))
        ));
    }

    #[test]
    fn missing_asset_is_a_json_error() {
        assert!(matches!(Document::from_slice(b"{}"), Err(FormatError::Json(_))));
    }
}
