use crate::gltf::material::Material;
use crate::gltf::primitive::Primitive;
use crate::gltf::schema::AlphaMode;

/// Vertex streams a primitive provides beyond position and normal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct VertexFeatures {
    pub uv0: bool,
    pub uv1: bool,
    pub tangent: bool,
    pub color: bool,
}

/// Texture slots bound by a material.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TextureSlots {
    pub base_color: bool,
    pub metallic_roughness: bool,
    pub normal: bool,
    pub occlusion: bool,
    pub emissive: bool,
}

/// Everything that selects a pipeline variant. Two primitives with equal
/// signatures draw with the same pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialSignature {
    pub vertex: VertexFeatures,
    pub textures: TextureSlots,
    pub alpha_mode: AlphaMode,
    pub double_sided: bool,
}

impl MaterialSignature {
    pub fn new(primitive: &Primitive, material: &Material) -> Self {
        Self {
            vertex: VertexFeatures {
                uv0: primitive.uvs.is_some(),
                uv1: primitive.uv1s.is_some(),
                tangent: primitive.has_tangents(),
                color: primitive.colors.is_some(),
            },
            textures: TextureSlots {
                base_color: material.base_color_texture.is_some(),
                metallic_roughness: material.metallic_roughness_texture.is_some(),
                normal: material.normal_texture.is_some(),
                occlusion: material.occlusion_texture.is_some(),
                emissive: material.emissive_texture.is_some(),
            },
            alpha_mode: material.alpha_mode,
            double_sided: material.double_sided,
        }
    }

    pub fn pipeline_descriptor(&self) -> PipelineDescriptor {
        let mut defines = vec![];
        let vertex = &self.vertex;
        let textures = &self.textures;
        for (enabled, define) in [
            (vertex.uv0, "HAS_UV0"),
            (vertex.uv1, "HAS_UV1"),
            (vertex.tangent, "HAS_TANGENT"),
            (vertex.color, "HAS_COLOR"),
            (textures.base_color, "HAS_BASE_COLOR_TEXTURE"),
            (textures.metallic_roughness, "HAS_METALLIC_ROUGHNESS_TEXTURE"),
            (textures.normal, "HAS_NORMAL_TEXTURE"),
            (textures.occlusion, "HAS_OCCLUSION_TEXTURE"),
            (textures.emissive, "HAS_EMISSIVE_TEXTURE"),
            (self.alpha_mode == AlphaMode::Mask, "ALPHA_MASK"),
        ] {
            if enabled {
                defines.push(define);
            }
        }

        PipelineDescriptor {
            signature: *self,
            defines,
            cull_mode: if self.double_sided { None } else { Some(CullMode::Back) },
            blend: match self.alpha_mode {
                AlphaMode::Blend => BlendMode::AlphaBlending,
                AlphaMode::Opaque | AlphaMode::Mask => BlendMode::Replace,
            },
            depth_write: self.alpha_mode != AlphaMode::Blend,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    Replace,
    AlphaBlending,
}

/// Fixed-function state and shader feature switches of one pipeline variant.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDescriptor {
    pub signature: MaterialSignature,
    pub defines: Vec<&'static str>,
    pub cull_mode: Option<CullMode>,
    pub blend: BlendMode,
    pub depth_write: bool,
}
