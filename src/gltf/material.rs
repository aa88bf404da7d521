use crate::error::{FetchError, FormatError, FormatResult};

use super::schema::{self, AlphaMode, Document};

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum MipmapFilterMode {
    Nearest,
    Linear,
    None,
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum WrapMode {
    Repeat,
    ClampToEdge,
    MirroredRepeat,
}

/// Decoded sampler state; equal samplers share one device object.
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
pub struct Sampler {
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub mipmap_filter: MipmapFilterMode,
    pub wrap_u: WrapMode,
    pub wrap_v: WrapMode,
}

impl Default for Sampler {
    fn default() -> Self {
        Self {
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: MipmapFilterMode::None,
            wrap_u: WrapMode::Repeat,
            wrap_v: WrapMode::Repeat,
        }
    }
}

fn wrap_mode(field: &'static str, code: Option<u32>) -> FormatResult<WrapMode> {
    match code {
        None | Some(10497) => Ok(WrapMode::Repeat),
        Some(33071) => Ok(WrapMode::ClampToEdge),
        Some(33648) => Ok(WrapMode::MirroredRepeat),
        Some(code) => Err(FormatError::UnknownSamplerCode { field, code }),
    }
}

impl Sampler {
    pub fn from_schema(sampler: &schema::Sampler) -> FormatResult<Self> {
        let mag_filter = match sampler.mag_filter {
            None | Some(9729) => FilterMode::Linear,
            Some(9728) => FilterMode::Nearest,
            Some(code) => return Err(FormatError::UnknownSamplerCode { field: "magFilter", code }),
        };
        let (min_filter, mipmap_filter) = match sampler.min_filter {
            None | Some(9729) => (FilterMode::Linear, MipmapFilterMode::None),
            Some(9728) => (FilterMode::Nearest, MipmapFilterMode::None),
            Some(9984) => (FilterMode::Nearest, MipmapFilterMode::Nearest),
            Some(9985) => (FilterMode::Linear, MipmapFilterMode::Nearest),
            Some(9986) => (FilterMode::Nearest, MipmapFilterMode::Linear),
            Some(9987) => (FilterMode::Linear, MipmapFilterMode::Linear),
            Some(code) => return Err(FormatError::UnknownSamplerCode { field: "minFilter", code }),
        };
        Ok(Self {
            mag_filter,
            min_filter,
            mipmap_filter,
            wrap_u: wrap_mode("wrapS", sampler.wrap_s)?,
            wrap_v: wrap_mode("wrapT", sampler.wrap_t)?,
        })
    }
}

/// A texture reference resolved down to the image it samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBinding {
    pub image: usize,
    pub sampler: Sampler,
    pub tex_coord: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: Option<String>,
    pub base_color_factor: [f32; 4],
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub emissive_factor: [f32; 3],
    pub normal_texture_scale: f32,
    pub occlusion_strength: f32,
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub double_sided: bool,
    pub base_color_texture: Option<TextureBinding>,
    pub metallic_roughness_texture: Option<TextureBinding>,
    pub normal_texture: Option<TextureBinding>,
    pub occlusion_texture: Option<TextureBinding>,
    pub emissive_texture: Option<TextureBinding>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: None,
            base_color_factor: [1.0; 4],
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            emissive_factor: [0.0; 3],
            normal_texture_scale: 1.0,
            occlusion_strength: 1.0,
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: 0.5,
            double_sided: false,
            base_color_texture: None,
            metallic_roughness_texture: None,
            normal_texture: None,
            occlusion_texture: None,
            emissive_texture: None,
        }
    }
}

/// Uniform block written once per material.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniform {
    pub base_color_factor: [f32; 4],
    pub emissive_factor: [f32; 3],
    pub alpha_cutoff: f32,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub normal_texture_scale: f32,
    pub occlusion_strength: f32,
}

impl Material {
    pub fn textures(&self) -> impl Iterator<Item = &TextureBinding> {
        [
            &self.base_color_texture,
            &self.metallic_roughness_texture,
            &self.normal_texture,
            &self.occlusion_texture,
            &self.emissive_texture,
        ]
        .into_iter()
        .flatten()
    }

    pub fn uniform(&self) -> MaterialUniform {
        MaterialUniform {
            base_color_factor: self.base_color_factor,
            emissive_factor: self.emissive_factor,
            alpha_cutoff: self.alpha_cutoff,
            metallic_factor: self.metallic_factor,
            roughness_factor: self.roughness_factor,
            normal_texture_scale: self.normal_texture_scale,
            occlusion_strength: self.occlusion_strength,
        }
    }
}

fn texture_to_binding(document: &Document, texture_idx: usize, tex_coord: usize) -> FormatResult<TextureBinding> {
    let texture = &document.textures[texture_idx];
    let sampler = match texture.sampler {
        Some(s) => Sampler::from_schema(&document.samplers[s])?,
        None => Sampler::default(),
    };
    Ok(TextureBinding { image: texture.source, sampler, tex_coord })
}

pub fn material_from_schema(document: &Document, material_idx: usize) -> FormatResult<Material> {
    let material = &document.materials[material_idx];
    let pbr = material.pbr_metallic_roughness.clone().unwrap_or_default();
    let mut out = Material {
        name: material.name.clone(),
        alpha_mode: material.alpha_mode,
        alpha_cutoff: material.alpha_cutoff,
        double_sided: material.double_sided,
        ..Default::default()
    };
    if let Some(factor) = pbr.base_color_factor { out.base_color_factor = factor; }
    if let Some(factor) = pbr.metallic_factor { out.metallic_factor = factor; }
    if let Some(factor) = pbr.roughness_factor { out.roughness_factor = factor; }
    if let Some(factor) = material.emissive_factor { out.emissive_factor = factor; }

    out.base_color_texture = pbr.base_color_texture
        .map(|t| texture_to_binding(document, t.index, t.tex_coord))
        .transpose()?;
    out.metallic_roughness_texture = pbr.metallic_roughness_texture
        .map(|t| texture_to_binding(document, t.index, t.tex_coord))
        .transpose()?;
    if let Some(t) = &material.normal_texture {
        out.normal_texture = Some(texture_to_binding(document, t.index, t.tex_coord)?);
        out.normal_texture_scale = t.scale;
    }
    if let Some(t) = &material.occlusion_texture {
        out.occlusion_texture = Some(texture_to_binding(document, t.index, t.tex_coord)?);
        out.occlusion_strength = t.strength;
    }
    out.emissive_texture = material.emissive_texture.as_ref()
        .map(|t| texture_to_binding(document, t.index, t.tex_coord))
        .transpose()?;
    Ok(out)
}

/// Decoded RGBA8 pixels.
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap").field("width", &self.width).field("height", &self.height).finish()
    }
}

impl Bitmap {
    /// Decodes PNG or JPEG bytes. Without a mime type the format is sniffed
    /// from the first byte (0xFF is JPEG, anything else PNG).
    pub fn decode(bytes: &[u8], mime_type: Option<&str>, index: usize) -> Result<Self, FetchError> {
        let format = match mime_type {
            Some("image/png") => image::ImageFormat::Png,
            Some("image/jpeg") => image::ImageFormat::Jpeg,
            Some(other) => {
                return Err(FetchError::UnsupportedImage { index, mime_type: other.to_string() })
            }
            None if bytes.first() == Some(&0xFF) => image::ImageFormat::Jpeg,
            None => image::ImageFormat::Png,
        };
        let image = image::load_from_memory_with_format(bytes, format)
            .map_err(|source| FetchError::ImageDecode { index, source })?
            .to_rgba8();
        Ok(Self { width: image.width(), height: image.height(), rgba: image.into_raw() })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        let image = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
        let mut bytes = std::io::Cursor::new(vec![]);
        image.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn sampler_defaults_to_linear_repeat() {
        let sampler = Sampler::from_schema(&schema::Sampler::default()).unwrap();
        assert_eq!(sampler, Sampler::default());
        assert_eq!(sampler.wrap_u, WrapMode::Repeat);
        assert_eq!(sampler.mag_filter, FilterMode::Linear);
    }

    #[test]
    fn sampler_codes() {
        let sampler = Sampler::from_schema(&schema::Sampler {
            mag_filter: Some(9728),
            min_filter: Some(9986),
            wrap_s: Some(33071),
            wrap_t: Some(33648),
        })
        .unwrap();
        assert_eq!(sampler.mag_filter, FilterMode::Nearest);
        assert_eq!(sampler.min_filter, FilterMode::Nearest);
        assert_eq!(sampler.mipmap_filter, MipmapFilterMode::Linear);
        assert_eq!(sampler.wrap_u, WrapMode::ClampToEdge);
        assert_eq!(sampler.wrap_v, WrapMode::MirroredRepeat);

        assert!(matches!(
            Sampler::from_schema(&schema::Sampler { wrap_t: Some(1), ..Default::default() }),
            Err(FormatError::UnknownSamplerCode { field: "wrapT", code: 1 })
        ));
    }

    #[test]
    fn material_resolves_textures_to_images() {
        let document: Document = serde_json::from_str(
            r#"{
                "asset": { "version": "2.0" },
                "materials": [ {
                    "pbrMetallicRoughness": { "baseColorFactor": [0.5, 0.5, 0.5, 1.0], "baseColorTexture": { "index": 1 } },
                    "normalTexture": { "index": 0, "scale": 0.25, "texCoord": 1 },
                    "alphaMode": "MASK", "alphaCutoff": 0.3, "doubleSided": true
                } ],
                "textures": [ { "source": 0, "sampler": 0 }, { "source": 0 } ],
                "images": [ { "uri": "a.png" } ],
                "samplers": [ { "magFilter": 9728 } ]
            }"#,
        )
        .unwrap();
        let material = material_from_schema(&document, 0).unwrap();
        assert_eq!(material.base_color_factor, [0.5, 0.5, 0.5, 1.0]);
        assert_eq!(material.metallic_factor, 1.0);
        assert_eq!(material.alpha_mode, AlphaMode::Mask);
        assert_eq!(material.alpha_cutoff, 0.3);
        assert!(material.double_sided);
        assert_eq!(material.normal_texture_scale, 0.25);
        let normal = material.normal_texture.unwrap();
        assert_eq!((normal.image, normal.tex_coord), (0, 1));
        assert_eq!(normal.sampler.mag_filter, FilterMode::Nearest);
        assert_eq!(material.base_color_texture.unwrap().sampler, Sampler::default());
        assert_eq!(material.textures().count(), 2);
    }

    #[test]
    fn decodes_png_with_and_without_mime() {
        let bytes = png_bytes(2, 3, [10, 20, 30, 255]);
        let bitmap = Bitmap::decode(&bytes, Some("image/png"), 0).unwrap();
        assert_eq!((bitmap.width, bitmap.height), (2, 3));
        assert_eq!(&bitmap.rgba[..4], &[10, 20, 30, 255]);
        assert_eq!(Bitmap::decode(&bytes, None, 0).unwrap(), bitmap);
    }

    #[test]
    fn rejects_unsupported_and_corrupt_images() {
        assert!(matches!(
            Bitmap::decode(&[0; 8], Some("image/ktx2"), 3),
            Err(FetchError::UnsupportedImage { index: 3, .. })
        ));
        assert!(matches!(
            Bitmap::decode(&[0xFF, 0x00, 0x01], None, 1),
            Err(FetchError::ImageDecode { index: 1, .. })
        ));
    }
}
