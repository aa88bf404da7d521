use glam::{Vec2, Vec3};
use log::warn;

use crate::config::NormalGeneration;
use crate::error::{FormatError, FormatResult};
use crate::scene::aabb::{calculate_aabb, Aabb};

use super::accessor::{AccessorReader, Indices};
use super::schema;

/// Interleaved vertex layout handed to the device.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub tangent: [f32; 4],
    pub color: [f32; 4],
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv0: [f32; 2],
    pub uv1: [f32; 2],
}

impl Default for Vertex {
    fn default() -> Self {
        Vertex {
            tangent: [1.0, 0.0, 0.0, 1.0],
            color: [1.0, 1.0, 1.0, 1.0],
            position: [0.0, 0.0, 0.0],
            normal: [0.0, 0.0, 1.0],
            uv0: [0.0, 0.0],
            uv1: [0.0, 0.0],
        }
    }
}

/// A decoded, immutable draw unit.
#[derive(Debug, Clone)]
pub struct Primitive {
    /// Index count when indexed, position count otherwise.
    pub vertex_count: usize,
    pub indices: Option<Indices>,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Option<Vec<[f32; 2]>>,
    pub uv1s: Option<Vec<[f32; 2]>>,
    pub tangents: Option<Vec<[f32; 4]>>,
    pub colors: Option<Vec<[f32; 4]>>,
    pub material: Option<usize>,
    pub bounding_box: Option<Aabb>,
}

impl Primitive {
    pub fn has_tangents(&self) -> bool {
        self.tangents.is_some()
    }

    pub fn vertices(&self) -> Vec<Vertex> {
        let mut vertices = vec![];
        for i in 0..self.positions.len() {
            let mut vert = Vertex::default();
            vert.position = self.positions[i];
            vert.normal = self.normals[i];
            if let Some(ref n) = self.tangents { vert.tangent = n[i]; }
            if let Some(ref n) = self.colors { vert.color = n[i]; }
            if let Some(ref n) = self.uvs { vert.uv0 = n[i]; }
            if let Some(ref n) = self.uv1s { vert.uv1 = n[i]; }
            vertices.push(vert);
        }
        vertices
    }
}

/// Vertex triples of every complete triangle, indexed or sequential.
pub fn triangles(indices: Option<&Indices>, position_count: usize) -> Vec<[usize; 3]> {
    match indices {
        Some(indices) => {
            let flat: Vec<usize> = indices.iter().map(|i| i as usize).collect();
            flat.chunks_exact(3).map(|t| [t[0], t[1], t[2]]).collect()
        }
        None => (0..position_count / 3).map(|t| [t * 3, t * 3 + 1, t * 3 + 2]).collect(),
    }
}

/// Sums the face cross product of every adjacent triangle into each vertex.
pub fn generate_normals(positions: &[[f32; 3]], triangles: &[[usize; 3]], mode: NormalGeneration) -> Vec<[f32; 3]> {
    let mut sums = vec![Vec3::ZERO; positions.len()];
    for &[i0, i1, i2] in triangles {
        let p0 = Vec3::from(positions[i0]);
        let p1 = Vec3::from(positions[i1]);
        let p2 = Vec3::from(positions[i2]);
        let cross = (p1 - p0).cross(p2 - p0);
        sums[i0] += cross;
        sums[i1] += cross;
        sums[i2] += cross;
    }
    sums.into_iter()
        .map(|n| match mode {
            NormalGeneration::Accumulated => n,
            NormalGeneration::Normalized if n.length_squared() < f32::EPSILON => Vec3::Y,
            NormalGeneration::Normalized => n.normalize(),
        })
        .map(|n| n.to_array())
        .collect()
}

/// Per-vertex tangents from UV derivatives, orthogonalized against the vertex
/// normal. `w` carries the handedness of the accumulated UV mapping.
pub fn generate_tangents(
    positions: &[[f32; 3]],
    normals: &[[f32; 3]],
    uvs: &[[f32; 2]],
    triangles: &[[usize; 3]],
) -> Vec<[f32; 4]> {
    let mut tangent_sums = vec![Vec3::ZERO; positions.len()];
    let mut determinant_sums = vec![0f32; positions.len()];
    for &[i0, i1, i2] in triangles {
        let p0 = Vec3::from(positions[i0]);
        let e1 = Vec3::from(positions[i1]) - p0;
        let e2 = Vec3::from(positions[i2]) - p0;
        let uv0 = Vec2::from(uvs[i0]);
        let d1 = Vec2::from(uvs[i1]) - uv0;
        let d2 = Vec2::from(uvs[i2]) - uv0;
        let det = d1.x * d2.y - d2.x * d1.y;
        if det.abs() < f32::EPSILON {
            continue;
        }
        let tangent = (e1 * d2.y - e2 * d1.y) / det;
        for i in [i0, i1, i2] {
            tangent_sums[i] += tangent;
            determinant_sums[i] += det;
        }
    }
    tangent_sums
        .into_iter()
        .zip(determinant_sums)
        .zip(normals)
        .map(|((t, det), n)| {
            let n = Vec3::from(*n);
            let t = (t - n * n.dot(t)).try_normalize().unwrap_or_else(|| n.any_orthonormal_vector());
            let w = if det < 0.0 { -1.0 } else { 1.0 };
            [t.x, t.y, t.z, w]
        })
        .collect()
}

fn declared_bounds(accessor: &schema::Accessor) -> Option<Aabb> {
    match (accessor.min.as_deref(), accessor.max.as_deref()) {
        (Some(&[x0, y0, z0]), Some(&[x1, y1, z1])) => Some(Aabb::new([x0, y0, z0], [x1, y1, z1])),
        _ => None,
    }
}

/// Reads a vertex attribute that must have one element per position.
fn read_vertex_attribute<const N: usize>(
    reader: &AccessorReader,
    accessor_idx: usize,
    attribute: &'static str,
    expected: usize,
) -> FormatResult<Vec<[f32; N]>> {
    let values = reader.read_array::<N>(accessor_idx, attribute)?;
    check_count(attribute, expected, values.len())?;
    Ok(values)
}

fn check_count(attribute: &'static str, expected: usize, found: usize) -> FormatResult<()> {
    if found != expected {
        return Err(FormatError::AttributeCountMismatch { attribute, expected, found });
    }
    Ok(())
}

fn read_colors(reader: &AccessorReader, accessor_idx: usize) -> FormatResult<Vec<[f32; 4]>> {
    match reader.arity(accessor_idx) {
        3 => Ok(reader
            .read_array::<3>(accessor_idx, "COLOR_0")?
            .into_iter()
            .map(|[r, g, b]| [r, g, b, 1.0])
            .collect()),
        _ => reader.read_array::<4>(accessor_idx, "COLOR_0"),
    }
}

pub fn build_primitive(
    reader: &AccessorReader,
    primitive: &schema::Primitive,
    normal_generation: NormalGeneration,
) -> FormatResult<Primitive> {
    let attributes = &primitive.attributes;
    let position_idx = attributes.position.ok_or(FormatError::MissingAttribute("POSITION"))?;
    let positions = reader.read_array::<3>(position_idx, "POSITION")?;
    let indices = primitive
        .indices
        .map(|i| reader.read_indices(i, positions.len()))
        .transpose()?;
    let vertex_count = indices.as_ref().map_or(positions.len(), |i| i.len());
    let triangles = triangles(indices.as_ref(), positions.len());

    let authored_normals = attributes
        .normal
        .map(|n| read_vertex_attribute::<3>(reader, n, "NORMAL", positions.len()))
        .transpose()?;
    let has_authored_normals = authored_normals.is_some();
    let normals = match authored_normals {
        Some(normals) => normals,
        None => generate_normals(&positions, &triangles, normal_generation),
    };

    let uvs = attributes
        .tex_coord(0)
        .map(|n| read_vertex_attribute::<2>(reader, n, "TEXCOORD_0", positions.len()))
        .transpose()?;
    let uv1s = attributes
        .tex_coord(1)
        .map(|n| read_vertex_attribute::<2>(reader, n, "TEXCOORD_1", positions.len()))
        .transpose()?;
    let colors = attributes.color().map(|n| read_colors(reader, n)).transpose()?;
    if let Some(colors) = &colors {
        check_count("COLOR_0", positions.len(), colors.len())?;
    }

    let material = primitive.material.map(|m| &reader.document.materials[m]);
    let has_normal_texture = material.is_some_and(|m| m.normal_texture.is_some());
    let tangents = match (attributes.tangent, has_authored_normals) {
        (Some(t), true) => Some(read_vertex_attribute::<4>(reader, t, "TANGENT", positions.len())?),
        _ if has_normal_texture => match &uvs {
            Some(uvs) => Some(generate_tangents(&positions, &normals, uvs, &triangles)),
            None => {
                warn!("material {:?} has a normal texture but the primitive has no TEXCOORD_0, skipping tangents", primitive.material);
                None
            }
        },
        _ => None,
    };

    let bounding_box = declared_bounds(&reader.document.accessors[position_idx]).or_else(|| calculate_aabb(&positions));

    Ok(Primitive {
        vertex_count,
        indices,
        positions,
        normals,
        uvs,
        uv1s,
        tangents,
        colors,
        material: primitive.material,
        bounding_box,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gltf::schema::Document;

    fn assert_close(a: [f32; 3], b: [f32; 3]) {
        for i in 0..3 {
            assert!((a[i] - b[i]).abs() < 1e-5, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn normals_of_a_single_triangle() {
        let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let tris = triangles(None, 3);
        let normals = generate_normals(&positions, &tris, NormalGeneration::Normalized);
        for n in normals {
            assert_close(n, [0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn accumulated_normals_keep_the_raw_sum() {
        // two coplanar triangles sharing vertices 0 and 2
        let positions = [[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [2.0, 2.0, 0.0], [0.0, 2.0, 0.0]];
        let indices = Indices::U16(vec![0, 1, 2, 0, 2, 3]);
        let tris = triangles(Some(&indices), 4);
        let raw = generate_normals(&positions, &tris, NormalGeneration::Accumulated);
        assert_close(raw[0], [0.0, 0.0, 8.0]);
        assert_close(raw[1], [0.0, 0.0, 4.0]);
        let unit = generate_normals(&positions, &tris, NormalGeneration::Normalized);
        for n in unit {
            assert_close(n, [0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn degenerate_and_unreferenced_vertices_point_up() {
        let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0], [5.0, 5.0, 5.0]];
        let normals = generate_normals(&positions, &triangles(None, 3), NormalGeneration::Normalized);
        assert_eq!(normals, vec![[0.0, 1.0, 0.0]; 4]);
    }

    #[test]
    fn tangents_follow_u_and_are_orthonormal() {
        let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let normals = [[0.0, 0.0, 1.0]; 3];
        let uvs = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let tangents = generate_tangents(&positions, &normals, &uvs, &triangles(None, 3));
        for t in &tangents {
            assert_close([t[0], t[1], t[2]], [1.0, 0.0, 0.0]);
            assert_eq!(t[3], 1.0);
        }

        let mirrored = [[0.0, 0.0], [-1.0, 0.0], [0.0, 1.0]];
        let tangents = generate_tangents(&positions, &normals, &mirrored, &triangles(None, 3));
        for t in &tangents {
            assert_close([t[0], t[1], t[2]], [-1.0, 0.0, 0.0]);
            assert_eq!(t[3], -1.0);
        }
    }

    #[test]
    fn tangent_falls_back_to_an_orthonormal_vector() {
        let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let normals = [[0.0, 0.0, 1.0]; 3];
        let uvs = [[0.5, 0.5]; 3];
        for t in generate_tangents(&positions, &normals, &uvs, &triangles(None, 3)) {
            let t = Vec3::new(t[0], t[1], t[2]);
            assert!((t.length() - 1.0).abs() < 1e-5);
            assert!(t.dot(Vec3::Z).abs() < 1e-5);
        }
    }

    fn quad_document(extra_attributes: &str, material: &str) -> (Document, Vec<Vec<u8>>) {
        let mut bin: Vec<u8> = vec![];
        for p in [[0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]] {
            bin.extend(p.iter().flat_map(|v| v.to_le_bytes()));
        }
        for uv in [[0f32, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]] {
            bin.extend(uv.iter().flat_map(|v| v.to_le_bytes()));
        }
        bin.extend([0u8, 1, 2, 0, 2, 3]);
        let json = format!(
            r#"{{
                "asset": {{ "version": "2.0" }},
                "meshes": [ {{ "primitives": [ {{
                    "attributes": {{ "POSITION": 0 {extra_attributes} }},
                    "indices": 2, "material": 0
                }} ] }} ],
                "materials": [ {material} ],
                "textures": [ {{ "source": 0 }} ],
                "images": [ {{ "uri": "n.png" }} ],
                "accessors": [
                    {{ "bufferView": 0, "componentType": 5126, "count": 4, "type": "VEC3" }},
                    {{ "bufferView": 1, "componentType": 5126, "count": 4, "type": "VEC2" }},
                    {{ "bufferView": 2, "componentType": 5121, "count": 6, "type": "SCALAR" }}
                ],
                "bufferViews": [
                    {{ "buffer": 0, "byteOffset": 0, "byteLength": 48 }},
                    {{ "buffer": 0, "byteOffset": 48, "byteLength": 32 }},
                    {{ "buffer": 0, "byteOffset": 80, "byteLength": 6 }}
                ],
                "buffers": [ {{ "byteLength": 86 }} ]
            }}"#
        );
        (Document::from_slice(json.as_bytes()).unwrap(), vec![bin])
    }

    #[test]
    fn builds_indexed_primitive_with_generated_attributes() {
        let (document, buffers) = quad_document(r#", "TEXCOORD_0": 1"#, r#"{ "normalTexture": { "index": 0 } }"#);
        let reader = AccessorReader::new(&document, &buffers);
        let primitive = build_primitive(&reader, &document.meshes[0].primitives[0], NormalGeneration::Normalized).unwrap();
        assert_eq!(primitive.vertex_count, 6);
        assert_eq!(primitive.indices, Some(Indices::U16(vec![0, 1, 2, 0, 2, 3])));
        assert_eq!(primitive.normals.len(), 4);
        assert_close(primitive.normals[2], [0.0, 0.0, 1.0]);
        let tangents = primitive.tangents.as_ref().unwrap();
        assert_close([tangents[0][0], tangents[0][1], tangents[0][2]], [1.0, 0.0, 0.0]);
        assert_eq!(primitive.bounding_box, Some(Aabb::new([0.0; 3], [1.0, 1.0, 0.0])));
        assert_eq!(primitive.vertices().len(), 4);
    }

    #[test]
    fn normal_texture_without_uvs_has_no_tangents() {
        let (document, buffers) = quad_document("", r#"{ "normalTexture": { "index": 0 } }"#);
        let reader = AccessorReader::new(&document, &buffers);
        let primitive = build_primitive(&reader, &document.meshes[0].primitives[0], NormalGeneration::Normalized).unwrap();
        assert!(primitive.tangents.is_none());
        assert!(primitive.uvs.is_none());
    }

    #[test]
    fn no_normal_texture_no_tangents() {
        let (document, buffers) = quad_document(r#", "TEXCOORD_0": 1"#, "{}");
        let reader = AccessorReader::new(&document, &buffers);
        let primitive = build_primitive(&reader, &document.meshes[0].primitives[0], NormalGeneration::Normalized).unwrap();
        assert!(!primitive.has_tangents());
        assert!(primitive.uvs.is_some());
    }

    #[test]
    fn missing_position_is_an_error() {
        let (document, buffers) = quad_document("", "{}");
        let reader = AccessorReader::new(&document, &buffers);
        let mut primitive = document.meshes[0].primitives[0].clone();
        primitive.attributes.position = None;
        assert!(matches!(
            build_primitive(&reader, &primitive, NormalGeneration::Normalized),
            Err(FormatError::MissingAttribute("POSITION"))
        ));
    }

    #[test]
    fn attributes_shorter_than_positions_are_rejected() {
        let (mut document, buffers) = quad_document(r#", "NORMAL": 1"#, "{}");
        // reuse the uv view as a 2-element VEC3 accessor
        document.accessors[1].accessor_type = schema::AccessorType::Vec3;
        document.accessors[1].count = 2;
        let reader = AccessorReader::new(&document, &buffers);
        assert!(matches!(
            build_primitive(&reader, &document.meshes[0].primitives[0], NormalGeneration::Normalized),
            Err(FormatError::AttributeCountMismatch { attribute: "NORMAL", expected: 4, found: 2 })
        ));

        let (mut document, buffers) = quad_document(r#", "TEXCOORD_0": 1"#, r#"{ "normalTexture": { "index": 0 } }"#);
        document.accessors[1].count = 3;
        let reader = AccessorReader::new(&document, &buffers);
        assert!(matches!(
            build_primitive(&reader, &document.meshes[0].primitives[0], NormalGeneration::Normalized),
            Err(FormatError::AttributeCountMismatch { attribute: "TEXCOORD_0", expected: 4, found: 3 })
        ));
    }

    #[test]
    fn declared_bounds_are_trusted() {
        let (mut document, buffers) = quad_document("", "{}");
        document.accessors[0].min = Some(vec![-5.0, -5.0, -5.0]);
        document.accessors[0].max = Some(vec![5.0, 5.0, 5.0]);
        let reader = AccessorReader::new(&document, &buffers);
        let primitive = build_primitive(&reader, &document.meshes[0].primitives[0], NormalGeneration::Normalized).unwrap();
        assert_eq!(primitive.bounding_box, Some(Aabb::new([-5.0; 3], [5.0; 3])));
    }
}
