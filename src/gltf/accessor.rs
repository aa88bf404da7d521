use crate::error::{FormatError, FormatResult};

use super::schema::{BufferView, ComponentType, Document};

/// Decoded accessor contents: `count * arity` components in the accessor's own
/// component type.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessorData {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    F32(Vec<f32>),
}

impl AccessorData {
    pub fn len(&self) -> usize {
        match self {
            AccessorData::I8(v) => v.len(),
            AccessorData::U8(v) => v.len(),
            AccessorData::I16(v) => v.len(),
            AccessorData::U16(v) => v.len(),
            AccessorData::U32(v) => v.len(),
            AccessorData::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn zeroed(component_type: ComponentType, len: usize) -> Self {
        match component_type {
            ComponentType::SignedByte => AccessorData::I8(vec![0; len]),
            ComponentType::UnsignedByte => AccessorData::U8(vec![0; len]),
            ComponentType::SignedShort => AccessorData::I16(vec![0; len]),
            ComponentType::UnsignedShort => AccessorData::U16(vec![0; len]),
            ComponentType::UnsignedInt => AccessorData::U32(vec![0; len]),
            ComponentType::Float => AccessorData::F32(vec![0.0; len]),
        }
    }

    /// Converts every component to f32. With `normalized` set, integer components
    /// map to [0, 1] (unsigned) or [-1, 1] (signed).
    pub fn into_f32(self, normalized: bool) -> Vec<f32> {
        match (self, normalized) {
            (AccessorData::F32(v), _) => v,
            (AccessorData::I8(v), true) => v.into_iter().map(|c| (c as f32 / 127.0).max(-1.0)).collect(),
            (AccessorData::U8(v), true) => v.into_iter().map(|c| c as f32 / 255.0).collect(),
            (AccessorData::I16(v), true) => v.into_iter().map(|c| (c as f32 / 32767.0).max(-1.0)).collect(),
            (AccessorData::U16(v), true) => v.into_iter().map(|c| c as f32 / 65535.0).collect(),
            (AccessorData::U32(v), true) => v.into_iter().map(|c| c as f32 / u32::MAX as f32).collect(),
            (AccessorData::I8(v), false) => v.into_iter().map(|c| c as f32).collect(),
            (AccessorData::U8(v), false) => v.into_iter().map(|c| c as f32).collect(),
            (AccessorData::I16(v), false) => v.into_iter().map(|c| c as f32).collect(),
            (AccessorData::U16(v), false) => v.into_iter().map(|c| c as f32).collect(),
            (AccessorData::U32(v), false) => v.into_iter().map(|c| c as f32).collect(),
        }
    }
}

/// Index data after promotion. Values are never narrowed: u8 widens to u16,
/// u16 and u32 keep their width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Indices {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl Indices {
    pub fn len(&self) -> usize {
        match self {
            Indices::U16(v) => v.len(),
            Indices::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> Option<u32> {
        match self {
            Indices::U16(v) => v.get(i).map(|&x| x as u32),
            Indices::U32(v) => v.get(i).copied(),
        }
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = u32> + '_> {
        match self {
            Indices::U16(v) => Box::new(v.iter().map(|&x| x as u32)),
            Indices::U32(v) => Box::new(v.iter().copied()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Indices::U16(v) => bytemuck::cast_slice(v),
            Indices::U32(v) => bytemuck::cast_slice(v),
        }
    }

    /// Applies the promotion policy and rejects any index that would address a
    /// vertex past `vertex_count`.
    pub fn from_accessor_data(data: AccessorData, vertex_count: usize) -> FormatResult<Self> {
        let indices = match data {
            AccessorData::U8(v) => Indices::U16(v.into_iter().map(u16::from).collect()),
            AccessorData::U16(v) => Indices::U16(v),
            AccessorData::U32(v) => Indices::U32(v),
            _ => return Err(FormatError::InvalidIndexType),
        };
        if let Some(index) = indices.iter().find(|&i| i as usize >= vertex_count) {
            return Err(FormatError::VertexIndexOutOfRange { index, vertex_count });
        }
        Ok(indices)
    }
}

fn accessor_to_contiguous_array<F, T>(
    slice: &[u8],
    count: usize,
    arity: usize,
    component_size: usize,
    stride: usize,
    f: F,
) -> Vec<T>
where
    F: Fn(&[u8]) -> T,
{
    let mut data: Vec<T> = Vec::with_capacity(count * arity);
    for element in 0..count {
        let record = &slice[element * stride..element * stride + arity * component_size];
        data.extend(record.chunks_exact(component_size).map(&f));
    }
    data
}

/// Reads `count` elements of `arity` components starting at `byte_offset`.
/// A `stride` wider than the element de-interleaves; `None` means tightly packed.
pub fn decode(
    component_type: u32,
    buffer: &[u8],
    byte_offset: usize,
    count: usize,
    arity: usize,
    stride: Option<usize>,
) -> FormatResult<AccessorData> {
    let component_type = ComponentType::try_from(component_type)?;
    let component_size = component_type.size();
    let element_size = arity * component_size;
    let stride = stride.unwrap_or(element_size);
    if stride < element_size {
        return Err(FormatError::StrideTooSmall { stride, element_size });
    }
    if count == 0 {
        return Ok(AccessorData::zeroed(component_type, 0));
    }
    let end = (count - 1)
        .checked_mul(stride)
        .and_then(|n| n.checked_add(element_size))
        .and_then(|n| n.checked_add(byte_offset))
        .unwrap_or(usize::MAX);
    let slice = buffer
        .get(byte_offset..end)
        .ok_or(FormatError::AccessorOutOfBounds { start: byte_offset, end, len: buffer.len() })?;

    Ok(match component_type {
        ComponentType::SignedByte => AccessorData::I8(accessor_to_contiguous_array(
            slice, count, arity, component_size, stride, |b| b[0] as i8,
        )),
        ComponentType::UnsignedByte => AccessorData::U8(accessor_to_contiguous_array(
            slice, count, arity, component_size, stride, |b| b[0],
        )),
        ComponentType::SignedShort => AccessorData::I16(accessor_to_contiguous_array(
            slice, count, arity, component_size, stride, |b| i16::from_le_bytes([b[0], b[1]]),
        )),
        ComponentType::UnsignedShort => AccessorData::U16(accessor_to_contiguous_array(
            slice, count, arity, component_size, stride, |b| u16::from_le_bytes([b[0], b[1]]),
        )),
        ComponentType::UnsignedInt => AccessorData::U32(accessor_to_contiguous_array(
            slice, count, arity, component_size, stride, |b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        )),
        ComponentType::Float => AccessorData::F32(accessor_to_contiguous_array(
            slice, count, arity, component_size, stride, |b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        )),
    })
}

/// The bytes a buffer view covers within its buffer.
pub fn buffer_view_slice<'b>(buffer: &'b [u8], view: &BufferView) -> FormatResult<&'b [u8]> {
    let start = view.byte_offset;
    let end = start.checked_add(view.byte_length).unwrap_or(usize::MAX);
    buffer.get(start..end).ok_or(FormatError::AccessorOutOfBounds { start, end, len: buffer.len() })
}

/// Component count of a view-less accessor, refused when its byte size cannot
/// be allocated.
fn zero_fill_len(count: usize, arity: usize, component_size: usize) -> FormatResult<usize> {
    count
        .checked_mul(arity)
        .filter(|len| len.checked_mul(component_size).is_some_and(|bytes| bytes <= isize::MAX as usize))
        .ok_or(FormatError::AccessorOutOfBounds { start: 0, end: usize::MAX, len: 0 })
}

/// Resolves accessors of a validated document against its loaded buffers.
pub struct AccessorReader<'a> {
    pub document: &'a Document,
    pub buffers: &'a [Vec<u8>],
}

impl<'a> AccessorReader<'a> {
    pub fn new(document: &'a Document, buffers: &'a [Vec<u8>]) -> Self {
        Self { document, buffers }
    }

    pub fn arity(&self, accessor_idx: usize) -> usize {
        self.document.accessors[accessor_idx].accessor_type.arity()
    }

    pub fn count(&self, accessor_idx: usize) -> usize {
        self.document.accessors[accessor_idx].count
    }

    pub fn read(&self, accessor_idx: usize) -> FormatResult<AccessorData> {
        let accessor = &self.document.accessors[accessor_idx];
        let arity = accessor.accessor_type.arity();
        let Some(view_idx) = accessor.buffer_view else {
            let component_type = ComponentType::try_from(accessor.component_type)?;
            let len = zero_fill_len(accessor.count, arity, component_type.size())?;
            return Ok(AccessorData::zeroed(component_type, len));
        };
        let view = &self.document.buffer_views[view_idx];
        let view_slice = buffer_view_slice(&self.buffers[view.buffer], view)?;
        decode(accessor.component_type, view_slice, accessor.byte_offset, accessor.count, arity, view.byte_stride)
    }

    pub fn read_f32(&self, accessor_idx: usize) -> FormatResult<Vec<f32>> {
        let normalized = self.document.accessors[accessor_idx].normalized;
        Ok(self.read(accessor_idx)?.into_f32(normalized))
    }

    /// Reads an accessor that must have exactly `N` components per element.
    pub fn read_array<const N: usize>(&self, accessor_idx: usize, attribute: &'static str) -> FormatResult<Vec<[f32; N]>> {
        let found = self.arity(accessor_idx);
        if found != N {
            return Err(FormatError::UnexpectedArity { attribute, expected: N, found });
        }
        let flat = self.read_f32(accessor_idx)?;
        Ok(flat
            .chunks_exact(N)
            .map(|c| std::array::from_fn(|i| c[i]))
            .collect())
    }

    pub fn read_indices(&self, accessor_idx: usize, vertex_count: usize) -> FormatResult<Indices> {
        Indices::from_accessor_data(self.read(accessor_idx)?, vertex_count)
    }
}
