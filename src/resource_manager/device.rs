use generational_arena::{Arena, Index};
use log::trace;

use crate::error::DeviceError;
use crate::gltf::material::{Bitmap, Sampler};

use super::signature::PipelineDescriptor;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct BufferId(pub Index);
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct TextureId(pub Index);
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct SamplerId(pub Index);
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct PipelineId(pub Index);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
    Uniform,
    Instance,
}

pub struct BufferDescriptor<'a> {
    pub label: &'a str,
    pub usage: BufferUsage,
    pub contents: &'a [u8],
}

pub struct TextureDescriptor<'a> {
    pub label: &'a str,
    pub bitmap: &'a Bitmap,
}

/// Sink for the device objects a scene needs. A windowed renderer implements it
/// over its GPU device; `HeadlessDevice` keeps everything in memory.
pub trait RenderDevice {
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> Result<BufferId, DeviceError>;
    fn write_buffer(&mut self, buffer: BufferId, offset: usize, data: &[u8]) -> Result<(), DeviceError>;
    fn destroy_buffer(&mut self, buffer: BufferId);

    fn create_texture(&mut self, desc: &TextureDescriptor) -> Result<TextureId, DeviceError>;
    fn destroy_texture(&mut self, texture: TextureId);

    fn create_sampler(&mut self, sampler: &Sampler) -> Result<SamplerId, DeviceError>;
    fn destroy_sampler(&mut self, sampler: SamplerId);

    fn create_pipeline(&mut self, desc: &PipelineDescriptor) -> Result<PipelineId, DeviceError>;
    fn destroy_pipeline(&mut self, pipeline: PipelineId);
}

#[derive(Debug)]
pub struct HeadlessBuffer {
    pub label: String,
    pub usage: BufferUsage,
    pub data: Vec<u8>,
    /// Number of `write_buffer` calls since creation.
    pub writes: usize,
}

#[derive(Debug)]
pub struct HeadlessTexture {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub bytes: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveCounts {
    pub buffers: usize,
    pub textures: usize,
    pub samplers: usize,
    pub pipelines: usize,
}

/// In-memory device. Objects live in generational arenas so a destroyed id never
/// aliases a newer object.
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    pub buffers: Arena<HeadlessBuffer>,
    pub textures: Arena<HeadlessTexture>,
    pub samplers: Arena<Sampler>,
    pub pipelines: Arena<PipelineDescriptor>,
    /// Total bytes of buffers and textures the device accepts before failing.
    pub memory_limit: Option<usize>,
    allocated: usize,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_memory_limit(bytes: usize) -> Self {
        Self { memory_limit: Some(bytes), ..Self::default() }
    }

    pub fn live_counts(&self) -> LiveCounts {
        LiveCounts {
            buffers: self.buffers.len(),
            textures: self.textures.len(),
            samplers: self.samplers.len(),
            pipelines: self.pipelines.len(),
        }
    }

    pub fn allocated_bytes(&self) -> usize {
        self.allocated
    }

    pub fn buffer(&self, id: BufferId) -> Option<&HeadlessBuffer> {
        self.buffers.get(id.0)
    }

    pub fn pipeline(&self, id: PipelineId) -> Option<&PipelineDescriptor> {
        self.pipelines.get(id.0)
    }

    fn reserve(&mut self, bytes: usize) -> Result<(), DeviceError> {
        if let Some(limit) = self.memory_limit {
            if self.allocated + bytes > limit {
                return Err(DeviceError::OutOfMemory);
            }
        }
        self.allocated += bytes;
        Ok(())
    }
}

impl RenderDevice for HeadlessDevice {
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> Result<BufferId, DeviceError> {
        self.reserve(desc.contents.len())?;
        let idx = self.buffers.insert(HeadlessBuffer {
            label: desc.label.to_string(),
            usage: desc.usage,
            data: desc.contents.to_vec(),
            writes: 0,
        });
        Ok(BufferId(idx))
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: usize, data: &[u8]) -> Result<(), DeviceError> {
        let buffer = self.buffers.get_mut(buffer.0).ok_or(DeviceError::StaleHandle("buffer"))?;
        let size = buffer.data.len();
        let end = offset + data.len();
        if end > size {
            return Err(DeviceError::WriteOutOfBounds { offset, len: data.len(), size });
        }
        buffer.data[offset..end].copy_from_slice(data);
        buffer.writes += 1;
        trace!("wrote {} bytes to {:?}", data.len(), buffer.label);
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if let Some(buffer) = self.buffers.remove(buffer.0) {
            self.allocated -= buffer.data.len();
        }
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> Result<TextureId, DeviceError> {
        let bitmap = desc.bitmap;
        if bitmap.width == 0 || bitmap.height == 0 {
            return Err(DeviceError::TextureCreationFailed {
                label: desc.label.to_string(),
                reason: format!("empty extent {}x{}", bitmap.width, bitmap.height),
            });
        }
        self.reserve(bitmap.rgba.len())?;
        let idx = self.textures.insert(HeadlessTexture {
            label: desc.label.to_string(),
            width: bitmap.width,
            height: bitmap.height,
            bytes: bitmap.rgba.len(),
        });
        Ok(TextureId(idx))
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if let Some(texture) = self.textures.remove(texture.0) {
            self.allocated -= texture.bytes;
        }
    }

    fn create_sampler(&mut self, sampler: &Sampler) -> Result<SamplerId, DeviceError> {
        Ok(SamplerId(self.samplers.insert(*sampler)))
    }

    fn destroy_sampler(&mut self, sampler: SamplerId) {
        self.samplers.remove(sampler.0);
    }

    fn create_pipeline(&mut self, desc: &PipelineDescriptor) -> Result<PipelineId, DeviceError> {
        Ok(PipelineId(self.pipelines.insert(desc.clone())))
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineId) {
        self.pipelines.remove(pipeline.0);
    }
}
