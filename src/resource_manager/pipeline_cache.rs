use std::collections::HashMap;

use log::debug;

use crate::error::DeviceError;

use super::device::{PipelineId, RenderDevice};
use super::signature::MaterialSignature;

struct Entry {
    pipeline: PipelineId,
    ref_count: usize,
}

/// Pipelines shared across scenes, keyed by signature. Each `acquire` must be
/// paired with a `release`; the pipeline is destroyed with its last reference.
#[derive(Default)]
pub struct PipelineCache {
    entries: HashMap<MaterialSignature, Entry>,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire<D: RenderDevice>(
        &mut self,
        signature: &MaterialSignature,
        device: &mut D,
    ) -> Result<PipelineId, DeviceError> {
        if let Some(entry) = self.entries.get_mut(signature) {
            entry.ref_count += 1;
            debug!("pipeline cache hit for {:?} ({} refs)", signature, entry.ref_count);
            return Ok(entry.pipeline);
        }
        let pipeline = device.create_pipeline(&signature.pipeline_descriptor())?;
        self.entries.insert(*signature, Entry { pipeline, ref_count: 1 });
        Ok(pipeline)
    }

    pub fn release<D: RenderDevice>(&mut self, signature: &MaterialSignature, device: &mut D) {
        let Some(entry) = self.entries.get_mut(signature) else {
            debug_assert!(false, "release of an unknown pipeline signature");
            return;
        };
        entry.ref_count -= 1;
        if entry.ref_count == 0 {
            device.destroy_pipeline(entry.pipeline);
            self.entries.remove(signature);
        }
    }

    pub fn get(&self, signature: &MaterialSignature) -> Option<PipelineId> {
        self.entries.get(signature).map(|e| e.pipeline)
    }

    pub fn ref_count(&self, signature: &MaterialSignature) -> usize {
        self.entries.get(signature).map_or(0, |e| e.ref_count)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
