pub mod device;
pub mod signature;
pub mod pipeline_cache;
pub mod scene_resources;
