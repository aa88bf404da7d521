pub mod config;
pub mod error;
pub mod gltf;
pub mod resource_manager;
pub mod scene;
pub mod viewer;

pub use config::{LoaderConfig, NormalGeneration};
pub use error::{DeviceError, FetchError, FormatError, LoadError};
pub use gltf::asset::Asset;
pub use gltf::loader::{load, load_blocking, Fetch, FsFetcher, MemoryFetcher};
pub use resource_manager::device::{HeadlessDevice, RenderDevice};
pub use scene::scene_tree::{Scene, SceneNodeId};
pub use viewer::{LoadOutcome, LoadTicket, Viewer};
