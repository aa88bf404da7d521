pub mod schema;
pub mod glb;
pub mod accessor;
pub mod primitive;
pub mod material;
pub mod asset;
pub mod loader;
