pub mod aabb;
pub mod scene_tree;
pub mod animator;
pub mod camera;
