use serde::Deserialize;

use crate::error::FormatError;
use crate::scene::animator::TimeWrapMode;

/// What to do with accumulated face normals when a primitive has no NORMAL attribute.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NormalGeneration {
    /// Unit length per vertex.
    #[default]
    Normalized,
    /// Raw sum of the adjacent faces' cross products, magnitude is area weighted.
    Accumulated,
}

fn default_autoplay() -> Option<usize> { Some(0) }
fn default_speed() -> f32 { 1.0 }

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct LoaderConfig {
    /// Overrides the asset's default scene.
    pub scene: Option<usize>,
    pub normals: NormalGeneration,
    pub time_wrap: TimeWrapMode,
    /// Animation clip started right after a load, if the asset has it.
    #[serde(default = "default_autoplay")]
    pub autoplay: Option<usize>,
    #[serde(default = "default_speed")]
    pub speed: f32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            scene: None,
            normals: NormalGeneration::default(),
            time_wrap: TimeWrapMode::default(),
            autoplay: default_autoplay(),
            speed: default_speed(),
        }
    }
}

impl LoaderConfig {
    pub fn from_json_str(json: &str) -> Result<Self, FormatError> {
        Ok(serde_json::from_str(json)?)
    }
}
