use std::collections::BTreeMap;

use glam::{Quat, Vec3};
use log::warn;
use serde::Deserialize;

use crate::error::{FormatError, FormatResult};
use crate::gltf::accessor::AccessorReader;
use crate::gltf::schema::{Interpolation, TargetPath};

use super::scene_tree::Scene;

/// What happens when animation time leaves [0, duration)
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeWrapMode {
    Clamp,
    #[default]
    Repeat,
    PingPong,
}

impl TimeWrapMode {
    pub fn wrap(self, time: f32, duration: f32) -> f32 {
        if duration <= f32::EPSILON {
            return 0.0;
        }
        match self {
            TimeWrapMode::Clamp => time.clamp(0.0, duration),
            TimeWrapMode::Repeat => {
                let t = time.rem_euclid(duration);
                // rem_euclid can round up to `duration` for tiny negative inputs
                if t >= duration { 0.0 } else { t }
            }
            TimeWrapMode::PingPong => {
                let period = duration * 2.0;
                let t2 = time.rem_euclid(period);
                if t2 <= duration { t2 } else { period - t2 }
            }
        }
    }
}

/// Values that can be interpolated between keyframes.
pub trait Keyframe: Copy {
    fn linear(a: Self, b: Self, t: f32) -> Self;
    fn scaled(self, factor: f32) -> Self;
    fn hermite(v0: Self, m0: Self, v1: Self, m1: Self, s: f32) -> Self;
}

fn hermite_weights(s: f32) -> [f32; 4] {
    let s2 = s * s;
    let s3 = s2 * s;
    [2.0 * s3 - 3.0 * s2 + 1.0, s3 - 2.0 * s2 + s, -2.0 * s3 + 3.0 * s2, s3 - s2]
}

impl Keyframe for Vec3 {
    fn linear(a: Self, b: Self, t: f32) -> Self {
        a.lerp(b, t)
    }

    fn scaled(self, factor: f32) -> Self {
        self * factor
    }

    fn hermite(v0: Self, m0: Self, v1: Self, m1: Self, s: f32) -> Self {
        let [h00, h10, h01, h11] = hermite_weights(s);
        v0 * h00 + m0 * h10 + v1 * h01 + m1 * h11
    }
}

impl Keyframe for Quat {
    /// Shortest-arc slerp.
    fn linear(a: Self, b: Self, t: f32) -> Self {
        a.slerp(b, t)
    }

    fn scaled(self, factor: f32) -> Self {
        self * factor
    }

    fn hermite(v0: Self, m0: Self, v1: Self, m1: Self, s: f32) -> Self {
        let [h00, h10, h01, h11] = hermite_weights(s);
        (v0 * h00 + m0 * h10 + v1 * h01 + m1 * h11).normalize()
    }
}

/// Keyframes of one animated property. CUBICSPLINE channels store
/// `[in_tangent, value, out_tangent]` per keyframe.
#[derive(Debug, Clone)]
pub struct Channel<T> {
    times: Box<[f32]>,
    values: Box<[T]>,
    interpolation: Interpolation,
}

impl<T: Keyframe> Channel<T> {
    pub fn new(times: Vec<f32>, values: Vec<T>, interpolation: Interpolation) -> Result<Self, String> {
        if times.is_empty() {
            return Err("no keyframes".to_string());
        }
        if let Some(t) = times.iter().find(|t| !t.is_finite()) {
            return Err(format!("non-finite input time {}", t));
        }
        if let Some(w) = times.windows(2).find(|w| w[0] >= w[1]) {
            return Err(format!("input times not strictly increasing ({} then {})", w[0], w[1]));
        }
        let expected = match interpolation {
            Interpolation::CubicSpline => times.len() * 3,
            _ => times.len(),
        };
        if values.len() != expected {
            return Err(format!("{} output values for {} keyframes, expected {}", values.len(), times.len(), expected));
        }
        Ok(Self { times: times.into(), values: values.into(), interpolation })
    }

    pub fn times(&self) -> &[f32] {
        &self.times
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    pub fn end_time(&self) -> f32 {
        self.times[self.times.len() - 1]
    }

    fn value(&self, i: usize) -> T {
        match self.interpolation {
            Interpolation::CubicSpline => self.values[i * 3 + 1],
            _ => self.values[i],
        }
    }

    /// Samples at `t`. Times before the first or after the last keyframe clamp;
    /// a time equal to a keyframe returns that keyframe's stored value. NaN
    /// samples the first keyframe.
    pub fn sample(&self, t: f32) -> T {
        let n = self.times.len();
        if t.is_nan() || t <= self.times[0] {
            return self.value(0);
        }
        if t >= self.times[n - 1] {
            return self.value(n - 1);
        }
        // times[i] <= t < times[i + 1]
        let i = self.times.partition_point(|&x| x <= t) - 1;
        let (t0, t1) = (self.times[i], self.times[i + 1]);
        if t == t0 {
            return self.value(i);
        }
        match self.interpolation {
            Interpolation::Step => self.value(i),
            Interpolation::Linear => T::linear(self.value(i), self.value(i + 1), (t - t0) / (t1 - t0)),
            Interpolation::CubicSpline => {
                let dt = t1 - t0;
                let out_tangent = self.values[i * 3 + 2].scaled(dt);
                let in_tangent = self.values[(i + 1) * 3].scaled(dt);
                T::hermite(self.value(i), out_tangent, self.value(i + 1), in_tangent, (t - t0) / dt)
            }
        }
    }
}

/// Every animated property of one node.
#[derive(Debug, Clone, Default)]
pub struct Track {
    /// Index of the target node in the asset.
    pub node: usize,
    pub translation: Option<Channel<Vec3>>,
    pub rotation: Option<Channel<Quat>>,
    pub scale: Option<Channel<Vec3>>,
}

#[derive(Debug, Clone)]
pub struct AnimationClip {
    pub name: Option<String>,
    /// Latest keyframe time over all samplers.
    pub duration: f32,
    pub tracks: Vec<Track>,
}

fn keyframe_error(sampler: usize) -> impl Fn(String) -> FormatError {
    move |reason| FormatError::InvalidKeyframes { sampler, reason }
}

impl AnimationClip {
    pub fn from_schema(reader: &AccessorReader, animation_idx: usize) -> FormatResult<Self> {
        let animation = &reader.document.animations[animation_idx];

        let mut inputs = vec![];
        for (sampler_idx, sampler) in animation.samplers.iter().enumerate() {
            let found = reader.arity(sampler.input);
            if found != 1 {
                return Err(FormatError::InvalidKeyframes {
                    sampler: sampler_idx,
                    reason: format!("input accessor has {} components, expected 1", found),
                });
            }
            inputs.push(reader.read_f32(sampler.input)?);
        }
        let duration = inputs
            .iter()
            .filter_map(|times| times.last().copied())
            .fold(0.0f32, f32::max);

        let mut tracks: BTreeMap<usize, Track> = BTreeMap::new();
        for channel in &animation.channels {
            let Some(node) = channel.target.node else { continue };
            let sampler = &animation.samplers[channel.sampler];
            let times = inputs[channel.sampler].clone();
            let invalid = keyframe_error(channel.sampler);
            let track = tracks.entry(node).or_insert_with(|| Track { node, ..Default::default() });
            match channel.target.path {
                TargetPath::Translation => {
                    let values = reader.read_array::<3>(sampler.output, "translation")?.into_iter().map(Vec3::from).collect();
                    track.translation = Some(Channel::new(times, values, sampler.interpolation).map_err(invalid)?);
                }
                TargetPath::Scale => {
                    let values = reader.read_array::<3>(sampler.output, "scale")?.into_iter().map(Vec3::from).collect();
                    track.scale = Some(Channel::new(times, values, sampler.interpolation).map_err(invalid)?);
                }
                TargetPath::Rotation => {
                    let values = reader.read_array::<4>(sampler.output, "rotation")?.into_iter().map(Quat::from_array).collect();
                    track.rotation = Some(Channel::new(times, values, sampler.interpolation).map_err(invalid)?);
                }
                TargetPath::Weights => {
                    warn!("animation {}: skipping morph target weights channel on node {}", animation_idx, node);
                }
            }
        }

        Ok(Self {
            name: animation.name.clone(),
            duration,
            tracks: tracks.into_values().filter(|t| t.translation.is_some() || t.rotation.is_some() || t.scale.is_some()).collect(),
        })
    }
}

/// Plays one clip on an instantiated scene.
#[derive(Debug, Clone)]
pub struct Animator {
    pub clip: usize,
    /// Unwrapped clock in seconds.
    pub time: f32,
    pub speed: f32,
    pub time_wrap: TimeWrapMode,
    pub playing: bool,
}

impl Animator {
    pub fn new(clip: usize, time_wrap: TimeWrapMode, speed: f32) -> Self {
        Self { clip, time: 0.0, speed, time_wrap, playing: true }
    }

    pub fn local_time(&self, clip: &AnimationClip) -> f32 {
        self.time_wrap.wrap(self.time, clip.duration)
    }

    /// Writes the clip's sampled TRS into its target nodes. Channels targeting
    /// nodes outside the scene are ignored.
    pub fn apply(&self, clip: &AnimationClip, scene: &mut Scene) {
        let t = self.local_time(clip);
        for track in &clip.tracks {
            let Some(node) = scene.find_node(track.node).and_then(|id| scene.node_mut(id)) else { continue };
            if let Some(channel) = &track.translation {
                node.set_translation(channel.sample(t));
            }
            if let Some(channel) = &track.rotation {
                node.set_rotation(channel.sample(t));
            }
            if let Some(channel) = &track.scale {
                node.set_scale(channel.sample(t));
            }
        }
    }

    /// Advances the clock, applies the clip and propagates transforms.
    /// Returns the number of nodes whose global transform was recomputed.
    pub fn tick(&mut self, dt: f32, clip: &AnimationClip, scene: &mut Scene) -> usize {
        if self.playing {
            self.time += dt * self.speed;
        }
        self.apply(clip, scene);
        scene.update_transforms()
    }
}
