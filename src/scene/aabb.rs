use glam::{Mat4, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: impl Into<Vec3>, max: impl Into<Vec3>) -> Self {
        Self { min: min.into(), max: max.into() }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) / 2.0
    }

    /// Length of the diagonal, used to frame the box with a camera.
    pub fn radius(&self) -> f32 {
        (self.max - self.min).length()
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb { min: self.min.min(other.min), max: self.max.max(other.max) }
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// Box around the 8 transformed corners.
    pub fn transformed(&self, transform: &Mat4) -> Aabb {
        let mut corners = self.corners().into_iter().map(|c| transform.transform_point3(c));
        // corners() always yields 8 points
        let first = corners.next().unwrap_or(Vec3::ZERO);
        corners.fold(Aabb { min: first, max: first }, |acc, p| Aabb { min: acc.min.min(p), max: acc.max.max(p) })
    }
}

pub fn calculate_aabb(positions: &[[f32; 3]]) -> Option<Aabb> {
    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    for position in positions {
        min = min.min(Vec3::from(*position));
        max = max.max(Vec3::from(*position));
    }
    (!positions.is_empty()).then_some(Aabb { min, max })
}

pub fn fold_aabb<'a>(aabbs: impl IntoIterator<Item = &'a Aabb>) -> Option<Aabb> {
    aabbs.into_iter().fold(None, |acc: Option<Aabb>, aabb| match acc {
        Some(acc) => Some(acc.union(aabb)),
        None => Some(*aabb),
    })
}
