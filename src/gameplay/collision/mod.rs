use crate::config::CollisionProfileConfig;
use bevy::math::{Mat4, Vec3};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

const TETRAHEDRON_VERTICES: [Vec3; 4] = [
    Vec3::new(0.0, 0.0, -1.0),
    Vec3::new(0.0, 0.9428, 0.3333),
    Vec3::new(-0.8165, -0.4714, 0.3333),
    Vec3::new(0.8165, -0.4714, 0.3333),
];
const TETRAHEDRON_FACES: [[usize; 3]; 4] = [[0, 1, 2], [3, 2, 1], [1, 0, 3], [0, 2, 3]];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeTest {
    Sphere,
    Cube,
}

impl ShapeTest {
    pub fn contains(self, point: Vec3, leeway: f32) -> bool {
        match self {
            Self::Sphere => point.dot(point) < 1.0 + leeway,
            Self::Cube => {
                let bound = 1.0 + leeway;
                point
                    .to_array()
                    .iter()
                    .all(|value| *value >= -bound && *value <= bound)
            }
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Sphere => "sphere",
            Self::Cube => "cube",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CollisionProfile {
    pub id: String,
    pub test: ShapeTest,
    pub points: Arc<[Vec3]>,
    pub leeway: f32,
}

impl CollisionProfile {
    pub fn from_config(config: &CollisionProfileConfig) -> Self {
        let points: Vec<Vec3> = match config.shape {
            ShapeTest::Sphere => subdivision_sphere_points(config.subdivisions),
            ShapeTest::Cube => cube_corner_points(),
        };

        Self {
            id: config.id.clone(),
            test: config.shape,
            points: points.into(),
            leeway: config.leeway,
        }
    }

    pub fn body(&self, world: Mat4) -> RigidBody {
        RigidBody::new(world, Arc::clone(&self.points))
    }
}

#[derive(Debug, Clone)]
pub struct RigidBody {
    world: Mat4,
    inverse: OnceLock<Mat4>,
    sample_shape: Arc<[Vec3]>,
}

impl RigidBody {
    /// # Panics
    /// Panics when `world` contains a non-finite entry.
    pub fn new(world: Mat4, sample_shape: Arc<[Vec3]>) -> Self {
        assert_finite(&world, "rigid body world transform");
        Self {
            world,
            inverse: OnceLock::new(),
            sample_shape,
        }
    }

    pub fn world(&self) -> Mat4 {
        self.world
    }

    pub fn set_world(&mut self, world: Mat4) {
        assert_finite(&world, "rigid body world transform");
        self.world = world;
        self.inverse = OnceLock::new();
    }

    pub fn inverse(&self) -> Mat4 {
        *self.inverse.get_or_init(|| {
            let inverse = self.world.inverse();
            assert_finite(&inverse, "rigid body inverse transform");
            inverse
        })
    }

    pub fn sample_points(&self) -> &[Vec3] {
        &self.sample_shape
    }

    pub fn contains_sample_of(&self, other: &RigidBody, profile: &CollisionProfile) -> bool {
        let other_to_local = self.inverse() * other.world;
        other.sample_points().iter().any(|point| {
            profile
                .test
                .contains(other_to_local.transform_point3(*point), profile.leeway)
        })
    }
}

pub fn intersects(a: &RigidBody, b: &RigidBody, profile: &CollisionProfile) -> bool {
    if std::ptr::eq(a, b) {
        return false;
    }
    a.contains_sample_of(b, profile)
}

pub fn subdivision_sphere_points(subdivisions: u32) -> Vec<Vec3> {
    let mut points: Vec<Vec3> = TETRAHEDRON_VERTICES
        .iter()
        .map(|vertex| vertex.normalize())
        .collect();
    let mut triangles: Vec<[usize; 3]> = TETRAHEDRON_FACES.to_vec();

    for _ in 0..subdivisions {
        let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
        let mut next = Vec::with_capacity(triangles.len() * 4);
        for [a, b, c] in triangles {
            let ab = edge_midpoint(&mut points, &mut midpoints, a, b);
            let ac = edge_midpoint(&mut points, &mut midpoints, a, c);
            let bc = edge_midpoint(&mut points, &mut midpoints, b, c);
            next.extend([[a, ab, ac], [ab, b, bc], [ac, bc, c], [ab, bc, ac]]);
        }
        triangles = next;
    }

    points
}

fn edge_midpoint(
    points: &mut Vec<Vec3>,
    midpoints: &mut HashMap<(usize, usize), usize>,
    a: usize,
    b: usize,
) -> usize {
    let key = (a.min(b), a.max(b));
    if let Some(index) = midpoints.get(&key) {
        return *index;
    }

    points.push((points[a] + points[b]).normalize());
    let index = points.len() - 1;
    midpoints.insert(key, index);
    index
}

pub fn cube_corner_points() -> Vec<Vec3> {
    let mut corners = Vec::with_capacity(8);
    for x in [-1.0, 1.0] {
        for y in [-1.0, 1.0] {
            for z in [-1.0, 1.0] {
                corners.push(Vec3::new(x, y, z));
            }
        }
    }
    corners
}

fn assert_finite(matrix: &Mat4, what: &str) {
    assert!(matrix.is_finite(), "{what} has non-finite entries: {matrix:?}");
}
