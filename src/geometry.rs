//! Point placement on the sphere
//!
//! Points follow a golden-angle spiral: evenly spaced in height, rotated by
//! π(3 − √5) per step. Coverage is near-uniform without clustering at the
//! poles. Each point also carries a random shimmer phase that has no effect on
//! placement.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Angle between consecutive points of the spiral
pub fn golden_angle() -> f32 {
    std::f32::consts::PI * (3.0 - 5.0_f32.sqrt())
}

/// A point of the field. Its index in the field is its identity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    /// Position on the sphere surface
    pub position: [f32; 3],
    /// Shimmer phase offset in [0, 2π)
    pub phase: f32,
}

/// Fixed-length, immutable set of points on a sphere
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleField {
    points: Vec<Point>,
    radius: f32,
}

impl ParticleField {
    /// Place `count` points on a sphere of `radius`, with phases drawn from
    /// a generator seeded by `seed`.
    pub fn generate(count: usize, radius: f32, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let golden = golden_angle();
        let steps = count.saturating_sub(1).max(1) as f32;

        let points = (0..count)
            .map(|i| {
                let y = 1.0 - (i as f32 / steps) * 2.0;
                let radius_at_y = (1.0 - y * y).max(0.0).sqrt();
                let theta = golden * i as f32;

                Point {
                    position: [
                        theta.cos() * radius_at_y * radius,
                        y * radius,
                        theta.sin() * radius_at_y * radius,
                    ],
                    phase: rng.gen_range(0.0..std::f32::consts::TAU),
                }
            })
            .collect();

        Self { points, radius }
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if the field holds no points
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Sphere radius the field was generated with
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// All points in index order
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Point at `index`
    pub fn get(&self, index: usize) -> Option<&Point> {
        self.points.get(index)
    }
}

/// Seed for runs that did not ask for a reproducible phase field
pub fn entropy_seed() -> u64 {
    #[cfg(target_arch = "wasm32")]
    {
        (js_sys::Math::random() * u64::MAX as f64) as u64
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x5eed)
    }
}
