//! Glow shell mesh
//!
//! A subdivided icosahedron slightly larger than the particle sphere. The
//! WebGPU strategy draws its far half as the background glow.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};

use crate::shimmer::GLOW_EXTENT;

/// Subdivision level of the shell (320 triangles)
pub const SHELL_SUBDIVISIONS: u32 = 2;

/// Shell vertex; layout matches the `vs_shell` inputs
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ShellVertex {
    pub position: [f32; 3],
    /// Outward unit normal
    pub normal: [f32; 3],
}

/// Triangle mesh of the glow shell
#[derive(Debug, Clone)]
pub struct ShellMesh {
    vertices: Vec<ShellVertex>,
    indices: Vec<u32>,
}

impl ShellMesh {
    /// Shell around a particle sphere of `sphere_radius`
    pub fn for_sphere(sphere_radius: f32) -> Self {
        Self::new(sphere_radius * GLOW_EXTENT, SHELL_SUBDIVISIONS)
    }

    /// Icosphere of `radius` after `subdivisions` rounds of 1-to-4 splitting
    pub fn new(radius: f32, subdivisions: u32) -> Self {
        let mut builder = Builder::icosahedron();
        for _ in 0..subdivisions {
            builder.subdivide();
        }

        let vertices = builder
            .directions
            .iter()
            .map(|&n| ShellVertex {
                position: [n[0] * radius, n[1] * radius, n[2] * radius],
                normal: n,
            })
            .collect();
        let indices = builder.faces.iter().flatten().copied().collect();

        Self { vertices, indices }
    }

    pub fn vertices(&self) -> &[ShellVertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }
}

/// Unit-sphere directions and faces under construction
struct Builder {
    directions: Vec<[f32; 3]>,
    faces: Vec<[u32; 3]>,
}

impl Builder {
    fn icosahedron() -> Self {
        let phi = (1.0 + 5.0_f32.sqrt()) / 2.0;
        let directions = [
            [-1.0, phi, 0.0],
            [1.0, phi, 0.0],
            [-1.0, -phi, 0.0],
            [1.0, -phi, 0.0],
            [0.0, -1.0, phi],
            [0.0, 1.0, phi],
            [0.0, -1.0, -phi],
            [0.0, 1.0, -phi],
            [phi, 0.0, -1.0],
            [phi, 0.0, 1.0],
            [-phi, 0.0, -1.0],
            [-phi, 0.0, 1.0],
        ]
        .into_iter()
        .map(unit)
        .collect();

        let faces = vec![
            [0, 11, 5],
            [0, 5, 1],
            [0, 1, 7],
            [0, 7, 10],
            [0, 10, 11],
            [1, 5, 9],
            [5, 11, 4],
            [11, 10, 2],
            [10, 7, 6],
            [7, 1, 8],
            [3, 9, 4],
            [3, 4, 2],
            [3, 2, 6],
            [3, 6, 8],
            [3, 8, 9],
            [4, 9, 5],
            [2, 4, 11],
            [6, 2, 10],
            [8, 6, 7],
            [9, 8, 1],
        ];

        Self { directions, faces }
    }

    fn subdivide(&mut self) {
        let mut midpoints: HashMap<(u32, u32), u32> = HashMap::new();
        let mut faces = Vec::with_capacity(self.faces.len() * 4);

        for [a, b, c] in std::mem::take(&mut self.faces) {
            let ab = self.midpoint(a, b, &mut midpoints);
            let bc = self.midpoint(b, c, &mut midpoints);
            let ca = self.midpoint(c, a, &mut midpoints);

            faces.extend([[a, ab, ca], [b, bc, ab], [c, ca, bc], [ab, bc, ca]]);
        }

        self.faces = faces;
    }

    /// Index of the edge midpoint, shared by both faces on the edge
    fn midpoint(&mut self, a: u32, b: u32, cache: &mut HashMap<(u32, u32), u32>) -> u32 {
        let key = (a.min(b), a.max(b));
        if let Some(&index) = cache.get(&key) {
            return index;
        }

        let (p, q) = (self.directions[a as usize], self.directions[b as usize]);
        let index = self.directions.len() as u32;
        self.directions
            .push(unit([p[0] + q[0], p[1] + q[1], p[2] + q[2]]));
        cache.insert(key, index);
        index
    }
}

fn unit(v: [f32; 3]) -> [f32; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len > 1e-10 {
        [v[0] / len, v[1] / len, v[2] / len]
    } else {
        [0.0, 0.0, 1.0]
    }
}
