//! Proximity graph over the particle field
//!
//! Built once at startup. Pairs are scanned in index order and the scan stops
//! as soon as the cap is reached, so the edge list is reproducible and its
//! order is the draw order.

use crate::geometry::ParticleField;

/// A connection between two points, `source < target`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub source: usize,
    pub target: usize,
}

/// Bounded, read-only list of edges in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeSet {
    edges: Vec<Edge>,
    cap: usize,
}

impl EdgeSet {
    /// Connect every pair closer than `distance`, stopping at `cap` edges.
    ///
    /// Coincident pairs and non-finite distances are skipped rather than
    /// connected.
    pub fn build(field: &ParticleField, distance: f32, cap: usize) -> Self {
        let threshold_sq = distance * distance;
        let points = field.points();
        let mut edges = Vec::with_capacity(cap.min(points.len() * 4));

        'scan: for (i, a) in points.iter().enumerate() {
            if edges.len() >= cap {
                break;
            }
            for (j, b) in points.iter().enumerate().skip(i + 1) {
                if edges.len() >= cap {
                    break 'scan;
                }

                let dx = a.position[0] - b.position[0];
                let dy = a.position[1] - b.position[1];
                let dz = a.position[2] - b.position[2];
                let dist_sq = dx * dx + dy * dy + dz * dz;

                if !dist_sq.is_finite() || dist_sq <= 0.0 {
                    continue;
                }
                if dist_sq < threshold_sq {
                    edges.push(Edge {
                        source: i,
                        target: j,
                    });
                }
            }
        }

        Self { edges, cap }
    }

    /// Number of edges
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// True if no pair was close enough
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Cap the set was built with
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Edges in insertion order
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Flattened `[source, target, ...]` pairs for a line-list index buffer
    pub fn line_indices(&self) -> Vec<u32> {
        self.edges
            .iter()
            .flat_map(|e| [e.source as u32, e.target as u32])
            .collect()
    }
}
