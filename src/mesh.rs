use crate::element::Tri3d2Element;
use nalgebra::{Point2, Vector2};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod procedural;
pub mod refinement;

/// Index-based conforming triangle mesh (i.e. no hanging nodes) in two dimensions.
///
/// Cells are expected to be counter-clockwise oriented. Face `k` of a cell connects its local
/// vertices `k` and `(k + 1) % 3`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TriangleMesh2d {
    vertices: Vec<Point2<f64>>,
    connectivity: Vec<[usize; 3]>,
}

/// A face that belongs to exactly one cell of its mesh.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BoundaryFace {
    /// Vertex indices, in the orientation of the owning cell.
    pub vertices: [usize; 2],
    pub cell: usize,
    pub local_index: usize,
}

impl BoundaryFace {
    pub fn sorted_vertices(&self) -> [usize; 2] {
        let [a, b] = self.vertices;
        [a.min(b), a.max(b)]
    }
}

impl TriangleMesh2d {
    pub fn from_vertices_and_connectivity(vertices: Vec<Point2<f64>>, connectivity: Vec<[usize; 3]>) -> Self {
        Self { vertices, connectivity }
    }

    pub fn vertices(&self) -> &[Point2<f64>] {
        &self.vertices
    }

    pub fn connectivity(&self) -> &[[usize; 3]] {
        &self.connectivity
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_cells(&self) -> usize {
        self.connectivity.len()
    }

    pub fn element(&self, cell_index: usize) -> Option<Tri3d2Element> {
        let [a, b, c] = *self.connectivity.get(cell_index)?;
        Some(Tri3d2Element::from_vertices([
            self.vertices[a],
            self.vertices[b],
            self.vertices[c],
        ]))
    }

    pub fn element_iter(&self) -> impl '_ + ExactSizeIterator<Item = Tri3d2Element> {
        self.connectivity.iter().map(move |&[a, b, c]| {
            Tri3d2Element::from_vertices([self.vertices[a], self.vertices[b], self.vertices[c]])
        })
    }

    /// Returns the faces that belong to exactly one cell.
    ///
    /// The faces are ordered by their sorted vertex indices, so the result is deterministic.
    pub fn find_boundary_faces(&self) -> Vec<BoundaryFace> {
        // Count the occurrences of each face, keyed by its sorted vertex indices.
        // A BTreeMap avoids the non-determinism of HashMap's internal randomization.
        let mut face_counts = BTreeMap::new();
        for (cell, conn) in self.connectivity.iter().enumerate() {
            for local_index in 0..3 {
                let face = BoundaryFace {
                    vertices: [conn[local_index], conn[(local_index + 1) % 3]],
                    cell,
                    local_index,
                };
                face_counts
                    .entry(face.sorted_vertices())
                    .and_modify(|(_, count)| *count += 1)
                    .or_insert((face, 1));
            }
        }

        face_counts
            .into_values()
            .filter(|&(_, count)| count == 1)
            .map(|(face, _)| face)
            .collect()
    }

    /// Returns a sorted list of vertices that belong to a boundary face.
    pub fn find_boundary_vertices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .find_boundary_faces()
            .iter()
            .flat_map(|face| face.vertices)
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// For every vertex, the sorted list of cells containing it.
    pub fn vertex_cells(&self) -> Vec<Vec<usize>> {
        let mut vertex_cells = vec![Vec::new(); self.vertices.len()];
        for (cell, conn) in self.connectivity.iter().enumerate() {
            for &v in conn {
                vertex_cells[v].push(cell);
            }
        }
        vertex_cells
    }

    /// Endpoints of a face.
    pub fn face_points(&self, face: &BoundaryFace) -> [Point2<f64>; 2] {
        [self.vertices[face.vertices[0]], self.vertices[face.vertices[1]]]
    }

    /// Outward unit normal of a boundary face of a counter-clockwise cell.
    pub fn face_normal(&self, face: &BoundaryFace) -> Vector2<f64> {
        let [a, b] = self.face_points(face);
        let tangent = b - a;
        Vector2::new(tangent.y, -tangent.x).normalize()
    }

    /// Creates a new mesh from the given cells.
    ///
    /// Vertices that are not referenced by the kept cells are dropped. Surviving vertices keep their
    /// relative order. Also returns, for every vertex of the new mesh, its index in `self`.
    ///
    /// # Panics
    ///
    /// Panics if a cell index is out of bounds.
    pub fn keep_cells(&self, cell_indices: &[usize]) -> (Self, Vec<usize>) {
        let mut keep = vec![false; self.vertices.len()];
        for &cell_index in cell_indices {
            for &v in &self.connectivity[cell_index] {
                keep[v] = true;
            }
        }

        let mut new_to_old = Vec::new();
        let mut old_to_new = FxHashMap::default();
        for (old_index, _) in keep.iter().enumerate().filter(|(_, &keep)| keep) {
            old_to_new.insert(old_index, new_to_old.len());
            new_to_old.push(old_index);
        }

        let connectivity = cell_indices
            .iter()
            .map(|&cell_index| self.connectivity[cell_index].map(|v| old_to_new[&v]))
            .collect();
        let vertices = new_to_old.iter().map(|&old| self.vertices[old]).collect();

        (Self::from_vertices_and_connectivity(vertices, connectivity), new_to_old)
    }
}
