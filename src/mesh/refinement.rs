//! Uniform (red) refinement of triangle meshes.
//!
//! Every triangle is split into four by connecting its edge midpoints. Refinement keeps the
//! vertices of the input mesh, with their indices, at the front of the refined vertex list, and
//! records which input cell every refined cell came from.
use crate::mesh::TriangleMesh2d;
use nalgebra::center;
use rustc_hash::FxHashMap;

/// A refined mesh along with the map from its cells to the cells of the mesh it was refined from.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinedMesh {
    pub mesh: TriangleMesh2d,
    /// `parents[i]` is the index of the coarse cell that contains fine cell `i`.
    pub parents: Vec<usize>,
}

impl RefinedMesh {
    /// Fine cells grouped by their coarse parent, in increasing order.
    pub fn children(&self, num_coarse_cells: usize) -> Vec<Vec<usize>> {
        let mut children = vec![Vec::new(); num_coarse_cells];
        for (fine_cell, &parent) in self.parents.iter().enumerate() {
            children[parent].push(fine_cell);
        }
        children
    }
}

/// Apply one round of uniform refinement.
///
/// Fine cell `4 * k + l` is the `l`-th child of coarse cell `k`. Children `0..3` each keep one
/// corner of the parent, child `3` is the interior triangle of edge midpoints.
pub fn refine_uniformly(mesh: &TriangleMesh2d) -> RefinedMesh {
    let mut vertices = mesh.vertices().to_vec();
    let mut midpoint_indices = FxHashMap::default();
    let mut midpoint = |a: usize, b: usize| -> usize {
        let key = (a.min(b), a.max(b));
        *midpoint_indices.entry(key).or_insert_with(|| {
            vertices.push(center(&mesh.vertices()[a], &mesh.vertices()[b]));
            vertices.len() - 1
        })
    };

    let mut connectivity = Vec::with_capacity(4 * mesh.num_cells());
    let mut parents = Vec::with_capacity(4 * mesh.num_cells());
    for (cell_index, &[a, b, c]) in mesh.connectivity().iter().enumerate() {
        let ab = midpoint(a, b);
        let bc = midpoint(b, c);
        let ca = midpoint(c, a);
        connectivity.push([a, ab, ca]);
        connectivity.push([ab, b, bc]);
        connectivity.push([ca, bc, c]);
        connectivity.push([ab, bc, ca]);
        parents.extend([cell_index; 4]);
    }

    RefinedMesh {
        mesh: TriangleMesh2d::from_vertices_and_connectivity(vertices, connectivity),
        parents,
    }
}

/// Repeatedly applies uniform refinement, composing the parent maps so that they refer to the
/// cells of the input mesh.
pub fn refine_uniformly_repeat(mesh: &TriangleMesh2d, repeat_times: usize) -> RefinedMesh {
    let mut refined = RefinedMesh {
        mesh: mesh.clone(),
        parents: (0..mesh.num_cells()).collect(),
    };
    for _ in 0..repeat_times {
        let next = refine_uniformly(&refined.mesh);
        let parents = next
            .parents
            .iter()
            .map(|&intermediate| refined.parents[intermediate])
            .collect();
        refined = RefinedMesh {
            mesh: next.mesh,
            parents,
        };
    }
    refined
}
