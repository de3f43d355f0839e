//! The two-level mesh hierarchy shared by all stages of the multiscale pipeline.
use crate::error::MsFemError;
use crate::mesh::refinement::{refine_uniformly_repeat, RefinedMesh};
use crate::mesh::{BoundaryFace, TriangleMesh2d};
use crate::problem::{BoundaryKind, ModelProblem};
use log::debug;
use nalgebra::{center, DVector};
use rustc_hash::FxHashMap;

/// Classification of a coarse grid node.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Interior,
    Dirichlet,
    Neumann,
}

/// Owns the coarse (macro) mesh, the fine (micro) mesh obtained from it by uniform refinement, and
/// the number of enrichment layers of every coarse cell.
///
/// The vertices of the coarse mesh keep their indices in the fine mesh. A coarse node is a Dirichlet
/// node if it touches a fine Dirichlet face.
#[derive(Debug, Clone)]
pub struct MacroMicroGridSpecifier {
    coarse_mesh: TriangleMesh2d,
    fine: RefinedMesh,
    children: Vec<Vec<usize>>,
    level_difference: usize,
    layers: Vec<usize>,
    coarse_vertex_cells: Vec<Vec<usize>>,
    coarse_node_kinds: Vec<NodeKind>,
    fine_boundary_faces: Vec<(BoundaryFace, BoundaryKind)>,
    fine_face_kinds: FxHashMap<[usize; 2], BoundaryKind>,
}

impl MacroMicroGridSpecifier {
    /// Refines `coarse_mesh` `level_difference` times and classifies the boundary with the problem's
    /// boundary classifier, evaluated at fine face midpoints.
    pub fn new(
        coarse_mesh: TriangleMesh2d,
        level_difference: usize,
        layers: usize,
        problem: &ModelProblem,
    ) -> Result<Self, MsFemError> {
        if coarse_mesh.num_cells() == 0 {
            return Err(MsFemError::config("the coarse mesh has no cells"));
        }
        if let Some(cell) = (0..coarse_mesh.num_cells()).find(|&cell| {
            coarse_mesh
                .element(cell)
                .map(|element| element.signed_area() <= 0.0)
                .unwrap_or(true)
        }) {
            return Err(MsFemError::config(format!(
                "coarse cell {} is degenerate or clockwise oriented",
                cell
            )));
        }

        let fine = refine_uniformly_repeat(&coarse_mesh, level_difference);
        let children = fine.children(coarse_mesh.num_cells());

        let fine_boundary_faces: Vec<_> = fine
            .mesh
            .find_boundary_faces()
            .into_iter()
            .map(|face| {
                let [a, b] = fine.mesh.face_points(&face);
                (face, problem.boundary_kind(&center(&a, &b)))
            })
            .collect();
        let fine_face_kinds: FxHashMap<_, _> = fine_boundary_faces
            .iter()
            .map(|(face, kind)| (face.sorted_vertices(), *kind))
            .collect();

        let num_coarse_vertices = coarse_mesh.num_vertices();
        let mut coarse_node_kinds = vec![NodeKind::Interior; num_coarse_vertices];
        for (face, kind) in &fine_boundary_faces {
            for &v in face.vertices.iter().filter(|&&v| v < num_coarse_vertices) {
                match kind {
                    BoundaryKind::Dirichlet => coarse_node_kinds[v] = NodeKind::Dirichlet,
                    BoundaryKind::Neumann if coarse_node_kinds[v] == NodeKind::Interior => {
                        coarse_node_kinds[v] = NodeKind::Neumann
                    }
                    BoundaryKind::Neumann => {}
                }
            }
        }

        debug!(
            "Grid hierarchy: {} coarse cells, {} fine cells, {} fine boundary faces",
            coarse_mesh.num_cells(),
            fine.mesh.num_cells(),
            fine_boundary_faces.len()
        );

        Ok(Self {
            coarse_vertex_cells: coarse_mesh.vertex_cells(),
            layers: vec![layers; coarse_mesh.num_cells()],
            coarse_mesh,
            fine,
            children,
            level_difference,
            coarse_node_kinds,
            fine_boundary_faces,
            fine_face_kinds,
        })
    }

    pub fn coarse_mesh(&self) -> &TriangleMesh2d {
        &self.coarse_mesh
    }

    pub fn fine_mesh(&self) -> &TriangleMesh2d {
        &self.fine.mesh
    }

    /// For every fine cell, the coarse cell containing it.
    pub fn parents(&self) -> &[usize] {
        &self.fine.parents
    }

    /// The fine cells contained in a coarse cell, in increasing order.
    pub fn children(&self, coarse_cell: usize) -> &[usize] {
        &self.children[coarse_cell]
    }

    pub fn num_coarse_cells(&self) -> usize {
        self.coarse_mesh.num_cells()
    }

    pub fn level_difference(&self) -> usize {
        self.level_difference
    }

    pub fn layers(&self, coarse_cell: usize) -> usize {
        self.layers[coarse_cell]
    }

    /// Changes the number of enrichment layers of a coarse cell.
    ///
    /// Local grids built before the change are not updated.
    pub fn set_layers(&mut self, coarse_cell: usize, layers: usize) -> Result<(), MsFemError> {
        let slot = self.layers.get_mut(coarse_cell).ok_or_else(|| {
            MsFemError::config(format!("coarse cell {} does not exist", coarse_cell))
        })?;
        *slot = layers;
        Ok(())
    }

    /// Coarse cells sharing at least one vertex with the given cell, excluding the cell itself.
    pub fn coarse_neighbors(&self, coarse_cell: usize) -> Vec<usize> {
        let mut neighbors: Vec<usize> = self.coarse_mesh.connectivity()[coarse_cell]
            .iter()
            .flat_map(|&v| self.coarse_vertex_cells[v].iter().copied())
            .filter(|&cell| cell != coarse_cell)
            .collect();
        neighbors.sort_unstable();
        neighbors.dedup();
        neighbors
    }

    pub fn coarse_node_kind(&self, node: usize) -> NodeKind {
        self.coarse_node_kinds[node]
    }

    /// Sorted list of coarse nodes on the domain boundary.
    pub fn coarse_boundary_nodes(&self) -> Vec<usize> {
        self.nodes_where(|kind| kind != NodeKind::Interior)
    }

    /// Sorted list of coarse nodes with prescribed Dirichlet values.
    pub fn coarse_dirichlet_nodes(&self) -> Vec<usize> {
        self.nodes_where(|kind| kind == NodeKind::Dirichlet)
    }

    fn nodes_where(&self, predicate: impl Fn(NodeKind) -> bool) -> Vec<usize> {
        self.coarse_node_kinds
            .iter()
            .enumerate()
            .filter(|(_, &kind)| predicate(kind))
            .map(|(node, _)| node)
            .collect()
    }

    /// Boundary faces of the fine mesh with their classification.
    pub fn fine_boundary_faces(&self) -> &[(BoundaryFace, BoundaryKind)] {
        &self.fine_boundary_faces
    }

    /// Classification of a fine face, given by its fine vertex indices in any order. Returns `None`
    /// for faces in the interior of the domain.
    pub fn fine_face_kind(&self, vertices: [usize; 2]) -> Option<BoundaryKind> {
        let [a, b] = vertices;
        self.fine_face_kinds.get(&[a.min(b), a.max(b)]).copied()
    }

    pub fn fine_faces_of_kind(&self, kind: BoundaryKind) -> impl '_ + Iterator<Item = &BoundaryFace> {
        self.fine_boundary_faces
            .iter()
            .filter(move |(_, face_kind)| *face_kind == kind)
            .map(|(face, _)| face)
    }

    /// Sorted list of fine vertices on Dirichlet faces.
    pub fn fine_dirichlet_nodes(&self) -> Vec<usize> {
        let mut nodes: Vec<usize> = self
            .fine_boundary_faces
            .iter()
            .filter(|(_, kind)| *kind == BoundaryKind::Dirichlet)
            .flat_map(|(face, _)| face.vertices)
            .collect();
        nodes.sort_unstable();
        nodes.dedup();
        nodes
    }

    /// Nodal values of the coarse Dirichlet extension $g_H$: the Dirichlet data at coarse Dirichlet
    /// nodes and zero elsewhere.
    pub fn coarse_dirichlet_extension(&self, problem: &ModelProblem) -> DVector<f64> {
        let data = problem.dirichlet_data();
        DVector::from_iterator(
            self.coarse_mesh.num_vertices(),
            self.coarse_mesh
                .vertices()
                .iter()
                .zip(&self.coarse_node_kinds)
                .map(|(x, kind)| match kind {
                    NodeKind::Dirichlet => data.evaluate(x),
                    NodeKind::Interior | NodeKind::Neumann => 0.0,
                }),
        )
    }
}
