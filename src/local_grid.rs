//! Enriched local subgrids $U(T)$ for the corrector problems.
use crate::error::MsFemError;
use crate::grid_specifier::MacroMicroGridSpecifier;
use crate::mesh::{BoundaryFace, TriangleMesh2d};
use crate::problem::BoundaryKind;
use log::debug;
use once_cell::sync::OnceCell;
use rayon::prelude::*;
use std::collections::BTreeSet;

/// Classification of a boundary face of a local grid.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LocalBoundaryKind {
    /// The face lies inside the global domain.
    ArtificialInterior,
    Dirichlet,
    Neumann,
}

impl From<BoundaryKind> for LocalBoundaryKind {
    fn from(kind: BoundaryKind) -> Self {
        match kind {
            BoundaryKind::Dirichlet => Self::Dirichlet,
            BoundaryKind::Neumann => Self::Neumann,
        }
    }
}

/// The fine cells of a coarse cell $T$ and of `n` layers of neighboring coarse cells around it.
///
/// Local vertex and cell indices refer to [`mesh`](Self::mesh). The maps back into the fine mesh
/// are kept so that local functions can be related to global data.
#[derive(Debug, Clone)]
pub struct LocalGrid {
    coarse_cell: usize,
    layers: usize,
    coarse_cells: Vec<usize>,
    mesh: TriangleMesh2d,
    fine_vertices: Vec<usize>,
    fine_cells: Vec<usize>,
    parents: Vec<usize>,
    boundary_faces: Vec<(BoundaryFace, LocalBoundaryKind)>,
    constrained: Vec<bool>,
}

impl LocalGrid {
    /// Builds the local grid of `coarse_cell` with the layer count of the specifier.
    ///
    /// # Panics
    ///
    /// Panics if the coarse cell does not exist.
    pub fn new(specifier: &MacroMicroGridSpecifier, coarse_cell: usize) -> Self {
        let layers = specifier.layers(coarse_cell);

        // Breadth-first enrichment over the vertex neighborhood of the coarse mesh
        let mut coarse_cells = BTreeSet::from([coarse_cell]);
        let mut front = vec![coarse_cell];
        for _ in 0..layers {
            let mut next_front = Vec::new();
            for &cell in &front {
                for neighbor in specifier.coarse_neighbors(cell) {
                    if coarse_cells.insert(neighbor) {
                        next_front.push(neighbor);
                    }
                }
            }
            front = next_front;
        }
        let coarse_cells: Vec<usize> = coarse_cells.into_iter().collect();

        let mut fine_cells: Vec<usize> = coarse_cells
            .iter()
            .flat_map(|&cell| specifier.children(cell).iter().copied())
            .collect();
        fine_cells.sort_unstable();
        let parents = fine_cells
            .iter()
            .map(|&fine_cell| specifier.parents()[fine_cell])
            .collect();

        let (mesh, fine_vertices) = specifier.fine_mesh().keep_cells(&fine_cells);

        let boundary_faces: Vec<_> = mesh
            .find_boundary_faces()
            .into_iter()
            .map(|face| {
                let fine_face = face.vertices.map(|v| fine_vertices[v]);
                let kind = specifier
                    .fine_face_kind(fine_face)
                    .map(LocalBoundaryKind::from)
                    .unwrap_or(LocalBoundaryKind::ArtificialInterior);
                (face, kind)
            })
            .collect();

        // Correctors vanish on the whole local boundary, true boundary faces included
        let mut constrained = vec![false; mesh.num_vertices()];
        for (face, _) in &boundary_faces {
            for &v in &face.vertices {
                constrained[v] = true;
            }
        }

        debug!(
            "Local grid of coarse cell {}: {} coarse cells, {} fine cells, {} vertices",
            coarse_cell,
            coarse_cells.len(),
            mesh.num_cells(),
            mesh.num_vertices()
        );

        Self {
            coarse_cell,
            layers,
            coarse_cells,
            mesh,
            fine_vertices,
            fine_cells,
            parents,
            boundary_faces,
            constrained,
        }
    }

    pub fn coarse_cell(&self) -> usize {
        self.coarse_cell
    }

    pub fn layers(&self) -> usize {
        self.layers
    }

    /// The coarse cells whose fine cells make up the grid, in increasing order.
    pub fn coarse_cells(&self) -> &[usize] {
        &self.coarse_cells
    }

    pub fn mesh(&self) -> &TriangleMesh2d {
        &self.mesh
    }

    /// Whether the local cell lies in the coarse cell the grid was built for.
    pub fn covers(&self, local_cell: usize) -> bool {
        self.parents[local_cell] == self.coarse_cell
    }

    /// Local indices of the cells in the coarse cell, in increasing order.
    pub fn core_cells(&self) -> impl '_ + Iterator<Item = usize> {
        (0..self.mesh.num_cells()).filter(move |&cell| self.covers(cell))
    }

    /// The coarse cell containing a local cell.
    pub fn parent(&self, local_cell: usize) -> usize {
        self.parents[local_cell]
    }

    pub fn parents(&self) -> &[usize] {
        &self.parents
    }

    pub fn fine_cell(&self, local_cell: usize) -> usize {
        self.fine_cells[local_cell]
    }

    /// The local index of a fine cell, if the fine cell is part of the grid.
    pub fn local_cell(&self, fine_cell: usize) -> Option<usize> {
        self.fine_cells.binary_search(&fine_cell).ok()
    }

    pub fn fine_vertex(&self, local_vertex: usize) -> usize {
        self.fine_vertices[local_vertex]
    }

    pub fn fine_vertices(&self) -> &[usize] {
        &self.fine_vertices
    }

    pub fn boundary_faces(&self) -> &[(BoundaryFace, LocalBoundaryKind)] {
        &self.boundary_faces
    }

    pub fn faces_of_kind(&self, kind: LocalBoundaryKind) -> impl '_ + Iterator<Item = &BoundaryFace> {
        self.boundary_faces
            .iter()
            .filter(move |(_, face_kind)| *face_kind == kind)
            .map(|(face, _)| face)
    }

    /// Whether correctors are constrained to zero at a local vertex, i.e. whether the vertex lies on
    /// the boundary of the local grid.
    pub fn is_constrained(&self, local_vertex: usize) -> bool {
        self.constrained[local_vertex]
    }

    pub fn constrained_vertices(&self) -> Vec<usize> {
        self.constrained
            .iter()
            .enumerate()
            .filter(|(_, &constrained)| constrained)
            .map(|(v, _)| v)
            .collect()
    }
}

/// Lazily built local grids, one per coarse cell.
///
/// Each grid is built at most once. Afterwards it is shared read-only.
#[derive(Debug)]
pub struct LocalGridList<'a> {
    specifier: &'a MacroMicroGridSpecifier,
    grids: Vec<OnceCell<LocalGrid>>,
}

impl<'a> LocalGridList<'a> {
    pub fn new(specifier: &'a MacroMicroGridSpecifier) -> Self {
        Self {
            specifier,
            grids: (0..specifier.num_coarse_cells()).map(|_| OnceCell::new()).collect(),
        }
    }

    pub fn specifier(&self) -> &'a MacroMicroGridSpecifier {
        self.specifier
    }

    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }

    /// Returns the local grid of a coarse cell, building it on first access.
    ///
    /// Repeated calls return the same grid.
    pub fn get_subgrid(&self, coarse_cell: usize) -> Result<&LocalGrid, MsFemError> {
        let cell = self.grids.get(coarse_cell).ok_or_else(|| {
            MsFemError::config(format!(
                "coarse cell {} not found in a coarse mesh of {} cells",
                coarse_cell,
                self.grids.len()
            ))
        })?;
        Ok(cell.get_or_init(|| LocalGrid::new(self.specifier, coarse_cell)))
    }

    /// Whether the local grid of a coarse cell has been built already.
    pub fn is_built(&self, coarse_cell: usize) -> bool {
        self.grids
            .get(coarse_cell)
            .map_or(false, |cell| cell.get().is_some())
    }

    /// Whether a cell of the local grid of `coarse_cell` lies in `coarse_cell` itself.
    pub fn covers(&self, coarse_cell: usize, local_cell: usize) -> Result<bool, MsFemError> {
        let grid = self.get_subgrid(coarse_cell)?;
        if local_cell >= grid.mesh().num_cells() {
            return Err(MsFemError::config(format!(
                "local cell {} not found in the local grid of coarse cell {}",
                local_cell, coarse_cell
            )));
        }
        Ok(grid.covers(local_cell))
    }

    /// Builds all local grids in parallel.
    pub fn build_all(&self) {
        self.grids.par_iter().enumerate().for_each(|(coarse_cell, cell)| {
            cell.get_or_init(|| LocalGrid::new(self.specifier, coarse_cell));
        });
    }
}
