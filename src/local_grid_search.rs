//! Point location in the coarse mesh.
use crate::error::{MsFemError, Stage};
use crate::mesh::TriangleMesh2d;
use nalgebra::Point2;
use once_cell::sync::OnceCell;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::RTree;

type CellBox = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// Tolerance on barycentric coordinates for a point to count as inside a cell.
const CONTAINMENT_TOLERANCE: f64 = 1e-10;

/// Finds the coarse cell that contains a batch of points.
///
/// Candidates are found through an R-tree of (slightly enlarged) cell bounding boxes, which is
/// built on the first query. A candidate is accepted only if it contains every point of the batch.
pub struct LocalGridSearch<'a> {
    coarse_mesh: &'a TriangleMesh2d,
    tree: OnceCell<RTree<CellBox>>,
}

impl<'a> LocalGridSearch<'a> {
    pub fn new(coarse_mesh: &'a TriangleMesh2d) -> Self {
        Self {
            coarse_mesh,
            tree: OnceCell::new(),
        }
    }

    fn tree(&self) -> &RTree<CellBox> {
        self.tree.get_or_init(|| {
            let boxes = self
                .coarse_mesh
                .element_iter()
                .enumerate()
                .map(|(cell_index, element)| {
                    let [a, b, c] = element.vertices();
                    let min = [a.x.min(b.x).min(c.x), a.y.min(b.y).min(c.y)];
                    let max = [a.x.max(b.x).max(c.x), a.y.max(b.y).max(c.y)];
                    // Make the box larger than necessary to accommodate floating point errors
                    let margin = 0.01 * element.diameter();
                    let rectangle = Rectangle::from_corners(
                        [min[0] - margin, min[1] - margin],
                        [max[0] + margin, max[1] + margin],
                    );
                    GeomWithData::new(rectangle, cell_index)
                })
                .collect();
            RTree::bulk_load(boxes)
        })
    }

    fn contains_all(&self, cell_index: usize, points: &[Point2<f64>]) -> bool {
        self.coarse_mesh
            .element(cell_index)
            .map(|element| points.iter().all(|x| element.contains_point(x, CONTAINMENT_TOLERANCE)))
            .unwrap_or(false)
    }

    /// Returns the unique coarse cell that contains all points.
    ///
    /// Fails if the batch is empty, or if no cell or more than one cell contains all points.
    pub fn search(&self, points: &[Point2<f64>]) -> Result<usize, MsFemError> {
        let failure = |reason: &str| {
            MsFemError::invalid_state(Stage::Reconstruction, format!("local grid search failed: {}", reason))
        };
        let first = points.first().ok_or_else(|| failure("no query points"))?;

        let mut candidates: Vec<usize> = self
            .tree()
            .locate_all_at_point(&[first.x, first.y])
            .map(|cell_box| cell_box.data)
            .filter(|&cell_index| self.contains_all(cell_index, points))
            .collect();
        candidates.sort_unstable();

        match candidates.as_slice() {
            [cell_index] => Ok(*cell_index),
            [] => Err(failure("no coarse cell contains all points")),
            _ => Err(failure(&format!("coarse cells {:?} all contain the points", candidates))),
        }
    }
}
