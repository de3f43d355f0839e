//! Basic procedural mesh generation routines.
//!
//! All generated cells are counter-clockwise oriented.
use crate::mesh::TriangleMesh2d;
use nalgebra::{Point2, Vector2};

pub fn create_unit_square_uniform_tri_mesh_2d(cells_per_dim: usize) -> TriangleMesh2d {
    create_rectangular_uniform_tri_mesh_2d(
        &Point2::origin(),
        &Vector2::new(1.0, 1.0),
        cells_per_dim,
        cells_per_dim,
    )
}

/// Generates an axis-aligned rectangular mesh, splitting each of the `cells_x * cells_y` squares
/// into two triangles along the diagonal from its bottom-left to its top-right corner.
///
/// Vertex `(i, j)` of the lattice receives the index `j * (cells_x + 1) + i`.
pub fn create_rectangular_uniform_tri_mesh_2d(
    bottom_left: &Point2<f64>,
    extents: &Vector2<f64>,
    cells_x: usize,
    cells_y: usize,
) -> TriangleMesh2d {
    if cells_x == 0 || cells_y == 0 {
        return TriangleMesh2d::from_vertices_and_connectivity(Vec::new(), Vec::new());
    }

    let vertices = lattice_vertices(bottom_left, extents, cells_x, cells_y);
    let to_global_vertex_index = |i, j| (cells_x + 1) * j + i;

    let mut cells = Vec::with_capacity(2 * cells_x * cells_y);
    for j in 0..cells_y {
        for i in 0..cells_x {
            let v00 = to_global_vertex_index(i, j);
            let v10 = to_global_vertex_index(i + 1, j);
            let v01 = to_global_vertex_index(i, j + 1);
            let v11 = to_global_vertex_index(i + 1, j + 1);
            cells.push([v00, v10, v11]);
            cells.push([v00, v11, v01]);
        }
    }

    TriangleMesh2d::from_vertices_and_connectivity(vertices, cells)
}

/// Generates a mesh of the unit square where each of the squares is split into four triangles
/// that share a vertex at the center of the square.
///
/// The lattice vertices come first, followed by the square centers in row-major order.
pub fn create_unit_square_crossed_tri_mesh_2d(cells_per_dim: usize) -> TriangleMesh2d {
    let n = cells_per_dim;
    if n == 0 {
        return TriangleMesh2d::from_vertices_and_connectivity(Vec::new(), Vec::new());
    }

    let extents = Vector2::new(1.0, 1.0);
    let mut vertices = lattice_vertices(&Point2::origin(), &extents, n, n);
    let num_lattice_vertices = vertices.len();
    let h = 1.0 / n as f64;
    let to_global_vertex_index = |i, j| (n + 1) * j + i;

    let mut cells = Vec::with_capacity(4 * n * n);
    for j in 0..n {
        for i in 0..n {
            let center = num_lattice_vertices + j * n + i;
            vertices.push(Point2::new((i as f64 + 0.5) * h, (j as f64 + 0.5) * h));

            let v00 = to_global_vertex_index(i, j);
            let v10 = to_global_vertex_index(i + 1, j);
            let v01 = to_global_vertex_index(i, j + 1);
            let v11 = to_global_vertex_index(i + 1, j + 1);
            cells.push([v00, v10, center]);
            cells.push([v10, v11, center]);
            cells.push([v11, v01, center]);
            cells.push([v01, v00, center]);
        }
    }

    TriangleMesh2d::from_vertices_and_connectivity(vertices, cells)
}

fn lattice_vertices(bottom_left: &Point2<f64>, extents: &Vector2<f64>, cells_x: usize, cells_y: usize) -> Vec<Point2<f64>> {
    let hx = extents.x / cells_x as f64;
    let hy = extents.y / cells_y as f64;
    let mut vertices = Vec::with_capacity((cells_x + 1) * (cells_y + 1));
    for j in 0..=cells_y {
        for i in 0..=cells_x {
            // Snap the last lattice line onto the exact extent
            let x = if i == cells_x { extents.x } else { i as f64 * hx };
            let y = if j == cells_y { extents.y } else { j as f64 * hy };
            vertices.push(bottom_left + Vector2::new(x, y));
        }
    }
    vertices
}
