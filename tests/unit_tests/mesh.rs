use crate::export_mesh_vtk;
use msfem::mesh::procedural::{
    create_rectangular_uniform_tri_mesh_2d, create_unit_square_crossed_tri_mesh_2d,
    create_unit_square_uniform_tri_mesh_2d,
};
use msfem::mesh::refinement::{refine_uniformly, refine_uniformly_repeat};
use msfem::mesh::TriangleMesh2d;
use matrixcompare::assert_scalar_eq;
use nalgebra::{Point2, Vector2};
use proptest::prelude::*;

fn total_area(mesh: &TriangleMesh2d) -> f64 {
    mesh.element_iter().map(|element| element.area()).sum()
}

fn single_triangle() -> TriangleMesh2d {
    TriangleMesh2d::from_vertices_and_connectivity(
        vec![Point2::new(0.0, 0.0), Point2::new(2.0, 0.0), Point2::new(0.0, 1.0)],
        vec![[0, 1, 2]],
    )
}

#[test]
fn uniform_tri_mesh_has_expected_layout() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(3);
    assert_eq!(mesh.num_vertices(), 16);
    assert_eq!(mesh.num_cells(), 18);
    assert_eq!(mesh.vertices()[5], Point2::new(1.0 / 3.0, 1.0 / 3.0));
    assert_eq!(mesh.vertices()[15], Point2::new(1.0, 1.0));
    assert_eq!(mesh.connectivity()[0], [0, 1, 5]);
    assert_eq!(mesh.connectivity()[1], [0, 5, 4]);
    assert!(mesh.element_iter().all(|element| element.signed_area() > 0.0));
    assert_scalar_eq!(total_area(&mesh), 1.0, comp = abs, tol = 1e-14);
}

#[test]
fn rectangular_tri_mesh_covers_extents() {
    let mesh = create_rectangular_uniform_tri_mesh_2d(&Point2::new(-1.0, 2.0), &Vector2::new(3.0, 0.5), 3, 2);
    assert_eq!(mesh.num_vertices(), 12);
    assert_eq!(mesh.num_cells(), 12);
    assert_eq!(mesh.vertices()[0], Point2::new(-1.0, 2.0));
    assert_eq!(mesh.vertices()[11], Point2::new(2.0, 2.5));
    assert_scalar_eq!(total_area(&mesh), 1.5, comp = abs, tol = 1e-14);
}

#[test]
fn empty_procedural_meshes() {
    assert_eq!(create_unit_square_uniform_tri_mesh_2d(0).num_cells(), 0);
    assert_eq!(create_unit_square_crossed_tri_mesh_2d(0).num_cells(), 0);
}

#[test]
fn crossed_tri_mesh_has_expected_layout() {
    let mesh = create_unit_square_crossed_tri_mesh_2d(2);
    export_mesh_vtk("crossed_tri_mesh_has_expected_layout", "mesh", &mesh);

    assert_eq!(mesh.num_vertices(), 9 + 4);
    assert_eq!(mesh.num_cells(), 16);
    assert_eq!(mesh.vertices()[9], Point2::new(0.25, 0.25));
    assert_eq!(mesh.vertices()[12], Point2::new(0.75, 0.75));
    assert!(mesh.element_iter().all(|element| element.signed_area() > 0.0));
    assert_scalar_eq!(total_area(&mesh), 1.0, comp = abs, tol = 1e-14);
    assert_eq!(mesh.find_boundary_faces().len(), 8);
}

#[test]
fn tri_find_boundary_faces_and_vertices() {
    // Single triangle
    {
        let mesh = single_triangle();
        let faces = mesh.find_boundary_faces();
        assert_eq!(faces.len(), 3);
        assert!(faces.iter().all(|face| face.cell == 0));
        let mut local_indices: Vec<_> = faces.iter().map(|face| face.local_index).collect();
        local_indices.sort_unstable();
        assert_eq!(local_indices, [0, 1, 2]);
        assert_eq!(mesh.find_boundary_vertices(), [0, 1, 2]);
    }

    // Interior vertex of a 2x2 mesh is not on the boundary
    {
        let mesh = create_unit_square_uniform_tri_mesh_2d(2);
        assert_eq!(mesh.find_boundary_faces().len(), 8);
        assert_eq!(mesh.find_boundary_vertices(), [0, 1, 2, 3, 5, 6, 7, 8]);
    }
}

#[test]
fn boundary_face_normals_point_outwards() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(2);
    let center = Point2::new(0.5, 0.5);
    for face in mesh.find_boundary_faces() {
        let [a, b] = mesh.face_points(&face);
        let midpoint = nalgebra::center(&a, &b);
        let normal = mesh.face_normal(&face);
        assert_scalar_eq!(normal.norm(), 1.0, comp = abs, tol = 1e-14);
        assert!(normal.dot(&(midpoint - center)) > 0.0);
    }
}

#[test]
fn vertex_cells_lists_adjacent_cells() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(2);
    let vertex_cells = mesh.vertex_cells();
    assert_eq!(vertex_cells[0], [0, 1]);
    assert_eq!(vertex_cells[4], [0, 1, 3, 4, 6, 7]);
    assert_eq!(vertex_cells[8], [6, 7]);
}

#[test]
fn keep_cells_relabels_vertices() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(2);
    let (kept, vertex_map) = mesh.keep_cells(&[6, 1]);

    assert_eq!(kept.num_cells(), 2);
    assert_eq!(vertex_map, [0, 3, 4, 5, 8]);
    assert_eq!(kept.num_vertices(), 5);
    // Cell order follows the given indices
    assert_eq!(kept.connectivity()[0], [2, 3, 4]);
    assert_eq!(kept.connectivity()[1], [0, 2, 1]);
    for (new_index, &old_index) in vertex_map.iter().enumerate() {
        assert_eq!(kept.vertices()[new_index], mesh.vertices()[old_index]);
    }
}

#[test]
fn refine_single_triangle() {
    let mesh = single_triangle();
    let refined = refine_uniformly(&mesh);

    assert_eq!(refined.mesh.num_vertices(), 6);
    assert_eq!(refined.mesh.num_cells(), 4);
    assert_eq!(refined.parents, [0, 0, 0, 0]);
    assert_eq!(&refined.mesh.vertices()[..3], mesh.vertices());
    assert!(refined.mesh.element_iter().all(|element| element.signed_area() > 0.0));
    for element in refined.mesh.element_iter() {
        assert_scalar_eq!(element.area(), 0.25, comp = abs, tol = 1e-14);
    }
    // Children 0..3 keep the corners of the parent
    for (child, corner) in [(0, 0), (1, 1), (2, 2)] {
        assert!(refined.mesh.connectivity()[child].contains(&corner));
    }
}

#[test]
fn refine_repeat_composes_parents() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(1);
    let refined = refine_uniformly_repeat(&mesh, 2);

    assert_eq!(refined.mesh.num_cells(), 32);
    assert_eq!(refined.mesh.num_vertices(), 25);
    let children = refined.children(mesh.num_cells());
    assert_eq!(children[0], (0..16).collect::<Vec<_>>());
    assert_eq!(children[1], (16..32).collect::<Vec<_>>());

    for (fine_element, &parent) in refined.mesh.element_iter().zip(&refined.parents) {
        let parent_element = mesh.element(parent).unwrap();
        assert!(parent_element.contains_point(&fine_element.centroid(), 1e-12));
    }
}

#[test]
fn refine_repeat_zero_times_is_identity() {
    let mesh = create_unit_square_crossed_tri_mesh_2d(2);
    let refined = refine_uniformly_repeat(&mesh, 0);
    assert_eq!(refined.mesh, mesh);
    assert_eq!(refined.parents, (0..mesh.num_cells()).collect::<Vec<_>>());
}

proptest! {
    #[test]
    fn refinement_preserves_area_and_boundary(cells_per_dim in 1usize..5, levels in 0usize..3) {
        let mesh = create_unit_square_uniform_tri_mesh_2d(cells_per_dim);
        let refined = refine_uniformly_repeat(&mesh, levels);
        let factor = 1 << levels;

        prop_assert_eq!(refined.mesh.num_cells(), mesh.num_cells() * factor * factor);
        prop_assert_eq!(refined.mesh.find_boundary_faces().len(), 4 * cells_per_dim * factor);
        prop_assert!((total_area(&refined.mesh) - 1.0).abs() < 1e-12);
        prop_assert_eq!(&refined.mesh.vertices()[..mesh.num_vertices()], mesh.vertices());
    }
}
