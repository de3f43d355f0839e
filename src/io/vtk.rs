use crate::mesh::TriangleMesh2d;
use eyre::eyre;
use std::fs::create_dir_all;
use std::path::Path;
use vtkio::model::{
    Attribute, Attributes, ByteOrder, CellType, Cells, DataSet, Piece, UnstructuredGridPiece, Version, VertexNumbers, Vtk,
};

/// Builds legacy VTK unstructured grids of triangle meshes with nodal scalar data.
///
/// ```ignore
/// TriangleMeshDataSetBuilder::from_mesh(&mesh)
///     .with_title("solution")
///     .with_point_scalar_attribute("u", solution.as_slice())?
///     .try_export("data/solution.vtk")?;
/// ```
pub struct TriangleMeshDataSetBuilder<'a> {
    mesh: &'a TriangleMesh2d,
    // Only used for exporting directly to file
    title: Option<String>,
    point_attributes: Vec<Attribute>,
}

impl<'a> TriangleMeshDataSetBuilder<'a> {
    pub fn from_mesh(mesh: &'a TriangleMesh2d) -> Self {
        Self {
            mesh,
            title: None,
            point_attributes: Vec::new(),
        }
    }

    pub fn with_title(self, title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..self
        }
    }

    /// Attaches one scalar per mesh vertex.
    pub fn with_point_scalar_attribute(mut self, name: impl Into<String>, values: &[f64]) -> eyre::Result<Self> {
        let name = name.into();
        if values.len() != self.mesh.num_vertices() {
            return Err(eyre!(
                "attribute {} has {} values, but the mesh has {} vertices",
                name,
                values.len(),
                self.mesh.num_vertices()
            ));
        }
        self.point_attributes
            .push(Attribute::scalars(name, 1).with_data(values.to_vec()));
        Ok(self)
    }

    pub fn try_build(&self) -> eyre::Result<DataSet> {
        // VTK points are always three-dimensional
        let points: Vec<f64> = self
            .mesh
            .vertices()
            .iter()
            .flat_map(|v| [v.x, v.y, 0.0])
            .collect();

        // Vertices are laid out as N, i_1, ..., i_N per cell
        let mut vertices = Vec::with_capacity(4 * self.mesh.num_cells());
        for cell in self.mesh.connectivity() {
            vertices.push(3);
            for &index in cell {
                vertices.push(u32::try_from(index)?);
            }
        }

        let piece = UnstructuredGridPiece {
            points: points.into(),
            cells: Cells {
                cell_verts: VertexNumbers::Legacy {
                    num_cells: u32::try_from(self.mesh.num_cells())?,
                    vertices,
                },
                types: vec![CellType::Triangle; self.mesh.num_cells()],
            },
            data: Attributes {
                point: self.point_attributes.clone(),
                cell: Vec::new(),
            },
        };

        Ok(DataSet::UnstructuredGrid {
            meta: None,
            pieces: vec![Piece::Inline(Box::new(piece))],
        })
    }

    /// Convenience function for directly exporting the dataset to a file.
    ///
    /// Missing parent directories are created.
    pub fn try_export(&self, filename: impl AsRef<Path>) -> eyre::Result<()> {
        let filepath = filename.as_ref();
        if let Some(parent) = filepath.parent() {
            create_dir_all(parent)?;
        }
        let fallback_title = filepath
            .file_stem()
            .map(|os_str| os_str.to_string_lossy().to_string())
            .unwrap_or_else(|| "untitled".to_string());
        let dataset = self.try_build()?;
        Vtk {
            version: Version { major: 4, minor: 1 },
            // If we don't have a title then just make the filepath the title
            title: self.title.clone().unwrap_or(fallback_title),
            byte_order: ByteOrder::BigEndian,
            data: dataset,
            file_path: None,
        }
        .export(filepath)
        .map_err(|err| eyre!("failed to export {}: {:?}", filepath.display(), err))?;
        Ok(())
    }
}
