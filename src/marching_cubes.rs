//! Zero level set extraction with marching cubes.

use crate::error::{ReconstructionError, Result};
use crate::field::ImplicitField;
use crate::grid::VoxelGrid;
use crate::point_buffer::PointBuffer;
use crate::point_cloud::OrientedPointCloud;
use crate::Real;
use na::Point3;
use parry::bounding_volume::{Aabb, BoundingVolume};
use rayon::prelude::*;
use std::time::Instant;

pub use crate::tables::{CORNER_OFFSETS, EDGE_CORNERS, EDGE_TABLE, TRI_TABLE};

/// Corner values (and value differences) smaller than this snap edge crossings to a corner.
pub const SNAP_TOLERANCE: Real = 1.0e-5;

/// Position of the zero crossing along the edge `[p1, p2]`, given the field values at both ends.
///
/// The crossing snaps to `p1` if both values are too close to each other, or if `v1` is
/// (almost) zero, and to `p2` if `v2` is (almost) zero.
#[inline]
pub fn interpolate_edge(p1: &Point3<Real>, p2: &Point3<Real>, v1: Real, v2: Real) -> Point3<Real> {
    if (v1 - v2).abs() < SNAP_TOLERANCE || v1.abs() < SNAP_TOLERANCE {
        return *p1;
    }

    if v2.abs() < SNAP_TOLERANCE {
        return *p2;
    }

    let t = -v1 / (v2 - v1);
    p1 + (p2 - p1) * t
}

/// The 8-bit configuration of a cube: bit `b` is set iff corner `b` is inside (negative).
#[inline]
pub fn cube_index(values: &[Real; 8]) -> usize {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| **v < 0.0)
        .fold(0, |acc, (b, _)| acc | (1 << b))
}

/// Triangulates the zero level set inside one cube.
///
/// Corners must follow the ordering of [`CORNER_OFFSETS`]. Triangle vertices are appended to
/// `vertices` in the winding order of [`TRI_TABLE`]. Returns the number of emitted triangles.
pub fn march_cube(
    corners: &[Point3<Real>; 8],
    values: &[Real; 8],
    vertices: &mut Vec<Point3<Real>>,
) -> usize {
    let config = cube_index(values);
    let edges = EDGE_TABLE[config];

    if edges == 0 {
        return 0;
    }

    let mut crossings = [Point3::origin(); 12];

    for (e, [a, b]) in EDGE_CORNERS.iter().enumerate() {
        if edges & (1 << e) != 0 {
            crossings[e] = interpolate_edge(&corners[*a], &corners[*b], values[*a], values[*b]);
        }
    }

    let mut num_triangles = 0;

    for tri in TRI_TABLE[config].chunks_exact(3) {
        if tri[0] < 0 {
            break;
        }

        vertices.extend(tri.iter().map(|e| crossings[*e as usize]));
        num_triangles += 1;
    }

    num_triangles
}

/// A triangle soup with one normal per vertex.
///
/// Every three consecutive vertices form a triangle. Vertices shared by adjacent triangles are
/// duplicated.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(
    feature = "serde-serialize",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct SurfaceMesh {
    vertices: PointBuffer,
    normals: PointBuffer,
}

impl SurfaceMesh {
    /// The vertex positions.
    pub fn vertices(&self) -> &PointBuffer {
        &self.vertices
    }

    /// The vertex normals, index-aligned with [`Self::vertices`].
    pub fn normals(&self) -> &PointBuffer {
        &self.normals
    }

    /// The number of triangles.
    pub fn num_triangles(&self) -> usize {
        self.vertices.len() / 3
    }

    /// The three vertices of the `i`-th triangle.
    pub fn triangle(&self, i: usize) -> [Point3<Real>; 3] {
        [
            self.vertices.point(i * 3),
            self.vertices.point(i * 3 + 1),
            self.vertices.point(i * 3 + 2),
        ]
    }

    /// Flat `[x, y, z, ...]` vertex positions for a GPU vertex buffer.
    pub fn vertex_buffer(&self) -> Vec<f32> {
        self.vertices.to_f32_vec()
    }

    /// Flat `[x, y, z, ...]` vertex normals for a GPU vertex buffer.
    pub fn normal_buffer(&self) -> Vec<f32> {
        self.normals.to_f32_vec()
    }
}

/// The result of an extraction.
#[derive(Clone, Debug, PartialEq)]
pub enum Isosurface {
    /// The surface does not cross the sampled box: there is nothing to draw.
    Empty,
    /// At least one triangle was generated.
    Mesh(SurfaceMesh),
}

impl Isosurface {
    /// Is this surface free of triangles?
    pub fn is_empty(&self) -> bool {
        matches!(self, Isosurface::Empty)
    }

    /// The number of triangles.
    pub fn num_triangles(&self) -> usize {
        self.mesh().map(SurfaceMesh::num_triangles).unwrap_or(0)
    }

    /// The mesh, if not empty.
    pub fn mesh(&self) -> Option<&SurfaceMesh> {
        match self {
            Isosurface::Empty => None,
            Isosurface::Mesh(mesh) => Some(mesh),
        }
    }

    /// Consumes `self` and returns the mesh, if not empty.
    pub fn into_mesh(self) -> Option<SurfaceMesh> {
        match self {
            Isosurface::Empty => None,
            Isosurface::Mesh(mesh) => Some(mesh),
        }
    }
}

/// Configuration of the marching cubes sweep.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde-serialize",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct MarchingCubes {
    /// The box to sweep.
    pub aabb: Aabb,
    /// Number of voxels along each axis.
    pub resolution: [usize; 3],
    /// Finite-difference step used to compute the vertex normals.
    pub gradient_step: Real,
}

impl Default for MarchingCubes {
    fn default() -> Self {
        Self {
            aabb: Aabb::new(Point3::new(-1.2, -1.2, -1.2), Point3::new(1.2, 1.2, 1.2)),
            resolution: [60, 60, 60],
            gradient_step: 0.01,
        }
    }
}

impl MarchingCubes {
    /// Sweeps `aabb` with `resolution[i]` voxels along each axis `i`.
    pub fn new(aabb: Aabb, resolution: [usize; 3]) -> Self {
        Self {
            aabb,
            resolution,
            ..Default::default()
        }
    }

    /// Sweeps the bounding box of `cloud`, enlarged by the constraint offset `epsilon` and one
    /// voxel on each side.
    pub fn fitted(
        cloud: &OrientedPointCloud,
        epsilon: Real,
        resolution: [usize; 3],
    ) -> Result<Self> {
        let mut aabb = cloud.aabb().ok_or(ReconstructionError::EmptyPointCloud)?;
        let extents = aabb.extents();
        let cell_width = (0..3)
            .map(|i| (extents[i] + 2.0 * epsilon) / resolution[i].max(1) as Real)
            .fold(0.0, Real::max);
        aabb.loosen(epsilon + cell_width);

        let result = Self::new(aabb, resolution);
        result.validate()?;
        Ok(result)
    }

    /// Sets the finite-difference step used to compute the vertex normals.
    pub fn with_gradient_step(mut self, step: Real) -> Self {
        self.gradient_step = step;
        self
    }

    /// Checks that the box is non-degenerate and the resolution and step positive.
    pub fn validate(&self) -> Result<()> {
        if self.resolution.contains(&0) {
            return Err(ReconstructionError::InvalidConfig(format!(
                "grid resolution must be positive, got {:?}",
                self.resolution
            )));
        }

        let valid_box = (0..3).all(|i| {
            self.aabb.mins[i].is_finite()
                && self.aabb.maxs[i].is_finite()
                && self.aabb.mins[i] < self.aabb.maxs[i]
        });

        if !valid_box {
            return Err(ReconstructionError::InvalidConfig(format!(
                "invalid extraction box {:?} - {:?}",
                self.aabb.mins, self.aabb.maxs
            )));
        }

        if !(self.gradient_step > 0.0 && self.gradient_step.is_finite()) {
            return Err(ReconstructionError::InvalidConfig(format!(
                "the gradient step must be positive, got {}",
                self.gradient_step
            )));
        }

        Ok(())
    }

    /// Extracts the zero level set of `field` inside the configured box.
    ///
    /// Triangles are ordered by voxel (`x` index slowest, `z` fastest), then by their order in
    /// the triangle table.
    pub fn extract(&self, field: &impl ImplicitField) -> Result<Isosurface> {
        self.validate()?;

        let t0 = Instant::now();
        let grid = VoxelGrid::new(&self.aabb, self.resolution);
        log::debug!(
            "Sampling a {:?} lattice, voxel diagonal {:.4}.",
            self.resolution,
            grid.cell_diagonal()
        );
        let values = grid.sample(field);

        let slabs: Vec<Vec<Point3<Real>>> = (0..self.resolution[0])
            .into_par_iter()
            .map(|i| {
                let mut vertices = vec![];
                let mut corners = [Point3::origin(); 8];
                let mut corner_values = [0.0; 8];

                for [i, j, k] in grid.slab_cells(i) {
                    for (c, [di, dj, dk]) in CORNER_OFFSETS.iter().enumerate() {
                        corners[c] = grid.lattice_point(i + di, j + dj, k + dk);
                        corner_values[c] = values[grid.lattice_index(i + di, j + dj, k + dk)];
                    }

                    march_cube(&corners, &corner_values, &mut vertices);
                }

                vertices
            })
            .collect();

        let num_vertices = slabs.iter().map(Vec::len).sum();

        if num_vertices == 0 {
            log::info!(
                "Marching cubes on a {:?} grid found no surface ({:.2?}).",
                self.resolution,
                t0.elapsed()
            );
            return Ok(Isosurface::Empty);
        }

        let mut vertices = PointBuffer::with_capacity(num_vertices);
        vertices.extend(slabs.into_iter().flatten());

        let normals: Vec<_> = (0..vertices.len())
            .into_par_iter()
            .map(|i| Point3::from(field.eval_normal(&vertices.point(i), self.gradient_step)))
            .collect();
        let normals = PointBuffer::from_iter(normals);

        log::info!(
            "Marching cubes on a {:?} grid produced {} triangles ({:.2?}).",
            self.resolution,
            vertices.len() / 3,
            t0.elapsed()
        );

        Ok(Isosurface::Mesh(SurfaceMesh { vertices, normals }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use na::Vector3;
    use std::collections::HashMap;

    fn sphere(radius: Real) -> impl Fn(&Point3<Real>) -> Real {
        move |p: &Point3<Real>| p.coords.norm_squared() - radius * radius
    }

    fn unit_cube() -> [Point3<Real>; 8] {
        CORNER_OFFSETS.map(|[x, y, z]| Point3::new(x as Real, y as Real, z as Real))
    }

    #[test]
    fn interpolation_finds_the_zero_crossing() {
        let p1 = Point3::new(0.0, 0.0, 0.0);
        let p2 = Point3::new(2.0, 0.0, 0.0);
        assert_relative_eq!(interpolate_edge(&p1, &p2, -1.0, 3.0), Point3::new(0.5, 0.0, 0.0));
    }

    #[test]
    fn nearly_equal_values_snap_to_the_first_endpoint() {
        let p1 = Point3::new(0.1, 0.2, 0.3);
        let p2 = Point3::new(1.0, 1.0, 1.0);

        assert_eq!(interpolate_edge(&p1, &p2, 0.3, 0.300001), p1);
        assert_eq!(interpolate_edge(&p1, &p2, -0.5, -0.5), p1);
        assert_eq!(interpolate_edge(&p1, &p2, 1.4e-5, 5.0e-6), p1);
    }

    #[test]
    fn near_zero_values_snap_to_their_endpoint() {
        let p1 = Point3::new(0.0, 0.0, 0.0);
        let p2 = Point3::new(1.0, 0.0, 0.0);

        assert_eq!(interpolate_edge(&p1, &p2, 1.0e-6, 1.0), p1);
        assert_eq!(interpolate_edge(&p1, &p2, -1.0, 1.0e-6), p2);
    }

    #[test]
    fn negative_corners_set_the_cube_index_bits() {
        assert_eq!(cube_index(&[1.0; 8]), 0);
        assert_eq!(cube_index(&[-1.0; 8]), 255);
        assert_eq!(cube_index(&[-1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, -2.0]), 0b1000_0001);
        // Zero is outside.
        assert_eq!(cube_index(&[0.0; 8]), 0);
    }

    #[test]
    fn single_inside_corner_emits_one_triangle() {
        let mut values = [1.0; 8];
        values[0] = -1.0;
        let mut vertices = vec![];

        assert_eq!(march_cube(&unit_cube(), &values, &mut vertices), 1);
        assert_eq!(vertices.len(), 3);

        // Midpoints of edges 0, 8 and 3, in table order.
        assert_relative_eq!(vertices[0], Point3::new(0.5, 0.0, 0.0));
        assert_relative_eq!(vertices[1], Point3::new(0.0, 0.5, 0.0));
        assert_relative_eq!(vertices[2], Point3::new(0.0, 0.0, 0.5));

        // Counter-clockwise seen from the outside corners.
        let face_normal = (vertices[1] - vertices[0]).cross(&(vertices[2] - vertices[0]));
        assert!(face_normal.dot(&Vector3::new(1.0, 1.0, 1.0)) > 0.0);
    }

    #[test]
    fn uniform_cubes_emit_nothing() {
        let mut vertices = vec![];
        assert_eq!(march_cube(&unit_cube(), &[1.0; 8], &mut vertices), 0);
        assert_eq!(march_cube(&unit_cube(), &[-1.0; 8], &mut vertices), 0);
        assert!(vertices.is_empty());
    }

    #[test]
    fn sphere_is_closed_and_close_to_the_true_surface() {
        // The lattice step (0.12) never samples the sphere exactly, so no crossing snaps.
        let radius = 0.75;
        let mc = MarchingCubes {
            resolution: [20, 20, 20],
            ..Default::default()
        };
        let surface = mc.extract(&sphere(radius)).unwrap();
        let mesh = surface.mesh().unwrap();
        let diagonal = VoxelGrid::new(&mc.aabb, mc.resolution).cell_diagonal();

        assert!(mesh.num_triangles() > 100);
        assert_eq!(mesh.vertices().len(), mesh.normals().len());

        for (v, n) in mesh.vertices().iter().zip(mesh.normals().iter()) {
            assert!((v.coords.norm() - radius).abs() <= diagonal);
            // The normals point away from the center.
            assert!(n.coords.dot(&v.coords) > 0.0);
            assert_relative_eq!(n.coords.norm(), 1.0, epsilon = 1.0e-9);
        }

        // Closed: every undirected edge is shared by exactly two triangles.
        let key = |p: &Point3<Real>| [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()];
        let mut edge_count = HashMap::new();

        for t in 0..mesh.num_triangles() {
            let tri = mesh.triangle(t);

            for (a, b) in [(0, 1), (1, 2), (2, 0)] {
                let (ka, kb) = (key(&tri[a]), key(&tri[b]));
                let edge = if ka < kb { (ka, kb) } else { (kb, ka) };
                *edge_count.entry(edge).or_insert(0) += 1;
            }
        }

        assert!(edge_count.values().all(|c| *c == 2));
    }

    #[test]
    fn triangles_wind_counter_clockwise_around_their_normals() {
        // The lattice step (0.15) never samples the sphere exactly, so no triangle degenerates.
        let mc = MarchingCubes {
            resolution: [16, 16, 16],
            ..Default::default()
        };
        let mesh = mc.extract(&sphere(0.7)).unwrap().into_mesh().unwrap();

        for t in 0..mesh.num_triangles() {
            let [a, b, c] = mesh.triangle(t);
            let face_normal = (b - a).cross(&(c - a));

            for k in 0..3 {
                let normal = mesh.normals().point(3 * t + k).coords;
                assert!(face_normal.dot(&normal) > 0.0, "triangle {t} winds inward");
            }
        }
    }

    #[test]
    fn single_voxel_fully_inside_or_outside_is_empty() {
        let mc = MarchingCubes::new(mc_box(-1.0, 1.0), [1, 1, 1]);
        assert!(mc.extract(&sphere(10.0)).unwrap().is_empty());

        let mc = MarchingCubes::new(mc_box(0.5, 1.0), [1, 1, 1]);
        let surface = mc.extract(&sphere(0.1)).unwrap();
        assert_eq!(surface, Isosurface::Empty);
        assert_eq!(surface.num_triangles(), 0);
    }

    #[test]
    fn output_buffers_are_renderer_ready() {
        let mc = MarchingCubes {
            resolution: [8, 8, 8],
            ..Default::default()
        };
        let mesh = mc.extract(&sphere(0.7)).unwrap().into_mesh().unwrap();
        let vertex_buffer = mesh.vertex_buffer();

        assert_eq!(vertex_buffer.len(), mesh.num_triangles() * 9);
        assert_eq!(mesh.normal_buffer().len(), vertex_buffer.len());
        assert_eq!(vertex_buffer[0], mesh.vertices().get(0, 0) as f32);
    }

    #[test]
    fn extraction_order_is_deterministic() {
        let mc = MarchingCubes {
            resolution: [10, 12, 14],
            ..Default::default()
        };
        let field = |p: &Point3<Real>| (p - Vector3::new(0.1, -0.2, 0.05)).coords.norm() - 0.6;
        assert_eq!(mc.extract(&field).unwrap(), mc.extract(&field).unwrap());
    }

    #[test]
    fn invalid_configurations_are_rejected() {
        let zero_resolution = MarchingCubes::new(mc_box(-1.0, 1.0), [4, 0, 4]);
        assert!(zero_resolution.extract(&sphere(0.5)).is_err());

        let inverted = MarchingCubes::new(mc_box(1.0, -1.0), [4, 4, 4]);
        assert!(inverted.extract(&sphere(0.5)).is_err());

        let bad_step = MarchingCubes::default().with_gradient_step(0.0);
        assert!(bad_step.extract(&sphere(0.5)).is_err());
    }

    #[test]
    fn fitted_box_encloses_the_cloud_with_margin() {
        let cloud = OrientedPointCloud::from_points_and_normals(
            &[Point3::new(-0.5, 0.0, 0.0), Point3::new(0.5, 0.2, 0.1)],
            &[-Vector3::x(), Vector3::x()],
        )
        .unwrap();
        let mc = MarchingCubes::fitted(&cloud, 0.02, [10, 10, 10]).unwrap();

        assert!(mc.aabb.mins.x < -0.52 && mc.aabb.maxs.x > 0.52);
        assert!(mc.aabb.mins.y < -0.02 && mc.aabb.maxs.y > 0.22);
        assert!(MarchingCubes::fitted(&OrientedPointCloud::default(), 0.02, [10; 3]).is_err());
    }

    fn mc_box(min: Real, max: Real) -> Aabb {
        Aabb::new(Point3::new(min, min, min), Point3::new(max, max, max))
    }
}
