use crate::error::{ReconstructionError, Result};
use crate::point_buffer::PointBuffer;
use crate::Real;
use na::{Point3, Vector3};
use parry::bounding_volume::Aabb;

/// Sample positions and their unit normals, index-aligned.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(
    feature = "serde-serialize",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct OrientedPointCloud {
    positions: PointBuffer,
    normals: PointBuffer,
}

impl OrientedPointCloud {
    /// Pairs `positions` with `normals`.
    ///
    /// Fails if both buffers do not have the same length.
    pub fn new(positions: PointBuffer, normals: PointBuffer) -> Result<Self> {
        if positions.len() != normals.len() {
            return Err(ReconstructionError::MismatchedNormals {
                positions: positions.len(),
                normals: normals.len(),
            });
        }

        Ok(Self { positions, normals })
    }

    /// Builds a cloud from nalgebra points and normals.
    pub fn from_points_and_normals(
        points: &[Point3<Real>],
        normals: &[Vector3<Real>],
    ) -> Result<Self> {
        let positions = points.iter().copied().collect();
        let normals = normals.iter().map(|n| Point3::from(*n)).collect();
        Self::new(positions, normals)
    }

    /// Number of oriented samples.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Does this cloud contain no sample?
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// The sample positions.
    pub fn positions(&self) -> &PointBuffer {
        &self.positions
    }

    /// The sample normals.
    pub fn normals(&self) -> &PointBuffer {
        &self.normals
    }

    /// Mutable access to both buffers. Their lengths must not be changed.
    pub(crate) fn buffers_mut(&mut self) -> (&mut PointBuffer, &mut PointBuffer) {
        (&mut self.positions, &mut self.normals)
    }

    /// The `i`-th sample position.
    pub fn position(&self, i: usize) -> Point3<Real> {
        self.positions.point(i)
    }

    /// The `i`-th sample normal.
    pub fn normal(&self, i: usize) -> Vector3<Real> {
        self.normals.point(i).coords
    }

    /// The smallest AABB containing all the sample positions, if any.
    pub fn aabb(&self) -> Option<Aabb> {
        if self.is_empty() {
            return None;
        }

        let points: Vec<_> = self.positions.iter().collect();
        Some(Aabb::from_points(&points))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatched_lengths_are_rejected() {
        let result = OrientedPointCloud::new(PointBuffer::zeros(3), PointBuffer::zeros(2));
        assert!(matches!(
            result,
            Err(ReconstructionError::MismatchedNormals {
                positions: 3,
                normals: 2
            })
        ));
    }

    #[test]
    fn aabb_encloses_positions() {
        let cloud = OrientedPointCloud::from_points_and_normals(
            &[Point3::new(-1.0, 0.0, 2.0), Point3::new(1.0, 3.0, -2.0)],
            &[Vector3::x(), Vector3::y()],
        )
        .unwrap();

        let aabb = cloud.aabb().unwrap();
        assert_eq!(aabb.mins, Point3::new(-1.0, 0.0, -2.0));
        assert_eq!(aabb.maxs, Point3::new(1.0, 3.0, 2.0));
        assert_eq!(cloud.normal(1), Vector3::y());
        assert!(OrientedPointCloud::default().aabb().is_none());
    }
}
