use crate::error::{ReconstructionError, Result};
use crate::point_buffer::PointBuffer;
use crate::point_cloud::OrientedPointCloud;
use crate::Real;
use itertools::multizip;
use na::Point3;

/// The role of a constraint within its group of three.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConstraintKind {
    /// A sample position; target value `0`.
    Surface,
    /// The sample pushed along its normal by `+ε`; target value `+ε`.
    Outside,
    /// The sample pushed along its normal by `-ε`; target value `-ε`.
    Inside,
}

impl ConstraintKind {
    /// The kind of the `i`-th constraint of a [`ConstraintSet`].
    pub fn of_index(i: usize) -> Self {
        match i % 3 {
            0 => ConstraintKind::Surface,
            1 => ConstraintKind::Outside,
            _ => ConstraintKind::Inside,
        }
    }
}

/// Scalar-valued sample points the implicit function has to interpolate.
///
/// Constraints come in groups of three per kept source sample, in the order
/// surface, outside, inside.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(
    feature = "serde-serialize",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct ConstraintSet {
    points: PointBuffer,
    values: Vec<Real>,
}

impl ConstraintSet {
    /// Generates the constraints of every `stride`-th sample of `cloud`, offsetting along the
    /// normals by `epsilon`.
    ///
    /// An empty cloud yields an empty set.
    pub fn from_oriented_points(
        cloud: &OrientedPointCloud,
        stride: usize,
        epsilon: Real,
    ) -> Result<Self> {
        if stride == 0 {
            return Err(ReconstructionError::InvalidConfig(
                "the down-sampling stride must be at least 1".to_string(),
            ));
        }

        if !(epsilon > 0.0 && epsilon.is_finite()) {
            return Err(ReconstructionError::InvalidConfig(format!(
                "the normal offset must be positive, got {epsilon}"
            )));
        }

        let num_samples = cloud.len().div_ceil(stride);
        let mut points = PointBuffer::with_capacity(num_samples * 3);
        let mut values = Vec::with_capacity(num_samples * 3);

        let samples = multizip((cloud.positions().iter(), cloud.normals().iter()));

        for (pt, normal) in samples.step_by(stride) {
            let offset = normal.coords * epsilon;

            points.push_point(&pt);
            values.push(0.0);
            points.push_point(&(pt + offset));
            values.push(epsilon);
            points.push_point(&(pt - offset));
            values.push(-epsilon);
        }

        log::debug!(
            "Generated {} constraints from {} samples (stride {}).",
            values.len(),
            cloud.len(),
            stride
        );

        Ok(Self { points, values })
    }

    /// Builds a constraint set from explicit positions and target values.
    pub fn from_raw(points: PointBuffer, values: Vec<Real>) -> Result<Self> {
        if points.len() != values.len() {
            return Err(ReconstructionError::InvalidConfig(format!(
                "{} constraint positions but {} target values",
                points.len(),
                values.len()
            )));
        }

        Ok(Self { points, values })
    }

    /// Number of constraints.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Is this set empty?
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The constraint positions.
    pub fn points(&self) -> &PointBuffer {
        &self.points
    }

    /// The target value at each constraint position.
    pub fn values(&self) -> &[Real] {
        &self.values
    }

    /// The `i`-th constraint position.
    #[inline]
    pub fn point(&self, i: usize) -> Point3<Real> {
        self.points.point(i)
    }

    /// The `i`-th target value.
    #[inline]
    pub fn value(&self, i: usize) -> Real {
        self.values[i]
    }

    /// The kind of the `i`-th constraint.
    pub fn kind(&self, i: usize) -> ConstraintKind {
        ConstraintKind::of_index(i)
    }
}
