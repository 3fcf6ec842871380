use crate::cache::WeightCache;
use crate::constraints::ConstraintSet;
use crate::error::{ReconstructionError, Result};
use crate::field::ImplicitField;
use crate::marching_cubes::{Isosurface, MarchingCubes};
use crate::point_cloud::OrientedPointCloud;
use crate::solver::{self, kernel, POLYNOMIAL_TERMS};
use crate::Real;
use na::{DVector, Point3, Vector3};

/// Parameters of the RBF fit.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde-serialize",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct RbfConfig {
    /// Only every `stride`-th input sample generates constraints. Must be at least 1.
    pub stride: usize,
    /// Distance of the outside and inside constraints from their sample, along its normal.
    pub epsilon: Real,
    /// Step of the central differences used for gradients and normals.
    pub gradient_step: Real,
}

impl Default for RbfConfig {
    fn default() -> Self {
        Self {
            stride: 1,
            epsilon: 0.02,
            gradient_step: 0.01,
        }
    }
}

impl RbfConfig {
    /// Checks that every parameter is in its valid range.
    pub fn validate(&self) -> Result<()> {
        if self.stride == 0 {
            return Err(ReconstructionError::InvalidConfig(
                "the down-sampling stride must be at least 1".to_string(),
            ));
        }

        for (name, value) in [("epsilon", self.epsilon), ("gradient step", self.gradient_step)] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ReconstructionError::InvalidConfig(format!(
                    "the {name} must be positive, got {value}"
                )));
            }
        }

        Ok(())
    }
}

/// An implicit surface interpolating an oriented point cloud with the biharmonic RBF.
///
/// This is the immutable result of a solve: the constraint set and the weights `[w; c]` solved
/// for it. An unsolved surface (see [`Self::unsolved`]) evaluates to `0` everywhere.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde-serialize",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct RbfSurface {
    constraints: ConstraintSet,
    weights: DVector<Real>,
    gradient_step: Real,
}

impl RbfSurface {
    /// Reconstruct a surface given a set of sample points and the unit normals at these points.
    ///
    /// # Parameters
    /// - `points`: the sample points, roughly normalized into `[-1, 1]³`.
    /// - `normals`: the outward normals at the sample points. Must have the same length as
    ///   `points`.
    /// - `config`: down-sampling stride, normal offset and gradient step.
    pub fn from_points_and_normals(
        points: &[Point3<Real>],
        normals: &[Vector3<Real>],
        config: &RbfConfig,
    ) -> Result<Self> {
        let cloud = OrientedPointCloud::from_points_and_normals(points, normals)?;
        Self::from_cloud(&cloud, config)
    }

    /// Reconstruct a surface from an oriented point cloud.
    pub fn from_cloud(cloud: &OrientedPointCloud, config: &RbfConfig) -> Result<Self> {
        let constraints = Self::constraints_for(cloud, config)?;
        let weights = solver::solve_weights(&constraints)?;
        Self::from_weights(constraints, weights, config.gradient_step)
    }

    /// Like [`Self::from_cloud`], but reuses the weights stored in `cache` for this stride if
    /// they match the constraint set, and refreshes the cache otherwise.
    pub fn from_cloud_cached(
        cloud: &OrientedPointCloud,
        config: &RbfConfig,
        cache: &WeightCache,
    ) -> Result<Self> {
        let constraints = Self::constraints_for(cloud, config)?;
        let weights = cache.load_or_solve(config.stride, &constraints)?;
        Self::from_weights(constraints, weights, config.gradient_step)
    }

    /// Assembles a surface from already-solved weights.
    ///
    /// `weights` must contain one entry per constraint followed by the 4 polynomial coefficients.
    pub fn from_weights(
        constraints: ConstraintSet,
        weights: DVector<Real>,
        gradient_step: Real,
    ) -> Result<Self> {
        if weights.len() != constraints.len() + POLYNOMIAL_TERMS {
            return Err(ReconstructionError::InvalidConfig(format!(
                "{} weights for {} constraints",
                weights.len(),
                constraints.len()
            )));
        }

        Ok(Self {
            constraints,
            weights,
            gradient_step,
        })
    }

    /// A surface without weights: its field is `0` everywhere and it has no zero crossing.
    pub fn unsolved() -> Self {
        Self {
            constraints: ConstraintSet::default(),
            weights: DVector::zeros(0),
            gradient_step: RbfConfig::default().gradient_step,
        }
    }

    fn constraints_for(cloud: &OrientedPointCloud, config: &RbfConfig) -> Result<ConstraintSet> {
        config.validate()?;

        if cloud.is_empty() {
            return Err(ReconstructionError::EmptyPointCloud);
        }

        let constraints =
            ConstraintSet::from_oriented_points(cloud, config.stride, config.epsilon)?;
        log::info!(
            "Fitting {} constraints from {} samples.",
            constraints.len(),
            cloud.len()
        );
        Ok(constraints)
    }

    /// Have weights been solved for this surface?
    pub fn is_solved(&self) -> bool {
        !self.weights.is_empty()
    }

    /// The interpolated constraints.
    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    /// The full weight vector `[w; c]`.
    pub fn weights(&self) -> &DVector<Real> {
        &self.weights
    }

    /// The polynomial coefficients `(c0, c1, c2, c3)` of `c0 + c1 x + c2 y + c3 z`.
    pub fn polynomial(&self) -> Option<[Real; 4]> {
        let n = self.constraints.len();
        self.is_solved().then(|| {
            [
                self.weights[n],
                self.weights[n + 1],
                self.weights[n + 2],
                self.weights[n + 3],
            ]
        })
    }

    /// The field gradient at `pt`, using the configured central-difference step.
    pub fn gradient(&self, pt: &Point3<Real>) -> Vector3<Real> {
        self.eval_gradient(pt, self.gradient_step)
    }

    /// The outward unit normal at `pt`, using the configured central-difference step.
    pub fn normal(&self, pt: &Point3<Real>) -> Vector3<Real> {
        self.eval_normal(pt, self.gradient_step)
    }

    /// Reconstructs a mesh of the zero level set with marching cubes.
    pub fn reconstruct_mesh(&self, marching_cubes: &MarchingCubes) -> Result<Isosurface> {
        marching_cubes
            .clone()
            .with_gradient_step(self.gradient_step)
            .extract(self)
    }
}

impl ImplicitField for RbfSurface {
    /// `Σ w_i φ(‖pt − p_i‖) + c0 + c1 x + c2 y + c3 z`, or `0` if unsolved.
    fn eval(&self, pt: &Point3<Real>) -> Real {
        let Some([c0, c1, c2, c3]) = self.polynomial() else {
            return 0.0;
        };

        let mut result = c0 + c1 * pt.x + c2 * pt.y + c3 * pt.z;

        for (center, w) in self.constraints.points().iter().zip(self.weights.iter()) {
            result += w * kernel(na::distance(pt, &center));
        }

        result
    }
}
