//! Assembly and dense solution of the RBF interpolation system.
//!
//! For `n` constraints `p_i` with target values `f_i`, the weights `w` and the affine polynomial
//! coefficients `c` are the solution of the `(n + 4) × (n + 4)` system
//!
//! ```text
//! [ A   P ] [w]   [f]
//! [ Pᵗ  0 ] [c] = [0]
//! ```
//!
//! with `A[i][j] = φ(‖p_i − p_j‖)` and `P[i] = [1, x_i, y_i, z_i]`.

use crate::constraints::ConstraintSet;
use crate::error::{ReconstructionError, Result};
use crate::Real;
use na::{DMatrix, DVector};
use rayon::prelude::*;
use std::time::Instant;

/// Number of coefficients of the affine polynomial `c0 + c1 x + c2 y + c3 z`.
pub const POLYNOMIAL_TERMS: usize = 4;

/// Pivots smaller than this, relative to the largest pivot, make the system ill-conditioned.
pub const SINGULARITY_TOLERANCE: Real = 1.0e-12;

/// The biharmonic kernel `φ(r) = r`.
#[inline]
pub fn kernel(r: Real) -> Real {
    r
}

/// Builds the augmented interpolation matrix and its right-hand side.
///
/// Only the upper triangle of the kernel block is computed (one distance per unordered pair),
/// then mirrored.
pub fn assemble_system(constraints: &ConstraintSet) -> (DMatrix<Real>, DVector<Real>) {
    let n = constraints.len();
    let size = n + POLYNOMIAL_TERMS;
    let mut system = DMatrix::zeros(size, size);

    // Column-major storage: column `j` of the kernel block holds `A[i][j]` for `i < j` in its
    // first `j` entries.
    system
        .as_mut_slice()
        .par_chunks_mut(size)
        .take(n)
        .enumerate()
        .for_each(|(j, column)| {
            let pj = constraints.point(j);

            for (i, entry) in column.iter_mut().enumerate().take(j) {
                *entry = kernel(na::distance(&constraints.point(i), &pj));
            }
        });

    for j in 0..n {
        for i in 0..j {
            system[(j, i)] = system[(i, j)];
        }
    }

    for i in 0..n {
        let pt = constraints.point(i);
        let basis = [1.0, pt.x, pt.y, pt.z];

        for (k, b) in basis.iter().enumerate() {
            system[(i, n + k)] = *b;
            system[(n + k, i)] = *b;
        }
    }

    let mut rhs = DVector::zeros(size);
    rhs.rows_mut(0, n).copy_from_slice(constraints.values());

    (system, rhs)
}

/// Solves a general square system with a partially-pivoted LU decomposition.
///
/// The interpolation system is symmetric but indefinite, so Cholesky does not apply.
pub fn solve_dense(system: DMatrix<Real>, rhs: &DVector<Real>) -> Result<DVector<Real>> {
    let size = system.nrows();
    let singular = || ReconstructionError::SingularSystem { size };

    let lu = system.lu();

    if !lu.is_invertible() {
        return Err(singular());
    }

    let pivots = lu.u().diagonal();
    let largest = pivots.amax();

    if largest == 0.0 || !largest.is_finite() || pivots.amin() < largest * SINGULARITY_TOLERANCE
    {
        return Err(singular());
    }

    let solution = lu.solve(rhs).ok_or_else(singular)?;

    if solution.iter().any(|w| !w.is_finite()) {
        return Err(singular());
    }

    Ok(solution)
}

/// Computes the weight vector `[w; c]` interpolating `constraints`.
pub fn solve_weights(constraints: &ConstraintSet) -> Result<DVector<Real>> {
    if constraints.is_empty() {
        return Err(ReconstructionError::EmptyPointCloud);
    }

    let t0 = Instant::now();
    let (system, rhs) = assemble_system(constraints);
    log::info!(
        "Assembled {0}x{0} interpolation system in {1:.2?}.",
        system.nrows(),
        t0.elapsed()
    );

    let t0 = Instant::now();
    let weights = solve_dense(system, &rhs)?;
    log::info!("Solved interpolation system in {:.2?}.", t0.elapsed());

    Ok(weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point_buffer::PointBuffer;
    use crate::point_cloud::OrientedPointCloud;
    use na::{Point3, Vector3};

    fn tetrahedron_constraints() -> ConstraintSet {
        let points = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ];
        ConstraintSet::from_raw(points.iter().copied().collect(), vec![0.0, 0.1, -0.1, 0.2])
            .unwrap()
    }

    #[test]
    fn kernel_block_is_symmetric_with_zero_diagonal() {
        let constraints = tetrahedron_constraints();
        let (system, rhs) = assemble_system(&constraints);
        let n = constraints.len();

        assert_eq!(system.nrows(), n + POLYNOMIAL_TERMS);
        assert_eq!(system, system.transpose());

        for i in 0..n {
            assert_eq!(system[(i, i)], 0.0);

            for j in 0..n {
                let expected = na::distance(&constraints.point(i), &constraints.point(j));
                assert_eq!(system[(i, j)], expected);
                assert_eq!(system[(i, j)], system[(j, i)]);
            }
        }

        assert_eq!(system[(0, 1)], 1.0);
        assert_eq!(system[(1, 2)], Real::sqrt(2.0));
        assert_eq!(rhs.as_slice(), &[0.0, 0.1, -0.1, 0.2, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn polynomial_block_layout() {
        let constraints = tetrahedron_constraints();
        let (system, _) = assemble_system(&constraints);
        let n = constraints.len();

        for i in 0..n {
            let pt = constraints.point(i);
            assert_eq!(system[(i, n)], 1.0);
            assert_eq!(system[(i, n + 1)], pt.x);
            assert_eq!(system[(i, n + 2)], pt.y);
            assert_eq!(system[(i, n + 3)], pt.z);
            assert_eq!(system[(n + 3, i)], pt.z);
        }

        for k in 0..POLYNOMIAL_TERMS {
            for l in 0..POLYNOMIAL_TERMS {
                assert_eq!(system[(n + k, n + l)], 0.0);
            }
        }
    }

    #[test]
    fn solution_satisfies_the_system() {
        let constraints = tetrahedron_constraints();
        let (system, rhs) = assemble_system(&constraints);
        let weights = solve_dense(system.clone(), &rhs).unwrap();
        let residual = &system * &weights - &rhs;
        assert!(residual.amax() < 1.0e-10);
    }

    #[test]
    fn affine_data_is_reproduced_by_the_polynomial() {
        // f = 0.5 + 2x - y + 3z is in the polynomial space, so all RBF weights vanish.
        let points = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
        ];
        let values = points
            .iter()
            .map(|p| 0.5 + 2.0 * p.x - p.y + 3.0 * p.z)
            .collect();
        let constraints =
            ConstraintSet::from_raw(points.iter().copied().collect(), values).unwrap();
        let weights = solve_weights(&constraints).unwrap();

        for w in weights.rows(0, points.len()).iter() {
            assert!(w.abs() < 1.0e-10);
        }

        let poly = weights.rows(points.len(), POLYNOMIAL_TERMS);
        assert!((poly[0] - 0.5).abs() < 1.0e-10);
        assert!((poly[1] - 2.0).abs() < 1.0e-10);
        assert!((poly[2] + 1.0).abs() < 1.0e-10);
        assert!((poly[3] - 3.0).abs() < 1.0e-10);
    }

    #[test]
    fn coincident_constraints_fail() {
        let points: PointBuffer = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 0.0),
        ]
        .into_iter()
        .collect();
        let constraints = ConstraintSet::from_raw(points, vec![0.0; 5]).unwrap();

        assert!(matches!(
            solve_weights(&constraints),
            Err(ReconstructionError::SingularSystem { size: 9 })
        ));
    }

    #[test]
    fn collinear_constraints_fail() {
        // Normals along the line keep every constraint on the x axis.
        let points: Vec<_> = (0..4).map(|i| Point3::new(i as Real * 0.5, 0.0, 0.0)).collect();
        let normals = vec![Vector3::x(); 4];
        let cloud = OrientedPointCloud::from_points_and_normals(&points, &normals).unwrap();
        let constraints = ConstraintSet::from_oriented_points(&cloud, 1, 0.02).unwrap();

        assert!(matches!(
            solve_weights(&constraints),
            Err(ReconstructionError::SingularSystem { .. })
        ));
    }

    #[test]
    fn empty_constraints_fail_fast() {
        assert!(matches!(
            solve_weights(&ConstraintSet::default()),
            Err(ReconstructionError::EmptyPointCloud)
        ));
    }
}
