use crate::Real;
use na::{Point3, Vector3};

/// Gradients shorter than this are considered degenerate.
pub const DEGENERATE_GRADIENT: Real = 1.0e-6;

/// A scalar field whose zero level set is a surface.
///
/// Negative values are inside the surface, positive values outside.
pub trait ImplicitField: Sync {
    /// Evaluates the field at `pt`.
    fn eval(&self, pt: &Point3<Real>) -> Real;

    /// Central-difference estimate of the field gradient at `pt`, with the given step.
    fn eval_gradient(&self, pt: &Point3<Real>, step: Real) -> Vector3<Real> {
        let mut result = Vector3::zeros();

        for i in 0..3 {
            let mut shift = Vector3::zeros();
            shift[i] = step;
            result[i] = (self.eval(&(pt + shift)) - self.eval(&(pt - shift))) / (2.0 * step);
        }

        result
    }

    /// The unit normal at `pt`, pointing towards increasing field values.
    ///
    /// Falls back to `+z` where the gradient vanishes.
    fn eval_normal(&self, pt: &Point3<Real>, step: Real) -> Vector3<Real> {
        self.eval_gradient(pt, step)
            .try_normalize(DEGENERATE_GRADIENT)
            .unwrap_or_else(Vector3::z)
    }
}

impl<F> ImplicitField for F
where
    F: Fn(&Point3<Real>) -> Real + Sync,
{
    fn eval(&self, pt: &Point3<Real>) -> Real {
        self(pt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn gradient_of_quadratic_field() {
        let field = |p: &Point3<Real>| p.coords.norm_squared() - 1.0;
        let pt = Point3::new(0.3, -0.2, 0.5);

        // Central differences are exact for quadratics.
        assert_relative_eq!(
            field.eval_gradient(&pt, 0.01),
            pt.coords * 2.0,
            epsilon = 1.0e-9
        );
        assert_relative_eq!(
            field.eval_normal(&pt, 0.01),
            pt.coords.normalize(),
            epsilon = 1.0e-9
        );
    }

    #[test]
    fn normal_points_outward() {
        let field = |p: &Point3<Real>| p.coords.norm() - 0.5;
        let normal = field.eval_normal(&Point3::new(0.0, -0.5, 0.0), 0.01);
        assert_relative_eq!(normal, -Vector3::y(), epsilon = 1.0e-9);
    }

    #[test]
    fn flat_field_uses_fallback_normal() {
        let field = |_: &Point3<Real>| 0.0;
        assert_eq!(field.eval_normal(&Point3::origin(), 0.01), Vector3::z());
    }
}
