/*!
Implicit surface reconstruction from oriented point clouds.

Each oriented sample produces three scalar constraints (on the surface, and offset outward and
inward along its normal). A biharmonic radial basis function `φ(r) = r` augmented with an affine
polynomial interpolates these constraints, and the zero level set of the resulting field is
extracted as a triangle soup with a marching-cubes sweep.
*/

#![allow(clippy::type_complexity, clippy::too_many_arguments)]
#![warn(missing_docs)]

/// Floating-point type used by this library.
pub type Real = f64;

extern crate nalgebra as na;
extern crate parry3d_f64 as parry;

pub use self::cache::{CacheError, WeightCache};
pub use self::constraints::{ConstraintKind, ConstraintSet};
pub use self::error::{ReconstructionError, Result};
pub use self::field::ImplicitField;
pub use self::marching_cubes::{Isosurface, MarchingCubes, SurfaceMesh};
pub use self::point_buffer::PointBuffer;
pub use self::point_cloud::OrientedPointCloud;
pub use self::surface::{RbfConfig, RbfSurface};

pub mod cache;
mod constraints;
mod error;
mod field;
mod grid;
pub mod io;
pub mod marching_cubes;
mod point_buffer;
mod point_cloud;
pub mod solver;
mod surface;
mod tables;
