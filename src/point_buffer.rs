use crate::error::{ReconstructionError, Result};
use crate::Real;
use na::Point3;

/// A growable, contiguous buffer of 3-component records.
///
/// Records are stored row-major as `[x0, y0, z0, x1, y1, z1, ...]`, so the backing storage
/// length is always a multiple of 3. The same type is used for positions and for normals.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(
    feature = "serde-serialize",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PointBuffer {
    data: Vec<Real>,
}

impl PointBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Creates an empty buffer with room for `capacity` points.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity * 3),
        }
    }

    /// Creates a buffer of `len` points, all at the origin.
    pub fn zeros(len: usize) -> Self {
        Self {
            data: vec![0.0; len * 3],
        }
    }

    /// Builds a buffer from a flat `[x, y, z, ...]` array.
    ///
    /// Fails if the array length is not a multiple of 3.
    pub fn from_flat(data: Vec<Real>) -> Result<Self> {
        if data.len() % 3 != 0 {
            return Err(ReconstructionError::InvalidConfig(format!(
                "flat point data length {} is not a multiple of 3",
                data.len()
            )));
        }

        Ok(Self { data })
    }

    /// The number of points stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / 3
    }

    /// Is this buffer empty?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The number of points this buffer can hold without reallocating.
    pub fn capacity(&self) -> usize {
        self.data.capacity() / 3
    }

    /// Reserves room for at least `additional` more points without changing the length.
    pub fn reserve(&mut self, additional: usize) {
        self.data.reserve(additional * 3);
    }

    /// Removes all points, keeping the allocated capacity.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Appends the point `(x, y, z)`.
    #[inline]
    pub fn push(&mut self, x: Real, y: Real, z: Real) {
        self.data.extend_from_slice(&[x, y, z]);
    }

    /// Appends `pt`.
    #[inline]
    pub fn push_point(&mut self, pt: &Point3<Real>) {
        self.push(pt.x, pt.y, pt.z);
    }

    /// Component `j` of point `i`.
    ///
    /// Only checked by debug assertions; use [`Self::try_get`] for a checked access.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> Real {
        debug_assert!(i < self.len() && j < 3, "point buffer index out of range");
        self.data[i * 3 + j]
    }

    /// Sets component `j` of point `i`.
    ///
    /// Only checked by debug assertions; use [`Self::try_set`] for a checked access.
    #[inline]
    pub fn set(&mut self, i: usize, j: usize, val: Real) {
        debug_assert!(i < self.len() && j < 3, "point buffer index out of range");
        self.data[i * 3 + j] = val;
    }

    /// Checked version of [`Self::get`].
    pub fn try_get(&self, i: usize, j: usize) -> Result<Real> {
        self.check_index(i, j)?;
        Ok(self.data[i * 3 + j])
    }

    /// Checked version of [`Self::set`].
    pub fn try_set(&mut self, i: usize, j: usize, val: Real) -> Result<()> {
        self.check_index(i, j)?;
        self.data[i * 3 + j] = val;
        Ok(())
    }

    fn check_index(&self, i: usize, j: usize) -> Result<()> {
        if i >= self.len() || j >= 3 {
            Err(ReconstructionError::IndexOutOfRange {
                index: i,
                component: j,
                len: self.len(),
            })
        } else {
            Ok(())
        }
    }

    /// The `i`-th point.
    #[inline]
    pub fn point(&self, i: usize) -> Point3<Real> {
        let s = &self.data[i * 3..i * 3 + 3];
        Point3::new(s[0], s[1], s[2])
    }

    /// Overwrites the `i`-th point.
    #[inline]
    pub fn set_point(&mut self, i: usize, pt: &Point3<Real>) {
        self.data[i * 3..i * 3 + 3].copy_from_slice(&[pt.x, pt.y, pt.z]);
    }

    /// Iterates through all the points of this buffer.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = Point3<Real>> + '_ {
        self.data
            .chunks_exact(3)
            .map(|c| Point3::new(c[0], c[1], c[2]))
    }

    /// The flat `[x, y, z, ...]` storage.
    pub fn as_slice(&self) -> &[Real] {
        &self.data
    }

    /// Mutable access to the flat storage.
    pub fn as_mut_slice(&mut self) -> &mut [Real] {
        &mut self.data
    }

    /// Converts to a flat single-precision array, ready for a GPU vertex buffer.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        self.data.iter().map(|v| *v as f32).collect()
    }
}

impl FromIterator<Point3<Real>> for PointBuffer {
    fn from_iter<I: IntoIterator<Item = Point3<Real>>>(iter: I) -> Self {
        let mut result = Self::new();
        result.extend(iter);
        result
    }
}

impl Extend<Point3<Real>> for PointBuffer {
    fn extend<I: IntoIterator<Item = Point3<Real>>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        self.reserve(iter.size_hint().0);

        for pt in iter {
            self.push_point(&pt);
        }
    }
}
