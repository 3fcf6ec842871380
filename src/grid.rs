//! A regular voxel lattice spanning an AABB.

use crate::field::ImplicitField;
use crate::Real;
use na::{Point3, Vector3};
use parry::bounding_volume::Aabb;
use rayon::prelude::*;

/// A regular grid of `rx × ry × rz` voxels, with `(rx + 1) × (ry + 1) × (rz + 1)` lattice
/// points.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VoxelGrid {
    origin: Point3<Real>,
    cell_widths: Vector3<Real>,
    resolution: [usize; 3],
}

impl VoxelGrid {
    /// Splits `aabb` into `resolution[i]` voxels along each axis `i`.
    pub fn new(aabb: &Aabb, resolution: [usize; 3]) -> Self {
        let extents = aabb.extents();
        let cell_widths = Vector3::new(
            extents.x / resolution[0] as Real,
            extents.y / resolution[1] as Real,
            extents.z / resolution[2] as Real,
        );

        Self {
            origin: aabb.mins,
            cell_widths,
            resolution,
        }
    }

    /// The width of a voxel along each axis.
    pub fn cell_widths(&self) -> &Vector3<Real> {
        &self.cell_widths
    }

    /// The length of a voxel diagonal.
    pub fn cell_diagonal(&self) -> Real {
        self.cell_widths().norm()
    }

    /// The world-space position of the lattice point `(i, j, k)`.
    #[inline]
    pub fn lattice_point(&self, i: usize, j: usize, k: usize) -> Point3<Real> {
        Point3::new(
            self.origin.x + i as Real * self.cell_widths.x,
            self.origin.y + j as Real * self.cell_widths.y,
            self.origin.z + k as Real * self.cell_widths.z,
        )
    }

    /// Number of lattice points in one slab of constant `i`.
    #[inline]
    pub fn slab_len(&self) -> usize {
        (self.resolution[1] + 1) * (self.resolution[2] + 1)
    }

    /// The index of the lattice point `(i, j, k)` in the arrays returned by [`Self::sample`].
    #[inline]
    pub fn lattice_index(&self, i: usize, j: usize, k: usize) -> usize {
        i * self.slab_len() + j * (self.resolution[2] + 1) + k
    }

    /// Evaluates `field` at every lattice point, in parallel over slabs of constant `i`.
    pub fn sample(&self, field: &impl ImplicitField) -> Vec<Real> {
        let mut values = vec![0.0; (self.resolution[0] + 1) * self.slab_len()];

        values
            .par_chunks_mut(self.slab_len())
            .enumerate()
            .for_each(|(i, slab)| {
                for j in 0..=self.resolution[1] {
                    for k in 0..=self.resolution[2] {
                        let pt = self.lattice_point(i, j, k);
                        slab[j * (self.resolution[2] + 1) + k] = field.eval(&pt);
                    }
                }
            });

        values
    }

    /// An iterator through the voxels of the slab `i`, `k` varying fastest.
    pub fn slab_cells(&self, i: usize) -> CellRangeIterator {
        CellRangeIterator::new(
            [i, 0, 0],
            [i, self.resolution[1] - 1, self.resolution[2] - 1],
        )
    }
}

/// Iterates through all the cells of an inclusive index range, the last axis varying fastest.
pub struct CellRangeIterator {
    start: [usize; 3],
    end: [usize; 3],
    curr: [usize; 3],
    done: bool,
}

impl CellRangeIterator {
    /// Iterates from `start` to `end`, both inclusive.
    pub fn new(start: [usize; 3], end: [usize; 3]) -> Self {
        Self {
            start,
            end,
            curr: start,
            done: (0..3).any(|i| start[i] > end[i]),
        }
    }
}

impl Iterator for CellRangeIterator {
    type Item = [usize; 3];

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.curr == self.end {
            self.done = true;
            Some(self.curr)
        } else {
            let result = self.curr;

            for i in (0..3).rev() {
                self.curr[i] += 1;

                if self.curr[i] > self.end[i] {
                    self.curr[i] = self.start[i];
                } else {
                    break;
                }
            }

            Some(result)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_range_order() {
        let cells: Vec<_> = CellRangeIterator::new([0, 0, 0], [0, 1, 2]).collect();
        assert_eq!(
            cells,
            vec![
                [0, 0, 0],
                [0, 0, 1],
                [0, 0, 2],
                [0, 1, 0],
                [0, 1, 1],
                [0, 1, 2]
            ]
        );
        assert_eq!(CellRangeIterator::new([1, 1, 1], [1, 1, 1]).count(), 1);
    }

    #[test]
    fn lattice_spans_the_aabb() {
        let aabb = Aabb::new(Point3::new(-1.0, 0.0, 2.0), Point3::new(1.0, 1.0, 4.0));
        let grid = VoxelGrid::new(&aabb, [4, 2, 8]);

        assert_eq!(grid.lattice_point(0, 0, 0), aabb.mins);
        assert_eq!(grid.lattice_point(4, 2, 8), aabb.maxs);
        assert_eq!(*grid.cell_widths(), Vector3::new(0.5, 0.5, 0.25));
        assert_eq!(grid.slab_cells(3).count(), 2 * 8);
    }

    #[test]
    fn sampling_matches_pointwise_evaluation() {
        let aabb = Aabb::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0));
        let grid = VoxelGrid::new(&aabb, [3, 4, 5]);
        let field = |p: &Point3<Real>| p.x + 10.0 * p.y + 100.0 * p.z;
        let values = grid.sample(&field);

        assert_eq!(values.len(), 4 * 5 * 6);

        for i in 0..=3 {
            for j in 0..=4 {
                for k in 0..=5 {
                    let pt = grid.lattice_point(i, j, k);
                    assert_eq!(values[grid.lattice_index(i, j, k)], field(&pt));
                }
            }
        }
    }
}
