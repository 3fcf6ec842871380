//! Loading and conditioning oriented point clouds.

use crate::error::{ReconstructionError, Result};
use crate::point_buffer::PointBuffer;
use crate::point_cloud::OrientedPointCloud;
use crate::Real;
use na::{Point3, Vector3};
use parry::bounding_volume::Aabb;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

/// Normals shorter than this are left untouched by [`normalize_normals`].
pub const ZERO_NORMAL_THRESHOLD: Real = 1.0e-12;

/// Reads an XYZ point cloud with normals from the file at `path`.
///
/// See [`read_xyz_from`] for the format.
pub fn read_xyz(path: impl AsRef<Path>) -> Result<OrientedPointCloud> {
    let file = File::open(path.as_ref())?;
    let cloud = read_xyz_from(BufReader::new(file))?;
    log::info!(
        "Read {} oriented points from {}.",
        cloud.len(),
        path.as_ref().display()
    );
    Ok(cloud)
}

/// Reads an XYZ point cloud with normals.
///
/// Each line holds `x y z nx ny nz`, whitespace-separated. Blank lines and lines with fewer than
/// six values are skipped; extra values are ignored.
pub fn read_xyz_from(reader: impl BufRead) -> Result<OrientedPointCloud> {
    let mut positions = PointBuffer::new();
    let mut normals = PointBuffer::new();
    let mut skipped = 0;

    for (line_id, line) in reader.lines().enumerate() {
        let line = line?;
        let tokens: Vec<_> = line.split_whitespace().collect();

        if tokens.is_empty() {
            continue;
        }

        if tokens.len() < 6 {
            skipped += 1;
            continue;
        }

        let mut values = [0.0; 6];
        for (value, token) in values.iter_mut().zip(tokens.iter()) {
            *value = Real::from_str(token).map_err(|e| ReconstructionError::Parse {
                line: line_id + 1,
                message: format!("invalid number {token:?}: {e}"),
            })?;
        }

        positions.push(values[0], values[1], values[2]);
        normals.push(values[3], values[4], values[5]);
    }

    if skipped > 0 {
        log::debug!("Skipped {} incomplete lines.", skipped);
    }

    OrientedPointCloud::new(positions, normals)
}

/// Centers the bounding box of `points` at the origin and scales it uniformly so its largest
/// span maps to `[-1, 1]`.
///
/// If all the points coincide, they are only translated. Returns the bounding box before the
/// transformation, or `None` if `points` is empty.
pub fn normalize_positions(points: &mut PointBuffer) -> Option<Aabb> {
    if points.is_empty() {
        return None;
    }

    let all_points: Vec<_> = points.iter().collect();
    let aabb = Aabb::from_points(&all_points);
    let center = aabb.center();
    let max_span = aabb.extents().max();
    let scale = if max_span > 0.0 { 2.0 / max_span } else { 1.0 };

    for (i, pt) in all_points.iter().enumerate() {
        points.set_point(i, &Point3::from((pt - center) * scale));
    }

    Some(aabb)
}

/// Rescales every vector of `normals` to unit length.
///
/// Vectors shorter than [`ZERO_NORMAL_THRESHOLD`] are kept as-is.
pub fn normalize_normals(normals: &mut PointBuffer) {
    for i in 0..normals.len() {
        let n: Vector3<Real> = normals.point(i).coords;

        if let Some(unit) = n.try_normalize(ZERO_NORMAL_THRESHOLD) {
            normals.set_point(i, &Point3::from(unit));
        }
    }
}

impl OrientedPointCloud {
    /// Normalizes the positions into `[-1, 1]³` with [`normalize_positions`] and the normals
    /// with [`normalize_normals`].
    pub fn normalize(&mut self) -> Option<Aabb> {
        let (positions, normals) = self.buffers_mut();
        normalize_normals(normals);
        normalize_positions(positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::{Cursor, Write};

    #[test]
    fn reads_xyz_lines() {
        let data = "\
            0 0 0 0 0 1\n\
            \n\
            1.5 -2 3e-1 1 0 0 extra\n\
            1 2 3\n\
            4 5 6 0 1 0\n";
        let cloud = read_xyz_from(Cursor::new(data)).unwrap();

        assert_eq!(cloud.len(), 3);
        assert_eq!(cloud.position(1), Point3::new(1.5, -2.0, 0.3));
        assert_eq!(cloud.normal(1), Vector3::x());
        assert_eq!(cloud.position(2), Point3::new(4.0, 5.0, 6.0));
        assert_eq!(cloud.normal(2), Vector3::y());
    }

    #[test]
    fn invalid_number_reports_its_line() {
        let data = "0 0 0 0 0 1\n0 0 zero 0 0 1\n";
        match read_xyz_from(Cursor::new(data)) {
            Err(ReconstructionError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn reads_xyz_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0.5 0.5 0.5 0 0 2").unwrap();
        writeln!(file, "-0.5 0.5 0.5 0 0 -2").unwrap();
        file.flush().unwrap();

        let cloud = read_xyz(file.path()).unwrap();
        assert_eq!(cloud.len(), 2);
        assert!(read_xyz(file.path().with_extension("missing")).is_err());
    }

    #[test]
    fn positions_fit_unit_box() {
        let mut points: PointBuffer = [
            Point3::new(2.0, 10.0, -1.0),
            Point3::new(6.0, 12.0, 0.0),
            Point3::new(4.0, 11.0, 1.0),
        ]
        .into_iter()
        .collect();

        let original = normalize_positions(&mut points).unwrap();
        assert_eq!(original.mins, Point3::new(2.0, 10.0, -1.0));

        // The x span (4) is the largest and maps to [-1, 1].
        assert_relative_eq!(points.point(0), Point3::new(-1.0, -0.5, -0.5));
        assert_relative_eq!(points.point(1), Point3::new(1.0, 0.5, 0.0));
        assert_relative_eq!(points.point(2), Point3::new(0.0, 0.0, 0.5));

        assert!(normalize_positions(&mut PointBuffer::new()).is_none());
    }

    #[test]
    fn coincident_positions_are_only_translated() {
        let mut points: PointBuffer = vec![Point3::new(3.0, 4.0, 5.0); 4].into_iter().collect();
        normalize_positions(&mut points);
        assert!(points.iter().all(|p| p == Point3::origin()));
    }

    #[test]
    fn normals_become_unit_except_zero() {
        let mut normals: PointBuffer = [
            Point3::new(0.0, 3.0, 4.0),
            Point3::origin(),
            Point3::new(-2.0, 0.0, 0.0),
        ]
        .into_iter()
        .collect();
        normalize_normals(&mut normals);

        assert_relative_eq!(normals.point(0), Point3::new(0.0, 0.6, 0.8));
        assert_eq!(normals.point(1), Point3::origin());
        assert_eq!(normals.point(2), Point3::new(-1.0, 0.0, 0.0));
    }
}
