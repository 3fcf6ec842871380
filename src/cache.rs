//! Binary cache of solved weight vectors.
//!
//! One file per down-sampling stride. Layout, big-endian:
//!
//! ```text
//! i32 rows | i32 cols | rows * cols f64, row-major
//! ```
//!
//! with `rows = constraint count + 4` and `cols = 1`.

use crate::constraints::ConstraintSet;
use crate::error::Result;
use crate::solver;
use crate::Real;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use na::DVector;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Reasons a cache file cannot be used.
///
/// None of them is fatal for a reconstruction: they all mean "recompute".
#[derive(Debug, Error)]
pub enum CacheError {
    /// The file is missing, unreadable or truncated.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored row count does not match the current constraint set.
    #[error("cached weights have {found} rows, expected {expected}")]
    DimensionMismatch {
        /// Expected number of rows.
        expected: usize,
        /// Row count found in the file.
        found: i64,
    },

    /// Weight vectors are stored as a single column.
    #[error("cached weights have {0} columns, expected 1")]
    InvalidColumns(i32),

    /// The weight vector is too long for the file header.
    #[error("{0} rows do not fit in the cache header")]
    Oversized(usize),
}

/// Writes `weights` to `writer` in the cache layout.
pub fn write_weights<W: Write>(
    writer: &mut W,
    weights: &DVector<Real>,
) -> std::result::Result<(), CacheError> {
    let rows = i32::try_from(weights.len()).map_err(|_| CacheError::Oversized(weights.len()))?;
    writer.write_i32::<BigEndian>(rows)?;
    writer.write_i32::<BigEndian>(1)?;

    for w in weights.iter() {
        writer.write_f64::<BigEndian>(*w)?;
    }

    Ok(())
}

/// Reads a weight vector from `reader`, rejecting it unless it has exactly `expected_rows` rows.
pub fn read_weights<R: Read>(
    reader: &mut R,
    expected_rows: usize,
) -> std::result::Result<DVector<Real>, CacheError> {
    let rows = reader.read_i32::<BigEndian>()?;
    let cols = reader.read_i32::<BigEndian>()?;

    if usize::try_from(rows).ok() != Some(expected_rows) {
        return Err(CacheError::DimensionMismatch {
            expected: expected_rows,
            found: rows as i64,
        });
    }

    if cols != 1 {
        return Err(CacheError::InvalidColumns(cols));
    }

    let mut weights = DVector::zeros(expected_rows);
    reader.read_f64_into::<BigEndian>(weights.as_mut_slice())?;
    Ok(weights)
}

/// Saves `weights` to the file at `path`.
pub fn save_weights(
    path: impl AsRef<Path>,
    weights: &DVector<Real>,
) -> std::result::Result<(), CacheError> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_weights(&mut writer, weights)?;
    writer.flush()?;
    Ok(())
}

/// Loads the weights stored at `path`.
pub fn load_weights(
    path: impl AsRef<Path>,
    expected_rows: usize,
) -> std::result::Result<DVector<Real>, CacheError> {
    let mut reader = BufReader::new(File::open(path)?);
    read_weights(&mut reader, expected_rows)
}

/// A directory of cached weight vectors, one file per down-sampling stride.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde-serialize",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct WeightCache {
    dir: PathBuf,
}

impl WeightCache {
    /// A cache storing its files in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory holding the cache files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The cache file used for the given down-sampling stride.
    pub fn path_for_stride(&self, stride: usize) -> PathBuf {
        self.dir.join(format!("rbf_weights_stride_{stride}.bin"))
    }

    /// Loads the weights cached for `stride`.
    pub fn load(
        &self,
        stride: usize,
        expected_rows: usize,
    ) -> std::result::Result<DVector<Real>, CacheError> {
        load_weights(self.path_for_stride(stride), expected_rows)
    }

    /// Caches `weights` for `stride`.
    pub fn store(
        &self,
        stride: usize,
        weights: &DVector<Real>,
    ) -> std::result::Result<(), CacheError> {
        std::fs::create_dir_all(&self.dir)?;
        save_weights(self.path_for_stride(stride), weights)
    }

    /// Returns the cached weights for `constraints` if they are usable, otherwise solves the
    /// system and refreshes the cache.
    ///
    /// Cache failures are logged and never abort the reconstruction; solver failures do.
    pub fn load_or_solve(
        &self,
        stride: usize,
        constraints: &ConstraintSet,
    ) -> Result<DVector<Real>> {
        let expected_rows = constraints.len() + solver::POLYNOMIAL_TERMS;

        match self.load(stride, expected_rows) {
            Ok(weights) => {
                log::debug!(
                    "Loaded {} cached weights from {}.",
                    weights.len(),
                    self.path_for_stride(stride).display()
                );
                return Ok(weights);
            }
            Err(CacheError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No cached weights for stride {stride}.");
            }
            Err(e) => log::warn!("Ignoring weight cache for stride {stride}: {e}"),
        }

        let weights = solver::solve_weights(constraints)?;

        if let Err(e) = self.store(stride, &weights) {
            log::warn!("Failed to cache weights for stride {stride}: {e}");
        }

        Ok(weights)
    }
}
