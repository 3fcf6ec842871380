use thiserror::Error;

/// Errors that can abort a reconstruction.
#[derive(Debug, Error)]
pub enum ReconstructionError {
    /// The input cloud has no points.
    #[error("the point cloud is empty")]
    EmptyPointCloud,

    /// Positions and normals are not index-aligned.
    #[error("expected one normal per point, got {positions} positions and {normals} normals")]
    MismatchedNormals {
        /// Number of positions.
        positions: usize,
        /// Number of normals.
        normals: usize,
    },

    /// A configuration parameter is out of its valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Checked access outside of a point buffer.
    #[error("point buffer access ({index}, {component}) out of range for {len} points")]
    IndexOutOfRange {
        /// Requested point index.
        index: usize,
        /// Requested component.
        component: usize,
        /// Number of points in the buffer.
        len: usize,
    },

    /// The interpolation system could not be solved reliably.
    #[error("the {size}x{size} interpolation system is singular or ill-conditioned")]
    SingularSystem {
        /// Dimension of the square system.
        size: usize,
    },

    /// I/O failure while reading input.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed point cloud text.
    #[error("parse error on line {line}: {message}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// What went wrong.
        message: String,
    },
}

/// Result type alias for reconstruction operations.
pub type Result<T> = std::result::Result<T, ReconstructionError>;
