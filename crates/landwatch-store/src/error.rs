//! Store error type.

use std::path::{Path, PathBuf};

/// Errors from the project store and plot registries.
///
/// Analysis failures are not here: they are recorded on the project as
/// a `Failed` status with the error's display string.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A filesystem operation failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// The file or directory involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be read or written.
    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        /// The document involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// No project with this id exists.
    #[error("project {0} not found")]
    NotFound(String),

    /// Another analysis holds the project's lock.
    #[error("project {0} is locked by another analysis")]
    Locked(String),

    /// A required upload was not supplied.
    #[error("missing input: {0}")]
    MissingInput(&'static str),

    /// The plot registry could not be read or is malformed.
    #[error("plot registry: {0}")]
    Registry(String),

    /// An output raster could not be encoded.
    #[error("failed to encode {name}: {source}")]
    Encode {
        /// Output file name.
        name: &'static str,
        /// The underlying encoder error.
        #[source]
        source: image::ImageError,
    },
}

impl StoreError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn json(path: &Path) -> impl FnOnce(serde_json::Error) -> Self + '_ {
        move |source| Self::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}
