use std::path::{Path, PathBuf};

/// The primary error type for all operations in the `unpack` crate.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The request was rejected before any I/O (empty selection, missing output path, ...).
    #[error("invalid request: {0}")]
    Validation(String),

    /// A selected source path does not exist.
    #[error("source path '{}' does not exist", .0.display())]
    MissingSource(PathBuf),

    /// The container is encrypted and the password is absent or wrong.
    #[error("password required or incorrect for '{}'", path.display())]
    Password { path: PathBuf },

    /// The container could not be parsed.
    #[error("archive '{}' is corrupt or not a supported format: {reason}", path.display())]
    CorruptArchive { path: PathBuf, reason: String },

    /// The self-extracting stub is missing. The plain container was kept at `preserved`.
    #[error(
        "SFX module not found at '{}'. Archive created without SFX at '{}'",
        module.display(),
        preserved.display()
    )]
    MissingSfxModule { module: PathBuf, preserved: PathBuf },

    /// Writing the self-extracting executable failed. The plain container may be at `preserved`.
    #[error(
        "failed to create SFX file '{}'. Archive may be available at '{}': {source}",
        output.display(),
        preserved.display()
    )]
    SfxComposition {
        output: PathBuf,
        preserved: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A requested option has no implementation behind it.
    #[error("{0} is not supported")]
    UnsupportedFeature(String),

    /// Two different source files would be stored under the same entry name.
    #[error(
        "entry name '{name}' is produced by both '{}' and '{}'",
        first.display(),
        second.display()
    )]
    EntryCollision {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// An entry key would escape the extraction directory.
    #[error("unsafe entry path '{0}' rejected")]
    UnsafeEntryPath(String),

    /// An I/O error occurred, typically while reading or writing a file.
    /// Includes the path where the error happened.
    #[error("I/O error on path '{}': {source}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// A background worker panicked or was cancelled.
    #[error("worker task failed: {0}")]
    Worker(String),

    /// Archive creation failed; the partially written destination has been removed.
    #[error("failed to create archive '{}': {source}", path.display())]
    Creation {
        path: PathBuf,
        #[source]
        source: Box<ArchiveError>,
    },
}

impl ArchiveError {
    pub(crate) fn io(source: std::io::Error, path: impl AsRef<Path>) -> Self {
        ArchiveError::Io {
            source,
            path: path.as_ref().to_path_buf(),
        }
    }

    pub(crate) fn corrupt(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        ArchiveError::CorruptArchive {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// True for password failures, including one wrapped by [`ArchiveError::Creation`].
    pub fn is_password(&self) -> bool {
        match self {
            ArchiveError::Password { .. } => true,
            ArchiveError::Creation { source, .. } => source.is_password(),
            _ => false,
        }
    }

    /// True for errors raised before any file was touched.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ArchiveError::Validation(_)
                | ArchiveError::MissingSource(_)
                | ArchiveError::EntryCollision { .. }
                | ArchiveError::UnsupportedFeature(_)
        )
    }
}

pub type Result<T, E = ArchiveError> = std::result::Result<T, E>;
