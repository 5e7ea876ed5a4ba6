//! # Operation facade
//!
//! [`Archiver`] is the surface a shell (CLI, GUI) talks to: one method per
//! logical operation, every argument explicit. It owns the codec and the
//! runtime [`Settings`] and is cheap to clone into a worker.

use crate::codec::{ArchiveCodec, AutoCodec};
use crate::common::{
    ArchiveFormat, ArchiveSpec, CompressionLevel, EntryInfo, RepairReport, SevenZipMethod,
    SevenZipSettings, TestReport, ZipCipher, ZipSettings,
};
use crate::config::Settings;
use crate::error::{ArchiveError, Result};
use crate::extract::ExtractSummary;
use crate::paths::SourceSelection;
use crate::{archive, extract, integrity, repair, walk};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Options of a ZIP creation request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZipRequest {
    pub level: CompressionLevel,
    pub password: Option<String>,
    pub cipher: ZipCipher,
    pub encrypt_headers: bool,
    pub volume_size: Option<u64>,
    pub sfx: bool,
}

impl ZipRequest {
    pub fn to_spec(&self) -> ArchiveSpec {
        ArchiveSpec {
            level: self.level,
            password: self.password.clone(),
            volume_size: self.volume_size,
            sfx: self.sfx,
            ..ArchiveSpec::zip(ZipSettings {
                cipher: self.cipher,
                encrypt_headers: self.encrypt_headers,
            })
        }
    }
}

/// Options of a 7z creation request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SevenZipRequest {
    pub level: CompressionLevel,
    pub solid: bool,
    pub method: SevenZipMethod,
    pub password: Option<String>,
    pub encrypt_headers: bool,
    pub volume_size: Option<u64>,
    pub sfx: bool,
}

impl SevenZipRequest {
    pub fn to_spec(&self) -> ArchiveSpec {
        ArchiveSpec {
            level: self.level,
            password: self.password.clone(),
            volume_size: self.volume_size,
            sfx: self.sfx,
            ..ArchiveSpec::seven_zip(SevenZipSettings {
                method: self.method,
                solid: self.solid,
                encrypt_headers: self.encrypt_headers,
            })
        }
    }
}

#[derive(Clone)]
pub struct Archiver {
    codec: Arc<dyn ArchiveCodec>,
    settings: Settings,
}

impl Archiver {
    /// Production archiver backed by [`AutoCodec`].
    pub fn new(settings: Settings) -> Self {
        Self::with_codec(Arc::new(AutoCodec), settings)
    }

    pub fn with_codec(codec: Arc<dyn ArchiveCodec>, settings: Settings) -> Self {
        Self { codec, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Resolves `paths`, walks directories and writes the container described by `spec`.
    pub fn create<P: AsRef<Path>>(
        &self,
        paths: &[P],
        output: &Path,
        spec: &ArchiveSpec,
    ) -> Result<PathBuf> {
        let selection = SourceSelection::new(paths.iter().map(|p| p.as_ref().to_path_buf()))?;
        if output.as_os_str().is_empty() {
            return Err(ArchiveError::Validation("no output path given".into()));
        }
        crate::codec::check_supported(spec)?;
        let entries = walk::collect_entries(&selection)?;
        info!(
            sources = selection.len(),
            entries = entries.len(),
            format = spec.kind().extension(),
            "creating archive"
        );
        archive::create(&entries, spec, output, self.codec.as_ref(), &self.settings)
    }

    pub fn create_zip<P: AsRef<Path>>(
        &self,
        paths: &[P],
        output: &Path,
        request: &ZipRequest,
    ) -> Result<PathBuf> {
        self.create(paths, output, &request.to_spec())
    }

    pub fn create_7z<P: AsRef<Path>>(
        &self,
        paths: &[P],
        output: &Path,
        request: &SevenZipRequest,
    ) -> Result<PathBuf> {
        self.create(paths, output, &request.to_spec())
    }

    pub fn extract(
        &self,
        archive: &Path,
        destination: &Path,
        password: Option<&str>,
        only: &[String],
    ) -> Result<ExtractSummary> {
        extract::extract(archive, destination, password, only, self.codec.as_ref())
    }

    /// Entries sorted by key.
    pub fn list(&self, archive: &Path, password: Option<&str>) -> Result<Vec<EntryInfo>> {
        extract::list(archive, password, self.codec.as_ref())
    }

    pub fn test(&self, archive: &Path, password: Option<&str>) -> TestReport {
        integrity::test(archive, password, self.codec.as_ref())
    }

    pub fn repair(&self, archive: &Path, output: &Path) -> Result<RepairReport> {
        repair::repair(archive, output, self.codec.as_ref())
    }
}

impl Default for Archiver {
    fn default() -> Self {
        Self::new(Settings::from_env())
    }
}

impl std::fmt::Debug for Archiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archiver")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Output path for a one-click compress of `paths`.
///
/// Named after the single selected item, else after the items' shared parent,
/// else `Archive`; placed next to the first item.
pub fn quick_output_path<P: AsRef<Path>>(paths: &[P], format: ArchiveFormat) -> Result<PathBuf> {
    let first: &Path = paths
        .first()
        .map(|p| p.as_ref())
        .ok_or_else(|| ArchiveError::Validation("no files or folders selected".into()))?;
    let dir = first.parent().map(Path::to_path_buf).unwrap_or_default();

    let stem = if paths.len() == 1 {
        let name = if first.is_dir() {
            first.file_name()
        } else {
            first.file_stem()
        };
        name.map(|s| s.to_string_lossy().into_owned())
    } else {
        let parent = first.parent();
        let shared = paths.iter().all(|p| p.as_ref().parent() == parent);
        parent
            .filter(|_| shared)
            .and_then(Path::file_name)
            .map(|s| s.to_string_lossy().into_owned())
    };
    let stem = stem
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Archive".to_string());
    Ok(dir.join(format!("{stem}.{}", format.extension())))
}

/// `<dir>/<stem>` for extract-to-subdirectory.
pub fn subdir_destination(archive: &Path) -> Result<PathBuf> {
    let stem = archive
        .file_stem()
        .ok_or_else(|| ArchiveError::Validation(format!("'{}' has no file name", archive.display())))?;
    Ok(archive
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
        .join(stem))
}

/// Directory that holds `archive`, for extract-here.
pub fn here_destination(archive: &Path) -> PathBuf {
    match archive.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
