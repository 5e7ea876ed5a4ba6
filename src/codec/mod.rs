//! # Archive Codec boundary
//!
//! Everything above this module is format-agnostic: the writer, extractor, tester
//! and salvager only see [`ArchiveCodec`], [`ContainerReader`] and
//! [`ContainerWriter`]. The byte-level ZIP and 7z work is delegated to
//! [`zip`](self::zip) and [`sevenz`] which wrap the `zip` and `sevenz-rust` crates.
//!
//! [`AutoCodec`] is the production implementation: it sniffs the container
//! signature when reading and dispatches on [`ArchiveSpec::format`] when writing.

pub mod sevenz;
pub mod zip;

use crate::common::{ArchiveFormat, ArchiveSpec, EntryInfo, FormatSettings, SevenZipMethod};
use crate::error::{ArchiveError, Result};
use chrono::NaiveDateTime;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

pub use self::sevenz::SevenZipCodec;
pub use self::zip::ZipCodec;

/// Where the bytes of a new entry come from.
pub enum EntrySource<'a> {
    /// A file on disk, opened by the codec when the entry is written.
    File(&'a Path),
    /// An already open stream, e.g. an entry salvaged from another container.
    Stream(&'a mut dyn Read),
}

/// An opened container.
pub trait ContainerReader {
    /// Entries in container order.
    fn entries(&self) -> &[EntryInfo];

    /// Opens the data stream of the entry at `index`.
    ///
    /// Errors raised here or while reading the stream concern that entry only.
    fn open_stream(&mut self, index: usize) -> Result<Box<dyn Read + '_>>;
}

/// A container being written. Entries are stored in call order.
pub trait ContainerWriter {
    fn write(
        &mut self,
        name: &str,
        source: EntrySource<'_>,
        modified: Option<NaiveDateTime>,
    ) -> Result<()>;

    /// Flushes the central directory / header. Without this the output is not a valid container.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// The capability the core needs from a container library.
pub trait ArchiveCodec: Send + Sync {
    fn open_for_read(&self, path: &Path, password: Option<&str>)
        -> Result<Box<dyn ContainerReader>>;

    fn open_for_write(&self, path: &Path, spec: &ArchiveSpec) -> Result<Box<dyn ContainerWriter>>;
}

/// Rejects option combinations no backend can honour, before any file is touched.
pub fn check_supported(spec: &ArchiveSpec) -> Result<()> {
    if let Some(size) = spec.volume_size {
        return Err(ArchiveError::UnsupportedFeature(format!(
            "splitting into {size}-byte volumes"
        )));
    }
    match spec.format {
        FormatSettings::Zip(z) if z.encrypt_headers && spec.effective_password().is_some() => Err(
            ArchiveError::UnsupportedFeature("ZIP central-directory encryption".into()),
        ),
        FormatSettings::SevenZip(s) => match s.method {
            SevenZipMethod::Lzma2 | SevenZipMethod::Lzma => Ok(()),
            SevenZipMethod::Ppmd => Err(ArchiveError::UnsupportedFeature(
                "7z PPMd compression".into(),
            )),
            SevenZipMethod::Bzip2 => Err(ArchiveError::UnsupportedFeature(
                "7z BZip2 compression".into(),
            )),
        },
        _ => Ok(()),
    }
}

const ZIP_MAGIC: &[u8; 2] = b"PK";
const SEVEN_ZIP_MAGIC: &[u8; 6] = b"7z\xBC\xAF\x27\x1C";

/// Identifies a container by signature, then by extension.
///
/// Anything unrecognised is treated as ZIP, whose reader locates the central
/// directory from the end of the file and so also opens self-extracting images.
pub fn detect_format(path: &Path) -> Result<ArchiveFormat> {
    let mut head = [0u8; 6];
    let mut file = File::open(path).map_err(|e| ArchiveError::io(e, path))?;
    let mut filled = 0;
    while filled < head.len() {
        match file.read(&mut head[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ArchiveError::io(e, path)),
        }
    }
    let head = &head[..filled];
    if head.starts_with(SEVEN_ZIP_MAGIC) {
        return Ok(ArchiveFormat::SevenZip);
    }
    if head.starts_with(ZIP_MAGIC) {
        return Ok(ArchiveFormat::Zip);
    }
    Ok(ArchiveFormat::from_extension(path).unwrap_or(ArchiveFormat::Zip))
}

/// Format-polymorphic codec used by the public operations.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoCodec;

impl ArchiveCodec for AutoCodec {
    fn open_for_read(
        &self,
        path: &Path,
        password: Option<&str>,
    ) -> Result<Box<dyn ContainerReader>> {
        match detect_format(path)? {
            ArchiveFormat::Zip => ZipCodec.open_for_read(path, password),
            ArchiveFormat::SevenZip => SevenZipCodec.open_for_read(path, password),
        }
    }

    fn open_for_write(&self, path: &Path, spec: &ArchiveSpec) -> Result<Box<dyn ContainerWriter>> {
        match spec.kind() {
            ArchiveFormat::Zip => ZipCodec.open_for_write(path, spec),
            ArchiveFormat::SevenZip => SevenZipCodec.open_for_write(path, spec),
        }
    }
}

/// Opens a file lazily on first read so solid blocks don't hold every descriptor at once.
pub(crate) struct LazyFile {
    path: std::path::PathBuf,
    file: Option<File>,
}

impl LazyFile {
    pub(crate) fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            file: None,
        }
    }
}

impl Read for LazyFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.file.is_none() {
            self.file = Some(File::open(&self.path)?);
        }
        match self.file.as_mut() {
            Some(f) => f.read(buf),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{SevenZipSettings, ZipCipher, ZipSettings};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn volume_requests_fail_fast() {
        let mut spec = ArchiveSpec::default_for(ArchiveFormat::Zip);
        spec.volume_size = Some(1024);
        assert!(matches!(
            check_supported(&spec),
            Err(ArchiveError::UnsupportedFeature(_))
        ));
    }

    #[test]
    fn zip_header_encryption_only_matters_with_password() {
        let spec = ArchiveSpec::zip(ZipSettings {
            cipher: ZipCipher::Aes,
            encrypt_headers: true,
        });
        assert!(check_supported(&spec).is_ok());
        let spec = spec.with_password(Some("pw".into()));
        assert!(check_supported(&spec).is_err());
    }

    #[test]
    fn unavailable_7z_methods_are_reported() {
        let spec = ArchiveSpec::seven_zip(SevenZipSettings {
            method: SevenZipMethod::Ppmd,
            ..Default::default()
        });
        assert!(matches!(
            check_supported(&spec),
            Err(ArchiveError::UnsupportedFeature(_))
        ));
    }

    #[test]
    fn signature_wins_over_extension() {
        let dir = tempdir().unwrap();
        let fake = dir.path().join("really_7z.zip");
        fs::write(&fake, b"7z\xBC\xAF\x27\x1Crest").unwrap();
        assert_eq!(detect_format(&fake).unwrap(), ArchiveFormat::SevenZip);

        let unknown = dir.path().join("blob.7z");
        fs::write(&unknown, b"??").unwrap();
        assert_eq!(detect_format(&unknown).unwrap(), ArchiveFormat::SevenZip);

        let exe = dir.path().join("setup.exe");
        fs::write(&exe, b"MZ\x90\x00").unwrap();
        assert_eq!(detect_format(&exe).unwrap(), ArchiveFormat::Zip);
    }
}
