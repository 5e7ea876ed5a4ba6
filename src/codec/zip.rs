//! ZIP backend over the `zip` crate.

use super::{ArchiveCodec, ContainerReader, ContainerWriter, EntrySource};
use crate::common::{ArchiveSpec, CompressionLevel, EntryInfo, ZipCipher};
use crate::error::{ArchiveError, Result};
use crate::fsx;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use zip::result::ZipError;
use zip::unstable::write::FileOptionsExt;
use zip::write::SimpleFileOptions;
use zip::{AesMode, CompressionMethod, ZipArchive, ZipWriter};

const WRITE_BUFFER: usize = 1 << 20;

#[derive(Debug, Default, Clone, Copy)]
pub struct ZipCodec;

impl ArchiveCodec for ZipCodec {
    fn open_for_read(
        &self,
        path: &Path,
        password: Option<&str>,
    ) -> Result<Box<dyn ContainerReader>> {
        Ok(Box::new(ZipContainer::open(path, password)?))
    }

    fn open_for_write(&self, path: &Path, spec: &ArchiveSpec) -> Result<Box<dyn ContainerWriter>> {
        super::check_supported(spec)?;
        Ok(Box::new(ZipContainerWriter::create(path, spec)?))
    }
}

/// Maps a `zip` error to the crate's taxonomy.
fn map_zip_error(err: ZipError, path: &Path) -> ArchiveError {
    match err {
        ZipError::InvalidPassword => ArchiveError::Password {
            path: path.to_path_buf(),
        },
        ZipError::UnsupportedArchive(msg) if msg == ZipError::PASSWORD_REQUIRED => {
            ArchiveError::Password {
                path: path.to_path_buf(),
            }
        }
        ZipError::Io(e)
            if matches!(
                e.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
            ) =>
        {
            ArchiveError::io(e, path)
        }
        other => ArchiveError::corrupt(path, other),
    }
}

fn to_naive(dt: zip::DateTime) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(dt.year().into(), dt.month().into(), dt.day().into())?.and_hms_opt(
        dt.hour().into(),
        dt.minute().into(),
        dt.second().into(),
    )
}

fn to_zip_time(t: NaiveDateTime) -> Option<zip::DateTime> {
    let year = u16::try_from(t.year()).ok()?;
    zip::DateTime::from_date_and_time(
        year,
        t.month() as u8,
        t.day() as u8,
        t.hour() as u8,
        t.minute() as u8,
        t.second() as u8,
    )
    .ok()
}

/// `(method, deflate level)` for each point of the scale.
fn compression_for(level: CompressionLevel) -> (CompressionMethod, Option<i64>) {
    match level {
        CompressionLevel::None => (CompressionMethod::Stored, None),
        CompressionLevel::Fastest => (CompressionMethod::Deflated, Some(1)),
        CompressionLevel::Fast => (CompressionMethod::Deflated, Some(3)),
        CompressionLevel::Normal => (CompressionMethod::Deflated, Some(6)),
        CompressionLevel::Maximum => (CompressionMethod::Deflated, Some(8)),
        CompressionLevel::Ultra => (CompressionMethod::Deflated, Some(9)),
    }
}

pub struct ZipContainer {
    path: PathBuf,
    archive: ZipArchive<BufReader<File>>,
    entries: Vec<EntryInfo>,
    password: Option<String>,
}

impl ZipContainer {
    pub fn open(path: &Path, password: Option<&str>) -> Result<Self> {
        let file = File::open(path).map_err(|e| ArchiveError::io(e, path))?;
        let mut archive =
            ZipArchive::new(BufReader::new(file)).map_err(|e| map_zip_error(e, path))?;

        let names: Vec<String> = archive.file_names().map(String::from).collect();
        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let fallback = names.get(i).cloned().unwrap_or_default();
            let info = match archive.by_index_raw(i) {
                Ok(raw) => EntryInfo {
                    key: raw.name().to_string(),
                    is_dir: raw.is_dir(),
                    size: raw.size(),
                    compressed_size: raw.compressed_size(),
                    last_modified: raw.last_modified().and_then(to_naive),
                    is_encrypted: raw.encrypted(),
                },
                // Local header unreadable: keep the central-directory name so the
                // entry is still listed; opening its stream will fail.
                Err(e) => {
                    debug!(index = i, error = %e, "unreadable local header");
                    EntryInfo {
                        is_dir: fallback.ends_with('/'),
                        key: fallback,
                        size: 0,
                        compressed_size: 0,
                        last_modified: None,
                        is_encrypted: false,
                    }
                }
            };
            entries.push(info);
        }

        Ok(Self {
            path: path.to_path_buf(),
            archive,
            entries,
            password: password.filter(|p| !p.is_empty()).map(String::from),
        })
    }
}

impl ContainerReader for ZipContainer {
    fn entries(&self) -> &[EntryInfo] {
        &self.entries
    }

    fn open_stream(&mut self, index: usize) -> Result<Box<dyn Read + '_>> {
        let encrypted = self
            .entries
            .get(index)
            .map(|e| e.is_encrypted)
            .ok_or_else(|| ArchiveError::corrupt(&self.path, format!("no entry at index {index}")))?;

        let file = if encrypted {
            let Some(password) = self.password.as_deref() else {
                return Err(ArchiveError::Password {
                    path: self.path.clone(),
                });
            };
            self.archive.by_index_decrypt(index, password.as_bytes())
        } else {
            self.archive.by_index(index)
        };
        match file {
            Ok(f) => Ok(Box::new(f)),
            Err(e) => Err(map_zip_error(e, &self.path)),
        }
    }
}

pub struct ZipContainerWriter {
    path: PathBuf,
    writer: ZipWriter<BufWriter<File>>,
    level: CompressionLevel,
    cipher: ZipCipher,
    password: Option<String>,
}

impl ZipContainerWriter {
    pub fn create(path: &Path, spec: &ArchiveSpec) -> Result<Self> {
        let file = fsx::create_exclusive(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: ZipWriter::new(BufWriter::with_capacity(WRITE_BUFFER, file)),
            level: spec.level,
            cipher: spec.effective_zip_cipher(),
            password: spec.effective_password().map(String::from),
        })
    }

    fn options(&self, modified: Option<NaiveDateTime>, large: bool) -> SimpleFileOptions {
        let (method, level) = compression_for(self.level);
        let mut options = SimpleFileOptions::default()
            .compression_method(method)
            .compression_level(level)
            .large_file(large);
        if let Some(time) = modified.and_then(to_zip_time) {
            options = options.last_modified_time(time);
        }
        options
    }
}

impl ContainerWriter for ZipContainerWriter {
    fn write(
        &mut self,
        name: &str,
        source: EntrySource<'_>,
        modified: Option<NaiveDateTime>,
    ) -> Result<()> {
        let (mut reader, origin, large): (Box<dyn Read + '_>, PathBuf, bool) = match source {
            EntrySource::File(p) => {
                let f = File::open(p).map_err(|e| ArchiveError::io(e, p))?;
                let len = f.metadata().map(|m| m.len()).unwrap_or(0);
                (Box::new(f), p.to_path_buf(), len >= u32::MAX as u64)
            }
            EntrySource::Stream(r) => (Box::new(r), self.path.clone(), false),
        };

        let options = self.options(modified, large);
        let started = match (self.cipher, self.password.as_deref()) {
            (ZipCipher::Aes, Some(pw)) => self
                .writer
                .start_file(name, options.with_aes_encryption(AesMode::Aes256, pw)),
            (ZipCipher::LegacyWeak, Some(pw)) => self
                .writer
                .start_file(name, FileOptionsExt::with_deprecated_encryption(options, pw.as_bytes())),
            _ => self.writer.start_file(name, options),
        };
        started.map_err(|e| map_zip_error(e, &self.path))?;

        let copied =
            io::copy(&mut reader, &mut self.writer).map_err(|e| ArchiveError::io(e, &origin))?;
        trace!(entry = name, bytes = copied, "stored zip entry");
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let ZipContainerWriter { path, writer, .. } = *self;
        let mut out = writer
            .finish()
            .map_err(|e| map_zip_error(e, &path))?;
        out.flush().map_err(|e| ArchiveError::io(e, &path))
    }
}
