//! 7z backend over `sevenz-rust`.
//!
//! Every stream request re-opens the container and decodes only the block that
//! holds the entry, up to and including it. Earlier entries of a solid block are
//! drained to a sink; the entry itself is spooled to an anonymous temp file, so
//! memory stays flat whatever the entry size.

use super::{ArchiveCodec, ContainerReader, ContainerWriter, EntrySource, LazyFile};
use crate::common::{ArchiveSpec, CompressionLevel, EntryInfo, FormatSettings, SevenZipMethod};
use crate::error::{ArchiveError, Result};
use crate::fsx;
use chrono::NaiveDateTime;
use sevenz_rust::lzma::LZMA2Options;
use sevenz_rust::{
    AesEncoderOptions, MethodOptions, Password, SevenZArchiveEntry, SevenZMethod,
    SevenZMethodConfiguration, SevenZReader, SevenZWriter, SourceReader,
};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, trace};

/// Coder id of 7zAES (AES-256 + SHA-256 key derivation).
const AES_CODER_ID: [u8; 4] = [0x06, 0xF1, 0x07, 0x01];

#[derive(Debug, Default, Clone, Copy)]
pub struct SevenZipCodec;

impl ArchiveCodec for SevenZipCodec {
    fn open_for_read(
        &self,
        path: &Path,
        password: Option<&str>,
    ) -> Result<Box<dyn ContainerReader>> {
        Ok(Box::new(SevenZipContainer::open(path, password)?))
    }

    fn open_for_write(&self, path: &Path, spec: &ArchiveSpec) -> Result<Box<dyn ContainerWriter>> {
        super::check_supported(spec)?;
        Ok(Box::new(SevenZipContainerWriter::create(path, spec)?))
    }
}

fn map_7z_error(err: sevenz_rust::Error, path: &Path) -> ArchiveError {
    match err {
        sevenz_rust::Error::PasswordRequired | sevenz_rust::Error::MaybeBadPassword(_) => {
            ArchiveError::Password {
                path: path.to_path_buf(),
            }
        }
        other => ArchiveError::corrupt(path, other),
    }
}

fn password_of(password: Option<&str>) -> Password {
    password.map(Password::from).unwrap_or_else(Password::empty)
}

fn open_reader(path: &Path, password: Option<&str>) -> Result<SevenZReader<BufReader<File>>> {
    let file = File::open(path).map_err(|e| ArchiveError::io(e, path))?;
    let len = file
        .metadata()
        .map_err(|e| ArchiveError::io(e, path))?
        .len();
    SevenZReader::new(BufReader::new(file), len, password_of(password))
        .map_err(|e| map_7z_error(e, path))
}

fn modified_of(entry: &SevenZArchiveEntry) -> Option<NaiveDateTime> {
    if !entry.has_last_modified_date {
        return None;
    }
    SystemTime::try_from(entry.last_modified_date)
        .ok()
        .map(fsx::local_timestamp)
}

pub struct SevenZipContainer {
    path: PathBuf,
    password: Option<String>,
    entries: Vec<EntryInfo>,
    /// Block holding each entry's data; `None` for directories and empty files.
    folder_of: Vec<Option<usize>>,
    /// Entry indices in the order the decoder visits them.
    visit_order: Vec<usize>,
}

impl SevenZipContainer {
    pub fn open(path: &Path, password: Option<&str>) -> Result<Self> {
        let password = password.filter(|p| !p.is_empty());
        let reader = open_reader(path, password)?;
        let archive = reader.archive();

        let encrypted_folders: Vec<bool> = archive
            .folders
            .iter()
            .map(|folder| {
                folder
                    .coders
                    .iter()
                    .any(|c| c.decompression_method_id() == AES_CODER_ID)
            })
            .collect();

        let folder_of: Vec<Option<usize>> = (0..archive.files.len())
            .map(|i| archive.stream_map.file_folder_index.get(i).copied().flatten())
            .collect();

        let entries = archive
            .files
            .iter()
            .zip(&folder_of)
            .map(|(f, folder)| EntryInfo {
                key: f.name().to_string(),
                is_dir: f.is_directory(),
                size: f.size(),
                compressed_size: 0,
                last_modified: modified_of(f),
                is_encrypted: folder
                    .and_then(|folder| encrypted_folders.get(folder).copied())
                    .unwrap_or(false),
            })
            .collect();

        // Blocks are walked first, in entry order, then the stream-less entries.
        let (mut visit_order, streamless): (Vec<usize>, Vec<usize>) =
            (0..folder_of.len()).partition(|&i| folder_of[i].is_some());
        visit_order.extend(streamless);

        Ok(Self {
            path: path.to_path_buf(),
            password: password.map(String::from),
            entries,
            folder_of,
            visit_order,
        })
    }

    /// Decodes entry `index` into an anonymous temp file, rewound for reading.
    fn spool(&self, index: usize) -> Result<File> {
        let target_folder = self.folder_of[index];
        let target_key = self.entries[index].key.as_str();
        let encrypted = self.entries[index].is_encrypted;
        let mut reader = open_reader(&self.path, self.password.as_deref())?;
        let mut spool = tempfile::tempfile().map_err(|e| ArchiveError::io(e, &self.path))?;

        let mut visited = 0usize;
        let mut found = false;
        let mut failure: Option<io::Error> = None;
        let outcome = reader.for_each_entries(|entry, data| {
            let slot = self
                .visit_order
                .get(visited)
                .copied()
                .filter(|&i| self.entries[i].key == entry.name());
            visited += 1;

            let is_target = match slot {
                Some(i) => i == index,
                None => entry.name() == target_key,
            };
            if is_target {
                found = true;
                if let Err(e) = io::copy(data, &mut spool) {
                    failure = Some(e);
                }
                return Ok(false);
            }
            if slot.map_or(true, |i| self.folder_of[i] == target_folder) {
                if let Err(e) = io::copy(data, &mut io::sink()) {
                    debug!(entry = entry.name(), error = %e, "skipped 7z entry failed to decode");
                }
            }
            Ok(true)
        });

        let wrong_key = || ArchiveError::Password {
            path: self.path.clone(),
        };
        match (found, outcome) {
            (false, Err(_)) if encrypted => return Err(wrong_key()),
            (false, Err(e)) => return Err(map_7z_error(e, &self.path)),
            (false, Ok(())) => {
                return Err(ArchiveError::corrupt(
                    &self.path,
                    format!("'{target_key}' not reached while decoding"),
                ))
            }
            (true, _) => {}
        }
        if let Some(e) = failure {
            debug!(entry = target_key, error = %e, "7z entry failed to decode");
            // A wrong key surfaces as garbage the decompressor rejects.
            return Err(if encrypted {
                wrong_key()
            } else {
                ArchiveError::corrupt(&self.path, format!("'{target_key}': {e}"))
            });
        }
        spool
            .seek(SeekFrom::Start(0))
            .map_err(|e| ArchiveError::io(e, &self.path))?;
        Ok(spool)
    }
}

impl ContainerReader for SevenZipContainer {
    fn entries(&self) -> &[EntryInfo] {
        &self.entries
    }

    fn open_stream(&mut self, index: usize) -> Result<Box<dyn Read + '_>> {
        let info = self
            .entries
            .get(index)
            .ok_or_else(|| ArchiveError::corrupt(&self.path, format!("no entry at index {index}")))?;
        if info.is_encrypted && self.password.is_none() {
            return Err(ArchiveError::Password {
                path: self.path.clone(),
            });
        }
        if self.folder_of[index].is_none() || info.size == 0 {
            return Ok(Box::new(io::empty()));
        }
        Ok(Box::new(BufReader::new(self.spool(index)?)))
    }
}

/// Maps the shared level scale onto LZMA presets; level None is preset 0.
fn preset_for(level: CompressionLevel) -> u32 {
    match level {
        CompressionLevel::None => 0,
        CompressionLevel::Fastest => 1,
        CompressionLevel::Fast => 3,
        CompressionLevel::Normal => 5,
        CompressionLevel::Maximum => 7,
        CompressionLevel::Ultra => 9,
    }
}

fn content_methods(spec: &ArchiveSpec, method: SevenZipMethod) -> Vec<SevenZMethodConfiguration> {
    let mut methods: Vec<SevenZMethodConfiguration> = Vec::with_capacity(2);
    if let Some(pw) = spec.effective_password() {
        methods.push(AesEncoderOptions::new(Password::from(pw)).into());
    }
    let preset = preset_for(spec.level);
    let compression = match method {
        SevenZipMethod::Lzma => SevenZMethodConfiguration::new(SevenZMethod::LZMA)
            .with_options(MethodOptions::LZMA2(LZMA2Options::with_preset(preset))),
        _ => LZMA2Options::with_preset(preset).into(),
    };
    methods.push(compression);
    methods
}

pub struct SevenZipContainerWriter {
    path: PathBuf,
    writer: SevenZWriter<File>,
    solid: bool,
    pending: Vec<(SevenZArchiveEntry, SourceReader<Box<dyn Read>>)>,
}

impl SevenZipContainerWriter {
    pub fn create(path: &Path, spec: &ArchiveSpec) -> Result<Self> {
        let settings = match spec.format {
            FormatSettings::SevenZip(s) => s,
            FormatSettings::Zip(_) => {
                return Err(ArchiveError::Validation(
                    "7z writer given ZIP settings".into(),
                ))
            }
        };
        let file = fsx::create_exclusive(path)?;
        let mut writer = SevenZWriter::new(file)
            .map_err(|e| ArchiveError::io(io::Error::other(e.to_string()), path))?;
        writer.set_content_methods(content_methods(spec, settings.method));
        writer.set_encrypt_header(settings.encrypt_headers && spec.effective_password().is_some());
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            solid: settings.solid,
            pending: Vec::new(),
        })
    }

    fn backend_error(&self, err: sevenz_rust::Error) -> ArchiveError {
        ArchiveError::io(io::Error::other(err.to_string()), &self.path)
    }
}

fn stamp(entry: &mut SevenZArchiveEntry, modified: Option<NaiveDateTime>) {
    let Some(time) = modified.and_then(fsx::system_time) else {
        return;
    };
    if let Ok(time) = time.try_into() {
        entry.last_modified_date = time;
        entry.has_last_modified_date = true;
    }
}

fn file_entry(path: &Path, name: &str, modified: Option<NaiveDateTime>) -> SevenZArchiveEntry {
    let mut entry = SevenZArchiveEntry::from_path(path, name.to_string());
    stamp(&mut entry, modified);
    entry
}

fn stream_entry(name: &str, modified: Option<NaiveDateTime>) -> SevenZArchiveEntry {
    let mut entry = SevenZArchiveEntry::new();
    entry.name = name.to_string();
    entry.has_stream = true;
    stamp(&mut entry, modified);
    entry
}

impl ContainerWriter for SevenZipContainerWriter {
    fn write(
        &mut self,
        name: &str,
        source: EntrySource<'_>,
        modified: Option<NaiveDateTime>,
    ) -> Result<()> {
        if self.solid {
            let pending: (SevenZArchiveEntry, Box<dyn Read>) = match source {
                EntrySource::File(p) => {
                    if !p.is_file() {
                        return Err(ArchiveError::io(
                            io::Error::from(io::ErrorKind::NotFound),
                            p,
                        ));
                    }
                    (file_entry(p, name, modified), Box::new(LazyFile::new(p)))
                }
                EntrySource::Stream(r) => {
                    let mut spool =
                        tempfile::tempfile().map_err(|e| ArchiveError::io(e, &self.path))?;
                    io::copy(r, &mut spool)
                        .and_then(|_| spool.seek(SeekFrom::Start(0)))
                        .map_err(|e| ArchiveError::io(e, &self.path))?;
                    (stream_entry(name, modified), Box::new(BufReader::new(spool)))
                }
            };
            self.pending.push((pending.0, SourceReader::new(pending.1)));
            trace!(entry = name, "queued for solid block");
            return Ok(());
        }

        let pushed = match source {
            EntrySource::File(p) => {
                let file = File::open(p).map_err(|e| ArchiveError::io(e, p))?;
                self.writer
                    .push_archive_entry(file_entry(p, name, modified), Some(BufReader::new(file)))
            }
            EntrySource::Stream(r) => self
                .writer
                .push_archive_entry(stream_entry(name, modified), Some(r)),
        };
        if let Err(e) = pushed {
            return Err(self.backend_error(e));
        }
        trace!(entry = name, "stored 7z entry");
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let mut this = *self;
        if !this.pending.is_empty() {
            let (entries, readers): (Vec<_>, Vec<_>) = std::mem::take(&mut this.pending)
                .into_iter()
                .unzip();
            if let Err(e) = this.writer.push_archive_entries(entries, readers.into()) {
                return Err(this.backend_error(e));
            }
        }
        let SevenZipContainerWriter { path, writer, .. } = this;
        writer
            .finish()
            .map(|_| ())
            .map_err(|e| ArchiveError::io(io::Error::other(e.to_string()), &path))
    }
}
