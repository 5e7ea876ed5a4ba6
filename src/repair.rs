//! Salvage of readable entries from a damaged container into a fresh one.
//!
//! Pass one opens the source once and keeps every non-directory, unencrypted
//! entry whose stream can be opened. Pass two reopens the source for each
//! candidate, spools its bytes to an anonymous temp file and appends it to the
//! destination. Anything that fails along the way is skipped, never fatal.

use crate::codec::{ArchiveCodec, ContainerReader, EntrySource};
use crate::common::{ArchiveFormat, ArchiveSpec, RepairReport};
use crate::error::{ArchiveError, Result};
use crate::fsx;
use std::io::{self, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, info, warn};

/// Copies every recoverable entry of `corrupted` into a new container at `destination`.
///
/// The destination format follows its extension (`.7z`, otherwise ZIP) with
/// default settings. Fails only when the destination itself cannot be written;
/// when nothing is recovered no destination file is left behind.
pub fn repair(
    corrupted: &Path,
    destination: &Path,
    codec: &dyn ArchiveCodec,
) -> Result<RepairReport> {
    if destination.as_os_str().is_empty() {
        return Err(ArchiveError::Validation("no output path given".into()));
    }
    let mut report = RepairReport {
        recovered_count: 0,
        candidate_count: 0,
        output: destination.to_path_buf(),
        skipped: Vec::new(),
    };

    let candidates = scan(corrupted, codec);
    report.candidate_count = candidates.len();
    if candidates.is_empty() {
        info!(archive = %corrupted.display(), "no recoverable entries");
        return Ok(report);
    }

    let format = ArchiveFormat::from_extension(destination).unwrap_or(ArchiveFormat::Zip);
    let spec = ArchiveSpec::default_for(format);
    fsx::ensure_parent_dir(destination)?;

    let mut writer = match codec.open_for_write(destination, &spec) {
        Ok(w) => w,
        Err(e) => {
            fsx::remove_quietly(destination);
            return Err(e);
        }
    };

    for key in candidates {
        let mut spool = match salvage(corrupted, &key, codec) {
            Ok(spool) => spool,
            Err(e) => {
                debug!(entry = %key, error = %e, "skipping entry");
                report.skipped.push(key);
                continue;
            }
        };
        if let Err(e) = writer.write(&key, EntrySource::Stream(&mut spool), None) {
            fsx::remove_quietly(destination);
            return Err(e);
        }
        report.recovered_count += 1;
    }

    if let Err(e) = writer.finish() {
        fsx::remove_quietly(destination);
        return Err(e);
    }

    if report.recovered_count == 0 {
        fsx::remove_quietly(destination);
    }
    info!(
        archive = %corrupted.display(),
        recovered = report.recovered_count,
        candidates = report.candidate_count,
        "repair finished"
    );
    Ok(report)
}

/// Keys of entries that look recoverable. Any failure yields fewer candidates, never an error.
fn scan(corrupted: &Path, codec: &dyn ArchiveCodec) -> Vec<String> {
    let mut reader = match codec.open_for_read(corrupted, None) {
        Ok(r) => r,
        Err(e) => {
            warn!(archive = %corrupted.display(), error = %e, "cannot open damaged archive");
            return Vec::new();
        }
    };
    let listed: Vec<(usize, String)> = reader
        .entries()
        .iter()
        .enumerate()
        .filter(|(_, e)| !e.is_dir && !e.is_encrypted)
        .map(|(i, e)| (i, e.key.clone()))
        .collect();

    listed
        .into_iter()
        .filter(|(i, key)| match reader.open_stream(*i) {
            Ok(_) => true,
            Err(e) => {
                debug!(entry = %key, error = %e, "not a candidate");
                false
            }
        })
        .map(|(_, key)| key)
        .collect()
}

/// Reads one entry from a freshly opened source into a rewound temp file.
fn salvage(corrupted: &Path, key: &str, codec: &dyn ArchiveCodec) -> Result<std::fs::File> {
    let mut reader: Box<dyn ContainerReader> = codec.open_for_read(corrupted, None)?;
    let index = reader
        .entries()
        .iter()
        .position(|e| e.key == key)
        .ok_or_else(|| ArchiveError::corrupt(corrupted, format!("entry '{key}' disappeared")))?;

    let mut spool = tempfile::tempfile().map_err(|e| ArchiveError::io(e, corrupted))?;
    let mut stream = reader.open_stream(index)?;
    io::copy(&mut stream, &mut spool)
        .map_err(|e| ArchiveError::corrupt(corrupted, format!("'{key}': {e}")))?;
    spool
        .seek(SeekFrom::Start(0))
        .map_err(|e| ArchiveError::io(e, corrupted))?;
    Ok(spool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::AutoCodec;
    use tempfile::tempdir;

    #[test]
    fn unopenable_source_recovers_nothing() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("broken.zip");
        std::fs::write(&src, vec![0u8; 256]).unwrap();
        let dest = dir.path().join("fixed.zip");

        let report = repair(&src, &dest, &AutoCodec).unwrap();
        assert!(!report.success());
        assert_eq!(report.candidate_count, 0);
        assert!(!dest.exists());
        assert!(report.message().starts_with("No recoverable file entries"));
    }
}
