//! Integrity testing: decode every file entry without writing anything.

use crate::codec::ArchiveCodec;
use crate::common::{OpenFailure, TestReport};
use crate::error::ArchiveError;
use std::io::{self, Read};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

const READ_BLOCK: usize = 64 * 1024;

/// Reads every non-directory entry of `source` to the end.
///
/// Never fails: open errors are classified into [`TestReport::open_failure`]
/// and per-entry errors are collected while the remaining entries are still read.
pub fn test(source: &Path, password: Option<&str>, codec: &dyn ArchiveCodec) -> TestReport {
    let started = Instant::now();
    let mut report = TestReport::default();

    let password = password.filter(|p| !p.is_empty());
    let mut reader = match codec.open_for_read(source, password) {
        Ok(r) => r,
        Err(e) => {
            warn!(archive = %source.display(), error = %e, "cannot open archive for testing");
            report.open_failure = Some(classify(&e));
            report.elapsed = started.elapsed();
            return report;
        }
    };

    let files: Vec<(usize, String, u64)> = reader
        .entries()
        .iter()
        .enumerate()
        .filter(|(_, e)| !e.is_dir)
        .map(|(i, e)| (i, e.key.clone(), e.size))
        .collect();
    if files.is_empty() {
        report.empty = true;
        report.elapsed = started.elapsed();
        return report;
    }

    let mut block = vec![0u8; READ_BLOCK];
    for (index, key, size) in files {
        report.total_bytes += size;
        match drain(reader.open_stream(index), &mut block) {
            Ok(read) => {
                debug!(entry = %key, bytes = read, "entry ok");
                report.tested_count += 1;
            }
            Err(msg) => report.errors.push(format!("Error in file '{key}': {msg}")),
        }
    }

    report.elapsed = started.elapsed();
    info!(
        archive = %source.display(),
        tested = report.tested_count,
        errors = report.errors.len(),
        "integrity test finished"
    );
    report
}

fn drain(stream: crate::error::Result<Box<dyn Read + '_>>, block: &mut [u8]) -> Result<u64, String> {
    let mut stream = stream.map_err(|e| e.to_string())?;
    let mut total = 0u64;
    loop {
        match stream.read(block) {
            Ok(0) => return Ok(total),
            Ok(n) => total += n as u64,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.to_string()),
        }
    }
}

fn classify(err: &ArchiveError) -> OpenFailure {
    match err {
        ArchiveError::Password { .. } => OpenFailure::Password(err.to_string()),
        ArchiveError::CorruptArchive { .. } | ArchiveError::UnsupportedFeature(_) => {
            OpenFailure::Format(err.to_string())
        }
        other => OpenFailure::Other(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::AutoCodec;
    use tempfile::tempdir;

    #[test]
    fn unreadable_container_is_a_format_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk.zip");
        std::fs::write(&path, b"this is not an archive at all").unwrap();
        let report = test(&path, None, &AutoCodec);
        assert!(!report.success());
        assert!(matches!(report.open_failure, Some(OpenFailure::Format(_))));
        assert!(report.message().starts_with("Test failed: Invalid or unsupported"));
    }

    #[test]
    fn missing_file_is_other_failure() {
        let dir = tempdir().unwrap();
        let report = test(&dir.path().join("absent.7z"), None, &AutoCodec);
        assert!(matches!(report.open_failure, Some(OpenFailure::Other(_))));
    }
}
