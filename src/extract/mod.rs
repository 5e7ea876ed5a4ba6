//! # Extraction Module
//!
//! Reads a container through an [`ArchiveCodec`] and writes its entries under a
//! destination directory. All checks that can fail without touching the disk
//! run first: entry-path safety, the password gate and a probe of one
//! encrypted entry. Only then is the destination created.

use crate::codec::ArchiveCodec;
use crate::common::EntryInfo;
use crate::error::{ArchiveError, Result};
use crate::fsx as fs;
use scopeguard::ScopeGuard;
use serde::Serialize;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

const COPY_BLOCK: usize = 64 * 1024;

/// What an extraction wrote.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtractSummary {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

/// Entry metadata of `source`, sorted by key.
pub fn list(
    source: &Path,
    password: Option<&str>,
    codec: &dyn ArchiveCodec,
) -> Result<Vec<EntryInfo>> {
    let reader = codec.open_for_read(source, password)?;
    let mut entries = reader.entries().to_vec();
    entries.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(entries)
}

/// Maps an entry key onto a relative path, or `None` if it could escape the destination.
///
/// Both `/` and `\` separate components. Absolute keys, drive prefixes and `..`
/// are refused; empty and `.` components are dropped.
pub fn safe_relative_path(key: &str) -> Option<PathBuf> {
    if key.starts_with('/') || key.starts_with('\\') {
        return None;
    }
    let mut out = PathBuf::new();
    for part in key.split(['/', '\\']) {
        match part {
            "" | "." => continue,
            ".." => return None,
            p if p.contains(':') => return None,
            p => out.push(p),
        }
    }
    let mut components = out.components();
    if out.as_os_str().is_empty() || !components.all(|c| matches!(c, Component::Normal(_))) {
        return None;
    }
    Some(out)
}

/// True when `key` is one of `filters` or lies below one of them.
fn selected(key: &str, filters: &[String]) -> bool {
    if filters.is_empty() {
        return true;
    }
    let key = key.replace('\\', "/");
    let key = key.trim_end_matches('/');
    filters.iter().any(|f| {
        let f = f.replace('\\', "/");
        let f = f.trim_matches('/');
        key == f || key.strip_prefix(f).is_some_and(|rest| rest.starts_with('/'))
    })
}

/// Extracts `source` into `destination`, creating it if needed.
///
/// `only` restricts extraction to the named entries and directory prefixes;
/// empty means everything. Existing files are overwritten.
pub fn extract(
    source: &Path,
    destination: &Path,
    password: Option<&str>,
    only: &[String],
    codec: &dyn ArchiveCodec,
) -> Result<ExtractSummary> {
    if destination.as_os_str().is_empty() {
        return Err(ArchiveError::Validation("no destination directory given".into()));
    }
    let password = password.filter(|p| !p.is_empty());
    let mut reader = codec.open_for_read(source, password)?;

    let mut plan: Vec<(usize, PathBuf, bool)> = Vec::new();
    for (index, info) in reader.entries().iter().enumerate() {
        if !selected(&info.key, only) {
            continue;
        }
        let relative = safe_relative_path(&info.key)
            .ok_or_else(|| ArchiveError::UnsafeEntryPath(info.key.clone()))?;
        plan.push((index, destination.join(relative), info.is_dir));
    }

    let entries = reader.entries();
    let first_encrypted = plan
        .iter()
        .find(|(i, _, is_dir)| !is_dir && entries[*i].is_encrypted)
        .map(|(i, _, _)| *i);
    if let Some(index) = first_encrypted {
        if password.is_none() {
            return Err(ArchiveError::Password {
                path: source.to_path_buf(),
            });
        }
        probe(reader.as_mut(), index, source)?;
    }

    fs::create_dir_all(destination).map_err(|e| ArchiveError::io(e, destination))?;

    let mut summary = ExtractSummary::default();
    for (index, target, is_dir) in plan {
        if is_dir {
            fs::create_dir_all(&target).map_err(|e| ArchiveError::io(e, &target))?;
            summary.directories += 1;
            continue;
        }
        fs::ensure_parent_dir(&target)?;
        let key = reader.entries()[index].key.clone();
        let modified = reader.entries()[index].last_modified;

        let mut stream = reader.open_stream(index)?;
        let file = fs::File::create(&target).map_err(|e| ArchiveError::io(e, &target))?;
        let partial = scopeguard::guard(target.as_path(), |p| fs::remove_quietly(p));
        let mut out = BufWriter::with_capacity(COPY_BLOCK, file);
        let written = pump(&mut stream, &mut out, source, &target, &key)?;
        drop(stream);
        let file = out
            .into_inner()
            .map_err(|e| ArchiveError::io(e.into_error(), &target))?;
        ScopeGuard::into_inner(partial);
        if let Some(t) = modified {
            if let Err(e) = fs::set_entry_mtime(&file, t) {
                debug!(path = %target.display(), error = %e, "could not set modification time");
            }
        }

        summary.files += 1;
        summary.bytes += written;
    }

    info!(
        archive = %source.display(),
        destination = %destination.display(),
        files = summary.files,
        bytes = summary.bytes,
        "extraction complete"
    );
    Ok(summary)
}

/// Reads one encrypted entry to the end so a wrong password fails before any output exists.
fn probe(reader: &mut dyn crate::codec::ContainerReader, index: usize, source: &Path) -> Result<()> {
    let wrong_password = || ArchiveError::Password {
        path: source.to_path_buf(),
    };
    let mut stream = reader.open_stream(index).map_err(|e| match e {
        ArchiveError::CorruptArchive { .. } => wrong_password(),
        other => other,
    })?;
    io::copy(&mut stream, &mut io::sink()).map_err(|_| wrong_password())?;
    Ok(())
}

fn pump(
    reader: &mut dyn Read,
    writer: &mut impl Write,
    archive: &Path,
    target: &Path,
    key: &str,
) -> Result<u64> {
    let mut buf = vec![0u8; COPY_BLOCK];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ArchiveError::corrupt(archive, format!("'{key}': {e}"))),
        };
        writer
            .write_all(&buf[..n])
            .map_err(|e| ArchiveError::io(e, target))?;
        total += n as u64;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsafe_keys_are_refused() {
        for key in ["../evil", "/etc/passwd", "\\windows", "a/../../b", "C:/x", "", "./"] {
            assert_eq!(safe_relative_path(key), None, "{key}");
        }
        assert_eq!(
            safe_relative_path("dir\\sub/file.txt"),
            Some(PathBuf::from("dir").join("sub").join("file.txt"))
        );
        assert_eq!(safe_relative_path("./a//b"), Some(PathBuf::from("a").join("b")));
    }

    #[test]
    fn filters_match_entries_and_prefixes() {
        let only = vec!["docs".to_string(), "top.txt".to_string()];
        assert!(selected("docs/a.md", &only));
        assert!(selected("docs/", &only));
        assert!(selected("top.txt", &only));
        assert!(!selected("docs2/a.md", &only));
        assert!(!selected("other.txt", &only));
        assert!(selected("anything", &[]));
    }
}
