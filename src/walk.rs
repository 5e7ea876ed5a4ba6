//! Recursive enumeration of selected directories into archive entries.
//!
//! The walker keeps a stack of entry-name segments. Each `walkdir` item at depth
//! `d` truncates the stack back to its parent's length before pushing its own
//! name, so the accumulated prefix always mirrors the position in the tree.
//! Directories only extend the prefix; they never become entries of their own.

use crate::common::ArchiveEntry;
use crate::error::{ArchiveError, Result};
use crate::fsx;
use crate::paths::{PathResolver, SourceKind, SourceSelection};
use std::io;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Lists every regular file under `directory`.
///
/// Each name is `prefix` joined with the file's path relative to `root`, which
/// must be `directory` or one of its ancestors. Order follows the filesystem.
pub fn walk(directory: &Path, root: &Path, prefix: &[String]) -> Result<Vec<ArchiveEntry>> {
    let below_root = directory.strip_prefix(root).map_err(|_| {
        ArchiveError::Validation(format!(
            "'{}' is not inside '{}'",
            directory.display(),
            root.display()
        ))
    })?;

    let mut segments: Vec<String> = prefix.to_vec();
    segments.extend(
        below_root
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    let base_len = segments.len();

    let mut entries = Vec::new();
    for item in WalkDir::new(directory).min_depth(1).follow_links(false) {
        let item = item.map_err(|e| {
            let path = e
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| directory.to_path_buf());
            ArchiveError::io(io::Error::from(e), path)
        })?;

        segments.truncate(base_len + item.depth() - 1);
        let name = item.file_name().to_string_lossy().into_owned();
        let file_type = item.file_type();

        if file_type.is_dir() {
            segments.push(name);
            continue;
        }
        if !file_type.is_file() {
            debug!(path = %item.path().display(), "skipping non-regular file");
            continue;
        }

        segments.push(name);
        let entry_name = segments.join("/").replace('\\', "/");
        segments.pop();

        let modified = item
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .map(fsx::local_timestamp);
        entries.push(ArchiveEntry {
            name: entry_name,
            source: item.into_path(),
            modified,
        });
    }
    Ok(entries)
}

/// Expands a selection into the flat, ordered entry list handed to the writer.
pub fn collect_entries(selection: &SourceSelection) -> Result<Vec<ArchiveEntry>> {
    let resolver = PathResolver::new(selection);
    debug!(base = ?resolver.base(), "resolved common base");

    let mut entries = Vec::new();
    for source in selection.iter() {
        match source.kind {
            SourceKind::File => {
                let modified = std::fs::metadata(&source.path)
                    .and_then(|m| m.modified())
                    .ok()
                    .map(fsx::local_timestamp);
                entries.push(ArchiveEntry {
                    name: resolver.entry_name_for(&source.path, source),
                    source: source.path.clone(),
                    modified,
                });
            }
            SourceKind::Directory => {
                let prefix = resolver.directory_prefix(source);
                entries.extend(walk(&source.path, &source.path, &prefix)?);
            }
        }
    }
    Ok(entries)
}
