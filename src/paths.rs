//! Source selection and archive entry naming.
//!
//! A selection may mix files and directories from unrelated parent folders. The
//! resolver finds the deepest directory shared by all of them (the common base) and
//! names every file relative to it. When no usable base exists, each selected
//! directory contributes its own leaf name as a root segment and loose files are
//! stored under their bare names.
//!
//! Comparisons are case-insensitive and component-wise, so `/data/Foo` lies under
//! `/DATA` but `/data/foobar` does not lie under `/data/foo`.

use crate::error::{ArchiveError, Result};
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    File,
    Directory,
}

/// One validated, absolute member of a [`SourceSelection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePath {
    pub path: PathBuf,
    pub kind: SourceKind,
}

impl SourcePath {
    /// The directory this source contributes to the common-base search.
    fn base_candidate(&self) -> PathBuf {
        match self.kind {
            SourceKind::Directory => self.path.clone(),
            SourceKind::File => self
                .path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        }
    }
}

/// An ordered, case-insensitively de-duplicated set of existing absolute paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSelection {
    items: Vec<SourcePath>,
}

impl SourceSelection {
    /// Validates `paths`: the list must be non-empty and every member must exist.
    pub fn new<I, P>(paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut items: Vec<SourcePath> = Vec::new();
        for raw in paths {
            let raw = raw.as_ref();
            let metadata = match fs::metadata(raw) {
                Ok(md) => md,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(ArchiveError::MissingSource(raw.to_path_buf()))
                }
                Err(e) => return Err(ArchiveError::io(e, raw)),
            };
            let path = fs::canonicalize(raw).map_err(|e| ArchiveError::io(e, raw))?;
            if items.iter().any(|s| same_path_ci(&s.path, &path)) {
                continue;
            }
            let kind = if metadata.is_dir() {
                SourceKind::Directory
            } else {
                SourceKind::File
            };
            items.push(SourcePath { path, kind });
        }
        if items.is_empty() {
            return Err(ArchiveError::Validation("No source paths provided.".into()));
        }
        Ok(Self { items })
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourcePath> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Computes entry names for the members of one selection.
#[derive(Debug, Clone)]
pub struct PathResolver {
    base: Option<PathBuf>,
}

impl PathResolver {
    pub fn new(selection: &SourceSelection) -> Self {
        Self {
            base: resolve_base(selection),
        }
    }

    /// A resolver with an explicit base, mostly useful in tests.
    pub fn with_base(base: Option<PathBuf>) -> Self {
        Self { base }
    }

    pub fn base(&self) -> Option<&Path> {
        self.base.as_deref()
    }

    /// The entry name for `absolute`, a file that is `source` itself or lies inside it.
    pub fn entry_name_for(&self, absolute: &Path, source: &SourcePath) -> String {
        if let Some(base) = &self.base {
            if let Some(rel) = strip_prefix_ci(absolute, base) {
                if !rel.is_empty() {
                    return join_segments(&rel);
                }
            }
        } else if source.kind == SourceKind::Directory {
            if let Some(rel) = strip_prefix_ci(absolute, &source.path) {
                if let Some(leaf) = leaf_name(&source.path) {
                    let mut segments = vec![leaf];
                    segments.extend(rel);
                    return join_segments(&segments);
                }
            }
        }
        leaf_name(absolute)
            .map(|n| normalize_segment(&n))
            .unwrap_or_default()
    }

    /// Entry-name segments under which the contents of directory `source` are stored.
    ///
    /// Empty when the directory is the common base itself.
    pub fn directory_prefix(&self, source: &SourcePath) -> Vec<String> {
        if let Some(base) = &self.base {
            if let Some(rel) = strip_prefix_ci(&source.path, base) {
                return rel;
            }
        }
        leaf_name(&source.path).into_iter().collect()
    }
}

/// The common base directory of a selection, or `None` when the only shared
/// ancestor is a filesystem or drive root.
pub fn resolve_base(selection: &SourceSelection) -> Option<PathBuf> {
    let candidates: Vec<PathBuf> = selection.iter().map(SourcePath::base_candidate).collect();
    common_base(&candidates)
}

/// Descending-prefix search over candidate directories.
///
/// Starts from the shortest candidate (the first one on a length tie) and drops
/// its last segment until every candidate lies under it.
pub fn common_base(dirs: &[PathBuf]) -> Option<PathBuf> {
    let mut distinct: Vec<&Path> = Vec::new();
    for dir in dirs {
        if dir.as_os_str().is_empty() {
            return None;
        }
        if !distinct.iter().any(|d| same_path_ci(d, dir)) {
            distinct.push(dir);
        }
    }

    match distinct.as_slice() {
        [] => None,
        [only] => (!is_degenerate_root(only)).then(|| only.to_path_buf()),
        _ => {
            let mut candidate = distinct
                .iter()
                .min_by_key(|d| d.as_os_str().len())?
                .to_path_buf();
            loop {
                if distinct.iter().all(|d| starts_with_ci(d, &candidate)) {
                    return (!is_degenerate_root(&candidate)).then_some(candidate);
                }
                match candidate.parent() {
                    Some(parent) if !parent.as_os_str().is_empty() => {
                        candidate = parent.to_path_buf()
                    }
                    _ => return None,
                }
            }
        }
    }
}

/// `/`, `C:\`, `C:` and similar volume roots never serve as a base.
pub fn is_degenerate_root(path: &Path) -> bool {
    if path.parent().is_none() {
        return true;
    }
    let s = path.to_string_lossy();
    s.len() <= 3 && s.contains(':')
}

fn fold(s: &OsStr) -> String {
    s.to_string_lossy().to_lowercase()
}

fn comparable(path: &Path) -> impl Iterator<Item = Component<'_>> {
    path.components().filter(|c| !matches!(c, Component::CurDir))
}

fn same_path_ci(a: &Path, b: &Path) -> bool {
    let a: Vec<String> = comparable(a).map(|c| fold(c.as_os_str())).collect();
    let b: Vec<String> = comparable(b).map(|c| fold(c.as_os_str())).collect();
    a == b
}

fn starts_with_ci(path: &Path, base: &Path) -> bool {
    strip_prefix_ci(path, base).is_some()
}

/// Segments of `path` after `base`, compared case-insensitively per component.
fn strip_prefix_ci(path: &Path, base: &Path) -> Option<Vec<String>> {
    let mut rest = comparable(path);
    for b in comparable(base) {
        let p = rest.next()?;
        if fold(p.as_os_str()) != fold(b.as_os_str()) {
            return None;
        }
    }
    Some(
        rest.map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect(),
    )
}

fn leaf_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

/// Backslashes never survive into an entry name.
fn normalize_segment(segment: &str) -> String {
    segment.replace('\\', "/")
}

fn join_segments(segments: &[String]) -> String {
    segments
        .iter()
        .map(|s| normalize_segment(s))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn files_sharing_a_parent_use_it_as_base() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.bin");
        touch(&a);
        touch(&b);

        let selection = SourceSelection::new([&a, &b]).unwrap();
        let resolver = PathResolver::new(&selection);
        let base = fs::canonicalize(dir.path()).unwrap();
        assert_eq!(resolver.base(), Some(base.as_path()));

        for source in selection.iter() {
            let name = resolver.entry_name_for(&source.path, source);
            assert!(!name.contains('/'), "{name}");
        }
        let names: Vec<String> = selection
            .iter()
            .map(|s| resolver.entry_name_for(&s.path, s))
            .collect();
        assert_eq!(names, vec!["a.txt", "b.bin"]);
    }

    #[test]
    fn nested_sources_are_named_relative_to_shared_ancestor() {
        let dir = tempdir().unwrap();
        let deep = dir.path().join("one").join("two").join("deep.txt");
        let shallow = dir.path().join("one").join("shallow.txt");
        touch(&deep);
        touch(&shallow);

        let selection = SourceSelection::new([&deep, &shallow]).unwrap();
        let resolver = PathResolver::new(&selection);
        let names: Vec<String> = selection
            .iter()
            .map(|s| resolver.entry_name_for(&s.path, s))
            .collect();
        assert_eq!(names, vec!["two/deep.txt", "shallow.txt"]);
    }

    #[test]
    fn root_only_common_prefix_is_rejected() {
        let dirs = vec![PathBuf::from("/etc"), PathBuf::from("/usr/lib")];
        assert_eq!(common_base(&dirs), None);
        assert_eq!(common_base(&[PathBuf::from("/")]), None);
    }

    #[test]
    #[cfg(windows)]
    fn drive_root_is_rejected() {
        let dirs = vec![PathBuf::from(r"C:\"), PathBuf::from(r"C:\Users")];
        assert_eq!(common_base(&dirs), None);
        assert_eq!(common_base(&[PathBuf::from(r"C:\")]), None);
    }

    #[test]
    fn prefix_match_is_component_wise_and_case_insensitive() {
        let dirs = vec![
            PathBuf::from("/srv/Data/foo"),
            PathBuf::from("/srv/data/foobar"),
        ];
        assert_eq!(common_base(&dirs), Some(PathBuf::from("/srv/Data")));

        let dirs = vec![PathBuf::from("/srv/data"), PathBuf::from("/SRV/DATA")];
        assert_eq!(common_base(&dirs), Some(PathBuf::from("/srv/data")));
    }

    #[test]
    fn no_base_falls_back_to_directory_leaf_then_bare_name() {
        let resolver = PathResolver::with_base(None);
        let dir_source = SourcePath {
            path: PathBuf::from("/mnt/photos"),
            kind: SourceKind::Directory,
        };
        assert_eq!(
            resolver.entry_name_for(Path::new("/mnt/photos/2024/a.jpg"), &dir_source),
            "photos/2024/a.jpg"
        );
        assert_eq!(resolver.directory_prefix(&dir_source), vec!["photos"]);

        let file_source = SourcePath {
            path: PathBuf::from("/opt/notes.txt"),
            kind: SourceKind::File,
        };
        assert_eq!(
            resolver.entry_name_for(&file_source.path, &file_source),
            "notes.txt"
        );
    }

    #[test]
    fn directory_equal_to_base_has_empty_prefix() {
        let resolver = PathResolver::with_base(Some(PathBuf::from("/work/src")));
        let source = SourcePath {
            path: PathBuf::from("/work/src"),
            kind: SourceKind::Directory,
        };
        assert!(resolver.directory_prefix(&source).is_empty());
        assert_eq!(
            resolver.entry_name_for(Path::new("/work/src/lib/mod.rs"), &source),
            "lib/mod.rs"
        );
    }

    #[test]
    fn empty_and_missing_selections_are_rejected() {
        let empty: Vec<PathBuf> = Vec::new();
        assert!(matches!(
            SourceSelection::new(empty),
            Err(ArchiveError::Validation(_))
        ));

        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.txt");
        assert!(matches!(
            SourceSelection::new([&missing]),
            Err(ArchiveError::MissingSource(p)) if p == missing
        ));
    }

    #[test]
    fn duplicate_sources_collapse() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.txt");
        touch(&a);
        let selection = SourceSelection::new([&a, &a]).unwrap();
        assert_eq!(selection.len(), 1);
    }
}
