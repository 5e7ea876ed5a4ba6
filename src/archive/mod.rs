//! # Archive Writer
//!
//! Turns a resolved entry list into a container on disk through an
//! [`ArchiveCodec`]. Requests are validated before any file is created; a
//! failed write never leaves a partial destination behind. Self-extracting
//! builds stage the container in the temp directory and hand it to
//! [`sfx::compose`](crate::sfx::compose).

use crate::codec::{self, ArchiveCodec, EntrySource};
use crate::common::{ArchiveEntry, ArchiveSpec};
use crate::config::Settings;
use crate::error::{ArchiveError, Result};
use crate::{fsx, sfx};
use scopeguard::ScopeGuard;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Fails if two distinct sources would be stored under the same entry name.
pub fn check_collisions(entries: &[ArchiveEntry]) -> Result<()> {
    let mut seen: HashMap<&str, &Path> = HashMap::with_capacity(entries.len());
    for entry in entries {
        if let Some(first) = seen.insert(entry.name.as_str(), entry.source.as_path()) {
            if first != entry.source {
                return Err(ArchiveError::EntryCollision {
                    name: entry.name.clone(),
                    first: first.to_path_buf(),
                    second: entry.source.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Writes `entries` into a new container at `destination`, in order.
///
/// Returns the path of the produced file, which is `destination` itself.
pub fn create(
    entries: &[ArchiveEntry],
    spec: &ArchiveSpec,
    destination: &Path,
    codec: &dyn ArchiveCodec,
    settings: &Settings,
) -> Result<PathBuf> {
    if destination.as_os_str().is_empty() {
        return Err(ArchiveError::Validation("no output path given".into()));
    }
    codec::check_supported(spec)?;
    check_collisions(entries)?;
    fsx::ensure_parent_dir(destination)?;

    let started = Instant::now();
    if !spec.sfx {
        write_container(entries, spec, destination, codec)?;
        info!(
            output = %destination.display(),
            entries = entries.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "archive created"
        );
        return Ok(destination.to_path_buf());
    }

    fsx::create_dir_all(&settings.temp_dir).map_err(|e| ArchiveError::io(e, &settings.temp_dir))?;
    let staged = tempfile::Builder::new()
        .prefix("unpack-")
        .suffix(&format!(".{}", spec.kind().extension()))
        .tempfile_in(&settings.temp_dir)
        .map_err(|e| ArchiveError::io(e, &settings.temp_dir))?
        .into_temp_path();
    debug!(staged = %staged.display(), "staging container for SFX");

    write_container(entries, spec, &staged, codec)?;
    let stub = settings.sfx_module_for(spec.kind());
    let output = sfx::compose(&staged, &stub, destination)?;
    info!(
        output = %output.display(),
        entries = entries.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "self-extracting archive created"
    );
    Ok(output)
}

fn write_container(
    entries: &[ArchiveEntry],
    spec: &ArchiveSpec,
    path: &Path,
    codec: &dyn ArchiveCodec,
) -> Result<()> {
    let creation = |source: ArchiveError| ArchiveError::Creation {
        path: path.to_path_buf(),
        source: Box::new(source),
    };
    // A refused open leaves the file to whoever holds it.
    let mut writer = codec.open_for_write(path, spec).map_err(&creation)?;
    let cleanup = scopeguard::guard(path, |p| fsx::remove_quietly(p));
    let written = entries
        .iter()
        .try_for_each(|entry| {
            writer.write(&entry.name, EntrySource::File(&entry.source), entry.modified)
        })
        .and_then(|()| writer.finish());

    match written {
        Ok(()) => {
            ScopeGuard::into_inner(cleanup);
            Ok(())
        }
        Err(source) => {
            drop(cleanup);
            Err(creation(source))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::AutoCodec;
    use crate::common::ArchiveFormat;
    use std::fs;
    use tempfile::tempdir;

    fn entry(name: &str, source: &Path) -> ArchiveEntry {
        ArchiveEntry {
            name: name.into(),
            source: source.to_path_buf(),
            modified: None,
        }
    }

    #[test]
    fn colliding_names_are_rejected() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a/x.txt");
        let b = dir.path().join("b/x.txt");
        let err = check_collisions(&[entry("x.txt", &a), entry("x.txt", &b)]).unwrap_err();
        assert!(matches!(err, ArchiveError::EntryCollision { ref name, .. } if name == "x.txt"));
        assert!(check_collisions(&[entry("x.txt", &a), entry("y.txt", &b)]).is_ok());
    }

    #[test]
    fn failed_write_removes_destination() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.zip");
        let missing = dir.path().join("vanished.txt");
        let spec = ArchiveSpec::default_for(ArchiveFormat::Zip);
        let err = create(
            &[entry("vanished.txt", &missing)],
            &spec,
            &dest,
            &AutoCodec,
            &Settings::from_env(),
        )
        .unwrap_err();
        assert!(matches!(err, ArchiveError::Creation { .. }));
        assert!(!dest.exists());
    }

    #[test]
    fn destination_held_by_another_writer_is_left_alone() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("f.txt");
        fs::write(&src, b"x").unwrap();
        let dest = dir.path().join("busy.zip");
        let mut holder = fsx::create_exclusive(&dest).unwrap();
        std::io::Write::write_all(&mut holder, b"someone else").unwrap();

        let spec = ArchiveSpec::default_for(ArchiveFormat::Zip);
        let err = create(&[entry("f.txt", &src)], &spec, &dest, &AutoCodec, &Settings::from_env())
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Creation { .. }));
        drop(holder);
        assert_eq!(fs::read(&dest).unwrap(), b"someone else");
    }

    #[test]
    fn volume_split_is_refused_before_io() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("f.txt");
        fs::write(&src, b"x").unwrap();
        let dest = dir.path().join("nested/out.zip");
        let mut spec = ArchiveSpec::default_for(ArchiveFormat::Zip);
        spec.volume_size = Some(1 << 20);
        let err = create(&[entry("f.txt", &src)], &spec, &dest, &AutoCodec, &Settings::from_env())
            .unwrap_err();
        assert!(matches!(err, ArchiveError::UnsupportedFeature(_)));
        assert!(!dest.parent().unwrap().exists());
    }

    #[test]
    fn sfx_build_prefixes_stub() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("f.txt");
        fs::write(&src, b"content").unwrap();
        let stubs = dir.path().join("stubs");
        fs::create_dir_all(&stubs).unwrap();
        let settings = Settings::from_env()
            .with_sfx_dir(&stubs)
            .with_temp_dir(dir.path().join("tmp"));
        fs::write(settings.sfx_module_for(ArchiveFormat::Zip), b"STUB").unwrap();

        let mut spec = ArchiveSpec::default_for(ArchiveFormat::Zip);
        spec.sfx = true;
        let dest = dir.path().join("setup.exe");
        create(&[entry("f.txt", &src)], &spec, &dest, &AutoCodec, &settings).unwrap();

        let bytes = fs::read(&dest).unwrap();
        assert!(bytes.starts_with(b"STUBPK"));
        assert_eq!(fs::read_dir(dir.path().join("tmp")).unwrap().count(), 0);
    }
}
