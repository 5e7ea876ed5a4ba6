//! Self-extracting executable composition: stub bytes followed by container bytes.

use crate::error::{ArchiveError, Result};
use crate::fsx;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Writes `stub || container` to `output`.
///
/// A missing stub is not fatal to the data: the container is copied next to
/// `output` with its native extension and [`ArchiveError::MissingSfxModule`]
/// names that copy. If writing `output` fails the partial file is removed and
/// the container is preserved the same way.
pub fn compose(container: &Path, stub: &Path, output: &Path) -> Result<PathBuf> {
    if !stub.is_file() {
        let preserved = preserve(container, output)
            .map_err(|e| ArchiveError::io(e, container))?;
        warn!(module = %stub.display(), kept = %preserved.display(), "SFX module missing");
        return Err(ArchiveError::MissingSfxModule {
            module: stub.to_path_buf(),
            preserved,
        });
    }

    match concatenate(stub, container, output) {
        Ok(bytes) => {
            info!(output = %output.display(), bytes, "wrote self-extracting archive");
            Ok(output.to_path_buf())
        }
        Err(source) => {
            fsx::remove_quietly(output);
            let preserved = match preserve(container, output) {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "could not preserve container after SFX failure");
                    container.to_path_buf()
                }
            };
            Err(ArchiveError::SfxComposition {
                output: output.to_path_buf(),
                preserved,
                source,
            })
        }
    }
}

fn concatenate(stub: &Path, container: &Path, output: &Path) -> io::Result<u64> {
    let mut out = BufWriter::new(File::create(output)?);
    let mut written = io::copy(&mut File::open(stub)?, &mut out)?;
    written += io::copy(&mut File::open(container)?, &mut out)?;
    out.flush()?;
    Ok(written)
}

/// Copies `container` to `output` with the container's extension.
fn preserve(container: &Path, output: &Path) -> io::Result<PathBuf> {
    let ext = container
        .extension()
        .map(|e| e.to_os_string())
        .unwrap_or_else(|| "zip".into());
    let target = output.with_extension(ext);
    if target != container {
        fsx::copy(container, &target)?;
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn output_is_stub_then_container() {
        let dir = tempdir().unwrap();
        let stub = dir.path().join("stub");
        let container = dir.path().join("payload.zip");
        let out = dir.path().join("setup.exe");
        fs::write(&stub, b"MZSTUB").unwrap();
        fs::write(&container, b"PK\x05\x06rest").unwrap();

        assert_eq!(compose(&container, &stub, &out).unwrap(), out);
        assert_eq!(fs::read(&out).unwrap(), b"MZSTUBPK\x05\x06rest");
    }

    #[test]
    fn missing_stub_keeps_plain_container() {
        let dir = tempdir().unwrap();
        let container = dir.path().join("staged.7z");
        fs::write(&container, b"7z-bytes").unwrap();
        let out = dir.path().join("bundle.exe");

        let err = compose(&container, &dir.path().join("nope"), &out).unwrap_err();
        match err {
            ArchiveError::MissingSfxModule { preserved, .. } => {
                assert_eq!(preserved, dir.path().join("bundle.7z"));
                assert_eq!(fs::read(preserved).unwrap(), b"7z-bytes");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!out.exists());
    }
}
