//! Runtime settings resolved from the environment and CLI flags.

use crate::common::ArchiveFormat;
use std::env;
use std::path::{Path, PathBuf};

/// Overrides the directory holding the SFX stub executables.
pub const SFX_DIR_ENV: &str = "UNPACK_SFX_DIR";
/// Overrides where self-extracting builds stage their intermediate container.
pub const TEMP_DIR_ENV: &str = "UNPACK_TEMP_DIR";
/// Password fallback for the CLI.
pub const PASSWORD_ENV: &str = "UNPACK_PASSWORD";
/// `tracing` filter directive.
pub const LOG_ENV: &str = "UNPACK_LOG";

const SFX_DIR_NAME: &str = "SFXModules";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub sfx_modules_dir: PathBuf,
    pub temp_dir: PathBuf,
}

impl Settings {
    /// `UNPACK_SFX_DIR` or `<exe dir>/SFXModules`; `UNPACK_TEMP_DIR` or the system temp dir.
    pub fn from_env() -> Self {
        let sfx_modules_dir = env::var_os(SFX_DIR_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_sfx_dir);
        let temp_dir = env::var_os(TEMP_DIR_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(env::temp_dir);
        Self {
            sfx_modules_dir,
            temp_dir,
        }
    }

    pub fn with_sfx_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sfx_modules_dir = dir.into();
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    /// Stub executable prepended to a container of `format`.
    pub fn sfx_module_for(&self, format: ArchiveFormat) -> PathBuf {
        sfx_module_in(&self.sfx_modules_dir, format)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_env()
    }
}

fn default_sfx_dir() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_default()
        .join(SFX_DIR_NAME)
}

/// `zipSfxModule.exe` / `7zSfxModule.exe` on Windows, no suffix elsewhere.
pub fn sfx_module_in(dir: &Path, format: ArchiveFormat) -> PathBuf {
    let stem = match format {
        ArchiveFormat::Zip => "zipSfxModule",
        ArchiveFormat::SevenZip => "7zSfxModule",
    };
    dir.join(format!("{stem}{}", env::consts::EXE_SUFFIX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_names_follow_format() {
        let s = Settings::from_env().with_sfx_dir("/opt/stubs");
        let zip = s.sfx_module_for(ArchiveFormat::Zip);
        let sz = s.sfx_module_for(ArchiveFormat::SevenZip);
        assert!(zip.starts_with("/opt/stubs"));
        assert!(zip
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("zipSfxModule"));
        assert!(sz
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("7zSfxModule"));
    }
}
