//! Shared data model: archive specifications, entry metadata and operation reports.

use crate::error::{ArchiveError, Result};
use chrono::NaiveDateTime;
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

/// Container formats the core can produce and consume.
#[derive(Serialize, Deserialize, ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    Zip,
    #[value(name = "7z")]
    #[serde(rename = "7z")]
    SevenZip,
}

impl ArchiveFormat {
    /// Native file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::SevenZip => "7z",
        }
    }

    /// Guess the format from a path's extension (`.7z` or `.zip`, case-insensitive).
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "zip" => Some(ArchiveFormat::Zip),
            "7z" => Some(ArchiveFormat::SevenZip),
            _ => None,
        }
    }
}

/// Six-point compression scale; each point maps 1:1 onto a codec level.
#[derive(Serialize, Deserialize, ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionLevel {
    /// Store only.
    #[value(alias = "store")]
    None,
    Fastest,
    Fast,
    #[default]
    Normal,
    Maximum,
    Ultra,
}

/// Compression method for 7z content.
#[derive(Serialize, Deserialize, ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SevenZipMethod {
    #[default]
    Lzma2,
    Lzma,
    Ppmd,
    Bzip2,
}

/// Entry cipher for ZIP containers. Only applied when a password is present.
#[derive(Serialize, Deserialize, ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZipCipher {
    #[default]
    #[value(alias = "aes-256")]
    Aes,
    /// Traditional PKWARE encryption ("ZipCrypto").
    #[value(name = "zipcrypto", alias = "legacy")]
    LegacyWeak,
    None,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ZipSettings {
    pub cipher: ZipCipher,
    /// Central-directory encryption. The ZIP backend rejects it when a password is set.
    pub encrypt_headers: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SevenZipSettings {
    pub method: SevenZipMethod,
    pub solid: bool,
    pub encrypt_headers: bool,
}

/// Format-specific options as a tagged variant.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatSettings {
    Zip(ZipSettings),
    SevenZip(SevenZipSettings),
}

/// Everything the writer needs to know about the container to produce.
///
/// Built once per operation and not mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSpec {
    pub format: FormatSettings,
    pub level: CompressionLevel,
    pub password: Option<String>,
    /// Requested volume size in bytes. Splitting is not implemented and is rejected.
    pub volume_size: Option<u64>,
    pub sfx: bool,
}

impl ArchiveSpec {
    pub fn zip(settings: ZipSettings) -> Self {
        Self {
            format: FormatSettings::Zip(settings),
            level: CompressionLevel::default(),
            password: None,
            volume_size: None,
            sfx: false,
        }
    }

    pub fn seven_zip(settings: SevenZipSettings) -> Self {
        Self {
            format: FormatSettings::SevenZip(settings),
            ..Self::zip(ZipSettings::default())
        }
    }

    /// Default settings for `format`: Normal level, no encryption.
    pub fn default_for(format: ArchiveFormat) -> Self {
        match format {
            ArchiveFormat::Zip => Self::zip(ZipSettings::default()),
            ArchiveFormat::SevenZip => Self::seven_zip(SevenZipSettings::default()),
        }
    }

    pub fn with_level(mut self, level: CompressionLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    pub fn kind(&self) -> ArchiveFormat {
        match self.format {
            FormatSettings::Zip(_) => ArchiveFormat::Zip,
            FormatSettings::SevenZip(_) => ArchiveFormat::SevenZip,
        }
    }

    /// The password, treating an empty string as absent.
    pub fn effective_password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    /// The ZIP cipher actually used: `None` whenever there is no password.
    pub fn effective_zip_cipher(&self) -> ZipCipher {
        match (self.format, self.effective_password()) {
            (FormatSettings::Zip(z), Some(_)) => z.cipher,
            _ => ZipCipher::None,
        }
    }
}

/// One file scheduled for creation: its entry name and where its bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub source: PathBuf,
    pub modified: Option<NaiveDateTime>,
}

/// Codec-level description of an entry inside an existing container.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub key: String,
    pub is_dir: bool,
    pub size: u64,
    pub compressed_size: u64,
    pub last_modified: Option<NaiveDateTime>,
    pub is_encrypted: bool,
}

/// Why a container could not be opened for testing.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub enum OpenFailure {
    Password(String),
    Format(String),
    Other(String),
}

/// Result of an integrity test.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct TestReport {
    pub tested_count: usize,
    pub total_bytes: u64,
    pub errors: Vec<String>,
    pub elapsed: Duration,
    pub open_failure: Option<OpenFailure>,
    /// Set when the container held no file entries at all.
    pub empty: bool,
}

/// Number of per-entry errors rendered by [`TestReport::message`].
pub const DISPLAYED_ERRORS: usize = 5;

impl TestReport {
    /// True iff the container opened and no entry failed.
    pub fn success(&self) -> bool {
        self.open_failure.is_none() && self.errors.is_empty()
    }

    pub fn message(&self) -> String {
        match &self.open_failure {
            Some(OpenFailure::Password(m)) => {
                return format!("Test failed: Password incorrect or required. ({m})")
            }
            Some(OpenFailure::Format(m)) => {
                return format!("Test failed: Invalid or unsupported archive format. ({m})")
            }
            Some(OpenFailure::Other(m)) => {
                return format!("Test failed: An unexpected error occurred. ({m})")
            }
            None => {}
        }
        if self.empty {
            return "Archive is empty or contains no file entries to test.".to_string();
        }
        let duration = format_duration(self.elapsed);
        if self.errors.is_empty() {
            format!(
                "Test completed successfully in {duration}. {} file entries verified. Total size: {}.",
                self.tested_count,
                format_bytes(self.total_bytes)
            )
        } else {
            let shown: Vec<&str> = self
                .errors
                .iter()
                .take(DISPLAYED_ERRORS)
                .map(String::as_str)
                .collect();
            format!(
                "Test completed in {duration} with {} error(s) out of {} file entries tested. Total size: {}.\nErrors:\n{}",
                self.errors.len(),
                self.tested_count,
                format_bytes(self.total_bytes),
                shown.join("\n")
            )
        }
    }
}

/// Result of a salvage attempt.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RepairReport {
    pub recovered_count: usize,
    pub candidate_count: usize,
    pub output: PathBuf,
    /// Keys that were candidates but could not be re-read in the rebuild pass.
    pub skipped: Vec<String>,
}

impl RepairReport {
    pub fn success(&self) -> bool {
        self.recovered_count > 0
    }

    pub fn message(&self) -> String {
        if self.candidate_count == 0 {
            "No recoverable file entries found or archive is too severely damaged to open."
                .to_string()
        } else if self.recovered_count == 0 {
            "Repair attempt complete, but no entries could be successfully recovered.".to_string()
        } else {
            let name = self
                .output
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            format!(
                "Repair attempt complete. {} out of {} potential entries recovered to '{}'.",
                self.recovered_count, self.candidate_count, name
            )
        }
    }
}

fn format_duration(d: Duration) -> String {
    if d.as_millis() < 1000 {
        format!("{} ms", d.as_millis())
    } else {
        format!("{:.2} s", d.as_secs_f64())
    }
}

/// Formats a byte count with binary suffixes, e.g. `1536` -> `"1.5 KB"`.
pub fn format_bytes(bytes: u64) -> String {
    const SUFFIXES: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut i = 0;
    while i < SUFFIXES.len() - 1 && value >= 1024.0 {
        value /= 1024.0;
        i += 1;
    }
    let rendered = format!("{value:.2}");
    let rendered = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", rendered, SUFFIXES[i])
}

fn volume_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(\d+\.?\d*)\s*(KB|MB|GB|B)?").expect("static regex"))
}

/// Parses a volume size such as `"100MB"`, `"1.44 MB (Floppy)"`, `"DVD"` or `"12345"`.
///
/// Returns `None` for blank input and `"No splitting"`; anything else that does
/// not name a size is a [`ArchiveError::Validation`] error.
pub fn parse_volume_size(input: &str) -> Result<Option<u64>> {
    let s = input.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("no splitting") {
        return Ok(None);
    }
    match volume_bytes(s) {
        Some(bytes) if bytes > 0 => Ok(Some(bytes)),
        _ => Err(ArchiveError::Validation(format!(
            "unrecognised volume size '{s}'"
        ))),
    }
}

fn volume_bytes(s: &str) -> Option<u64> {
    const MIB: f64 = 1024.0 * 1024.0;
    let caps = volume_regex().captures(s);
    let unit = caps
        .as_ref()
        .and_then(|c| c.get(2))
        .map(|m| m.as_str().to_ascii_uppercase());
    let number = caps
        .as_ref()
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok());

    match (number, unit.as_deref()) {
        (Some(n), Some("KB")) => Some((n * 1024.0) as u64),
        (Some(n), Some("MB")) => Some((n * MIB) as u64),
        (Some(n), Some("GB")) => Some((n * MIB * 1024.0) as u64),
        (Some(n), Some(_)) => Some(n as u64),
        _ => {
            if s.contains("Floppy") {
                Some(1440 * 1024)
            } else if s.contains("CD") {
                let mb = if s.contains("700") { 700 } else { 650 };
                Some(mb * 1024 * 1024)
            } else if s.contains("DVD") {
                Some(4480 * 1024 * 1024)
            } else if s.contains("FAT32") {
                Some(4 * 1024 * 1024 * 1024 - 1)
            } else {
                s.parse::<u64>().ok()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_sizes_parse() {
        let parse = |s: &str| parse_volume_size(s).unwrap();
        assert_eq!(parse("No splitting"), None);
        assert_eq!(parse("  "), None);
        assert_eq!(parse("100MB"), Some(100 * 1024 * 1024));
        assert_eq!(parse("2 gb"), Some(2 * 1024 * 1024 * 1024));
        assert_eq!(parse("512 KB"), Some(512 * 1024));
        assert_eq!(parse("12345"), Some(12345));
        assert_eq!(parse("DVD"), Some(4480 * 1024 * 1024));
        assert_eq!(parse("FAT32"), Some(4 * 1024 * 1024 * 1024 - 1));
        for junk in ["lots", "0", "-MB"] {
            assert!(matches!(
                parse_volume_size(junk),
                Err(ArchiveError::Validation(_))
            ), "{junk}");
        }
    }

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1024 * 1024), "1 MB");
    }

    #[test]
    fn absent_password_forces_no_cipher() {
        let spec = ArchiveSpec::zip(ZipSettings {
            cipher: ZipCipher::Aes,
            encrypt_headers: false,
        });
        assert_eq!(spec.effective_zip_cipher(), ZipCipher::None);

        let spec = spec.with_password(Some(String::new()));
        assert_eq!(spec.effective_password(), None);
        assert_eq!(spec.effective_zip_cipher(), ZipCipher::None);

        let spec = spec.with_password(Some("pw".into()));
        assert_eq!(spec.effective_zip_cipher(), ZipCipher::Aes);
    }

    #[test]
    fn test_report_caps_displayed_errors() {
        let report = TestReport {
            tested_count: 2,
            total_bytes: 10,
            errors: (0..8).map(|i| format!("Error in file 'f{i}': boom")).collect(),
            ..Default::default()
        };
        assert!(!report.success());
        let msg = report.message();
        assert!(msg.contains("8 error(s)"));
        assert!(msg.contains("f4"));
        assert!(!msg.contains("f5"));
    }
}
