//! # unpack Core Library
//!
//! This crate provides the archive assembly and verification engine behind the
//! `unpack` command-line application: it turns a set of filesystem paths into a
//! ZIP or 7z container, turns containers back into files, verifies them and
//! salvages what it can from damaged ones.
//!
//! ## Key Modules
//!
//! - [`paths`]: Source selection and the common-base naming scheme for entries.
//! - [`walk`]: Recursive directory enumeration into entry lists.
//! - [`codec`]: The container capability boundary and its ZIP/7z backends.
//! - [`archive`]: Archive creation, including self-extracting builds.
//! - [`extract`]: Extraction and listing.
//! - [`integrity`]: Read-everything integrity tests.
//! - [`repair`]: Best-effort salvage into a fresh container.
//! - [`sfx`]: Stub + container byte composition.
//! - [`ops`]: The [`Archiver`] facade used by the CLI.
//!
//! ## Examples
//!
//! ```no_run
//! use std::path::Path;
//! use unpack::{Archiver, ZipRequest};
//!
//! let archiver = Archiver::default();
//! archiver.create_zip(&["photos", "notes.txt"], Path::new("backup.zip"), &ZipRequest::default())?;
//! let report = archiver.test(Path::new("backup.zip"), None);
//! println!("{}", report.message());
//! # Ok::<(), unpack::ArchiveError>(())
//! ```

pub mod archive;
pub mod cli;
pub mod cli_runner;
pub mod codec;
pub mod common;
pub mod config;
pub mod error;
pub mod extract;
pub mod integrity;
pub mod logging;
pub mod ops;
pub mod paths;
pub mod repair;
pub mod sfx;
pub mod walk;
pub mod worker;

// Cross-platform filesystem wrapper
pub mod fsx;

pub use error::{ArchiveError, Result};
pub use ops::{Archiver, SevenZipRequest, ZipRequest};
