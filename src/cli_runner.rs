//! Executes parsed CLI commands against [`Archiver`].
//!
//! Each core operation runs on a blocking worker; this module only resolves
//! passwords, builds requests and prints results.

use crate::cli::{self, Args, Commands};
use crate::common::{format_bytes, parse_volume_size, ArchiveFormat, ArchiveSpec, EntryInfo};
use crate::config::Settings;
use crate::ops::{self, Archiver, SevenZipRequest, ZipRequest};
use crate::worker::run_blocking;
use std::error::Error;
use std::path::PathBuf;

/// Runs one CLI command. Any returned error means exit code 1.
pub async fn run_cli_app(args: Args) -> Result<(), Box<dyn Error>> {
    let mut settings = Settings::from_env();
    if let Some(dir) = args.sfx_dir {
        settings = settings.with_sfx_dir(dir);
    }
    let archiver = Archiver::new(settings);

    match args.command {
        Commands::Add {
            inputs,
            archive,
            kind,
            level,
            password,
            solid,
            method,
            encrypt_headers,
            cipher,
            sfx,
            volume,
        } => {
            let password = cli::resolve_password(&password)?;
            let volume_size = match volume.as_deref() {
                Some(v) => parse_volume_size(v)?,
                None => None,
            };
            let format = kind
                .or_else(|| ArchiveFormat::from_extension(&archive))
                .unwrap_or(ArchiveFormat::Zip);
            let spec = match format {
                ArchiveFormat::Zip => ZipRequest {
                    level,
                    password,
                    cipher,
                    encrypt_headers,
                    volume_size,
                    sfx,
                }
                .to_spec(),
                ArchiveFormat::SevenZip => SevenZipRequest {
                    level,
                    solid,
                    method,
                    password,
                    encrypt_headers,
                    volume_size,
                    sfx,
                }
                .to_spec(),
            };
            let created = create(&archiver, inputs, archive, spec).await?;
            println!("Created {}", created.display());
        }

        Commands::Extract {
            archive,
            entries,
            output,
            password,
        } => {
            let password = cli::resolve_password(&password)?;
            let destination = output.unwrap_or_else(|| PathBuf::from("."));
            extract(&archiver, archive, destination, password, entries).await?;
        }

        Commands::List {
            archive,
            json,
            password,
        } => {
            let password = cli::resolve_password(&password)?;
            let a = archiver.clone();
            let entries = run_blocking(move || a.list(&archive, password.as_deref())).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                print_listing(&entries);
            }
        }

        Commands::Test { archive, password } => {
            let password = cli::resolve_password(&password)?;
            let a = archiver.clone();
            let report = run_blocking(move || Ok(a.test(&archive, password.as_deref()))).await?;
            if !report.success() {
                return Err(report.message().into());
            }
            println!("{}", report.message());
        }

        Commands::Repair { archive, output } => {
            let a = archiver.clone();
            let report = run_blocking(move || a.repair(&archive, &output)).await?;
            if !report.success() {
                return Err(report.message().into());
            }
            println!("{}", report.message());
        }

        Commands::ExtractHere { archives, password } => {
            let password = cli::resolve_password(&password)?;
            for archive in archives {
                let destination = ops::here_destination(&archive);
                extract(&archiver, archive, destination, password.clone(), Vec::new()).await?;
            }
        }

        Commands::ExtractToSubdir { archive, password } => {
            let password = cli::resolve_password(&password)?;
            let destination = ops::subdir_destination(&archive)?;
            extract(&archiver, archive, destination, password, Vec::new()).await?;
        }

        Commands::CompressZip { inputs } => {
            let output = ops::quick_output_path(&inputs, ArchiveFormat::Zip)?;
            let spec = ArchiveSpec::default_for(ArchiveFormat::Zip);
            let created = create(&archiver, inputs, output, spec).await?;
            println!("Created {}", created.display());
        }

        Commands::Compress7z { inputs } => {
            let output = ops::quick_output_path(&inputs, ArchiveFormat::SevenZip)?;
            let spec = ArchiveSpec::default_for(ArchiveFormat::SevenZip);
            let created = create(&archiver, inputs, output, spec).await?;
            println!("Created {}", created.display());
        }
    }

    Ok(())
}

async fn create(
    archiver: &Archiver,
    inputs: Vec<PathBuf>,
    output: PathBuf,
    spec: ArchiveSpec,
) -> Result<PathBuf, Box<dyn Error>> {
    let a = archiver.clone();
    Ok(run_blocking(move || a.create(inputs.as_slice(), &output, &spec)).await?)
}

async fn extract(
    archiver: &Archiver,
    archive: PathBuf,
    destination: PathBuf,
    password: Option<String>,
    only: Vec<String>,
) -> Result<(), Box<dyn Error>> {
    let a = archiver.clone();
    let shown = destination.display().to_string();
    let summary = run_blocking(move || {
        a.extract(&archive, &destination, password.as_deref(), &only)
    })
    .await?;
    println!(
        "Extracted {} file(s), {} to {}",
        summary.files,
        format_bytes(summary.bytes),
        shown
    );
    Ok(())
}

fn print_listing(entries: &[EntryInfo]) {
    println!(
        "{:<5} {:<19} {:>12} {:>12}  Name",
        "Mode", "Last Modified", "Size", "Compressed"
    );
    let mut total = 0u64;
    for e in entries {
        let mode = format!(
            "{}{}",
            if e.is_dir { 'd' } else { '-' },
            if e.is_encrypted { 'e' } else { '-' }
        );
        let modified = e
            .last_modified
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        println!(
            "{:<5} {:<19} {:>12} {:>12}  {}",
            mode, modified, e.size, e.compressed_size, e.key
        );
        total += e.size;
    }
    println!("{} entries, {}", entries.len(), format_bytes(total));
}
