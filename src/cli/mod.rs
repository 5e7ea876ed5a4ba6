use crate::common::{ArchiveFormat, CompressionLevel, SevenZipMethod, ZipCipher};
use crate::config::PASSWORD_ENV;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Log debug output to stderr (overrides UNPACK_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding the SFX stub executables. Defaults to `SFXModules` next to the binary.
    #[arg(long, global = true, env = "UNPACK_SFX_DIR")]
    pub sfx_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Password sources shared by every command that reads or writes encrypted data.
#[derive(ClapArgs, Clone, Debug, Default)]
pub struct PasswordArgs {
    /// Password for encryption or decryption. Falls back to UNPACK_PASSWORD.
    #[arg(long)]
    pub password: Option<String>,

    /// Prompt for the password on the terminal when none was given.
    #[arg(long)]
    pub ask_password: bool,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Create an archive from files and directories.
    #[command(alias = "a")]
    Add {
        /// Files or directories to add.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// The archive to create (e.g., backup.7z).
        #[arg(short, long)]
        archive: PathBuf,

        /// Container format. Inferred from the archive extension when omitted.
        #[arg(long = "type", value_enum)]
        kind: Option<ArchiveFormat>,

        /// Compression level.
        #[arg(short, long, value_enum, default_value_t = CompressionLevel::Normal)]
        level: CompressionLevel,

        #[command(flatten)]
        password: PasswordArgs,

        /// 7z only: pack all files into one solid block.
        #[arg(long)]
        solid: bool,

        /// 7z only: compression method.
        #[arg(long = "7z-method", value_enum, default_value_t = SevenZipMethod::Lzma2)]
        method: SevenZipMethod,

        /// Encrypt entry names as well as contents (7z only; rejected for ZIP).
        #[arg(long)]
        encrypt_headers: bool,

        /// ZIP only: entry cipher used when a password is set.
        #[arg(long = "zip-method", value_enum, default_value_t = ZipCipher::Aes)]
        cipher: ZipCipher,

        /// Produce a self-extracting executable.
        #[arg(long)]
        sfx: bool,

        /// Split into volumes of SIZE (e.g. 100MB, "700 MB (CD)", DVD). Not supported yet.
        #[arg(long, value_name = "SIZE")]
        volume: Option<String>,
    },

    /// Extract an archive.
    #[command(alias = "x")]
    Extract {
        #[arg(required = true)]
        archive: PathBuf,

        /// Entry names or directory prefixes to extract. All entries when empty.
        entries: Vec<String>,

        /// Destination directory. Defaults to the current directory.
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        password: PasswordArgs,
    },

    /// List archive contents sorted by name.
    #[command(alias = "l")]
    List {
        #[arg(required = true)]
        archive: PathBuf,

        /// Print entries as JSON.
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        password: PasswordArgs,
    },

    /// Decode every entry without writing files.
    #[command(alias = "t")]
    Test {
        #[arg(required = true)]
        archive: PathBuf,

        #[command(flatten)]
        password: PasswordArgs,
    },

    /// Copy every readable entry of a damaged archive into a new one.
    Repair {
        #[arg(required = true)]
        archive: PathBuf,

        /// Output archive; `.7z` produces 7z, anything else ZIP.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Extract each archive into the directory that contains it.
    ExtractHere {
        #[arg(required = true)]
        archives: Vec<PathBuf>,

        #[command(flatten)]
        password: PasswordArgs,
    },

    /// Extract into a new folder named after the archive.
    ExtractToSubdir {
        #[arg(required = true)]
        archive: PathBuf,

        #[command(flatten)]
        password: PasswordArgs,
    },

    /// Compress the selection to a ZIP named after it, with default settings.
    CompressZip {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Compress the selection to a 7z named after it, with default settings.
    #[command(name = "compress-7z")]
    Compress7z {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

/// Gets the password from the command-line option, the `UNPACK_PASSWORD`
/// environment variable or, when `--ask-password` is set, an interactive prompt.
///
/// Returns `Ok(None)` when no source yields one; empty strings count as absent.
pub fn resolve_password(args: &PasswordArgs) -> Result<Option<String>, std::io::Error> {
    if let Some(pass) = args.password.clone().filter(|p| !p.is_empty()) {
        return Ok(Some(pass));
    }
    if let Ok(pass) = std::env::var(PASSWORD_ENV) {
        if !pass.is_empty() {
            return Ok(Some(pass));
        }
    }
    if args.ask_password {
        let pass = rpassword::prompt_password("Password: ")?;
        return Ok(Some(pass).filter(|p| !p.is_empty()));
    }
    Ok(None)
}

/// Parses command-line arguments.
pub fn parse() -> Args {
    Args::parse()
}
