use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gft", author, version, about = "Archive, encrypt and split files", long_about = None)]
pub struct Cli {
    /// Debug-level logs
    #[arg(short, long, global = true, env = "GF_FILE_TOOL_VERBOSE",
          action = ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    pub verbose: bool,

    /// Errors only, no progress bars
    #[arg(short, long, global = true, env = "GF_FILE_TOOL_QUIET",
          action = ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Passphrase, salt and key sizing shared by every encrypting command.
#[derive(Args, Clone, Default)]
pub struct KeyArgs {
    /// Passphrase (prompted for when omitted)
    #[arg(short = 'k', long = "key", env = "GF_FILE_TOOL_KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// Key length in bytes (AES: 16/24/32, DES: 8)
    #[arg(short = 'l', long = "key-length")]
    pub key_length: Option<usize>,

    /// Salt as hex (generated when encrypting without one)
    #[arg(long)]
    pub salt: Option<String>,
}

#[derive(Args)]
pub struct CompressArgs {
    /// Files or directories to archive
    #[arg(required = true)]
    pub sources: Vec<PathBuf>,

    /// Archive path (default: <first source>.<format>)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// zip or tar.gz
    #[arg(short, long, default_value = "zip")]
    pub format: String,

    /// Volume size in bytes; 0 disables splitting
    #[arg(short, long = "split", default_value_t = 0)]
    pub split: u64,

    /// Encrypt every entry
    #[arg(short, long)]
    pub encrypt: bool,

    /// Cipher: aes (default) or des
    #[arg(short, long, default_value = "aes")]
    pub algorithm: String,

    #[command(flatten)]
    pub keys: KeyArgs,

    /// Compute and check the archive CRC-32
    #[arg(short = 'r', long)]
    pub verify: bool,

    /// Write a <output>.split manifest next to the volumes
    #[arg(short, long)]
    pub manifest: bool,
}

#[derive(Args)]
pub struct DecompressArgs {
    /// Archive, one of its volumes, or its .split manifest
    pub source: PathBuf,

    /// Destination directory (default: <archive name>_unzip)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// zip or tar.gz (detected from the name when omitted)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Archive is encrypted
    #[arg(short, long)]
    pub encrypt: bool,

    /// Cipher override (normally read from the archive)
    #[arg(short, long)]
    pub algorithm: Option<String>,

    #[command(flatten)]
    pub keys: KeyArgs,

    /// Report CRC-32 of the archive and check split manifests
    #[arg(short = 'r', long)]
    pub verify: bool,

    /// Expected archive CRC-32 (hex)
    #[arg(short, long = "crc32")]
    pub crc32: Option<String>,
}

#[derive(Args)]
pub struct CryptArgs {
    /// Files or directories
    #[arg(required = true)]
    pub sources: Vec<PathBuf>,

    /// Output file (one source) or directory (several)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Cipher: aes (default) or des
    #[arg(short, long, default_value = "aes")]
    pub algorithm: String,

    #[command(flatten)]
    pub keys: KeyArgs,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Pack files into a zip or tar.gz archive
    Compress(CompressArgs),

    /// Extract an archive or a volume set
    Decompress(DecompressArgs),

    /// Encrypt files one by one to <file>.enc
    Encrypt(CryptArgs),

    /// Decrypt files produced by `encrypt`
    Decrypt(CryptArgs),

    /// Print the CRC-32 of a file
    Crc32 {
        file: PathBuf,
    },

    /// Join <base>.001, <base>.002, ... back into one file
    Merge {
        /// Base name or any volume of the set
        source: PathBuf,

        /// Output path (default: <base>_merged)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Check the result against the .split manifest
        #[arg(short = 'r', long)]
        verify: bool,
    },
}
