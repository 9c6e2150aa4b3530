pub mod handlers;
pub mod progress;

use crate::presentation::cli::{Cli, Commands};
use gft_core::error::Result;
use gft_core::session::Session;
use std::process::ExitCode;

/// Runs one subcommand. `Ok(FAILURE)` means some batch items failed.
pub fn run(cli: Cli, session: &Session<'_>) -> Result<ExitCode> {
    match cli.command {
        Commands::Compress(args) => handlers::handle_compress(args, session),
        Commands::Decompress(args) => handlers::handle_decompress(args, session),
        Commands::Encrypt(args) => handlers::handle_encrypt(args, session),
        Commands::Decrypt(args) => handlers::handle_decrypt(args, session),
        Commands::Crc32 { file } => handlers::handle_crc32(file),
        Commands::Merge {
            source,
            output,
            verify,
        } => handlers::handle_merge(source, output, verify, session),
    }
}
