use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use gft_core::codec::zip::is_encrypted;
use gft_core::crypto::kdf::parse_salt;
use gft_core::error::{GftError, Result};
use gft_core::hash::crc32;
use gft_core::pack::walker::collect;
use gft_core::session::Session;
use gft_core::volume::detect;
use gft_core::{
    BatchReport, BatchRequest, CompressRequest, DecompressRequest, EncryptOptions, Format,
    ManifestCheck, OpenParams, compress, decompress, decrypt_batch, encrypt_batch, merge_verified,
};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::presentation::cli::{CompressArgs, CryptArgs, DecompressArgs, KeyArgs};

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

/// Passphrase from `--key` / `GF_FILE_TOOL_KEY`, else from the terminal.
fn passphrase(keys: &KeyArgs, confirm: bool) -> Result<Zeroizing<Vec<u8>>> {
    if let Some(k) = &keys.key {
        return Ok(Zeroizing::new(k.as_bytes().to_vec()));
    }
    let first = Zeroizing::new(rpassword::prompt_password("Passphrase: ")?);
    if first.is_empty() {
        return Err(GftError::InvalidRequest("passphrase must not be empty".into()));
    }
    if confirm {
        let again = Zeroizing::new(rpassword::prompt_password("Repeat passphrase: ")?);
        if *again != *first {
            return Err(GftError::InvalidRequest("passphrases do not match".into()));
        }
    }
    Ok(Zeroizing::new(first.as_bytes().to_vec()))
}

/// Drops sources that do not exist, warning for each.
fn existing_sources(sources: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let kept: Vec<PathBuf> = sources
        .iter()
        .filter(|p| {
            let ok = p.exists();
            if !ok {
                warn!(path = %p.display(), "source does not exist; skipped");
            }
            ok
        })
        .cloned()
        .collect();
    if kept.is_empty() {
        return Err(GftError::InvalidRequest("none of the sources exist".into()));
    }
    Ok(kept)
}

/// `dir/report` → `report.zip`, next to the current directory.
fn default_archive_name(first: &Path, format: Format) -> PathBuf {
    let canonical = std::fs::canonicalize(first).unwrap_or_else(|_| first.to_path_buf());
    let stem = canonical
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    PathBuf::from(format!("{stem}.{}", format.extension()))
}

fn ensure_extension(output: PathBuf, format: Format) -> PathBuf {
    let name = output.to_string_lossy().to_ascii_lowercase();
    let has = match format {
        Format::Zip => name.ends_with(".zip"),
        Format::TarGz => name.ends_with(".tar.gz") || name.ends_with(".tgz"),
    };
    if has {
        output
    } else {
        with_suffix(&output, &format!(".{}", format.extension()))
    }
}

/// `a/b.zip.002` → `a/b_unzip`.
fn default_extract_dir(source: &Path) -> PathBuf {
    let base = detect(source).unwrap_or_else(|| source.to_path_buf());
    let name = base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let lower = name.to_ascii_lowercase();
    let stem_len = [".tar.gz", ".tgz", ".zip"]
        .iter()
        .find(|ext| lower.ends_with(*ext))
        .map_or(name.len(), |ext| name.len() - ext.len());
    base.with_file_name(format!("{}_unzip", &name[..stem_len]))
}

/// `a/b.zip.001` → `a/b.zip_merged`.
fn default_merge_output(source: &Path) -> PathBuf {
    let base = detect(source).unwrap_or_else(|| source.to_path_buf());
    with_suffix(&base, "_merged")
}

/// Whether the archive, whole or split, announces encryption without being
/// told so.
fn archive_wants_key(source: &Path, format: Option<Format>) -> bool {
    if format.or_else(|| Format::detect(source)) != Some(Format::Zip) {
        return false;
    }
    is_encrypted(source).unwrap_or(false)
}

pub fn handle_compress(args: CompressArgs, session: &Session<'_>) -> Result<ExitCode> {
    let format = Format::from_name(&args.format)?;
    let archiver = format.archiver();
    if args.encrypt && !archiver.supports_encryption() {
        return Err(GftError::UnsupportedFeature(format!(
            "{format} archives cannot be encrypted"
        )));
    }
    if args.split > 0 && !archiver.supports_split() {
        return Err(GftError::UnsupportedFeature(format!(
            "{format} archives cannot be split into volumes"
        )));
    }

    let roots = existing_sources(&args.sources)?;
    let output = match args.output {
        Some(o) => ensure_extension(o, format),
        None => default_archive_name(&roots[0], format),
    };
    let encrypt = if args.encrypt {
        Some(EncryptOptions {
            passphrase: passphrase(&args.keys, true)?,
            salt_hex: args.keys.salt.clone(),
            key_len: args.keys.key_length,
            cipher: args.algorithm.clone(),
        })
    } else {
        if args.keys.key.is_some() {
            debug!("key given without --encrypt; archive is written in the clear");
        }
        None
    };

    let req = CompressRequest {
        sources: collect(&roots)?,
        output,
        format,
        volume_size: args.split,
        encrypt,
        verify: args.verify,
        write_manifest: args.manifest,
    };
    let report = compress(&req, session)?;

    if report.volumes.is_empty() {
        println!("archive: {}", report.output.display());
    } else {
        for v in &report.volumes {
            println!("volume:  {}", v.display());
        }
    }
    if let Some(m) = &report.manifest {
        println!("manifest: {}", m.display());
    }
    println!("entries: {}", report.entries);
    if let Some(crc) = &report.crc32 {
        println!("crc32:   {crc}");
    }
    if let Some(salt) = &report.salt_hex {
        println!("salt:    {salt}");
    }
    Ok(ExitCode::SUCCESS)
}

pub fn handle_decompress(args: DecompressArgs, session: &Session<'_>) -> Result<ExitCode> {
    let format = args.format.as_deref().map(Format::from_name).transpose()?;
    let dest = args
        .output
        .clone()
        .unwrap_or_else(|| default_extract_dir(&args.source));

    let decrypt = if args.encrypt || archive_wants_key(&args.source, format) {
        Some(OpenParams {
            passphrase: passphrase(&args.keys, false)?,
            salt: args.keys.salt.as_deref().map(parse_salt).transpose()?,
            key_len: args.keys.key_length,
            cipher: args.algorithm.clone(),
        })
    } else {
        None
    };

    let req = DecompressRequest {
        source: args.source,
        dest,
        format,
        decrypt,
        verify: args.verify,
        expected_crc: args.crc32,
    };
    let report = decompress(&req, session)?;

    println!("extracted {} file(s) to {}", report.files.len(), req.dest.display());
    if session.verbose() || args.verify {
        for f in &report.files {
            println!("{}  {}", crc32::to_hex(f.crc32), f.path.display());
        }
    }
    if let Some(crc) = &report.archive_crc {
        println!("archive crc32: {crc}");
    }
    match report.checksum_ok {
        Some(true) => println!("checksum: OK"),
        Some(false) => eprintln!("checksum: MISMATCH"),
        None => {}
    }
    Ok(ExitCode::SUCCESS)
}

fn batch_request(args: &CryptArgs, confirm: bool) -> Result<BatchRequest> {
    Ok(BatchRequest {
        sources: args.sources.clone(),
        output: args.output.clone(),
        passphrase: passphrase(&args.keys, confirm)?,
        salt_hex: args.keys.salt.clone(),
        key_len: args.keys.key_length,
        cipher: args.algorithm.clone(),
    })
}

fn print_batch(report: &BatchReport) -> ExitCode {
    for (src, dst) in &report.succeeded {
        println!("{} -> {}", src.display(), dst.display());
    }
    for (src, err) in &report.failed {
        eprintln!("failed: {}: {err}", src.display());
    }
    if let Some(salt) = &report.salt_hex {
        println!("salt: {salt}");
    }
    if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        eprintln!(
            "{} of {} file(s) failed",
            report.failed.len(),
            report.failed.len() + report.succeeded.len()
        );
        ExitCode::FAILURE
    }
}

pub fn handle_encrypt(args: CryptArgs, session: &Session<'_>) -> Result<ExitCode> {
    let req = batch_request(&args, true)?;
    let report = encrypt_batch(&req, session)?;
    Ok(print_batch(&report))
}

pub fn handle_decrypt(args: CryptArgs, session: &Session<'_>) -> Result<ExitCode> {
    let req = batch_request(&args, false)?;
    let report = decrypt_batch(&req, session)?;
    Ok(print_batch(&report))
}

pub fn handle_crc32(file: PathBuf) -> Result<ExitCode> {
    let crc = crc32::checksum_hex(&file)?;
    println!("{crc}  {}", file.display());
    Ok(ExitCode::SUCCESS)
}

pub fn handle_merge(
    source: PathBuf,
    output: Option<PathBuf>,
    verify: bool,
    session: &Session<'_>,
) -> Result<ExitCode> {
    let output = output.unwrap_or_else(|| default_merge_output(&source));
    let tick = session.progress.bytes("merging", 0);
    let report = merge_verified(&source, &output, verify, tick.as_ref())?;
    tick.finish();

    println!(
        "merged {} volume(s) into {}",
        report.volumes.len(),
        report.output.display()
    );
    println!("crc32: {}", report.crc32);
    match report.manifest {
        Some(ManifestCheck::Matched) => println!("manifest: OK"),
        Some(ManifestCheck::Absent) => println!("manifest: absent, not verified"),
        Some(ManifestCheck::Mismatch { expected, actual }) => {
            return Err(GftError::ChecksumMismatch {
                path: report.output,
                expected,
                actual,
            });
        }
        None => {}
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_name_follows_first_source() {
        assert_eq!(
            default_archive_name(Path::new("/no/such/report"), Format::Zip),
            PathBuf::from("report.zip")
        );
        assert_eq!(
            default_archive_name(Path::new("/no/such/report"), Format::TarGz),
            PathBuf::from("report.tar.gz")
        );
    }

    #[test]
    fn extension_is_appended_once() {
        assert_eq!(
            ensure_extension(PathBuf::from("out"), Format::Zip),
            PathBuf::from("out.zip")
        );
        assert_eq!(
            ensure_extension(PathBuf::from("out.ZIP"), Format::Zip),
            PathBuf::from("out.ZIP")
        );
        assert_eq!(
            ensure_extension(PathBuf::from("out.tgz"), Format::TarGz),
            PathBuf::from("out.tgz")
        );
        assert_eq!(
            ensure_extension(PathBuf::from("out.zip"), Format::TarGz),
            PathBuf::from("out.zip.tar.gz")
        );
    }

    #[test]
    fn extract_dir_strips_volume_and_format_suffix() {
        assert_eq!(
            default_extract_dir(Path::new("a/b.zip")),
            PathBuf::from("a/b_unzip")
        );
        assert_eq!(
            default_extract_dir(Path::new("a/b.zip.002")),
            PathBuf::from("a/b_unzip")
        );
        assert_eq!(
            default_extract_dir(Path::new("b.tar.gz")),
            PathBuf::from("b_unzip")
        );
        assert_eq!(default_extract_dir(Path::new("b.bin")), PathBuf::from("b.bin_unzip"));
    }

    #[test]
    fn merge_output_sits_next_to_base() {
        assert_eq!(
            default_merge_output(Path::new("d/x.zip.001")),
            PathBuf::from("d/x.zip_merged")
        );
        assert_eq!(
            default_merge_output(Path::new("d/x.zip")),
            PathBuf::from("d/x.zip_merged")
        );
    }

    #[test]
    fn explicit_key_skips_the_prompt() {
        let keys = KeyArgs {
            key: Some("pw".into()),
            ..Default::default()
        };
        assert_eq!(passphrase(&keys, true).unwrap().as_slice(), b"pw");
    }

    #[test]
    fn missing_sources_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("a");
        std::fs::write(&real, b"x").unwrap();
        let kept = existing_sources(&[real.clone(), dir.path().join("ghost")]).unwrap();
        assert_eq!(kept, vec![real]);
        assert!(existing_sources(&[dir.path().join("ghost")]).is_err());
    }

    #[test]
    fn plain_zip_does_not_ask_for_a_key() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in");
        std::fs::create_dir(&src).unwrap();
        std::fs::write(src.join("f"), b"data").unwrap();
        let out = dir.path().join("p.zip");
        let req = CompressRequest {
            sources: collect(&[src]).unwrap(),
            output: out.clone(),
            format: Format::Zip,
            volume_size: 0,
            encrypt: None,
            verify: false,
            write_manifest: false,
        };
        compress(&req, &Session::silent()).unwrap();
        assert!(!archive_wants_key(&out, None));
    }

    #[test]
    fn encrypted_volume_set_asks_for_a_key() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in");
        std::fs::create_dir(&src).unwrap();
        std::fs::write(src.join("f"), b"secret data ".repeat(300)).unwrap();
        let out = dir.path().join("s.zip");
        let req = CompressRequest {
            sources: collect(&[src]).unwrap(),
            output: out.clone(),
            format: Format::Zip,
            volume_size: 64,
            encrypt: Some(EncryptOptions::new("pw")),
            verify: false,
            write_manifest: true,
        };
        let rep = compress(&req, &Session::silent()).unwrap();
        assert!(rep.volumes.len() > 1);
        assert!(archive_wants_key(&rep.volumes[0], None));
        assert!(archive_wants_key(&out.with_extension("zip.split"), None));
        assert!(archive_wants_key(&out, None));
        assert!(!archive_wants_key(&rep.volumes[0], Some(Format::TarGz)));
    }
}
