//! Deflate zip archives, optionally with encrypted entries.
//!
//! Encrypted entries are deflated first, framed by the cipher, and stored
//! without a second compression pass. The archive comment records the salt,
//! the key length and (for non-default ciphers) the algorithm.

use crate::codec::{
    Archiver, ExtractedFile, Format, OpenParams, SealParams, SourceEntry, write_entry,
};
use crate::container::comment::EncryptionComment;
use crate::container::frame::EntryHeader;
use crate::crypto::aead::{OpenReader, SealWriter};
use crate::crypto::cipher::{Capability, DEFAULT_CIPHER, lookup};
use crate::crypto::file::{check_salt, read_block_entry, seal_block_entry};
use crate::crypto::kdf::{KeyCache, parse_salt};
use crate::crypto::nonce::NonceLedger;
use crate::error::{GftError, Result};
use crate::session::{Session, Tick};
use crate::util::io::{copy_with, sync_close};
use crate::util::sanitize::{entry_name, safe_join};
use crate::volume::is_split_input;
use crate::volume::merge::{base_of, enumerate};
use ::zip::write::SimpleFileOptions;
use ::zip::{CompressionMethod, ZipArchive, ZipWriter};
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Entries at or above this size are written with zip64 extensions.
const LARGE_FILE: u64 = 0xF000_0000;

pub struct ZipArchiver;

impl Archiver for ZipArchiver {
    fn format(&self) -> Format {
        Format::Zip
    }

    fn supports_split(&self) -> bool {
        true
    }

    fn supports_encryption(&self) -> bool {
        true
    }

    fn write(
        &self,
        entries: &[SourceEntry],
        dest: &Path,
        seal: Option<&SealParams<'_>>,
        session: &Session<'_>,
    ) -> Result<()> {
        let mut zip = ZipWriter::new(BufWriter::new(File::create(dest)?));
        let mut nonces = NonceLedger::new();
        let batch = session.progress.batch("archiving", entries.len() as u64);

        for e in entries {
            let name = entry_name(&e.rel);
            let base = SimpleFileOptions::default()
                .unix_permissions(e.mode)
                .large_file(e.size >= LARGE_FILE);
            let mut src = BufReader::new(File::open(&e.path)?);
            let tick = session.progress.bytes(&name, e.size);

            match seal {
                None => {
                    zip.start_file(name.as_str(), base.compression_method(CompressionMethod::Deflated))?;
                    copy_with(&mut src, &mut zip, tick.as_ref())?;
                }
                Some(p) => {
                    zip.start_file(name.as_str(), base.compression_method(CompressionMethod::Stored))?;
                    seal_entry(&mut src, &mut zip, p, &mut nonces, tick.as_ref())?;
                }
            }
            tick.finish();
            batch.inc(1);
            debug!(entry = %name, size = e.size, "entry written");
        }

        if let Some(p) = seal {
            let comment = EncryptionComment {
                salt_hex: Some(p.salt_hex.to_string()),
                key_length: Some(p.key.len()),
                algorithm: (!p.cap.is_default()).then(|| p.cap.name().to_string()),
            };
            zip.set_comment(comment.render());
        }
        let buf = zip.finish()?;
        sync_close(buf.into_inner().map_err(|e| e.into_error())?)?;
        batch.finish();
        info!(archive = %dest.display(), entries = entries.len(), encrypted = seal.is_some(), "zip written");
        Ok(())
    }

    fn read(
        &self,
        archive: &Path,
        dest: &Path,
        open: Option<&OpenParams>,
        written: &mut Vec<PathBuf>,
        session: &Session<'_>,
    ) -> Result<Vec<ExtractedFile>> {
        let mut zip = ZipArchive::new(BufReader::new(File::open(archive)?))?;
        let comment = EncryptionComment::parse(&String::from_utf8_lossy(zip.comment()));
        let mut plan = DecryptPlan::resolve(comment.as_ref(), open)?;

        let batch = session.progress.batch("extracting", zip.len() as u64);
        let mut out = Vec::new();
        for i in 0..zip.len() {
            // one entry's handles are dropped before the next is opened
            let mut entry = zip.by_index(i)?;
            let name = entry.name().to_string();
            let target = safe_join(dest, &name)?;
            if entry.is_dir() {
                fs::create_dir_all(&target)?;
                batch.inc(1);
                continue;
            }
            let mode = entry.unix_mode();
            let file = match plan.as_mut() {
                Some(plan) => open_entry(&mut entry, &target, mode, plan, written, session)?,
                None => write_entry(&mut entry, &target, mode, written, session)?,
            };
            debug!(entry = %name, size = file.size, crc = %format!("{:08x}", file.crc32), "extracted");
            out.push(file);
            batch.inc(1);
        }
        batch.finish();
        Ok(out)
    }
}

const EOCD_SIGNATURE: [u8; 4] = *b"PK\x05\x06";
const EOCD_LEN: usize = 22;
const MAX_COMMENT: usize = u16::MAX as usize;

/// Whether a zip, whole or split into volumes, carries the encryption
/// comment. Only the tail holding the end-of-central-directory record is
/// read, so a volume set is probed without merging it.
pub fn is_encrypted(archive: &Path) -> Result<bool> {
    let parts = if is_split_input(archive) {
        enumerate(&base_of(archive))?
    } else {
        vec![archive.to_path_buf()]
    };
    let tail = read_tail(&parts, (EOCD_LEN + MAX_COMMENT) as u64)?;
    let Some(comment) = eocd_comment(&tail) else {
        return Err(GftError::CorruptContainer(format!(
            "{}: no zip end-of-central-directory record",
            archive.display()
        )));
    };
    Ok(EncryptionComment::parse(&String::from_utf8_lossy(comment)).is_some())
}

/// Last `want` bytes of the concatenation of `parts`.
fn read_tail(parts: &[PathBuf], want: u64) -> Result<Vec<u8>> {
    let mut pieces = Vec::new();
    let mut left = want;
    for part in parts.iter().rev() {
        if left == 0 {
            break;
        }
        let mut f = File::open(part)?;
        let len = f.metadata()?.len();
        let take = len.min(left);
        f.seek(SeekFrom::Start(len - take))?;
        let mut buf = Vec::with_capacity(take as usize);
        f.take(take).read_to_end(&mut buf)?;
        pieces.push(buf);
        left -= take;
    }
    pieces.reverse();
    Ok(pieces.concat())
}

/// The comment of the end record whose length field reaches exactly to the
/// end of `tail`.
fn eocd_comment(tail: &[u8]) -> Option<&[u8]> {
    let last = tail.len().checked_sub(EOCD_LEN)?;
    (0..=last).rev().find_map(|at| {
        if tail[at..at + 4] != EOCD_SIGNATURE {
            return None;
        }
        let len = u16::from_le_bytes([tail[at + 20], tail[at + 21]]) as usize;
        (at + EOCD_LEN + len == tail.len()).then(|| &tail[at + EOCD_LEN..])
    })
}

fn seal_entry(
    src: &mut dyn Read,
    zip: &mut dyn Write,
    p: &SealParams<'_>,
    nonces: &mut NonceLedger,
    tick: &dyn Tick,
) -> Result<()> {
    match p.cap {
        Capability::Streaming(cipher) => {
            let sealer = SealWriter::new(zip, cipher, p.key, nonces.fresh()?, p.salt)?;
            let mut deflater = DeflateEncoder::new(sealer, Compression::default());
            copy_with(src, &mut deflater, tick)?;
            let (_, chunks) = deflater.finish()?.finish()?;
            debug!(chunks, "entry sealed");
        }
        Capability::Block(cipher) => {
            let mut deflater = DeflateEncoder::new(Vec::new(), Compression::default());
            copy_with(src, &mut deflater, tick)?;
            let packed = Zeroizing::new(deflater.finish()?);
            seal_block_entry(zip, cipher, p.key, p.salt, &packed)?;
        }
    }
    Ok(())
}

/// Resolved decryption settings: explicit values win over the comment.
struct DecryptPlan<'a> {
    cap: Capability,
    expected_salt: Option<Vec<u8>>,
    keys: KeyCache<'a>,
}

impl<'a> DecryptPlan<'a> {
    fn resolve(
        comment: Option<&EncryptionComment>,
        open: Option<&'a OpenParams>,
    ) -> Result<Option<Self>> {
        let Some(open) = open else {
            if comment.is_some() {
                return Err(GftError::InvalidRequest(
                    "archive is encrypted; a passphrase is required".into(),
                ));
            }
            return Ok(None);
        };
        if comment.is_none() && open.salt.is_none() {
            warn!("archive carries no encryption marker and no salt was given; extracting as plain");
            return Ok(None);
        }
        if open.passphrase.is_empty() {
            return Err(GftError::InvalidRequest("passphrase must not be empty".into()));
        }
        let name = open
            .cipher
            .as_deref()
            .or(comment.and_then(|c| c.algorithm.as_deref()))
            .unwrap_or(DEFAULT_CIPHER);
        let cap = lookup(name)?;
        let key_len = open
            .key_len
            .or(comment.and_then(|c| c.key_length))
            .unwrap_or_else(|| cap.default_key_len());
        cap.check_key_len(key_len)?;
        let expected_salt = match (&open.salt, comment.and_then(|c| c.salt_hex.as_deref())) {
            (Some(s), _) => Some(s.clone()),
            (None, Some(hex)) => Some(parse_salt(hex)?),
            (None, None) => None,
        };
        Ok(Some(Self {
            cap,
            expected_salt,
            keys: KeyCache::new(&open.passphrase, key_len),
        }))
    }
}

fn open_entry(
    entry: &mut dyn Read,
    target: &Path,
    mode: Option<u32>,
    plan: &mut DecryptPlan<'_>,
    written: &mut Vec<PathBuf>,
    session: &Session<'_>,
) -> Result<ExtractedFile> {
    let cap = plan.cap;
    match cap {
        Capability::Streaming(cipher) => {
            let header = EntryHeader::read_from(&mut *entry)?;
            check_salt(plan.expected_salt.as_deref(), &header.salt)?;
            let key = plan.keys.get(&header.salt)?;
            let reader = OpenReader::resume(entry, header, cipher, key.as_bytes());
            let mut inflater = DeflateDecoder::new(reader);
            write_entry(&mut inflater, target, mode, written, session)
        }
        Capability::Block(cipher) => {
            let (header, ct) = read_block_entry(&mut *entry)?;
            check_salt(plan.expected_salt.as_deref(), &header.salt)?;
            let key = plan.keys.get(&header.salt)?;
            let packed = Zeroizing::new(cipher.decrypt(key.as_bytes(), &header.iv, &ct)?);
            let mut inflater = DeflateDecoder::new(&packed[..]);
            write_entry(&mut inflater, target, mode, written, session)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::frame::inspect;
    use crate::crypto::kdf::derive_key;

    fn source(dir: &Path, rel: &str, data: &[u8], mode: u32) -> SourceEntry {
        let path = dir.join("src").join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, data).unwrap();
        SourceEntry {
            path,
            size: data.len() as u64,
            mode,
            mtime: 0,
            rel: PathBuf::from(rel),
        }
    }

    fn open_params(pw: &[u8]) -> OpenParams {
        OpenParams {
            passphrase: Zeroizing::new(pw.to_vec()),
            ..Default::default()
        }
    }

    #[test]
    fn plain_round_trip_keeps_layout() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![
            source(dir.path(), "a.txt", b"alpha", 0o644),
            source(dir.path(), "sub/b.bin", &[0u8; 5000], 0o600),
        ];
        let archive = dir.path().join("out.zip");
        let s = Session::silent();
        ZipArchiver.write(&entries, &archive, None, &s).unwrap();

        assert!(!is_encrypted(&archive).unwrap());
        let dest = dir.path().join("x");
        let mut written = Vec::new();
        let files = ZipArchiver.read(&archive, &dest, None, &mut written, &s).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(fs::read(dest.join("a.txt")).unwrap(), b"alpha");
        assert_eq!(fs::read(dest.join("sub/b.bin")).unwrap(), vec![0u8; 5000]);
        assert_eq!(files[0].crc32, crc32fast::hash(b"alpha"));
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let m = fs::metadata(dest.join("sub/b.bin")).unwrap().permissions().mode();
            assert_eq!(m & 0o777, 0o600);
        }
    }

    #[test]
    fn encryption_is_detected_across_volumes() {
        use crate::session::{Progress, Silent};
        use crate::volume::split::split;
        use crate::volume::volume_path;

        let dir = tempfile::tempdir().unwrap();
        let entries = vec![source(dir.path(), "notes.txt", &b"volume text ".repeat(200), 0o644)];
        let salt = b"fedcba9876543210";
        let key = derive_key(b"pw", salt, 32).unwrap();
        let salt_hex = hex::encode(salt);
        let seal = SealParams {
            cap: lookup("aes").unwrap(),
            key: key.as_bytes(),
            salt,
            salt_hex: &salt_hex,
        };
        let s = Session::silent();
        let tick = Silent.bytes("", 0);
        for (name, params) in [("sealed.zip", Some(&seal)), ("open.zip", None)] {
            let whole = dir.path().join(format!("{name}.whole"));
            ZipArchiver.write(&entries, &whole, params, &s).unwrap();
            let base = dir.path().join(name);
            // small volumes put the end record and comment across several files
            let vols = split(&whole, &base, 16, &mut Vec::new(), tick.as_ref()).unwrap();
            assert!(vols.len() > 4);
            let expected = params.is_some();
            assert_eq!(is_encrypted(&volume_path(&base, 1)).unwrap(), expected, "{name}");
            assert_eq!(is_encrypted(&base).unwrap(), expected, "{name}");
            assert_eq!(is_encrypted(&whole).unwrap(), expected, "{name}");
        }
    }

    #[test]
    fn non_zip_has_no_end_record() {
        let dir = tempfile::tempdir().unwrap();
        let junk = dir.path().join("junk.zip");
        fs::write(&junk, b"not an archive at all").unwrap();
        let err = is_encrypted(&junk).unwrap_err();
        assert!(matches!(err, GftError::CorruptContainer(_)));
    }

    #[test]
    fn encrypted_entries_are_stored_frames_with_comment() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![source(dir.path(), "doc.txt", &b"compressible ".repeat(1000), 0o644)];
        let archive = dir.path().join("enc.zip");
        let salt = b"0123456789abcdef";
        let key = derive_key(b"pw", salt, 24).unwrap();
        let salt_hex = hex::encode(salt);
        let seal = SealParams {
            cap: lookup("aes").unwrap(),
            key: key.as_bytes(),
            salt,
            salt_hex: &salt_hex,
        };
        ZipArchiver
            .write(&entries, &archive, Some(&seal), &Session::silent())
            .unwrap();

        assert!(is_encrypted(&archive).unwrap());
        let mut zip = ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        assert_eq!(
            String::from_utf8_lossy(zip.comment()),
            format!("gf-encrypt:salt={salt_hex};key-length=24")
        );
        let mut raw = Vec::new();
        {
            let mut e = zip.by_index(0).unwrap();
            assert_eq!(e.compression(), CompressionMethod::Stored);
            e.read_to_end(&mut raw).unwrap();
        }
        let rep = inspect(&raw[..]).unwrap();
        assert_eq!(rep.header.salt, salt);
        // deflated before sealing
        assert!(rep.plaintext_total() < 13_000);

        // salt and key length come from the comment
        let mut written = Vec::new();
        let dest = dir.path().join("out");
        ZipArchiver
            .read(&archive, &dest, Some(&open_params(b"pw")), &mut written, &Session::silent())
            .unwrap();
        assert_eq!(fs::read(dest.join("doc.txt")).unwrap(), b"compressible ".repeat(1000));
    }

    #[test]
    fn des_entries_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![source(dir.path(), "d.txt", b"legacy cipher", 0o644)];
        let archive = dir.path().join("des.zip");
        let key = derive_key(b"pw", b"ss", 8).unwrap();
        let seal = SealParams {
            cap: lookup("des").unwrap(),
            key: key.as_bytes(),
            salt: b"ss",
            salt_hex: "7373",
        };
        ZipArchiver
            .write(&entries, &archive, Some(&seal), &Session::silent())
            .unwrap();
        let zip = ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        assert!(String::from_utf8_lossy(zip.comment()).ends_with(";algorithm=des"));
        let dest = dir.path().join("out");
        ZipArchiver
            .read(&archive, &dest, Some(&open_params(b"pw")), &mut Vec::new(), &Session::silent())
            .unwrap();
        assert_eq!(fs::read(dest.join("d.txt")).unwrap(), b"legacy cipher");
    }

    #[test]
    fn encrypted_archive_without_passphrase_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![source(dir.path(), "a", b"x", 0o644)];
        let archive = dir.path().join("e.zip");
        let key = derive_key(b"pw", b"s", 32).unwrap();
        let seal = SealParams {
            cap: lookup("aes").unwrap(),
            key: key.as_bytes(),
            salt: b"s",
            salt_hex: "73",
        };
        ZipArchiver
            .write(&entries, &archive, Some(&seal), &Session::silent())
            .unwrap();
        let err = ZipArchiver
            .read(&archive, &dir.path().join("o"), None, &mut Vec::new(), &Session::silent())
            .unwrap_err();
        assert!(matches!(err, GftError::InvalidRequest(_)));
    }

    #[test]
    fn traversal_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("evil.zip");
        {
            let mut zip = ZipWriter::new(File::create(&archive).unwrap());
            zip.start_file("../escape.txt", SimpleFileOptions::default()).unwrap();
            zip.write_all(b"gotcha").unwrap();
            zip.finish().unwrap();
        }
        let dest = dir.path().join("inner");
        let err = ZipArchiver
            .read(&archive, &dest, None, &mut Vec::new(), &Session::silent())
            .unwrap_err();
        assert!(matches!(err, GftError::CorruptContainer(_)));
        assert!(!dir.path().join("escape.txt").exists());
    }
}
