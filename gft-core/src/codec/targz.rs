use crate::codec::{
    Archiver, ExtractedFile, Format, OpenParams, SealParams, SourceEntry, write_entry,
};
use crate::error::{GftError, Result};
use crate::session::Session;
use crate::util::io::{Ticking, sync_close};
use crate::util::sanitize::{entry_name, safe_join};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder, EntryType, Header};
use tracing::{debug, info};

/// One tar stream inside one gzip stream at maximum level.
/// No encryption and no volume splitting.
pub struct TarGzArchiver;

impl Archiver for TarGzArchiver {
    fn format(&self) -> Format {
        Format::TarGz
    }

    fn supports_split(&self) -> bool {
        false
    }

    fn supports_encryption(&self) -> bool {
        false
    }

    fn write(
        &self,
        entries: &[SourceEntry],
        dest: &Path,
        seal: Option<&SealParams<'_>>,
        session: &Session<'_>,
    ) -> Result<()> {
        if seal.is_some() {
            return Err(GftError::UnsupportedFeature(
                "tar.gz archives cannot be encrypted".into(),
            ));
        }
        let gz = GzEncoder::new(BufWriter::new(File::create(dest)?), Compression::best());
        let mut builder = Builder::new(gz);
        let batch = session.progress.batch("archiving", entries.len() as u64);

        for e in entries {
            let name = entry_name(&e.rel);
            let mut header = Header::new_gnu();
            header.set_entry_type(EntryType::Regular);
            header.set_size(e.size);
            header.set_mode(e.mode);
            header.set_mtime(e.mtime);
            let tick = session.progress.bytes(&name, e.size);
            let src = Ticking::new(BufReader::new(File::open(&e.path)?), tick.as_ref());
            builder.append_data(&mut header, &name, src)?;
            tick.finish();
            batch.inc(1);
            debug!(entry = %name, size = e.size, "entry written");
        }

        let gz = builder.into_inner()?;
        let buf = gz.finish()?;
        sync_close(buf.into_inner().map_err(|e| e.into_error())?)?;
        batch.finish();
        info!(archive = %dest.display(), entries = entries.len(), "tar.gz written");
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
        if open.is_some() {
            return Err(GftError::UnsupportedFeature(
                "tar.gz archives are never encrypted".into(),
            ));
        }
        let gz = GzDecoder::new(BufReader::new(File::open(archive)?));
        let mut ar = Archive::new(gz);
        let batch = session.progress.batch("extracting", 0);
        let mut out = Vec::new();

        for entry in ar.entries()? {
            let mut entry = entry?;
            let name = entry.path()?.to_string_lossy().into_owned();
            let target = safe_join(dest, &name)?;
            match entry.header().entry_type() {
                EntryType::Directory => {
                    fs::create_dir_all(&target)?;
                }
                EntryType::Regular | EntryType::Continuous => {
                    let mode = entry.header().mode().ok();
                    let file = write_entry(&mut entry, &target, mode, written, session)?;
                    debug!(entry = %name, size = file.size, "extracted");
                    out.push(file);
                }
                other => {
                    debug!(entry = %name, kind = ?other, "skipping non-regular entry");
                }
            }
            batch.inc(1);
        }
        batch.finish();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::cipher::lookup;

    #[test]
    fn round_trip_keeps_modes_and_nesting() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        fs::write(&a, b"tarred").unwrap();
        let entries = vec![SourceEntry {
            path: a,
            size: 6,
            mode: 0o751,
            mtime: 1_700_000_000,
            rel: PathBuf::from("top/a.txt"),
        }];
        let archive = dir.path().join("x.tar.gz");
        TarGzArchiver
            .write(&entries, &archive, None, &Session::silent())
            .unwrap();
        let dest = dir.path().join("out");
        let mut written = Vec::new();
        let files = TarGzArchiver
            .read(&archive, &dest, None, &mut written, &Session::silent())
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(fs::read(dest.join("top/a.txt")).unwrap(), b"tarred");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let m = fs::metadata(dest.join("top/a.txt")).unwrap().permissions().mode();
            assert_eq!(m & 0o777, 0o751);
        }
    }

    fn raw_tar_gz(path: &Path, name: &[u8], body: &[u8]) {
        let mut header = Header::new_gnu();
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);
        header.set_cksum();
        let gz = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        let mut builder = Builder::new(gz);
        builder.append(&header, body).unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn escaping_entry_names_are_rejected() {
        for name in [&b"../evil.txt"[..], b"a/../../evil.txt", b"/evil.txt"] {
            let dir = tempfile::tempdir().unwrap();
            let archive = dir.path().join("bad.tar.gz");
            raw_tar_gz(&archive, name, b"evil");
            let dest = dir.path().join("out");
            let mut written = Vec::new();
            let err = TarGzArchiver
                .read(&archive, &dest, None, &mut written, &Session::silent())
                .unwrap_err();
            assert!(matches!(err, GftError::CorruptContainer(_)), "{err:?}");
            assert!(!dir.path().join("evil.txt").exists());
            assert!(written.is_empty());
        }
    }

    #[test]
    fn encryption_rejected_before_output() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("x.tar.gz");
        let seal = SealParams {
            cap: lookup("aes").unwrap(),
            key: &[0u8; 32],
            salt: b"s",
            salt_hex: "73",
        };
        let err = TarGzArchiver
            .write(&[], &archive, Some(&seal), &Session::silent())
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::UnsupportedFeature);
        assert!(!archive.exists());
    }
}
