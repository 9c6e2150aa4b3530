use crate::error::Result;
use crate::session::Tick;
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// Bounded buffer for payload copies and the plaintext size of one AEAD chunk.
pub const BUF_SIZE: usize = 4 * 1024 * 1024;

/// Copy `src` to `dst` through a bounded buffer, ticking per block.
pub fn copy_with(src: &mut dyn Read, dst: &mut dyn Write, tick: &dyn Tick) -> Result<u64> {
    let mut buf = vec![0u8; BUF_SIZE];
    let mut total = 0u64;
    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        dst.write_all(&buf[..n])?;
        total += n as u64;
        tick.inc(n as u64);
    }
    Ok(total)
}

/// Read adapter that reports consumed bytes.
pub struct Ticking<'t, R: Read> {
    inner: R,
    tick: &'t dyn Tick,
}

impl<'t, R: Read> Ticking<'t, R> {
    pub fn new(inner: R, tick: &'t dyn Tick) -> Self {
        Self { inner, tick }
    }
}

impl<R: Read> Read for Ticking<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.tick.inc(n as u64);
        Ok(n)
    }
}

/// Fill `buf` as far as the reader allows; returns bytes read (short only at EOF).
pub fn read_full(r: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Flush to disk and drop the handle before any metadata change.
pub fn sync_close(f: File) -> Result<()> {
    f.sync_all()?;
    drop(f);
    Ok(())
}

#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))?;
    Ok(())
}

#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

pub fn mode_of(md: &fs::Metadata) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        md.permissions().mode() & 0o7777
    }
    #[cfg(not(unix))]
    {
        if md.permissions().readonly() { 0o444 } else { 0o644 }
    }
}

/// Best-effort removal; failures are logged, never returned.
pub fn remove_quietly(path: &Path) {
    let res = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match res {
        Ok(()) => tracing::debug!(path = %path.display(), "removed"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "cleanup failed"),
    }
}

/// Removes the tracked paths (newest first) when dropped while armed.
#[derive(Debug, Default)]
pub struct CleanupGuard {
    paths: Vec<PathBuf>,
    armed: bool,
}

impl CleanupGuard {
    pub fn armed() -> Self {
        Self {
            paths: Vec::new(),
            armed: true,
        }
    }

    pub fn track(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }

    pub fn tracked(&mut self) -> &mut Vec<PathBuf> {
        &mut self.paths
    }

    /// Keep everything tracked so far.
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if self.armed {
            for p in self.paths.iter().rev() {
                remove_quietly(p);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Progress, Silent};

    #[test]
    fn copy_counts_bytes() {
        let data = vec![7u8; 300_000];
        let mut out = Vec::new();
        let tick = Silent.bytes("t", 0);
        let n = copy_with(&mut &data[..], &mut out, tick.as_ref()).unwrap();
        assert_eq!(n, 300_000);
        assert_eq!(out, data);
    }

    #[test]
    fn read_full_reports_short_read_at_eof() {
        let mut buf = [0u8; 8];
        assert_eq!(read_full(&mut &b"abc"[..], &mut buf).unwrap(), 3);
        assert_eq!(read_full(&mut &b""[..], &mut buf).unwrap(), 0);
    }

    #[test]
    fn guard_removes_unless_disarmed() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"1").unwrap();
        fs::write(&b, b"2").unwrap();
        {
            let mut g = CleanupGuard::armed();
            g.track(&a);
        }
        {
            let mut g = CleanupGuard::armed();
            g.track(&b);
            g.disarm();
        }
        assert!(!a.exists());
        assert!(b.exists());
    }

    #[test]
    fn remove_quietly_ignores_missing() {
        let dir = tempfile::tempdir().unwrap();
        remove_quietly(&dir.path().join("nope"));
        let f = dir.path().join("x");
        fs::write(&f, b"1").unwrap();
        remove_quietly(&f);
        assert!(!f.exists());
    }
}
