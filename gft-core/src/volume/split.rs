use crate::error::{GftError, Result};
use crate::session::Tick;
use crate::util::io::{BUF_SIZE, sync_close};
use crate::volume::{MAX_VOLUMES, volume_path};
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// `ceil(total / limit)`, with an empty source still yielding one volume.
pub fn volume_count(total: u64, limit: u64) -> u64 {
    total.div_ceil(limit).max(1)
}

/// Slice `source` into `<output>.001 ..` of at most `limit` bytes each.
///
/// `source` is only read. Every volume path is appended to `written` before
/// the file is created so the caller can clean up after a failure. Volumes
/// past the new last one left by an earlier split are removed.
pub fn split(
    source: &Path,
    output: &Path,
    limit: u64,
    written: &mut Vec<PathBuf>,
    tick: &dyn Tick,
) -> Result<Vec<PathBuf>> {
    if limit == 0 {
        return Err(GftError::InvalidRequest("volume size must be positive".into()));
    }
    let total = fs::metadata(source)?.len();
    let count = volume_count(total, limit);
    if count > MAX_VOLUMES {
        return Err(GftError::InvalidRequest(format!(
            "{count} volumes needed, at most {MAX_VOLUMES} supported; raise the volume size"
        )));
    }
    info!(total, limit, count, "splitting archive");

    let mut input = BufReader::new(File::open(source)?);
    let mut buf = vec![0u8; BUF_SIZE.min(limit as usize).max(1)];
    let mut volumes = Vec::with_capacity(count as usize);
    for idx in 1..=count as u32 {
        let path = volume_path(output, idx);
        written.push(path.clone());
        let mut out = File::create(&path)?;
        let mut remaining = limit;
        while remaining > 0 {
            let want = buf.len().min(remaining as usize);
            let n = input.read(&mut buf[..want])?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n])?;
            remaining -= n as u64;
            tick.inc(n as u64);
        }
        sync_close(out)?;
        debug!(volume = %path.display(), size = limit - remaining, "volume written");
        volumes.push(path);
    }
    remove_stale(output, count as u32 + 1)?;
    Ok(volumes)
}

/// Delete the contiguous run of leftover volumes from an earlier, longer
/// split of the same output, starting at `from`.
fn remove_stale(output: &Path, from: u32) -> Result<()> {
    for idx in from..=MAX_VOLUMES as u32 {
        let path = volume_path(output, idx);
        if !path.is_file() {
            break;
        }
        fs::remove_file(&path)?;
        debug!(volume = %path.display(), "removed stale volume");
    }
    Ok(())
}
