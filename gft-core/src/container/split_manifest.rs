use crate::error::{GftError, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const EXTENSION: &str = "split";

/// Sidecar describing a volume set, one `Key: value` line per field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitManifest {
    pub source: String,
    pub total_size: u64,
    pub split_size: u64,
    pub volume_count: u32,
    pub crc32: String,
}

pub fn manifest_path(output: &Path) -> PathBuf {
    let mut s = output.as_os_str().to_owned();
    s.push(".");
    s.push(EXTENSION);
    PathBuf::from(s)
}

impl SplitManifest {
    pub fn render(&self) -> String {
        format!(
            "Source: {}\nTotalSize: {}\nSplitSize: {}\nVolumeCount: {}\nCRC32: {}\n",
            self.source, self.total_size, self.split_size, self.volume_count, self.crc32
        )
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut source = None;
        let mut total_size = None;
        let mut split_size = None;
        let mut volume_count = None;
        let mut crc32 = None;
        for line in text.lines() {
            let Some((k, v)) = line.split_once(':') else {
                continue;
            };
            let v = v.trim();
            match k.trim() {
                "Source" => source = Some(v.to_string()),
                "TotalSize" => total_size = v.parse().ok(),
                "SplitSize" => split_size = v.parse().ok(),
                "VolumeCount" => volume_count = v.parse().ok(),
                "CRC32" => crc32 = Some(v.to_ascii_lowercase()),
                _ => {}
            }
        }
        let missing = |f: &str| GftError::CorruptContainer(format!("split manifest lacks {f}"));
        Ok(Self {
            source: source.ok_or_else(|| missing("Source"))?,
            total_size: total_size.ok_or_else(|| missing("TotalSize"))?,
            split_size: split_size.ok_or_else(|| missing("SplitSize"))?,
            volume_count: volume_count.ok_or_else(|| missing("VolumeCount"))?,
            crc32: crc32.ok_or_else(|| missing("CRC32"))?,
        })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.render())?;
        Ok(())
    }

    /// `Ok(None)` when no manifest exists.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SplitManifest {
        SplitManifest {
            source: "out.zip".into(),
            total_size: 300,
            split_size: 100,
            volume_count: 3,
            crc32: "0badf00d".into(),
        }
    }

    #[test]
    fn render_has_one_line_per_field() {
        let text = sample().render();
        assert_eq!(text.lines().count(), 5);
        assert!(text.contains("VolumeCount: 3\n"));
        assert_eq!(SplitManifest::parse(&text).unwrap(), sample());
    }

    #[test]
    fn incomplete_manifest_is_corrupt() {
        let err = SplitManifest::parse("Source: x\nTotalSize: 1\n").unwrap_err();
        assert!(matches!(err, GftError::CorruptContainer(_)));
    }

    #[test]
    fn absent_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let p = manifest_path(&dir.path().join("a.zip"));
        assert!(p.to_string_lossy().ends_with("a.zip.split"));
        assert_eq!(SplitManifest::read(&p).unwrap(), None);
        sample().write(&p).unwrap();
        assert_eq!(SplitManifest::read(&p).unwrap(), Some(sample()));
    }
}
