//! SFV and M3U manifests shipped alongside a release.

use std::fs;
use std::path::Path;

use anyhow::Context;

const TRACK_EXTENSIONS: [&str; 4] = [".mp3", ".flac", ".wav", ".ac4"];

/// A manifest line counts as a track when it is not blank, not a comment and
/// names an audio file.
pub fn is_track_line(line: &str) -> bool {
    if line.trim().is_empty() || line.starts_with('#') || line.starts_with(';') {
        return false;
    }
    let lower = line.to_lowercase();
    TRACK_EXTENSIONS.iter().any(|ext| lower.contains(ext))
}

/// Number of track lines in a manifest. A missing manifest counts zero.
pub fn count_track_lines(path: &Path) -> anyhow::Result<usize> {
    if !path.exists() {
        return Ok(0);
    }
    let bytes = fs::read(path).with_context(|| format!("reading manifest {}", path.display()))?;
    Ok(crate::text::decode_text(&bytes)
        .lines()
        .filter(|line| is_track_line(line))
        .count())
}

/// File name part of an SFV line: every space-separated token but the
/// trailing checksum.
pub fn file_name_from_sfv_line(line: &str) -> Option<String> {
    let line = line.trim_end();
    if line.trim().is_empty() {
        return None;
    }
    let (name, _) = line.rsplit_once(' ')?;
    let name = name.trim_end();
    (!name.is_empty()).then(|| name.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SfvEntry {
    pub file_name: String,
    pub crc32: String,
}

#[derive(Debug, Clone, Default)]
pub struct SfvFile {
    pub name: String,
    pub entries: Vec<SfvEntry>,
}

impl SfvFile {
    pub fn parse(name: impl Into<String>, text: &str) -> Self {
        let entries = text
            .lines()
            .filter(|line| is_track_line(line))
            .filter_map(|line| {
                let file_name = file_name_from_sfv_line(line)?;
                let crc32 = line.trim_end().rsplit(' ').next()?.to_string();
                Some(SfvEntry { file_name, crc32 })
            })
            .collect();
        Self {
            name: name.into(),
            entries,
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::parse(name, &crate::text::decode_text(&bytes)))
    }

    pub fn is_valid(&self) -> bool {
        !self.name.is_empty() && !self.entries.is_empty()
    }
}
