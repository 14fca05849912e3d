use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::release::Release;

/// Default snapshot filename
pub const SNAPSHOT_FILENAME: &str = "ted.data.json";

pub fn snapshot_path(directory: &Path, file_name: &str) -> PathBuf {
    directory.join(file_name)
}

/// Load the snapshot stored in a release directory.
pub fn load(directory: &Path, file_name: &str) -> anyhow::Result<Option<Release>> {
    let path = snapshot_path(directory, file_name);
    if !path.exists() {
        return Ok(None);
    }

    let file = File::open(&path).with_context(|| format!("opening snapshot {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut release: Release =
        serde_json::from_reader(reader).with_context(|| format!("parsing snapshot {}", path.display()))?;
    release.refresh_derived();

    Ok(Some(release))
}

/// Save the snapshot into the release's own directory.
pub fn save(release: &Release, file_name: &str) -> anyhow::Result<()> {
    let path = snapshot_path(&release.directory, file_name);
    let temp_path = release.directory.join(format!(".{file_name}.tmp"));

    // Write to temp file first, then rename for atomicity
    let file = File::create(&temp_path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, release)?;

    fs::rename(&temp_path, &path)?;
    tracing::debug!(path = %path.display(), "snapshot saved");
    Ok(())
}
