pub mod artwork;
pub mod classify;
pub mod cue;
pub mod directory;
pub mod images;
pub mod manifest;
pub mod normalize;
pub mod processor;
pub mod release;
pub mod save;
pub mod snapshot;
pub mod tags;
pub mod text;
pub mod transcode;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};

pub use processor::{Collaborators, DirectoryProcessor};
pub use release::{Media, ProcessingMessage, Release, Status, Track};
pub use snapshot::SNAPSHOT_FILENAME;
pub use transcode::BitrateTier;

fn default_max_disc_number() -> u32 {
    text::MAX_DISC_NUMBER
}

fn default_target_codec() -> String {
    "mpeg".to_string()
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_snapshot_file_name() -> String {
    SNAPSHOT_FILENAME.to_string()
}

fn default_staging_scan_limit() -> usize {
    250
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessOptions {
    /// Extensions skipped during ingestion, with or without the leading dot.
    #[serde(default)]
    pub ignore_extensions: Vec<String>,
    /// Reprocess even when the snapshot says `Ok` or `Reviewed`.
    #[serde(default)]
    pub force: bool,
    #[serde(default = "default_max_disc_number")]
    pub max_disc_number: u32,
    #[serde(default = "default_target_codec")]
    pub target_codec: String,
    #[serde(default)]
    pub bitrate: BitrateTier,
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,
    #[serde(default = "default_snapshot_file_name")]
    pub snapshot_file_name: String,
    #[serde(default = "default_staging_scan_limit")]
    pub staging_scan_limit: usize,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            ignore_extensions: Vec::new(),
            force: false,
            max_disc_number: default_max_disc_number(),
            target_codec: default_target_codec(),
            bitrate: BitrateTier::default(),
            ffmpeg_path: default_ffmpeg_path(),
            snapshot_file_name: default_snapshot_file_name(),
            staging_scan_limit: default_staging_scan_limit(),
        }
    }
}

/// Contents of the optional TOML settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub staging_directory: Option<PathBuf>,
    #[serde(default)]
    pub options: ProcessOptions,
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading settings {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing settings {}", path.display()))
    }
}

/// Type alias for progress callback
pub type ProgressCallback<'a> = dyn Fn(&str, u64, u64, &str) + Send + Sync + 'a;

/// Throttled progress reporter, emits at most every 200ms or on completion.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback<'a>,
    last_emit: Mutex<Instant>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback<'a>) -> Self {
        let start = Instant::now();
        Self {
            inner,
            last_emit: Mutex::new(start.checked_sub(Duration::from_secs(1)).unwrap_or(start)),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = current + 1 >= total;
        if !is_done {
            if let Ok(mut last) = self.last_emit.lock() {
                if last.elapsed().as_millis() < 200 {
                    return;
                }
                *last = Instant::now();
            }
        }
        (self.inner)(stage, current, total, message);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagingSummary {
    pub processed: usize,
    pub by_status: BTreeMap<Status, usize>,
}

/// Run the pipeline over the first `staging_scan_limit` release directories
/// under `staging`, one at a time in name order.
pub fn process_staging(
    staging: &Path,
    options: &ProcessOptions,
    collaborators: Collaborators,
    progress_callback: &ProgressCallback<'_>,
) -> anyhow::Result<StagingSummary> {
    let tp = ThrottledProgress::new(progress_callback);
    let entries = fs::read_dir(staging).with_context(|| format!("reading staging {}", staging.display()))?;
    let mut directories: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    directories.sort();
    directories.truncate(options.staging_scan_limit);
    tracing::info!(staging = %staging.display(), directories = directories.len(), "processing staging");

    let processor = DirectoryProcessor::new(options, collaborators);
    let total = directories.len() as u64;
    let mut summary = StagingSummary::default();
    for (i, dir) in directories.iter().enumerate() {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        tp.report("process", i as u64, total, &name);
        let release = processor.process(Utc::now(), dir, &[]);
        *summary.by_status.entry(release.status).or_default() += 1;
        summary.processed += 1;
    }
    tracing::info!(staging = %staging.display(), processed = summary.processed, by_status = ?summary.by_status, "staging done");
    Ok(summary)
}
