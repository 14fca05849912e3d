use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const OK_INDICATOR: &str = "\u{2705}";
pub const BAD_INDICATOR: &str = "\u{274C}";
pub const INFO_INDICATOR: &str = "\u{1F197}";
pub const WARNING_INDICATOR: &str = "\u{26D4}";

/// Classification of a Release or Track.
///
/// `Reviewed` is a human override: automatic checks leave it alone, with the
/// single exception of the track-number gap check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Status {
    Ok,
    #[default]
    New,
    Incomplete,
    Missing,
    Reviewed,
    NeedsAttention,
    NoMediaFiles,
}

impl Status {
    /// Tighten to `to` unless a human already reviewed this item.
    pub fn escalate(self, to: Status) -> Status {
        if self == Status::Reviewed {
            self
        } else {
            to
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Ok => "Ok",
            Status::New => "New",
            Status::Incomplete => "Incomplete",
            Status::Missing => "Missing",
            Status::Reviewed => "Reviewed",
            Status::NeedsAttention => "NeedsAttention",
            Status::NoMediaFiles => "NoMediaFiles",
        };
        f.write_str(name)
    }
}

/// Display text paired with an opaque token derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataToken {
    pub text: String,
    pub value: String,
}

impl DataToken {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let value = token_value(&text);
        Self { text, value }
    }

    /// Token for non-blank text, `None` otherwise.
    pub fn from_text(text: Option<&str>) -> Option<Self> {
        text.and_then(crate::text::clean_string).map(Self::new)
    }
}

fn token_value(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(&digest[..8])
}

impl fmt::Display for DataToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
    #[serde(default)]
    pub caption: Option<String>,
}

impl Image {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, caption: None }
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// One entry of the append-only audit trail kept on a Release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingMessage {
    pub message: String,
    pub is_ok: bool,
    pub indicator: String,
}

impl ProcessingMessage {
    fn with_indicator(message: impl Into<String>, is_ok: bool, indicator: &str) -> Self {
        Self {
            message: message.into(),
            is_ok,
            indicator: indicator.to_string(),
        }
    }

    pub fn check(message: impl Into<String>, is_ok: bool) -> Self {
        let indicator = if is_ok { OK_INDICATOR } else { BAD_INDICATOR };
        Self::with_indicator(message, is_ok, indicator)
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::check(message, true)
    }

    pub fn bad(message: impl Into<String>) -> Self {
        Self::check(message, false)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::with_indicator(message, true, INFO_INDICATOR)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_indicator(message, false, WARNING_INDICATOR)
    }

    /// Failing message carrying the full error chain.
    pub fn from_error(error: &anyhow::Error) -> Self {
        Self::with_indicator(format!("{error:#}"), false, WARNING_INDICATOR)
    }
}

impl fmt::Display for ProcessingMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.indicator, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: Uuid,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub track_number: Option<u32>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    pub file_name: PathBuf,
    #[serde(default)]
    pub file_hash: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub track_artist: Option<DataToken>,
}

impl Track {
    pub fn new(file_name: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created: None,
            last_updated: None,
            track_number: None,
            title: None,
            duration_ms: None,
            file_name: file_name.into(),
            file_hash: None,
            file_size: None,
            status: Status::New,
            track_artist: None,
        }
    }

    pub fn number(&self) -> u32 {
        self.track_number.unwrap_or(0)
    }

    pub fn title_text(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }

    pub fn artist_text(&self) -> Option<&str> {
        self.track_artist.as_ref().map(|a| a.text.as_str())
    }

    pub fn is_valid(&self) -> bool {
        self.number() > 0
            && self.duration_ms.is_some_and(|d| d > 0)
            && self.title.as_deref().is_some_and(|t| !t.trim().is_empty())
            && !self.file_name.as_os_str().is_empty()
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02} {}", self.number(), self.title_text())?;
        if let Some(artist) = &self.track_artist {
            write!(f, " ({artist})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    pub id: Uuid,
    pub media_number: u32,
    #[serde(default)]
    pub subtitle: Option<String>,
    pub track_count: u32,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

impl Media {
    pub fn new(media_number: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            media_number,
            subtitle: None,
            track_count: 0,
            tracks: Vec::new(),
        }
    }

    /// Track numbers absent from the min..=max range of this media's tracks.
    pub fn missing_track_numbers(&self) -> Vec<u32> {
        let numbers: Vec<u32> = self.tracks.iter().filter_map(|t| t.track_number).collect();
        let (Some(&min), Some(&max)) = (numbers.iter().min(), numbers.iter().max()) else {
            return Vec::new();
        };
        (min..=max).filter(|n| !numbers.contains(n)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub id: Uuid,
    pub directory: PathBuf,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub artist: Option<DataToken>,
    #[serde(default)]
    pub release_data: Option<DataToken>,
    #[serde(default)]
    pub genre: Option<DataToken>,
    #[serde(default)]
    pub artist_thumbnail: Option<Image>,
    #[serde(default)]
    pub cover_image: Option<Image>,
    #[serde(default)]
    pub media: Vec<Media>,
    #[serde(default)]
    pub media_count: u32,
    #[serde(default)]
    pub track_count: u32,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub release_date: Option<NaiveDate>,
    /// Derived from `release_date` on load.
    #[serde(skip)]
    pub year: Option<i32>,
    #[serde(default = "default_true")]
    pub is_studio_album: bool,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub processing_messages: Vec<ProcessingMessage>,
}

fn default_true() -> bool {
    true
}

impl Release {
    pub fn new(directory: &Path, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            directory: directory.to_path_buf(),
            created: now,
            last_updated: None,
            artist: None,
            release_data: None,
            genre: None,
            artist_thumbnail: None,
            cover_image: None,
            media: Vec::new(),
            media_count: 0,
            track_count: 0,
            duration_ms: 0,
            release_date: None,
            year: None,
            is_studio_album: true,
            status: Status::New,
            processing_messages: Vec::new(),
        }
    }

    pub fn artist_text(&self) -> Option<&str> {
        self.artist.as_ref().map(|a| a.text.as_str())
    }

    pub fn title_text(&self) -> &str {
        self.release_data.as_ref().map(|r| r.text.as_str()).unwrap_or_default()
    }

    pub fn set_release_date(&mut self, date: Option<NaiveDate>) {
        self.release_date = date;
        self.year = date.map(|d| d.year());
    }

    /// Restore fields that are not persisted in the snapshot.
    pub fn refresh_derived(&mut self) {
        self.year = self.release_date.map(|d| d.year());
    }

    pub fn push_message(&mut self, message: ProcessingMessage) {
        self.processing_messages.push(message);
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.media.iter().flat_map(|m| m.tracks.iter())
    }

    pub fn tracks_mut(&mut self) -> impl Iterator<Item = &mut Track> {
        self.media.iter_mut().flat_map(|m| m.tracks.iter_mut())
    }

    /// Named, has a cover and is not waiting on a fix.
    pub fn is_valid(&self) -> bool {
        self.artist_text().is_some_and(|a| !a.is_empty())
            && !self.title_text().is_empty()
            && self.cover_image.as_ref().is_some_and(|c| !c.bytes.is_empty())
            && !matches!(self.status, Status::Incomplete | Status::NeedsAttention)
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - [{}] {} ({} media, {} tracks) [{}]",
            self.artist_text().unwrap_or("?"),
            self.year.map(|y| y.to_string()).unwrap_or_default(),
            self.title_text(),
            self.media.len(),
            self.track_count,
            self.status
        )
    }
}
