//! CUE sheet model, parser and splitter.

pub mod parser;
pub mod splitter;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub use parser::{parse_file, parse_str};
pub use splitter::{CueSplitter, SplitResult};

const FRAMES_PER_SECOND: u64 = 75;

#[derive(Debug, Error)]
pub enum CueError {
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("index number {0} is outside 0..=99")]
    IndexOutOfRange(u32),
    #[error("invalid index time '{0}', expected mm:ss:ff")]
    InvalidTime(String),
    #[error("CUE sheet declares {files} file(s) but {tracks} audio track(s)")]
    FileTrackMismatch { files: usize, tracks: usize },
    #[error("track {0} has no INDEX 01")]
    MissingIndexOne(u32),
    #[error("CUE sheet has no {0}")]
    MissingField(&'static str),
    #[error("CUE sheet has no file entries")]
    NoFiles,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// `mm:ss:ff` position, frames at 75 per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexTime {
    pub minutes: u32,
    pub seconds: u32,
    pub frames: u32,
}

impl IndexTime {
    pub fn offset(&self) -> Duration {
        let millis = u64::from(self.minutes) * 60_000
            + u64::from(self.seconds) * 1_000
            + u64::from(self.frames) * 1_000 / FRAMES_PER_SECOND;
        Duration::from_millis(millis)
    }
}

impl FromStr for IndexTime {
    type Err = CueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CueError::InvalidTime(s.to_string());
        let mut parts = s.trim().split(':').map(|p| p.parse::<u32>().map_err(|_| invalid()));
        let minutes = parts.next().ok_or_else(invalid)??;
        let seconds = parts.next().ok_or_else(invalid)??;
        let frames = parts.next().transpose()?.unwrap_or(0);
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self { minutes, seconds, frames })
    }
}

impl fmt::Display for IndexTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.minutes, self.seconds, self.frames)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CueIndex {
    number: u8,
    pub time: IndexTime,
}

impl CueIndex {
    pub fn new(number: u32, time: IndexTime) -> Result<Self, CueError> {
        if number > 99 {
            return Err(CueError::IndexOutOfRange(number));
        }
        Ok(Self { number: number as u8, time })
    }

    pub fn number(&self) -> u8 {
        self.number
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CueTrack {
    pub number: u32,
    pub track_type: String,
    pub title: Option<String>,
    pub performer: Option<String>,
    pub songwriter: Option<String>,
    pub isrc: Option<String>,
    pub flags: Option<String>,
    pub indices: Vec<CueIndex>,
    pub pregap: Option<CueIndex>,
    pub postgap: Option<CueIndex>,
}

impl CueTrack {
    pub fn index(&self, number: u8) -> Option<&CueIndex> {
        self.indices.iter().find(|i| i.number == number)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CueFile {
    pub file_name: String,
    pub file_type: Option<String>,
    pub tracks: Vec<CueTrack>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CueSheet {
    pub catalog: Option<String>,
    pub cd_text_file: Option<String>,
    pub performer: Option<String>,
    pub songwriter: Option<String>,
    pub title: Option<String>,
    pub genre: Option<String>,
    pub date: Option<String>,
    pub disc_id: Option<String>,
    pub disc_number: Option<u32>,
    pub disc_total: Option<u32>,
    /// `REM` entries that are not one of the recognized root fields.
    pub comments: Vec<(String, String)>,
    pub files: Vec<CueFile>,
    /// Exactly one FILE command.
    pub is_standard: bool,
    /// Multi-file sheet whose first file holds more than one track.
    pub is_noncompliant: bool,
}

impl CueSheet {
    pub fn comment(&self, name: &str) -> Option<&str> {
        self.comments
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn tracks(&self) -> impl Iterator<Item = &CueTrack> {
        self.files.iter().flat_map(|f| f.tracks.iter())
    }

    pub fn next_track<'a>(tracks: &'a [CueTrack], current: &CueTrack) -> Option<&'a CueTrack> {
        let position = tracks.iter().position(|t| t == current)?;
        tracks.get(position + 1)
    }

    /// Year from `REM DATE`, else from the CUE file name.
    pub fn year(&self, cue_file_name: &str) -> Result<i32, CueError> {
        self.date
            .as_deref()
            .and_then(crate::text::year_from_text)
            .or_else(|| crate::text::year_from_text(cue_file_name))
            .ok_or(CueError::MissingField("release year"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_time_parse_and_offset() {
        let time: IndexTime = "03:25:30".parse().unwrap();
        assert_eq!(time, IndexTime { minutes: 3, seconds: 25, frames: 30 });
        assert_eq!(time.offset(), Duration::from_millis(205_400));
        assert_eq!(time.to_string(), "03:25:30");

        let short: IndexTime = "01:02".parse().unwrap();
        assert_eq!(short.offset(), Duration::from_secs(62));

        assert!("aa:00:00".parse::<IndexTime>().is_err());
        assert!("1:2:3:4".parse::<IndexTime>().is_err());
        assert!("".parse::<IndexTime>().is_err());
    }

    #[test]
    fn test_index_number_validated() {
        assert!(CueIndex::new(99, IndexTime::default()).is_ok());
        assert!(matches!(
            CueIndex::new(100, IndexTime::default()),
            Err(CueError::IndexOutOfRange(100))
        ));
    }

    #[test]
    fn test_next_track() {
        let tracks: Vec<CueTrack> = (1..=3)
            .map(|number| CueTrack { number, ..Default::default() })
            .collect();
        assert_eq!(CueSheet::next_track(&tracks, &tracks[0]).map(|t| t.number), Some(2));
        assert!(CueSheet::next_track(&tracks, &tracks[2]).is_none());
    }

    #[test]
    fn test_year_fallback_to_file_name() {
        let mut sheet = CueSheet::default();
        assert_eq!(sheet.year("Bob - 2004 - Hits.cue").unwrap(), 2004);
        sheet.date = Some("1997".to_string());
        assert_eq!(sheet.year("Bob - 2004 - Hits.cue").unwrap(), 1997);
        assert!(CueSheet::default().year("Hits.cue").is_err());
    }
}
