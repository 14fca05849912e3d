use std::path::{Path, PathBuf};

use anyhow::Context;
use rayon::prelude::*;
use uuid::Uuid;

use super::{CueError, CueIndex, CueSheet, CueTrack};

/// A track cut out of the sheet's source audio.
#[derive(Debug, Clone)]
pub struct SplitResult {
    pub track: CueTrack,
    pub file_path: PathBuf,
}

struct SplitJob<'a> {
    track: &'a CueTrack,
    source: PathBuf,
    destination: PathBuf,
    start: CueIndex,
    end: Option<CueIndex>,
}

/// Cuts a sheet's source audio into one file per track.
///
/// The actual cutting is delegated to a transcode callback receiving
/// `(source, destination, start, end)`; `end` is `None` for the last track of
/// a single-file sheet and for every track of a one-file-per-track sheet.
pub struct CueSplitter<'a> {
    sheet: &'a CueSheet,
    cue_file_path: &'a Path,
    extension: String,
}

impl<'a> CueSplitter<'a> {
    pub fn new(sheet: &'a CueSheet, cue_file_path: &'a Path) -> Self {
        Self {
            sheet,
            cue_file_path,
            extension: "mp3".to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn split<F>(&self, transcode: F) -> anyhow::Result<Vec<SplitResult>>
    where
        F: Fn(&Path, &Path, &CueIndex, Option<&CueIndex>) -> anyhow::Result<()> + Sync,
    {
        let jobs = self.plan()?;
        tracing::debug!(
            cue = %self.cue_file_path.display(),
            tracks = jobs.len(),
            "splitting CUE sheet"
        );

        let mut results = jobs
            .par_iter()
            .map(|job| -> anyhow::Result<SplitResult> {
                transcode(&job.source, &job.destination, &job.start, job.end.as_ref())
                    .with_context(|| format!("splitting track {} from {}", job.track.number, job.source.display()))?;
                Ok(SplitResult {
                    track: job.track.clone(),
                    file_path: job.destination.clone(),
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        results.sort_by_key(|r| r.track.number);
        Ok(results)
    }

    fn plan(&self) -> Result<Vec<SplitJob<'a>>, CueError> {
        let directory = self.cue_file_path.parent().unwrap_or_else(|| Path::new("."));
        let sheet = self.sheet;

        let mut tracks: Vec<(&'a CueTrack, &'a str)> = if sheet.is_standard {
            let file = sheet.files.first().ok_or(CueError::NoFiles)?;
            file.tracks.iter().map(|t| (t, file.file_name.as_str())).collect()
        } else {
            sheet
                .files
                .iter()
                .filter_map(|f| f.tracks.first().map(|t| (t, f.file_name.as_str())))
                .collect()
        };
        tracks.sort_by_key(|(t, _)| t.number);

        let mut jobs = Vec::with_capacity(tracks.len());
        for (position, &(track, file_name)) in tracks.iter().enumerate() {
            let start = *track.index(1).ok_or(CueError::MissingIndexOne(track.number))?;
            let end = match tracks.get(position + 1) {
                Some((next, _)) if sheet.is_standard => {
                    Some(*next.index(1).ok_or(CueError::MissingIndexOne(next.number))?)
                }
                _ => None,
            };
            let source = Path::new(file_name);
            let source = if source.is_absolute() {
                source.to_path_buf()
            } else {
                directory.join(source)
            };
            let destination = directory.join(format!(
                "{}-{}.{}",
                track.number,
                Uuid::new_v4().simple(),
                self.extension
            ));
            jobs.push(SplitJob {
                track,
                source,
                destination,
                start,
                end,
            });
        }
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cue::parse_str;
    use std::sync::Mutex;
    use std::time::Duration;

    const SHEET: &str = r#"PERFORMER "Bob"
TITLE "Hits"
FILE "hits.wav" WAVE
  TRACK 02 AUDIO
    TITLE "Two"
    INDEX 01 03:00:00
  TRACK 01 AUDIO
    TITLE "One"
    INDEX 00 00:00:00
    INDEX 01 00:00:32
  TRACK 03 AUDIO
    TITLE "Three"
    INDEX 01 07:30:00
"#;

    #[test]
    fn test_split_covers_every_track_with_index_durations() {
        let sheet = parse_str(SHEET).unwrap();
        let cue_path = Path::new("/music/Bob/hits.cue");
        let source_duration = Duration::from_secs(600);
        let cuts = Mutex::new(Vec::new());

        let results = CueSplitter::new(&sheet, cue_path)
            .split(|source, destination, start, end| {
                assert_eq!(source, Path::new("/music/Bob/hits.wav"));
                assert_eq!(destination.parent(), Some(Path::new("/music/Bob")));
                let end = end.map(|e| e.time.offset()).unwrap_or(source_duration);
                cuts.lock().unwrap().push((start.time.offset(), end - start.time.offset()));
                Ok(())
            })
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(
            results.iter().map(|r| r.track.number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(results[0]
            .file_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("1-"));

        let mut cuts = cuts.into_inner().unwrap();
        cuts.sort();
        let one_start = Duration::from_millis(426);
        assert_eq!(
            cuts,
            vec![
                (one_start, Duration::from_secs(180) - one_start),
                (Duration::from_secs(180), Duration::from_secs(270)),
                (Duration::from_secs(450), Duration::from_secs(150)),
            ]
        );
    }

    #[test]
    fn test_missing_index_one_is_fatal() {
        let text = "FILE \"a.wav\" WAVE\n TRACK 01 AUDIO\n INDEX 01 00:00:00\n TRACK 02 AUDIO\n INDEX 00 03:00:00\n";
        let sheet = parse_str(text).unwrap();
        let err = CueSplitter::new(&sheet, Path::new("/tmp/a.cue"))
            .split(|_, _, _, _| Ok(()))
            .unwrap_err();
        assert!(err.to_string().contains("track 2 has no INDEX 01"));
    }

    #[test]
    fn test_callback_failure_aborts_split() {
        let sheet = parse_str(SHEET).unwrap();
        let result = CueSplitter::new(&sheet, Path::new("/music/Bob/hits.cue")).split(|_, destination, _, _| {
            if destination.to_string_lossy().contains("/2-") {
                anyhow::bail!("encoder crashed");
            }
            Ok(())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_nonstandard_sheet_uses_whole_files() {
        let text = r#"FILE "/abs/one.flac" WAVE
  TRACK 01 AUDIO
    INDEX 01 00:00:00
FILE "two.flac" WAVE
  TRACK 02 AUDIO
    INDEX 01 00:00:00
"#;
        let sheet = parse_str(text).unwrap();
        let seen = Mutex::new(Vec::new());
        CueSplitter::new(&sheet, Path::new("/music/Bob/a.cue"))
            .with_extension("ogg")
            .split(|source, destination, _, end| {
                assert!(end.is_none());
                assert_eq!(destination.extension().unwrap(), "ogg");
                seen.lock().unwrap().push(source.to_path_buf());
                Ok(())
            })
            .unwrap();
        let mut seen = seen.into_inner().unwrap();
        seen.sort();
        assert_eq!(seen, vec![PathBuf::from("/abs/one.flac"), PathBuf::from("/music/Bob/two.flac")]);
    }
}
