//! Audio transcoding through an external encoder.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::Context;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tags::{TagData, TagStore};

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("failed to run {tool}: {source}")]
    Launch {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with code {exit_code}: {message}")]
    CommandFailed {
        tool: String,
        exit_code: i32,
        message: String,
    },
    #[error("{tool} produced no output at {}", .path.display())]
    OutputMissing { tool: String, path: PathBuf },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitrateTier {
    Low,
    Normal,
    Good,
    VeryHigh,
    #[default]
    Ultra,
}

impl BitrateTier {
    pub fn kbps(self) -> u32 {
        match self {
            BitrateTier::Low => 96,
            BitrateTier::Normal => 128,
            BitrateTier::Good => 192,
            BitrateTier::VeryHigh => 256,
            BitrateTier::Ultra => 320,
        }
    }
}

/// File extension produced for a codec name.
pub fn codec_extension(codec: &str) -> &str {
    match codec {
        "mpeg" => "mp3",
        "vorbis" => "ogg",
        "aac" | crate::tags::MPEG4_CODEC => "m4a",
        other => other,
    }
}

fn codec_encoder(codec: &str) -> &str {
    match codec {
        "mpeg" => "libmp3lame",
        "vorbis" => "libvorbis",
        "opus" => "libopus",
        "aac" | crate::tags::MPEG4_CODEC => "aac",
        other => other,
    }
}

pub trait Transcoder: Send + Sync {
    fn convert(&self, source: &Path, destination: &Path, codec: &str, bitrate: BitrateTier) -> Result<(), TranscodeError>;

    /// Transcode `duration` starting at `start`; `None` runs to the end.
    fn convert_range(
        &self,
        source: &Path,
        destination: &Path,
        start: Duration,
        duration: Option<Duration>,
        codec: &str,
        bitrate: BitrateTier,
    ) -> Result<(), TranscodeError>;
}

#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: PathBuf,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    fn tool_name(&self) -> String {
        self.program.display().to_string()
    }

    fn run(&self, source: &Path, destination: &Path, args: Vec<OsString>) -> Result<(), TranscodeError> {
        if !source.exists() {
            return Err(TranscodeError::SourceNotFound(source.to_path_buf()));
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&args);
        tracing::debug!(
            "Running: {} {}",
            self.tool_name(),
            args.iter().map(|a| a.to_string_lossy()).collect::<Vec<_>>().join(" ")
        );

        let output = cmd.output().map_err(|e| TranscodeError::Launch {
            tool: self.tool_name(),
            source: e,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TranscodeError::CommandFailed {
                tool: self.tool_name(),
                exit_code: output.status.code().unwrap_or(-1),
                message: stderr.trim().to_string(),
            });
        }

        let written = fs::metadata(destination).map(|m| m.len() > 0).unwrap_or(false);
        if !written {
            return Err(TranscodeError::OutputMissing {
                tool: self.tool_name(),
                path: destination.to_path_buf(),
            });
        }
        Ok(())
    }
}

fn encode_args(destination: &Path, codec: &str, bitrate: BitrateTier) -> Vec<OsString> {
    vec![
        "-vn".into(),
        "-c:a".into(),
        codec_encoder(codec).into(),
        "-b:a".into(),
        format!("{}k", bitrate.kbps()).into(),
        destination.into(),
    ]
}

fn seconds(d: Duration) -> String {
    format!("{:.3}", d.as_secs_f64())
}

fn range_args(
    source: &Path,
    destination: &Path,
    start: Duration,
    duration: Option<Duration>,
    codec: &str,
    bitrate: BitrateTier,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-hide_banner".into(),
        "-nostdin".into(),
        "-y".into(),
        "-ss".into(),
        seconds(start).into(),
        "-i".into(),
        source.into(),
    ];
    if let Some(duration) = duration {
        args.push("-t".into());
        args.push(seconds(duration).into());
    }
    args.extend(encode_args(destination, codec, bitrate));
    args
}

impl Transcoder for FfmpegTranscoder {
    fn convert(&self, source: &Path, destination: &Path, codec: &str, bitrate: BitrateTier) -> Result<(), TranscodeError> {
        let mut args: Vec<OsString> = vec![
            "-hide_banner".into(),
            "-nostdin".into(),
            "-y".into(),
            "-i".into(),
            source.into(),
            "-map_metadata".into(),
            "0".into(),
        ];
        args.extend(encode_args(destination, codec, bitrate));
        self.run(source, destination, args)
    }

    fn convert_range(
        &self,
        source: &Path,
        destination: &Path,
        start: Duration,
        duration: Option<Duration>,
        codec: &str,
        bitrate: BitrateTier,
    ) -> Result<(), TranscodeError> {
        let args = range_args(source, destination, start, duration, codec, bitrate);
        self.run(source, destination, args)
    }
}

fn converted_path(source: &Path, codec: &str) -> PathBuf {
    let extension = codec_extension(codec);
    let destination = source.with_extension(extension);
    if destination != source {
        return destination;
    }
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    source.with_file_name(format!("{stem}-converted.{extension}"))
}

/// Convert every candidate not already in `codec`, in parallel.
///
/// Each converted file is re-read through `tags`, must report the target
/// codec, and replaces its source, which is deleted. The first failure aborts
/// the whole phase.
pub fn convert_to_codec(
    candidates: Vec<TagData>,
    codec: &str,
    bitrate: BitrateTier,
    transcoder: &dyn Transcoder,
    tags: &dyn TagStore,
) -> anyhow::Result<Vec<TagData>> {
    let (mut keep, pending): (Vec<TagData>, Vec<TagData>) =
        candidates.into_iter().partition(|t| t.short_codec == codec);
    if pending.is_empty() {
        return Ok(keep);
    }
    tracing::debug!(count = pending.len(), codec, "converting files");

    let converted = pending
        .par_iter()
        .map(|source| -> anyhow::Result<TagData> {
            let destination = converted_path(&source.path, codec);
            transcoder
                .convert(&source.path, &destination, codec, bitrate)
                .with_context(|| format!("converting {}", source.path.display()))?;
            let data = tags
                .read(&destination)?
                .with_context(|| format!("unreadable conversion output {}", destination.display()))?;
            if data.short_codec != codec {
                anyhow::bail!(
                    "unable to convert {} to {codec}, got {}",
                    source.path.display(),
                    data.short_codec
                );
            }
            fs::remove_file(&source.path).with_context(|| format!("deleting {}", source.path.display()))?;
            tracing::info!(
                from = %source.path.display(),
                to = %destination.display(),
                "converted"
            );
            Ok(data)
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    keep.extend(converted);
    Ok(keep)
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::sync::Mutex;

    /// Writes a small placeholder file, unique per destination, for every
    /// call.
    #[derive(Default)]
    pub struct FakeTranscoder {
        pub fail_on: Option<String>,
        pub calls: Mutex<Vec<(PathBuf, PathBuf, Duration, Option<Duration>)>>,
    }

    impl FakeTranscoder {
        fn record(
            &self,
            source: &Path,
            destination: &Path,
            start: Duration,
            duration: Option<Duration>,
        ) -> Result<(), TranscodeError> {
            if let Some(fail) = &self.fail_on {
                if source.to_string_lossy().contains(fail.as_str()) {
                    return Err(TranscodeError::CommandFailed {
                        tool: "fake".into(),
                        exit_code: 1,
                        message: "boom".into(),
                    });
                }
            }
            let content = format!("encoded:{}", destination.display());
            fs::write(destination, content).map_err(|e| TranscodeError::Launch {
                tool: "fake".into(),
                source: e,
            })?;
            self.calls
                .lock()
                .unwrap()
                .push((source.to_path_buf(), destination.to_path_buf(), start, duration));
            Ok(())
        }
    }

    impl Transcoder for FakeTranscoder {
        fn convert(&self, source: &Path, destination: &Path, _: &str, _: BitrateTier) -> Result<(), TranscodeError> {
            self.record(source, destination, Duration::ZERO, None)
        }

        fn convert_range(
            &self,
            source: &Path,
            destination: &Path,
            start: Duration,
            duration: Option<Duration>,
            _: &str,
            _: BitrateTier,
        ) -> Result<(), TranscodeError> {
            self.record(source, destination, start, duration)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::FakeTranscoder;
    use super::*;
    use crate::tags::TagWrite;

    struct ExtensionTagStore;

    impl TagStore for ExtensionTagStore {
        fn read(&self, path: &Path) -> anyhow::Result<Option<TagData>> {
            let codec = match path.extension().and_then(|e| e.to_str()) {
                Some("mp3") => "mpeg",
                Some("flac") => "flac",
                _ => return Ok(None),
            };
            Ok(Some(TagData {
                path: path.to_path_buf(),
                short_codec: codec.to_string(),
                duration_ms: 1000,
                ..Default::default()
            }))
        }

        fn write(&self, _: &Path, _: &TagWrite) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_range_args() {
        let args = range_args(
            Path::new("/a/src.flac"),
            Path::new("/a/1.mp3"),
            Duration::from_millis(1500),
            Some(Duration::from_secs(180)),
            "mpeg",
            BitrateTier::Ultra,
        );
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "-hide_banner", "-nostdin", "-y", "-ss", "1.500", "-i", "/a/src.flac", "-t", "180.000", "-vn",
                "-c:a", "libmp3lame", "-b:a", "320k", "/a/1.mp3",
            ]
        );
    }

    #[test]
    fn test_converted_path() {
        assert_eq!(converted_path(Path::new("/a/01.flac"), "mpeg"), PathBuf::from("/a/01.mp3"));
        assert_eq!(converted_path(Path::new("/a/01.mp3"), "mpeg"), PathBuf::from("/a/01-converted.mp3"));
    }

    #[test]
    fn test_convert_to_codec_replaces_sources() {
        let dir = tempfile::tempdir().unwrap();
        let flac = dir.path().join("02.flac");
        let mp3 = dir.path().join("01.mp3");
        fs::write(&flac, b"lossless").unwrap();
        fs::write(&mp3, b"lossy").unwrap();
        let candidates = vec![
            ExtensionTagStore.read(&mp3).unwrap().unwrap(),
            ExtensionTagStore.read(&flac).unwrap().unwrap(),
        ];

        let transcoder = FakeTranscoder::default();
        let result =
            convert_to_codec(candidates, "mpeg", BitrateTier::Ultra, &transcoder, &ExtensionTagStore).unwrap();

        let mut paths: Vec<PathBuf> = result.iter().map(|t| t.path.clone()).collect();
        paths.sort();
        assert_eq!(paths, vec![mp3.clone(), dir.path().join("02.mp3")]);
        assert!(!flac.exists());
        assert_eq!(transcoder.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_convert_failure_aborts_phase() {
        let dir = tempfile::tempdir().unwrap();
        let flac = dir.path().join("bad.flac");
        fs::write(&flac, b"lossless").unwrap();
        let candidates = vec![ExtensionTagStore.read(&flac).unwrap().unwrap()];
        let transcoder = FakeTranscoder {
            fail_on: Some("bad".into()),
            ..Default::default()
        };
        let err = convert_to_codec(candidates, "mpeg", BitrateTier::Ultra, &transcoder, &ExtensionTagStore)
            .unwrap_err();
        assert!(format!("{err:#}").contains("boom"));
        assert!(flac.exists());
    }

    #[test]
    fn test_ffmpeg_missing_source() {
        let err = FfmpegTranscoder::default()
            .convert(Path::new("/definitely/not/here.flac"), Path::new("/tmp/x.mp3"), "mpeg", BitrateTier::Low)
            .unwrap_err();
        assert!(matches!(err, TranscodeError::SourceNotFound(_)));
    }
}
