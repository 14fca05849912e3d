//! Turns one release directory into a classified `Release`.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use rayon::prelude::*;
use sha2::{Digest, Sha256};

use crate::artwork::ArtworkResolver;
use crate::classify::{self, ClassifyInput};
use crate::cue::{self, CueError, CueSplitter};
use crate::directory;
use crate::images::{ImageClassifier, ImageType};
use crate::release::{DataToken, Media, ProcessingMessage, Release, Status, Track};
use crate::save;
use crate::snapshot;
use crate::tags::{TagData, TagStore, TagWrite};
use crate::text;
use crate::transcode::{self, Transcoder};
use crate::ProcessOptions;

/// External services the pipeline depends on.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub tag_store: &'a dyn TagStore,
    pub transcoder: &'a dyn Transcoder,
    pub images: &'a dyn ImageClassifier,
}

pub struct DirectoryProcessor<'a> {
    options: &'a ProcessOptions,
    collaborators: Collaborators<'a>,
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
}

/// SHA-256 hex digest and size of a file, `None` when it is gone.
fn fingerprint(path: &Path) -> anyhow::Result<Option<(String, u64)>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("opening {}", path.display())),
    };
    let mut hasher = Sha256::new();
    let size = io::copy(&mut file, &mut hasher).with_context(|| format!("hashing {}", path.display()))?;
    Ok(Some((hex::encode(hasher.finalize()), size)))
}

impl<'a> DirectoryProcessor<'a> {
    pub fn new(options: &'a ProcessOptions, collaborators: Collaborators<'a>) -> Self {
        Self { options, collaborators }
    }

    /// Process `directory`. Never fails: errors end up as a failing
    /// message on the returned release.
    ///
    /// `known_files` is the caller's listing of the directory; when empty the
    /// directory is listed here.
    pub fn process(&self, now: DateTime<Utc>, directory: &Path, known_files: &[PathBuf]) -> Release {
        let mut release = Release::new(directory, now);
        match self.run(now, directory, known_files, &mut release) {
            Ok(Some(stored)) => return stored,
            Ok(None) => {}
            Err(e) => {
                tracing::error!(dir = %directory.display(), error = %format!("{e:#}"), "processing failed");
                release.push_message(ProcessingMessage::from_error(&e));
            }
        }
        tracing::info!(dir = %directory.display(), status = %release.status, "{release}");
        release
    }

    /// Returns the stored release when the snapshot short-circuits processing.
    fn run(
        &self,
        now: DateTime<Utc>,
        dir: &Path,
        known_files: &[PathBuf],
        release: &mut Release,
    ) -> anyhow::Result<Option<Release>> {
        let options = self.options;
        let tags = self.collaborators.tag_store;

        let relocated = directory::split_multiple_releases(dir)?;
        let hoisted = self.process_subdirectories(dir)?;
        let mut files = if known_files.is_empty() || !relocated.is_empty() || hoisted {
            directory::list_files(dir)?
        } else {
            known_files.iter().filter(|p| p.is_file()).cloned().collect()
        };
        files = directory::without_ignored(files, &options.ignore_extensions);
        tracing::debug!(dir = %dir.display(), files = files.len(), "pre-normalized");

        let stored = match snapshot::load(dir, &options.snapshot_file_name) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %format!("{e:#}"), "ignoring unreadable snapshot");
                None
            }
        };
        if let Some(stored) = stored {
            match (options.force, stored.status) {
                (false, Status::Ok | Status::Reviewed) => {
                    tracing::debug!(dir = %dir.display(), status = %stored.status, "using stored snapshot");
                    return Ok(Some(stored));
                }
                (true, Status::Reviewed) => release.status = Status::Reviewed,
                _ => {}
            }
        }

        let sfv_file = files.iter().find(|p| has_extension(p, "sfv")).cloned();
        let m3u_file = files.iter().find(|p| has_extension(p, "m3u")).cloned();

        let mut candidates = match self.split_cue(dir)? {
            Some(split) => split,
            None => read_candidates(tags, &files)?,
        };
        candidates = transcode::convert_to_codec(
            candidates,
            &options.target_codec,
            options.bitrate,
            self.collaborators.transcoder,
            tags,
        )?;

        if candidates.is_empty() {
            release.status = Status::NoMediaFiles;
            release.push_message(ProcessingMessage::bad("No media files found"));
            return Ok(None);
        }

        let mut groups = group_by_album(candidates);
        let group = groups.remove(0);
        if !groups.is_empty() {
            let ignored: Vec<String> = groups
                .iter()
                .map(|(album, _)| album.clone().unwrap_or_default())
                .collect();
            tracing::warn!(dir = %dir.display(), ignored = ?ignored, "directory holds more than one album");
            release.push_message(ProcessingMessage::warning(format!(
                "Directory holds more than one album, ignored [{}]",
                ignored.join(", ")
            )));
        }
        let (_, members) = group;

        self.build_release(now, dir, &members, release)?;

        let album_artists = members
            .iter()
            .map(|t| t.album_artist_or_artist().map(str::to_string))
            .collect();
        let input = ClassifyInput::with_manifests(album_artists, sfv_file.as_deref(), m3u_file.as_deref())?;
        classify::classify(release, &input);
        classify::summarize(release);

        release.last_updated = Some(now);
        release.push_message(ProcessingMessage::info(format!("Processed [{release}]")));
        save::write_release_files(release, &options.snapshot_file_name)?;
        Ok(None)
    }

    /// Hoist disc folders, cover folders and CUE folders into `dir`.
    /// Returns whether any file moved.
    fn process_subdirectories(&self, dir: &Path) -> anyhow::Result<bool> {
        let subdirectories = directory::subdirectories(dir)?;
        let mut moved = false;
        for sub in &subdirectories {
            let name = file_name_of(sub);

            if text::is_cover_images_directory(&name) {
                let mut images = self.collaborators.images.find_images(sub, ImageType::Release, false);
                images.extend(self.collaborators.images.find_images(sub, ImageType::ReleaseSecondary, false));
                images.sort();
                images.dedup();
                images
                    .par_iter()
                    .map(|image| directory::move_file(image, &dir.join(file_name_of(image))))
                    .collect::<anyhow::Result<Vec<_>>>()?;
                moved |= !images.is_empty();
            }

            let has_cue = self.split_cue(sub)?.is_some();
            if has_cue || text::is_media_directory(&name) {
                moved |= self.hoist_media(dir, sub, &name)?;
            }
        }

        for sub in subdirectories.iter().rev() {
            let empty = fs::read_dir(sub).map(|mut e| e.next().is_none()).unwrap_or(false);
            if empty && fs::remove_dir(sub).is_ok() {
                tracing::info!(dir = %sub.display(), "removed empty directory");
            }
        }
        Ok(moved)
    }

    /// Move audio out of a disc folder, prefixing each name with its media
    /// number (`m002 01 Song.mp3`). Files without a disc number get the
    /// folder's.
    fn hoist_media(&self, dir: &Path, sub: &Path, name: &str) -> anyhow::Result<bool> {
        let tags = self.collaborators.tag_store;
        let audio = read_candidates(tags, &directory::list_files(sub)?)?;
        if audio.is_empty() {
            return Ok(false);
        }
        tracing::debug!(sub = %sub.display(), files = audio.len(), "hoisting media directory");
        let max_disc = self.options.max_disc_number;
        audio
            .par_iter()
            .map(|tag| -> anyhow::Result<()> {
                let tagged = tag.disc_number.filter(|n| *n > 0);
                let media_number = tagged.unwrap_or_else(|| text::media_number_from_directory(name, max_disc));
                let target = dir.join(format!("m{media_number:03} {}", file_name_of(&tag.path)));
                directory::move_file(&tag.path, &target)?;
                if tagged.is_none() {
                    let fields = TagWrite {
                        disc_number: Some(media_number),
                        ..Default::default()
                    };
                    tags.write(&target, &fields)?;
                }
                Ok(())
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(true)
    }

    /// Split and re-tag the directory's CUE sheet, deleting the sheet and
    /// its sources. `None` when there is no sheet.
    fn split_cue(&self, dir: &Path) -> anyhow::Result<Option<Vec<TagData>>> {
        let mut sheets = Vec::new();
        for path in directory::files_with_extension(dir, "cue")? {
            if file_name_of(&path).to_lowercase().ends_with("isrc.cue") {
                fs::remove_file(&path).with_context(|| format!("deleting {}", path.display()))?;
                tracing::info!(file = %path.display(), "deleted ISRC sheet");
            } else {
                sheets.push(path);
            }
        }
        let Some(cue_path) = sheets.into_iter().next() else {
            return Ok(None);
        };

        let sheet = cue::parse_file(&cue_path).with_context(|| format!("parsing {}", cue_path.display()))?;
        let options = self.options;
        let transcoder = self.collaborators.transcoder;
        let extension = transcode::codec_extension(&options.target_codec);
        let splits = CueSplitter::new(&sheet, &cue_path).with_extension(extension).split(
            |source, destination, start, end| {
                let offset = start.time.offset();
                let duration = end.map(|e| e.time.offset().saturating_sub(offset));
                transcoder.convert_range(source, destination, offset, duration, &options.target_codec, options.bitrate)?;
                Ok(())
            },
        )?;

        let album = sheet.title.clone().ok_or(CueError::MissingField("title"))?;
        let album_artist = sheet.performer.clone().ok_or(CueError::MissingField("performer"))?;
        let year = sheet.year(&file_name_of(&cue_path))?;
        let track_total = splits.len() as u32;
        let tags = self.collaborators.tag_store;

        let retagged = splits
            .par_iter()
            .map(|split| -> anyhow::Result<TagData> {
                let title = split.track.title.clone().ok_or(CueError::MissingField("track title"))?;
                let artist = match split.track.performer.as_deref() {
                    Some(performer) if !text::names_match(Some(album_artist.as_str()), Some(performer)) => performer.to_string(),
                    _ => String::new(),
                };
                let fields = TagWrite {
                    album: Some(album.clone()),
                    album_artist: Some(album_artist.clone()),
                    artist: Some(artist),
                    title: Some(title),
                    genre: sheet.genre.clone(),
                    year: Some(year),
                    disc_number: Some(sheet.disc_number.unwrap_or(1)),
                    disc_total: Some(sheet.disc_total.unwrap_or(1)),
                    track_number: Some(split.track.number),
                    track_total: Some(track_total),
                    clear_comment: true,
                };
                tags.write(&split.file_path, &fields)?;
                tags.read(&split.file_path)?
                    .with_context(|| format!("unreadable split output {}", split.file_path.display()))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let base = cue_path.parent().unwrap_or(dir);
        for file in &sheet.files {
            let source = base.join(&file.file_name);
            if source.is_file() {
                fs::remove_file(&source).with_context(|| format!("deleting {}", source.display()))?;
                tracing::info!(file = %source.display(), "deleted CUE source");
            }
        }
        fs::remove_file(&cue_path).with_context(|| format!("deleting {}", cue_path.display()))?;
        tracing::info!(cue = %cue_path.display(), tracks = retagged.len(), "split CUE sheet");
        Ok(Some(retagged))
    }

    fn build_release(
        &self,
        now: DateTime<Utc>,
        dir: &Path,
        members: &[TagData],
        release: &mut Release,
    ) -> anyhow::Result<()> {
        let first = &members[0];
        release.artist = first
            .album_artist_or_artist()
            .and_then(text::clean_artist_name)
            .map(DataToken::new);
        release.release_data = DataToken::from_text(first.album.as_deref());
        release.genre = DataToken::from_text(first.genre.as_deref());
        release.set_release_date(
            members
                .iter()
                .find_map(|t| t.year.filter(|y| *y > 0))
                .and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1)),
        );
        release.is_studio_album = text::is_studio_album_directory(&file_name_of(dir));

        let resolver = ArtworkResolver::new(self.collaborators.images);
        let (thumbnail, message) = resolver.artist_thumbnail(first, dir)?;
        release.artist_thumbnail = thumbnail;
        release.push_message(message);
        let (cover, message) = resolver.cover(first, dir, release.title_text())?;
        release.cover_image = Some(cover);
        release.push_message(message);

        let mut by_disc: BTreeMap<u32, Vec<&TagData>> = BTreeMap::new();
        for tag in members {
            by_disc.entry(tag.disc()).or_default().push(tag);
        }

        let release_artist = release.artist_text().map(str::to_string);
        for (disc, tags) in by_disc {
            let mut media = Media::new(disc);
            media.subtitle = tags.iter().find_map(|t| t.subtitle.as_deref()).and_then(text::clean_string);
            media.tracks = tags
                .par_iter()
                .map(|tag| build_track(now, tag, release_artist.as_deref()))
                .collect::<anyhow::Result<Vec<_>>>()?;
            media.tracks.sort_by_key(|t| t.number());
            media.track_count = tags
                .iter()
                .filter_map(|t| t.track_total)
                .max()
                .unwrap_or(media.tracks.len() as u32);
            release.media.push(media);
        }

        release.media_count = release.media.len() as u32;
        release.track_count = release.tracks().count() as u32;
        release.duration_ms = release.tracks().filter_map(|t| t.duration_ms).sum();
        tracing::debug!(
            dir = %dir.display(),
            media = release.media_count,
            tracks = release.track_count,
            "built release"
        );
        Ok(())
    }
}

fn build_track(now: DateTime<Utc>, tag: &TagData, release_artist: Option<&str>) -> anyhow::Result<Track> {
    let mut track = Track::new(&tag.path);
    track.created = Some(now);
    track.track_number = tag.track_number;
    track.title = tag.title.as_deref().and_then(text::clean_string);
    track.duration_ms = Some(tag.duration_ms);
    match fingerprint(&tag.path)? {
        Some((hash, size)) => {
            track.file_hash = Some(hash);
            track.file_size = Some(size);
        }
        None => track.status = Status::Missing,
    }
    if !text::names_match(release_artist, tag.artist.as_deref()) {
        track.track_artist = DataToken::from_text(tag.artist.as_deref());
    }
    Ok(track)
}

/// Tag every file in parallel, keeping the audio candidates.
fn read_candidates(tags: &dyn TagStore, files: &[PathBuf]) -> anyhow::Result<Vec<TagData>> {
    let read = files
        .par_iter()
        .map(|path| tags.read(path))
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(read.into_iter().flatten().filter(TagData::is_audio_candidate).collect())
}

/// Group by album title in first-seen order.
fn group_by_album(candidates: Vec<TagData>) -> Vec<(Option<String>, Vec<TagData>)> {
    let mut groups: Vec<(Option<String>, Vec<TagData>)> = Vec::new();
    for tag in candidates {
        let album = tag.album.as_deref().and_then(text::clean_string);
        match groups.iter_mut().find(|(a, _)| *a == album) {
            Some((_, members)) => members.push(tag),
            None => groups.push((album, vec![tag])),
        }
    }
    groups
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Tags looked up by path first, then by file content so that moved
    /// files keep their tags. Writes are recorded under both. Unknown `.mp3`
    /// files read as bare MPEG audio.
    #[derive(Default)]
    pub struct MemoryTagStore {
        pub by_path: Mutex<HashMap<PathBuf, TagData>>,
        pub by_content: Mutex<HashMap<Vec<u8>, TagData>>,
    }

    impl MemoryTagStore {
        pub fn with_file(&mut self, dir: &Path, name: &str, tag: TagData) {
            let content = format!("audio:{}", dir.join(name).display()).into_bytes();
            fs::write(dir.join(name), &content).unwrap();
            self.by_content.lock().unwrap().insert(content, tag);
        }
    }

    pub fn audio(album: &str, number: u32, total: u32, title: &str) -> TagData {
        TagData {
            format_id: 0,
            short_codec: "mpeg".into(),
            duration_ms: 180_000,
            album: Some(album.into()),
            artist: Some("Bob".into()),
            title: Some(title.into()),
            year: Some(2001),
            track_number: Some(number),
            track_total: Some(total),
            ..Default::default()
        }
    }

    impl TagStore for MemoryTagStore {
        fn read(&self, path: &Path) -> anyhow::Result<Option<TagData>> {
            if let Some(tag) = self.by_path.lock().unwrap().get(path) {
                return Ok(Some(tag.clone()));
            }
            let Ok(content) = fs::read(path) else {
                return Ok(None);
            };
            let known = self.by_content.lock().unwrap().get(&content).cloned();
            let tag = match known {
                Some(tag) => tag,
                None if has_extension(path, "mp3") => TagData {
                    format_id: 0,
                    short_codec: "mpeg".into(),
                    duration_ms: 1_000,
                    ..Default::default()
                },
                None => return Ok(None),
            };
            Ok(Some(TagData {
                path: path.to_path_buf(),
                ..tag
            }))
        }

        fn write(&self, path: &Path, fields: &TagWrite) -> anyhow::Result<()> {
            let mut tag = self.read(path)?.context("not audio")?;
            tag.album = fields.album.clone().or(tag.album);
            tag.album_artist = fields.album_artist.clone().or(tag.album_artist);
            tag.artist = match fields.artist.as_deref() {
                Some("") => None,
                Some(artist) => Some(artist.to_string()),
                None => tag.artist,
            };
            tag.title = fields.title.clone().or(tag.title);
            tag.genre = fields.genre.clone().or(tag.genre);
            tag.year = fields.year.or(tag.year);
            tag.disc_number = fields.disc_number.or(tag.disc_number);
            tag.disc_total = fields.disc_total.or(tag.disc_total);
            tag.track_number = fields.track_number.or(tag.track_number);
            tag.track_total = fields.track_total.or(tag.track_total);
            if let Ok(content) = fs::read(path) {
                self.by_content.lock().unwrap().insert(content, tag.clone());
            }
            self.by_path.lock().unwrap().insert(path.to_path_buf(), tag);
            Ok(())
        }
    }
}
