//! Reading and writing embedded audio metadata.

use std::path::{Path, PathBuf};

use anyhow::Context;
use lofty::config::WriteOptions;
use lofty::file::{FileType, TaggedFileExt};
use lofty::picture::PictureType as LoftyPictureType;
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::{ItemKey, Tag};

/// Short codec name of the ambiguous MPEG-4 container.
pub const MPEG4_CODEC: &str = "mpeg-4";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureType {
    Artist,
    Band,
    Front,
    Generic,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedPicture {
    pub picture_type: PictureType,
    pub data: Vec<u8>,
    pub description: Option<String>,
}

/// Everything the pipeline needs from one audio file's tags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagData {
    pub path: PathBuf,
    /// Negative when the container is not a recognized audio format.
    pub format_id: i32,
    pub short_codec: String,
    pub duration_ms: u64,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub artist: Option<String>,
    pub title: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub disc_number: Option<u32>,
    pub disc_total: Option<u32>,
    pub track_number: Option<u32>,
    pub track_total: Option<u32>,
    pub subtitle: Option<String>,
    pub pictures: Vec<EmbeddedPicture>,
}

impl TagData {
    /// Disc number with missing or zero coerced to 1.
    pub fn disc(&self) -> u32 {
        self.disc_number.filter(|n| *n > 0).unwrap_or(1)
    }

    pub fn album_artist_or_artist(&self) -> Option<&str> {
        self.album_artist
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .or(self.artist.as_deref())
    }

    /// Audio the pipeline should consider: a known format with a duration,
    /// where an MPEG-4 container only counts with an `.m4a` extension.
    pub fn is_audio_candidate(&self) -> bool {
        if self.format_id < 0 || self.duration_ms == 0 {
            return false;
        }
        if self.short_codec == MPEG4_CODEC {
            return self
                .path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("m4a"));
        }
        true
    }

    pub fn picture(&self, types: &[PictureType]) -> Option<&EmbeddedPicture> {
        self.pictures.iter().find(|p| types.contains(&p.picture_type))
    }
}

/// Fields to write; `None` leaves the existing value alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagWrite {
    pub album: Option<String>,
    pub album_artist: Option<String>,
    /// `Some("")` removes the track artist.
    pub artist: Option<String>,
    pub title: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub disc_number: Option<u32>,
    pub disc_total: Option<u32>,
    pub track_number: Option<u32>,
    pub track_total: Option<u32>,
    pub clear_comment: bool,
}

pub trait TagStore: Send + Sync {
    /// `Ok(None)` when the file is not audio this store understands.
    fn read(&self, path: &Path) -> anyhow::Result<Option<TagData>>;

    fn write(&self, path: &Path, fields: &TagWrite) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyTagStore;

fn codec_of(file_type: &FileType) -> (i32, &'static str) {
    match file_type {
        FileType::Mpeg => (0, "mpeg"),
        FileType::Mp4 => (1, MPEG4_CODEC),
        FileType::Flac => (2, "flac"),
        FileType::Wav => (3, "wav"),
        FileType::Aiff => (4, "aiff"),
        FileType::Vorbis => (5, "vorbis"),
        FileType::Opus => (6, "opus"),
        FileType::Ape => (7, "ape"),
        FileType::WavPack => (8, "wavpack"),
        FileType::Aac => (9, "aac"),
        FileType::Mpc => (10, "mpc"),
        FileType::Speex => (11, "speex"),
        _ => (-1, "unknown"),
    }
}

fn picture_type_of(pic_type: LoftyPictureType) -> PictureType {
    match pic_type {
        LoftyPictureType::Artist | LoftyPictureType::LeadArtist => PictureType::Artist,
        LoftyPictureType::Band => PictureType::Band,
        LoftyPictureType::CoverFront => PictureType::Front,
        LoftyPictureType::Other => PictureType::Generic,
        _ => PictureType::Other,
    }
}

impl TagStore for LoftyTagStore {
    fn read(&self, path: &Path) -> anyhow::Result<Option<TagData>> {
        let tagged_file = match Probe::open(path).and_then(|probe| probe.read()) {
            Ok(file) => file,
            Err(e) => {
                tracing::debug!(file = %path.display(), error = %e, "not a readable audio file");
                return Ok(None);
            }
        };

        let (format_id, short_codec) = codec_of(&tagged_file.file_type());
        let mut data = TagData {
            path: path.to_path_buf(),
            format_id,
            short_codec: short_codec.to_string(),
            duration_ms: tagged_file.properties().duration().as_millis() as u64,
            ..Default::default()
        };

        if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
            data.album = tag.album().map(|s| s.to_string());
            data.album_artist = tag.get_string(&ItemKey::AlbumArtist).map(str::to_string);
            data.artist = tag.artist().map(|s| s.to_string());
            data.title = tag.title().map(|s| s.to_string());
            data.genre = tag.genre().map(|s| s.to_string());
            data.year = tag.year().map(|y| y as i32);
            data.disc_number = tag.disk();
            data.disc_total = tag.disk_total();
            data.track_number = tag.track();
            data.track_total = tag.track_total();
            data.subtitle = tag.get_string(&ItemKey::SetSubtitle).map(str::to_string);
            data.pictures = tag
                .pictures()
                .iter()
                .map(|pic| EmbeddedPicture {
                    picture_type: picture_type_of(pic.pic_type()),
                    data: pic.data().to_vec(),
                    description: pic.description().map(str::to_string),
                })
                .collect();
        }

        Ok(Some(data))
    }

    fn write(&self, path: &Path, fields: &TagWrite) -> anyhow::Result<()> {
        let mut tagged_file = Probe::open(path)
            .and_then(|probe| probe.read())
            .with_context(|| format!("reading tags of {}", path.display()))?;

        if tagged_file.primary_tag().is_none() {
            let tag_type = tagged_file.primary_tag_type();
            tagged_file.insert_tag(Tag::new(tag_type));
        }
        let tag = tagged_file
            .primary_tag_mut()
            .with_context(|| format!("no writable tag for {}", path.display()))?;

        if let Some(album) = &fields.album {
            tag.set_album(album.clone());
        }
        if let Some(album_artist) = &fields.album_artist {
            tag.insert_text(ItemKey::AlbumArtist, album_artist.clone());
        }
        match fields.artist.as_deref() {
            Some("") => tag.remove_artist(),
            Some(artist) => tag.set_artist(artist.to_string()),
            None => {}
        }
        if let Some(title) = &fields.title {
            tag.set_title(title.clone());
        }
        if let Some(genre) = &fields.genre {
            tag.set_genre(genre.clone());
        }
        if let Some(year) = fields.year.filter(|y| *y > 0) {
            tag.set_year(year as u32);
        }
        if let Some(disc) = fields.disc_number {
            tag.set_disk(disc);
        }
        if let Some(total) = fields.disc_total {
            tag.set_disk_total(total);
        }
        if let Some(track) = fields.track_number {
            tag.set_track(track);
        }
        if let Some(total) = fields.track_total {
            tag.set_track_total(total);
        }
        if fields.clear_comment {
            tag.remove_comment();
        }

        tag.save_to_path(path, WriteOptions::default())
            .with_context(|| format!("writing tags to {}", path.display()))?;
        tracing::debug!(file = %path.display(), "tags written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag_data(path: &str, codec: &str) -> TagData {
        TagData {
            path: PathBuf::from(path),
            format_id: 1,
            short_codec: codec.to_string(),
            duration_ms: 1000,
            ..Default::default()
        }
    }

    #[test]
    fn test_audio_candidate_rules() {
        assert!(tag_data("/a/01.mp3", "mpeg").is_audio_candidate());
        assert!(tag_data("/a/01.m4a", MPEG4_CODEC).is_audio_candidate());
        assert!(!tag_data("/a/clip.mp4", MPEG4_CODEC).is_audio_candidate());

        let mut unknown = tag_data("/a/readme.txt", "unknown");
        unknown.format_id = -1;
        assert!(!unknown.is_audio_candidate());

        let mut silent = tag_data("/a/01.mp3", "mpeg");
        silent.duration_ms = 0;
        assert!(!silent.is_audio_candidate());
    }

    #[test]
    fn test_disc_defaults_to_one() {
        let mut data = tag_data("/a/01.mp3", "mpeg");
        assert_eq!(data.disc(), 1);
        data.disc_number = Some(0);
        assert_eq!(data.disc(), 1);
        data.disc_number = Some(2);
        assert_eq!(data.disc(), 2);
    }

    #[test]
    fn test_album_artist_falls_back_to_artist() {
        let mut data = tag_data("/a/01.mp3", "mpeg");
        data.artist = Some("Bob".into());
        assert_eq!(data.album_artist_or_artist(), Some("Bob"));
        data.album_artist = Some("Bob and Friends".into());
        assert_eq!(data.album_artist_or_artist(), Some("Bob and Friends"));
    }

    #[test]
    fn test_lofty_reads_non_audio_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "not audio").unwrap();
        assert!(LoftyTagStore.read(&path).unwrap().is_none());
    }
}
