//! Filename-pattern classification of image files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    Artist,
    ArtistSecondary,
    Release,
    ReleaseSecondary,
}

pub trait ImageClassifier: Send + Sync {
    /// Image files of `image_type` in `directory`, ordered by file name.
    fn find_images(&self, directory: &Path, image_type: ImageType, recursive: bool) -> Vec<PathBuf>;
}

static ARTIST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(band|artist|group|photo).*\.(jpg|jpeg|png|bmp|gif|webp)").unwrap());

static ARTIST_SECONDARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(artist_logo|logo|photo[-_\s]*[0-9]+|artist[\s_-]+[0-9]+|band[\s_-]+[0-9]+)\.(jpg|jpeg|png|bmp|gif|webp)",
    )
    .unwrap()
});

static RELEASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)((f[-_\s]*[0-9]*)|00|art|big[art]*|cover|cvr|folder|release|front[-_\s]*)\.(jpg|jpeg|png|bmp|gif|webp)",
    )
    .unwrap()
});

static RELEASE_SECONDARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)((img[\s_-]*[0-9]*[\s_-]*[0-9]*)|(book[let]*[#_\s(-]*[0-9]*-*[0-9]*\)*)",
        r"|(encartes[-_\s]*\(*[0-9]*\)*)|sc[an]*.?[0-9]*|matrix.?[0-9]*|(cover[\s_-]*[0-9]+)",
        r"|back|dvd|traycard|jewel case|disc|.*[in]*side.*|in[side|lay|let|site]*[0-9]*",
        r"|digipack.?\[?\(?[0-9]*\]?\)?|cd.?\[?\(?[0-9]*\]?\)?|(release[\s_-]+[0-9]+))",
        r"\.(jpg|jpeg|png|bmp|gif|webp)",
    ))
    .unwrap()
});

pub fn is_image_file(path: &Path) -> bool {
    mime_guess::from_path(path)
        .first()
        .map_or(false, |mime| mime.type_() == mime_guess::mime::IMAGE)
}

pub fn image_type_matches(file_name: &str, image_type: ImageType) -> bool {
    let pattern = match image_type {
        ImageType::Artist => &ARTIST_RE,
        ImageType::ArtistSecondary => &ARTIST_SECONDARY_RE,
        ImageType::Release => &RELEASE_RE,
        ImageType::ReleaseSecondary => &RELEASE_SECONDARY_RE,
    };
    pattern.is_match(file_name)
}

/// Image files directly in `directory` (or below it when `recursive`).
pub fn image_files(directory: &Path, recursive: bool) -> Vec<PathBuf> {
    let mut found = Vec::new();
    collect_image_files(directory, recursive, &mut found);
    found
}

fn collect_image_files(directory: &Path, recursive: bool, found: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(directory) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if recursive {
                collect_image_files(&path, recursive, found);
            }
        } else if is_image_file(&path) {
            found.push(path);
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PatternImageClassifier;

impl ImageClassifier for PatternImageClassifier {
    fn find_images(&self, directory: &Path, image_type: ImageType, recursive: bool) -> Vec<PathBuf> {
        let mut matches: Vec<PathBuf> = image_files(directory, recursive)
            .into_iter()
            .filter(|path| {
                path.file_name()
                    .map(|name| image_type_matches(&name.to_string_lossy(), image_type))
                    .unwrap_or(false)
            })
            .collect();
        matches.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        matches
    }
}
