//! Artist thumbnail and cover resolution for a release directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::images::{self, ImageClassifier, ImageType};
use crate::release::{Image, ProcessingMessage};
use crate::tags::{PictureType, TagData};
use crate::text;

pub const ARTIST_IMAGE_FILE: &str = "artist.jpg";
pub const COVER_IMAGE_FILE: &str = "cover.jpg";
pub const COVERS_DIRECTORY: &str = "Covers";

static IMAGE_NOT_FOUND: &[u8] = include_bytes!("../assets/image_not_found.png");

/// Proof prints (`cover-proof.jpg`) are not authoritative artwork.
pub fn is_proof_image(path: &Path) -> bool {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_lowercase().ends_with("proof"))
        .unwrap_or(false)
}

pub fn placeholder_image() -> Image {
    Image {
        bytes: IMAGE_NOT_FOUND.to_vec(),
        caption: Some("Image not found".to_string()),
    }
}

fn read_image(path: &Path) -> anyhow::Result<Image> {
    let bytes = fs::read(path).with_context(|| format!("reading image {}", path.display()))?;
    Ok(Image {
        bytes,
        caption: path.file_name().map(|n| n.to_string_lossy().into_owned()),
    })
}

fn embedded(first: &TagData, types: &[PictureType]) -> Option<Image> {
    first.picture(types).map(|picture| Image {
        bytes: picture.data.clone(),
        caption: picture.description.clone(),
    })
}

fn first_authoritative(candidates: Vec<PathBuf>) -> Option<PathBuf> {
    candidates.into_iter().find(|path| !is_proof_image(path))
}

pub struct ArtworkResolver<'a> {
    images: &'a dyn ImageClassifier,
}

impl<'a> ArtworkResolver<'a> {
    pub fn new(images: &'a dyn ImageClassifier) -> Self {
        Self { images }
    }

    fn classified(&self, directory: &Path, image_type: ImageType, recursive: bool) -> Option<PathBuf> {
        first_authoritative(self.images.find_images(directory, image_type, recursive))
    }

    /// Embedded artist/band picture, else the directory's artist image, else
    /// a secondary artist image.
    pub fn artist_thumbnail(&self, first: &TagData, directory: &Path) -> anyhow::Result<(Option<Image>, ProcessingMessage)> {
        if let Some(image) = embedded(first, &[PictureType::Artist, PictureType::Band]) {
            return Ok((Some(image), ProcessingMessage::ok("Artist image from embedded picture")));
        }
        for image_type in [ImageType::Artist, ImageType::ArtistSecondary] {
            if let Some(path) = self.classified(directory, image_type, true) {
                let message = ProcessingMessage::ok(format!("Artist image from [{}]", path.display()));
                return Ok((Some(read_image(&path)?), message));
            }
        }
        Ok((None, ProcessingMessage::info("No artist image found")))
    }

    /// Cover lookup, falling back through the parent directory, a sibling
    /// `Covers` folder and a title-named file before the placeholder.
    pub fn cover(&self, first: &TagData, directory: &Path, release_title: &str) -> anyhow::Result<(Image, ProcessingMessage)> {
        if let Some(image) = embedded(first, &[PictureType::Front, PictureType::Generic]) {
            return Ok((image, ProcessingMessage::ok("Cover image from embedded picture")));
        }

        let mut lookups: Vec<(PathBuf, ImageType, bool)> = vec![
            (directory.to_path_buf(), ImageType::Release, true),
            (directory.to_path_buf(), ImageType::ReleaseSecondary, true),
        ];
        if let Some(parent) = directory.parent() {
            lookups.push((parent.to_path_buf(), ImageType::Release, false));
            lookups.push((parent.join(COVERS_DIRECTORY), ImageType::Release, false));
        }
        for (dir, image_type, recursive) in lookups {
            if let Some(path) = self.classified(&dir, image_type, recursive) {
                let message = ProcessingMessage::ok(format!("Cover image from [{}]", path.display()));
                return Ok((read_image(&path)?, message));
            }
        }

        if let Some(path) = titled_image(directory, release_title) {
            let message = ProcessingMessage::ok(format!("Cover image named for release [{}]", path.display()));
            return Ok((read_image(&path)?, message));
        }

        Ok((placeholder_image(), ProcessingMessage::warning("No cover image found, using placeholder")))
    }
}

/// An image whose name contains the release title, in the directory or the
/// parent's `Covers` folder.
fn titled_image(directory: &Path, release_title: &str) -> Option<PathBuf> {
    let title = text::alphanumeric_name(release_title);
    if title.is_empty() {
        return None;
    }
    let mut search = vec![directory.to_path_buf()];
    if let Some(parent) = directory.parent() {
        search.push(parent.join(COVERS_DIRECTORY));
    }
    search.iter().find_map(|dir| {
        let mut files = images::image_files(dir, false);
        files.sort();
        first_authoritative(
            files
                .into_iter()
                .filter(|path| {
                    path.file_stem()
                        .map(|stem| text::alphanumeric_name(&stem.to_string_lossy()).contains(&title))
                        .unwrap_or(false)
                })
                .collect(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::PatternImageClassifier;
    use crate::tags::EmbeddedPicture;

    fn first_tag() -> TagData {
        TagData {
            path: PathBuf::from("/x/01.mp3"),
            format_id: 0,
            short_codec: "mpeg".into(),
            duration_ms: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_proof_detection() {
        assert!(is_proof_image(Path::new("/a/cover-proof.jpg")));
        assert!(is_proof_image(Path::new("/a/FrontPROOF.png")));
        assert!(!is_proof_image(Path::new("/a/cover.jpg")));
    }

    #[test]
    fn test_embedded_picture_wins() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cover.jpg"), b"file").unwrap();
        let mut first = first_tag();
        first.pictures.push(EmbeddedPicture {
            picture_type: PictureType::Front,
            data: b"embedded".to_vec(),
            description: None,
        });
        let resolver = ArtworkResolver::new(&PatternImageClassifier);
        let (cover, _) = resolver.cover(&first, dir.path(), "Hits").unwrap();
        assert_eq!(cover.bytes, b"embedded");
    }

    #[test]
    fn test_proof_cover_rejected_for_next_source() {
        let root = tempfile::tempdir().unwrap();
        let release = root.path().join("Bob - Hits");
        fs::create_dir(&release).unwrap();
        fs::write(release.join("cover-proof.jpg"), b"proof").unwrap();
        fs::write(release.join("back.jpg"), b"back").unwrap();

        let resolver = ArtworkResolver::new(&PatternImageClassifier);
        let (cover, message) = resolver.cover(&first_tag(), &release, "Hits").unwrap();
        assert_eq!(cover.bytes, b"back");
        assert!(message.is_ok);
    }

    #[test]
    fn test_cover_from_sibling_covers_then_placeholder() {
        let root = tempfile::tempdir().unwrap();
        let release = root.path().join("Bob - Hits");
        fs::create_dir(&release).unwrap();
        let resolver = ArtworkResolver::new(&PatternImageClassifier);

        let (cover, message) = resolver.cover(&first_tag(), &release, "Hits").unwrap();
        assert_eq!(cover, placeholder_image());
        assert!(!message.is_ok);

        let covers = root.path().join(COVERS_DIRECTORY);
        fs::create_dir(&covers).unwrap();
        fs::write(covers.join("Greatest Hits.jpg"), b"titled").unwrap();
        let (cover, _) = resolver.cover(&first_tag(), &release, "Greatest Hits").unwrap();
        assert_eq!(cover.bytes, b"titled");
    }

    #[test]
    fn test_artist_thumbnail_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ArtworkResolver::new(&PatternImageClassifier);
        let (image, _) = resolver.artist_thumbnail(&first_tag(), dir.path()).unwrap();
        assert!(image.is_none());

        fs::write(dir.path().join("logo.png"), b"logo").unwrap();
        let (image, _) = resolver.artist_thumbnail(&first_tag(), dir.path()).unwrap();
        assert_eq!(image.unwrap().bytes, b"logo");
    }

    #[test]
    fn test_placeholder_is_png() {
        assert!(placeholder_image().bytes.starts_with(b"\x89PNG"));
    }
}
