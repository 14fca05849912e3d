//! Writing an edited release back to its directory.

use std::fs;

use anyhow::Context;
use chrono::{DateTime, Utc};
use rayon::prelude::*;

use crate::artwork;
use crate::release::Release;
use crate::snapshot;
use crate::tags::{TagStore, TagWrite};
use crate::text;

/// Artist and cover images, then the snapshot last. The placeholder cover is
/// never written out.
pub fn write_release_files(release: &Release, snapshot_file_name: &str) -> anyhow::Result<()> {
    if let Some(thumbnail) = &release.artist_thumbnail {
        let path = release.directory.join(artwork::ARTIST_IMAGE_FILE);
        fs::write(&path, &thumbnail.bytes).with_context(|| format!("writing {}", path.display()))?;
    }
    if let Some(cover) = release.cover_image.as_ref().filter(|c| **c != artwork::placeholder_image()) {
        let path = release.directory.join(artwork::COVER_IMAGE_FILE);
        fs::write(&path, &cover.bytes).with_context(|| format!("writing {}", path.display()))?;
    }
    snapshot::save(release, snapshot_file_name)
}

/// Re-tag every track file from the release graph and rewrite the side
/// files.
///
/// A release without artist, title or year is an error. Failures on single
/// track files are collected and returned instead.
pub fn save_release(
    release: &mut Release,
    now: DateTime<Utc>,
    tags: &dyn TagStore,
    snapshot_file_name: &str,
) -> anyhow::Result<Vec<String>> {
    let artist = release.artist_text().context("release has no artist")?.to_string();
    let album = release
        .release_data
        .as_ref()
        .map(|r| r.text.clone())
        .context("release has no title")?;
    let year = release.year.context("release has no year")?;
    let disc_total = release.media.iter().map(|m| m.media_number).max();

    let jobs: Vec<_> = release
        .media
        .iter()
        .flat_map(|media| media.tracks.iter().map(move |track| (media, track)))
        .collect();

    let failures: Vec<String> = jobs
        .par_iter()
        .filter_map(|(media, track)| {
            let track_artist = track
                .artist_text()
                .filter(|a| !text::names_match(Some(artist.as_str()), Some(*a)))
                .unwrap_or_default();
            let fields = TagWrite {
                album: Some(album.clone()),
                album_artist: Some(artist.clone()),
                artist: Some(track_artist.to_string()),
                title: track.title.clone(),
                year: Some(year),
                disc_number: Some(media.media_number),
                disc_total,
                track_number: track.track_number,
                track_total: Some(media.track_count),
                clear_comment: true,
                ..Default::default()
            };
            match tags.write(&track.file_name, &fields) {
                Ok(()) => None,
                Err(e) => {
                    tracing::warn!(file = %track.file_name.display(), error = %format!("{e:#}"), "unable to update track");
                    Some(format!("Unable to update [{track}]: {e:#}"))
                }
            }
        })
        .collect();

    release.last_updated = Some(now);
    write_release_files(release, snapshot_file_name)?;
    tracing::info!(dir = %release.directory.display(), failures = failures.len(), "saved {release}");
    Ok(failures)
}
