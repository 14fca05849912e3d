//! Corrective transforms over an already built release.
//!
//! Every transform visits media ordered by number and tracks ordered by
//! number, and leaves that order in place.

use chrono::{DateTime, Datelike, Utc};
use regex::RegexBuilder;

use crate::release::{DataToken, Release, Track};
use crate::text;

pub const MINIMUM_YEAR: i32 = 1900;

fn sort_graph(release: &mut Release) {
    release.media.sort_by_key(|m| m.media_number);
    for media in &mut release.media {
        media.tracks.sort_by_key(|t| t.number());
    }
}

fn set_track_artist(track: &mut Track, artist: Option<String>) {
    track.track_artist = artist.and_then(|a| DataToken::from_text(Some(&a)));
}

/// Resequence tracks 1..N within each media, keeping their relative order.
pub fn renumber_tracks(release: &mut Release) {
    sort_graph(release);
    let mut total = 0;
    for media in &mut release.media {
        for (position, track) in media.tracks.iter_mut().enumerate() {
            track.track_number = Some(position as u32 + 1);
        }
        media.track_count = media.tracks.len() as u32;
        total += media.track_count;
    }
    release.track_count = total;
}

/// Drop the first `length` characters of every track title.
pub fn trim_track_titles(release: &mut Release, length: usize) {
    sort_graph(release);
    for track in release.tracks_mut() {
        if let Some(title) = track.title.as_deref().filter(|t| !text::is_blank(t)) {
            track.title = Some(title.chars().skip(length).collect());
        }
    }
}

pub fn replace_text_in_track_titles(release: &mut Release, from: &str, to: &str) {
    if from.is_empty() {
        return;
    }
    sort_graph(release);
    for track in release.tracks_mut() {
        if let Some(title) = track.title.as_deref().filter(|t| !text::is_blank(t)) {
            track.title = Some(title.replace(from, to).trim().to_string());
        }
    }
}

/// Move featuring credits out of track titles into the track artist.
///
/// Extracted names are appended to an existing track artist with `/`, or
/// become the track artist. Names equal to the release artist are dropped.
pub fn remove_featuring_artist_from_track_titles(release: &mut Release) {
    sort_graph(release);
    let release_artist = release.artist_text().map(str::to_string);
    for track in release.tracks_mut() {
        let (title, featuring) = text::split_featuring(track.title_text());
        if let Some(title) = title {
            track.title = Some(title);
        }
        let Some(featuring) = featuring else { continue };
        if text::names_match(release_artist.as_deref(), Some(featuring.as_str())) {
            continue;
        }
        let merged = match track.artist_text().filter(|a| !text::is_blank(a)) {
            Some(existing) => format!("{existing}/{featuring}"),
            None => featuring,
        };
        set_track_artist(track, Some(merged));
    }
}

/// Rewrite track artists like `"Bob Ft. Jim"` as `"Jim"` on a release by Bob,
/// or `"Jim/Lulu"` elsewhere; a track artist equal to the release artist is
/// cleared.
pub fn remove_featuring_artist_from_track_artists(release: &mut Release) {
    sort_graph(release);
    let release_artist = release.artist_text().map(str::to_string);
    let is_release_artist = |name: &str| text::names_match(release_artist.as_deref(), Some(name));
    for track in release.tracks_mut() {
        let Some(current) = track.artist_text().map(str::to_string) else {
            continue;
        };
        match text::split_featuring(&current) {
            (Some(lead), None) if !is_release_artist(lead.as_str()) => set_track_artist(track, Some(lead)),
            (Some(lead), Some(featuring)) => {
                if !is_release_artist(lead.as_str()) && !is_release_artist(featuring.as_str()) {
                    set_track_artist(track, Some(format!("{lead}/{featuring}")));
                } else if is_release_artist(lead.as_str()) && !is_release_artist(featuring.as_str()) {
                    set_track_artist(track, Some(featuring));
                }
            }
            _ => set_track_artist(track, None),
        }
    }
}

pub fn replace_track_artist_separators(release: &mut Release) {
    sort_graph(release);
    for track in release.tracks_mut() {
        if let Some(current) = track.artist_text().map(str::to_string) {
            set_track_artist(track, text::replace_artist_separators(&current));
        }
    }
}

/// Make the first track's artist the release artist and clear every track
/// artist.
pub fn promote_track_artist(release: &mut Release) {
    sort_graph(release);
    let first = release
        .media
        .first()
        .and_then(|m| m.tracks.first())
        .and_then(|t| t.track_artist.clone());
    let Some(first) = first else {
        tracing::debug!(dir = %release.directory.display(), "no track artist to promote");
        return;
    };
    release.artist = Some(first);
    remove_track_artists(release);
}

pub fn remove_track_artists(release: &mut Release) {
    sort_graph(release);
    for track in release.tracks_mut() {
        track.track_artist = None;
    }
}

/// Remove the release artist (and a trailing `&`/`and`/`with`) from a track
/// artist. A blank release artist leaves the track artist alone.
pub fn remove_artist_from_track_artist(artist: Option<&str>, track_artist: Option<&str>) -> Option<String> {
    let Some(artist) = artist.filter(|a| !text::is_blank(a)) else {
        return track_artist.map(str::to_string);
    };
    let track_artist = track_artist.filter(|a| !text::is_blank(a))?;
    let pattern = format!(r"\s*({})\s*(&|and|with)*", regex::escape(artist.trim()));
    let stripped = match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(re) => re.replace_all(track_artist, "").trim().to_string(),
        Err(e) => {
            tracing::warn!(error = %e, artist, "artist pattern failed to compile");
            return Some(track_artist.to_string());
        }
    };
    text::clean_string(&stripped)
}

pub fn remove_artist_from_track_artists(release: &mut Release) {
    sort_graph(release);
    let release_artist = release.artist_text().map(str::to_string);
    for track in release.tracks_mut() {
        if track.track_artist.is_some() {
            let stripped = remove_artist_from_track_artist(release_artist.as_deref(), track.artist_text());
            set_track_artist(track, stripped);
        }
    }
}

pub fn is_valid_release_year(year: Option<i32>, now: DateTime<Utc>) -> bool {
    year.is_some_and(|y| (MINIMUM_YEAR..=now.year() + 1).contains(&y))
}

/// Reset an implausible release date to `now`. Returns whether it changed.
pub fn repair_release_year(release: &mut Release, now: DateTime<Utc>) -> bool {
    if is_valid_release_year(release.year, now) {
        return false;
    }
    tracing::info!(dir = %release.directory.display(), year = ?release.year, "resetting release year");
    release.set_release_date(Some(now.date_naive()));
    true
}

/// Strip edition noise from the release title once.
pub fn scrub_release_title(release: &mut Release) {
    let scrubbed = text::remove_unwanted_release_title_text(release.title_text());
    release.release_data = DataToken::from_text(scrubbed.as_deref());
}

/// Every corrective transform, in a fixed order.
pub fn apply_all(release: &mut Release, now: DateTime<Utc>) {
    renumber_tracks(release);
    remove_featuring_artist_from_track_artists(release);
    remove_featuring_artist_from_track_titles(release);
    replace_track_artist_separators(release);
    repair_release_year(release, now);
    scrub_release_title(release);
    release.last_updated = Some(now);
}
