//! Status classification of a freshly built release.
//!
//! Checks run once, in a fixed order. Each check can only tighten the status.
//! A `Reviewed` release keeps its status through every check except the
//! track-number gap check at the end; its tracks are still checked.

use crate::manifest;
use crate::release::{ProcessingMessage, Release, Status};
use crate::text;

/// Facts gathered during ingestion that are not part of the release graph.
#[derive(Debug, Clone, Default)]
pub struct ClassifyInput {
    /// Album artist (or artist) of every ingested tag file.
    pub album_artists: Vec<Option<String>>,
    /// Track lines in the release's SFV manifest, when it has one.
    pub sfv_track_count: Option<usize>,
    /// Track lines in the release's M3U playlist, when it has one.
    pub m3u_track_count: Option<usize>,
}

impl ClassifyInput {
    pub fn with_manifests(
        album_artists: Vec<Option<String>>,
        sfv: Option<&std::path::Path>,
        m3u: Option<&std::path::Path>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            album_artists,
            sfv_track_count: sfv.map(manifest::count_track_lines).transpose()?,
            m3u_track_count: m3u.map(manifest::count_track_lines).transpose()?,
        })
    }
}

fn tighten(release: &mut Release, to: Status) {
    release.status = release.status.escalate(to);
}

pub fn classify(release: &mut Release, input: &ClassifyInput) {
    let found = release.tracks().count() as u32;
    let declared: u32 = release.media.iter().map(|m| m.track_count).sum();
    let complete = found == declared;
    tighten(release, if complete { Status::Ok } else { Status::Incomplete });
    release.push_message(ProcessingMessage::check(
        format!("Found [{found}] tracks, expected [{declared}]"),
        complete,
    ));

    let manifests = [("SFV", input.sfv_track_count), ("M3U", input.m3u_track_count)];
    for (kind, count) in manifests {
        let Some(count) = count else { continue };
        if release.status != Status::Ok {
            continue;
        }
        let matches = release.track_count as usize == count;
        if !matches {
            tighten(release, Status::Incomplete);
        }
        release.push_message(ProcessingMessage::check(
            format!("{kind} lists [{count}] tracks, release has [{}]", release.track_count),
            matches,
        ));
    }

    if release.status == Status::Ok {
        let first = input.album_artists.first().and_then(|a| a.as_deref());
        let same = input
            .album_artists
            .iter()
            .all(|artist| text::names_match(first, artist.as_deref()));
        if !same {
            tighten(release, Status::NeedsAttention);
        }
        release.push_message(ProcessingMessage::check("All tracks have the same album artist", same));
    }

    if release.status == Status::Ok {
        let featuring = release.artist_text().is_some_and(text::has_featuring_fragment);
        if featuring {
            tighten(release, Status::NeedsAttention);
        }
        release.push_message(ProcessingMessage::check("Release artist has no featuring fragment", !featuring));
    }

    check_tracks(release);

    if release.status == Status::Ok {
        let unwanted = text::release_title_has_unwanted_text(release.title_text());
        if unwanted {
            tighten(release, Status::NeedsAttention);
        }
        release.push_message(ProcessingMessage::check(
            format!("Release title [{}] is clean", release.title_text()),
            !unwanted,
        ));
    }

    if release.status == Status::Ok {
        let valid_year = release.year.is_some_and(|y| y > 0);
        if !valid_year {
            tighten(release, Status::NeedsAttention);
        }
        release.push_message(ProcessingMessage::check("Release has a year", valid_year));
    }

    check_gaps(release);
    tracing::debug!(dir = %release.directory.display(), status = %release.status, "classified");
}

/// Closing audit lines appended after classification. They never change the
/// status.
pub fn summarize(release: &mut Release) {
    let checks = [
        ("Duration is acceptable".to_string(), release.duration_ms > 0),
        ("Media count is acceptable".to_string(), release.media_count > 0),
        ("Track count is acceptable".to_string(), release.track_count > 0),
        (
            format!("Release is {}", if release.is_valid() { "valid" } else { "invalid" }),
            release.is_valid(),
        ),
        (
            format!("Status [{}] is {}", release.status, acceptable(release.status == Status::Ok)),
            release.status == Status::Ok,
        ),
    ];
    for (message, is_ok) in checks {
        release.push_message(ProcessingMessage::check(message, is_ok));
    }
    let invalid: Vec<String> = release.tracks().filter(|t| !t.is_valid()).map(|t| t.to_string()).collect();
    release.push_message(ProcessingMessage::check(
        if invalid.is_empty() {
            "All tracks are valid".to_string()
        } else {
            format!("Invalid tracks: {}", invalid.join("; "))
        },
        invalid.is_empty(),
    ));
}

fn acceptable(ok: bool) -> &'static str {
    if ok {
        "acceptable"
    } else {
        "not acceptable"
    }
}

/// Per-track heuristics plus media and track ordinal checks. Track statuses
/// are always recomputed; the release status goes through `tighten`.
fn check_tracks(release: &mut Release) {
    release.media.sort_by_key(|m| m.media_number);
    let release_title = release.title_text().to_string();
    let mut out_of_order = Vec::new();

    for (media_position, media) in release.media.iter_mut().enumerate() {
        if media.media_number != media_position as u32 + 1 {
            out_of_order.push(format!("media [{}] at position [{}]", media.media_number, media_position + 1));
        }
        media.tracks.sort_by_key(|t| t.number());
        for (position, track) in media.tracks.iter_mut().enumerate() {
            let unwanted = text::track_has_unwanted_text(&release_title, track.title_text(), track.track_number)
                || track.artist_text().is_some_and(text::has_featuring_fragment);
            if unwanted || track.number() != position as u32 + 1 {
                track.status = track.status.escalate(Status::NeedsAttention);
            }
            if track.number() != position as u32 + 1 {
                out_of_order.push(format!("track [{}] at position [{}]", track.number(), position + 1));
            }
        }
    }

    if !out_of_order.is_empty() {
        tighten(release, Status::NeedsAttention);
        release.push_message(ProcessingMessage::bad(format!(
            "Numbering out of order: {}",
            out_of_order.join(", ")
        )));
    }

    let flagged: Vec<String> = release
        .tracks()
        .filter(|t| t.status != Status::New)
        .map(|t| format!("{t} [{}]", t.status))
        .collect();
    if !flagged.is_empty() {
        tighten(release, Status::NeedsAttention);
    }
    release.push_message(ProcessingMessage::check(
        if flagged.is_empty() {
            "All tracks passed checks".to_string()
        } else {
            format!("Tracks need attention: {}", flagged.join("; "))
        },
        flagged.is_empty(),
    ));
}

/// Gaps in a media's track numbers force `Incomplete`, even over `Reviewed`.
fn check_gaps(release: &mut Release) {
    let gaps: Vec<String> = release
        .media
        .iter()
        .filter_map(|media| {
            let missing: Vec<String> = media.missing_track_numbers().iter().map(u32::to_string).collect();
            (!missing.is_empty()).then(|| format!("media [{}] missing [{}]", media.media_number, missing.join(", ")))
        })
        .collect();
    if gaps.is_empty() {
        return;
    }
    release.status = Status::Incomplete;
    release.push_message(ProcessingMessage::bad(format!("Track numbers have gaps: {}", gaps.join("; "))));
}
