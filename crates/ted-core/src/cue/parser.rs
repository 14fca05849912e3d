use std::fs;
use std::path::Path;

use super::{CueError, CueFile, CueIndex, CueSheet, CueTrack, IndexTime};

/// One non-blank line split into its command and whitespace-delimited parts.
struct Line<'a> {
    number: usize,
    text: &'a str,
    command: String,
    parts: Vec<&'a str>,
}

impl<'a> Line<'a> {
    fn new(number: usize, text: &'a str) -> Option<Self> {
        let text = text.trim();
        let parts: Vec<&str> = text.split_whitespace().collect();
        let first = parts.first()?.to_ascii_uppercase();
        let command = match (first.as_str(), parts.get(1)) {
            ("REM", Some(second)) => format!("REM {}", second.to_ascii_uppercase()),
            _ => first,
        };
        Some(Self { number, text, command, parts })
    }

    fn command_tokens(&self) -> usize {
        if self.command.starts_with("REM ") {
            2
        } else {
            1
        }
    }

    /// Text following the command, unquoted.
    fn value(&self) -> Option<String> {
        let value = tail(self.text, self.command_tokens()).trim_matches([' ', '"']);
        (!value.is_empty()).then(|| value.to_string())
    }

    fn error(&self, message: impl Into<String>) -> CueError {
        CueError::Parse {
            line: self.number,
            message: message.into(),
        }
    }
}

fn tail(text: &str, skip: usize) -> &str {
    let mut rest = text.trim_start();
    for _ in 0..skip {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        rest = rest[end..].trim_start();
    }
    rest
}

pub fn parse_file(path: &Path) -> Result<CueSheet, CueError> {
    let bytes = fs::read(path)?;
    parse_str(&crate::text::decode_text(&bytes))
}

pub fn parse_str(text: &str) -> Result<CueSheet, CueError> {
    let lines: Vec<Line> = text
        .lines()
        .enumerate()
        .filter_map(|(i, line)| Line::new(i + 1, line))
        .collect();

    let mut sheet = CueSheet::default();
    let file_count = lines.iter().filter(|l| l.command == "FILE").count();
    sheet.is_standard = file_count == 1;
    if !sheet.is_standard {
        sheet.is_noncompliant = is_noncompliant(&lines);
    }

    parse_root(&lines, &mut sheet)?;
    let tracks = parse_tracks(&lines)?;

    if sheet.is_standard {
        sheet.files[0].tracks = tracks;
    } else {
        if sheet.files.len() != tracks.len() {
            return Err(CueError::FileTrackMismatch {
                files: sheet.files.len(),
                tracks: tracks.len(),
            });
        }
        for (file, track) in sheet.files.iter_mut().zip(tracks) {
            file.tracks.push(track);
        }
    }
    Ok(sheet)
}

/// A multi-file sheet whose first file carries more tracks than files seen.
fn is_noncompliant(lines: &[Line]) -> bool {
    let Some(first) = lines.iter().position(|l| l.command == "FILE") else {
        return false;
    };
    let mut file_count = 1;
    let mut track_count = 0;
    for line in &lines[first + 1..] {
        match line.command.as_str() {
            "TRACK" => track_count += 1,
            "FILE" => file_count += 1,
            _ => {}
        }
        if track_count > file_count {
            return true;
        }
        if file_count > 1 {
            return false;
        }
    }
    false
}

fn parse_root(lines: &[Line], sheet: &mut CueSheet) -> Result<(), CueError> {
    let mut seen_file = false;
    for line in lines {
        match line.command.as_str() {
            "FILE" => {
                seen_file = true;
                sheet.files.push(parse_file_line(line)?);
            }
            "REM GENRE" => sheet.genre = line.value(),
            "REM DATE" => sheet.date = line.value(),
            "REM DISCID" => sheet.disc_id = line.value(),
            "REM DISCNUMBER" => sheet.disc_number = line.value().and_then(|v| v.parse().ok()),
            "REM TOTALDISCS" => sheet.disc_total = line.value().and_then(|v| v.parse().ok()),
            "REM COMMENT" => {
                if let Some(value) = line.value() {
                    sheet.comments.push(("COMMENT".to_string(), value));
                }
            }
            _ if seen_file => {}
            "CATALOG" => sheet.catalog = line.value(),
            "CDTEXTFILE" => sheet.cd_text_file = line.value(),
            "PERFORMER" => sheet.performer = line.value(),
            "SONGWRITER" => sheet.songwriter = line.value(),
            "TITLE" => sheet.title = line.value(),
            other if other.starts_with("REM ") => {
                if let Some(value) = line.value() {
                    sheet.comments.push((line.parts[1].to_ascii_uppercase(), value));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_file_line(line: &Line) -> Result<CueFile, CueError> {
    let rest = tail(line.text, 1);
    let (file_name, file_type) = if let Some(quoted) = rest.strip_prefix('"') {
        let end = quoted
            .find('"')
            .ok_or_else(|| line.error("unterminated file name"))?;
        let file_type = quoted[end + 1..].trim();
        (&quoted[..end], (!file_type.is_empty()).then_some(file_type))
    } else {
        match rest.rsplit_once(char::is_whitespace) {
            Some((name, file_type)) => (name.trim(), Some(file_type)),
            None => (rest, None),
        }
    };
    if file_name.is_empty() {
        return Err(line.error("FILE without a file name"));
    }
    Ok(CueFile {
        file_name: file_name.to_string(),
        file_type: file_type.map(str::to_string),
        tracks: Vec::new(),
    })
}

fn parse_tracks(lines: &[Line]) -> Result<Vec<CueTrack>, CueError> {
    let mut tracks = Vec::new();
    let mut current: Option<CueTrack> = None;

    for line in lines {
        if line.command == "TRACK" {
            tracks.extend(current.take());
            let track = parse_track_line(line)?;
            current = track.track_type.eq_ignore_ascii_case("AUDIO").then_some(track);
            continue;
        }
        let Some(track) = current.as_mut() else {
            continue;
        };
        match line.command.as_str() {
            "FLAGS" => track.flags = line.value(),
            "ISRC" => track.isrc = line.value(),
            "PERFORMER" => track.performer = line.value(),
            "SONGWRITER" => track.songwriter = line.value(),
            "TITLE" => track.title = line.value(),
            "INDEX" => track.indices.push(parse_index_line(line)?),
            "PREGAP" => track.pregap = Some(parse_gap_line(line)?),
            "POSTGAP" => track.postgap = Some(parse_gap_line(line)?),
            _ => {}
        }
    }
    tracks.extend(current);
    Ok(tracks)
}

fn parse_track_line(line: &Line) -> Result<CueTrack, CueError> {
    let number = line
        .parts
        .get(1)
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| line.error("TRACK without a valid number"))?;
    let track_type = line
        .parts
        .get(2)
        .ok_or_else(|| line.error("TRACK without a type"))?;
    Ok(CueTrack {
        number,
        track_type: track_type.to_ascii_uppercase(),
        ..Default::default()
    })
}

fn parse_index_line(line: &Line) -> Result<CueIndex, CueError> {
    if line.parts.len() < 3 {
        return Err(line.error("INDEX requires a number and a time"));
    }
    let number: u32 = line.parts[1]
        .parse()
        .map_err(|_| line.error(format!("invalid index number '{}'", line.parts[1])))?;
    let time: IndexTime = line.parts[line.parts.len() - 1].parse()?;
    CueIndex::new(number, time)
}

fn parse_gap_line(line: &Line) -> Result<CueIndex, CueError> {
    let time = line
        .parts
        .last()
        .filter(|_| line.parts.len() > 1)
        .ok_or_else(|| line.error("gap without a time"))?;
    CueIndex::new(0, time.parse()?)
}
