//! Regex-driven heuristics over human-entered names and titles.
//!
//! Everything here is pure: no I/O, no shared mutable state. The compiled
//! patterns are process-wide statics built on first use.

use std::sync::LazyLock;

use encoding_rs::WINDOWS_1252;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Default ceiling for disc numbers inferred from directory names.
pub const MAX_DISC_NUMBER: u32 = 500;

static FEATURING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\s[\(\[]*ft[\s\.]|\s*[\(\[]*with\s+|\s*[\(\[]*feat[\s\.]|[\(\[]*featuring)+")
        .unwrap()
});

static SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+(?:with|and|x|ft\.?|feat\.?|featuring)\s+|\s*[;&,]\s*").unwrap()
});

static UNWANTED_RELEASE_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)(\s*(-\s)*(CD[_\-#\s]*[0-9]*))",
        r"|(\s[\[\(]*(lp|ep|bonus|release|re-*issue|re-*master|re-*mastered|anniversary|single|cd|disc",
        r"|deluxe|digipak|digipack|vinyl|japan(ese)*|asian|remastered|limited|ltd|expanded",
        r"|(re)*-*edition|web|\(320\)|\(*compilation\)*)+(\]|\)*))",
    ))
    .unwrap()
});

static UNWANTED_TRACK_TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\s{2,}|(\s\(prod\s))").unwrap());

static NOT_STUDIO_ALBUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(single(s)*|compilation(s*)|live|promo(s*)|demo)").unwrap());

static COVER_DIRECTORY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)cover(s*)|scans").unwrap());

static MEDIA_DIRECTORY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\s*(CD[.\S]*[0-9])|(CD\s[0-9])+)").unwrap());

static DISC_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)cd[\s_\-#\[\(]*([0-9]+)").unwrap());

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(19|20)[0-9]{2}").unwrap());

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Decode text file bytes as UTF-8 (BOM tolerated), falling back to
/// Windows-1252.
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    let (decoded, _, _) = WINDOWS_1252.decode(bytes);
    decoded.into_owned()
}

pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Collapse internal whitespace, straighten the typographic apostrophe and
/// trim. Blank input yields `None`.
pub fn clean_string(value: &str) -> Option<String> {
    if is_blank(value) {
        return None;
    }
    let value = value.replace('\u{2019}', "'");
    let value = WHITESPACE_RE.replace_all(&value, " ");
    Some(value.trim().to_string())
}

/// Clean an artist name and strip separator punctuation left dangling at
/// either end (`"Bob,"`, `"; Bob"`).
pub fn clean_artist_name(value: &str) -> Option<String> {
    let cleaned = clean_string(value)?;
    let trimmed = cleaned
        .trim_matches(|c: char| matches!(c, ',' | ';' | '/' | '&' | '-' | ':') || c.is_whitespace());
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn has_featuring_fragment(value: &str) -> bool {
    !is_blank(value) && FEATURING_RE.is_match(value)
}

/// Split `value` at its first featuring fragment.
///
/// Returns `(leading_text, featuring_names)`. Featuring names are separator
/// normalized to `/`, with trailing brackets trimmed and quotes straightened.
/// Blank input yields `(None, None)`; input without a fragment comes back
/// unchanged with no featuring names.
pub fn split_featuring(value: &str) -> (Option<String>, Option<String>) {
    if is_blank(value) {
        return (None, None);
    }
    let Some(found) = FEATURING_RE.find(value) else {
        return (Some(value.to_string()), None);
    };
    let leading = clean_string(&value[..found.start()]);
    let remainder = FEATURING_RE.replace_all(&value[found.start()..], "");
    let featuring = clean_string(&remainder)
        .and_then(|names| replace_artist_separators(&names))
        .map(|names| straighten_quotes(names.trim_end_matches([']', ')']).trim()))
        .filter(|names| !names.is_empty());
    (leading, featuring)
}

/// Normalize artist list separators (`&`, `and`, `with`, `;`, `x`, `,`,
/// `ft.`) to `/`.
pub fn replace_artist_separators(value: &str) -> Option<String> {
    if is_blank(value) {
        return None;
    }
    let replaced = SEPARATOR_RE.replace_all(value, "/");
    Some(replaced.trim().to_string())
}

fn straighten_quotes(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '"' | '\u{201C}' | '\u{201D}' | '\u{2018}' | '\u{2019}' => '\'',
            other => other,
        })
        .collect()
}

pub fn release_title_has_unwanted_text(title: &str) -> bool {
    is_blank(title) || UNWANTED_RELEASE_TITLE_RE.is_match(title)
}

/// Remove every edition-noise fragment from a release title.
pub fn remove_unwanted_release_title_text(title: &str) -> Option<String> {
    if is_blank(title) {
        return None;
    }
    clean_string(&UNWANTED_RELEASE_TITLE_RE.replace_all(title, ""))
}

pub fn track_has_unwanted_text(release_title: &str, track_title: &str, track_number: Option<u32>) -> bool {
    if is_blank(track_title) {
        return true;
    }
    if has_featuring_fragment(track_title) || UNWANTED_TRACK_TITLE_RE.is_match(track_title) {
        return true;
    }
    if !track_title.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }
    let number = track_number.unwrap_or(0);
    if track_title.trim() == number.to_string() {
        return true;
    }
    let pattern = format!(r"^({}\s*.*\s*)?([0-9]*{}\s)", regex::escape(release_title), number);
    match Regex::new(&pattern) {
        Ok(guard) => guard.is_match(track_title),
        Err(e) => {
            tracing::warn!(error = %e, "track title guard pattern failed to compile");
            false
        }
    }
}

/// Directories whose name hints at singles, compilations, live or demo
/// material are not studio albums.
pub fn is_studio_album_directory(name: &str) -> bool {
    !NOT_STUDIO_ALBUM_RE.is_match(name)
}

pub fn is_cover_images_directory(name: &str) -> bool {
    COVER_DIRECTORY_RE.is_match(name)
}

pub fn is_media_directory(name: &str) -> bool {
    MEDIA_DIRECTORY_RE.is_match(name)
}

/// Infer a disc number from a directory name such as `CD2` or `[CD-02]`.
///
/// Candidates are scanned from `max_disc_number` downward so that `CD12`
/// resolves to 12 rather than 1. Falls back to 1.
pub fn media_number_from_directory(name: &str, max_disc_number: u32) -> u32 {
    let runs: Vec<&str> = DISC_NUMBER_RE
        .captures_iter(name)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim_start_matches('0'))
        .filter(|digits| !digits.is_empty())
        .collect();
    if runs.is_empty() {
        return 1;
    }
    (1..=max_disc_number)
        .rev()
        .find(|n| {
            let n = n.to_string();
            runs.iter().any(|digits| digits.starts_with(&n))
        })
        .unwrap_or(1)
}

/// Rightmost 19xx/20xx year embedded in `value`.
pub fn year_from_text(value: &str) -> Option<i32> {
    YEAR_RE
        .find_iter(value)
        .last()
        .and_then(|m| m.as_str().parse().ok())
}

/// Equality for human-entered names: case, diacritics and punctuation are
/// ignored. Two blank names are equal.
pub fn names_match(a: Option<&str>, b: Option<&str>) -> bool {
    let a = a.filter(|v| !is_blank(v));
    let b = b.filter(|v| !is_blank(v));
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => alphanumeric_name(a) == alphanumeric_name(b),
        _ => false,
    }
}

/// Lowercase ASCII alphanumeric form of a name, used as a comparison key.
pub fn alphanumeric_name(value: &str) -> String {
    let value = value
        .to_lowercase()
        .replace("&amp;", "&")
        .replace('$', "s")
        .replace('%', "per")
        .replace('&', "and");
    let mut out = String::with_capacity(value.len());
    for c in value.nfd().filter(|c| !is_combining_mark(*c)) {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if let Some(latin) = transliterate(c) {
            out.push_str(latin);
        }
    }
    out
}

fn transliterate(c: char) -> Option<&'static str> {
    let latin = match c {
        'ß' => "ss",
        'æ' => "ae",
        'ø' => "oe",
        'œ' => "oe",
        'ð' => "dh",
        'þ' => "th",
        'ł' => "l",
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'д' => "d",
        'е' | 'ё' | 'э' => "e",
        'ж' => "zh",
        'з' => "z",
        'и' | 'й' => "i",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "kh",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "shch",
        'ы' => "y",
        'ю' => "yu",
        'я' => "ya",
        _ => return None,
    };
    Some(latin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_featuring_detection() {
        for title in [
            "Something ft Bob",
            "Something Ft. Bob",
            "Something feat Bob",
            "Something (Feat. Bob)",
            "Something [featuring Bob]",
            "Something with Bob",
        ] {
            assert!(has_featuring_fragment(title), "{title}");
        }
        for title in ["Something", "Without You", "Leftovers", "", "   "] {
            assert!(!has_featuring_fragment(title), "{title}");
        }
    }

    #[test]
    fn test_split_featuring_title() {
        let (title, names) = split_featuring("Dada (feat. Tefo Foxx & Foxxy Brown)");
        assert_eq!(title.as_deref(), Some("Dada"));
        assert_eq!(names.as_deref(), Some("Tefo Foxx/Foxxy Brown"));

        let (title, names) = split_featuring(
            "Sol (Feat. Gustavo \u{201C}Chizzo\u{201D} Napoli (La Renga) & Alex Lora)",
        );
        assert_eq!(title.as_deref(), Some("Sol"));
        assert_eq!(names.as_deref(), Some("Gustavo 'Chizzo' Napoli (La Renga)/Alex Lora"));

        let (title, names) = split_featuring("Track Title (Ft. Alisha)");
        assert_eq!(title.as_deref(), Some("Track Title"));
        assert_eq!(names.as_deref(), Some("Alisha"));
    }

    #[test]
    fn test_split_featuring_without_fragment() {
        assert_eq!(split_featuring("Plain Title"), (Some("Plain Title".to_string()), None));
        assert_eq!(split_featuring("  "), (None, None));
    }

    #[test]
    fn test_replace_artist_separators() {
        assert_eq!(
            replace_artist_separators("Whitesnake & Tesla ft Banana").as_deref(),
            Some("Whitesnake/Tesla/Banana")
        );
        assert_eq!(
            replace_artist_separators("Duke/Jones X Justin Theroux").as_deref(),
            Some("Duke/Jones/Justin Theroux")
        );
        assert_eq!(replace_artist_separators("A; B, C").as_deref(), Some("A/B/C"));
        assert_eq!(replace_artist_separators("Post Malone Ft. Doja Cat").as_deref(), Some("Post Malone/Doja Cat"));
        assert_eq!(replace_artist_separators("Xzibit").as_deref(), Some("Xzibit"));
    }

    #[test]
    fn test_release_title_unwanted_text() {
        for title in [
            "Monarch (Expanded)",
            "Bobs Greatest Hits CD 01",
            "Something (Deluxe Edition)",
            "Something [Remastered]",
            "Something (20th Anniversary)",
            "Something (Japanese)",
            "",
            "  ",
        ] {
            assert!(release_title_has_unwanted_text(title), "{title}");
        }
        for title in ["Retro", "Bobs Greatest Hits", "Superman III", "Ten Summoner's Tales"] {
            assert!(!release_title_has_unwanted_text(title), "{title}");
        }
    }

    #[test]
    fn test_remove_unwanted_release_title_text() {
        assert_eq!(
            remove_unwanted_release_title_text("Bobs Greatest Hits CD 01").as_deref(),
            Some("Bobs Greatest Hits")
        );
        assert_eq!(remove_unwanted_release_title_text("Retro").as_deref(), Some("Retro"));
    }

    #[test]
    fn test_track_title_unwanted_text() {
        assert!(track_has_unwanted_text("Release Title", "15", Some(15)));
        assert!(track_has_unwanted_text("Release Title", "", Some(1)));
        assert!(track_has_unwanted_text("Release Title", "Track  Title", Some(1)));
        assert!(track_has_unwanted_text("Release Title", "Track Title (prod DJ Stinky)", Some(1)));
        assert!(track_has_unwanted_text("Release Title", "Track Title (Ft. Bob)", Some(1)));
        assert!(track_has_unwanted_text("Release Title", "Release Title 03 Track Title", Some(3)));
        assert!(track_has_unwanted_text("Release Title", "03 Track Title", Some(3)));

        assert!(!track_has_unwanted_text("Release Title", "Track Title - Part II", Some(11)));
        assert!(!track_has_unwanted_text("Release Title", "Karakondžula", Some(2)));
        assert!(!track_has_unwanted_text(
            "Release Title",
            "I Can't Even Walk Without You Holding My Hand",
            Some(4)
        ));
        assert!(!track_has_unwanted_text("Release Title", "Deep Delightful (DJ Andy De Gage Remix)", Some(5)));
        assert!(!track_has_unwanted_text("Release Title", "'81 Camaro", Some(1)));
    }

    #[test]
    fn test_media_number_from_directory() {
        assert_eq!(media_number_from_directory("CD1", MAX_DISC_NUMBER), 1);
        assert_eq!(media_number_from_directory("CD 2", MAX_DISC_NUMBER), 2);
        assert_eq!(media_number_from_directory("[CD-02]", MAX_DISC_NUMBER), 2);
        assert_eq!(media_number_from_directory("Release CD12", MAX_DISC_NUMBER), 12);
        assert_eq!(media_number_from_directory("cd_007", MAX_DISC_NUMBER), 7);
        assert_eq!(media_number_from_directory("Bonus Tracks", MAX_DISC_NUMBER), 1);
        assert_eq!(media_number_from_directory("CD12", 5), 1);
    }

    #[test]
    fn test_directory_name_patterns() {
        assert!(is_media_directory("CD1"));
        assert!(is_media_directory("[CD-02]"));
        assert!(is_media_directory("CD 3"));
        assert!(!is_media_directory("Scans"));

        assert!(is_cover_images_directory("Covers"));
        assert!(is_cover_images_directory("Scans"));
        assert!(!is_cover_images_directory("CD1"));

        assert!(is_studio_album_directory("Bob - 1999 - Greatest Hits"));
        assert!(!is_studio_album_directory("Bob - Singles"));
        assert!(!is_studio_album_directory("Bob Live at Wembley"));
    }

    #[test]
    fn test_year_from_text() {
        assert_eq!(year_from_text("Bob - 1999 - Hits.cue"), Some(1999));
        assert_eq!(year_from_text("1985 reissued 2011"), Some(2011));
        assert_eq!(year_from_text("no year"), None);
    }

    #[test]
    fn test_names_match() {
        assert!(names_match(Some("Beyoncé"), Some("beyonce")));
        assert!(names_match(Some("AC/DC"), Some("ac dc")));
        assert!(names_match(Some("Simon & Garfunkel"), Some("Simon and Garfunkel")));
        assert!(names_match(Some("Ke$ha"), Some("Kesha")));
        assert!(names_match(None, Some("  ")));
        assert!(!names_match(Some("Bob"), None));
        assert!(!names_match(Some("Bob"), Some("Jim")));
    }

    #[test]
    fn test_decode_text_windows_1252_fallback() {
        assert_eq!(decode_text(b"TITLE \"Caf\xE9\""), "TITLE \"Caf\u{e9}\"");
        assert_eq!(decode_text("\u{feff}Caf\u{e9}".as_bytes()), "Caf\u{e9}");
    }

    #[test]
    fn test_clean_artist_name() {
        assert_eq!(clean_artist_name("  Bob ,").as_deref(), Some("Bob"));
        assert_eq!(clean_artist_name("Bob\u{2019}s   Band").as_deref(), Some("Bob's Band"));
        assert_eq!(clean_artist_name(" ; "), None);
    }
}
