//! Naming conventions for the local library.
//!
//! Three things get names here:
//!
//! - **Chapter directories** read by the directory provider follow an
//!   `NNN-title` pattern, where the number may be fractional: `012.5-Omake`.
//! - **Archive files** are named `<label> [<digest>].cbz`. The label is for
//!   humans (`Vol.2 Ch.012.5 - Omake`); the digest is the first
//!   [`DIGEST_LEN`] hex characters of SHA-256 over the chapter id and is the
//!   only part the library index trusts.
//! - **Page entries** inside an archive are `0000.jpg`, `0001.png`, …, with the
//!   extension sniffed from the image's magic bytes.
//!
//! ```text
//! library/
//! └── Dungeon Diary/
//!     ├── cover.jpg
//!     ├── Ch.001 - Arrival [3f9a0c21be].cbz
//!     └── Vol.2 Ch.012.5 - Omake [a01b77e9c4].cbz
//! ```

use crate::types::{Chapter, format_number};
use sha2::{Digest, Sha256};

/// Number of hex characters of the chapter-id digest kept in file names.
pub const DIGEST_LEN: usize = 10;

/// File extension of published archives.
pub const ARCHIVE_EXTENSION: &str = "cbz";

/// Result of parsing a chapter directory name like `012.5-Omake`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedName {
    /// Number prefix if present (e.g. `12.5` from `012.5-Omake`)
    pub number: Option<f64>,
    /// Display title: the part after the number, dashes converted to spaces.
    /// For unnumbered entries this is the whole input.
    pub display_title: String,
}

/// Parse a chapter directory name following the `NNN-title` convention.
///
/// - `"012-The-Gate"` → number=Some(12.0), display_title="The Gate"
/// - `"012.5-Omake"` → number=Some(12.5), display_title="Omake"
/// - `"007"` → number=Some(7.0), display_title=""
/// - `"extras"` → number=None, display_title="extras"
pub fn parse_entry_name(name: &str) -> ParsedName {
    if let Some(dash_pos) = name.find('-') {
        let prefix = &name[..dash_pos];
        if let Some(num) = parse_number(prefix) {
            return ParsedName {
                number: Some(num),
                display_title: name[dash_pos + 1..].replace('-', " "),
            };
        }
    }
    if let Some(num) = parse_number(name) {
        return ParsedName {
            number: Some(num),
            display_title: String::new(),
        };
    }
    ParsedName {
        number: None,
        display_title: name.replace('-', " "),
    }
}

/// Accept plain decimal numbers only; `f64::from_str` would also take
/// `inf`, `NaN` and exponents.
fn parse_number(s: &str) -> Option<f64> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Replace characters that are invalid in file names on common filesystems.
///
/// Leading/trailing dots and whitespace are trimmed so the result can never
/// be a hidden file or a relative path component. Empty input becomes `_`.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = replaced.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Human-readable label for a chapter: `Vol.2 Ch.012.5 - Omake`.
///
/// Chapter numbers are padded to three integer digits so labels sort
/// naturally in file browsers. Missing parts are left out; a chapter with
/// neither number nor title falls back to its id.
pub fn chapter_label(chapter: &Chapter) -> String {
    let mut parts = Vec::new();
    if let Some(volume) = chapter.volume {
        parts.push(format!("Vol.{}", format_number(volume)));
    }
    if let Some(number) = chapter.number {
        parts.push(format!("Ch.{}", pad_number(number)));
    }
    let title = chapter.title.trim();
    let label = match (parts.is_empty(), title.is_empty()) {
        (true, true) => chapter.id.clone(),
        (true, false) => title.to_string(),
        (false, true) => parts.join(" "),
        (false, false) => format!("{} - {}", parts.join(" "), title),
    };
    sanitize_filename(&label)
}

fn pad_number(number: f64) -> String {
    let formatted = format_number(number);
    match formatted.split_once('.') {
        Some((int, frac)) => format!("{:0>3}.{}", int, frac),
        None => format!("{:0>3}", formatted),
    }
}

/// Hex digest of a chapter id, truncated to [`DIGEST_LEN`].
pub fn id_digest(id: &str) -> String {
    let digest = Sha256::digest(id.as_bytes());
    let mut hex = format!("{:x}", digest);
    hex.truncate(DIGEST_LEN);
    hex
}

/// File name an archive for `chapter` is committed under.
pub fn archive_file_name(chapter: &Chapter) -> String {
    format!(
        "{} [{}].{}",
        chapter_label(chapter),
        id_digest(&chapter.id),
        ARCHIVE_EXTENSION
    )
}

/// Extract the id digest from an archive file name.
///
/// Returns `None` for anything that is not a `<label> [<digest>].cbz` name,
/// including in-progress temp files.
pub fn parse_archive_digest(file_name: &str) -> Option<&str> {
    let stem = file_name.strip_suffix(&format!(".{}", ARCHIVE_EXTENSION))?;
    let stem = stem.strip_suffix(']')?;
    let open = stem.rfind('[')?;
    let digest = &stem[open + 1..];
    let valid = digest.len() == DIGEST_LEN
        && digest
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase());
    valid.then_some(digest)
}

/// Image file extension sniffed from magic bytes; `bin` when unknown.
pub fn image_extension(data: &[u8]) -> &'static str {
    match data {
        [0xFF, 0xD8, 0xFF, ..] => "jpg",
        [0x89, b'P', b'N', b'G', ..] => "png",
        [b'G', b'I', b'F', b'8', ..] => "gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "webp",
        _ => "bin",
    }
}

/// Entry name for a page inside an archive.
pub fn page_entry_name(index: usize, data: &[u8]) -> String {
    format!("{:04}.{}", index, image_extension(data))
}

/// Page index of an archive entry written by [`page_entry_name`].
///
/// The stem is at least four digits; indexes past 9999 simply grow wider.
pub fn page_entry_index(name: &str) -> Option<usize> {
    let (stem, ext) = name.split_once('.')?;
    if stem.len() < 4
        || !stem.chars().all(|c| c.is_ascii_digit())
        || !matches!(ext, "jpg" | "png" | "gif" | "webp" | "bin")
    {
        return None;
    }
    stem.parse().ok()
}

/// Whether an archive entry name looks like a page written by
/// [`page_entry_name`].
pub fn is_page_entry(name: &str) -> bool {
    page_entry_index(name).is_some()
}
