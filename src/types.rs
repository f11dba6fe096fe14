//! Domain types shared by providers, the orchestrator and the archive writer.
//!
//! A [`Series`] is identified by its remote location; a [`Chapter`] by the
//! identifier its provider assigns. Chapter numbers are presentation data only:
//! they can be corrected after discovery with [`with_number`] without changing
//! which archive a chapter maps to.

use std::cmp::Ordering;

/// A remote work and its chapters, as reported by a provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    /// Canonical remote location. This is the series identity.
    pub location: String,
    pub title: String,
    pub authors: Vec<String>,
    pub artists: Vec<String>,
    pub genres: Vec<String>,
    pub summary: Option<String>,
    /// Raw preview image bytes, written once as the series cover.
    pub preview: Option<Vec<u8>>,
    /// Chapters in ascending number order (see [`sort_chapters`]).
    pub chapters: Vec<Chapter>,
}

/// One releasable unit of a series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chapter {
    /// Provider-assigned identifier, stable across runs.
    pub id: String,
    /// Presentation number; fractional for split releases (e.g. `12.5`).
    pub number: Option<f64>,
    pub volume: Option<f64>,
    pub title: String,
    /// Where the provider fetches this chapter's pages from.
    pub location: String,
    /// Page count the provider declared while listing, if it knows it.
    pub page_count: Option<usize>,
}

/// One fetched page image. Only lives between fetch and archive write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Zero-based position within the chapter.
    pub index: usize,
    pub data: Vec<u8>,
}

impl Page {
    pub fn new(index: usize, data: Vec<u8>) -> Self {
        Self { index, data }
    }
}

/// Substitute a chapter's number, keeping its identity.
pub fn with_number(chapter: Chapter, number: f64) -> Chapter {
    Chapter {
        number: Some(number),
        ..chapter
    }
}

/// Order chapters by ascending number.
///
/// Unnumbered chapters go last. The sort is stable, so chapters with equal
/// numbers keep the order the provider listed them in.
pub fn sort_chapters(chapters: &mut [Chapter]) {
    chapters.sort_by(|a, b| match (a.number, b.number) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

/// Render a chapter or volume number without a trailing `.0`.
///
/// `12.0` → `"12"`, `12.5` → `"12.5"`.
pub fn format_number(number: f64) -> String {
    // f64 Display never prints a trailing `.0` or an exponent.
    format!("{}", number)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(id: &str, number: Option<f64>) -> Chapter {
        Chapter {
            id: id.to_string(),
            number,
            ..Default::default()
        }
    }

    #[test]
    fn with_number_preserves_identity() {
        let original = Chapter {
            id: "c-99".into(),
            number: Some(99.0),
            title: "Split".into(),
            location: "https://example.org/c-99".into(),
            page_count: Some(20),
            ..Default::default()
        };

        let corrected = with_number(original.clone(), 12.5);

        assert_eq!(corrected.id, original.id);
        assert_eq!(corrected.location, original.location);
        assert_eq!(corrected.page_count, Some(20));
        assert_eq!(corrected.number, Some(12.5));
        // The input is consumed by value; the clone is untouched
        assert_eq!(original.number, Some(99.0));
    }

    #[test]
    fn sort_orders_by_number_with_fractions() {
        let mut chapters = vec![
            chapter("c", Some(2.0)),
            chapter("a", Some(1.0)),
            chapter("b", Some(1.5)),
        ];
        sort_chapters(&mut chapters);
        let ids: Vec<&str> = chapters.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn sort_puts_unnumbered_last_and_is_stable() {
        let mut chapters = vec![
            chapter("extra-1", None),
            chapter("one", Some(1.0)),
            chapter("extra-2", None),
            chapter("one-again", Some(1.0)),
        ];
        sort_chapters(&mut chapters);
        let ids: Vec<&str> = chapters.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["one", "one-again", "extra-1", "extra-2"]);
    }

    #[test]
    fn format_number_drops_integral_fraction() {
        assert_eq!(format_number(12.0), "12");
        assert_eq!(format_number(12.5), "12.5");
        assert_eq!(format_number(0.0), "0");
    }

    #[test]
    fn format_number_round_trips_past_i64() {
        for n in [9.3e18, 1e20, 123_456_789_012.5] {
            let text = format_number(n);
            assert!(!text.contains('e') && !text.ends_with(".0"), "{text}");
            assert_eq!(text.parse::<f64>().unwrap(), n);
        }
    }
}
