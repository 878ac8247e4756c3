//! Cell cleaning: character substitution, time-slot and date parsing.
//!
//! Nothing here fails hard. A label that does not parse becomes `None` and a
//! warning is logged, so one damaged cell never costs the rest of the document.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use tracing::warn;

use crate::detect::MultiEventDetector;
use crate::model::{GridRow, NormalizedSlot};

/// German month abbreviations that differ from the English ones chrono knows.
const GERMAN_MONTHS: &[(&str, &str)] = &[("Mär", "Mar"), ("Mai", "May"), ("Okt", "Oct"), ("Dez", "Dec")];

const TIME_FORMAT: &str = "%H.%M";
const DATE_FORMAT: &str = "%d. %b %Y";

/// `14. Oct` inside a longer label such as `Mo, 14. Oct`.
static DAY_MONTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})\.\s*([A-Za-z]{3})").expect("valid day/month regex"));

/// Replaces non-breaking spaces and Unicode dashes with their ASCII forms.
///
/// Applying it twice gives the same result as applying it once.
pub fn clean_text(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{00A0}' => ' ',
            '\u{2010}' | '\u{2012}' => '-',
            other => other,
        })
        .collect()
}

/// Parses a column label like `09.15 - 10.45 Uhr` into start and end times.
///
/// A label without a range yields no end time. An end before the start is
/// dropped so that `start <= end` holds whenever both are present.
pub fn parse_time_slot(label: &str) -> (Option<NaiveTime>, Option<NaiveTime>) {
    let cleaned = clean_text(label).replace(" Uhr", "");
    let mut parts = cleaned.splitn(2, " - ");

    let start = parts.next().and_then(|p| parse_clock(p, label, "start"));
    let end = parts.next().and_then(|p| parse_clock(p, label, "end"));

    match (start, end) {
        (Some(s), Some(e)) if e < s => {
            warn!(time_slot = %label, "end time before start time, dropping end");
            (Some(s), None)
        }
        other => other,
    }
}

fn parse_clock(part: &str, label: &str, which: &str) -> Option<NaiveTime> {
    let part = part.trim();
    match NaiveTime::parse_from_str(part, TIME_FORMAT) {
        Ok(t) => Some(t),
        Err(e) => {
            warn!(time_slot = %label, which, error = %e, "failed to parse time");
            None
        }
    }
}

/// Parses a date label like `14. Okt` using the document year.
///
/// No year rollover is applied: a January column in a document stamped in
/// the previous autumn gets the stamp's year.
pub fn parse_date(label: &str, year: i32) -> Option<NaiveDate> {
    let mut text = clean_text(label);
    for (german, english) in GERMAN_MONTHS {
        text = text.replace(german, english);
    }
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if let Ok(date) = NaiveDate::parse_from_str(&format!("{text} {year}"), DATE_FORMAT) {
        return Some(date);
    }

    // Labels sometimes carry a weekday prefix.
    if let Some(caps) = DAY_MONTH_RE.captures(&text) {
        let candidate = format!("{}. {} {year}", &caps[1], &caps[2]);
        if let Ok(date) = NaiveDate::parse_from_str(&candidate, DATE_FORMAT) {
            return Some(date);
        }
    }

    warn!(date = %label, year, "failed to parse date");
    None
}

/// Splits cell text into trimmed lines, keeping order and blank lines.
pub fn split_lines(raw_text: &str) -> Vec<String> {
    clean_text(raw_text)
        .lines()
        .map(|line| line.trim().to_string())
        .collect()
}

/// Cleans one grid row into a slot.
pub fn clean_row(row: &GridRow, year: i32, detector: &dyn MultiEventDetector) -> NormalizedSlot {
    let (start_time, end_time) = parse_time_slot(&row.time_slot);
    let lines = split_lines(&row.raw_text);
    let is_multi = detector.is_multi(&lines);

    NormalizedSlot {
        date: parse_date(&row.date, year),
        start_time,
        end_time,
        lines,
        is_multi,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::LineCountDetector;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn substitutes_special_characters() {
        assert_eq!(clean_text("A\u{00A0}101"), "A 101");
        assert_eq!(clean_text("Soft\u{2010}ware"), "Soft-ware");
        assert_eq!(clean_text("08.00\u{2012}09.30"), "08.00-09.30");
    }

    #[test]
    fn cleaning_is_idempotent() {
        for input in ["Dr.\u{00A0}X\u{2010}Y", "plain", "", "09.15 - 10.45 Uhr"] {
            let once = clean_text(input);
            assert_eq!(clean_text(&once), once);
        }
    }

    #[test]
    fn parses_time_range() {
        assert_eq!(
            parse_time_slot("09.15 - 10.45 Uhr"),
            (Some(hm(9, 15)), Some(hm(10, 45)))
        );
    }

    #[test]
    fn single_time_has_no_end() {
        assert_eq!(parse_time_slot("09.15 Uhr"), (Some(hm(9, 15)), None));
    }

    #[test]
    fn time_range_with_unicode_dash_and_nbsp() {
        assert_eq!(
            parse_time_slot("11.00\u{00A0}-\u{00A0}12.30\u{00A0}Uhr"),
            (Some(hm(11, 0)), Some(hm(12, 30)))
        );
    }

    #[test]
    fn unparseable_time_is_none() {
        assert_eq!(parse_time_slot("morgens"), (None, None));
        assert_eq!(parse_time_slot("08.00 - spät"), (Some(hm(8, 0)), None));
    }

    #[test]
    fn reversed_range_drops_end() {
        assert_eq!(parse_time_slot("12.00 - 10.00 Uhr"), (Some(hm(12, 0)), None));
    }

    #[test]
    fn parses_german_month() {
        assert_eq!(parse_date("14. Okt", 2024), NaiveDate::from_ymd_opt(2024, 10, 14));
        assert_eq!(parse_date("3. Mär", 2025), NaiveDate::from_ymd_opt(2025, 3, 3));
        assert_eq!(parse_date("1. Mai", 2025), NaiveDate::from_ymd_opt(2025, 5, 1));
        assert_eq!(parse_date("24. Dez", 2024), NaiveDate::from_ymd_opt(2024, 12, 24));
        assert_eq!(parse_date("7. Nov", 2024), NaiveDate::from_ymd_opt(2024, 11, 7));
    }

    #[test]
    fn parses_date_with_weekday_prefix() {
        assert_eq!(parse_date("Mo, 14. Okt", 2024), NaiveDate::from_ymd_opt(2024, 10, 14));
        assert_eq!(parse_date("Di\n15.\u{00A0}Okt", 2024), NaiveDate::from_ymd_opt(2024, 10, 15));
    }

    #[test]
    fn unparseable_date_is_none() {
        assert_eq!(parse_date("XX. Foo", 2024), None);
        assert_eq!(parse_date("", 2024), None);
        assert_eq!(parse_date("31. Feb", 2024), None);
    }

    #[test]
    fn lines_are_trimmed_and_ordered() {
        assert_eq!(
            split_lines("  Algorithms \nDr.\u{00A0}X\r\n\nA101"),
            vec!["Algorithms", "Dr. X", "", "A101"]
        );
    }

    #[test]
    fn clean_row_builds_slot() {
        let row = GridRow {
            date: "14. Okt".to_string(),
            time_slot: "09.15 - 10.45 Uhr".to_string(),
            raw_text: "Algorithms\nDr. X\nA101\nLecture".to_string(),
        };
        let slot = clean_row(&row, 2024, &LineCountDetector::default());
        assert_eq!(slot.date, NaiveDate::from_ymd_opt(2024, 10, 14));
        assert_eq!(slot.start_time, Some(hm(9, 15)));
        assert_eq!(slot.end_time, Some(hm(10, 45)));
        assert_eq!(slot.lines.len(), 4);
        assert!(!slot.is_multi);
    }

    #[test]
    fn clean_row_is_idempotent_on_clean_input() {
        let row = GridRow {
            date: "14.\u{00A0}Okt".to_string(),
            time_slot: "09.15\u{00A0}-\u{00A0}10.45 Uhr".to_string(),
            raw_text: "Soft\u{2010}ware\nDr.\u{00A0}X".to_string(),
        };
        let detector = LineCountDetector::default();
        let first = clean_row(&row, 2024, &detector);
        let again = GridRow {
            date: clean_text(&row.date),
            time_slot: clean_text(&row.time_slot),
            raw_text: first.lines.join("\n"),
        };
        assert_eq!(clean_row(&again, 2024, &detector), first);
    }
}
