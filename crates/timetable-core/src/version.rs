//! Version stamps printed on the first page of each timetable.

use std::fmt;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Version:\s*(\d{2}\.\d{2}\.\d{4}),\s*(\d{2}:\d{2})\s*Uhr")
        .expect("valid version regex")
});

const IDENTIFIER_FORMAT: &str = "%Y-%m-%d_%H-%M";

/// The revision date and time a document reports about itself.
///
/// Orders chronologically; the [`identifier`](Self::identifier) sorts the
/// same way as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionStamp {
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl VersionStamp {
    pub fn new(date: NaiveDate, time: NaiveTime) -> Self {
        Self { date, time }
    }

    /// Year used to complete the day/month labels of the grid.
    pub fn year(&self) -> i32 {
        self.date.year()
    }

    pub fn datetime(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    /// Directory-safe identifier, e.g. `2024-09-26_11-13`.
    pub fn identifier(&self) -> String {
        self.datetime().format(IDENTIFIER_FORMAT).to_string()
    }

    /// Parses an identifier produced by [`identifier`](Self::identifier).
    pub fn from_identifier(id: &str) -> Option<Self> {
        NaiveDateTime::parse_from_str(id, IDENTIFIER_FORMAT)
            .ok()
            .map(|dt| Self::new(dt.date(), dt.time()))
    }
}

impl fmt::Display for VersionStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {} Uhr", self.date.format("%d.%m.%Y"), self.time.format("%H:%M"))
    }
}

/// Finds `Version: DD.MM.YYYY, HH:MM Uhr` in the given text.
pub fn extract_version(text: &str) -> Option<VersionStamp> {
    let caps = VERSION_RE.captures(text)?;
    let date = NaiveDate::parse_from_str(&caps[1], "%d.%m.%Y").ok()?;
    let time = NaiveTime::parse_from_str(&caps[2], "%H:%M").ok()?;
    let stamp = VersionStamp::new(date, time);
    debug!(version = %stamp, "found version stamp");
    Some(stamp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp() -> VersionStamp {
        VersionStamp::new(
            NaiveDate::from_ymd_opt(2024, 9, 26).unwrap(),
            NaiveTime::from_hms_opt(11, 13, 0).unwrap(),
        )
    }

    #[test]
    fn extracts_stamp_from_page_text() {
        let text = "Stundenplan Elektrotechnik\nVersion: 26.09.2024, 11:13 Uhr\nSeite 1";
        assert_eq!(extract_version(text), Some(stamp()));
    }

    #[test]
    fn tolerates_whitespace_variations() {
        assert_eq!(extract_version("Version:26.09.2024,11:13Uhr"), Some(stamp()));
        assert_eq!(extract_version("Version:  26.09.2024,\n 11:13 \nUhr"), Some(stamp()));
    }

    #[test]
    fn missing_or_invalid_stamp_is_none() {
        assert_eq!(extract_version("Stundenplan ohne Stand"), None);
        assert_eq!(extract_version("Version: 31.02.2024, 11:13 Uhr"), None);
        assert_eq!(extract_version("Version: 26.09.2024 11:13 Uhr"), None);
    }

    #[test]
    fn identifier_round_trips_and_sorts() {
        let s = stamp();
        assert_eq!(s.identifier(), "2024-09-26_11-13");
        assert_eq!(VersionStamp::from_identifier("2024-09-26_11-13"), Some(s));
        assert_eq!(VersionStamp::from_identifier("temp"), None);

        let later = VersionStamp::new(s.date, NaiveTime::from_hms_opt(14, 0, 0).unwrap());
        assert!(later > s);
        assert!(later.identifier() > s.identifier());
    }

    #[test]
    fn display_and_year() {
        assert_eq!(stamp().to_string(), "26.09.2024, 11:13 Uhr");
        assert_eq!(stamp().year(), 2024);
    }
}
