//! Records flowing through the reconstruction pipeline.
//!
//! - [`RawTable`]: one grid as extracted from a PDF page
//! - [`GridRow`]: one (date, time slot) cell after unpivoting
//! - [`NormalizedSlot`]: a cleaned cell with parsed date and times
//! - [`Event`]: one class session, the persisted output

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Course name carried by the placeholder event emitted when a multi-event
/// cell could not be structured.
pub const AI_FAILURE_COURSE: &str = "!!! AiParsing Failure!!!";

/// A 2D grid of text cells from one PDF page.
///
/// The first row names the time-slot columns, the first column holds the
/// date (blank on continuation rows of a merged cell).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTable {
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    /// Builds a table from string slices, handy for fixtures.
    pub fn from_rows<R, C>(rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// One cell of the grid in long form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridRow {
    /// Date label as printed, e.g. `"Mo, 14. Okt"`. Never blank after forward-fill.
    pub date: String,
    /// Column header, e.g. `"09.15 - 10.45 Uhr"`.
    pub time_slot: String,
    pub raw_text: String,
}

/// A cleaned grid cell.
///
/// Either time may be `None` when its label did not parse; a slot with no
/// date is dropped before reconstruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSlot {
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub lines: Vec<String>,
    pub is_multi: bool,
}

/// A single class session.
///
/// Several events may share one `(date, start_time, end_time)` when they came
/// from the same multi-event cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub date: NaiveDate,
    #[serde(with = "optional_time")]
    pub start_time: Option<NaiveTime>,
    #[serde(with = "optional_time")]
    pub end_time: Option<NaiveTime>,
    pub course: String,
    pub lecturer: Vec<String>,
    pub location: String,
    pub details: String,
}

impl Event {
    /// Whether this is the placeholder emitted for an unstructurable cell.
    pub fn is_failure(&self) -> bool {
        self.course == AI_FAILURE_COURSE
    }

    /// Calendar title: `course, details`, or just the course.
    pub fn summary(&self) -> String {
        if self.details.is_empty() {
            self.course.clone()
        } else {
            format!("{}, {}", self.course, self.details)
        }
    }

    /// Lecturers joined for display.
    pub fn lecturers(&self) -> String {
        self.lecturer.join(", ")
    }
}

/// `HH:MM` on the wire, `null` when absent.
mod optional_time {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(value: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(t) => s.serialize_str(&t.format(FORMAT).to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw {
            None => Ok(None),
            Some(s) => NaiveTime::parse_from_str(&s, FORMAT)
                .or_else(|_| NaiveTime::parse_from_str(&s, "%H:%M:%S"))
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(details: &str) -> Event {
        Event {
            date: NaiveDate::from_ymd_opt(2024, 10, 14).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 15, 0),
            end_time: None,
            course: "Algorithms".to_string(),
            lecturer: vec!["Dr. X".to_string(), "Prof. Y".to_string()],
            location: "A101".to_string(),
            details: details.to_string(),
        }
    }

    #[test]
    fn event_serializes_times_as_hours_and_minutes() {
        insta::assert_json_snapshot!(event("Lecture"), @r###"
        {
          "date": "2024-10-14",
          "start_time": "09:15",
          "end_time": null,
          "course": "Algorithms",
          "lecturer": [
            "Dr. X",
            "Prof. Y"
          ],
          "location": "A101",
          "details": "Lecture"
        }
        "###);
    }

    #[test]
    fn event_reads_back_seconds_precision() {
        let json = r#"{"date":"2024-10-14","start_time":"09:15:00","end_time":"10:45",
            "course":"C","lecturer":[],"location":"","details":""}"#;
        let parsed: Event = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.start_time, NaiveTime::from_hms_opt(9, 15, 0));
        assert_eq!(parsed.end_time, NaiveTime::from_hms_opt(10, 45, 0));
    }

    #[test]
    fn summary_appends_details_when_present() {
        assert_eq!(event("Lecture").summary(), "Algorithms, Lecture");
        assert_eq!(event("").summary(), "Algorithms");
        assert_eq!(event("").lecturers(), "Dr. X, Prof. Y");
    }

    #[test]
    fn failure_placeholder_is_detectable() {
        let mut e = event("");
        assert!(!e.is_failure());
        e.course = AI_FAILURE_COURSE.to_string();
        assert!(e.is_failure());
    }

    #[test]
    fn raw_table_from_slices() {
        let table = RawTable::from_rows([["Datum", "08.00 Uhr"], ["Mo, 14. Okt", "x"]]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[1][0], "Mo, 14. Okt");
    }
}
