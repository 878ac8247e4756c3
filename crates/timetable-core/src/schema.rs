//! Line layout of a single-event cell.
//!
//! The position of each line in a cell says which event field it holds. The
//! layout is data so that a changed document template only needs new
//! configuration:
//!
//! ```toml
//! [[parser.schema.fields]]
//! field = "course"
//! default = "Unknown Course"
//!
//! [[parser.schema.fields]]
//! field = "lecturer"
//! default = "Unknown Lecturer"
//! ```

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::model::Event;

/// An event field a cell line can be mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventField {
    Course,
    Lecturer,
    Location,
    Details,
}

impl EventField {
    /// Placeholder used when the cell has no line for this field.
    pub fn placeholder(self) -> &'static str {
        match self {
            Self::Course => "Unknown Course",
            Self::Lecturer => "Unknown Lecturer",
            Self::Location => "Unknown Location",
            Self::Details => "",
        }
    }
}

/// One position in the layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub field: EventField,
    pub default: String,
}

impl FieldSpec {
    pub fn new(field: EventField) -> Self {
        Self {
            field,
            default: field.placeholder().to_string(),
        }
    }
}

/// Ordered mapping from line index to event field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSchema {
    pub fields: Vec<FieldSpec>,
}

impl Default for SlotSchema {
    fn default() -> Self {
        Self {
            fields: vec![
                FieldSpec::new(EventField::Course),
                FieldSpec::new(EventField::Lecturer),
                FieldSpec::new(EventField::Location),
                FieldSpec::new(EventField::Details),
            ],
        }
    }
}

impl SlotSchema {
    /// Maps cell lines onto an event by position.
    ///
    /// A missing line takes the field's default. Fields absent from the
    /// layout take their built-in placeholder; surplus lines are ignored.
    pub fn map_lines(
        &self,
        lines: &[String],
        date: NaiveDate,
        start_time: Option<NaiveTime>,
        end_time: Option<NaiveTime>,
    ) -> Event {
        let value = |field: EventField| -> String {
            self.fields
                .iter()
                .position(|spec| spec.field == field)
                .map(|idx| {
                    lines
                        .get(idx)
                        .cloned()
                        .unwrap_or_else(|| self.fields[idx].default.clone())
                })
                .unwrap_or_else(|| field.placeholder().to_string())
        };

        Event {
            date,
            start_time,
            end_time,
            course: value(EventField::Course),
            lecturer: vec![value(EventField::Lecturer)],
            location: value(EventField::Location),
            details: value(EventField::Details),
        }
    }
}
