//! Turning normalized slots into events.
//!
//! Single-event cells are mapped by line position through the
//! [`SlotSchema`]. Multi-event cells are joined into one string and sent to a
//! [`TextOracle`], which answers with JSON records. Oracle calls follow the
//! [`RetryPolicy`] state machine; when it ends in `Failed` the slot yields a
//! single placeholder event whose course is [`AI_FAILURE_COURSE`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::OracleError;
use crate::model::{AI_FAILURE_COURSE, Event, NormalizedSlot};
use crate::retry::{AttemptOutcome, RetryPolicy, RetryState};
use crate::schema::SlotSchema;

/// A boxed future for async trait methods.
///
/// Keeps [`TextOracle`] and [`Sleeper`] object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Instruction sent with every multi-event cell.
pub const STRUCTURING_INSTRUCTION: &str = "\
The input is the text of one timetable cell that lists several classes one after another. \
Split it into classes and answer with a JSON array (RFC 8259) of objects. \
Each object has exactly the keys \"course\", \"lecturer\", \"location\" and \"details\". \
\"lecturer\" is an array holding every lecturer of that class, including names that appear \
after the room or the group details. \"course\", \"location\" and \"details\" are strings, \
empty when unknown. Do not add other keys and do not wrap the JSON in prose or code fences.
Example input: Programmieren in C, P. Wette/ D 216 Praktikum 1, Gr. B Simon Wechselstromtechnik \
Battermann/ D 221 Praktikum 2, Gr. A Schünemann
Example output: [{\"course\": \"Programmieren in C\", \"lecturer\": [\"P. Wette\", \"Simon\"], \
\"location\": \"D 216\", \"details\": \"Praktikum 1, Gr. B\"}, {\"course\": \"Wechselstromtechnik\", \
\"lecturer\": [\"Battermann\", \"Schünemann\"], \"location\": \"D 221\", \"details\": \"Praktikum 2, Gr. A\"}]";

/// Appends a list of lecturer names that occur in the documents.
pub fn instruction_with_lecturers(known_lecturers: &[String]) -> String {
    if known_lecturers.is_empty() {
        return STRUCTURING_INSTRUCTION.to_string();
    }
    let names = known_lecturers
        .iter()
        .map(|n| format!("\"{n}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{STRUCTURING_INSTRUCTION}\nKnown lecturer names: [{names}].")
}

/// An external service that structures free text.
pub trait TextOracle: Send + Sync {
    /// Sends `payload` together with `instruction` and returns the raw answer.
    fn structure<'a>(
        &'a self,
        instruction: &'a str,
        payload: &'a str,
    ) -> BoxFuture<'a, Result<String, OracleError>>;
}

/// Waits between retry attempts. Tests substitute a recorder.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()>;
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// One class as described by the oracle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleRecord {
    pub course: String,
    pub lecturer: Vec<String>,
    pub location: String,
    pub details: String,
}

impl OracleRecord {
    /// Placeholder for a cell the oracle could not structure.
    pub fn failure() -> Self {
        Self {
            course: AI_FAILURE_COURSE.to_string(),
            ..Default::default()
        }
    }

    /// Reads a record from a JSON object; missing keys become empty.
    ///
    /// Returns `None` for anything that is not an object.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let text = |key: &str| match obj.get(key) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.trim().to_string(),
            Some(other) => other.to_string(),
        };
        let lecturer = match obj.get("lecturer") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                    _ => None,
                })
                .collect(),
            Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
            _ => Vec::new(),
        };

        Some(Self {
            course: text("course"),
            lecturer,
            location: text("location"),
            details: text("details"),
        })
    }
}

/// Result of decoding one oracle answer.
#[derive(Debug, Clone, PartialEq)]
enum Decoded {
    Records(Vec<OracleRecord>),
    Malformed(String),
    Unusable(&'static str),
}

fn decode(raw: &str) -> Decoded {
    let body = strip_code_fence(raw);
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => return Decoded::Malformed(e.to_string()),
    };

    match &value {
        Value::Object(_) => match OracleRecord::from_value(&value) {
            Some(record) => Decoded::Records(vec![record]),
            None => Decoded::Unusable("object could not be read"),
        },
        Value::Array(items) => {
            let total = items.len();
            let records: Vec<_> = items.iter().filter_map(OracleRecord::from_value).collect();
            if records.len() < total {
                warn!(skipped = total - records.len(), "ignoring non-object array elements");
            }
            if records.is_empty() {
                Decoded::Unusable("array holds no records")
            } else {
                Decoded::Records(records)
            }
        }
        _ => Decoded::Unusable("neither an array nor an object"),
    }
}

/// Removes a surrounding Markdown code fence if the model added one.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    // Drop the info string, e.g. "json".
    match rest.find('\n') {
        Some(idx) => rest[idx + 1..].trim(),
        None => rest.trim(),
    }
}

/// Maps slots to events.
pub struct EventReconstructor {
    schema: SlotSchema,
    oracle: Option<Arc<dyn TextOracle>>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
    instruction: String,
}

impl EventReconstructor {
    pub fn new(schema: SlotSchema) -> Self {
        Self {
            schema,
            oracle: None,
            sleeper: Arc::new(TokioSleeper),
            policy: RetryPolicy::default(),
            instruction: STRUCTURING_INSTRUCTION.to_string(),
        }
    }

    /// Without an oracle every multi-event cell yields the placeholder.
    #[must_use]
    pub fn with_oracle(mut self, oracle: Arc<dyn TextOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_known_lecturers(mut self, names: &[String]) -> Self {
        self.instruction = instruction_with_lecturers(names);
        self
    }

    /// Produces the events of one slot.
    ///
    /// Always yields at least one event for a dated slot. A slot without a
    /// date yields nothing.
    pub async fn reconstruct(&self, slot: &NormalizedSlot) -> Vec<Event> {
        let Some(date) = slot.date else {
            warn!(lines = ?slot.lines, "slot has no date, skipping");
            return Vec::new();
        };

        if !slot.is_multi {
            return vec![
                self.schema
                    .map_lines(&slot.lines, date, slot.start_time, slot.end_time),
            ];
        }

        let payload = slot.lines.join(", ");
        self.structure_cell(&payload)
            .await
            .into_iter()
            .map(|record| Event {
                date,
                start_time: slot.start_time,
                end_time: slot.end_time,
                course: record.course,
                lecturer: record.lecturer,
                location: record.location,
                details: record.details,
            })
            .collect()
    }

    /// Asks the oracle to split a multi-event cell.
    ///
    /// Returns the placeholder record when the attempts run out or the
    /// answer has an unusable shape.
    pub async fn structure_cell(&self, payload: &str) -> Vec<OracleRecord> {
        let Some(oracle) = self.oracle.as_ref() else {
            warn!(payload, "no text oracle configured for multi-event cell");
            return vec![OracleRecord::failure()];
        };

        let mut state = RetryState::Pending;
        loop {
            let attempt = state.failures() + 1;
            let (outcome, records) = match oracle.structure(&self.instruction, payload).await {
                Ok(raw) => match decode(&raw) {
                    Decoded::Records(records) => (AttemptOutcome::Success, records),
                    Decoded::Malformed(error) => {
                        warn!(attempt, max = self.policy.max_attempts, %error, "oracle answer is not valid JSON");
                        (AttemptOutcome::Malformed, Vec::new())
                    }
                    Decoded::Unusable(reason) => {
                        warn!(attempt, reason, "oracle answer has an unusable shape");
                        (AttemptOutcome::Unusable, Vec::new())
                    }
                },
                Err(error) => {
                    warn!(attempt, max = self.policy.max_attempts, %error, "oracle call failed");
                    let outcome = if !error.is_retryable() {
                        AttemptOutcome::Unusable
                    } else if error.needs_backoff() {
                        AttemptOutcome::Transient
                    } else {
                        AttemptOutcome::Malformed
                    };
                    (outcome, Vec::new())
                }
            };

            let (next, delay) = self.policy.advance(state, outcome);
            state = next;
            match state {
                RetryState::Succeeded => {
                    info!(attempt, events = records.len(), "structured multi-event cell");
                    return records;
                }
                RetryState::Failed => {
                    warn!(payload, "giving up on multi-event cell");
                    return vec![OracleRecord::failure()];
                }
                RetryState::Pending | RetryState::Retrying(_) => {
                    if !delay.is_zero() {
                        debug!(?delay, "backing off before next oracle attempt");
                        self.sleeper.sleep(delay).await;
                    }
                }
            }
        }
    }
}
