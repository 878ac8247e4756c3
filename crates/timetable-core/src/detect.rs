//! Deciding whether a cell holds more than one class.

/// Lines a single-event cell can occupy: course, lecturer, location, details.
pub const DEFAULT_MULTI_EVENT_THRESHOLD: usize = 4;

/// Classifies cleaned cell lines as single- or multi-event.
pub trait MultiEventDetector: Send + Sync {
    fn is_multi(&self, lines: &[String]) -> bool;
}

/// Flags a cell as multi-event when it has more lines than `threshold`.
///
/// This is a heuristic. A single class with a long details field is
/// misread as several, and two terse classes that fit in four lines are
/// misread as one. Both cases pass silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCountDetector {
    pub threshold: usize,
}

impl LineCountDetector {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }
}

impl Default for LineCountDetector {
    fn default() -> Self {
        Self::new(DEFAULT_MULTI_EVENT_THRESHOLD)
    }
}

impl MultiEventDetector for LineCountDetector {
    fn is_multi(&self, lines: &[String]) -> bool {
        lines.len() > self.threshold
    }
}
