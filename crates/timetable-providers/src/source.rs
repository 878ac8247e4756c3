//! Remote document listing and keyword matching.

use timetable_core::BoxFuture;
use tracing::warn;

use crate::error::ProviderResult;

/// A remote file as listed by a [`DocumentSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDocument {
    /// Identifier passed back to [`DocumentSource::fetch`], usually the href.
    pub id: String,
    /// Decoded file name, used for keyword matching.
    pub name: String,
    pub size: Option<u64>,
}

impl RemoteDocument {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size: None,
        }
    }
}

/// Where timetable PDFs come from.
pub trait DocumentSource: Send + Sync {
    /// Short name for logs, e.g. "webdav".
    fn name(&self) -> &str;

    /// Lists the files currently published.
    fn list(&self) -> BoxFuture<'_, ProviderResult<Vec<RemoteDocument>>>;

    /// Downloads one file.
    fn fetch<'a>(&'a self, document: &'a RemoteDocument) -> BoxFuture<'a, ProviderResult<Vec<u8>>>;
}

/// Keeps the PDFs whose name contains every keyword, ignoring case.
///
/// With no keywords every PDF matches.
pub fn matching_documents<'a>(
    documents: &'a [RemoteDocument],
    keywords: &[String],
) -> Vec<&'a RemoteDocument> {
    if keywords.is_empty() {
        warn!("no keywords configured, every PDF matches");
    }
    let keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();

    documents
        .iter()
        .filter(|doc| {
            let name = doc.name.to_lowercase();
            name.ends_with(".pdf") && keywords.iter().all(|k| name.contains(k.as_str()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(names: &[&str]) -> Vec<RemoteDocument> {
        names
            .iter()
            .map(|n| RemoteDocument::new(format!("/dav/{n}"), *n))
            .collect()
    }

    fn names<'a>(found: &[&'a RemoteDocument]) -> Vec<&'a str> {
        found.iter().map(|d| d.name.as_str()).collect()
    }

    #[test]
    fn all_keywords_must_match() {
        let listing = docs(&["Stundenplan_ET_3.PDF", "Stundenplan_MB_3.pdf", "ET_notes.pdf"]);
        let keywords = vec!["stundenplan".to_string(), "ET".to_string()];
        assert_eq!(names(&matching_documents(&listing, &keywords)), ["Stundenplan_ET_3.PDF"]);
    }

    #[test]
    fn non_pdf_files_are_ignored() {
        let listing = docs(&["ET_3.docx", "ET_3.pdf.bak", "ET_3.pdf"]);
        let keywords = vec!["et_3".to_string()];
        assert_eq!(names(&matching_documents(&listing, &keywords)), ["ET_3.pdf"]);
    }

    #[test]
    fn empty_keywords_match_every_pdf() {
        let listing = docs(&["a.pdf", "b.txt", "c.pdf"]);
        assert_eq!(names(&matching_documents(&listing, &[])), ["a.pdf", "c.pdf"]);
    }
}
