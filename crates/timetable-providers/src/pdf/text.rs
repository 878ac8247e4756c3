//! First-page text, where the version stamp is printed.

use lopdf::Document;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};

/// Extracts the text of page 1.
///
/// # Errors
///
/// Returns an error when the bytes are not a readable PDF or page 1 has no
/// extractable text.
pub fn first_page_text(bytes: &[u8]) -> ProviderResult<String> {
    let doc = Document::load_mem(bytes).map_err(|e| {
        ProviderError::invalid_response(format!("not a readable PDF: {e}")).with_provider("pdf")
    })?;

    let pages = doc.get_pages();
    let Some(&first) = pages.keys().next() else {
        return Err(ProviderError::invalid_response("PDF has no pages").with_provider("pdf"));
    };

    let text = doc.extract_text(&[first]).map_err(|e| {
        ProviderError::invalid_response(format!("failed to extract text of page {first}: {e}"))
            .with_provider("pdf")
    })?;
    debug!(page = first, chars = text.len(), "extracted first page text");
    Ok(text)
}

/// Reads a PDF from disk and extracts its first-page text.
pub fn first_page_text_from_path(path: &std::path::Path) -> ProviderResult<String> {
    let bytes = std::fs::read(path)
        .map_err(|e| ProviderError::io(format!("failed to read {}: {e}", path.display())).with_source(e))?;
    first_page_text(&bytes)
}
