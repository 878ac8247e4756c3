//! `timetable version`: print the stamp of a local PDF.

use std::path::Path;

use timetable_core::{CoreError, extract_version};
use timetable_providers::pdf::first_page_text_from_path;

use crate::error::ClientResult;

pub fn version(pdf: &Path) -> ClientResult<()> {
    let text = first_page_text_from_path(pdf)?;
    let stamp = extract_version(&text).ok_or(CoreError::MissingVersion)?;
    println!("{stamp} ({})", stamp.identifier());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;

    #[test]
    fn missing_file() {
        let err = version(Path::new("/nonexistent/plan.pdf")).unwrap_err();
        assert!(matches!(err, ClientError::Provider(_)));
    }
}
