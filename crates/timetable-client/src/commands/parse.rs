//! `timetable parse`: reconstruct one local PDF.

use std::path::{Path, PathBuf};

use timetable_core::{CoreError, Pipeline, VersionStamp, extract_version};
use timetable_providers::pdf::{CsvDirTableExtractor, TableExtractor, first_page_text_from_path};
use tracing::info;

use super::{build_pipeline, document_stem, reconstruct, write_outputs};
use crate::config::AppConfig;
use crate::error::ClientResult;

/// What one parse produced.
#[derive(Debug)]
pub struct ParseOutcome {
    pub events: usize,
    pub needs_review: usize,
    pub written: Vec<PathBuf>,
}

pub async fn parse(
    config: &AppConfig,
    pdf: &Path,
    tables: Option<&Path>,
    output: Option<&Path>,
) -> ClientResult<()> {
    let text = first_page_text_from_path(pdf)?;
    let stamp = extract_version(&text).ok_or(CoreError::MissingVersion)?;
    info!(pdf = %pdf.display(), version = %stamp, "parsing local document");

    let pipeline = build_pipeline(config)?;
    let output = output.unwrap_or(&config.paths.output_dir);
    let outcome = match tables {
        Some(dir) => {
            let extractor = CsvDirTableExtractor::new(dir);
            parse_document(config, &pipeline, &extractor, pdf, &stamp, output).await?
        }
        None => {
            let extractor = config.table_extractor();
            parse_document(config, &pipeline, &extractor, pdf, &stamp, output).await?
        }
    };

    println!(
        "{}: version {}, {} event(s), {} to review",
        pdf.display(),
        stamp,
        outcome.events,
        outcome.needs_review
    );
    for path in &outcome.written {
        println!("  {}", path.display());
    }
    Ok(())
}

/// Reconstructs `pdf` and writes its outputs into `output`.
pub async fn parse_document(
    config: &AppConfig,
    pipeline: &Pipeline,
    extractor: &dyn TableExtractor,
    pdf: &Path,
    stamp: &VersionStamp,
    output: &Path,
) -> ClientResult<ParseOutcome> {
    let document = pdf
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| pdf.display().to_string());
    let (tables, events) = reconstruct(pipeline, extractor, &document, pdf, stamp).await?;
    let written = write_outputs(&config.paths, output, &document_stem(pdf), &tables, &events)?;
    Ok(ParseOutcome {
        events: events.len(),
        needs_review: events.iter().filter(|e| e.is_failure()).count(),
        written,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::FixedTables;
    use timetable_core::PipelineConfig;
    use timetable_providers::pdf::save_raw_tables;
    use timetable_providers::read_events_json;

    #[tokio::test]
    async fn saved_tables_are_reparsed() {
        let dir = tempfile::tempdir().unwrap();
        let tables_dir = dir.path().join("tables");
        save_raw_tables(&FixedTables::timetable().tables.unwrap(), &tables_dir).unwrap();

        let mut config = AppConfig::default();
        config.paths.save_csv = true;
        let pipeline = Pipeline::new(PipelineConfig::default());
        let stamp = VersionStamp::from_identifier("2024-09-26_11-13").unwrap();
        let output = dir.path().join("out");

        let outcome = parse_document(
            &config,
            &pipeline,
            &CsvDirTableExtractor::new(&tables_dir),
            Path::new("/data/Plan ELM 3.pdf"),
            &stamp,
            &output,
        )
        .await
        .unwrap();

        assert_eq!(outcome.events, 2);
        assert_eq!(outcome.needs_review, 0);
        assert_eq!(outcome.written.len(), 2);
        let events = read_events_json(&output.join("Plan ELM 3_events.json")).unwrap();
        assert_eq!(events[0].course, "Algorithms");
        assert_eq!(events[0].lecturer, ["Dr. X"]);
        assert!(output.join("Plan ELM 3_events.csv").exists());
    }

    #[tokio::test]
    async fn unreadable_pdf_fails() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("broken.pdf");
        std::fs::write(&pdf, "not a pdf").unwrap();
        assert!(parse(&AppConfig::default(), &pdf, None, None).await.is_err());
    }
}
