//! Grid table extraction.
//!
//! Lattice table detection is delegated to an external tool (camelot by
//! default) that writes one CSV per detected table. The CSVs are read back in
//! page/table order. Previously saved tables can be reloaded with
//! [`CsvDirTableExtractor`].

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use timetable_core::{BoxFuture, RawTable};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{ProviderError, ProviderResult};

/// Something that turns a PDF into its grid tables.
pub trait TableExtractor: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the tables in document order; an empty list means unusable.
    fn extract<'a>(&'a self, pdf: &'a Path) -> BoxFuture<'a, ProviderResult<Vec<RawTable>>>;
}

/// `<stem>-page-<n>-table-<m>.csv` as written by camelot.
static PAGE_TABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"page-(\d+)-table-(\d+)").expect("valid page/table regex"));

/// `raw_table_<n>.csv` as written by [`save_raw_tables`].
static RAW_TABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"raw_table_(\d+)\.csv$").expect("valid raw table regex"));

/// Runs an external extractor command.
///
/// `{input}` in the arguments is replaced by the PDF path and `{output}` by
/// a CSV path inside a fresh temporary directory. Every CSV the command
/// leaves in that directory is read.
#[derive(Debug, Clone)]
pub struct CommandTableExtractor {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for CommandTableExtractor {
    fn default() -> Self {
        Self {
            program: "camelot".to_string(),
            // Page, format and output options belong to the `camelot` group,
            // not to the `lattice` subcommand.
            args: [
                "--pages", "all", "--format", "csv", "--output", "{output}", "lattice", "{input}",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
        }
    }
}

impl CommandTableExtractor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn render_args(&self, input: &Path, output: &Path) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input.to_string_lossy())
                    .replace("{output}", &output.to_string_lossy())
            })
            .collect()
    }

    async fn run(&self, pdf: &Path) -> ProviderResult<Vec<RawTable>> {
        let workdir = tempfile::tempdir()?;
        let output = workdir.path().join("tables.csv");
        let args = self.render_args(pdf, &output);

        debug!(program = %self.program, ?args, "running table extractor");
        let result = Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|e| {
                ProviderError::io(format!("failed to run `{}`: {e}", self.program))
                    .with_provider("tables")
                    .with_source(e)
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(ProviderError::io(format!(
                "`{}` failed (exit {}): {}",
                self.program,
                result.status,
                stderr.trim()
            ))
            .with_provider("tables"));
        }

        let files = ordered_csv_files(workdir.path(), &PAGE_TABLE_RE)?;
        let tables = files
            .iter()
            .map(|path| read_table_csv(path))
            .collect::<ProviderResult<Vec<_>>>()?;
        info!(pdf = %pdf.display(), tables = tables.len(), "extracted tables");
        Ok(tables)
    }
}

impl TableExtractor for CommandTableExtractor {
    fn name(&self) -> &str {
        &self.program
    }

    fn extract<'a>(&'a self, pdf: &'a Path) -> BoxFuture<'a, ProviderResult<Vec<RawTable>>> {
        Box::pin(self.run(pdf))
    }
}

/// Reads `raw_table_N.csv` files from a directory instead of parsing the PDF.
#[derive(Debug, Clone)]
pub struct CsvDirTableExtractor {
    pub dir: PathBuf,
}

impl CsvDirTableExtractor {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn load(&self) -> ProviderResult<Vec<RawTable>> {
        ordered_csv_files(&self.dir, &RAW_TABLE_RE)?
            .iter()
            .map(|path| read_table_csv(path))
            .collect()
    }
}

impl TableExtractor for CsvDirTableExtractor {
    fn name(&self) -> &str {
        "csv-dir"
    }

    fn extract<'a>(&'a self, _pdf: &'a Path) -> BoxFuture<'a, ProviderResult<Vec<RawTable>>> {
        Box::pin(async move { self.load() })
    }
}

/// Lists `*.csv` in `dir`, ordered by the numbers `pattern` captures.
///
/// Files the pattern does not match sort after the numbered ones, by name.
fn ordered_csv_files(dir: &Path, pattern: &Regex) -> ProviderResult<Vec<PathBuf>> {
    let mut keyed: Vec<(Vec<u64>, PathBuf)> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let key = pattern
                .captures(&name)
                .map(|caps| {
                    caps.iter()
                        .skip(1)
                        .flatten()
                        .filter_map(|m| m.as_str().parse().ok())
                        .collect()
                })
                .unwrap_or_else(|| vec![u64::MAX]);
            (key, path)
        })
        .collect();

    keyed.sort();
    Ok(keyed.into_iter().map(|(_, path)| path).collect())
}

/// Reads one headerless CSV into a table.
pub fn read_table_csv(path: &Path) -> ProviderResult<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let rows = reader
        .records()
        .map(|record| record.map(|r| r.iter().map(str::to_string).collect()))
        .collect::<Result<Vec<Vec<String>>, _>>()?;
    Ok(RawTable::new(rows))
}

/// Writes tables as `raw_table_1.csv`, `raw_table_2.csv`, ... into `dir`.
pub fn save_raw_tables(tables: &[RawTable], dir: &Path) -> ProviderResult<Vec<PathBuf>> {
    if tables.is_empty() {
        warn!("no tables to save");
        return Ok(Vec::new());
    }
    std::fs::create_dir_all(dir)?;

    let mut written = Vec::with_capacity(tables.len());
    for (idx, table) in tables.iter().enumerate() {
        let path = dir.join(format!("raw_table_{}.csv", idx + 1));
        let mut writer = csv::WriterBuilder::new().flexible(true).from_path(&path)?;
        for row in &table.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        written.push(path);
    }
    info!(dir = %dir.display(), count = written.len(), "saved raw tables");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RawTable {
        RawTable::from_rows([
            vec!["", "08.00 - 09.30 Uhr"],
            vec!["Mo, 14. Okt", "Algorithms\nDr. X\nA101, Geb. 2"],
            vec!["", ""],
        ])
    }

    #[test]
    fn saved_tables_read_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let tables: Vec<RawTable> = (0..11)
            .map(|i| RawTable::from_rows([vec![format!("t{i}")]]))
            .collect();
        save_raw_tables(&tables, dir.path()).unwrap();

        let loaded = CsvDirTableExtractor::new(dir.path()).load().unwrap();
        let firsts: Vec<_> = loaded.iter().map(|t| t.rows[0][0].clone()).collect();
        let expected: Vec<_> = (0..11).map(|i| format!("t{i}")).collect();
        assert_eq!(firsts, expected);
    }

    #[test]
    fn multiline_cells_survive_csv() {
        let dir = tempfile::tempdir().unwrap();
        let paths = save_raw_tables(&[table()], dir.path()).unwrap();
        assert!(paths[0].ends_with("raw_table_1.csv"));
        assert_eq!(read_table_csv(&paths[0]).unwrap(), table());
    }

    #[test]
    fn camelot_files_order_by_page_then_table() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "tables-page-10-table-1.csv",
            "tables-page-2-table-2.csv",
            "tables-page-2-table-1.csv",
            "notes.csv",
            "readme.txt",
        ] {
            std::fs::write(dir.path().join(name), "x\n").unwrap();
        }
        let files = ordered_csv_files(dir.path(), &PAGE_TABLE_RE).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            [
                "tables-page-2-table-1.csv",
                "tables-page-2-table-2.csv",
                "tables-page-10-table-1.csv",
                "notes.csv",
            ]
        );
    }

    #[test]
    fn placeholders_are_substituted() {
        let extractor = CommandTableExtractor::default();
        let args = extractor.render_args(Path::new("/in/ET 3.pdf"), Path::new("/tmp/x/tables.csv"));
        assert_eq!(
            args,
            [
                "--pages",
                "all",
                "--format",
                "csv",
                "--output",
                "/tmp/x/tables.csv",
                "lattice",
                "/in/ET 3.pdf",
            ]
        );
    }

    #[tokio::test]
    async fn missing_program_is_io_error() {
        let extractor = CommandTableExtractor::new("timetable-no-such-extractor", vec![]);
        let err = extractor.extract(Path::new("/tmp/a.pdf")).await.unwrap_err();
        assert_eq!(err.code(), crate::error::ProviderErrorCode::IoError);
    }

    #[test]
    fn empty_table_list_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(save_raw_tables(&[], &dir.path().join("raw")).unwrap().is_empty());
        assert!(!dir.path().join("raw").exists());
    }
}
