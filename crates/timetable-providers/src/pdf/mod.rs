//! PDF adapters: first-page text for the version stamp and grid tables for
//! the pipeline.

mod tables;
mod text;

pub use tables::{
    CommandTableExtractor, CsvDirTableExtractor, TableExtractor, read_table_csv, save_raw_tables,
};
pub use text::{first_page_text, first_page_text_from_path};
