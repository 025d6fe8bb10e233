//! SpreadsheetML plumbing shared by both export paths
//!
//! This module provides the low-level pieces the workbook writers are built
//! from:
//! - Buffered XML writing with escaping
//! - Row encoding with inline or shared strings
//! - The fixed package parts of a single-sheet workbook
//! - A forward-only ZIP container for sinks that cannot seek

pub mod parts;
pub mod shared_strings;
pub mod sheet;
pub mod streaming_zip_writer;
pub mod xml_writer;

pub use shared_strings::SharedStrings;
pub use sheet::RowEncoder;
pub use streaming_zip_writer::StreamingZipWriter;
pub use xml_writer::XmlWriter;

/// MIME type of an `.xlsx` document
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
