//! In-memory workbook for the bulk export path
//!
//! The whole document is materialized before a single byte is produced, so a
//! failed export never leaves anything in the caller's sink.

use crate::error::{ExportError, Result};
use crate::record::{to_cells, ColumnSpec, ExportRecord, FIELD_COUNT};
use crate::window::MAX_SHEET_ROWS;
use crate::xlsx::parts::{package_parts, SHARED_STRINGS_PART, WORKSHEET_PART};
use crate::xlsx::sheet::{write_worksheet_start, WORKSHEET_END};
use crate::xlsx::{RowEncoder, SharedStrings, XmlWriter};
use chrono::{DateTime, Utc};
use std::borrow::Borrow;
use std::io::{Cursor, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// A finished single-sheet document held entirely in memory
///
/// Row 0 is the header; data rows follow at 1, 2, ... in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct SpreadsheetDocument {
    sheet_name: String,
    columns: ColumnSpec,
    rows: Vec<[String; FIELD_COUNT]>,
}

impl SpreadsheetDocument {
    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    pub fn columns(&self) -> &ColumnSpec {
        &self.columns
    }

    /// Data rows, without the header
    pub fn rows(&self) -> &[[String; FIELD_COUNT]] {
        &self.rows
    }

    /// Total rows including the header
    pub fn row_count(&self) -> usize {
        self.rows.len() + 1
    }

    /// Cells at `index`, where 0 is the header row.
    pub fn row(&self, index: usize) -> Option<Vec<&str>> {
        if index == 0 {
            return Some(self.columns.headers());
        }
        self.rows
            .get(index - 1)
            .map(|row| row.iter().map(String::as_str).collect())
    }

    /// Serialize to `.xlsx` bytes.
    pub fn serialize(&self, compression_level: u32) -> Result<Vec<u8>> {
        self.serialize_at(compression_level, Utc::now())
    }

    pub(crate) fn serialize_at(
        &self,
        compression_level: u32,
        created: DateTime<Utc>,
    ) -> Result<Vec<u8>> {
        let bytes = self
            .write_xlsx(compression_level, created)
            .map_err(ExportError::during_serialization)?;
        debug!(
            sheet = %self.sheet_name,
            rows = self.row_count(),
            bytes = bytes.len(),
            "workbook serialized"
        );
        Ok(bytes)
    }

    fn write_xlsx(&self, compression_level: u32, created: DateTime<Utc>) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(i64::from(compression_level.min(9))));

        for part in package_parts(&self.sheet_name, created)? {
            zip.start_file(part.name, options)?;
            zip.write_all(&part.body)?;
        }

        let last_row = u32::try_from(self.row_count())
            .map_err(|_| ExportError::row_limit(MAX_SHEET_ROWS))?;
        zip.start_file(WORKSHEET_PART, options)?;
        write_worksheet_start(&mut XmlWriter::new(&mut zip), &self.columns, last_row)?;

        let mut strings = SharedStrings::new();
        let mut encoder = RowEncoder::new();
        let mut buffer = Vec::with_capacity(8192);

        encoder.encode_shared(&mut buffer, 1, &self.columns.headers(), &mut strings);
        for (row_number, row) in (2..=last_row).zip(&self.rows) {
            let cells: Vec<&str> = row.iter().map(String::as_str).collect();
            encoder.encode_shared(&mut buffer, row_number, &cells, &mut strings);
            if buffer.len() > 64 * 1024 {
                zip.write_all(&buffer)?;
                buffer.clear();
            }
        }
        buffer.extend_from_slice(WORKSHEET_END);
        zip.write_all(&buffer)?;

        zip.start_file(SHARED_STRINGS_PART, options)?;
        strings.write_to(&mut XmlWriter::new(&mut zip))?;

        Ok(zip.finish()?.into_inner())
    }
}

/// Builds a [`SpreadsheetDocument`] from a fully materialized row set
pub struct WorkbookBuilder;

impl WorkbookBuilder {
    /// Header at row 0, one row per record from row 1, input order kept.
    ///
    /// Fails with [`ExportError::SerializationFailure`] once the header plus
    /// data rows would pass [`MAX_SHEET_ROWS`], as the streaming writer does.
    pub fn build<I>(records: I, sheet_name: &str, columns: &ColumnSpec) -> Result<SpreadsheetDocument>
    where
        I: IntoIterator,
        I::Item: Borrow<ExportRecord>,
    {
        Self::build_limited(records, sheet_name, columns, MAX_SHEET_ROWS)
    }

    pub(crate) fn build_limited<I>(
        records: I,
        sheet_name: &str,
        columns: &ColumnSpec,
        row_limit: u32,
    ) -> Result<SpreadsheetDocument>
    where
        I: IntoIterator,
        I::Item: Borrow<ExportRecord>,
    {
        columns.ensure_matches_mapper()?;
        crate::config::validate_sheet_name(sheet_name)?;

        let mut rows = Vec::new();
        for record in records {
            // the header takes one row
            if rows.len() + 1 >= row_limit as usize {
                return Err(ExportError::row_limit(row_limit));
            }
            rows.push(to_cells(record.borrow()).map(str::to_owned));
        }

        Ok(SpreadsheetDocument {
            sheet_name: sheet_name.to_string(),
            columns: columns.clone(),
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Column;

    fn record(id: Option<&str>, level1: Option<&str>) -> ExportRecord {
        ExportRecord {
            id: id.map(String::from),
            level1: level1.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_keeps_order_and_nulls() {
        let records = vec![record(Some("1"), Some("A")), record(None, Some("B"))];
        let doc = WorkbookBuilder::build(&records, "Sheet", &ColumnSpec::unit_task()).unwrap();

        assert_eq!(doc.row_count(), 3);
        assert_eq!(doc.row(0).unwrap()[0], "id");
        assert_eq!(doc.row(1).unwrap(), vec!["1", "A", "", "", "", "", "", ""]);
        assert_eq!(doc.row(2).unwrap(), vec!["", "B", "", "", "", "", "", ""]);
        assert!(doc.row(3).is_none());
    }

    #[test]
    fn test_build_is_deterministic() {
        let records = vec![record(Some("7"), None), record(Some("8"), Some("X"))];
        let spec = ColumnSpec::unit_task();
        let a = WorkbookBuilder::build(&records, "S", &spec).unwrap();
        let b = WorkbookBuilder::build(&records, "S", &spec).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_mismatched_columns_rejected() {
        let spec = ColumnSpec::new(vec![Column::new("only", 10.0)]);
        let err = WorkbookBuilder::build(Vec::<ExportRecord>::new(), "S", &spec).unwrap_err();
        assert!(matches!(err, ExportError::ConfigurationError(_)));
    }

    #[test]
    fn test_row_limit_counts_header() {
        let spec = ColumnSpec::unit_task();
        let fits = vec![ExportRecord::default(); 3];
        let doc = WorkbookBuilder::build_limited(&fits, "S", &spec, 4).unwrap();
        assert_eq!(doc.row_count(), 4);

        let over = vec![ExportRecord::default(); 4];
        let err = WorkbookBuilder::build_limited(&over, "S", &spec, 4).unwrap_err();
        assert!(
            matches!(err, ExportError::SerializationFailure(ref m) if m == "worksheet row limit of 4 reached")
        );
    }

    #[test]
    fn test_row_limit_stops_reading_records() {
        let mut seen = 0;
        let records = std::iter::repeat_with(|| {
            seen += 1;
            ExportRecord::default()
        })
        .take(1_000);
        assert!(WorkbookBuilder::build_limited(records, "S", &ColumnSpec::unit_task(), 10).is_err());
        assert_eq!(seen, 10);
    }

    #[test]
    fn test_serialize_produces_zip() {
        let doc = WorkbookBuilder::build(
            vec![record(Some("1"), Some("A"))],
            "HighMemoryMode",
            &ColumnSpec::unit_task(),
        )
        .unwrap();
        let bytes = doc.serialize(6).unwrap();
        assert_eq!(&bytes[..2], b"PK");

        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        assert!(names.contains(&WORKSHEET_PART));
        assert!(names.contains(&SHARED_STRINGS_PART));
    }
}
