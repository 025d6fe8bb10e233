//! Unit-task records, the column layout, and the row mapper that joins them

use crate::error::{ExportError, Result};

/// Number of cells the row mapper produces per record
pub const FIELD_COUNT: usize = 8;

/// Display width shared by every unit-task column, in character units
/// (3600 / 256 of the legacy POI unit).
pub const FIXED_COLUMN_WIDTH: f64 = 14.0625;

/// One unit-task row as delivered by the storage layer
///
/// Every field may be absent. Absence becomes an empty cell when the row is
/// written, in both export modes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExportRecord {
    pub id: Option<String>,
    pub level1: Option<String>,
    pub level2: Option<String>,
    pub level3: Option<String>,
    pub level4: Option<String>,
    pub level5: Option<String>,
    pub level6: Option<String>,
    pub department: Option<String>,
}

impl ExportRecord {
    /// Build a record from its eight fields in column order.
    pub fn from_fields(fields: [Option<String>; FIELD_COUNT]) -> Self {
        let [id, level1, level2, level3, level4, level5, level6, department] = fields;
        ExportRecord {
            id,
            level1,
            level2,
            level3,
            level4,
            level5,
            level6,
            department,
        }
    }
}

/// Map a record to its cells, in [`ColumnSpec::unit_task`] order.
///
/// Absent fields map to `""`. The identifier is always rendered as text,
/// never as a number and never omitted.
pub fn to_cells(record: &ExportRecord) -> [&str; FIELD_COUNT] {
    [
        &record.id,
        &record.level1,
        &record.level2,
        &record.level3,
        &record.level4,
        &record.level5,
        &record.level6,
        &record.department,
    ]
    .map(|field| field.as_deref().unwrap_or(""))
}

/// A header label and its fixed display width
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Column {
    pub header: String,
    pub width: f64,
}

impl Column {
    pub fn new(header: impl Into<String>, width: f64) -> Self {
        Column {
            header: header.into(),
            width,
        }
    }
}

/// Ordered column layout shared by both export modes
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColumnSpec {
    columns: Vec<Column>,
}

impl ColumnSpec {
    pub fn new(columns: Vec<Column>) -> Self {
        ColumnSpec { columns }
    }

    /// The unit-task layout: `id`, six levels, and the department.
    pub fn unit_task() -> Self {
        let headers = [
            "id",
            "LEVEL_1",
            "LEVEL_2",
            "LEVEL_3",
            "LEVEL_4",
            "LEVEL_5",
            "LEVEL_6",
            "DEPARTMENT",
        ];
        ColumnSpec::new(
            headers
                .iter()
                .map(|h| Column::new(*h, FIXED_COLUMN_WIDTH))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Column> {
        self.columns.iter()
    }

    pub fn headers(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.header.as_str()).collect()
    }

    /// The layout must line up one-to-one with [`to_cells`].
    ///
    /// A mismatch is a programming defect, reported as
    /// [`ExportError::ConfigurationError`] before anything is written.
    pub fn ensure_matches_mapper(&self) -> Result<()> {
        if self.columns.len() != FIELD_COUNT {
            return Err(ExportError::ConfigurationError(format!(
                "column spec has {} columns but the row mapper produces {} cells",
                self.columns.len(),
                FIELD_COUNT
            )));
        }
        if let Some(col) = self.columns.iter().find(|c| c.width.is_nan() || c.width <= 0.0) {
            return Err(ExportError::ConfigurationError(format!(
                "column '{}' has non-positive width {}",
                col.header, col.width
            )));
        }
        Ok(())
    }
}

impl Default for ColumnSpec {
    fn default() -> Self {
        ColumnSpec::unit_task()
    }
}

impl<'a> IntoIterator for &'a ColumnSpec {
    type Item = &'a Column;
    type IntoIter = std::slice::Iter<'a, Column>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}
