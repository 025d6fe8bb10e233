//! # taskexport
//!
//! Unit-task spreadsheet export with two memory strategies.
//!
//! ## Features
//!
//! - **Memory mode**: load every row, build the workbook in memory, write it in one go
//! - **Disk mode**: stream rows through a bounded window, staging on disk, so
//!   memory stays flat however many rows are exported
//! - **Forward-only output**: disk mode never seeks, so sinks can be sockets or
//!   HTTP response bodies
//! - **Pluggable sources**: in-memory, synthetic and PostgreSQL (`postgres` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use taskexport::{ExportConfig, ExportRequest, Exporter, SyntheticRowSource};
//! use std::fs::File;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut exporter = Exporter::new(SyntheticRowSource::new(), ExportConfig::default())?;
//!
//! let file = File::create("LowMemoryMode.xlsx")?;
//! let summary = exporter.export(&ExportRequest::disk(1_000_000), file)?;
//! println!("{} rows in {} flushes", summary.data_rows, summary.flushes);
//! # Ok(())
//! # }
//! ```
//!
//! ### Driving the windowed writer directly
//!
//! ```rust,no_run
//! use taskexport::{ExportRecord, WindowedWriterBuilder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut out = Vec::new();
//! let mut writer = WindowedWriterBuilder::new()
//!     .with_flush_size(500)
//!     .build(&mut out)?;
//!
//! writer.append_row(&ExportRecord {
//!     id: Some("1".to_string()),
//!     level1: Some("Planning".to_string()),
//!     ..Default::default()
//! })?;
//! writer.finish()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod download;
pub mod error;
pub mod export;
pub mod record;
pub mod source;
pub mod window;
pub mod workbook;
pub mod xlsx;

pub use config::{ExportConfig, WindowProfile};
pub use error::{ExportError, Result};
pub use export::{ExportMode, ExportRequest, ExportSummary, Exporter};
pub use record::{to_cells, Column, ColumnSpec, ExportRecord};
pub use source::{RowSource, SyntheticRowSource, VecRowSource};
pub use window::{WindowReport, MAX_SHEET_ROWS, WindowedWriter, WindowedWriterBuilder};
pub use workbook::{SpreadsheetDocument, WorkbookBuilder};

#[cfg(feature = "postgres")]
pub use source::PostgresRowSource;
