//! Export dispatch between the memory and disk paths

use crate::config::ExportConfig;
use crate::error::{ExportError, Result};
use crate::record::{ColumnSpec, ExportRecord};
use crate::source::RowSource;
use crate::window::WindowedWriterBuilder;
use crate::workbook::WorkbookBuilder;
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::time::Instant;
use tracing::{error, info, warn};

/// How a workbook is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ExportMode {
    /// Load every row, build the document in memory, write it in one go
    Memory,
    /// Stream rows through a bounded window with disk staging
    Disk,
}

impl ExportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportMode::Memory => "memory",
            ExportMode::Disk => "disk",
        }
    }
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportMode {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(ExportMode::Memory),
            "disk" | "harddisk" => Ok(ExportMode::Disk),
            other => Err(ExportError::ConfigurationError(format!(
                "unknown export mode '{}', expected 'memory' or 'disk'",
                other
            ))),
        }
    }
}

/// One export invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExportRequest {
    /// Upper bound on exported rows
    pub row_count_hint: u64,
    pub mode: ExportMode,
}

impl ExportRequest {
    pub fn new(row_count_hint: u64, mode: ExportMode) -> Self {
        ExportRequest {
            row_count_hint,
            mode,
        }
    }

    pub fn memory(row_count_hint: u64) -> Self {
        Self::new(row_count_hint, ExportMode::Memory)
    }

    pub fn disk(row_count_hint: u64) -> Self {
        Self::new(row_count_hint, ExportMode::Disk)
    }
}

/// What a completed export produced
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ExportSummary {
    /// Mode actually used
    pub mode: ExportMode,
    pub sheet_name: String,
    /// Data rows, header excluded
    pub data_rows: u64,
    /// Window flushes; always 0 in memory mode
    pub flushes: u64,
    pub bytes_written: u64,
}

/// Runs exports from one row source
pub struct Exporter<S> {
    source: S,
    config: ExportConfig,
    columns: ColumnSpec,
}

impl<S: RowSource> Exporter<S> {
    pub fn new(source: S, config: ExportConfig) -> Result<Self> {
        config.validate()?;
        Ok(Exporter {
            source,
            config,
            columns: ColumnSpec::unit_task(),
        })
    }

    /// Use a different header/width layout. It must still have one column
    /// per record field.
    pub fn with_columns(mut self, columns: ColumnSpec) -> Result<Self> {
        columns.ensure_matches_mapper()?;
        self.columns = columns;
        Ok(self)
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Mode that `request` will run in once the auto-disk threshold applies.
    pub fn resolve_mode(&self, request: &ExportRequest) -> ExportMode {
        match (request.mode, self.config.auto_disk_threshold) {
            (ExportMode::Memory, Some(threshold)) if request.row_count_hint > threshold => {
                ExportMode::Disk
            }
            (mode, _) => mode,
        }
    }

    /// Produce one workbook for `request` and write it to `sink`.
    ///
    /// Memory mode writes nothing to `sink` unless the whole document was
    /// built. Disk mode writes incrementally, so a failure can leave a
    /// partial document in `sink`.
    pub fn export<W: Write>(&mut self, request: &ExportRequest, sink: W) -> Result<ExportSummary> {
        let mode = self.resolve_mode(request);
        if mode != request.mode {
            info!(
                requested = %request.mode,
                rows = request.row_count_hint,
                "row count above auto-disk threshold, exporting on disk"
            );
        }
        info!(mode = %mode, rows = request.row_count_hint, "export started");

        let started = Instant::now();
        let outcome = match mode {
            ExportMode::Memory => self.export_memory(request.row_count_hint, sink),
            ExportMode::Disk => self.export_disk(request.row_count_hint, sink),
        };

        match &outcome {
            Ok(summary) => info!(
                mode = %mode,
                rows = summary.data_rows,
                bytes = summary.bytes_written,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "export finished"
            ),
            Err(err) => error!(mode = %mode, error = %err, "export failed"),
        }
        outcome
    }

    fn export_memory<W: Write>(&mut self, row_count_hint: u64, mut sink: W) -> Result<ExportSummary> {
        let records = self.source.fetch_all(row_count_hint)?;
        let document =
            WorkbookBuilder::build(&records, &self.config.memory_sheet_name, &self.columns)?;
        drop(records);

        let bytes = document.serialize(self.config.compression_level)?;
        sink.write_all(&bytes)?;
        sink.flush()?;

        Ok(ExportSummary {
            mode: ExportMode::Memory,
            sheet_name: document.sheet_name().to_string(),
            data_rows: document.rows().len() as u64,
            flushes: 0,
            bytes_written: bytes.len() as u64,
        })
    }

    fn export_disk<W: Write>(&mut self, row_count_hint: u64, sink: W) -> Result<ExportSummary> {
        let mut writer = WindowedWriterBuilder::from_config(&self.config)
            .with_columns(self.columns.clone())
            .build(sink)?;

        let streamed = self
            .source
            .stream_all(row_count_hint, &mut |record: ExportRecord| writer.append_row(&record));

        if let Err(err) = streamed {
            warn!(
                rows = writer.rows_written(),
                error = %err,
                "row stream failed, discarding staged rows"
            );
            if let Err(abort_err) = writer.abort() {
                warn!(error = %abort_err, "failed to release staging after stream failure");
            }
            return Err(err);
        }

        let sheet_name = writer.sheet_name().to_string();
        let report = writer.finish()?;
        Ok(ExportSummary {
            mode: ExportMode::Disk,
            sheet_name,
            data_rows: report.data_rows,
            flushes: report.flushes,
            bytes_written: report.bytes_written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{RowSink, SyntheticRowSource, VecRowSource};
    use tempfile::tempdir;

    /// Delivers `good` rows, then fails the way an interrupted cursor does
    struct BrokenSource {
        good: u64,
    }

    impl RowSource for BrokenSource {
        fn fetch_all(&mut self, _row_count_hint: u64) -> Result<Vec<ExportRecord>> {
            Err(ExportError::SourceUnavailable("connection refused".to_string()))
        }

        fn stream_all(&mut self, row_count_hint: u64, on_row: &mut RowSink<'_>) -> Result<u64> {
            for n in 1..=self.good.min(row_count_hint) {
                on_row(SyntheticRowSource::record(n))?;
            }
            Err(ExportError::StreamInterrupted {
                delivered: self.good,
                reason: "connection reset".to_string(),
            })
        }
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("memory".parse::<ExportMode>().unwrap(), ExportMode::Memory);
        assert_eq!("Disk".parse::<ExportMode>().unwrap(), ExportMode::Disk);
        assert_eq!("harddisk".parse::<ExportMode>().unwrap(), ExportMode::Disk);
        assert!("tape".parse::<ExportMode>().is_err());
        assert_eq!(ExportMode::Disk.to_string(), "disk");
    }

    #[test]
    fn test_memory_export_summary() {
        let mut exporter = Exporter::new(SyntheticRowSource::new(), ExportConfig::default()).unwrap();
        let mut out = Vec::new();
        let summary = exporter.export(&ExportRequest::memory(25), &mut out).unwrap();

        assert_eq!(summary.mode, ExportMode::Memory);
        assert_eq!(summary.sheet_name, "HighMemoryMode");
        assert_eq!(summary.data_rows, 25);
        assert_eq!(summary.flushes, 0);
        assert_eq!(summary.bytes_written as usize, out.len());
    }

    #[test]
    fn test_disk_export_summary() {
        let dir = tempdir().unwrap();
        let config = ExportConfig::default()
            .with_flush_size(10)
            .with_staging_dir(dir.path());
        let mut exporter = Exporter::new(SyntheticRowSource::new(), config).unwrap();
        let mut out = Vec::new();
        let summary = exporter.export(&ExportRequest::disk(25), &mut out).unwrap();

        assert_eq!(summary.mode, ExportMode::Disk);
        assert_eq!(summary.sheet_name, "Data");
        assert_eq!(summary.data_rows, 25);
        assert_eq!(summary.flushes, 3);
        assert_eq!(&out[..2], b"PK");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_interrupted_stream_releases_staging() {
        let dir = tempdir().unwrap();
        let config = ExportConfig::default()
            .with_flush_size(2)
            .with_staging_dir(dir.path());
        let mut exporter = Exporter::new(BrokenSource { good: 5 }, config).unwrap();
        let mut out = Vec::new();

        let err = exporter.export(&ExportRequest::disk(10), &mut out).unwrap_err();
        assert!(matches!(
            err,
            ExportError::StreamInterrupted { delivered: 5, .. }
        ));
        assert!(!err.is_retryable());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_memory_failure_writes_nothing() {
        let mut exporter = Exporter::new(BrokenSource { good: 0 }, ExportConfig::default()).unwrap();
        let mut out = Vec::new();

        let err = exporter.export(&ExportRequest::memory(10), &mut out).unwrap_err();
        assert!(err.is_retryable());
        assert!(out.is_empty());
    }

    #[test]
    fn test_zero_rows_in_both_modes() {
        let mut exporter =
            Exporter::new(VecRowSource::new(vec![ExportRecord::default()]), ExportConfig::default())
                .unwrap();
        for request in [ExportRequest::memory(0), ExportRequest::disk(0)] {
            let mut out = Vec::new();
            let summary = exporter.export(&request, &mut out).unwrap();
            assert_eq!(summary.data_rows, 0);
            assert!(!out.is_empty());
        }
    }

    #[test]
    fn test_auto_disk_threshold() {
        let config = ExportConfig::default().with_auto_disk_threshold(100);
        let exporter = Exporter::new(SyntheticRowSource::new(), config).unwrap();

        assert_eq!(exporter.resolve_mode(&ExportRequest::memory(100)), ExportMode::Memory);
        assert_eq!(exporter.resolve_mode(&ExportRequest::memory(101)), ExportMode::Disk);
        assert_eq!(exporter.resolve_mode(&ExportRequest::disk(1)), ExportMode::Disk);

        let default = Exporter::new(SyntheticRowSource::new(), ExportConfig::default()).unwrap();
        assert_eq!(
            default.resolve_mode(&ExportRequest::memory(u64::MAX)),
            ExportMode::Memory
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ExportConfig::default().with_flush_size(0);
        assert!(matches!(
            Exporter::new(SyntheticRowSource::new(), config),
            Err(ExportError::ConfigurationError(_))
        ));
    }
}
