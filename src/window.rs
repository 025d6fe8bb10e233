//! Bounded-memory streaming writer for the disk export path
//!
//! Rows arrive one at a time through [`WindowedWriter::append_row`] and sit
//! in a resident window. When the window reaches the flush size it is encoded
//! and appended to a staging file, then cleared, so resident memory is
//! O(flush size) whatever the total row count.
//!
//! [`WindowedWriter::finish`] writes the container to the sink: the fixed
//! package parts, then the worksheet with its rows copied back out of
//! staging. The sink is only ever appended to. The staging file is removed
//! on every exit path: success, failure, [`WindowedWriter::abort`] or drop.

use crate::config::{validate_sheet_name, ExportConfig, DEFAULT_COMPRESSION_LEVEL, DEFAULT_FLUSH_SIZE};
use crate::error::{ExportError, Result};
use crate::record::{to_cells, ColumnSpec, ExportRecord, FIELD_COUNT};
use crate::xlsx::parts::{package_parts, EMPTY_SHARED_STRINGS, SHARED_STRINGS_PART, WORKSHEET_PART};
use crate::xlsx::sheet::{write_worksheet_start, WORKSHEET_END};
use crate::xlsx::{RowEncoder, StreamingZipWriter, XmlWriter};
use chrono::Utc;
use std::fs::File;
use std::io::{BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, info, warn};

/// Highest row count a worksheet can hold, header included
pub const MAX_SHEET_ROWS: u32 = 1_048_576;

const STAGING_CHUNK: usize = 64 * 1024;

/// A row appended but not yet flushed
struct ResidentRow {
    index: u32,
    cells: [String; FIELD_COUNT],
}

/// Row XML spilled to a temporary file, in append order
struct Staging {
    file: BufWriter<File>,
    path: TempPath,
    bytes: u64,
}

impl Staging {
    fn create(dir: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("taskexport-").suffix(".rows.xml");
        let named = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        let (file, path) = named.into_parts();
        Ok(Staging {
            file: BufWriter::with_capacity(STAGING_CHUNK, file),
            path,
            bytes: 0,
        })
    }

    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.file.write_all(data)?;
        self.bytes += data.len() as u64;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    fn copy_into<W: Write>(&mut self, zip: &mut StreamingZipWriter<W>) -> Result<()> {
        self.file.flush()?;
        let file = self.file.get_mut();
        file.seek(SeekFrom::Start(0))?;

        let mut chunk = vec![0u8; STAGING_CHUNK];
        loop {
            let n = match file.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            zip.write_data(&chunk[..n])?;
        }
        Ok(())
    }

    fn release(self) -> Result<()> {
        let Staging { file, path, .. } = self;
        drop(file);
        path.close()?;
        Ok(())
    }
}

/// Totals reported by a finished [`WindowedWriter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowReport {
    /// Data rows written, header excluded
    pub data_rows: u64,
    /// Window flushes, including the final one in `finish`
    pub flushes: u64,
    /// Bytes written to the sink
    pub bytes_written: u64,
}

/// Disk-backed streaming worksheet writer
pub struct WindowedWriter<W: Write> {
    sink: Option<W>,
    staging: Option<Staging>,
    staging_path: PathBuf,
    resident: Vec<ResidentRow>,
    flush_size: usize,
    row_limit: u32,
    next_row_index: u32,
    flushes: u64,
    sheet_name: String,
    columns: ColumnSpec,
    compression_level: u32,
    encoder: RowEncoder,
    buffer: Vec<u8>,
}

impl<W: Write> WindowedWriter<W> {
    /// Writer with the default sheet, columns and a 5000-row window.
    pub fn new(sink: W) -> Result<Self> {
        WindowedWriterBuilder::new().build(sink)
    }

    /// Map `record`, give it the next row index and add it to the window.
    ///
    /// Flushes the window to staging once it holds `flush_size` rows.
    pub fn append_row(&mut self, record: &ExportRecord) -> Result<()> {
        let index = self.next_row_index;
        if index >= self.row_limit {
            return Err(ExportError::row_limit(self.row_limit));
        }

        self.resident.push(ResidentRow {
            index,
            cells: to_cells(record).map(str::to_owned),
        });
        self.next_row_index += 1;

        if self.resident.len() >= self.flush_size {
            self.flush_window()?;
        }
        Ok(())
    }

    /// Move every resident row into staging, preserving order.
    fn flush_window(&mut self) -> Result<()> {
        if self.resident.is_empty() {
            return Ok(());
        }
        let staging = self.staging.as_mut().ok_or_else(|| {
            ExportError::SerializationFailure("staging area already released".to_string())
        })?;

        let first = self.resident[0].index;
        let last = first + self.resident.len() as u32 - 1;

        self.buffer.clear();
        for row in self.resident.drain(..) {
            let cells: [&str; FIELD_COUNT] = std::array::from_fn(|i| row.cells[i].as_str());
            self.encoder
                .encode_inline(&mut self.buffer, row.index + 1, &cells);
            if self.buffer.len() >= STAGING_CHUNK {
                staging
                    .append(&self.buffer)
                    .map_err(ExportError::during_serialization)?;
                self.buffer.clear();
            }
        }
        staging
            .append(&self.buffer)
            .and_then(|_| staging.sync())
            .map_err(ExportError::during_serialization)?;
        self.buffer.clear();

        self.flushes += 1;
        debug!(
            first_row = first,
            last_row = last,
            staged_bytes = staging.bytes,
            "flushed row window"
        );
        Ok(())
    }

    /// Flush what is left, write the document to the sink and release
    /// staging. Staging is released even when writing fails.
    pub fn finish(mut self) -> Result<WindowReport> {
        let outcome = self
            .write_document()
            .map_err(ExportError::during_serialization);
        let released = self.release_staging();

        let bytes_written = match outcome {
            Ok(bytes) => bytes,
            Err(err) => {
                if let Err(release_err) = released {
                    warn!(error = %release_err, "failed to release staging file");
                }
                return Err(err);
            }
        };
        released?;

        let report = WindowReport {
            data_rows: self.rows_written(),
            flushes: self.flushes,
            bytes_written,
        };
        info!(
            sheet = %self.sheet_name,
            rows = report.data_rows,
            flushes = report.flushes,
            bytes = report.bytes_written,
            "streamed workbook finished"
        );
        Ok(report)
    }

    /// Drop resident rows and release staging without touching the sink.
    pub fn abort(mut self) -> Result<()> {
        warn!(
            sheet = %self.sheet_name,
            rows = self.rows_written(),
            "aborting streamed workbook"
        );
        self.resident.clear();
        self.release_staging()
    }

    fn write_document(&mut self) -> Result<u64> {
        self.flush_window()?;

        let sink = self.sink.take().ok_or_else(|| {
            ExportError::SerializationFailure("sink already consumed".to_string())
        })?;
        let staging = self.staging.as_mut().ok_or_else(|| {
            ExportError::SerializationFailure("staging area already released".to_string())
        })?;

        let mut zip = StreamingZipWriter::new(sink, self.compression_level);
        for part in package_parts(&self.sheet_name, Utc::now())? {
            zip.write_entry(part.name, &part.body)?;
        }

        let mut prelude = Vec::with_capacity(1024);
        write_worksheet_start(
            &mut XmlWriter::new(&mut prelude),
            &self.columns,
            self.next_row_index,
        )?;
        zip.start_entry(WORKSHEET_PART)?;
        zip.write_data(&prelude)?;
        staging.copy_into(&mut zip)?;
        zip.write_data(WORKSHEET_END)?;

        zip.write_entry(SHARED_STRINGS_PART, EMPTY_SHARED_STRINGS.as_bytes())?;

        let (mut sink, written) = zip.finish()?;
        sink.flush()?;
        Ok(written)
    }

    fn release_staging(&mut self) -> Result<()> {
        match self.staging.take() {
            Some(staging) => {
                staging.release()?;
                debug!(path = %self.staging_path.display(), "staging file released");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Rows currently held in memory
    pub fn resident_len(&self) -> usize {
        self.resident.len()
    }

    pub fn flush_size(&self) -> usize {
        self.flush_size
    }

    pub fn flush_count(&self) -> u64 {
        self.flushes
    }

    /// Data rows appended so far, header excluded
    pub fn rows_written(&self) -> u64 {
        u64::from(self.next_row_index - 1)
    }

    /// Index the next appended row will get (0 is the header)
    pub fn next_row_index(&self) -> u32 {
        self.next_row_index
    }

    pub fn staging_path(&self) -> &Path {
        &self.staging_path
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }
}

/// Builder for configured [`WindowedWriter`]s
#[derive(Debug, Clone)]
pub struct WindowedWriterBuilder {
    sheet_name: String,
    columns: ColumnSpec,
    flush_size: usize,
    staging_dir: Option<PathBuf>,
    compression_level: u32,
    row_limit: u32,
}

impl Default for WindowedWriterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowedWriterBuilder {
    pub fn new() -> Self {
        WindowedWriterBuilder {
            sheet_name: "Data".to_string(),
            columns: ColumnSpec::unit_task(),
            flush_size: DEFAULT_FLUSH_SIZE,
            staging_dir: None,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            row_limit: MAX_SHEET_ROWS,
        }
    }

    /// Flush size, staging dir, compression and disk sheet name from `config`.
    pub fn from_config(config: &ExportConfig) -> Self {
        WindowedWriterBuilder {
            sheet_name: config.disk_sheet_name.clone(),
            columns: ColumnSpec::unit_task(),
            flush_size: config.flush_size,
            staging_dir: config.staging_dir.clone(),
            compression_level: config.compression_level,
            row_limit: MAX_SHEET_ROWS,
        }
    }

    pub fn with_sheet_name(mut self, name: &str) -> Self {
        self.sheet_name = name.to_string();
        self
    }

    pub fn with_columns(mut self, columns: ColumnSpec) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_flush_size(mut self, flush_size: usize) -> Self {
        self.flush_size = flush_size;
        self
    }

    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_row_limit(mut self, limit: u32) -> Self {
        self.row_limit = limit;
        self
    }

    /// Validate the settings, create staging and write the header row.
    pub fn build<W: Write>(self, sink: W) -> Result<WindowedWriter<W>> {
        if self.flush_size == 0 {
            return Err(ExportError::ConfigurationError(
                "flush size must be at least 1".to_string(),
            ));
        }
        self.columns.ensure_matches_mapper()?;
        validate_sheet_name(&self.sheet_name)?;

        let mut staging = Staging::create(self.staging_dir.as_deref())?;
        let staging_path = staging.path.to_path_buf();

        let mut encoder = RowEncoder::new();
        let mut buffer = Vec::with_capacity(STAGING_CHUNK);
        encoder.encode_inline(&mut buffer, 1, &self.columns.headers());
        staging.append(&buffer)?;
        buffer.clear();

        debug!(
            sheet = %self.sheet_name,
            flush_size = self.flush_size,
            staging = %staging_path.display(),
            "windowed writer created"
        );

        Ok(WindowedWriter {
            sink: Some(sink),
            staging: Some(staging),
            staging_path,
            resident: Vec::with_capacity(self.flush_size.min(DEFAULT_FLUSH_SIZE)),
            flush_size: self.flush_size,
            row_limit: self.row_limit,
            next_row_index: 1,
            flushes: 0,
            sheet_name: self.sheet_name,
            columns: self.columns,
            compression_level: self.compression_level.min(9),
            encoder,
            buffer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tempfile::tempdir;

    fn task(id: usize) -> ExportRecord {
        ExportRecord {
            id: Some(id.to_string()),
            department: Some("Ops".to_string()),
            ..Default::default()
        }
    }

    /// Sink that fails once it has taken `limit` bytes
    struct FailingSink {
        taken: usize,
        limit: usize,
    }

    impl Write for FailingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.taken + buf.len() > self.limit {
                return Err(io::Error::other("sink closed"));
            }
            self.taken += buf.len();
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_window_never_reaches_flush_size() {
        let dir = tempdir().unwrap();
        let mut out = Vec::new();
        let mut writer = WindowedWriterBuilder::new()
            .with_flush_size(3)
            .with_staging_dir(dir.path())
            .build(&mut out)
            .unwrap();

        for i in 0..10 {
            writer.append_row(&task(i)).unwrap();
            assert!(writer.resident_len() < writer.flush_size());
        }
        assert_eq!(writer.flush_count(), 3);
        assert_eq!(writer.resident_len(), 1);
        assert_eq!(writer.next_row_index(), 11);

        let report = writer.finish().unwrap();
        assert_eq!(report.data_rows, 10);
        assert_eq!(report.flushes, 4);
        assert_eq!(report.bytes_written as usize, out.len());
    }

    #[test]
    fn test_flush_size_one_flushes_every_row() {
        let mut out = Vec::new();
        let mut writer = WindowedWriterBuilder::new()
            .with_flush_size(1)
            .build(&mut out)
            .unwrap();
        for i in 0..4 {
            writer.append_row(&task(i)).unwrap();
            assert_eq!(writer.resident_len(), 0);
        }
        assert_eq!(writer.flush_count(), 4);
        writer.finish().unwrap();
    }

    #[test]
    fn test_staging_removed_after_finish() {
        let dir = tempdir().unwrap();
        let mut writer = WindowedWriterBuilder::new()
            .with_staging_dir(dir.path())
            .build(Vec::new())
            .unwrap();
        writer.append_row(&task(1)).unwrap();
        let path = writer.staging_path().to_path_buf();
        assert!(path.exists());

        writer.finish().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_staging_removed_when_sink_fails() {
        let dir = tempdir().unwrap();
        let mut writer = WindowedWriterBuilder::new()
            .with_staging_dir(dir.path())
            .build(FailingSink { taken: 0, limit: 100 })
            .unwrap();
        writer.append_row(&task(1)).unwrap();
        let path = writer.staging_path().to_path_buf();

        let err = writer.finish().unwrap_err();
        assert!(matches!(err, ExportError::SerializationFailure(_)));
        assert!(!path.exists());
    }

    #[test]
    fn test_abort_releases_staging_and_leaves_sink_empty() {
        let dir = tempdir().unwrap();
        let mut out = Vec::new();
        let mut writer = WindowedWriterBuilder::new()
            .with_staging_dir(dir.path())
            .with_flush_size(2)
            .build(&mut out)
            .unwrap();
        for i in 0..5 {
            writer.append_row(&task(i)).unwrap();
        }
        let path = writer.staging_path().to_path_buf();

        writer.abort().unwrap();
        assert!(!path.exists());
        assert!(out.is_empty());
    }

    #[test]
    fn test_drop_releases_staging() {
        let dir = tempdir().unwrap();
        let path = {
            let writer = WindowedWriterBuilder::new()
                .with_staging_dir(dir.path())
                .build(Vec::new())
                .unwrap();
            writer.staging_path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_invalid_settings_rejected() {
        assert!(matches!(
            WindowedWriterBuilder::new().with_flush_size(0).build(Vec::new()),
            Err(ExportError::ConfigurationError(_))
        ));
        assert!(matches!(
            WindowedWriterBuilder::new()
                .with_columns(ColumnSpec::new(vec![]))
                .build(Vec::new()),
            Err(ExportError::ConfigurationError(_))
        ));
        assert!(WindowedWriterBuilder::new()
            .with_sheet_name("bad:name")
            .build(Vec::new())
            .is_err());
    }

    #[test]
    fn test_row_limit_counts_header() {
        let dir = tempdir().unwrap();
        let mut writer = WindowedWriterBuilder::new()
            .with_staging_dir(dir.path())
            .with_flush_size(2)
            .with_row_limit(4)
            .build(Vec::new())
            .unwrap();
        for i in 0..3 {
            writer.append_row(&task(i)).unwrap();
        }

        let err = writer.append_row(&task(3)).unwrap_err();
        assert!(
            matches!(err, ExportError::SerializationFailure(ref m) if m == "worksheet row limit of 4 reached")
        );
        assert_eq!(writer.rows_written(), 3);
        writer.abort().unwrap();
    }

    #[test]
    fn test_default_builder_uses_sheet_limit() {
        let writer = WindowedWriterBuilder::default().build(Vec::new()).unwrap();
        assert_eq!(writer.row_limit, MAX_SHEET_ROWS);
        assert_eq!(writer.flush_size(), DEFAULT_FLUSH_SIZE);
        writer.abort().unwrap();
    }

    #[test]
    fn test_from_config() {
        let config = ExportConfig::default().with_flush_size(77);
        let writer = WindowedWriterBuilder::from_config(&config)
            .build(Vec::new())
            .unwrap();
        assert_eq!(writer.flush_size(), 77);
        assert_eq!(writer.sheet_name(), "Data");
        assert_eq!(writer.rows_written(), 0);
    }
}
