//! File-download surface over [`Exporter`]
//!
//! Mirrors the two download endpoints a web layer exposes: the memory path
//! returns a complete payload, the disk path streams into the response body
//! and reports failures through a separate error channel.

use crate::config::DEFAULT_ROW_COUNT;
use crate::error::Result;
use crate::export::{ExportRequest, ExportSummary, Exporter};
use crate::source::RowSource;
use crate::xlsx::XLSX_CONTENT_TYPE;
use std::io::Write;
use tracing::{error, info};

/// Status reported when a streamed download fails
pub const INTERNAL_SERVER_ERROR: u16 = 500;

/// Query parameters of a download request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DownloadParams {
    #[cfg_attr(feature = "serde", serde(default, rename = "rowCount"))]
    pub row_count: Option<u64>,
}

impl DownloadParams {
    pub fn with_row_count(row_count: u64) -> Self {
        DownloadParams {
            row_count: Some(row_count),
        }
    }

    pub fn row_count_or_default(&self) -> u64 {
        self.row_count.unwrap_or(DEFAULT_ROW_COUNT)
    }
}

/// Response headers for an attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentHeaders {
    pub file_name: String,
    pub content_type: &'static str,
    pub content_disposition: String,
}

impl AttachmentHeaders {
    pub fn for_file(file_name: &str) -> Self {
        AttachmentHeaders {
            file_name: file_name.to_string(),
            content_type: XLSX_CONTENT_TYPE,
            content_disposition: content_disposition(file_name),
        }
    }
}

/// A complete workbook ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePayload {
    pub file_name: String,
    pub content_type: &'static str,
    pub content_disposition: String,
    pub body: Vec<u8>,
}

/// Result of a streamed download
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadStatus {
    Completed(ExportSummary),
    Failed { status: u16, message: String },
}

impl DownloadStatus {
    pub fn status_code(&self) -> u16 {
        match self {
            DownloadStatus::Completed(_) => 200,
            DownloadStatus::Failed { status, .. } => *status,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DownloadStatus::Completed(_))
    }
}

/// `attachment; filename="<name>"` with the name URL-encoded and spaces as
/// `%20`.
pub fn content_disposition(file_name: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(file_name.as_bytes()).collect();
    format!(
        "attachment; filename=\"{}\"",
        encoded.replace('+', "%20")
    )
}

/// Headers for a disk-mode download, to be sent before the body streams.
pub fn disk_headers<S: RowSource>(exporter: &Exporter<S>) -> AttachmentHeaders {
    AttachmentHeaders::for_file(&exporter.config().disk_file_name)
}

/// Build the whole workbook in memory and return it with its headers.
pub fn download_memory<S: RowSource>(
    exporter: &mut Exporter<S>,
    params: &DownloadParams,
) -> Result<FilePayload> {
    let row_count = params.row_count_or_default();
    info!(rows = row_count, "memory download requested");

    let mut body = Vec::new();
    let summary = exporter.export(&ExportRequest::memory(row_count), &mut body)?;
    let headers = AttachmentHeaders::for_file(&exporter.config().memory_file_name);
    info!(
        file = %headers.file_name,
        rows = summary.data_rows,
        "workbook prepared for download"
    );

    Ok(FilePayload {
        file_name: headers.file_name,
        content_type: headers.content_type,
        content_disposition: headers.content_disposition,
        body,
    })
}

/// Stream a disk-mode workbook into `sink`.
///
/// On failure the status is 500 and `Excel download failed: <reason>` is
/// written to `error_channel`. Bytes already in `sink` stay there.
pub fn download_disk<S, W, E>(
    exporter: &mut Exporter<S>,
    params: &DownloadParams,
    sink: W,
    mut error_channel: E,
) -> DownloadStatus
where
    S: RowSource,
    W: Write,
    E: Write,
{
    let row_count = params.row_count_or_default();
    info!(rows = row_count, "disk download requested");

    match exporter.export(&ExportRequest::disk(row_count), sink) {
        Ok(summary) => {
            info!(rows = summary.data_rows, "disk download completed");
            DownloadStatus::Completed(summary)
        }
        Err(err) => {
            error!(error = %err, "disk download failed");
            let message = format!("Excel download failed: {}", err);
            if let Err(write_err) = error_channel
                .write_all(message.as_bytes())
                .and_then(|_| error_channel.flush())
            {
                error!(error = %write_err, "failed to write error response");
            }
            DownloadStatus::Failed {
                status: INTERNAL_SERVER_ERROR,
                message,
            }
        }
    }
}
