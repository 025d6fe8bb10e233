//! Export settings and memory-window profiles
//!
//! Defaults reproduce the behaviour callers rely on: a 5000-row window,
//! `HighMemoryMode` / `Data` sheets, 50 000 rows when no count is given and
//! no automatic switch between modes.

use crate::error::{ExportError, Result};
use std::path::PathBuf;

/// Rows exported when the caller gives no count
pub const DEFAULT_ROW_COUNT: u64 = 50_000;

/// Resident rows kept by the windowed writer before it flushes
pub const DEFAULT_FLUSH_SIZE: usize = 5_000;

pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

const INVALID_SHEET_CHARS: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];

/// Window sizing for pods of different memory sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowProfile {
    /// Small pods (< 512MB): flush every 500 rows
    Low,
    /// Medium pods (512MB-1GB): flush every 2000 rows
    Medium,
    /// Large pods (> 1GB): flush every 5000 rows (default)
    High,
    Custom { flush_size: usize },
}

impl WindowProfile {
    pub fn from_memory_mb(memory_mb: usize) -> Self {
        if memory_mb < 512 {
            WindowProfile::Low
        } else if memory_mb < 1024 {
            WindowProfile::Medium
        } else {
            WindowProfile::High
        }
    }

    /// Profile for `MEMORY_LIMIT_MB`, or High when it is unset or unparsable
    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup("MEMORY_LIMIT_MB")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .map(Self::from_memory_mb)
            .unwrap_or(WindowProfile::High)
    }

    pub fn flush_size(&self) -> usize {
        match self {
            WindowProfile::Low => 500,
            WindowProfile::Medium => 2_000,
            WindowProfile::High => DEFAULT_FLUSH_SIZE,
            WindowProfile::Custom { flush_size } => *flush_size,
        }
    }
}

/// Settings for one [`Exporter`](crate::export::Exporter)
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ExportConfig {
    /// Rows held in memory by the windowed writer before a flush
    pub flush_size: usize,
    /// Directory for staging files; the system temp dir when `None`
    pub staging_dir: Option<PathBuf>,
    pub memory_sheet_name: String,
    pub disk_sheet_name: String,
    pub memory_file_name: String,
    pub disk_file_name: String,
    pub default_row_count: u64,
    /// Deflate level, 0-9
    pub compression_level: u32,
    /// When set, memory-mode requests above this many rows run on disk.
    pub auto_disk_threshold: Option<u64>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            flush_size: DEFAULT_FLUSH_SIZE,
            staging_dir: None,
            memory_sheet_name: "HighMemoryMode".to_string(),
            disk_sheet_name: "Data".to_string(),
            memory_file_name: "HighMemoryMode.xlsx".to_string(),
            disk_file_name: "LowMemoryMode.xlsx".to_string(),
            default_row_count: DEFAULT_ROW_COUNT,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            auto_disk_threshold: None,
        }
    }
}

impl ExportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from the process environment.
    ///
    /// `MEMORY_LIMIT_MB` picks a [`WindowProfile`]; `TASKEXPORT_FLUSH_SIZE`,
    /// `TASKEXPORT_STAGING_DIR`, `TASKEXPORT_AUTO_DISK_THRESHOLD` and
    /// `TASKEXPORT_COMPRESSION_LEVEL` override individual settings.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ExportConfig {
            flush_size: WindowProfile::from_lookup(&lookup).flush_size(),
            ..Default::default()
        };

        if let Some(value) = lookup("TASKEXPORT_FLUSH_SIZE") {
            config.flush_size = parse_setting("TASKEXPORT_FLUSH_SIZE", &value)?;
        }
        if let Some(value) = lookup("TASKEXPORT_STAGING_DIR") {
            if !value.trim().is_empty() {
                config.staging_dir = Some(PathBuf::from(value));
            }
        }
        if let Some(value) = lookup("TASKEXPORT_AUTO_DISK_THRESHOLD") {
            config.auto_disk_threshold =
                Some(parse_setting("TASKEXPORT_AUTO_DISK_THRESHOLD", &value)?);
        }
        if let Some(value) = lookup("TASKEXPORT_COMPRESSION_LEVEL") {
            config.compression_level = parse_setting("TASKEXPORT_COMPRESSION_LEVEL", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_flush_size(mut self, flush_size: usize) -> Self {
        self.flush_size = flush_size;
        self
    }

    pub fn with_profile(mut self, profile: WindowProfile) -> Self {
        self.flush_size = profile.flush_size();
        self
    }

    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    pub fn with_auto_disk_threshold(mut self, rows: u64) -> Self {
        self.auto_disk_threshold = Some(rows);
        self
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn with_default_row_count(mut self, rows: u64) -> Self {
        self.default_row_count = rows;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.flush_size == 0 {
            return Err(ExportError::ConfigurationError(
                "flush size must be at least 1".to_string(),
            ));
        }
        if self.compression_level > 9 {
            return Err(ExportError::ConfigurationError(format!(
                "compression level {} is out of range 0-9",
                self.compression_level
            )));
        }
        validate_sheet_name(&self.memory_sheet_name)?;
        validate_sheet_name(&self.disk_sheet_name)?;
        Ok(())
    }
}

/// Excel limits sheet names to 31 characters and forbids `[]:*?/\`.
pub fn validate_sheet_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ExportError::ConfigurationError(
            "sheet name must not be empty".to_string(),
        ));
    }
    if name.chars().count() > 31 {
        return Err(ExportError::ConfigurationError(format!(
            "sheet name '{}' is longer than 31 characters",
            name
        )));
    }
    if let Some(c) = name.chars().find(|c| INVALID_SHEET_CHARS.contains(c)) {
        return Err(ExportError::ConfigurationError(format!(
            "sheet name '{}' contains invalid character '{}'",
            name, c
        )));
    }
    Ok(())
}

fn parse_setting<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        ExportError::ConfigurationError(format!("{} has invalid value '{}'", key, value))
    })
}
