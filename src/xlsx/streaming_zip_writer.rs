//! Forward-only ZIP writer that compresses entries on the fly
//!
//! Every entry is written with a trailing data descriptor (general purpose
//! flag bit 3), so the CRC and sizes never have to be patched into the local
//! header afterwards. Offsets for the central directory come from counting
//! bytes, which lets the container go straight to a socket or HTTP body that
//! cannot seek.

use crate::error::{ExportError, Result};
use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use crc32fast::Hasher as Crc32;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::Write;

const LOCAL_FILE_HEADER: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];
const DATA_DESCRIPTOR: [u8; 4] = [0x50, 0x4b, 0x07, 0x08];
const CENTRAL_DIRECTORY_HEADER: [u8; 4] = [0x50, 0x4b, 0x01, 0x02];
const END_OF_CENTRAL_DIRECTORY: [u8; 4] = [0x50, 0x4b, 0x05, 0x06];
const VERSION: [u8; 2] = [20, 0];
const FLAG_DATA_DESCRIPTOR: [u8; 2] = [8, 0];
const METHOD_DEFLATE: [u8; 2] = [8, 0];

/// Entry already written, kept for the central directory
struct ZipEntry {
    name: String,
    local_header_offset: u64,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
}

/// Writer that counts bytes on their way to the sink
struct CountingWriter<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

struct OpenEntry<W: Write> {
    name: String,
    local_header_offset: u64,
    data_offset: u64,
    crc: Crc32,
    uncompressed: u64,
    encoder: DeflateEncoder<CountingWriter<W>>,
}

/// Streaming ZIP writer over any `Write` sink
pub struct StreamingZipWriter<W: Write> {
    // `None` while an open entry's encoder owns the sink
    output: Option<CountingWriter<W>>,
    current: Option<OpenEntry<W>>,
    entries: Vec<ZipEntry>,
    compression: Compression,
    dos_time: u16,
    dos_date: u16,
}

impl<W: Write> StreamingZipWriter<W> {
    pub fn new(sink: W, compression_level: u32) -> Self {
        let (dos_time, dos_date) = dos_timestamp(Local::now().naive_local());
        StreamingZipWriter {
            output: Some(CountingWriter {
                inner: sink,
                written: 0,
            }),
            current: None,
            entries: Vec::new(),
            compression: Compression::new(compression_level.min(9)),
            dos_time,
            dos_date,
        }
    }

    /// Start a new entry; the previous one, if any, is finished first.
    pub fn start_entry(&mut self, name: &str) -> Result<()> {
        self.finish_current_entry()?;

        let mut output = self.take_output()?;
        let local_header_offset = output.written;

        output.write_all(&LOCAL_FILE_HEADER)?;
        output.write_all(&VERSION)?;
        output.write_all(&FLAG_DATA_DESCRIPTOR)?;
        output.write_all(&METHOD_DEFLATE)?;
        output.write_all(&self.dos_time.to_le_bytes())?;
        output.write_all(&self.dos_date.to_le_bytes())?;
        output.write_all(&0u32.to_le_bytes())?; // crc32, in descriptor
        output.write_all(&0u32.to_le_bytes())?; // compressed size, in descriptor
        output.write_all(&0u32.to_le_bytes())?; // uncompressed size, in descriptor
        output.write_all(&(name.len() as u16).to_le_bytes())?;
        output.write_all(&0u16.to_le_bytes())?; // extra len
        output.write_all(name.as_bytes())?;

        self.current = Some(OpenEntry {
            name: name.to_string(),
            local_header_offset,
            data_offset: output.written,
            crc: Crc32::new(),
            uncompressed: 0,
            encoder: DeflateEncoder::new(output, self.compression),
        });
        Ok(())
    }

    /// Write uncompressed bytes into the current entry
    pub fn write_data(&mut self, data: &[u8]) -> Result<()> {
        let entry = self.current.as_mut().ok_or_else(|| {
            ExportError::SerializationFailure("no zip entry started".to_string())
        })?;
        entry.crc.update(data);
        entry.uncompressed += data.len() as u64;
        entry.encoder.write_all(data)?;
        Ok(())
    }

    /// Convenience: one entry with the full contents
    pub fn write_entry(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.start_entry(name)?;
        self.write_data(data)
    }

    fn finish_current_entry(&mut self) -> Result<()> {
        let Some(entry) = self.current.take() else {
            return Ok(());
        };

        let mut output = entry.encoder.finish()?;
        let crc32 = entry.crc.finalize();
        let compressed_size = output.written - entry.data_offset;
        let uncompressed_size = entry.uncompressed;

        if compressed_size > u32::MAX as u64 || uncompressed_size > u32::MAX as u64 {
            return Err(ExportError::SerializationFailure(format!(
                "entry '{}' exceeds 4 GiB; zip64 is not supported",
                entry.name
            )));
        }

        output.write_all(&DATA_DESCRIPTOR)?;
        output.write_all(&crc32.to_le_bytes())?;
        output.write_all(&(compressed_size as u32).to_le_bytes())?;
        output.write_all(&(uncompressed_size as u32).to_le_bytes())?;

        self.entries.push(ZipEntry {
            name: entry.name,
            local_header_offset: entry.local_header_offset,
            crc32,
            compressed_size,
            uncompressed_size,
        });
        self.output = Some(output);
        Ok(())
    }

    /// Write the central directory and hand back the sink with the total
    /// number of bytes written to it.
    pub fn finish(mut self) -> Result<(W, u64)> {
        self.finish_current_entry()?;

        let mut output = self.take_output()?;
        let central_dir_offset = output.written;
        if central_dir_offset > u32::MAX as u64 {
            return Err(ExportError::SerializationFailure(
                "archive exceeds 4 GiB; zip64 is not supported".to_string(),
            ));
        }

        for entry in &self.entries {
            output.write_all(&CENTRAL_DIRECTORY_HEADER)?;
            output.write_all(&VERSION)?; // version made by
            output.write_all(&VERSION)?; // version needed
            output.write_all(&FLAG_DATA_DESCRIPTOR)?;
            output.write_all(&METHOD_DEFLATE)?;
            output.write_all(&self.dos_time.to_le_bytes())?;
            output.write_all(&self.dos_date.to_le_bytes())?;
            output.write_all(&entry.crc32.to_le_bytes())?;
            output.write_all(&(entry.compressed_size as u32).to_le_bytes())?;
            output.write_all(&(entry.uncompressed_size as u32).to_le_bytes())?;
            output.write_all(&(entry.name.len() as u16).to_le_bytes())?;
            output.write_all(&0u16.to_le_bytes())?; // extra len
            output.write_all(&0u16.to_le_bytes())?; // comment len
            output.write_all(&0u16.to_le_bytes())?; // disk number start
            output.write_all(&0u16.to_le_bytes())?; // internal attrs
            output.write_all(&0u32.to_le_bytes())?; // external attrs
            output.write_all(&(entry.local_header_offset as u32).to_le_bytes())?;
            output.write_all(entry.name.as_bytes())?;
        }

        let central_dir_size = output.written - central_dir_offset;

        output.write_all(&END_OF_CENTRAL_DIRECTORY)?;
        output.write_all(&0u16.to_le_bytes())?; // disk number
        output.write_all(&0u16.to_le_bytes())?; // disk with central dir
        output.write_all(&(self.entries.len() as u16).to_le_bytes())?;
        output.write_all(&(self.entries.len() as u16).to_le_bytes())?;
        output.write_all(&(central_dir_size as u32).to_le_bytes())?;
        output.write_all(&(central_dir_offset as u32).to_le_bytes())?;
        output.write_all(&0u16.to_le_bytes())?; // comment len
        output.flush()?;

        Ok((output.inner, output.written))
    }

    fn take_output(&mut self) -> Result<CountingWriter<W>> {
        self.output.take().ok_or_else(|| {
            ExportError::SerializationFailure(
                "zip writer lost its sink after an earlier failure".to_string(),
            )
        })
    }
}

/// MS-DOS (time, date) pair; years before 1980 are clamped.
fn dos_timestamp(at: NaiveDateTime) -> (u16, u16) {
    let time = (at.hour() << 11) | (at.minute() << 5) | (at.second() / 2);
    let year = (at.year().clamp(1980, 2107) - 1980) as u32;
    let date = (year << 9) | (at.month() << 5) | at.day();
    (time as u16, date as u16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    /// Sink that can only append
    struct AppendOnly(Vec<u8>);

    impl Write for AppendOnly {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.write(buf)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_archive_readable_by_zip_crate() {
        let mut zip = StreamingZipWriter::new(AppendOnly(Vec::new()), 6);
        zip.write_entry("a.txt", b"hello").unwrap();
        zip.start_entry("dir/b.txt").unwrap();
        zip.write_data(b"wor").unwrap();
        zip.write_data(b"ld").unwrap();
        let (sink, written) = zip.finish().unwrap();
        assert_eq!(written as usize, sink.0.len());

        let mut archive = zip::ZipArchive::new(Cursor::new(sink.0)).unwrap();
        assert_eq!(archive.len(), 2);

        let mut text = String::new();
        archive
            .by_name("dir/b.txt")
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "world");
    }

    #[test]
    fn test_write_without_entry_fails() {
        let mut zip = StreamingZipWriter::new(Vec::new(), 6);
        assert!(matches!(
            zip.write_data(b"x"),
            Err(ExportError::SerializationFailure(_))
        ));
    }

    #[test]
    fn test_dos_timestamp() {
        let at = chrono::NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(10, 30, 20)
            .unwrap();
        let (time, date) = dos_timestamp(at);
        assert_eq!(time, (10 << 11) | (30 << 5) | 10);
        assert_eq!(date, ((2024 - 1980) << 9) | (3 << 5) | 15);
    }
}
