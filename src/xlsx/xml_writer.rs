//! Element-level XML output for the SpreadsheetML parts
//!
//! Tags are written whole (`open`, `empty`, `close`) with their attributes
//! passed as name/value pairs, which is all the fixed-shape parts need.

use crate::error::Result;
use std::io::Write;

pub const SPREADSHEET_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
pub const RELATIONSHIPS_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

const SPILL_AT: usize = 4096;

/// Append `text` to `buffer` with XML escaping.
///
/// Carriage returns become `&#13;` so parsers do not fold `\r\n` into `\n`.
/// Control characters that XML 1.0 cannot carry (everything below U+0020
/// except tab, newline and carriage return) are dropped.
pub fn escape_into(buffer: &mut Vec<u8>, text: &str) {
    let mut start = 0;
    for (i, byte) in text.bytes().enumerate() {
        let replacement: &[u8] = match byte {
            b'&' => b"&amp;",
            b'<' => b"&lt;",
            b'>' => b"&gt;",
            b'"' => b"&quot;",
            b'\'' => b"&apos;",
            b'\r' => b"&#13;",
            b'\t' | b'\n' => continue,
            0x00..=0x1f => b"",
            _ => continue,
        };
        buffer.extend_from_slice(&text.as_bytes()[start..i]);
        buffer.extend_from_slice(replacement);
        start = i + 1;
    }
    buffer.extend_from_slice(&text.as_bytes()[start..]);
}

/// Whether a `<t>` element needs `xml:space="preserve"` to keep `text` intact
pub fn needs_space_preserve(text: &str) -> bool {
    text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace)
}

/// Buffers tags and text, handing them to `W` in chunks
pub struct XmlWriter<W: Write> {
    out: W,
    pending: Vec<u8>,
}

impl<W: Write> XmlWriter<W> {
    pub fn new(out: W) -> Self {
        XmlWriter {
            out,
            pending: Vec::with_capacity(2 * SPILL_AT),
        }
    }

    /// `<?xml ...?>` declaration line
    pub fn prolog(&mut self) -> Result<()> {
        self.raw(b"<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n")
    }

    /// `<name a="v" ...>`
    pub fn open(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        self.tag(name, attrs);
        self.pending.push(b'>');
        self.spill_if_full()
    }

    /// `<name a="v" .../>`
    pub fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        self.tag(name, attrs);
        self.pending.extend_from_slice(b"/>");
        self.spill_if_full()
    }

    /// `</name>`
    pub fn close(&mut self, name: &str) -> Result<()> {
        self.pending.extend_from_slice(b"</");
        self.pending.extend_from_slice(name.as_bytes());
        self.pending.push(b'>');
        self.spill_if_full()
    }

    /// Escaped character data
    pub fn text(&mut self, text: &str) -> Result<()> {
        escape_into(&mut self.pending, text);
        self.spill_if_full()
    }

    /// Bytes that are already valid markup
    pub fn raw(&mut self, markup: &[u8]) -> Result<()> {
        self.pending.extend_from_slice(markup);
        self.spill_if_full()
    }

    /// Hand everything buffered to the underlying writer and flush it.
    pub fn flush(&mut self) -> Result<()> {
        self.spill()?;
        self.out.flush()?;
        Ok(())
    }

    fn tag(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.pending.push(b'<');
        self.pending.extend_from_slice(name.as_bytes());
        for (key, value) in attrs {
            self.pending.push(b' ');
            self.pending.extend_from_slice(key.as_bytes());
            self.pending.extend_from_slice(b"=\"");
            escape_into(&mut self.pending, value);
            self.pending.push(b'"');
        }
    }

    fn spill_if_full(&mut self) -> Result<()> {
        if self.pending.len() >= SPILL_AT {
            self.spill()?;
        }
        Ok(())
    }

    fn spill(&mut self) -> Result<()> {
        if !self.pending.is_empty() {
            self.out.write_all(&self.pending)?;
            self.pending.clear();
        }
        Ok(())
    }
}
