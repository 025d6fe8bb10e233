//! Worksheet XML: the sheet prelude and per-row cell encoding

use super::shared_strings::SharedStrings;
use super::xml_writer::{
    escape_into, needs_space_preserve, XmlWriter, RELATIONSHIPS_NS, SPREADSHEET_NS,
};
use crate::error::Result;
use crate::record::ColumnSpec;
use std::io::Write;

pub const WORKSHEET_END: &[u8] = b"</sheetData></worksheet>";

/// Append the column letters for 1-based column `n` (1 -> A, 27 -> AA).
pub fn push_column_letter(buffer: &mut Vec<u8>, mut n: u32) {
    if n == 0 {
        return;
    }
    let mut tmp = [0u8; 8];
    let mut len = 0;
    while n > 0 {
        let rem = (n - 1) % 26;
        tmp[len] = b'A' + rem as u8;
        len += 1;
        n = (n - 1) / 26;
    }
    buffer.extend(tmp[..len].iter().rev());
}

pub fn column_letter(n: u32) -> String {
    let mut buf = Vec::with_capacity(3);
    push_column_letter(&mut buf, n);
    String::from_utf8(buf).unwrap_or_default()
}

/// Write everything that precedes the first `<row>`: dimension, column
/// widths and the opening `<sheetData>`.
///
/// `last_row` is the 1-based number of the final row (the header alone is 1).
pub fn write_worksheet_start<W: Write>(
    xml: &mut XmlWriter<W>,
    columns: &ColumnSpec,
    last_row: u32,
) -> Result<()> {
    xml.prolog()?;
    xml.open(
        "worksheet",
        &[("xmlns", SPREADSHEET_NS), ("xmlns:r", RELATIONSHIPS_NS)],
    )?;

    let dimension = format!(
        "A1:{}{}",
        column_letter(columns.len().max(1) as u32),
        last_row.max(1)
    );
    xml.empty("dimension", &[("ref", dimension.as_str())])?;

    if !columns.is_empty() {
        xml.open("cols", &[])?;
        for (i, column) in columns.iter().enumerate() {
            let index = (i + 1).to_string();
            let width = column.width.to_string();
            xml.empty(
                "col",
                &[
                    ("min", index.as_str()),
                    ("max", index.as_str()),
                    ("width", width.as_str()),
                    ("customWidth", "1"),
                ],
            )?;
        }
        xml.close("cols")?;
    }

    xml.open("sheetData", &[])?;
    xml.flush()
}

/// Encodes rows of text cells into `<row>` XML.
///
/// Column letters are cached after first use; a unit-task sheet only ever
/// needs A through H.
#[derive(Debug, Default)]
pub struct RowEncoder {
    letters: Vec<Vec<u8>>,
}

impl RowEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode a row with inline strings (`t="inlineStr"`), no shared table.
    pub fn encode_inline(&mut self, buffer: &mut Vec<u8>, row_number: u32, cells: &[&str]) {
        self.encode(buffer, row_number, cells, |buffer, value| {
            buffer.extend_from_slice(b" t=\"inlineStr\"><is>");
            push_text(buffer, value);
            buffer.extend_from_slice(b"</is></c>");
        });
    }

    /// Encode a row whose cells point into `strings` (`t="s"`).
    pub fn encode_shared(
        &mut self,
        buffer: &mut Vec<u8>,
        row_number: u32,
        cells: &[&str],
        strings: &mut SharedStrings,
    ) {
        let mut num = itoa::Buffer::new();
        self.encode(buffer, row_number, cells, |buffer, value| {
            buffer.extend_from_slice(b" t=\"s\"><v>");
            buffer.extend_from_slice(num.format(strings.intern(value)).as_bytes());
            buffer.extend_from_slice(b"</v></c>");
        });
    }

    fn encode<F>(&mut self, buffer: &mut Vec<u8>, row_number: u32, cells: &[&str], mut value: F)
    where
        F: FnMut(&mut Vec<u8>, &str),
    {
        let mut num = itoa::Buffer::new();
        let row = num.format(row_number).as_bytes().to_vec();

        buffer.extend_from_slice(b"<row r=\"");
        buffer.extend_from_slice(&row);
        buffer.extend_from_slice(b"\">");

        for (col_idx, cell) in cells.iter().enumerate() {
            buffer.extend_from_slice(b"<c r=\"");
            buffer.extend_from_slice(self.letter(col_idx));
            buffer.extend_from_slice(&row);
            buffer.push(b'"');
            value(buffer, *cell);
        }

        buffer.extend_from_slice(b"</row>");
    }

    fn letter(&mut self, col_idx: usize) -> &[u8] {
        while self.letters.len() <= col_idx {
            let mut letters = Vec::with_capacity(3);
            push_column_letter(&mut letters, self.letters.len() as u32 + 1);
            self.letters.push(letters);
        }
        &self.letters[col_idx]
    }
}

fn push_text(buffer: &mut Vec<u8>, value: &str) {
    if needs_space_preserve(value) {
        buffer.extend_from_slice(b"<t xml:space=\"preserve\">");
    } else {
        buffer.extend_from_slice(b"<t>");
    }
    escape_into(buffer, value);
    buffer.extend_from_slice(b"</t>");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letter(1), "A");
        assert_eq!(column_letter(8), "H");
        assert_eq!(column_letter(26), "Z");
        assert_eq!(column_letter(27), "AA");
        assert_eq!(column_letter(703), "AAA");
        assert_eq!(column_letter(0), "");
    }

    #[test]
    fn test_inline_row() {
        let mut encoder = RowEncoder::new();
        let mut buf = Vec::new();
        encoder.encode_inline(&mut buf, 2, &["1", "", "a<b"]);
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "<row r=\"2\">\
             <c r=\"A2\" t=\"inlineStr\"><is><t>1</t></is></c>\
             <c r=\"B2\" t=\"inlineStr\"><is><t></t></is></c>\
             <c r=\"C2\" t=\"inlineStr\"><is><t>a&lt;b</t></is></c>\
             </row>"
        );
    }

    #[test]
    fn test_shared_row() {
        let mut encoder = RowEncoder::new();
        let mut strings = SharedStrings::new();
        let mut buf = Vec::new();
        encoder.encode_shared(&mut buf, 1, &["x", "y", "x"], &mut strings);
        let xml = String::from_utf8(buf).unwrap();
        assert!(xml.contains("<c r=\"A1\" t=\"s\"><v>0</v></c>"));
        assert!(xml.contains("<c r=\"B1\" t=\"s\"><v>1</v></c>"));
        assert!(xml.contains("<c r=\"C1\" t=\"s\"><v>0</v></c>"));
        assert_eq!(strings.unique_count(), 2);
    }

    #[test]
    fn test_worksheet_start_has_widths_and_dimension() {
        let mut out = Vec::new();
        let mut xml = XmlWriter::new(&mut out);
        write_worksheet_start(&mut xml, &ColumnSpec::unit_task(), 4).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("<dimension ref=\"A1:H4\"/>"));
        assert!(text.contains("<col min=\"1\" max=\"1\" width=\"14.0625\" customWidth=\"1\"/>"));
        assert!(text.contains("<col min=\"8\" max=\"8\""));
        assert!(text.ends_with("<sheetData>"));
    }
}
