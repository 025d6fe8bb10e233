//! Shared strings table for the in-memory workbook

use super::xml_writer::{needs_space_preserve, XmlWriter, SPREADSHEET_NS};
use crate::error::Result;
use indexmap::IndexSet;
use std::io::Write;

/// Deduplicated, insertion-ordered string table (`xl/sharedStrings.xml`)
///
/// Only the bulk path uses it: the whole document is resident anyway, and
/// unit-task exports repeat level labels and departments heavily.
#[derive(Debug, Default)]
pub struct SharedStrings {
    table: IndexSet<String>,
    references: u64,
}

impl SharedStrings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `text` in the table, inserting it on first sight.
    pub fn intern(&mut self, text: &str) -> u32 {
        self.references += 1;
        let index = match self.table.get_index_of(text) {
            Some(index) => index,
            None => self.table.insert_full(text.to_owned()).0,
        };
        index as u32
    }

    pub fn unique_count(&self) -> usize {
        self.table.len()
    }

    /// Cells pointing into the table
    pub fn references(&self) -> u64 {
        self.references
    }

    pub fn write_to<W: Write>(&self, xml: &mut XmlWriter<W>) -> Result<()> {
        let mut count = itoa::Buffer::new();
        let mut unique = itoa::Buffer::new();

        xml.prolog()?;
        xml.open(
            "sst",
            &[
                ("xmlns", SPREADSHEET_NS),
                ("count", count.format(self.references)),
                ("uniqueCount", unique.format(self.table.len())),
            ],
        )?;
        for text in &self.table {
            xml.raw(b"<si>")?;
            if needs_space_preserve(text) {
                xml.open("t", &[("xml:space", "preserve")])?;
            } else {
                xml.raw(b"<t>")?;
            }
            xml.text(text)?;
            xml.raw(b"</t></si>")?;
        }
        xml.close("sst")?;
        xml.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_deduplicates() {
        let mut strings = SharedStrings::new();

        assert_eq!(strings.intern("Dept-1"), 0);
        assert_eq!(strings.intern("Level1-2"), 1);
        assert_eq!(strings.intern("Dept-1"), 0);
        assert_eq!(strings.intern(""), 2);
        assert_eq!(strings.unique_count(), 3);
        assert_eq!(strings.references(), 4);
    }

    #[test]
    fn test_table_xml() {
        let mut strings = SharedStrings::new();
        strings.intern("A&B");
        strings.intern(" padded");
        strings.intern("A&B");

        let mut out = Vec::new();
        strings.write_to(&mut XmlWriter::new(&mut out)).unwrap();
        let xml = String::from_utf8(out).unwrap();

        assert!(xml.contains("count=\"3\" uniqueCount=\"2\""));
        assert!(xml.contains("<si><t>A&amp;B</t></si>"));
        assert!(xml.contains("<si><t xml:space=\"preserve\"> padded</t></si>"));
        assert!(xml.ends_with("</sst>"));
    }
}
