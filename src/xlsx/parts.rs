//! Package parts that do not depend on row data
//!
//! A unit-task export is always a single-sheet workbook, so sheet numbering
//! is fixed at `sheet1`.

use super::xml_writer::{XmlWriter, RELATIONSHIPS_NS, SPREADSHEET_NS};
use crate::error::Result;
use chrono::{DateTime, SecondsFormat, Utc};

pub const WORKSHEET_PART: &str = "xl/worksheets/sheet1.xml";
pub const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

/// A named part and its serialized body
#[derive(Debug, Clone)]
pub struct Part {
    pub name: &'static str,
    pub body: Vec<u8>,
}

/// Every part besides the worksheet and the shared strings table.
pub fn package_parts(sheet_name: &str, created: DateTime<Utc>) -> Result<Vec<Part>> {
    Ok(vec![
        Part {
            name: "[Content_Types].xml",
            body: CONTENT_TYPES.as_bytes().to_vec(),
        },
        Part {
            name: "_rels/.rels",
            body: ROOT_RELS.as_bytes().to_vec(),
        },
        Part {
            name: "docProps/core.xml",
            body: core_props(created).into_bytes(),
        },
        Part {
            name: "docProps/app.xml",
            body: APP_PROPS.as_bytes().to_vec(),
        },
        Part {
            name: "xl/workbook.xml",
            body: workbook_xml(sheet_name)?,
        },
        Part {
            name: "xl/_rels/workbook.xml.rels",
            body: WORKBOOK_RELS.as_bytes().to_vec(),
        },
        Part {
            name: "xl/styles.xml",
            body: STYLES.as_bytes().to_vec(),
        },
    ])
}

/// Shared strings part with no entries, for inline-string worksheets
pub const EMPTY_SHARED_STRINGS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="0" uniqueCount="0"/>"#;

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>
<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>
<Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>
<Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/>
</Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>
<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties" Target="docProps/app.xml"/>
</Relationships>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>
</Relationships>"#;

const APP_PROPS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties">
<Application>taskexport</Application>
<DocSecurity>0</DocSecurity>
<ScaleCrop>false</ScaleCrop>
<LinksUpToDate>false</LinksUpToDate>
<SharedDoc>false</SharedDoc>
<HyperlinksChanged>false</HyperlinksChanged>
</Properties>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<fonts count="1">
<font><sz val="11"/><name val="Calibri"/></font>
</fonts>
<fills count="2">
<fill><patternFill patternType="none"/></fill>
<fill><patternFill patternType="gray125"/></fill>
</fills>
<borders count="1">
<border><left/><right/><top/><bottom/><diagonal/></border>
</borders>
<cellStyleXfs count="1">
<xf numFmtId="0" fontId="0" fillId="0" borderId="0"/>
</cellStyleXfs>
<cellXfs count="1">
<xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>
</cellXfs>
</styleSheet>"#;

fn core_props(created: DateTime<Utc>) -> String {
    let stamp = created.to_rfc3339_opts(SecondsFormat::Secs, true);
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
<dc:creator>taskexport</dc:creator>
<dcterms:created xsi:type="dcterms:W3CDTF">{stamp}</dcterms:created>
<dcterms:modified xsi:type="dcterms:W3CDTF">{stamp}</dcterms:modified>
</cp:coreProperties>"#
    )
}

fn workbook_xml(sheet_name: &str) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(512);
    let mut xml = XmlWriter::new(&mut out);

    xml.prolog()?;
    xml.open(
        "workbook",
        &[("xmlns", SPREADSHEET_NS), ("xmlns:r", RELATIONSHIPS_NS)],
    )?;
    xml.open("sheets", &[])?;
    xml.empty(
        "sheet",
        &[("name", sheet_name), ("sheetId", "1"), ("r:id", "rId1")],
    )?;
    xml.close("sheets")?;
    xml.close("workbook")?;
    xml.flush()?;
    drop(xml);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_parts() {
        let parts = package_parts("Data", Utc::now()).unwrap();
        let names: Vec<&str> = parts.iter().map(|p| p.name).collect();
        assert!(names.contains(&"[Content_Types].xml"));
        assert!(names.contains(&"xl/workbook.xml"));
        assert!(names.contains(&"xl/styles.xml"));
        assert!(!names.contains(&WORKSHEET_PART));
    }

    #[test]
    fn test_sheet_name_is_escaped() {
        let xml = String::from_utf8(workbook_xml("R&D").unwrap()).unwrap();
        assert!(xml.contains("<sheet name=\"R&amp;D\" sheetId=\"1\" r:id=\"rId1\"/>"));
    }

    #[test]
    fn test_core_props_timestamp() {
        let at = DateTime::parse_from_rfc3339("2024-05-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(core_props(at).contains(">2024-05-01T08:00:00Z</dcterms:created>"));
    }
}
