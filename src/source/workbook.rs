//! Minimal OOXML (`.xlsx`) workbook reader.
//!
//! Only cell values are read: every cell becomes a string, shared strings and
//! inline strings are expanded, styles and formulas are ignored.

use std::collections::HashMap;
use std::io::{Read, Seek};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::{NoticeError, Result};

const KIND: &str = "spreadsheet";

/// Grid limits of the OOXML format (column `XFD`, row 1048576).
const MAX_COLUMNS: usize = 16_384;
const MAX_ROWS: usize = 1_048_576;

/// One worksheet as a grid of strings. Row 0 is the header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sheet {
    rows: Vec<Vec<String>>,
}

impl Sheet {
    #[cfg(test)]
    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        Sheet { rows }
    }

    pub fn header(&self) -> &[String] {
        self.rows.first().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Position of a header cell, compared after trimming.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header().iter().position(|h| h.trim() == name)
    }

    /// Rows after the header, skipping rows with no content at all.
    pub fn data_rows(&self) -> impl Iterator<Item = &[String]> {
        self.rows
            .iter()
            .skip(1)
            .map(Vec::as_slice)
            .filter(|row| row.iter().any(|c| !c.trim().is_empty()))
    }
}

/// Cell value at `col`, or `""` for cells past the end of a short row.
pub fn cell(row: &[String], col: usize) -> &str {
    row.get(col).map(String::as_str).unwrap_or("")
}

#[derive(Debug, Clone, Default)]
pub struct Workbook {
    sheets: Vec<(String, Sheet)>,
}

impl Workbook {
    #[cfg(test)]
    pub fn new(sheets: Vec<(String, Sheet)>) -> Self {
        Workbook { sheets }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)
            .map_err(|e| NoticeError::malformed(KIND, format!("not an OOXML workbook: {}", e)))?;

        let workbook_xml = read_entry(&mut archive, "xl/workbook.xml")?
            .ok_or_else(|| NoticeError::malformed(KIND, "missing xl/workbook.xml"))?;
        let rels_xml = read_entry(&mut archive, "xl/_rels/workbook.xml.rels")?
            .ok_or_else(|| NoticeError::malformed(KIND, "missing workbook relationships"))?;
        let shared = match read_entry(&mut archive, "xl/sharedStrings.xml")? {
            Some(xml) => parse_shared_strings(&xml)?,
            None => Vec::new(),
        };

        let targets = parse_relationships(&rels_xml)?;
        let mut sheets = Vec::new();
        for (name, rel_id) in parse_sheet_list(&workbook_xml)? {
            let target = targets.get(&rel_id).ok_or_else(|| {
                NoticeError::malformed(KIND, format!("sheet '{}' has no relationship target", name))
            })?;
            let xml = read_entry(&mut archive, target)?.ok_or_else(|| {
                NoticeError::malformed(KIND, format!("sheet '{}' points at missing part {}", name, target))
            })?;
            sheets.push((name, parse_sheet(&xml, &shared)?));
        }

        Ok(Workbook { sheets })
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, sheet)| sheet)
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(|(n, _)| n.as_str())
    }
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Option<String>> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(NoticeError::malformed(KIND, e)),
    };
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    Ok(Some(content))
}

fn xml_error(e: impl std::fmt::Display) -> NoticeError {
    NoticeError::malformed(KIND, e)
}

fn attr(e: &BytesStart, local: &[u8]) -> Result<Option<String>> {
    for a in e.attributes() {
        let a = a.map_err(xml_error)?;
        if a.key.local_name().as_ref() == local {
            return Ok(Some(a.unescape_value().map_err(xml_error)?.into_owned()));
        }
    }
    Ok(None)
}

/// `(sheet name, relationship id)` pairs in workbook order.
fn parse_sheet_list(xml: &str) -> Result<Vec<(String, String)>> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut sheets = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.name().local_name().as_ref() == b"sheet" =>
            {
                if let (Some(name), Some(rel)) = (attr(e, b"name")?, attr(e, b"id")?) {
                    sheets.push((name, rel));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(sheets)
}

/// Relationship id → archive path of the part it targets.
fn parse_relationships(xml: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut targets = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.name().local_name().as_ref() == b"Relationship" =>
            {
                if let (Some(id), Some(target)) = (attr(e, b"Id")?, attr(e, b"Target")?) {
                    let path = match target.strip_prefix('/') {
                        Some(absolute) => absolute.to_string(),
                        None => format!("xl/{}", target),
                    };
                    targets.insert(id, path);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(targets)
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    // phonetic runs repeat the text as a reading aid
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"rPh" => in_phonetic = true,
                b"t" => in_text = !in_phonetic,
                _ => {}
            },
            Ok(Event::Empty(ref e)) if e.name().local_name().as_ref() == b"si" => {
                strings.push(String::new());
            }
            Ok(Event::Text(ref e)) if in_text => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&e.unescape().map_err(xml_error)?);
                }
            }
            Ok(Event::End(ref e)) => match e.name().local_name().as_ref() {
                b"si" => strings.extend(current.take()),
                b"rPh" => in_phonetic = false,
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Zero-based column index of a cell reference such as `AB12`.
///
/// `None` when the reference has no column letters; an error past column `XFD`.
fn column_index(reference: &str) -> Result<Option<usize>> {
    let mut n = 0usize;
    let mut seen = false;
    for c in reference.chars().take_while(char::is_ascii_alphabetic) {
        seen = true;
        n = n * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
        if n > MAX_COLUMNS {
            return Err(NoticeError::malformed(
                KIND,
                format!("cell reference '{}' is past the last column", reference),
            ));
        }
    }
    Ok(seen.then(|| n - 1))
}

fn check_column(col: usize) -> Result<usize> {
    if col >= MAX_COLUMNS {
        return Err(NoticeError::malformed(KIND, "row has more cells than the last column"));
    }
    Ok(col)
}

fn check_row(row: usize) -> Result<usize> {
    if row >= MAX_ROWS {
        return Err(NoticeError::malformed(
            KIND,
            format!("row {} is past the last row", row + 1),
        ));
    }
    Ok(row)
}

struct PendingCell {
    col: usize,
    kind: String,
    value: String,
}

fn parse_sheet(xml: &str, shared: &[String]) -> Result<Sheet> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row_idx = 0usize;
    let mut next_row = 0usize;
    let mut next_col = 0usize;
    let mut cell: Option<PendingCell> = None;
    let mut in_value = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().local_name().as_ref() {
                b"row" => {
                    row_idx = check_row(row_number(e)?.unwrap_or(next_row))?;
                    next_row = row_idx + 1;
                    next_col = 0;
                }
                b"c" => {
                    let col = match attr(e, b"r")? {
                        Some(r) => column_index(&r)?.unwrap_or(next_col),
                        None => next_col,
                    };
                    let col = check_column(col)?;
                    next_col = col + 1;
                    cell = Some(PendingCell {
                        col,
                        kind: attr(e, b"t")?.unwrap_or_default(),
                        value: String::new(),
                    });
                }
                b"v" | b"t" => in_value = cell.is_some(),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.name().local_name().as_ref() {
                b"row" => {
                    row_idx = check_row(row_number(e)?.unwrap_or(next_row))?;
                    next_row = row_idx + 1;
                }
                b"c" => {
                    let col = match attr(e, b"r")? {
                        Some(r) => column_index(&r)?.unwrap_or(next_col),
                        None => next_col,
                    };
                    next_col = check_column(col)? + 1;
                }
                _ => {}
            },
            Ok(Event::Text(ref e)) if in_value => {
                if let Some(c) = cell.as_mut() {
                    c.value.push_str(&e.unescape().map_err(xml_error)?);
                }
            }
            Ok(Event::End(ref e)) => match e.name().local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let Some(c) = cell.take() {
                        let value = cell_value(&c, shared)?;
                        if rows.len() <= row_idx {
                            rows.resize_with(row_idx + 1, Vec::new);
                        }
                        let row = &mut rows[row_idx];
                        if row.len() <= c.col {
                            row.resize(c.col + 1, String::new());
                        }
                        row[c.col] = value;
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(Sheet { rows })
}

fn row_number(e: &BytesStart) -> Result<Option<usize>> {
    Ok(attr(e, b"r")?
        .and_then(|r| r.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .map(|n| n - 1))
}

fn cell_value(cell: &PendingCell, shared: &[String]) -> Result<String> {
    match cell.kind.as_str() {
        "s" => {
            let idx: usize = cell.value.trim().parse().map_err(|_| {
                NoticeError::malformed(KIND, format!("bad shared string index '{}'", cell.value))
            })?;
            shared.get(idx).cloned().ok_or_else(|| {
                NoticeError::malformed(KIND, format!("shared string {} out of range", idx))
            })
        }
        "b" => Ok(if cell.value.trim() == "1" { "TRUE" } else { "FALSE" }.to_string()),
        _ => Ok(cell.value.clone()),
    }
}

/// Builds `.xlsx` bytes for tests. Every cell is stored as a shared string.
#[cfg(test)]
pub(crate) fn build_xlsx(sheets: &[(&str, Vec<Vec<&str>>)]) -> Vec<u8> {
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    fn esc(s: &str) -> String {
        s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
    }

    let mut shared: Vec<String> = Vec::new();
    let mut sheet_parts = Vec::new();
    for (_, rows) in sheets {
        let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#);
        for (r, row) in rows.iter().enumerate() {
            xml.push_str(&format!(r#"<row r="{}">"#, r + 1));
            for (c, value) in row.iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                let col = (b'A' + c as u8) as char;
                shared.push(esc(value));
                xml.push_str(&format!(
                    r#"<c r="{}{}" t="s"><v>{}</v></c>"#,
                    col,
                    r + 1,
                    shared.len() - 1
                ));
            }
            xml.push_str("</row>");
        }
        xml.push_str("</sheetData></worksheet>");
        sheet_parts.push(xml);
    }

    let mut workbook = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#);
    let mut rels = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#);
    for (i, (name, _)) in sheets.iter().enumerate() {
        workbook.push_str(&format!(
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            esc(name),
            i + 1,
            i + 1
        ));
        rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{}.xml"/>"#,
            i + 1,
            i + 1
        ));
    }
    workbook.push_str("</sheets></workbook>");
    rels.push_str("</Relationships>");

    let mut sst = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#);
    for s in &shared {
        sst.push_str(&format!("<si><t xml:space=\"preserve\">{}</t></si>", s));
    }
    sst.push_str("</sst>");

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    let mut put = |name: &str, body: &str| {
        zip.start_file(name, options).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    };
    put("xl/workbook.xml", &workbook);
    put("xl/_rels/workbook.xml.rels", &rels);
    put("xl/sharedStrings.xml", &sst);
    for (i, part) in sheet_parts.iter().enumerate() {
        put(&format!("xl/worksheets/sheet{}.xml", i + 1), part);
    }
    zip.finish().unwrap().into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_column_index() {
        assert_eq!(column_index("A1").unwrap(), Some(0));
        assert_eq!(column_index("Z9").unwrap(), Some(25));
        assert_eq!(column_index("AA10").unwrap(), Some(26));
        assert_eq!(column_index("XFD1").unwrap(), Some(MAX_COLUMNS - 1));
        assert_eq!(column_index("12").unwrap(), None);
    }

    #[test]
    fn test_column_past_grid_is_malformed() {
        assert!(matches!(column_index("XFE1"), Err(NoticeError::Malformed { .. })));
        // long enough to overflow usize if folded unchecked
        assert!(column_index("ABCDEFGHIJKLMNOPQRSTUVWXYZ1").is_err());

        let xml = r#"<worksheet><sheetData><row r="1"><c r="ABCDEFGHIJKLMNOP1"><v>x</v></c></row></sheetData></worksheet>"#;
        assert!(matches!(parse_sheet(xml, &[]), Err(NoticeError::Malformed { .. })));
    }

    #[test]
    fn test_row_past_grid_is_malformed() {
        let xml = r#"<worksheet><sheetData><row r="99999999"><c r="A99999999"><v>x</v></c></row></sheetData></worksheet>"#;
        assert!(matches!(parse_sheet(xml, &[]), Err(NoticeError::Malformed { .. })));

        let empty_row = r#"<worksheet><sheetData><row r="1048577"/></sheetData></worksheet>"#;
        assert!(parse_sheet(empty_row, &[]).is_err());

        let last = r#"<worksheet><sheetData><row r="3"><c r="XFD3"><v>edge</v></c></row></sheetData></worksheet>"#;
        let sheet = parse_sheet(last, &[]).unwrap();
        let rows: Vec<&[String]> = sheet.data_rows().collect();
        assert_eq!(cell(rows[0], MAX_COLUMNS - 1), "edge");
    }

    #[test]
    fn test_round_trip_through_zip() {
        let bytes = build_xlsx(&[
            ("Document Info", vec![vec!["Document Name", "Creator"], vec!["Doc & Co", ""]]),
            ("Package Info", vec![vec!["Package Name"], vec!["glibc"], vec![""], vec!["saxon"]]),
        ]);
        let wb = Workbook::from_reader(Cursor::new(bytes)).unwrap();

        let names: Vec<&str> = wb.sheet_names().collect();
        assert_eq!(names, vec!["Document Info", "Package Info"]);

        let doc = wb.sheet("Document Info").unwrap();
        assert_eq!(doc.column("Creator"), Some(1));
        let rows: Vec<&[String]> = doc.data_rows().collect();
        assert_eq!(cell(rows[0], 0), "Doc & Co");
        assert_eq!(cell(rows[0], 1), "");

        // the blank middle row is skipped
        let pkgs = wb.sheet("Package Info").unwrap();
        let names: Vec<&str> = pkgs.data_rows().map(|r| cell(r, 0)).collect();
        assert_eq!(names, vec!["glibc", "saxon"]);
    }

    #[test]
    fn test_inline_numeric_and_boolean_cells() {
        let xml = r#"<worksheet><sheetData>
            <row r="1"><c r="A1" t="inlineStr"><is><t>Version</t></is></c><c r="C1" t="b"><v>1</v></c></row>
            <row r="3"><c t="n"><v>1.2</v></c><c><v>7</v></c></row>
        </sheetData></worksheet>"#;
        let sheet = parse_sheet(xml, &[]).unwrap();
        assert_eq!(sheet.header(), &["Version".to_string(), String::new(), "TRUE".to_string()]);
        let rows: Vec<&[String]> = sheet.data_rows().collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(cell(rows[0], 0), "1.2");
        assert_eq!(cell(rows[0], 1), "7");
    }

    #[test]
    fn test_shared_strings_skip_phonetic_runs() {
        let xml = r#"<sst><si><r><t>Apache</t></r><r><t xml:space="preserve"> License</t></r></si><si/><si><t>漢字</t><rPh><t>かんじ</t></rPh></si></sst>"#;
        let strings = parse_shared_strings(xml).unwrap();
        assert_eq!(strings, vec!["Apache License", "", "漢字"]);
    }

    #[test]
    fn test_not_a_zip_is_malformed() {
        let err = Workbook::from_reader(Cursor::new(b"\xD0\xCF\x11\xE0legacy".to_vec())).unwrap_err();
        assert!(matches!(err, NoticeError::Malformed { .. }));
    }
}
