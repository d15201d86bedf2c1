// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Forward only row reader over the serialized worksheet part.
//!
//! The reader never decodes the whole sheet: it pulls `<row>` elements one
//! at a time from the part bytes, or from the temporary file the part was
//! spilled to. Rows missing from the part are reported as empty.

use std::io::BufRead;
use std::sync::Arc;

use log::debug;
use quick_xml::events::Event;
use quick_xml::name::QName;
use quick_xml::Reader;

use crate::cache::Handle;
use crate::coordinates::{cell_name_to_coordinates, coordinates_to_cell_name};
use crate::errors::{Error, Result};
use crate::format::ValueFormatter;
use crate::shared_strings::SharedStrings;
use crate::utils::parse_u32;
use crate::worksheet::CellType;
use crate::xml::{get_attribute, read_string, read_text, skip_element, xml_reader};
use crate::Workbook;

type PartReader = Reader<Box<dyn BufRead + Send>>;

/// A `<c>` as read from the part, value unresolved
#[derive(Debug)]
struct RawCell {
    col: u32,
    style: u32,
    t: CellType,
    v: String,
    inline: Option<String>,
    has_formula: bool,
}

#[derive(Debug)]
struct RawRow {
    r: u32,
    cells: Vec<RawCell>,
}

fn parse_number(v: &[u8]) -> Result<u32> {
    Ok(std::str::from_utf8(v)?.parse()?)
}

/// Highest row number of a worksheet part, rows without `r` following
/// the previous one
fn scan_total_rows(mut xml: PartReader) -> Result<u32> {
    let mut buf = Vec::with_capacity(1024);
    let mut row = 0;
    let mut total = 0;
    loop {
        buf.clear();
        match xml.read_event_into(&mut buf)? {
            Event::Start(ref e) if e.local_name().as_ref() == b"row" => {
                row = match get_attribute(e.attributes(), QName(b"r"))? {
                    Some(r) => parse_number(&r)?,
                    None => row + 1,
                };
                total = total.max(row);
            }
            Event::End(ref e) if e.local_name().as_ref() == b"sheetData" => return Ok(total),
            Event::Eof => return Ok(total),
            _ => (),
        }
    }
}

/// Pull parser over the `<row>` elements of a part
struct RowReader {
    xml: PartReader,
    buf: Vec<u8>,
    inner: Vec<u8>,
    last_row: u32,
}

impl RowReader {
    /// Positions the parser inside `<sheetData>`, `None` when the part has
    /// none
    fn new(mut xml: PartReader) -> Result<Option<RowReader>> {
        let mut buf = Vec::with_capacity(1024);
        loop {
            buf.clear();
            match xml.read_event_into(&mut buf)? {
                Event::Start(ref e) if e.local_name().as_ref() == b"sheetData" => break,
                Event::Eof => return Ok(None),
                _ => (),
            }
        }
        Ok(Some(RowReader {
            xml,
            buf,
            inner: Vec::with_capacity(1024),
            last_row: 0,
        }))
    }

    /// Next row of the part, `None` at the end of `<sheetData>`
    fn next_row(&mut self) -> Result<Option<RawRow>> {
        loop {
            self.buf.clear();
            match self.xml.read_event_into(&mut self.buf)? {
                Event::Start(ref e) if e.local_name().as_ref() == b"row" => {
                    let r = match get_attribute(e.attributes(), QName(b"r"))? {
                        Some(r) => parse_number(&r)?,
                        None => self.last_row + 1,
                    };
                    self.last_row = r;
                    let cells = self.read_cells()?;
                    return Ok(Some(RawRow { r, cells }));
                }
                Event::End(ref e) if e.local_name().as_ref() == b"sheetData" => return Ok(None),
                Event::Eof => return Err(Error::XmlEof("sheetData")),
                _ => (),
            }
        }
    }

    fn read_cells(&mut self) -> Result<Vec<RawCell>> {
        let mut cells = Vec::new();
        let mut col = 0;
        loop {
            self.buf.clear();
            match self.xml.read_event_into(&mut self.buf)? {
                Event::Start(ref e) if e.local_name().as_ref() == b"c" => {
                    let mut cell = RawCell {
                        col: col + 1,
                        style: 0,
                        t: CellType::Unset,
                        v: String::new(),
                        inline: None,
                        has_formula: false,
                    };
                    for a in e.attributes() {
                        let a = a?;
                        match a.key {
                            QName(b"r") => {
                                cell.col = cell_name_to_coordinates(std::str::from_utf8(&a.value)?)?.0
                            }
                            QName(b"s") => cell.style = parse_u32(&a.value).unwrap_or(0),
                            QName(b"t") => cell.t = CellType::from_attr(&a.value),
                            _ => (),
                        }
                    }
                    col = cell.col;
                    self.read_cell_body(&mut cell)?;
                    cells.push(cell);
                }
                Event::End(ref e) if e.local_name().as_ref() == b"row" => return Ok(cells),
                Event::Eof => return Err(Error::XmlEof("row")),
                _ => (),
            }
        }
    }

    fn read_cell_body(&mut self, cell: &mut RawCell) -> Result<()> {
        loop {
            self.buf.clear();
            match self.xml.read_event_into(&mut self.buf)? {
                Event::Start(ref e) => match e.local_name().as_ref() {
                    b"v" => cell.v = read_text(&mut self.xml, &mut self.inner, "v")?,
                    b"is" => cell.inline = Some(read_string(&mut self.xml, &mut self.inner, "is")?),
                    b"f" => {
                        cell.has_formula = true;
                        skip_element(&mut self.xml, &mut self.inner)?;
                    }
                    _ => skip_element(&mut self.xml, &mut self.inner)?,
                },
                Event::End(ref e) if e.local_name().as_ref() == b"c" => return Ok(()),
                Event::Eof => return Err(Error::XmlEof("c")),
                _ => (),
            }
        }
    }
}

/// Resolves and formats the value of a cell
fn cell_text(
    cell: &RawCell,
    strings: &SharedStrings,
    formatter: &dyn ValueFormatter,
    raw: bool,
) -> String {
    let value = match cell.t {
        CellType::SharedString => cell
            .v
            .parse::<usize>()
            .ok()
            .and_then(|i| strings.get(i))
            .unwrap_or(&cell.v),
        CellType::InlineString => cell.inline.as_deref().unwrap_or(&cell.v),
        _ => &cell.v,
    };
    if raw {
        value.to_string()
    } else {
        formatter.format(value, cell.style, cell.t)
    }
}

/// Streaming iterator over the rows of a worksheet.
///
/// Rows are numbered from 1 to [`total_rows`](Rows::total_rows); every
/// number is visited, including the ones missing from the part. The reader
/// is single pass.
///
/// ```no_run
/// # use sheetkit::Workbook;
/// let wb = Workbook::open("report.xlsx")?;
/// let mut rows = wb.rows("Sheet1")?;
/// while rows.advance() {
///     let cells = rows.columns()?;
///     println!("{}: {}", rows.current_row(), cells.join("\t"));
/// }
/// rows.close();
/// # Ok::<(), sheetkit::Error>(())
/// ```
pub struct Rows {
    reader: Option<RowReader>,
    cur_row: u32,
    total_rows: u32,
    /// row `cur_row` once it has been read
    current: Option<RawRow>,
    /// row read past `cur_row`, handed out when the cursor reaches it
    stash: Option<RawRow>,
    strings: Handle<SharedStrings>,
    formatter: Arc<dyn ValueFormatter>,
    raw: bool,
    closed: bool,
}

impl std::fmt::Debug for Rows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rows")
            .field("cur_row", &self.cur_row)
            .field("total_rows", &self.total_rows)
            .field("raw", &self.raw)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Rows {
    /// Number of the row the cursor is on, 0 before the first `advance`
    pub fn current_row(&self) -> u32 {
        self.cur_row
    }

    /// Highest row number of the sheet
    pub fn total_rows(&self) -> u32 {
        self.total_rows
    }

    /// Moves to the next row, returning `false` past the last one
    pub fn advance(&mut self) -> bool {
        if self.closed || self.cur_row >= self.total_rows {
            return false;
        }
        self.cur_row += 1;
        true
    }

    /// Reads rows until `current` holds row `cur_row`, or the reader has
    /// gone past it
    fn seek_current(&mut self) -> Result<()> {
        if self.current.as_ref().is_some_and(|r| r.r == self.cur_row) {
            return Ok(());
        }
        self.current = None;
        loop {
            if self.stash.is_none() {
                let Some(reader) = self.reader.as_mut() else {
                    return Ok(());
                };
                match reader.next_row()? {
                    Some(row) => self.stash = Some(row),
                    None => {
                        self.reader = None;
                        return Ok(());
                    }
                }
            }
            match self.stash.as_ref().map(|r| r.r) {
                Some(r) if r < self.cur_row => self.stash = None,
                Some(r) if r == self.cur_row => {
                    self.current = self.stash.take();
                    return Ok(());
                }
                _ => return Ok(()),
            }
        }
    }

    /// Values of the current row.
    ///
    /// Gaps between cells are filled with empty strings; trailing cells
    /// without a value or formula are left out.
    pub fn columns(&mut self) -> Result<Vec<String>> {
        if self.closed || self.cur_row == 0 {
            return Ok(Vec::new());
        }
        self.seek_current()?;
        let Some(row) = &self.current else {
            return Ok(Vec::new());
        };
        let strings = self.strings.lock();
        let mut out = Vec::new();
        for cell in &row.cells {
            let text = cell_text(cell, &strings, &*self.formatter, self.raw);
            if text.is_empty() && !cell.has_formula {
                continue;
            }
            let col = cell.col as usize;
            if out.len() >= col {
                out.truncate(col - 1);
            }
            out.resize(col - 1, String::new());
            out.push(text);
        }
        Ok(out)
    }

    /// Number of the next row present in the part after the current one,
    /// without moving the cursor
    pub fn peek_row(&mut self) -> Result<Option<u32>> {
        if self.closed {
            return Ok(None);
        }
        self.seek_current()?;
        if self.stash.is_none() {
            if let Some(reader) = self.reader.as_mut() {
                self.stash = reader.next_row()?;
            }
        }
        Ok(self.stash.as_ref().map(|r| r.r))
    }

    /// Releases the underlying reader. Calling it again does nothing.
    pub fn close(&mut self) {
        if !self.closed {
            debug!("closing row reader at row {}", self.cur_row);
        }
        self.closed = true;
        self.reader = None;
        self.current = None;
        self.stash = None;
    }
}

impl Iterator for Rows {
    type Item = Result<Vec<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.advance() {
            return None;
        }
        Some(self.columns())
    }
}

impl Workbook {
    /// Flushes pending changes of a worksheet and opens a parser on its part
    fn open_worksheet_reader(&self, sheet: &str) -> Result<(String, PartReader)> {
        let path = self.worksheet_path(sheet)?;
        if self.sheets.is_dirty(&path) {
            self.flush_sheet(&path)?;
            if let Some(handle) = self.sheets.get(&path) {
                if !self.sheets.evict_if_idle(&path, handle) {
                    debug!("{path} is in use, keeping it decoded");
                }
            }
        }
        let reader = self
            .package
            .open_reader(&path)?
            .ok_or_else(|| Error::MissingPart(path.clone()))?;
        Ok((path, xml_reader(reader)))
    }

    /// Streaming reader over the rows of a worksheet.
    ///
    /// Pending changes to the sheet are written back to the package first,
    /// so the reader sees them.
    pub fn rows(&self, sheet: &str) -> Result<Rows> {
        let (path, scan) = self.open_worksheet_reader(sheet)?;
        let total_rows = scan_total_rows(scan)?;
        let (_, xml) = self.open_worksheet_reader(sheet)?;
        debug!("streaming {path}, {total_rows} rows");
        Ok(Rows {
            reader: RowReader::new(xml)?,
            cur_row: 0,
            total_rows,
            current: None,
            stash: None,
            strings: self.shared_strings_part()?,
            formatter: self.formatter(),
            raw: self.options.raw_cell_value,
            closed: false,
        })
    }

    /// Every row of a worksheet as formatted strings.
    ///
    /// Rows are indexed from 0 for row 1; trailing empty rows are dropped.
    pub fn get_rows(&self, sheet: &str) -> Result<Vec<Vec<String>>> {
        let mut rows = self.rows(sheet)?;
        let mut out = Vec::new();
        let mut last = 0;
        while rows.advance() {
            let row = rows.columns()?;
            if !row.is_empty() {
                last = out.len() + 1;
            }
            out.push(row);
        }
        rows.close();
        out.truncate(last);
        Ok(out)
    }

    /// References of the cells whose formatted value equals `value`
    pub fn search_sheet(&self, sheet: &str, value: &str) -> Result<Vec<String>> {
        self.search_sheet_by(sheet, |v| v == value)
    }

    /// References of the cells whose formatted value matches `pred`, in
    /// row then column order
    pub fn search_sheet_by<F: FnMut(&str) -> bool>(&self, sheet: &str, mut pred: F) -> Result<Vec<String>> {
        let (_, xml) = self.open_worksheet_reader(sheet)?;
        let Some(mut reader) = RowReader::new(xml)? else {
            return Ok(Vec::new());
        };
        let strings = self.shared_strings_part()?;
        let formatter = self.formatter();
        let raw = self.options.raw_cell_value;
        let mut found = Vec::new();
        while let Some(row) = reader.next_row()? {
            let strings = strings.lock();
            for cell in &row.cells {
                if pred(&cell_text(cell, &strings, &*formatter, raw)) {
                    found.push(coordinates_to_cell_name(cell.col, row.r)?);
                }
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::SHEET;

    fn workbook_with(data: &str) -> Workbook {
        let wb = Workbook::new().unwrap();
        let sheet = SHEET.replace("<sheetData/>", &format!("<sheetData>{data}</sheetData>"));
        wb.package
            .store_bytes("xl/worksheets/sheet1.xml", sheet.into_bytes());
        wb
    }

    #[test]
    fn missing_rows_are_empty() {
        let wb = workbook_with(
            r#"<row r="2"><c r="B2"><v>1</v></c><c r="D2" t="inlineStr"><is><t>x</t></is></c></row><row r="4"><c r="A4" s="1"/></row><row><c><v>0.30000000000000004</v></c></row>"#,
        );
        let mut rows = wb.rows("Sheet1").unwrap();
        assert_eq!(rows.total_rows(), 5);
        let all: Vec<_> = rows.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(
            all,
            [
                vec![],
                vec!["".to_string(), "1".into(), "".into(), "x".into()],
                vec![],
                vec![],
                vec!["0.3".to_string()],
            ]
        );
        assert_eq!(rows.current_row(), 5);
        assert!(!rows.advance());
        rows.close();
        rows.close();
    }

    #[test]
    fn peek_does_not_move_the_cursor() {
        let wb = workbook_with(r#"<row r="3"><c r="A3"><v>3</v></c></row><row r="7"><c r="A7"><v>7</v></c></row>"#);
        let mut rows = wb.rows("Sheet1").unwrap();
        assert_eq!(rows.peek_row().unwrap(), Some(3));
        assert!(rows.advance());
        assert_eq!(rows.current_row(), 1);
        assert!(rows.columns().unwrap().is_empty());
        rows.advance();
        rows.advance();
        assert_eq!(rows.peek_row().unwrap(), Some(7));
        assert_eq!(rows.columns().unwrap(), ["3"]);
        assert_eq!(rows.columns().unwrap(), ["3"]);
        assert_eq!(rows.total_rows(), 7);
    }

    #[test]
    fn get_rows_trims_trailing_empty_rows() {
        let wb = workbook_with(r#"<row r="1"><c r="A1"><v>1</v></c></row><row r="5" ht="30" customHeight="1"/>"#);
        assert_eq!(wb.get_rows("Sheet1").unwrap(), [vec!["1".to_string()]]);
    }

    #[test]
    fn pending_changes_are_flushed_first() {
        let wb = workbook_with(r#"<row r="1"><c r="A1"><v>1</v></c></row>"#);
        wb.insert_row("Sheet1", 1).unwrap();
        assert_eq!(wb.get_rows("Sheet1").unwrap(), [vec![], vec!["1".to_string()]]);
        assert!(wb.sheets.get("xl/worksheets/sheet1.xml").is_none());
    }

    #[test]
    fn search() {
        let wb = workbook_with(
            r#"<row r="1"><c r="A1"><v>7</v></c><c r="C1"><v>8</v></c></row><row r="3"><c r="B3"><f>A1</f><v>7</v></c></row>"#,
        );
        assert_eq!(wb.search_sheet("Sheet1", "7").unwrap(), ["A1", "B3"]);
        assert!(wb.search_sheet("Sheet1", "").unwrap().is_empty());
        assert_eq!(
            wb.search_sheet_by("Sheet1", |v| v.parse::<u32>().is_ok_and(|n| n > 7))
                .unwrap(),
            ["C1"]
        );
    }
}
