// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Decoded worksheet part.
//!
//! `sheetData` and `mergeCells` are decoded into rows, cells and areas; every
//! other child of the root is kept as an [`XmlElement`] and written back in
//! schema order. Once [`normalize`](normalize::normalize) has run, rows are
//! dense (`rows[i].r == i + 1`) and every row holds one cell per column up to
//! its last referenced column.

pub(crate) mod normalize;

use std::io::{BufRead, Write};

use log::warn;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::{Decoder, Reader, Writer};

use crate::cache::XmlPart;
use crate::coordinates::{area_ref_to_coordinates, sort_coordinates, Area};
use crate::errors::{Error, Result};
use crate::utils::{format_f64, parse_bool, parse_f64, parse_u32};
use crate::xml::{attributes, read_text, skip_element, xml_reader, xml_writer, XmlElement};
use crate::MAX_ROWS;

/// Children of `<worksheet>` in the order the schema mandates
const ELEMENT_ORDER: &[&str] = &[
    "sheetPr",
    "dimension",
    "sheetViews",
    "sheetFormatPr",
    "cols",
    "sheetData",
    "sheetCalcPr",
    "sheetProtection",
    "protectedRanges",
    "scenarios",
    "autoFilter",
    "sortState",
    "dataConsolidate",
    "customSheetViews",
    "mergeCells",
    "phoneticPr",
    "conditionalFormatting",
    "dataValidations",
    "hyperlinks",
    "printOptions",
    "pageMargins",
    "pageSetup",
    "headerFooter",
    "rowBreaks",
    "colBreaks",
    "customProperties",
    "cellWatches",
    "ignoredErrors",
    "smartTags",
    "drawing",
    "legacyDrawing",
    "legacyDrawingHF",
    "drawingHF",
    "picture",
    "oleObjects",
    "controls",
    "webPublishItems",
    "tableParts",
    "extLst",
];

fn rank(name: &str) -> Option<usize> {
    ELEMENT_ORDER.iter().position(|n| *n == name)
}

/// Default height of a row, in points, when nothing else is declared
pub(crate) const DEFAULT_ROW_HEIGHT: f64 = 15.0;

/// Cell data type, the `t` attribute of a `<c>` element
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CellType {
    /// No type attribute; numeric or empty
    #[default]
    Unset,
    /// Explicit number (`n`)
    Number,
    /// Index into the shared string table (`s`)
    SharedString,
    /// Inline rich string (`inlineStr`)
    InlineString,
    /// Cached string result of a formula (`str`)
    FormulaString,
    /// Boolean (`b`)
    Bool,
    /// Error (`e`)
    Error,
    /// ISO 8601 date (`d`)
    Date,
}

impl CellType {
    pub(crate) fn from_attr(v: &[u8]) -> CellType {
        match v {
            b"n" => CellType::Number,
            b"s" => CellType::SharedString,
            b"inlineStr" => CellType::InlineString,
            b"str" => CellType::FormulaString,
            b"b" => CellType::Bool,
            b"e" => CellType::Error,
            b"d" => CellType::Date,
            _ => CellType::Unset,
        }
    }

    pub(crate) fn as_attr(self) -> Option<&'static str> {
        match self {
            CellType::Unset => None,
            CellType::Number => Some("n"),
            CellType::SharedString => Some("s"),
            CellType::InlineString => Some("inlineStr"),
            CellType::FormulaString => Some("str"),
            CellType::Bool => Some("b"),
            CellType::Error => Some("e"),
            CellType::Date => Some("d"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Cell {
    /// `A1` reference, empty until normalization assigns one
    pub r: String,
    pub s: u32,
    pub t: CellType,
    /// content of `<v>`, empty when absent
    pub v: String,
    pub f: Option<XmlElement>,
    pub is: Option<XmlElement>,
    /// other attributes (`cm`, `vm`, `ph`), verbatim
    pub extra: Vec<(String, String)>,
}

impl Cell {
    pub fn new(r: String) -> Cell {
        Cell {
            r,
            ..Default::default()
        }
    }

    /// Whether the cell carries anything worth writing
    pub fn has_value(&self) -> bool {
        self.s != 0
            || !self.v.is_empty()
            || self.f.is_some()
            || self.is.is_some()
            || self.t != CellType::Unset
            || !self.extra.is_empty()
    }

    /// Drops value, type and formula, keeping the reference and style
    pub fn clear_value(&mut self) {
        self.t = CellType::Unset;
        self.v.clear();
        self.f = None;
        self.is = None;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Row {
    /// row number, 0 when the source row had no `r`
    pub r: u32,
    pub spans: Option<String>,
    pub s: u32,
    pub custom_format: bool,
    pub ht: Option<f64>,
    pub custom_height: bool,
    pub hidden: bool,
    pub outline_level: u8,
    pub collapsed: bool,
    /// other attributes (`thickTop`, `x14ac:dyDescent`, ...), verbatim
    pub extra: Vec<(String, String)>,
    pub cells: Vec<Cell>,
}

impl Row {
    /// Whether the row must be written even without cells
    fn has_attributes(&self) -> bool {
        self.s != 0
            || self.custom_format
            || self.ht.is_some()
            || self.custom_height
            || self.hidden
            || self.outline_level != 0
            || self.collapsed
            || !self.extra.is_empty()
    }

    fn is_written(&self) -> bool {
        self.has_attributes() || self.cells.iter().any(Cell::has_value)
    }
}

/// A decoded worksheet
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Worksheet {
    /// `<worksheet>` with every child but `sheetData` and `mergeCells`
    pub root: XmlElement,
    pub rows: Vec<Row>,
    pub merges: Vec<Area>,
}

impl Worksheet {
    /// Row height declared by `sheetFormatPr`, if it is flagged custom
    pub fn custom_default_row_height(&self) -> Option<f64> {
        let pr = self.root.child("sheetFormatPr")?;
        if !pr.attr("customHeight").is_some_and(parse_bool) {
            return None;
        }
        pr.attr("defaultRowHeight")
            .and_then(|h| parse_f64(h.as_bytes()))
    }

    /// The first `sheetView`, created when missing
    pub fn sheet_view_mut(&mut self) -> &mut XmlElement {
        let views = self.ensure_child("sheetViews");
        if views.child("sheetView").is_none() {
            views
                .children
                .push(XmlElement::new("sheetView").with_attr("workbookViewId", "0"));
        }
        views.ensure_child("sheetView")
    }

    /// Whether the first sheet view is selected
    pub fn tab_selected(&self) -> bool {
        self.root
            .child("sheetViews")
            .and_then(|v| v.child("sheetView"))
            .and_then(|v| v.attr("tabSelected"))
            .is_some_and(parse_bool)
    }

    /// Root child by local name, inserted when missing
    pub fn ensure_child(&mut self, name: &str) -> &mut XmlElement {
        self.root.ensure_child(name)
    }

    pub fn cell(&self, col: u32, row: u32) -> Option<&Cell> {
        self.rows
            .get(row.checked_sub(1)? as usize)?
            .cells
            .get(col.checked_sub(1)? as usize)
    }

    /// Used range of the cells that will be written, `None` when empty
    pub fn used_area(&self) -> Option<Area> {
        let mut area: Option<Area> = None;
        for (i, row) in self.rows.iter().enumerate() {
            let mut cols = row
                .cells
                .iter()
                .enumerate()
                .filter(|(_, c)| c.has_value())
                .map(|(j, _)| j as u32 + 1);
            let Some(first) = cols.next() else {
                continue;
            };
            let last = cols.last().unwrap_or(first);
            let r = i as u32 + 1;
            let row_area = Area::new(first, r, last, r);
            area = Some(area.map_or(row_area, |a| a.union(&row_area)));
        }
        area
    }

    fn dimension_ref(&self) -> Result<String> {
        match self.used_area() {
            Some(a) if a.width() == 1 && a.height() == 1 => a.start_cell(),
            Some(a) => a.to_ref(),
            None => Ok("A1".to_string()),
        }
    }
}

fn parse_row(e: &BytesStart, decoder: Decoder) -> Result<Row> {
    let mut row = Row::default();
    for a in e.attributes() {
        let a = a?;
        match a.key {
            QName(b"r") => {
                let r = std::str::from_utf8(&a.value)?.parse::<u32>()?;
                if r > MAX_ROWS {
                    return Err(Error::RowNumber(r));
                }
                row.r = r;
            }
            QName(b"spans") => {
                row.spans = Some(a.decode_and_unescape_value(decoder)?.into_owned())
            }
            QName(b"s") => row.s = parse_u32(&a.value).unwrap_or(0),
            QName(b"customFormat") => {
                row.custom_format = parse_bool(&a.decode_and_unescape_value(decoder)?)
            }
            QName(b"ht") => row.ht = parse_f64(&a.value),
            QName(b"customHeight") => {
                row.custom_height = parse_bool(&a.decode_and_unescape_value(decoder)?)
            }
            QName(b"hidden") => {
                row.hidden = parse_bool(&a.decode_and_unescape_value(decoder)?)
            }
            QName(b"outlineLevel") => row.outline_level = parse_u32(&a.value).unwrap_or(0) as u8,
            QName(b"collapsed") => {
                row.collapsed = parse_bool(&a.decode_and_unescape_value(decoder)?)
            }
            _ => row.extra.push(key_value(&a, decoder)?),
        }
    }
    Ok(row)
}

fn key_value(a: &Attribute, decoder: Decoder) -> Result<(String, String)> {
    Ok((
        std::str::from_utf8(a.key.as_ref())?.to_string(),
        a.decode_and_unescape_value(decoder)?.into_owned(),
    ))
}

fn parse_cell<R: BufRead>(
    xml: &mut Reader<R>,
    e: &BytesStart,
    buf: &mut Vec<u8>,
    inner: &mut Vec<u8>,
) -> Result<Cell> {
    let mut cell = Cell::default();
    let decoder = xml.decoder();
    for a in e.attributes() {
        let a = a?;
        match a.key {
            QName(b"r") => cell.r = a.decode_and_unescape_value(decoder)?.into_owned(),
            QName(b"s") => cell.s = parse_u32(&a.value).unwrap_or(0),
            QName(b"t") => cell.t = CellType::from_attr(&a.value),
            _ => cell.extra.push(key_value(&a, decoder)?),
        }
    }
    loop {
        buf.clear();
        match xml.read_event_into(buf)? {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"v" => cell.v = read_text(xml, inner, "v")?,
                b"f" => cell.f = Some(XmlElement::read(xml, e, inner)?),
                b"is" => cell.is = Some(XmlElement::read(xml, e, inner)?),
                _ => skip_element(xml, inner)?,
            },
            Event::End(ref e) if e.local_name().as_ref() == b"c" => return Ok(cell),
            Event::Eof => return Err(Error::XmlEof("c")),
            _ => (),
        }
    }
}

fn parse_sheet_data<R: BufRead>(xml: &mut Reader<R>, buf: &mut Vec<u8>) -> Result<Vec<Row>> {
    let mut rows = Vec::new();
    let mut cell_buf = Vec::with_capacity(256);
    let mut inner = Vec::with_capacity(256);
    loop {
        buf.clear();
        match xml.read_event_into(buf)? {
            Event::Start(ref e) if e.local_name().as_ref() == b"row" => {
                rows.push(parse_row(e, xml.decoder())?)
            }
            Event::Start(ref e) if e.local_name().as_ref() == b"c" => {
                let cell = parse_cell(xml, e, &mut cell_buf, &mut inner)?;
                match rows.last_mut() {
                    Some(row) => row.cells.push(cell),
                    None => warn!("cell {} outside of any row, ignored", cell.r),
                }
            }
            Event::Start(_) => skip_element(xml, &mut inner)?,
            Event::End(ref e) if e.local_name().as_ref() == b"sheetData" => return Ok(rows),
            Event::Eof => return Err(Error::XmlEof("sheetData")),
            _ => (),
        }
    }
}

fn parse_merge_cells<R: BufRead>(xml: &mut Reader<R>, buf: &mut Vec<u8>) -> Result<Vec<Area>> {
    let mut merges = Vec::new();
    loop {
        buf.clear();
        match xml.read_event_into(buf)? {
            Event::Start(ref e) if e.local_name().as_ref() == b"mergeCell" => {
                for a in e.attributes() {
                    let a = a?;
                    if a.key != QName(b"ref") {
                        continue;
                    }
                    let reference = a.decode_and_unescape_value(xml.decoder())?;
                    match area_ref_to_coordinates(&reference) {
                        Ok(area) => merges.push(sort_coordinates(area)),
                        Err(e) => warn!("dropping merged cell {reference:?}: {e}"),
                    }
                }
            }
            Event::End(ref e) if e.local_name().as_ref() == b"mergeCells" => return Ok(merges),
            Event::Eof => return Err(Error::XmlEof("mergeCells")),
            _ => (),
        }
    }
}

fn write_row<W: Write>(writer: &mut Writer<W>, row: &Row) -> Result<()> {
    let mut start = BytesStart::new("row");
    start.push_attribute(("r", row.r.to_string().as_str()));
    if let Some(spans) = &row.spans {
        start.push_attribute(("spans", spans.as_str()));
    }
    if row.s != 0 {
        start.push_attribute(("s", row.s.to_string().as_str()));
    }
    if row.custom_format {
        start.push_attribute(("customFormat", "1"));
    }
    if let Some(ht) = row.ht {
        start.push_attribute(("ht", format_f64(ht).as_str()));
    }
    if row.hidden {
        start.push_attribute(("hidden", "1"));
    }
    if row.custom_height {
        start.push_attribute(("customHeight", "1"));
    }
    if row.outline_level != 0 {
        start.push_attribute(("outlineLevel", row.outline_level.to_string().as_str()));
    }
    if row.collapsed {
        start.push_attribute(("collapsed", "1"));
    }
    for (k, v) in &row.extra {
        start.push_attribute((k.as_str(), v.as_str()));
    }
    let mut cells = row.cells.iter().filter(|c| c.has_value()).peekable();
    if cells.peek().is_none() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    writer.write_event(Event::Start(start))?;
    for cell in cells {
        write_cell(writer, cell)?;
    }
    writer.write_event(Event::End(BytesEnd::new("row")))?;
    Ok(())
}

fn write_cell<W: Write>(writer: &mut Writer<W>, cell: &Cell) -> Result<()> {
    let mut start = BytesStart::new("c");
    start.push_attribute(("r", cell.r.as_str()));
    if cell.s != 0 {
        start.push_attribute(("s", cell.s.to_string().as_str()));
    }
    if let Some(t) = cell.t.as_attr() {
        start.push_attribute(("t", t));
    }
    for (k, v) in &cell.extra {
        start.push_attribute((k.as_str(), v.as_str()));
    }
    if cell.f.is_none() && cell.v.is_empty() && cell.is.is_none() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    writer.write_event(Event::Start(start))?;
    if let Some(f) = &cell.f {
        f.write(writer)?;
    }
    if !cell.v.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("v")))?;
        writer.write_event(Event::Text(BytesText::new(&cell.v)))?;
        writer.write_event(Event::End(BytesEnd::new("v")))?;
    }
    if let Some(is) = &cell.is {
        is.write(writer)?;
    }
    writer.write_event(Event::End(BytesEnd::new("c")))?;
    Ok(())
}

enum Slot<'a> {
    Element(&'a XmlElement),
    SheetData,
    MergeCells,
}

impl XmlPart for Worksheet {
    fn read<R: BufRead>(reader: R) -> Result<Self> {
        let mut xml = xml_reader(reader);
        let mut buf = Vec::with_capacity(1024);
        let mut inner = Vec::with_capacity(1024);
        let mut ws = Worksheet::default();
        let mut in_root = false;
        loop {
            buf.clear();
            match xml.read_event_into(&mut buf)? {
                Event::Start(ref e) if !in_root => {
                    ws.root.name = std::str::from_utf8(e.name().as_ref())?.to_string();
                    ws.root.attrs = attributes(e, xml.decoder())?;
                    in_root = true;
                }
                Event::Start(ref e) => match e.local_name().as_ref() {
                    b"sheetData" => ws.rows = parse_sheet_data(&mut xml, &mut inner)?,
                    b"mergeCells" => ws.merges = parse_merge_cells(&mut xml, &mut inner)?,
                    _ => ws.root.children.push(XmlElement::read(&mut xml, e, &mut inner)?),
                },
                Event::End(_) if in_root => return Ok(ws),
                Event::Eof if in_root => return Err(Error::XmlEof("worksheet")),
                Event::Eof => return Err(Error::XmlEof("root element")),
                _ => (),
            }
        }
    }

    fn write<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = xml_writer(writer)?;
        let mut slots: Vec<(usize, Slot)> = Vec::with_capacity(self.root.children.len() + 2);
        let mut last = 0;
        for child in &self.root.children {
            last = rank(child.local_name()).unwrap_or(last);
            slots.push((last, Slot::Element(child)));
        }
        slots.push((rank("sheetData").unwrap_or(0), Slot::SheetData));
        if !self.merges.is_empty() {
            slots.push((rank("mergeCells").unwrap_or(0), Slot::MergeCells));
        }
        slots.sort_by_key(|(rank, _)| *rank);

        let mut start = BytesStart::new(self.root.name.as_str());
        for (k, v) in &self.root.attrs {
            start.push_attribute((k.as_str(), v.as_str()));
        }
        writer.write_event(Event::Start(start))?;
        for (_, slot) in slots {
            match slot {
                Slot::Element(e) if e.local_name() == "dimension" => {
                    let mut dim = e.clone();
                    dim.set_attr("ref", &self.dimension_ref()?);
                    dim.write(&mut writer)?;
                }
                Slot::Element(e) => e.write(&mut writer)?,
                Slot::SheetData => {
                    let rows: Vec<&Row> = self.rows.iter().filter(|r| r.is_written()).collect();
                    if rows.is_empty() {
                        writer.write_event(Event::Empty(BytesStart::new("sheetData")))?;
                        continue;
                    }
                    writer.write_event(Event::Start(BytesStart::new("sheetData")))?;
                    for row in rows {
                        write_row(&mut writer, row)?;
                    }
                    writer.write_event(Event::End(BytesEnd::new("sheetData")))?;
                }
                Slot::MergeCells => {
                    let mut start = BytesStart::new("mergeCells");
                    start.push_attribute(("count", self.merges.len().to_string().as_str()));
                    writer.write_event(Event::Start(start))?;
                    for area in &self.merges {
                        let mut mc = BytesStart::new("mergeCell");
                        mc.push_attribute(("ref", area.to_ref()?.as_str()));
                        writer.write_event(Event::Empty(mc))?;
                    }
                    writer.write_event(Event::End(BytesEnd::new("mergeCells")))?;
                }
            }
        }
        writer.write_event(Event::End(BytesEnd::new(self.root.name.as_str())))?;
        Ok(())
    }
}
