// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! The calculation chain (`xl/calcChain.xml`): the order in which formula
//! cells were last computed. It is only kept consistent with structural
//! changes, never evaluated.

use std::io::{BufRead, Write};

use crate::cache::XmlPart;
use crate::coordinates::{cell_name_to_coordinates, coordinates_to_cell_name, shift_coordinate, Axis};
use crate::errors::Result;
use crate::xml::{xml_writer, XmlElement, NS_SPREADSHEETML};
use crate::{MAX_COLUMNS, MAX_ROWS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CalcEntry {
    pub r: String,
    /// sheet id, inherited from the previous entry when omitted in the part
    pub i: u32,
    pub extra: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CalcChain {
    pub entries: Vec<CalcEntry>,
}

impl CalcChain {
    /// Removes the entries of a sheet, only the one at `cell` when given
    pub fn remove(&mut self, sheet_id: u32, cell: Option<&str>) {
        self.entries
            .retain(|e| !(e.i == sheet_id && cell.is_none_or(|c| e.r == c)));
    }

    /// Follows a row or column insertion (`offset > 0`) or removal
    /// (`offset < 0`) at `num` in one sheet. Entries of removed cells go away.
    pub fn adjust(&mut self, sheet_id: u32, axis: Axis, num: u32, offset: i32) {
        self.entries.retain_mut(|e| {
            if e.i != sheet_id {
                return true;
            }
            let Ok((col, row)) = cell_name_to_coordinates(&e.r) else {
                return true;
            };
            let (value, max) = match axis {
                Axis::Rows => (row, MAX_ROWS),
                Axis::Columns => (col, MAX_COLUMNS),
            };
            if offset < 0 && value >= num && value - num < offset.unsigned_abs() {
                return false;
            }
            let Some(shifted) = shift_coordinate(value, num, offset, max) else {
                return false;
            };
            let (col, row) = match axis {
                Axis::Rows => (col, shifted),
                Axis::Columns => (shifted, row),
            };
            match coordinates_to_cell_name(col, row) {
                Ok(r) => {
                    e.r = r;
                    true
                }
                Err(_) => false,
            }
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl XmlPart for CalcChain {
    fn read<R: BufRead>(reader: R) -> Result<Self> {
        let root = XmlElement::parse(reader)?;
        let mut chain = CalcChain::default();
        let mut sheet = 0;
        for c in root.children_named("c") {
            let mut entry = CalcEntry {
                r: String::new(),
                i: sheet,
                extra: Vec::new(),
            };
            for (k, v) in &c.attrs {
                match k.as_str() {
                    "r" => entry.r = v.clone(),
                    "i" => entry.i = v.parse()?,
                    _ => entry.extra.push((k.clone(), v.clone())),
                }
            }
            sheet = entry.i;
            chain.entries.push(entry);
        }
        Ok(chain)
    }

    fn write<W: Write>(&self, writer: W) -> Result<()> {
        let mut root = XmlElement::new("calcChain").with_attr("xmlns", NS_SPREADSHEETML);
        for e in &self.entries {
            let mut c = XmlElement::new("c")
                .with_attr("r", &e.r)
                .with_attr("i", &e.i.to_string());
            c.attrs.extend(e.extra.iter().cloned());
            root.children.push(c);
        }
        let mut writer = xml_writer(writer)?;
        root.write(&mut writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAIN: &[u8] = br#"<calcChain xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><c r="B2" i="1"/><c r="B3"/><c r="A1" i="2" l="1"/></calcChain>"#;

    #[test]
    fn omitted_sheet_ids_are_inherited() {
        let chain = CalcChain::read(CHAIN).unwrap();
        assert_eq!(chain.entries.iter().map(|e| e.i).collect::<Vec<_>>(), [1, 1, 2]);
        assert_eq!(chain.entries[2].extra, [("l".to_string(), "1".to_string())]);
    }

    #[test]
    fn remove_by_sheet_and_cell() {
        let mut chain = CalcChain::read(CHAIN).unwrap();
        chain.remove(1, Some("B3"));
        assert_eq!(chain.entries.len(), 2);
        chain.remove(1, None);
        assert_eq!(chain.entries.len(), 1);
        assert_eq!(chain.entries[0].r, "A1");
    }

    #[test]
    fn adjust_follows_row_removal() {
        let mut chain = CalcChain::read(CHAIN).unwrap();
        chain.adjust(1, Axis::Rows, 2, -1);
        assert_eq!(
            chain.entries.iter().map(|e| e.r.as_str()).collect::<Vec<_>>(),
            ["B2", "A1"]
        );
        chain.adjust(2, Axis::Columns, 1, 2);
        assert_eq!(chain.entries[1].r, "C1");
    }
}
