// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Random access to cell values, formulas and styles.

use log::debug;

use crate::coordinates::{cell_name_to_coordinates, coordinates_to_cell_name, Area};
use crate::errors::Result;
use crate::shared_strings::item_text;
use crate::utils::format_f64;
use crate::worksheet::normalize::prepare_sheet_xml;
use crate::worksheet::{Cell, CellType};
use crate::xml::XmlElement;
use crate::Workbook;

/// Longest text a cell can hold, in characters
const MAX_CELL_CHARS: usize = 32767;

/// A value to write into a cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Text, stored in the shared string table
    String(String),
    /// Floating point number
    Number(f64),
    /// Integer
    Int(i64),
    /// Boolean
    Bool(bool),
    /// No value; clears the cell but keeps its style
    Empty,
}

impl From<&str> for CellValue {
    fn from(v: &str) -> CellValue {
        CellValue::String(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> CellValue {
        CellValue::String(v)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> CellValue {
        CellValue::Number(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> CellValue {
        CellValue::Int(v)
    }
}

impl From<i32> for CellValue {
    fn from(v: i32) -> CellValue {
        CellValue::Int(v.into())
    }
}

impl From<u32> for CellValue {
    fn from(v: u32) -> CellValue {
        CellValue::Int(v.into())
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> CellValue {
        CellValue::Bool(v)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> CellValue {
        v.map_or(CellValue::Empty, Into::into)
    }
}

impl Workbook {
    /// Display text of a cell: shared and inline strings resolved, then
    /// passed through the formatter unless raw values were requested
    pub(crate) fn display_value(&self, cell: &Cell) -> Result<String> {
        let value = match cell.t {
            CellType::SharedString => {
                let idx = cell.v.parse::<usize>().ok();
                let strings = self.shared_strings_part()?;
                let strings = strings.lock();
                idx.and_then(|i| strings.get(i))
                    .map_or_else(|| cell.v.clone(), str::to_string)
            }
            CellType::InlineString => match &cell.is {
                Some(is) => item_text(is),
                None => cell.v.clone(),
            },
            _ => cell.v.clone(),
        };
        if self.options.raw_cell_value {
            return Ok(value);
        }
        Ok(self.formatter().format(&value, cell.s, cell.t))
    }

    /// Formatted value of a cell, empty when the cell holds nothing
    pub fn get_cell_value(&self, sheet: &str, cell: &str) -> Result<String> {
        let (col, row) = cell_name_to_coordinates(cell)?;
        self.with_sheet(sheet, |ws| match ws.cell(col, row) {
            Some(c) => self.display_value(c),
            None => Ok(String::new()),
        })
    }

    /// Type tag of a cell, `CellType::Unset` for missing cells
    pub fn get_cell_type(&self, sheet: &str, cell: &str) -> Result<CellType> {
        let (col, row) = cell_name_to_coordinates(cell)?;
        self.with_sheet(sheet, |ws| Ok(ws.cell(col, row).map_or(CellType::Unset, |c| c.t)))
    }

    /// Runs `f` on a cell, creating it (and the rows and cells before it)
    /// when missing. Drops the calc chain entry of a formula `f` removes.
    fn update_cell<F>(&self, sheet: &str, cell: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut Cell),
    {
        let (col, row) = cell_name_to_coordinates(cell)?;
        let formula_removed = self.with_sheet_mut(sheet, |ws| {
            prepare_sheet_xml(ws, col, row)?;
            let c = &mut ws.rows[row as usize - 1].cells[col as usize - 1];
            let had_formula = c.f.is_some();
            f(c);
            Ok(had_formula && c.f.is_none())
        })?;
        if formula_removed {
            let sheet_id = self.sheet_entry(sheet)?.1.sheet_id;
            let r = coordinates_to_cell_name(col, row)?;
            self.update_calc_chain(|chain| {
                let before = chain.entries.len();
                chain.remove(sheet_id, Some(&r));
                chain.entries.len() != before
            })?;
        }
        Ok(())
    }

    /// Writes a value into a cell, replacing any value or formula it held
    ///
    /// ```no_run
    /// # use sheetkit::Workbook;
    /// let wb = Workbook::new()?;
    /// wb.set_cell_value("Sheet1", "A1", "total")?;
    /// wb.set_cell_value("Sheet1", "B1", 42)?;
    /// wb.set_cell_value("Sheet1", "C1", true)?;
    /// assert_eq!(wb.get_cell_value("Sheet1", "C1")?, "TRUE");
    /// # Ok::<(), sheetkit::Error>(())
    /// ```
    pub fn set_cell_value<V: Into<CellValue>>(&self, sheet: &str, cell: &str, value: V) -> Result<()> {
        match value.into() {
            CellValue::String(s) => self.set_cell_str(sheet, cell, &s),
            CellValue::Number(n) => self.set_cell_float(sheet, cell, n),
            CellValue::Int(i) => self.set_cell_int(sheet, cell, i),
            CellValue::Bool(b) => self.set_cell_bool(sheet, cell, b),
            CellValue::Empty => self.update_cell(sheet, cell, Cell::clear_value),
        }
    }

    /// Writes a string through the shared string table. Text longer than
    /// 32767 characters is truncated.
    pub fn set_cell_str(&self, sheet: &str, cell: &str, value: &str) -> Result<()> {
        // validate before touching the string table
        cell_name_to_coordinates(cell)?;
        self.worksheet(sheet)?;
        let value = match value.char_indices().nth(MAX_CELL_CHARS) {
            Some((end, _)) => {
                debug!("truncating {} bytes of text written to {cell}", value.len() - end);
                &value[..end]
            }
            None => value,
        };
        let idx = self.shared_strings_part()?.lock().add(value);
        self.mark_shared_strings_dirty()?;
        self.update_cell(sheet, cell, |c| {
            c.clear_value();
            c.t = CellType::SharedString;
            c.v = idx.to_string();
        })
    }

    /// Writes an integer number
    pub fn set_cell_int(&self, sheet: &str, cell: &str, value: i64) -> Result<()> {
        self.update_cell(sheet, cell, |c| {
            c.clear_value();
            c.v = value.to_string();
        })
    }

    /// Writes a float, in its shortest round-tripping form
    pub fn set_cell_float(&self, sheet: &str, cell: &str, value: f64) -> Result<()> {
        self.update_cell(sheet, cell, |c| {
            c.clear_value();
            c.v = format_f64(value);
        })
    }

    /// Writes a boolean cell (`t="b"`)
    pub fn set_cell_bool(&self, sheet: &str, cell: &str, value: bool) -> Result<()> {
        self.update_cell(sheet, cell, |c| {
            c.clear_value();
            c.t = CellType::Bool;
            c.v = if value { "1" } else { "0" }.to_string();
        })
    }

    /// Sets the formula of a cell, without a leading `=`. The cached result
    /// is dropped; an empty formula removes it.
    pub fn set_cell_formula(&self, sheet: &str, cell: &str, formula: &str) -> Result<()> {
        let formula = formula.strip_prefix('=').unwrap_or(formula);
        self.update_cell(sheet, cell, |c| {
            if formula.is_empty() {
                c.f = None;
                return;
            }
            c.v.clear();
            if c.t != CellType::FormulaString {
                c.t = CellType::Unset;
            }
            let mut f = XmlElement::new("f");
            f.text = formula.to_string();
            c.f = Some(f);
        })
    }

    /// Formula text of a cell, empty when it has none
    pub fn get_cell_formula(&self, sheet: &str, cell: &str) -> Result<String> {
        let (col, row) = cell_name_to_coordinates(cell)?;
        self.with_sheet(sheet, |ws| {
            Ok(ws
                .cell(col, row)
                .and_then(|c| c.f.as_ref())
                .map(|f| f.text.clone())
                .unwrap_or_default())
        })
    }

    /// Applies a style index to every cell of the rectangle, corners given
    /// in any order
    pub fn set_cell_style(&self, sheet: &str, top_left: &str, bottom_right: &str, style: u32) -> Result<()> {
        let (x1, y1) = cell_name_to_coordinates(top_left)?;
        let (x2, y2) = cell_name_to_coordinates(bottom_right)?;
        let area = Area::new(x1, y1, x2, y2).sorted();
        self.with_sheet_mut(sheet, |ws| {
            for row in area.y1..=area.y2 {
                prepare_sheet_xml(ws, area.x2, row)?;
                let cells = &mut ws.rows[row as usize - 1].cells;
                for c in &mut cells[area.x1 as usize - 1..area.x2 as usize] {
                    c.s = style;
                }
            }
            Ok(())
        })
    }

    /// Style index of a cell, 0 for the default style
    pub fn get_cell_style(&self, sheet: &str, cell: &str) -> Result<u32> {
        let (col, row) = cell_name_to_coordinates(cell)?;
        self.with_sheet(sheet, |ws| Ok(ws.cell(col, row).map_or(0, |c| c.s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::format::ValueFormatter;

    #[test]
    fn values() {
        let wb = Workbook::new().unwrap();
        wb.set_cell_value("Sheet1", "B2", "hello").unwrap();
        wb.set_cell_value("Sheet1", "C2", "hello").unwrap();
        wb.set_cell_value("Sheet1", "A1", 0.1 + 0.2).unwrap();
        wb.set_cell_value("Sheet1", "A2", -7).unwrap();
        wb.set_cell_value("Sheet1", "A3", false).unwrap();

        assert_eq!(wb.get_cell_value("Sheet1", "B2").unwrap(), "hello");
        assert_eq!(wb.get_cell_value("Sheet1", "A1").unwrap(), "0.3");
        assert_eq!(wb.get_cell_value("Sheet1", "A2").unwrap(), "-7");
        assert_eq!(wb.get_cell_value("Sheet1", "A3").unwrap(), "FALSE");
        assert_eq!(wb.get_cell_value("Sheet1", "Z99").unwrap(), "");
        assert_eq!(wb.get_cell_type("Sheet1", "C2").unwrap(), CellType::SharedString);
        assert_eq!(wb.shared_strings_part().unwrap().lock().len(), 1);

        wb.set_cell_value("Sheet1", "B2", CellValue::Empty).unwrap();
        assert_eq!(wb.get_cell_value("Sheet1", "B2").unwrap(), "");
        assert!(matches!(
            wb.set_cell_value("Sheet1", "2B", 1),
            Err(Error::InvalidCellName(_))
        ));
        assert!(matches!(
            wb.set_cell_str("Nope", "A1", "x"),
            Err(Error::SheetNotExist(_))
        ));
        assert_eq!(wb.shared_strings_part().unwrap().lock().len(), 1);
    }

    #[test]
    fn custom_formatter() {
        struct Upper;
        impl ValueFormatter for Upper {
            fn format(&self, value: &str, _style: u32, _cell_type: CellType) -> String {
                value.to_uppercase()
            }
        }
        let wb = Workbook::new().unwrap();
        wb.set_formatter(Upper);
        wb.set_cell_str("Sheet1", "A1", "abc").unwrap();
        assert_eq!(wb.get_cell_value("Sheet1", "A1").unwrap(), "ABC");
    }

    #[test]
    fn long_text_is_truncated() {
        let wb = Workbook::new().unwrap();
        wb.set_cell_str("Sheet1", "A1", &"é".repeat(MAX_CELL_CHARS + 10))
            .unwrap();
        assert_eq!(
            wb.get_cell_value("Sheet1", "A1").unwrap().chars().count(),
            MAX_CELL_CHARS
        );
    }

    #[test]
    fn formulas() {
        let wb = Workbook::new().unwrap();
        wb.set_cell_formula("Sheet1", "C1", "=SUM(A1:B1)").unwrap();
        assert_eq!(wb.get_cell_formula("Sheet1", "C1").unwrap(), "SUM(A1:B1)");
        assert_eq!(wb.get_cell_formula("Sheet1", "A1").unwrap(), "");
        wb.set_cell_int("Sheet1", "C1", 3).unwrap();
        assert_eq!(wb.get_cell_formula("Sheet1", "C1").unwrap(), "");
        assert_eq!(wb.get_cell_value("Sheet1", "C1").unwrap(), "3");
    }

    #[test]
    fn overwriting_a_formula_drops_its_calc_chain_entry() {
        let wb = Workbook::new().unwrap();
        wb.set_cell_formula("Sheet1", "A1", "1+1").unwrap();
        wb.set_cell_formula("Sheet1", "A2", "2+2").unwrap();
        wb.package.store_bytes(
            "xl/calcChain.xml",
            br#"<calcChain xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><c r="A1" i="1"/><c r="A2"/></calcChain>"#.to_vec(),
        );
        wb.set_cell_bool("Sheet1", "A1", true).unwrap();
        let chain = wb.calc_chain.get("xl/calcChain.xml").unwrap();
        let refs: Vec<_> = chain.lock().entries.iter().map(|e| e.r.clone()).collect();
        assert_eq!(refs, ["A2"]);
    }

    #[test]
    fn styles() {
        let wb = Workbook::new().unwrap();
        wb.set_cell_style("Sheet1", "C3", "B2", 4).unwrap();
        assert_eq!(wb.get_cell_style("Sheet1", "B2").unwrap(), 4);
        assert_eq!(wb.get_cell_style("Sheet1", "C3").unwrap(), 4);
        assert_eq!(wb.get_cell_style("Sheet1", "A2").unwrap(), 0);
        assert_eq!(wb.get_cell_style("Sheet1", "D4").unwrap(), 0);
    }
}
