// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Row and column insertion, removal and duplication.
//!
//! Every structural change goes through [`shift_sheet`], which moves rows or
//! cells, rewrites cell references and formulas, and moves merged regions.
//! The worksheet `<dimension>` is recomputed when the sheet is written.

use log::debug;

use crate::coordinates::{column_name_to_number, coordinates_to_cell_name, shift_area_ref, shift_formula, Area, Axis};
use crate::errors::Result;
use crate::rows::check_row_number;
use crate::worksheet::normalize::prepare_sheet_xml;
use crate::worksheet::{Cell, Row, Worksheet};
use crate::{Workbook, MAX_COLUMNS, MAX_ROWS};

/// Moves the span `lo..=hi` of a merged region for a change of `offset`
/// lines at `num`. `None` when the region disappears.
fn shift_span(lo: u32, hi: u32, num: u32, offset: i32, max: u32) -> Option<(u32, u32)> {
    if offset > 0 {
        let n = offset as u32;
        if lo >= num {
            let lo = lo.checked_add(n).filter(|v| *v <= max)?;
            Some((lo, hi.saturating_add(n).min(max)))
        } else if hi >= num {
            Some((lo, hi.saturating_add(n).min(max)))
        } else {
            Some((lo, hi))
        }
    } else {
        let n = offset.unsigned_abs();
        let end = num.saturating_add(n - 1);
        if lo >= num && hi <= end {
            return None;
        }
        let shift = |v: u32| {
            if v > end {
                v - n
            } else if v >= num {
                num
            } else {
                v
            }
        };
        let lo = shift(lo);
        // a region starting inside the removed span keeps its first line at `num`
        let hi = if hi >= num && hi <= end { num - 1 } else { shift(hi) };
        (hi >= lo).then_some((lo, hi))
    }
}

fn shift_merges(merges: &mut Vec<Area>, axis: Axis, num: u32, offset: i32) {
    merges.retain_mut(|a| {
        let shifted = match axis {
            Axis::Rows => shift_span(a.y1, a.y2, num, offset, MAX_ROWS).map(|(y1, y2)| {
                a.y1 = y1;
                a.y2 = y2;
            }),
            Axis::Columns => shift_span(a.x1, a.x2, num, offset, MAX_COLUMNS).map(|(x1, x2)| {
                a.x1 = x1;
                a.x2 = x2;
            }),
        };
        shifted.is_some() && !(a.x1 == a.x2 && a.y1 == a.y2)
    });
}

/// Rewrites the references of the cells of rows `from..` to their position
fn renumber(rows: &mut [Row], from: usize) -> Result<()> {
    for (i, row) in rows.iter_mut().enumerate().skip(from) {
        let r = i as u32 + 1;
        row.r = r;
        for (j, cell) in row.cells.iter_mut().enumerate() {
            cell.r = coordinates_to_cell_name(j as u32 + 1, r)?;
        }
    }
    Ok(())
}

fn renumber_cells(row: &mut Row, from: usize) -> Result<()> {
    let r = row.r;
    for (j, cell) in row.cells.iter_mut().enumerate().skip(from) {
        cell.r = coordinates_to_cell_name(j as u32 + 1, r)?;
    }
    Ok(())
}

/// Inserts (`offset > 0`) or removes (`offset < 0`) `|offset|` rows or
/// columns at `num`
pub(crate) fn shift_sheet(ws: &mut Worksheet, axis: Axis, num: u32, offset: i32) -> Result<()> {
    let idx = num as usize - 1;
    let n = offset.unsigned_abs() as usize;
    match axis {
        Axis::Rows => {
            if idx < ws.rows.len() {
                if offset > 0 {
                    let blank = (0..n).map(|_| Row::default());
                    ws.rows.splice(idx..idx, blank);
                    ws.rows.truncate(MAX_ROWS as usize);
                } else {
                    let end = (idx + n).min(ws.rows.len());
                    ws.rows.drain(idx..end);
                }
                renumber(&mut ws.rows, idx)?;
            }
        }
        Axis::Columns => {
            for row in &mut ws.rows {
                if idx >= row.cells.len() {
                    continue;
                }
                if offset > 0 {
                    let blank = (0..n).map(|_| Cell::default());
                    row.cells.splice(idx..idx, blank);
                    row.cells.truncate(MAX_COLUMNS as usize);
                } else {
                    let end = (idx + n).min(row.cells.len());
                    row.cells.drain(idx..end);
                }
                renumber_cells(row, idx)?;
            }
        }
    }
    for cell in ws.rows.iter_mut().flat_map(|r| r.cells.iter_mut()) {
        let Some(f) = cell.f.as_mut() else {
            continue;
        };
        if !f.text.is_empty() {
            f.text = shift_formula(&f.text, axis, num, offset);
        }
        if let Some(r) = f.attr("ref") {
            let shifted = shift_area_ref(r, axis, num, offset);
            f.set_attr("ref", &shifted);
        }
    }
    shift_merges(&mut ws.merges, axis, num, offset);
    Ok(())
}

impl Workbook {
    /// Shifts a sheet and its calculation chain entries
    fn adjust(&self, sheet: &str, axis: Axis, num: u32, offset: i32) -> Result<()> {
        let (_, entry) = self.sheet_entry(sheet)?;
        self.with_sheet_mut(sheet, |ws| shift_sheet(ws, axis, num, offset))?;
        debug!("shifted {axis:?} of {sheet} at {num} by {offset}");
        self.update_calc_chain(|chain| {
            let before = chain.entries.clone();
            chain.adjust(entry.sheet_id, axis, num, offset);
            before != chain.entries
        })
    }

    /// Inserts an empty row before `row`.
    ///
    /// References of cell formulas in the sheet follow; formulas of other
    /// sheets, charts and defined names are not updated.
    pub fn insert_row(&self, sheet: &str, row: u32) -> Result<()> {
        check_row_number(row)?;
        self.adjust(sheet, Axis::Rows, row, 1)
    }

    /// Removes a row, moving the following rows up
    pub fn remove_row(&self, sheet: &str, row: u32) -> Result<()> {
        check_row_number(row)?;
        self.adjust(sheet, Axis::Rows, row, -1)
    }

    /// Inserts an empty column before `col` (`"C"`)
    pub fn insert_col(&self, sheet: &str, col: &str) -> Result<()> {
        let num = column_name_to_number(col)?;
        self.adjust(sheet, Axis::Columns, num, 1)
    }

    /// Removes a column, moving the following columns left
    pub fn remove_col(&self, sheet: &str, col: &str) -> Result<()> {
        let num = column_name_to_number(col)?;
        self.adjust(sheet, Axis::Columns, num, -1)
    }

    /// Inserts a copy of `row` right below it
    pub fn duplicate_row(&self, sheet: &str, row: u32) -> Result<()> {
        self.duplicate_row_to(sheet, row, row.saturating_add(1))
    }

    /// Inserts a copy of `row` at `row2`, moving the rows from `row2` down.
    ///
    /// Does nothing when `row` is past the end of the sheet or equal to
    /// `row2`. Merged regions spanning only the source row are replicated
    /// on the copy, unless `row2` now lies strictly inside a merged region
    /// spanning several rows, in which case no region is added.
    pub fn duplicate_row_to(&self, sheet: &str, row: u32, row2: u32) -> Result<()> {
        check_row_number(row)?;
        let source = self.with_sheet(sheet, |ws| {
            if row2 < 1 || row == row2 {
                return Ok(None);
            }
            Ok(ws.rows.get(row as usize - 1).cloned())
        })?;
        let Some(mut copy) = source else {
            return Ok(());
        };
        check_row_number(row2)?;
        self.adjust(sheet, Axis::Rows, row2, 1)?;

        self.with_sheet_mut(sheet, |ws| {
            copy.r = row2;
            renumber_cells(&mut copy, 0)?;
            prepare_sheet_xml(ws, 0, row2)?;
            ws.rows[row2 as usize - 1] = copy;

            let src = if row > row2 { row + 1 } else { row };
            if ws.merges.iter().any(|m| m.y1 < row2 && row2 < m.y2) {
                debug!("row {row2} of {sheet} is inside a merged region, merges are not copied");
                return Ok(());
            }
            let copies: Vec<Area> = ws
                .merges
                .iter()
                .filter(|m| m.y1 == src && m.y2 == src)
                .map(|m| Area::new(m.x1, row2, m.x2, row2))
                .collect();
            ws.merges.extend(copies);
            Ok(())
        })
    }
}
