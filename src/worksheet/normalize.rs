// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Turns the rows of a freshly decoded worksheet into the dense model.
//!
//! Source rows may come out of order, without numbers, repeated, or with
//! sparse and unnumbered cells. After [`normalize`] every index `i` of
//! `rows` holds row `i + 1`, and each row has exactly one cell per column
//! from `A` to its last referenced column.

use log::debug;

use super::{Cell, Row, Worksheet};
use crate::coordinates::{cell_name_to_coordinates, coordinates_to_cell_name};
use crate::errors::Result;

/// Runs both normalization passes; the first malformed cell reference aborts
pub(crate) fn normalize(ws: &mut Worksheet) -> Result<()> {
    let fallback = check_sheet(ws);
    check_row(ws)?;
    if let Some(fallback) = fallback {
        apply_fallback_row(ws, fallback)?;
    }
    debug!("normalized worksheet with {} rows", ws.rows.len());
    Ok(())
}

/// Makes `rows` dense and numbered `1..=N`.
///
/// A leading unnumbered row with referenced cells is taken out and returned
/// as the fallback source, to be applied once cells are dense. Unnumbered
/// rows take the highest number seen so far plus one; rows sharing a number
/// have their cells concatenated in source order.
pub(crate) fn check_sheet(ws: &mut Worksheet) -> Option<Row> {
    let mut source = std::mem::take(&mut ws.rows);
    let fallback = match source.first() {
        Some(first) if first.r == 0 && first.cells.iter().any(|c| !c.r.is_empty()) => {
            Some(source.remove(0))
        }
        _ => None,
    };

    let mut max = 0;
    for row in &mut source {
        if row.r == 0 {
            row.r = max + 1;
        }
        max = max.max(row.r);
    }

    let mut dense: Vec<Option<Row>> = Vec::new();
    dense.resize_with(max as usize, || None);
    for row in source {
        let slot = &mut dense[row.r as usize - 1];
        if let Some(existing) = slot.as_mut() {
            existing.cells.extend(row.cells);
        } else {
            *slot = Some(row);
        }
    }
    ws.rows = dense
        .into_iter()
        .enumerate()
        .map(|(i, row)| {
            let mut row = row.unwrap_or_default();
            row.r = i as u32 + 1;
            row
        })
        .collect();
    fallback
}

/// Fills the dense slots named by the fallback cells, leaving any slot that
/// already has a value untouched.
fn apply_fallback_row(ws: &mut Worksheet, fallback: Row) -> Result<()> {
    for mut cell in fallback.cells {
        let Ok((col, row)) = cell_name_to_coordinates(&cell.r) else {
            debug!("dropping fallback cell with reference {:?}", cell.r);
            continue;
        };
        while ws.rows.len() < row as usize {
            let r = ws.rows.len() as u32 + 1;
            ws.rows.push(Row {
                r,
                ..Default::default()
            });
        }
        let target = &mut ws.rows[row as usize - 1];
        fill_columns(target, col, row)?;
        let slot = &mut target.cells[col as usize - 1];
        if !slot.has_value() {
            cell.r = coordinates_to_cell_name(col, row)?;
            *slot = cell;
        }
    }
    Ok(())
}

/// Densifies the cells of every row.
///
/// Cells without a reference take the column after the highest one seen so
/// far in their row; the row is then expanded so that column `c` sits at
/// index `c - 1`, missing columns becoming empty cells. When two cells claim
/// the same column, the later one wins unless it is blank.
pub(crate) fn check_row(ws: &mut Worksheet) -> Result<()> {
    for (idx, row) in ws.rows.iter_mut().enumerate() {
        if row.cells.is_empty() {
            continue;
        }
        let row_num = idx as u32 + 1;
        let mut next = 0;
        let mut cols = Vec::with_capacity(row.cells.len());
        let mut in_place = true;
        for (i, cell) in row.cells.iter_mut().enumerate() {
            next += 1;
            let col = if cell.r.is_empty() {
                cell.r = coordinates_to_cell_name(next, row_num)?;
                next
            } else {
                let (col, r) = cell_name_to_coordinates(&cell.r)?;
                if r != row_num {
                    cell.r = coordinates_to_cell_name(col, row_num)?;
                }
                next = next.max(col);
                col
            };
            in_place &= col == i as u32 + 1;
            cols.push(col);
        }
        if in_place {
            continue;
        }

        let last = cols.iter().copied().max().unwrap_or(0) as usize;
        let mut dense: Vec<Option<Cell>> = Vec::new();
        dense.resize_with(last, || None);
        for (cell, col) in std::mem::take(&mut row.cells).into_iter().zip(cols) {
            let slot = &mut dense[col as usize - 1];
            match slot {
                Some(existing) if existing.has_value() && !cell.has_value() => (),
                _ => *slot = Some(cell),
            }
        }
        row.cells = dense
            .into_iter()
            .enumerate()
            .map(|(i, cell)| match cell {
                Some(cell) => Ok(cell),
                None => Ok(Cell::new(coordinates_to_cell_name(i as u32 + 1, row_num)?)),
            })
            .collect::<Result<_>>()?;
    }
    Ok(())
}

/// Makes sure row `row` exists, with cells up to column `col`.
///
/// Missing rows are appended with the sheet default height when the sheet
/// declares a custom one. `row` and `col` must already be validated.
pub(crate) fn prepare_sheet_xml(ws: &mut Worksheet, col: u32, row: u32) -> Result<()> {
    if row == 0 {
        return Ok(());
    }
    let default_height = ws.custom_default_row_height();
    let size_hint = ws.rows.last().map_or(0, |r| r.cells.len());
    while ws.rows.len() < row as usize {
        let r = ws.rows.len() as u32 + 1;
        ws.rows.push(Row {
            r,
            ht: default_height,
            custom_height: default_height.is_some(),
            cells: Vec::with_capacity(size_hint),
            ..Default::default()
        });
    }
    fill_columns(&mut ws.rows[row as usize - 1], col, row)
}

/// Appends empty cells to `row` until it holds `col` cells
pub(crate) fn fill_columns(row: &mut Row, col: u32, row_num: u32) -> Result<()> {
    while row.cells.len() < col as usize {
        let name = coordinates_to_cell_name(row.cells.len() as u32 + 1, row_num)?;
        row.cells.push(Cell::new(name));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::XmlPart;

    fn sheet(data: &str) -> Worksheet {
        let xml = format!("<worksheet><sheetData>{data}</sheetData></worksheet>");
        Worksheet::read(xml.as_bytes()).unwrap()
    }

    fn refs(row: &Row) -> Vec<&str> {
        row.cells.iter().map(|c| c.r.as_str()).collect()
    }

    #[test]
    fn gaps_are_filled() {
        let mut ws = sheet(
            r#"<row r="1"><c r="A1" t="str"><v>x</v></c></row><row r="3"><c r="C3" t="str"><v>y</v></c></row>"#,
        );
        normalize(&mut ws).unwrap();
        assert_eq!(ws.rows.len(), 3);
        assert_eq!(ws.rows.iter().map(|r| r.r).collect::<Vec<_>>(), [1, 2, 3]);
        assert!(ws.rows[1].cells.is_empty());
        assert_eq!(refs(&ws.rows[2]), ["A3", "B3", "C3"]);
        assert!(!ws.rows[2].cells[0].has_value());
        assert_eq!(ws.rows[2].cells[2].v, "y");
    }

    #[test]
    fn unnumbered_rows_follow_the_highest_number() {
        let mut ws = sheet(
            r#"<row r="2"><c><v>1</v></c></row><row><c><v>2</v></c></row><row r="1"><c><v>3</v></c></row>"#,
        );
        normalize(&mut ws).unwrap();
        assert_eq!(ws.rows.len(), 3);
        assert_eq!(ws.rows[0].cells[0].v, "3");
        assert_eq!(ws.rows[1].cells[0].v, "1");
        assert_eq!(ws.rows[2].cells[0].v, "2");
        assert_eq!(ws.rows[2].cells[0].r, "A3");
    }

    #[test]
    fn duplicate_rows_are_concatenated() {
        let mut ws = sheet(
            r#"<row r="1"><c r="A1"><v>1</v></c></row><row r="1"><c r="C1"><v>2</v></c></row>"#,
        );
        normalize(&mut ws).unwrap();
        assert_eq!(ws.rows.len(), 1);
        assert_eq!(refs(&ws.rows[0]), ["A1", "B1", "C1"]);
        assert_eq!(ws.rows[0].cells[2].v, "2");
    }

    #[test]
    fn unreferenced_cells_take_the_next_column() {
        let mut ws = sheet(r#"<row r="4"><c><v>a</v></c><c r="C4"><v>b</v></c><c><v>c</v></c></row>"#);
        normalize(&mut ws).unwrap();
        assert_eq!(refs(&ws.rows[3]), ["A4", "B4", "C4", "D4"]);
        assert_eq!(ws.rows[3].cells[3].v, "c");
    }

    #[test]
    fn fallback_row_never_overwrites() {
        let mut ws = sheet(
            r#"<row><c r="A1"><v>fallback</v></c><c r="B1"><v>fills</v></c><c r="C5"><v>grows</v></c><c r="??"><v>bad</v></c></row>
               <row r="1"><c r="A1"><v>kept</v></c></row>"#,
        );
        normalize(&mut ws).unwrap();
        assert_eq!(ws.rows.len(), 5);
        assert_eq!(ws.rows[0].cells[0].v, "kept");
        assert_eq!(ws.rows[0].cells[1].v, "fills");
        assert_eq!(refs(&ws.rows[4]), ["A5", "B5", "C5"]);
        assert_eq!(ws.rows[4].cells[2].v, "grows");
    }

    #[test]
    fn fallback_row_keeps_unreferenced_values() {
        let mut ws = sheet(
            r#"<row><c r="A1"><v>fallback</v></c><c r="C1"><v>extra</v></c></row><row r="1"><c><v>kept</v></c></row>"#,
        );
        normalize(&mut ws).unwrap();
        assert_eq!(ws.rows.len(), 1);
        assert_eq!(refs(&ws.rows[0]), ["A1", "B1", "C1"]);
        assert_eq!(ws.rows[0].cells[0].v, "kept");
        assert!(!ws.rows[0].cells[1].has_value());
        assert_eq!(ws.rows[0].cells[2].v, "extra");
    }

    #[test]
    fn malformed_reference_fails() {
        let mut ws = sheet(r#"<row r="1"><c r="1A"><v>1</v></c></row>"#);
        assert!(normalize(&mut ws).is_err());
    }

    #[test]
    fn prepare_uses_the_custom_default_height() {
        let xml = r#"<worksheet><sheetFormatPr defaultRowHeight="20" customHeight="1"/><sheetData/></worksheet>"#;
        let mut ws = Worksheet::read(xml.as_bytes()).unwrap();
        prepare_sheet_xml(&mut ws, 2, 3).unwrap();
        assert_eq!(ws.rows.len(), 3);
        assert_eq!(ws.rows[1].ht, Some(20.0));
        assert!(ws.rows[1].custom_height);
        assert_eq!(refs(&ws.rows[2]), ["A3", "B3"]);
        assert!(ws.rows[0].cells.is_empty());
    }
}
