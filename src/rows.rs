// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Row attributes: height, visibility, outline level and style.
//!
//! Setters backfill the sheet up to the requested row; getters never grow
//! it and answer with the sheet defaults for rows past the last one.

use crate::errors::{Error, Result};
use crate::worksheet::normalize::prepare_sheet_xml;
use crate::worksheet::{Row, Worksheet, DEFAULT_ROW_HEIGHT};
use crate::{Workbook, MAX_ROWS, MAX_ROW_HEIGHT};

/// Fails with [`Error::RowNumber`] outside of `1..=MAX_ROWS`
pub(crate) fn check_row_number(row: u32) -> Result<()> {
    if row == 0 || row > MAX_ROWS {
        return Err(Error::RowNumber(row));
    }
    Ok(())
}

/// Converts a row height in points to pixels, 0 for a zero height
pub(crate) fn row_height_to_pixels(height: f64) -> f64 {
    if height == 0.0 {
        return 0.0;
    }
    (4.0 / 3.0 * height).ceil()
}

/// Backfills up to `row` and returns it
fn row_mut(ws: &mut Worksheet, row: u32) -> Result<&mut Row> {
    prepare_sheet_xml(ws, 0, row)?;
    Ok(&mut ws.rows[row as usize - 1])
}

impl Workbook {
    /// Sets the height of a row, in points
    pub fn set_row_height(&self, sheet: &str, row: u32, height: f64) -> Result<()> {
        check_row_number(row)?;
        if height > MAX_ROW_HEIGHT {
            return Err(Error::MaxRowHeight(height));
        }
        self.with_sheet_mut(sheet, |ws| {
            let r = row_mut(ws, row)?;
            r.ht = Some(height);
            r.custom_height = true;
            Ok(())
        })
    }

    /// Height of a row in points.
    ///
    /// Rows without an explicit height, including rows past the end of the
    /// sheet, have the sheet default height.
    pub fn get_row_height(&self, sheet: &str, row: u32) -> Result<f64> {
        check_row_number(row)?;
        self.with_sheet(sheet, |ws| {
            let default = ws.custom_default_row_height().unwrap_or(DEFAULT_ROW_HEIGHT);
            Ok(ws
                .rows
                .get(row as usize - 1)
                .and_then(|r| r.ht)
                .filter(|ht| *ht != 0.0)
                .unwrap_or(default))
        })
    }

    /// Height of a row in pixels
    pub fn row_height_pixels(&self, sheet: &str, row: u32) -> Result<f64> {
        Ok(row_height_to_pixels(self.get_row_height(sheet, row)?))
    }

    /// Hides or shows a row
    pub fn set_row_visible(&self, sheet: &str, row: u32, visible: bool) -> Result<()> {
        check_row_number(row)?;
        self.with_sheet_mut(sheet, |ws| {
            row_mut(ws, row)?.hidden = !visible;
            Ok(())
        })
    }

    /// Whether a row is shown; rows past the end of the sheet are
    pub fn get_row_visible(&self, sheet: &str, row: u32) -> Result<bool> {
        check_row_number(row)?;
        self.with_sheet(sheet, |ws| {
            Ok(ws.rows.get(row as usize - 1).is_none_or(|r| !r.hidden))
        })
    }

    /// Sets the outline (grouping) level of a row, `1..=7`
    pub fn set_row_outline_level(&self, sheet: &str, row: u32, level: u8) -> Result<()> {
        check_row_number(row)?;
        if !(1..=7).contains(&level) {
            return Err(Error::OutlineLevel(level));
        }
        self.with_sheet_mut(sheet, |ws| {
            row_mut(ws, row)?.outline_level = level;
            Ok(())
        })
    }

    /// Outline level of a row, 0 when it is not grouped
    pub fn get_row_outline_level(&self, sheet: &str, row: u32) -> Result<u8> {
        check_row_number(row)?;
        self.with_sheet(sheet, |ws| {
            Ok(ws.rows.get(row as usize - 1).map_or(0, |r| r.outline_level))
        })
    }

    /// Applies a style index to every row of `start..=end`, given in any
    /// order. Existing row styles are overwritten.
    pub fn set_row_style(&self, sheet: &str, start: u32, end: u32, style: u32) -> Result<()> {
        let (start, end) = if end < start { (end, start) } else { (start, end) };
        check_row_number(start)?;
        check_row_number(end)?;
        self.with_sheet_mut(sheet, |ws| {
            prepare_sheet_xml(ws, 0, end)?;
            for r in &mut ws.rows[start as usize - 1..end as usize] {
                r.s = style;
                r.custom_format = true;
            }
            Ok(())
        })
    }
}
