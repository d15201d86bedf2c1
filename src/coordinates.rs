// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Conversions between `A1` style references and 1-based `(column, row)`
//! coordinates.
//!
//! Every public entry point of the crate speaks `A1` notation; these helpers
//! are what the rest of the crate uses to get back to integers.

use crate::errors::{Error, Result};
use crate::{MAX_COLUMNS, MAX_ROWS};

/// Converts a column name (`"A"`, `"xfd"`) into its 1-based number
pub fn column_name_to_number(name: &str) -> Result<u32> {
    if name.is_empty() {
        return Err(Error::InvalidColumnName(name.to_string()));
    }
    let mut col: u32 = 0;
    for c in name.bytes() {
        let digit = match c {
            b'A'..=b'Z' => c - b'A' + 1,
            b'a'..=b'z' => c - b'a' + 1,
            _ => return Err(Error::InvalidColumnName(name.to_string())),
        };
        col = col * 26 + digit as u32;
        if col > MAX_COLUMNS {
            return Err(Error::ColumnNumber(col));
        }
    }
    Ok(col)
}

/// Converts a 1-based column number into its name (`28` -> `"AB"`)
pub fn column_number_to_name(num: u32) -> Result<String> {
    if num < 1 || num > MAX_COLUMNS {
        return Err(Error::ColumnNumber(num));
    }
    let mut col: Vec<u8> = Vec::with_capacity(3);
    let mut num = num;
    while num > 0 {
        col.push(((num - 1) % 26) as u8 + b'A');
        num = (num - 1) / 26;
    }
    col.reverse();
    Ok(col.into_iter().map(char::from).collect())
}

/// Splits a cell name into its column name and row number
/// (`"$AB$12"` -> `("AB", 12)`).
///
/// `$` absolute markers are ignored.
pub fn split_cell_name(cell: &str) -> Result<(String, u32)> {
    let invalid = || Error::InvalidCellName(cell.to_string());
    let bytes: Vec<u8> = cell.bytes().filter(|c| *c != b'$').collect();
    let split = bytes
        .iter()
        .position(|c| !c.is_ascii_alphabetic())
        .ok_or_else(invalid)?;
    let (letters, digits) = bytes.split_at(split);
    if letters.is_empty() || digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }
    let row = digits
        .iter()
        .try_fold(0u32, |acc, d| acc.checked_mul(10)?.checked_add((d - b'0') as u32))
        .ok_or(Error::RowNumber(u32::MAX))?;
    if row == 0 {
        return Err(invalid());
    }
    let letters = letters.iter().map(|c| char::from(*c)).collect();
    Ok((letters, row))
}

/// Converts a cell name into 1-based `(column, row)` coordinates
/// (`"B7"` -> `(2, 7)`).
///
/// Fails with [`Error::InvalidCellName`] when `cell` is not letters followed
/// by digits or when a component is zero.
pub fn cell_name_to_coordinates(cell: &str) -> Result<(u32, u32)> {
    let (col, row) = split_cell_name(cell)?;
    let col = column_name_to_number(&col).map_err(|e| match e {
        Error::InvalidColumnName(_) => Error::InvalidCellName(cell.to_string()),
        e => e,
    })?;
    if row > MAX_ROWS {
        return Err(Error::RowNumber(row));
    }
    Ok((col, row))
}

/// Converts 1-based `(column, row)` coordinates into a cell name
pub fn coordinates_to_cell_name(col: u32, row: u32) -> Result<String> {
    if row < 1 || row > MAX_ROWS {
        return Err(Error::RowNumber(row));
    }
    let mut name = column_number_to_name(col)?;
    name.push_str(&row.to_string());
    Ok(name)
}

/// A rectangle over the worksheet grid, 1-based and inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Area {
    /// First column
    pub x1: u32,
    /// First row
    pub y1: u32,
    /// Last column
    pub x2: u32,
    /// Last row
    pub y2: u32,
}

impl Area {
    /// Creates an area from its two corners, as given
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Area {
        Area { x1, y1, x2, y2 }
    }

    /// Returns the same area with `x1 <= x2` and `y1 <= y2`
    pub fn sorted(self) -> Area {
        Area {
            x1: self.x1.min(self.x2),
            y1: self.y1.min(self.y2),
            x2: self.x1.max(self.x2),
            y2: self.y1.max(self.y2),
        }
    }

    /// Whether the two (sorted) areas share at least one cell
    pub fn overlaps(&self, other: &Area) -> bool {
        !(self.x2 < other.x1 || self.x1 > other.x2 || self.y2 < other.y1 || self.y1 > other.y2)
    }

    /// Smallest area covering both
    pub fn union(&self, other: &Area) -> Area {
        Area {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    /// Whether the (sorted) area contains the cell
    pub fn contains(&self, col: u32, row: u32) -> bool {
        (self.x1..=self.x2).contains(&col) && (self.y1..=self.y2).contains(&row)
    }

    /// Number of columns
    pub fn width(&self) -> u32 {
        self.x2 - self.x1 + 1
    }

    /// Number of rows
    pub fn height(&self) -> u32 {
        self.y2 - self.y1 + 1
    }

    /// Reference of the top left cell
    pub fn start_cell(&self) -> Result<String> {
        coordinates_to_cell_name(self.x1, self.y1)
    }

    /// Reference of the bottom right cell
    pub fn end_cell(&self) -> Result<String> {
        coordinates_to_cell_name(self.x2, self.y2)
    }

    /// Range reference (`"A1:B2"`)
    pub fn to_ref(&self) -> Result<String> {
        Ok(format!("{}:{}", self.start_cell()?, self.end_cell()?))
    }
}

/// Parses a range reference (`"A1:B2"`) into an area.
///
/// The corners are kept in the order given: `"C3:B1"` yields
/// `x1 = 3, y1 = 3, x2 = 2, y2 = 1`. Use [`sort_coordinates`] to normalize.
pub fn area_ref_to_coordinates(area: &str) -> Result<Area> {
    let mut parts = area.split(':');
    let (Some(first), Some(last), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(Error::InvalidArea(area.to_string()));
    };
    let (x1, y1) = cell_name_to_coordinates(first)?;
    let (x2, y2) = cell_name_to_coordinates(last)?;
    Ok(Area { x1, y1, x2, y2 })
}

/// Normalizes an area so that `x1 <= x2` and `y1 <= y2`
pub fn sort_coordinates(area: Area) -> Area {
    area.sorted()
}

/// Which dimension of a sheet a structural change applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Axis {
    Rows,
    Columns,
}

/// Moves one coordinate by `offset` when it is at or after `num`.
///
/// Coordinates inside a removed span are left as they are. Returns `None`
/// when the coordinate would leave the grid.
pub(crate) fn shift_coordinate(value: u32, num: u32, offset: i32, max: u32) -> Option<u32> {
    if value < num || (offset < 0 && value - num < offset.unsigned_abs()) {
        return Some(value);
    }
    let shifted = value as i64 + offset as i64;
    (1..=max as i64).contains(&shifted).then_some(shifted as u32)
}

/// Shifts a single `A1` token, keeping its `$` markers
fn shift_cell_token(token: &str, axis: Axis, num: u32, offset: i32) -> Option<String> {
    let bytes = token.as_bytes();
    let col_abs = bytes.first() == Some(&b'$');
    let rest = if col_abs { &token[1..] } else { token };
    let letters = rest.bytes().take_while(u8::is_ascii_alphabetic).count();
    if letters == 0 || letters > 3 {
        return None;
    }
    let (col_name, rest) = rest.split_at(letters);
    let row_abs = rest.starts_with('$');
    let digits = if row_abs { &rest[1..] } else { rest };
    if digits.is_empty() || !digits.bytes().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut col = column_name_to_number(col_name).ok()?;
    let mut row: u32 = digits.parse().ok()?;
    if row == 0 || row > MAX_ROWS {
        return None;
    }
    match axis {
        Axis::Rows => row = shift_coordinate(row, num, offset, MAX_ROWS)?,
        Axis::Columns => col = shift_coordinate(col, num, offset, MAX_COLUMNS)?,
    }
    let mut out = String::with_capacity(token.len() + 1);
    if col_abs {
        out.push('$');
    }
    out.push_str(&column_number_to_name(col).ok()?);
    if row_abs {
        out.push('$');
    }
    out.push_str(&row.to_string());
    Some(out)
}

/// Shifts the references of an area (`"A1:B2"` or `"A1"`), for `<f ref>`
/// and similar attributes
pub(crate) fn shift_area_ref(area: &str, axis: Axis, num: u32, offset: i32) -> String {
    area.split(':')
        .map(|cell| {
            shift_cell_token(cell, axis, num, offset).unwrap_or_else(|| cell.to_string())
        })
        .collect::<Vec<_>>()
        .join(":")
}

/// Shifts every unqualified `A1` reference in the formula text.
///
/// String literals, sheet qualified references (`Sheet2!A1`), function
/// names and anything that does not parse as a cell are copied untouched.
pub(crate) fn shift_formula(formula: &str, axis: Axis, num: u32, offset: i32) -> String {
    let mut res = String::with_capacity(formula.len());
    let mut token = String::new();
    let mut chars = formula.chars().peekable();
    let mut qualified = false;
    while let Some(c) = chars.next() {
        if c.is_ascii_alphanumeric() || c == '$' || c == '_' || c == '.' {
            token.push(c);
            if chars
                .peek()
                .is_some_and(|n| n.is_ascii_alphanumeric() || *n == '$' || *n == '_' || *n == '.')
            {
                continue;
            }
            let next = chars.peek().copied();
            match next {
                Some('(') | Some('!') => res.push_str(&token),
                _ if qualified => res.push_str(&token),
                _ => match shift_cell_token(&token, axis, num, offset) {
                    Some(shifted) => res.push_str(&shifted),
                    None => res.push_str(&token),
                },
            }
            // a range keeps the qualification of its first cell (`Sheet2!A1:B2`)
            qualified = qualified && next == Some(':');
            token.clear();
            continue;
        }
        match c {
            '"' | '\'' => {
                res.push(c);
                for q in chars.by_ref() {
                    res.push(q);
                    if q == c {
                        break;
                    }
                }
                qualified = c == '\'' && chars.peek() == Some(&'!');
            }
            '!' => {
                res.push(c);
                qualified = true;
            }
            ':' => res.push(c),
            _ => {
                res.push(c);
                qualified = false;
            }
        }
    }
    res
}
