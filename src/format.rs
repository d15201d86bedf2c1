// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Display form of raw cell values.
//!
//! Style and number format lookup is not part of this crate: callers that need
//! it plug their own [`ValueFormatter`] into the workbook. The default one only
//! cleans up binary float noise in numbers.

use crate::utils::{format_f64, parse_f64};
use crate::CellType;

/// Turns a raw cell value into the string returned by cell and row readers
pub trait ValueFormatter: Send + Sync {
    /// Formats `value`, the raw content of a cell with style index `style`
    /// and type `cell_type`. Shared strings are already resolved.
    fn format(&self, value: &str, style: u32, cell_type: CellType) -> String;
}

/// Formatter used when none is configured.
///
/// Numbers are rounded to 15 significant digits, the precision spreadsheet
/// applications display (`0.1 + 0.2` reads `0.3`) and booleans read `TRUE` or
/// `FALSE`. Anything else is returned as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFormatter;

impl ValueFormatter for DefaultFormatter {
    fn format(&self, value: &str, _style: u32, cell_type: CellType) -> String {
        match cell_type {
            CellType::Unset | CellType::Number => {
                round_precision(value).unwrap_or_else(|| value.to_string())
            }
            CellType::Bool => match value {
                "1" => "TRUE".to_string(),
                "0" => "FALSE".to_string(),
                v => v.to_string(),
            },
            _ => value.to_string(),
        }
    }
}

/// Rounds a numeric text to 15 significant digits, `None` if not a number
fn round_precision(text: &str) -> Option<String> {
    let v = parse_f64(text.as_bytes())?;
    if !v.is_finite() {
        return None;
    }
    let rounded: f64 = format!("{v:.14e}").parse().ok()?;
    Some(format_f64(rounded))
}
