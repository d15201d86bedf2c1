// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Read, edit and write Office Open XML spreadsheets (`.xlsx`, `.xlsm`).
//!
//! # Status
//!
//! **sheetkit** keeps the archive as a store of raw parts and decodes a part
//! only when an operation needs it. Decoded worksheets are normalized into a
//! dense grid of rows and cells, edited in place and written back, sparse,
//! when the workbook is saved. Parts nobody touched are copied through as
//! they were read.
//!
//! Large sheets can be read with the streaming [`Rows`] iterator, which never
//! decodes the whole part and reads from a temporary file when the part was
//! spilled to disk on open (see [`Options`]).
//!
//! # Examples
//! ```no_run
//! use sheetkit::{DefinedName, Workbook};
//!
//! let wb = Workbook::open("report.xlsx")?;
//!
//! // edit
//! wb.set_cell_value("Sheet1", "A1", "Total")?;
//! wb.set_cell_formula("Sheet1", "B1", "SUM(B2:B100)")?;
//! wb.insert_row("Sheet1", 2)?;
//! wb.merge_cell("Sheet1", "A1", "A2")?;
//! wb.set_defined_name(&DefinedName::new("Data", "Sheet1!$B$2:$B$100"))?;
//!
//! // stream rows
//! let mut rows = wb.rows("Sheet1")?;
//! while rows.advance() {
//!     println!("{:?}", rows.columns()?);
//! }
//! rows.close();
//!
//! wb.save_as("report-edited.xlsx")?;
//! # Ok::<(), sheetkit::Error>(())
//! ```
#![deny(missing_docs)]

#[macro_use]
mod utils;

mod adjust;
mod cache;
mod calc_chain;
mod cell;
mod comments;
pub mod coordinates;
mod defined_names;
pub mod errors;
mod format;
mod merge;
mod package;
mod relationships;
mod rows;
mod shared_strings;
mod sheet;
mod sheet_props;
mod sheet_view;
mod stream;
mod templates;
mod workbook;
mod worksheet;
mod xml;

pub use crate::cell::CellValue;
pub use crate::comments::Comment;
pub use crate::coordinates::{
    area_ref_to_coordinates, cell_name_to_coordinates, column_name_to_number,
    column_number_to_name, coordinates_to_cell_name, sort_coordinates, split_cell_name, Area,
};
pub use crate::defined_names::DefinedName;
pub use crate::errors::{Error, Result};
pub use crate::format::{DefaultFormatter, ValueFormatter};
pub use crate::merge::MergeCell;
pub use crate::package::Options;
pub use crate::sheet::SheetVisibility;
pub use crate::sheet_props::{Orientation, PageLayout, PageMargins, SheetFormat, SheetProps};
pub use crate::sheet_view::{HeaderFooter, PaneKind, Panes, Selection, SheetProtection};
pub use crate::stream::Rows;
pub use crate::workbook::Workbook;
pub use crate::worksheet::CellType;

/// Number of rows of a worksheet
pub const MAX_ROWS: u32 = 1_048_576;

/// Number of columns of a worksheet
pub const MAX_COLUMNS: u32 = 16_384;

/// Highest row height accepted, in points
pub const MAX_ROW_HEIGHT: f64 = 409.0;
