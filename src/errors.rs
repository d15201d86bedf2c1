// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! `Error` management module
//!
//! Provides all spreadsheet error conversion and description.
//! Also provides `Result` as a alias of `Result<_, Error>`.

/// A struct to handle any error of the crate
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// Io error
    Io(std::io::Error),
    /// Zip error
    Zip(zip::result::ZipError),
    /// Xml error
    Xml(quick_xml::Error),
    /// Xml attribute error
    XmlAttr(quick_xml::events::attributes::AttrError),
    /// Xml encoding error
    Encoding(quick_xml::encoding::EncodingError),
    /// `ParseInt` error
    ParseInt(std::num::ParseIntError),
    /// Float error
    ParseFloat(std::num::ParseFloatError),
    /// Part content is not valid utf-8
    Utf8(std::str::Utf8Error),
    /// Unexpected end of xml
    XmlEof(&'static str),

    /// Cell reference is not letters followed by digits, or has a zero part
    InvalidCellName(String),
    /// Range reference is not two cell references joined by `:`
    InvalidArea(String),
    /// Column name is not made of 1 to 3 letters
    InvalidColumnName(String),
    /// Column number outside of `1..=16384`
    ColumnNumber(u32),
    /// Row number outside of `1..=1048576`
    RowNumber(u32),
    /// Row height above the maximum allowed
    MaxRowHeight(f64),
    /// Outline level outside of `1..=7`
    OutlineLevel(u8),
    /// Sheet name is empty, too long or contains a forbidden character
    InvalidSheetName(String),
    /// Defined name is empty
    InvalidDefinedName(String),
    /// No sheet at this position
    SheetIndex(usize),
    /// Header or footer text longer than 255 characters
    FieldLength(&'static str),

    /// No sheet with this name
    SheetNotExist(String),
    /// Sheet exists but is a chartsheet, dialogsheet or macrosheet
    NotAWorksheet(String),
    /// A part required by the package is missing
    MissingPart(String),

    /// The last remaining sheet cannot be deleted
    LastSheet,
    /// A defined name with the same name already exists in the same scope
    DefinedNameDuplicate(String),
    /// No defined name with this name in the requested scope
    DefinedNameScope(String),
    /// Another sheet already uses this name
    SheetNameExists(String),
    /// Grouped sheets must include the active sheet
    GroupSheets,
    /// Password does not match the one protecting the sheet
    UnprotectSheetPassword,

    /// Total decompressed size exceeds the configured limit
    UnzipSizeLimit(u64),
    /// Worksheet memory limit is greater than the unzip size limit
    OptionsUnzipSizeLimit,
}

from_err!(std::io::Error, Error, Io);
from_err!(zip::result::ZipError, Error, Zip);
from_err!(quick_xml::Error, Error, Xml);
from_err!(quick_xml::events::attributes::AttrError, Error, XmlAttr);
from_err!(quick_xml::encoding::EncodingError, Error, Encoding);
from_err!(std::num::ParseIntError, Error, ParseInt);
from_err!(std::num::ParseFloatError, Error, ParseFloat);
from_err!(std::str::Utf8Error, Error, Utf8);

impl From<std::string::FromUtf8Error> for Error {
    fn from(e: std::string::FromUtf8Error) -> Error {
        Error::Utf8(e.utf8_error())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Zip(e) => write!(f, "Zip error: {e}"),
            Error::Xml(e) => write!(f, "Xml error: {e}"),
            Error::XmlAttr(e) => write!(f, "Xml attribute error: {e}"),
            Error::Encoding(e) => write!(f, "Xml encoding error: {e}"),
            Error::ParseInt(e) => write!(f, "Parse integer error: {e}"),
            Error::ParseFloat(e) => write!(f, "Parse float error: {e}"),
            Error::Utf8(e) => write!(f, "Utf8 error: {e}"),
            Error::XmlEof(e) => write!(f, "Unexpected end of xml, expecting '</{e}>'"),

            Error::InvalidCellName(e) => write!(f, "invalid cell name '{e}'"),
            Error::InvalidArea(e) => write!(f, "invalid range reference '{e}'"),
            Error::InvalidColumnName(e) => write!(f, "invalid column name '{e}'"),
            Error::ColumnNumber(e) => {
                write!(f, "column number {e} is outside of 1..={}", crate::MAX_COLUMNS)
            }
            Error::RowNumber(e) => write!(f, "row number {e} is outside of 1..={}", crate::MAX_ROWS),
            Error::MaxRowHeight(e) => write!(
                f,
                "row height {e} exceeds the maximum of {} points",
                crate::MAX_ROW_HEIGHT
            ),
            Error::OutlineLevel(e) => write!(f, "outline level {e} is outside of 1..=7"),
            Error::InvalidSheetName(e) => write!(f, "invalid sheet name '{e}'"),
            Error::InvalidDefinedName(e) => write!(f, "invalid defined name '{e}'"),
            Error::SheetIndex(e) => write!(f, "no sheet at index {e}"),
            Error::FieldLength(e) => write!(f, "{e} exceeds 255 characters"),

            Error::SheetNotExist(e) => write!(f, "sheet {e} does not exist"),
            Error::NotAWorksheet(e) => write!(f, "sheet {e} is not a worksheet"),
            Error::MissingPart(e) => write!(f, "missing package part '{e}'"),

            Error::LastSheet => write!(f, "cannot delete the last sheet of a workbook"),
            Error::DefinedNameDuplicate(e) => {
                write!(f, "defined name '{e}' already exists in this scope")
            }
            Error::DefinedNameScope(e) => write!(f, "no defined name '{e}' in this scope"),
            Error::SheetNameExists(e) => write!(f, "a sheet named '{e}' already exists"),
            Error::GroupSheets => write!(f, "grouped sheets must include the active sheet"),
            Error::UnprotectSheetPassword => write!(f, "sheet protection password does not match"),

            Error::UnzipSizeLimit(e) => {
                write!(f, "unzipped size exceeds the limit of {e} bytes")
            }
            Error::OptionsUnzipSizeLimit => write!(
                f,
                "worksheet memory limit must be less than or equal to the unzip size limit"
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Zip(e) => Some(e),
            Error::Xml(e) => Some(e),
            Error::XmlAttr(e) => Some(e),
            Error::Encoding(e) => Some(e),
            Error::ParseInt(e) => Some(e),
            Error::ParseFloat(e) => Some(e),
            Error::Utf8(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type of the crate
pub type Result<T> = std::result::Result<T, Error>;
