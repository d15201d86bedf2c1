// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! How a worksheet is shown and guarded: frozen or split panes, tab
//! grouping, printed headers and footers and sheet protection.

use log::debug;

use crate::coordinates::{area_ref_to_coordinates, cell_name_to_coordinates};
use crate::errors::{Error, Result};
use crate::utils::{format_f64, parse_bool, parse_f64};
use crate::workbook::SheetKind;
use crate::xml::XmlElement;
use crate::Workbook;

/// Longest header or footer text accepted, in UTF-16 code units
const MAX_FIELD_LENGTH: usize = 255;

/// Quadrant of a split or frozen sheet view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaneKind {
    /// Upper left quadrant, the only one without a split
    TopLeft,
    /// Upper right quadrant
    TopRight,
    /// Lower left quadrant
    BottomLeft,
    /// Lower right quadrant
    BottomRight,
}

impl PaneKind {
    fn as_attr(self) -> &'static str {
        match self {
            PaneKind::TopLeft => "topLeft",
            PaneKind::TopRight => "topRight",
            PaneKind::BottomLeft => "bottomLeft",
            PaneKind::BottomRight => "bottomRight",
        }
    }

    fn from_attr(v: &str) -> Option<PaneKind> {
        match v {
            "topLeft" => Some(PaneKind::TopLeft),
            "topRight" => Some(PaneKind::TopRight),
            "bottomLeft" => Some(PaneKind::BottomLeft),
            "bottomRight" => Some(PaneKind::BottomRight),
            _ => None,
        }
    }
}

/// Selected range of one pane
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Pane the selection belongs to, the top left one when `None`
    pub pane: Option<PaneKind>,
    /// Cell with the cursor, `A1` style
    pub active_cell: String,
    /// Selected ranges, space separated (`A1:B2 D4`)
    pub sqref: String,
}

/// Panes of the first view of a sheet (`pane` and `selection`)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Panes {
    /// Rows and columns before the split stay in place while scrolling
    pub freeze: bool,
    /// The view is split without freezing
    pub split: bool,
    /// Frozen columns, or horizontal split position in twips
    pub x_split: f64,
    /// Frozen rows, or vertical split position in twips
    pub y_split: f64,
    /// First visible cell of the bottom right pane
    pub top_left_cell: String,
    /// Pane holding the cursor
    pub active_pane: Option<PaneKind>,
    /// Selections, at most one per pane
    pub selections: Vec<Selection>,
}

/// Printed headers and footers (`headerFooter`).
///
/// Texts use the header and footer format codes (`&L`, `&C`, `&P`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFooter {
    /// Align with the page margins
    pub align_with_margins: Option<bool>,
    /// The first page has its own header and footer
    pub different_first: Option<bool>,
    /// Even pages have their own header and footer
    pub different_odd_even: Option<bool>,
    /// Scale with the document when printing
    pub scale_with_doc: Option<bool>,
    /// Header of odd pages, or of every page
    pub odd_header: String,
    /// Footer of odd pages, or of every page
    pub odd_footer: String,
    /// Header of even pages
    pub even_header: String,
    /// Footer of even pages
    pub even_footer: String,
    /// Header of the first page
    pub first_header: String,
    /// Footer of the first page
    pub first_footer: String,
}

/// Actions left to users while a sheet is protected (`sheetProtection`).
///
/// Every flag defaults to `false`: nothing but viewing is allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetProtection {
    /// Password asked for when unprotecting, none when empty
    pub password: Option<String>,
    /// Use existing auto filters
    pub auto_filter: bool,
    /// Delete columns
    pub delete_columns: bool,
    /// Delete rows
    pub delete_rows: bool,
    /// Edit drawings, charts and other objects
    pub edit_objects: bool,
    /// Edit what-if scenarios
    pub edit_scenarios: bool,
    /// Format cells
    pub format_cells: bool,
    /// Resize and hide columns
    pub format_columns: bool,
    /// Resize and hide rows
    pub format_rows: bool,
    /// Insert columns
    pub insert_columns: bool,
    /// Insert hyperlinks
    pub insert_hyperlinks: bool,
    /// Insert rows
    pub insert_rows: bool,
    /// Use pivot tables and pivot charts
    pub pivot_tables: bool,
    /// Select locked cells
    pub select_locked_cells: bool,
    /// Select unlocked cells
    pub select_unlocked_cells: bool,
    /// Sort ranges
    pub sort: bool,
}

/// Legacy 16 bits password verifier of sheet protection, as upper case hex
pub(crate) fn legacy_password_hash(password: &str) -> String {
    let mut hash: u32 = 0;
    let mut len = 0;
    for (i, c) in password.encode_utf16().enumerate() {
        // each character is rotated left by its position within 15 bits
        let c = c as u32 & 0x7fff;
        let r = (i as u32 + 1) % 15;
        hash ^= ((c << r) | (c >> (15 - r))) & 0x7fff;
        len += 1;
    }
    hash ^= len;
    hash ^= 0xce4b;
    format!("{hash:X}")
}

fn set_bool(e: &mut XmlElement, key: &str, value: bool) {
    e.set_attr(key, if value { "1" } else { "0" });
}

fn check_field(value: &str, name: &'static str) -> Result<()> {
    if value.encode_utf16().count() > MAX_FIELD_LENGTH {
        return Err(Error::FieldLength(name));
    }
    Ok(())
}

impl Workbook {
    /// Freezes or splits the first view of a sheet.
    ///
    /// With neither `freeze` nor `split` the pane is removed; selections are
    /// replaced in both cases.
    pub fn set_panes(&self, sheet: &str, panes: &Panes) -> Result<()> {
        if !panes.top_left_cell.is_empty() {
            cell_name_to_coordinates(&panes.top_left_cell)?;
        }
        for s in &panes.selections {
            if !s.active_cell.is_empty() {
                cell_name_to_coordinates(&s.active_cell)?;
            }
            for area in s.sqref.split_whitespace() {
                if area.contains(':') {
                    area_ref_to_coordinates(area)?;
                } else {
                    cell_name_to_coordinates(area)?;
                }
            }
        }
        self.with_sheet_mut(sheet, |ws| {
            let view = ws.sheet_view_mut();
            view.remove_children("pane");
            view.remove_children("selection");
            let mut head = Vec::new();
            if panes.freeze || panes.split {
                let mut pane = XmlElement::new("pane");
                if panes.x_split != 0.0 {
                    pane.set_attr("xSplit", &format_f64(panes.x_split));
                }
                if panes.y_split != 0.0 {
                    pane.set_attr("ySplit", &format_f64(panes.y_split));
                }
                if !panes.top_left_cell.is_empty() {
                    pane.set_attr("topLeftCell", &panes.top_left_cell);
                }
                if let Some(p) = panes.active_pane {
                    pane.set_attr("activePane", p.as_attr());
                }
                if panes.freeze {
                    pane.set_attr("state", "frozen");
                }
                head.push(pane);
            }
            for s in &panes.selections {
                let mut sel = XmlElement::new("selection");
                if let Some(p) = s.pane {
                    sel.set_attr("pane", p.as_attr());
                }
                if !s.active_cell.is_empty() {
                    sel.set_attr("activeCell", &s.active_cell);
                }
                if !s.sqref.is_empty() {
                    sel.set_attr("sqref", &s.sqref);
                }
                head.push(sel);
            }
            head.append(&mut view.children);
            view.children = head;
            Ok(())
        })
    }

    /// Panes and selections of the first view of a sheet
    pub fn get_panes(&self, sheet: &str) -> Result<Panes> {
        self.with_sheet(sheet, |ws| {
            let Some(view) = ws
                .root
                .child("sheetViews")
                .and_then(|v| v.child("sheetView"))
            else {
                return Ok(Panes::default());
            };
            let mut panes = Panes::default();
            if let Some(pane) = view.child("pane") {
                let state = pane.attr("state").unwrap_or("split");
                panes.freeze = state.starts_with("frozen");
                panes.split = !panes.freeze;
                let split = |key: &str| pane.attr(key).and_then(|v| parse_f64(v.as_bytes()));
                panes.x_split = split("xSplit").unwrap_or(0.0);
                panes.y_split = split("ySplit").unwrap_or(0.0);
                panes.top_left_cell = pane.attr("topLeftCell").unwrap_or_default().to_string();
                panes.active_pane = pane.attr("activePane").and_then(PaneKind::from_attr);
            }
            panes.selections = view
                .children_named("selection")
                .map(|s| Selection {
                    pane: s.attr("pane").and_then(PaneKind::from_attr),
                    active_cell: s.attr("activeCell").unwrap_or_default().to_string(),
                    sqref: s.attr("sqref").unwrap_or_default().to_string(),
                })
                .collect();
            Ok(panes)
        })
    }

    /// Selects the tabs of several worksheets at once.
    ///
    /// The active sheet must be one of them. Edits made by spreadsheet
    /// applications then apply to every grouped sheet.
    pub fn group_sheets(&self, sheets: &[&str]) -> Result<()> {
        let active = self.active_sheet_index()?;
        let mut includes_active = false;
        let mut paths = Vec::with_capacity(sheets.len());
        for sheet in sheets {
            let (idx, _) = self.sheet_entry(sheet)?;
            includes_active |= idx == active;
            paths.push(self.worksheet_path(sheet)?);
        }
        if !includes_active {
            return Err(Error::GroupSheets);
        }
        for path in paths {
            let handle = self.load_worksheet(&path)?;
            {
                let mut ws = handle.lock();
                ws.sheet_view_mut();
                if let Some(views) = ws.root.child_mut("sheetViews") {
                    for view in views.children.iter_mut() {
                        view.set_attr("tabSelected", "1");
                    }
                }
            }
            self.sheets.mark_dirty(&path);
        }
        debug!("grouped {} sheets", sheets.len());
        Ok(())
    }

    /// Deselects the tab of every worksheet but the active one
    pub fn ungroup_sheets(&self) -> Result<()> {
        let active = self.active_sheet_index()?;
        for (i, entry) in self.sheet_entries()?.into_iter().enumerate() {
            if i == active || entry.kind != SheetKind::Worksheet || entry.path.is_empty() {
                continue;
            }
            let handle = self.load_worksheet(&entry.path)?;
            let changed = {
                let mut ws = handle.lock();
                let mut changed = false;
                if let Some(views) = ws.root.child_mut("sheetViews") {
                    for view in views.children.iter_mut() {
                        changed |= view.remove_attr("tabSelected").is_some();
                    }
                }
                changed
            };
            if changed {
                self.sheets.mark_dirty(&entry.path);
            }
        }
        Ok(())
    }

    /// Replaces the printed headers and footers of a sheet, `None` removes
    /// them.
    ///
    /// Each text is limited to 255 characters.
    pub fn set_header_footer(&self, sheet: &str, settings: Option<&HeaderFooter>) -> Result<()> {
        let Some(settings) = settings else {
            return self.with_sheet_mut(sheet, |ws| {
                ws.root.remove_children("headerFooter");
                Ok(())
            });
        };
        let texts = [
            ("oddHeader", &settings.odd_header),
            ("oddFooter", &settings.odd_footer),
            ("evenHeader", &settings.even_header),
            ("evenFooter", &settings.even_footer),
            ("firstHeader", &settings.first_header),
            ("firstFooter", &settings.first_footer),
        ];
        for (name, text) in texts {
            check_field(text, name)?;
        }
        let mut hf = XmlElement::new("headerFooter");
        for (value, key) in [
            (settings.different_odd_even, "differentOddEven"),
            (settings.different_first, "differentFirst"),
            (settings.scale_with_doc, "scaleWithDoc"),
            (settings.align_with_margins, "alignWithMargins"),
        ] {
            if let Some(v) = value {
                set_bool(&mut hf, key, v);
            }
        }
        for (name, text) in texts {
            if !text.is_empty() {
                let mut e = XmlElement::new(name);
                e.text = text.clone();
                hf.children.push(e);
            }
        }
        self.with_sheet_mut(sheet, |ws| {
            ws.root.remove_children("headerFooter");
            ws.root.children.push(hf);
            Ok(())
        })
    }

    /// Printed headers and footers of a sheet, `None` when it has none
    pub fn get_header_footer(&self, sheet: &str) -> Result<Option<HeaderFooter>> {
        self.with_sheet(sheet, |ws| {
            let Some(hf) = ws.root.child("headerFooter") else {
                return Ok(None);
            };
            let text = |name: &str| hf.child(name).map(|e| e.text.clone()).unwrap_or_default();
            let flag = |key: &str| hf.attr(key).map(parse_bool);
            Ok(Some(HeaderFooter {
                align_with_margins: flag("alignWithMargins"),
                different_first: flag("differentFirst"),
                different_odd_even: flag("differentOddEven"),
                scale_with_doc: flag("scaleWithDoc"),
                odd_header: text("oddHeader"),
                odd_footer: text("oddFooter"),
                even_header: text("evenHeader"),
                even_footer: text("evenFooter"),
                first_header: text("firstHeader"),
                first_footer: text("firstFooter"),
            }))
        })
    }

    /// Protects a sheet, replacing any previous protection
    pub fn protect_sheet(&self, sheet: &str, settings: &SheetProtection) -> Result<()> {
        let mut p = XmlElement::new("sheetProtection");
        if let Some(password) = settings.password.as_deref().filter(|p| !p.is_empty()) {
            p.set_attr("password", &legacy_password_hash(password));
        }
        set_bool(&mut p, "sheet", true);
        // the attributes say which actions are locked
        for (allowed, key) in [
            (settings.edit_objects, "objects"),
            (settings.edit_scenarios, "scenarios"),
            (settings.format_cells, "formatCells"),
            (settings.format_columns, "formatColumns"),
            (settings.format_rows, "formatRows"),
            (settings.insert_columns, "insertColumns"),
            (settings.insert_rows, "insertRows"),
            (settings.insert_hyperlinks, "insertHyperlinks"),
            (settings.delete_columns, "deleteColumns"),
            (settings.delete_rows, "deleteRows"),
            (settings.select_locked_cells, "selectLockedCells"),
            (settings.sort, "sort"),
            (settings.auto_filter, "autoFilter"),
            (settings.pivot_tables, "pivotTables"),
            (settings.select_unlocked_cells, "selectUnlockedCells"),
        ] {
            set_bool(&mut p, key, !allowed);
        }
        self.with_sheet_mut(sheet, |ws| {
            ws.root.remove_children("sheetProtection");
            ws.root.children.push(p);
            Ok(())
        })
    }

    /// Removes the protection of a sheet.
    ///
    /// When `password` is given and the sheet carries a legacy password
    /// verifier, the two must match. Unprotecting an unprotected sheet does
    /// nothing.
    pub fn unprotect_sheet(&self, sheet: &str, password: Option<&str>) -> Result<()> {
        let (path, handle) = self.worksheet(sheet)?;
        {
            let mut ws = handle.lock();
            let Some(protection) = ws.root.child("sheetProtection") else {
                return Ok(());
            };
            if let (Some(password), Some(hash)) = (password, protection.attr("password")) {
                if !legacy_password_hash(password).eq_ignore_ascii_case(hash) {
                    return Err(Error::UnprotectSheetPassword);
                }
            }
            ws.root.remove_children("sheetProtection");
        }
        self.sheets.mark_dirty(&path);
        Ok(())
    }

    /// Whether a sheet is protected
    pub fn is_sheet_protected(&self, sheet: &str) -> Result<bool> {
        self.with_sheet(sheet, |ws| {
            Ok(ws
                .root
                .child("sheetProtection")
                .and_then(|p| p.attr("sheet"))
                .is_some_and(parse_bool))
        })
    }
}
