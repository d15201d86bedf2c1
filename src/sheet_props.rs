// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Sheet level settings: `sheetPr`, `pageMargins`, `sheetFormatPr`,
//! `pageSetup` and manual page breaks.
//!
//! Each concern is one struct of optional fields. Setters only touch the
//! fields that are `Some`; getters return every field, filled with the value
//! spreadsheet applications assume when the attribute is absent.

use crate::coordinates::cell_name_to_coordinates;
use crate::errors::Result;
use crate::utils::{format_f64, parse_bool, parse_f64, parse_u32};
use crate::xml::XmlElement;
use crate::{Workbook, MAX_COLUMNS, MAX_ROWS};

fn bool_attr(e: Option<&XmlElement>, key: &str) -> Option<bool> {
    e?.attr(key).map(parse_bool)
}

fn f64_attr(e: Option<&XmlElement>, key: &str) -> Option<f64> {
    e?.attr(key).and_then(|v| parse_f64(v.as_bytes()))
}

fn u32_attr(e: Option<&XmlElement>, key: &str) -> Option<u32> {
    e?.attr(key).and_then(|v| parse_u32(v.as_bytes()))
}

fn set_bool(e: &mut XmlElement, key: &str, value: bool) {
    e.set_attr(key, if value { "1" } else { "0" });
}

/// Child of `sheetPr`, inserted in schema order
fn sheet_pr_child<'a>(pr: &'a mut XmlElement, name: &str) -> &'a mut XmlElement {
    const ORDER: &[&str] = &["tabColor", "outlinePr", "pageSetUpPr"];
    if let Some(pos) = pr.children.iter().position(|c| c.local_name() == name) {
        return &mut pr.children[pos];
    }
    let rank = ORDER.iter().position(|n| *n == name).unwrap_or(ORDER.len());
    let pos = pr
        .children
        .iter()
        .position(|c| ORDER.iter().position(|n| *n == c.local_name()).is_some_and(|r| r > rank))
        .unwrap_or(pr.children.len());
    pr.children.insert(pos, XmlElement::new(name));
    &mut pr.children[pos]
}

/// Sheet properties (`sheetPr`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetProps {
    /// Name used by VBA code to refer to the sheet
    pub code_name: Option<String>,
    /// Recalculate conditional formats (default `true`)
    pub enable_format_conditions_calculation: Option<bool>,
    /// Published with the workbook (default `true`)
    pub published: Option<bool>,
    /// Scale the sheet to fit the printed page (default `false`)
    pub fit_to_page: Option<bool>,
    /// Tab color as `RRGGBB`, empty when none
    pub tab_color: Option<String>,
    /// Show automatic page breaks (default `false`)
    pub auto_page_breaks: Option<bool>,
    /// Summary rows sit below their details (default `true`)
    pub outline_summary_below: Option<bool>,
}

/// Printed page margins in inches (`pageMargins`)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PageMargins {
    /// Bottom margin
    pub bottom: Option<f64>,
    /// Footer margin
    pub footer: Option<f64>,
    /// Header margin
    pub header: Option<f64>,
    /// Left margin
    pub left: Option<f64>,
    /// Right margin
    pub right: Option<f64>,
    /// Top margin
    pub top: Option<f64>,
}

/// Default row and column dimensions (`sheetFormatPr`)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SheetFormat {
    /// Characters of the default column width, padding excluded
    pub base_col_width: Option<u8>,
    /// Default column width in characters, padding included
    pub default_col_width: Option<f64>,
    /// Default row height in points (default 15)
    pub default_row_height: Option<f64>,
    /// Whether `default_row_height` is used by empty rows
    pub custom_height: Option<bool>,
    /// Rows are hidden unless they say otherwise
    pub zero_height: Option<bool>,
    /// Rows have a thick top border by default
    pub thick_top: Option<bool>,
    /// Rows have a thick bottom border by default
    pub thick_bottom: Option<bool>,
}

/// Page orientation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Orientation {
    #[default]
    /// Taller than wide
    Portrait,
    /// Wider than tall
    Landscape,
}

/// Print setup (`pageSetup`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageLayout {
    /// Page orientation (default portrait)
    pub orientation: Option<Orientation>,
    /// Paper size code, 1 is Letter and 9 is A4
    pub paper_size: Option<u32>,
    /// Pages across when fitting to page (default 1)
    pub fit_to_width: Option<u32>,
    /// Pages down when fitting to page (default 1)
    pub fit_to_height: Option<u32>,
    /// Print scale in percent, `10..=400` (default 100)
    pub scale: Option<u32>,
    /// Number of the first printed page (default 1)
    pub first_page_number: Option<u32>,
    /// Print without colors
    pub black_and_white: Option<bool>,
}

impl Workbook {
    /// Sets the `Some` fields of the sheet properties
    pub fn set_sheet_props(&self, sheet: &str, props: &SheetProps) -> Result<()> {
        self.with_sheet_mut(sheet, |ws| {
            let pr = ws.ensure_child("sheetPr");
            if let Some(name) = &props.code_name {
                pr.set_attr("codeName", name);
            }
            if let Some(v) = props.enable_format_conditions_calculation {
                set_bool(pr, "enableFormatConditionsCalculation", v);
            }
            if let Some(v) = props.published {
                set_bool(pr, "published", v);
            }
            if let Some(color) = &props.tab_color {
                if !color.is_empty() || pr.child("tabColor").is_some() {
                    let rgb = format!("FF{}", color.trim_start_matches('#').to_uppercase());
                    sheet_pr_child(pr, "tabColor").set_attr("rgb", &rgb);
                }
            }
            if let Some(v) = props.outline_summary_below {
                set_bool(sheet_pr_child(pr, "outlinePr"), "summaryBelow", v);
            }
            for (value, key) in [
                (props.fit_to_page, "fitToPage"),
                (props.auto_page_breaks, "autoPageBreaks"),
            ] {
                match value {
                    Some(v) if v || pr.child("pageSetUpPr").is_some() => {
                        set_bool(sheet_pr_child(pr, "pageSetUpPr"), key, v)
                    }
                    _ => (),
                }
            }
            Ok(())
        })
    }

    /// Sheet properties, with defaults for the missing ones
    pub fn get_sheet_props(&self, sheet: &str) -> Result<SheetProps> {
        self.with_sheet(sheet, |ws| {
            let pr = ws.root.child("sheetPr");
            let setup = pr.and_then(|p| p.child("pageSetUpPr"));
            Ok(SheetProps {
                code_name: Some(
                    pr.and_then(|p| p.attr("codeName"))
                        .unwrap_or_default()
                        .to_string(),
                ),
                enable_format_conditions_calculation: Some(
                    bool_attr(pr, "enableFormatConditionsCalculation").unwrap_or(true),
                ),
                published: Some(bool_attr(pr, "published").unwrap_or(true)),
                fit_to_page: Some(bool_attr(setup, "fitToPage").unwrap_or(false)),
                tab_color: Some(
                    pr.and_then(|p| p.child("tabColor"))
                        .and_then(|c| c.attr("rgb"))
                        .map(|rgb| rgb.strip_prefix("FF").unwrap_or(rgb).to_string())
                        .unwrap_or_default(),
                ),
                auto_page_breaks: Some(bool_attr(setup, "autoPageBreaks").unwrap_or(false)),
                outline_summary_below: Some(
                    bool_attr(pr.and_then(|p| p.child("outlinePr")), "summaryBelow")
                        .unwrap_or(true),
                ),
            })
        })
    }

    /// Sets the `Some` page margins
    pub fn set_page_margins(&self, sheet: &str, margins: &PageMargins) -> Result<()> {
        self.with_sheet_mut(sheet, |ws| {
            let pm = ws.ensure_child("pageMargins");
            for (value, key) in [
                (margins.left, "left"),
                (margins.right, "right"),
                (margins.top, "top"),
                (margins.bottom, "bottom"),
                (margins.header, "header"),
                (margins.footer, "footer"),
            ] {
                if let Some(v) = value {
                    pm.set_attr(key, &format_f64(v));
                }
            }
            Ok(())
        })
    }

    /// Page margins, with defaults for the missing ones
    pub fn get_page_margins(&self, sheet: &str) -> Result<PageMargins> {
        self.with_sheet(sheet, |ws| {
            let pm = ws.root.child("pageMargins");
            // absent or zero margins read as the defaults
            let get = |key, default| Some(f64_attr(pm, key).filter(|v| *v != 0.0).unwrap_or(default));
            Ok(PageMargins {
                bottom: get("bottom", 0.75),
                footer: get("footer", 0.3),
                header: get("header", 0.3),
                left: get("left", 0.7),
                right: get("right", 0.7),
                top: get("top", 0.75),
            })
        })
    }

    /// Sets the `Some` default dimensions of the sheet
    pub fn set_sheet_format(&self, sheet: &str, format: &SheetFormat) -> Result<()> {
        self.with_sheet_mut(sheet, |ws| {
            let fp = ws.ensure_child("sheetFormatPr");
            if let Some(v) = format.base_col_width {
                fp.set_attr("baseColWidth", &v.to_string());
            }
            if let Some(v) = format.default_col_width {
                fp.set_attr("defaultColWidth", &format_f64(v));
            }
            if let Some(v) = format.default_row_height {
                fp.set_attr("defaultRowHeight", &format_f64(v));
            }
            for (value, key) in [
                (format.custom_height, "customHeight"),
                (format.zero_height, "zeroHeight"),
                (format.thick_top, "thickTop"),
                (format.thick_bottom, "thickBottom"),
            ] {
                if let Some(v) = value {
                    set_bool(fp, key, v);
                }
            }
            Ok(())
        })
    }

    /// Default row and column dimensions
    pub fn get_sheet_format(&self, sheet: &str) -> Result<SheetFormat> {
        self.with_sheet(sheet, |ws| {
            let fp = ws.root.child("sheetFormatPr");
            Ok(SheetFormat {
                base_col_width: Some(
                    u32_attr(fp, "baseColWidth")
                        .and_then(|v| u8::try_from(v).ok())
                        .unwrap_or(0),
                ),
                default_col_width: Some(f64_attr(fp, "defaultColWidth").unwrap_or(0.0)),
                default_row_height: Some(
                    f64_attr(fp, "defaultRowHeight")
                        .unwrap_or(crate::worksheet::DEFAULT_ROW_HEIGHT),
                ),
                custom_height: Some(bool_attr(fp, "customHeight").unwrap_or(false)),
                zero_height: Some(bool_attr(fp, "zeroHeight").unwrap_or(false)),
                thick_top: Some(bool_attr(fp, "thickTop").unwrap_or(false)),
                thick_bottom: Some(bool_attr(fp, "thickBottom").unwrap_or(false)),
            })
        })
    }

    /// Sets the `Some` print settings.
    ///
    /// Zero fit counts and page numbers and scales outside of `10..=400` are
    /// ignored.
    pub fn set_page_layout(&self, sheet: &str, layout: &PageLayout) -> Result<()> {
        self.with_sheet_mut(sheet, |ws| {
            let ps = ws.ensure_child("pageSetup");
            if let Some(o) = layout.orientation {
                let o = match o {
                    Orientation::Portrait => "portrait",
                    Orientation::Landscape => "landscape",
                };
                ps.set_attr("orientation", o);
            }
            if let Some(v) = layout.paper_size {
                ps.set_attr("paperSize", &v.to_string());
            }
            if let Some(v) = layout.fit_to_width.filter(|v| *v > 0) {
                ps.set_attr("fitToWidth", &v.to_string());
            }
            if let Some(v) = layout.fit_to_height.filter(|v| *v > 0) {
                ps.set_attr("fitToHeight", &v.to_string());
            }
            if let Some(v) = layout.scale.filter(|v| (10..=400).contains(v)) {
                ps.set_attr("scale", &v.to_string());
            }
            if let Some(v) = layout.first_page_number.filter(|v| *v > 0) {
                ps.set_attr("firstPageNumber", &v.to_string());
                ps.set_attr("useFirstPageNumber", "1");
            }
            if let Some(v) = layout.black_and_white {
                set_bool(ps, "blackAndWhite", v);
            }
            Ok(())
        })
    }

    /// Print setup, with defaults for the missing fields
    pub fn get_page_layout(&self, sheet: &str) -> Result<PageLayout> {
        self.with_sheet(sheet, |ws| {
            let ps = ws.root.child("pageSetup");
            let positive = |key, default| Some(u32_attr(ps, key).filter(|v| *v > 0).unwrap_or(default));
            let first_page_number = if bool_attr(ps, "useFirstPageNumber").unwrap_or(false) {
                positive("firstPageNumber", 1)
            } else {
                Some(1)
            };
            Ok(PageLayout {
                orientation: Some(match ps.and_then(|p| p.attr("orientation")) {
                    Some("landscape") => Orientation::Landscape,
                    _ => Orientation::Portrait,
                }),
                paper_size: positive("paperSize", 1),
                fit_to_width: positive("fitToWidth", 1),
                fit_to_height: positive("fitToHeight", 1),
                scale: Some(
                    u32_attr(ps, "scale")
                        .filter(|v| (10..=400).contains(v))
                        .unwrap_or(100),
                ),
                first_page_number,
                black_and_white: Some(bool_attr(ps, "blackAndWhite").unwrap_or(false)),
            })
        })
    }

    /// Inserts a manual page break before the row and the column of `cell`.
    ///
    /// Row 1 and column A never get a break, so `A1` does nothing.
    pub fn insert_page_break(&self, sheet: &str, cell: &str) -> Result<()> {
        let (col, row) = cell_name_to_coordinates(cell)?;
        if col == 1 && row == 1 {
            return Ok(());
        }
        self.with_sheet_mut(sheet, |ws| {
            if row > 1 {
                add_break(ws.ensure_child("rowBreaks"), row - 1, MAX_COLUMNS - 1);
            }
            if col > 1 {
                add_break(ws.ensure_child("colBreaks"), col - 1, MAX_ROWS - 1);
            }
            Ok(())
        })
    }

    /// Removes the manual page breaks inserted for `cell`
    pub fn remove_page_break(&self, sheet: &str, cell: &str) -> Result<()> {
        let (col, row) = cell_name_to_coordinates(cell)?;
        if col == 1 && row == 1 {
            return Ok(());
        }
        self.with_sheet_mut(sheet, |ws| {
            for (name, id) in [("rowBreaks", row - 1), ("colBreaks", col - 1)] {
                if id == 0 {
                    continue;
                }
                let empty = match ws.root.child_mut(name) {
                    Some(breaks) => {
                        let id = id.to_string();
                        breaks.children.retain(|b| b.attr("id") != Some(id.as_str()));
                        update_break_counts(breaks);
                        breaks.children.is_empty()
                    }
                    None => false,
                };
                if empty {
                    ws.root.remove_children(name);
                }
            }
            Ok(())
        })
    }
}

fn add_break(breaks: &mut XmlElement, id: u32, max: u32) {
    let id = id.to_string();
    if breaks.children.iter().any(|b| b.attr("id") == Some(id.as_str())) {
        return;
    }
    breaks.children.push(
        XmlElement::new("brk")
            .with_attr("id", &id)
            .with_attr("max", &max.to_string())
            .with_attr("man", "1"),
    );
    update_break_counts(breaks);
}

fn update_break_counts(breaks: &mut XmlElement) {
    let count = breaks.children.len();
    let manual = breaks
        .children
        .iter()
        .filter(|b| b.attr("man").is_some_and(parse_bool))
        .count();
    breaks.set_attr("count", &count.to_string());
    breaks.set_attr("manualBreakCount", &manual.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheet_props_defaults_and_updates() {
        let wb = Workbook::new().unwrap();
        let props = wb.get_sheet_props("Sheet1").unwrap();
        assert_eq!(props.published, Some(true));
        assert_eq!(props.fit_to_page, Some(false));
        assert_eq!(props.tab_color.as_deref(), Some(""));

        wb.set_sheet_props(
            "Sheet1",
            &SheetProps {
                code_name: Some("Main".into()),
                tab_color: Some("4F81BD".into()),
                fit_to_page: Some(true),
                outline_summary_below: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
        let props = wb.get_sheet_props("Sheet1").unwrap();
        assert_eq!(props.code_name.as_deref(), Some("Main"));
        assert_eq!(props.tab_color.as_deref(), Some("4F81BD"));
        assert_eq!(props.fit_to_page, Some(true));
        assert_eq!(props.auto_page_breaks, Some(false));
        assert_eq!(props.outline_summary_below, Some(false));

        wb.with_sheet("Sheet1", |ws| {
            let pr = ws.root.child("sheetPr").unwrap();
            let names: Vec<_> = pr.children.iter().map(|c| c.local_name()).collect();
            assert_eq!(names, ["tabColor", "outlinePr", "pageSetUpPr"]);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn false_page_setup_flags_do_not_create_elements() {
        let wb = Workbook::new().unwrap();
        wb.set_sheet_props(
            "Sheet1",
            &SheetProps {
                fit_to_page: Some(false),
                auto_page_breaks: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
        wb.with_sheet("Sheet1", |ws| {
            assert!(ws.root.child("sheetPr").unwrap().child("pageSetUpPr").is_none());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn margins_format_and_layout() {
        let wb = Workbook::new().unwrap();
        wb.set_page_margins(
            "Sheet1",
            &PageMargins {
                left: Some(1.0),
                ..Default::default()
            },
        )
        .unwrap();
        let pm = wb.get_page_margins("Sheet1").unwrap();
        assert_eq!(pm.left, Some(1.0));
        assert_eq!(pm.top, Some(0.75));

        let fmt = wb.get_sheet_format("Sheet1").unwrap();
        assert_eq!(fmt.default_row_height, Some(15.0));
        assert_eq!(fmt.custom_height, Some(false));

        wb.set_page_layout(
            "Sheet1",
            &PageLayout {
                orientation: Some(Orientation::Landscape),
                scale: Some(500),
                first_page_number: Some(3),
                fit_to_width: Some(0),
                ..Default::default()
            },
        )
        .unwrap();
        let layout = wb.get_page_layout("Sheet1").unwrap();
        assert_eq!(layout.orientation, Some(Orientation::Landscape));
        assert_eq!(layout.scale, Some(100));
        assert_eq!(layout.first_page_number, Some(3));
        assert_eq!(layout.fit_to_width, Some(1));
        assert_eq!(layout.paper_size, Some(1));
    }

    #[test]
    fn page_breaks() {
        let wb = Workbook::new().unwrap();
        wb.insert_page_break("Sheet1", "A1").unwrap();
        wb.insert_page_break("Sheet1", "C5").unwrap();
        wb.insert_page_break("Sheet1", "C5").unwrap();
        wb.insert_page_break("Sheet1", "A9").unwrap();
        wb.with_sheet("Sheet1", |ws| {
            let rows = ws.root.child("rowBreaks").unwrap();
            assert_eq!(rows.attr("count"), Some("2"));
            assert_eq!(rows.attr("manualBreakCount"), Some("2"));
            assert_eq!(rows.children[0].attr("id"), Some("4"));
            assert_eq!(rows.children[0].attr("max"), Some("16383"));
            let cols = ws.root.child("colBreaks").unwrap();
            assert_eq!(cols.children.len(), 1);
            assert_eq!(cols.children[0].attr("max"), Some("1048575"));
            Ok(())
        })
        .unwrap();

        wb.remove_page_break("Sheet1", "C5").unwrap();
        wb.with_sheet("Sheet1", |ws| {
            assert_eq!(ws.root.child("rowBreaks").unwrap().attr("count"), Some("1"));
            assert!(ws.root.child("colBreaks").is_none());
            Ok(())
        })
        .unwrap();
    }
}
