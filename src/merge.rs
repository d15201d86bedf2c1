// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Merged cells.
//!
//! Merging never checks for overlaps: regions are appended as given and
//! overlaps are resolved when the regions are read back, unmerged or saved.
//! Resolution paints every region, in order, on an occupancy grid; a region
//! that paints over another one absorbs it and grows to the bounding
//! rectangle of both. A region survives only if it still owns its own top
//! left cell once every region has been painted.
//!
//! The grid is compressed to the distinct region boundaries on each axis, so
//! its size depends on the number of regions and not on their extent.

use crate::coordinates::{cell_name_to_coordinates, Area};
use crate::errors::Result;
use crate::Workbook;

/// A resolved merged region and the value of its top left cell
#[derive(Debug, Clone, PartialEq)]
pub struct MergeCell {
    area: Area,
    value: String,
}

impl MergeCell {
    /// The merged rectangle
    pub fn area(&self) -> Area {
        self.area
    }

    /// Range reference of the region (`"B1:D2"`)
    pub fn range(&self) -> Result<String> {
        self.area.to_ref()
    }

    /// Reference of the top left cell
    pub fn start_axis(&self) -> Result<String> {
        self.area.start_cell()
    }

    /// Reference of the bottom right cell
    pub fn end_axis(&self) -> Result<String> {
        self.area.end_cell()
    }

    /// Value of the top left cell, formatted like `get_cell_value`
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Distinct boundaries of the areas on one axis, `start` and `end + 1`
fn boundaries(areas: &[Area], bounds: impl Fn(&Area) -> (u32, u32)) -> Vec<u32> {
    let mut v: Vec<u32> = areas
        .iter()
        .flat_map(|a| {
            let (start, end) = bounds(a);
            [start, end + 1]
        })
        .collect();
    v.sort_unstable();
    v.dedup();
    v
}

/// Compressed index span of `[start, end]`
fn span(marks: &[u32], start: u32, end: u32) -> std::ops::Range<usize> {
    let first = marks.binary_search(&start).unwrap_or_else(|i| i);
    let last = marks.binary_search(&(end + 1)).unwrap_or_else(|i| i);
    first..last
}

/// One painting pass; returns whether any region absorbed another
fn resolve_pass(areas: &mut Vec<Area>) -> bool {
    let xs = boundaries(areas, |a| (a.x1, a.x2));
    let ys = boundaries(areas, |a| (a.y1, a.y2));
    let width = xs.len().saturating_sub(1);
    let mut grid: Vec<Option<usize>> = vec![None; width * ys.len().saturating_sub(1)];
    let mut absorbed_any = false;
    let mut absorbed = Vec::new();

    for i in 0..areas.len() {
        let cols = span(&xs, areas[i].x1, areas[i].x2);
        let rows = span(&ys, areas[i].y1, areas[i].y2);
        absorbed.clear();
        for y in rows.clone() {
            for x in cols.clone() {
                if let Some(j) = grid[y * width + x] {
                    if j != i && !absorbed.contains(&j) {
                        absorbed.push(j);
                    }
                }
            }
        }
        let (cols, rows) = if absorbed.is_empty() {
            (cols, rows)
        } else {
            absorbed_any = true;
            let merged = absorbed
                .iter()
                .fold(areas[i], |acc, &j| acc.union(&areas[j]));
            areas[i] = merged;
            (
                span(&xs, merged.x1, merged.x2),
                span(&ys, merged.y1, merged.y2),
            )
        };
        for y in rows {
            for x in cols.clone() {
                grid[y * width + x] = Some(i);
            }
        }
    }

    let owners: Vec<bool> = areas
        .iter()
        .enumerate()
        .map(|(i, a)| {
            let x = span(&xs, a.x1, a.x1).start;
            let y = span(&ys, a.y1, a.y1).start;
            grid[y * width + x] == Some(i)
        })
        .collect();
    let mut owners = owners.into_iter();
    areas.retain(|_| owners.next().unwrap_or(false));
    absorbed_any
}

/// Coalesces overlapping regions until no two of them share a cell.
///
/// Areas must be sorted. Resolution is idempotent: a list without overlaps
/// comes back unchanged.
pub(crate) fn resolve_overlaps(areas: &mut Vec<Area>) {
    if areas.len() < 2 {
        return;
    }
    // a grown region may reach regions painted before it; paint again
    while resolve_pass(areas) {}
}

fn parse_area(top_left: &str, bottom_right: &str) -> Result<Area> {
    let (x1, y1) = cell_name_to_coordinates(top_left)?;
    let (x2, y2) = cell_name_to_coordinates(bottom_right)?;
    Ok(Area::new(x1, y1, x2, y2).sorted())
}

impl Workbook {
    /// Merges the cells between two corners, given in any order.
    ///
    /// Overlapping regions are allowed here; they are coalesced into their
    /// bounding rectangle the next time the regions are resolved.
    ///
    /// ```no_run
    /// # use sheetkit::Workbook;
    /// let wb = Workbook::new()?;
    /// wb.merge_cell("Sheet1", "B1", "C1")?;
    /// wb.merge_cell("Sheet1", "B1", "D2")?;
    /// assert_eq!(wb.get_merge_cells("Sheet1")?[0].range()?, "B1:D2");
    /// # Ok::<(), sheetkit::Error>(())
    /// ```
    pub fn merge_cell(&self, sheet: &str, top_left: &str, bottom_right: &str) -> Result<()> {
        let area = parse_area(top_left, bottom_right)?;
        self.with_sheet_mut(sheet, |ws| {
            ws.merges.push(area);
            Ok(())
        })
    }

    /// Removes every merged region intersecting the rectangle
    pub fn unmerge_cell(&self, sheet: &str, top_left: &str, bottom_right: &str) -> Result<()> {
        let area = parse_area(top_left, bottom_right)?;
        self.with_sheet_mut(sheet, |ws| {
            resolve_overlaps(&mut ws.merges);
            ws.merges.retain(|m| !m.overlaps(&area));
            Ok(())
        })
    }

    /// Resolved merged regions of a sheet, each with its top left value
    pub fn get_merge_cells(&self, sheet: &str) -> Result<Vec<MergeCell>> {
        self.with_sheet(sheet, |ws| {
            let mut areas = ws.merges.clone();
            resolve_overlaps(&mut areas);
            areas
                .into_iter()
                .map(|area| {
                    let value = match ws.cell(area.x1, area.y1) {
                        Some(cell) => self.display_value(cell)?,
                        None => String::new(),
                    };
                    Ok(MergeCell { area, value })
                })
                .collect()
        })
    }
}
