// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Sheet lifecycle: listing, creation, deletion, copy, renaming, visibility
//! and the active tab.

use std::collections::BTreeMap;

use log::debug;

use crate::errors::{Error, Result};
use crate::relationships::{CT_WORKSHEET, REL_COMMENTS, REL_VML_DRAWING, REL_WORKSHEET};
use crate::templates::NEW_SHEET;
use crate::utils::{part_dir, rels_path_for, resolve_target};
use crate::workbook::{same_name, SheetKind};
use crate::worksheet::Worksheet;
use crate::xml::{XmlElement, NS_RELATIONSHIPS};
use crate::cache::XmlPart;
use crate::package::CONTENT_TYPES;
use crate::Workbook;

/// Children of `<workbook>` in schema order
const WORKBOOK_ORDER: &[&str] = &[
    "fileVersion",
    "fileSharing",
    "workbookPr",
    "workbookProtection",
    "bookViews",
    "sheets",
    "functionGroups",
    "externalReferences",
    "definedNames",
    "calcPr",
    "oleSize",
    "customWorkbookViews",
    "pivotCaches",
    "smartTagPr",
    "smartTagTypes",
    "webPublishing",
    "fileRecoveryPr",
    "webPublishObjects",
    "extLst",
];

/// Child of `<workbook>` by local name, inserted at its schema position when
/// missing
pub(crate) fn workbook_child_mut<'a>(workbook: &'a mut XmlElement, name: &str) -> &'a mut XmlElement {
    if let Some(pos) = workbook.children.iter().position(|c| c.local_name() == name) {
        return &mut workbook.children[pos];
    }
    let rank = WORKBOOK_ORDER.iter().position(|n| *n == name);
    let pos = workbook
        .children
        .iter()
        .position(|c| {
            let other = WORKBOOK_ORDER.iter().position(|n| *n == c.local_name());
            matches!((rank, other), (Some(r), Some(o)) if o > r)
        })
        .unwrap_or(workbook.children.len());
    workbook.children.insert(pos, XmlElement::new(name));
    &mut workbook.children[pos]
}

/// The `index`-th `<sheet>` element of the workbook
fn nth_sheet(workbook: &mut XmlElement, index: usize) -> Option<&mut XmlElement> {
    workbook
        .child_mut("sheets")?
        .children
        .iter_mut()
        .filter(|c| c.local_name() == "sheet")
        .nth(index)
}

/// Checks the rules spreadsheet applications enforce on sheet names
pub(crate) fn check_sheet_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name.chars().count() > 31
        || name.contains([':', '\\', '/', '?', '*', '[', ']'])
        || name.starts_with('\'')
        || name.ends_with('\'');
    if invalid {
        return Err(Error::InvalidSheetName(name.to_string()));
    }
    Ok(())
}

/// A sheet name as written before `!` in a formula
pub(crate) fn quote_sheet_name(name: &str) -> String {
    let plain = name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if plain {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

/// Rewrites the `old!` and `'old'!` qualifiers of a formula
fn rename_sheet_in_formula(formula: &str, old: &str, new: &str) -> String {
    let replacement = format!("{}!", quote_sheet_name(new));
    let quoted = formula.replace(&format!("'{}'!", old.replace('\'', "''")), &replacement);
    let plain = format!("{old}!");
    let mut res = String::with_capacity(quoted.len());
    let mut rest = quoted.as_str();
    let mut prev: Option<char> = None;
    while let Some(i) = rest.find(&plain) {
        let before = rest[..i].chars().next_back().or(prev);
        res.push_str(&rest[..i]);
        let boundary = before.is_none_or(|c| !(c.is_alphanumeric() || matches!(c, '_' | '.' | '\'')));
        res.push_str(if boundary { &replacement } else { &plain });
        prev = Some('!');
        rest = &rest[i + plain.len()..];
    }
    res.push_str(rest);
    res
}

/// Visibility of a sheet tab, the `state` attribute of `<sheet>`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SheetVisibility {
    /// Tab is shown
    #[default]
    Visible,
    /// Tab is hidden and can be unhidden from the user interface
    Hidden,
    /// Tab is hidden and can only be unhidden programmatically
    VeryHidden,
}

impl SheetVisibility {
    pub(crate) fn from_state(state: Option<&str>) -> SheetVisibility {
        match state {
            Some("hidden") => SheetVisibility::Hidden,
            Some("veryHidden") => SheetVisibility::VeryHidden,
            _ => SheetVisibility::Visible,
        }
    }

    fn as_state(self) -> Option<&'static str> {
        match self {
            SheetVisibility::Visible => None,
            SheetVisibility::Hidden => Some("hidden"),
            SheetVisibility::VeryHidden => Some("veryHidden"),
        }
    }
}

impl Workbook {
    /// Names of every sheet, in tab order
    pub fn sheet_list(&self) -> Result<Vec<String>> {
        Ok(self.sheet_entries()?.into_iter().map(|e| e.name).collect())
    }

    /// Names of every sheet keyed by their `sheetId`
    pub fn sheet_map(&self) -> Result<BTreeMap<u32, String>> {
        Ok(self
            .sheet_entries()?
            .into_iter()
            .map(|e| (e.sheet_id, e.name))
            .collect())
    }

    /// Number of sheets of every kind
    pub fn sheet_count(&self) -> Result<usize> {
        Ok(self.sheet_entries()?.len())
    }

    /// Tab position of a sheet, names being compared case insensitively
    pub fn sheet_index(&self, name: &str) -> Result<Option<usize>> {
        Ok(self
            .sheet_entries()?
            .iter()
            .position(|e| same_name(&e.name, name)))
    }

    /// Name of the sheet at a tab position
    pub fn sheet_name(&self, index: usize) -> Result<Option<String>> {
        Ok(self.sheet_entries()?.into_iter().nth(index).map(|e| e.name))
    }

    /// Appends an empty worksheet and returns its index.
    ///
    /// If a sheet with that name (ignoring case) already exists its index is
    /// returned and nothing changes.
    pub fn new_sheet(&self, name: &str) -> Result<usize> {
        check_sheet_name(name)?;
        let entries = self.sheet_entries()?;
        if let Some(i) = entries.iter().position(|e| same_name(&e.name, name)) {
            return Ok(i);
        }
        let sheet_id = entries.iter().map(|e| e.sheet_id).max().unwrap_or(0) + 1;
        let dir = part_dir(&self.workbook_path);
        let mut n = sheet_id;
        let path = loop {
            let path = resolve_target(dir, &format!("worksheets/sheet{n}.xml"));
            if !self.package.contains(&path) && self.sheets.get(&path).is_none() {
                break path;
            }
            n += 1;
        };
        self.sheets.insert(&path, Worksheet::read(NEW_SHEET.as_bytes())?);

        let types = self.content_types_part()?;
        types.lock().set_override(&path, CT_WORKSHEET);
        self.content_types.mark_dirty(CONTENT_TYPES);

        let rels = self.workbook_rels()?;
        let rel_id = rels
            .lock()
            .add(REL_WORKSHEET, &self.relative_target(&path), None);
        self.rels.mark_dirty(&self.workbook_rels_path());

        let workbook = self.workbook_part()?;
        {
            let mut wb = workbook.lock();
            if wb.attr("xmlns:r").is_none() {
                wb.set_attr("xmlns:r", NS_RELATIONSHIPS);
            }
            workbook_child_mut(&mut wb, "sheets").children.push(
                XmlElement::new("sheet")
                    .with_attr("name", name)
                    .with_attr("sheetId", &sheet_id.to_string())
                    .with_attr("r:id", &rel_id),
            );
        }
        self.mark_workbook_dirty();
        debug!("created sheet {name} at {path}");
        Ok(entries.len())
    }

    /// Deletes a sheet and everything attached to it.
    ///
    /// Defined names scoped to the sheet are removed and the scopes of the
    /// following sheets are shifted. The last remaining sheet cannot be
    /// deleted.
    pub fn delete_sheet(&self, name: &str) -> Result<()> {
        let entries = self.sheet_entries()?;
        let idx = entries
            .iter()
            .position(|e| same_name(&e.name, name))
            .ok_or_else(|| Error::SheetNotExist(name.to_string()))?;
        if entries.len() == 1 {
            return Err(Error::LastSheet);
        }
        let active = entries
            .get(self.active_sheet_index()?)
            .map(|e| e.name.clone());
        let entry = &entries[idx];

        let workbook = self.workbook_part()?;
        {
            let mut wb = workbook.lock();
            if let Some(sheets) = wb.child_mut("sheets") {
                let mut seen = 0;
                sheets.children.retain(|c| {
                    if c.local_name() != "sheet" {
                        return true;
                    }
                    seen += 1;
                    seen != idx + 1
                });
            }
            remove_sheet_scope(&mut wb, idx);
        }
        self.mark_workbook_dirty();

        let rels = self.workbook_rels()?;
        rels.lock().remove_by_id(&entry.rel_id);
        self.rels.mark_dirty(&self.workbook_rels_path());

        self.update_calc_chain(|chain| {
            let before = chain.entries.len();
            chain.remove(entry.sheet_id, None);
            before != chain.entries.len()
        })?;

        if !entry.path.is_empty() {
            let types = self.content_types_part()?;
            if types.lock().remove_override(&entry.path) {
                self.content_types.mark_dirty(CONTENT_TYPES);
            }
            self.delete_comment_parts(&entry.path)?;
            let sheet_rels = rels_path_for(&entry.path);
            self.package.delete(&entry.path);
            self.package.delete(&sheet_rels);
            self.rels.evict(&sheet_rels);
            self.sheets.evict(&entry.path);
        }
        debug!("deleted sheet {}", entry.name);

        let active = active
            .and_then(|n| self.sheet_index(&n).ok().flatten())
            .unwrap_or(0);
        self.set_active_sheet(active)
    }

    /// Replaces the content of the worksheet at `to` by a copy of the one at
    /// `from`.
    ///
    /// Drawings, tables, notes and page setup are not copied; the notes of
    /// the target sheet are deleted.
    pub fn copy_sheet(&self, from: usize, to: usize) -> Result<()> {
        let entries = self.sheet_entries()?;
        if from >= entries.len() || from == to {
            return Err(Error::SheetIndex(from));
        }
        let target = entries.get(to).ok_or(Error::SheetIndex(to))?;
        let src_path = self.worksheet_path(&entries[from].name)?;
        let dst_path = self.worksheet_path(&target.name)?;

        let source = self.load_worksheet(&src_path)?;
        let mut ws = source.lock().clone();
        for name in ["drawing", "legacyDrawing", "tableParts", "pageSetup"] {
            ws.root.remove_children(name);
        }
        if let Some(view) = ws
            .root
            .child_mut("sheetViews")
            .and_then(|v| v.child_mut("sheetView"))
        {
            view.remove_attr("tabSelected");
        }
        self.delete_comment_parts(&dst_path)?;
        self.sheets.insert(&dst_path, ws);

        let src_rels = rels_path_for(&src_path);
        let dst_rels = rels_path_for(&dst_path);
        if self.package.contains(&src_rels) || self.rels.get(&src_rels).is_some() {
            let mut rels = self.part(&self.rels, &src_rels)?.lock().clone();
            rels.remove_by_type(REL_COMMENTS);
            rels.remove_by_type(REL_VML_DRAWING);
            self.rels.insert(&dst_rels, rels);
        } else {
            self.package.delete(&dst_rels);
            self.rels.evict(&dst_rels);
        }
        debug!("copied {src_path} to {dst_path}");
        Ok(())
    }

    /// Renames a sheet.
    ///
    /// Defined names referring to the sheet follow the new name; cell
    /// formulas are left untouched.
    pub fn set_sheet_name(&self, old: &str, new: &str) -> Result<()> {
        check_sheet_name(new)?;
        let entries = self.sheet_entries()?;
        let idx = entries
            .iter()
            .position(|e| same_name(&e.name, old))
            .ok_or_else(|| Error::SheetNotExist(old.to_string()))?;
        if entries
            .iter()
            .enumerate()
            .any(|(i, e)| i != idx && same_name(&e.name, new))
        {
            return Err(Error::SheetNameExists(new.to_string()));
        }
        let old = entries[idx].name.as_str();
        if old == new {
            return Ok(());
        }
        let workbook = self.workbook_part()?;
        {
            let mut wb = workbook.lock();
            if let Some(sheet) = nth_sheet(&mut wb, idx) {
                sheet.set_attr("name", new);
            }
            if let Some(names) = wb.child_mut("definedNames") {
                for dn in &mut names.children {
                    dn.text = rename_sheet_in_formula(&dn.text, old, new);
                }
            }
        }
        self.mark_workbook_dirty();
        Ok(())
    }

    /// Makes the sheet at `index` the active tab, selecting it alone
    pub fn set_active_sheet(&self, index: usize) -> Result<()> {
        let entries = self.sheet_entries()?;
        if index >= entries.len() {
            return Err(Error::SheetIndex(index));
        }
        let workbook = self.workbook_part()?;
        {
            let mut wb = workbook.lock();
            let view = workbook_child_mut(&mut wb, "bookViews").ensure_child("workbookView");
            if index == 0 {
                view.remove_attr("activeTab");
            } else {
                view.set_attr("activeTab", &index.to_string());
            }
        }
        self.mark_workbook_dirty();

        for (i, entry) in entries.iter().enumerate() {
            if entry.kind != SheetKind::Worksheet || entry.path.is_empty() {
                continue;
            }
            let handle = self.load_worksheet(&entry.path)?;
            let changed = {
                let mut ws = handle.lock();
                let selected = i == index;
                if ws.tab_selected() == selected {
                    false
                } else {
                    let view = ws.sheet_view_mut();
                    if selected {
                        view.set_attr("tabSelected", "1");
                    } else {
                        view.remove_attr("tabSelected");
                    }
                    true
                }
            };
            if changed {
                self.sheets.mark_dirty(&entry.path);
            }
        }
        Ok(())
    }

    /// Index of the active tab, 0 when unset or out of range
    pub fn active_sheet_index(&self) -> Result<usize> {
        let count = self.sheet_entries()?.len();
        let workbook = self.workbook_part()?;
        let tab = workbook
            .lock()
            .child("bookViews")
            .and_then(|v| v.child("workbookView"))
            .and_then(|v| v.attr("activeTab"))
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        Ok(if tab < count { tab } else { 0 })
    }

    /// Shows or hides a sheet tab.
    ///
    /// See [`set_sheet_visibility`](Workbook::set_sheet_visibility).
    pub fn set_sheet_visible(&self, sheet: &str, visible: bool) -> Result<()> {
        let visibility = if visible {
            SheetVisibility::Visible
        } else {
            SheetVisibility::Hidden
        };
        self.set_sheet_visibility(sheet, visibility)
    }

    /// Sets the visibility of a sheet tab.
    ///
    /// Hiding is silently ignored when the sheet is selected or when it is
    /// the only visible one: a workbook always keeps a visible tab.
    pub fn set_sheet_visibility(&self, sheet: &str, visibility: SheetVisibility) -> Result<()> {
        let entries = self.sheet_entries()?;
        let idx = entries
            .iter()
            .position(|e| same_name(&e.name, sheet))
            .ok_or_else(|| Error::SheetNotExist(sheet.to_string()))?;
        if visibility != SheetVisibility::Visible {
            let entry = &entries[idx];
            let selected = match entry.kind {
                SheetKind::Worksheet if !entry.path.is_empty() => {
                    self.load_worksheet(&entry.path)?.lock().tab_selected()
                }
                _ => false,
            };
            let others_visible = entries
                .iter()
                .enumerate()
                .any(|(i, e)| i != idx && e.visibility == SheetVisibility::Visible);
            if selected || !others_visible {
                debug!("keeping sheet {} visible", entry.name);
                return Ok(());
            }
        }
        let workbook = self.workbook_part()?;
        {
            let mut wb = workbook.lock();
            if let Some(s) = nth_sheet(&mut wb, idx) {
                match visibility.as_state() {
                    Some(state) => s.set_attr("state", state),
                    None => {
                        s.remove_attr("state");
                    }
                }
            }
        }
        self.mark_workbook_dirty();
        Ok(())
    }

    /// Whether a sheet tab is visible
    pub fn get_sheet_visible(&self, sheet: &str) -> Result<bool> {
        Ok(self.sheet_visibility(sheet)? == SheetVisibility::Visible)
    }

    /// Visibility state of a sheet
    pub fn sheet_visibility(&self, sheet: &str) -> Result<SheetVisibility> {
        Ok(self.sheet_entry(sheet)?.1.visibility)
    }
}

/// Drops the defined names scoped to the removed sheet and shifts the
/// scopes of the sheets after it
fn remove_sheet_scope(workbook: &mut XmlElement, idx: usize) {
    let empty = match workbook.child_mut("definedNames") {
        Some(names) => {
            names.children.retain_mut(|dn| {
                match dn.attr("localSheetId").and_then(|v| v.parse::<usize>().ok()) {
                    Some(id) if id == idx => false,
                    Some(id) if id > idx => {
                        dn.set_attr("localSheetId", &(id - 1).to_string());
                        true
                    }
                    _ => true,
                }
            });
            names.children.is_empty()
        }
        None => false,
    };
    if empty {
        workbook.remove_children("definedNames");
    }
}
