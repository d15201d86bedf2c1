// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Workbook and sheet scoped defined names (`<definedNames>`).

use crate::errors::{Error, Result};
use crate::sheet::workbook_child_mut;
use crate::workbook::same_name;
use crate::xml::XmlElement;
use crate::Workbook;

/// A named formula or range
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefinedName {
    /// Name, unique per scope ignoring case
    pub name: String,
    /// Free text shown by spreadsheet applications
    pub comment: Option<String>,
    /// Formula the name stands for (`Sheet1!$A$1:$B$3`)
    pub refers_to: String,
    /// Sheet the name is local to, `None` for the whole workbook
    pub scope: Option<String>,
}

impl DefinedName {
    /// Creates a workbook-scoped name
    pub fn new(name: &str, refers_to: &str) -> DefinedName {
        DefinedName {
            name: name.to_string(),
            refers_to: refers_to.to_string(),
            ..Default::default()
        }
    }

    /// Restricts the name to one sheet
    pub fn with_scope(mut self, sheet: &str) -> DefinedName {
        self.scope = Some(sheet.to_string());
        self
    }
}

fn local_sheet_id(dn: &XmlElement) -> Option<usize> {
    dn.attr("localSheetId").and_then(|v| v.parse().ok())
}

impl Workbook {
    /// Position of the scope sheet, `None` for the workbook scope
    fn scope_index(&self, scope: Option<&str>) -> Result<Option<usize>> {
        match scope {
            None => Ok(None),
            Some(sheet) => Ok(Some(self.sheet_entry(sheet)?.0)),
        }
    }

    /// Adds a defined name.
    ///
    /// Fails with [`Error::DefinedNameDuplicate`] when the scope already has a
    /// name spelled the same way, case aside.
    pub fn set_defined_name(&self, defined_name: &DefinedName) -> Result<()> {
        if defined_name.name.is_empty() || defined_name.refers_to.is_empty() {
            return Err(Error::InvalidDefinedName(defined_name.name.clone()));
        }
        let scope = self.scope_index(defined_name.scope.as_deref())?;
        let workbook = self.workbook_part()?;
        {
            let mut wb = workbook.lock();
            let duplicate = wb.child("definedNames").is_some_and(|names| {
                names.children_named("definedName").any(|dn| {
                    local_sheet_id(dn) == scope
                        && dn.attr("name").is_some_and(|n| same_name(n, &defined_name.name))
                })
            });
            if duplicate {
                return Err(Error::DefinedNameDuplicate(defined_name.name.clone()));
            }
            let mut dn = XmlElement::new("definedName").with_attr("name", &defined_name.name);
            if let Some(comment) = &defined_name.comment {
                dn.set_attr("comment", comment);
            }
            if let Some(idx) = scope {
                dn.set_attr("localSheetId", &idx.to_string());
            }
            dn.text = defined_name.refers_to.clone();
            workbook_child_mut(&mut wb, "definedNames").children.push(dn);
        }
        self.mark_workbook_dirty();
        Ok(())
    }

    /// Removes a defined name from a scope, the workbook when `scope` is
    /// `None`
    pub fn delete_defined_name(&self, name: &str, scope: Option<&str>) -> Result<()> {
        let not_found = || Error::DefinedNameScope(name.to_string());
        let scope = match self.scope_index(scope) {
            Ok(scope) => scope,
            Err(Error::SheetNotExist(_)) => return Err(not_found()),
            Err(e) => return Err(e),
        };
        let workbook = self.workbook_part()?;
        {
            let mut wb = workbook.lock();
            let names = wb.child_mut("definedNames").ok_or_else(not_found)?;
            let pos = names
                .children
                .iter()
                .position(|dn| {
                    local_sheet_id(dn) == scope && dn.attr("name").is_some_and(|n| same_name(n, name))
                })
                .ok_or_else(not_found)?;
            names.children.remove(pos);
            if names.children.is_empty() {
                wb.remove_children("definedNames");
            }
        }
        self.mark_workbook_dirty();
        Ok(())
    }

    /// Every defined name of the workbook, in document order
    pub fn defined_names(&self) -> Result<Vec<DefinedName>> {
        let sheets = self.sheet_list()?;
        let workbook = self.workbook_part()?;
        let wb = workbook.lock();
        let Some(names) = wb.child("definedNames") else {
            return Ok(Vec::new());
        };
        Ok(names
            .children_named("definedName")
            .map(|dn| DefinedName {
                name: dn.attr("name").unwrap_or_default().to_string(),
                comment: dn.attr("comment").map(str::to_string),
                refers_to: dn.text.clone(),
                scope: local_sheet_id(dn).and_then(|i| sheets.get(i).cloned()),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_names() {
        let wb = Workbook::new().unwrap();
        wb.new_sheet("Data").unwrap();
        wb.set_defined_name(&DefinedName::new("Amount", "Sheet1!$A$2:$D$5"))
            .unwrap();
        wb.set_defined_name(&DefinedName::new("Amount", "Data!$A$1").with_scope("Data"))
            .unwrap();
        assert!(matches!(
            wb.set_defined_name(&DefinedName::new("amount", "Sheet1!$A$1")),
            Err(Error::DefinedNameDuplicate(_))
        ));
        assert!(matches!(
            wb.set_defined_name(&DefinedName::new("x", "1").with_scope("Nope")),
            Err(Error::SheetNotExist(_))
        ));
        assert!(matches!(
            wb.set_defined_name(&DefinedName::new("", "1")),
            Err(Error::InvalidDefinedName(_))
        ));

        let names = wb.defined_names().unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(names[1].scope.as_deref(), Some("Data"));
        assert_eq!(names[1].refers_to, "Data!$A$1");

        wb.delete_defined_name("Amount", Some("Data")).unwrap();
        assert!(matches!(
            wb.delete_defined_name("Amount", Some("Data")),
            Err(Error::DefinedNameScope(_))
        ));
        wb.delete_defined_name("Amount", None).unwrap();
        assert!(wb.defined_names().unwrap().is_empty());
        assert!(wb.workbook_part().unwrap().lock().child("definedNames").is_none());
    }

    #[test]
    fn sheet_changes_follow_into_names() {
        let wb = Workbook::new().unwrap();
        wb.new_sheet("Two").unwrap();
        wb.new_sheet("Three").unwrap();
        wb.set_defined_name(&DefinedName::new("Local", "Two!$A$1").with_scope("Two"))
            .unwrap();
        wb.set_defined_name(&DefinedName::new("Last", "Three!$B$2").with_scope("Three"))
            .unwrap();
        wb.set_defined_name(&DefinedName::new("All", "SUM(Three!$A:$A)")).unwrap();

        wb.set_sheet_name("Three", "Final sheet").unwrap();
        wb.delete_sheet("Two").unwrap();

        let names = wb.defined_names().unwrap();
        assert_eq!(
            names,
            [
                DefinedName::new("Last", "'Final sheet'!$B$2").with_scope("Final sheet"),
                DefinedName::new("All", "SUM('Final sheet'!$A:$A)"),
            ]
        );
    }
}
