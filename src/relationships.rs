// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Relationship parts (`*.rels`) and the `[Content_Types].xml` registry.
//!
//! Both are decoded into plain vectors; every update is a linear scan, the
//! parts are small.

use std::io::{BufRead, Write};

use crate::cache::XmlPart;
use crate::errors::Result;
use crate::xml::{xml_writer, XmlElement};

const NS_PACKAGE_RELATIONSHIPS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const NS_CONTENT_TYPES: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

pub(crate) const REL_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
pub(crate) const REL_WORKSHEET: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
pub(crate) const REL_CHARTSHEET: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/chartsheet";
pub(crate) const REL_DIALOGSHEET: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/dialogsheet";
pub(crate) const REL_MACROSHEET: &str =
    "http://schemas.microsoft.com/office/2006/relationships/xlMacrosheet";
pub(crate) const REL_SHARED_STRINGS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";
pub(crate) const REL_STYLES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
pub(crate) const REL_CALC_CHAIN: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain";
pub(crate) const REL_VBA_PROJECT: &str =
    "http://schemas.microsoft.com/office/2006/relationships/vbaProject";
pub(crate) const REL_COMMENTS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/comments";
pub(crate) const REL_VML_DRAWING: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/vmlDrawing";

pub(crate) const CT_WORKBOOK_MACRO: &str = "application/vnd.ms-excel.sheet.macroEnabled.main+xml";
pub(crate) const CT_WORKSHEET: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
pub(crate) const CT_SHARED_STRINGS: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml";
pub(crate) const CT_CALC_CHAIN: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.calcChain+xml";
pub(crate) const CT_VBA_PROJECT: &str = "application/vnd.ms-office.vbaProject";
pub(crate) const CT_COMMENTS: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.comments+xml";
pub(crate) const CT_VML_DRAWING: &str = "application/vnd.openxmlformats-officedocument.vmlDrawing";

/// Relationship types a source part may only reference once; adding one of
/// them again retargets the existing relationship
const SINGLETON_TYPES: &[&str] = &[
    REL_SHARED_STRINGS,
    REL_STYLES,
    REL_CALC_CHAIN,
    REL_VBA_PROJECT,
    REL_COMMENTS,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub target_mode: Option<String>,
}

/// The relationships of one source part
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Relationships {
    pub items: Vec<Relationship>,
}

impl Relationships {
    /// Registers a relationship and returns its id.
    ///
    /// A singleton type that is already present gets its target rewritten
    /// and keeps its id. Otherwise the new id is `rId{max + 1}`.
    pub fn add(&mut self, rel_type: &str, target: &str, target_mode: Option<&str>) -> String {
        let mut max = 0;
        for rel in &self.items {
            if let Some(n) = rel.id.strip_prefix("rId").and_then(|n| n.parse::<u32>().ok()) {
                max = max.max(n);
            }
        }
        if SINGLETON_TYPES.contains(&rel_type) {
            if let Some(rel) = self.items.iter_mut().find(|r| r.rel_type == rel_type) {
                rel.target = target.to_string();
                return rel.id.clone();
            }
        }
        let id = format!("rId{}", max + 1);
        self.items.push(Relationship {
            id: id.clone(),
            rel_type: rel_type.to_string(),
            target: target.to_string(),
            target_mode: target_mode.map(str::to_string),
        });
        id
    }

    pub fn remove_by_id(&mut self, id: &str) -> Option<Relationship> {
        let i = self.items.iter().position(|r| r.id == id)?;
        Some(self.items.remove(i))
    }

    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.items.iter().find(|r| r.id == id)
    }

    pub fn find_by_type(&self, rel_type: &str) -> Option<&Relationship> {
        self.items.iter().find(|r| r.rel_type == rel_type)
    }

    pub fn remove_by_type(&mut self, rel_type: &str) -> usize {
        let before = self.items.len();
        self.items.retain(|r| r.rel_type != rel_type);
        before - self.items.len()
    }
}

impl XmlPart for Relationships {
    fn read<R: BufRead>(reader: R) -> Result<Self> {
        let root = XmlElement::parse(reader)?;
        let items = root
            .children_named("Relationship")
            .filter_map(|e| {
                Some(Relationship {
                    id: e.attr("Id")?.to_string(),
                    rel_type: e.attr("Type").unwrap_or_default().to_string(),
                    target: e.attr("Target").unwrap_or_default().to_string(),
                    target_mode: e.attr("TargetMode").map(str::to_string),
                })
            })
            .collect();
        Ok(Relationships { items })
    }

    fn write<W: Write>(&self, writer: W) -> Result<()> {
        let mut root = XmlElement::new("Relationships").with_attr("xmlns", NS_PACKAGE_RELATIONSHIPS);
        for rel in &self.items {
            let mut e = XmlElement::new("Relationship")
                .with_attr("Id", &rel.id)
                .with_attr("Type", &rel.rel_type)
                .with_attr("Target", &rel.target);
            if let Some(mode) = &rel.target_mode {
                e.set_attr("TargetMode", mode);
            }
            root.children.push(e);
        }
        let mut writer = xml_writer(writer)?;
        root.write(&mut writer)
    }
}

/// `[Content_Types].xml`: content type by extension and per part overrides
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ContentTypes {
    /// `(extension, content type)`
    pub defaults: Vec<(String, String)>,
    /// `(part name, content type)`, part names start with `/`
    pub overrides: Vec<(String, String)>,
}

/// Normalizes a part path into a part name (`xl/a.xml` -> `/xl/a.xml`)
pub(crate) fn part_name(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

impl ContentTypes {
    /// Sets the override of a part, replacing any previous one
    pub fn set_override(&mut self, path: &str, content_type: &str) {
        let name = part_name(path);
        match self.overrides.iter_mut().find(|(p, _)| *p == name) {
            Some((_, ct)) => *ct = content_type.to_string(),
            None => self.overrides.push((name, content_type.to_string())),
        }
    }

    /// Removes every override of a part, returns whether one existed
    pub fn remove_override(&mut self, path: &str) -> bool {
        let name = part_name(path);
        let before = self.overrides.len();
        self.overrides.retain(|(p, _)| *p != name);
        before != self.overrides.len()
    }

    #[cfg(test)]
    pub fn override_for(&self, path: &str) -> Option<&str> {
        let name = part_name(path);
        self.overrides
            .iter()
            .find(|(p, _)| *p == name)
            .map(|(_, ct)| ct.as_str())
    }

    pub fn set_default(&mut self, extension: &str, content_type: &str) {
        match self
            .defaults
            .iter_mut()
            .find(|(e, _)| e.eq_ignore_ascii_case(extension))
        {
            Some((_, ct)) => *ct = content_type.to_string(),
            None => self
                .defaults
                .push((extension.to_string(), content_type.to_string())),
        }
    }
}

impl XmlPart for ContentTypes {
    fn read<R: BufRead>(reader: R) -> Result<Self> {
        let root = XmlElement::parse(reader)?;
        let mut types = ContentTypes::default();
        for e in &root.children {
            let ct = e.attr("ContentType").unwrap_or_default().to_string();
            match (e.local_name(), e.attr("Extension"), e.attr("PartName")) {
                ("Default", Some(ext), _) => types.defaults.push((ext.to_string(), ct)),
                ("Override", _, Some(name)) => types.overrides.push((name.to_string(), ct)),
                _ => (),
            }
        }
        Ok(types)
    }

    fn write<W: Write>(&self, writer: W) -> Result<()> {
        let mut root = XmlElement::new("Types").with_attr("xmlns", NS_CONTENT_TYPES);
        for (ext, ct) in &self.defaults {
            root.children.push(
                XmlElement::new("Default")
                    .with_attr("Extension", ext)
                    .with_attr("ContentType", ct),
            );
        }
        for (name, ct) in &self.overrides {
            root.children.push(
                XmlElement::new("Override")
                    .with_attr("PartName", name)
                    .with_attr("ContentType", ct),
            );
        }
        let mut writer = xml_writer(writer)?;
        root.write(&mut writer)
    }
}
