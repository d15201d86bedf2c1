// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Cell notes.
//!
//! A worksheet with notes references two parts through its relationships: a
//! `commentsN.xml` part holding authors and texts, and a legacy VML drawing
//! (`vmlDrawingN.vml`) holding one hidden shape per note, which is what
//! spreadsheet applications actually display. The worksheet points to the
//! drawing with its `legacyDrawing` element.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};

use log::debug;
use quick_xml::Writer;

use crate::cache::{Handle, XmlPart};
use crate::coordinates::{cell_name_to_coordinates, coordinates_to_cell_name};
use crate::errors::Result;
use crate::package::CONTENT_TYPES;
use crate::relationships::{CT_COMMENTS, CT_VML_DRAWING, REL_COMMENTS, REL_VML_DRAWING};
use crate::shared_strings::{item_text, text_element};
use crate::utils::{parse_u32, part_dir, rels_path_for, relative_path, resolve_target};
use crate::workbook::SheetKind;
use crate::worksheet::Worksheet;
use crate::xml::{xml_writer, XmlElement, NS_RELATIONSHIPS, NS_SPREADSHEETML};
use crate::Workbook;

/// Longest author name kept, in characters
const MAX_AUTHOR_LENGTH: usize = 255;
/// Longest note text kept, in characters
const MAX_TEXT_LENGTH: usize = 32512;

const NS_VML: &str = "urn:schemas-microsoft-com:vml";
const NS_OFFICE: &str = "urn:schemas-microsoft-com:office:office";
const NS_EXCEL: &str = "urn:schemas-microsoft-com:office:excel";

/// A note attached to a cell
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comment {
    /// Cell the note belongs to, `A1` style
    pub cell: String,
    /// Author shown above the text
    pub author: String,
    /// Plain text of the note, runs concatenated
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    cell: String,
    author_id: usize,
    /// the `<text>` element, runs and formatting kept as read
    text: XmlElement,
}

/// A decoded `commentsN.xml` part
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Comments {
    authors: Vec<String>,
    entries: Vec<Entry>,
}

impl Comments {
    fn author_id(&mut self, author: &str) -> usize {
        match self.authors.iter().position(|a| a == author) {
            Some(id) => id,
            None => {
                self.authors.push(author.to_string());
                self.authors.len() - 1
            }
        }
    }

    /// Adds a note, replacing the one of the same cell.
    ///
    /// Returns whether a note was replaced.
    pub fn set(&mut self, comment: &Comment) -> bool {
        let author_id = self.author_id(&comment.author);
        let mut r = XmlElement::new("r");
        r.children.push(text_element(&comment.text));
        let mut text = XmlElement::new("text");
        text.children.push(r);
        let entry = Entry {
            cell: comment.cell.clone(),
            author_id,
            text,
        };
        match self.entries.iter_mut().find(|e| e.cell == comment.cell) {
            Some(e) => {
                *e = entry;
                true
            }
            None => {
                self.entries.push(entry);
                false
            }
        }
    }

    pub fn list(&self) -> Vec<Comment> {
        self.entries
            .iter()
            .map(|e| Comment {
                cell: e.cell.clone(),
                author: self.authors.get(e.author_id).cloned().unwrap_or_default(),
                text: item_text(&e.text),
            })
            .collect()
    }
}

impl XmlPart for Comments {
    fn read<R: BufRead>(reader: R) -> Result<Self> {
        let root = XmlElement::parse(reader)?;
        let authors = root
            .child("authors")
            .map(|a| a.children_named("author").map(|e| e.text.clone()).collect())
            .unwrap_or_default();
        let entries = root
            .child("commentList")
            .map(|list| {
                list.children_named("comment")
                    .map(|c| Entry {
                        cell: c.attr("ref").unwrap_or_default().to_string(),
                        author_id: c
                            .attr("authorId")
                            .and_then(|v| parse_u32(v.as_bytes()))
                            .unwrap_or(0) as usize,
                        text: c
                            .child("text")
                            .cloned()
                            .unwrap_or_else(|| XmlElement::new("text")),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(Comments { authors, entries })
    }

    fn write<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = xml_writer(writer)?;
        let mut authors = XmlElement::new("authors");
        for a in &self.authors {
            let mut e = XmlElement::new("author");
            e.text = a.clone();
            authors.children.push(e);
        }
        let mut list = XmlElement::new("commentList");
        for entry in &self.entries {
            let mut c = XmlElement::new("comment")
                .with_attr("ref", &entry.cell)
                .with_attr("authorId", &entry.author_id.to_string());
            c.children.push(entry.text.clone());
            list.children.push(c);
        }
        let mut root = XmlElement::new("comments").with_attr("xmlns", NS_SPREADSHEETML);
        root.children.push(authors);
        root.children.push(list);
        root.write(&mut writer)
    }
}

/// A legacy VML drawing, kept as a tree
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct VmlDrawing {
    pub root: XmlElement,
}

impl VmlDrawing {
    /// An empty drawing whose shape ids are allocated from block `n`
    fn new(n: u32) -> VmlDrawing {
        let mut layout = XmlElement::new("o:shapelayout").with_attr("v:ext", "edit");
        layout.children.push(
            XmlElement::new("o:idmap")
                .with_attr("v:ext", "edit")
                .with_attr("data", &n.to_string()),
        );
        let mut shape_type = XmlElement::new("v:shapetype")
            .with_attr("id", "_x0000_t202")
            .with_attr("coordsize", "21600,21600")
            .with_attr("o:spt", "202")
            .with_attr("path", "m,l,21600r21600,l21600,xe");
        shape_type
            .children
            .push(XmlElement::new("v:stroke").with_attr("joinstyle", "miter"));
        shape_type.children.push(
            XmlElement::new("v:path")
                .with_attr("gradientshapeok", "t")
                .with_attr("o:connecttype", "rect"),
        );
        let mut root = XmlElement::new("xml")
            .with_attr("xmlns:v", NS_VML)
            .with_attr("xmlns:o", NS_OFFICE)
            .with_attr("xmlns:x", NS_EXCEL);
        root.children.push(layout);
        root.children.push(shape_type);
        VmlDrawing { root }
    }

    fn shapes(&self) -> impl Iterator<Item = &XmlElement> {
        self.root.children_named("shape")
    }

    /// Next free `_x0000_sN` shape number
    fn next_shape_id(&self, n: u32) -> u32 {
        self.shapes()
            .filter_map(|s| s.attr("id")?.strip_prefix("_x0000_s")?.parse::<u32>().ok())
            .max()
            .map_or(n * 1024 + 1, |id| id + 1)
    }

    /// Removes the note shape anchored at a zero based cell position
    fn remove_note(&mut self, col0: u32, row0: u32) {
        let at = |shape: &XmlElement, name: &str| {
            shape
                .child("ClientData")
                .and_then(|d| d.child(name))
                .and_then(|e| parse_u32(e.text.trim().as_bytes()))
        };
        self.root.children.retain(|c| {
            !(c.local_name() == "shape"
                && at(c, "Column") == Some(col0)
                && at(c, "Row") == Some(row0))
        });
    }

    fn add_note(&mut self, id: u32, col0: u32, row0: u32, text: &str) {
        let lines = text.split('\n').count() as u32;
        let cols = text.split('\n').map(|l| l.chars().count()).max().unwrap_or(0) as u32;
        let anchor = format!(
            "{}, 23, {}, 0, {}, {}, {}, 5",
            1 + col0,
            1 + row0,
            2 + col0 + lines,
            cols + col0,
            2 + row0 + lines
        );
        let mut textbox = XmlElement::new("v:textbox").with_attr("style", "mso-direction-alt:auto");
        textbox
            .children
            .push(XmlElement::new("div").with_attr("style", "text-align:left"));
        let mut data = XmlElement::new("x:ClientData").with_attr("ObjectType", "Note");
        for (name, value) in [
            ("x:MoveWithCells", String::new()),
            ("x:SizeWithCells", String::new()),
            ("x:Anchor", anchor),
            ("x:AutoFill", "False".to_string()),
            ("x:Row", row0.to_string()),
            ("x:Column", col0.to_string()),
        ] {
            let mut e = XmlElement::new(name);
            e.text = value;
            data.children.push(e);
        }
        let mut shape = XmlElement::new("v:shape")
            .with_attr("id", &format!("_x0000_s{id}"))
            .with_attr("type", "#_x0000_t202")
            .with_attr(
                "style",
                "position:absolute;margin-left:59.25pt;margin-top:1.5pt;width:108pt;height:59.25pt;z-index:1;visibility:hidden",
            )
            .with_attr("fillcolor", "#ffffe1")
            .with_attr("o:insetmode", "auto");
        shape
            .children
            .push(XmlElement::new("v:fill").with_attr("color2", "#ffffe1"));
        shape.children.push(
            XmlElement::new("v:shadow")
                .with_attr("on", "t")
                .with_attr("color", "black")
                .with_attr("obscured", "t"),
        );
        shape
            .children
            .push(XmlElement::new("v:path").with_attr("o:connecttype", "none"));
        shape.children.push(textbox);
        shape.children.push(data);
        self.root.children.push(shape);
    }
}

impl XmlPart for VmlDrawing {
    fn read<R: BufRead>(reader: R) -> Result<Self> {
        Ok(VmlDrawing {
            root: XmlElement::parse(reader)?,
        })
    }

    // VML parts are written without an xml declaration
    fn write<W: Write>(&self, writer: W) -> Result<()> {
        self.root.write(&mut Writer::new(writer))
    }
}

/// Truncates `s` to at most `max` characters
fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((i, _)) => s[..i].to_string(),
        None => s.to_string(),
    }
}

/// Where the notes of one worksheet live
struct CommentParts {
    comments: String,
    vml: String,
    /// shape id block of a new drawing
    block: u32,
}

impl Workbook {
    /// Path of the part a worksheet relationship of this type points to
    fn sheet_related_path(&self, sheet_path: &str, rel_type: &str) -> Result<Option<String>> {
        let rels_path = rels_path_for(sheet_path);
        if !self.package.contains(&rels_path) && self.rels.get(&rels_path).is_none() {
            return Ok(None);
        }
        let rels = self.part(&self.rels, &rels_path)?;
        let target = rels
            .lock()
            .find_by_type(rel_type)
            .map(|r| resolve_target(part_dir(sheet_path), &r.target));
        Ok(target)
    }

    fn part_exists(&self, path: &str) -> bool {
        self.package.contains(path)
            || self.comments.get(path).is_some()
            || self.vml_drawings.get(path).is_some()
    }

    /// Finds, or allocates and links, the notes parts of a worksheet
    fn comment_parts(&self, sheet_path: &str, handle: &Handle<Worksheet>) -> Result<CommentParts> {
        let rels_path = rels_path_for(sheet_path);
        let sheet_dir = part_dir(sheet_path);
        let base = part_dir(&self.workbook_path);
        let legacy = handle
            .lock()
            .root
            .child("legacyDrawing")
            .and_then(|e| e.attr_local("id"))
            .map(str::to_string);

        let mut n = 1;
        while self.part_exists(&resolve_target(base, &format!("comments{n}.xml")))
            || self.part_exists(&resolve_target(base, &format!("drawings/vmlDrawing{n}.vml")))
        {
            n += 1;
        }

        let rels = self.part(&self.rels, &rels_path)?;
        let (parts, new_legacy) = {
            let mut rels = rels.lock();
            let existing_vml = legacy
                .as_deref()
                .and_then(|id| rels.get(id))
                .filter(|r| r.rel_type == REL_VML_DRAWING)
                .map(|r| resolve_target(sheet_dir, &r.target));
            let existing_comments = rels
                .find_by_type(REL_COMMENTS)
                .map(|r| resolve_target(sheet_dir, &r.target));
            let comments = existing_comments.unwrap_or_else(|| {
                let path = resolve_target(base, &format!("comments{n}.xml"));
                rels.add(REL_COMMENTS, &relative_path(sheet_dir, &path), None);
                path
            });
            let (vml, new_legacy) = match existing_vml {
                Some(path) => (path, None),
                None => {
                    let path = resolve_target(base, &format!("drawings/vmlDrawing{n}.vml"));
                    let id = rels.add(REL_VML_DRAWING, &relative_path(sheet_dir, &path), None);
                    (path, Some(id))
                }
            };
            let parts = CommentParts {
                comments,
                vml,
                block: n,
            };
            (parts, new_legacy)
        };
        self.rels.mark_dirty(&rels_path);

        if let Some(id) = new_legacy {
            {
                let mut ws = handle.lock();
                if ws.root.attr("xmlns:r").is_none() {
                    ws.root.set_attr("xmlns:r", NS_RELATIONSHIPS);
                }
                ws.root.remove_children("legacyDrawing");
                ws.root
                    .children
                    .push(XmlElement::new("legacyDrawing").with_attr("r:id", &id));
            }
            self.sheets.mark_dirty(sheet_path);
            debug!("linked {} to {sheet_path}", parts.vml);
        }
        Ok(parts)
    }

    fn vml_drawing(&self, path: &str, block: u32) -> Result<Handle<VmlDrawing>> {
        self.vml_drawings.get_or_load(path, || {
            match self.package.open_reader(path)? {
                Some(reader) => VmlDrawing::read(reader),
                None => Ok(VmlDrawing::new(block)),
            }
        })
    }

    /// Adds a note to a cell, replacing the note it already has.
    ///
    /// Authors are cut to 255 characters and texts to 32512.
    pub fn add_comment(&self, sheet: &str, comment: &Comment) -> Result<()> {
        let (col, row) = cell_name_to_coordinates(&comment.cell)?;
        let comment = Comment {
            cell: coordinates_to_cell_name(col, row)?,
            author: truncate(&comment.author, MAX_AUTHOR_LENGTH),
            text: truncate(&comment.text, MAX_TEXT_LENGTH),
        };
        let (sheet_path, handle) = self.worksheet(sheet)?;
        let parts = self.comment_parts(&sheet_path, &handle)?;
        drop(handle);

        let comments = self.part(&self.comments, &parts.comments)?;
        let replaced = comments.lock().set(&comment);
        self.comments.mark_dirty(&parts.comments);

        let vml = self.vml_drawing(&parts.vml, parts.block)?;
        {
            let mut vml = vml.lock();
            if replaced {
                vml.remove_note(col - 1, row - 1);
            }
            let id = vml.next_shape_id(parts.block);
            vml.add_note(id, col - 1, row - 1, &comment.text);
        }
        self.vml_drawings.mark_dirty(&parts.vml);

        let types = self.content_types_part()?;
        {
            let mut types = types.lock();
            types.set_default("vml", CT_VML_DRAWING);
            types.set_override(&parts.comments, CT_COMMENTS);
        }
        self.content_types.mark_dirty(CONTENT_TYPES);
        debug!("added comment on {sheet}!{}", comment.cell);
        Ok(())
    }

    /// Notes of every worksheet that has some, by sheet name
    pub fn get_comments(&self) -> Result<BTreeMap<String, Vec<Comment>>> {
        let mut all = BTreeMap::new();
        for entry in self.sheet_entries()? {
            if entry.kind != SheetKind::Worksheet || entry.path.is_empty() {
                continue;
            }
            let Some(path) = self.sheet_related_path(&entry.path, REL_COMMENTS)? else {
                continue;
            };
            if !self.part_exists(&path) {
                continue;
            }
            let list = self.part(&self.comments, &path)?.lock().list();
            if !list.is_empty() {
                all.insert(entry.name, list);
            }
        }
        Ok(all)
    }

    /// Deletes the notes parts linked to a worksheet, and their content
    /// types. The worksheet relationships are left to the caller.
    pub(crate) fn delete_comment_parts(&self, sheet_path: &str) -> Result<()> {
        let comments = self.sheet_related_path(sheet_path, REL_COMMENTS)?;
        let vml = self.sheet_related_path(sheet_path, REL_VML_DRAWING)?;
        let types = self.content_types_part()?;
        for path in comments.iter().chain(vml.iter()) {
            self.package.delete(path);
            self.comments.evict(path);
            self.vml_drawings.evict(path);
            if types.lock().remove_override(path) {
                self.content_types.mark_dirty(CONTENT_TYPES);
            }
        }
        Ok(())
    }
}
