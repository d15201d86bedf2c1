// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! The shared string table (`xl/sharedStrings.xml`).
//!
//! Indices are stable for the lifetime of the document: strings are only ever
//! appended. Plain strings are deduplicated by exact text; rich text entries
//! are kept as read so that their runs survive a save.

use std::collections::HashMap;
use std::io::{BufRead, Write};

use quick_xml::events::Event;
use quick_xml::name::QName;

use crate::cache::XmlPart;
use crate::errors::Result;
use crate::utils::parse_u32;
use crate::xml::{get_attribute, xml_reader, xml_writer, XmlElement, NS_SPREADSHEETML};

#[derive(Debug, Clone, PartialEq)]
struct Item {
    text: String,
    /// the source `<si>` when it holds more than a single `<t>`
    rich: Option<XmlElement>,
}

/// Decoded shared strings
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct SharedStrings {
    items: Vec<Item>,
    lookup: HashMap<String, usize>,
    /// total number of references, as declared by the part
    count: usize,
}

/// Text of a string item: every `t` run, phonetic runs excluded
pub(crate) fn item_text(si: &XmlElement) -> String {
    fn collect(e: &XmlElement, out: &mut String) {
        for c in &e.children {
            match c.local_name() {
                "t" => out.push_str(&c.text),
                "rPh" => (),
                _ => collect(c, out),
            }
        }
    }
    let mut out = String::new();
    collect(si, &mut out);
    out
}

impl SharedStrings {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.items.get(idx).map(|i| i.text.as_str())
    }

    /// Index of `s`, appending it when it is not in the table yet
    pub fn add(&mut self, s: &str) -> usize {
        self.count += 1;
        if let Some(&idx) = self.lookup.get(s) {
            return idx;
        }
        self.push(s.to_string(), None)
    }

    fn push(&mut self, text: String, rich: Option<XmlElement>) -> usize {
        let idx = self.items.len();
        if rich.is_none() {
            self.lookup.entry(text.clone()).or_insert(idx);
        }
        self.items.push(Item { text, rich });
        idx
    }
}

fn needs_preserve(s: &str) -> bool {
    s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace) || s.contains('\n')
}

/// A `<t>` element, flagged `xml:space="preserve"` when the text would
/// otherwise lose whitespace
pub(crate) fn text_element(s: &str) -> XmlElement {
    let mut t = XmlElement::new("t");
    if needs_preserve(s) {
        t.set_attr("xml:space", "preserve");
    }
    t.text = s.to_string();
    t
}

impl XmlPart for SharedStrings {
    fn read<R: BufRead>(reader: R) -> Result<Self> {
        let mut xml = xml_reader(reader);
        let mut buf = Vec::new();
        let mut inner = Vec::new();
        let mut sst = SharedStrings::default();
        loop {
            buf.clear();
            match xml.read_event_into(&mut buf)? {
                Event::Start(ref e) if e.local_name().as_ref() == b"sst" => {
                    if let Some(count) = get_attribute(e.attributes(), QName(b"count"))? {
                        sst.count = parse_u32(&count).unwrap_or(0) as usize;
                    }
                }
                Event::Start(ref e) if e.local_name().as_ref() == b"si" => {
                    let si = XmlElement::read(&mut xml, e, &mut inner)?;
                    let text = item_text(&si);
                    let plain = si.children.len() == 1 && si.children[0].local_name() == "t";
                    sst.push(text, (!plain).then_some(si));
                }
                Event::Eof => break,
                _ => (),
            }
        }
        sst.count = sst.count.max(sst.items.len());
        Ok(sst)
    }

    fn write<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = xml_writer(writer)?;
        let mut root = XmlElement::new("sst")
            .with_attr("xmlns", NS_SPREADSHEETML)
            .with_attr("count", &self.count.max(self.items.len()).to_string())
            .with_attr("uniqueCount", &self.items.len().to_string());
        root.children.reserve(self.items.len());
        for item in &self.items {
            match &item.rich {
                Some(si) => root.children.push(si.clone()),
                None => {
                    let mut si = XmlElement::new("si");
                    si.children.push(text_element(&item.text));
                    root.children.push(si);
                }
            }
        }
        root.write(&mut writer)
    }
}
