// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Xml plumbing shared by every part: reader configuration, entity
//! handling and a small owned element tree used for the parts (or part
//! fragments) the crate does not model field by field.

use std::borrow::Cow;
use std::io::{BufRead, Write};

use quick_xml::events::attributes::Attributes;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesDecl, BytesEnd, BytesRef, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::{Decoder, Reader, Writer};

use crate::cache::XmlPart;
use crate::errors::{Error, Result};

pub(crate) const NS_SPREADSHEETML: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
pub(crate) const NS_RELATIONSHIPS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Creates a pull parser with the configuration every part reader uses
pub(crate) fn xml_reader<R: BufRead>(reader: R) -> Reader<R> {
    let mut r = Reader::from_reader(reader);
    let config = r.config_mut();
    config.check_end_names = false;
    config.trim_text(false);
    config.check_comments = false;
    config.expand_empty_elements = true;
    r
}

/// Creates a writer and emits the standalone xml declaration
pub(crate) fn xml_writer<W: Write>(inner: W) -> Result<Writer<W>> {
    let mut writer = Writer::new(inner);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    writer.write_event(Event::Text(BytesText::new("\n")))?;
    Ok(writer)
}

/// Pushes the text a general reference (`&amp;`, `&#x41;`, ...) stands for.
///
/// References that are neither character references nor predefined entities
/// are kept verbatim.
pub(crate) fn push_general_ref(r: &BytesRef, out: &mut String) -> Result<()> {
    if let Some(c) = r.resolve_char_ref()? {
        out.push(c);
        return Ok(());
    }
    let name = r.decode()?;
    match resolve_predefined_entity(&name) {
        Some(s) => out.push_str(s),
        None => {
            out.push('&');
            out.push_str(&name);
            out.push(';');
        }
    }
    Ok(())
}

/// Local part of a (possibly prefixed) name
pub(crate) fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

/// search through an Element's attributes for the named one
pub(crate) fn get_attribute<'a>(atts: Attributes<'a>, n: QName) -> Result<Option<Cow<'a, [u8]>>> {
    for a in atts {
        let a = a?;
        if a.key == n {
            return Ok(Some(a.value));
        }
    }
    Ok(None)
}

/// All attributes of a start tag, unescaped, in document order
pub(crate) fn attributes(e: &BytesStart, decoder: Decoder) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for a in e.attributes() {
        let a = a?;
        let key = std::str::from_utf8(a.key.as_ref())?.to_string();
        out.push((key, a.decode_and_unescape_value(decoder)?.into_owned()));
    }
    Ok(out)
}

/// Reads the text content of the current element up to its end tag.
///
/// Nested elements are skipped but their text is kept.
pub(crate) fn read_text<R: BufRead>(
    xml: &mut Reader<R>,
    buf: &mut Vec<u8>,
    closing: &'static str,
) -> Result<String> {
    let mut out = String::new();
    let mut depth = 0usize;
    loop {
        buf.clear();
        match xml.read_event_into(buf)? {
            Event::Text(t) => out.push_str(&t.decode()?),
            Event::GeneralRef(r) => push_general_ref(&r, &mut out)?,
            Event::CData(t) => out.push_str(std::str::from_utf8(&t)?),
            Event::Start(_) => depth += 1,
            Event::End(_) if depth == 0 => return Ok(out),
            Event::End(_) => depth -= 1,
            Event::Eof => return Err(Error::XmlEof(closing)),
            _ => (),
        }
    }
}

/// Reads a shared or inline string (`<si>`, `<is>`) up to its end tag.
///
/// Rich text runs are concatenated and phonetic runs (`rPh`) dropped.
pub(crate) fn read_string<R: BufRead>(
    xml: &mut Reader<R>,
    buf: &mut Vec<u8>,
    closing: &'static str,
) -> Result<String> {
    let mut out = String::new();
    let mut depth = 0usize;
    let mut phonetic: Option<usize> = None;
    let mut in_text = false;
    loop {
        buf.clear();
        match xml.read_event_into(buf)? {
            Event::Start(e) => {
                depth += 1;
                if phonetic.is_none() {
                    match e.local_name().as_ref() {
                        b"rPh" => phonetic = Some(depth),
                        b"t" => in_text = true,
                        _ => (),
                    }
                }
            }
            Event::End(e) => {
                if depth == 0 {
                    return Ok(out);
                }
                if phonetic == Some(depth) {
                    phonetic = None;
                } else if e.local_name().as_ref() == b"t" {
                    in_text = false;
                }
                depth -= 1;
            }
            Event::Text(t) if in_text && phonetic.is_none() => out.push_str(&t.decode()?),
            Event::GeneralRef(r) if in_text && phonetic.is_none() => {
                push_general_ref(&r, &mut out)?
            }
            Event::CData(t) if in_text && phonetic.is_none() => {
                out.push_str(std::str::from_utf8(&t)?)
            }
            Event::Eof => return Err(Error::XmlEof(closing)),
            _ => (),
        }
    }
}

/// Consumes events up to the end of the element whose start was just read
pub(crate) fn skip_element<R: BufRead>(xml: &mut Reader<R>, buf: &mut Vec<u8>) -> Result<()> {
    let mut depth = 0usize;
    loop {
        buf.clear();
        match xml.read_event_into(buf)? {
            Event::Start(_) => depth += 1,
            Event::End(_) if depth == 0 => return Ok(()),
            Event::End(_) => depth -= 1,
            Event::Eof => return Ok(()),
            _ => (),
        }
    }
}

/// An owned xml element: name as written (prefix included), attributes in
/// document order, child elements and text.
///
/// SpreadsheetML never mixes text and elements in one parent, so direct text
/// is kept in a single string; whitespace between child elements is dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct XmlElement {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlElement {
    pub fn new(name: &str) -> XmlElement {
        XmlElement {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> XmlElement {
        self.set_attr(key, value);
        self
    }

    fn from_start(e: &BytesStart, decoder: Decoder) -> Result<XmlElement> {
        Ok(XmlElement {
            name: std::str::from_utf8(e.name().as_ref())?.to_string(),
            attrs: attributes(e, decoder)?,
            ..Default::default()
        })
    }

    /// Parses a whole part, returning its root element
    pub fn parse<R: BufRead>(reader: R) -> Result<XmlElement> {
        let mut xml = xml_reader(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match xml.read_event_into(&mut buf)? {
                Event::Start(ref e) => {
                    let root = XmlElement::from_start(e, xml.decoder())?;
                    let mut inner = Vec::new();
                    return root.read_children(&mut xml, &mut inner);
                }
                Event::Eof => return Err(Error::XmlEof("root element")),
                _ => (),
            }
        }
    }

    /// Reads the element whose start tag `e` was just consumed
    pub fn read<R: BufRead>(
        xml: &mut Reader<R>,
        e: &BytesStart,
        buf: &mut Vec<u8>,
    ) -> Result<XmlElement> {
        XmlElement::from_start(e, xml.decoder())?.read_children(xml, buf)
    }

    fn read_children<R: BufRead>(
        self,
        xml: &mut Reader<R>,
        buf: &mut Vec<u8>,
    ) -> Result<XmlElement> {
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut current = self;
        loop {
            buf.clear();
            match xml.read_event_into(buf)? {
                Event::Start(ref e) => {
                    let child = XmlElement::from_start(e, xml.decoder())?;
                    stack.push(std::mem::replace(&mut current, child));
                }
                Event::End(_) => {
                    if !current.children.is_empty() && current.text.trim().is_empty() {
                        current.text.clear();
                    }
                    match stack.pop() {
                        Some(mut parent) => {
                            parent.children.push(current);
                            current = parent;
                        }
                        None => return Ok(current),
                    }
                }
                Event::Text(t) => current.text.push_str(&t.decode()?),
                Event::GeneralRef(r) => push_general_ref(&r, &mut current.text)?,
                Event::CData(t) => current.text.push_str(std::str::from_utf8(&t)?),
                Event::Eof => return Err(Error::XmlEof("element")),
                _ => (),
            }
        }
    }

    /// Local name of the element
    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }

    /// Attribute value, matched on its qualified name
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute value, matched on its local name (`r:id` for `id`)
    pub fn attr_local(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| local_name(k) == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: &str, value: &str) {
        match self.attrs.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.attrs.push((key.to_string(), value.to_string())),
        }
    }

    pub fn remove_attr(&mut self, key: &str) -> Option<String> {
        let i = self.attrs.iter().position(|(k, _)| k == key)?;
        Some(self.attrs.remove(i).1)
    }

    /// First child element with this local name
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|e| e.local_name() == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        self.children.iter_mut().find(|e| e.local_name() == name)
    }

    /// Child elements with this local name
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |e| e.local_name() == name)
    }

    /// First child element with this local name, appended when missing
    pub fn ensure_child(&mut self, name: &str) -> &mut XmlElement {
        let pos = match self.children.iter().position(|e| e.local_name() == name) {
            Some(pos) => pos,
            None => {
                self.children.push(XmlElement::new(name));
                self.children.len() - 1
            }
        };
        &mut self.children[pos]
    }

    /// Removes every child element with this local name
    pub fn remove_children(&mut self, name: &str) -> usize {
        let before = self.children.len();
        self.children.retain(|e| e.local_name() != name);
        before - self.children.len()
    }

    pub fn write<W: Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (k, v) in &self.attrs {
            start.push_attribute((k.as_str(), v.as_str()));
        }
        if self.children.is_empty() && self.text.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }
        writer.write_event(Event::Start(start))?;
        if !self.text.is_empty() {
            writer.write_event(Event::Text(BytesText::new(&self.text)))?;
        }
        for child in &self.children {
            child.write(writer)?;
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        Ok(())
    }
}

impl XmlPart for XmlElement {
    fn read<R: BufRead>(reader: R) -> Result<Self> {
        XmlElement::parse(reader)
    }

    fn write<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = xml_writer(writer)?;
        XmlElement::write(self, &mut writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entities() {
        let src = br#"<t a="&quot;&#x43;&quot;">a &amp; b &lt;&#65;&#x42;&unknown;</t>"#;
        let root = XmlElement::parse(&src[..]).unwrap();
        assert_eq!(root.text, "a & b <AB&unknown;");
        assert_eq!(root.attr("a"), Some("\"C\""));
    }

    #[test]
    fn tree_round_trip_keeps_prefixes_and_text() {
        let src = br#"<?xml version="1.0"?><x:root xmlns:x="urn:a" a="1 &amp; 2"><x:child>t &lt; u</x:child><empty/></x:root>"#;
        let root = XmlElement::parse(&src[..]).unwrap();
        assert_eq!(root.name, "x:root");
        assert_eq!(root.local_name(), "root");
        assert_eq!(root.attr("a"), Some("1 & 2"));
        assert_eq!(root.child("child").unwrap().text, "t < u");
        assert!(root.child("empty").unwrap().children.is_empty());

        let bytes = root.to_bytes().unwrap();
        let again = XmlElement::parse(&bytes[..]).unwrap();
        assert_eq!(root, again);
    }

    #[test]
    fn rich_text_skips_phonetic_runs() {
        let src = br#"<si><r><t>ab</t></r><rPh><t>x</t></rPh><r><t xml:space="preserve"> c</t></r></si>"#;
        let mut xml = xml_reader(&src[..]);
        let mut buf = Vec::new();
        assert!(matches!(xml.read_event_into(&mut buf).unwrap(), Event::Start(_)));
        let mut inner = Vec::new();
        assert_eq!(read_string(&mut xml, &mut inner, "si").unwrap(), "ab c");
    }
}
