// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! The package store: every part of the archive by path, either as bytes or
//! spilled to a temporary file.
//!
//! This is the single source of truth for the bytes of the document; the
//! decoded structures in the part caches are written back here before any
//! byte accurate view is needed (streaming, search, save).

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Cursor, Read, Seek, Write};
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;
use tempfile::NamedTempFile;
use zip::read::ZipArchive;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::errors::{Error, Result};

/// Path of the content types part
pub(crate) const CONTENT_TYPES: &str = "[Content_Types].xml";

/// Options used when opening a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Return raw cell values instead of passing them through the
    /// [`ValueFormatter`](crate::ValueFormatter)
    pub raw_cell_value: bool,
    /// Maximum total decompressed size accepted when opening, in bytes
    /// (default 16 GiB)
    pub unzip_size_limit: u64,
    /// Worksheet parts larger than this many bytes are extracted to a
    /// temporary file instead of memory (default 16 MiB)
    pub worksheet_unzip_mem_limit: u64,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            raw_cell_value: false,
            unzip_size_limit: 16 << 30,
            worksheet_unzip_mem_limit: 16 << 20,
        }
    }
}

impl Options {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.worksheet_unzip_mem_limit > self.unzip_size_limit {
            return Err(Error::OptionsUnzipSizeLimit);
        }
        Ok(())
    }
}

/// Shared bytes readable through a `Cursor`
#[derive(Debug, Clone)]
pub(crate) struct SharedBytes(pub Arc<Vec<u8>>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

/// The content of one part
#[derive(Debug, Clone)]
pub(crate) enum Part {
    /// Held in memory
    Bytes(Arc<Vec<u8>>),
    /// Extracted to a temporary file, removed when the last handle drops
    TempFile(Arc<NamedTempFile>),
}

impl Part {
    /// A fresh buffered reader over the part content
    pub fn reader(&self) -> Result<Box<dyn BufRead + Send>> {
        Ok(match self {
            Part::Bytes(b) => Box::new(Cursor::new(SharedBytes(b.clone()))),
            Part::TempFile(f) => Box::new(BufReader::new(f.reopen()?)),
        })
    }

    /// The whole content in memory
    pub fn to_bytes(&self) -> Result<Arc<Vec<u8>>> {
        match self {
            Part::Bytes(b) => Ok(b.clone()),
            Part::TempFile(f) => {
                let mut buf = Vec::new();
                f.reopen()?.read_to_end(&mut buf)?;
                Ok(Arc::new(buf))
            }
        }
    }

    pub fn is_temp_file(&self) -> bool {
        matches!(self, Part::TempFile(_))
    }
}

/// Whether a part is a worksheet, subject to the memory limit
pub(crate) fn is_worksheet_part(path: &str) -> bool {
    path.starts_with("xl/worksheets/") && path.ends_with(".xml") && !path.contains("/_rels/")
}

/// Concurrent map from part path to part content
#[derive(Debug, Default)]
pub(crate) struct PackageStore {
    parts: RwLock<BTreeMap<String, Part>>,
}

impl PackageStore {
    pub fn new() -> PackageStore {
        PackageStore::default()
    }

    /// Reads every entry of a zip archive, honouring the size limits
    pub fn read_archive<RS: Read + Seek>(reader: RS, options: &Options) -> Result<PackageStore> {
        options.validate()?;
        let mut zip = ZipArchive::new(reader)?;
        let store = PackageStore::new();
        let mut remaining = options.unzip_size_limit;
        for i in 0..zip.len() {
            let mut file = zip.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let path = file.name().replace('\\', "/").trim_start_matches('/').to_string();
            let declared = file.size();
            if declared > remaining {
                return Err(Error::UnzipSizeLimit(options.unzip_size_limit));
            }
            let spill = is_worksheet_part(&path) && declared > options.worksheet_unzip_mem_limit;
            // the declared size may lie, never read more than what is left
            let mut limited = (&mut file).take(remaining.saturating_add(1));
            let part = if spill {
                let mut tmp = tempfile::Builder::new()
                    .prefix("sheetkit-")
                    .suffix(".xml")
                    .tempfile()?;
                let written = std::io::copy(&mut limited, &mut tmp)?;
                tmp.flush()?;
                remaining = checked_remaining(remaining, written, options)?;
                debug!("extracted {path} ({written} bytes) to {:?}", tmp.path());
                Part::TempFile(Arc::new(tmp))
            } else {
                let mut buf = Vec::new();
                limited.read_to_end(&mut buf)?;
                remaining = checked_remaining(remaining, buf.len() as u64, options)?;
                Part::Bytes(Arc::new(buf))
            };
            store.store(&path, part);
        }
        Ok(store)
    }

    /// Returns the part at `path`, if any
    pub fn load(&self, path: &str) -> Option<Part> {
        self.parts.read().get(path).cloned()
    }

    /// Inserts or replaces the part at `path`
    pub fn store(&self, path: &str, part: Part) {
        self.parts.write().insert(path.to_string(), part);
    }

    pub fn store_bytes(&self, path: &str, bytes: Vec<u8>) {
        self.store(path, Part::Bytes(Arc::new(bytes)));
    }

    /// Stores a serialized worksheet, spilling it to a temporary file when
    /// larger than `mem_limit`
    pub fn store_worksheet(&self, path: &str, bytes: Vec<u8>, mem_limit: u64) -> Result<()> {
        if bytes.len() as u64 > mem_limit {
            let mut tmp = tempfile::Builder::new()
                .prefix("sheetkit-")
                .suffix(".xml")
                .tempfile()?;
            tmp.write_all(&bytes)?;
            tmp.flush()?;
            debug!("spilled {path} ({} bytes) to {:?}", bytes.len(), tmp.path());
            self.store(path, Part::TempFile(Arc::new(tmp)));
        } else {
            self.store_bytes(path, bytes);
        }
        Ok(())
    }

    /// Removes the part at `path`
    pub fn delete(&self, path: &str) -> Option<Part> {
        self.parts.write().remove(path)
    }

    /// Calls `f` on every part in path order until it returns `false`
    pub fn range<F: FnMut(&str, &Part) -> bool>(&self, mut f: F) {
        for (path, part) in self.parts.read().iter() {
            if !f(path, part) {
                break;
            }
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.parts.read().contains_key(path)
    }

    /// A buffered reader over the part at `path`, `None` when missing
    pub fn open_reader(&self, path: &str) -> Result<Option<Box<dyn BufRead + Send>>> {
        self.load(path).map(|p| p.reader()).transpose()
    }

    /// Writes every part as a zip archive, content types first
    pub fn write_archive<W: Write + Seek>(&self, writer: W) -> Result<W> {
        let mut zip = ZipWriter::new(writer);
        let parts = self.parts.read();
        let ordered = parts
            .get_key_value(CONTENT_TYPES)
            .into_iter()
            .chain(parts.iter().filter(|(path, _)| path.as_str() != CONTENT_TYPES));
        for (path, part) in ordered {
            match part {
                Part::Bytes(b) => {
                    zip.start_file(path.as_str(), file_options(b.len() as u64))?;
                    zip.write_all(b)?;
                }
                Part::TempFile(f) => {
                    let mut file = f.reopen()?;
                    let len = file.metadata()?.len();
                    zip.start_file(path.as_str(), file_options(len))?;
                    std::io::copy(&mut file, &mut zip)?;
                }
            }
        }
        Ok(zip.finish()?)
    }
}

fn file_options(len: u64) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(len >= u32::MAX as u64)
}

fn checked_remaining(remaining: u64, read: u64, options: &Options) -> Result<u64> {
    remaining
        .checked_sub(read)
        .ok_or(Error::UnzipSizeLimit(options.unzip_size_limit))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archive(entries: &[(&str, &[u8])]) -> Cursor<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, content) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content).unwrap();
        }
        let mut cursor = zip.finish().unwrap();
        cursor.set_position(0);
        cursor
    }

    #[test]
    fn store_load_delete() {
        let store = PackageStore::new();
        assert!(store.load("a.xml").is_none());
        store.store_bytes("a.xml", b"<a/>".to_vec());
        store.store_bytes("b.xml", b"<b/>".to_vec());
        assert_eq!(&**store.load("a.xml").unwrap().to_bytes().unwrap(), b"<a/>");
        let mut seen = Vec::new();
        store.range(|p, _| {
            seen.push(p.to_string());
            true
        });
        assert_eq!(seen, ["a.xml", "b.xml"]);
        assert!(store.delete("a.xml").is_some());
        assert!(!store.contains("a.xml"));
    }

    #[test]
    fn worksheets_above_the_memory_limit_are_spilled() {
        let sheet = b"<worksheet><sheetData/></worksheet>";
        let options = Options {
            worksheet_unzip_mem_limit: 10,
            ..Default::default()
        };
        let store = PackageStore::read_archive(
            archive(&[("xl/worksheets/sheet1.xml", sheet), ("xl/workbook.xml", sheet)]),
            &options,
        )
        .unwrap();
        assert!(store.load("xl/worksheets/sheet1.xml").unwrap().is_temp_file());
        assert!(!store.load("xl/workbook.xml").unwrap().is_temp_file());

        let mut content = String::new();
        store
            .open_reader("xl/worksheets/sheet1.xml")
            .unwrap()
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content.as_bytes(), sheet);
    }

    #[test]
    fn unzip_size_limit() {
        let options = Options {
            unzip_size_limit: 8,
            worksheet_unzip_mem_limit: 8,
            ..Default::default()
        };
        let res = PackageStore::read_archive(archive(&[("a.xml", b"0123456789")]), &options);
        assert!(matches!(res, Err(Error::UnzipSizeLimit(8))));

        let bad = Options {
            unzip_size_limit: 1,
            worksheet_unzip_mem_limit: 2,
            ..Default::default()
        };
        assert!(matches!(
            PackageStore::read_archive(archive(&[]), &bad),
            Err(Error::OptionsUnzipSizeLimit)
        ));
    }

    #[test]
    fn archive_starts_with_content_types() {
        let store = PackageStore::new();
        store.store_bytes("a.xml", b"<a/>".to_vec());
        store.store_bytes(CONTENT_TYPES, b"<Types/>".to_vec());
        let mut cursor = store.write_archive(Cursor::new(Vec::new())).unwrap();
        cursor.set_position(0);
        let mut zip = ZipArchive::new(cursor).unwrap();
        assert_eq!(zip.by_index(0).unwrap().name(), CONTENT_TYPES);
        assert_eq!(zip.len(), 2);
    }
}
