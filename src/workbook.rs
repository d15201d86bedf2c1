// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! The workbook: the package store, the caches of decoded parts and the
//! save path.
//!
//! Every decoded part lives in a [`PartCache`] keyed by its path in the
//! package. Accessors load parts on first use; mutations mark them dirty.
//! Saving serializes the dirty parts back into the package store, then
//! writes the store as a zip archive.

use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use tempfile::NamedTempFile;

use crate::cache::{Handle, PartCache, XmlPart};
use crate::calc_chain::CalcChain;
use crate::comments::{Comments, VmlDrawing};
use crate::errors::{Error, Result};
use crate::format::{DefaultFormatter, ValueFormatter};
use crate::merge::resolve_overlaps;
use crate::package::{Options, PackageStore, CONTENT_TYPES};
use crate::relationships::{
    ContentTypes, Relationships, CT_CALC_CHAIN, CT_SHARED_STRINGS, CT_VBA_PROJECT,
    CT_WORKBOOK_MACRO, REL_CALC_CHAIN, REL_CHARTSHEET, REL_DIALOGSHEET, REL_MACROSHEET,
    REL_OFFICE_DOCUMENT, REL_SHARED_STRINGS, REL_VBA_PROJECT,
};
use crate::shared_strings::SharedStrings;
use crate::sheet::SheetVisibility;
use crate::templates::BLANK_PARTS;
use crate::utils::{parse_u32, part_dir, rels_path_for, resolve_target};
use crate::worksheet::normalize::normalize;
use crate::worksheet::Worksheet;
use crate::xml::XmlElement;

/// What a `<sheet>` of the workbook points to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SheetKind {
    Worksheet,
    Chartsheet,
    Dialogsheet,
    Macrosheet,
}

impl SheetKind {
    fn from_rel_type(rel_type: &str) -> SheetKind {
        match rel_type {
            REL_CHARTSHEET => SheetKind::Chartsheet,
            REL_DIALOGSHEET => SheetKind::Dialogsheet,
            REL_MACROSHEET => SheetKind::Macrosheet,
            _ => SheetKind::Worksheet,
        }
    }
}

/// One `<sheet>` of the workbook, resolved through the workbook relationships
#[derive(Debug, Clone)]
pub(crate) struct SheetEntry {
    pub name: String,
    pub sheet_id: u32,
    pub rel_id: String,
    /// part path, empty when the relationship is missing
    pub path: String,
    pub kind: SheetKind,
    pub visibility: SheetVisibility,
}

/// Sheet names are compared case insensitively
pub(crate) fn same_name(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// An xlsx or xlsm document opened for reading and editing.
///
/// Every method takes `&self`: the workbook is `Send + Sync` and distinct
/// sheets can be used from several threads at once.
pub struct Workbook {
    pub(crate) options: Options,
    pub(crate) package: PackageStore,
    path: Mutex<Option<PathBuf>>,
    pub(crate) workbook_path: String,
    pub(crate) workbook: PartCache<XmlElement>,
    pub(crate) rels: PartCache<Relationships>,
    pub(crate) content_types: PartCache<ContentTypes>,
    pub(crate) sheets: PartCache<Worksheet>,
    pub(crate) shared_strings: PartCache<SharedStrings>,
    pub(crate) calc_chain: PartCache<CalcChain>,
    pub(crate) comments: PartCache<Comments>,
    pub(crate) vml_drawings: PartCache<VmlDrawing>,
    formatter: RwLock<Arc<dyn ValueFormatter>>,
}

impl std::fmt::Debug for Workbook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut spilled = 0;
        self.package.range(|_, part| {
            spilled += usize::from(part.is_temp_file());
            true
        });
        f.debug_struct("Workbook")
            .field("path", &*self.path.lock())
            .field("workbook_path", &self.workbook_path)
            .field("options", &self.options)
            .field("loaded_sheets", &self.sheets.loaded())
            .field("spilled_parts", &spilled)
            .finish_non_exhaustive()
    }
}

/// Path of the main workbook part, from the package relationships
fn find_workbook_path(package: &PackageStore) -> String {
    let rels = package
        .open_reader("_rels/.rels")
        .ok()
        .flatten()
        .and_then(|r| Relationships::read(r).ok());
    rels.and_then(|rels| {
        rels.find_by_type(REL_OFFICE_DOCUMENT)
            .map(|rel| resolve_target("", &rel.target))
    })
    .unwrap_or_else(|| "xl/workbook.xml".to_string())
}

impl Workbook {
    /// Creates a blank workbook holding a single empty `Sheet1`
    pub fn new() -> Result<Workbook> {
        let package = PackageStore::new();
        for (path, content) in BLANK_PARTS {
            package.store_bytes(path, content.as_bytes().to_vec());
        }
        Workbook::from_package(package, Options::default())
    }

    /// Opens a workbook file with default options
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Workbook> {
        Workbook::open_with_options(path, Options::default())
    }

    /// Opens a workbook file.
    ///
    /// `save` writes back to the same path.
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: Options) -> Result<Workbook> {
        let file = BufReader::new(File::open(path.as_ref())?);
        let wb = Workbook::from_reader(file, options)?;
        *wb.path.lock() = Some(path.as_ref().to_path_buf());
        Ok(wb)
    }

    /// Reads a workbook from any zip archive source
    pub fn from_reader<RS: Read + Seek>(reader: RS, options: Options) -> Result<Workbook> {
        let package = PackageStore::read_archive(reader, &options)?;
        Workbook::from_package(package, options)
    }

    fn from_package(package: PackageStore, options: Options) -> Result<Workbook> {
        options.validate()?;
        let workbook_path = find_workbook_path(&package);
        if !package.contains(&workbook_path) {
            return Err(Error::MissingPart(workbook_path));
        }
        let wb = Workbook {
            options,
            package,
            path: Mutex::new(None),
            workbook_path,
            workbook: PartCache::new(),
            rels: PartCache::new(),
            content_types: PartCache::new(),
            sheets: PartCache::new(),
            shared_strings: PartCache::new(),
            calc_chain: PartCache::new(),
            comments: PartCache::new(),
            vml_drawings: PartCache::new(),
            formatter: RwLock::new(Arc::new(DefaultFormatter)),
        };
        wb.workbook_part()?;
        debug!("opened workbook {}", wb.workbook_path);
        Ok(wb)
    }

    /// Options the workbook was opened with
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Path `save` writes to, if any
    pub fn path(&self) -> Option<PathBuf> {
        self.path.lock().clone()
    }

    /// Replaces the formatter applied to cell values
    pub fn set_formatter<F: ValueFormatter + 'static>(&self, formatter: F) {
        *self.formatter.write() = Arc::new(formatter);
    }

    pub(crate) fn formatter(&self) -> Arc<dyn ValueFormatter> {
        self.formatter.read().clone()
    }

    /// Decoded part, an empty default when it is missing or cannot be parsed
    pub(crate) fn part<T: XmlPart + Default>(
        &self,
        cache: &PartCache<T>,
        path: &str,
    ) -> Result<Handle<T>> {
        cache.get_or_load(path, || {
            let Some(reader) = self.package.open_reader(path)? else {
                return Ok(T::default());
            };
            Ok(T::read(reader).unwrap_or_else(|e| {
                warn!("cannot parse {path}, using an empty part: {e}");
                T::default()
            }))
        })
    }

    /// The `<workbook>` element of the main part
    pub(crate) fn workbook_part(&self) -> Result<Handle<XmlElement>> {
        self.workbook.get_or_load(&self.workbook_path, || {
            let reader = self
                .package
                .open_reader(&self.workbook_path)?
                .ok_or_else(|| Error::MissingPart(self.workbook_path.clone()))?;
            XmlElement::parse(reader)
        })
    }

    pub(crate) fn mark_workbook_dirty(&self) {
        self.workbook.mark_dirty(&self.workbook_path);
    }

    pub(crate) fn workbook_rels_path(&self) -> String {
        rels_path_for(&self.workbook_path)
    }

    pub(crate) fn workbook_rels(&self) -> Result<Handle<Relationships>> {
        self.part(&self.rels, &self.workbook_rels_path())
    }

    pub(crate) fn content_types_part(&self) -> Result<Handle<ContentTypes>> {
        self.part(&self.content_types, CONTENT_TYPES)
    }

    /// Target of a workbook relationship to `path`
    pub(crate) fn relative_target(&self, path: &str) -> String {
        let dir = part_dir(&self.workbook_path);
        match path.strip_prefix(dir).and_then(|p| p.strip_prefix('/')) {
            Some(rest) if !dir.is_empty() => rest.to_string(),
            _ if dir.is_empty() => path.to_string(),
            _ => format!("/{path}"),
        }
    }

    /// Path of the part a workbook relationship of this type points to, or
    /// `default` (relative to the workbook directory) when there is none
    fn related_path(&self, rel_type: &str, default: &str) -> Result<String> {
        let rels = self.workbook_rels()?;
        let dir = part_dir(&self.workbook_path);
        let target = rels
            .lock()
            .find_by_type(rel_type)
            .map(|rel| rel.target.clone());
        Ok(resolve_target(dir, target.as_deref().unwrap_or(default)))
    }

    /// Declares a workbook level part in the content types and the workbook
    /// relationships
    pub(crate) fn register_part(&self, path: &str, content_type: &str, rel_type: &str) -> Result<()> {
        let target = self.relative_target(path);
        let rels = self.workbook_rels()?;
        rels.lock().add(rel_type, &target, None);
        self.rels.mark_dirty(&self.workbook_rels_path());
        let types = self.content_types_part()?;
        types.lock().set_override(path, content_type);
        self.content_types.mark_dirty(CONTENT_TYPES);
        Ok(())
    }

    /// Reverts `register_part`
    pub(crate) fn unregister_part(&self, path: &str, rel_type: &str) -> Result<()> {
        let rels = self.workbook_rels()?;
        if rels.lock().remove_by_type(rel_type) > 0 {
            self.rels.mark_dirty(&self.workbook_rels_path());
        }
        let types = self.content_types_part()?;
        if types.lock().remove_override(path) {
            self.content_types.mark_dirty(CONTENT_TYPES);
        }
        Ok(())
    }

    pub(crate) fn shared_strings_part(&self) -> Result<Handle<SharedStrings>> {
        let path = self.related_path(REL_SHARED_STRINGS, "sharedStrings.xml")?;
        self.part(&self.shared_strings, &path)
    }

    pub(crate) fn mark_shared_strings_dirty(&self) -> Result<()> {
        let path = self.related_path(REL_SHARED_STRINGS, "sharedStrings.xml")?;
        self.shared_strings.mark_dirty(&path);
        Ok(())
    }

    /// Runs `f` on the calc chain, saving it back if `f` reports a change
    pub(crate) fn update_calc_chain<F: FnOnce(&mut CalcChain) -> bool>(&self, f: F) -> Result<()> {
        let path = self.related_path(REL_CALC_CHAIN, "calcChain.xml")?;
        if !self.package.contains(&path) && self.calc_chain.get(&path).is_none() {
            return Ok(());
        }
        let chain = self.part(&self.calc_chain, &path)?;
        if f(&mut chain.lock()) {
            self.calc_chain.mark_dirty(&path);
        }
        Ok(())
    }

    /// Every `<sheet>` of the workbook, in tab order
    pub(crate) fn sheet_entries(&self) -> Result<Vec<SheetEntry>> {
        let workbook = self.workbook_part()?;
        let rels = self.workbook_rels()?;
        let workbook = workbook.lock();
        let rels = rels.lock();
        let dir = part_dir(&self.workbook_path);
        let Some(sheets) = workbook.child("sheets") else {
            return Ok(Vec::new());
        };
        Ok(sheets
            .children_named("sheet")
            .map(|s| {
                let rel_id = s.attr_local("id").unwrap_or_default().to_string();
                let (path, kind) = match rels.get(&rel_id) {
                    Some(rel) => (
                        resolve_target(dir, &rel.target),
                        SheetKind::from_rel_type(&rel.rel_type),
                    ),
                    None => (String::new(), SheetKind::Worksheet),
                };
                SheetEntry {
                    name: s.attr("name").unwrap_or_default().to_string(),
                    sheet_id: s
                        .attr("sheetId")
                        .and_then(|v| parse_u32(v.as_bytes()))
                        .unwrap_or(0),
                    rel_id,
                    path,
                    kind,
                    visibility: SheetVisibility::from_state(s.attr("state")),
                }
            })
            .collect())
    }

    /// Position and entry of a sheet, by case insensitive name
    pub(crate) fn sheet_entry(&self, sheet: &str) -> Result<(usize, SheetEntry)> {
        self.sheet_entries()?
            .into_iter()
            .enumerate()
            .find(|(_, e)| same_name(&e.name, sheet))
            .ok_or_else(|| Error::SheetNotExist(sheet.to_string()))
    }

    /// Part path of a worksheet
    pub(crate) fn worksheet_path(&self, sheet: &str) -> Result<String> {
        let (_, entry) = self.sheet_entry(sheet)?;
        if entry.kind != SheetKind::Worksheet {
            return Err(Error::NotAWorksheet(entry.name));
        }
        if entry.path.is_empty() {
            return Err(Error::MissingPart(entry.rel_id));
        }
        Ok(entry.path)
    }

    /// Decoded and normalized worksheet at `path`
    pub(crate) fn load_worksheet(&self, path: &str) -> Result<Handle<Worksheet>> {
        self.sheets.get_or_load_checked(
            path,
            || {
                let reader = self
                    .package
                    .open_reader(path)?
                    .ok_or_else(|| Error::MissingPart(path.to_string()))?;
                debug!("decoding worksheet {path}");
                Worksheet::read(reader)
            },
            normalize,
        )
    }

    pub(crate) fn worksheet(&self, sheet: &str) -> Result<(String, Handle<Worksheet>)> {
        let path = self.worksheet_path(sheet)?;
        let handle = self.load_worksheet(&path)?;
        Ok((path, handle))
    }

    /// Runs `f` on a worksheet
    pub(crate) fn with_sheet<T, F>(&self, sheet: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Worksheet) -> Result<T>,
    {
        let (_, handle) = self.worksheet(sheet)?;
        let ws = handle.lock();
        f(&ws)
    }

    /// Runs `f` on a worksheet and marks it dirty when `f` succeeds
    pub(crate) fn with_sheet_mut<T, F>(&self, sheet: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Worksheet) -> Result<T>,
    {
        let (path, handle) = self.worksheet(sheet)?;
        let res = f(&mut handle.lock())?;
        self.sheets.mark_dirty(&path);
        Ok(res)
    }

    /// Serializes a dirty worksheet back into the package store.
    ///
    /// The worksheet stays locked until its bytes are stored, so concurrent
    /// flushes of the same sheet cannot store an older snapshot last.
    pub(crate) fn flush_sheet(&self, path: &str) -> Result<()> {
        let Some(handle) = self.sheets.get(path) else {
            return Ok(());
        };
        let mut ws = handle.lock();
        if self.sheets.take_dirty_one(path).is_none() {
            return Ok(());
        }
        resolve_overlaps(&mut ws.merges);
        let bytes = match ws.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                self.sheets.mark_dirty(path);
                return Err(e);
            }
        };
        debug!("flushing worksheet {path} ({} bytes)", bytes.len());
        self.package
            .store_worksheet(path, bytes, self.options.worksheet_unzip_mem_limit)
    }

    fn flush_cache<T: XmlPart>(&self, cache: &PartCache<T>) -> Result<()> {
        for (path, handle) in cache.take_dirty() {
            let bytes = handle.lock().to_bytes();
            match bytes {
                Ok(bytes) => self.package.store_bytes(&path, bytes),
                Err(e) => {
                    cache.mark_dirty(&path);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn flush_shared_strings(&self) -> Result<()> {
        let path = self.related_path(REL_SHARED_STRINGS, "sharedStrings.xml")?;
        let Some(handle) = self.shared_strings.take_dirty_one(&path) else {
            return Ok(());
        };
        let bytes = {
            let sst = handle.lock();
            if sst.is_empty() {
                return Ok(());
            }
            sst.to_bytes()?
        };
        self.package.store_bytes(&path, bytes);
        self.register_part(&path, CT_SHARED_STRINGS, REL_SHARED_STRINGS)
    }

    fn flush_calc_chain(&self) -> Result<()> {
        let path = self.related_path(REL_CALC_CHAIN, "calcChain.xml")?;
        let Some(handle) = self.calc_chain.take_dirty_one(&path) else {
            return Ok(());
        };
        let bytes = {
            let chain = handle.lock();
            if chain.is_empty() {
                None
            } else {
                Some(chain.to_bytes()?)
            }
        };
        match bytes {
            Some(bytes) => {
                self.package.store_bytes(&path, bytes);
                self.register_part(&path, CT_CALC_CHAIN, REL_CALC_CHAIN)
            }
            None => {
                debug!("calc chain is empty, removing {path}");
                self.package.delete(&path);
                self.calc_chain.evict(&path);
                self.unregister_part(&path, REL_CALC_CHAIN)
            }
        }
    }

    /// Writes every dirty part back into the package store
    pub(crate) fn flush(&self) -> Result<()> {
        for path in self.sheets.loaded() {
            self.flush_sheet(&path)?;
        }
        self.flush_shared_strings()?;
        self.flush_calc_chain()?;
        self.flush_cache(&self.comments)?;
        self.flush_cache(&self.vml_drawings)?;
        self.flush_cache(&self.workbook)?;
        self.flush_cache(&self.rels)?;
        self.flush_cache(&self.content_types)
    }

    /// Saves the workbook to the path it was opened from or last saved to
    pub fn save(&self) -> Result<()> {
        let path = self.path.lock().clone().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "the workbook has no path, use save_as",
            ))
        })?;
        self.save_as(path)
    }

    /// Saves the workbook to `path`.
    ///
    /// The archive is written to a temporary file next to `path` first, so
    /// a failed save leaves any existing file untouched.
    pub fn save_as<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let tmp = BufWriter::new(NamedTempFile::new_in(dir)?);
        let tmp = self.write_to(tmp)?.into_inner().map_err(|e| e.into_error())?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        debug!("saved workbook to {}", path.display());
        *self.path.lock() = Some(path.to_path_buf());
        Ok(())
    }

    /// Writes the workbook as a zip archive and returns the writer
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<W> {
        self.flush()?;
        self.package.write_archive(writer)
    }

    /// Writes the workbook into a new buffer
    pub fn write_to_buffer(&self) -> Result<Vec<u8>> {
        Ok(self.write_to(Cursor::new(Vec::new()))?.into_inner())
    }

    /// Adds (or replaces) the VBA project of the workbook.
    ///
    /// `bytes` is a `vbaProject.bin` as extracted from another xlsm file. The
    /// workbook becomes macro enabled and must be saved with an `.xlsm`
    /// extension to be opened by spreadsheet applications.
    pub fn add_vba_project(&self, bytes: Vec<u8>) -> Result<()> {
        let path = format!("{}/vbaProject.bin", part_dir(&self.workbook_path))
            .trim_start_matches('/')
            .to_string();
        let types = self.content_types_part()?;
        {
            let mut types = types.lock();
            types.set_default("bin", CT_VBA_PROJECT);
            types.set_override(&self.workbook_path, CT_WORKBOOK_MACRO);
        }
        self.content_types.mark_dirty(CONTENT_TYPES);

        let rels = self.workbook_rels()?;
        {
            let mut rels = rels.lock();
            if rels.find_by_type(REL_VBA_PROJECT).is_none() {
                rels.add(REL_VBA_PROJECT, &self.relative_target(&path), None);
            }
        }
        self.rels.mark_dirty(&self.workbook_rels_path());
        debug!("storing vba project at {path} ({} bytes)", bytes.len());
        self.package.store_bytes(&path, bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationships::CT_WORKSHEET;

    #[test]
    fn blank_workbook_has_one_sheet() {
        let wb = Workbook::new().unwrap();
        let entries = wb.sheet_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Sheet1");
        assert_eq!(entries[0].path, "xl/worksheets/sheet1.xml");
        assert_eq!(wb.worksheet_path("sheet1").unwrap(), "xl/worksheets/sheet1.xml");
        assert!(matches!(wb.worksheet_path("Nope"), Err(Error::SheetNotExist(n)) if n == "Nope"));
    }

    #[test]
    fn flush_only_rewrites_dirty_parts() {
        let wb = Workbook::new().unwrap();
        let before = wb.package.load("xl/worksheets/sheet1.xml").unwrap().to_bytes().unwrap();
        wb.with_sheet("Sheet1", |_| Ok(())).unwrap();
        wb.flush().unwrap();
        let after = wb.package.load("xl/worksheets/sheet1.xml").unwrap().to_bytes().unwrap();
        assert!(Arc::ptr_eq(&before, &after));

        wb.with_sheet_mut("Sheet1", |_| Ok(())).unwrap();
        wb.flush().unwrap();
        let rewritten = wb.package.load("xl/worksheets/sheet1.xml").unwrap().to_bytes().unwrap();
        assert!(!Arc::ptr_eq(&before, &rewritten));
    }

    #[test]
    fn vba_project_makes_the_workbook_macro_enabled() {
        let wb = Workbook::new().unwrap();
        wb.add_vba_project(b"vba".to_vec()).unwrap();
        wb.add_vba_project(b"vba2".to_vec()).unwrap();
        wb.flush().unwrap();
        let types = ContentTypes::read(
            wb.package.open_reader(CONTENT_TYPES).unwrap().unwrap(),
        )
        .unwrap();
        assert_eq!(types.override_for("xl/workbook.xml"), Some(CT_WORKBOOK_MACRO));
        assert_eq!(
            types.override_for("xl/worksheets/sheet1.xml"),
            Some(CT_WORKSHEET)
        );
        let rels = wb.workbook_rels().unwrap();
        let rels = rels.lock();
        assert_eq!(
            rels.items.iter().filter(|r| r.rel_type == REL_VBA_PROJECT).count(),
            1
        );
        assert_eq!(
            &**wb.package.load("xl/vbaProject.bin").unwrap().to_bytes().unwrap(),
            b"vba2"
        );
    }

    #[test]
    fn missing_workbook_part() {
        let package = PackageStore::new();
        package.store_bytes("_rels/.rels", crate::templates::ROOT_RELS.as_bytes().to_vec());
        assert!(matches!(
            Workbook::from_package(package, Options::default()),
            Err(Error::MissingPart(p)) if p == "xl/workbook.xml"
        ));
    }
}
