// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

mod common;

use std::io::Cursor;

use common::{init_logger, read_part};
use rstest::rstest;
use sheetkit::{
    Comment, DefinedName, Error, HeaderFooter, Options, Orientation, PageLayout, PageMargins,
    PaneKind, Panes, Selection, SheetProtection, SheetVisibility, Workbook,
};

fn reopen(wb: &Workbook) -> Workbook {
    let bytes = wb.write_to_buffer().unwrap();
    Workbook::from_reader(Cursor::new(bytes), Options::default()).unwrap()
}

#[test]
fn sheet_lifecycle() {
    init_logger();
    let wb = Workbook::new().unwrap();
    assert_eq!(wb.new_sheet("Data").unwrap(), 1);
    assert_eq!(wb.new_sheet("data").unwrap(), 1);
    assert_eq!(wb.new_sheet("Summary").unwrap(), 2);
    wb.set_cell_value("Data", "A1", "source").unwrap();

    wb.copy_sheet(1, 2).unwrap();
    assert_eq!(wb.get_cell_value("Summary", "A1").unwrap(), "source");

    wb.set_sheet_name("Summary", "Report 2024").unwrap();
    assert!(matches!(
        wb.set_sheet_name("Data", "sheet1"),
        Err(Error::SheetNameExists(_))
    ));
    wb.set_active_sheet(2).unwrap();
    wb.delete_sheet("Sheet1").unwrap();
    assert_eq!(wb.sheet_list().unwrap(), ["Data", "Report 2024"]);
    assert_eq!(wb.active_sheet_index().unwrap(), 1);

    let wb = reopen(&wb);
    assert_eq!(wb.sheet_list().unwrap(), ["Data", "Report 2024"]);
    assert_eq!(wb.sheet_index("report 2024").unwrap(), Some(1));
    assert_eq!(wb.sheet_name(0).unwrap().as_deref(), Some("Data"));
    assert_eq!(wb.get_cell_value("Report 2024", "A1").unwrap(), "source");
    assert_eq!(wb.active_sheet_index().unwrap(), 1);

    wb.delete_sheet("Data").unwrap();
    assert!(matches!(wb.delete_sheet("Report 2024"), Err(Error::LastSheet)));
}

#[rstest]
#[case("")]
#[case("a:b")]
#[case("what?")]
#[case("'quoted'")]
#[case("this name is far too long for a tab")]
fn invalid_sheet_names(#[case] name: &str) {
    let wb = Workbook::new().unwrap();
    assert!(matches!(wb.new_sheet(name), Err(Error::InvalidSheetName(_))));
}

#[test]
fn hidden_sheets() {
    let wb = Workbook::new().unwrap();
    wb.new_sheet("Lookup").unwrap();
    wb.set_sheet_visible("Lookup", false).unwrap();
    wb.set_sheet_visible("Sheet1", false).unwrap();
    assert!(wb.get_sheet_visible("Sheet1").unwrap());

    let wb = reopen(&wb);
    assert!(!wb.get_sheet_visible("Lookup").unwrap());
    wb.set_sheet_visibility("Lookup", SheetVisibility::VeryHidden)
        .unwrap();
    assert_eq!(
        wb.sheet_visibility("Lookup").unwrap(),
        SheetVisibility::VeryHidden
    );
}

#[test]
fn names_and_layout_survive_a_save() {
    let wb = Workbook::new().unwrap();
    wb.set_defined_name(&DefinedName::new("Total", "Sheet1!$B$10"))
        .unwrap();
    wb.set_page_margins(
        "Sheet1",
        &PageMargins {
            left: Some(1.0),
            ..Default::default()
        },
    )
    .unwrap();
    wb.set_page_layout(
        "Sheet1",
        &PageLayout {
            orientation: Some(Orientation::Landscape),
            ..Default::default()
        },
    )
    .unwrap();
    wb.insert_page_break("Sheet1", "C5").unwrap();

    let wb = reopen(&wb);
    assert_eq!(
        wb.defined_names().unwrap(),
        [DefinedName::new("Total", "Sheet1!$B$10")]
    );
    assert_eq!(wb.get_page_margins("Sheet1").unwrap().left, Some(1.0));
    assert_eq!(
        wb.get_page_layout("Sheet1").unwrap().orientation,
        Some(Orientation::Landscape)
    );
}

#[test]
fn untouched_parts_are_copied_through() {
    let mut source = rust_xlsxwriter::Workbook::new();
    source.add_worksheet().write_string(0, 0, "kept").unwrap();
    let bytes = source.save_to_buffer().unwrap();
    let original = read_part(&bytes, "xl/styles.xml").unwrap();

    let wb = Workbook::from_reader(Cursor::new(bytes), Options::default()).unwrap();
    wb.set_cell_value("Sheet1", "B1", 1).unwrap();
    let saved = wb.write_to_buffer().unwrap();
    assert_eq!(read_part(&saved, "xl/styles.xml").unwrap(), original);
}

#[test]
fn reads_rust_xlsxwriter_output() {
    use rust_xlsxwriter::Format;

    let mut source = rust_xlsxwriter::Workbook::new();
    let sheet = source.add_worksheet();
    sheet.set_name("Data").unwrap();
    sheet.write_string(0, 0, "name").unwrap();
    sheet.write_string(0, 1, "value").unwrap();
    sheet.write_string(1, 0, "pi").unwrap();
    sheet.write_number(1, 1, 3.14159).unwrap();
    sheet.write_boolean(2, 1, true).unwrap();
    sheet.write_formula(3, 1, "=B2*2").unwrap();
    sheet
        .merge_range(5, 0, 5, 2, "merged", &Format::new())
        .unwrap();
    sheet.set_row_height(2, 30).unwrap();
    let bytes = source.save_to_buffer().unwrap();

    let wb = Workbook::from_reader(Cursor::new(bytes), Options::default()).unwrap();
    assert_eq!(wb.sheet_list().unwrap(), ["Data"]);
    assert_eq!(wb.get_cell_value("Data", "A2").unwrap(), "pi");
    assert_eq!(wb.get_cell_value("Data", "B2").unwrap(), "3.14159");
    assert_eq!(wb.get_cell_value("Data", "B3").unwrap(), "TRUE");
    assert_eq!(wb.get_cell_formula("Data", "B4").unwrap(), "B2*2");
    assert_eq!(wb.get_row_height("Data", 3).unwrap(), 30.0);
    assert_eq!(wb.search_sheet("Data", "pi").unwrap(), ["A2"]);

    let merges = wb.get_merge_cells("Data").unwrap();
    assert_eq!(merges.len(), 1);
    assert_eq!(merges[0].range().unwrap(), "A6:C6");
    assert_eq!(merges[0].value(), "merged");

    // edit and read back through the stream
    wb.insert_row("Data", 1).unwrap();
    wb.set_cell_value("Data", "A1", "header").unwrap();
    let rows = wb.get_rows("Data").unwrap();
    assert_eq!(rows[0], ["header"]);
    assert_eq!(rows[1], ["name", "value"]);
    assert_eq!(wb.get_cell_formula("Data", "B5").unwrap(), "B3*2");
    assert_eq!(
        wb.get_merge_cells("Data").unwrap()[0].range().unwrap(),
        "A7:C7"
    );
}

#[test]
fn save_as_and_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("book.xlsx");
    let wb = Workbook::new().unwrap();
    wb.set_cell_value("Sheet1", "A1", 1.5).unwrap();
    wb.save_as(&path).unwrap();
    assert_eq!(wb.path().as_deref(), Some(path.as_path()));

    let wb = Workbook::open(&path).unwrap();
    assert_eq!(wb.get_cell_value("Sheet1", "A1").unwrap(), "1.5");
    wb.set_cell_value("Sheet1", "A2", 2).unwrap();
    wb.save().unwrap();
    let wb = Workbook::open(&path).unwrap();
    assert_eq!(wb.get_cell_value("Sheet1", "A2").unwrap(), "2");
}

#[test]
fn options_are_validated() {
    let options = Options {
        unzip_size_limit: 10,
        worksheet_unzip_mem_limit: 100,
        ..Options::default()
    };
    let bytes = Workbook::new().unwrap().write_to_buffer().unwrap();
    assert!(matches!(
        Workbook::from_reader(Cursor::new(bytes.clone()), options),
        Err(Error::OptionsUnzipSizeLimit)
    ));
    let options = Options {
        unzip_size_limit: 100,
        worksheet_unzip_mem_limit: 10,
        ..Options::default()
    };
    assert!(matches!(
        Workbook::from_reader(Cursor::new(bytes), options),
        Err(Error::UnzipSizeLimit(100))
    ));
}

#[test]
fn macro_enabled_workbook() {
    let wb = Workbook::new().unwrap();
    wb.add_vba_project(b"not really a compound file".to_vec())
        .unwrap();
    let bytes = wb.write_to_buffer().unwrap();
    assert!(read_part(&bytes, "xl/vbaProject.bin").is_some());
    let types = read_part(&bytes, "[Content_Types].xml").unwrap();
    assert!(types.contains("application/vnd.ms-excel.sheet.macroEnabled.main+xml"));
}

fn note(cell: &str, author: &str, text: &str) -> Comment {
    Comment {
        cell: cell.into(),
        author: author.into(),
        text: text.into(),
    }
}

#[test]
fn notes_survive_a_save() {
    init_logger();
    let wb = Workbook::new().unwrap();
    wb.new_sheet("Data").unwrap();
    wb.add_comment("Sheet1", &note("A1", "Ann", "first")).unwrap();
    wb.add_comment("Data", &note("B2", "Bob", "second")).unwrap();

    let bytes = wb.write_to_buffer().unwrap();
    let rels = read_part(&bytes, "xl/worksheets/_rels/sheet1.xml.rels").unwrap();
    assert!(rels.contains("../comments1.xml"));
    assert!(rels.contains("../drawings/vmlDrawing1.vml"));
    assert!(read_part(&bytes, "xl/comments2.xml").is_some());
    let vml = read_part(&bytes, "xl/drawings/vmlDrawing2.vml").unwrap();
    assert!(vml.contains("<x:Row>1</x:Row>"));
    let types = read_part(&bytes, "[Content_Types].xml").unwrap();
    assert!(types.contains("application/vnd.openxmlformats-officedocument.vmlDrawing"));
    assert!(types.contains("/xl/comments1.xml"));
    let sheet = read_part(&bytes, "xl/worksheets/sheet1.xml").unwrap();
    assert!(sheet.contains("<legacyDrawing r:id="));

    let wb = Workbook::from_reader(Cursor::new(bytes), Options::default()).unwrap();
    wb.add_comment("Sheet1", &note("C3", "Bob", "third")).unwrap();
    let all = wb.get_comments().unwrap();
    assert_eq!(
        all["Sheet1"],
        [note("A1", "Ann", "first"), note("C3", "Bob", "third")]
    );
    assert_eq!(all["Data"], [note("B2", "Bob", "second")]);

    wb.delete_sheet("Data").unwrap();
    let bytes = wb.write_to_buffer().unwrap();
    assert!(read_part(&bytes, "xl/comments2.xml").is_none());
    assert!(read_part(&bytes, "xl/drawings/vmlDrawing2.vml").is_none());
    assert!(!read_part(&bytes, "[Content_Types].xml")
        .unwrap()
        .contains("/xl/comments2.xml"));
    let vml = read_part(&bytes, "xl/drawings/vmlDrawing1.vml").unwrap();
    assert_eq!(vml.matches("<v:shape ").count(), 2);
}

#[test]
fn copied_sheets_leave_notes_behind() {
    let wb = Workbook::new().unwrap();
    wb.new_sheet("Copy").unwrap();
    wb.add_comment("Sheet1", &note("A1", "Ann", "only here")).unwrap();
    wb.add_comment("Copy", &note("A1", "Ann", "replaced by the copy")).unwrap();
    wb.copy_sheet(0, 1).unwrap();

    let all = wb.get_comments().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all["Sheet1"], [note("A1", "Ann", "only here")]);

    let bytes = wb.write_to_buffer().unwrap();
    assert!(read_part(&bytes, "xl/comments2.xml").is_none());
    let sheet = read_part(&bytes, "xl/worksheets/sheet2.xml").unwrap();
    assert!(!sheet.contains("legacyDrawing"));
}

#[test]
fn reads_rust_xlsxwriter_notes() {
    let mut source = rust_xlsxwriter::Workbook::new();
    let note_source = rust_xlsxwriter::Note::new("hello")
        .set_author("Ann")
        .add_author_prefix(false);
    source
        .add_worksheet()
        .insert_note(2, 0, &note_source)
        .unwrap();
    let bytes = source.save_to_buffer().unwrap();

    let wb = Workbook::from_reader(Cursor::new(bytes), Options::default()).unwrap();
    assert_eq!(
        wb.get_comments().unwrap()["Sheet1"],
        [note("A3", "Ann", "hello")]
    );
    wb.add_comment("Sheet1", &note("B1", "Bob", "added")).unwrap();
    let wb = reopen(&wb);
    let all = wb.get_comments().unwrap();
    let notes = &all["Sheet1"];
    assert_eq!(notes.len(), 2);
    assert_eq!(notes[1], note("B1", "Bob", "added"));
}

#[test]
fn view_settings_survive_a_save() {
    let wb = Workbook::new().unwrap();
    wb.new_sheet("Other").unwrap();
    let panes = Panes {
        freeze: true,
        y_split: 1.0,
        top_left_cell: "A2".into(),
        active_pane: Some(PaneKind::BottomLeft),
        selections: vec![Selection {
            pane: Some(PaneKind::BottomLeft),
            active_cell: "A2".into(),
            sqref: "A2".into(),
        }],
        ..Default::default()
    };
    wb.set_panes("Sheet1", &panes).unwrap();
    let header = HeaderFooter {
        odd_header: "&CQuarterly".into(),
        odd_footer: "&P".into(),
        ..Default::default()
    };
    wb.set_header_footer("Sheet1", Some(&header)).unwrap();
    wb.protect_sheet(
        "Sheet1",
        &SheetProtection {
            password: Some("secret".into()),
            format_columns: true,
            ..Default::default()
        },
    )
    .unwrap();
    wb.group_sheets(&["Sheet1", "Other"]).unwrap();

    let wb = reopen(&wb);
    assert_eq!(wb.get_panes("Sheet1").unwrap(), panes);
    assert_eq!(wb.get_header_footer("Sheet1").unwrap(), Some(header));
    assert!(wb.is_sheet_protected("Sheet1").unwrap());
    assert!(matches!(
        wb.unprotect_sheet("Sheet1", Some("guess")),
        Err(Error::UnprotectSheetPassword)
    ));
    wb.unprotect_sheet("Sheet1", Some("secret")).unwrap();
    assert!(!wb.is_sheet_protected("Sheet1").unwrap());

    let bytes = wb.write_to_buffer().unwrap();
    let other = read_part(&bytes, "xl/worksheets/sheet2.xml").unwrap();
    assert!(other.contains(r#"tabSelected="1""#));
    wb.ungroup_sheets().unwrap();
    let bytes = wb.write_to_buffer().unwrap();
    let other = read_part(&bytes, "xl/worksheets/sheet2.xml").unwrap();
    assert!(!other.contains("tabSelected"));
}
