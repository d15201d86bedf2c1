// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

mod common;

use std::io::Cursor;

use common::{archive, init_logger, open_sheet, read_part, sheet_xml};
use sheetkit::{Error, Options, Workbook};

#[test]
fn sparse_rows_are_densified() {
    init_logger();
    let wb = open_sheet(
        r#"<row r="1"><c r="A1" t="str"><v>x</v></c></row><row r="3"><c r="C3" t="str"><v>y</v></c></row>"#,
        Options::default(),
    );
    assert_eq!(wb.get_cell_value("Sheet1", "A1").unwrap(), "x");
    assert_eq!(wb.get_cell_value("Sheet1", "A3").unwrap(), "");
    assert_eq!(wb.get_cell_value("Sheet1", "B3").unwrap(), "");
    assert_eq!(wb.get_cell_value("Sheet1", "C3").unwrap(), "y");
    assert_eq!(
        wb.get_rows("Sheet1").unwrap(),
        [vec!["x".to_string()], vec![], vec!["".into(), "".into(), "y".into()]]
    );
}

#[test]
fn saved_rows_stay_sparse() {
    let wb = open_sheet(
        r#"<row r="1"><c r="A1" t="str"><v>x</v></c></row><row r="3"><c r="C3" t="str"><v>y</v></c></row>"#,
        Options::default(),
    );
    wb.set_cell_value("Sheet1", "E5", 5).unwrap();
    let bytes = wb.write_to_buffer().unwrap();
    let sheet = read_part(&bytes, "xl/worksheets/sheet1.xml").unwrap();
    assert!(!sheet.contains(r#"<row r="2""#), "{sheet}");
    assert!(!sheet.contains(r#"r="A3""#), "{sheet}");
    assert!(sheet.contains(r#"<c r="E5"><v>5</v></c>"#), "{sheet}");
    assert!(sheet.contains(r#"<dimension ref="A1:E5"/>"#), "{sheet}");

    let reopened = Workbook::from_reader(Cursor::new(bytes), Options::default()).unwrap();
    assert_eq!(reopened.get_cell_value("Sheet1", "C3").unwrap(), "y");
    assert_eq!(reopened.get_cell_value("Sheet1", "E5").unwrap(), "5");
}

#[test]
fn legacy_row_without_number_fills_empty_cells() {
    let wb = open_sheet(
        r#"<row><c r="A1" t="str"><v>fallback</v></c><c r="B2" t="str"><v>b</v></c></row><row r="1"><c r="A1" t="str"><v>kept</v></c></row>"#,
        Options::default(),
    );
    assert_eq!(wb.get_cell_value("Sheet1", "A1").unwrap(), "kept");
    assert_eq!(wb.get_cell_value("Sheet1", "B2").unwrap(), "b");
}

#[test]
fn malformed_reference_fails_the_first_access() {
    let wb = open_sheet(r#"<row r="1"><c r="1A"><v>1</v></c></row>"#, Options::default());
    assert!(matches!(
        wb.get_cell_value("Sheet1", "A1"),
        Err(Error::InvalidCellName(_))
    ));
}

#[test]
fn row_height_past_the_last_row_is_the_default() {
    let wb = open_sheet(
        r#"<row r="1" ht="30" customHeight="1"><c r="A1"><v>1</v></c></row>"#,
        Options::default(),
    );
    assert_eq!(wb.get_row_height("Sheet1", 1).unwrap(), 30.0);
    assert_eq!(wb.get_row_height("Sheet1", 500).unwrap(), 15.0);
    assert!(matches!(wb.get_row_height("Sheet1", 0), Err(Error::RowNumber(0))));
    assert!(matches!(
        wb.get_row_height("Other", 1),
        Err(Error::SheetNotExist(name)) if name == "Other"
    ));
}

#[test]
fn insert_then_remove_restores_the_row_count() {
    let wb = open_sheet(
        r#"<row r="1"><c r="A1"><v>1</v></c></row><row r="2"><c r="A2"><v>2</v></c></row><row r="3"><c r="A3"><f>A1+A2</f><v>3</v></c></row>"#,
        Options::default(),
    );
    assert_eq!(wb.rows("Sheet1").unwrap().total_rows(), 3);

    wb.insert_row("Sheet1", 2).unwrap();
    assert_eq!(wb.rows("Sheet1").unwrap().total_rows(), 4);
    assert_eq!(wb.get_cell_value("Sheet1", "A3").unwrap(), "2");
    assert_eq!(wb.get_cell_formula("Sheet1", "A4").unwrap(), "A1+A3");

    wb.remove_row("Sheet1", 2).unwrap();
    assert_eq!(wb.rows("Sheet1").unwrap().total_rows(), 3);
    assert_eq!(wb.get_cell_value("Sheet1", "A2").unwrap(), "2");
    assert_eq!(wb.get_cell_formula("Sheet1", "A3").unwrap(), "A1+A2");
}

#[test]
fn merges_are_coalesced() {
    let wb = open_sheet(
        r#"<row r="1"><c r="B1" t="str"><v>title</v></c></row>"#,
        Options::default(),
    );
    wb.merge_cell("Sheet1", "B1", "C1").unwrap();
    wb.merge_cell("Sheet1", "D2", "B1").unwrap();

    let merges = wb.get_merge_cells("Sheet1").unwrap();
    assert_eq!(merges.len(), 1);
    assert_eq!(merges[0].range().unwrap(), "B1:D2");
    assert_eq!(merges[0].start_axis().unwrap(), "B1");
    assert_eq!(merges[0].end_axis().unwrap(), "D2");
    assert_eq!(merges[0].value(), "title");
    assert_eq!(wb.get_merge_cells("Sheet1").unwrap(), merges);

    let bytes = wb.write_to_buffer().unwrap();
    let sheet = read_part(&bytes, "xl/worksheets/sheet1.xml").unwrap();
    assert!(
        sheet.contains(r#"<mergeCells count="1"><mergeCell ref="B1:D2"/></mergeCells>"#),
        "{sheet}"
    );

    wb.unmerge_cell("Sheet1", "C2", "C2").unwrap();
    assert!(wb.get_merge_cells("Sheet1").unwrap().is_empty());
}

#[test]
fn merges_follow_row_insertion() {
    let wb = open_sheet("", Options::default());
    wb.merge_cell("Sheet1", "A2", "B3").unwrap();
    wb.insert_row("Sheet1", 1).unwrap();
    assert_eq!(
        wb.get_merge_cells("Sheet1").unwrap()[0].range().unwrap(),
        "A3:B4"
    );
}

#[test]
fn sheets_are_independent_across_threads() {
    let wb = Workbook::from_reader(
        Cursor::new(archive(&[("One", sheet_xml("")), ("Two", sheet_xml(""))])),
        Options::default(),
    )
    .unwrap();
    std::thread::scope(|s| {
        for sheet in ["One", "Two"] {
            let wb = &wb;
            s.spawn(move || {
                for row in 1..=200 {
                    wb.set_cell_value(sheet, &format!("B{row}"), row).unwrap();
                }
            });
        }
    });
    assert_eq!(wb.get_cell_value("One", "B200").unwrap(), "200");
    assert_eq!(wb.get_cell_value("Two", "B17").unwrap(), "17");
}

#[test]
fn columns_are_inserted_and_removed() {
    let wb = open_sheet(
        r#"<row r="1"><c r="A1"><v>1</v></c><c r="B1"><v>2</v></c><c r="C1"><f>SUM(A1:B1)</f></c></row>"#,
        Options::default(),
    );
    wb.insert_col("Sheet1", "b").unwrap();
    assert_eq!(wb.get_cell_value("Sheet1", "C1").unwrap(), "2");
    assert_eq!(wb.get_cell_formula("Sheet1", "D1").unwrap(), "SUM(A1:C1)");

    wb.remove_col("Sheet1", "A").unwrap();
    assert_eq!(wb.get_rows("Sheet1").unwrap(), [vec!["".to_string(), "2".into(), "".into()]]);
    assert!(matches!(
        wb.insert_col("Sheet1", "1A"),
        Err(Error::InvalidColumnName(_))
    ));
}

#[test]
fn custom_default_row_height() {
    let wb = open_sheet("", Options::default());
    wb.set_sheet_format(
        "Sheet1",
        &sheetkit::SheetFormat {
            default_row_height: Some(20.0),
            custom_height: Some(true),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(wb.get_row_height("Sheet1", 7).unwrap(), 20.0);
    wb.set_row_height("Sheet1", 3, 40.0).unwrap();
    assert_eq!(wb.get_row_height("Sheet1", 2).unwrap(), 20.0);
    assert_eq!(wb.get_sheet_format("Sheet1").unwrap().default_row_height, Some(20.0));
}
