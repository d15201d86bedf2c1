// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Benchmarks for worksheet loading and row streaming.
//!
//! ```bash
//! cargo bench --bench basic
//! ```

use criterion::{criterion_group, criterion_main, Criterion};
use sheetkit::{Options, Workbook};
use std::fmt::Write as _;
use std::hint::black_box;
use std::io::{Cursor, Write};
use std::time::Duration;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const ROWS: u32 = 50_000;

/// A blank workbook whose first sheet holds `ROWS` rows of five cells,
/// written in reverse order so that loading has to sort them
fn large_workbook() -> Vec<u8> {
    let blank = Workbook::new().unwrap().write_to_buffer().unwrap();
    let mut data = String::new();
    for r in (1..=ROWS).rev() {
        write!(data, r#"<row r="{r}">"#).unwrap();
        for c in ["A", "B", "D", "E", "G"] {
            write!(data, r#"<c r="{c}{r}"><v>{r}.5</v></c>"#).unwrap();
        }
        data.push_str("</row>");
    }
    let sheet = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{data}</sheetData></worksheet>"#
    );

    let mut source = zip::ZipArchive::new(Cursor::new(blank)).unwrap();
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for i in 0..source.len() {
        let mut file = source.by_index(i).unwrap();
        let name = file.name().to_string();
        zip.start_file(name.as_str(), options).unwrap();
        if name == "xl/worksheets/sheet1.xml" {
            zip.write_all(sheet.as_bytes()).unwrap();
        } else {
            std::io::copy(&mut file, &mut zip).unwrap();
        }
    }
    zip.finish().unwrap().into_inner()
}

fn stream(bytes: &[u8], options: Options) -> usize {
    let wb = Workbook::from_reader(Cursor::new(bytes), options).unwrap();
    let mut count = 0;
    for row in wb.rows("Sheet1").unwrap() {
        count += row.unwrap().len();
    }
    count
}

fn bench(c: &mut Criterion) {
    let bytes = large_workbook();
    let mut group = c.benchmark_group("basic");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("stream_in_memory", |b| {
        b.iter(|| black_box(stream(&bytes, Options::default())))
    });
    group.bench_function("stream_temp_file", |b| {
        let options = Options {
            worksheet_unzip_mem_limit: 0,
            ..Options::default()
        };
        b.iter(|| black_box(stream(&bytes, options.clone())))
    });
    group.bench_function("load_and_normalize", |b| {
        b.iter(|| {
            let wb = Workbook::from_reader(Cursor::new(&bytes), Options::default()).unwrap();
            black_box(wb.get_cell_value("Sheet1", "G1").unwrap())
        })
    });
    group.bench_function("insert_row", |b| {
        let wb = Workbook::from_reader(Cursor::new(&bytes), Options::default()).unwrap();
        b.iter(|| {
            wb.insert_row("Sheet1", 2).unwrap();
            wb.remove_row("Sheet1", 2).unwrap();
        })
    });
    group.finish();
}

criterion_group!(benches, bench);
criterion_main!(benches);
