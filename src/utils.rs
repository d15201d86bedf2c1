// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Internal module providing handy function

macro_rules! from_err {
    ($from:ty, $to:tt, $var:tt) => {
        impl From<$from> for $to {
            fn from(e: $from) -> $to {
                $to::$var(e)
            }
        }
    };
}

/// Parses an unsigned attribute value, `None` if it is not a plain integer
pub(crate) fn parse_u32(v: &[u8]) -> Option<u32> {
    atoi_simd::parse::<u32>(v).ok()
}

/// Parses a float attribute value, `None` if it is not a number
pub(crate) fn parse_f64(v: &[u8]) -> Option<f64> {
    fast_float2::parse::<f64, _>(v).ok()
}

/// Reads an OOXML boolean (`1`, `true`, `on`)
pub(crate) fn parse_bool(v: &str) -> bool {
    matches!(v, "1" | "true" | "on")
}

/// Formats a float the way spreadsheet applications write numbers: no
/// exponent, no trailing zeros
pub(crate) fn format_f64(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

/// Resolves a relationship target against the directory of its source part.
///
/// Absolute targets (leading `/`) are rooted at the package, relative ones
/// may walk up with `..`.
pub(crate) fn resolve_target(base_dir: &str, target: &str) -> String {
    let joined = match target.strip_prefix('/') {
        Some(abs) => abs.to_string(),
        None if base_dir.is_empty() => target.to_string(),
        None => format!("{}/{}", base_dir.trim_end_matches('/'), target),
    };
    let mut parts: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

/// Directory of a part path, without trailing `/`
pub(crate) fn part_dir(path: &str) -> &str {
    path.rfind('/').map_or("", |i| &path[..i])
}

/// Target of a relationship from a part in `base_dir` to the part at `path`
/// (`xl/worksheets`, `xl/comments1.xml` -> `../comments1.xml`)
pub(crate) fn relative_path(base_dir: &str, path: &str) -> String {
    let base: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    let target: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let common = base.iter().zip(&target).take_while(|(a, b)| a == b).count();
    let mut parts = vec![".."; base.len() - common];
    parts.extend(target[common..].iter().copied());
    parts.join("/")
}

/// Path of the relationships part attached to `path`
/// (`xl/workbook.xml` -> `xl/_rels/workbook.xml.rels`)
pub(crate) fn rels_path_for(path: &str) -> String {
    match path.rfind('/') {
        Some(i) => format!("{}/_rels/{}.rels", &path[..i], &path[i + 1..]),
        None => format!("_rels/{path}.rels"),
    }
}
