// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Pattern file loading.
//!
//! A pattern file is UTF-8 text, one record per line, fields separated by
//! `::`, comments running from `/*` to end of line. Each record has up to
//! six columns: `template :: error :: encoding :: slot-index :: _ :: _`.
//! Lines with fewer fields fill the columns positionally, except that a
//! two-field record is `template :: encoding` (the error column stays
//! empty). `.include "path"` splices another pattern file in place.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::core::text::{quoted_string, skip_spaces, starts_with_nocase, strip_pattern_comment};

pub const COLUMNS: usize = 6;

/// One row of the pattern table.
#[derive(Debug, Clone, Default)]
pub struct PatternRecord {
    pub cols: [String; COLUMNS],
}

impl PatternRecord {
    pub fn template(&self) -> &str {
        &self.cols[0]
    }

    pub fn error_expr(&self) -> &str {
        &self.cols[1]
    }

    pub fn encoding(&self) -> &str {
        &self.cols[2]
    }

    pub fn slot_expr(&self) -> &str {
        &self.cols[3]
    }

    pub fn is_blank(&self) -> bool {
        self.cols.iter().all(|c| c.is_empty())
    }

    /// True for rows that configure the assembler rather than describe an
    /// instruction. These are applied once at startup and skipped during
    /// matching.
    pub fn is_table_directive(&self) -> bool {
        matches!(
            self.cols[0].as_str(),
            ".setsym" | ".clearsym" | ".padding" | ".bits" | ".symbolc" | ".vliw"
        ) || self.cols[0].eq_ignore_ascii_case("EPIC")
    }
}

/// Load a pattern file, following `.include` recursively. Include targets
/// resolve relative to the including file; targets that fail to open
/// contribute nothing.
pub fn load_pattern_file(path: &Path) -> io::Result<Vec<PatternRecord>> {
    let text = fs::read_to_string(path)?;
    Ok(parse_pattern_source(&text, path.parent()))
}

/// Parse pattern records from text. `base` anchors `.include` targets.
pub fn parse_pattern_source(text: &str, base: Option<&Path>) -> Vec<PatternRecord> {
    let mut records = Vec::new();
    for line in text.lines() {
        let cleaned = clean_line(line);
        if let Some(target) = include_target(&cleaned) {
            let nested = base.map_or_else(|| PathBuf::from(&target), |dir| dir.join(&target));
            if let Ok(included) = load_pattern_file(&nested) {
                records.extend(included);
            }
            continue;
        }
        records.push(split_record(&cleaned));
    }
    records
}

fn clean_line(line: &str) -> String {
    strip_pattern_comment(line)
        .replace('\t', " ")
        .replace(['\r', '\n'], "")
        .trim_end_matches(' ')
        .to_string()
}

fn include_target(line: &str) -> Option<String> {
    let b = line.as_bytes();
    let idx = skip_spaces(b, 0);
    if !starts_with_nocase(b, idx, b".include") {
        return None;
    }
    let target = quoted_string(&line[idx + 8..]);
    if target.is_empty() {
        None
    } else {
        Some(target)
    }
}

/// Split a cleaned line on `::` and normalize to six columns.
pub fn split_record(line: &str) -> PatternRecord {
    let mut fields = Vec::new();
    let b = line.as_bytes();
    let mut idx = 0usize;
    loop {
        let (field, next) = next_field(b, idx);
        idx = next;
        fields.push(field);
        if idx >= b.len() {
            break;
        }
    }

    let mut record = PatternRecord::default();
    match fields.len() {
        1 => {
            record.cols[0] = fields.swap_remove(0);
        }
        2 => {
            // template :: encoding
            record.cols[2] = fields.swap_remove(1);
            record.cols[0] = fields.swap_remove(0);
        }
        n if n <= COLUMNS => {
            for (slot, field) in fields.into_iter().enumerate() {
                record.cols[slot] = field;
            }
        }
        _ => {
            for (slot, field) in fields.into_iter().take(COLUMNS).enumerate() {
                record.cols[slot] = field;
            }
        }
    }
    record
}

fn next_field(b: &[u8], idx: usize) -> (String, usize) {
    let mut idx = skip_spaces(b, idx);
    if idx >= b.len() {
        return (String::new(), idx);
    }
    let mut field = Vec::new();
    while idx < b.len() {
        if idx + 2 <= b.len() && &b[idx..idx + 2] == b"::" {
            idx += 2;
            break;
        }
        field.push(b[idx]);
        idx += 1;
    }
    let mut text = String::from_utf8_lossy(&field).into_owned();
    while text.ends_with(' ') {
        text.pop();
    }
    (text, idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn temp_pattern_file(name: &str, contents: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("patforge-test-{}-{name}", std::process::id()));
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn three_field_record_fills_template_error_encoding() {
        let record = split_record("NOP :: 0,0 :: 0x00");
        assert_eq!(record.template(), "NOP");
        assert_eq!(record.error_expr(), "0,0");
        assert_eq!(record.encoding(), "0x00");
        assert_eq!(record.slot_expr(), "");
    }

    #[test]
    fn two_field_record_skips_error_column() {
        let record = split_record("NOP :: 0x00");
        assert_eq!(record.template(), "NOP");
        assert_eq!(record.error_expr(), "");
        assert_eq!(record.encoding(), "0x00");
    }

    #[test]
    fn four_field_record_carries_slot_index() {
        let record = split_record("ADD R!!i :: 0,0 :: 0x01,i :: 2");
        assert_eq!(record.slot_expr(), "2");
    }

    #[test]
    fn fields_are_space_trimmed() {
        let record = split_record("  LI R!!r  ::  0,0  ::  0x80|r  ");
        assert_eq!(record.template(), "LI R!!r");
        assert_eq!(record.error_expr(), "0,0");
        assert_eq!(record.encoding(), "0x80|r");
    }

    #[test]
    fn directive_rows_are_classified() {
        assert!(split_record(".setsym :: SP :: 14").is_table_directive());
        assert!(split_record(".bits :: big :: 16").is_table_directive());
        assert!(split_record("epic :: 0,1 :: 0x1d").is_table_directive());
        assert!(!split_record("NOP :: :: 0x00").is_table_directive());
        assert!(split_record("").is_blank());
    }

    #[test]
    fn comments_and_tabs_are_cleaned() {
        let path = temp_pattern_file(
            "clean.axx",
            "NOP\t::\t0,0 :: 0x00 /* comment */\n/* whole line */\n",
        );
        let records = load_pattern_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].template(), "NOP");
        assert_eq!(records[0].encoding(), "0x00");
        assert!(records[1].is_blank());
    }

    #[test]
    fn include_splices_records_in_place() {
        let inner = temp_pattern_file("inner.axx", "HLT :: 0,0 :: 0x76\n");
        let outer_contents = format!(
            "NOP :: 0,0 :: 0x00\n.include \"{}\"\nRET :: 0,0 :: 0xc9\n",
            inner.file_name().unwrap().to_str().unwrap()
        );
        let outer = temp_pattern_file("outer.axx", &outer_contents);
        let records = load_pattern_file(&outer).unwrap();
        std::fs::remove_file(&inner).unwrap();
        std::fs::remove_file(&outer).unwrap();
        let templates: Vec<&str> = records.iter().map(|r| r.template()).collect();
        assert_eq!(templates, vec!["NOP", "HLT", "RET"]);
    }

    #[test]
    fn missing_include_contributes_nothing() {
        let outer = temp_pattern_file(
            "missing-include.axx",
            "NOP :: 0,0 :: 0x00\n.include \"does-not-exist.axx\"\n",
        );
        let records = load_pattern_file(&outer).unwrap();
        std::fs::remove_file(&outer).unwrap();
        assert_eq!(records.len(), 1);
    }
}
