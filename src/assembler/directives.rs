// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Directive handling.
//!
//! Source directives are dispatched on the first whitespace-delimited
//! token of a line, before the pattern table is consulted. Pattern-table
//! directives (`.setsym`, `.clearsym`, `.padding`, `.bits`, `.symbolc`,
//! `.vliw`, `EPIC`) configure the assembler once at startup, in load
//! order; their operands occupy the error/encoding/slot columns of the
//! record (`.setsym :: NAME :: VALUE`, `.bits :: big :: 16`).

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use crate::core::config::{Endian, VliwEntry, ALPHA, DIGITS};
use crate::core::symtab::UNDEF;
use crate::core::text::{char_at, label_word, quoted_string, skip_spaces};

use super::engine::{Assembler, ExportEntry};

impl Assembler {
    /// Try the built-in source directives; true when the line was handled.
    pub(crate) fn try_source_directive(
        &mut self,
        head: &str,
        rest: &str,
        out: &mut dyn Write,
    ) -> io::Result<bool> {
        if self.dir_section(head, rest) {
            return Ok(true);
        }
        if self.dir_endsection(head) {
            return Ok(true);
        }
        if self.dir_zero(head, rest) {
            return Ok(true);
        }
        if head.eq_ignore_ascii_case(".ASCII") {
            return self.emit_string(rest, out);
        }
        if head.eq_ignore_ascii_case(".ASCIIZ") {
            let closed = self.emit_string(rest, out)?;
            if closed {
                let pc = self.pc;
                self.emit_word(pc, 0, out)?;
                self.pc += 1;
            }
            return Ok(closed);
        }
        if self.dir_include(head, rest, out)? {
            return Ok(true);
        }
        if self.dir_align(head, rest) {
            return Ok(true);
        }
        if self.dir_org(head, rest) {
            return Ok(true);
        }
        if self.dir_labelc(head, rest) {
            return Ok(true);
        }
        if self.dir_export(head, rest) {
            return Ok(true);
        }
        Ok(false)
    }

    fn dir_section(&mut self, head: &str, rest: &str) -> bool {
        if !head.eq_ignore_ascii_case("SECTION") && !head.eq_ignore_ascii_case("SEGMENT") {
            return false;
        }
        if !rest.is_empty() {
            self.sections.open(rest, self.pc);
        }
        true
    }

    fn dir_endsection(&mut self, head: &str) -> bool {
        if !head.eq_ignore_ascii_case("ENDSECTION") && !head.eq_ignore_ascii_case("ENDSEGMENT") {
            return false;
        }
        self.sections.close_current(self.pc);
        true
    }

    // .zero N emits N+1 zero units through the padding path
    fn dir_zero(&mut self, head: &str, rest: &str) -> bool {
        if !head.eq_ignore_ascii_case(".ZERO") {
            return false;
        }
        let (count, _) = self.eval_asm(rest.as_bytes(), 0);
        let mut i = 0i64;
        while i <= count {
            let pc = self.pc;
            self.emit_padding(pc, 0);
            self.pc += 1;
            i += 1;
        }
        true
    }

    /// Emit a double-quoted string byte by byte, honoring the `\0`, `\t`
    /// and `\n` escapes. Returns whether the closing quote was found; a
    /// malformed string falls through to pattern matching.
    fn emit_string(&mut self, rest: &str, out: &mut dyn Write) -> io::Result<bool> {
        let b = rest.as_bytes();
        let mut idx = skip_spaces(b, 0);
        if rest.is_empty() || char_at(b, idx) != b'"' {
            return Ok(false);
        }
        idx += 1;
        while idx < b.len() {
            if b[idx] == b'"' {
                return Ok(true);
            }
            let ch: u8;
            if idx + 2 <= b.len() && &b[idx..idx + 2] == b"\\0" {
                idx += 2;
                ch = 0;
            } else if idx + 2 <= b.len() && &b[idx..idx + 2] == b"\\t" {
                idx += 2;
                ch = b'\t';
            } else if idx + 2 <= b.len() && &b[idx..idx + 2] == b"\\n" {
                idx += 2;
                ch = b'\n';
            } else {
                ch = b[idx];
                idx += 1;
            }
            let pc = self.pc;
            self.emit_word(pc, i64::from(ch), out)?;
            self.pc += 1;
        }
        Ok(false)
    }

    fn dir_include(&mut self, head: &str, rest: &str, out: &mut dyn Write) -> io::Result<bool> {
        if !head.eq_ignore_ascii_case(".INCLUDE") {
            return Ok(false);
        }
        let target = quoted_string(rest);
        if !target.is_empty() {
            let nested = Path::new(&self.current_file)
                .parent()
                .map_or_else(|| Path::new(&target).to_path_buf(), |dir| dir.join(&target));
            self.run_file(&nested, out)?;
        }
        Ok(true)
    }

    fn dir_align(&mut self, head: &str, rest: &str) -> bool {
        if !head.eq_ignore_ascii_case(".ALIGN") {
            return false;
        }
        if !rest.is_empty() {
            let (value, _) = self.eval_asm(rest.as_bytes(), 0);
            self.config.align = value;
        }
        self.pc = self.config.align_addr(self.pc);
        true
    }

    // .org N moves the location counter; .org N,P pads forward gaps with
    // the padding value
    fn dir_org(&mut self, head: &str, rest: &str) -> bool {
        if !head.eq_ignore_ascii_case(".ORG") {
            return false;
        }
        let b = rest.as_bytes();
        let (target, idx) = self.eval_asm(b, 0);
        let pad = idx + 2 <= b.len() && b[idx..idx + 2].eq_ignore_ascii_case(b",P");
        if pad && target > self.pc {
            for addr in self.pc..target {
                let padding = self.config.padding;
                self.emit_padding(addr, padding);
            }
        }
        self.pc = target;
        true
    }

    fn dir_labelc(&mut self, head: &str, rest: &str) -> bool {
        if !head.eq_ignore_ascii_case(".LABELC") {
            return false;
        }
        if !rest.is_empty() {
            self.config.lwordchars = format!("{ALPHA}{DIGITS}{rest}");
        }
        true
    }

    // recognized only in emitting passes; pass 1 lets the line fall
    // through to (suppressed) pattern matching
    fn dir_export(&mut self, head: &str, rest: &str) -> bool {
        if !self.pass.emitting() {
            return false;
        }
        if !head.eq_ignore_ascii_case(".EXPORT") {
            return false;
        }
        let b = rest.as_bytes();
        let mut idx = 0usize;
        while char_at(b, idx) != 0 {
            idx = skip_spaces(b, idx);
            let (name, j) = label_word(b, idx, &self.config.lwordchars);
            idx = j;
            if name.is_empty() {
                break;
            }
            if char_at(b, idx) == b':' {
                idx += 1;
            }
            let (value, section) = match self.labels.get(&name) {
                Some(entry) => (entry.value, entry.section.clone()),
                None => {
                    self.flags.undefined_label = true;
                    (UNDEF, String::new())
                }
            };
            self.exports.insert(name, ExportEntry { value, section });
            if char_at(b, idx) == b',' {
                idx += 1;
            }
        }
        true
    }

    /// Apply the pattern table's configuration directives in load order.
    /// Runs once at startup, before any source is read.
    pub(crate) fn apply_table_directives(&mut self) {
        let patterns = Arc::clone(&self.patterns);
        for record in patterns.iter() {
            let cols = &record.cols;
            match cols[0].as_str() {
                ".setsym" => {
                    let key = cols[1].to_ascii_uppercase();
                    let (value, _) = self.eval_pattern(cols[2].as_bytes(), 0);
                    self.symbols.set(&key, value);
                }
                ".clearsym" => {
                    if !cols[2].is_empty() {
                        self.symbols.remove(&cols[2]);
                    }
                }
                ".padding" => {
                    let (value, _) = self.eval_pattern(cols[2].as_bytes(), 0);
                    self.config.padding = value;
                }
                ".bits" => {
                    self.config.endian = if cols[1] == "big" {
                        Endian::Big
                    } else {
                        Endian::Little
                    };
                    let (value, _) = self.eval_pattern(cols[2].as_bytes(), 0);
                    self.config.bits = value;
                }
                ".symbolc" => {
                    self.config.swordchars = format!("{ALPHA}{DIGITS}{}", cols[2]);
                }
                ".vliw" => {
                    let (vbits, _) = self.eval_pattern(cols[1].as_bytes(), 0);
                    let (inst_bits, _) = self.eval_pattern(cols[2].as_bytes(), 0);
                    let (template_bits, _) = self.eval_pattern(cols[3].as_bytes(), 0);
                    let (nop, _) = self.eval_pattern(cols[4].as_bytes(), 0);
                    self.config.vliw_bits = vbits;
                    self.config.vliw_inst_bits = inst_bits;
                    self.config.vliw_template_bits = template_bits;
                    let nop_bytes = (inst_bits + 7) / 8;
                    let mut list = Vec::new();
                    let mut value = nop;
                    let mut i = 0i64;
                    while i < nop_bytes {
                        list.push((value & 0xff) as u8);
                        value >>= 8;
                        i += 1;
                    }
                    self.config.vliw_nop = list;
                    self.config.vliw_enabled = true;
                }
                _ if cols[0].eq_ignore_ascii_case("EPIC") => {
                    if cols[1].is_empty() {
                        continue;
                    }
                    let s = cols[1].as_bytes();
                    let mut idx = 0usize;
                    let mut indices = Vec::new();
                    loop {
                        let (value, j) = self.eval_pattern(s, idx);
                        idx = j;
                        indices.push(value);
                        if idx >= s.len() || s[idx] != b',' {
                            break;
                        }
                        idx += 1;
                    }
                    self.config.vliw_entries.push(VliwEntry {
                        indices,
                        template: cols[2].clone(),
                    });
                }
                _ => {}
            }
        }
    }
}
