// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! The assembly engine: per-line pipeline and two-pass driver.
//!
//! Each source line is comment-stripped and whitespace-normalized, a
//! leading label is recorded, source directives are handled, and the
//! remainder is tried against every pattern record in load order. The
//! first matching record yields an encoding expression list whose values
//! are emitted at the location counter.
//!
//! Pass 1 resolves labels with diagnostics suppressed; pass 2 emits.
//! The interactive pass does both at once. Faults are contained per
//! line: a failing line is reported and skipped, never aborting a pass.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Arc;

use crate::core::config::{Config, Endian};
use crate::core::error::{
    AsmError, AsmErrorKind, Diagnostic, PassCounts, Severity, PATTERN_ERROR_MESSAGES,
};
use crate::core::expr::{self, EvalContext, EvalFlags, ExprMode};
use crate::core::imagestore::ImageStore;
use crate::core::pattern::PatternRecord;
use crate::core::symtab::{LabelTable, ScratchVars, SectionTable, SymbolTable};
use crate::core::text::{
    char_at, label_word, reduce_spaces, skip_spaces, strip_source_comment, token_to_slot_break,
    token_to_space,
};
use crate::core::unify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// Single interactive pass: prints and emits.
    Interactive,
    /// Label collection; diagnostics and emission suppressed.
    First,
    /// Emission with labels from pass 1.
    Second,
}

impl Pass {
    pub fn emitting(self) -> bool {
        matches!(self, Pass::Interactive | Pass::Second)
    }
}

/// An exported label with the section it was defined in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportEntry {
    pub value: i64,
    pub section: String,
}

/// Result of assembling one statement (a whole line, or one VLIW slot).
#[derive(Debug, Default)]
pub(crate) struct Statement {
    pub(crate) slot_index: i64,
    pub(crate) values: Vec<i64>,
    pub(crate) ok: bool,
    pub(crate) next: usize,
}

pub struct Assembler {
    pub config: Config,
    pub(crate) patterns: Arc<Vec<PatternRecord>>,
    pub symbols: SymbolTable,
    /// Names reserved by the pattern file; labels may not shadow them.
    pub(crate) pattern_symbols: HashSet<String>,
    pub labels: LabelTable,
    pub sections: SectionTable,
    pub exports: BTreeMap<String, ExportEntry>,
    pub(crate) vars: ScratchVars,
    pub image: ImageStore,
    pub diagnostics: Vec<Diagnostic>,
    pub pc: i64,
    pub pass: Pass,
    pub(crate) current_file: String,
    pub(crate) line_no: u32,
    pub(crate) file_stack: Vec<(String, u32)>,
    pub(crate) flags: EvalFlags,
    pub(crate) vliw_stop: i64,
    pub(crate) slot_count: i64,
    pub(crate) counts: PassCounts,
}

impl Assembler {
    pub fn new(patterns: Vec<PatternRecord>, strict_epic: bool) -> Self {
        let mut asm = Self {
            config: Config::default(),
            patterns: Arc::new(patterns),
            symbols: SymbolTable::new(),
            pattern_symbols: HashSet::new(),
            labels: LabelTable::new(),
            sections: SectionTable::new(),
            exports: BTreeMap::new(),
            vars: ScratchVars::new(),
            image: ImageStore::new(),
            diagnostics: Vec::new(),
            pc: 0,
            pass: Pass::Interactive,
            current_file: String::new(),
            line_no: 1,
            file_stack: Vec::new(),
            flags: EvalFlags::default(),
            vliw_stop: 0,
            slot_count: 1,
            counts: PassCounts::new(),
        };
        asm.config.vliw_strict_sets = strict_epic;
        asm.apply_table_directives();
        asm.pattern_symbols = asm.symbols.names().cloned().collect();
        asm.flags = EvalFlags::default();
        asm
    }

    pub fn counts(&self) -> PassCounts {
        self.counts
    }

    /// Assemble a source file twice: pass 1 collects labels, pass 2 emits.
    pub fn run_two_pass(&mut self, source: &Path, out: &mut dyn Write) -> io::Result<()> {
        self.pc = 0;
        self.pass = Pass::First;
        self.line_no = 1;
        self.run_file(source, out)?;
        self.pc = 0;
        self.pass = Pass::Second;
        self.line_no = 1;
        self.run_file(source, out)
    }

    /// Assemble one file in the current pass. Used for the top-level
    /// source and recursively for `.include`; the file/line position of
    /// the including file is restored afterwards.
    pub fn run_file(&mut self, path: &Path, out: &mut dyn Write) -> io::Result<()> {
        self.file_stack.push((self.current_file.clone(), self.line_no));
        self.current_file = path.to_string_lossy().into_owned();
        self.line_no = 1;
        match File::open(path) {
            Ok(file) => {
                for line in BufReader::new(file).lines() {
                    let line = line?;
                    self.process_line(&line, out)?;
                }
            }
            Err(_) => {
                let name = self.current_file.clone();
                self.report(AsmErrorKind::Io, "Cannot open source file", Some(&name));
            }
        }
        if let Some((file, line)) = self.file_stack.pop() {
            self.current_file = file;
            self.line_no = line;
        }
        Ok(())
    }

    /// Assemble one line, printing the listing line in emitting passes:
    /// `PC FILE LINENO TEXT  0xBB 0xBB ...` with inline diagnostics.
    pub fn process_line(&mut self, raw: &str, out: &mut dyn Write) -> io::Result<()> {
        let text = raw.replace('\n', "");
        self.flags.division_by_zero = false;
        if self.pass.emitting() {
            write!(
                out,
                "{:016x} {} {} {} ",
                self.pc, self.current_file, self.line_no, text
            )?;
        }
        self.line_body(&text, out)?;
        if self.flags.division_by_zero {
            self.flags.division_by_zero = false;
            if self.pass.emitting() {
                write!(out, " Division by 0 error.")?;
                self.report(AsmErrorKind::Expression, "Division by 0 error", None);
            }
        }
        if self.pass.emitting() {
            writeln!(out)?;
        }
        self.line_no += 1;
        self.counts.lines += 1;
        Ok(())
    }

    fn line_body(&mut self, raw: &str, out: &mut dyn Write) -> io::Result<bool> {
        let line = reduce_spaces(&raw.replace('\t', " "));
        let line = strip_source_comment(&line).to_string();
        if line.is_empty() {
            return Ok(false);
        }
        let line = self.strip_label(&line, out)?;
        if line.is_empty() {
            return Ok(false);
        }
        self.slot_count = line.split("!!").filter(|part| !part.is_empty()).count() as i64;

        let st = self.statement(&line, 0, out)?;
        if !st.ok {
            return Ok(false);
        }

        let b = line.as_bytes();
        let in_bundle = st.next + 2 <= b.len() && &b[st.next..st.next + 2] == b"!!";
        if !self.config.vliw_enabled || !in_bundle {
            let count = st.values.len() as i64;
            for (off, value) in st.values.iter().enumerate() {
                let addr = self.pc + off as i64;
                self.emit_word(addr, *value, out)?;
            }
            self.pc += count;
            Ok(true)
        } else {
            self.process_bundle(&line, st, out)
        }
    }

    /// Assemble one statement: directives first, then the pattern table
    /// in load order. Returns the matched record's slot index and
    /// encoding values; `next` points at the `!!` separator if any.
    pub(crate) fn statement(
        &mut self,
        line: &str,
        idx: usize,
        out: &mut dyn Write,
    ) -> io::Result<Statement> {
        let b = line.as_bytes();
        let (head, idx) = token_to_space(b, idx);
        let (rest_raw, idx) = token_to_slot_break(b, idx);
        let rest = rest_raw.trim_end_matches(' ').to_string();

        if self.try_source_directive(&head, &rest, out)? {
            return Ok(Statement {
                ok: true,
                next: idx,
                ..Statement::default()
            });
        }
        if head.is_empty() {
            return Ok(Statement {
                next: idx,
                ..Statement::default()
            });
        }

        let mut matched = false;
        let mut values = Vec::new();
        let mut slot_index = 0i64;
        let lin = reduce_spaces(format!("{head} {rest}").trim());
        let patterns = Arc::clone(&self.patterns);
        for record in patterns.iter() {
            self.vars.reset();
            if record.is_blank() || record.is_table_directive() {
                continue;
            }
            // an empty template column stops the scan without error
            if record.template().is_empty() {
                matched = true;
                break;
            }
            self.flags.undefined_label = false;
            if self.match_record(&lin, record.template()) {
                self.error_directive(record.error_expr(), out)?;
                values = self.make_values(record.encoding());
                slot_index = self.eval_pattern(record.slot_expr().as_bytes(), 0).0;
                matched = true;
                break;
            }
        }

        if self.pass.emitting() {
            if self.flags.undefined_label {
                write!(out, " error - undefined label error.")?;
                self.report(AsmErrorKind::Label, "undefined label", None);
                return Ok(Statement {
                    next: idx,
                    ..Statement::default()
                });
            }
            if !matched {
                write!(out, " error - Syntax error.")?;
                self.report(AsmErrorKind::Syntax, "Syntax error", None);
                return Ok(Statement {
                    next: idx,
                    ..Statement::default()
                });
            }
        }

        Ok(Statement {
            slot_index,
            values,
            ok: true,
            next: idx,
        })
    }

    fn match_record(&mut self, lin: &str, template: &str) -> bool {
        let mut ctx = EvalContext {
            mode: ExprMode::Pattern,
            pc: self.pc,
            vliw_stop: self.vliw_stop,
            slot_count: self.slot_count,
            config: &self.config,
            symbols: &self.symbols,
            labels: &self.labels,
            vars: &mut self.vars,
            flags: &mut self.flags,
        };
        unify::match_optional(&mut ctx, lin.as_bytes(), template.as_bytes())
    }

    /// Build the output value list from an encoding expression list.
    /// A leading `,` (or doubled comma) pads with the padding value up to
    /// the next aligned offset; a leading `;` makes the value conditional
    /// on itself being non-zero.
    pub(crate) fn make_values(&mut self, encoding: &str) -> Vec<i64> {
        let s = encoding.as_bytes();
        let mut idx = 0usize;
        let mut values = Vec::new();
        while char_at(s, idx) != 0 {
            if char_at(s, idx) == b',' {
                idx += 1;
                let here = self.pc + values.len() as i64;
                let aligned = self.config.align_addr(here);
                for _ in here..aligned {
                    values.push(self.config.padding);
                }
                continue;
            }
            let before = idx;
            let conditional = char_at(s, idx) == b';';
            if conditional {
                idx += 1;
            }
            let (value, j) = self.eval_pattern(s, idx);
            idx = j;
            if !conditional || value != 0 {
                values.push(value);
            }
            if char_at(s, idx) == b',' {
                idx += 1;
            }
            if idx == before {
                // unparseable byte; skip it rather than spin
                idx += 1;
            }
        }
        values
    }

    /// Evaluate a pattern record's error expression: pairs `cond;code`
    /// separated by commas, reporting `code` when `cond` is non-zero.
    fn error_directive(&mut self, spec: &str, out: &mut dyn Write) -> io::Result<()> {
        if spec.replace(' ', "").is_empty() {
            return Ok(());
        }
        let s = spec.as_bytes();
        let mut idx = 0usize;
        while char_at(s, idx) != 0 {
            if char_at(s, idx) == b',' {
                idx += 1;
                continue;
            }
            let before = idx;
            let (cond, j) = self.eval_pattern(s, idx);
            idx = j;
            if char_at(s, idx) == b';' {
                idx += 1;
            }
            let (code, j) = self.eval_pattern(s, idx);
            idx = j;
            if self.pass.emitting() && cond != 0 {
                let message = usize::try_from(code)
                    .ok()
                    .and_then(|i| PATTERN_ERROR_MESSAGES.get(i).copied())
                    .unwrap_or("");
                write!(out, " Line {} Error code {} {}: ", self.line_no, code, message)?;
                self.report(AsmErrorKind::Pattern, "pattern error", Some(message));
            }
            if idx == before {
                idx += 1;
            }
        }
        Ok(())
    }

    /// Record a leading label definition and return the remainder of the
    /// line. `label: .equ expr` consumes the whole line.
    fn strip_label(&mut self, line: &str, out: &mut dyn Write) -> io::Result<String> {
        if line.is_empty() {
            return Ok(String::new());
        }
        let b = line.as_bytes();
        let (label, idx) = label_word(b, 0, &self.config.lwordchars);
        if !label.is_empty() && idx > 0 && char_at(b, idx - 1) == b':' {
            let after = skip_spaces(b, idx);
            let (word, word_end) = token_to_space(b, after);
            if word.eq_ignore_ascii_case(".EQU") {
                let (value, _) = self.eval_asm(b, word_end);
                let section = self.sections.current.clone();
                self.put_label(&label, value, &section, out)?;
                return Ok(String::new());
            }
            let section = self.sections.current.clone();
            let pc = self.pc;
            self.put_label(&label, pc, &section, out)?;
            return Ok(line[idx..].to_string());
        }
        Ok(line.to_string())
    }

    /// Define a label. Redefinition is rejected in label-collecting
    /// passes; names owned by the pattern file are always rejected.
    pub(crate) fn put_label(
        &mut self,
        name: &str,
        value: i64,
        section: &str,
        out: &mut dyn Write,
    ) -> io::Result<bool> {
        if matches!(self.pass, Pass::First | Pass::Interactive) && self.labels.contains(name) {
            write!(out, " error - label already defined.")?;
            self.report(AsmErrorKind::Label, "label already defined", Some(name));
            return Ok(false);
        }
        if self.pattern_symbols.contains(&name.to_ascii_uppercase()) {
            write!(out, " error - '{name}' is a pattern file symbol.")?;
            self.report(AsmErrorKind::Label, "name is a pattern file symbol", Some(name));
            return Ok(false);
        }
        self.labels.insert(name, value, section);
        Ok(true)
    }

    /// Emit one unit at `addr` (in units), masked to the configured
    /// width, and echo its bytes on the listing.
    pub(crate) fn emit_word(
        &mut self,
        addr: i64,
        value: i64,
        out: &mut dyn Write,
    ) -> io::Result<()> {
        self.emit_unit(addr, value, true, out)
    }

    /// Padding variant: reaches the image but not the listing.
    pub(crate) fn emit_padding(&mut self, addr: i64, value: i64) {
        let _ = self.emit_unit(addr, value, false, &mut io::sink());
    }

    fn emit_unit(
        &mut self,
        addr: i64,
        value: i64,
        print: bool,
        out: &mut dyn Write,
    ) -> io::Result<()> {
        if !self.pass.emitting() {
            return Ok(());
        }
        let unit_bytes = self.config.unit_bytes();
        let masked = (value & self.config.value_mask()) as i128;
        let mut bytes = Vec::with_capacity(unit_bytes as usize);
        match self.config.endian {
            Endian::Little => {
                for i in 0..unit_bytes {
                    bytes.push(byte_of(masked, 8 * i));
                }
            }
            Endian::Big => {
                for i in (0..unit_bytes).rev() {
                    bytes.push(byte_of(masked, 8 * i));
                }
            }
        }
        if print {
            for byte in &bytes {
                write!(out, " 0x{byte:02x}")?;
            }
        }
        if let Ok(base) = u64::try_from(addr) {
            if let Some(offset) = base.checked_mul(unit_bytes as u64) {
                for (i, byte) in bytes.iter().enumerate() {
                    self.image.store(offset + i as u64, *byte);
                }
            }
        }
        Ok(())
    }

    pub(crate) fn eval_pattern(&mut self, s: &[u8], idx: usize) -> (i64, usize) {
        self.eval_mode(ExprMode::Pattern, s, idx)
    }

    pub(crate) fn eval_asm(&mut self, s: &[u8], idx: usize) -> (i64, usize) {
        self.eval_mode(ExprMode::Assembly, s, idx)
    }

    fn eval_mode(&mut self, mode: ExprMode, s: &[u8], idx: usize) -> (i64, usize) {
        let mut ctx = EvalContext {
            mode,
            pc: self.pc,
            vliw_stop: self.vliw_stop,
            slot_count: self.slot_count,
            config: &self.config,
            symbols: &self.symbols,
            labels: &self.labels,
            vars: &mut self.vars,
            flags: &mut self.flags,
        };
        expr::eval(&mut ctx, s, idx)
    }

    pub(crate) fn report(&mut self, kind: AsmErrorKind, msg: &str, param: Option<&str>) {
        self.diagnostics.push(Diagnostic::new(
            &self.current_file,
            self.line_no,
            Severity::Error,
            AsmError::new(kind, msg, param),
        ));
        self.counts.errors += 1;
    }
}

fn byte_of(value: i128, shift: i64) -> u8 {
    if (0..128).contains(&shift) {
        ((value >> shift) & 0xff) as u8
    } else if value < 0 {
        0xff
    } else {
        0
    }
}
