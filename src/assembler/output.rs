use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use serde_json::json;

use crate::core::text::{label_word, skip_spaces};

use super::cli::OutputFormat;
use super::engine::Assembler;

/// Write the symbol export side file: one record per section
/// (`NAME\tSTART\tSIZE\tFLAG`), then one per exported label
/// (`NAME\tVALUE`). `elf` marks `.text` and `.data` with ELF-like
/// section flags. Records are sorted by name.
pub(super) fn write_export(
    asm: &Assembler,
    path: &Path,
    elf: bool,
    format: OutputFormat,
) -> io::Result<()> {
    let mut sections: Vec<_> = asm.sections.iter().collect();
    sections.sort_by(|a, b| a.0.cmp(b.0));

    match format {
        OutputFormat::Text => {
            let mut file = File::create(path)?;
            for (name, span) in sections {
                writeln!(
                    file,
                    "{}\t{}\t{}\t{}",
                    name,
                    hex64(span.start),
                    hex64(span.size),
                    section_flag(name, elf)
                )?;
            }
            for (name, entry) in &asm.exports {
                writeln!(file, "{}\t{}", name, hex64(entry.value))?;
            }
            Ok(())
        }
        OutputFormat::Json => {
            let sections: Vec<_> = sections
                .into_iter()
                .map(|(name, span)| {
                    json!({
                        "name": name,
                        "start": span.start,
                        "size": span.size,
                        "flags": section_flag(name, elf),
                    })
                })
                .collect();
            let labels: Vec<_> = asm
                .exports
                .iter()
                .map(|(name, entry)| {
                    json!({
                        "name": name,
                        "value": entry.value,
                        "section": entry.section,
                    })
                })
                .collect();
            let doc = json!({ "sections": sections, "labels": labels });
            fs::write(path, format!("{doc}\n"))
        }
    }
}

fn section_flag(name: &str, elf: bool) -> &'static str {
    if elf && name == ".text" {
        "AX"
    } else if elf && name == ".data" {
        "WA"
    } else {
        ""
    }
}

// Negative values render with a leading minus, not in two's complement.
fn hex64(value: i64) -> String {
    if value < 0 {
        format!("-0x{:x}", value.unsigned_abs())
    } else {
        format!("0x{value:x}")
    }
}

/// Pre-define labels from an import file. Each line is
/// `SECTION LABEL EXPR`; the expression is evaluated in assembly mode.
pub(super) fn import_file(
    asm: &mut Assembler,
    path: &Path,
    out: &mut dyn Write,
) -> io::Result<()> {
    let file = File::open(path)?;
    for line in BufReader::new(file).lines() {
        let line = line?;
        import_line(asm, &line, out)?;
    }
    Ok(())
}

fn import_line(asm: &mut Assembler, line: &str, out: &mut dyn Write) -> io::Result<bool> {
    let b = line.as_bytes();
    let idx = skip_spaces(b, 0);
    let (section, idx) = label_word(b, idx, &asm.config.lwordchars);
    let idx = skip_spaces(b, idx);
    let (name, idx) = label_word(b, idx, &asm.config.lwordchars);
    if name.is_empty() {
        return Ok(false);
    }
    let idx = skip_spaces(b, idx);
    let (value, end) = asm.eval_asm(b, idx);
    if end == idx {
        return Ok(false);
    }
    asm.put_label(&name, value, &section, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::engine::Assembler;

    #[test]
    fn hex64_matches_reference_rendering() {
        assert_eq!(hex64(0), "0x0");
        assert_eq!(hex64(0x1234), "0x1234");
        assert_eq!(hex64(-1), "-0x1");
    }

    #[test]
    fn import_line_defines_label_in_section() {
        let mut asm = Assembler::new(Vec::new(), false);
        let mut out = Vec::new();
        assert!(import_line(&mut asm, ".data buffer 0x100+0x20", &mut out).unwrap());
        let entry = asm.labels.get("buffer").unwrap();
        assert_eq!(entry.value, 0x120);
        assert_eq!(entry.section, ".data");
    }

    #[test]
    fn import_line_rejects_incomplete_records() {
        let mut asm = Assembler::new(Vec::new(), false);
        let mut out = Vec::new();
        assert!(!import_line(&mut asm, ".data", &mut out).unwrap());
        assert!(!import_line(&mut asm, ".data buffer", &mut out).unwrap());
        assert!(asm.labels.is_empty());
    }
}
