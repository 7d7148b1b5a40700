// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Interactive mode: a single pass that both prints and emits.

use std::io::{self, Write};

use super::engine::{Assembler, Pass};

/// Read lines from standard input until EOF, assembling each one
/// immediately. The prompt shows the current location counter.
pub(super) fn run(asm: &mut Assembler, out: &mut dyn Write) -> io::Result<()> {
    asm.pc = 0;
    asm.pass = Pass::Interactive;
    asm.line_no = 1;
    asm.current_file = "(stdin)".to_string();

    let stdin = io::stdin();
    let mut input = String::new();
    loop {
        write!(out, "{:016x}: >> ", asm.pc)?;
        out.flush()?;
        input.clear();
        if stdin.read_line(&mut input)? == 0 {
            break;
        }
        let line = input.replace("\\\\", "\\");
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        asm.process_line(line, out)?;
    }
    Ok(())
}
