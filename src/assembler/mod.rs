// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Assembler driver: CLI orchestration over the two-pass engine.

pub mod cli;
mod directives;
mod engine;
mod output;
mod repl;
mod vliw;

pub use cli::VERSION;
pub use engine::{Assembler, ExportEntry, Pass};

use std::fs::File;
use std::io::{self, Write};

use clap::Parser;

use crate::core::error::{AsmError, AsmErrorKind};
use crate::core::pattern::load_pattern_file;

use cli::{validate_cli, Cli, CliConfig};

/// Run the assembler with command-line arguments.
pub fn run() -> Result<(), AsmError> {
    let cli = Cli::parse();
    run_with_cli(&cli)
}

pub fn run_with_cli(cli: &Cli) -> Result<(), AsmError> {
    let config = validate_cli(cli)?;
    let patterns = load_pattern_file(&config.pattern).map_err(|err| {
        AsmError::new(
            AsmErrorKind::Io,
            &err.to_string(),
            Some(config.pattern.to_string_lossy().as_ref()),
        )
    })?;
    let mut asm = Assembler::new(patterns, config.strict_epic);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_streams(&mut asm, &config, &mut out)
        .map_err(|err| AsmError::new(AsmErrorKind::Io, &err.to_string(), None))
}

fn run_streams(
    asm: &mut Assembler,
    config: &CliConfig,
    out: &mut dyn Write,
) -> io::Result<()> {
    if let Some(import) = &config.import {
        // an unreadable import file contributes nothing
        let _ = output::import_file(asm, import, out);
    }
    match &config.source {
        Some(source) => asm.run_two_pass(source, out)?,
        None => repl::run(asm, out)?,
    }
    if let Some(path) = &config.outfile {
        let file = File::create(path)?;
        asm.image.write_bin_file(file)?;
    }
    if let Some((path, elf)) = &config.export {
        output::write_export(asm, path, *elf, config.format)?;
    }
    Ok(())
}
