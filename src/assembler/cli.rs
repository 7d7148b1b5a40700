// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Command-line interface parsing and argument validation.

use std::fs;
use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use crate::core::error::{AsmError, AsmErrorKind};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const LONG_ABOUT: &str = "Retargetable table-driven assembler.

The pattern file declares the instruction set: syntax templates paired with
bit-encoding expressions, plus directives configuring endianness, word
width, character classes and an optional VLIW bundle layout. The source
file is written in the assembly language those patterns define.

With only a pattern file, an interactive session is started: each line is
assembled immediately and the prompt shows the current location counter.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Tab-separated export records.
    Text,
    /// One JSON document with sections and labels.
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "patforge",
    version = VERSION,
    about = "Retargetable table-driven assembler",
    long_about = LONG_ABOUT
)]
pub struct Cli {
    /// Pattern file declaring the instruction set.
    #[arg(value_name = "PATTERN")]
    pub pattern: PathBuf,

    /// Source file to assemble; omit to enter the interactive session.
    #[arg(value_name = "SOURCE")]
    pub source: Option<PathBuf>,

    #[arg(
        short = 'o',
        long = "out",
        value_name = "FILE",
        long_help = "Write the flat binary image to FILE. Unwritten positions up to the \
                     highest emitted address are zero-filled."
    )]
    pub outfile: Option<PathBuf>,

    #[arg(
        short = 'e',
        long = "export",
        value_name = "FILE",
        conflicts_with = "export_elf",
        long_help = "Write sections and exported labels to FILE."
    )]
    pub export: Option<PathBuf>,

    #[arg(
        short = 'E',
        long = "export-elf",
        value_name = "FILE",
        long_help = "Like -e, but mark .text with AX and .data with WA section flags."
    )]
    pub export_elf: Option<PathBuf>,

    #[arg(
        short = 'i',
        long = "import",
        value_name = "FILE",
        long_help = "Pre-define labels before assembly from FILE; each line is \
                     `SECTION LABEL EXPR`."
    )]
    pub import: Option<PathBuf>,

    #[arg(
        long = "format",
        value_enum,
        default_value_t = OutputFormat::Text,
        long_help = "Select the export side-file format. text writes tab-separated \
                     records; json writes one machine-readable document."
    )]
    pub format: OutputFormat,

    #[arg(
        long = "strict-epic",
        action = ArgAction::SetTrue,
        long_help = "Compare EPIC slot-index lists as exact multisets instead of sets \
                     with duplicates collapsed."
    )]
    pub strict_epic: bool,
}

/// Validated CLI configuration.
#[derive(Debug)]
pub struct CliConfig {
    pub pattern: PathBuf,
    pub source: Option<PathBuf>,
    pub outfile: Option<PathBuf>,
    /// Export path plus whether ELF-like section flags are wanted.
    pub export: Option<(PathBuf, bool)>,
    pub import: Option<PathBuf>,
    pub format: OutputFormat,
    pub strict_epic: bool,
}

pub fn validate_cli(cli: &Cli) -> Result<CliConfig, AsmError> {
    if fs::metadata(&cli.pattern).is_err() {
        return Err(AsmError::new(
            AsmErrorKind::Cli,
            "Cannot open pattern file",
            Some(cli.pattern.to_string_lossy().as_ref()),
        ));
    }
    if let Some(source) = &cli.source {
        if fs::metadata(source).is_err() {
            return Err(AsmError::new(
                AsmErrorKind::Cli,
                "Cannot open source file",
                Some(source.to_string_lossy().as_ref()),
            ));
        }
    }
    let export = match (&cli.export, &cli.export_elf) {
        (_, Some(path)) => Some((path.clone(), true)),
        (Some(path), None) => Some((path.clone(), false)),
        (None, None) => None,
    };
    Ok(CliConfig {
        pattern: cli.pattern.clone(),
        source: cli.source.clone(),
        outfile: cli.outfile.clone(),
        export,
        import: cli.import.clone(),
        format: cli.format,
        strict_epic: cli.strict_epic,
    })
}
