// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// CLI entrypoint for patforge.

use clap::Parser;

use patforge::assembler::cli::Cli;

fn main() {
    let cli = Cli::parse();
    if let Err(err) = patforge::assembler::run_with_cli(&cli) {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
