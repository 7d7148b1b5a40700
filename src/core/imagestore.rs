// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Output image store.
//!
//! Emission is an append-only log of `(address, byte)` entries; `.org`
//! can move the location counter backwards, so addresses arrive out of
//! order and may repeat. The flat binary is materialized once at the end
//! of the run: later writes win, gaps are zero-filled, and the file spans
//! address 0 through the highest byte ever written.

use std::io::{self, Write};

#[derive(Debug, Default)]
pub struct ImageStore {
    entries: Vec<(u64, u8)>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a single byte at the given address.
    pub fn store(&mut self, addr: u64, val: u8) {
        self.entries.push((addr, val));
    }

    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    /// All recorded `(address, byte)` pairs in emission order.
    pub fn entries(&self) -> &[(u64, u8)] {
        &self.entries
    }

    /// The (min, max) address range of emitted bytes, or `None` if empty.
    pub fn output_range(&self) -> Option<(u64, u64)> {
        let mut iter = self.entries.iter();
        let &(first, _) = iter.next()?;
        let mut min = first;
        let mut max = first;
        for &(addr, _) in iter {
            min = min.min(addr);
            max = max.max(addr);
        }
        Some((min, max))
    }

    /// Materialize the image: zero-filled from address 0 through the
    /// highest written byte, later writes winning.
    pub fn resolve(&self) -> io::Result<Vec<u8>> {
        let Some((_, max)) = self.output_range() else {
            return Ok(Vec::new());
        };
        let size = max
            .checked_add(1)
            .and_then(|size| usize::try_from(size).ok())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "Image range is too large for this host",
                )
            })?;
        let mut mem = vec![0u8; size];
        for &(addr, val) in &self.entries {
            mem[addr as usize] = val;
        }
        Ok(mem)
    }

    /// Write the flat binary image.
    pub fn write_bin_file<W: Write>(&self, mut out: W) -> io::Result<()> {
        out.write_all(&self.resolve()?)
    }
}
