// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! VLIW bundle packing.
//!
//! A source line whose statements are separated by `!!` forms a bundle;
//! `!!!!` sets the bundle's stop bit. The set of slot indices selects an
//! `EPIC` entry whose template expression supplies the dispatch bits.
//! Slot encodings are flattened to bytes, padded with the NOP encoding,
//! regrouped into `IBITS`-wide big-endian fields and concatenated most
//! significant slot first. Bundle widths of 128 bits and more are
//! routine, so the packing runs in arbitrary precision.

use std::collections::HashSet;
use std::io::{self, Write};

use num_bigint::BigInt;
use num_traits::{One, ToPrimitive, Zero};

use crate::core::config::VliwEntry;
use crate::core::error::AsmErrorKind;
use crate::core::text::skip_spaces;

use super::engine::{Assembler, Statement};

impl Assembler {
    /// Collect the remaining slots of a bundle and emit the packed word.
    /// `first` is the already-assembled statement before the first `!!`.
    pub(crate) fn process_bundle(
        &mut self,
        line: &str,
        first: Statement,
        out: &mut dyn Write,
    ) -> io::Result<bool> {
        let b = line.as_bytes();
        let mut slot_values = vec![first.values];
        let mut slot_indices = vec![first.slot_index];
        self.vliw_stop = 0;
        let mut idx = first.next;
        loop {
            idx = skip_spaces(b, idx);
            if idx + 4 <= b.len() && &b[idx..idx + 4] == b"!!!!" {
                idx += 4;
                self.vliw_stop = 1;
                continue;
            }
            if idx + 2 <= b.len() && &b[idx..idx + 2] == b"!!" {
                idx += 2;
                let st = self.statement(line, idx, out)?;
                idx = st.next;
                slot_values.push(st.values);
                slot_indices.push(st.slot_index);
                continue;
            }
            break;
        }

        let inst_bits = self.config.vliw_inst_bits;
        let vbits = self.config.vliw_bits.abs();
        let tbits = self.config.vliw_template_bits.abs();
        if inst_bits <= 0 || vbits <= 0 {
            if self.pass.emitting() {
                write!(out, " error - Some error(s) in vliw definition.")?;
                self.report(AsmErrorKind::Vliw, "Bad vliw definition", None);
            }
            return Ok(false);
        }

        // with no template field every bundle matches a single default entry
        let entries = if self.config.vliw_template_bits == 0 {
            vec![VliwEntry {
                indices: vec![0],
                template: "0".to_string(),
            }]
        } else {
            self.config.vliw_entries.clone()
        };

        let inst_mask = mask_bits(inst_bits);
        let template_mask = mask_bits(tbits);
        let bundle_mask = mask_bits(vbits);
        let nob = (vbits + 7) / 8;
        let ibyte = (inst_bits + 7) / 8;
        let noi = (vbits - tbits) / inst_bits;

        for entry in &entries {
            if self.config.vliw_template_bits != 0
                && !slot_sets_match(&entry.indices, &slot_indices, self.config.vliw_strict_sets)
            {
                continue;
            }

            let (template_value, _) = self.eval_pattern(entry.template.as_bytes(), 0);
            let template = BigInt::from(template_value) & &template_mask;

            let mut bytes: Vec<i64> = slot_values.iter().flatten().copied().collect();
            let need = ibyte * noi - bytes.len() as i64;
            for _ in 0..need.max(0) {
                for &nop in &self.config.vliw_nop {
                    bytes.push(i64::from(nop));
                }
            }

            let mut packed = BigInt::zero();
            let mut cursor = 0usize;
            for _ in 0..noi {
                let mut field = BigInt::zero();
                for _ in 0..ibyte {
                    field <<= 8usize;
                    if cursor < bytes.len() {
                        field |= BigInt::from(bytes[cursor] & 0xff);
                    }
                    cursor += 1;
                }
                field &= &inst_mask;
                packed = big_shl(packed, inst_bits) | field;
            }
            packed &= &bundle_mask;

            let word = if self.config.vliw_template_bits < 0 {
                packed | big_shl(template, vbits - tbits)
            } else {
                big_shl(packed, tbits) | template
            };

            let mut emitted = 0i64;
            if self.config.vliw_bits > 0 {
                // most-significant byte first regardless of endianness
                let mut shift = vbits - 8;
                for _ in 0..nob {
                    let byte = shifted_byte(&word, shift);
                    let addr = self.pc + emitted;
                    self.emit_word(addr, byte, out)?;
                    shift -= 8;
                    emitted += 1;
                }
            } else {
                let mut rest = word;
                for _ in 0..nob {
                    let byte = (&rest & BigInt::from(0xff)).to_i64().unwrap_or(0);
                    let addr = self.pc + emitted;
                    self.emit_word(addr, byte, out)?;
                    rest >>= 8usize;
                    emitted += 1;
                }
            }
            self.pc += emitted;
            return Ok(true);
        }

        if self.pass.emitting() {
            write!(out, " error - No vliw instruction-set defined.")?;
            self.report(AsmErrorKind::Vliw, "No vliw instruction-set defined", None);
        }
        Ok(false)
    }
}

/// Slot-index comparison for EPIC selection: by default duplicates
/// collapse (set semantics); strict mode compares exact multisets.
fn slot_sets_match(entry: &[i64], bundle: &[i64], strict: bool) -> bool {
    if entry.len() != bundle.len() {
        return false;
    }
    if strict {
        let mut a = entry.to_vec();
        let mut b = bundle.to_vec();
        a.sort_unstable();
        b.sort_unstable();
        a == b
    } else {
        let set: HashSet<i64> = entry.iter().copied().collect();
        bundle.iter().all(|value| set.contains(value))
    }
}

fn mask_bits(bits: i64) -> BigInt {
    (BigInt::one() << bits.max(0) as usize) - 1
}

fn big_shl(value: BigInt, bits: i64) -> BigInt {
    match usize::try_from(bits) {
        Ok(n) => value << n,
        Err(_) => value,
    }
}

/// Byte at bit offset `shift`; a negative offset selects bits below the
/// byte boundary (left shift), as happens when the bundle width is not a
/// multiple of eight.
fn shifted_byte(word: &BigInt, shift: i64) -> i64 {
    let shifted = if shift >= 0 {
        word.clone() >> shift as usize
    } else {
        word.clone() << (-shift) as usize
    };
    (shifted & BigInt::from(0xff)).to_i64().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_comparison_collapses_duplicates() {
        assert!(slot_sets_match(&[0, 1, 2], &[0, 1, 2], false));
        assert!(slot_sets_match(&[0, 1, 2], &[2, 1, 0], false));
        assert!(slot_sets_match(&[0, 1, 2], &[0, 0, 1], false));
        assert!(!slot_sets_match(&[0, 1], &[0, 1, 1], false));
        assert!(!slot_sets_match(&[0, 1, 2], &[0, 1, 3], false));
    }

    #[test]
    fn strict_comparison_is_multiset_equality() {
        assert!(slot_sets_match(&[0, 0, 1], &[0, 1, 0], true));
        assert!(!slot_sets_match(&[0, 1, 2], &[0, 0, 1], true));
    }

    #[test]
    fn mask_bits_covers_width() {
        assert_eq!(mask_bits(8), BigInt::from(0xff));
        assert_eq!(mask_bits(0), BigInt::zero());
        assert_eq!(mask_bits(41), (BigInt::one() << 41usize) - 1);
    }

    #[test]
    fn shifted_byte_handles_negative_offsets() {
        let word = BigInt::from(0xabcdu32);
        assert_eq!(shifted_byte(&word, 8), 0xab);
        assert_eq!(shifted_byte(&word, 0), 0xcd);
        // a 12-bit word emitted MSB-first: top byte at shift 4, then the
        // low nibble left-aligned at shift -4
        let word = BigInt::from(0xabcu32);
        assert_eq!(shifted_byte(&word, 4), 0xab);
        assert_eq!(shifted_byte(&word, -4), 0xc0);
    }
}
