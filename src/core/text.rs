// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Byte-level scanning primitives shared by the pattern loader, the
//! expression evaluator and the unifier.
//!
//! All scanners work on byte slices with an implicit NUL terminator:
//! [`char_at`] returns 0 past the end of the slice, so callers never need
//! explicit bounds checks while walking a line.

/// Byte at `idx`, or 0 when out of range.
pub fn char_at(s: &[u8], idx: usize) -> u8 {
    if idx < s.len() {
        s[idx]
    } else {
        0
    }
}

/// Advance past space characters. Only ' ' counts; tabs are folded to
/// spaces before any scanner sees the line.
pub fn skip_spaces(s: &[u8], mut idx: usize) -> usize {
    while idx < s.len() && s[idx] == b' ' {
        idx += 1;
    }
    idx
}

/// Case-insensitive lookahead for a literal at `idx`.
pub fn starts_with_nocase(s: &[u8], idx: usize, lit: &[u8]) -> bool {
    if idx + lit.len() > s.len() {
        return false;
    }
    s[idx..idx + lit.len()].eq_ignore_ascii_case(lit)
}

pub fn is_in(set: &str, c: u8) -> bool {
    set.as_bytes().contains(&c)
}

pub fn is_digit(c: u8) -> bool {
    c.is_ascii_digit()
}

/// Collapse runs of spaces to a single space.
pub fn reduce_spaces(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = false;
    for ch in text.chars() {
        if ch == ' ' {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(ch);
            last_space = false;
        }
    }
    out
}

/// Cut a pattern-file line at the first `/*`. The comment runs to
/// end-of-line; there is no closing delimiter.
pub fn strip_pattern_comment(line: &str) -> &str {
    match line.find("/*") {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Cut a source line at the first `;` and trim trailing whitespace.
pub fn strip_source_comment(line: &str) -> &str {
    let code = match line.find(';') {
        Some(pos) => &line[..pos],
        None => line,
    };
    code.trim_end_matches([' ', '\t', '\r', '\n'])
}

/// Read the next space-delimited token.
pub fn token_to_space(s: &[u8], idx: usize) -> (String, usize) {
    let mut idx = skip_spaces(s, idx);
    let start = idx;
    while idx < s.len() && s[idx] != b' ' {
        idx += 1;
    }
    (String::from_utf8_lossy(&s[start..idx]).into_owned(), idx)
}

/// Read up to (not including) the next `!!` slot separator or end of line.
pub fn token_to_slot_break(s: &[u8], idx: usize) -> (String, usize) {
    let mut idx = skip_spaces(s, idx);
    let start = idx;
    while idx < s.len() && !(idx + 2 <= s.len() && &s[idx..idx + 2] == b"!!") {
        idx += 1;
    }
    (String::from_utf8_lossy(&s[start..idx]).into_owned(), idx)
}

/// Extract the body of a double-quoted string. Returns an empty string
/// when the argument does not start with a quote or is unterminated.
pub fn quoted_string(s: &str) -> String {
    let b = s.as_bytes();
    let mut idx = skip_spaces(b, 0);
    if char_at(b, idx) != b'"' {
        return String::new();
    }
    idx += 1;
    let start = idx;
    while idx < b.len() {
        if b[idx] == b'"' {
            return String::from_utf8_lossy(&b[start..idx]).into_owned();
        }
        idx += 1;
    }
    String::new()
}

/// Read a label word: starts with `.` or a non-digit label character,
/// continues over label characters. A trailing `:` is consumed but not
/// included in the word.
pub fn label_word(s: &[u8], mut idx: usize, lwordchars: &str) -> (String, usize) {
    let mut t = Vec::new();
    if idx < s.len() && (s[idx] == b'.' || (!is_digit(s[idx]) && is_in(lwordchars, s[idx]))) {
        t.push(s[idx]);
        idx += 1;
        while idx < s.len() && is_in(lwordchars, s[idx]) {
            t.push(s[idx]);
            idx += 1;
        }
        if idx < s.len() && s[idx] == b':' {
            idx += 1;
        }
    }
    (String::from_utf8_lossy(&t).into_owned(), idx)
}

/// Read a symbol word: starts with a non-digit symbol character, continues
/// over symbol characters. The result is case-folded to upper case.
pub fn symbol_word(s: &[u8], mut idx: usize, swordchars: &str) -> (String, usize) {
    let mut t = Vec::new();
    if idx < s.len() && !is_digit(s[idx]) && is_in(swordchars, s[idx]) {
        t.push(s[idx]);
        idx += 1;
        while idx < s.len() && is_in(swordchars, s[idx]) {
            t.push(s[idx]);
            idx += 1;
        }
    }
    (
        String::from_utf8_lossy(&t).to_ascii_uppercase(),
        idx,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;

    #[test]
    fn char_at_is_nul_past_end() {
        assert_eq!(char_at(b"ab", 0), b'a');
        assert_eq!(char_at(b"ab", 2), 0);
        assert_eq!(char_at(b"", 5), 0);
    }

    #[test]
    fn skip_spaces_only_skips_spaces() {
        assert_eq!(skip_spaces(b"   x", 0), 3);
        assert_eq!(skip_spaces(b"x", 0), 0);
        assert_eq!(skip_spaces(b"  ", 0), 2);
    }

    #[test]
    fn reduce_spaces_collapses_runs() {
        assert_eq!(reduce_spaces("a   b  c"), "a b c");
        assert_eq!(reduce_spaces("  a"), " a");
        assert_eq!(reduce_spaces("ab"), "ab");
    }

    #[test]
    fn pattern_comment_runs_to_end_of_line() {
        assert_eq!(strip_pattern_comment("NOP :: :: 0x00 /* no-op */"), "NOP :: :: 0x00 ");
        assert_eq!(strip_pattern_comment("/* whole line */"), "");
        assert_eq!(strip_pattern_comment("no comment"), "no comment");
    }

    #[test]
    fn source_comment_strips_and_trims() {
        assert_eq!(strip_source_comment("add r1 ; comment"), "add r1");
        assert_eq!(strip_source_comment("add r1   "), "add r1");
        assert_eq!(strip_source_comment("; only"), "");
    }

    #[test]
    fn token_readers_split_head_and_rest() {
        let line = b"  .org 0x10,P !! next";
        let (head, idx) = token_to_space(line, 0);
        assert_eq!(head, ".org");
        let (rest, idx) = token_to_slot_break(line, idx);
        assert_eq!(rest, "0x10,P ");
        assert_eq!(&line[idx..idx + 2], b"!!");
    }

    #[test]
    fn quoted_string_requires_closing_quote() {
        assert_eq!(quoted_string("  \"hello\" tail"), "hello");
        assert_eq!(quoted_string("\"unterminated"), "");
        assert_eq!(quoted_string("bare"), "");
    }

    #[test]
    fn label_word_consumes_trailing_colon() {
        let config = Config::default();
        let (w, idx) = label_word(b"loop: add", 0, &config.lwordchars);
        assert_eq!(w, "loop");
        assert_eq!(idx, 5);
        // digits cannot start a label
        let (w, idx) = label_word(b"1abc", 0, &config.lwordchars);
        assert_eq!(w, "");
        assert_eq!(idx, 0);
        // but a leading dot can
        let (w, _) = label_word(b".local", 0, &config.lwordchars);
        assert_eq!(w, ".local");
    }

    #[test]
    fn symbol_word_is_case_folded() {
        let config = Config::default();
        let (w, idx) = symbol_word(b"r3,", 0, &config.swordchars);
        assert_eq!(w, "R3");
        assert_eq!(idx, 2);
        let (w, _) = symbol_word(b"3x", 0, &config.swordchars);
        assert_eq!(w, "");
    }
}
