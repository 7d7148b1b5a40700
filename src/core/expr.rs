// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Integer expression evaluation.
//!
//! A single-scan recursive-descent evaluator over 64-bit signed values.
//! Precedence, loosest first: ternary `?:`, `||`, `&&`, `not(e)`,
//! comparisons, sign-extend `'`, `^`, `|`, `&`, shifts, `+ -`, `* // %`,
//! `**`, unary `- ~ @ *`. Evaluation never fails; malformed input reads
//! as 0 and faults are latched in [`EvalFlags`] for the driver to report.
//!
//! The evaluator runs in one of two modes. In *pattern* mode (encoding,
//! error and slot-index columns of the pattern table) single lower-case
//! letters name the 26 scratch variables, `x := e` assigns one, and the
//! `!!!`/`!!!!` literals expose the bundle slot count and stop bit. In
//! *assembly* mode (source operands) lower-case letters are ordinary
//! label characters.

use crate::core::config::Config;
use crate::core::symtab::{LabelTable, ScratchVars, SymbolTable, UNDEF};
use crate::core::text::{
    char_at, is_digit, is_in, label_word, skip_spaces, starts_with_nocase, symbol_word,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprMode {
    Pattern,
    Assembly,
}

/// Sticky fault flags latched during evaluation.
#[derive(Debug, Default, Clone, Copy)]
pub struct EvalFlags {
    pub undefined_label: bool,
    pub division_by_zero: bool,
}

/// Everything an expression can reach: the location counter, the pattern
/// symbol table, the label table, the scratch variable bank and the VLIW
/// literals.
pub struct EvalContext<'a> {
    pub mode: ExprMode,
    pub pc: i64,
    pub vliw_stop: i64,
    pub slot_count: i64,
    pub config: &'a Config,
    pub symbols: &'a SymbolTable,
    pub labels: &'a LabelTable,
    pub vars: &'a mut ScratchVars,
    pub flags: &'a mut EvalFlags,
}

/// Evaluate an expression starting at `idx`. Returns the value and the
/// index of the first unconsumed byte.
pub fn eval(ctx: &mut EvalContext, s: &[u8], idx: usize) -> (i64, usize) {
    let idx = skip_spaces(s, idx);
    Parser { ctx, src: s }.conditional(idx)
}

/// Evaluate a single factor (one operand of the tightest grammar level).
pub fn eval_factor(ctx: &mut EvalContext, s: &[u8], idx: usize) -> (i64, usize) {
    Parser { ctx, src: s }.factor(idx)
}

/// Evaluate with every top-level (parenthesis depth 0) occurrence of
/// `stop` replaced by a NUL terminator first. This is how the unifier
/// delimits `!x` captures by the template character that follows them.
pub fn eval_esc(ctx: &mut EvalContext, s: &[u8], idx: usize, stop: u8) -> (i64, usize) {
    ctx.mode = ExprMode::Pattern;
    let mut replaced = Vec::with_capacity(s.len());
    let mut depth = 0usize;
    for &ch in s {
        match ch {
            b'(' => {
                depth += 1;
                replaced.push(ch);
            }
            b')' => {
                depth = depth.saturating_sub(1);
                replaced.push(ch);
            }
            _ if depth == 0 && ch == stop => replaced.push(0),
            _ => replaced.push(ch),
        }
    }
    eval(ctx, &replaced, idx)
}

struct Parser<'a, 'b> {
    ctx: &'a mut EvalContext<'b>,
    src: &'a [u8],
}

impl Parser<'_, '_> {
    fn expression(&mut self, idx: usize) -> (i64, usize) {
        let idx = skip_spaces(self.src, idx);
        self.conditional(idx)
    }

    fn conditional(&mut self, idx: usize) -> (i64, usize) {
        let (mut x, mut idx) = self.logical_or(idx);
        while char_at(self.src, idx) == b'?' {
            let (t, j) = self.logical_or(idx + 1);
            idx = j;
            if char_at(self.src, idx) == b':' {
                let (u, j) = self.logical_or(idx + 1);
                idx = j;
                x = if x == 0 { u } else { t };
            }
        }
        (x, idx)
    }

    fn logical_or(&mut self, idx: usize) -> (i64, usize) {
        let (mut x, mut idx) = self.logical_and(idx);
        while self.lit(idx, b"||") {
            let (t, j) = self.logical_and(idx + 2);
            idx = j;
            x = (x != 0 || t != 0) as i64;
        }
        (x, idx)
    }

    fn logical_and(&mut self, idx: usize) -> (i64, usize) {
        let (mut x, mut idx) = self.not_call(idx);
        while self.lit(idx, b"&&") {
            let (t, j) = self.not_call(idx + 2);
            idx = j;
            x = (x != 0 && t != 0) as i64;
        }
        (x, idx)
    }

    fn not_call(&mut self, idx: usize) -> (i64, usize) {
        if idx + 4 <= self.src.len() && &self.src[idx..idx + 4] == b"not(" {
            // idx+3 is the parenthesis, which the primary level consumes
            let (x, idx) = self.expression(idx + 3);
            return ((x == 0) as i64, idx);
        }
        self.comparison(idx)
    }

    fn comparison(&mut self, idx: usize) -> (i64, usize) {
        let (mut x, mut idx) = self.sign_extend(idx);
        loop {
            if self.lit(idx, b"<=") {
                let (t, j) = self.sign_extend(idx + 2);
                idx = j;
                x = (x <= t) as i64;
            } else if char_at(self.src, idx) == b'<' && char_at(self.src, idx + 1) != b'<' {
                let (t, j) = self.sign_extend(idx + 1);
                idx = j;
                x = (x < t) as i64;
            } else if self.lit(idx, b">=") {
                let (t, j) = self.sign_extend(idx + 2);
                idx = j;
                x = (x >= t) as i64;
            } else if char_at(self.src, idx) == b'>' && char_at(self.src, idx + 1) != b'>' {
                let (t, j) = self.sign_extend(idx + 1);
                idx = j;
                x = (x > t) as i64;
            } else if self.lit(idx, b"==") {
                let (t, j) = self.sign_extend(idx + 2);
                idx = j;
                x = (x == t) as i64;
            } else if self.lit(idx, b"!=") {
                let (t, j) = self.sign_extend(idx + 2);
                idx = j;
                x = (x != t) as i64;
            } else {
                break;
            }
        }
        (x, idx)
    }

    // x ' t replicates bit t-1 of x into bits t..63
    fn sign_extend(&mut self, idx: usize) -> (i64, usize) {
        let (mut x, mut idx) = self.bit_xor(idx);
        while char_at(self.src, idx) == b'\'' {
            let (t, j) = self.bit_xor(idx + 1);
            idx = j;
            if (1..64).contains(&t) {
                let high = (-1i64) << t;
                x = (x & !high) | high.wrapping_mul((x >> (t - 1)) & 1);
            }
        }
        (x, idx)
    }

    fn bit_xor(&mut self, idx: usize) -> (i64, usize) {
        let (mut x, mut idx) = self.bit_or(idx);
        while char_at(self.src, idx) == b'^' {
            let (t, j) = self.bit_or(idx + 1);
            idx = j;
            x ^= t;
        }
        (x, idx)
    }

    fn bit_or(&mut self, idx: usize) -> (i64, usize) {
        let (mut x, mut idx) = self.bit_and(idx);
        while char_at(self.src, idx) == b'|' && char_at(self.src, idx + 1) != b'|' {
            let (t, j) = self.bit_and(idx + 1);
            idx = j;
            x |= t;
        }
        (x, idx)
    }

    fn bit_and(&mut self, idx: usize) -> (i64, usize) {
        let (mut x, mut idx) = self.shift(idx);
        while char_at(self.src, idx) == b'&' && char_at(self.src, idx + 1) != b'&' {
            let (t, j) = self.shift(idx + 1);
            idx = j;
            x &= t;
        }
        (x, idx)
    }

    fn shift(&mut self, idx: usize) -> (i64, usize) {
        let (mut x, mut idx) = self.sum(idx);
        loop {
            if self.lit(idx, b"<<") {
                let (t, j) = self.sum(idx + 2);
                idx = j;
                x = if (0..64).contains(&t) {
                    x.wrapping_shl(t as u32)
                } else {
                    0
                };
            } else if self.lit(idx, b">>") {
                let (t, j) = self.sum(idx + 2);
                idx = j;
                x = if (0..64).contains(&t) {
                    x >> t
                } else if t >= 64 {
                    x >> 63
                } else {
                    0
                };
            } else {
                break;
            }
        }
        (x, idx)
    }

    fn sum(&mut self, idx: usize) -> (i64, usize) {
        let (mut x, mut idx) = self.product(idx);
        loop {
            if char_at(self.src, idx) == b'+' {
                let (t, j) = self.product(idx + 1);
                idx = j;
                x = x.wrapping_add(t);
            } else if char_at(self.src, idx) == b'-' {
                let (t, j) = self.product(idx + 1);
                idx = j;
                x = x.wrapping_sub(t);
            } else {
                break;
            }
        }
        (x, idx)
    }

    fn product(&mut self, idx: usize) -> (i64, usize) {
        let (mut x, mut idx) = self.power(idx);
        loop {
            if char_at(self.src, idx) == b'*' {
                let (t, j) = self.power(idx + 1);
                idx = j;
                x = x.wrapping_mul(t);
            } else if self.lit(idx, b"//") {
                let (t, j) = self.power(idx + 2);
                idx = j;
                if t == 0 {
                    self.ctx.flags.division_by_zero = true;
                } else {
                    x = x.wrapping_div(t);
                }
            } else if char_at(self.src, idx) == b'%' {
                let (t, j) = self.power(idx + 1);
                idx = j;
                if t == 0 {
                    self.ctx.flags.division_by_zero = true;
                } else {
                    x = x.wrapping_rem(t);
                }
            } else {
                break;
            }
        }
        (x, idx)
    }

    fn power(&mut self, idx: usize) -> (i64, usize) {
        let (mut x, mut idx) = self.factor(idx);
        while self.lit(idx, b"**") {
            let (t, j) = self.factor(idx + 2);
            idx = j;
            x = (x as f64).powf(t as f64) as i64;
        }
        (x, idx)
    }

    fn factor(&mut self, idx: usize) -> (i64, usize) {
        let s = self.src;
        let mut idx = skip_spaces(s, idx);
        let x;
        if idx + 4 <= s.len() && &s[idx..idx + 4] == b"'\\n'" {
            idx += 4;
            x = 0x0a;
        } else if idx + 4 <= s.len() && &s[idx..idx + 4] == b"'\\t'" {
            idx += 4;
            x = 0x09;
        } else if idx + 4 <= s.len() && &s[idx..idx + 4] == b"'\\''" {
            idx += 4;
            x = i64::from(b'\'');
        } else if idx + 3 <= s.len() && &s[idx..idx + 3] == b"'\\'" {
            idx += 3;
            x = i64::from(b'\\');
        } else if idx + 3 <= s.len() && s[idx] == b'\'' && s[idx + 2] == b'\'' {
            x = i64::from(s[idx + 1]);
            idx += 3;
        } else if idx + 4 <= s.len()
            && &s[idx..idx + 4] == b"!!!!"
            && self.ctx.mode == ExprMode::Pattern
        {
            x = self.ctx.vliw_stop;
            idx += 4;
        } else if idx + 3 <= s.len()
            && &s[idx..idx + 3] == b"!!!"
            && self.ctx.mode == ExprMode::Pattern
        {
            x = self.ctx.slot_count;
            idx += 3;
        } else if char_at(s, idx) == b'-' {
            let (t, j) = self.factor(idx + 1);
            idx = j;
            x = t.wrapping_neg();
        } else if char_at(s, idx) == b'~' {
            let (t, j) = self.factor(idx + 1);
            idx = j;
            x = !t;
        } else if char_at(s, idx) == b'@' {
            let (t, j) = self.factor(idx + 1);
            idx = j;
            x = bit_count(t);
        } else if char_at(s, idx) == b'*' {
            // *(e,n) extracts byte group n: e >> (8*n)
            idx += 1;
            if char_at(s, idx) == b'(' {
                let (mut v, j) = self.expression(idx + 1);
                idx = j;
                if char_at(s, idx) == b',' {
                    let (n, j) = self.expression(idx + 1);
                    idx = j;
                    if char_at(s, idx) == b')' {
                        idx += 1;
                        let sh = n.wrapping_mul(8);
                        v = if (0..64).contains(&sh) { v >> sh } else { 0 };
                    }
                    x = v;
                } else {
                    x = 0;
                }
            } else {
                x = 0;
            }
        } else {
            let (t, j) = self.primary(idx);
            idx = j;
            x = t;
        }
        (x, skip_spaces(s, idx))
    }

    fn primary(&mut self, idx: usize) -> (i64, usize) {
        let s = self.src;
        let mut idx = skip_spaces(s, idx);
        let mut x: i64 = 0;
        let c = char_at(s, idx);
        if c == b'(' {
            let (v, j) = self.expression(idx + 1);
            x = v;
            idx = j;
            if char_at(s, idx) == b')' {
                idx += 1;
            }
        } else if starts_with_nocase(s, idx, b"$$") {
            idx += 2;
            x = self.ctx.pc;
        } else if c == b'#' {
            idx += 1;
            let (name, j) = symbol_word(s, idx, &self.ctx.config.swordchars);
            idx = j;
            x = self.ctx.symbols.value_of(&name);
        } else if starts_with_nocase(s, idx, b"0b") {
            idx += 2;
            while idx < s.len() && (s[idx] == b'0' || s[idx] == b'1') {
                x = x.wrapping_mul(2).wrapping_add(i64::from(s[idx] - b'0'));
                idx += 1;
            }
        } else if starts_with_nocase(s, idx, b"0x") {
            idx += 2;
            while idx < s.len() && s[idx].is_ascii_hexdigit() {
                let d = (s[idx] as char).to_digit(16).unwrap_or(0);
                x = x.wrapping_mul(16).wrapping_add(i64::from(d));
                idx += 1;
            }
        } else if idx + 3 <= s.len() && &s[idx..idx + 3] == b"dbl" {
            let (found, body, j) = curly_body(s, idx + 3);
            idx = j;
            if found {
                x = double_bits(&body);
            }
        } else if idx + 3 <= s.len() && &s[idx..idx + 3] == b"flt" {
            let (found, body, j) = curly_body(s, idx + 3);
            idx = j;
            if found {
                x = float_bits(&body);
            }
        } else if is_digit(c) {
            let start = idx;
            while idx < s.len() && is_digit(s[idx]) {
                idx += 1;
            }
            let text = std::str::from_utf8(&s[start..idx]).unwrap_or("");
            x = text.parse::<i64>().unwrap_or(i64::MAX);
        } else if self.ctx.mode == ExprMode::Pattern
            && c.is_ascii_lowercase()
            && !(idx + 1 < s.len() && s[idx + 1].is_ascii_lowercase())
        {
            let name = (c as char).to_string();
            if idx + 3 <= s.len() && &s[idx + 1..idx + 3] == b":=" {
                let (v, j) = self.expression(idx + 3);
                idx = j;
                x = v;
                self.ctx.vars.set(&name, v);
            } else {
                x = self.ctx.vars.get(&name);
                idx += 1;
            }
        } else if c != 0 && (is_in(&self.ctx.config.lwordchars, c) || c == b'.') {
            let (word, j) = label_word(s, idx, &self.ctx.config.lwordchars);
            if j != idx {
                idx = j;
                x = match self.ctx.labels.get(&word) {
                    Some(entry) => entry.value,
                    None => {
                        self.ctx.flags.undefined_label = true;
                        UNDEF
                    }
                };
            }
        }
        (x, skip_spaces(s, idx))
    }

    fn lit(&self, idx: usize, lit: &[u8]) -> bool {
        idx + lit.len() <= self.src.len() && &self.src[idx..idx + lit.len()] == lit
    }
}

/// `@x`: number of significant bits, `ceil(log2(x+1))` for `x >= 0`.
fn bit_count(x: i64) -> i64 {
    if x < 0 {
        return 64;
    }
    64 - i64::from(x.leading_zeros())
}

/// Extract the body of a `{...}` group. Leading spaces inside the braces
/// are skipped; the body otherwise runs verbatim to the closing brace.
fn curly_body(s: &[u8], idx: usize) -> (bool, String, usize) {
    let mut idx = skip_spaces(s, idx);
    if char_at(s, idx) != b'{' {
        return (false, String::new(), idx);
    }
    idx += 1;
    idx = skip_spaces(s, idx);
    let start = idx;
    while char_at(s, idx) != b'}' && char_at(s, idx) != 0 {
        idx += 1;
    }
    let body = String::from_utf8_lossy(&s[start..idx]).into_owned();
    if char_at(s, idx) == b'}' {
        idx += 1;
    }
    (true, body, idx)
}

fn double_bits(body: &str) -> i64 {
    match body {
        "nan" => 0x7ff8000000000000,
        "inf" => 0x7ff0000000000000,
        "-inf" => 0xfff0000000000000u64 as i64,
        _ => float_expr(body).to_bits() as i64,
    }
}

fn float_bits(body: &str) -> i64 {
    match body {
        "nan" => 0x7fc00000,
        "inf" => 0x7f800000,
        "-inf" => 0xff800000,
        _ => i64::from((float_expr(body) as f32).to_bits()),
    }
}

/// Tiny floating-point expression grammar for `dbl{}`/`flt{}` bodies:
/// literals, parentheses, unary minus, `+ - * /`. Malformed input reads
/// as 0.0.
fn float_expr(body: &str) -> f64 {
    let s = body.as_bytes();
    let (v, _) = float_sum(s, 0);
    v
}

fn float_sum(s: &[u8], idx: usize) -> (f64, usize) {
    let (mut x, mut idx) = float_product(s, idx);
    loop {
        let at = skip_spaces(s, idx);
        match char_at(s, at) {
            b'+' => {
                let (t, j) = float_product(s, at + 1);
                idx = j;
                x += t;
            }
            b'-' => {
                let (t, j) = float_product(s, at + 1);
                idx = j;
                x -= t;
            }
            _ => break,
        }
    }
    (x, idx)
}

fn float_product(s: &[u8], idx: usize) -> (f64, usize) {
    let (mut x, mut idx) = float_atom(s, idx);
    loop {
        let at = skip_spaces(s, idx);
        match char_at(s, at) {
            b'*' => {
                let (t, j) = float_atom(s, at + 1);
                idx = j;
                x *= t;
            }
            b'/' => {
                let (t, j) = float_atom(s, at + 1);
                idx = j;
                x /= t;
            }
            _ => break,
        }
    }
    (x, idx)
}

fn float_atom(s: &[u8], idx: usize) -> (f64, usize) {
    let mut idx = skip_spaces(s, idx);
    match char_at(s, idx) {
        b'-' => {
            let (v, j) = float_atom(s, idx + 1);
            (-v, j)
        }
        b'(' => {
            let (v, mut j) = float_sum(s, idx + 1);
            j = skip_spaces(s, j);
            if char_at(s, j) == b')' {
                j += 1;
            }
            (v, j)
        }
        _ => {
            let start = idx;
            while idx < s.len() {
                let c = s[idx];
                if c.is_ascii_digit() || c == b'.' {
                    idx += 1;
                } else if (c == b'e' || c == b'E') && idx + 1 < s.len() {
                    let next = s[idx + 1];
                    if next.is_ascii_digit() || next == b'+' || next == b'-' {
                        idx += 2;
                    } else {
                        break;
                    }
                } else {
                    break;
                }
            }
            let text = std::str::from_utf8(&s[start..idx]).unwrap_or("");
            (text.parse::<f64>().unwrap_or(0.0), idx)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use proptest::prelude::*;

    struct Env {
        config: Config,
        symbols: SymbolTable,
        labels: LabelTable,
        vars: ScratchVars,
        flags: EvalFlags,
    }

    impl Env {
        fn new() -> Self {
            Self {
                config: Config::default(),
                symbols: SymbolTable::new(),
                labels: LabelTable::new(),
                vars: ScratchVars::new(),
                flags: EvalFlags::default(),
            }
        }

        fn eval_mode(&mut self, mode: ExprMode, src: &str) -> i64 {
            let mut ctx = EvalContext {
                mode,
                pc: 0x100,
                vliw_stop: 1,
                slot_count: 3,
                config: &self.config,
                symbols: &self.symbols,
                labels: &self.labels,
                vars: &mut self.vars,
                flags: &mut self.flags,
            };
            eval(&mut ctx, src.as_bytes(), 0).0
        }

        fn eval(&mut self, src: &str) -> i64 {
            self.eval_mode(ExprMode::Pattern, src)
        }
    }

    #[test]
    fn literals() {
        let mut env = Env::new();
        assert_eq!(env.eval("42"), 42);
        assert_eq!(env.eval("0x1f"), 0x1f);
        assert_eq!(env.eval("0b1010"), 10);
        assert_eq!(env.eval("'A'"), 65);
        assert_eq!(env.eval("'\\n'"), 0x0a);
        assert_eq!(env.eval("'\\t'"), 0x09);
        assert_eq!(env.eval("'\\''"), 0x27);
        assert_eq!(env.eval("'\\'"), 0x5c);
    }

    #[test]
    fn arithmetic_and_precedence() {
        let mut env = Env::new();
        assert_eq!(env.eval("1+2*3"), 7);
        assert_eq!(env.eval("(1+2)*3"), 9);
        assert_eq!(env.eval("2**10"), 1024);
        assert_eq!(env.eval("2**3*2"), 16);
        assert_eq!(env.eval("7//2"), 3);
        assert_eq!(env.eval("7%3"), 1);
        assert_eq!(env.eval("-5+2"), -3);
        assert_eq!(env.eval("~0"), -1);
    }

    #[test]
    fn shifts_bind_looser_than_sum() {
        let mut env = Env::new();
        assert_eq!(env.eval("1<<2+1"), 8);
        assert_eq!(env.eval("16>>1+1"), 4);
    }

    #[test]
    fn bitwise_chain_order() {
        let mut env = Env::new();
        // & binds tighter than |, | tighter than ^
        assert_eq!(env.eval("1|2&3"), 3);
        assert_eq!(env.eval("4^1|2"), 7);
    }

    #[test]
    fn comparisons_and_logic() {
        let mut env = Env::new();
        assert_eq!(env.eval("3<4"), 1);
        assert_eq!(env.eval("4<=4"), 1);
        assert_eq!(env.eval("3>4"), 0);
        assert_eq!(env.eval("3==3"), 1);
        assert_eq!(env.eval("3!=3"), 0);
        assert_eq!(env.eval("1&&0"), 0);
        assert_eq!(env.eval("1||0"), 1);
        assert_eq!(env.eval("not(0)"), 1);
        assert_eq!(env.eval("not(5)"), 0);
    }

    #[test]
    fn ternary_selects_on_condition() {
        let mut env = Env::new();
        assert_eq!(env.eval("1?2:3"), 2);
        assert_eq!(env.eval("0?2:3"), 3);
    }

    #[test]
    fn sign_extend_replicates_bit() {
        let mut env = Env::new();
        assert_eq!(env.eval("0x80'8"), -128);
        assert_eq!(env.eval("0x7f'8"), 0x7f);
        assert_eq!(env.eval("0xff'8"), -1);
        assert_eq!(env.eval("0x8000'16"), -32768);
    }

    #[test]
    fn bit_count_operator() {
        let mut env = Env::new();
        assert_eq!(env.eval("@0"), 0);
        assert_eq!(env.eval("@1"), 1);
        assert_eq!(env.eval("@255"), 8);
        assert_eq!(env.eval("@256"), 9);
    }

    #[test]
    fn byte_extract_operator() {
        let mut env = Env::new();
        assert_eq!(env.eval("*(0x1234,1)"), 0x12);
        assert_eq!(env.eval("*(0x1234,0)"), 0x1234);
    }

    #[test]
    fn pc_and_symbols() {
        let mut env = Env::new();
        env.symbols.set("IO", 0x40);
        assert_eq!(env.eval("$$"), 0x100);
        assert_eq!(env.eval("#IO"), 0x40);
        assert_eq!(env.eval("#io+1"), 0x41);
        assert_eq!(env.eval("#missing"), 0);
    }

    #[test]
    fn labels_and_undefined_flag() {
        let mut env = Env::new();
        env.labels.insert("start", 0x20, ".text");
        assert_eq!(env.eval_mode(ExprMode::Assembly, "start+2"), 0x22);
        assert!(!env.flags.undefined_label);
        assert_eq!(env.eval_mode(ExprMode::Assembly, "nowhere"), UNDEF);
        assert!(env.flags.undefined_label);
    }

    #[test]
    fn scratch_vars_only_in_pattern_mode() {
        let mut env = Env::new();
        env.vars.set("i", 7);
        assert_eq!(env.eval_mode(ExprMode::Pattern, "i+1"), 8);
        assert_eq!(env.eval_mode(ExprMode::Pattern, "j := 5"), 5);
        assert_eq!(env.vars.get("j"), 5);
        // in assembly mode a lone letter is a label reference
        env.labels.insert("i", 100, ".text");
        assert_eq!(env.eval_mode(ExprMode::Assembly, "i+1"), 101);
    }

    #[test]
    fn two_letter_word_is_a_label_even_in_pattern_mode() {
        let mut env = Env::new();
        env.labels.insert("ab", 9, ".text");
        assert_eq!(env.eval_mode(ExprMode::Pattern, "ab"), 9);
    }

    #[test]
    fn vliw_literals_in_pattern_mode() {
        let mut env = Env::new();
        assert_eq!(env.eval_mode(ExprMode::Pattern, "!!!!"), 1);
        assert_eq!(env.eval_mode(ExprMode::Pattern, "!!!"), 3);
    }

    #[test]
    fn division_by_zero_keeps_dividend() {
        let mut env = Env::new();
        assert_eq!(env.eval("9//0"), 9);
        assert!(env.flags.division_by_zero);
        env.flags.division_by_zero = false;
        assert_eq!(env.eval("9%0"), 9);
        assert!(env.flags.division_by_zero);
    }

    #[test]
    fn float_encodings() {
        let mut env = Env::new();
        assert_eq!(env.eval("dbl{1.5}"), 0x3ff8000000000000u64 as i64);
        assert_eq!(env.eval("dbl{-1.5}"), 0xbff8000000000000u64 as i64);
        assert_eq!(env.eval("dbl{nan}"), 0x7ff8000000000000);
        assert_eq!(env.eval("dbl{inf}"), 0x7ff0000000000000);
        assert_eq!(env.eval("dbl{-inf}"), 0xfff0000000000000u64 as i64);
        assert_eq!(env.eval("flt{1.5}"), 0x3fc00000);
        assert_eq!(env.eval("flt{-2.0}"), 0xc0000000);
        assert_eq!(env.eval("flt{inf}"), 0x7f800000);
        assert_eq!(env.eval("dbl{1.0+0.5}"), 0x3ff8000000000000u64 as i64);
    }

    #[test]
    fn eval_esc_stops_at_top_level_delimiter_only() {
        let mut env = Env::new();
        let mut ctx = EvalContext {
            mode: ExprMode::Pattern,
            pc: 0,
            vliw_stop: 0,
            slot_count: 0,
            config: &env.config,
            symbols: &env.symbols,
            labels: &env.labels,
            vars: &mut env.vars,
            flags: &mut env.flags,
        };
        let (v, idx) = eval_esc(&mut ctx, b"2+3,9", 0, b',');
        assert_eq!(v, 5);
        assert_eq!(idx, 3);
        // a comma inside parentheses is protected from replacement
        let (v, _) = eval_esc(&mut ctx, b"*(0x1234,1),9", 0, b',');
        assert_eq!(v, 0x12);
    }

    // Reference evaluator for canonical +/-/* chains, used to pin the
    // precedence table against an independent implementation.
    fn reference(first: i64, ops: &[(char, i64)]) -> i64 {
        let mut sums = vec![];
        let mut prod = first;
        let mut pending = '+';
        for &(op, v) in ops {
            match op {
                '*' => prod = prod.wrapping_mul(v),
                '+' | '-' => {
                    sums.push(if pending == '+' { prod } else { prod.wrapping_neg() });
                    pending = op;
                    prod = v;
                }
                _ => unreachable!(),
            }
        }
        sums.push(if pending == '+' { prod } else { prod.wrapping_neg() });
        sums.iter().fold(0i64, |a, b| a.wrapping_add(*b))
    }

    proptest! {
        #[test]
        fn precedence_matches_reference(
            first in 0i64..1000,
            ops in prop::collection::vec(
                (prop::sample::select(vec!['+', '-', '*']), 0i64..1000),
                0..8,
            ),
        ) {
            let mut src = first.to_string();
            for (op, v) in &ops {
                src.push(*op);
                src.push_str(&v.to_string());
            }
            let mut env = Env::new();
            prop_assert_eq!(env.eval(&src), reference(first, &ops));
        }

        #[test]
        fn radix_literals_round_trip(v in 0u32..u32::MAX) {
            let mut env = Env::new();
            prop_assert_eq!(env.eval(&format!("0x{v:x}")), i64::from(v));
            prop_assert_eq!(env.eval(&format!("0b{v:b}")), i64::from(v));
        }

        #[test]
        fn sign_extend_matches_arithmetic_shift(x in any::<i64>(), t in 1i64..63) {
            let mut env = Env::new();
            let masked = x & ((1i64 << t) - 1);
            let expected = (masked << (64 - t)) >> (64 - t);
            prop_assert_eq!(env.eval(&format!("({x})'{t}")), expected);
        }
    }
}
