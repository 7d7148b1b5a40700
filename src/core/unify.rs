// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! The pattern unifier: matches a source line against a syntax template,
//! binding operand sub-expressions to scratch variables.
//!
//! Template characters: `\c` matches the literal `c`; `A`–`Z` match
//! case-insensitively; `a`–`z` read a symbol word from the source which
//! must resolve in the pattern symbol table; `!!x` captures one factor
//! into scratch variable `x`; `!x` captures an expression delimited by
//! the next top-level occurrence of the following template character;
//! anything else must match exactly. Spaces are skipped freely on both
//! sides.
//!
//! [`match_optional`] additionally lifts `[[…]]` groups out of the
//! template and retries with every combination of groups removed,
//! smallest removal count first.

use crate::core::expr::{self, EvalContext, ExprMode};
use crate::core::text::{char_at, skip_spaces, symbol_word};

/// Internal placeholders for lifted `[[` / `]]` markers. Deliberately
/// outside the ASCII range so they can never collide with template text.
pub const OPEN_MARK: u8 = 0x90;
pub const CLOSE_MARK: u8 = 0x91;

/// Match `s` against template `t`, binding captures into the context's
/// scratch variables. Bracket marks left over from [`match_optional`]
/// are ignored.
pub fn match_line(ctx: &mut EvalContext, s: &[u8], t: &[u8]) -> bool {
    ctx.mode = ExprMode::Pattern;
    let t2: Vec<u8> = t
        .iter()
        .copied()
        .filter(|&c| c != OPEN_MARK && c != CLOSE_MARK)
        .collect();
    let mut idx_s = skip_spaces(s, 0);
    let mut idx_t = skip_spaces(&t2, 0);

    loop {
        idx_s = skip_spaces(s, idx_s);
        idx_t = skip_spaces(&t2, idx_t);
        let b = char_at(s, idx_s);
        let a = char_at(&t2, idx_t);

        if a == 0 && b == 0 {
            return true;
        }

        if a == b'\\' {
            idx_t += 1;
            if char_at(&t2, idx_t) == b {
                idx_t += 1;
                idx_s += 1;
                continue;
            }
            return false;
        } else if a.is_ascii_uppercase() {
            if a == b.to_ascii_uppercase() {
                idx_s += 1;
                idx_t += 1;
                continue;
            }
            return false;
        } else if a == b'!' {
            idx_t += 1;
            let mut a = char_at(&t2, idx_t);
            idx_t += 1;

            // !!x reads exactly one factor
            if a == b'!' {
                a = char_at(&t2, idx_t);
                idx_t += 1;
                let (v, j) = expr::eval_factor(ctx, s, idx_s);
                idx_s = j;
                ctx.vars.set(&(a as char).to_string(), v);
                continue;
            }

            // !x reads an expression up to the delimiter that follows in
            // the template: the next non-space character, or the literal
            // after a backslash escape
            idx_t = skip_spaces(&t2, idx_t);
            let stop = if char_at(&t2, idx_t) == b'\\' {
                idx_t = skip_spaces(&t2, idx_t + 1);
                char_at(&t2, idx_t)
            } else {
                char_at(&t2, idx_t)
            };

            let (v, j) = expr::eval_esc(ctx, s, idx_s, stop);
            idx_s = j;
            ctx.vars.set(&(a as char).to_string(), v);
            continue;
        } else if a.is_ascii_lowercase() {
            idx_t += 1;
            let (w, j) = symbol_word(s, idx_s, &ctx.config.swordchars);
            idx_s = j;
            match ctx.symbols.get(&w) {
                Some(v) => {
                    ctx.vars.set(&(a as char).to_string(), v);
                    continue;
                }
                None => return false,
            }
        } else if a == b {
            idx_t += 1;
            idx_s += 1;
            continue;
        }

        return false;
    }
}

/// Match with optional `[[…]]` groups: enumerate removal sets by
/// increasing size and return on the first template variant that
/// matches. Groups are numbered by nesting depth; same-depth siblings
/// are removed together.
pub fn match_optional(ctx: &mut EvalContext, s: &[u8], t: &[u8]) -> bool {
    let t2 = lift_brackets(t);
    let cnt = t2.iter().filter(|&&c| c == OPEN_MARK).count();
    for k in 0..=cnt {
        let mut cur = Vec::new();
        if combinations(ctx, s, &t2, cnt, k, 1, &mut cur) {
            return true;
        }
    }
    false
}

fn combinations(
    ctx: &mut EvalContext,
    s: &[u8],
    t2: &[u8],
    cnt: usize,
    k: usize,
    start: usize,
    cur: &mut Vec<i64>,
) -> bool {
    if k == 0 {
        let lt = remove_bracket_groups(t2, cur);
        return match_line(ctx, s, &lt);
    }
    for j in start..=cnt.saturating_sub(k - 1) {
        cur.push(j as i64);
        if combinations(ctx, s, t2, cnt, k - 1, j + 1, cur) {
            return true;
        }
        cur.pop();
    }
    false
}

fn lift_brackets(t: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(t.len());
    let mut idx = 0;
    while idx < t.len() {
        if idx + 2 <= t.len() && &t[idx..idx + 2] == b"[[" {
            out.push(OPEN_MARK);
            idx += 2;
        } else if idx + 2 <= t.len() && &t[idx..idx + 2] == b"]]" {
            out.push(CLOSE_MARK);
            idx += 2;
        } else {
            out.push(t[idx]);
            idx += 1;
        }
    }
    out
}

/// Delete every bracket group whose nesting depth appears in `remove`,
/// including the text between the markers.
fn remove_bracket_groups(t: &[u8], remove: &[i64]) -> Vec<u8> {
    let mut depth: i64 = 0;
    let mut groups = Vec::new();
    for (pos, &c) in t.iter().enumerate() {
        if c == OPEN_MARK {
            depth += 1;
            groups.push((depth, pos, true));
        } else if c == CLOSE_MARK {
            groups.push((depth, pos, false));
            depth -= 1;
        }
    }

    let mut delete = vec![false; t.len()];
    let mut start: Option<usize> = None;
    for (depth, pos, open) in groups {
        if open && remove.contains(&depth) {
            start = Some(pos);
        } else if !open && remove.contains(&depth) {
            if let Some(from) = start.take() {
                for slot in delete.iter_mut().take(pos + 1).skip(from) {
                    *slot = true;
                }
            }
        }
    }

    t.iter()
        .enumerate()
        .filter(|(pos, _)| !delete[*pos])
        .map(|(_, &c)| c)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::core::expr::EvalFlags;
    use crate::core::symtab::{LabelTable, ScratchVars, SymbolTable};

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

        fn try_match(&mut self, src: &str, template: &str) -> bool {
            let mut ctx = EvalContext {
                mode: ExprMode::Pattern,
                pc: 0,
                vliw_stop: 0,
                slot_count: 0,
                config: &self.config,
                symbols: &self.symbols,
                labels: &self.labels,
                vars: &mut self.vars,
                flags: &mut self.flags,
            };
            match_line(&mut ctx, src.as_bytes(), template.as_bytes())
        }

        fn try_match_optional(&mut self, src: &str, template: &str) -> bool {
            let mut ctx = EvalContext {
                mode: ExprMode::Pattern,
                pc: 0,
                vliw_stop: 0,
                slot_count: 0,
                config: &self.config,
                symbols: &self.symbols,
                labels: &self.labels,
                vars: &mut self.vars,
                flags: &mut self.flags,
            };
            match_optional(&mut ctx, src.as_bytes(), template.as_bytes())
        }
    }

    #[test]
    fn uppercase_letters_match_case_insensitively() {
        let mut env = Env::new();
        assert!(env.try_match("nop", "NOP"));
        assert!(env.try_match("NoP", "NOP"));
        assert!(!env.try_match("nopx", "NOP"));
        assert!(!env.try_match("no", "NOP"));
    }

    #[test]
    fn spaces_are_skipped_on_both_sides() {
        let mut env = Env::new();
        assert!(env.try_match("  mov   a , b  ", "MOV A,B"));
        assert!(env.try_match("mova,b", "MOV A , B"));
    }

    #[test]
    fn factor_capture_binds_scratch_variable() {
        let mut env = Env::new();
        assert!(env.try_match("add r3,r4,r5", "ADD R!!i,R!!j,R!!k"));
        assert_eq!(env.vars.get("i"), 3);
        assert_eq!(env.vars.get("j"), 4);
        assert_eq!(env.vars.get("k"), 5);
    }

    #[test]
    fn expression_capture_stops_at_template_delimiter() {
        let mut env = Env::new();
        assert!(env.try_match("ld 2+3,7", "LD !a,!b"));
        assert_eq!(env.vars.get("a"), 5);
        assert_eq!(env.vars.get("b"), 7);
    }

    #[test]
    fn expression_capture_protects_parenthesized_delimiters() {
        let mut env = Env::new();
        assert!(env.try_match("ld *(0x1234,1),7", "LD !a,!b"));
        assert_eq!(env.vars.get("a"), 0x12);
        assert_eq!(env.vars.get("b"), 7);
    }

    #[test]
    fn escaped_delimiter_names_the_stop_character() {
        let mut env = Env::new();
        assert!(env.try_match("jmp [8]", "JMP [!a\\]"));
        assert_eq!(env.vars.get("a"), 8);
        env.vars.reset();
        // without the escape the next template character doubles as the
        // delimiter and still has to match
        assert!(env.try_match("jmp [8]", "JMP [!a]"));
        assert_eq!(env.vars.get("a"), 8);
    }

    #[test]
    fn symbol_word_capture_requires_resolution() {
        let mut env = Env::new();
        env.symbols.set("B", 0);
        env.symbols.set("C", 1);
        assert!(env.try_match("mov b", "MOV r"));
        assert_eq!(env.vars.get("r"), 0);
        assert!(env.try_match("mov C", "MOV r"));
        assert_eq!(env.vars.get("r"), 1);
        assert!(!env.try_match("mov d", "MOV r"));
    }

    #[test]
    fn escape_matches_literal() {
        let mut env = Env::new();
        assert!(env.try_match("inc (hl)", "INC \\(HL\\)"));
        assert!(!env.try_match("inc hl", "INC \\(HL\\)"));
    }

    #[test]
    fn exact_bytes_for_punctuation() {
        let mut env = Env::new();
        assert!(env.try_match("out 7,1", "OUT !a,!b"));
        assert!(!env.try_match("out 7;1", "OUT !a,!b"));
    }

    #[test]
    fn optional_group_present_and_absent() {
        let mut env = Env::new();
        assert!(env.try_match_optional("ret", "RET[[ !c]]"));
        assert_eq!(env.vars.get("c"), 0);
        env.vars.reset();
        assert!(env.try_match_optional("ret 4", "RET[[ !c]]"));
        assert_eq!(env.vars.get("c"), 4);
    }

    #[test]
    fn nested_optional_groups() {
        let mut env = Env::new();
        let template = "MOV !a[[,!b[[,!c]]]]";
        assert!(env.try_match_optional("mov 1", template));
        env.vars.reset();
        assert!(env.try_match_optional("mov 1,2", template));
        assert_eq!(env.vars.get("a"), 1);
        assert_eq!(env.vars.get("b"), 2);
        env.vars.reset();
        assert!(env.try_match_optional("mov 1,2,3", template));
        assert_eq!(env.vars.get("c"), 3);
        env.vars.reset();
        assert!(!env.try_match_optional("mov 1,2,3,4", template));
    }

    #[test]
    fn smallest_removal_set_wins() {
        let mut env = Env::new();
        // with no removals the full template matches, so the capture binds
        assert!(env.try_match_optional("add 9", "ADD[[ !v]]"));
        assert_eq!(env.vars.get("v"), 9);
    }

    #[test]
    fn match_fails_when_no_group_subset_fits() {
        let mut env = Env::new();
        assert!(!env.try_match_optional("sub 1", "ADD[[ !v]]"));
    }

    #[test]
    fn remove_bracket_groups_deletes_depth_ranges() {
        let t = lift_brackets(b"A[[B]]C");
        assert_eq!(remove_bracket_groups(&t, &[1]), b"AC".to_vec());
        assert_eq!(
            remove_bracket_groups(&t, &[]),
            t.clone()
        );
        let nested = lift_brackets(b"A[[B[[C]]]]D");
        assert_eq!(remove_bracket_groups(&nested, &[1]), b"AD".to_vec());
        let out = remove_bracket_groups(&nested, &[2]);
        let expect: Vec<u8> = lift_brackets(b"A[[B]]D");
        assert_eq!(out, expect);
    }
}
