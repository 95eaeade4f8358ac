//! Operand classification: register / constant / symbolic / address.
//!
//! An operand string is classified after constant substitution. Names are
//! matched on token boundaries (`$`, `_`, and alphanumerics are name
//! characters) so a removed local `i` cannot poison `edi`. Address operands
//! are folded first (literal terms summed) and then split into at most
//! three `base` / `index*scale` / `displacement` terms.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::format;
use alloc::string::{String, ToString};

use crate::error::TranslationError;
use crate::ir::{MemoryOperand, Operand, Register};
use crate::numeric::{fold_constant, fold_terms, parse_literal, signed_terms};

/// Size hint parsed off the front of an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SizeHint {
    None,
    Byte,
    Word,
}

/// Lookup state the operand parser reads: live constants, constants that
/// went out of scope with their procedure, and resolved externs.
pub(crate) struct OperandContext<'a> {
    /// Active textual constants (`equ`, procedure args, locals, `$…` slots).
    pub constants: &'a BTreeMap<String, String>,
    /// Constants removed at `endp`; referencing one is an error.
    pub removed: &'a BTreeSet<String>,
    /// Extern name → absolute address.
    pub externs: &'a BTreeMap<String, u32>,
}

#[inline]
fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Find `name` in `hay` starting at `from`, on token boundaries only.
fn find_token(hay: &str, name: &str, from: usize) -> Option<usize> {
    let bytes = hay.as_bytes();
    let mut start = from;
    while start <= hay.len() {
        let pos = hay[start..].find(name)?;
        let abs = start + pos;
        let end = abs + name.len();
        let before_ok = abs == 0 || !is_name_byte(bytes[abs - 1]);
        let after_ok = end >= hay.len() || !is_name_byte(bytes[end]);
        if before_ok && after_ok {
            return Some(abs);
        }
        start = abs + 1;
    }
    None
}

/// Replace every token-boundary occurrence of `name` with `replacement`.
fn replace_tokens(hay: &str, name: &str, replacement: &str) -> String {
    let mut out = String::with_capacity(hay.len());
    let mut start = 0;
    while let Some(pos) = find_token(hay, name, start) {
        out.push_str(&hay[start..pos]);
        out.push_str(replacement);
        start = pos + name.len();
    }
    out.push_str(&hay[start..]);
    out
}

/// Substitution passes are bounded so chained constants terminate even if a
/// definition is (indirectly) self-referential.
const MAX_SUBSTITUTION_PASSES: usize = 8;

fn strip_size_hint(text: &str) -> (SizeHint, &str) {
    for (word, hint) in [("byte", SizeHint::Byte), ("word", SizeHint::Word)] {
        if let Some(rest) = text.strip_prefix(word) {
            if rest.is_empty() || rest.starts_with(' ') || rest.starts_with('[') {
                return (hint, rest.trim_start());
            }
        }
    }
    (SizeHint::None, text)
}

/// Classify one textual operand.
pub(crate) fn parse_operand(
    text: &str,
    ctx: &OperandContext<'_>,
) -> Result<Operand, TranslationError> {
    let (hint, rest) = strip_size_hint(text.trim());
    let mut op: String = rest.chars().filter(|c| *c != ' ').collect();

    for name in ctx.removed {
        if find_token(&op, name, 0).is_some() {
            return Err(TranslationError::ShadowedConstant {
                name: name.clone(),
                reason: text.trim().to_string(),
            });
        }
    }

    for _ in 0..MAX_SUBSTITUTION_PASSES {
        let mut changed = false;
        for (name, replacement) in ctx.constants {
            if find_token(&op, name, 0).is_some() {
                op = replace_tokens(&op, name, replacement);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    if !op.contains('[') {
        if let Some(reg) = Register::parse(&op) {
            return Ok(if reg.size_bits() == 8 {
                Operand::Reg8(reg)
            } else {
                Operand::Reg(reg)
            });
        }
        if let Some(value) = fold_constant(&op) {
            return Ok(Operand::Const(value));
        }
        if let Some(&addr) = ctx.externs.get(op.as_str()) {
            return Ok(Operand::Const(addr as i32));
        }
        return Ok(Operand::Symbolic(op));
    }

    // Canonicalize to a single bracketed span and parse the inside.
    let inner: String = op.chars().filter(|c| *c != '[' && *c != ']').collect();
    let mem = parse_address(&inner, text.trim())?;
    Ok(match hint {
        SizeHint::Byte => Operand::Address8(mem),
        SizeHint::Word => Operand::Address(MemoryOperand { wide: true, ..mem }),
        SizeHint::None => Operand::Address(mem),
    })
}

fn bad_address(detail: impl Into<String>, reason: &str) -> TranslationError {
    TranslationError::BadAddress {
        detail: detail.into(),
        reason: reason.to_string(),
    }
}

/// Parse the inside of a bracketed address into base/index/scale/disp.
fn parse_address(inner: &str, reason: &str) -> Result<MemoryOperand, TranslationError> {
    if inner.is_empty() {
        return Err(bad_address("empty address", reason));
    }
    let folded = fold_terms(inner);
    let terms = signed_terms(&folded);
    if terms.is_empty() {
        return Err(bad_address("empty address", reason));
    }
    if terms.len() > 3 {
        return Err(bad_address("more than three terms", reason));
    }

    let mut mem = MemoryOperand {
        scale: 1,
        ..MemoryOperand::default()
    };
    let mut disp: i64 = 0;

    for (neg, term) in terms {
        if let Some(value) = parse_literal(term) {
            if neg {
                disp -= i64::from(value);
            } else {
                disp += i64::from(value);
            }
            continue;
        }
        if let Some((lhs, rhs)) = term.split_once('*') {
            if neg {
                return Err(bad_address("index term cannot be negated", reason));
            }
            if mem.index.is_some() {
                return Err(bad_address("more than one index term", reason));
            }
            let (reg, scale) = match (Register::parse(lhs), Register::parse(rhs)) {
                (Some(reg), None) => (reg, parse_literal(rhs)),
                (None, Some(reg)) => (reg, parse_literal(lhs)),
                _ => return Err(bad_address(format!("bad index term `{}`", term), reason)),
            };
            let scale =
                scale.ok_or_else(|| bad_address("scale must be a constant", reason))?;
            if !matches!(scale, 1 | 2 | 4 | 8) {
                return Err(bad_address(
                    format!("scale {} not in {{1, 2, 4, 8}}", scale),
                    reason,
                ));
            }
            mem.index = Some(reg);
            mem.scale = scale as u8;
            continue;
        }
        if let Some(reg) = Register::parse(term) {
            if neg {
                return Err(bad_address("register term cannot be negated", reason));
            }
            if mem.base.is_none() {
                mem.base = Some(reg);
            } else if mem.index.is_none() {
                mem.index = Some(reg);
                mem.scale = 1;
            } else {
                return Err(bad_address("more than two registers", reason));
            }
            continue;
        }
        return Err(bad_address(format!("unknown register `{}`", term), reason));
    }

    mem.disp = disp as i32;
    Ok(mem)
}
