//! Per-instruction byte emission: opcode selection, ModR/M + SIB +
//! displacement composition, immediate sizing, and prefix handling.
//!
//! The encoder is a pure function from one instruction record (plus the
//! label table and running offsets of everything already encoded) to its
//! bytecode and a list of pending fixups. Symbolic operands reserve
//! zero-filled placeholder bytes at the tail of the instruction; the linker
//! overwrites them once label offsets are known.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::error::TranslationError;
use crate::ir::{FixupKind, FixupWidth, Instr, Label, MemoryOperand, Operand, Register};

/// Everything already known when an instruction is encoded: the label
/// table (instruction indices only; offsets are still unset) and the byte
/// offsets of the instructions encoded so far. Backward `jmp` targets can
/// be proven short from this; forward targets never can.
pub(crate) struct EncodeContext<'a> {
    /// Label name → definition.
    pub labels: &'a BTreeMap<String, Label>,
    /// Byte offsets of instructions `0..index`.
    pub offsets: &'a [u32],
    /// Byte offset at which the current instruction starts.
    pub offset: u32,
    /// Index of the current instruction.
    pub index: usize,
}

/// A fixup pending against the instruction being encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingFixup {
    /// Byte position of the placeholder within the bytecode buffer.
    pub at: usize,
    /// Placeholder width.
    pub width: FixupWidth,
    /// Absolute offset or PC-relative displacement.
    pub kind: FixupKind,
    /// Referenced label name.
    pub label: String,
}

/// The encoder's output for one instruction.
#[derive(Debug, Default)]
pub(crate) struct Encoded {
    /// Operand-size / address-size prefixes to append after any REP prefix.
    pub prefixes: Vec<u8>,
    /// Opcode, ModR/M, SIB, displacement, and immediate bytes.
    pub bytes: Vec<u8>,
    /// Placeholders to patch once label offsets are known.
    pub fixups: Vec<PendingFixup>,
}

// ─── Error helpers ─────────────────────────────────────────

fn unknown(instr: &Instr) -> TranslationError {
    TranslationError::UnknownMnemonic {
        mnemonic: instr.mnemonic.clone(),
        reason: instr.source.clone(),
    }
}

fn bad_combo(detail: impl Into<String>, instr: &Instr) -> TranslationError {
    TranslationError::BadOperandCombination {
        detail: detail.into(),
        reason: instr.source.clone(),
    }
}

fn bad_address(detail: impl Into<String>, instr: &Instr) -> TranslationError {
    TranslationError::BadAddress {
        detail: detail.into(),
        reason: instr.source.clone(),
    }
}

fn imm8(value: i32, instr: &Instr) -> Result<u8, TranslationError> {
    if (-128..=255).contains(&value) {
        Ok(value as u8)
    } else {
        Err(TranslationError::BadImmediate {
            value: i64::from(value),
            bits: 8,
            reason: instr.source.clone(),
        })
    }
}

fn imm16(value: i32, instr: &Instr) -> Result<u16, TranslationError> {
    if (-32768..=65535).contains(&value) {
        Ok(value as u16)
    } else {
        Err(TranslationError::BadImmediate {
            value: i64::from(value),
            bits: 16,
            reason: instr.source.clone(),
        })
    }
}

fn fits_i8(value: i32) -> bool {
    (-128..=127).contains(&value)
}

// ─── ModR/M and SIB ────────────────────────────────────────

#[inline]
fn modrm(mod_: u8, reg: u8, rm: u8) -> u8 {
    (mod_ << 6) | ((reg & 7) << 3) | (rm & 7)
}

#[inline]
fn sib(scale: u8, index: u8, base: u8) -> u8 {
    let ss = match scale {
        2 => 1,
        4 => 2,
        8 => 3,
        _ => 0,
    };
    (ss << 6) | ((index & 7) << 3) | (base & 7)
}

/// Emit ModR/M + optional SIB + displacement for a memory operand.
///
/// Handles the IA-32 corner cases: pure displacement uses `mod=00 rm=101`;
/// `[ebp]` needs a zero disp8; `esp` can never be an index (swapped with the
/// base when the scale permits); `esp` as base forces a SIB byte; `ebp` as a
/// scale-1 index is swapped back into the base field.
fn emit_mem(
    bytes: &mut Vec<u8>,
    reg_field: u8,
    mem: &MemoryOperand,
    instr: &Instr,
) -> Result<(), TranslationError> {
    let mut base = mem.base;
    let mut index = mem.index;
    let disp = mem.disp;

    if index.is_some_and(|r| r.code() == 4) {
        if mem.scale != 1 {
            return Err(bad_address("esp cannot be scaled as an index", instr));
        }
        core::mem::swap(&mut base, &mut index);
    }
    if let (Some(b), Some(ix)) = (base, index) {
        if ix.code() == 5 && mem.scale == 1 && b.code() != 4 {
            base = Some(ix);
            index = Some(b);
        }
    }

    // Pure displacement: mod=00, rm=101, disp32.
    let Some(base_reg) = base else {
        if let Some(ix) = index {
            bytes.push(modrm(0b00, reg_field, 0b100));
            bytes.push(sib(mem.scale, ix.code(), 0b101));
        } else {
            bytes.push(modrm(0b00, reg_field, 0b101));
        }
        bytes.extend_from_slice(&disp.to_le_bytes());
        return Ok(());
    };

    let need_sib = index.is_some() || base_reg.code() == 4;
    let (mod_bits, disp_size) = if disp == 0 && base_reg.code() != 5 {
        (0b00, 0)
    } else if fits_i8(disp) {
        (0b01, 1)
    } else {
        (0b10, 4)
    };

    if need_sib {
        let index_code = index.map_or(0b100, Register::code);
        bytes.push(modrm(mod_bits, reg_field, 0b100));
        bytes.push(sib(mem.scale, index_code, base_reg.code()));
    } else {
        bytes.push(modrm(mod_bits, reg_field, base_reg.code()));
    }

    match disp_size {
        1 => bytes.push(disp as i8 as u8),
        4 => bytes.extend_from_slice(&disp.to_le_bytes()),
        _ => {}
    }
    Ok(())
}

// ─── Entry point ───────────────────────────────────────────

/// Encode one instruction against the running layout.
pub(crate) fn encode_instruction(
    instr: &Instr,
    ctx: &EncodeContext<'_>,
) -> Result<Encoded, TranslationError> {
    let mut out = Encoded::default();

    // Operand-size / address-size prefixes: the first 16-bit operand emits
    // 0x66; further bracketed 16-bit operands emit 0x67 instead.
    let mut have_66 = false;
    for op in &instr.operands {
        if op.is_wide16() {
            if !have_66 {
                out.prefixes.push(0x66);
                have_66 = true;
            } else if op.is_memory() {
                out.prefixes.push(0x67);
            }
        }
    }

    let prefix_len = instr.prefixes.len() + out.prefixes.len();
    match instr.operands.len() {
        0 => encode_zero(instr, &mut out)?,
        1 => encode_one(instr, &mut out, ctx, prefix_len)?,
        2 => encode_two(instr, &mut out)?,
        3 => encode_three(instr, &mut out)?,
        _ => return Err(unknown(instr)),
    }
    Ok(out)
}

// ─── Zero-operand forms ────────────────────────────────────

/// Fixed-encoding table, sorted by mnemonic for binary search.
const FIXED_TABLE: &[(&str, &[u8])] = &[
    ("cbw", &[0x66, 0x98]),
    ("cdq", &[0x99]),
    ("clc", &[0xF8]),
    ("cld", &[0xFC]),
    ("cli", &[0xFA]),
    ("cmc", &[0xF5]),
    ("cmpsb", &[0xA6]),
    ("cmpsd", &[0xA7]),
    ("cmpsw", &[0x66, 0xA7]),
    ("cwd", &[0x66, 0x99]),
    ("cwde", &[0x98]),
    ("int1", &[0xF1]),
    ("int3", &[0xCC]),
    ("lahf", &[0x9F]),
    ("lodsb", &[0xAC]),
    ("lodsd", &[0xAD]),
    ("lodsw", &[0x66, 0xAD]),
    ("movsb", &[0xA4]),
    ("movsd", &[0xA5]),
    ("movsw", &[0x66, 0xA5]),
    ("nop", &[0x90]),
    ("popa", &[0x61]),
    ("popf", &[0x9D]),
    ("pusha", &[0x60]),
    ("pushf", &[0x9C]),
    ("ret", &[0xC3]),
    ("retf", &[0xCB]),
    ("retn", &[0xC3]),
    ("sahf", &[0x9E]),
    ("salc", &[0xD6]),
    ("scasb", &[0xAE]),
    ("scasd", &[0xAF]),
    ("scasw", &[0x66, 0xAF]),
    ("stc", &[0xF9]),
    ("std", &[0xFD]),
    ("sti", &[0xFB]),
    ("stosb", &[0xAA]),
    ("stosd", &[0xAB]),
    ("stosw", &[0x66, 0xAB]),
    ("xlat", &[0xD7]),
];

fn encode_zero(instr: &Instr, out: &mut Encoded) -> Result<(), TranslationError> {
    match FIXED_TABLE.binary_search_by_key(&instr.mnemonic.as_str(), |&(name, _)| name) {
        Ok(i) => {
            out.bytes.extend_from_slice(FIXED_TABLE[i].1);
            Ok(())
        }
        Err(_) => Err(unknown(instr)),
    }
}

// ─── One-operand forms ─────────────────────────────────────

/// Condition-code byte for the two-byte `0x0F cc` jump form.
fn condition_code(mnemonic: &str) -> Option<u8> {
    Some(match mnemonic {
        "jo" => 0x80,
        "jno" => 0x81,
        "jb" | "jc" | "jnae" => 0x82,
        "jae" | "jnb" | "jnc" => 0x83,
        "je" | "jz" => 0x84,
        "jne" | "jnz" => 0x85,
        "jbe" | "jna" => 0x86,
        "ja" | "jnbe" => 0x87,
        "js" => 0x88,
        "jns" => 0x89,
        "jp" | "jpe" => 0x8A,
        "jnp" | "jpo" => 0x8B,
        "jl" | "jnge" => 0x8C,
        "jge" | "jnl" => 0x8D,
        "jle" | "jng" => 0x8E,
        "jg" | "jnle" => 0x8F,
        _ => return None,
    })
}

/// Reserve a dword placeholder and register an absolute fixup.
fn push_symbolic32(out: &mut Encoded, kind: FixupKind, label: &str) {
    let at = out.bytes.len();
    out.bytes.extend_from_slice(&[0, 0, 0, 0]);
    out.fixups.push(PendingFixup {
        at,
        width: FixupWidth::Dword,
        kind,
        label: label.to_string(),
    });
}

/// Reserve a byte placeholder and register a short relative fixup.
fn push_symbolic8(out: &mut Encoded, label: &str) {
    let at = out.bytes.len();
    out.bytes.push(0);
    out.fixups.push(PendingFixup {
        at,
        width: FixupWidth::Byte,
        kind: FixupKind::Relative,
        label: label.to_string(),
    });
}

fn encode_one(
    instr: &Instr,
    out: &mut Encoded,
    ctx: &EncodeContext<'_>,
    prefix_len: usize,
) -> Result<(), TranslationError> {
    let op = &instr.operands[0];
    match instr.mnemonic.as_str() {
        "push" => match op {
            Operand::Const(c) => {
                if fits_i8(*c) {
                    out.bytes.push(0x6A);
                    out.bytes.push(*c as u8);
                } else {
                    out.bytes.push(0x68);
                    out.bytes.extend_from_slice(&c.to_le_bytes());
                }
            }
            Operand::Reg(r) => out.bytes.push(0x50 + r.code()),
            Operand::Reg8(_) => {
                return Err(bad_combo("push does not accept 8-bit registers", instr))
            }
            Operand::Address(mem) | Operand::Address8(mem) => {
                out.bytes.push(0xFF);
                emit_mem(&mut out.bytes, 6, mem, instr)?;
            }
            Operand::Symbolic(label) => {
                out.bytes.push(0x68);
                push_symbolic32(out, FixupKind::Absolute, label);
            }
        },

        "pop" => match op {
            Operand::Reg(r) => out.bytes.push(0x58 + r.code()),
            Operand::Address(mem) | Operand::Address8(mem) => {
                out.bytes.push(0x8F);
                emit_mem(&mut out.bytes, 0, mem, instr)?;
            }
            _ => return Err(bad_combo("pop needs a register or memory operand", instr)),
        },

        "inc" | "dec" => {
            let digit = u8::from(instr.mnemonic == "dec");
            match op {
                Operand::Reg(r) => out.bytes.push(0x40 + digit * 8 + r.code()),
                Operand::Reg8(r) => {
                    out.bytes.push(0xFE);
                    out.bytes.push(modrm(0b11, digit, r.code()));
                }
                Operand::Address8(mem) => {
                    out.bytes.push(0xFE);
                    emit_mem(&mut out.bytes, digit, mem, instr)?;
                }
                Operand::Address(mem) => {
                    out.bytes.push(0xFF);
                    emit_mem(&mut out.bytes, digit, mem, instr)?;
                }
                _ => {
                    return Err(bad_combo(
                        "inc/dec need a register or memory operand",
                        instr,
                    ))
                }
            }
        }

        "not" | "neg" | "mul" | "imul" | "div" | "idiv" => {
            let digit = match instr.mnemonic.as_str() {
                "not" => 2,
                "neg" => 3,
                "mul" => 4,
                "imul" => 5,
                "div" => 6,
                _ => 7,
            };
            match op {
                Operand::Reg8(r) => {
                    out.bytes.push(0xF6);
                    out.bytes.push(modrm(0b11, digit, r.code()));
                }
                Operand::Reg(r) => {
                    out.bytes.push(0xF7);
                    out.bytes.push(modrm(0b11, digit, r.code()));
                }
                Operand::Address8(mem) => {
                    out.bytes.push(0xF6);
                    emit_mem(&mut out.bytes, digit, mem, instr)?;
                }
                Operand::Address(mem) => {
                    out.bytes.push(0xF7);
                    emit_mem(&mut out.bytes, digit, mem, instr)?;
                }
                _ => {
                    return Err(bad_combo(
                        "unary arithmetic needs a register or memory operand",
                        instr,
                    ))
                }
            }
        }

        "call" => match op {
            Operand::Const(c) => {
                out.bytes.push(0xE8);
                out.bytes.extend_from_slice(&c.to_le_bytes());
            }
            Operand::Symbolic(label) => {
                out.bytes.push(0xE8);
                push_symbolic32(out, FixupKind::Relative, label);
            }
            Operand::Reg(r) => {
                out.bytes.push(0xFF);
                out.bytes.push(modrm(0b11, 2, r.code()));
            }
            Operand::Address(mem) | Operand::Address8(mem) => {
                out.bytes.push(0xFF);
                emit_mem(&mut out.bytes, 2, mem, instr)?;
            }
            Operand::Reg8(_) => {
                return Err(bad_combo("call does not accept 8-bit registers", instr))
            }
        },

        "jmp" => match op {
            Operand::Const(c) => {
                if fits_i8(*c) {
                    out.bytes.push(0xEB);
                    out.bytes.push(*c as u8);
                } else {
                    out.bytes.push(0xE9);
                    out.bytes.extend_from_slice(&c.to_le_bytes());
                }
            }
            Operand::Symbolic(label) => {
                // A backward target whose displacement is already known to
                // fit in a signed byte gets the two-byte short form.
                let short = ctx.labels.get(label).is_some_and(|def| {
                    if def.instruction_index > ctx.index {
                        return false;
                    }
                    let target = if def.instruction_index == ctx.index {
                        i64::from(ctx.offset)
                    } else {
                        i64::from(ctx.offsets[def.instruction_index])
                    };
                    let disp = target - (i64::from(ctx.offset) + prefix_len as i64 + 2);
                    (-128..=127).contains(&disp)
                });
                if short {
                    out.bytes.push(0xEB);
                    push_symbolic8(out, label);
                } else {
                    out.bytes.push(0xE9);
                    push_symbolic32(out, FixupKind::Relative, label);
                }
            }
            Operand::Reg(r) => {
                out.bytes.push(0xFF);
                out.bytes.push(modrm(0b11, 4, r.code()));
            }
            Operand::Address(mem) | Operand::Address8(mem) => {
                out.bytes.push(0xFF);
                emit_mem(&mut out.bytes, 4, mem, instr)?;
            }
            Operand::Reg8(_) => {
                return Err(bad_combo("jmp does not accept 8-bit registers", instr))
            }
        },

        "jcxz" | "jecxz" | "loop" | "loopz" | "loope" | "loopnz" | "loopne" => {
            let opcode = match instr.mnemonic.as_str() {
                "jcxz" | "jecxz" => 0xE3,
                "loop" => 0xE2,
                "loopz" | "loope" => 0xE1,
                _ => 0xE0,
            };
            out.bytes.push(opcode);
            match op {
                Operand::Const(c) => {
                    let b = imm8(*c, instr)?;
                    out.bytes.push(b);
                }
                Operand::Symbolic(label) => push_symbolic8(out, label),
                _ => return Err(bad_combo("short branch needs an immediate target", instr)),
            }
        }

        "storeb" | "storew" | "stored" => match op {
            Operand::Const(c) => match instr.mnemonic.as_str() {
                "storeb" => out.bytes.push(imm8(*c, instr)?),
                "storew" => out
                    .bytes
                    .extend_from_slice(&imm16(*c, instr)?.to_le_bytes()),
                _ => out.bytes.extend_from_slice(&c.to_le_bytes()),
            },
            _ => return Err(bad_combo("data stores take a literal value", instr)),
        },

        "ret" | "retn" | "retf" => match op {
            Operand::Const(c) => {
                out.bytes
                    .push(if instr.mnemonic == "retf" { 0xCA } else { 0xC2 });
                out.bytes.extend_from_slice(&c.to_le_bytes());
            }
            _ => return Err(bad_combo("ret takes a literal stack adjustment", instr)),
        },

        "int" | "in" | "out" => match op {
            Operand::Const(c) => {
                let opcode = match instr.mnemonic.as_str() {
                    "int" => 0xCD,
                    "in" => 0xE5,
                    _ => 0xE7,
                };
                out.bytes.push(opcode);
                out.bytes.push(imm8(*c, instr)?);
            }
            _ => return Err(bad_combo("expected an 8-bit immediate", instr)),
        },

        mnemonic => {
            if let Some(cc) = condition_code(mnemonic) {
                out.bytes.push(0x0F);
                out.bytes.push(cc);
                match op {
                    Operand::Const(c) => out.bytes.extend_from_slice(&c.to_le_bytes()),
                    Operand::Symbolic(label) => {
                        push_symbolic32(out, FixupKind::Relative, label);
                    }
                    _ => {
                        return Err(bad_combo(
                            "conditional jump needs an immediate target",
                            instr,
                        ))
                    }
                }
            } else {
                return Err(unknown(instr));
            }
        }
    }
    Ok(())
}

// ─── Two-operand forms ─────────────────────────────────────

/// `add`/`or`/`adc`/`sbb`/`and`/`sub`/`xor`/`cmp` group index, which is
/// both the opcode-row selector and the immediate-form /digit.
fn alu_group(mnemonic: &str) -> Option<u8> {
    Some(match mnemonic {
        "add" => 0,
        "or" => 1,
        "adc" => 2,
        "sbb" => 3,
        "and" => 4,
        "sub" => 5,
        "xor" => 6,
        "cmp" => 7,
        _ => return None,
    })
}

/// Shift/rotate /digit.
fn shift_digit(mnemonic: &str) -> Option<u8> {
    Some(match mnemonic {
        "rol" => 0,
        "ror" => 1,
        "rcl" => 2,
        "rcr" => 3,
        "shl" | "sal" => 4,
        "shr" => 5,
        "sar" => 7,
        _ => return None,
    })
}

fn encode_two(instr: &Instr, out: &mut Encoded) -> Result<(), TranslationError> {
    let (dst, src) = (&instr.operands[0], &instr.operands[1]);

    if let Some(group) = alu_group(&instr.mnemonic) {
        return encode_alu(group, dst, src, instr, out);
    }
    if let Some(digit) = shift_digit(&instr.mnemonic) {
        return encode_shift(digit, dst, src, instr, out);
    }

    match instr.mnemonic.as_str() {
        "test" => match (dst, src) {
            (Operand::Reg8(d), Operand::Reg8(s)) => {
                out.bytes.push(0x84);
                out.bytes.push(modrm(0b11, s.code(), d.code()));
            }
            (Operand::Reg(d), Operand::Reg(s)) => {
                check_reg_sizes(*d, *s, instr)?;
                out.bytes.push(0x85);
                out.bytes.push(modrm(0b11, s.code(), d.code()));
            }
            (Operand::Address8(mem), Operand::Reg8(r))
            | (Operand::Reg8(r), Operand::Address8(mem)) => {
                out.bytes.push(0x84);
                emit_mem(&mut out.bytes, r.code(), mem, instr)?;
            }
            (Operand::Address(mem), Operand::Reg(r))
            | (Operand::Reg(r), Operand::Address(mem)) => {
                out.bytes.push(0x85);
                emit_mem(&mut out.bytes, r.code(), mem, instr)?;
            }
            (Operand::Reg8(r), Operand::Const(c)) => {
                out.bytes.push(0xF6);
                out.bytes.push(modrm(0b11, 0, r.code()));
                out.bytes.push(imm8(*c, instr)?);
            }
            (Operand::Reg(r), Operand::Const(c)) => {
                out.bytes.push(0xF7);
                out.bytes.push(modrm(0b11, 0, r.code()));
                out.bytes.extend_from_slice(&c.to_le_bytes());
            }
            (Operand::Address8(mem), Operand::Const(c)) => {
                out.bytes.push(0xF6);
                emit_mem(&mut out.bytes, 0, mem, instr)?;
                out.bytes.push(imm8(*c, instr)?);
            }
            (Operand::Address(mem), Operand::Const(c)) => {
                out.bytes.push(0xF7);
                emit_mem(&mut out.bytes, 0, mem, instr)?;
                out.bytes.extend_from_slice(&c.to_le_bytes());
            }
            _ => return Err(bad_combo("unsupported operands for test", instr)),
        },

        "xchg" => match (dst, src) {
            (Operand::Reg8(d), Operand::Reg8(s)) => {
                out.bytes.push(0x86);
                out.bytes.push(modrm(0b11, s.code(), d.code()));
            }
            (Operand::Reg(d), Operand::Reg(s)) => {
                check_reg_sizes(*d, *s, instr)?;
                out.bytes.push(0x87);
                out.bytes.push(modrm(0b11, s.code(), d.code()));
            }
            (Operand::Address8(mem), Operand::Reg8(r))
            | (Operand::Reg8(r), Operand::Address8(mem)) => {
                out.bytes.push(0x86);
                emit_mem(&mut out.bytes, r.code(), mem, instr)?;
            }
            (Operand::Address(mem), Operand::Reg(r))
            | (Operand::Reg(r), Operand::Address(mem)) => {
                out.bytes.push(0x87);
                emit_mem(&mut out.bytes, r.code(), mem, instr)?;
            }
            _ => return Err(bad_combo("unsupported operands for xchg", instr)),
        },

        "mov" => encode_mov(dst, src, instr, out)?,

        "lea" => match (dst, src) {
            (Operand::Reg(d), Operand::Address(mem) | Operand::Address8(mem)) => {
                out.bytes.push(0x8D);
                emit_mem(&mut out.bytes, d.code(), mem, instr)?;
            }
            _ => {
                return Err(bad_combo(
                    "lea needs a 16/32-bit register destination and a memory source",
                    instr,
                ))
            }
        },

        "imul" => match (dst, src) {
            (Operand::Reg(d), Operand::Reg(s)) => {
                check_reg_sizes(*d, *s, instr)?;
                out.bytes.extend_from_slice(&[0x0F, 0xAF]);
                out.bytes.push(modrm(0b11, d.code(), s.code()));
            }
            (Operand::Reg(d), Operand::Address(mem)) => {
                out.bytes.extend_from_slice(&[0x0F, 0xAF]);
                emit_mem(&mut out.bytes, d.code(), mem, instr)?;
            }
            _ => {
                return Err(bad_combo(
                    "imul needs a 16/32-bit register destination",
                    instr,
                ))
            }
        },

        "movzx" => match (dst, src) {
            (Operand::Reg(d), Operand::Reg8(s)) => {
                out.bytes.extend_from_slice(&[0x0F, 0xB6]);
                out.bytes.push(modrm(0b11, d.code(), s.code()));
            }
            (Operand::Reg(d), Operand::Address8(mem)) => {
                out.bytes.extend_from_slice(&[0x0F, 0xB6]);
                emit_mem(&mut out.bytes, d.code(), mem, instr)?;
            }
            (Operand::Reg(d), Operand::Reg(s)) if s.size_bits() == 16 => {
                out.bytes.extend_from_slice(&[0x0F, 0xB7]);
                out.bytes.push(modrm(0b11, d.code(), s.code()));
            }
            (Operand::Reg(d), Operand::Address(mem)) if mem.wide => {
                out.bytes.extend_from_slice(&[0x0F, 0xB7]);
                emit_mem(&mut out.bytes, d.code(), mem, instr)?;
            }
            _ => {
                return Err(bad_combo(
                    "movzx needs an 8- or 16-bit source and a wider register destination",
                    instr,
                ))
            }
        },

        _ => return Err(unknown(instr)),
    }
    Ok(())
}

fn check_reg_sizes(dst: Register, src: Register, instr: &Instr) -> Result<(), TranslationError> {
    if dst.size_bits() == src.size_bits() {
        Ok(())
    } else {
        Err(bad_combo("operand size mismatch", instr))
    }
}

fn encode_alu(
    group: u8,
    dst: &Operand,
    src: &Operand,
    instr: &Instr,
    out: &mut Encoded,
) -> Result<(), TranslationError> {
    let base = group * 8;
    match (dst, src) {
        (Operand::Reg8(d), Operand::Reg8(s)) => {
            out.bytes.push(base);
            out.bytes.push(modrm(0b11, s.code(), d.code()));
        }
        (Operand::Reg(d), Operand::Reg(s)) => {
            check_reg_sizes(*d, *s, instr)?;
            out.bytes.push(base + 1);
            out.bytes.push(modrm(0b11, s.code(), d.code()));
        }
        (Operand::Reg8(d), Operand::Address8(mem) | Operand::Address(mem)) => {
            out.bytes.push(base + 2);
            emit_mem(&mut out.bytes, d.code(), mem, instr)?;
        }
        (Operand::Reg(d), Operand::Address(mem)) => {
            out.bytes.push(base + 3);
            emit_mem(&mut out.bytes, d.code(), mem, instr)?;
        }
        (Operand::Address8(mem), Operand::Reg8(s)) => {
            out.bytes.push(base);
            emit_mem(&mut out.bytes, s.code(), mem, instr)?;
        }
        (Operand::Address(mem), Operand::Reg(s)) => {
            out.bytes.push(base + 1);
            emit_mem(&mut out.bytes, s.code(), mem, instr)?;
        }
        (Operand::Reg8(d), Operand::Const(c)) => {
            out.bytes.push(0x80);
            out.bytes.push(modrm(0b11, group, d.code()));
            out.bytes.push(imm8(*c, instr)?);
        }
        (Operand::Address8(mem), Operand::Const(c)) => {
            out.bytes.push(0x80);
            emit_mem(&mut out.bytes, group, mem, instr)?;
            out.bytes.push(imm8(*c, instr)?);
        }
        (Operand::Reg(d), Operand::Const(c)) => {
            if fits_i8(*c) {
                out.bytes.push(0x83);
                out.bytes.push(modrm(0b11, group, d.code()));
                out.bytes.push(*c as u8);
            } else {
                out.bytes.push(0x81);
                out.bytes.push(modrm(0b11, group, d.code()));
                out.bytes.extend_from_slice(&c.to_le_bytes());
            }
        }
        (Operand::Address(mem), Operand::Const(c)) => {
            if fits_i8(*c) {
                out.bytes.push(0x83);
                emit_mem(&mut out.bytes, group, mem, instr)?;
                out.bytes.push(*c as u8);
            } else {
                out.bytes.push(0x81);
                emit_mem(&mut out.bytes, group, mem, instr)?;
                out.bytes.extend_from_slice(&c.to_le_bytes());
            }
        }
        (Operand::Reg(d), Operand::Symbolic(label)) if matches!(group, 0 | 5) => {
            out.bytes.push(0x81);
            out.bytes.push(modrm(0b11, group, d.code()));
            push_symbolic32(out, FixupKind::Absolute, label);
        }
        (Operand::Address(_) | Operand::Address8(_), Operand::Address(_) | Operand::Address8(_)) => {
            return Err(bad_combo("memory-to-memory is not encodable", instr))
        }
        (Operand::Const(_) | Operand::Symbolic(_), _) => {
            return Err(bad_combo("destination cannot be a constant", instr))
        }
        _ => return Err(bad_combo("unsupported operand combination", instr)),
    }
    Ok(())
}

fn encode_shift(
    digit: u8,
    dst: &Operand,
    src: &Operand,
    instr: &Instr,
    out: &mut Encoded,
) -> Result<(), TranslationError> {
    let (opcode_imm, opcode_cl, code) = match dst {
        Operand::Reg8(r) => (0xC0, 0xD2, r.code()),
        Operand::Reg(r) => (0xC1, 0xD3, r.code()),
        _ => {
            return Err(bad_combo(
                "shift destination must be a register",
                instr,
            ))
        }
    };
    match src {
        Operand::Reg8(Register::Cl) => {
            out.bytes.push(opcode_cl);
            out.bytes.push(modrm(0b11, digit, code));
        }
        Operand::Const(c) => {
            out.bytes.push(opcode_imm);
            out.bytes.push(modrm(0b11, digit, code));
            out.bytes.push(imm8(*c, instr)?);
        }
        _ => {
            return Err(bad_combo(
                "shift count must be an immediate or cl",
                instr,
            ))
        }
    }
    Ok(())
}

fn encode_mov(
    dst: &Operand,
    src: &Operand,
    instr: &Instr,
    out: &mut Encoded,
) -> Result<(), TranslationError> {
    match (dst, src) {
        (Operand::Reg8(d), Operand::Reg8(s)) => {
            out.bytes.push(0x88);
            out.bytes.push(modrm(0b11, s.code(), d.code()));
        }
        (Operand::Reg(d), Operand::Reg(s)) => {
            check_reg_sizes(*d, *s, instr)?;
            out.bytes.push(0x89);
            out.bytes.push(modrm(0b11, s.code(), d.code()));
        }
        (Operand::Reg8(d), Operand::Address8(mem) | Operand::Address(mem)) => {
            out.bytes.push(0x8A);
            emit_mem(&mut out.bytes, d.code(), mem, instr)?;
        }
        (Operand::Reg(d), Operand::Address(mem)) => {
            out.bytes.push(0x8B);
            emit_mem(&mut out.bytes, d.code(), mem, instr)?;
        }
        (Operand::Address8(mem), Operand::Reg8(s)) => {
            out.bytes.push(0x88);
            emit_mem(&mut out.bytes, s.code(), mem, instr)?;
        }
        (Operand::Address(mem), Operand::Reg(s)) => {
            out.bytes.push(0x89);
            emit_mem(&mut out.bytes, s.code(), mem, instr)?;
        }
        (Operand::Reg8(d), Operand::Const(c)) => {
            out.bytes.push(0xC6);
            out.bytes.push(modrm(0b11, 0, d.code()));
            out.bytes.push(imm8(*c, instr)?);
        }
        (Operand::Reg(d), Operand::Const(c)) => {
            out.bytes.push(0xC7);
            out.bytes.push(modrm(0b11, 0, d.code()));
            out.bytes.extend_from_slice(&c.to_le_bytes());
        }
        (Operand::Address8(mem), Operand::Const(c)) => {
            out.bytes.push(0xC6);
            emit_mem(&mut out.bytes, 0, mem, instr)?;
            out.bytes.push(imm8(*c, instr)?);
        }
        (Operand::Address(mem), Operand::Const(c)) => {
            out.bytes.push(0xC7);
            emit_mem(&mut out.bytes, 0, mem, instr)?;
            out.bytes.extend_from_slice(&c.to_le_bytes());
        }
        (Operand::Reg(d), Operand::Symbolic(label)) => {
            out.bytes.push(0xC7);
            out.bytes.push(modrm(0b11, 0, d.code()));
            push_symbolic32(out, FixupKind::Absolute, label);
        }
        (Operand::Address(mem), Operand::Symbolic(label)) => {
            out.bytes.push(0xC7);
            emit_mem(&mut out.bytes, 0, mem, instr)?;
            push_symbolic32(out, FixupKind::Absolute, label);
        }
        (
            Operand::Address(_) | Operand::Address8(_),
            Operand::Address(_) | Operand::Address8(_),
        ) => return Err(bad_combo("memory-to-memory is not encodable", instr)),
        _ => return Err(bad_combo("unsupported operands for mov", instr)),
    }
    Ok(())
}

// ─── Three-operand form ────────────────────────────────────

fn encode_three(instr: &Instr, out: &mut Encoded) -> Result<(), TranslationError> {
    if instr.mnemonic != "imul" {
        return Err(unknown(instr));
    }
    let (dst, src, imm) = (
        &instr.operands[0],
        &instr.operands[1],
        &instr.operands[2],
    );
    let Operand::Const(c) = imm else {
        return Err(bad_combo("imul third operand must be an immediate", instr));
    };
    let dst = match dst {
        Operand::Reg(r) => *r,
        _ => {
            return Err(bad_combo(
                "imul needs a 16/32-bit register destination",
                instr,
            ))
        }
    };
    out.bytes.push(if fits_i8(*c) { 0x6B } else { 0x69 });
    match src {
        Operand::Reg(s) => out.bytes.push(modrm(0b11, dst.code(), s.code())),
        Operand::Address(mem) => emit_mem(&mut out.bytes, dst.code(), mem, instr)?,
        _ => return Err(bad_combo("imul source must be a register or memory", instr)),
    }
    if fits_i8(*c) {
        out.bytes.push(*c as u8);
    } else {
        out.bytes.extend_from_slice(&c.to_le_bytes());
    }
    Ok(())
}
