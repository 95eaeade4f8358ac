//! Single-instruction encoding tests.
//!
//! Byte patterns verified against the Intel SDM (Vol. 2) opcode tables and
//! spot-checked with `llvm-mc -triple=i686 -show-encoding`, keeping in mind
//! the dialect's documented departures: `mov r32, imm32` always uses
//! `C7 /0`, conditional jumps always use the `0F cc rel32` form, and
//! `ret imm` carries a 32-bit literal.

use sasm::translate;

/// Assemble a single instruction (or a short label-free block).
fn asm(source: &str) -> Vec<u8> {
    translate(source)
        .unwrap_or_else(|e| panic!("failed to assemble `{source}`: {e}"))
        .into_bytes()
}

// --- Zero-operand: stack, flags, strings ---

/// NOP — encoding: [0x90]
#[test]
fn enc_nop() {
    assert_eq!(asm("nop"), vec![0x90]);
}

/// RET — encoding: [0xc3]
#[test]
fn enc_ret() {
    assert_eq!(asm("ret"), vec![0xC3]);
}

/// RETN — encoding: [0xc3]
#[test]
fn enc_retn() {
    assert_eq!(asm("retn"), vec![0xC3]);
}

/// RETF — encoding: [0xcb]
#[test]
fn enc_retf() {
    assert_eq!(asm("retf"), vec![0xCB]);
}

/// PUSHA / POPA — encodings: [0x60] / [0x61]
#[test]
fn enc_pusha_popa() {
    assert_eq!(asm("pusha"), vec![0x60]);
    assert_eq!(asm("popa"), vec![0x61]);
}

/// PUSHF / POPF — encodings: [0x9c] / [0x9d]
#[test]
fn enc_pushf_popf() {
    assert_eq!(asm("pushf"), vec![0x9C]);
    assert_eq!(asm("popf"), vec![0x9D]);
}

/// Flag set/clear family.
#[test]
fn enc_flag_ops() {
    assert_eq!(asm("clc"), vec![0xF8]);
    assert_eq!(asm("stc"), vec![0xF9]);
    assert_eq!(asm("cli"), vec![0xFA]);
    assert_eq!(asm("sti"), vec![0xFB]);
    assert_eq!(asm("cld"), vec![0xFC]);
    assert_eq!(asm("std"), vec![0xFD]);
    assert_eq!(asm("cmc"), vec![0xF5]);
}

/// INT1 / INT3 — encodings: [0xf1] / [0xcc]
#[test]
fn enc_breakpoints() {
    assert_eq!(asm("int1"), vec![0xF1]);
    assert_eq!(asm("int3"), vec![0xCC]);
}

/// LAHF / SAHF — encodings: [0x9f] / [0x9e]
#[test]
fn enc_lahf_sahf() {
    assert_eq!(asm("lahf"), vec![0x9F]);
    assert_eq!(asm("sahf"), vec![0x9E]);
}

/// Sign-extension family; the 16-bit variants carry the 0x66 prefix.
#[test]
fn enc_sign_extensions() {
    assert_eq!(asm("cbw"), vec![0x66, 0x98]);
    assert_eq!(asm("cwde"), vec![0x98]);
    assert_eq!(asm("cwd"), vec![0x66, 0x99]);
    assert_eq!(asm("cdq"), vec![0x99]);
}

/// String primitives; `w` variants are 0x66-prefixed.
#[test]
fn enc_string_ops() {
    assert_eq!(asm("movsb"), vec![0xA4]);
    assert_eq!(asm("movsw"), vec![0x66, 0xA5]);
    assert_eq!(asm("movsd"), vec![0xA5]);
    assert_eq!(asm("cmpsb"), vec![0xA6]);
    assert_eq!(asm("cmpsw"), vec![0x66, 0xA7]);
    assert_eq!(asm("stosb"), vec![0xAA]);
    assert_eq!(asm("stosd"), vec![0xAB]);
    assert_eq!(asm("lodsb"), vec![0xAC]);
    assert_eq!(asm("lodsw"), vec![0x66, 0xAD]);
    assert_eq!(asm("scasb"), vec![0xAE]);
    assert_eq!(asm("scasd"), vec![0xAF]);
}

/// REP / REPNE prefixes are stripped from the mnemonic and emitted first.
#[test]
fn enc_rep_prefixes() {
    assert_eq!(asm("rep stosb"), vec![0xF3, 0xAA]);
    assert_eq!(asm("rep movsd"), vec![0xF3, 0xA5]);
    assert_eq!(asm("repe cmpsb"), vec![0xF3, 0xA6]);
    assert_eq!(asm("repne scasb"), vec![0xF2, 0xAE]);
}

/// SALC / XLAT — encodings: [0xd6] / [0xd7]
#[test]
fn enc_salc_xlat() {
    assert_eq!(asm("salc"), vec![0xD6]);
    assert_eq!(asm("xlat"), vec![0xD7]);
}

// --- PUSH / POP ---

/// PUSH r32 — short form 0x50+r.
#[test]
fn enc_push_registers() {
    assert_eq!(asm("push eax"), vec![0x50]);
    assert_eq!(asm("push ecx"), vec![0x51]);
    assert_eq!(asm("push ebp"), vec![0x55]);
    assert_eq!(asm("push edi"), vec![0x57]);
}

/// POP r32 — short form 0x58+r.
#[test]
fn enc_pop_registers() {
    assert_eq!(asm("pop eax"), vec![0x58]);
    assert_eq!(asm("pop ebx"), vec![0x5B]);
    assert_eq!(asm("pop ebp"), vec![0x5D]);
}

/// PUSH imm8 — 0x6A; sign characters ride along.
#[test]
fn enc_push_imm8() {
    assert_eq!(asm("push 5"), vec![0x6A, 0x05]);
    assert_eq!(asm("push -1"), vec![0x6A, 0xFF]);
}

/// PUSH imm32 — 0x68 when the value does not fit a signed byte.
#[test]
fn enc_push_imm32() {
    assert_eq!(asm("push 100h"), vec![0x68, 0x00, 0x01, 0x00, 0x00]);
    assert_eq!(asm("push 128"), vec![0x68, 0x80, 0x00, 0x00, 0x00]);
}

/// PUSH m32 — FF /6; POP m32 — 8F /0.
#[test]
fn enc_push_pop_memory() {
    assert_eq!(asm("push [ebx]"), vec![0xFF, 0x33]);
    assert_eq!(asm("pop [ebx]"), vec![0x8F, 0x03]);
}

// --- INC / DEC and the unary group ---

/// INC/DEC r32 — dedicated single-byte forms 0x40+r / 0x48+r.
#[test]
fn enc_inc_dec_short_forms() {
    assert_eq!(asm("inc eax"), vec![0x40]);
    assert_eq!(asm("inc esi"), vec![0x46]);
    assert_eq!(asm("dec eax"), vec![0x48]);
    assert_eq!(asm("dec edi"), vec![0x4F]);
}

/// INC/DEC r8 and memory go through FE/FF with /0 and /1.
#[test]
fn enc_inc_dec_rm_forms() {
    assert_eq!(asm("inc al"), vec![0xFE, 0xC0]);
    assert_eq!(asm("dec bl"), vec![0xFE, 0xCB]);
    assert_eq!(asm("inc [ebx]"), vec![0xFF, 0x03]);
    assert_eq!(asm("dec byte [ebx]"), vec![0xFE, 0x0B]);
}

/// NOT/NEG/MUL/IMUL/DIV/IDIV — F7 with /2../7.
#[test]
fn enc_unary_group() {
    assert_eq!(asm("not eax"), vec![0xF7, 0xD0]);
    assert_eq!(asm("neg ecx"), vec![0xF7, 0xD9]);
    assert_eq!(asm("mul ebx"), vec![0xF7, 0xE3]);
    assert_eq!(asm("imul edx"), vec![0xF7, 0xEA]);
    assert_eq!(asm("div esi"), vec![0xF7, 0xF6]);
    assert_eq!(asm("idiv edi"), vec![0xF7, 0xFF]);
    assert_eq!(asm("not al"), vec![0xF6, 0xD0]);
    assert_eq!(asm("neg byte [ebx]"), vec![0xF6, 0x1B]);
}

// --- CALL / JMP / Jcc / LOOP ---

/// CALL through a register or memory — FF /2.
#[test]
fn enc_call_indirect() {
    assert_eq!(asm("call eax"), vec![0xFF, 0xD0]);
    assert_eq!(asm("call ecx"), vec![0xFF, 0xD1]);
    assert_eq!(asm("call [ebx]"), vec![0xFF, 0x13]);
}

/// JMP indirect — FF /4.
#[test]
fn enc_jmp_indirect() {
    assert_eq!(asm("jmp eax"), vec![0xFF, 0xE0]);
    assert_eq!(asm("jmp [ebx]"), vec![0xFF, 0x23]);
}

/// JMP with a literal displacement picks the short form when it fits.
#[test]
fn enc_jmp_literal() {
    assert_eq!(asm("jmp 5"), vec![0xEB, 0x05]);
    assert_eq!(asm("jmp 200h"), vec![0xE9, 0x00, 0x02, 0x00, 0x00]);
}

/// JECXZ / LOOP family — 8-bit displacement only.
#[test]
fn enc_short_branches() {
    assert_eq!(asm("jecxz 2"), vec![0xE3, 0x02]);
    assert_eq!(asm("jcxz 2"), vec![0xE3, 0x02]);
    assert_eq!(asm("loop 10"), vec![0xE2, 0x0A]);
    assert_eq!(asm("loopz 0"), vec![0xE1, 0x00]);
    assert_eq!(asm("loopnz 0"), vec![0xE0, 0x00]);
}

/// Conditional jumps always use the two-byte 0x0F cc rel32 form.
#[test]
fn enc_conditional_jumps() {
    assert_eq!(asm("jo 0"), vec![0x0F, 0x80, 0, 0, 0, 0]);
    assert_eq!(asm("jb 0"), vec![0x0F, 0x82, 0, 0, 0, 0]);
    assert_eq!(asm("jae 0"), vec![0x0F, 0x83, 0, 0, 0, 0]);
    assert_eq!(asm("je 0"), vec![0x0F, 0x84, 0, 0, 0, 0]);
    assert_eq!(asm("jne 0"), vec![0x0F, 0x85, 0, 0, 0, 0]);
    assert_eq!(asm("ja 0"), vec![0x0F, 0x87, 0, 0, 0, 0]);
    assert_eq!(asm("js 0"), vec![0x0F, 0x88, 0, 0, 0, 0]);
    assert_eq!(asm("jp 0"), vec![0x0F, 0x8A, 0, 0, 0, 0]);
    assert_eq!(asm("jl 0"), vec![0x0F, 0x8C, 0, 0, 0, 0]);
    assert_eq!(asm("jge 0"), vec![0x0F, 0x8D, 0, 0, 0, 0]);
    assert_eq!(asm("jle 0"), vec![0x0F, 0x8E, 0, 0, 0, 0]);
    assert_eq!(asm("jg 0"), vec![0x0F, 0x8F, 0, 0, 0, 0]);
}

/// Jcc aliases share the condition code of their canonical spelling.
#[test]
fn enc_conditional_aliases() {
    assert_eq!(asm("jz 0"), asm("je 0"));
    assert_eq!(asm("jnz 0"), asm("jne 0"));
    assert_eq!(asm("jc 0"), asm("jb 0"));
    assert_eq!(asm("jnbe 0"), asm("ja 0"));
    assert_eq!(asm("jpe 0"), asm("jp 0"));
}

// --- RET n / INT / IN / OUT ---

/// RET imm — 0xC2 with the dialect's 32-bit literal.
#[test]
fn enc_ret_imm() {
    assert_eq!(asm("ret 8"), vec![0xC2, 0x08, 0x00, 0x00, 0x00]);
    assert_eq!(asm("retn 8"), vec![0xC2, 0x08, 0x00, 0x00, 0x00]);
    assert_eq!(asm("retf 4"), vec![0xCA, 0x04, 0x00, 0x00, 0x00]);
}

/// INT / IN / OUT take an 8-bit literal.
#[test]
fn enc_int_in_out() {
    assert_eq!(asm("int 21h"), vec![0xCD, 0x21]);
    assert_eq!(asm("in 60h"), vec![0xE5, 0x60]);
    assert_eq!(asm("out 20h"), vec![0xE7, 0x20]);
}

// --- MOV ---

/// MOV r/m, r — MR form.
#[test]
fn enc_mov_reg_reg() {
    assert_eq!(asm("mov eax, ebx"), vec![0x89, 0xD8]);
    assert_eq!(asm("mov esi, edi"), vec![0x89, 0xFE]);
    assert_eq!(asm("mov al, bl"), vec![0x88, 0xD8]);
}

/// MOV r, imm — always C6/C7 /0, never the 0xB0+r short form.
#[test]
fn enc_mov_reg_imm() {
    assert_eq!(asm("mov eax, 1"), vec![0xC7, 0xC0, 1, 0, 0, 0]);
    assert_eq!(asm("mov edx, 0"), vec![0xC7, 0xC2, 0, 0, 0, 0]);
    assert_eq!(asm("mov bl, 5"), vec![0xC6, 0xC3, 5]);
}

/// MOV between registers and memory.
#[test]
fn enc_mov_memory() {
    assert_eq!(asm("mov eax, [ebx]"), vec![0x8B, 0x03]);
    assert_eq!(asm("mov [ebx], eax"), vec![0x89, 0x03]);
    assert_eq!(asm("mov al, [ebx]"), vec![0x8A, 0x03]);
    assert_eq!(asm("mov [ebx], al"), vec![0x88, 0x03]);
}

/// MOV imm to memory — C6/C7 /0 with the immediate after the displacement.
#[test]
fn enc_mov_mem_imm() {
    assert_eq!(asm("mov byte [ebx], 5"), vec![0xC6, 0x03, 5]);
    assert_eq!(asm("mov [ebx], 5"), vec![0xC7, 0x03, 5, 0, 0, 0]);
    assert_eq!(
        asm("mov [ebp-4], 7"),
        vec![0xC7, 0x45, 0xFC, 7, 0, 0, 0]
    );
}

/// 16-bit spellings emit the operand-size prefix.
#[test]
fn enc_mov_16bit() {
    assert_eq!(asm("mov ax, bx"), vec![0x66, 0x89, 0xD8]);
    assert_eq!(asm("mov ax, [ebx]"), vec![0x66, 0x8B, 0x03]);
}

/// A second 16-bit, bracketed operand emits 0x67 instead of another 0x66.
#[test]
fn enc_mov_16bit_memory_hint() {
    assert_eq!(asm("mov ax, word [ebx]"), vec![0x66, 0x67, 0x8B, 0x03]);
}

// --- Addressing-mode corner cases ---

/// Pure displacement: mod=00 rm=101 + disp32.
#[test]
fn enc_pure_displacement() {
    assert_eq!(asm("mov eax, [1234h]"), vec![0x8B, 0x05, 0x34, 0x12, 0, 0]);
}

/// [ebp] must use the disp8=0 form because mod=00 rm=101 means disp32.
#[test]
fn enc_ebp_zero_disp() {
    assert_eq!(asm("mov eax, [ebp]"), vec![0x8B, 0x45, 0x00]);
}

/// esp as base always takes a SIB byte with index=100.
#[test]
fn enc_esp_base() {
    assert_eq!(asm("mov eax, [esp]"), vec![0x8B, 0x04, 0x24]);
    assert_eq!(asm("mov eax, [esp+4]"), vec![0x8B, 0x44, 0x24, 0x04]);
}

/// Full base + scaled index + disp8.
#[test]
fn enc_base_index_scale_disp() {
    assert_eq!(asm("mov eax, [ebx+ecx*4+10h]"), vec![0x8B, 0x44, 0x8B, 0x10]);
    assert_eq!(asm("mov eax, [ebx+ecx*2]"), vec![0x8B, 0x04, 0x4B]);
}

/// Scaled index with no base: SIB base=101, mod=00, disp32.
#[test]
fn enc_index_only() {
    assert_eq!(
        asm("mov [ecx*8], eax"),
        vec![0x89, 0x04, 0xCD, 0, 0, 0, 0]
    );
}

/// ebp as a scale-1 index is swapped back into the base field.
#[test]
fn enc_ebp_index_swap() {
    assert_eq!(asm("mov eax, [eax+ebp]"), vec![0x8B, 0x44, 0x05, 0x00]);
    assert_eq!(asm("mov eax, [ebp+eax]"), vec![0x8B, 0x44, 0x05, 0x00]);
}

/// Large displacements take the disp32 form.
#[test]
fn enc_disp32() {
    assert_eq!(
        asm("mov eax, [ebx+200h]"),
        vec![0x8B, 0x83, 0x00, 0x02, 0x00, 0x00]
    );
}

// --- ALU group ---

/// Register-to-register rows at base+1.
#[test]
fn enc_alu_reg_reg() {
    assert_eq!(asm("add eax, ebx"), vec![0x01, 0xD8]);
    assert_eq!(asm("or eax, ebx"), vec![0x09, 0xD8]);
    assert_eq!(asm("adc eax, ebx"), vec![0x11, 0xD8]);
    assert_eq!(asm("sbb eax, ebx"), vec![0x19, 0xD8]);
    assert_eq!(asm("and eax, ebx"), vec![0x21, 0xD8]);
    assert_eq!(asm("sub eax, ebx"), vec![0x29, 0xD8]);
    assert_eq!(asm("xor eax, ebx"), vec![0x31, 0xD8]);
    assert_eq!(asm("cmp eax, ebx"), vec![0x39, 0xD8]);
    assert_eq!(asm("add al, bl"), vec![0x00, 0xD8]);
}

/// Register ↔ memory rows.
#[test]
fn enc_alu_memory() {
    assert_eq!(asm("add eax, [ebx]"), vec![0x03, 0x03]);
    assert_eq!(asm("add [ebx], eax"), vec![0x01, 0x03]);
    assert_eq!(asm("add al, [ebx]"), vec![0x02, 0x03]);
    assert_eq!(asm("add [ebx], al"), vec![0x00, 0x03]);
    assert_eq!(asm("sub eax, [ebp+8]"), vec![0x2B, 0x45, 0x08]);
}

/// Immediates: 0x83 sign-extended when they fit, else 0x81; 0x80 for bytes.
#[test]
fn enc_alu_immediates() {
    assert_eq!(asm("add eax, 5"), vec![0x83, 0xC0, 5]);
    assert_eq!(asm("add eax, -5"), vec![0x83, 0xC0, 0xFB]);
    assert_eq!(asm("add eax, 300h"), vec![0x81, 0xC0, 0x00, 0x03, 0, 0]);
    assert_eq!(asm("add al, 5"), vec![0x80, 0xC0, 5]);
    assert_eq!(asm("and eax, 0f0h"), vec![0x81, 0xE0, 0xF0, 0, 0, 0]);
    assert_eq!(asm("xor ecx, -1"), vec![0x83, 0xF1, 0xFF]);
    assert_eq!(asm("cmp eax, 0"), vec![0x83, 0xF8, 0]);
    assert_eq!(asm("add [ebx], 5"), vec![0x83, 0x03, 5]);
}

/// sub carries /5 in both immediate forms.
#[test]
fn enc_sub_digit() {
    assert_eq!(asm("sub eax, 1"), vec![0x83, 0xE8, 1]);
    assert_eq!(asm("sub eax, 1234h"), vec![0x81, 0xE8, 0x34, 0x12, 0, 0]);
    assert_eq!(asm("sub esp, 16"), vec![0x83, 0xEC, 0x10]);
}

// --- TEST / XCHG ---

/// TEST — 0x84/0x85 for registers, F6/F7 /0 for immediates.
#[test]
fn enc_test() {
    assert_eq!(asm("test eax, ebx"), vec![0x85, 0xD8]);
    assert_eq!(asm("test al, bl"), vec![0x84, 0xD8]);
    assert_eq!(asm("test eax, 1"), vec![0xF7, 0xC0, 1, 0, 0, 0]);
    assert_eq!(asm("test al, 1"), vec![0xF6, 0xC0, 1]);
}

/// XCHG — 0x86/0x87.
#[test]
fn enc_xchg() {
    assert_eq!(asm("xchg eax, ebx"), vec![0x87, 0xD8]);
    assert_eq!(asm("xchg al, bl"), vec![0x86, 0xD8]);
    assert_eq!(asm("xchg [esp], ecx"), vec![0x87, 0x0C, 0x24]);
}

// --- LEA ---

/// LEA — 0x8D with a memory source.
#[test]
fn enc_lea() {
    assert_eq!(asm("lea eax, [ebx+4]"), vec![0x8D, 0x43, 0x04]);
    assert_eq!(asm("lea eax, [ebx+ecx*2]"), vec![0x8D, 0x04, 0x4B]);
    assert_eq!(asm("lea esp, [ebp-14h]"), vec![0x8D, 0x65, 0xEC]);
}

// --- Shifts and rotates ---

/// C0/C1 with an immediate count, D2/D3 with cl.
#[test]
fn enc_shifts() {
    assert_eq!(asm("shl eax, 1"), vec![0xC1, 0xE0, 1]);
    assert_eq!(asm("sal eax, 1"), vec![0xC1, 0xE0, 1]);
    assert_eq!(asm("shr eax, 2"), vec![0xC1, 0xE8, 2]);
    assert_eq!(asm("sar eax, 4"), vec![0xC1, 0xF8, 4]);
    assert_eq!(asm("rol al, 1"), vec![0xC0, 0xC0, 1]);
    assert_eq!(asm("ror al, 1"), vec![0xC0, 0xC8, 1]);
    assert_eq!(asm("rcl eax, 1"), vec![0xC1, 0xD0, 1]);
    assert_eq!(asm("rcr eax, 1"), vec![0xC1, 0xD8, 1]);
    assert_eq!(asm("shl eax, cl"), vec![0xD3, 0xE0]);
    assert_eq!(asm("shr bl, cl"), vec![0xD2, 0xEB]);
}

// --- IMUL (two- and three-operand) / MOVZX ---

/// IMUL r, r/m — 0F AF.
#[test]
fn enc_imul_two_operand() {
    assert_eq!(asm("imul eax, ebx"), vec![0x0F, 0xAF, 0xC3]);
    assert_eq!(asm("imul edx, [ebx]"), vec![0x0F, 0xAF, 0x13]);
}

/// IMUL r, r/m, imm — 6B for imm8, 69 for imm32.
#[test]
fn enc_imul_three_operand() {
    assert_eq!(asm("imul eax, ebx, 10"), vec![0x6B, 0xC3, 0x0A]);
    assert_eq!(
        asm("imul eax, ebx, 1000"),
        vec![0x69, 0xC3, 0xE8, 0x03, 0x00, 0x00]
    );
}

/// MOVZX — 0F B6 for byte sources, 0F B7 for word sources.
#[test]
fn enc_movzx() {
    assert_eq!(asm("movzx eax, bl"), vec![0x0F, 0xB6, 0xC3]);
    assert_eq!(asm("movzx eax, byte [ebx]"), vec![0x0F, 0xB6, 0x03]);
    assert_eq!(asm("movzx eax, bx"), vec![0x66, 0x0F, 0xB7, 0xC3]);
}

// --- store* pseudo-ops ---

/// storeb/storew/stored emit the literal little-endian.
#[test]
fn enc_stores() {
    assert_eq!(asm("storeb 65"), vec![0x41]);
    assert_eq!(asm("storew 1234h"), vec![0x34, 0x12]);
    assert_eq!(asm("stored 12345678h"), vec![0x78, 0x56, 0x34, 0x12]);
    assert_eq!(asm("storeb -1"), vec![0xFF]);
    assert_eq!(asm("storew -1"), vec![0xFF, 0xFF]);
}
