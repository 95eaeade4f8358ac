//! # sasm — SASM → IA-32 machine-code translator
//!
//! `sasm` is a pure Rust, zero-C-dependency runtime assembler for a small
//! Intel-syntax IA-32 dialect ("SASM"). It turns program text into a flat
//! byte buffer of 32-bit protected-mode machine code, ready to be copied to
//! an executable page and jumped into, along with a table of data-variable
//! offsets and a snapshot of their initial bytes.
//!
//! ## Quick Start
//!
//! ```rust
//! let t = sasm::translate("mov eax, ebx")?;
//! assert_eq!(t.bytes(), &[0x89, 0xD8]);
//! # Ok::<(), sasm::TranslationError>(())
//! ```
//!
//! ## Features
//!
//! - **Pure Rust** — no C/C++ FFI, no system assembler at runtime.
//! - **Single pass with fixup** — labels resolve after encoding; absolute
//!   and PC-relative references are back-patched in place.
//! - **Structured dialect** — `equ` constants, `proc`/`local`/`endp`
//!   frames, `invoke`, `addr`, data directives with `dup` and strings,
//!   `extern` symbols through a caller-supplied resolver.
//! - **Variable tables** — declared data variables surface as name →
//!   offset entries plus typed readers and a restoration snapshot.
//! - **`no_std` + `alloc`** — embeddable; `std` only adds `Error`.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
// ── Pedantic lint policy ─────────────────────────────────────────────────
// An assembler intentionally performs many narrowing / sign-changing casts
// between integer widths (i64→u8, i32→u32, etc.) and uses dense hex
// literals without separators (0xC7, 0x8B).  The lints below are expected
// and acceptable in this context.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_lossless,
    clippy::cast_possible_wrap,
    clippy::unreadable_literal,
    clippy::match_same_arms,
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args,
    clippy::doc_markdown,
    clippy::similar_names,
    clippy::too_many_lines,
    clippy::single_match_else,
    clippy::manual_let_else,
    clippy::missing_errors_doc,
    clippy::return_self_not_must_use
)]

extern crate alloc;

/// Per-instruction byte emission: opcodes, ModR/M + SIB, immediates.
pub(crate) mod encoder;
/// The [`TranslationError`] type.
pub mod error;
/// Registers, operands, instruction records, labels, fixups.
pub mod ir;
/// Layout sweep, label resolution, deferred patching.
pub(crate) mod linker;
/// Numeric literal parsing and signed-term folding.
pub mod numeric;
/// Operand classification and address parsing.
pub(crate) mod parser;
/// Line normalization, constants, structural expansion, label collection.
pub(crate) mod preprocessor;
/// The public [`Translator`] API and [`Translation`] result.
pub mod translator;

// Re-exports
pub use error::TranslationError;
pub use ir::{MemoryOperand, Operand, Register};
pub use translator::{LibraryResolver, NoLibraries, StaticLibraries, Translation, Translator};

/// Translate a program that declares no `extern` symbols.
///
/// Lines are newline-delimited; labels are defined with a trailing colon.
///
/// # Errors
///
/// Returns [`TranslationError`] on malformed input, unknown mnemonics,
/// invalid operand combinations, or unresolvable names.
///
/// # Examples
///
/// ```rust
/// let t = sasm::translate("nop")?;
/// assert_eq!(t.bytes(), &[0x90]);
/// # Ok::<(), sasm::TranslationError>(())
/// ```
pub fn translate(source: &str) -> Result<Translation, TranslationError> {
    Translator::new().translate(source, &mut NoLibraries)
}

/// Translate a program, resolving `extern` lines through `resolver`.
///
/// # Errors
///
/// Returns [`TranslationError`] on assembly failure (see [`translate`]),
/// including [`TranslationError::ExternNotFound`] when the resolver cannot
/// produce an address.
///
/// # Examples
///
/// ```rust
/// use sasm::StaticLibraries;
///
/// let mut libs = StaticLibraries::new();
/// libs.define("kernel32.dll", "Beep", 0x7750_2A40);
/// let t = sasm::translate_with("extern Beep lib kernel32.dll\ncall beep", &mut libs)?;
/// // call through ecx: mov ecx, <abs addr>; call ecx
/// assert_eq!(t.bytes(), &[0xC7, 0xC1, 0x40, 0x2A, 0x50, 0x77, 0xFF, 0xD1]);
/// # Ok::<(), sasm::TranslationError>(())
/// ```
pub fn translate_with(
    source: &str,
    resolver: &mut dyn LibraryResolver,
) -> Result<Translation, TranslationError> {
    Translator::new().translate(source, resolver)
}
