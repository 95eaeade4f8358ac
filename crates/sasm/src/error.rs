//! Error type for translation failures.
//!
//! Every failure surfaces as a single [`TranslationError`] whose variants
//! carry the offending source line or instruction text, so callers can point
//! the user at the exact input that did not translate. Translation stops at
//! the first error; no partial output is ever produced.

#[allow(unused_imports)]
use alloc::format;
use alloc::string::String;
use core::fmt;

/// A translation failure with the offending source text attached.
///
/// The `reason` field of each variant is the preprocessed source line or
/// instruction the error was raised for.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TranslationError {
    /// An `equ` constant (or a procedure argument/local) redefined a name.
    DuplicateConstant {
        /// The redefined constant name.
        name: String,
        /// The line that attempted the redefinition.
        reason: String,
    },

    /// A label was defined more than once.
    DuplicateLabel {
        /// The duplicated label name.
        name: String,
        /// The label line that attempted the redefinition.
        reason: String,
    },

    /// An `extern` redefined an already-resolved symbol.
    DuplicateExtern {
        /// The redefined extern name.
        name: String,
        /// The `extern` line that attempted the redefinition.
        reason: String,
    },

    /// An operand referenced a constant outside its declaring procedure.
    ShadowedConstant {
        /// The out-of-scope constant name.
        name: String,
        /// The operand text that referenced it.
        reason: String,
    },

    /// A malformed address operand (too many terms, illegal sign, bad
    /// scale, `esp` as an unswappable index, unknown register, …).
    BadAddress {
        /// What was wrong with the address.
        detail: String,
        /// The operand text.
        reason: String,
    },

    /// An operand combination the mnemonic does not support (size
    /// mismatch, memory-to-memory, constant destination, …).
    BadOperandCombination {
        /// Why the combination is rejected.
        detail: String,
        /// The instruction text.
        reason: String,
    },

    /// An immediate value that fits no admissible width.
    BadImmediate {
        /// The value that did not fit.
        value: i64,
        /// Maximum width in bits for this position.
        bits: u8,
        /// The instruction text.
        reason: String,
    },

    /// A mnemonic not recognized for the given operand count.
    UnknownMnemonic {
        /// The unrecognized mnemonic.
        mnemonic: String,
        /// The instruction text.
        reason: String,
    },

    /// An `extern` line not matching `extern NAME lib LIBRARY`.
    BadExternSyntax {
        /// The malformed line.
        reason: String,
    },

    /// A procedure argument or local whose size token is not `dword`/`word`.
    BadLocalSyntax {
        /// The offending size token.
        token: String,
        /// The `proc`/`local` line.
        reason: String,
    },

    /// A label name that collides with a register, contains brackets, or
    /// is indistinguishable from a numeric literal.
    BadLabelName {
        /// The rejected name.
        name: String,
        /// Why the name is rejected.
        detail: String,
    },

    /// The resolver could not produce an address for an `extern` symbol.
    ExternNotFound {
        /// The symbol that failed to resolve.
        name: String,
        /// The library it was looked up in.
        library: String,
        /// The `extern` line.
        reason: String,
    },

    /// A symbolic operand that never resolved to a label.
    UndefinedLabel {
        /// The unresolved name.
        name: String,
        /// The instruction that referenced it.
        reason: String,
    },
}

impl TranslationError {
    /// The offending source line or instruction text, when one is attached.
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            TranslationError::DuplicateConstant { reason, .. }
            | TranslationError::DuplicateLabel { reason, .. }
            | TranslationError::DuplicateExtern { reason, .. }
            | TranslationError::ShadowedConstant { reason, .. }
            | TranslationError::BadAddress { reason, .. }
            | TranslationError::BadOperandCombination { reason, .. }
            | TranslationError::BadImmediate { reason, .. }
            | TranslationError::UnknownMnemonic { reason, .. }
            | TranslationError::BadExternSyntax { reason }
            | TranslationError::BadLocalSyntax { reason, .. }
            | TranslationError::ExternNotFound { reason, .. }
            | TranslationError::UndefinedLabel { reason, .. } => reason,
            TranslationError::BadLabelName { name, .. } => name,
        }
    }
}

impl fmt::Display for TranslationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslationError::DuplicateConstant { name, reason } => {
                write!(f, "duplicate constant '{}' in `{}`", name, reason)
            }
            TranslationError::DuplicateLabel { name, reason } => {
                write!(f, "duplicate label '{}' in `{}`", name, reason)
            }
            TranslationError::DuplicateExtern { name, reason } => {
                write!(f, "duplicate extern '{}' in `{}`", name, reason)
            }
            TranslationError::ShadowedConstant { name, reason } => {
                write!(
                    f,
                    "constant '{}' is out of scope in operand `{}`",
                    name, reason
                )
            }
            TranslationError::BadAddress { detail, reason } => {
                write!(f, "bad address `{}`: {}", reason, detail)
            }
            TranslationError::BadOperandCombination { detail, reason } => {
                write!(f, "bad operand combination in `{}`: {}", reason, detail)
            }
            TranslationError::BadImmediate {
                value,
                bits,
                reason,
            } => {
                write!(
                    f,
                    "immediate {} does not fit in {} bits in `{}`",
                    value, bits, reason
                )
            }
            TranslationError::UnknownMnemonic { mnemonic, reason } => {
                write!(f, "unknown mnemonic '{}' in `{}`", mnemonic, reason)
            }
            TranslationError::BadExternSyntax { reason } => {
                write!(
                    f,
                    "bad extern syntax in `{}` (expected `extern NAME lib LIBRARY`)",
                    reason
                )
            }
            TranslationError::BadLocalSyntax { token, reason } => {
                write!(
                    f,
                    "bad size token '{}' in `{}` (expected `dword` or `word`)",
                    token, reason
                )
            }
            TranslationError::BadLabelName { name, detail } => {
                write!(f, "bad label name '{}': {}", name, detail)
            }
            TranslationError::ExternNotFound {
                name,
                library,
                reason,
            } => {
                write!(
                    f,
                    "extern '{}' not found in library '{}' (`{}`)",
                    name, library, reason
                )
            }
            TranslationError::UndefinedLabel { name, reason } => {
                write!(f, "undefined label '{}' in `{}`", name, reason)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TranslationError {}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn duplicate_constant_display() {
        let err = TranslationError::DuplicateConstant {
            name: "width".into(),
            reason: "width equ 8".into(),
        };
        assert_eq!(
            err.to_string(),
            "duplicate constant 'width' in `width equ 8`"
        );
    }

    #[test]
    fn bad_immediate_display() {
        let err = TranslationError::BadImmediate {
            value: 300,
            bits: 8,
            reason: "int 300".into(),
        };
        assert_eq!(
            err.to_string(),
            "immediate 300 does not fit in 8 bits in `int 300`"
        );
    }

    #[test]
    fn bad_extern_syntax_display() {
        let err = TranslationError::BadExternSyntax {
            reason: "extern puts".into(),
        };
        assert_eq!(
            err.to_string(),
            "bad extern syntax in `extern puts` (expected `extern NAME lib LIBRARY`)"
        );
    }

    #[test]
    fn reason_accessor() {
        let err = TranslationError::UnknownMnemonic {
            mnemonic: "frobnicate".into(),
            reason: "frobnicate eax".into(),
        };
        assert_eq!(err.reason(), "frobnicate eax");
    }
}
