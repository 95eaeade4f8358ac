//! Public translation API — builder pattern, one-shot helpers, and the
//! [`Translation`] result with its variable tables and typed readers.
//!
//! This module ties the line preprocessor, structural expander, operand
//! parser, encoder, and linker into a single synchronous pipeline. A
//! translation either completes or fails with the first error; no partial
//! output is exposed.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::encoder::{encode_instruction, EncodeContext};
use crate::error::TranslationError;
use crate::ir::{Fixup, Instr};
use crate::linker;
use crate::parser::{parse_operand, OperandContext};
use crate::preprocessor::{collect_labels, expand, preprocess_lines, PROLOG, PROLOG_CONSTANTS};

/// Resolves `extern` symbols to absolute addresses.
///
/// The translator calls [`library`](LibraryResolver::library) once per
/// `extern` line to obtain an opaque handle for the named library, then
/// [`symbol`](LibraryResolver::symbol) to look the symbol up inside it.
/// Symbol names keep their source spelling (case matters to most dynamic
/// loaders); any caching of handles belongs to the implementation.
pub trait LibraryResolver {
    /// Resolve a library name to an opaque handle.
    fn library(&mut self, name: &str) -> Option<u64>;
    /// Resolve a symbol inside a previously returned library handle to an
    /// absolute address.
    fn symbol(&mut self, library: u64, name: &str) -> Option<u32>;
}

/// A resolver for programs without `extern` lines; every lookup fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLibraries;

impl LibraryResolver for NoLibraries {
    fn library(&mut self, _name: &str) -> Option<u64> {
        None
    }
    fn symbol(&mut self, _library: u64, _name: &str) -> Option<u32> {
        None
    }
}

/// A table-backed resolver for hosts that pre-resolve addresses (and for
/// tests). Handles are indices into the library list.
///
/// # Examples
///
/// ```
/// use sasm::{translate_with, StaticLibraries};
///
/// let mut libs = StaticLibraries::new();
/// libs.define("user32.dll", "MessageBeep", 0x7701_0010);
/// let t = translate_with("extern MessageBeep lib user32.dll\nmov eax, messagebeep", &mut libs)?;
/// assert_eq!(t.bytes(), &[0xC7, 0xC0, 0x10, 0x00, 0x01, 0x77]);
/// # Ok::<(), sasm::TranslationError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticLibraries {
    libraries: Vec<(String, BTreeMap<String, u32>)>,
}

impl StaticLibraries {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `symbol` at `address` inside `library`, creating the
    /// library entry on first use.
    pub fn define(&mut self, library: &str, symbol: &str, address: u32) -> &mut Self {
        let entry = match self.libraries.iter_mut().find(|(name, _)| name == library) {
            Some((_, symbols)) => symbols,
            None => {
                self.libraries.push((library.to_string(), BTreeMap::new()));
                &mut self.libraries.last_mut().expect("just pushed").1
            }
        };
        entry.insert(symbol.to_string(), address);
        self
    }
}

impl LibraryResolver for StaticLibraries {
    fn library(&mut self, name: &str) -> Option<u64> {
        self.libraries
            .iter()
            .position(|(lib, _)| lib == name)
            .map(|i| i as u64)
    }
    fn symbol(&mut self, library: u64, name: &str) -> Option<u32> {
        self.libraries
            .get(library as usize)?
            .1
            .get(name)
            .copied()
    }
}

// ─── Translation result ────────────────────────────────────

/// The result of a successful translation: the flat code buffer plus the
/// data-variable tables and a restoration snapshot.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[must_use]
pub struct Translation {
    /// The assembled machine code, in execution order.
    bytes: Vec<u8>,
    /// Label name → byte offset.
    labels: Vec<(String, u32)>,
    /// Data-variable name → starting byte offset.
    variable_offsets: BTreeMap<String, u32>,
    /// Byte offset → initial bytes, captured per `store*` instruction.
    initial_variable_bytes: BTreeMap<u32, Vec<u8>>,
}

impl Translation {
    /// The assembled bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// let t = sasm::translate("nop")?;
    /// assert_eq!(t.bytes(), &[0x90]);
    /// # Ok::<(), sasm::TranslationError>(())
    /// ```
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutable access to the assembled bytes, for hosts that patch
    /// variables in place before or between runs.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Consume and return the bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// The byte count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// All label offsets, sorted by name.
    #[must_use]
    pub fn labels(&self) -> &[(String, u32)] {
        &self.labels
    }

    /// Look up one label's byte offset.
    ///
    /// # Examples
    ///
    /// ```
    /// let t = sasm::translate("nop\nentry:\nret")?;
    /// assert_eq!(t.label_offset("entry"), Some(1));
    /// assert_eq!(t.label_offset("missing"), None);
    /// # Ok::<(), sasm::TranslationError>(())
    /// ```
    #[must_use]
    pub fn label_offset(&self, name: &str) -> Option<u32> {
        self.labels
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, o)| *o)
    }

    /// Data-variable name → starting byte offset.
    #[must_use]
    pub fn variable_offsets(&self) -> &BTreeMap<String, u32> {
        &self.variable_offsets
    }

    /// One variable's starting byte offset.
    ///
    /// # Examples
    ///
    /// ```
    /// let t = sasm::translate("foo db \"AB\", 0")?;
    /// assert_eq!(t.bytes(), &[0x41, 0x42, 0x00]);
    /// assert_eq!(t.variable_offset("foo"), Some(0));
    /// # Ok::<(), sasm::TranslationError>(())
    /// ```
    #[must_use]
    pub fn variable_offset(&self, name: &str) -> Option<u32> {
        self.variable_offsets.get(name).copied()
    }

    /// The restoration snapshot: byte offset → initial bytes of the data
    /// store emitted at that offset.
    #[must_use]
    pub fn initial_variable_bytes(&self) -> &BTreeMap<u32, Vec<u8>> {
        &self.initial_variable_bytes
    }

    /// Rewrite every data variable back to its initial bytes.
    ///
    /// Only the byte ranges recorded in the snapshot are touched, so hosts
    /// can reset variables between runs without re-assembling.
    pub fn restore_variables(&mut self) {
        for (&offset, bytes) in &self.initial_variable_bytes {
            let start = offset as usize;
            self.bytes[start..start + bytes.len()].copy_from_slice(bytes);
        }
    }

    /// Read a variable as an unsigned byte.
    #[must_use]
    pub fn byte_variable(&self, name: &str) -> Option<u8> {
        let i = self.variable_offset(name)? as usize;
        self.bytes.get(i).copied()
    }

    /// Read a variable as a little-endian 16-bit value.
    #[must_use]
    pub fn word_variable(&self, name: &str) -> Option<u16> {
        let i = self.variable_offset(name)? as usize;
        Some(u16::from(*self.bytes.get(i)?) | u16::from(*self.bytes.get(i + 1)?) << 8)
    }

    /// Read a variable as a little-endian 32-bit value.
    #[must_use]
    pub fn dword_variable(&self, name: &str) -> Option<u32> {
        let i = self.variable_offset(name)? as usize;
        let slice = self.bytes.get(i..i + 4)?;
        Some(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
    }

    /// Read a variable as a NUL-terminated ASCII string.
    #[must_use]
    pub fn ascii_variable(&self, name: &str) -> Option<String> {
        let i = self.variable_offset(name)? as usize;
        let bytes: Vec<u8> = self.bytes.get(i..)?.iter().copied().take_while(|&b| b != 0).collect();
        Some(bytes.iter().map(|&b| char::from(b)).collect())
    }

    /// Read a variable as a NUL-terminated UTF-16 string.
    #[must_use]
    pub fn utf16_variable(&self, name: &str) -> Option<String> {
        let i = self.variable_offset(name)? as usize;
        let units: Vec<u16> = self
            .bytes
            .get(i..)?
            .chunks_exact(2)
            .map(|pair| u16::from(pair[0]) | u16::from(pair[1]) << 8)
            .take_while(|&u| u != 0)
            .collect();
        Some(String::from_utf16_lossy(&units))
    }
}

// ─── Translator ────────────────────────────────────────────

/// Builder-pattern translator.
///
/// # Examples
///
/// ```
/// use sasm::{NoLibraries, Translator};
///
/// let mut translator = Translator::new();
/// translator.define_constant("width", "10h");
/// let t = translator.translate("mov eax, width", &mut NoLibraries)?;
/// assert_eq!(t.bytes(), &[0xC7, 0xC0, 0x10, 0x00, 0x00, 0x00]);
/// # Ok::<(), sasm::TranslationError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Translator {
    with_prolog: bool,
    constants: BTreeMap<String, String>,
    externals: BTreeMap<String, u32>,
}

impl Translator {
    /// Create a translator with no prolog and no predefined names.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend the fixed prolog and install the `$first`/`$second`/`$this`/
    /// `$return` frame-slot constants. The translated program is expected
    /// to end with `asmret`.
    pub fn prolog(&mut self, enabled: bool) -> &mut Self {
        self.with_prolog = enabled;
        self
    }

    /// Predefine a textual constant, as if by an `equ` line.
    pub fn define_constant(&mut self, name: &str, replacement: &str) -> &mut Self {
        self.constants
            .insert(name.to_string(), replacement.to_string());
        self
    }

    /// Predefine an extern symbol at a known absolute address, bypassing
    /// the resolver.
    pub fn define_external(&mut self, name: &str, address: u32) -> &mut Self {
        self.externals.insert(name.to_lowercase(), address);
        self
    }

    /// Translate a program.
    ///
    /// # Errors
    ///
    /// Returns the first [`TranslationError`] encountered; no partial
    /// output is produced.
    pub fn translate(
        &self,
        source: &str,
        resolver: &mut dyn LibraryResolver,
    ) -> Result<Translation, TranslationError> {
        let mut constants = self.constants.clone();
        let mut removed: BTreeSet<String> = BTreeSet::new();
        let mut externs = self.externals.clone();

        let mut prefixed;
        let source = if self.with_prolog {
            for (name, replacement) in PROLOG_CONSTANTS {
                constants.insert((*name).to_string(), (*replacement).to_string());
            }
            prefixed = String::from(PROLOG);
            prefixed.push_str(source);
            prefixed.as_str()
        } else {
            source
        };

        let mut lines = preprocess_lines(source, &mut constants)?;
        expand(&mut lines, &mut externs, resolver)?;
        let (mut labels, variable_labels) = collect_labels(&mut lines)?;

        let mut instrs: Vec<Instr> = Vec::with_capacity(lines.len());
        let mut fixups: Vec<Fixup> = Vec::new();
        let mut offsets: Vec<u32> = Vec::with_capacity(lines.len());
        let mut offset = 0u32;

        for line in &lines {
            let index = instrs.len();

            // Scope pseudo-lines: zero-byte records so label indices stay
            // aligned with the instruction sequence.
            if let Some(rest) = line.strip_prefix("addconst ") {
                let (name, replacement) =
                    rest.split_once(',')
                        .ok_or_else(|| TranslationError::BadOperandCombination {
                            detail: "addconst needs NAME,REPLACEMENT".into(),
                            reason: line.clone(),
                        })?;
                let name = name.trim().to_string();
                if constants.contains_key(&name) {
                    return Err(TranslationError::DuplicateConstant {
                        name,
                        reason: line.clone(),
                    });
                }
                removed.remove(&name);
                constants.insert(name, replacement.trim().to_string());
                instrs.push(empty_instr("addconst", line));
                offsets.push(offset);
                continue;
            }
            if let Some(rest) = line.strip_prefix("remconst ") {
                for name in rest.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                    constants.remove(name);
                    removed.insert(name.to_string());
                }
                instrs.push(empty_instr("remconst", line));
                offsets.push(offset);
                continue;
            }

            let mut prefixes = Vec::new();
            let mut text = line.as_str();
            loop {
                let first = text.split(' ').next().unwrap_or("");
                match first {
                    "rep" | "repe" | "repz" => prefixes.push(0xF3),
                    "repne" | "repnz" => prefixes.push(0xF2),
                    _ => break,
                }
                text = text[first.len()..].trim_start();
            }

            let (mnemonic, rest) = match text.split_once(' ') {
                Some((m, rest)) => (m, rest),
                None => (text, ""),
            };
            let ctx = OperandContext {
                constants: &constants,
                removed: &removed,
                externs: &externs,
            };
            let mut operands = Vec::new();
            if !rest.trim().is_empty() {
                for part in rest.split(',') {
                    operands.push(parse_operand(part, &ctx)?);
                }
            }

            let mut instr = Instr {
                mnemonic: mnemonic.to_string(),
                operands,
                prefixes,
                bytes: Vec::new(),
                offset: 0,
                source: line.clone(),
            };
            let encoded = encode_instruction(
                &instr,
                &EncodeContext {
                    labels: &labels,
                    offsets: &offsets,
                    offset,
                    index,
                },
            )?;
            instr.prefixes.extend_from_slice(&encoded.prefixes);
            instr.bytes = encoded.bytes;
            for pending in encoded.fixups {
                fixups.push(Fixup {
                    instr: index,
                    at: pending.at,
                    width: pending.width,
                    kind: pending.kind,
                    label: pending.label,
                });
            }
            offsets.push(offset);
            offset += instr.size() as u32;
            instrs.push(instr);
        }

        let out = linker::resolve(&mut instrs, &mut labels, &variable_labels, &fixups)?;
        Ok(Translation {
            bytes: out.bytes,
            labels: labels
                .values()
                .map(|l| (l.name.clone(), l.offset.unwrap_or(0)))
                .collect(),
            variable_offsets: out.variable_offsets,
            initial_variable_bytes: out.initial_variable_bytes,
        })
    }
}

fn empty_instr(mnemonic: &str, line: &str) -> Instr {
    Instr {
        mnemonic: mnemonic.to_string(),
        operands: Vec::new(),
        prefixes: Vec::new(),
        bytes: Vec::new(),
        offset: 0,
        source: line.to_string(),
    }
}
