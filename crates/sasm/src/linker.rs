//! Layout, label resolution, and deferred patching.
//!
//! Two sweeps, in order: first every instruction's byte offset is assigned
//! as the running sum of its predecessors' prefix + bytecode lengths and
//! labels inherit the offset of the instruction they precede; then the
//! ordered fixup list is drained, overwriting each placeholder with either
//! the label's absolute byte offset or the PC-relative displacement
//! `label.offset - instruction_end`. Finally the per-instruction buffers
//! are concatenated and the data-variable tables are recorded.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use crate::error::TranslationError;
use crate::ir::{Fixup, FixupKind, FixupWidth, Instr, Label};

/// What the linker hands back: the flat buffer plus the variable tables.
#[derive(Debug, Default)]
pub(crate) struct LinkOutput {
    /// Concatenated prefixes + bytecode, in instruction order.
    pub bytes: Vec<u8>,
    /// Variable-label name → starting byte offset.
    pub variable_offsets: BTreeMap<String, u32>,
    /// Byte offset → initial bytes of the `store*` at that offset.
    pub initial_variable_bytes: BTreeMap<u32, Vec<u8>>,
}

/// Assign offsets, resolve labels, drain fixups, and emit the buffer.
pub(crate) fn resolve(
    instrs: &mut [Instr],
    labels: &mut BTreeMap<String, Label>,
    variable_labels: &[String],
    fixups: &[Fixup],
) -> Result<LinkOutput, TranslationError> {
    // Sweep 1: byte offsets as the running size sum.
    let mut offset = 0u32;
    for instr in instrs.iter_mut() {
        instr.offset = offset;
        offset += instr.size() as u32;
    }
    let total = offset;

    // Labels inherit the offset of the instruction they precede; a label
    // after the last instruction points at the end of the buffer.
    for label in labels.values_mut() {
        label.offset = Some(match instrs.get(label.instruction_index) {
            Some(instr) => instr.offset,
            None => total,
        });
    }

    // Sweep 2: drain the fixup list in registration order.
    for fixup in fixups {
        let instr = &instrs[fixup.instr];
        let target = labels
            .get(&fixup.label)
            .and_then(|l| l.offset)
            .ok_or_else(|| TranslationError::UndefinedLabel {
                name: fixup.label.clone(),
                reason: instr.source.clone(),
            })?;
        let value = match fixup.kind {
            FixupKind::Absolute => i64::from(target),
            FixupKind::Relative => {
                i64::from(target) - i64::from(instr.offset) - instr.size() as i64
            }
        };
        let instr = &mut instrs[fixup.instr];
        match fixup.width {
            FixupWidth::Dword => {
                let bytes = (value as i32).to_le_bytes();
                instr.bytes[fixup.at..fixup.at + 4].copy_from_slice(&bytes);
            }
            FixupWidth::Byte => {
                if !(-128..=127).contains(&value) {
                    return Err(TranslationError::BadImmediate {
                        value,
                        bits: 8,
                        reason: instr.source.clone(),
                    });
                }
                instr.bytes[fixup.at] = value as i8 as u8;
            }
        }
    }

    let mut out = LinkOutput::default();
    for name in variable_labels {
        if let Some(offset) = labels.get(name).and_then(|l| l.offset) {
            out.variable_offsets.insert(name.clone(), offset);
        }
    }
    for instr in instrs.iter() {
        if instr.mnemonic.starts_with("store") {
            out.initial_variable_bytes
                .insert(instr.offset, instr.bytes.clone());
        }
    }

    out.bytes.reserve(total as usize);
    for instr in instrs.iter() {
        out.bytes.extend_from_slice(&instr.prefixes);
        out.bytes.extend_from_slice(&instr.bytes);
    }
    debug_assert_eq!(out.bytes.len(), total as usize);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;

    fn instr(mnemonic: &str, prefixes: Vec<u8>, bytes: Vec<u8>) -> Instr {
        Instr {
            mnemonic: mnemonic.into(),
            operands: Vec::new(),
            prefixes,
            bytes,
            offset: 0,
            source: mnemonic.into(),
        }
    }

    fn label(name: &str, index: usize) -> (String, Label) {
        (
            name.to_string(),
            Label {
                name: name.to_string(),
                instruction_index: index,
                offset: None,
            },
        )
    }

    #[test]
    fn offsets_are_running_size_sums() {
        let mut instrs = vec![
            instr("nop", vec![], vec![0x90]),
            instr("mov", vec![0x66], vec![0x89, 0xD8]),
            instr("ret", vec![], vec![0xC3]),
        ];
        let mut labels = BTreeMap::new();
        let out = resolve(&mut instrs, &mut labels, &[], &[]).unwrap();
        assert_eq!(instrs[0].offset, 0);
        assert_eq!(instrs[1].offset, 1);
        assert_eq!(instrs[2].offset, 4);
        assert_eq!(out.bytes, vec![0x90, 0x66, 0x89, 0xD8, 0xC3]);
    }

    #[test]
    fn absolute_fixup_writes_label_offset() {
        let mut instrs = vec![
            instr("nop", vec![], vec![0x90]),
            instr("push", vec![], vec![0x68, 0, 0, 0, 0]),
            instr("storeb", vec![], vec![0x41]),
        ];
        let mut labels: BTreeMap<String, Label> = [label("v", 2)].into_iter().collect();
        let fixups = vec![Fixup {
            instr: 1,
            at: 1,
            width: FixupWidth::Dword,
            kind: FixupKind::Absolute,
            label: "v".into(),
        }];
        let out = resolve(&mut instrs, &mut labels, &[], &fixups).unwrap();
        assert_eq!(out.bytes[2..6], [6, 0, 0, 0]);
    }

    #[test]
    fn relative_fixup_subtracts_instruction_end() {
        // jmp to self: label at instruction 0, displacement -2.
        let mut instrs = vec![instr("jmp", vec![], vec![0xEB, 0])];
        let mut labels: BTreeMap<String, Label> = [label("l", 0)].into_iter().collect();
        let fixups = vec![Fixup {
            instr: 0,
            at: 1,
            width: FixupWidth::Byte,
            kind: FixupKind::Relative,
            label: "l".into(),
        }];
        let out = resolve(&mut instrs, &mut labels, &[], &fixups).unwrap();
        assert_eq!(out.bytes, vec![0xEB, 0xFE]);
    }

    #[test]
    fn trailing_label_points_past_the_end() {
        let mut instrs = vec![instr("nop", vec![], vec![0x90])];
        let mut labels: BTreeMap<String, Label> = [label("end", 1)].into_iter().collect();
        resolve(&mut instrs, &mut labels, &[], &[]).unwrap();
        assert_eq!(labels["end"].offset, Some(1));
    }

    #[test]
    fn undefined_label_errors() {
        let mut instrs = vec![instr("jmp", vec![], vec![0xE9, 0, 0, 0, 0])];
        let mut labels = BTreeMap::new();
        let fixups = vec![Fixup {
            instr: 0,
            at: 1,
            width: FixupWidth::Dword,
            kind: FixupKind::Relative,
            label: "nowhere".into(),
        }];
        let err = resolve(&mut instrs, &mut labels, &[], &fixups).unwrap_err();
        assert!(matches!(err, TranslationError::UndefinedLabel { .. }));
    }

    #[test]
    fn byte_fixup_out_of_range_errors() {
        let mut instrs = vec![
            instr("loop", vec![], vec![0xE2, 0]),
            instr("big", vec![], vec![0; 200]),
        ];
        let mut labels: BTreeMap<String, Label> = [label("far", 2)].into_iter().collect();
        let fixups = vec![Fixup {
            instr: 0,
            at: 1,
            width: FixupWidth::Byte,
            kind: FixupKind::Relative,
            label: "far".into(),
        }];
        let err = resolve(&mut instrs, &mut labels, &[], &fixups).unwrap_err();
        assert!(matches!(err, TranslationError::BadImmediate { bits: 8, .. }));
    }

    #[test]
    fn variable_tables_are_recorded() {
        let mut instrs = vec![
            instr("nop", vec![], vec![0x90]),
            instr("storeb", vec![], vec![0x41]),
            instr("storew", vec![], vec![0x34, 0x12]),
        ];
        let mut labels: BTreeMap<String, Label> = [label("v", 1)].into_iter().collect();
        let vars = vec!["v".to_string()];
        let out = resolve(&mut instrs, &mut labels, &vars, &[]).unwrap();
        assert_eq!(out.variable_offsets["v"], 1);
        assert_eq!(out.initial_variable_bytes[&1], vec![0x41]);
        assert_eq!(out.initial_variable_bytes[&2], vec![0x34, 0x12]);
    }
}
