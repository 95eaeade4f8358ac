//! Source preprocessing: line normalization, constants, and the structural
//! expander that lowers the dialect's higher-level forms onto primitive
//! instructions.
//!
//! The pipeline works on a mutable line list. The line pass normalizes
//! case and whitespace, installs `equ` constants, and expands the fixed
//! `asmret` epilog. The structural pass then rewrites `extern`, data
//! directives, `proc`/`local`/`endp`, `invoke`, `addr`, and extern calls in
//! source order, splicing replacement lines in place. A final label pass
//! strips `name:` lines, assigning each label the index of the instruction
//! it precedes.

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::error::TranslationError;
use crate::ir::Label;
use crate::numeric::{is_hexish_name, parse_literal};
use crate::translator::LibraryResolver;

/// The fixed prolog prepended when the caller requests one. It saves the
/// caller's flags and `eax`, establishes `ebp`, stashes the entry return
/// address into the `$return` slot, and saves the remaining registers.
pub(crate) const PROLOG: &str = "\
pushf
push eax
push ebp
mov ebp, esp
mov eax, [ebp+0ch]
mov [ebp+28h], eax
push ebx
push ecx
push edx
push esi
push edi
";

/// The fixed epilog `asmret` expands to — the mirror of [`PROLOG`],
/// terminated by `ret`.
pub(crate) const EPILOG: &str = "\
mov eax, [ebp+28h]
mov [ebp+0ch], eax
lea esp, [ebp-14h]
pop edi
pop esi
pop edx
pop ecx
pop ebx
pop ebp
pop eax
popf
ret
";

/// Frame-slot constants installed alongside the prolog.
pub(crate) const PROLOG_CONSTANTS: &[(&str, &str)] = &[
    ("$first", "[ebp+18h]"),
    ("$second", "[ebp+1ch]"),
    ("$this", "[ebp+20h]"),
    ("$return", "[ebp+28h]"),
];

// ─── Line pass ─────────────────────────────────────────────

/// Normalize one raw source line: quote replacement, whitespace collapse,
/// string-aware lowercasing (skipped entirely on ` lib ` lines), comment
/// stripping, trim.
fn normalize_line(raw: &str) -> String {
    let mut collapsed = String::with_capacity(raw.len());
    let mut in_string = false;
    let mut last_space = false;
    for mut c in raw.chars() {
        if c == '\'' {
            c = '"';
        }
        if c == '"' {
            in_string = !in_string;
        }
        if c == '\t' {
            c = ' ';
        }
        if c == ' ' && !in_string {
            if last_space {
                continue;
            }
            last_space = true;
        } else {
            last_space = false;
        }
        collapsed.push(c);
    }

    let preserve_case = collapsed.to_lowercase().contains(" lib ");
    let mut out = String::with_capacity(collapsed.len());
    let mut in_string = false;
    for c in collapsed.chars() {
        if c == '"' {
            in_string = !in_string;
            out.push(c);
            continue;
        }
        if c == ';' && !in_string {
            break;
        }
        if in_string || preserve_case {
            out.push(c);
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out.trim().to_string()
}

/// Run the line pass: normalize every line, fold `equ` constants into
/// `constants`, expand `asmret`, and drop blanks.
pub(crate) fn preprocess_lines(
    source: &str,
    constants: &mut BTreeMap<String, String>,
) -> Result<Vec<String>, TranslationError> {
    let mut out = Vec::new();
    for raw in source.lines() {
        let line = normalize_line(raw);
        if line.is_empty() {
            continue;
        }
        if !line.contains('"') {
            if let Some((name, replacement)) = line.split_once(" equ ") {
                let name = name.trim().to_string();
                if constants.contains_key(&name) {
                    return Err(TranslationError::DuplicateConstant { name, reason: line });
                }
                constants.insert(name, replacement.trim().to_string());
                continue;
            }
        }
        if line == "asmret" {
            out.extend(EPILOG.lines().map(String::from));
            continue;
        }
        out.push(line);
    }
    Ok(out)
}

// ─── Structural expander ───────────────────────────────────

fn bad_local(token: &str, line: &str) -> TranslationError {
    TranslationError::BadLocalSyntax {
        token: token.to_string(),
        reason: line.to_string(),
    }
}

/// Size in bytes of a `dword`/`word` size token.
fn size_token_bytes(token: &str, line: &str) -> Result<u32, TranslationError> {
    match token {
        "dword" => Ok(4),
        "word" => Ok(2),
        other => Err(bad_local(other, line)),
    }
}

/// Split a data value list on commas, honouring strings and `dup` parens.
fn split_values(list: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut current = String::new();
    for c in list.chars() {
        match c {
            '"' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => depth = depth.saturating_sub(1),
            ',' if !in_string && depth == 0 => {
                out.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() {
        out.push(current.trim().to_string());
    }
    out
}

/// Expand one data element into `store*` lines, recursing through `dup`.
fn expand_element(
    store: &str,
    element: &str,
    line: &str,
    out: &mut Vec<String>,
) -> Result<(), TranslationError> {
    let element = element.trim();
    if element.is_empty() {
        return Ok(());
    }

    if let Some(content) = element
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        match store {
            "storeb" => {
                for unit in content.encode_utf16() {
                    out.push(format!("storeb {}", unit as u8));
                }
            }
            "storew" => {
                for unit in content.encode_utf16() {
                    out.push(format!("storew {}", unit));
                }
            }
            _ => {
                return Err(TranslationError::BadOperandCombination {
                    detail: "string initializer is not supported for dd".into(),
                    reason: line.to_string(),
                });
            }
        }
        return Ok(());
    }

    if let Some(pos) = element.find("dup") {
        let (count_text, rest) = element.split_at(pos);
        let rest = rest["dup".len()..].trim();
        let count = parse_literal(count_text.trim()).ok_or_else(|| {
            TranslationError::BadOperandCombination {
                detail: format!("bad dup count `{}`", count_text.trim()),
                reason: line.to_string(),
            }
        })?;
        if count < 0 {
            return Err(TranslationError::BadOperandCombination {
                detail: "negative dup count".into(),
                reason: line.to_string(),
            });
        }
        let inner = rest
            .strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'))
            .ok_or_else(|| TranslationError::BadOperandCombination {
                detail: "dup list must be parenthesized".into(),
                reason: line.to_string(),
            })?;
        for _ in 0..count {
            for value in split_values(inner) {
                expand_element(store, &value, line, out)?;
            }
        }
        return Ok(());
    }

    out.push(format!("{} {}", store, element));
    Ok(())
}

fn store_for(directive: &str) -> Option<&'static str> {
    match directive {
        "db" => Some("storeb"),
        "dw" => Some("storew"),
        "dd" => Some("stored"),
        _ => None,
    }
}

/// Tracks the procedure currently being expanded.
struct ProcFrame {
    args: Vec<String>,
    locals: Vec<String>,
    /// Cumulative size of declared locals.
    shift: u32,
    /// Line index of the `mov ebp, esp` prolog instruction.
    prolog_index: usize,
}

/// Run the structural pass over the line list in source order.
pub(crate) fn expand(
    lines: &mut Vec<String>,
    externs: &mut BTreeMap<String, u32>,
    resolver: &mut dyn LibraryResolver,
) -> Result<(), TranslationError> {
    let mut frame: Option<ProcFrame> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i].clone();
        let first = line.split(' ').next().unwrap_or("");

        // extern NAME lib LIBRARY — case was preserved by the line pass.
        if first.eq_ignore_ascii_case("extern") {
            let tokens: Vec<&str> = line.split(' ').collect();
            if tokens.len() != 4 || !tokens[2].eq_ignore_ascii_case("lib") {
                return Err(TranslationError::BadExternSyntax { reason: line });
            }
            let (name, library) = (tokens[1], tokens[3]);
            let addr = resolver
                .library(library)
                .and_then(|handle| resolver.symbol(handle, name))
                .ok_or_else(|| TranslationError::ExternNotFound {
                    name: name.to_string(),
                    library: library.to_string(),
                    reason: line.clone(),
                })?;
            let key = name.to_lowercase();
            if externs.contains_key(&key) {
                return Err(TranslationError::DuplicateExtern {
                    name: key,
                    reason: line,
                });
            }
            externs.insert(key, addr);
            lines.remove(i);
            continue;
        }

        // Data directive, with or without an inline label.
        let tokens: Vec<&str> = line.splitn(3, ' ').collect();
        let inline_data = store_for(first).map(|s| (None, s, 1));
        let labeled_data = tokens
            .get(1)
            .and_then(|t| store_for(t))
            .map(|s| (Some(tokens[0].trim_end_matches(':')), s, 2));
        if let Some((label, store, skip)) = inline_data.or(labeled_data) {
            let list = tokens.get(skip..).map(|t| t.join(" ")).unwrap_or_default();
            let mut expanded = Vec::new();
            if let Some(label) = label {
                expanded.push(format!("{}:", label));
            }
            for value in split_values(&list) {
                expand_element(store, &value, &line, &mut expanded)?;
            }
            let count = expanded.len();
            lines.splice(i..=i, expanded);
            i += count;
            continue;
        }

        if first == "proc" {
            let rest = line["proc".len()..].trim();
            let (name, arg_list) = match rest.split_once(' ') {
                Some((name, args)) => (name, args),
                None => (rest, ""),
            };
            let mut expanded = Vec::new();
            let mut args = Vec::new();
            let mut offset = 8u32;
            for arg in arg_list.split(',').filter(|a| !a.trim().is_empty()) {
                let (arg_name, size) = arg
                    .trim()
                    .split_once(':')
                    .ok_or_else(|| bad_local(arg.trim(), &line))?;
                expanded.push(format!("addconst {},[ebp+{}]", arg_name.trim(), offset));
                offset += size_token_bytes(size.trim(), &line)?;
                args.push(arg_name.trim().to_string());
            }
            expanded.push(format!("{}:", name));
            expanded.push("push ebp".to_string());
            expanded.push("mov ebp, esp".to_string());
            let count = expanded.len();
            frame = Some(ProcFrame {
                args,
                locals: Vec::new(),
                shift: 0,
                prolog_index: i + count - 1,
            });
            lines.splice(i..=i, expanded);
            i += count;
            continue;
        }

        if first == "local" {
            let rest = line["local".len()..].trim();
            let mut expanded = Vec::new();
            for var in rest.split(',').filter(|v| !v.trim().is_empty()) {
                let (var_name, size) = var
                    .trim()
                    .split_once(':')
                    .ok_or_else(|| bad_local(var.trim(), &line))?;
                let bytes = size_token_bytes(size.trim(), &line)?;
                if let Some(frame) = frame.as_mut() {
                    frame.shift += bytes;
                    frame.locals.push(var_name.trim().to_string());
                    expanded.push(format!(
                        "addconst {},[ebp-{}]",
                        var_name.trim(),
                        frame.shift
                    ));
                } else {
                    return Err(bad_local(var.trim(), &line));
                }
            }
            let count = expanded.len();
            lines.splice(i..=i, expanded);
            i += count;
            continue;
        }

        if line == "endp" {
            let Some(proc) = frame.take() else {
                lines.remove(i);
                continue;
            };
            if proc.shift > 0 {
                lines.insert(proc.prolog_index + 1, format!("sub esp, {}", proc.shift));
                i += 1;
                let mut names = proc.args;
                names.extend(proc.locals);
                lines[i] = format!("remconst {}", names.join(","));
                i += 1;
            } else {
                lines.remove(i);
            }
            continue;
        }

        if matches!(first, "ret" | "retn" | "retf") && frame.is_some() {
            lines.insert(i, "mov esp, ebp".to_string());
            lines.insert(i + 1, "pop ebp".to_string());
            i += 3;
            continue;
        }

        if first == "invoke" {
            let rest = line["invoke".len()..].trim();
            let mut parts = rest.split(',');
            let callee = parts.next().unwrap_or("").trim().to_string();
            let args: Vec<&str> = parts.map(str::trim).collect();
            let mut expanded = Vec::new();
            for arg in args.iter().rev() {
                expanded.push(format!("push {}", arg));
            }
            expanded.push(format!("call {}", callee));
            lines.splice(i..=i, expanded);
            // Re-scan from i: pushed `addr` operands and extern calls still
            // need their own expansion.
            continue;
        }

        if let Some(operand) = line.strip_prefix("push addr ") {
            let operand = operand.trim();
            let expanded = if operand.contains('[') {
                alloc::vec![
                    "push ecx".to_string(),
                    format!("lea ecx, {}", operand),
                    "xchg [esp], ecx".to_string(),
                ]
            } else {
                alloc::vec![
                    "push ecx".to_string(),
                    format!("mov ecx, {}", operand),
                    "add ecx, $this".to_string(),
                    "xchg [esp], ecx".to_string(),
                ]
            };
            let count = expanded.len();
            lines.splice(i..=i, expanded);
            i += count;
            continue;
        }

        if first == "mov" && line.contains(", addr ") {
            let rest = line["mov".len()..].trim();
            if let Some((dst, rhs)) = rest.split_once(',') {
                if let Some(operand) = rhs.trim().strip_prefix("addr ") {
                    let (dst, operand) = (dst.trim(), operand.trim());
                    let expanded = if operand.contains('[') {
                        alloc::vec![format!("lea {}, {}", dst, operand)]
                    } else if externs.contains_key(operand) {
                        alloc::vec![format!("mov {}, {}", dst, operand)]
                    } else {
                        alloc::vec![
                            format!("mov {}, {}", dst, operand),
                            format!("add {}, $this", dst),
                        ]
                    };
                    let count = expanded.len();
                    lines.splice(i..=i, expanded);
                    i += count;
                    continue;
                }
            }
        }

        if first == "call" {
            let callee = line["call".len()..].trim();
            if externs.contains_key(callee) {
                lines.splice(
                    i..=i,
                    [format!("mov ecx, {}", callee), "call ecx".to_string()],
                );
                i += 2;
                continue;
            }
        }

        i += 1;
    }
    Ok(())
}

// ─── Label pass ────────────────────────────────────────────

fn bad_label(name: &str, detail: &str) -> TranslationError {
    TranslationError::BadLabelName {
        name: name.to_string(),
        detail: detail.to_string(),
    }
}

/// Extract label definitions, validate names, classify variable labels,
/// and strip the label lines from the stream.
pub(crate) fn collect_labels(
    lines: &mut Vec<String>,
) -> Result<(BTreeMap<String, Label>, Vec<String>), TranslationError> {
    let mut labels: BTreeMap<String, Label> = BTreeMap::new();
    let mut variable_labels = Vec::new();
    let mut kept = Vec::new();
    let mut pending: Vec<String> = Vec::new();

    for line in lines.drain(..) {
        if let Some(name) = line.strip_suffix(':') {
            let name = name.trim();
            if name.contains('[') || name.contains(']') {
                return Err(bad_label(name, "brackets are not allowed in label names"));
            }
            if is_hexish_name(name) {
                return Err(bad_label(name, "indistinguishable from a numeric literal"));
            }
            if crate::ir::Register::parse(name).is_some() {
                return Err(bad_label(name, "collides with a register name"));
            }
            if labels.contains_key(name) {
                return Err(TranslationError::DuplicateLabel {
                    name: name.to_string(),
                    reason: line.clone(),
                });
            }
            labels.insert(
                name.to_string(),
                Label {
                    name: name.to_string(),
                    instruction_index: kept.len(),
                    offset: None,
                },
            );
            pending.push(name.to_string());
            continue;
        }
        if line.starts_with("storeb") || line.starts_with("storew") || line.starts_with("stored")
        {
            variable_labels.append(&mut pending);
        } else {
            pending.clear();
        }
        kept.push(line);
    }

    *lines = kept;
    Ok((labels, variable_labels))
}
