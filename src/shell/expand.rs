//! Line expansion: aliases, defined variables, then marker words.

use super::context::Invocation;
use super::engine::Shell;
use super::parse::{self, Piece};
use super::vars::VariableStore;
use crate::error::ShellResult;

/// Expand `line` for execution at `depth`.
///
/// 1. An alias matching the first token is substituted once.
/// 2. Every occurrence of a defined variable key is replaced literally,
///    longest key first, invocation scope shadowing process scope.
/// 3. Remaining words starting with the marker resolve through the
///    invocation scope, the process scope, `env:NAME` and `exec:<line>`.
///    Unknown words are left as typed.
pub(crate) fn expand(
    shell: &Shell,
    line: &str,
    invocation: &Invocation,
    depth: usize,
) -> ShellResult<String> {
    let line = expand_alias(shell.vars(), line);
    let line = replace_defined(&line, shell.vars(), invocation);
    expand_words(shell, &line, invocation, depth)
}

fn expand_alias(vars: &VariableStore, line: &str) -> String {
    let trimmed = line.trim_start();
    let end = trimmed
        .find(|c: char| c.is_whitespace() || matches!(c, ';' | '|' | '&' | '>'))
        .unwrap_or(trimmed.len());
    let (first, rest) = trimmed.split_at(end);
    if first.is_empty() {
        return line.to_string();
    }
    match vars.alias(first) {
        Some(replacement) => {
            tracing::trace!(alias = first, %replacement, "expanding alias");
            format!("{replacement}{rest}")
        }
        None => line.to_string(),
    }
}

fn replace_defined(line: &str, vars: &VariableStore, invocation: &Invocation) -> String {
    let marker = vars.marker();
    if !line.contains(marker) {
        return line.to_string();
    }

    let mut defined: Vec<(String, String)> = invocation
        .scope()
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    for (key, value) in vars.variables() {
        if invocation.scope().get(&key).is_none() {
            defined.push((key, value));
        }
    }
    defined.retain(|(key, _)| key.len() > marker.len_utf8());
    defined.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(pos) = rest.find(marker) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match defined.iter().find(|(key, _)| tail.starts_with(key.as_str())) {
            Some((key, value)) => {
                out.push_str(value);
                rest = &tail[key.len()..];
            }
            None => {
                out.push(marker);
                rest = &tail[marker.len_utf8()..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn expand_words(
    shell: &Shell,
    line: &str,
    invocation: &Invocation,
    depth: usize,
) -> ShellResult<String> {
    if !line.contains(shell.vars().marker()) {
        return Ok(line.to_string());
    }

    let mut out = String::with_capacity(line.len());
    for piece in parse::pieces(line)? {
        match piece {
            Piece::Gap(gap) => out.push_str(&gap),
            Piece::Word { raw, text, quoted } => {
                match resolve_word(shell, &text, invocation, depth)? {
                    Some(value) if quoted => out.push_str(&parse::quote(&value)),
                    Some(value) => out.push_str(&value),
                    None => out.push_str(&raw),
                }
            }
        }
    }
    Ok(out)
}

fn resolve_word(
    shell: &Shell,
    word: &str,
    invocation: &Invocation,
    depth: usize,
) -> ShellResult<Option<String>> {
    let Some(name) = word.strip_prefix(shell.vars().marker()) else {
        return Ok(None);
    };

    if let Some(value) = invocation.scope().get(word) {
        return Ok(Some(value.to_string()));
    }
    if let Some(value) = shell.vars().get(word) {
        return Ok(Some(value));
    }
    if let Some(var) = name.strip_prefix("env:") {
        return Ok(Some(invocation.env_var(var).unwrap_or_default()));
    }
    if let Some(command) = name.strip_prefix("exec:") {
        let output = shell.execute(command, invocation, depth + 1)?;
        return Ok(Some(output.trim().to_string()));
    }
    Ok(None)
}
