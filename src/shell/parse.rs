//! Quote-aware splitting and tokenizing of command lines.
//!
//! Double quotes understand `\n`, `\t`, `\\`, `\"` and `\$`; single quotes
//! are literal. Operators (`;`, `|`, `>`, `&`) only count outside quotes.

use std::path::PathBuf;

use crate::error::{ShellError, ShellResult};

/// Output redirection parsed from the end of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub path: PathBuf,
    pub append: bool,
}

/// A word of a line kept in its raw form for expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    /// Whitespace or operator characters, copied through unchanged.
    Gap(String),
    /// A word: `raw` as typed, `text` with quotes removed.
    Word {
        raw: String,
        text: String,
        quoted: bool,
    },
}

fn unterminated() -> ShellError {
    ShellError::Parse("unterminated quote".into())
}

/// Byte offsets of `target` where it appears outside quotes and escapes.
fn unquoted_positions(line: &str, target: char) -> ShellResult<Vec<usize>> {
    let mut positions = Vec::new();
    let mut quote: Option<char> = None;
    let mut chars = line.char_indices();

    while let Some((i, c)) = chars.next() {
        match (quote, c) {
            (Some('\''), '\'') => quote = None,
            (Some('\''), _) => {}
            (_, '\\') => {
                chars.next();
            }
            (Some('"'), '"') => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, c) if c == target => positions.push(i),
            (None, _) => {}
        }
    }

    if quote.is_some() {
        return Err(unterminated());
    }
    Ok(positions)
}

/// Split on every unquoted `sep`. Segments are trimmed but not filtered.
pub fn split_unquoted(line: &str, sep: char) -> ShellResult<Vec<String>> {
    let mut parts = Vec::new();
    let mut start = 0;
    for pos in unquoted_positions(line, sep)? {
        parts.push(line[start..pos].trim().to_string());
        start = pos + sep.len_utf8();
    }
    parts.push(line[start..].trim().to_string());
    Ok(parts)
}

/// Split a line into `;`-separated stages, dropping empty ones.
pub fn split_sequence(line: &str) -> ShellResult<Vec<String>> {
    Ok(split_unquoted(line, ';')?
        .into_iter()
        .filter(|stage| !stage.is_empty())
        .collect())
}

/// Split a stage into `|`-separated segments. Empty segments are an error.
pub fn split_pipeline(stage: &str) -> ShellResult<Vec<String>> {
    let segments = split_unquoted(stage, '|')?;
    if segments.len() > 1 && segments.iter().any(String::is_empty) {
        return Err(ShellError::Parse("empty pipeline segment".into()));
    }
    Ok(segments)
}

/// Strip a trailing unquoted `&`, reporting whether one was present.
pub fn strip_background(stage: &str) -> ShellResult<(String, bool)> {
    let trimmed = stage.trim_end();
    let positions = unquoted_positions(trimmed, '&')?;
    match positions.last() {
        Some(&pos) if pos + 1 == trimmed.len() => {
            Ok((trimmed[..pos].trim_end().to_string(), true))
        }
        _ => Ok((trimmed.to_string(), false)),
    }
}

/// Split `cmd > path` or `cmd >> path` into the command and the redirect.
pub fn parse_redirect(segment: &str) -> ShellResult<(String, Option<Redirect>)> {
    let positions = unquoted_positions(segment, '>')?;
    let Some(&first) = positions.first() else {
        return Ok((segment.to_string(), None));
    };

    let append = positions.get(1) == Some(&(first + 1));
    let consumed = if append { 2 } else { 1 };
    if positions.len() > consumed {
        return Err(ShellError::Parse("multiple redirections".into()));
    }

    let target = &segment[first + consumed..];
    let path = match tokenize(target)?.as_slice() {
        [path] if !path.is_empty() => PathBuf::from(path),
        [] => return Err(ShellError::Parse("missing redirect target".into())),
        _ => return Err(ShellError::Parse("redirect target must be a single word".into())),
    };

    Ok((
        segment[..first].trim().to_string(),
        Some(Redirect { path, append }),
    ))
}

/// Split into words, removing quotes and resolving escapes.
pub fn tokenize(input: &str) -> ShellResult<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => return Err(unterminated()),
                    }
                }
            }
            '"' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => current.push('\n'),
                            Some('t') => current.push('\t'),
                            Some(ch @ ('\\' | '"' | '$')) => current.push(ch),
                            Some(ch) => {
                                current.push('\\');
                                current.push(ch);
                            }
                            None => return Err(unterminated()),
                        },
                        Some(ch) => current.push(ch),
                        None => return Err(unterminated()),
                    }
                }
            }
            '\\' => {
                in_token = true;
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                in_token = true;
                current.push(c);
            }
        }
    }

    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Split a line into words and the gaps between them, keeping the raw text
/// so the line can be rebuilt after words are substituted.
pub fn pieces(line: &str) -> ShellResult<Vec<Piece>> {
    fn is_gap(c: char) -> bool {
        c.is_whitespace() || matches!(c, ';' | '|' | '>' | '&')
    }

    let mut pieces = Vec::new();
    let mut raw = String::new();
    let mut gap = String::new();
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    let flush_word = |raw: &mut String, pieces: &mut Vec<Piece>| -> ShellResult<()> {
        if raw.is_empty() {
            return Ok(());
        }
        let word = std::mem::take(raw);
        let text = tokenize(&word)?.into_iter().next().unwrap_or_default();
        let quoted = word.contains(['"', '\'']);
        pieces.push(Piece::Word {
            raw: word,
            text,
            quoted,
        });
        Ok(())
    };

    while let Some(c) = chars.next() {
        if quote.is_none() && is_gap(c) {
            flush_word(&mut raw, &mut pieces)?;
            gap.push(c);
            continue;
        }
        if !gap.is_empty() {
            pieces.push(Piece::Gap(std::mem::take(&mut gap)));
        }
        raw.push(c);
        match (quote, c) {
            (Some('\''), '\'') => quote = None,
            (Some('\''), _) => {}
            (_, '\\') => {
                if let Some(next) = chars.next() {
                    raw.push(next);
                }
            }
            (Some('"'), '"') => quote = None,
            (None, '"' | '\'') => quote = Some(c),
            _ => {}
        }
    }

    if quote.is_some() {
        return Err(unterminated());
    }
    flush_word(&mut raw, &mut pieces)?;
    if !gap.is_empty() {
        pieces.push(Piece::Gap(gap));
    }
    Ok(pieces)
}

/// Double-quote `text` so that [`tokenize`] reads it back as one word.
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '$' => out.push_str("\\$"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_quotes() {
        assert_eq!(
            tokenize(r#"print "a b" 'c d' e"#).unwrap(),
            vec!["print", "a b", "c d", "e"]
        );
        assert_eq!(tokenize(r#""x\ty\n\"q\"""#).unwrap(), vec!["x\ty\n\"q\""]);
        assert_eq!(tokenize(r"'no \n escapes'").unwrap(), vec![r"no \n escapes"]);
        assert_eq!(tokenize(r#"a"b c"d"#).unwrap(), vec!["ab cd"]);
        assert_eq!(tokenize(r#""""#).unwrap(), vec![""]);
        assert!(tokenize("   ").unwrap().is_empty());
    }

    #[test]
    fn test_tokenize_unterminated() {
        assert!(matches!(tokenize("\"open"), Err(ShellError::Parse(_))));
        assert!(matches!(tokenize("'open"), Err(ShellError::Parse(_))));
    }

    #[test]
    fn test_split_sequence_respects_quotes() {
        assert_eq!(
            split_sequence(r#"print a; print "b;c" ;; print 'd;e';"#).unwrap(),
            vec!["print a", r#"print "b;c""#, "print 'd;e'"]
        );
    }

    #[test]
    fn test_split_pipeline() {
        assert_eq!(
            split_pipeline("print x | grep x").unwrap(),
            vec!["print x", "grep x"]
        );
        assert_eq!(split_pipeline(r#"print "a|b""#).unwrap(), vec![r#"print "a|b""#]);
        assert!(matches!(
            split_pipeline("print x | | grep x"),
            Err(ShellError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_redirect() {
        let (cmd, redirect) = parse_redirect("print hi > out.txt").unwrap();
        assert_eq!(cmd, "print hi");
        assert_eq!(
            redirect,
            Some(Redirect {
                path: PathBuf::from("out.txt"),
                append: false
            })
        );

        let (cmd, redirect) = parse_redirect("print hi >> 'my log'").unwrap();
        assert_eq!(cmd, "print hi");
        let redirect = redirect.unwrap();
        assert!(redirect.append);
        assert_eq!(redirect.path, PathBuf::from("my log"));

        let (cmd, redirect) = parse_redirect(r#"print "a > b""#).unwrap();
        assert_eq!(cmd, r#"print "a > b""#);
        assert!(redirect.is_none());
    }

    #[test]
    fn test_parse_redirect_errors() {
        assert!(parse_redirect("print >").is_err());
        assert!(parse_redirect("print > a b").is_err());
        assert!(parse_redirect("print > a > b").is_err());
    }

    #[test]
    fn test_strip_background() {
        assert_eq!(
            strip_background("sleep 100 &").unwrap(),
            ("sleep 100".to_string(), true)
        );
        assert_eq!(
            strip_background("print '&'").unwrap(),
            ("print '&'".to_string(), false)
        );
        assert_eq!(
            strip_background("print a&b").unwrap(),
            ("print a&b".to_string(), false)
        );
    }

    #[test]
    fn test_pieces_rebuild_line() {
        let line = r#"print  "$x y";grep -v 'z'"#;
        let pieces = pieces(line).unwrap();
        let rebuilt: String = pieces
            .iter()
            .map(|p| match p {
                Piece::Gap(g) => g.as_str(),
                Piece::Word { raw, .. } => raw.as_str(),
            })
            .collect();
        assert_eq!(rebuilt, line);
        assert!(pieces.contains(&Piece::Word {
            raw: r#""$x y""#.into(),
            text: "$x y".into(),
            quoted: true,
        }));
        assert!(pieces.contains(&Piece::Gap(";".into())));
    }

    #[test]
    fn test_quote_reads_back() {
        for text in ["plain", "two words", "a \"q\" \\ $x", "line\nbreak", ""] {
            assert_eq!(tokenize(&quote(text)).unwrap(), vec![text]);
        }
    }
}
