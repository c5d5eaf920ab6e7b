//! Quote- and comment-aware SQL scanning.
//!
//! Placeholder discovery and statement splitting share one byte-level state
//! machine so a `?` inside a string literal or a `;` inside a comment is
//! never mistaken for syntax.

#[derive(Clone)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    Backtick,
    LineComment,
    BlockComment(u32),
}

/// A placeholder found in SQL text, with its byte span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Placeholder {
    pub start: usize,
    /// One past the last byte of the placeholder.
    pub end: usize,
    pub kind: PlaceholderKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PlaceholderKind {
    /// A bare `?`.
    Anonymous,
    /// `?N`, 1-based.
    Numbered(usize),
    /// `:name`, `@name`, or `$name`; stored including the prefix character.
    Named(String),
}

fn is_line_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes[idx] == b'-' && bytes.get(idx + 1) == Some(&b'-')
}

fn is_block_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes[idx] == b'/' && bytes.get(idx + 1) == Some(&b'*')
}

fn is_block_comment_end(bytes: &[u8], idx: usize) -> bool {
    bytes[idx] == b'*' && bytes.get(idx + 1) == Some(&b'/')
}

fn scan_digits(bytes: &[u8], start: usize) -> Option<(usize, &str)> {
    let mut idx = start;
    while idx < bytes.len() && bytes[idx].is_ascii_digit() {
        idx += 1;
    }
    if idx == start {
        None
    } else {
        std::str::from_utf8(&bytes[start..idx])
            .ok()
            .map(|digits| (idx, digits))
    }
}

fn scan_identifier(bytes: &[u8], start: usize) -> Option<usize> {
    let first = *bytes.get(start)?;
    if !(first.is_ascii_alphabetic() || first == b'_') {
        return None;
    }
    let mut idx = start + 1;
    while idx < bytes.len() && (bytes[idx].is_ascii_alphanumeric() || bytes[idx] == b'_') {
        idx += 1;
    }
    Some(idx)
}

/// Walk `sql` with the shared state machine, invoking `on_token` for each
/// byte reached in normal (non-literal, non-comment) state. The callback may
/// return a new index to skip past a consumed token.
fn walk(sql: &str, mut on_token: impl FnMut(&[u8], usize) -> Option<usize>) {
    let bytes = sql.as_bytes();
    let mut state = State::Normal;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                b'`' => state = State::Backtick,
                _ if is_line_comment_start(bytes, idx) => state = State::LineComment,
                _ if is_block_comment_start(bytes, idx) => state = State::BlockComment(1),
                _ => {
                    if let Some(next) = on_token(bytes, idx) {
                        idx = next;
                        continue;
                    }
                }
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1; // skip escaped quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::Backtick => {
                if b == b'`' {
                    state = State::Normal;
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if is_block_comment_start(bytes, idx) {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if is_block_comment_end(bytes, idx) {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
        }
        idx += 1;
    }
}

/// Find every placeholder in `sql`, in source order.
pub(crate) fn scan_placeholders(sql: &str) -> Vec<Placeholder> {
    let mut found = Vec::new();
    walk(sql, |bytes, idx| match bytes[idx] {
        b'?' => {
            if let Some((end, digits)) = scan_digits(bytes, idx + 1) {
                if let Ok(n) = digits.parse::<usize>() {
                    found.push(Placeholder {
                        start: idx,
                        end,
                        kind: PlaceholderKind::Numbered(n),
                    });
                    return Some(end);
                }
            }
            found.push(Placeholder {
                start: idx,
                end: idx + 1,
                kind: PlaceholderKind::Anonymous,
            });
            Some(idx + 1)
        }
        prefix @ (b':' | b'@' | b'$') => scan_identifier(bytes, idx + 1).map(|end| {
            let text = format!(
                "{}{}",
                prefix as char,
                std::str::from_utf8(&bytes[idx + 1..end]).unwrap_or_default()
            );
            found.push(Placeholder {
                start: idx,
                end,
                kind: PlaceholderKind::Named(text),
            });
            end
        }),
        _ => None,
    });
    found
}

/// Split a multi-statement string on `;` boundaries outside literals and
/// comments, dropping empty fragments.
pub(crate) fn split_statements(sql: &str) -> Vec<&str> {
    let mut boundaries = Vec::new();
    walk(sql, |bytes, idx| {
        if bytes[idx] == b';' {
            boundaries.push(idx);
        }
        None
    });

    let mut statements = Vec::new();
    let mut start = 0;
    for boundary in boundaries.into_iter().chain(std::iter::once(sql.len())) {
        let piece = sql[start..boundary].trim();
        if !piece.is_empty() && has_sql_content(piece) {
            statements.push(piece);
        }
        start = (boundary + 1).min(sql.len());
    }
    statements
}

/// Whether a fragment contains anything besides whitespace and comments.
fn has_sql_content(fragment: &str) -> bool {
    let mut found = false;
    walk(fragment, |bytes, idx| {
        if !bytes[idx].is_ascii_whitespace() {
            found = true;
        }
        None
    });
    found
}
