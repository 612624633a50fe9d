//! Quote- and nesting-aware string scanning shared by every phase of the parser.
//!
//! All routines work on bytes. Every structural character in MAXI is ASCII, and an
//! ASCII byte never occurs inside a multi-byte UTF-8 sequence, so every index these
//! functions return is a valid `char` boundary of the input.
//!
//! Escape rule: a backslash escapes exactly the next character, both inside and
//! outside of double-quoted runs. Inside a quoted run nothing but `\` and the closing
//! `"` is special.

/// Tracks string, escape and bracket state while walking a byte sequence.
#[derive(Debug, Default, Clone)]
struct Nesting {
    parens: usize,
    brackets: usize,
    braces: usize,
    in_string: bool,
    escaped: bool,
}

impl Nesting {
    fn at_top(&self) -> bool {
        !self.in_string && self.parens == 0 && self.brackets == 0 && self.braces == 0
    }

    /// Feeds one byte and reports whether it sits at top level, outside any string,
    /// and is not consumed by an escape.
    fn feed(&mut self, b: u8) -> bool {
        if self.escaped {
            self.escaped = false;
            return false;
        }
        if b == b'\\' {
            self.escaped = true;
            return false;
        }
        if self.in_string {
            if b == b'"' {
                self.in_string = false;
            }
            return false;
        }
        let top = self.at_top();
        match b {
            b'"' => self.in_string = true,
            b'(' => self.parens += 1,
            b')' => self.parens = self.parens.saturating_sub(1),
            b'[' => self.brackets += 1,
            b']' => self.brackets = self.brackets.saturating_sub(1),
            b'{' => self.braces += 1,
            b'}' => self.braces = self.braces.saturating_sub(1),
            _ => {}
        }
        top
    }
}

/// Splits `text` at every top-level occurrence of `delimiter`.
///
/// Occurrences inside double-quoted strings, or inside any unbalanced `(`, `[` or `{`,
/// are skipped. The three bracket kinds are tracked independently. The result always
/// holds at least one (possibly empty) slice.
pub fn split_top_level(text: &str, delimiter: char) -> Vec<&str> {
    debug_assert!(delimiter.is_ascii());
    let delim = delimiter as u8;
    let mut parts = Vec::new();
    let mut nesting = Nesting::default();
    let mut start = 0;
    for (i, &b) in text.as_bytes().iter().enumerate() {
        if nesting.feed(b) && b == delim {
            parts.push(&text[start..i]);
            start = i + 1;
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Returns the index of the top-level occurrence of `ch`, if any.
///
/// Used to peel off a field's type, default and annotation segments so that an
/// operator like `>=` inside a constraint group is never taken for a default.
pub fn first_top_level_char(text: &str, ch: char) -> Option<usize> {
    debug_assert!(ch.is_ascii());
    let target = ch as u8;
    let mut nesting = Nesting::default();
    text.as_bytes()
        .iter()
        .enumerate()
        .find(|(_, &b)| nesting.feed(b) && b == target)
        .map(|(i, _)| i)
}

/// Returns the index of the `close` matching the `open` at `open_index`.
///
/// Only the given pair is counted; other bracket kinds are ignored. Quotes and escapes
/// are honored. `None` when the group never closes or `open_index` does not point at
/// `open`.
pub fn match_group(text: &str, open_index: usize, open: char, close: char) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(open_index) != Some(&(open as u8)) {
        return None;
    }
    let (open, close) = (open as u8, close as u8);
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(open_index) {
        if escaped {
            escaped = false;
            continue;
        }
        if b == b'\\' {
            escaped = true;
            continue;
        }
        if in_string {
            if b == b'"' {
                in_string = false;
            }
            continue;
        }
        if b == b'"' {
            in_string = true;
        } else if b == open {
            depth += 1;
        } else if b == close {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Returns the index of the `)` matching the `(` at `open_index`.
pub fn match_paren(text: &str, open_index: usize) -> Option<usize> {
    match_group(text, open_index, '(', ')')
}

/// Finds the end of a record whose `(` sits at `open_index`.
///
/// Parens, brackets and braces are matched against each other as a stack; a closer
/// that does not match the innermost opener is ignored. Returns the index of the
/// closing `)` together with the number of newlines crossed on the way.
pub fn find_record_end(text: &str, open_index: usize) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    if bytes.get(open_index) != Some(&b'(') {
        return None;
    }
    let mut stack: Vec<u8> = Vec::new();
    let mut newlines = 0;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(open_index) {
        if b == b'\n' {
            newlines += 1;
        }
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' => escaped = true,
            b'"' => in_string = !in_string,
            _ if in_string => {}
            b'(' => stack.push(b')'),
            b'[' => stack.push(b']'),
            b'{' => stack.push(b'}'),
            b')' | b']' | b'}' if stack.last() == Some(&b) => {
                stack.pop();
                if stack.is_empty() {
                    return Some((i, newlines));
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits a trailing balanced `open ... close` group off `text`.
///
/// Trailing whitespace is ignored. On success returns the text before the group and
/// the group's inner content.
pub fn extract_trailing_group(text: &str, open: char, close: char) -> Option<(&str, &str)> {
    let trimmed = text.trim_end();
    let last = trimmed.len().checked_sub(1)?;
    if trimmed.as_bytes()[last] != close as u8 {
        return None;
    }
    let mut nesting = Nesting::default();
    for (i, &b) in trimmed.as_bytes().iter().enumerate() {
        if nesting.feed(b) && b == open as u8 && match_group(trimmed, i, open, close) == Some(last)
        {
            return Some((&trimmed[..i], &trimmed[i + 1..last]));
        }
    }
    None
}

/// Resolves the backslash escapes of a quoted string body.
///
/// `\n`, `\r` and `\t` become control characters; any other escaped character is
/// kept literally, which covers `\"` and `\\`.
pub fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Escapes `\`, `"`, and the newline, carriage return and tab control characters.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

/// Returns the unescaped body when `text` is a complete double-quoted literal.
pub fn unquote(text: &str) -> Option<String> {
    let t = text.trim();
    if t.len() >= 2 && t.starts_with('"') && t.ends_with('"') {
        Some(unescape(&t[1..t.len() - 1]))
    } else {
        None
    }
}

/// Body of a double-quoted regex. Only `\"` is unescaped; every other backslash
/// sequence belongs to the regex and is kept as written.
pub fn unquote_pattern(text: &str) -> Option<String> {
    let t = text.trim();
    if t.len() < 2 || !t.starts_with('"') || !t.ends_with('"') {
        return None;
    }
    let mut out = String::with_capacity(t.len());
    let mut chars = t[1..t.len() - 1].chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    Some(out)
}

/// Writes a regex as a double-quoted literal. Quotes, escaped or not, become
/// `\x22` so the literal reads back as the same regex.
pub fn quote_pattern(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 2);
    out.push('"');
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\x22"),
            '\\' => match chars.next() {
                Some('"') => out.push_str("\\x22"),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            },
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

pub fn is_identifier_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

pub fn is_identifier_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

/// Letter or underscore first, then letters, digits, `-` or `_`.
pub fn is_identifier(text: &str) -> bool {
    let bytes = text.as_bytes();
    match bytes.split_first() {
        Some((&first, rest)) => {
            is_identifier_start(first) && rest.iter().all(|&b| is_identifier_continue(b))
        }
        None => false,
    }
}

/// Byte offset of `part` inside `whole`. `part` must be a subslice of `whole`.
pub(crate) fn offset_in(whole: &str, part: &str) -> usize {
    (part.as_ptr() as usize).saturating_sub(whole.as_ptr() as usize)
}
