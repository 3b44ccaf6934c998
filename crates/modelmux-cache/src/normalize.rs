//! Prompt normalization ahead of hashing.
//!
//! Standard mode collapses whitespace runs, strips a configured boilerplate
//! prefix, and lowercases ASCII outside quoted spans (case inside string
//! literals is meaningful, so quoted text is left alone). Aggressive mode
//! additionally strips line comments and triple-quoted blocks; it is opt-in
//! per call.

/// How hard to normalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormalizeMode {
    #[default]
    Standard,
    /// Also strips `//`/`#` line comments and triple-quoted blocks.
    Aggressive,
}

/// Stateless normalizer configured with an optional boilerplate prefix.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    boilerplate_prefix: Option<String>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A declared instruction-boilerplate prefix that is stripped before
    /// hashing when the prompt starts with it.
    pub fn with_boilerplate_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.boilerplate_prefix = Some(prefix.into());
        self
    }

    pub fn normalize(&self, prompt: &str, mode: NormalizeMode) -> String {
        let mut text = prompt.trim_start();
        if let Some(prefix) = &self.boilerplate_prefix {
            if let Some(rest) = text.strip_prefix(prefix.as_str()) {
                text = rest;
            }
        }

        let stripped;
        if mode == NormalizeMode::Aggressive {
            stripped = strip_line_comments(&strip_triple_quoted(text));
            text = &stripped;
        }

        collapse_and_lowercase(text)
    }
}

/// Removes `"""..."""` and `'''...'''` blocks. An unterminated opener is
/// kept verbatim.
fn strip_triple_quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let dq = rest.find("\"\"\"");
        let sq = rest.find("'''");
        let (open, marker) = match (dq, sq) {
            (Some(d), Some(s)) if d <= s => (d, "\"\"\""),
            (Some(d), None) => (d, "\"\"\""),
            (_, Some(s)) => (s, "'''"),
            (None, None) => {
                out.push_str(rest);
                return out;
            }
        };
        out.push_str(&rest[..open]);
        let body = &rest[open + 3..];
        match body.find(marker) {
            Some(close) => rest = &body[close + 3..],
            None => {
                out.push_str(&rest[open..]);
                return out;
            }
        }
    }
}

/// Removes `//` and `#` comments that start a line or follow whitespace,
/// respecting single-line string quotes.
fn strip_line_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        out.push_str(cut_comment(line));
        out.push('\n');
    }
    out
}

fn cut_comment(line: &str) -> &str {
    let mut in_quote: Option<char> = None;
    let mut prev_is_boundary = true;
    let mut prev_char = '\0';
    for (idx, ch) in line.char_indices() {
        if let Some(q) = in_quote {
            if ch == q {
                in_quote = None;
            }
        } else {
            match ch {
                '"' | '\'' | '`' => in_quote = Some(ch),
                '#' if prev_is_boundary => return &line[..idx],
                '/' if prev_char == '/' => return &line[..idx - 1],
                _ => {}
            }
        }
        prev_is_boundary = ch.is_whitespace();
        prev_char = ch;
    }
    line
}

fn collapse_and_lowercase(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_quote: Option<char> = None;
    let mut pending_space = false;
    for ch in text.chars() {
        if let Some(q) = in_quote {
            out.push(ch);
            if ch == q {
                in_quote = None;
            }
            continue;
        }
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        match ch {
            '"' | '\'' | '`' => {
                in_quote = Some(ch);
                out.push(ch);
            }
            _ => out.push(ch.to_ascii_lowercase()),
        }
    }
    out
}
