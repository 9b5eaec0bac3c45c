use std::borrow::Cow;
use std::ops::Range;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const ELLIPSIS: &str = "...";
const ELLIPSIS_WIDTH: usize = 3;

/// Byte ranges of every case-insensitive, non-overlapping occurrence of the
/// trimmed `query` in `text`.
///
/// Returns an empty list for a blank query. Matching is done per character
/// with simple lowercase folding, so the ranges always fall on `char`
/// boundaries of the original text.
pub fn match_ranges(text: &str, query: &str) -> Vec<Range<usize>> {
    let needle: Vec<char> = query.trim().chars().flat_map(char::to_lowercase).collect();
    if needle.is_empty() {
        return Vec::new();
    }

    // (byte offset, folded char) for every folded char of the text
    let folded: Vec<(usize, char)> = text
        .char_indices()
        .flat_map(|(idx, c)| c.to_lowercase().map(move |l| (idx, l)))
        .collect();

    let mut ranges = Vec::new();
    let mut i = 0;
    while i + needle.len() <= folded.len() {
        let window = &folded[i..i + needle.len()];
        if window.iter().map(|(_, c)| *c).eq(needle.iter().copied()) {
            let start = window[0].0;
            let end = folded
                .get(i + needle.len())
                .map_or(text.len(), |(idx, _)| *idx);
            // A multi-char fold split across the boundary would yield end <= start
            if end > start {
                ranges.push(start..end);
            }
            i += needle.len();
        } else {
            i += 1;
        }
    }
    ranges
}

/// Wrap every match of `query` in `text` with `open`/`close` markers.
pub fn highlight<'a>(text: &'a str, query: &str, open: &str, close: &str) -> Cow<'a, str> {
    let ranges = match_ranges(text, query);
    if ranges.is_empty() {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + ranges.len() * (open.len() + close.len()));
    let mut last = 0;
    for range in ranges {
        out.push_str(&text[last..range.start]);
        out.push_str(open);
        out.push_str(&text[range.clone()]);
        out.push_str(close);
        last = range.end;
    }
    out.push_str(&text[last..]);
    Cow::Owned(out)
}

/// Truncate `s` to at most `max_width` terminal columns, appending "..." when
/// something was cut. Widths of 3 or less are filled without an ellipsis.
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if UnicodeWidthStr::width(s) <= max_width {
        return Cow::Borrowed(s);
    }

    let (budget, suffix) = if max_width <= ELLIPSIS_WIDTH {
        (max_width, "")
    } else {
        (max_width - ELLIPSIS_WIDTH, ELLIPSIS)
    };

    let mut width = 0;
    let mut end = 0;
    for (idx, c) in s.char_indices() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if width + w > budget {
            break;
        }
        width += w;
        end = idx + c.len_utf8();
    }

    Cow::Owned(format!("{}{}", &s[..end], suffix))
}

fn is_stripped_control(c: char) -> bool {
    c.is_control() && !matches!(c, '\t' | '\n' | '\r')
}

/// Remove ANSI escape sequences and control characters (except tab, newline
/// and carriage return) from upstream text before it reaches a terminal.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped_control) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            match chars.peek() {
                // CSI: ESC [ ... final byte in 0x40..=0x7e
                Some('[') => {
                    chars.next();
                    for c in chars.by_ref() {
                        if ('\x40'..='\x7e').contains(&c) {
                            break;
                        }
                    }
                }
                // OSC: ESC ] ... BEL or ESC \
                Some(']') => {
                    chars.next();
                    while let Some(c) = chars.next() {
                        if c == '\x07' {
                            break;
                        }
                        if c == '\x1b' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            }
        } else if !is_stripped_control(c) {
            out.push(c);
        }
    }
    Cow::Owned(out)
}
