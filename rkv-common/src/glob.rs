//! # Glob Patterns
//!
//! Purpose: Build and evaluate the glob patterns used by `SCAN ... MATCH`.
//!
//! ## Design Principles
//! 1. **Store-Compatible**: Same metacharacters as Redis MATCH: `*`, `?`,
//!    `[...]` (with `^` negation and `a-z` ranges) and `\` escapes.
//! 2. **Literal Values**: Caller-supplied values are escaped so a value such as
//!    `a*` only ever matches itself.
//! 3. **Allocation-Free Matching**: Iterative matcher with single-star backtracking.

/// Wildcard token standing in for one unknown key segment.
pub const WILDCARD: &str = "*";

/// Characters that carry meaning inside a glob pattern.
pub const METACHARS: [char; 5] = ['*', '?', '[', ']', '\\'];

/// Escapes glob metacharacters so `value` matches literally.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if METACHARS.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Returns true when `text` matches `pattern`.
pub fn matches(pattern: &[u8], text: &[u8]) -> bool {
    let mut p = 0;
    let mut t = 0;
    // Position just after the last `*` and the text index it is anchored at.
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() {
            match pattern[p] {
                b'*' => {
                    star = Some((p + 1, t));
                    p += 1;
                    continue;
                }
                b'?' => {
                    p += 1;
                    t += 1;
                    continue;
                }
                b'[' => match match_class(pattern, p, text[t]) {
                    Some((true, next)) => {
                        p = next;
                        t += 1;
                        continue;
                    }
                    Some((false, _)) => {}
                    // Unterminated class: treat `[` literally.
                    None => {
                        if text[t] == b'[' {
                            p += 1;
                            t += 1;
                            continue;
                        }
                    }
                },
                b'\\' if p + 1 < pattern.len() => {
                    if pattern[p + 1] == text[t] {
                        p += 2;
                        t += 1;
                        continue;
                    }
                }
                literal => {
                    if literal == text[t] {
                        p += 1;
                        t += 1;
                        continue;
                    }
                }
            }
        }

        match star {
            Some((star_p, star_t)) => {
                p = star_p;
                t = star_t + 1;
                star = Some((star_p, star_t + 1));
            }
            None => return false,
        }
    }

    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }
    p == pattern.len()
}

/// Evaluates the class starting at `pattern[start] == b'['` against `ch`.
///
/// Returns the match result and the index just past the closing `]`, or `None`
/// when the class is never closed.
fn match_class(pattern: &[u8], start: usize, ch: u8) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negate = pattern.get(i) == Some(&b'^');
    if negate {
        i += 1;
    }

    let mut matched = false;
    loop {
        let b = *pattern.get(i)?;
        if b == b']' {
            break;
        }
        if b == b'\\' && i + 1 < pattern.len() {
            if pattern[i + 1] == ch {
                matched = true;
            }
            i += 2;
            continue;
        }
        if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
            let (mut lo, mut hi) = (b, pattern[i + 2]);
            if lo > hi {
                std::mem::swap(&mut lo, &mut hi);
            }
            if ch >= lo && ch <= hi {
                matched = true;
            }
            i += 3;
            continue;
        }
        if b == ch {
            matched = true;
        }
        i += 1;
    }

    Some((matched != negate, i + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(pattern: &str, text: &str) -> bool {
        matches(pattern.as_bytes(), text.as_bytes())
    }

    #[test]
    fn star_matches_any_run() {
        assert!(m("*", ""));
        assert!(m("*", "anything"));
        assert!(m("users:*:eu", "users:42:eu"));
        assert!(m("users:*:eu", "users::eu"));
        assert!(!m("users:*:eu", "users:42:us"));
        assert!(m("a*b*c", "aXXbYYc"));
        assert!(!m("a*b*c", "aXXbYY"));
    }

    #[test]
    fn question_mark_matches_one() {
        assert!(m("k?y", "key"));
        assert!(!m("k?y", "ky"));
    }

    #[test]
    fn classes_and_ranges() {
        assert!(m("h[ae]llo", "hello"));
        assert!(!m("h[ae]llo", "hillo"));
        assert!(m("h[^e]llo", "hallo"));
        assert!(!m("h[^e]llo", "hello"));
        assert!(m("h[a-b]llo", "hbllo"));
        assert!(m("h[b-a]llo", "hallo"));
        assert!(m("h[llo", "h[llo"));
    }

    #[test]
    fn escaped_values_match_literally() {
        let value = "a*b?[c]\\";
        let pattern = format!("ns:{}:*", escape(value));
        assert!(m(&pattern, "ns:a*b?[c]\\:tail"));
        assert!(!m(&pattern, "ns:aXXb?[c]\\:tail"));
        assert_eq!(escape("plain"), "plain");
    }
}
