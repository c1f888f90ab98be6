//! Repairs the citation brackets a model sometimes mangles before they reach
//! [`crate::citation::CitationParser`] (§4.7, §8): markdown-bold wrapping,
//! a malformed id prefix glued onto an otherwise-valid id, a lone `[id]`
//! that should have been `[[id]]`, and runs of the same citation repeated
//! back to back.
//!
//! Composing regexes naively is unsafe here: running a single-bracket
//! pattern like `\[([^\[\]]+)\]` over an already-correct `[[id]]` matches
//! starting mid-string and produces `[[[id]]]`. So beyond the two
//! unambiguous bold-unwrap substitutions, repair is a manual linear scan
//! rather than a regex pipeline.

use once_cell::sync::Lazy;
use regex::Regex;

use kiwi_core::ids::is_valid_public_id;

static BOLD_DOUBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*\[\[([^\[\]]+)\]\]\*\*").expect("valid regex"));
static BOLD_SINGLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*\[([^\[\]]+)\]\*\*").expect("valid regex"));
static TRAILING_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z0-9_-]{21})\s*$").expect("valid regex"));
static CITATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[([A-Za-z0-9_-]{21})\]\]").expect("valid regex"));

/// Normalizes every citation-shaped bracket run in `text` into the canonical
/// `[[<public_id>]]` form. Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
    let unwrapped = BOLD_DOUBLE.replace_all(text, "[[$1]]");
    let unwrapped = BOLD_SINGLE.replace_all(&unwrapped, "[[$1]]");
    let scanned = scan_brackets(&unwrapped);
    collapse_adjacent_duplicates(&scanned)
}

/// The trailing 21-char id inside `s`, if one is present after stripping any
/// malformed prefix a model glued in front of it (e.g. `"xy:abc...89jkl01"`).
fn extract_trailing_id(s: &str) -> Option<String> {
    if is_valid_public_id(s) {
        return Some(s.to_string());
    }
    TRAILING_ID
        .captures(s)
        .map(|c| c[1].to_string())
        .filter(|id| is_valid_public_id(id))
}

fn scan_brackets(text: &str) -> String {
    let bytes = text.as_bytes();
    let len = bytes.len();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < len {
        if bytes[i] != b'[' {
            let ch_len = next_char_len(text, i);
            out.push_str(&text[i..i + ch_len]);
            i += ch_len;
            continue;
        }

        if i + 1 < len && bytes[i + 1] == b'[' {
            match text[i + 2..].find("]]") {
                Some(rel) => {
                    let inner = &text[i + 2..i + 2 + rel];
                    match extract_trailing_id(inner) {
                        Some(id) => out.push_str(&format!("[[{id}]]")),
                        None => out.push_str(&text[i..i + 2 + rel + 2]),
                    }
                    i += 2 + rel + 2;
                }
                None => {
                    out.push_str(&text[i..]);
                    break;
                }
            }
            continue;
        }

        match find_close(text, i + 1) {
            Some(k) => {
                if text[k + 1..].starts_with('(') {
                    // Markdown link `[text](url)`: pass through untouched.
                    match text[k + 1..].find(')') {
                        Some(rel) => {
                            let end = k + 1 + rel + 1;
                            out.push_str(&text[i..end]);
                            i = end;
                        }
                        None => {
                            out.push_str(&text[i..]);
                            i = len;
                        }
                    }
                } else {
                    let inner = &text[i + 1..k];
                    match extract_trailing_id(inner) {
                        Some(id) => out.push_str(&format!("[[{id}]]")),
                        None => out.push_str(&text[i..k + 1]),
                    }
                    i = k + 1;
                }
            }
            None => {
                out.push(text[i..].chars().next().unwrap());
                i += 1;
            }
        }
    }

    out
}

fn find_close(text: &str, from: usize) -> Option<usize> {
    text[from..].find(']').map(|rel| from + rel)
}

fn next_char_len(text: &str, at: usize) -> usize {
    text[at..].chars().next().map(|c| c.len_utf8()).unwrap_or(1)
}

/// Drops a `[[id]]` that repeats the immediately preceding citation with
/// nothing but whitespace between them (§8 "adjacent duplicate citations
/// collapse to one"). `regex` has no backreferences, so this walks
/// `find_iter` matches manually rather than matching the repetition in one
/// pattern.
fn collapse_adjacent_duplicates(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_end = 0;
    let mut last_id: Option<String> = None;

    for m in CITATION.find_iter(text) {
        let id = &m.as_str()[2..m.as_str().len() - 2];
        let gap = &text[last_end..m.start()];
        if last_id.as_deref() == Some(id) && gap.chars().all(char::is_whitespace) {
            last_end = m.end();
            continue;
        }
        out.push_str(&text[last_end..m.end()]);
        last_end = m.end();
        last_id = Some(id.to_string());
    }
    out.push_str(&text[last_end..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> String {
        let c = (b'a' + n) as char;
        c.to_string().repeat(21)
    }

    #[test]
    fn leaves_already_valid_tokens_alone() {
        let text = format!("see [[{}]] for more", id(0));
        assert_eq!(normalize(&text), text);
    }

    #[test]
    fn unwraps_bold_single_bracket() {
        let text = format!("see **[{}]** for more", id(1));
        assert_eq!(normalize(&text), format!("see [[{}]] for more", id(1)));
    }

    #[test]
    fn unwraps_bold_double_bracket() {
        let text = format!("see **[[{}]]** for more", id(2));
        assert_eq!(normalize(&text), format!("see [[{}]] for more", id(2)));
    }

    #[test]
    fn repairs_malformed_prefix_inside_double_brackets() {
        let text = format!("see [[xy:{}]] for more", id(3));
        assert_eq!(normalize(&text), format!("see [[{}]] for more", id(3)));
    }

    #[test]
    fn promotes_single_bracket_to_double() {
        let text = format!("see [{}] for more", id(4));
        assert_eq!(normalize(&text), format!("see [[{}]] for more", id(4)));
    }

    #[test]
    fn skips_markdown_links() {
        let text = "see [the docs](https://example.com/page) for more";
        assert_eq!(normalize(text), text);
    }

    #[test]
    fn collapses_adjacent_duplicate_citations() {
        let text = format!("see [[{}]] [[{}]] now", id(5), id(5));
        assert_eq!(normalize(&text), format!("see [[{}]] now", id(5)));
    }

    #[test]
    fn does_not_collapse_distinct_adjacent_citations() {
        let text = format!("see [[{}]] [[{}]] now", id(6), id(7));
        assert_eq!(normalize(&text), text);
    }

    #[test]
    fn is_idempotent() {
        let text = format!(
            "see **[{}]** and [[xy:{}]] and [[{}]] [[{}]] too",
            id(8),
            id(9),
            id(10),
            id(10)
        );
        let once = normalize(&text);
        let twice = normalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn invalid_bracket_content_is_left_untouched() {
        let text = "a [citation needed] here";
        assert_eq!(normalize(text), text);
    }
}
