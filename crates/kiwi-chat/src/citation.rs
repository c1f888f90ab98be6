//! Streaming scanner for `[[<public_id>]]` citation tokens (§4.7, §8).
//!
//! Deliberately store-agnostic: it only recognises token *syntax* via
//! [`kiwi_core::ids::is_valid_public_id`]. Resolving a recognised id to an
//! entity/document name is the engine's job (it owns the `GraphStore`), so
//! this type stays unit-testable without a database.

use kiwi_core::ids::is_valid_public_id;

const OPEN: &str = "[[";
const CLOSE: &str = "]]";

/// One piece of a scanned chunk: literal text to forward as-is, or a
/// syntactically valid citation token (without the surrounding brackets).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Text(String),
    Token(String),
}

/// Incremental `[[id]]` scanner. `feed` may be called with arbitrarily
/// split chunks; a `[[` (or a partial id) spanning a chunk boundary is held
/// in `carry` until it resolves one way or the other.
#[derive(Debug, Default)]
pub struct CitationParser {
    carry: String,
}

impl CitationParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans one chunk, returning zero or more events. A trailing partial
    /// token (e.g. a lone `[` or an unterminated `[[id`) is buffered rather
    /// than emitted, since the next chunk may complete it.
    pub fn feed(&mut self, chunk: &str) -> Vec<ScanEvent> {
        self.carry.push_str(chunk);
        self.scan(false)
    }

    /// Flushes whatever remains at end of stream. Any incomplete token is
    /// emitted as literal text rather than silently dropped.
    pub fn finish(mut self) -> Vec<ScanEvent> {
        self.scan(true)
    }

    fn scan(&mut self, at_eof: bool) -> Vec<ScanEvent> {
        let mut events = Vec::new();
        let mut text = String::new();
        let mut rest = self.carry.as_str();

        loop {
            match rest.find(OPEN) {
                None => {
                    // No opener at all: everything (other than a possible
                    // trailing single '[') is plain text.
                    if !at_eof && rest.ends_with('[') {
                        text.push_str(&rest[..rest.len() - 1]);
                        rest = &rest[rest.len() - 1..];
                    } else {
                        text.push_str(rest);
                        rest = "";
                    }
                    break;
                }
                Some(open_idx) => {
                    match rest[open_idx + OPEN.len()..].find(CLOSE) {
                        None => {
                            // Opener with no closer yet. At EOF it is
                            // literal text; mid-stream it might complete.
                            if at_eof {
                                text.push_str(rest);
                                rest = "";
                            } else {
                                text.push_str(&rest[..open_idx]);
                                rest = &rest[open_idx..];
                            }
                            break;
                        }
                        Some(close_rel) => {
                            text.push_str(&rest[..open_idx]);
                            let id_start = open_idx + OPEN.len();
                            let id_end = id_start + close_rel;
                            let id = &rest[id_start..id_end];
                            if is_valid_public_id(id) {
                                if !text.is_empty() {
                                    events.push(ScanEvent::Text(std::mem::take(&mut text)));
                                }
                                events.push(ScanEvent::Token(id.to_string()));
                            } else {
                                // Not a real id: pass the brackets through
                                // verbatim rather than silently eating them.
                                text.push_str(&rest[open_idx..id_end + CLOSE.len()]);
                            }
                            rest = &rest[id_end + CLOSE.len()..];
                        }
                    }
                }
            }
        }

        if !text.is_empty() {
            events.push(ScanEvent::Text(text));
        }
        self.carry = rest.to_string();
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> String {
        // 21-char ids from a fixed alphabet so constructed examples satisfy
        // `is_valid_public_id`.
        let c = (b'a' + n) as char;
        c.to_string().repeat(21)
    }

    #[test]
    fn plain_text_passes_through_untouched() {
        let mut parser = CitationParser::new();
        let events = parser.feed("hello world, nothing to see here");
        assert_eq!(
            events,
            vec![ScanEvent::Text("hello world, nothing to see here".to_string())]
        );
    }

    #[test]
    fn recognises_a_token_within_one_chunk() {
        let mut parser = CitationParser::new();
        let events = parser.feed(&format!("see [[{}]] for details", id(0)));
        assert_eq!(
            events,
            vec![
                ScanEvent::Text("see ".to_string()),
                ScanEvent::Token(id(0)),
                ScanEvent::Text(" for details".to_string()),
            ]
        );
    }

    #[test]
    fn token_split_across_chunk_boundary_is_recognised() {
        let mut parser = CitationParser::new();
        let ident = id(1);
        let first = format!("Hello [[{}", &ident[..10]);
        let second = format!("{}]] world", &ident[10..]);
        let mut events = parser.feed(&first);
        events.extend(parser.feed(&second));
        assert_eq!(
            events,
            vec![
                ScanEvent::Text("Hello ".to_string()),
                ScanEvent::Token(ident),
                ScanEvent::Text(" world".to_string()),
            ]
        );
    }

    #[test]
    fn trailing_single_bracket_is_carried_not_emitted() {
        let mut parser = CitationParser::new();
        let events = parser.feed("ends with a bracket [");
        assert_eq!(events, vec![ScanEvent::Text("ends with a bracket ".to_string())]);
        let events = parser.feed(&format!("[{}]] done", id(2)));
        assert_eq!(
            events,
            vec![ScanEvent::Token(id(2)), ScanEvent::Text(" done".to_string())]
        );
    }

    #[test]
    fn invalid_id_inside_brackets_passes_through_as_text() {
        let mut parser = CitationParser::new();
        let events = parser.feed("see [[not-an-id]] here");
        assert_eq!(
            events,
            vec![ScanEvent::Text("see [[not-an-id]] here".to_string())]
        );
    }

    #[test]
    fn finish_flushes_an_unterminated_opener_as_text() {
        let mut parser = CitationParser::new();
        let events = parser.feed("dangling [[");
        assert!(events.is_empty());
        let events = parser.finish();
        assert_eq!(events, vec![ScanEvent::Text("dangling [[".to_string())]);
    }
}
