//! Near-JSON repair for `CompleteStructured` (§4.1): strips code fences and
//! attempts to close truncated braces/brackets/strings before giving up.

/// Tries `serde_json::from_str` verbatim, then once more after [`repair`].
pub fn parse_structured<T: serde::de::DeserializeOwned>(
    raw: &str,
) -> Result<T, serde_json::Error> {
    match serde_json::from_str(raw) {
        Ok(v) => Ok(v),
        Err(first_err) => {
            let repaired = repair(raw);
            serde_json::from_str(&repaired).map_err(|_| first_err)
        }
    }
}

/// Best-effort cleanup of model output that is "almost" JSON.
fn repair(raw: &str) -> String {
    let stripped = strip_code_fences(raw.trim());
    close_unbalanced(&stripped)
}

fn strip_code_fences(s: &str) -> String {
    let s = s.trim();
    let Some(rest) = s.strip_prefix("```") else {
        return s.to_string();
    };
    // Drop an optional language tag on the fence's own line (e.g. ```json).
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim().to_string()
}

/// Closes unterminated strings/objects/arrays left by a truncated completion.
fn close_unbalanced(s: &str) -> String {
    let mut out = s.to_string();
    let mut in_string = false;
    let mut escape = false;
    let mut stack: Vec<char> = Vec::new();

    for c in s.chars() {
        if in_string {
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&c) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }

    if in_string {
        out.push('"');
    }
    while let Some(close) = stack.pop() {
        out.push(close);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn parses_valid_json_directly() {
        let p: Point = parse_structured(r#"{"x": 1, "y": 2}"#).unwrap();
        assert_eq!(p, Point { x: 1, y: 2 });
    }

    #[test]
    fn strips_code_fences() {
        let raw = "```json\n{\"x\": 1, \"y\": 2}\n```";
        let p: Point = parse_structured(raw).unwrap();
        assert_eq!(p, Point { x: 1, y: 2 });
    }

    #[test]
    fn closes_truncated_object() {
        let raw = r#"{"x": 1, "y": 2"#;
        let p: Point = parse_structured(raw).unwrap();
        assert_eq!(p, Point { x: 1, y: 2 });
    }

    #[test]
    fn closes_truncated_string_and_brace() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Note {
            text: String,
        }
        let raw = r#"{"text": "hello world"#;
        let n: Note = parse_structured(raw).unwrap();
        assert_eq!(n.text, "hello world");
    }

    #[test]
    fn gives_up_gracefully_on_garbage() {
        let result: Result<Point, _> = parse_structured("not json at all");
        assert!(result.is_err());
    }
}
