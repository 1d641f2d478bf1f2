//! Best-effort parsing of hand-edited JSON.
//!
//! Stages run in order and stop at the first that parses:
//! 1. the text as given,
//! 2. typographic quotes normalized and trailing commas removed,
//! 3. comments stripped as well.
//!
//! All rewrites are string-literal aware, so `"http://..."` and commas or
//! quotes inside values are left alone.

use crate::error::{FieldSchemaError, Result};
use log::{debug, warn};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStage {
    AsIs,
    QuotesAndCommas,
    Comments,
}

impl fmt::Display for RepairStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RepairStage::AsIs => "as-is",
            RepairStage::QuotesAndCommas => "quote/comma normalization",
            RepairStage::Comments => "comment stripping",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepairedJson {
    pub value: Value,
    /// Working text after the successful stage.
    pub text: String,
    pub stage: RepairStage,
}

pub fn parse_lenient(text: &str) -> Result<RepairedJson> {
    let candidates = [
        (RepairStage::AsIs, text.to_string()),
        (
            RepairStage::QuotesAndCommas,
            strip_trailing_commas(&normalize_quotes(text)),
        ),
        (
            RepairStage::Comments,
            strip_trailing_commas(&normalize_quotes(&strip_comments(text))),
        ),
    ];

    let mut last_error = None;
    for (stage, candidate) in candidates {
        match serde_json::from_str::<Value>(&candidate) {
            Ok(value) => {
                if stage != RepairStage::AsIs {
                    warn!("JSON parsed only after {} repair", stage);
                }
                return Ok(RepairedJson {
                    value,
                    text: candidate,
                    stage,
                });
            }
            Err(e) => {
                debug!("JSON {} parse failed: {}", stage, e);
                last_error = Some((stage, e));
            }
        }
    }

    let (stage, error) = match last_error {
        Some((stage, error)) => (stage.to_string(), error.to_string()),
        None => ("as-is".to_string(), "empty input".to_string()),
    };
    Err(FieldSchemaError::MalformedJson {
        stage,
        message: error,
    })
}

fn is_double_quote(ch: char) -> bool {
    matches!(ch, '"' | '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}')
}

/// Typographic double quotes used as delimiters become `"`; typographic
/// single quotes outside strings become `'`.
pub fn normalize_quotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // Some(true) when the open string was started by a typographic quote.
    let mut open: Option<bool> = None;
    let mut escaped = false;

    for ch in text.chars() {
        match open {
            Some(typographic) => {
                if escaped {
                    escaped = false;
                    out.push(ch);
                } else if ch == '\\' {
                    escaped = true;
                    out.push(ch);
                } else if ch == '"' || (typographic && is_double_quote(ch)) {
                    open = None;
                    out.push('"');
                } else {
                    out.push(ch);
                }
            }
            None => {
                if is_double_quote(ch) {
                    open = Some(ch != '"');
                    out.push('"');
                } else if ch == '\u{2018}' || ch == '\u{2019}' {
                    out.push('\'');
                } else {
                    out.push(ch);
                }
            }
        }
    }
    out
}

pub fn strip_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for ch in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            out.push(ch);
            continue;
        }

        match ch {
            '"' => in_string = true,
            '}' | ']' => {
                let trimmed = out.trim_end().len();
                if out[..trimmed].ends_with(',') {
                    out.truncate(trimmed - 1);
                }
            }
            _ => {}
        }
        out.push(ch);
    }
    out
}

/// Removes `// line` and `/* block */` comments outside string literals.
pub fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut open: Option<bool> = None;
    let mut escaped = false;

    while let Some(ch) = chars.next() {
        if let Some(typographic) = open {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' || (typographic && is_double_quote(ch)) {
                open = None;
            }
            out.push(ch);
            continue;
        }

        let lookahead = chars.peek().copied();
        match (ch, lookahead) {
            ('/', Some('/')) => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
                out.push(' ');
            }
            _ => {
                if is_double_quote(ch) {
                    open = Some(ch != '"');
                }
                out.push(ch);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_json_parses_as_is() {
        let repaired = parse_lenient(r#"{"a": [1, 2]}"#).unwrap();
        assert_eq!(repaired.stage, RepairStage::AsIs);
        assert_eq!(repaired.value, json!({ "a": [1, 2] }));
    }

    #[test]
    fn test_smart_quotes_and_trailing_commas() {
        let text = "{\u{201C}name\u{201D}: \u{201C}ACME\u{201D}, \"tags\": [\"a\", \"b\",], }";
        let repaired = parse_lenient(text).unwrap();
        assert_eq!(repaired.stage, RepairStage::QuotesAndCommas);
        assert_eq!(repaired.value, json!({ "name": "ACME", "tags": ["a", "b"] }));
    }

    #[test]
    fn test_comments_are_stripped_but_urls_survive() {
        let text = r#"{
            // draft version
            "$schema": "http://json-schema.org/draft-07/schema#",
            /* properties
               go here */
            "type": "object",
        }"#;
        let repaired = parse_lenient(text).unwrap();
        assert_eq!(repaired.stage, RepairStage::Comments);
        assert_eq!(
            repaired.value["$schema"],
            "http://json-schema.org/draft-07/schema#"
        );
        assert!(!repaired.text.contains("draft version"));
    }

    #[test]
    fn test_quotes_inside_values_are_kept() {
        let text = "{\"quote\": \"he said \u{201C}hi\u{201D}, twice\",}";
        let repaired = parse_lenient(text).unwrap();
        assert_eq!(repaired.value["quote"], "he said \u{201C}hi\u{201D}, twice");
    }

    #[test]
    fn test_unrepairable_input_reports_last_error() {
        let err = parse_lenient("{ not json").unwrap_err();
        match err {
            FieldSchemaError::MalformedJson { stage, message } => {
                assert_eq!(stage, "comment stripping");
                assert!(!message.is_empty());
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
