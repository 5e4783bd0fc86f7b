//! Permissive parser for JSON that may be cut off mid-stream.
//!
//! Truncated objects and arrays are closed where the input ends. A string
//! cut off before its closing quote is dropped (together with its key when
//! it is a member value), as is a key still waiting for its value. A
//! trailing number keeps its longest valid prefix and a trailing literal
//! prefix (`tr`, `fa`, `nu`) completes to its literal. Anything that is not
//! a prefix of valid JSON is rejected.

use serde_json::{Map, Number, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartialJsonError {
    /// Input ends before anything usable was read
    #[error("incomplete JSON")]
    Incomplete,

    #[error("malformed JSON at byte {position}")]
    Malformed { position: usize },
}

/// Parse a possibly truncated JSON document.
///
/// A leading code-fence line (```` ```json ````) and a trailing fence are
/// ignored.
pub fn parse_partial(input: &str) -> Result<Value, PartialJsonError> {
    let body = unfence(input)?;
    let mut parser = Parser::new(body);
    let value = parser.value()?;
    parser.skip_ws();
    if !parser.at_end() {
        return Err(parser.malformed());
    }
    Ok(value)
}

fn unfence(input: &str) -> Result<&str, PartialJsonError> {
    let trimmed = input.trim_start();
    let Some(after_ticks) = trimmed.strip_prefix("```") else {
        return Ok(input);
    };
    // The info string (`json`) runs to the end of the opening line
    let Some(newline) = after_ticks.find('\n') else {
        return Err(PartialJsonError::Incomplete);
    };
    let body = after_ticks[newline + 1..].trim_end();
    let body = body.trim_end_matches('`');
    Ok(body)
}

struct Parser<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn malformed(&self) -> PartialJsonError {
        PartialJsonError::Malformed { position: self.pos }
    }

    fn skip_ws(&mut self) {
        while let Some(b' ' | b'\t' | b'\n' | b'\r') = self.peek() {
            self.pos += 1;
        }
    }

    fn value(&mut self) -> Result<Value, PartialJsonError> {
        self.skip_ws();
        match self.peek() {
            None => Err(PartialJsonError::Incomplete),
            Some(b'{') => self.object(),
            Some(b'[') => self.array(),
            Some(b'"') => self.string().map(Value::String),
            Some(b'-' | b'0'..=b'9') => self.number(),
            Some(b't' | b'f' | b'n') => self.literal(),
            Some(_) => Err(self.malformed()),
        }
    }

    fn object(&mut self) -> Result<Value, PartialJsonError> {
        self.pos += 1;
        let mut map = Map::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Ok(Value::Object(map)),
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(Value::Object(map));
                }
                Some(b'"') => {}
                Some(_) => return Err(self.malformed()),
            }

            let key = match self.string() {
                Ok(key) => key,
                Err(PartialJsonError::Incomplete) => return Ok(Value::Object(map)),
                Err(e) => return Err(e),
            };

            self.skip_ws();
            match self.peek() {
                None => return Ok(Value::Object(map)),
                Some(b':') => self.pos += 1,
                Some(_) => return Err(self.malformed()),
            }

            match self.value() {
                Ok(value) => {
                    map.insert(key, value);
                }
                Err(PartialJsonError::Incomplete) => return Ok(Value::Object(map)),
                Err(e) => return Err(e),
            }

            self.skip_ws();
            match self.peek() {
                None => return Ok(Value::Object(map)),
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(Value::Object(map));
                }
                Some(_) => return Err(self.malformed()),
            }
        }
    }

    fn array(&mut self) -> Result<Value, PartialJsonError> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Ok(Value::Array(items)),
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Value::Array(items));
                }
                Some(_) => {}
            }

            match self.value() {
                Ok(value) => items.push(value),
                Err(PartialJsonError::Incomplete) => return Ok(Value::Array(items)),
                Err(e) => return Err(e),
            }

            self.skip_ws();
            match self.peek() {
                None => return Ok(Value::Array(items)),
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Value::Array(items));
                }
                Some(_) => return Err(self.malformed()),
            }
        }
    }

    /// A complete string literal; `Incomplete` if the closing quote is missing.
    fn string(&mut self) -> Result<String, PartialJsonError> {
        let start = self.pos;
        let mut i = start + 1;
        while i < self.bytes.len() {
            match self.bytes[i] {
                b'\\' => i += 2,
                b'"' => {
                    let literal = &self.input[start..=i];
                    let decoded = serde_json::from_str::<String>(literal)
                        .map_err(|_| PartialJsonError::Malformed { position: start })?;
                    self.pos = i + 1;
                    return Ok(decoded);
                }
                _ => i += 1,
            }
        }
        self.pos = self.bytes.len();
        Err(PartialJsonError::Incomplete)
    }

    fn number(&mut self) -> Result<Value, PartialJsonError> {
        let start = self.pos;
        while let Some(b'-' | b'+' | b'.' | b'e' | b'E' | b'0'..=b'9') = self.peek() {
            self.pos += 1;
        }
        let text = &self.input[start..self.pos];
        if let Ok(number) = serde_json::from_str::<Number>(text) {
            return Ok(Value::Number(number));
        }
        if !self.at_end() {
            return Err(PartialJsonError::Malformed { position: start });
        }
        // Cut off mid-number: keep the longest prefix that still parses
        let mut prefix = text;
        while prefix.len() > 1 {
            prefix = &prefix[..prefix.len() - 1];
            if let Ok(number) = serde_json::from_str::<Number>(prefix) {
                return Ok(Value::Number(number));
            }
        }
        Err(PartialJsonError::Incomplete)
    }

    fn literal(&mut self) -> Result<Value, PartialJsonError> {
        let rest = &self.input[self.pos..];
        for (word, value) in [
            ("true", Value::Bool(true)),
            ("false", Value::Bool(false)),
            ("null", Value::Null),
        ] {
            if rest.starts_with(word) {
                self.pos += word.len();
                return Ok(value);
            }
            if word.starts_with(rest) {
                self.pos = self.bytes.len();
                return Ok(value);
            }
        }
        Err(self.malformed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn complete_document_parses() {
        assert_eq!(
            parse_partial(r#"{"a": [1, 2], "b": {"c": null}}"#).unwrap(),
            json!({ "a": [1, 2], "b": { "c": null } })
        );
    }

    #[test]
    fn truncated_containers_are_closed() {
        assert_eq!(
            parse_partial(r#"{"actions": [{"name": "runs", "source": "Ann"}, {"#).unwrap(),
            json!({ "actions": [{ "name": "runs", "source": "Ann" }, {}] })
        );
    }

    #[test]
    fn truncated_string_value_drops_its_key() {
        assert_eq!(
            parse_partial(r#"{"name": "Ann", "emoji": "🧑‍"#).unwrap(),
            json!({ "name": "Ann" })
        );
        assert_eq!(parse_partial(r#"{"name": "Ann", "emo"#).unwrap(), json!({ "name": "Ann" }));
    }

    #[test]
    fn dangling_key_is_dropped() {
        assert_eq!(parse_partial(r#"{"a": 1, "b""#).unwrap(), json!({ "a": 1 }));
        assert_eq!(parse_partial(r#"{"a": 1, "b":"#).unwrap(), json!({ "a": 1 }));
    }

    #[test]
    fn trailing_numbers_and_literals_complete() {
        assert_eq!(parse_partial(r#"{"v": 1."#).unwrap(), json!({ "v": 1 }));
        assert_eq!(parse_partial(r#"{"v": 42"#).unwrap(), json!({ "v": 42 }));
        assert_eq!(parse_partial(r#"{"v": tr"#).unwrap(), json!({ "v": true }));
        assert_eq!(parse_partial(r#"[nu"#).unwrap(), json!([null]));
        assert_eq!(parse_partial(r#"{"v": -"#).unwrap(), json!({}));
    }

    #[test]
    fn top_level_truncated_string_is_incomplete() {
        assert_eq!(parse_partial(r#""abc"#), Err(PartialJsonError::Incomplete));
        assert_eq!(parse_partial("   "), Err(PartialJsonError::Incomplete));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            parse_partial("Sure! Here is"),
            Err(PartialJsonError::Malformed { .. })
        ));
        assert!(matches!(
            parse_partial(r#"{"a": 1} trailing"#),
            Err(PartialJsonError::Malformed { .. })
        ));
        assert!(matches!(
            parse_partial(r#"{"a": tx}"#),
            Err(PartialJsonError::Malformed { .. })
        ));
    }

    #[test]
    fn code_fence_is_ignored() {
        assert_eq!(
            parse_partial("```json\n{\"a\": [1, 2").unwrap(),
            json!({ "a": [1, 2] })
        );
        assert_eq!(parse_partial("```json\n{\"a\": 1}\n```").unwrap(), json!({ "a": 1 }));
        assert_eq!(parse_partial("```js"), Err(PartialJsonError::Incomplete));
    }

    #[test]
    fn escapes_inside_strings() {
        assert_eq!(
            parse_partial(r#"{"q": "she said \"hi\"", "r": "a\"#).unwrap(),
            json!({ "q": "she said \"hi\"" })
        );
    }
}
