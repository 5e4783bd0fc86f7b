//! Recovery of a JSON value from a finished model response.
//!
//! Models wrap JSON in markdown fences or surround it with chatter. The
//! strategies here are tried in order: strict parse of the unfenced text,
//! then the first balanced `{...}` block.

use serde_json::Value;
use tracing::debug;

/// Remove a surrounding markdown code fence, if there is one.
///
/// Handles ```` ```json ```` and bare ```` ``` ```` openers, with or without a
/// closing fence.
pub fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(after_ticks) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match after_ticks.find('\n') {
        Some(newline) => &after_ticks[newline + 1..],
        None => after_ticks.strip_prefix("json").unwrap_or(after_ticks),
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// The first balanced `{...}` block, skipping braces inside strings.
pub fn extract_balanced_object(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in response[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&response[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Try every JSON-oriented strategy on a finished response.
pub fn recover_json(response: &str) -> Option<Value> {
    let unfenced = strip_code_fence(response);
    if let Ok(value) = serde_json::from_str(unfenced) {
        return Some(value);
    }
    let block = extract_balanced_object(response)?;
    match serde_json::from_str(block) {
        Ok(value) => {
            debug!(offset = response.len() - block.len(), "Recovered JSON from surrounding text");
            Some(value)
        }
        Err(_) => None,
    }
}
