//! Extraction of a guess from free-form model output.
//!
//! Strategies run in order and the first hit wins:
//!
//! 1. A `{"response": "..."}` envelope (gemini CLI) is replaced by its payload.
//! 2. The whole text as a JSON object with a `guess` array.
//! 3. The first fenced code block (optionally tagged `json`) holding an object.
//! 4. The last loose `{"guess": [...]}` anywhere in the text.
//!
//! Models tend to restate their final answer after reasoning, so a fenced
//! answer is superseded when a loose `{"guess": [...]}` follows the closing
//! fence. Arity and color range are not checked here.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("fence regex should be valid")
});

static GUESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\s*"guess"\s*:\s*\[[\d,\s]+\]\s*\}"#).expect("guess regex should be valid")
});

/// Pull the guess list out of `raw`, or `None` if no strategy finds one.
pub fn extract_guess(raw: &str) -> Option<Vec<Value>> {
    let text = unwrap_envelope(raw);
    direct(&text)
        .or_else(|| fenced(&text))
        .or_else(|| last_loose(&text))
}

fn unwrap_envelope(raw: &str) -> Cow<'_, str> {
    if let Ok(Value::Object(mut map)) = serde_json::from_str::<Value>(raw.trim())
        && let Some(Value::String(inner)) = map.remove("response")
    {
        return Cow::Owned(inner);
    }
    Cow::Borrowed(raw)
}

fn direct(text: &str) -> Option<Vec<Value>> {
    guess_field(text.trim())
}

fn fenced(text: &str) -> Option<Vec<Value>> {
    let caps = FENCE_RE.captures(text)?;
    let fence = caps.get(0)?;
    if GUESS_RE.find_at(text, fence.end()).is_some() {
        return None;
    }
    guess_field(caps.get(1)?.as_str())
}

fn last_loose(text: &str) -> Option<Vec<Value>> {
    let last = GUESS_RE.find_iter(text).last()?;
    guess_field(last.as_str())
}

fn guess_field(candidate: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(candidate).ok()? {
        Value::Object(mut map) => match map.remove("guess")? {
            Value::Array(items) => Some(items),
            _ => None,
        },
        _ => None,
    }
}
