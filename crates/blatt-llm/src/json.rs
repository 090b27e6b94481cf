//! Lenient JSON extraction from model output.
//!
//! Models often wrap the requested JSON in prose or code fences. Both
//! helpers try the whole reply first, then the outermost bracketed span.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref OBJECT_SPAN: Regex = Regex::new(r"(?s)\{.*\}").unwrap();
}

/// A JSON array, either the whole reply or its outermost `[`…`]` span.
pub fn extract_array(content: &str) -> Option<Vec<Value>> {
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(content.trim()) {
        return Some(items);
    }
    let start = content.find('[')?;
    let end = content.rfind(']')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&content[start..=end]) {
        Ok(Value::Array(items)) => Some(items),
        _ => None,
    }
}

/// A JSON object, either the whole reply or its outermost `{`…`}` span.
pub fn extract_object(content: &str) -> Option<Value> {
    if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(content.trim()) {
        return Some(v);
    }
    let span = OBJECT_SPAN.find(content)?;
    match serde_json::from_str::<Value>(span.as_str()) {
        Ok(v @ Value::Object(_)) => Some(v),
        _ => None,
    }
}

/// Strings from a JSON array field, trimmed, empties dropped.
pub fn string_list(v: &Value) -> Vec<String> {
    v.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|x| x.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_array_plain_and_wrapped() {
        assert_eq!(extract_array("[1, 2]").unwrap().len(), 2);
        let wrapped = "Here you go:\n```json\n[{\"a\": 1}]\n```\nDone.";
        assert_eq!(extract_array(wrapped).unwrap().len(), 1);
        assert!(extract_array("no json here").is_none());
        assert!(extract_array("] backwards [").is_none());
        assert!(extract_array("{\"not\": \"array\"}").is_none());
    }

    #[test]
    fn test_extract_object_wrapped() {
        let v = extract_object("Sure! {\"type\": \"improves\"} hope that helps").unwrap();
        assert_eq!(v["type"], "improves");
        assert!(extract_object("[1]").is_none());
    }

    #[test]
    fn test_string_list() {
        let v = serde_json::json!([" a ", "", 3, "b"]);
        assert_eq!(string_list(&v), vec!["a", "b"]);
        assert!(string_list(&Value::Null).is_empty());
    }
}
