use serde_json::Value;
use verifai_common::config::ToolResultLimits;

/// Truncate search result arrays to the configured max, adding a note about omitted results.
pub fn truncate_search_results(results: &mut Value, limits: &ToolResultLimits) {
    let max = limits.max_search_results as usize;

    if let Some(arr) = results.get_mut("results").and_then(|v| v.as_array_mut()) {
        if arr.len() > max {
            let total = arr.len();
            arr.truncate(max);
            if let Some(obj) = results.as_object_mut() {
                obj.insert("total_results".into(), Value::from(total));
                obj.insert(
                    "truncated".into(),
                    Value::String(format!("[{} more results omitted]", total - max)),
                );
            }
        }
    }
}

/// Cut `text` to at most `max_chars` characters on a char boundary.
///
/// Returns the text and whether anything was dropped.
pub fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&text[..byte_idx], true),
        None => (text, false),
    }
}

/// Page text for the scrape tool, with a trailing note when cut.
pub fn truncate_page_text(text: &str, limits: &ToolResultLimits) -> String {
    let max = limits.max_page_chars as usize;
    match truncate_chars(text, max) {
        (kept, true) => format!(
            "{}...\n[Content truncated: {} chars total, showing first {}]",
            kept,
            text.chars().count(),
            max
        ),
        (kept, false) => kept.to_string(),
    }
}
