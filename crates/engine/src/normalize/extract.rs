/// End index (inclusive) of the object opened at `start`, if it closes.
///
/// Braces inside JSON strings, including escaped quotes, are ignored.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Every balanced `{...}` span in `raw` that decodes as a JSON object, in order.
///
/// Code-fence markers carry no braces, so fenced and bare documents are found
/// alike, in any number of blocks. Spans that balance but do not decode
/// (prose in braces) are skipped whole. An opener that never closes is
/// stepped over, so a stray brace cannot hide a document after it.
pub fn json_object_spans(raw: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut from = 0;
    while let Some(offset) = raw[from..].find('{') {
        let start = from + offset;
        let Some(end) = balanced_end(raw, start) else {
            from = start + 1;
            continue;
        };
        let span = &raw[start..=end];
        if serde_json::from_str::<serde_json::Value>(span).is_ok_and(|v| v.is_object()) {
            spans.push(span);
        }
        from = end + 1;
    }
    spans
}
