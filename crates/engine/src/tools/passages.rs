use std::collections::BTreeSet;

use serde::Serialize;

/// Sentences per passage window.
const WINDOW: usize = 3;

/// A slice of page text scored against a query.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Passage {
    /// Index of the first sentence of the window.
    pub position: usize,
    /// Distinct query terms present.
    pub score: usize,
    pub text: String,
}

/// Lowercased query terms of three or more characters.
fn query_terms(query: &str) -> BTreeSet<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 3)
        .map(|t| t.to_lowercase())
        .collect()
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
            if at_boundary {
                let end = i + c.len_utf8();
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                start = end;
            }
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Rank non-overlapping sentence windows by how many query terms they contain.
///
/// Windows with no matching term are dropped; ties go to the earlier window.
pub fn top_passages(text: &str, query: &str, max: usize) -> Vec<Passage> {
    let terms = query_terms(query);
    if terms.is_empty() || max == 0 {
        return Vec::new();
    }

    let sentences = split_sentences(text);
    let mut scored: Vec<Passage> = (0..sentences.len())
        .filter_map(|start| {
            let end = (start + WINDOW).min(sentences.len());
            let window = sentences[start..end].join(" ");
            let words: BTreeSet<String> = window
                .split(|c: char| !c.is_alphanumeric())
                .map(|w| w.to_lowercase())
                .collect();
            let score = terms.iter().filter(|t| words.contains(*t)).count();
            (score > 0).then_some(Passage {
                position: start,
                score,
                text: window,
            })
        })
        .collect();

    scored.sort_by(|a, b| b.score.cmp(&a.score).then(a.position.cmp(&b.position)));

    let mut picked: Vec<Passage> = Vec::new();
    for passage in scored {
        let overlaps = picked
            .iter()
            .any(|p| passage.position < p.position + WINDOW && p.position < passage.position + WINDOW);
        if !overlaps {
            picked.push(passage);
            if picked.len() == max {
                break;
            }
        }
    }
    picked
}
