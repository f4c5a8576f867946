//! Entity extraction heuristic (spec.md §4.7, Content KG): capitalised
//! tokens and Hebrew tokens, filtered through a bilingual stoplist and an
//! operational blocklist so tool names and memory-system vocabulary never
//! become graph nodes.

use std::collections::HashSet;
use std::sync::LazyLock;

const MAX_ENTITIES: usize = 10;

static STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        // English common words that happen to be capitalised mid-sentence.
        "The", "This", "That", "These", "Those", "There", "Here", "What", "When", "Where",
        "Why", "How", "Who", "Which", "And", "But", "For", "With", "From", "Into", "Onto",
        "About", "Again", "Also", "Then", "Than", "Yes", "No", "Ok", "Okay",
        // Hebrew common words.
        "זה", "זאת", "אלה", "כאן", "שם", "מה", "מתי", "איפה", "למה", "איך", "מי", "גם", "אבל",
    ]
    .into_iter()
    .collect()
});

/// Tool names and memory-system vocabulary that should never become graph
/// nodes even though they are often capitalised in logs and transcripts.
static BLOCKLIST: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "Memory", "Memories", "MemoryBank", "Tier", "Working", "History", "Patterns", "Wilson",
        "KnowledgeGraph", "Search", "Query", "Embedder", "Reranker", "CircuitBreaker",
        "DocumentRegistry", "Outcome",
    ]
    .into_iter()
    .collect()
});

fn is_hebrew_char(c: char) -> bool {
    ('\u{0590}'..='\u{05FF}').contains(&c)
}

fn is_candidate_word(word: &str) -> bool {
    if word.len() < 2 {
        return false;
    }
    if STOPWORDS.contains(word) || BLOCKLIST.contains(word) {
        return false;
    }
    let mut chars = word.chars();
    let first = chars.next().unwrap();
    first.is_uppercase() || is_hebrew_char(first)
}

/// Splits on whitespace and common punctuation, keeping tokens whose first
/// character is an uppercase Latin letter or a Hebrew letter, up to
/// [`MAX_ENTITIES`] unique candidates in first-seen order.
pub fn extract_entities(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for raw in text.split(|c: char| c.is_whitespace() || matches!(c, ',' | '.' | ';' | ':' | '!' | '?' | '"' | '\'' | '(' | ')')) {
        let word = raw.trim();
        if word.is_empty() {
            continue;
        }
        if is_candidate_word(word) {
            let normalized = word.to_string();
            if seen.insert(normalized.clone()) {
                out.push(normalized);
                if out.len() >= MAX_ENTITIES {
                    break;
                }
            }
        }
    }

    out
}
