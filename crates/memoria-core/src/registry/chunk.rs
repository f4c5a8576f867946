//! Fixed-size chunking with overlap, used to split a long document into
//! `books`-tier memory items.

/// Splits `text` into chunks of roughly `size` characters with `overlap`
/// characters shared between consecutive chunks. Splits fall on a
/// whitespace boundary near the target size when one exists, to avoid
/// cutting mid-word.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    if chars.len() <= size {
        return vec![text.to_string()];
    }

    let step = size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let mut end = (start + size).min(chars.len());
        if end < chars.len() {
            if let Some(boundary) = chars[start..end].iter().rposition(|c| c.is_whitespace()) {
                if boundary > size / 2 {
                    end = start + boundary;
                }
            }
        }
        let chunk: String = chars[start..end].iter().collect();
        chunks.push(chunk.trim().to_string());

        if end >= chars.len() {
            break;
        }
        start = end.saturating_sub(overlap);
    }

    chunks.into_iter().filter(|c| !c.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_text("hello world", 1000, 200);
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn long_text_is_split_with_overlap() {
        let text = "word ".repeat(500);
        let chunks = chunk_text(&text, 1000, 200);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 1000);
        }
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("", 1000, 200).is_empty());
    }
}
