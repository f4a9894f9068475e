//! Citation extraction and linking

use regex::Regex;
use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::types::{Citation, Grounding, RetrievedPassage};

/// Matches `[1]`, `[1, 3]`, `[Source 2]` and `[Source: 2]`
const MARKER_PATTERN: &str = r"\[(?:Source\s*:?\s*)?(\d+(?:\s*,\s*\d+)*)\]";

/// Passages attached when the model cites nothing
const FALLBACK_CITATIONS: usize = 3;

/// Context block numbers cited in `answer`, in order of first appearance
///
/// Numbers outside `1..=block_count` are ignored.
pub fn extract_markers(answer: &str, block_count: usize) -> Result<Vec<usize>> {
    let pattern = Regex::new(MARKER_PATTERN)
        .map_err(|e| Error::internal(format!("citation pattern: {}", e)))?;

    let mut seen = HashSet::new();
    let mut markers = Vec::new();

    for cap in pattern.captures_iter(answer) {
        let Some(numbers) = cap.get(1) else {
            continue;
        };
        for number in numbers.as_str().split(',') {
            if let Ok(marker) = number.trim().parse::<usize>() {
                if (1..=block_count).contains(&marker) && seen.insert(marker) {
                    markers.push(marker);
                }
            }
        }
    }

    Ok(markers)
}

/// Link markers in `answer` back to `passages`
///
/// Returns the answer text (with a sources list appended when the model cited
/// nothing), its citations and the grounding classification.
pub fn link_citations(
    answer: &str,
    passages: &[RetrievedPassage],
    excerpt_chars: usize,
) -> Result<(String, Vec<Citation>, Grounding)> {
    let markers = extract_markers(answer, passages.len())?;

    if !markers.is_empty() {
        let citations = markers
            .into_iter()
            .map(|marker| citation(marker, &passages[marker - 1], excerpt_chars, true))
            .collect();
        return Ok((answer.to_string(), citations, Grounding::Cited));
    }

    // Passages arrive sorted by score
    let citations: Vec<Citation> = passages
        .iter()
        .take(FALLBACK_CITATIONS)
        .enumerate()
        .map(|(i, passage)| citation(i + 1, passage, excerpt_chars, false))
        .collect();

    let mut text = answer.to_string();
    if !citations.is_empty() {
        text.push_str("\n\nSources used:");
        for citation in &citations {
            text.push_str(&format!("\n- {}", citation.format_inline()));
        }
    }

    Ok((text, citations, Grounding::Uncited))
}

fn citation(marker: usize, passage: &RetrievedPassage, excerpt_chars: usize, explicit: bool) -> Citation {
    Citation {
        marker,
        chunk_id: passage.chunk.id,
        document_id: passage.document_id(),
        regulation_id: passage.regulation_id.clone(),
        document_title: passage.document_title.clone(),
        excerpt: excerpt(&passage.chunk.text, excerpt_chars),
        score: passage.score,
        explicit,
    }
}

/// Verbatim prefix of `text`, at most `max_chars` characters
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Chunk;
    use uuid::Uuid;

    fn passages(n: usize) -> Vec<RetrievedPassage> {
        (0..n)
            .map(|i| {
                let document_id = Uuid::new_v4();
                RetrievedPassage {
                    chunk: Chunk {
                        id: Chunk::id_for(document_id, 0),
                        document_id,
                        sequence_index: 0,
                        start_offset: 0,
                        end_offset: 20,
                        text: format!("Requirement number {} applies.", i + 1),
                        token_count: 4,
                    },
                    score: 0.9 - i as f32 * 0.1,
                    document_title: format!("Rule {}", i + 1),
                    regulation_id: Some(format!("reg-{}", i + 1)),
                    jurisdiction_id: None,
                }
            })
            .collect()
    }

    #[test]
    fn test_extract_markers() {
        let markers = extract_markers("See [2] and [1, 2]. Also [Source: 3] and [9].", 3).unwrap();
        assert_eq!(markers, vec![2, 1, 3]);
        assert!(extract_markers("[0] nothing [x]", 3).unwrap().is_empty());
    }

    #[test]
    fn test_explicit_citations_map_to_passages() {
        let passages = passages(3);
        let (text, citations, grounding) =
            link_citations("Firms must comply [3]. Also [1].", &passages, 300).unwrap();

        assert_eq!(grounding, Grounding::Cited);
        assert_eq!(text, "Firms must comply [3]. Also [1].");
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].marker, 3);
        assert_eq!(citations[0].regulation_id.as_deref(), Some("reg-3"));
        assert_eq!(citations[0].chunk_id, passages[2].chunk.id);
        assert!(citations.iter().all(|c| c.explicit));
    }

    #[test]
    fn test_uncited_answer_falls_back_to_top_passages() {
        let passages = passages(5);
        let (text, citations, grounding) = link_citations("Firms must comply.", &passages, 300).unwrap();

        assert_eq!(grounding, Grounding::Uncited);
        assert_eq!(citations.len(), 3);
        assert!(citations.iter().all(|c| !c.explicit));
        assert!(text.contains("Sources used:\n- [1] Rule 1 (reg-1)"));
    }

    #[test]
    fn test_excerpt_is_verbatim_prefix() {
        let text = "Équité des marchés financiers";
        assert_eq!(excerpt(text, 6), "Équité");
        assert_eq!(excerpt(text, 100), text);
        assert_eq!(excerpt("", 5), "");
    }
}
