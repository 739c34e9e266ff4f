//! Merge-output parsing and citation consolidation.
//!
//! The merge prompt contracts the model to finish with `ANSWERABLE:` and
//! `CONFIDENCE:` trailer lines and to cite with bracketed chunk keys. This
//! module enforces that contract: a response that cannot be parsed into
//! {answer text, citations, confidence, answerability} is a generation
//! error, never silently turned into an empty answer.

use std::collections::HashMap;

use diligence_core::{AppError, AppResult};

use crate::types::{Answerability, Citation, RetrievedChunk};

/// Maximum characters of cited chunk text quoted into a citation.
const SNIPPET_LEN: usize = 200;

/// Structured result of a successful parse.
#[derive(Debug, Clone)]
pub struct ParsedAnswer {
    pub text: String,
    pub citations: Vec<Citation>,
    pub confidence: f32,
    pub answerability: Answerability,
}

/// Parse the merge call's raw output against the retrieval context.
pub fn parse_merge_output(raw: &str, context: &[RetrievedChunk]) -> AppResult<ParsedAnswer> {
    let mut confidence: Option<f32> = None;
    let mut answerability: Option<Answerability> = None;
    let mut body_lines: Vec<&str> = Vec::new();

    for line in raw.lines() {
        let trimmed = line.trim();

        if let Some(value) = strip_prefix_ci(trimmed, "CONFIDENCE:") {
            confidence = parse_confidence(value);
        } else if let Some(value) = strip_prefix_ci(trimmed, "ANSWERABLE:") {
            answerability = Some(Answerability::parse(value));
        } else {
            body_lines.push(line);
        }
    }

    let Some(confidence) = confidence else {
        return Err(AppError::Generation(
            "Merge output is missing a parsable CONFIDENCE line".to_string(),
        ));
    };

    let body = body_lines.join("\n");
    let body = strip_label(body.trim(), "FINAL ANSWER:");

    let (text, citations) = consolidate_citations(body, context);
    let text = text.trim().to_string();

    if text.is_empty() {
        return Err(AppError::Generation(
            "Merge output contains no answer text".to_string(),
        ));
    }

    let answerability = answerability.unwrap_or_else(|| {
        // Recovered marker convention: candidates flag thin context inline
        if text.contains("INSUFFICIENT_DATA") {
            Answerability::Partial
        } else {
            Answerability::Unknown
        }
    });

    Ok(ParsedAnswer {
        text,
        citations,
        confidence,
        answerability,
    })
}

fn parse_confidence(value: &str) -> Option<f32> {
    let token = value.trim().split_whitespace().next()?;
    token
        .parse::<f32>()
        .ok()
        .map(|v| v.clamp(0.0, 1.0))
}

fn strip_label<'a>(text: &'a str, label: &str) -> &'a str {
    text.strip_prefix(label).map(str::trim_start).unwrap_or(text)
}

/// ASCII case-insensitive prefix strip.
fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}

/// Rewrite bracketed citation keys into contiguous 1-based numbers.
///
/// Keys are matched against the retrieval context's chunk ids; each cited
/// chunk yields exactly one citation numbered by first appearance in the
/// text. Bracketed tokens shaped like chunk keys that match nothing in the
/// context are stripped (citations are never fabricated); any other
/// bracketed text passes through untouched.
fn consolidate_citations(body: &str, context: &[RetrievedChunk]) -> (String, Vec<Citation>) {
    let by_key: HashMap<&str, &RetrievedChunk> = context
        .iter()
        .map(|r| (r.chunk.id.as_str(), r))
        .collect();

    let mut assigned: HashMap<String, u32> = HashMap::new();
    let mut citations: Vec<Citation> = Vec::new();
    let mut out = String::with_capacity(body.len());
    let mut rest = body;

    while let Some(open) = rest.find('[') {
        let (before, from_open) = rest.split_at(open);
        out.push_str(before);

        let after = &from_open[1..];
        let Some(close) = after.find(']') else {
            out.push_str(from_open);
            rest = "";
            break;
        };

        let key = &after[..close];
        if let Some(retrieved) = by_key.get(key) {
            let num = *assigned.entry(key.to_string()).or_insert_with(|| {
                let num = citations.len() as u32 + 1;
                citations.push(citation_for(num, retrieved));
                num
            });
            out.push('[');
            out.push_str(&num.to_string());
            out.push(']');
        } else if looks_like_chunk_key(key) {
            // Fabricated or stale key: drop the marker entirely
            tracing::debug!("Dropping unmatched citation key: {}", key);
        } else {
            out.push('[');
            out.push_str(key);
            out.push(']');
        }

        rest = &after[close + 1..];
    }
    out.push_str(rest);

    (out, citations)
}

fn citation_for(num: u32, retrieved: &RetrievedChunk) -> Citation {
    Citation {
        num,
        doc_id: retrieved.chunk.doc_id.clone(),
        doc_name: retrieved.chunk.doc_name.clone(),
        page: retrieved.chunk.page,
        text: snippet(&retrieved.chunk.text),
        chunk_id: retrieved.chunk.id.clone(),
    }
}

fn snippet(text: &str) -> String {
    if text.chars().count() <= SNIPPET_LEN {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(SNIPPET_LEN).collect();
        format!("{}...", truncated)
    }
}

/// Whether a bracketed token has the `<doc>_c<index>` shape of a chunk key.
fn looks_like_chunk_key(key: &str) -> bool {
    match key.rfind("_c") {
        Some(pos) if pos > 0 => {
            let digits = &key[pos + 2..];
            !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Chunk;

    fn retrieved(doc_id: &str, index: u32, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk: Chunk {
                id: format!("{}_c{}", doc_id, index),
                doc_id: doc_id.to_string(),
                doc_name: format!("{}.pdf", doc_id),
                page: index + 1,
                chunk_index: index,
                text: text.to_string(),
                embedding: vec![0.0],
            },
            score: 0.9,
        }
    }

    #[test]
    fn test_parses_full_output() {
        let context = vec![
            retrieved("d1", 0, "The facility size is EUR 40m."),
            retrieved("d1", 1, "Maturity is 5 years."),
        ];
        let raw = "The facility is EUR 40m [d1_c0], maturing in 5 years [d1_c1].\nANSWERABLE: yes\nCONFIDENCE: 0.85";

        let parsed = parse_merge_output(raw, &context).unwrap();
        assert_eq!(
            parsed.text,
            "The facility is EUR 40m [1], maturing in 5 years [2]."
        );
        assert_eq!(parsed.citations.len(), 2);
        assert_eq!(parsed.citations[0].num, 1);
        assert_eq!(parsed.citations[0].chunk_id, "d1_c0");
        assert_eq!(parsed.citations[1].num, 2);
        assert!((parsed.confidence - 0.85).abs() < 1e-6);
        assert_eq!(parsed.answerability, Answerability::Yes);
    }

    #[test]
    fn test_numbers_follow_first_appearance_order() {
        let context = vec![
            retrieved("d1", 0, "alpha"),
            retrieved("d1", 1, "beta"),
            retrieved("d1", 2, "gamma"),
        ];
        // Cited out of retrieval order
        let raw = "Claim one [d1_c2]. Claim two [d1_c0]. Claim three [d1_c1].\nCONFIDENCE: 0.5";

        let parsed = parse_merge_output(raw, &context).unwrap();
        let chunk_ids: Vec<_> = parsed.citations.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(chunk_ids, vec!["d1_c2", "d1_c0", "d1_c1"]);
        let nums: Vec<_> = parsed.citations.iter().map(|c| c.num).collect();
        assert_eq!(nums, vec![1, 2, 3]);
        assert_eq!(parsed.text, "Claim one [1]. Claim two [2]. Claim three [3].");
    }

    #[test]
    fn test_repeated_key_dedupes_to_one_citation() {
        let context = vec![retrieved("d1", 0, "alpha")];
        let raw = "First [d1_c0]. Again [d1_c0]. And again [d1_c0].\nCONFIDENCE: 0.7";

        let parsed = parse_merge_output(raw, &context).unwrap();
        assert_eq!(parsed.citations.len(), 1);
        assert_eq!(parsed.text, "First [1]. Again [1]. And again [1].");
    }

    #[test]
    fn test_unknown_chunk_key_is_stripped() {
        let context = vec![retrieved("d1", 0, "alpha")];
        let raw = "Real [d1_c0] and fabricated [ghost_c9].\nCONFIDENCE: 0.6";

        let parsed = parse_merge_output(raw, &context).unwrap();
        assert_eq!(parsed.citations.len(), 1);
        assert_eq!(parsed.text, "Real [1] and fabricated .");
    }

    #[test]
    fn test_non_key_brackets_pass_through() {
        let context = vec![retrieved("d1", 0, "alpha")];
        let raw = "See [appendix B] and [d1_c0].\nCONFIDENCE: 0.6";

        let parsed = parse_merge_output(raw, &context).unwrap();
        assert_eq!(parsed.text, "See [appendix B] and [1].");
    }

    #[test]
    fn test_missing_confidence_is_generation_error() {
        let context = vec![retrieved("d1", 0, "alpha")];
        let raw = "An answer without the trailer [d1_c0].";

        let result = parse_merge_output(raw, &context);
        assert!(matches!(result, Err(AppError::Generation(_))));
    }

    #[test]
    fn test_unparsable_confidence_is_generation_error() {
        let context = vec![retrieved("d1", 0, "alpha")];
        let raw = "An answer [d1_c0].\nCONFIDENCE: very high";

        let result = parse_merge_output(raw, &context);
        assert!(matches!(result, Err(AppError::Generation(_))));
    }

    #[test]
    fn test_empty_body_is_generation_error() {
        let context = vec![retrieved("d1", 0, "alpha")];
        let raw = "CONFIDENCE: 0.9\nANSWERABLE: yes";

        let result = parse_merge_output(raw, &context);
        assert!(matches!(result, Err(AppError::Generation(_))));
    }

    #[test]
    fn test_confidence_is_clamped() {
        let context = vec![retrieved("d1", 0, "alpha")];

        let parsed = parse_merge_output("Answer.\nCONFIDENCE: 1.7", &context).unwrap();
        assert_eq!(parsed.confidence, 1.0);

        let parsed = parse_merge_output("Answer.\nCONFIDENCE: -0.2", &context).unwrap();
        assert_eq!(parsed.confidence, 0.0);
    }

    #[test]
    fn test_final_answer_label_is_stripped() {
        let context = vec![retrieved("d1", 0, "alpha")];
        let raw = "FINAL ANSWER: The answer [d1_c0].\nCONFIDENCE: 0.8";

        let parsed = parse_merge_output(raw, &context).unwrap();
        assert_eq!(parsed.text, "The answer [1].");
    }

    #[test]
    fn test_insufficient_data_marks_partial() {
        let context = vec![retrieved("d1", 0, "alpha")];
        let raw = "INSUFFICIENT_DATA: the documents do not state the insurance coverage.\nCONFIDENCE: 0.2";

        let parsed = parse_merge_output(raw, &context).unwrap();
        assert_eq!(parsed.answerability, Answerability::Partial);
    }

    #[test]
    fn test_long_snippet_is_truncated() {
        let long_text = "x".repeat(500);
        let context = vec![retrieved("d1", 0, &long_text)];
        let raw = "Answer [d1_c0].\nCONFIDENCE: 0.5";

        let parsed = parse_merge_output(raw, &context).unwrap();
        assert!(parsed.citations[0].text.chars().count() <= SNIPPET_LEN + 3);
        assert!(parsed.citations[0].text.ends_with("..."));
    }

    #[test]
    fn test_unclosed_bracket_passes_through() {
        let context = vec![retrieved("d1", 0, "alpha")];
        let raw = "An answer [d1_c0] with a dangling [bracket\nCONFIDENCE: 0.5";

        let parsed = parse_merge_output(raw, &context).unwrap();
        assert!(parsed.text.contains("[bracket"));
        assert_eq!(parsed.citations.len(), 1);
    }
}
