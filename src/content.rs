//! Content Selector
//!
//! Picks a bounded, query-relevant excerpt from one document: the lead, the
//! conclusion, and up to three interior paragraphs that mention the query.

use lazy_static::lazy_static;
use regex::Regex;

/// Interior paragraphs kept at most
const MAX_MIDDLE_PARAGRAPHS: usize = 3;

const ELLIPSIS: &str = "...";

const STOP_WORDS: &[&str] = &[
    "what", "when", "where", "which", "how", "why", "does", "with", "from", "about",
];

lazy_static! {
    static ref PARAGRAPH_BREAK: Regex =
        Regex::new(r"\r?\n[ \t]*\r?\n").expect("paragraph break regex");
}

/// Select an excerpt of at most `max_length` characters.
pub fn select(content: &str, query: &str, max_length: usize) -> String {
    let paragraphs: Vec<&str> = PARAGRAPH_BREAK
        .split(content)
        .map(|p| p.trim_matches(|c| c == '\r' || c == '\n'))
        .filter(|p| !p.trim().is_empty())
        .collect();

    let mut picked: Vec<&str> = Vec::new();
    picked.extend(paragraphs.iter().take(2));

    if paragraphs.len() > 2 {
        let keywords = keywords(query);
        let interior = &paragraphs[2..paragraphs.len() - 1];
        picked.extend(select_interior(interior, &keywords));
        picked.push(paragraphs[paragraphs.len() - 1]);
    }

    truncate(&picked.join("\n\n"), max_length)
}

/// Query words longer than three characters, punctuation trimmed, stop words
/// removed. Repeats are kept, so a repeated word weighs more in scoring.
pub fn keywords(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|word| {
            word.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|word| word.chars().count() > 3 && !STOP_WORDS.contains(&word.as_str()))
        .collect()
}

fn score(paragraph: &str, keywords: &[String]) -> usize {
    let lower = paragraph.to_lowercase();
    keywords.iter().filter(|k| lower.contains(k.as_str())).count()
}

/// Top-scoring paragraphs in document order. Ties go to the earlier paragraph.
fn select_interior<'a>(interior: &[&'a str], keywords: &[String]) -> Vec<&'a str> {
    if keywords.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(usize, usize)> = interior
        .iter()
        .enumerate()
        .map(|(idx, p)| (idx, score(p, keywords)))
        .filter(|(_, s)| *s > 0)
        .collect();

    // stable: equal scores keep document order
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.truncate(MAX_MIDDLE_PARAGRAPHS);
    scored.sort_by_key(|(idx, _)| *idx);

    scored.into_iter().map(|(idx, _)| interior[idx]).collect()
}

/// Character-based truncation with a trailing ellipsis.
pub fn truncate(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        return text.to_string();
    }
    if max_length < ELLIPSIS.len() {
        return text.chars().take(max_length).collect();
    }

    let mut out: String = text.chars().take(max_length - ELLIPSIS.len()).collect();
    out.push_str(ELLIPSIS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> String {
        [
            "Lead paragraph about the topic.",
            "Second paragraph with background.",
            "The Eiffel Tower was completed in 1889 for the World's Fair.",
            "Unrelated filler about weather patterns.",
            "More filler discussing local cuisine.",
            "Closing remarks and conclusion.",
        ]
        .join("\n\n")
    }

    #[test]
    fn test_keeps_lead_relevant_middle_and_conclusion() {
        let out = select(&document(), "When was the Eiffel Tower completed?", 2000);

        assert!(out.starts_with("Lead paragraph about the topic.\n\nSecond paragraph"));
        assert!(out.contains("The Eiffel Tower was completed in 1889 for the World's Fair."));
        assert!(!out.contains("weather"));
        assert!(!out.contains("cuisine"));
        assert!(out.ends_with("Closing remarks and conclusion."));
    }

    #[test]
    fn test_deterministic() {
        let doc = document();
        let a = select(&doc, "eiffel tower history", 120);
        let b = select(&doc, "eiffel tower history", 120);
        assert_eq!(a, b);
    }

    #[test]
    fn test_respects_cap() {
        let long = "word ".repeat(2000);
        let out = select(&long, "word", 2000);
        assert_eq!(out.chars().count(), 2000);
        assert!(out.ends_with("..."));

        let out = select(&document(), "eiffel", 10);
        assert_eq!(out, "Lead pa...");
    }

    #[test]
    fn test_multibyte_truncation() {
        let text = "ééééé ééééé";
        assert_eq!(truncate(text, 6), "ééé...");
        assert_eq!(truncate(text, 2), "éé");
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn test_short_documents() {
        assert_eq!(select("", "anything", 100), "");
        assert_eq!(select("only one", "anything", 100), "only one");
        assert_eq!(select("one\n\ntwo", "anything", 100), "one\n\ntwo");
        assert_eq!(select("one\n\ntwo\n\nthree", "anything", 100), "one\n\ntwo\n\nthree");
    }

    #[test]
    fn test_top_three_in_document_order() {
        let doc = [
            "lead one",
            "lead two",
            "rust",
            "rust async",
            "rust async tokio",
            "rust async tokio axum",
            "nothing here",
            "end",
        ]
        .join("\n\n");

        let out = select(&doc, "rust async tokio axum", 2000);
        assert_eq!(
            out,
            "lead one\n\nlead two\n\nrust async\n\nrust async tokio\n\nrust async tokio axum\n\nend"
        );
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            keywords("What is the capital of France?"),
            vec!["capital".to_string(), "france".to_string()]
        );
        assert_eq!(keywords("how does rust work with tokio"), vec!["rust", "work", "tokio"]);
        assert!(keywords("a an the").is_empty());
    }

    #[test]
    fn test_paragraphs_kept_verbatim() {
        let code = "    let tower = eiffel();\n    tower.height()";
        let doc = format!("lead\n\nsecond\n\n{}\n\nfiller\n\nend\n", code);

        let out = select(&doc, "eiffel tower", 2000);
        assert_eq!(out, format!("lead\n\nsecond\n\n{}\n\nend", code));
    }

    #[test]
    fn test_repeated_keywords_weigh_more() {
        assert_eq!(keywords("rust rust tokio"), vec!["rust", "rust", "tokio"]);

        let doc = [
            "lead one",
            "lead two",
            "tokio a",
            "tokio b",
            "tokio c",
            "rust only",
            "end",
        ]
        .join("\n\n");

        // "rust" counts twice, so it outranks the single-keyword tokio paragraphs
        let out = select(&doc, "rust rust tokio", 2000);
        assert_eq!(
            out,
            "lead one\n\nlead two\n\ntokio a\n\ntokio b\n\nrust only\n\nend"
        );
    }

    #[test]
    fn test_crlf_paragraphs() {
        let doc = "a\r\n\r\nb\r\n  \r\nmatch here\r\n\r\nz";
        let out = select(doc, "match", 100);
        assert_eq!(out, "a\n\nb\n\nmatch here\n\nz");
    }
}
