//! Intent-conditioned query expansion.
//!
//! Appends intent-specific vocabulary to the raw query so the embedding
//! lands nearer to richly-described chunks. Deterministic and infallible;
//! intents without an expansion pass the query through unchanged.

use crate::intent::Intent;

const COUNT_WORDS: &[&str] = &["how many", "count", "number of", "list"];

/// Expand `query` for the given intent.
pub fn rewrite_query(query: &str, intent: Intent) -> String {
    let suffix = match intent {
        Intent::QuickAnswer => quick_answer_suffix(&query.to_lowercase()),
        Intent::ProjectDeepdive => Some("project architecture implementation tech stack"),
        Intent::ExperienceDeepdive => Some("role responsibilities achievements company"),
        Intent::CodeWalkthrough => Some("code implementation example snippet"),
        Intent::SkillAssessment => Some("skills experience proficiency level"),
        Intent::Comparison | Intent::Tour | Intent::General => None,
    };

    match suffix {
        Some(s) => format!("{query} {s}"),
        None => query.to_string(),
    }
}

/// Quick answers are only expanded for counting/listing questions.
fn quick_answer_suffix(lower: &str) -> Option<&'static str> {
    if !COUNT_WORDS.iter().any(|w| lower.contains(w)) {
        return None;
    }
    if lower.contains("project") {
        return Some("projects portfolio work built developed");
    }
    if ["experience", "company", "work"]
        .iter()
        .any(|w| lower.contains(w))
    {
        return Some("experience company role position");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deepdive_expansion() {
        assert_eq!(
            rewrite_query("tell me about the search service", Intent::ProjectDeepdive),
            "tell me about the search service project architecture implementation tech stack"
        );
    }

    #[test]
    fn test_general_passthrough() {
        assert_eq!(rewrite_query("hello there", Intent::General), "hello there");
        assert_eq!(rewrite_query("compare a and b", Intent::Comparison), "compare a and b");
        assert_eq!(rewrite_query("give me a tour", Intent::Tour), "give me a tour");
    }

    #[test]
    fn test_quick_answer_counting_projects() {
        assert_eq!(
            rewrite_query("How many projects are there?", Intent::QuickAnswer),
            "How many projects are there? projects portfolio work built developed"
        );
    }

    #[test]
    fn test_quick_answer_counting_companies() {
        assert_eq!(
            rewrite_query("list every company", Intent::QuickAnswer),
            "list every company experience company role position"
        );
    }

    #[test]
    fn test_quick_answer_plain_question_unchanged() {
        assert_eq!(
            rewrite_query("what is the email address?", Intent::QuickAnswer),
            "what is the email address?"
        );
    }
}
