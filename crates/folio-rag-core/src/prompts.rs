//! Per-intent system prompts and follow-up suggestions.

use crate::intent::Intent;
use crate::models::Suggestion;

/// Maximum suggestions offered with one answer.
pub const MAX_SUGGESTIONS: usize = 4;

const DEFAULT_PERSONA: &str = "\
You are a knowledgeable assistant answering questions about the documents in this knowledge base.

Style:
- Professional but approachable
- Concise and clear
- Use **bold** for key terms and metrics
- Keep paragraphs short; prefer plain paragraphs over heavy markdown
- Put a blank line before any heading

Conversation:
- Use the conversation history to resolve pronouns such as \"it\" or \"those\"
- Keep continuity with what was discussed earlier

Grounding:
- Only use information from the provided context
- If the context doesn't cover the question, say you don't have details about that";

/// System prompt persona plus intent-specific guidance.
#[derive(Debug, Clone)]
pub struct PromptSet {
    persona: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            persona: DEFAULT_PERSONA.to_string(),
        }
    }
}

impl PromptSet {
    pub fn new(persona: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
        }
    }

    pub fn persona(&self) -> &str {
        &self.persona
    }

    pub fn system_prompt(&self, intent: Intent) -> String {
        format!("{}\n\nFor this response:\n{}", self.persona, guidance(intent))
    }

    pub fn suggestions(&self, intent: Intent) -> Vec<Suggestion> {
        suggestion_table(intent)
            .iter()
            .take(MAX_SUGGESTIONS)
            .map(|(label, action, target)| Suggestion {
                label: label.to_string(),
                action: action.to_string(),
                target: target.to_string(),
            })
            .collect()
    }
}

fn guidance(intent: Intent) -> &'static str {
    match intent {
        Intent::QuickAnswer => {
            "- Be brief (2-3 sentences)\n- No headers\n- Answer directly in a single paragraph"
        }
        Intent::ProjectDeepdive => {
            "- Give detailed project information\n\
             - Use ### headers only when covering several aspects\n\
             - Bold key metrics and technologies"
        }
        Intent::ExperienceDeepdive => {
            "- Use a ### header for each role\n\
             - Bold key achievements and metrics\n\
             - Keep bullet points short"
        }
        Intent::CodeWalkthrough => {
            "- Show the relevant code in fenced blocks with a language tag\n\
             - Explain what the code does step by step\n\
             - Point out notable design decisions"
        }
        Intent::SkillAssessment => {
            "- Group skills by area\n\
             - Back each claim with a project or role from the context\n\
             - Be honest about proficiency levels"
        }
        Intent::Comparison => {
            "- Compare the items side by side\n\
             - A short table is fine when it helps\n\
             - Finish with a one-sentence takeaway"
        }
        Intent::Tour => {
            "- Give a friendly overview of what is available\n\
             - Mention the main areas the user can explore\n\
             - Keep it short and end by inviting a follow-up question"
        }
        Intent::General => {
            "- Answer helpfully from the context\n- Keep it concise"
        }
    }
}

type SuggestionRow = (&'static str, &'static str, &'static str);

fn suggestion_table(intent: Intent) -> &'static [SuggestionRow] {
    match intent {
        Intent::QuickAnswer => &[
            ("Tell me about projects", "deepdive", "projects"),
            ("What's the work experience?", "deepdive", "work experience"),
        ],
        Intent::ProjectDeepdive => &[
            ("Show me the code", "code", "implementation"),
            ("Architecture details", "deepdive", "the architecture"),
            ("What challenges were faced?", "deepdive", "challenges faced"),
            ("Compare with other projects", "compare", "projects"),
        ],
        Intent::ExperienceDeepdive => &[
            ("Key achievements", "deepdive", "key achievements"),
            ("Tech stack used", "deepdive", "technologies used"),
            ("Team collaboration", "deepdive", "team collaboration"),
        ],
        Intent::CodeWalkthrough => &[
            ("Explain the design", "deepdive", "design decisions"),
            ("Show related code", "code", "related code"),
            ("Which project uses this?", "deepdive", "projects"),
        ],
        Intent::SkillAssessment => &[
            ("Backend skills details", "deepdive", "backend skills"),
            ("Projects demonstrating skills", "deepdive", "projects"),
            ("Certifications", "deepdive", "certifications"),
        ],
        Intent::Comparison => &[
            ("Compare projects", "compare", "projects"),
            ("Compare roles", "compare", "experience"),
        ],
        Intent::Tour => &[
            ("Technical skills", "deepdive", "technical skills"),
            ("Projects", "deepdive", "projects"),
            ("Work experience", "deepdive", "work experience"),
            ("Contact information", "deepdive", "contact info"),
        ],
        Intent::General => &[
            ("Profile overview", "deepdive", "profile"),
            ("Skills overview", "deepdive", "skills"),
            ("Projects overview", "deepdive", "projects"),
            ("Work experience", "deepdive", "work experience"),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_combines_persona_and_guidance() {
        let prompts = PromptSet::new("You are a test persona.");
        let prompt = prompts.system_prompt(Intent::QuickAnswer);
        assert!(prompt.starts_with("You are a test persona.\n\nFor this response:\n"));
        assert!(prompt.contains("Be brief"));
    }

    #[test]
    fn test_every_intent_has_guidance_and_bounded_suggestions() {
        let prompts = PromptSet::default();
        for intent in Intent::ALL {
            assert!(!guidance(intent).is_empty());
            let suggestions = prompts.suggestions(intent);
            assert!(!suggestions.is_empty());
            assert!(suggestions.len() <= MAX_SUGGESTIONS);
        }
    }

    #[test]
    fn test_default_persona_is_grounded() {
        assert!(PromptSet::default()
            .persona()
            .contains("Only use information from the provided context"));
    }
}
