//! Intent labels and the per-intent retrieval table.
//!
//! Every supported intent maps to exactly one [`RetrievalConfig`] through an
//! exhaustive `match`, so adding an intent without deciding its retrieval
//! parameters is a compile error. Labels that don't name an intent resolve
//! to [`Intent::General`] via [`Intent::parse_or_general`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What the user is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    QuickAnswer,
    ProjectDeepdive,
    ExperienceDeepdive,
    CodeWalkthrough,
    SkillAssessment,
    Comparison,
    Tour,
    General,
}

/// Retrieval parameters for one intent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalConfig {
    /// Restrict semantic search to these `category` values; `None` searches everything.
    pub category_filter: Option<&'static [&'static str]>,
    /// Number of candidates to return.
    pub k: usize,
    /// Minimum semantic similarity for a candidate to count as a match.
    pub similarity_threshold: f64,
}

const BROAD_CATEGORIES: &[&str] = &["profile", "skills", "projects", "experience"];
const PROJECTS: &[&str] = &["projects"];
const EXPERIENCE: &[&str] = &["experience"];
const CODE: &[&str] = &["code_snippets", "projects"];
const SKILLS: &[&str] = &["skills", "assessments"];
const COMPARABLE: &[&str] = &["projects", "experience", "skills"];

impl Intent {
    pub const ALL: [Intent; 8] = [
        Intent::QuickAnswer,
        Intent::ProjectDeepdive,
        Intent::ExperienceDeepdive,
        Intent::CodeWalkthrough,
        Intent::SkillAssessment,
        Intent::Comparison,
        Intent::Tour,
        Intent::General,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Intent::QuickAnswer => "quick_answer",
            Intent::ProjectDeepdive => "project_deepdive",
            Intent::ExperienceDeepdive => "experience_deepdive",
            Intent::CodeWalkthrough => "code_walkthrough",
            Intent::SkillAssessment => "skill_assessment",
            Intent::Comparison => "comparison",
            Intent::Tour => "tour",
            Intent::General => "general",
        }
    }

    /// Resolve a label, falling back to [`Intent::General`] for anything unknown.
    pub fn parse_or_general(label: &str) -> Intent {
        label.parse().unwrap_or(Intent::General)
    }

    pub fn retrieval_config(self) -> RetrievalConfig {
        match self {
            Intent::QuickAnswer => RetrievalConfig {
                category_filter: Some(BROAD_CATEGORIES),
                k: 3,
                similarity_threshold: 0.3,
            },
            Intent::ProjectDeepdive => RetrievalConfig {
                category_filter: Some(PROJECTS),
                k: 3,
                similarity_threshold: 0.25,
            },
            Intent::ExperienceDeepdive => RetrievalConfig {
                category_filter: Some(EXPERIENCE),
                k: 3,
                similarity_threshold: 0.25,
            },
            Intent::CodeWalkthrough => RetrievalConfig {
                category_filter: Some(CODE),
                k: 3,
                similarity_threshold: 0.3,
            },
            Intent::SkillAssessment => RetrievalConfig {
                category_filter: Some(SKILLS),
                k: 3,
                similarity_threshold: 0.25,
            },
            Intent::Comparison => RetrievalConfig {
                category_filter: Some(COMPARABLE),
                k: 4,
                similarity_threshold: 0.3,
            },
            Intent::Tour => RetrievalConfig {
                category_filter: Some(BROAD_CATEGORIES),
                k: 3,
                similarity_threshold: 0.35,
            },
            Intent::General => RetrievalConfig {
                category_filter: None,
                k: 3,
                similarity_threshold: 0.35,
            },
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for labels that don't name an intent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown intent: '{0}'")]
pub struct UnknownIntent(pub String);

impl FromStr for Intent {
    type Err = UnknownIntent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_ascii_lowercase();
        Intent::ALL
            .into_iter()
            .find(|i| i.as_str() == label)
            .ok_or(UnknownIntent(label))
    }
}
