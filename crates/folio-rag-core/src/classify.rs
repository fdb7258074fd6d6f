//! Intent classification.
//!
//! Two stages:
//!
//! 1. [`LlmClassifier`] asks the completion model for a single label and
//!    returns `Err` on a failed call or an unknown label.
//! 2. [`RuleClassifier`] scores regex pattern groups and never fails.
//!
//! [`IntentClassifier`] runs the model stage when one is configured and
//! falls back to the rules on `Err`.
//!
//! # Rule scoring
//!
//! | signal | effect |
//! |--------|--------|
//! | any pattern of an intent matches | +1.0 to that intent |
//! | current section booster | +0.3 to each boosted intent |
//! | previous topic continuity | +0.2 to related intents |
//! | message opens like a follow-up | +0.5 to the previous topic |
//! | baseline | `general` starts at 0.1 |
//!
//! The best score wins; below 0.5 the result is `general`.

use std::collections::HashMap;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};

use crate::completion::{CompletionClient, CompletionRequest};
use crate::error::ClassifyError;
use crate::intent::Intent;
use crate::ledger::{RequestType, UsageLedger};
use crate::models::ChatMessage;

const MIN_CONFIDENCE: f64 = 0.5;
const GENERAL_BASELINE: f64 = 0.1;
const SECTION_BOOST: f64 = 0.3;
const CONTINUITY_BOOST: f64 = 0.2;
const FOLLOW_UP_BOOST: f64 = 0.5;

const PATTERNS: &[(Intent, &[&str])] = &[
    (
        Intent::QuickAnswer,
        &[
            r"\b(what|who|how many|is he|is she|does he|does she|can he|can she)\b",
            r"\b(tech stack|stack|skills|experience years|years)\b",
            r"\b(email|contact|phone|linkedin|github)\b",
            r"\b(location|where|based)\b",
            r"\b(current role|current job|working at)\b",
        ],
    ),
    (
        Intent::ProjectDeepdive,
        &[
            r"\b(tell me (more )?about|explain|describe|details on)\b.*(project|pipeline|service|app)",
            r"\b(project)\b.*(detail|more|explain|architecture)",
            r"\b(how did you (build|create|implement))\b",
            r"\b(architecture|design|structure)\b.*(project)",
        ],
    ),
    (
        Intent::ExperienceDeepdive,
        &[
            r"\b(tell me (more )?about|explain|describe|details on)\b.*(experience|role|job|company)",
            r"\b(what did you do|responsibilities|achievements)\b.*(at|in|during)",
            r"\b(experience at|role at|work at|worked at)\b",
        ],
    ),
    (
        Intent::CodeWalkthrough,
        &[
            r"\b(show|display|see)\b.*(code|implementation|snippet)",
            r"\b(how (is|did you) implement)\b",
            r"\b(rate limit|chunking|async|pipeline)\b.*(code|implement)",
            r"\b(code for|implementation of)\b",
        ],
    ),
    (
        Intent::SkillAssessment,
        &[
            r"\b(fit|suitable|good|qualified)\b.*(for|as|role)",
            r"\b(backend|frontend|python|rust|senior)\b.*(role|engineer|developer|position)",
            r"\b(rate|assess|evaluate)\b.*(skills|experience|fit)",
            r"\b(match|suitable for|right for)\b.*(job|role|position)",
            r"\b(hire|hiring|recruitment)\b",
        ],
    ),
    (
        Intent::Comparison,
        &[
            r"\b(compare|comparison|difference|vs|versus)\b",
            r"\b(how does .* differ|what.s the difference)\b",
            r"\b(pro.? and con|trade.?off)\b",
        ],
    ),
    (
        Intent::Tour,
        &[
            r"\b(tour|walk me through|overview|introduction|start)\b",
            r"\b(guide|guided|walkthrough)\b",
            r"\b(show me around|explore)\b",
        ],
    ),
];

const FOLLOW_UP_PATTERNS: &[&str] = &[
    r"^(tell me more|more details|explain|go on|continue)",
    r"^(what about|how about|and)",
    r"^(yes|sure|okay|please)",
];

/// Which intents a UI section makes more likely.
fn section_boosts(section: &str) -> &'static [Intent] {
    match section {
        "projects" => &[Intent::ProjectDeepdive, Intent::CodeWalkthrough],
        "experience" => &[Intent::ExperienceDeepdive],
        "skills" => &[Intent::SkillAssessment, Intent::QuickAnswer],
        "about" | "contact" => &[Intent::QuickAnswer],
        _ => &[],
    }
}

/// Signals beyond the message text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifierContext {
    /// Section of the UI the user is looking at, e.g. `"projects"`.
    pub current_section: Option<String>,
    /// Intent of the previous exchange in this session.
    pub previous_topic: Option<Intent>,
}

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Deterministic pattern-scoring classifier.
#[derive(Debug, Clone)]
pub struct RuleClassifier {
    patterns: Vec<(Intent, Vec<Regex>)>,
    follow_ups: Vec<Regex>,
}

impl RuleClassifier {
    pub fn new() -> Result<Self, regex::Error> {
        let patterns = PATTERNS
            .iter()
            .map(|(intent, group)| {
                group
                    .iter()
                    .map(|p| compile(p))
                    .collect::<Result<Vec<_>, _>>()
                    .map(|compiled| (*intent, compiled))
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        let follow_ups = FOLLOW_UP_PATTERNS
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns,
            follow_ups,
        })
    }

    /// Add deployment-specific patterns (e.g. company or project names) to an intent.
    pub fn with_patterns(mut self, intent: Intent, extra: &[String]) -> Result<Self, regex::Error> {
        let compiled = extra.iter().map(|p| compile(p)).collect::<Result<Vec<_>, _>>()?;
        match self.patterns.iter_mut().find(|(i, _)| *i == intent) {
            Some((_, group)) => group.extend(compiled),
            None => self.patterns.push((intent, compiled)),
        }
        Ok(self)
    }

    /// Score every intent for `message`.
    pub fn scores(&self, message: &str, ctx: &ClassifierContext) -> HashMap<Intent, f64> {
        let message = message.trim().to_lowercase();
        let mut scores: HashMap<Intent, f64> = Intent::ALL.iter().map(|i| (*i, 0.0)).collect();
        scores.insert(Intent::General, GENERAL_BASELINE);

        for (intent, group) in &self.patterns {
            if group.iter().any(|re| re.is_match(&message)) {
                *scores.entry(*intent).or_insert(0.0) += 1.0;
            }
        }

        if let Some(section) = ctx.current_section.as_deref() {
            for intent in section_boosts(section) {
                *scores.entry(*intent).or_insert(0.0) += SECTION_BOOST;
            }
        }

        if let Some(previous) = ctx.previous_topic {
            let related: &[Intent] = match previous {
                Intent::ProjectDeepdive | Intent::CodeWalkthrough => {
                    &[Intent::CodeWalkthrough, Intent::ProjectDeepdive]
                }
                Intent::ExperienceDeepdive => &[Intent::ExperienceDeepdive],
                _ => &[],
            };
            for intent in related {
                *scores.entry(*intent).or_insert(0.0) += CONTINUITY_BOOST;
            }

            if self.follow_ups.iter().any(|re| re.is_match(&message)) {
                *scores.entry(previous).or_insert(0.0) += FOLLOW_UP_BOOST;
            }
        }

        scores
    }

    pub fn classify(&self, message: &str, ctx: &ClassifierContext) -> Intent {
        let scores = self.scores(message, ctx);

        // First intent in declaration order wins ties.
        let mut best = Intent::General;
        let mut best_score = f64::MIN;
        for intent in Intent::ALL {
            let score = scores.get(&intent).copied().unwrap_or(0.0);
            if score > best_score {
                best = intent;
                best_score = score;
            }
        }

        tracing::debug!(intent = %best, score = best_score, "rule classifier");
        if best_score < MIN_CONFIDENCE {
            return Intent::General;
        }
        best
    }
}

/// Classifier that asks the completion model for a label.
pub struct LlmClassifier {
    client: Arc<dyn CompletionClient>,
    ledger: Option<Arc<UsageLedger>>,
}

impl LlmClassifier {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client,
            ledger: None,
        }
    }

    pub fn with_ledger(mut self, ledger: Arc<UsageLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub async fn classify(
        &self,
        message: &str,
        ctx: &ClassifierContext,
        session_id: Option<&str>,
    ) -> Result<Intent, ClassifyError> {
        let request = CompletionRequest::new(vec![ChatMessage::user(build_prompt(message, ctx))], 0.0, 20);
        let response = self.client.complete(&request).await?;

        if let (Some(ledger), Some(usage)) = (&self.ledger, response.usage) {
            ledger.track(
                usage.prompt_tokens,
                usage.completion_tokens,
                self.client.model_name(),
                RequestType::Intent,
                session_id,
            );
        }

        let label = response.text.trim().to_lowercase();
        label
            .parse::<Intent>()
            .map_err(|_| ClassifyError::UnknownLabel(label))
    }
}

fn build_prompt(message: &str, ctx: &ClassifierContext) -> String {
    let labels: Vec<&str> = Intent::ALL.iter().map(|i| i.as_str()).collect();
    format!(
        "Classify the user's message into ONE of these intents:\n\
         - quick_answer: simple factual questions (contact info, years of experience, location, tech stack)\n\
         - project_deepdive: wants details about a specific project\n\
         - experience_deepdive: wants details about work at a company or role\n\
         - code_walkthrough: wants to see code or implementation details\n\
         - skill_assessment: evaluating fit for a role or assessing skills\n\
         - comparison: comparing two things\n\
         - tour: wants an overview or introduction\n\
         - general: anything else, casual conversation, unclear intent\n\n\
         Current section: {}\n\
         Previous topic: {}\n\n\
         User message: {message}\n\n\
         Respond with ONLY one of: {}",
        ctx.current_section.as_deref().unwrap_or("none"),
        ctx.previous_topic.map(Intent::as_str).unwrap_or("none"),
        labels.join(", "),
    )
}

/// Model classifier with a rule-based fallback.
pub struct IntentClassifier {
    rules: RuleClassifier,
    llm: Option<LlmClassifier>,
}

impl IntentClassifier {
    pub fn new(rules: RuleClassifier) -> Self {
        Self { rules, llm: None }
    }

    pub fn with_llm(mut self, llm: LlmClassifier) -> Self {
        self.llm = Some(llm);
        self
    }

    pub async fn classify(
        &self,
        message: &str,
        ctx: &ClassifierContext,
        session_id: Option<&str>,
    ) -> Intent {
        let Some(llm) = &self.llm else {
            return self.rules.classify(message, ctx);
        };
        match llm.classify(message, ctx, session_id).await {
            Ok(intent) => intent,
            Err(e) => {
                tracing::warn!(error = %e, "model intent classification failed, using rules");
                self.rules.classify(message, ctx)
            }
        }
    }
}
