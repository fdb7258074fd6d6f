//! Token usage and cost accounting.
//!
//! [`UsageLedger::track`] appends an immutable [`TokenUsageRecord`];
//! session and global totals are recomputed from the log on every query.
//! Costs come from a [`PriceTable`] of per-million-token prices, and models
//! missing from the table are priced at the table's default entry.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    pub fn cost(&self, prompt_tokens: usize, completion_tokens: usize) -> f64 {
        prompt_tokens as f64 / 1_000_000.0 * self.input_per_million
            + completion_tokens as f64 / 1_000_000.0 * self.output_per_million
    }
}

/// Per-model prices with a fallback for unknown models.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    models: HashMap<String, ModelPricing>,
    default: ModelPricing,
}

impl Default for PriceTable {
    fn default() -> Self {
        let mini = ModelPricing::new(0.15, 0.60);
        let models = HashMap::from([
            ("gpt-4o-mini".to_string(), mini),
            ("gpt-4o".to_string(), ModelPricing::new(2.50, 10.00)),
            ("text-embedding-3-small".to_string(), ModelPricing::new(0.02, 0.0)),
        ]);
        Self {
            models,
            default: mini,
        }
    }
}

impl PriceTable {
    pub fn new(default: ModelPricing) -> Self {
        Self {
            models: HashMap::new(),
            default,
        }
    }

    /// Add or replace a model's prices.
    pub fn with_model(mut self, model: impl Into<String>, pricing: ModelPricing) -> Self {
        self.models.insert(model.into(), pricing);
        self
    }

    pub fn pricing(&self, model: &str) -> ModelPricing {
        self.models.get(model).copied().unwrap_or(self.default)
    }
}

/// What a completion or embedding call was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Chat,
    ChatStream,
    Intent,
    Rerank,
    Embedding,
}

impl RequestType {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestType::Chat => "chat",
            RequestType::ChatStream => "chat_stream",
            RequestType::Intent => "intent",
            RequestType::Rerank => "rerank",
            RequestType::Embedding => "embedding",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked call. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenUsageRecord {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub model: String,
    pub request_type: RequestType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub cost_usd: f64,
}

impl TokenUsageRecord {
    pub fn total_tokens(&self) -> usize {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Aggregate for one request type.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TypeBreakdown {
    pub tokens: usize,
    pub cost_usd: f64,
    pub count: usize,
}

/// Aggregate over a set of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageStats {
    pub total_tokens: usize,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_cost_usd: f64,
    pub request_count: usize,
    pub by_type: BTreeMap<RequestType, TypeBreakdown>,
}

impl UsageStats {
    fn from_records<'a>(records: impl IntoIterator<Item = &'a TokenUsageRecord>) -> Self {
        let mut stats = UsageStats::default();
        for r in records {
            stats.total_tokens += r.total_tokens();
            stats.prompt_tokens += r.prompt_tokens;
            stats.completion_tokens += r.completion_tokens;
            stats.total_cost_usd += r.cost_usd;
            stats.request_count += 1;
            let entry = stats.by_type.entry(r.request_type).or_default();
            entry.tokens += r.total_tokens();
            entry.cost_usd += r.cost_usd;
            entry.count += 1;
        }
        stats
    }
}

/// Append-only usage log shared by all requests.
pub struct UsageLedger {
    prices: PriceTable,
    records: Mutex<Vec<TokenUsageRecord>>,
}

impl Default for UsageLedger {
    fn default() -> Self {
        Self::new(PriceTable::default())
    }
}

impl UsageLedger {
    pub fn new(prices: PriceTable) -> Self {
        Self {
            prices,
            records: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TokenUsageRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one call and return the stored record.
    pub fn track(
        &self,
        prompt_tokens: usize,
        completion_tokens: usize,
        model: &str,
        request_type: RequestType,
        session_id: Option<&str>,
    ) -> TokenUsageRecord {
        let cost_usd = self.prices.pricing(model).cost(prompt_tokens, completion_tokens);
        let record = TokenUsageRecord {
            prompt_tokens,
            completion_tokens,
            model: model.to_string(),
            request_type,
            session_id: session_id.map(str::to_string),
            timestamp: Utc::now(),
            cost_usd,
        };
        self.lock().push(record.clone());

        tracing::info!(
            total_tokens = record.total_tokens(),
            prompt_tokens,
            completion_tokens,
            model,
            request_type = %request_type,
            cost_usd,
            "token usage"
        );
        record
    }

    pub fn session_stats(&self, session_id: &str) -> UsageStats {
        let records = self.lock();
        UsageStats::from_records(
            records
                .iter()
                .filter(|r| r.session_id.as_deref() == Some(session_id)),
        )
    }

    pub fn total_stats(&self) -> UsageStats {
        UsageStats::from_records(self.lock().iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_and_total() {
        let ledger = UsageLedger::new(
            PriceTable::default().with_model("model-x", ModelPricing::new(1.0, 2.0)),
        );
        let record = ledger.track(100, 50, "model-x", RequestType::Chat, None);
        assert_eq!(record.total_tokens(), 150);

        let stats = ledger.total_stats();
        assert_eq!(stats.total_tokens, 150);
        assert_eq!(stats.request_count, 1);
        // 100 * 1.0 / 1M + 50 * 2.0 / 1M
        assert!((stats.total_cost_usd - 0.0002).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_model_uses_default_pricing() {
        let ledger = UsageLedger::default();
        let unknown = ledger.track(1_000_000, 1_000_000, "mystery-model", RequestType::Chat, None);
        let mini = ledger.track(1_000_000, 1_000_000, "gpt-4o-mini", RequestType::Chat, None);
        assert!((unknown.cost_usd - 0.75).abs() < 1e-9);
        assert!((unknown.cost_usd - mini.cost_usd).abs() < 1e-12);
    }

    #[test]
    fn test_session_stats_and_breakdown() {
        let ledger = UsageLedger::default();
        ledger.track(10, 5, "gpt-4o-mini", RequestType::Intent, Some("s1"));
        ledger.track(200, 80, "gpt-4o-mini", RequestType::Chat, Some("s1"));
        ledger.track(300, 0, "gpt-4o-mini", RequestType::Chat, Some("s2"));
        ledger.track(7, 0, "text-embedding-3-small", RequestType::Embedding, None);

        let s1 = ledger.session_stats("s1");
        assert_eq!(s1.request_count, 2);
        assert_eq!(s1.total_tokens, 295);
        assert_eq!(s1.by_type[&RequestType::Intent].count, 1);
        assert_eq!(s1.by_type[&RequestType::Chat].tokens, 280);

        let total = ledger.total_stats();
        assert_eq!(total.request_count, 4);
        assert_eq!(total.by_type[&RequestType::Chat].count, 2);
        assert_eq!(total.prompt_tokens, 517);
    }

    #[test]
    fn test_empty_session() {
        let stats = UsageLedger::default().session_stats("nobody");
        assert_eq!(stats, UsageStats::default());
    }

    #[test]
    fn test_request_type_serialises_snake_case() {
        assert_eq!(
            serde_json::to_string(&RequestType::ChatStream).unwrap(),
            "\"chat_stream\""
        );
    }
}
