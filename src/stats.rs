//! Index status and usage overview.
//!
//! `folio stats` reports whether the vector index is reachable, how many
//! chunks it holds and which budgets are in effect. The interactive chat
//! reuses [`print_pipeline_stats`] for its `/stats` command.

use anyhow::Result;

use folio_rag_core::ledger::UsageStats;
use folio_rag_core::pipeline::PipelineStats;

use crate::bootstrap::connect_index;
use crate::config::Config;

/// Run the stats command: probe the index and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    println!("Folio — Status");
    println!("==============");
    println!();

    if config.vector.is_enabled() {
        println!(
            "  Vector index: {} ({} / {})",
            config.vector.provider, config.vector.url, config.vector.collection
        );
        match connect_index(config).await {
            Some(index) => match index.count().await {
                Ok(count) => println!("  Chunks:       {}", count),
                Err(e) => println!("  Chunks:       unavailable ({})", e),
            },
            None => println!("  Status:       unreachable (degraded mode)"),
        }
    } else {
        println!("  Vector index: disabled");
    }

    println!();
    println!("  Chat model:       {}", config.llm.model);
    println!("  Embedding model:  {}", config.embedding.model);
    println!(
        "  Intent classifier: {}",
        if config.llm.uses_llm_classifier() {
            "model with rule fallback"
        } else {
            "rules"
        }
    );
    println!();
    println!("  Budgets (tokens)");
    println!("    context:  {}", config.context.max_context_tokens);
    println!(
        "    history:  {} (max {} exchanges)",
        config.context.max_history_tokens, config.context.max_history_exchanges
    );
    println!("    response: {}", config.llm.max_response_tokens);
    println!();
    if config.cache.enabled {
        println!(
            "  Cache: {} entries, TTL {}s",
            config.cache.max_size, config.cache.ttl_secs
        );
    } else {
        println!("  Cache: disabled");
    }
    println!(
        "  Sessions: {} exchanges, expire after {}s idle",
        config.session.max_history_length, config.session.expiry_secs
    );

    Ok(())
}

/// Print cache and usage counters.
pub fn print_pipeline_stats(stats: &PipelineStats) {
    let cache = &stats.cache;
    println!(
        "Cache: {}/{} entries, {} hits, {} misses ({:.2}% hit rate), TTL {}s",
        cache.size, cache.max_size, cache.hits, cache.misses, cache.hit_rate_percent, cache.ttl_seconds
    );
    print_usage("Usage (all sessions)", &stats.usage);
    if let Some(session) = &stats.session_usage {
        print_usage("Usage (this session)", session);
    }
}

fn print_usage(title: &str, usage: &UsageStats) {
    println!(
        "{}: {} requests, {} tokens ({} prompt / {} completion), ${:.6}",
        title,
        usage.request_count,
        usage.total_tokens,
        usage.prompt_tokens,
        usage.completion_tokens,
        usage.total_cost_usd
    );
    for (request_type, breakdown) in &usage.by_type {
        println!(
            "    {:<12} {:>4} calls {:>8} tokens  ${:.6}",
            request_type.to_string(),
            breakdown.count,
            breakdown.tokens,
            breakdown.cost_usd
        );
    }
}
