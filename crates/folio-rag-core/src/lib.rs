//! # Folio RAG Core
//!
//! I/O-free core of Folio RAG: given a question and a classified intent,
//! pick the smallest, highest-value slice of a document corpus that fits a
//! completion model's context window, and answer from it.
//!
//! ## Pipeline
//!
//! ```text
//! query + intent
//!   → rewrite ─► embed ─► vector query ─┐
//!                                       ├─► hybrid merge ─► rerank? ─► context assembly ─► generate
//!        keyword score over results ────┘
//! ```
//!
//! Every external service (embeddings, vector store, completion model,
//! session store) sits behind a trait so the app crate can plug in HTTP
//! adapters and tests can plug in fakes.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Chunks, candidates, messages, answers |
//! | [`intent`] | Intent labels and per-intent retrieval table |
//! | [`rewrite`] | Intent-conditioned query expansion |
//! | [`keyword`] | Term-frequency scoring over candidates |
//! | [`embedding`] | `Embedder` trait and vector math |
//! | [`store`] | `VectorIndex` trait and in-memory index |
//! | [`merge`] | Weighted and reciprocal-rank fusion |
//! | [`completion`] | `CompletionClient` trait |
//! | [`rerank`] | Model-based reordering |
//! | [`retrieve`] | Retrieval orchestrator |
//! | [`tokens`] | `TokenCounter` trait and tiktoken counter |
//! | [`context`] | Token-budgeted context and history assembly |
//! | [`cache`] | TTL and capacity-bounded response cache |
//! | [`ledger`] | Token usage and cost accounting |
//! | [`prompts`] | System prompts and suggestions |
//! | [`generate`] | Answer generation with retry and streaming |
//! | [`classify`] | Rule and model intent classifiers |
//! | [`session`] | Conversation history store |
//! | [`pipeline`] | One chat message end to end |
//! | [`error`] | Typed stage errors |

pub mod cache;
pub mod classify;
pub mod completion;
pub mod context;
pub mod embedding;
pub mod error;
pub mod generate;
pub mod intent;
pub mod keyword;
pub mod ledger;
pub mod merge;
pub mod models;
pub mod pipeline;
pub mod prompts;
pub mod rerank;
pub mod retrieve;
pub mod rewrite;
pub mod session;
pub mod store;
pub mod tokens;
