//! # Folio RAG
//!
//! Intent-aware retrieval-augmented chat over a personal document corpus.
//!
//! This crate wires the I/O-free [`folio_rag_core`] pipeline to real
//! services: an OpenAI-compatible API for embeddings and chat completions,
//! and a Chroma server as the vector index.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────────────┐   ┌──────────┐
//! │   CLI    │──▶│ ChatPipeline (folio-rag-core) │──▶│  OpenAI  │
//! │ (folio)  │   │ classify→retrieve→generate    │   │  compat  │
//! └──────────┘   └──────────────┬───────────────┘   └──────────┘
//!                               ▼
//!                          ┌──────────┐
//!                          │  Chroma  │
//!                          └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | Tracing subscriber setup |
//! | [`openai`] | Embedding and chat-completion adapters |
//! | [`chroma`] | Chroma vector index adapter |
//! | [`bootstrap`] | Pipeline construction and degraded mode |
//! | [`ask`] | One-shot question |
//! | [`search`] | Retrieval inspection |
//! | [`chat`] | Interactive session |
//! | [`stats`] | Index and budget overview |

pub mod ask;
pub mod bootstrap;
pub mod chat;
pub mod chroma;
pub mod config;
pub mod logging;
pub mod openai;
pub mod search;
pub mod stats;
