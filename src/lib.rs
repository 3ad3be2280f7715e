//! # Article Harness
//!
//! Normalization, embedding and indexing for news-article exports.
//!
//! Article Harness takes arbitrarily shaped records from a content-management
//! export, turns each into a validated `{ text, metadata }` document or
//! rejects it with a diagnosable reason, then embeds the documents and
//! indexes them into a vector store for semantic search.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌───────────┐   ┌──────────────┐
//! │ Raw export │──▶│  Transform   │──▶│   Embed   │──▶│ Vector store │
//! │   (JSON)   │   │ html/extract │   │ OpenAI or │   │ memory or    │
//! └────────────┘   │ assemble     │   │ Ollama    │   │ Qdrant       │
//!                  └──────┬───────┘   └───────────┘   └──────┬───────┘
//!                         ▼                                  │
//!                  ┌──────────────┐        ┌──────────┐      │
//!                  │ Dead letters │        │ CLI/HTTP │◀─────┘
//!                  │   (JSONL)    │        │  (ahx)   │
//!                  └──────────────┘        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ahx transform export.json           # canonical documents on stdout
//! ahx run export.json                 # transform + embed + index
//! ahx search "city council budget"    # semantic search
//! ahx serve                           # HTTP service
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`html`] | HTML-to-text normalization |
//! | [`extract`] | Per-field extractors over raw records |
//! | [`models`] | Core data types |
//! | [`schema`] | Canonical document checks |
//! | [`assemble`] | One record to one document, or a rejection |
//! | [`transform`] | Batch processing and merge by external id |
//! | [`dead_letter`] | Append-only store for rejected records |
//! | [`progress`] | Batch progress reporting |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector store abstraction |
//! | [`pipeline`] | Transform, embed, index and search orchestration |
//! | [`server`] | HTTP service |
//! | [`config`] | TOML configuration parsing |

pub mod assemble;
pub mod config;
pub mod dead_letter;
pub mod embedding;
pub mod extract;
pub mod html;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod schema;
pub mod server;
pub mod store;
pub mod transform;
