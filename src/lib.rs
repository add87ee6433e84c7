//! # repo-rag
//!
//! An HTTP service that turns git repositories into a question-answering
//! knowledge base. A repository is cloned and flattened into one text
//! document, which is chunked, embedded and indexed in the background while
//! the client polls a task id. Questions are answered by a language model
//! grounded in retrieved chunks.
//!
//! ## Flow
//!
//! ```text
//!  POST /process-repo/                       POST /query/
//!         │                                        │
//!         ▼                                        ▼
//!  ┌──────────────┐  digest file  ┌──────────────────────────┐
//!  │ RepoFetcher   ├─────────────▶│ RetrievalIndex::insert    │ (background)
//!  │ clone + walk  │              │ chunk → embed → store     │
//!  └──────────────┘              └────────────┬─────────────┘
//!         │ task_id                            │
//!         ▼                                    ▼
//!  GET /status/{task_id}         vector / BM25 / RRF retrieval
//!                                               │
//!                                               ▼
//!                                     Ollama chat completion
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for the server, hand-off and models
//! - [`models`] - Task status and request/response types
//! - [`tasks`] - In-memory task registry
//! - [`ingest`] - Fetch-then-insert orchestration with background tasks
//! - [`git`] - Repository source resolution, cloning, walking and flattening
//! - [`chunking`] - Token counting and overlapping token-window chunking
//! - [`llm::embeddings`] - Batch embedding generation via Ollama
//! - [`llm::completion`] - Chat completion via Ollama
//! - [`search::bm25`] - BM25 keyword index powered by tantivy
//! - [`search::vector`] - Chunk vector store with cosine similarity and disk persistence
//! - [`search::hybrid`] - Reciprocal Rank Fusion of keyword and vector results
//! - [`rag`] - The retrieval index, its storages and query modes
//! - [`api`] - Axum HTTP handlers
//! - [`state`] - Shared application state

pub mod api;
pub mod chunking;
pub mod config;
pub mod git;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod rag;
pub mod search;
pub mod state;
pub mod tasks;
