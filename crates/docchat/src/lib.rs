//! # DocChat
//!
//! Upload PDFs, index them, and ask questions answered from their content.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────┐   ┌───────────────┐
//! │  Upload  │──▶│ Extract + Chunk  │──▶│ Vector index  │
//! │  (PDF)   │   │     + Embed      │   │ ns = user_id  │
//! └──────────┘   └──────────────────┘   └───────┬───────┘
//!                                               │ top-k
//!                ┌──────────────────┐   ┌───────▼───────┐
//!   SSE tokens ◀─│   Chat model     │◀──│ Prompt (RAG / │
//!                │   (streaming)    │   │   fallback)   │
//!                └──────────────────┘   └───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docchat init                               # create database
//! docchat serve                              # start the HTTP API
//! docchat ingest paper.pdf --user alice      # ingest from the command line
//! docchat documents --user alice             # list a user's documents
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection pool |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | Users, documents, and chat history in SQLite |
//! | [`sqlite_index`] | Local namespaced vector index |
//! | [`pinecone`] | Remote namespaced vector index |
//! | [`retry`] | Shared HTTP retry with exponential backoff |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Streaming chat-completion providers |
//! | [`extract`] | PDF text extraction |
//! | [`auth`] | Password hashing and bearer tokens |
//! | [`ingest`] | Upload → extract → chunk → embed → index pipeline |
//! | [`documents`] | Listing, deletion, chat-history read-back |
//! | [`chat`] | Retrieval-augmented streaming chat |
//! | [`services`] | Wiring of store, index, and providers |
//! | [`server`] | HTTP API |
//!
//! Domain types and pure logic (chunking, prompt assembly, ranking) live in
//! the `docchat-core` crate.

pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod documents;
pub mod embedding;
pub mod extract;
pub mod generation;
pub mod ingest;
pub mod migrate;
pub mod pinecone;
pub mod retry;
pub mod server;
pub mod services;
pub mod sqlite_index;
pub mod sqlite_store;
