//! # DocChat Core
//!
//! Runtime-agnostic logic for DocChat: data models, fixed-window chunking,
//! the embedding and vector index traits, storage abstraction, and the
//! retrieval-augmented prompt assembly.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem dependencies.
//! Everything that talks to the outside world lives in the `docchat` crate
//! and plugs in through [`embedding::Embedder`], [`index::VectorIndex`], and
//! [`store::Store`].

pub mod chat;
pub mod chunk;
pub mod embedding;
pub mod index;
pub mod models;
pub mod store;
