//! Explicitly wired collaborators shared by every pipeline.
//!
//! Nothing in the pipelines reaches for a global client: the HTTP server,
//! the CLI, and the tests each build a [`Services`] and pass it down.

use anyhow::Result;
use std::sync::Arc;

use docchat_core::embedding::Embedder;
use docchat_core::index::VectorIndex;
use docchat_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::generation::{create_chat_model, ChatModel};
use crate::migrate::migrate_pool;
use crate::pinecone::PineconeIndex;
use crate::sqlite_index::SqliteVectorIndex;
use crate::sqlite_store::SqliteStore;

#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn Store>,
    pub index: Arc<dyn VectorIndex>,
    pub embedder: Arc<dyn Embedder>,
    pub chat_model: Arc<dyn ChatModel>,
}

impl Services {
    /// Open the database, run migrations, and build the configured providers.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate_pool(&pool).await?;

        let index: Arc<dyn VectorIndex> = match config.vector.provider.as_str() {
            "pinecone" => Arc::new(PineconeIndex::new(&config.vector)?),
            _ => Arc::new(SqliteVectorIndex::new(pool.clone())),
        };

        Ok(Self {
            store: Arc::new(SqliteStore::new(pool)),
            index,
            embedder: create_embedder(&config.embedding)?,
            chat_model: create_chat_model(&config.generation)?,
        })
    }
}
