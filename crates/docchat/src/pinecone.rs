//! Pinecone-backed [`VectorIndex`].
//!
//! Talks to a Pinecone index's data-plane REST API at `vector.host`:
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | upsert | `POST /vectors/upsert` |
//! | query  | `POST /query` with `filter: {document_id: {$eq}}` |
//! | delete | `POST /vectors/delete` with the same filter |
//!
//! The API key is read from the environment variable named by
//! `vector.api_key_env` and sent as the `Api-Key` header.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use docchat_core::index::{
    check_namespace, rank_matches, ChunkMetadata, IndexEntry, IndexError, IndexMatch,
    MetadataFilter, VectorIndex,
};

use crate::config::VectorConfig;
use crate::retry::{send_with_retry, HttpFailure};

impl From<HttpFailure> for IndexError {
    fn from(failure: HttpFailure) -> Self {
        match failure {
            HttpFailure::Network(msg) => IndexError::Request(msg),
            HttpFailure::Status { status, body } => IndexError::Status { status, body },
        }
    }
}

pub struct PineconeIndex {
    client: reqwest::Client,
    host: String,
    api_key: String,
    max_retries: u32,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<PineconeMatch>,
}

#[derive(Debug, Deserialize)]
struct PineconeMatch {
    id: String,
    score: f32,
    metadata: Option<PineconeMetadata>,
}

/// Pinecone returns every numeric metadata value as a float. Records
/// written by other tools may lack any field.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PineconeMetadata {
    document_id: Option<String>,
    user_id: Option<String>,
    chunk_number: Option<f64>,
    text: String,
}

impl PineconeMetadata {
    fn into_chunk_metadata(self) -> Option<ChunkMetadata> {
        Some(ChunkMetadata {
            document_id: self.document_id?,
            user_id: self.user_id?,
            chunk_number: self.chunk_number? as i64,
            text: self.text,
        })
    }
}

impl PineconeIndex {
    pub fn new(config: &VectorConfig) -> Result<Self> {
        let host = config
            .host
            .clone()
            .context("vector.host required for pinecone provider")?;
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("{} environment variable not set", config.api_key_env))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            api_key,
            max_retries: config.max_retries,
        })
    }

    async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, IndexError> {
        let url = format!("{}{}", self.host, path);
        let response = send_with_retry("pinecone", self.max_retries, || {
            self.client
                .post(&url)
                .header("Api-Key", &self.api_key)
                .json(body)
        })
        .await?;
        Ok(response)
    }
}

fn filter_json(filter: &MetadataFilter) -> serde_json::Value {
    json!({ "document_id": { "$eq": filter.document_id } })
}

/// Convert a raw query response, dropping matches whose metadata is
/// missing or belongs to another document.
fn convert_matches(response: QueryResponse, filter: &MetadataFilter) -> Vec<IndexMatch> {
    response
        .matches
        .into_iter()
        .filter_map(|m| {
            let metadata = m.metadata?.into_chunk_metadata()?;
            filter.matches(&metadata).then_some(IndexMatch {
                id: m.id,
                score: m.score,
                metadata,
            })
        })
        .collect()
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, namespace: &str, entry: IndexEntry) -> Result<(), IndexError> {
        check_namespace(namespace, &entry)?;
        let body = json!({
            "namespace": namespace,
            "vectors": [{
                "id": entry.id,
                "values": entry.vector,
                "metadata": entry.metadata,
            }],
        });
        self.post("/vectors/upsert", &body).await?;
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        filter: &MetadataFilter,
        top_k: usize,
    ) -> Result<Vec<IndexMatch>, IndexError> {
        let body = json!({
            "namespace": namespace,
            "vector": vector,
            "topK": top_k,
            "filter": filter_json(filter),
            "includeMetadata": true,
        });
        let response: QueryResponse = self
            .post("/query", &body)
            .await?
            .json()
            .await
            .map_err(|e| IndexError::MalformedResponse(e.to_string()))?;

        Ok(rank_matches(convert_matches(response, filter), top_k))
    }

    async fn delete(&self, namespace: &str, filter: &MetadataFilter) -> Result<(), IndexError> {
        let body = json!({
            "namespace": namespace,
            "filter": filter_json(filter),
        });
        self.post("/vectors/delete", &body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_shape() {
        let f = filter_json(&MetadataFilter::document("d1"));
        assert_eq!(f, json!({"document_id": {"$eq": "d1"}}));
    }

    #[test]
    fn test_convert_matches_drops_foreign_and_bare_hits() {
        let raw: QueryResponse = serde_json::from_value(json!({
            "matches": [
                {"id": "d1#chunk_0", "score": 0.8, "metadata": {
                    "document_id": "d1", "user_id": "u1", "chunk_number": 0.0, "text": "hello"}},
                {"id": "d2#chunk_0", "score": 0.9, "metadata": {
                    "document_id": "d2", "user_id": "u1", "chunk_number": 0, "text": "other"}},
                {"id": "d1#chunk_1", "score": 0.7}
            ],
            "namespace": "u1"
        }))
        .unwrap();

        let hits = convert_matches(raw, &MetadataFilter::document("d1"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.text, "hello");
        assert_eq!(hits[0].metadata.chunk_number, 0);
    }

    #[test]
    fn test_incomplete_metadata_drops_only_that_hit() {
        let raw: QueryResponse = serde_json::from_value(json!({
            "matches": [
                {"id": "d1#chunk_0", "score": 0.9, "metadata": {
                    "document_id": "d1", "chunk_number": 0.0, "text": "no owner"}},
                {"id": "d1#chunk_1", "score": 0.8, "metadata": {
                    "user_id": "u1", "chunk_number": 1.0, "text": "no document"}},
                {"id": "d1#chunk_2", "score": 0.7, "metadata": {
                    "document_id": "d1", "user_id": "u1", "chunk_number": 2.0, "text": "kept"}}
            ]
        }))
        .unwrap();

        let hits = convert_matches(raw, &MetadataFilter::document("d1"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "d1#chunk_2");
        assert_eq!(hits[0].metadata.text, "kept");
    }

    #[test]
    fn test_empty_query_response() {
        let raw: QueryResponse = serde_json::from_value(json!({"namespace": "u1"})).unwrap();
        assert!(convert_matches(raw, &MetadataFilter::document("d1")).is_empty());
    }
}
