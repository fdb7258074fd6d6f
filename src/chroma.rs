//! Chroma HTTP adapter for [`VectorIndex`].
//!
//! Talks to the Chroma v1 REST API:
//!
//! | Call | Endpoint |
//! |------|----------|
//! | resolve collection | `GET /api/v1/collections/{name}` |
//! | nearest neighbours | `POST /api/v1/collections/{id}/query` |
//! | count | `GET /api/v1/collections/{id}/count` |
//!
//! The collection is resolved once in [`ChromaIndex::connect`]; a failure
//! there is what puts the application into degraded mode.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use folio_rag_core::models::{DocumentChunk, Metadata, MetadataValue};
use folio_rag_core::store::{VectorIndex, VectorMatch};

use crate::config::VectorConfig;

/// A resolved Chroma collection.
pub struct ChromaIndex {
    client: reqwest::Client,
    base_url: String,
    collection_id: String,
    collection_name: String,
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    id: String,
    name: String,
}

/// Column-oriented query result; one inner list per query embedding.
#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    documents: Vec<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Vec<Vec<Option<serde_json::Map<String, Value>>>>,
    #[serde(default)]
    distances: Vec<Vec<f64>>,
}

impl ChromaIndex {
    /// Resolve `collection` on the server at `base_url`.
    pub async fn connect(base_url: &str, collection: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let url = format!("{}/api/v1/collections/{}", base_url, collection);
        let response = client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach Chroma at {}", base_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Chroma collection '{}' unavailable ({}): {}", collection, status, body);
        }

        let info: CollectionInfo = response
            .json()
            .await
            .with_context(|| "Invalid Chroma collection response")?;
        tracing::info!(collection = %info.name, id = %info.id, "connected to vector index");

        Ok(Self {
            client,
            base_url,
            collection_id: info.id,
            collection_name: info.name,
        })
    }

    pub async fn from_config(config: &VectorConfig) -> Result<Self> {
        Self::connect(
            &config.url,
            &config.collection,
            Duration::from_secs(config.timeout_secs),
        )
        .await
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    fn collection_url(&self, action: &str) -> String {
        format!(
            "{}/api/v1/collections/{}/{}",
            self.base_url, self.collection_id, action
        )
    }
}

fn query_body(vector: &[f32], k: usize, category_filter: Option<&[&str]>) -> Value {
    let mut body = serde_json::json!({
        "query_embeddings": [vector],
        "n_results": k,
        "include": ["documents", "metadatas", "distances"],
    });
    if let Some(categories) = category_filter {
        body["where"] = serde_json::json!({ "category": { "$in": categories } });
    }
    body
}

fn to_metadata(raw: Option<serde_json::Map<String, Value>>) -> Metadata {
    raw.unwrap_or_default()
        .into_iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Value::String(s) => MetadataValue::Text(s),
                Value::Number(n) => MetadataValue::Number(n.as_f64()?),
                Value::Bool(b) => MetadataValue::Text(b.to_string()),
                _ => return None,
            };
            Some((key, value))
        })
        .collect()
}

fn to_matches(response: QueryResponse) -> Vec<VectorMatch> {
    let documents = response.documents.into_iter().next().unwrap_or_default();
    let mut metadatas = response
        .metadatas
        .into_iter()
        .next()
        .unwrap_or_default()
        .into_iter();
    let distances = response.distances.into_iter().next().unwrap_or_default();

    documents
        .into_iter()
        .zip(distances)
        .filter_map(|(document, distance)| {
            let metadata = to_metadata(metadatas.next().flatten());
            Some(VectorMatch {
                chunk: DocumentChunk {
                    content: document?,
                    metadata,
                },
                distance,
            })
        })
        .collect()
}

#[async_trait]
impl VectorIndex for ChromaIndex {
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        category_filter: Option<&[&str]>,
    ) -> Result<Vec<VectorMatch>> {
        let response = self
            .client
            .post(self.collection_url("query"))
            .json(&query_body(vector, k, category_filter))
            .send()
            .await
            .with_context(|| "Chroma query request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Chroma query error {}: {}", status, body);
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .with_context(|| "Invalid Chroma query response")?;
        let mut matches = to_matches(parsed);
        matches.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(k);
        Ok(matches)
    }

    async fn count(&self) -> Result<usize> {
        let response = self
            .client
            .get(self.collection_url("count"))
            .send()
            .await
            .with_context(|| "Chroma count request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Chroma count error {}: {}", status, body);
        }

        let count: usize = response
            .json()
            .await
            .with_context(|| "Invalid Chroma count response")?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_body_with_filter() {
        let body = query_body(&[0.5, 0.5], 6, Some(&["projects", "experience"]));
        assert_eq!(body["n_results"], 6);
        assert_eq!(
            body["where"],
            serde_json::json!({"category": {"$in": ["projects", "experience"]}})
        );
    }

    #[test]
    fn test_query_body_without_filter() {
        let body = query_body(&[1.0], 3, None);
        assert!(body.get("where").is_none());
    }

    #[test]
    fn test_to_matches_skips_missing_documents() {
        let response: QueryResponse = serde_json::from_value(serde_json::json!({
            "ids": [["a", "b"]],
            "documents": [["first", null]],
            "metadatas": [[{"category": "projects", "year": 2023, "featured": true}, null]],
            "distances": [[0.1, 0.2]]
        }))
        .unwrap();

        let matches = to_matches(response);
        assert_eq!(matches.len(), 1);
        let chunk = &matches[0].chunk;
        assert_eq!(chunk.content, "first");
        assert_eq!(chunk.category(), Some("projects"));
        assert_eq!(
            chunk.metadata.get("year"),
            Some(&MetadataValue::Number(2023.0))
        );
        assert_eq!(
            chunk.metadata.get("featured"),
            Some(&MetadataValue::Text("true".into()))
        );
    }
}
