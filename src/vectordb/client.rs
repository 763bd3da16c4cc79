use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, DeletePointsBuilder,
    Distance, FieldType, Filter, PointStruct, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder,
};

use super::error::VectorStoreError;
use super::model::{EmbeddedChunk, SearchHit, point_id, sort_hits};

/// Scoped vector store interface used by the indexer and the agents.
///
/// One collection holds every game's chunks; payload indexes on `game_id`
/// and `document_id` keep scoped search and delete cheap.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Creates the collection and its payload indexes if absent.
    async fn ensure_collection(&self) -> Result<(), VectorStoreError>;

    /// Writes all points for a document. Returns the number written.
    async fn upsert(
        &self,
        game_id: &str,
        document_id: &str,
        chunks: Vec<EmbeddedChunk>,
    ) -> Result<usize, VectorStoreError>;

    /// Nearest neighbors within a single game.
    async fn search(
        &self,
        game_id: &str,
        query: Vec<f32>,
        limit: u64,
    ) -> Result<Vec<SearchHit>, VectorStoreError>;

    /// Removes every point belonging to a document. Idempotent.
    async fn delete_document(&self, document_id: &str) -> Result<(), VectorStoreError>;
}

#[derive(Clone)]
/// Qdrant-backed [`VectorStore`].
pub struct QdrantVectorStore {
    client: Qdrant,
    url: String,
    collection: String,
    vector_size: u64,
}

impl QdrantVectorStore {
    /// Connects to `url`; operations share a bounded deadline.
    pub async fn new(
        url: &str,
        collection: &str,
        vector_size: u64,
        timeout_secs: u64,
    ) -> Result<Self, VectorStoreError> {
        let client = Qdrant::from_url(url)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| VectorStoreError::ConnectionFailed {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            url: url.to_string(),
            collection: collection.to_string(),
            vector_size,
        })
    }

    /// Returns the configured URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Performs a basic health check request.
    pub async fn health_check(&self) -> Result<(), VectorStoreError> {
        self.client
            .health_check()
            .await
            .map_err(|e| VectorStoreError::ConnectionFailed {
                url: self.url.clone(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn create_payload_index(&self, field: &str) -> Result<(), VectorStoreError> {
        self.client
            .create_field_index(CreateFieldIndexCollectionBuilder::new(
                &self.collection,
                field,
                FieldType::Keyword,
            ))
            .await
            .map_err(|e| VectorStoreError::CreateIndexFailed {
                collection: self.collection.clone(),
                field: field.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn ensure_collection(&self) -> Result<(), VectorStoreError> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| VectorStoreError::CreateCollectionFailed {
                collection: self.collection.clone(),
                message: e.to_string(),
            })?;

        if !exists {
            let vectors_config = VectorParamsBuilder::new(self.vector_size, Distance::Cosine);

            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection)
                        .vectors_config(vectors_config)
                        .on_disk_payload(true),
                )
                .await
                .map_err(|e| VectorStoreError::CreateCollectionFailed {
                    collection: self.collection.clone(),
                    message: e.to_string(),
                })?;
        }

        // Index creation is idempotent on the Qdrant side.
        self.create_payload_index("game_id").await?;
        self.create_payload_index("document_id").await?;

        Ok(())
    }

    async fn upsert(
        &self,
        game_id: &str,
        document_id: &str,
        chunks: Vec<EmbeddedChunk>,
    ) -> Result<usize, VectorStoreError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let indexed_at = Utc::now().to_rfc3339();
        let mut points = Vec::with_capacity(chunks.len());

        for embedded in chunks {
            if embedded.vector.len() as u64 != self.vector_size {
                return Err(VectorStoreError::InvalidDimension {
                    expected: self.vector_size as usize,
                    actual: embedded.vector.len(),
                });
            }

            let chunk = embedded.chunk;
            let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
            payload.insert("game_id".to_string(), game_id.into());
            payload.insert("document_id".to_string(), document_id.into());
            payload.insert("chunk_index".to_string(), (chunk.index as i64).into());
            payload.insert("text".to_string(), chunk.text.into());
            payload.insert("page".to_string(), (chunk.page as i64).into());
            payload.insert("char_start".to_string(), (chunk.char_start as i64).into());
            payload.insert("char_end".to_string(), (chunk.char_end as i64).into());
            payload.insert("indexed_at".to_string(), indexed_at.clone().into());

            points.push(PointStruct::new(
                point_id(document_id, chunk.index),
                embedded.vector,
                payload,
            ));
        }

        let written = points.len();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(|e| VectorStoreError::UpsertFailed {
                collection: self.collection.clone(),
                message: e.to_string(),
            })?;

        Ok(written)
    }

    async fn search(
        &self,
        game_id: &str,
        query: Vec<f32>,
        limit: u64,
    ) -> Result<Vec<SearchHit>, VectorStoreError> {
        let filter = Filter::must([Condition::matches("game_id", game_id.to_string())]);

        let search_result = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, query, limit)
                    .filter(filter)
                    .with_payload(true),
            )
            .await
            .map_err(|e| VectorStoreError::SearchFailed {
                collection: self.collection.clone(),
                message: e.to_string(),
            })?;

        let mut hits: Vec<SearchHit> = search_result
            .result
            .into_iter()
            .filter_map(SearchHit::from_scored_point)
            .collect();

        sort_hits(&mut hits);
        Ok(hits)
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), VectorStoreError> {
        let filter = Filter::must([Condition::matches("document_id", document_id.to_string())]);

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(filter)
                    .wait(true),
            )
            .await
            .map_err(|e| VectorStoreError::DeleteFailed {
                collection: self.collection.clone(),
                message: e.to_string(),
            })?;

        Ok(())
    }
}
