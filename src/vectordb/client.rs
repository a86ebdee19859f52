use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, GetPointsBuilder, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, VectorParamsBuilder, point_id::PointIdOptions,
};
use std::collections::HashMap;

use super::error::VectorDbError;
use super::model::{SearchResult, VectorPoint, fingerprint_to_point_id};
use crate::vectordb::WriteConsistency;

/// Point count, readiness, and declared vector size for a collection.
#[derive(Debug, Clone)]
pub struct CollectionInfo {
    pub vector_count: u64,
    pub status: String,
    pub vector_size: u64,
}

/// Direct Qdrant client wrapper.
#[derive(Clone)]
pub struct QdrantClient {
    client: Qdrant,
    url: String,
}

impl QdrantClient {
    /// Creates a client for `url`.
    pub fn new(url: &str) -> Result<Self, VectorDbError> {
        let client =
            Qdrant::from_url(url)
                .build()
                .map_err(|e| VectorDbError::ConnectionFailed {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn client(&self) -> &Qdrant {
        &self.client
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn create_collection(&self, name: &str, vector_size: u64) -> Result<(), VectorDbError> {
        let vectors_config = VectorParamsBuilder::new(vector_size, Distance::Cosine);

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(vectors_config)
                    .on_disk_payload(true),
            )
            .await
            .map_err(|e| VectorDbError::CreateCollectionFailed {
                collection: name.to_string(),
                message: e.to_string(),
            })?;

        Ok(())
    }

    fn point_to_struct(p: VectorPoint) -> PointStruct {
        let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
        payload.insert("fingerprint".to_string(), p.fingerprint.into());
        payload.insert("original_query".to_string(), p.original_query.into());
        payload.insert("response".to_string(), p.response.into());
        payload.insert("provider".to_string(), p.provider.into());
        payload.insert("model".to_string(), p.model.into());
        payload.insert(
            "prompt_tokens".to_string(),
            (p.prompt_tokens as i64).into(),
        );
        payload.insert(
            "completion_tokens".to_string(),
            (p.completion_tokens as i64).into(),
        );
        payload.insert("created_at".to_string(), p.created_at.into());
        payload.insert("last_accessed".to_string(), p.last_accessed.into());
        payload.insert("access_count".to_string(), (p.access_count as i64).into());
        payload.insert("ttl_secs".to_string(), (p.ttl_secs as i64).into());

        PointStruct::new(p.id, p.vector, payload)
    }

    fn payload_to_search_result(
        id: u64,
        score: f32,
        payload: HashMap<String, qdrant_client::qdrant::Value>,
    ) -> Option<SearchResult> {
        let fingerprint = payload.get("fingerprint")?.as_str()?.to_string();
        let original_query = payload
            .get("original_query")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let response = payload
            .get("response")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let provider = payload
            .get("provider")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let model = payload
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let prompt_tokens = payload
            .get("prompt_tokens")
            .and_then(|v| v.as_integer())
            .unwrap_or(0) as u32;
        let completion_tokens = payload
            .get("completion_tokens")
            .and_then(|v| v.as_integer())
            .unwrap_or(0) as u32;
        let created_at = payload
            .get("created_at")
            .and_then(|v| v.as_integer())
            .unwrap_or(0);
        let last_accessed = payload
            .get("last_accessed")
            .and_then(|v| v.as_integer())
            .unwrap_or(0);
        let access_count = payload
            .get("access_count")
            .and_then(|v| v.as_integer())
            .unwrap_or(1) as u32;
        let ttl_secs = payload
            .get("ttl_secs")
            .and_then(|v| v.as_integer())
            .unwrap_or(0) as u64;

        Some(SearchResult {
            id,
            score,
            fingerprint,
            original_query,
            response,
            provider,
            model,
            prompt_tokens,
            completion_tokens,
            created_at,
            last_accessed,
            access_count,
            ttl_secs,
        })
    }
}

/// Minimal async interface used by higher-level code (the similarity
/// cache). Implemented by [`QdrantClient`] and, under `feature = "mock"`,
/// by an in-memory fake with identical semantics.
pub trait VectorDbClient: Send + Sync {
    fn ensure_collection(
        &self,
        name: &str,
        vector_size: u64,
    ) -> impl Future<Output = Result<(), VectorDbError>> + Send;

    fn upsert_point(
        &self,
        collection: &str,
        point: VectorPoint,
        consistency: WriteConsistency,
    ) -> impl Future<Output = Result<(), VectorDbError>> + Send;

    /// Fetches a single point by fingerprint, for exact-tier lookup as a
    /// get-by-id rather than a vector search.
    fn get_by_fingerprint(
        &self,
        collection: &str,
        fingerprint: &str,
    ) -> impl Future<Output = Result<Option<SearchResult>, VectorDbError>> + Send;

    /// Top-`k` similarity search, optionally filtered by a minimum score.
    fn search(
        &self,
        collection: &str,
        query: Vec<f32>,
        k: u64,
        score_threshold: Option<f32>,
    ) -> impl Future<Output = Result<Vec<SearchResult>, VectorDbError>> + Send;

    fn delete(
        &self,
        collection: &str,
        fingerprint: &str,
    ) -> impl Future<Output = Result<(), VectorDbError>> + Send;

    fn ping(&self) -> impl Future<Output = Result<(), VectorDbError>> + Send;

    fn info(&self, collection: &str) -> impl Future<Output = Result<CollectionInfo, VectorDbError>> + Send;
}

impl VectorDbClient for QdrantClient {
    async fn ensure_collection(&self, name: &str, vector_size: u64) -> Result<(), VectorDbError> {
        let exists = self.client.collection_exists(name).await.map_err(|e| {
            VectorDbError::CreateCollectionFailed {
                collection: name.to_string(),
                message: e.to_string(),
            }
        })?;
        if !exists {
            self.create_collection(name, vector_size).await?;
        }
        Ok(())
    }

    async fn upsert_point(
        &self,
        collection: &str,
        point: VectorPoint,
        consistency: WriteConsistency,
    ) -> Result<(), VectorDbError> {
        let qdrant_point = Self::point_to_struct(point);
        self.client
            .upsert_points(
                UpsertPointsBuilder::new(collection, vec![qdrant_point]).wait(consistency.into()),
            )
            .await
            .map_err(|e| VectorDbError::UpsertFailed {
                collection: collection.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn get_by_fingerprint(
        &self,
        collection: &str,
        fingerprint: &str,
    ) -> Result<Option<SearchResult>, VectorDbError> {
        let id = fingerprint_to_point_id(fingerprint);
        let response = self
            .client
            .get_points(
                GetPointsBuilder::new(collection, vec![id.into()])
                    .with_payload(true)
                    .with_vectors(false),
            )
            .await
            .map_err(|e| VectorDbError::GetFailed {
                collection: collection.to_string(),
                message: e.to_string(),
            })?;

        let Some(point) = response.result.into_iter().next() else {
            return Ok(None);
        };

        let Some(PointIdOptions::Num(found_id)) = point.id.and_then(|pid| pid.point_id_options)
        else {
            return Ok(None);
        };

        let result = Self::payload_to_search_result(found_id, 1.0, point.payload);
        // An id collision resolves to a miss: the stored fingerprint must
        // match the one requested, not merely the folded point id.
        Ok(result.filter(|r| r.fingerprint == fingerprint))
    }

    async fn search(
        &self,
        collection: &str,
        query: Vec<f32>,
        k: u64,
        score_threshold: Option<f32>,
    ) -> Result<Vec<SearchResult>, VectorDbError> {
        let mut search_builder = SearchPointsBuilder::new(collection, query, k).with_payload(true);
        if let Some(threshold) = score_threshold {
            search_builder = search_builder.score_threshold(threshold);
        }

        let search_result = self
            .client
            .search_points(search_builder)
            .await
            .map_err(|e| VectorDbError::SearchFailed {
                collection: collection.to_string(),
                message: e.to_string(),
            })?;

        let results = search_result
            .result
            .into_iter()
            .filter_map(|point| {
                let id = match point.id.and_then(|pid| pid.point_id_options) {
                    Some(PointIdOptions::Num(n)) => n,
                    _ => return None,
                };
                Self::payload_to_search_result(id, point.score, point.payload)
            })
            .collect();

        Ok(results)
    }

    async fn delete(&self, collection: &str, fingerprint: &str) -> Result<(), VectorDbError> {
        use qdrant_client::qdrant::{DeletePointsBuilder, PointsIdsList};

        let id = fingerprint_to_point_id(fingerprint);
        let points_selector = PointsIdsList { ids: vec![id.into()] };

        self.client
            .delete_points(
                DeletePointsBuilder::new(collection)
                    .points(points_selector)
                    .wait(true),
            )
            .await
            .map_err(|e| VectorDbError::DeleteFailed {
                collection: collection.to_string(),
                message: e.to_string(),
            })?;

        Ok(())
    }

    async fn ping(&self) -> Result<(), VectorDbError> {
        self.client
            .health_check()
            .await
            .map_err(|e| VectorDbError::PingFailed {
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn info(&self, collection: &str) -> Result<CollectionInfo, VectorDbError> {
        let info =
            self.client
                .collection_info(collection)
                .await
                .map_err(|e| VectorDbError::InfoFailed {
                    collection: collection.to_string(),
                    message: e.to_string(),
                })?;

        let result = info.result.ok_or_else(|| VectorDbError::InfoFailed {
            collection: collection.to_string(),
            message: "empty collection info response".to_string(),
        })?;

        let vector_size = result
            .config
            .as_ref()
            .and_then(|c| c.params.as_ref())
            .and_then(|p| p.vectors_config.as_ref())
            .and_then(|vc| vc.config.as_ref())
            .and_then(|cfg| match cfg {
                qdrant_client::qdrant::vectors_config::Config::Params(params) => Some(params.size),
                _ => None,
            })
            .unwrap_or(0);

        Ok(CollectionInfo {
            vector_count: result.points_count.unwrap_or(0),
            status: result.status().as_str_name().to_string(),
            vector_size,
        })
    }
}

/// Lets a pooled connection's `Conn` type be `Arc<T>` (needed when the
/// backend, like [`super::mock::MockVectorDbClient`], holds shared state
/// that every pooled handle must see rather than a private per-connection
/// socket).
impl<T: VectorDbClient + ?Sized> VectorDbClient for std::sync::Arc<T> {
    async fn ensure_collection(&self, name: &str, vector_size: u64) -> Result<(), VectorDbError> {
        (**self).ensure_collection(name, vector_size).await
    }

    async fn upsert_point(
        &self,
        collection: &str,
        point: VectorPoint,
        consistency: WriteConsistency,
    ) -> Result<(), VectorDbError> {
        (**self).upsert_point(collection, point, consistency).await
    }

    async fn get_by_fingerprint(
        &self,
        collection: &str,
        fingerprint: &str,
    ) -> Result<Option<SearchResult>, VectorDbError> {
        (**self).get_by_fingerprint(collection, fingerprint).await
    }

    async fn search(
        &self,
        collection: &str,
        query: Vec<f32>,
        k: u64,
        score_threshold: Option<f32>,
    ) -> Result<Vec<SearchResult>, VectorDbError> {
        (**self).search(collection, query, k, score_threshold).await
    }

    async fn delete(&self, collection: &str, fingerprint: &str) -> Result<(), VectorDbError> {
        (**self).delete(collection, fingerprint).await
    }

    async fn ping(&self) -> Result<(), VectorDbError> {
        (**self).ping().await
    }

    async fn info(&self, collection: &str) -> Result<CollectionInfo, VectorDbError> {
        (**self).info(collection).await
    }
}
