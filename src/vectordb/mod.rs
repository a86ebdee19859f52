//! Qdrant vector-store integration: the collection backing the similarity
//! cache's semantic tier.

pub mod client;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod model;


pub use client::{CollectionInfo, QdrantClient, VectorDbClient};
pub use error::VectorDbError;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockVectorDbClient;
pub use model::{SearchResult, VectorPoint, fingerprint_to_point_id, validate_embedding};

/// Name of the single collection backing the cache's semantic tier.
pub const DEFAULT_COLLECTION_NAME: &str = "semcache_entries";

/// Opens pooled [`QdrantClient`] connections for a fixed URL.
#[derive(Debug, Clone)]
pub struct QdrantConnector {
    pub url: String,
}

impl QdrantConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl crate::pool::Connector for QdrantConnector {
    type Conn = QdrantClient;

    async fn connect(&self) -> Result<Self::Conn, crate::pool::PoolError> {
        QdrantClient::new(&self.url).map_err(|e| crate::pool::PoolError::ConnectFailed {
            reason: e.to_string(),
        })
    }
}

/// Opens pooled handles onto one shared [`MockVectorDbClient`], the way a
/// connector would hand out sockets to the same remote server.
#[cfg(any(test, feature = "mock"))]
#[derive(Clone)]
pub struct MockConnector {
    pub client: std::sync::Arc<MockVectorDbClient>,
}

#[cfg(any(test, feature = "mock"))]
impl MockConnector {
    pub fn new() -> Self {
        Self {
            client: std::sync::Arc::new(MockVectorDbClient::new()),
        }
    }
}

#[cfg(any(test, feature = "mock"))]
impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "mock"))]
impl crate::pool::Connector for MockConnector {
    type Conn = std::sync::Arc<MockVectorDbClient>;

    async fn connect(&self) -> Result<Self::Conn, crate::pool::PoolError> {
        Ok(std::sync::Arc::clone(&self.client))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteConsistency {
    /// Wait for the operation to be fully indexed and searchable.
    /// Slow, but ensures read-after-write consistency.
    Strong,
    /// Return immediately after the server acknowledges receipt.
    /// Fast, but data may not be searchable immediately.
    Eventual,
}

impl From<WriteConsistency> for bool {
    fn from(c: WriteConsistency) -> bool {
        matches!(c, WriteConsistency::Strong)
    }
}
