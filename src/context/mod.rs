//! Request context propagated through every pipeline stage.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use uuid::Uuid;

/// `{request_id, deadline, metadata}`, cheap to clone and share across
/// concurrent sibling tasks spawned from the same pipeline run — cloning a
/// `RequestContext` clones the `Arc`, not the metadata map, so every clone
/// observes the same id, deadline, and metadata writes.
#[derive(Clone)]
pub struct RequestContext {
    inner: Arc<Inner>,
}

struct Inner {
    request_id: Uuid,
    created_at: Instant,
    deadline: Option<Instant>,
    metadata: RwLock<HashMap<String, String>>,
}

impl RequestContext {
    /// Creates a new context with a fresh id and no deadline.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                request_id: Uuid::new_v4(),
                created_at: Instant::now(),
                deadline: None,
                metadata: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Creates a new context with a deadline `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                request_id: Uuid::new_v4(),
                created_at: Instant::now(),
                deadline: Some(Instant::now() + timeout),
                metadata: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.inner.request_id
    }

    pub fn elapsed(&self) -> Duration {
        self.inner.created_at.elapsed()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// `true` once the deadline, if any, has passed.
    pub fn is_expired(&self) -> bool {
        match self.inner.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    /// Remaining time before the deadline, or `None` if there is no deadline
    /// or it has already passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.inner.deadline.map(|deadline| {
            let now = Instant::now();
            if now >= deadline {
                Duration::ZERO
            } else {
                deadline - now
            }
        })
    }

    pub fn set_metadata(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.metadata.write().insert(key.into(), value.into());
    }

    pub fn metadata(&self, key: &str) -> Option<String> {
        self.inner.metadata.read().get(key).cloned()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
