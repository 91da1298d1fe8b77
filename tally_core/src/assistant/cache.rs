use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use super::traits::ResponseCache;
use crate::{OwnerId, Result};

/// Cache key derivation: case- and whitespace-insensitive.
#[tracing::instrument(level = "debug", skip_all)]
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// In-memory response cache for local development and unit tests. Eviction
/// and TTLs are a deployment concern; this keeps everything for the process
/// lifetime.
#[derive(Clone, Default)]
pub struct MemoryResponseCache {
    entries: Arc<DashMap<(OwnerId, String), String>>,
}

impl MemoryResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ResponseCache for MemoryResponseCache {
    async fn get(&self, owner: OwnerId, key: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .get(&(owner, key.to_string()))
            .map(|entry| entry.value().clone()))
    }

    async fn put(&self, owner: OwnerId, key: &str, reply: &str) -> Result<()> {
        self.entries
            .insert((owner, key.to_string()), reply.to_string());
        Ok(())
    }
}
