use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::BoxFuture;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplayKey {
    pub operation: String,
    pub entity_id: String,
    pub request_id: String,
}

impl ReplayKey {
    pub fn new(
        operation: impl Into<String>,
        entity_id: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            entity_id: entity_id.into(),
            request_id: request_id.into(),
        }
    }

    pub fn storage_key(&self, prefix: &str) -> String {
        format!(
            "{prefix}:{}:{}:{}",
            self.operation, self.entity_id, self.request_id
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StoredResponse {
    pub status_code: u16,
    pub body: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReplayRecord {
    InProgress,
    Completed { response: StoredResponse },
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("replay store unavailable: {0}")]
    Unavailable(String),
    #[error("replay serialization error: {0}")]
    Serialization(String),
    #[error("replay store error: {0}")]
    Store(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ClaimOutcome {
    /// The key was free; the caller now owns the in-progress claim.
    Claimed,
    /// Another call holds the claim and has not completed yet.
    InProgress,
    /// A completed response exists for the key.
    Replay(StoredResponse),
}

pub trait ReplayStore: Send + Sync {
    fn claim(
        &self,
        key: &ReplayKey,
        ttl: Duration,
    ) -> BoxFuture<'_, Result<ClaimOutcome, ReplayError>>;

    fn complete(
        &self,
        key: &ReplayKey,
        response: &StoredResponse,
        ttl: Duration,
    ) -> BoxFuture<'_, Result<(), ReplayError>>;
}
