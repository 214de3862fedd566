//! Replay protection for mutating operations.
//!
//! Callers send an `x-request-id` with mutating calls; the guard claims the
//! key before the operation runs and stores the response afterwards, so a
//! retried call with the same id gets the original response back instead of
//! re-running the side effects.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::ports::replay::{
    ClaimOutcome, ReplayError, ReplayKey, ReplayRecord, ReplayStore, StoredResponse,
};
use crate::ports::BoxFuture;

#[derive(Clone, Debug)]
pub struct ReplayConfig {
    pub in_progress_ttl: Duration,
    pub completed_ttl: Duration,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            in_progress_ttl: Duration::from_secs(60),
            completed_ttl: Duration::from_secs(60 * 60 * 24),
        }
    }
}

#[derive(Clone)]
pub struct ReplayGuard {
    store: Arc<dyn ReplayStore>,
    config: ReplayConfig,
}

impl ReplayGuard {
    pub fn new(store: Arc<dyn ReplayStore>, config: ReplayConfig) -> Self {
        Self { store, config }
    }

    pub async fn begin(&self, key: &ReplayKey) -> Result<ClaimOutcome, ReplayError> {
        self.store.claim(key, self.config.in_progress_ttl).await
    }

    pub async fn complete(
        &self,
        key: &ReplayKey,
        response: &StoredResponse,
    ) -> Result<(), ReplayError> {
        self.store
            .complete(key, response, self.config.completed_ttl)
            .await
    }
}

/// In-process store for tests and single-node deployments.
pub struct InMemoryReplayStore {
    prefix: String,
    inner: Arc<Mutex<HashMap<String, (ReplayRecord, Option<Instant>)>>>,
}

impl InMemoryReplayStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryReplayStore {
    fn default() -> Self {
        Self::new("replay")
    }
}

impl ReplayStore for InMemoryReplayStore {
    fn claim(
        &self,
        key: &ReplayKey,
        ttl: Duration,
    ) -> BoxFuture<'_, Result<ClaimOutcome, ReplayError>> {
        let storage_key = key.storage_key(&self.prefix);
        Box::pin(async move {
            let mut guard = self.inner.lock().await;
            if let Some((record, expires_at)) = guard.get(&storage_key) {
                let expired = expires_at.map(|at| Instant::now() >= at).unwrap_or(false);
                if !expired {
                    return Ok(match record {
                        ReplayRecord::InProgress => ClaimOutcome::InProgress,
                        ReplayRecord::Completed { response } => {
                            ClaimOutcome::Replay(response.clone())
                        }
                    });
                }
                guard.remove(&storage_key);
            }
            guard.insert(
                storage_key,
                (ReplayRecord::InProgress, Some(Instant::now() + ttl)),
            );
            Ok(ClaimOutcome::Claimed)
        })
    }

    fn complete(
        &self,
        key: &ReplayKey,
        response: &StoredResponse,
        ttl: Duration,
    ) -> BoxFuture<'_, Result<(), ReplayError>> {
        let storage_key = key.storage_key(&self.prefix);
        let record = ReplayRecord::Completed {
            response: response.clone(),
        };
        Box::pin(async move {
            let mut guard = self.inner.lock().await;
            guard.insert(storage_key, (record, Some(Instant::now() + ttl)));
            Ok(())
        })
    }
}
