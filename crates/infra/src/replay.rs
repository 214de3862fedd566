use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sambung_domain::ports::replay::{
    ClaimOutcome, ReplayError, ReplayKey, ReplayRecord, ReplayStore, StoredResponse,
};
use sambung_domain::ports::BoxFuture;

const DEFAULT_PREFIX: &str = "sambung:replay";

#[derive(Clone)]
pub struct RedisReplayStore {
    manager: ConnectionManager,
    prefix: String,
}

impl RedisReplayStore {
    pub async fn connect(redis_url: &str) -> Result<Self, ReplayError> {
        Self::connect_with_prefix(redis_url, DEFAULT_PREFIX).await
    }

    pub async fn connect_with_prefix(
        redis_url: &str,
        prefix: impl Into<String>,
    ) -> Result<Self, ReplayError> {
        let client = redis::Client::open(redis_url)
            .map_err(|err| ReplayError::Unavailable(err.to_string()))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|err| ReplayError::Unavailable(err.to_string()))?;
        Ok(Self {
            manager,
            prefix: prefix.into(),
        })
    }

    fn ttl_ms(ttl: Duration) -> u64 {
        let ms = ttl.as_millis() as u64;
        if ms == 0 {
            1
        } else {
            ms
        }
    }

    fn serialize(record: &ReplayRecord) -> Result<String, ReplayError> {
        serde_json::to_string(record).map_err(|err| ReplayError::Serialization(err.to_string()))
    }

    fn deserialize(value: &str) -> Result<ReplayRecord, ReplayError> {
        serde_json::from_str(value).map_err(|err| ReplayError::Serialization(err.to_string()))
    }
}

impl ReplayStore for RedisReplayStore {
    fn claim(
        &self,
        key: &ReplayKey,
        ttl: Duration,
    ) -> BoxFuture<'_, Result<ClaimOutcome, ReplayError>> {
        let cache_key = key.storage_key(&self.prefix);
        Box::pin(async move {
            let payload = Self::serialize(&ReplayRecord::InProgress)?;
            let ttl_ms = Self::ttl_ms(ttl);
            let mut conn = self.manager.clone();

            let result: Option<String> = redis::cmd("SET")
                .arg(&cache_key)
                .arg(payload)
                .arg("NX")
                .arg("PX")
                .arg(ttl_ms)
                .query_async(&mut conn)
                .await
                .map_err(|err| ReplayError::Store(err.to_string()))?;
            if result.is_some() {
                return Ok(ClaimOutcome::Claimed);
            }

            let existing: Option<String> = conn
                .get(&cache_key)
                .await
                .map_err(|err| ReplayError::Store(err.to_string()))?;
            match existing {
                // The holder expired between SET NX and GET; treat the retry
                // as still in progress and let the caller try again.
                None => Ok(ClaimOutcome::InProgress),
                Some(payload) => match Self::deserialize(&payload)? {
                    ReplayRecord::InProgress => Ok(ClaimOutcome::InProgress),
                    ReplayRecord::Completed { response } => Ok(ClaimOutcome::Replay(response)),
                },
            }
        })
    }

    fn complete(
        &self,
        key: &ReplayKey,
        response: &StoredResponse,
        ttl: Duration,
    ) -> BoxFuture<'_, Result<(), ReplayError>> {
        let cache_key = key.storage_key(&self.prefix);
        let record = ReplayRecord::Completed {
            response: response.clone(),
        };
        Box::pin(async move {
            let payload = Self::serialize(&record)?;
            let ttl_ms = Self::ttl_ms(ttl);
            let mut conn = self.manager.clone();
            let _: () = redis::cmd("SET")
                .arg(&cache_key)
                .arg(payload)
                .arg("PX")
                .arg(ttl_ms)
                .query_async(&mut conn)
                .await
                .map_err(|err| ReplayError::Store(err.to_string()))?;
            Ok(())
        })
    }
}
