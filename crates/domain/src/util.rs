use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use crate::identity::{ProjectId, UserId};

pub fn uuid_v7_without_dashes() -> String {
    Uuid::now_v7().simple().to_string()
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

pub fn format_ms_rfc3339(epoch_ms: i64) -> String {
    let fallback = OffsetDateTime::from_unix_timestamp(0).unwrap_or(OffsetDateTime::UNIX_EPOCH);
    let value =
        OffsetDateTime::from_unix_timestamp_nanos(epoch_ms as i128 * 1_000_000).unwrap_or(fallback);
    value
        .format(&Rfc3339)
        .unwrap_or("1970-01-01T00:00:00Z".to_string())
}

pub fn parse_rfc3339_ms(value: &str) -> Option<i64> {
    let datetime = OffsetDateTime::parse(value, &Rfc3339).ok()?;
    Some((datetime.unix_timestamp_nanos() / 1_000_000) as i64)
}

/// Deterministic storage key for the `(requester, recipient, scope)` tuple.
/// The pair is ordered: a request from A to B and a request from B to A hash
/// to different keys.
pub fn pair_fingerprint(
    requester: &UserId,
    recipient: &UserId,
    scope: Option<&ProjectId>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(requester.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(recipient.as_str().as_bytes());
    hasher.update([0u8]);
    if let Some(project_id) = scope {
        hasher.update(project_id.as_str().as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_fingerprint_is_deterministic() {
        let a = UserId::new("user-a");
        let b = UserId::new("user-b");
        assert_eq!(pair_fingerprint(&a, &b, None), pair_fingerprint(&a, &b, None));
    }

    #[test]
    fn pair_fingerprint_is_direction_sensitive() {
        let a = UserId::new("user-a");
        let b = UserId::new("user-b");
        assert_ne!(pair_fingerprint(&a, &b, None), pair_fingerprint(&b, &a, None));
    }

    #[test]
    fn pair_fingerprint_distinguishes_scopes() {
        let a = UserId::new("user-a");
        let b = UserId::new("user-b");
        let project = ProjectId::new("project-1");
        assert_ne!(
            pair_fingerprint(&a, &b, None),
            pair_fingerprint(&a, &b, Some(&project))
        );
    }

    #[test]
    fn format_ms_round_trips() {
        let formatted = format_ms_rfc3339(1_739_750_400_000);
        assert_eq!(parse_rfc3339_ms(&formatted), Some(1_739_750_400_000));
    }
}
