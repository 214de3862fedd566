//! Fire-and-forget delivery of collaborator grants.
//!
//! Accepting a project-scoped request must add the accepting user to the
//! project's collaborator set, but the acceptance response does not wait for
//! that write.
//! The dispatcher spawns the delivery and retries transient failures with a
//! capped geometric backoff; `add_collaborator` is idempotent, so a retry
//! after a half-applied attempt is safe.

use std::sync::Arc;
use std::time::Duration;

use crate::identity::{ProjectId, RequestId, UserId};
use crate::ports::projects::ProjectStore;
use crate::DomainResult;

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base_ms: 1_000,
            backoff_max_ms: 60_000,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CollaboratorGrant {
    pub project_id: ProjectId,
    pub user_id: UserId,
    pub request_id: RequestId,
}

#[derive(Clone)]
pub struct GrantDispatcher {
    projects: Arc<dyn ProjectStore>,
    policy: RetryPolicy,
}

impl GrantDispatcher {
    pub fn new(projects: Arc<dyn ProjectStore>, policy: RetryPolicy) -> Self {
        Self { projects, policy }
    }

    /// Spawns the delivery and returns immediately. Exhausted retries are
    /// logged and abandoned; the request record stays `accepted` either way.
    pub fn dispatch(&self, grant: CollaboratorGrant) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            if let Err(err) = dispatcher.deliver(&grant).await {
                tracing::error!(
                    request_id = %grant.request_id,
                    project_id = %grant.project_id,
                    user_id = %grant.user_id,
                    error = %err,
                    "collaborator grant abandoned after retries"
                );
            }
        });
    }

    pub async fn deliver(&self, grant: &CollaboratorGrant) -> DomainResult<()> {
        let mut attempt: u32 = 0;
        loop {
            match self
                .projects
                .add_collaborator(&grant.project_id, &grant.user_id)
                .await
            {
                Ok(()) => return Ok(()),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.policy.max_attempts {
                        return Err(err);
                    }
                    let delay =
                        backoff_ms(self.policy.backoff_base_ms, attempt, self.policy.backoff_max_ms);
                    tracing::warn!(
                        request_id = %grant.request_id,
                        project_id = %grant.project_id,
                        attempt,
                        delay_ms = delay,
                        error = %err,
                        "collaborator grant attempt failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        }
    }
}

pub fn backoff_ms(base_ms: u64, attempt: u32, max_ms: u64) -> u64 {
    if attempt == 0 {
        return 0;
    }
    let shift = attempt.saturating_sub(1).min(32);
    base_ms.saturating_mul(1u64 << shift).min(max_ms)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use tokio::sync::Mutex;

    use super::*;
    use crate::error::DomainError;
    use crate::ports::projects::ProjectSummary;
    use crate::ports::BoxFuture;
    use crate::DomainResult;

    struct FlakyProjects {
        failures_remaining: AtomicU32,
        grants: Mutex<Vec<(ProjectId, UserId)>>,
    }

    impl FlakyProjects {
        fn failing(times: u32) -> Self {
            Self {
                failures_remaining: AtomicU32::new(times),
                grants: Mutex::new(Vec::new()),
            }
        }
    }

    impl ProjectStore for FlakyProjects {
        fn exists(&self, _project_id: &ProjectId) -> BoxFuture<'_, DomainResult<bool>> {
            Box::pin(async { Ok(true) })
        }

        fn summary(
            &self,
            _project_id: &ProjectId,
        ) -> BoxFuture<'_, DomainResult<Option<ProjectSummary>>> {
            Box::pin(async { Ok(None) })
        }

        fn add_collaborator(
            &self,
            project_id: &ProjectId,
            user_id: &UserId,
        ) -> BoxFuture<'_, DomainResult<()>> {
            let project_id = project_id.clone();
            let user_id = user_id.clone();
            Box::pin(async move {
                if self
                    .failures_remaining
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
                {
                    return Err(DomainError::Store("transient write failure".to_string()));
                }
                let mut grants = self.grants.lock().await;
                if !grants.contains(&(project_id.clone(), user_id.clone())) {
                    grants.push((project_id, user_id));
                }
                Ok(())
            })
        }
    }

    fn grant() -> CollaboratorGrant {
        CollaboratorGrant {
            project_id: ProjectId::new("proj-1"),
            user_id: UserId::new("user-1"),
            request_id: RequestId::new("req-1"),
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            backoff_base_ms: 1,
            backoff_max_ms: 4,
        }
    }

    #[test]
    fn backoff_grows_geometrically_with_cap() {
        assert_eq!(backoff_ms(1_000, 0, 60_000), 0);
        assert_eq!(backoff_ms(1_000, 1, 60_000), 1_000);
        assert_eq!(backoff_ms(1_000, 2, 60_000), 2_000);
        assert_eq!(backoff_ms(1_000, 3, 60_000), 4_000);
        assert_eq!(backoff_ms(1_000, 10, 60_000), 60_000);
        assert_eq!(backoff_ms(1_000, 63, 60_000), 60_000);
    }

    #[tokio::test]
    async fn deliver_retries_past_transient_failures() {
        let projects = Arc::new(FlakyProjects::failing(2));
        let dispatcher = GrantDispatcher::new(projects.clone(), fast_policy());

        dispatcher.deliver(&grant()).await.unwrap();

        let grants = projects.grants.lock().await;
        assert_eq!(grants.len(), 1);
    }

    #[tokio::test]
    async fn deliver_gives_up_after_max_attempts() {
        let projects = Arc::new(FlakyProjects::failing(10));
        let dispatcher = GrantDispatcher::new(projects.clone(), fast_policy());

        let err = dispatcher.deliver(&grant()).await.unwrap_err();
        assert!(matches!(err, DomainError::Store(_)));
        assert!(projects.grants.lock().await.is_empty());
    }

    #[tokio::test]
    async fn repeated_delivery_is_idempotent() {
        let projects = Arc::new(FlakyProjects::failing(0));
        let dispatcher = GrantDispatcher::new(projects.clone(), fast_policy());

        dispatcher.deliver(&grant()).await.unwrap();
        dispatcher.deliver(&grant()).await.unwrap();

        assert_eq!(projects.grants.lock().await.len(), 1);
    }
}
