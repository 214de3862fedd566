use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use metrics::counter;
use sambung_domain::connections::{ConnectionRequest, ConnectionStatus, RequestDirection};
use sambung_domain::error::DomainError;
use sambung_domain::identity::{ProjectId, RequestId, UserId};
use sambung_domain::ports::connections::ConnectionRequestRepository;
use sambung_domain::ports::directory::{UserDirectory, UserSummary};
use sambung_domain::ports::projects::{ProjectSummary, ProjectStore};
use sambung_domain::ports::BoxFuture;
use sambung_domain::util::pair_fingerprint;
use sambung_domain::DomainResult;
use tokio::sync::RwLock;

use super::COLLABORATOR_GRANTS_TOTAL;

#[derive(Default)]
struct ConnectionState {
    items: HashMap<RequestId, ConnectionRequest>,
    pairs: HashMap<String, RequestId>,
}

/// Default backend for development and tests. The pair index under the same
/// lock as the records gives the uniqueness invariant without a real unique
/// constraint.
#[derive(Default)]
pub struct InMemoryConnectionRequestRepository {
    state: Arc<RwLock<ConnectionState>>,
}

impl InMemoryConnectionRequestRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sort_newest_first(requests: &mut [ConnectionRequest]) {
    requests.sort_by(|a, b| {
        b.created_at_ms
            .cmp(&a.created_at_ms)
            .then_with(|| b.request_id.cmp(&a.request_id))
    });
}

impl ConnectionRequestRepository for InMemoryConnectionRequestRepository {
    fn create(
        &self,
        request: &ConnectionRequest,
    ) -> BoxFuture<'_, DomainResult<ConnectionRequest>> {
        let request = request.clone();
        Box::pin(async move {
            let key = pair_fingerprint(
                &request.requester_id,
                &request.recipient_id,
                request.project_id.as_ref(),
            );
            let mut state = self.state.write().await;
            if state.pairs.contains_key(&key) {
                return Err(DomainError::DuplicateRequest);
            }
            state.pairs.insert(key, request.request_id.clone());
            state
                .items
                .insert(request.request_id.clone(), request.clone());
            Ok(request)
        })
    }

    fn get(
        &self,
        request_id: &RequestId,
    ) -> BoxFuture<'_, DomainResult<Option<ConnectionRequest>>> {
        let request_id = request_id.clone();
        Box::pin(async move { Ok(self.state.read().await.items.get(&request_id).cloned()) })
    }

    fn find_pair(
        &self,
        requester: &UserId,
        recipient: &UserId,
        scope: Option<&ProjectId>,
    ) -> BoxFuture<'_, DomainResult<Option<ConnectionRequest>>> {
        let key = pair_fingerprint(requester, recipient, scope);
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(state
                .pairs
                .get(&key)
                .and_then(|id| state.items.get(id))
                .cloned())
        })
    }

    fn latest_between(
        &self,
        viewer: &UserId,
        other: &UserId,
    ) -> BoxFuture<'_, DomainResult<Option<ConnectionRequest>>> {
        let viewer = viewer.clone();
        let other = other.clone();
        Box::pin(async move {
            let state = self.state.read().await;
            let mut matches: Vec<_> = state
                .items
                .values()
                .filter(|r| {
                    (r.requester_id == viewer && r.recipient_id == other)
                        || (r.requester_id == other && r.recipient_id == viewer)
                })
                .cloned()
                .collect();
            sort_newest_first(&mut matches);
            Ok(matches.into_iter().next())
        })
    }

    fn list_for(
        &self,
        user_id: &UserId,
        direction: RequestDirection,
    ) -> BoxFuture<'_, DomainResult<Vec<ConnectionRequest>>> {
        let user_id = user_id.clone();
        Box::pin(async move {
            let state = self.state.read().await;
            let mut matches: Vec<_> = state
                .items
                .values()
                .filter(|r| match direction {
                    RequestDirection::Sent => r.requester_id == user_id,
                    RequestDirection::Received => r.recipient_id == user_id,
                    RequestDirection::All => {
                        r.requester_id == user_id || r.recipient_id == user_id
                    }
                })
                .cloned()
                .collect();
            sort_newest_first(&mut matches);
            Ok(matches)
        })
    }

    fn list_accepted_for(
        &self,
        user_id: &UserId,
    ) -> BoxFuture<'_, DomainResult<Vec<ConnectionRequest>>> {
        let user_id = user_id.clone();
        Box::pin(async move {
            let state = self.state.read().await;
            let mut matches: Vec<_> = state
                .items
                .values()
                .filter(|r| {
                    r.status == ConnectionStatus::Accepted
                        && (r.requester_id == user_id || r.recipient_id == user_id)
                })
                .cloned()
                .collect();
            sort_newest_first(&mut matches);
            Ok(matches)
        })
    }

    fn resolve(
        &self,
        request_id: &RequestId,
        decision: ConnectionStatus,
        response_message: Option<String>,
        responded_at_ms: i64,
    ) -> BoxFuture<'_, DomainResult<ConnectionRequest>> {
        let request_id = request_id.clone();
        Box::pin(async move {
            let mut state = self.state.write().await;
            let request = state
                .items
                .get_mut(&request_id)
                .ok_or(DomainError::NotFound)?;
            if request.status != ConnectionStatus::Pending {
                return Err(DomainError::AlreadyResolved);
            }
            request.status = decision;
            request.response_message = response_message;
            request.responded_at_ms = Some(responded_at_ms);
            Ok(request.clone())
        })
    }

    fn delete(&self, request_id: &RequestId) -> BoxFuture<'_, DomainResult<()>> {
        let request_id = request_id.clone();
        Box::pin(async move {
            let mut state = self.state.write().await;
            let removed = state
                .items
                .remove(&request_id)
                .ok_or(DomainError::NotFound)?;
            let key = pair_fingerprint(
                &removed.requester_id,
                &removed.recipient_id,
                removed.project_id.as_ref(),
            );
            state.pairs.remove(&key);
            Ok(())
        })
    }
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: Arc<RwLock<HashMap<UserId, UserSummary>>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, summary: UserSummary) {
        self.users
            .write()
            .await
            .insert(summary.user_id.clone(), summary);
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn exists(&self, user_id: &UserId) -> BoxFuture<'_, DomainResult<bool>> {
        let user_id = user_id.clone();
        Box::pin(async move { Ok(self.users.read().await.contains_key(&user_id)) })
    }

    fn summary(&self, user_id: &UserId) -> BoxFuture<'_, DomainResult<Option<UserSummary>>> {
        let user_id = user_id.clone();
        Box::pin(async move { Ok(self.users.read().await.get(&user_id).cloned()) })
    }
}

struct ProjectRecord {
    summary: ProjectSummary,
    collaborator_ids: HashSet<UserId>,
}

#[derive(Default)]
pub struct InMemoryProjectStore {
    projects: Arc<RwLock<HashMap<ProjectId, ProjectRecord>>>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, summary: ProjectSummary) {
        self.projects.write().await.insert(
            summary.project_id.clone(),
            ProjectRecord {
                summary,
                collaborator_ids: HashSet::new(),
            },
        );
    }

    pub async fn collaborators(&self, project_id: &ProjectId) -> Vec<UserId> {
        match self.projects.read().await.get(project_id) {
            None => Vec::new(),
            Some(record) => record.collaborator_ids.iter().cloned().collect(),
        }
    }
}

impl ProjectStore for InMemoryProjectStore {
    fn exists(&self, project_id: &ProjectId) -> BoxFuture<'_, DomainResult<bool>> {
        let project_id = project_id.clone();
        Box::pin(async move { Ok(self.projects.read().await.contains_key(&project_id)) })
    }

    fn summary(
        &self,
        project_id: &ProjectId,
    ) -> BoxFuture<'_, DomainResult<Option<ProjectSummary>>> {
        let project_id = project_id.clone();
        Box::pin(async move {
            Ok(self
                .projects
                .read()
                .await
                .get(&project_id)
                .map(|record| record.summary.clone()))
        })
    }

    fn add_collaborator(
        &self,
        project_id: &ProjectId,
        user_id: &UserId,
    ) -> BoxFuture<'_, DomainResult<()>> {
        let project_id = project_id.clone();
        let user_id = user_id.clone();
        Box::pin(async move {
            let mut projects = self.projects.write().await;
            let record = projects.get_mut(&project_id).ok_or(DomainError::NotFound)?;
            record.collaborator_ids.insert(user_id);
            counter!(COLLABORATOR_GRANTS_TOTAL, "backend" => "memory").increment(1);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use sambung_domain::util::uuid_v7_without_dashes;

    use super::*;

    fn request(requester: &str, recipient: &str, project: Option<&str>) -> ConnectionRequest {
        ConnectionRequest {
            request_id: RequestId::new(uuid_v7_without_dashes()),
            requester_id: UserId::new(requester),
            recipient_id: UserId::new(recipient),
            project_id: project.map(ProjectId::new),
            message: "hello".to_string(),
            response_message: None,
            status: ConnectionStatus::Pending,
            created_at_ms: sambung_domain::util::now_ms(),
            responded_at_ms: None,
        }
    }

    #[tokio::test]
    async fn create_enforces_pair_uniqueness_across_statuses() {
        let repo = InMemoryConnectionRequestRepository::new();
        let first = request("alice", "bob", None);
        repo.create(&first).await.unwrap();

        repo.resolve(
            &first.request_id,
            ConnectionStatus::Declined,
            None,
            sambung_domain::util::now_ms(),
        )
        .await
        .unwrap();

        let err = repo.create(&request("alice", "bob", None)).await.unwrap_err();
        assert!(matches!(err, DomainError::DuplicateRequest));
    }

    #[tokio::test]
    async fn reverse_direction_and_other_scope_are_distinct_pairs() {
        let repo = InMemoryConnectionRequestRepository::new();
        repo.create(&request("alice", "bob", None)).await.unwrap();
        repo.create(&request("bob", "alice", None)).await.unwrap();
        repo.create(&request("alice", "bob", Some("proj-1")))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn concurrent_create_has_a_single_winner() {
        let repo = Arc::new(InMemoryConnectionRequestRepository::new());
        let (a, b) = tokio::join!(
            repo.create(&request("alice", "bob", None)),
            repo.create(&request("alice", "bob", None)),
        );
        assert!(a.is_ok() ^ b.is_ok());
        let loser = if a.is_err() { a.unwrap_err() } else { b.unwrap_err() };
        assert!(matches!(loser, DomainError::DuplicateRequest));
    }

    #[tokio::test]
    async fn concurrent_resolve_has_a_single_winner() {
        let repo = Arc::new(InMemoryConnectionRequestRepository::new());
        let stored = request("alice", "bob", None);
        repo.create(&stored).await.unwrap();

        let now = sambung_domain::util::now_ms();
        let (a, b) = tokio::join!(
            repo.resolve(&stored.request_id, ConnectionStatus::Accepted, None, now),
            repo.resolve(&stored.request_id, ConnectionStatus::Declined, None, now),
        );
        assert!(a.is_ok() ^ b.is_ok());
        let loser = if a.is_err() { a.unwrap_err() } else { b.unwrap_err() };
        assert!(matches!(loser, DomainError::AlreadyResolved));
    }

    #[tokio::test]
    async fn delete_frees_the_pair() {
        let repo = InMemoryConnectionRequestRepository::new();
        let stored = request("alice", "bob", None);
        repo.create(&stored).await.unwrap();
        repo.delete(&stored.request_id).await.unwrap();
        repo.create(&request("alice", "bob", None)).await.unwrap();
    }

    #[tokio::test]
    async fn list_for_orders_newest_first() {
        let repo = InMemoryConnectionRequestRepository::new();
        let mut older = request("alice", "bob", None);
        older.created_at_ms = 100;
        let mut newer = request("alice", "carol", None);
        newer.created_at_ms = 200;
        repo.create(&older).await.unwrap();
        repo.create(&newer).await.unwrap();

        let listed = repo
            .list_for(&UserId::new("alice"), RequestDirection::Sent)
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].request_id, newer.request_id);
        assert_eq!(listed[1].request_id, older.request_id);
    }

    #[tokio::test]
    async fn latest_between_spans_both_directions() {
        let repo = InMemoryConnectionRequestRepository::new();
        let mut first = request("alice", "bob", None);
        first.created_at_ms = 100;
        repo.create(&first).await.unwrap();
        repo.delete(&first.request_id).await.unwrap();
        let mut second = request("bob", "alice", None);
        second.created_at_ms = 200;
        repo.create(&second).await.unwrap();

        let latest = repo
            .latest_between(&UserId::new("alice"), &UserId::new("bob"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.request_id, second.request_id);
    }

    #[tokio::test]
    async fn add_collaborator_is_idempotent() {
        let store = InMemoryProjectStore::new();
        store
            .insert(ProjectSummary {
                project_id: ProjectId::new("proj-1"),
                title: "Bridge".to_string(),
            })
            .await;

        let project = ProjectId::new("proj-1");
        let user = UserId::new("alice");
        store.add_collaborator(&project, &user).await.unwrap();
        store.add_collaborator(&project, &user).await.unwrap();

        assert_eq!(store.collaborators(&project).await, vec![user]);
    }

    #[tokio::test]
    async fn add_collaborator_to_missing_project_is_not_found() {
        let store = InMemoryProjectStore::new();
        let err = store
            .add_collaborator(&ProjectId::new("missing"), &UserId::new("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound));
    }
}
