use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::identity::{ProjectId, UserId};

use super::BoxFuture;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectSummary {
    pub project_id: ProjectId,
    pub title: String,
}

/// Adapter over the external project collection. The collaborator set is
/// owned by the project side; this subsystem only requests mutations through
/// `add_collaborator`, which must be idempotent (adding a member who is
/// already present is a no-op).
#[allow(clippy::needless_pass_by_value)]
pub trait ProjectStore: Send + Sync {
    fn exists(&self, project_id: &ProjectId) -> BoxFuture<'_, DomainResult<bool>>;

    fn summary(
        &self,
        project_id: &ProjectId,
    ) -> BoxFuture<'_, DomainResult<Option<ProjectSummary>>>;

    fn add_collaborator(
        &self,
        project_id: &ProjectId,
        user_id: &UserId,
    ) -> BoxFuture<'_, DomainResult<()>>;
}
