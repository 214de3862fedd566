use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::identity::UserId;

use super::BoxFuture;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    pub user_id: UserId,
    pub name: String,
    pub university: Option<String>,
    pub avatar_url: Option<String>,
}

impl UserSummary {
    /// Fallback summary for records whose counterpart no longer resolves in
    /// the directory.
    pub fn placeholder(user_id: &UserId) -> Self {
        Self {
            user_id: user_id.clone(),
            name: user_id.as_str().to_string(),
            university: None,
            avatar_url: None,
        }
    }
}

/// Read-only adapter over the external user profile collection.
#[allow(clippy::needless_pass_by_value)]
pub trait UserDirectory: Send + Sync {
    fn exists(&self, user_id: &UserId) -> BoxFuture<'_, DomainResult<bool>>;

    fn summary(&self, user_id: &UserId) -> BoxFuture<'_, DomainResult<Option<UserSummary>>>;
}
