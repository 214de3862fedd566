//! Connection requests between users, optionally scoped to a project.
//!
//! A request is created by one user toward another, starts out `pending`,
//! and is resolved exactly once by the recipient. Accepting a project-scoped
//! request grants the accepting recipient membership in the project
//! asynchronously.
//! Either party may cancel (hard delete) a request at any status; a cancel
//! never retracts membership an earlier acceptance granted.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dispatch::{CollaboratorGrant, GrantDispatcher};
use crate::error::DomainError;
use crate::identity::{ActorIdentity, ProjectId, RequestId, UserId};
use crate::ports::connections::ConnectionRequestRepository;
use crate::ports::directory::{UserDirectory, UserSummary};
use crate::ports::projects::{ProjectStore, ProjectSummary};
use crate::util::{now_ms, uuid_v7_without_dashes};
use crate::views::{
    counterpart_of, relationship_label, ConnectionRequestView, MenteeView, RelationshipStatus,
};
use crate::DomainResult;

pub const DEFAULT_MESSAGE: &str = "Hi, I would like to collaborate with you.";
pub const MAX_MESSAGE_LENGTH: usize = 500;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Pending,
    Accepted,
    Declined,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "declined" => Some(Self::Declined),
            _ => None,
        }
    }
}

/// Terminal decision a recipient can take on a pending request.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseDecision {
    Accepted,
    Declined,
}

impl ResponseDecision {
    pub fn as_status(&self) -> ConnectionStatus {
        match self {
            Self::Accepted => ConnectionStatus::Accepted,
            Self::Declined => ConnectionStatus::Declined,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestDirection {
    Sent,
    Received,
    #[default]
    All,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConnectionRequest {
    pub request_id: RequestId,
    pub requester_id: UserId,
    pub recipient_id: UserId,
    pub project_id: Option<ProjectId>,
    pub message: String,
    pub response_message: Option<String>,
    pub status: ConnectionStatus,
    pub created_at_ms: i64,
    pub responded_at_ms: Option<i64>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ConnectionRequestCreate {
    pub recipient_id: UserId,
    pub message: Option<String>,
    pub project_id: Option<ProjectId>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CancelledRequest {
    pub request_id: RequestId,
}

#[derive(Clone)]
pub struct ConnectionService {
    repository: Arc<dyn ConnectionRequestRepository>,
    directory: Arc<dyn UserDirectory>,
    projects: Arc<dyn ProjectStore>,
    dispatcher: GrantDispatcher,
}

impl ConnectionService {
    pub fn new(
        repository: Arc<dyn ConnectionRequestRepository>,
        directory: Arc<dyn UserDirectory>,
        projects: Arc<dyn ProjectStore>,
        dispatcher: GrantDispatcher,
    ) -> Self {
        Self {
            repository,
            directory,
            projects,
            dispatcher,
        }
    }

    pub async fn create(
        &self,
        actor: &ActorIdentity,
        input: ConnectionRequestCreate,
    ) -> DomainResult<ConnectionRequestView> {
        let (recipient_id, message, project_id) = validate_create(actor, input)?;

        if !self.directory.exists(&recipient_id).await? {
            return Err(DomainError::NotFound);
        }
        if let Some(project_id) = &project_id {
            if !self.projects.exists(project_id).await? {
                return Err(DomainError::NotFound);
            }
        }

        // Advisory pre-check for a friendlier error; the store enforces the
        // uniqueness invariant on insert.
        if self
            .repository
            .find_pair(&actor.user_id, &recipient_id, project_id.as_ref())
            .await?
            .is_some()
        {
            return Err(DomainError::DuplicateRequest);
        }

        let request = ConnectionRequest {
            request_id: RequestId::new(uuid_v7_without_dashes()),
            requester_id: actor.user_id.clone(),
            recipient_id,
            project_id,
            message,
            response_message: None,
            status: ConnectionStatus::Pending,
            created_at_ms: now_ms(),
            responded_at_ms: None,
        };

        let stored = self.repository.create(&request).await?;
        self.build_view(stored).await
    }

    pub async fn get(
        &self,
        actor: &ActorIdentity,
        request_id: &RequestId,
    ) -> DomainResult<ConnectionRequestView> {
        let request = self
            .repository
            .get(request_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        ensure_party(actor, &request)?;
        self.build_view(request).await
    }

    /// Relationship between the caller and `other`, computed from the most
    /// recent request between them in either direction. Scope is ignored
    /// here on purpose: the label answers "where do we stand", not "for
    /// which project".
    pub async fn status_with(
        &self,
        actor: &ActorIdentity,
        other: &UserId,
    ) -> DomainResult<RelationshipStatus> {
        if other.as_str().trim().is_empty() {
            return Err(DomainError::Validation("user id must not be empty".to_string()));
        }
        let request = self.repository.latest_between(&actor.user_id, other).await?;
        Ok(RelationshipStatus {
            label: relationship_label(&actor.user_id, request.as_ref()),
            request,
        })
    }

    pub async fn list(
        &self,
        actor: &ActorIdentity,
        direction: RequestDirection,
    ) -> DomainResult<Vec<ConnectionRequestView>> {
        let requests = self.repository.list_for(&actor.user_id, direction).await?;
        let mut views = Vec::with_capacity(requests.len());
        for request in requests {
            views.push(self.build_view(request).await?);
        }
        Ok(views)
    }

    pub async fn respond(
        &self,
        actor: &ActorIdentity,
        request_id: &RequestId,
        decision: ResponseDecision,
        response_message: Option<String>,
    ) -> DomainResult<ConnectionRequestView> {
        let response_message = validate_response_message(response_message)?;

        let request = self
            .repository
            .get(request_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        ensure_recipient(actor, &request)?;
        // Early check for a friendlier error; the conditional update below is
        // what actually guards against a concurrent resolver.
        if request.status != ConnectionStatus::Pending {
            return Err(DomainError::AlreadyResolved);
        }

        let resolved = self
            .repository
            .resolve(request_id, decision.as_status(), response_message, now_ms())
            .await?;

        if resolved.status == ConnectionStatus::Accepted {
            if let Some(project_id) = &resolved.project_id {
                // The accepting recipient is the one who joins the project.
                self.dispatcher.dispatch(CollaboratorGrant {
                    project_id: project_id.clone(),
                    user_id: resolved.recipient_id.clone(),
                    request_id: resolved.request_id.clone(),
                });
            }
        }

        self.build_view(resolved).await
    }

    pub async fn cancel(
        &self,
        actor: &ActorIdentity,
        request_id: &RequestId,
    ) -> DomainResult<CancelledRequest> {
        let request = self
            .repository
            .get(request_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        ensure_party(actor, &request)?;

        // Cancelling an accepted scoped request does not retract the project
        // membership the acceptance granted; the collaborator set is owned by
        // the project side.
        self.repository.delete(request_id).await?;
        Ok(CancelledRequest {
            request_id: request.request_id,
        })
    }

    /// Accepted counterparts of the caller, projected from accepted request
    /// records at query time.
    pub async fn mentees(&self, actor: &ActorIdentity) -> DomainResult<Vec<MenteeView>> {
        let accepted = self.repository.list_accepted_for(&actor.user_id).await?;
        let mut views = Vec::with_capacity(accepted.len());
        for request in accepted {
            let counterpart = counterpart_of(&actor.user_id, &request).clone();
            views.push(MenteeView {
                user: self.user_summary(&counterpart).await?,
                request_id: request.request_id,
                project: self.project_summary(request.project_id.as_ref()).await?,
                since_ms: request.responded_at_ms.unwrap_or(request.created_at_ms),
            });
        }
        Ok(views)
    }

    async fn build_view(&self, request: ConnectionRequest) -> DomainResult<ConnectionRequestView> {
        let requester = self.user_summary(&request.requester_id).await?;
        let recipient = self.user_summary(&request.recipient_id).await?;
        let project = self.project_summary(request.project_id.as_ref()).await?;
        Ok(ConnectionRequestView {
            request,
            requester,
            recipient,
            project,
        })
    }

    async fn user_summary(&self, user_id: &UserId) -> DomainResult<UserSummary> {
        Ok(self
            .directory
            .summary(user_id)
            .await?
            .unwrap_or_else(|| UserSummary::placeholder(user_id)))
    }

    async fn project_summary(
        &self,
        project_id: Option<&ProjectId>,
    ) -> DomainResult<Option<ProjectSummary>> {
        match project_id {
            None => Ok(None),
            Some(project_id) => self.projects.summary(project_id).await,
        }
    }
}

fn validate_create(
    actor: &ActorIdentity,
    input: ConnectionRequestCreate,
) -> DomainResult<(UserId, String, Option<ProjectId>)> {
    let recipient_id = UserId::new(input.recipient_id.as_str().trim());
    if recipient_id.as_str().is_empty() {
        return Err(DomainError::Validation(
            "recipient id must not be empty".to_string(),
        ));
    }
    if recipient_id == actor.user_id {
        return Err(DomainError::Validation(
            "cannot send a connection request to yourself".to_string(),
        ));
    }

    let message = match input.message {
        Some(message) => {
            let trimmed = message.trim().to_string();
            if trimmed.is_empty() {
                DEFAULT_MESSAGE.to_string()
            } else if trimmed.chars().count() > MAX_MESSAGE_LENGTH {
                return Err(DomainError::Validation(format!(
                    "message exceeds {MAX_MESSAGE_LENGTH} characters"
                )));
            } else {
                trimmed
            }
        }
        None => DEFAULT_MESSAGE.to_string(),
    };

    let project_id = match input.project_id {
        Some(project_id) => {
            let trimmed = project_id.as_str().trim().to_string();
            if trimmed.is_empty() {
                None
            } else {
                Some(ProjectId::new(trimmed))
            }
        }
        None => None,
    };

    Ok((recipient_id, message, project_id))
}

fn validate_response_message(message: Option<String>) -> DomainResult<Option<String>> {
    match message {
        None => Ok(None),
        Some(message) => {
            let trimmed = message.trim().to_string();
            if trimmed.is_empty() {
                Ok(None)
            } else if trimmed.chars().count() > MAX_MESSAGE_LENGTH {
                Err(DomainError::Validation(format!(
                    "response message exceeds {MAX_MESSAGE_LENGTH} characters"
                )))
            } else {
                Ok(Some(trimmed))
            }
        }
    }
}

fn ensure_recipient(actor: &ActorIdentity, request: &ConnectionRequest) -> DomainResult<()> {
    if request.recipient_id == actor.user_id {
        Ok(())
    } else {
        Err(DomainError::Forbidden)
    }
}

fn ensure_party(actor: &ActorIdentity, request: &ConnectionRequest) -> DomainResult<()> {
    if request.requester_id == actor.user_id || request.recipient_id == actor.user_id {
        Ok(())
    } else {
        Err(DomainError::Forbidden)
    }
}
