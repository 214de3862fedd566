//! Caller-relative projections over connection-request records.
//!
//! The stored record is symmetric; which label a viewer sees for a pending
//! request depends on which side of it they are on. Views are computed at
//! query time and never persisted.

use serde::Serialize;

use crate::connections::{ConnectionRequest, ConnectionStatus};
use crate::identity::{RequestId, UserId};
use crate::ports::directory::UserSummary;
use crate::ports::projects::ProjectSummary;

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipLabel {
    None,
    Sent,
    Pending,
    Accepted,
    Declined,
}

impl RelationshipLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Sent => "sent",
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
        }
    }
}

/// Label for `viewer` given the most recent request (if any) between them and
/// the other user. A pending request reads "sent" to its requester and
/// "pending" to its recipient; resolved statuses read the same from both
/// sides.
pub fn relationship_label(viewer: &UserId, request: Option<&ConnectionRequest>) -> RelationshipLabel {
    match request {
        None => RelationshipLabel::None,
        Some(request) => match request.status {
            ConnectionStatus::Pending if request.requester_id == *viewer => RelationshipLabel::Sent,
            ConnectionStatus::Pending => RelationshipLabel::Pending,
            ConnectionStatus::Accepted => RelationshipLabel::Accepted,
            ConnectionStatus::Declined => RelationshipLabel::Declined,
        },
    }
}

/// The other party of a request, relative to `viewer`.
pub fn counterpart_of<'a>(viewer: &UserId, request: &'a ConnectionRequest) -> &'a UserId {
    if request.requester_id == *viewer {
        &request.recipient_id
    } else {
        &request.requester_id
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ConnectionRequestView {
    #[serde(flatten)]
    pub request: ConnectionRequest,
    pub requester: UserSummary,
    pub recipient: UserSummary,
    pub project: Option<ProjectSummary>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RelationshipStatus {
    pub label: RelationshipLabel,
    pub request: Option<ConnectionRequest>,
}

/// Accepted counterpart as seen from the acceptor's side of the list.
#[derive(Clone, Debug, Serialize)]
pub struct MenteeView {
    pub user: UserSummary,
    pub request_id: RequestId,
    pub project: Option<ProjectSummary>,
    pub since_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::ConnectionRequest;
    use crate::identity::{RequestId, UserId};

    fn request(status: ConnectionStatus) -> ConnectionRequest {
        ConnectionRequest {
            request_id: RequestId::new("req-1"),
            requester_id: UserId::new("alice"),
            recipient_id: UserId::new("bob"),
            project_id: None,
            message: "hello".to_string(),
            response_message: None,
            status,
            created_at_ms: 1,
            responded_at_ms: None,
        }
    }

    #[test]
    fn no_request_reads_none() {
        let viewer = UserId::new("alice");
        assert_eq!(relationship_label(&viewer, None), RelationshipLabel::None);
    }

    #[test]
    fn pending_is_relative_to_the_viewer() {
        let req = request(ConnectionStatus::Pending);
        assert_eq!(
            relationship_label(&UserId::new("alice"), Some(&req)),
            RelationshipLabel::Sent
        );
        assert_eq!(
            relationship_label(&UserId::new("bob"), Some(&req)),
            RelationshipLabel::Pending
        );
    }

    #[test]
    fn resolved_statuses_read_the_same_from_both_sides() {
        let accepted = request(ConnectionStatus::Accepted);
        let declined = request(ConnectionStatus::Declined);
        for viewer in [UserId::new("alice"), UserId::new("bob")] {
            assert_eq!(
                relationship_label(&viewer, Some(&accepted)),
                RelationshipLabel::Accepted
            );
            assert_eq!(
                relationship_label(&viewer, Some(&declined)),
                RelationshipLabel::Declined
            );
        }
    }

    #[test]
    fn counterpart_flips_with_the_viewer() {
        let req = request(ConnectionStatus::Pending);
        assert_eq!(
            counterpart_of(&UserId::new("alice"), &req),
            &UserId::new("bob")
        );
        assert_eq!(
            counterpart_of(&UserId::new("bob"), &req),
            &UserId::new("alice")
        );
    }
}
