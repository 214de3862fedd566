use crate::DomainResult;
use crate::connections::{ConnectionRequest, ConnectionStatus, RequestDirection};
use crate::identity::{ProjectId, RequestId, UserId};

use super::BoxFuture;

/// Durable collection of connection-request records.
///
/// The store owns the uniqueness invariant: at most one record may exist at a
/// time for a given `(requester, recipient, scope)` tuple, regardless of its
/// status. `create` must reject a violating insert with
/// [`crate::error::DomainError::DuplicateRequest`] even when the caller's
/// pre-check lost a race.
#[allow(clippy::needless_pass_by_value)]
pub trait ConnectionRequestRepository: Send + Sync {
    fn create(
        &self,
        request: &ConnectionRequest,
    ) -> BoxFuture<'_, DomainResult<ConnectionRequest>>;

    fn get(
        &self,
        request_id: &RequestId,
    ) -> BoxFuture<'_, DomainResult<Option<ConnectionRequest>>>;

    /// Advisory lookup of the exact `(requester, recipient, scope)` tuple.
    fn find_pair(
        &self,
        requester: &UserId,
        recipient: &UserId,
        scope: Option<&ProjectId>,
    ) -> BoxFuture<'_, DomainResult<Option<ConnectionRequest>>>;

    /// Most recent record between the two users in either direction, ignoring
    /// scope.
    fn latest_between(
        &self,
        viewer: &UserId,
        other: &UserId,
    ) -> BoxFuture<'_, DomainResult<Option<ConnectionRequest>>>;

    fn list_for(
        &self,
        user_id: &UserId,
        direction: RequestDirection,
    ) -> BoxFuture<'_, DomainResult<Vec<ConnectionRequest>>>;

    fn list_accepted_for(
        &self,
        user_id: &UserId,
    ) -> BoxFuture<'_, DomainResult<Vec<ConnectionRequest>>>;

    /// Atomic conditional transition out of `pending`. The update must be
    /// applied only while the stored status is still `pending`; when another
    /// writer got there first the call fails with
    /// [`crate::error::DomainError::AlreadyResolved`] and the record is left
    /// unchanged.
    fn resolve(
        &self,
        request_id: &RequestId,
        decision: ConnectionStatus,
        response_message: Option<String>,
        responded_at_ms: i64,
    ) -> BoxFuture<'_, DomainResult<ConnectionRequest>>;

    /// Hard delete. Frees the pair tuple for future requests.
    fn delete(&self, request_id: &RequestId) -> BoxFuture<'_, DomainResult<()>>;
}
