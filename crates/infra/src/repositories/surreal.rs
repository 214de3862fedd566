use std::sync::Arc;

use metrics::counter;
use sambung_domain::connections::{ConnectionRequest, ConnectionStatus, RequestDirection};
use sambung_domain::error::DomainError;
use sambung_domain::identity::{ProjectId, RequestId, UserId};
use sambung_domain::ports::connections::ConnectionRequestRepository;
use sambung_domain::ports::directory::{UserDirectory, UserSummary};
use sambung_domain::ports::projects::{ProjectSummary, ProjectStore};
use sambung_domain::ports::BoxFuture;
use sambung_domain::util::{format_ms_rfc3339, pair_fingerprint, parse_rfc3339_ms};
use sambung_domain::DomainResult;
use serde::{Deserialize, Serialize};
use serde_json::{to_value, Value};
use surrealdb::engine::remote::ws::Client;
use surrealdb::Surreal;

use super::COLLABORATOR_GRANTS_TOTAL;

const SELECT_REQUEST_FIELDS: &str = "SELECT request_id, requester_id, recipient_id, project_id, \
     message, response_message, status, <string>created_at AS created_at, responded_at";

fn map_surreal_error(err: surrealdb::Error) -> DomainError {
    let error_message = err.to_string().to_lowercase();
    if error_message.contains("already exists")
        || error_message.contains("duplicate")
        || error_message.contains("unique")
    {
        return DomainError::DuplicateRequest;
    }
    DomainError::Store(format!("surreal query failed: {error_message}"))
}

fn take_rows(
    response: &mut surrealdb::Response,
    index: usize,
) -> DomainResult<Vec<Value>> {
    response
        .take(index)
        .map_err(|err| DomainError::Store(format!("invalid query result: {err}")))
}

#[derive(Debug, Serialize, Deserialize)]
struct ConnectionRow {
    request_id: String,
    requester_id: String,
    recipient_id: String,
    project_id: Option<String>,
    message: String,
    response_message: Option<String>,
    status: String,
    created_at: String,
    responded_at: Option<String>,
}

impl ConnectionRow {
    fn from_request(request: &ConnectionRequest) -> Self {
        Self {
            request_id: request.request_id.as_str().to_string(),
            requester_id: request.requester_id.as_str().to_string(),
            recipient_id: request.recipient_id.as_str().to_string(),
            project_id: request
                .project_id
                .as_ref()
                .map(|id| id.as_str().to_string()),
            message: request.message.clone(),
            response_message: request.response_message.clone(),
            status: request.status.as_str().to_string(),
            created_at: format_ms_rfc3339(request.created_at_ms),
            responded_at: request.responded_at_ms.map(format_ms_rfc3339),
        }
    }

    fn into_request(self) -> DomainResult<ConnectionRequest> {
        let status = ConnectionStatus::parse(&self.status).ok_or_else(|| {
            DomainError::Store(format!("unknown request status '{}'", self.status))
        })?;
        let created_at_ms = parse_rfc3339_ms(&self.created_at).ok_or_else(|| {
            DomainError::Store(format!("invalid request datetime '{}'", self.created_at))
        })?;
        let responded_at_ms = match &self.responded_at {
            None => None,
            Some(value) => Some(parse_rfc3339_ms(value).ok_or_else(|| {
                DomainError::Store(format!("invalid response datetime '{value}'"))
            })?),
        };
        Ok(ConnectionRequest {
            request_id: RequestId::new(self.request_id),
            requester_id: UserId::new(self.requester_id),
            recipient_id: UserId::new(self.recipient_id),
            project_id: self.project_id.map(ProjectId::new),
            message: self.message,
            response_message: self.response_message,
            status,
            created_at_ms,
            responded_at_ms,
        })
    }
}

fn decode_rows(rows: Vec<Value>) -> DomainResult<Vec<ConnectionRequest>> {
    let mut requests = Vec::with_capacity(rows.len());
    for row in rows {
        let decoded: ConnectionRow = serde_json::from_value(row)
            .map_err(|err| DomainError::Store(format!("invalid request row: {err}")))?;
        requests.push(decoded.into_request()?);
    }
    Ok(requests)
}

// RFC3339 string ordering is not reliable across fractional-second
// precision, so fetched rows are re-sorted here.
fn sort_newest_first(requests: &mut [ConnectionRequest]) {
    requests.sort_by(|a, b| {
        b.created_at_ms
            .cmp(&a.created_at_ms)
            .then_with(|| b.request_id.cmp(&a.request_id))
    });
}

/// Surreal-backed request store. The pair fingerprint doubles as the record
/// id, so a duplicate `(requester, recipient, scope)` insert fails at the
/// storage layer no matter what the caller pre-checked.
pub struct SurrealConnectionRequestRepository {
    client: Arc<Surreal<Client>>,
}

impl SurrealConnectionRequestRepository {
    pub fn with_client(client: Arc<Surreal<Client>>) -> Self {
        Self { client }
    }
}

impl ConnectionRequestRepository for SurrealConnectionRequestRepository {
    fn create(
        &self,
        request: &ConnectionRequest,
    ) -> BoxFuture<'_, DomainResult<ConnectionRequest>> {
        let pair_key = pair_fingerprint(
            &request.requester_id,
            &request.recipient_id,
            request.project_id.as_ref(),
        );
        let request_id = request.request_id.as_str().to_string();
        let row = ConnectionRow::from_request(request);
        let client = self.client.clone();
        Box::pin(async move {
            let payload = to_value(row)
                .map_err(|err| DomainError::Store(format!("invalid payload: {err}")))?;
            let mut response = client
                .query(format!(
                    "CREATE type::record('connection_request', $pair_key) SET \
                        request_id = $payload.request_id, \
                        requester_id = $payload.requester_id, \
                        recipient_id = $payload.recipient_id, \
                        project_id = $payload.project_id, \
                        message = $payload.message, \
                        response_message = $payload.response_message, \
                        status = $payload.status, \
                        created_at = <datetime>$payload.created_at, \
                        responded_at = $payload.responded_at; \
                     {SELECT_REQUEST_FIELDS} \
                     FROM connection_request WHERE request_id = $request_id LIMIT 1"
                ))
                .bind(("pair_key", pair_key))
                .bind(("payload", payload))
                .bind(("request_id", request_id))
                .await
                .map_err(map_surreal_error)?;
            let rows = take_rows(&mut response, 1)?;
            decode_rows(rows)?
                .pop()
                .ok_or_else(|| DomainError::Store("create returned no row".to_string()))
        })
    }

    fn get(
        &self,
        request_id: &RequestId,
    ) -> BoxFuture<'_, DomainResult<Option<ConnectionRequest>>> {
        let request_id = request_id.as_str().to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(format!(
                    "{SELECT_REQUEST_FIELDS} \
                     FROM connection_request WHERE request_id = $request_id LIMIT 1"
                ))
                .bind(("request_id", request_id))
                .await
                .map_err(map_surreal_error)?;
            let rows = take_rows(&mut response, 0)?;
            Ok(decode_rows(rows)?.pop())
        })
    }

    fn find_pair(
        &self,
        requester: &UserId,
        recipient: &UserId,
        scope: Option<&ProjectId>,
    ) -> BoxFuture<'_, DomainResult<Option<ConnectionRequest>>> {
        let pair_key = pair_fingerprint(requester, recipient, scope);
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(format!(
                    "{SELECT_REQUEST_FIELDS} \
                     FROM type::record('connection_request', $pair_key)"
                ))
                .bind(("pair_key", pair_key))
                .await
                .map_err(map_surreal_error)?;
            let rows = take_rows(&mut response, 0)?;
            let rows = rows.into_iter().filter(|row| !row.is_null()).collect();
            Ok(decode_rows(rows)?.pop())
        })
    }

    fn latest_between(
        &self,
        viewer: &UserId,
        other: &UserId,
    ) -> BoxFuture<'_, DomainResult<Option<ConnectionRequest>>> {
        let viewer = viewer.as_str().to_string();
        let other = other.as_str().to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(format!(
                    "{SELECT_REQUEST_FIELDS} \
                     FROM connection_request \
                     WHERE (requester_id = $viewer AND recipient_id = $other) \
                        OR (requester_id = $other AND recipient_id = $viewer) \
                     ORDER BY created_at DESC, request_id DESC"
                ))
                .bind(("viewer", viewer))
                .bind(("other", other))
                .await
                .map_err(map_surreal_error)?;
            let rows = take_rows(&mut response, 0)?;
            let mut requests = decode_rows(rows)?;
            sort_newest_first(&mut requests);
            Ok(requests.into_iter().next())
        })
    }

    fn list_for(
        &self,
        user_id: &UserId,
        direction: RequestDirection,
    ) -> BoxFuture<'_, DomainResult<Vec<ConnectionRequest>>> {
        let user_id = user_id.as_str().to_string();
        let filter = match direction {
            RequestDirection::Sent => "requester_id = $user_id",
            RequestDirection::Received => "recipient_id = $user_id",
            RequestDirection::All => "(requester_id = $user_id OR recipient_id = $user_id)",
        };
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(format!(
                    "{SELECT_REQUEST_FIELDS} \
                     FROM connection_request WHERE {filter} \
                     ORDER BY created_at DESC, request_id DESC"
                ))
                .bind(("user_id", user_id))
                .await
                .map_err(map_surreal_error)?;
            let rows = take_rows(&mut response, 0)?;
            let mut requests = decode_rows(rows)?;
            sort_newest_first(&mut requests);
            Ok(requests)
        })
    }

    fn list_accepted_for(
        &self,
        user_id: &UserId,
    ) -> BoxFuture<'_, DomainResult<Vec<ConnectionRequest>>> {
        let user_id = user_id.as_str().to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(format!(
                    "{SELECT_REQUEST_FIELDS} \
                     FROM connection_request \
                     WHERE status = 'accepted' \
                       AND (requester_id = $user_id OR recipient_id = $user_id) \
                     ORDER BY created_at DESC, request_id DESC"
                ))
                .bind(("user_id", user_id))
                .await
                .map_err(map_surreal_error)?;
            let rows = take_rows(&mut response, 0)?;
            let mut requests = decode_rows(rows)?;
            sort_newest_first(&mut requests);
            Ok(requests)
        })
    }

    fn resolve(
        &self,
        request_id: &RequestId,
        decision: ConnectionStatus,
        response_message: Option<String>,
        responded_at_ms: i64,
    ) -> BoxFuture<'_, DomainResult<ConnectionRequest>> {
        let request_id = request_id.as_str().to_string();
        let status = decision.as_str().to_string();
        let responded_at = format_ms_rfc3339(responded_at_ms);
        let client = self.client.clone();
        Box::pin(async move {
            // The status guard on the UPDATE is the actual race protection;
            // the trailing SELECT tells a missing record apart from one that
            // was resolved by a concurrent writer.
            let mut response = client
                .query(format!(
                    "UPDATE connection_request SET \
                        status = $status, \
                        response_message = $response_message, \
                        responded_at = $responded_at \
                     WHERE request_id = $request_id AND status = 'pending' \
                     RETURN VALUE request_id; \
                     {SELECT_REQUEST_FIELDS} \
                     FROM connection_request WHERE request_id = $request_id LIMIT 1"
                ))
                .bind(("request_id", request_id))
                .bind(("status", status))
                .bind(("response_message", response_message))
                .bind(("responded_at", responded_at))
                .await
                .map_err(map_surreal_error)?;
            let updated = take_rows(&mut response, 0)?;
            let rows = take_rows(&mut response, 1)?;
            let current = decode_rows(rows)?.pop().ok_or(DomainError::NotFound)?;
            if updated.is_empty() {
                return Err(DomainError::AlreadyResolved);
            }
            Ok(current)
        })
    }

    fn delete(&self, request_id: &RequestId) -> BoxFuture<'_, DomainResult<()>> {
        let request_id = request_id.as_str().to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(
                    "DELETE connection_request WHERE request_id = $request_id \
                     RETURN BEFORE",
                )
                .bind(("request_id", request_id))
                .await
                .map_err(map_surreal_error)?;
            let removed = take_rows(&mut response, 0)?;
            if removed.is_empty() {
                return Err(DomainError::NotFound);
            }
            Ok(())
        })
    }
}

pub struct SurrealUserDirectory {
    client: Arc<Surreal<Client>>,
}

impl SurrealUserDirectory {
    pub fn with_client(client: Arc<Surreal<Client>>) -> Self {
        Self { client }
    }
}

impl UserDirectory for SurrealUserDirectory {
    fn exists(&self, user_id: &UserId) -> BoxFuture<'_, DomainResult<bool>> {
        let user_id = user_id.as_str().to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query("SELECT VALUE user_id FROM user WHERE user_id = $user_id LIMIT 1")
                .bind(("user_id", user_id))
                .await
                .map_err(map_surreal_error)?;
            let rows = take_rows(&mut response, 0)?;
            Ok(!rows.is_empty())
        })
    }

    fn summary(&self, user_id: &UserId) -> BoxFuture<'_, DomainResult<Option<UserSummary>>> {
        let user_id = user_id.as_str().to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(
                    "SELECT user_id, name, university, avatar_url \
                     FROM user WHERE user_id = $user_id LIMIT 1",
                )
                .bind(("user_id", user_id))
                .await
                .map_err(map_surreal_error)?;
            let rows = take_rows(&mut response, 0)?;
            match rows.into_iter().next() {
                None => Ok(None),
                Some(row) => {
                    let summary: UserSummary = serde_json::from_value(row)
                        .map_err(|err| DomainError::Store(format!("invalid user row: {err}")))?;
                    Ok(Some(summary))
                }
            }
        })
    }
}

pub struct SurrealProjectStore {
    client: Arc<Surreal<Client>>,
}

impl SurrealProjectStore {
    pub fn with_client(client: Arc<Surreal<Client>>) -> Self {
        Self { client }
    }
}

impl ProjectStore for SurrealProjectStore {
    fn exists(&self, project_id: &ProjectId) -> BoxFuture<'_, DomainResult<bool>> {
        let project_id = project_id.as_str().to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query("SELECT VALUE project_id FROM project WHERE project_id = $project_id LIMIT 1")
                .bind(("project_id", project_id))
                .await
                .map_err(map_surreal_error)?;
            let rows = take_rows(&mut response, 0)?;
            Ok(!rows.is_empty())
        })
    }

    fn summary(
        &self,
        project_id: &ProjectId,
    ) -> BoxFuture<'_, DomainResult<Option<ProjectSummary>>> {
        let project_id = project_id.as_str().to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(
                    "SELECT project_id, title \
                     FROM project WHERE project_id = $project_id LIMIT 1",
                )
                .bind(("project_id", project_id))
                .await
                .map_err(map_surreal_error)?;
            let rows = take_rows(&mut response, 0)?;
            match rows.into_iter().next() {
                None => Ok(None),
                Some(row) => {
                    let summary: ProjectSummary = serde_json::from_value(row)
                        .map_err(|err| DomainError::Store(format!("invalid project row: {err}")))?;
                    Ok(Some(summary))
                }
            }
        })
    }

    fn add_collaborator(
        &self,
        project_id: &ProjectId,
        user_id: &UserId,
    ) -> BoxFuture<'_, DomainResult<()>> {
        let project_id = project_id.as_str().to_string();
        let user_id = user_id.as_str().to_string();
        let client = self.client.clone();
        Box::pin(async move {
            // array::union keeps the grant idempotent across retries.
            let mut response = client
                .query(
                    "UPDATE project SET \
                        collaborator_ids = array::union(collaborator_ids ?? [], [$user_id]) \
                     WHERE project_id = $project_id \
                     RETURN VALUE project_id",
                )
                .bind(("project_id", project_id))
                .bind(("user_id", user_id))
                .await
                .map_err(map_surreal_error)?;
            let rows = take_rows(&mut response, 0)?;
            if rows.is_empty() {
                return Err(DomainError::NotFound);
            }
            counter!(COLLABORATOR_GRANTS_TOTAL, "backend" => "surreal").increment(1);
            Ok(())
        })
    }
}
