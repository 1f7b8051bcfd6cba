//! Boundary between the task store and whatever persists tasks server-side.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{DeleteAck, NewTask, Task, TaskId, TaskPatch};
use crate::session::AccessToken;

/// Remote operation a gateway call performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    Fetch,
    Create,
    Update,
    Delete,
    Login,
    Register,
}

impl GatewayOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayOp::Fetch => "fetch tasks",
            GatewayOp::Create => "create task",
            GatewayOp::Update => "update task",
            GatewayOp::Delete => "delete task",
            GatewayOp::Login => "log in",
            GatewayOp::Register => "register",
        }
    }
}

impl fmt::Display for GatewayOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The request never got a response (connect, timeout, TLS).
    Network,
    /// Non-success HTTP status.
    Server(u16),
    /// The server answered but refused (`success: false`, `error` field).
    Rejected,
    /// The response body could not be understood.
    Decode,
}

#[derive(Debug, Clone, Error)]
#[error("{op} failed: {detail}")]
pub struct GatewayError {
    pub op: GatewayOp,
    pub kind: FailureKind,
    pub detail: String,
}

impl GatewayError {
    pub fn network(op: GatewayOp, err: impl fmt::Display) -> Self {
        Self {
            op,
            kind: FailureKind::Network,
            detail: err.to_string(),
        }
    }

    pub fn server(op: GatewayOp, status: u16, body: impl AsRef<str>) -> Self {
        let body = body.as_ref().trim();
        let detail = if body.is_empty() {
            format!("server responded with {status}")
        } else {
            format!("server responded with {status}: {body}")
        };
        Self {
            op,
            kind: FailureKind::Server(status),
            detail,
        }
    }

    pub fn rejected(op: GatewayOp, message: Option<String>) -> Self {
        Self {
            op,
            kind: FailureKind::Rejected,
            detail: message.unwrap_or_else(|| "request was rejected".to_string()),
        }
    }

    pub fn decode(op: GatewayOp, err: impl fmt::Display) -> Self {
        Self {
            op,
            kind: FailureKind::Decode,
            detail: format!("unexpected response: {err}"),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self.kind, FailureKind::Server(401 | 403))
    }
}

/// Persists task mutations remotely. Every call carries the caller's token.
#[async_trait]
pub trait TaskGateway: Send + Sync {
    async fn list_tasks(&self, token: &AccessToken) -> Result<Vec<Task>, GatewayError>;

    async fn create_task(&self, token: &AccessToken, draft: &NewTask)
        -> Result<Task, GatewayError>;

    async fn update_task(
        &self,
        token: &AccessToken,
        id: TaskId,
        patch: &TaskPatch,
    ) -> Result<Task, GatewayError>;

    async fn delete_task(&self, token: &AccessToken, id: TaskId)
        -> Result<DeleteAck, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_includes_status_and_body() {
        let err = GatewayError::server(GatewayOp::Create, 500, " boom ");
        assert_eq!(err.kind, FailureKind::Server(500));
        assert_eq!(
            err.to_string(),
            "create task failed: server responded with 500: boom"
        );
        assert!(!err.is_unauthorized());
        assert!(GatewayError::server(GatewayOp::Fetch, 401, "").is_unauthorized());
    }

    #[test]
    fn rejected_without_message_has_default_detail() {
        let err = GatewayError::rejected(GatewayOp::Delete, None);
        assert_eq!(err.to_string(), "delete task failed: request was rejected");
    }
}
