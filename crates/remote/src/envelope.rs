//! Response bodies from the task server.
//!
//! Payloads arrive either bare or wrapped as `{"data": ...}`. A body with an
//! `error` field or `"success": false` is a refusal even on a 2xx status.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use taskdeck_core::{AccessToken, DeleteAck, GatewayError, GatewayOp, SessionRecord, UserProfile};

pub(crate) fn decode<T: DeserializeOwned>(op: GatewayOp, body: &str) -> Result<T, GatewayError> {
    let value: Value = serde_json::from_str(body).map_err(|err| GatewayError::decode(op, err))?;
    if let Some(message) = refusal(&value) {
        return Err(GatewayError::rejected(op, message));
    }
    serde_json::from_value(unwrap_data(value)).map_err(|err| GatewayError::decode(op, err))
}

/// Fail if the body is a refusal. Anything else, including non-JSON, passes.
pub(crate) fn ensure_accepted(op: GatewayOp, body: &str) -> Result<(), GatewayError> {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return Ok(());
    };
    match refusal(&value) {
        Some(message) => Err(GatewayError::rejected(op, message)),
        None => Ok(()),
    }
}

/// Delete answers vary: an empty body, the removed record, or a `success` flag.
pub(crate) fn decode_delete(body: &str) -> Result<DeleteAck, GatewayError> {
    if body.trim().is_empty() {
        return Ok(DeleteAck::ok());
    }
    let value: Value = serde_json::from_str(body)
        .map_err(|err| GatewayError::decode(GatewayOp::Delete, err))?;
    let Some(fields) = value.as_object() else {
        return Ok(DeleteAck::ok());
    };
    if let Some(error) = error_field(fields) {
        return Err(GatewayError::rejected(GatewayOp::Delete, Some(error)));
    }
    match fields.get("success").and_then(Value::as_bool) {
        Some(success) => Ok(DeleteAck {
            success,
            message: message_field(fields),
        }),
        None => Ok(DeleteAck::ok()),
    }
}

/// Human-readable reason carried by an error body, if there is one.
pub(crate) fn failure_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let fields = value.as_object()?;
    error_field(fields).or_else(|| message_field(fields))
}

#[derive(Debug, Deserialize)]
struct WireSession {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: Value,
    email: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    user_metadata: Option<UserMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    session: WireSession,
    #[serde(default)]
    user: Option<WireUser>,
}

pub(crate) fn decode_session(op: GatewayOp, body: &str) -> Result<SessionRecord, GatewayError> {
    let response: LoginResponse = decode(op, body)?;
    if response.session.access_token.trim().is_empty() {
        return Err(GatewayError::decode(op, "empty access token"));
    }
    let user = response.user.map(|user| UserProfile {
        id: match user.id {
            Value::String(id) => id,
            other => other.to_string(),
        },
        email: user.email,
        username: user
            .username
            .filter(|name| !name.trim().is_empty())
            .or_else(|| user.user_metadata.and_then(|meta| meta.username))
            .filter(|name| !name.trim().is_empty()),
    });
    Ok(SessionRecord {
        access_token: AccessToken::new(response.session.access_token),
        user,
    })
}

fn refusal(value: &Value) -> Option<Option<String>> {
    let fields = value.as_object()?;
    if let Some(error) = error_field(fields) {
        return Some(Some(error));
    }
    if fields.get("success").and_then(Value::as_bool) == Some(false) {
        return Some(message_field(fields));
    }
    None
}

fn unwrap_data(value: Value) -> Value {
    match value {
        Value::Object(mut fields) if fields.contains_key("data") && !fields.contains_key("id") => {
            fields.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn error_field(fields: &Map<String, Value>) -> Option<String> {
    match fields.get("error")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(text) => Some(text.clone()),
        Value::Object(inner) => {
            message_field(inner).or_else(|| Some(Value::Object(inner.clone()).to_string()))
        }
        other => Some(other.to_string()),
    }
}

fn message_field(fields: &Map<String, Value>) -> Option<String> {
    fields
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use taskdeck_core::{FailureKind, Task, TaskId};

    const TASK: &str = r#"{"id":7,"title":"Call Ana","completed":false,"priority":"high"}"#;

    #[test]
    fn accepts_bare_and_wrapped_payloads() {
        let bare: Task = decode(GatewayOp::Create, TASK).unwrap();
        let wrapped: Task = decode(GatewayOp::Create, &format!(r#"{{"data":{TASK}}}"#)).unwrap();
        assert_eq!(bare, wrapped);
        assert_eq!(bare.id, TaskId(7));

        let list: Vec<Task> =
            decode(GatewayOp::Fetch, &format!(r#"{{"success":true,"data":[{TASK}]}}"#)).unwrap();
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn error_bodies_are_refusals() {
        let err = decode::<Task>(GatewayOp::Update, r#"{"error":"todo not found"}"#).unwrap_err();
        assert_eq!(err.kind, FailureKind::Rejected);
        assert_eq!(err.detail, "todo not found");

        let err = decode::<Vec<Task>>(
            GatewayOp::Fetch,
            r#"{"success":false,"message":"token expired"}"#,
        )
        .unwrap_err();
        assert_eq!(err.detail, "token expired");
    }

    #[test]
    fn garbage_is_a_decode_failure() {
        let err = decode::<Task>(GatewayOp::Create, "<html>").unwrap_err();
        assert_eq!(err.kind, FailureKind::Decode);
        let err = decode::<Task>(GatewayOp::Create, r#"{"title":"no id"}"#).unwrap_err();
        assert_eq!(err.kind, FailureKind::Decode);
    }

    #[test]
    fn delete_acknowledgements() {
        assert_eq!(decode_delete("").unwrap(), DeleteAck::ok());
        assert_eq!(decode_delete(TASK).unwrap(), DeleteAck::ok());
        assert_eq!(
            decode_delete(r#"{"success":false,"message":"locked"}"#).unwrap(),
            DeleteAck {
                success: false,
                message: Some("locked".into()),
            }
        );
        assert!(decode_delete(r#"{"error":"nope"}"#).is_err());
    }

    #[test]
    fn session_from_login_response() {
        let body = r#"{"session":{"access_token":"tok"},"user":{"id":3,"email":"ana@example.com","username":""}}"#;
        let record = decode_session(GatewayOp::Login, body).unwrap();
        assert_eq!(record.access_token, AccessToken::new("tok"));
        let user = record.user.unwrap();
        assert_eq!(user.id, "3");
        assert_eq!(user.username, None);

        assert!(decode_session(GatewayOp::Login, r#"{"error":"Invalid login"}"#).is_err());
    }

    #[test]
    fn username_falls_back_to_user_metadata() {
        let body = r#"{"session":{"access_token":"tok"},"user":{"id":"u1","email":"ana@example.com","user_metadata":{"username":"ana"}}}"#;
        let user = decode_session(GatewayOp::Login, body).unwrap().user.unwrap();
        assert_eq!(user.username.as_deref(), Some("ana"));
    }

    #[test]
    fn registration_refusals_are_detected() {
        assert!(ensure_accepted(GatewayOp::Register, r#"{"message":"created"}"#).is_ok());
        assert!(ensure_accepted(GatewayOp::Register, "").is_ok());
        let err = ensure_accepted(GatewayOp::Register, r#"{"error":"Email already used"}"#)
            .unwrap_err();
        assert_eq!(err.detail, "Email already used");
    }

    #[test]
    fn failure_message_prefers_error_field() {
        assert_eq!(
            failure_message(r#"{"error":"bad","message":"other"}"#),
            Some("bad".to_string())
        );
        assert_eq!(failure_message("Internal Server Error"), None);
    }
}
