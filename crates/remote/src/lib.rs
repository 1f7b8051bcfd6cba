//! HTTP gateway for the task server.

mod envelope;

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use tracing::{debug, warn};

use taskdeck_core::{
    AccessToken, AppConfig, AuthGateway, DeleteAck, GatewayError, GatewayOp, NewTask,
    SessionRecord, Task, TaskGateway, TaskId, TaskPatch,
};

pub struct HttpGateway {
    client: Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("taskdeck/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(config.api_url(), config.http_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
    }

    fn authorized(&self, method: Method, path: &str, token: &AccessToken) -> RequestBuilder {
        self.request(method, path).bearer_auth(token.as_str())
    }

    /// Send and return the body of a 2xx response.
    async fn send(&self, op: GatewayOp, request: RequestBuilder) -> Result<String, GatewayError> {
        let response = request
            .send()
            .await
            .map_err(|err| GatewayError::network(op, err))?;
        let status = response.status();
        debug!(%op, status = status.as_u16(), url = %response.url(), "task server responded");
        let body = response
            .text()
            .await
            .map_err(|err| GatewayError::network(op, err))?;
        if !status.is_success() {
            warn!(%op, status = status.as_u16(), "task server returned an error status");
            let detail = envelope::failure_message(&body).unwrap_or(body);
            return Err(GatewayError::server(op, status.as_u16(), detail));
        }
        Ok(body)
    }
}

#[async_trait]
impl TaskGateway for HttpGateway {
    async fn list_tasks(&self, token: &AccessToken) -> Result<Vec<Task>, GatewayError> {
        let op = GatewayOp::Fetch;
        let body = self
            .send(op, self.authorized(Method::GET, "/todos", token))
            .await?;
        envelope::decode(op, &body)
    }

    async fn create_task(
        &self,
        token: &AccessToken,
        draft: &NewTask,
    ) -> Result<Task, GatewayError> {
        let op = GatewayOp::Create;
        let request = self.authorized(Method::POST, "/todos", token).json(draft);
        let body = self.send(op, request).await?;
        envelope::decode(op, &body)
    }

    async fn update_task(
        &self,
        token: &AccessToken,
        id: TaskId,
        patch: &TaskPatch,
    ) -> Result<Task, GatewayError> {
        let op = GatewayOp::Update;
        let request = self
            .authorized(Method::PATCH, &format!("/todos/{id}"), token)
            .json(patch);
        let body = self.send(op, request).await?;
        envelope::decode(op, &body)
    }

    async fn delete_task(
        &self,
        token: &AccessToken,
        id: TaskId,
    ) -> Result<DeleteAck, GatewayError> {
        let request = self.authorized(Method::DELETE, &format!("/todos/{id}"), token);
        let body = self.send(GatewayOp::Delete, request).await?;
        envelope::decode_delete(&body)
    }
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct Registration<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
    #[serde(rename = "re-enterPassword")]
    password_again: &'a str,
}

#[async_trait]
impl AuthGateway for HttpGateway {
    async fn login(&self, email: &str, password: &str) -> Result<SessionRecord, GatewayError> {
        let op = GatewayOp::Login;
        let request = self
            .request(Method::POST, "/auth/login")
            .json(&Credentials {
                email: email.trim(),
                password,
            });
        let body = self.send(op, request).await?;
        envelope::decode_session(op, &body)
    }

    /// Create the account, then sign in with it.
    async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<SessionRecord, GatewayError> {
        let op = GatewayOp::Register;
        let request = self
            .request(Method::POST, "/auth/register")
            .json(&Registration {
                username: username.trim(),
                email: email.trim(),
                password,
                password_again: password,
            });
        let body = self.send(op, request).await?;
        envelope::ensure_accepted(op, &body)?;
        self.login(email, password).await
    }
}
