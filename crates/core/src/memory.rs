//! In-process gateway that behaves like the task server.
//!
//! Calls can be paused (to observe optimistic state while a request is
//! outstanding) and failures can be queued per operation.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};

use crate::gateway::{GatewayError, GatewayOp, TaskGateway};
use crate::model::{DeleteAck, NewTask, Task, TaskId, TaskPatch};
use crate::session::{AccessToken, AuthGateway, SessionRecord, UserProfile};

#[derive(Debug, Default)]
struct Server {
    tasks: Vec<Task>,
    next_id: i64,
    failures: HashMap<GatewayOp, VecDeque<GatewayError>>,
    refusals: VecDeque<Option<String>>,
}

#[derive(Debug)]
pub struct MemoryGateway {
    server: Mutex<Server>,
    token: AccessToken,
    gate: Option<Semaphore>,
    entered: Notify,
    calls: AtomicUsize,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::with_tasks(Vec::new())
    }

    /// Gateway pre-loaded with `tasks`; new ids continue after the largest one.
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let next_id = tasks.iter().map(|t| t.id.0).max().unwrap_or(0).max(0) + 1;
        Self {
            server: Mutex::new(Server {
                tasks,
                next_id,
                ..Server::default()
            }),
            token: AccessToken::new("memory-token"),
            gate: None,
            entered: Notify::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call waits for [`Self::release`] before answering.
    pub fn paused(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub fn release(&self, calls: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(calls);
        }
    }

    /// Resolves once a call has reached the gateway.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make the next `op` call fail with `error`.
    pub fn fail_next(&self, op: GatewayOp, error: GatewayError) {
        self.server
            .lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Make the next delete answer `success: false`.
    pub fn refuse_next_delete(&self, message: Option<String>) {
        self.server.lock().refusals.push_back(message);
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.server.lock().tasks.clone()
    }

    async fn enter(&self, op: GatewayOp, token: Option<&AccessToken>) -> Result<(), GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|err| GatewayError::network(op, err))?;
            permit.forget();
        }
        if let Some(token) = token {
            if token != &self.token {
                return Err(GatewayError::server(op, 401, "invalid token"));
            }
        }
        let failure = {
            let mut server = self.server.lock();
            server.failures.get_mut(&op).and_then(VecDeque::pop_front)
        };
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskGateway for MemoryGateway {
    async fn list_tasks(&self, token: &AccessToken) -> Result<Vec<Task>, GatewayError> {
        self.enter(GatewayOp::Fetch, Some(token)).await?;
        Ok(self.server.lock().tasks.clone())
    }

    async fn create_task(
        &self,
        token: &AccessToken,
        draft: &NewTask,
    ) -> Result<Task, GatewayError> {
        self.enter(GatewayOp::Create, Some(token)).await?;
        let mut server = self.server.lock();
        let id = TaskId(server.next_id);
        server.next_id += 1;
        let task = Task::provisional(id, draft, Utc::now());
        server.tasks.insert(0, task.clone());
        Ok(task)
    }

    async fn update_task(
        &self,
        token: &AccessToken,
        id: TaskId,
        patch: &TaskPatch,
    ) -> Result<Task, GatewayError> {
        self.enter(GatewayOp::Update, Some(token)).await?;
        let mut server = self.server.lock();
        let task = server
            .tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or_else(|| GatewayError::server(GatewayOp::Update, 404, "todo not found"))?;
        task.apply(patch, Utc::now());
        if let Some(completed_at) = patch.completed_at {
            if task.completed {
                task.completed_at = completed_at.or(task.completed_at);
            }
        }
        Ok(task.clone())
    }

    async fn delete_task(
        &self,
        token: &AccessToken,
        id: TaskId,
    ) -> Result<DeleteAck, GatewayError> {
        self.enter(GatewayOp::Delete, Some(token)).await?;
        let mut server = self.server.lock();
        if let Some(message) = server.refusals.pop_front() {
            return Ok(DeleteAck {
                success: false,
                message,
            });
        }
        let before = server.tasks.len();
        server.tasks.retain(|task| task.id != id);
        if server.tasks.len() == before {
            return Err(GatewayError::server(GatewayOp::Delete, 404, "todo not found"));
        }
        Ok(DeleteAck::ok())
    }
}

#[async_trait]
impl AuthGateway for MemoryGateway {
    async fn login(&self, email: &str, password: &str) -> Result<SessionRecord, GatewayError> {
        self.enter(GatewayOp::Login, None).await?;
        if email.trim().is_empty() || password.is_empty() {
            return Err(GatewayError::rejected(
                GatewayOp::Login,
                Some("email and password are required".into()),
            ));
        }
        Ok(SessionRecord {
            access_token: self.token.clone(),
            user: Some(UserProfile {
                id: "memory-user".into(),
                email: email.trim().to_string(),
                username: None,
            }),
        })
    }

    async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<SessionRecord, GatewayError> {
        self.enter(GatewayOp::Register, None).await?;
        let mut record = self.login(email, password).await?;
        if let Some(user) = record.user.as_mut() {
            user.username = Some(username.trim().to_string());
        }
        Ok(record)
    }
}
