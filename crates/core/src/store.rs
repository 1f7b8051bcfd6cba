//! Client-side task store with optimistic mutations.
//!
//! Every mutation runs in three steps: apply the change to the local snapshot,
//! call the gateway, then either reconcile with what the server returned or
//! undo the local change. The state lock is only held for the local steps, so
//! readers see the optimistic snapshot while the gateway call is pending.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::gateway::{GatewayError, GatewayOp, TaskGateway};
use crate::model::{NewTask, Task, TaskId, TaskPatch};
use crate::session::{AccessToken, SessionProvider};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not signed in")]
    Unauthenticated,
    #[error("task {0} not found")]
    NotFound(TaskId),
    #[error("task {0} already has a change in flight")]
    Busy(TaskId),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl StoreError {
    /// Short line suitable for a toast or status bar.
    pub fn user_message(&self) -> String {
        match self {
            StoreError::Unauthenticated => "Please log in to manage your tasks.".to_string(),
            StoreError::NotFound(id) => format!("Task {id} no longer exists."),
            StoreError::Busy(id) => format!("Task {id} is still saving. Try again in a moment."),
            StoreError::Gateway(err) if err.is_unauthorized() => {
                "Your session has expired. Please log in again.".to_string()
            }
            StoreError::Gateway(err) => match err.op {
                GatewayOp::Fetch => "Failed to fetch tasks. Please try again.".to_string(),
                GatewayOp::Create => "Failed to add task. Please try again.".to_string(),
                GatewayOp::Update => "Failed to update task. Please try again.".to_string(),
                GatewayOp::Delete => "Failed to delete task. Please try again.".to_string(),
                GatewayOp::Login => "Login failed. Check your email and password.".to_string(),
                GatewayOp::Register => "Registration failed. Please try again.".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Replaced { count: usize },
    /// Skipped because a mutation is still waiting on the server.
    Deferred,
}

/// How to undo an applied change.
#[derive(Debug)]
enum Rollback {
    RemoveProvisional(TaskId),
    Restore(Task),
    Reinsert { index: usize, task: Task },
}

#[derive(Debug)]
struct StoreState {
    tasks: Arc<Vec<Task>>,
    in_flight: HashSet<TaskId>,
    next_provisional: i64,
    version: u64,
}

impl StoreState {
    fn position(&self, id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|task| task.id == id)
    }

    fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// Mark `id` as in flight, failing if it is missing or already busy.
    fn claim(&mut self, id: TaskId) -> Result<(), StoreError> {
        if self.position(id).is_none() {
            return Err(StoreError::NotFound(id));
        }
        if id.is_provisional() || !self.in_flight.insert(id) {
            return Err(StoreError::Busy(id));
        }
        Ok(())
    }

    fn allocate_provisional(&mut self) -> TaskId {
        let id = TaskId(self.next_provisional);
        self.next_provisional -= 1;
        id
    }

    fn undo(&mut self, rollback: Rollback) {
        let tasks = Arc::make_mut(&mut self.tasks);
        match rollback {
            Rollback::RemoveProvisional(id) => tasks.retain(|task| task.id != id),
            Rollback::Restore(previous) => {
                if let Some(slot) = tasks.iter_mut().find(|task| task.id == previous.id) {
                    *slot = previous;
                }
            }
            Rollback::Reinsert { index, task } => {
                if !tasks.iter().any(|existing| existing.id == task.id) {
                    let index = index.min(tasks.len());
                    tasks.insert(index, task);
                }
            }
        }
    }

    /// Put `confirmed` where `local_id` sits, keeping ids unique.
    fn settle(&mut self, local_id: TaskId, confirmed: Task) {
        let tasks = Arc::make_mut(&mut self.tasks);
        let confirmed_id = confirmed.id;
        match tasks.iter().position(|task| task.id == local_id) {
            Some(index) => {
                tasks[index] = confirmed;
                let mut seen = false;
                tasks.retain(|task| {
                    if task.id != confirmed_id {
                        return true;
                    }
                    let keep = !seen;
                    seen = true;
                    keep
                });
            }
            None => {
                tasks.retain(|task| task.id != confirmed_id);
                tasks.insert(0, confirmed);
            }
        }
    }
}

pub struct TaskStore {
    gateway: Arc<dyn TaskGateway>,
    session: Arc<dyn SessionProvider>,
    state: Mutex<StoreState>,
    changes: watch::Sender<u64>,
}

impl TaskStore {
    pub fn new(gateway: Arc<dyn TaskGateway>, session: Arc<dyn SessionProvider>) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            gateway,
            session,
            state: Mutex::new(StoreState {
                tasks: Arc::new(Vec::new()),
                in_flight: HashSet::new(),
                next_provisional: -1,
                version: 0,
            }),
            changes,
        }
    }

    /// Store seeded with an already-known list, e.g. from a cache.
    pub fn with_tasks(
        gateway: Arc<dyn TaskGateway>,
        session: Arc<dyn SessionProvider>,
        tasks: Vec<Task>,
    ) -> Self {
        let store = Self::new(gateway, session);
        {
            let mut state = store.state.lock();
            state.tasks = Arc::new(dedupe(tasks));
        }
        store
    }

    /// Current snapshot. Later changes produce a new snapshot; this one stays as is.
    pub fn list(&self) -> Arc<Vec<Task>> {
        self.state.lock().tasks.clone()
    }

    pub fn get(&self, id: TaskId) -> Option<Task> {
        self.state.lock().task(id).cloned()
    }

    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    /// Receiver that sees the snapshot version after every change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Ids with a gateway call outstanding.
    pub fn pending(&self) -> Vec<TaskId> {
        let state = self.state.lock();
        let mut ids: Vec<TaskId> = state.in_flight.iter().copied().collect();
        ids.sort();
        ids
    }

    /// Create a task. A blank title is ignored and yields `Ok(None)`.
    pub async fn add(&self, draft: NewTask) -> Result<Option<Task>, StoreError> {
        let Some(draft) = draft.cleaned() else {
            debug!("ignoring add with blank title");
            return Ok(None);
        };
        let token = self.token()?;

        let provisional_id = self.mutate(|state| {
            let id = state.allocate_provisional();
            let task = Task::provisional(id, &draft, Utc::now());
            Arc::make_mut(&mut state.tasks).insert(0, task);
            state.in_flight.insert(id);
            id
        });
        debug!(task_id = %provisional_id, "applied optimistic add");

        let result = self.gateway.create_task(&token, &draft).await;

        self.mutate(|state| {
            state.in_flight.remove(&provisional_id);
            match result {
                Ok(created) => {
                    let fallback = state.task(provisional_id).and_then(|t| t.completed_at);
                    let created = created.normalized(fallback, Utc::now());
                    state.settle(provisional_id, created.clone());
                    debug!(provisional = %provisional_id, task_id = %created.id, "add confirmed");
                    Ok(Some(created))
                }
                Err(err) => {
                    state.undo(Rollback::RemoveProvisional(provisional_id));
                    warn!(error = %err, "add failed, removed provisional task");
                    Err(err.into())
                }
            }
        })
    }

    /// Flip completion of `id`.
    pub async fn toggle(&self, id: TaskId) -> Result<Task, StoreError> {
        let token = self.token()?;

        let (previous, patch) = self.try_mutate(|state| {
            state.claim(id)?;
            let tasks = Arc::make_mut(&mut state.tasks);
            let Some(task) = tasks.iter_mut().find(|task| task.id == id) else {
                state.in_flight.remove(&id);
                return Err(StoreError::NotFound(id));
            };
            let previous = task.clone();
            task.set_completed(!previous.completed, Utc::now());
            Ok((previous, TaskPatch::completion_of(task)))
        })?;
        debug!(task_id = %id, completed = !previous.completed, "applied optimistic toggle");

        self.finish_update(id, &token, &patch, previous)
            .await
    }

    /// Apply `patch` to `id`. A patch that blanks the title is ignored.
    pub async fn edit(&self, id: TaskId, patch: TaskPatch) -> Result<Option<Task>, StoreError> {
        if patch.has_blank_title() {
            debug!(task_id = %id, "ignoring edit with blank title");
            return Ok(None);
        }
        if patch.is_empty() {
            return self.get(id).map(Some).ok_or(StoreError::NotFound(id));
        }
        let token = self.token()?;

        let (previous, patch) = self.try_mutate(|state| {
            state.claim(id)?;
            let tasks = Arc::make_mut(&mut state.tasks);
            let Some(task) = tasks.iter_mut().find(|task| task.id == id) else {
                state.in_flight.remove(&id);
                return Err(StoreError::NotFound(id));
            };
            let previous = task.clone();
            task.apply(&patch, Utc::now());
            Ok((previous, patch.with_completion_from(task)))
        })?;
        debug!(task_id = %id, "applied optimistic edit");

        self.finish_update(id, &token, &patch, previous)
            .await
            .map(Some)
    }

    /// Remove `id`. On failure the task returns to its old position.
    pub async fn delete(&self, id: TaskId) -> Result<(), StoreError> {
        let token = self.token()?;

        let rollback = self.try_mutate(|state| {
            state.claim(id)?;
            let tasks = Arc::make_mut(&mut state.tasks);
            let Some(index) = tasks.iter().position(|task| task.id == id) else {
                state.in_flight.remove(&id);
                return Err(StoreError::NotFound(id));
            };
            let task = tasks.remove(index);
            Ok(Rollback::Reinsert { index, task })
        })?;
        debug!(task_id = %id, "applied optimistic delete");

        let result = match self.gateway.delete_task(&token, id).await {
            Ok(ack) if ack.success => Ok(()),
            Ok(ack) => Err(GatewayError::rejected(GatewayOp::Delete, ack.message)),
            Err(err) => Err(err),
        };

        self.mutate(|state| {
            state.in_flight.remove(&id);
            match result {
                Ok(()) => {
                    debug!(task_id = %id, "delete confirmed");
                    Ok(())
                }
                Err(err) => {
                    state.undo(rollback);
                    warn!(task_id = %id, error = %err, "delete failed, restored task");
                    Err(err.into())
                }
            }
        })
    }

    /// Replace the snapshot with the server's list, unless a mutation is pending
    /// or the snapshot changed while the list was being fetched.
    pub async fn refresh(&self) -> Result<RefreshOutcome, StoreError> {
        let token = self.token()?;
        let seen = {
            let state = self.state.lock();
            if !state.in_flight.is_empty() {
                debug!("refresh deferred, mutations in flight");
                return Ok(RefreshOutcome::Deferred);
            }
            state.version
        };

        let tasks = match self.gateway.list_tasks(&token).await {
            Ok(tasks) => tasks,
            Err(err) => {
                warn!(error = %err, "refresh failed, keeping current snapshot");
                return Err(err.into());
            }
        };

        let now = Utc::now();
        let tasks: Vec<Task> = tasks
            .into_iter()
            .map(|task| task.normalized(None, now))
            .collect();

        let replaced = self.mutate_if(|state| {
            if state.version != seen || !state.in_flight.is_empty() {
                return None;
            }
            let tasks = dedupe(tasks);
            let count = tasks.len();
            state.tasks = Arc::new(tasks);
            Some(count)
        });
        match replaced {
            Some(count) => {
                debug!(count, "snapshot replaced from server");
                Ok(RefreshOutcome::Replaced { count })
            }
            None => {
                debug!("refresh deferred, snapshot changed during fetch");
                Ok(RefreshOutcome::Deferred)
            }
        }
    }

    async fn finish_update(
        &self,
        id: TaskId,
        token: &AccessToken,
        patch: &TaskPatch,
        previous: Task,
    ) -> Result<Task, StoreError> {
        let result = self.gateway.update_task(token, id, patch).await;

        self.mutate(|state| {
            state.in_flight.remove(&id);
            match result {
                Ok(updated) => {
                    let fallback = state.task(id).and_then(|t| t.completed_at);
                    let updated = updated.normalized(fallback, Utc::now());
                    state.settle(id, updated.clone());
                    debug!(task_id = %id, "update confirmed");
                    Ok(updated)
                }
                Err(err) => {
                    state.undo(Rollback::Restore(previous));
                    warn!(task_id = %id, error = %err, "update failed, restored task");
                    Err(err.into())
                }
            }
        })
    }

    fn token(&self) -> Result<AccessToken, StoreError> {
        self.session
            .current_token()
            .ok_or(StoreError::Unauthenticated)
    }

    /// Run `f` under the lock and publish a new version afterwards.
    fn mutate<T>(&self, f: impl FnOnce(&mut StoreState) -> T) -> T {
        let (out, version) = {
            let mut state = self.state.lock();
            let out = f(&mut state);
            state.version += 1;
            (out, state.version)
        };
        self.changes.send_replace(version);
        out
    }

    /// Like [`Self::mutate`], but `None` from `f` leaves the version alone.
    fn mutate_if<T>(&self, f: impl FnOnce(&mut StoreState) -> Option<T>) -> Option<T> {
        let (out, version) = {
            let mut state = self.state.lock();
            let out = f(&mut state)?;
            state.version += 1;
            (out, state.version)
        };
        self.changes.send_replace(version);
        Some(out)
    }

    /// Like [`Self::mutate`], but a failed `f` leaves the version alone.
    fn try_mutate<T>(
        &self,
        f: impl FnOnce(&mut StoreState) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let (out, version) = {
            let mut state = self.state.lock();
            let out = f(&mut state)?;
            state.version += 1;
            (out, state.version)
        };
        self.changes.send_replace(version);
        Ok(out)
    }
}

fn dedupe(tasks: Vec<Task>) -> Vec<Task> {
    let mut seen = HashSet::new();
    tasks
        .into_iter()
        .filter(|task| seen.insert(task.id))
        .collect()
}
