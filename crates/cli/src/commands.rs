use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Local;
use tracing::debug;

use taskdeck_remote::HttpGateway;

use crate::capture::{CaptureError, TaskInput};
use crate::cli::{
    AddArgs, CliCommand, CountsArgs, DeleteArgs, EditArgs, ListArgs, LoginArgs, RegisterArgs,
    ShowArgs, ToggleArgs,
};
use crate::config::AppConfig;
use crate::format;
use crate::model::{parse_priority, NewTask, TaskId, TaskPatch};
use crate::parser::{parse_date_spec, prepare_new_task};
use crate::session::{AuthGateway, FileSession};
use crate::store::{StoreError, TaskStore};
use crate::views::{Section, ViewOrder, ViewSnapshot};
use crate::TaskGateway;

/// Everything a command needs: the task store and the signed-in session.
pub struct App {
    store: TaskStore,
    session: Arc<FileSession>,
    auth: Arc<dyn AuthGateway>,
}

impl App {
    pub fn new(
        gateway: Arc<dyn TaskGateway>,
        auth: Arc<dyn AuthGateway>,
        session: Arc<FileSession>,
    ) -> Self {
        let store = TaskStore::new(gateway, session.clone());
        Self {
            store,
            session,
            auth,
        }
    }

    /// Wire the app to the task server named in `config`.
    pub fn connect(config: &AppConfig) -> Result<Self> {
        let session = Arc::new(FileSession::load(config.session_path())?);
        let http = Arc::new(HttpGateway::from_config(config)?);
        debug!(
            api_url = http.base_url(),
            data_dir = %config.data_dir().display(),
            "using task server"
        );
        Ok(Self::new(http.clone(), http, session))
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    async fn load(&self) -> Result<()> {
        self.store.refresh().await.map_err(store_error)?;
        Ok(())
    }
}

pub async fn execute<W: Write>(app: &App, command: CliCommand, mut writer: W) -> Result<()> {
    match command {
        CliCommand::List(args) => handle_list(app, &args, &mut writer).await,
        CliCommand::Counts(args) => handle_counts(app, &args, &mut writer).await,
        CliCommand::Show(args) => handle_show(app, &args, &mut writer).await,
        CliCommand::Add(args) => handle_add(app, args, &mut writer).await,
        CliCommand::Toggle(args) => handle_toggle(app, &args, &mut writer).await,
        CliCommand::Edit(args) => handle_edit(app, &args, &mut writer).await,
        CliCommand::Delete(args) => handle_delete(app, &args, &mut writer).await,
        CliCommand::Login(args) => handle_login(app, args, &mut writer).await,
        CliCommand::Register(args) => handle_register(app, args, &mut writer).await,
        CliCommand::Logout => handle_logout(app, &mut writer),
    }
}

async fn handle_list<W: Write>(app: &App, args: &ListArgs, mut writer: W) -> Result<()> {
    app.load().await?;
    let order = if args.ranked {
        ViewOrder::Ranked
    } else {
        ViewOrder::Stored
    };
    let view = ViewSnapshot::build(&app.store.list(), args.section, &Local::now(), order);

    if args.json {
        serde_json::to_writer_pretty(&mut writer, &view)?;
        writeln!(writer)?;
        return Ok(());
    }

    writeln!(writer, "{} ({})", view.section.title(), view.tasks.len())?;
    if view.is_empty() {
        writeln!(writer, "  {}", view.section.description())?;
    }
    for task in &view.tasks {
        writeln!(writer, "{}", format::task_line(task, &Local))?;
    }
    Ok(())
}

async fn handle_counts<W: Write>(app: &App, args: &CountsArgs, mut writer: W) -> Result<()> {
    app.load().await?;
    let view = ViewSnapshot::build(
        &app.store.list(),
        Section::Inbox,
        &Local::now(),
        ViewOrder::Stored,
    );
    if args.json {
        serde_json::to_writer_pretty(&mut writer, &view.counts)?;
        writeln!(writer)?;
        return Ok(());
    }
    for line in format::counts_lines(&view.counts) {
        writeln!(writer, "{line}")?;
    }
    Ok(())
}

async fn handle_show<W: Write>(app: &App, args: &ShowArgs, mut writer: W) -> Result<()> {
    app.load().await?;
    let task = app
        .store
        .get(args.id)
        .ok_or_else(|| anyhow!("Task {} not found", args.id))?;
    for (label, value) in format::task_detail_entries(&task, &Local) {
        writeln!(writer, "{label:<12}{value}")?;
    }
    Ok(())
}

async fn handle_add<W: Write>(app: &App, args: AddArgs, mut writer: W) -> Result<()> {
    // Blank input is handed to the store as an empty draft, which it ignores.
    let draft = match prepare_new_task(&TaskInput::from(args), &Local::now()) {
        Ok(draft) => draft,
        Err(err) if err.downcast_ref::<CaptureError>().is_some() => NewTask::default(),
        Err(err) => return Err(err),
    };
    match app.store.add(draft).await.map_err(store_error)? {
        Some(task) => writeln!(writer, "Added #{}: {}", task.id, task.title)?,
        None => writeln!(writer, "Nothing to add")?,
    }
    Ok(())
}

async fn handle_toggle<W: Write>(app: &App, args: &ToggleArgs, mut writer: W) -> Result<()> {
    app.load().await?;
    let task = app.store.toggle(args.id).await.map_err(store_error)?;
    let verb = if task.completed { "Completed" } else { "Reopened" };
    writeln!(writer, "{verb} #{}: {}", task.id, task.title)?;
    Ok(())
}

async fn handle_edit<W: Write>(app: &App, args: &EditArgs, mut writer: W) -> Result<()> {
    let patch = patch_from_args(args)?;
    if patch.is_empty() {
        bail!("Nothing to change. Pass --title, --description, --priority, --due or --clear-due");
    }
    app.load().await?;
    match app.store.edit(args.id, patch).await.map_err(store_error)? {
        Some(task) => writeln!(writer, "Updated #{}: {}", task.id, task.title)?,
        None => writeln!(writer, "No changes made")?,
    }
    Ok(())
}

fn patch_from_args(args: &EditArgs) -> Result<TaskPatch> {
    let deadline_at = if args.clear_due {
        Some(None)
    } else {
        args.due_at
            .as_deref()
            .map(|spec| parse_date_spec(spec).map(Some))
            .transpose()?
    };
    Ok(TaskPatch {
        title: args.title.clone(),
        description: args.description.as_deref().map(|text| {
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        }),
        priority: args.priority.as_deref().map(parse_priority).transpose()?,
        deadline_at,
        ..TaskPatch::default()
    })
}

async fn handle_delete<W: Write>(app: &App, args: &DeleteArgs, mut writer: W) -> Result<()> {
    app.load().await?;
    let mut results = Vec::with_capacity(args.ids.len());
    for raw in &args.ids {
        let outcome = match raw.parse::<TaskId>() {
            Err(_) => DeleteOutcome::Invalid,
            Ok(id) => match app.store.delete(id).await {
                Ok(()) => DeleteOutcome::Deleted,
                Err(StoreError::NotFound(_)) => DeleteOutcome::Missing,
                Err(err @ StoreError::Unauthenticated) => return Err(store_error(err)),
                Err(err) => DeleteOutcome::Failed(err.user_message()),
            },
        };
        results.push((raw.clone(), outcome));
    }
    let summary = DeleteSummary::from_results(&results);
    summary.write_to(&mut writer)?;
    Ok(())
}

async fn handle_login<W: Write>(app: &App, args: LoginArgs, mut writer: W) -> Result<()> {
    let password = match args.password {
        Some(password) => password,
        None => read_password()?,
    };
    let record = app
        .auth
        .login(&args.email, &password)
        .await
        .map_err(|err| store_error(err.into()))?;
    app.session.save(record)?;
    writeln!(writer, "Logged in as {}", signed_in_name(app, &args.email))?;
    Ok(())
}

async fn handle_register<W: Write>(app: &App, args: RegisterArgs, mut writer: W) -> Result<()> {
    let password = match args.password {
        Some(password) => password,
        None => read_password()?,
    };
    if args.username.trim().is_empty() {
        bail!("Username cannot be empty");
    }
    let record = app
        .auth
        .register(&args.username, &args.email, &password)
        .await
        .map_err(|err| store_error(err.into()))?;
    app.session.save(record)?;
    writeln!(
        writer,
        "Registered and logged in as {}",
        signed_in_name(app, &args.email)
    )?;
    Ok(())
}

fn handle_logout<W: Write>(app: &App, mut writer: W) -> Result<()> {
    if app.session.clear()? {
        writeln!(writer, "Logged out")?;
    } else {
        writeln!(writer, "Not logged in")?;
    }
    Ok(())
}

fn signed_in_name(app: &App, fallback: &str) -> String {
    app.session
        .user()
        .map(|user| user.display_name().to_string())
        .unwrap_or_else(|| fallback.trim().to_string())
}

fn read_password() -> Result<String> {
    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("Password cannot be empty");
    }
    Ok(password)
}

/// Lead with the short user-facing line and keep the detailed cause underneath.
fn store_error(err: StoreError) -> anyhow::Error {
    let message = err.user_message();
    anyhow::Error::new(err).context(message)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DeleteOutcome {
    Deleted,
    Missing,
    Invalid,
    Failed(String),
}

struct DeleteSummary {
    deleted: usize,
    missing: Vec<String>,
    invalid: Vec<String>,
    failed: Vec<(String, String)>,
}

impl DeleteSummary {
    fn from_results(results: &[(String, DeleteOutcome)]) -> Self {
        let mut summary = Self {
            deleted: 0,
            missing: Vec::new(),
            invalid: Vec::new(),
            failed: Vec::new(),
        };
        for (id, outcome) in results {
            match outcome {
                DeleteOutcome::Deleted => summary.deleted += 1,
                DeleteOutcome::Missing => summary.missing.push(id.clone()),
                DeleteOutcome::Invalid => summary.invalid.push(id.clone()),
                DeleteOutcome::Failed(reason) => {
                    summary.failed.push((id.clone(), reason.clone()))
                }
            }
        }
        summary
    }

    fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writeln!(writer, "{}", SummaryLine::deleted(self.deleted))?;
        if !self.missing.is_empty() {
            writeln!(writer, "Not found: {}", self.missing.join(", "))?;
        }
        if !self.invalid.is_empty() {
            writeln!(writer, "Invalid id: {}", self.invalid.join(", "))?;
        }
        for (id, reason) in &self.failed {
            writeln!(writer, "Failed {id}: {reason}")?;
        }
        Ok(())
    }
}

enum SummaryLine {
    Deleted(usize),
    NoneDeleted,
}

impl SummaryLine {
    fn deleted(count: usize) -> Self {
        if count > 0 {
            SummaryLine::Deleted(count)
        } else {
            SummaryLine::NoneDeleted
        }
    }
}

impl fmt::Display for SummaryLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummaryLine::Deleted(count) => {
                write!(
                    f,
                    "Deleted {} task{}",
                    count,
                    if *count == 1 { "" } else { "s" }
                )
            }
            SummaryLine::NoneDeleted => write!(f, "No tasks deleted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::memory::MemoryGateway;
    use crate::model::{Priority, Task};
    use crate::session::{AccessToken, SessionProvider, SessionRecord};
    use crate::{GatewayError, GatewayOp};
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn open(id: i64, title: &str) -> Task {
        Task {
            id: TaskId(id),
            title: title.into(),
            description: None,
            completed: false,
            priority: None,
            created_at: None,
            completed_at: None,
            deadline_at: None,
        }
    }

    struct Harness {
        app: App,
        gateway: Arc<MemoryGateway>,
        session: Arc<FileSession>,
        _dir: TempDir,
    }

    fn harness(tasks: Vec<Task>, signed_in: bool) -> Harness {
        let dir = TempDir::new().expect("temp dir");
        let session =
            Arc::new(FileSession::load(dir.path().join("session.json")).expect("session"));
        if signed_in {
            session
                .save(SessionRecord {
                    access_token: AccessToken::new("memory-token"),
                    user: None,
                })
                .expect("save session");
        }
        let gateway = Arc::new(MemoryGateway::with_tasks(tasks));
        let app = App::new(gateway.clone(), gateway.clone(), session.clone());
        Harness {
            app,
            gateway,
            session,
            _dir: dir,
        }
    }

    async fn run(app: &App, args: &[&str]) -> Result<String> {
        let cli = Cli::try_parse_from(std::iter::once("taskdeck").chain(args.iter().copied()))?;
        let command = cli.command.ok_or_else(|| anyhow!("missing command"))?;
        let mut output = Vec::new();
        execute(app, command, &mut output).await?;
        Ok(String::from_utf8(output)?)
    }

    #[tokio::test]
    async fn add_then_list_shows_task() {
        let h = harness(vec![open(1, "Existing")], true);

        let added = run(&h.app, &["add", "Buy", "milk", "p:high"]).await.unwrap();
        assert_eq!(added, "Added #2: Buy milk\n");

        let listed = run(&h.app, &["list", "--ranked"]).await.unwrap();
        let lines: Vec<&str> = listed.lines().collect();
        assert_eq!(lines[0], "Inbox (2)");
        assert!(lines[1].contains("Buy milk"));
        assert!(lines[1].contains("high"));
        assert!(lines[2].contains("Existing"));
    }

    #[tokio::test]
    async fn empty_section_prints_its_description() {
        let h = harness(vec![open(1, "A")], true);
        let output = run(&h.app, &["list", "completed"]).await.unwrap();
        assert_eq!(
            output,
            format!("Completed (0)\n  {}\n", Section::Completed.description())
        );
    }

    #[tokio::test]
    async fn list_json_is_a_view_snapshot() {
        let h = harness(vec![open(1, "A")], true);
        let output = run(&h.app, &["list", "no-deadline", "--json"]).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["section"], "no-deadline");
        assert_eq!(value["tasks"][0]["title"], "A");
        assert_eq!(value["counts"]["noDeadline"], 1);
    }

    #[tokio::test]
    async fn counts_lists_every_section() {
        let mut done = open(2, "B");
        done.completed = true;
        let h = harness(vec![open(1, "A"), done], true);

        let output = run(&h.app, &["counts"]).await.unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), Section::ALL.len());
        assert!(lines[0].starts_with("Inbox") && lines[0].ends_with(" 1"));
        assert!(lines[5].starts_with("Completed") && lines[5].ends_with(" 1"));
    }

    #[tokio::test]
    async fn toggle_reports_new_state() {
        let h = harness(vec![open(3, "Call Ana")], true);

        let output = run(&h.app, &["toggle", "3"]).await.unwrap();
        assert_eq!(output, "Completed #3: Call Ana\n");
        assert!(h.gateway.tasks()[0].completed);

        let output = run(&h.app, &["toggle", "3"]).await.unwrap();
        assert_eq!(output, "Reopened #3: Call Ana\n");
    }

    #[tokio::test]
    async fn edit_updates_fields_and_clears_deadline() {
        let mut task = open(4, "Draft");
        task.deadline_at = Some(chrono::Utc::now());
        let h = harness(vec![task], true);

        let output = run(
            &h.app,
            &["edit", "4", "--title", "Final", "--priority", "low", "--clear-due"],
        )
        .await
        .unwrap();

        assert_eq!(output, "Updated #4: Final\n");
        let stored = &h.gateway.tasks()[0];
        assert_eq!(stored.title, "Final");
        assert_eq!(stored.priority, Some(Priority::Low));
        assert_eq!(stored.deadline_at, None);
    }

    #[tokio::test]
    async fn edit_without_changes_is_an_error() {
        let h = harness(vec![open(4, "Draft")], true);
        let err = run(&h.app, &["edit", "4"]).await.unwrap_err();
        assert!(err.to_string().starts_with("Nothing to change"));
        assert_eq!(h.gateway.calls(), 0);
    }

    #[tokio::test]
    async fn blank_add_is_ignored_quietly() {
        let h = harness(vec![open(1, "A")], true);

        assert_eq!(run(&h.app, &["add", "   "]).await.unwrap(), "Nothing to add\n");
        assert_eq!(
            run(&h.app, &["add", "due:tomorrow", "p:high"]).await.unwrap(),
            "Nothing to add\n"
        );
        assert_eq!(h.gateway.calls(), 0);
        assert_eq!(h.gateway.tasks().len(), 1);
    }

    #[tokio::test]
    async fn blank_title_edit_leaves_task_alone() {
        let h = harness(vec![open(1, "Keep me")], true);

        let output = run(&h.app, &["edit", "1", "--title", "  "]).await.unwrap();

        assert_eq!(output, "No changes made\n");
        assert_eq!(h.gateway.tasks()[0].title, "Keep me");
    }

    #[tokio::test]
    async fn delete_command_reports_deleted_and_missing() {
        let h = harness(vec![open(1, "A"), open(2, "B")], true);

        let output = run(&h.app, &["delete", "1", "99", "abc"]).await.unwrap();

        assert!(output.contains("Deleted 1 task"));
        assert!(output.contains("Not found: 99"));
        assert!(output.contains("Invalid id: abc"));
        assert_eq!(h.gateway.tasks(), vec![open(2, "B")]);
    }

    #[tokio::test]
    async fn delete_command_handles_no_matches_and_failures() {
        let h = harness(vec![open(1, "A")], true);
        h.gateway.fail_next(
            GatewayOp::Delete,
            GatewayError::server(GatewayOp::Delete, 500, "boom"),
        );

        let output = run(&h.app, &["delete", "1"]).await.unwrap();

        assert!(output.contains("No tasks deleted"));
        assert!(output.contains("Failed 1: Failed to delete task. Please try again."));
        assert_eq!(h.app.store().list().len(), 1);
    }

    #[tokio::test]
    async fn commands_need_a_session() {
        let h = harness(vec![open(1, "A")], false);

        let err = run(&h.app, &["list"]).await.unwrap_err();

        assert_eq!(err.to_string(), "Please log in to manage your tasks.");
        assert_eq!(h.gateway.calls(), 0);
    }

    #[tokio::test]
    async fn login_then_logout() {
        let h = harness(Vec::new(), false);

        let output = run(
            &h.app,
            &["login", "--email", "ana@example.com", "--password", "pw"],
        )
        .await
        .unwrap();
        assert_eq!(output, "Logged in as ana@example.com\n");
        assert_eq!(
            h.session.current_token(),
            Some(AccessToken::new("memory-token"))
        );
        assert!(h.session.path().exists());

        assert_eq!(run(&h.app, &["logout"]).await.unwrap(), "Logged out\n");
        assert_eq!(run(&h.app, &["logout"]).await.unwrap(), "Not logged in\n");
    }

    #[tokio::test]
    async fn register_signs_in_with_username() {
        let h = harness(Vec::new(), false);

        let output = run(
            &h.app,
            &[
                "register",
                "--username",
                "ana",
                "--email",
                "ana@example.com",
                "--password",
                "pw",
            ],
        )
        .await
        .unwrap();

        assert_eq!(output, "Registered and logged in as ana\n");
    }

    #[tokio::test]
    async fn show_prints_task_fields() {
        let mut task = open(7, "Plan trip");
        task.description = Some("Book flights".into());
        let h = harness(vec![task], true);

        let output = run(&h.app, &["show", "7"]).await.unwrap();

        assert!(output.starts_with("Title       Plan trip\n"));
        assert!(output.contains("Priority    no priority\n"));
        assert!(output.contains("Description Book flights\n"));
        assert!(run(&h.app, &["show", "8"]).await.is_err());
    }
}
