use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::capture::TaskInput;
use crate::model::TaskId;
use crate::views::Section;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "taskdeck",
    version,
    about = "Manage your to-do list from the terminal.",
    after_help = "Examples:\n  taskdeck login --email ana@example.com\n  taskdeck add Buy milk due:tomorrow p:high\n  taskdeck list today --ranked\n  taskdeck toggle 12\n  taskdeck delete 12 13"
)]
pub struct Cli {
    /// Override the data directory (defaults to platform-specific app dir)
    #[arg(long, value_name = "PATH", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Base URL of the task server (defaults to http://localhost:4000)
    #[arg(long, value_name = "URL", global = true)]
    pub api_url: Option<String>,

    /// Tracing filter for diagnostics on stderr (e.g. "info", "taskdeck_core=debug")
    #[arg(long = "log", value_name = "DIRECTIVE", global = true)]
    pub log_filter: Option<String>,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// Show the tasks in one section (default: inbox)
    List(ListArgs),
    /// Show how many tasks each section holds
    Counts(CountsArgs),
    /// Show every field of one task
    Show(ShowArgs),
    /// Add a task
    Add(AddArgs),
    /// Mark a task done, or open again
    Toggle(ToggleArgs),
    /// Change fields of a task
    Edit(EditArgs),
    /// Delete one or more tasks by id
    Delete(DeleteArgs),
    /// Sign in and remember the session
    Login(LoginArgs),
    /// Create an account and sign in with it
    Register(RegisterArgs),
    /// Forget the stored session
    Logout,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    #[arg(
        value_enum,
        value_name = "SECTION",
        default_value_t = Section::Inbox,
        ignore_case = true
    )]
    pub section: Section,

    /// Sort by completion, priority, deadline, then newest
    #[arg(long)]
    pub ranked: bool,

    /// Print the view as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct CountsArgs {
    /// Print the counts as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    /// Task title with optional inline tokens (due:, p:)
    #[arg(value_name = "TEXT", required = true)]
    pub text: Vec<String>,

    /// Optional longer description
    #[arg(long)]
    pub description: Option<String>,

    /// Priority (low, medium, high, none); overrides an inline p: token
    #[arg(long, value_name = "LEVEL")]
    pub priority: Option<String>,

    /// Deadline (2026-12-24, today, tomorrow, +3d, mon, 17:00); overrides an inline due: token
    #[arg(long = "due", value_name = "DATE")]
    pub due_at: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    #[arg(value_name = "ID")]
    pub id: TaskId,
}

#[derive(Args, Debug, Clone)]
pub struct ToggleArgs {
    #[arg(value_name = "ID")]
    pub id: TaskId,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    #[arg(value_name = "ID")]
    pub id: TaskId,

    #[arg(long)]
    pub title: Option<String>,

    /// New description; an empty string removes it
    #[arg(long)]
    pub description: Option<String>,

    /// Priority (low, medium, high, none)
    #[arg(long, value_name = "LEVEL")]
    pub priority: Option<String>,

    /// New deadline
    #[arg(long = "due", value_name = "DATE", conflicts_with = "clear_due")]
    pub due_at: Option<String>,

    /// Remove the deadline
    #[arg(long = "clear-due", action = ArgAction::SetTrue)]
    pub clear_due: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    /// One or more task ids to delete
    #[arg(value_name = "ID", required = true)]
    pub ids: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct LoginArgs {
    #[arg(long)]
    pub email: String,

    /// Read from stdin when omitted
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct RegisterArgs {
    #[arg(long)]
    pub username: String,

    #[arg(long)]
    pub email: String,

    /// Read from stdin when omitted
    #[arg(long)]
    pub password: Option<String>,
}

impl From<AddArgs> for TaskInput {
    fn from(args: AddArgs) -> Self {
        TaskInput {
            text: args.text,
            description: args.description,
            priority: args.priority,
            due: args.due_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("inbox", Section::Inbox)]
    #[case("today", Section::Today)]
    #[case("overdue", Section::Overdue)]
    #[case("no-deadline", Section::NoDeadline)]
    #[case("nodeadline", Section::NoDeadline)]
    #[case("completed", Section::Completed)]
    #[case("done", Section::Completed)]
    fn parses_list_with_section(#[case] raw: &str, #[case] expected: Section) {
        let cli = Cli::try_parse_from(["taskdeck", "list", raw, "--ranked"]).unwrap();
        match cli.command {
            Some(CliCommand::List(args)) => {
                assert_eq!(args.section, expected);
                assert!(args.ranked);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn list_defaults_to_inbox() {
        let cli = Cli::try_parse_from(["taskdeck", "--api-url", "http://x", "list"]).unwrap();
        assert_eq!(cli.api_url.as_deref(), Some("http://x"));
        assert!(matches!(
            cli.command,
            Some(CliCommand::List(ListArgs {
                section: Section::Inbox,
                ..
            }))
        ));
    }

    #[test]
    fn add_collects_text_and_flags() {
        let cli = Cli::try_parse_from([
            "taskdeck", "add", "Buy", "milk", "--priority", "high", "--due", "tomorrow",
        ])
        .unwrap();
        let Some(CliCommand::Add(args)) = cli.command else {
            panic!("expected add");
        };
        let input = TaskInput::from(args);
        assert_eq!(input.text, vec!["Buy", "milk"]);
        assert_eq!(input.priority.as_deref(), Some("high"));
        assert_eq!(input.due.as_deref(), Some("tomorrow"));
    }

    #[test]
    fn edit_rejects_due_with_clear_due() {
        let result =
            Cli::try_parse_from(["taskdeck", "edit", "3", "--due", "today", "--clear-due"]);
        assert!(result.is_err());
    }

    #[test]
    fn toggle_accepts_hash_prefixed_id() {
        let cli = Cli::try_parse_from(["taskdeck", "toggle", "#12"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(CliCommand::Toggle(ToggleArgs { id: TaskId(12) }))
        ));
    }
}
