use std::fmt;

/// Raw input for creating a task, before date and priority specs are resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskInput {
    /// Title words. May carry inline `due:` and `p:` tokens.
    pub text: Vec<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub due: Option<String>,
}

impl TaskInput {
    pub fn from_text(text: &str) -> Self {
        Self {
            text: text.split_whitespace().map(str::to_string).collect(),
            ..Self::default()
        }
    }

    pub fn require_text(&self) -> Result<(), CaptureError> {
        if self.text.iter().all(|word| word.trim().is_empty()) {
            return Err(CaptureError::EmptyText);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    EmptyText,
    EmptyTitle,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::EmptyText => write!(f, "Task text cannot be empty"),
            CaptureError::EmptyTitle => {
                write!(f, "Task title cannot be empty after parsing tokens")
            }
        }
    }
}

impl std::error::Error for CaptureError {}
