//! Action surface: typed actions, the two-phase parser, per-agent state,
//! the sandbox-backed file/search managers, and the dispatcher that routes
//! actions to handlers.

pub mod dispatcher;
pub mod file_manager;
pub mod parser;
pub mod search_manager;
pub mod state;
pub mod types;

pub use dispatcher::{Capabilities, Dispatcher, Scope};
pub use types::Action;

use serde::Serialize;

/// Failure classification carried on [`ExecutionResult`]. Every kind is
/// information to the emitting agent, never a runtime abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ParseError,
    ValidationError,
    CapabilityViolation,
    InvalidPath,
    NotFound,
    NotAFile,
    PermissionDenied,
    MissingParent,
    AmbiguousEdit,
    UnknownTodo,
    Timeout,
    NonZeroExit,
    ExecFailed,
    LlmFailure,
}

/// Typed operation failure produced by the managers, converted into an
/// [`ExecutionResult`] by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct OpError {
    pub kind: ErrorKind,
    pub message: String,
}

impl OpError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Uniform outcome of dispatching one action.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub ok: bool,
    pub payload: String,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
}

impl ExecutionResult {
    pub fn success(payload: impl Into<String>) -> Self {
        Self {
            ok: true,
            payload: payload.into(),
            error_kind: None,
            error_message: None,
        }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            ok: false,
            payload: format!("[ERROR] {message}"),
            error_kind: Some(kind),
            error_message: Some(message),
        }
    }

    /// Partial success: the handler produced output but flags an error state
    /// the agent should see (e.g. non-zero exit from bash).
    pub fn observed(kind: ErrorKind, payload: impl Into<String>) -> Self {
        Self {
            ok: false,
            payload: payload.into(),
            error_kind: Some(kind),
            error_message: None,
        }
    }
}

impl From<OpError> for ExecutionResult {
    fn from(err: OpError) -> Self {
        ExecutionResult::failure(err.kind, err.message)
    }
}

/// Wrap an environment response in its output tag for the next prompt.
pub fn format_tool_output(tool: &str, content: &str) -> String {
    format!("<{tool}_output>\n{content}\n</{tool}_output>")
}
