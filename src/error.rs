/// Errors related to configuration loading and merging.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

/// Errors related to sandbox command execution.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("Failed to spawn sandbox process: {0}")]
    SpawnFailed(String),

    #[error("Failed to capture sandbox output: {0}")]
    OutputCapture(String),
}

/// Errors returned by the LLM gateway client.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Network error talking to LLM gateway: {0}")]
    Network(String),

    #[error("LLM gateway returned HTTP {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Malformed LLM response: {0}")]
    InvalidResponse(String),

    #[error("LLM call failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

impl LlmError {
    /// Transient errors are retried with backoff; everything else surfaces
    /// to the runtime as a turn failure.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Network(_) => true,
            LlmError::Server { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            _ => false,
        }
    }
}

/// Errors raised by the orchestrator hub's registries.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("Task {0} not found")]
    UnknownTask(String),

    #[error("Task {task_id} is {status}; launch requires a pending task")]
    TaskNotPending { task_id: String, status: String },

    #[error("Context '{0}' already exists in the store; use a versioned id (e.g. {0}_v2)")]
    DuplicateContext(String),

    #[error("Unknown context refs: {}", .0.join(", "))]
    MissingContextRefs(Vec<String>),

    #[error("Task title must be at most {max} words, got {got}: '{title}'")]
    TitleTooLong { title: String, got: usize, max: usize },
}
