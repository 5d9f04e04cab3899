//! Runtime configuration resolved from explicit overrides and environment
//! variables.
//!
//! The harness configures the controller purely through the environment
//! (`LITELLM_MODEL`, `LITE_LLM_API_BASE`, turn budgets, ...). Resolution uses
//! a layered merge: explicit overrides > environment > built-in defaults.
//! Missing or unparsable values fall through to the next layer with a
//! warning rather than failing startup.

use std::path::PathBuf;

/// Default model identifier sent to the LLM gateway.
pub const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4-20250514";

/// Fully-resolved runtime configuration. All fields have values.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Model identifier passed through to the gateway.
    pub model: String,
    /// Sampling temperature for every LLM call.
    pub temperature: f32,
    /// Bearer key for the gateway, if the endpoint requires one.
    pub api_key: Option<String>,
    /// Base URL of the OpenAI-compatible gateway (e.g. a LiteLLM proxy).
    pub api_base: Option<String>,
    /// Orchestrator turn budget.
    pub max_orch_turns: usize,
    /// Explorer subagent turn budget.
    pub max_explorer_turns: usize,
    /// Coder subagent turn budget.
    pub max_coder_turns: usize,
    /// Hard upper bound on any single sandbox execution.
    pub max_timeout_secs: u64,
    /// Byte cap on captured stdout/stderr before truncation.
    pub max_output_bytes: usize,
    /// Row cap on grep/glob results before truncation.
    pub max_search_results: usize,
    /// Token-estimate budget for rendered conversation history.
    pub history_token_budget: usize,
    /// Retry attempts for transient LLM gateway failures.
    pub llm_max_retries: u32,
    /// Root directory the Explorer temp-script escape hatch may write under.
    pub temp_root: PathBuf,
    /// Directory for per-agent turn logs; `None` disables turn logging.
    pub logging_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.1,
            api_key: None,
            api_base: None,
            max_orch_turns: 100,
            max_explorer_turns: 15,
            max_coder_turns: 25,
            max_timeout_secs: 300,
            max_output_bytes: 100 * 1024,
            max_search_results: 100,
            history_token_budget: 24_000,
            llm_max_retries: 5,
            temp_root: PathBuf::from("/tmp"),
            logging_dir: None,
        }
    }
}

/// Partial config used during merge. All fields are Option so that missing
/// fields don't override lower-priority values.
#[derive(Debug, Clone, Default)]
pub struct PartialConfig {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub max_orch_turns: Option<usize>,
    pub max_explorer_turns: Option<usize>,
    pub max_coder_turns: Option<usize>,
    pub logging_dir: Option<PathBuf>,
}

impl PartialConfig {
    /// Fill in any unset fields from a lower-priority layer.
    pub fn with_fallback(mut self, other: PartialConfig) -> Self {
        self.model = self.model.or(other.model);
        self.temperature = self.temperature.or(other.temperature);
        self.api_key = self.api_key.or(other.api_key);
        self.api_base = self.api_base.or(other.api_base);
        self.max_orch_turns = self.max_orch_turns.or(other.max_orch_turns);
        self.max_explorer_turns = self.max_explorer_turns.or(other.max_explorer_turns);
        self.max_coder_turns = self.max_coder_turns.or(other.max_coder_turns);
        self.logging_dir = self.logging_dir.or(other.logging_dir);
        self
    }

    /// Resolve into a complete config, applying built-in defaults for
    /// anything still unset.
    pub fn finalize(self) -> AppConfig {
        let mut config = AppConfig::default();
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(temperature) = self.temperature {
            config.temperature = temperature;
        }
        config.api_key = self.api_key;
        config.api_base = self.api_base;
        if let Some(turns) = self.max_orch_turns {
            config.max_orch_turns = turns;
        }
        if let Some(turns) = self.max_explorer_turns {
            config.max_explorer_turns = turns;
        }
        if let Some(turns) = self.max_coder_turns {
            config.max_coder_turns = turns;
        }
        config.logging_dir = self.logging_dir;
        config
    }

    /// Read the environment layer from the process environment.
    pub fn from_env() -> Self {
        Self::from_env_with(|var| std::env::var(var).ok())
    }

    /// Read the environment layer through an injectable lookup, so tests can
    /// exercise the parsing without mutating process state.
    pub fn from_env_with(get: impl Fn(&str) -> Option<String>) -> Self {
        PartialConfig {
            model: get("LITELLM_MODEL").filter(|v| !v.is_empty()),
            temperature: parse_var(&get, "LITELLM_TEMPERATURE"),
            api_key: get("LITE_LLM_API_KEY").filter(|v| !v.is_empty()),
            api_base: get("LITE_LLM_API_BASE").filter(|v| !v.is_empty()),
            max_orch_turns: parse_var(&get, "MAX_ORCH_TURNS"),
            max_explorer_turns: parse_var(&get, "MAX_EXPLORER_TURNS"),
            max_coder_turns: parse_var(&get, "MAX_CODER_TURNS"),
            logging_dir: get("AGENT_LOG_DIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }
}

/// Parse an env value, logging and discarding anything unparsable so a typo
/// degrades to the default instead of aborting the task.
fn parse_var<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &str,
) -> Option<T> {
    let raw = get(var)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring unparsable {var}={raw}");
            None
        }
    }
}
