//! Append-only conversation history rendered back into prompts.
//!
//! Rendering works under a token-estimate budget (~4 chars per token): turns
//! are taken newest-first until the budget runs out, the first turn is
//! always kept (it anchors the task), and elided spans are marked so the
//! model knows history was dropped.

use serde::Serialize;

/// One request/response round, including every action execution it produced.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub agent_id: String,
    pub turn_index: usize,
    pub raw_response: String,
    /// Compact per-action descriptions (see `Action::describe`).
    pub actions: Vec<String>,
    /// Environment responses in execution order, already tag-wrapped.
    pub env_responses: Vec<String>,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

/// Cap on the agent-text portion of a rendered turn.
const AGENT_TEXT_RENDER_LIMIT: usize = 500;

impl Turn {
    fn to_prompt(&self) -> String {
        let mut parts = Vec::with_capacity(1 + self.env_responses.len());
        if self.raw_response.chars().count() > AGENT_TEXT_RENDER_LIMIT {
            let cut: String = self.raw_response.chars().take(AGENT_TEXT_RENDER_LIMIT).collect();
            parts.push(format!("Agent: {cut}..."));
        } else {
            parts.push(format!("Agent: {}", self.raw_response));
        }
        for response in &self.env_responses {
            parts.push(format!("Env: {response}"));
        }
        parts.join("\n")
    }
}

pub struct ConversationHistory {
    turns: Vec<Turn>,
    token_budget: usize,
}

impl ConversationHistory {
    pub fn new(token_budget: usize) -> Self {
        Self {
            turns: Vec::new(),
            token_budget,
        }
    }

    pub fn add_turn(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Render for the next prompt, trimming oldest-first under the token
    /// budget but always keeping the first turn.
    pub fn to_prompt(&self) -> String {
        if self.turns.is_empty() {
            return "No previous interactions.".to_string();
        }

        let rendered: Vec<String> = self.turns.iter().map(Turn::to_prompt).collect();
        let estimate = |s: &str| s.len() / 4;

        // Walk newest-first deciding which turns fit; index 0 is pinned.
        let mut budget = self.token_budget.saturating_sub(estimate(&rendered[0]));
        let mut included = vec![0usize];
        for idx in (1..rendered.len()).rev() {
            let cost = estimate(&rendered[idx]);
            if cost > budget {
                break;
            }
            budget -= cost;
            included.push(idx);
        }
        included.sort_unstable();

        let mut sections = Vec::with_capacity(included.len() + 1);
        let mut previous: Option<usize> = None;
        for idx in included {
            if let Some(prev) = previous {
                let gap = idx - prev - 1;
                if gap > 0 {
                    sections.push(format!("[... {gap} earlier turn(s) elided ...]"));
                }
            }
            sections.push(format!("--- Turn {} ---\n{}", idx + 1, rendered[idx]));
            previous = Some(idx);
        }
        sections.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(index: usize, response: &str, env: &str) -> Turn {
        Turn {
            agent_id: "orchestrator".to_string(),
            turn_index: index,
            raw_response: response.to_string(),
            actions: vec![],
            env_responses: vec![env.to_string()],
            tokens_in: 0,
            tokens_out: 0,
        }
    }

    #[test]
    fn renders_all_turns_within_budget() {
        let mut history = ConversationHistory::new(10_000);
        history.add_turn(turn(1, "first response", "ok"));
        history.add_turn(turn(2, "second response", "ok"));
        let prompt = history.to_prompt();
        assert!(prompt.contains("--- Turn 1 ---"));
        assert!(prompt.contains("--- Turn 2 ---"));
        assert!(!prompt.contains("elided"));
    }

    #[test]
    fn trims_middle_turns_and_keeps_the_first() {
        let mut history = ConversationHistory::new(200);
        history.add_turn(turn(1, "task anchor", "ok"));
        for i in 2..=10 {
            history.add_turn(turn(i, &format!("response {i} {}", "x".repeat(100)), "ok"));
        }
        let prompt = history.to_prompt();
        assert!(prompt.contains("--- Turn 1 ---"));
        assert!(prompt.contains("--- Turn 10 ---"));
        assert!(prompt.contains("elided"));
        assert!(!prompt.contains("--- Turn 3 ---"));
    }

    #[test]
    fn long_agent_text_is_cut_in_render() {
        let mut history = ConversationHistory::new(100_000);
        history.add_turn(turn(1, &"y".repeat(900), "ok"));
        let prompt = history.to_prompt();
        assert!(prompt.contains(&format!("{}...", "y".repeat(500))));
        assert!(!prompt.contains(&"y".repeat(501)));
    }

    #[test]
    fn empty_history_has_placeholder() {
        let history = ConversationHistory::new(1000);
        assert_eq!(history.to_prompt(), "No previous interactions.");
    }
}
