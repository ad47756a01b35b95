//! Free-form conversation about the rule base over a [`CompletionBackend`].
//!
//! The backend sees a fixed system preamble, a one-line summary of the
//! catalog, the earlier turns and the new message. Follow-up suggestions are
//! picked from the wording of the message, not from the model.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProviderError;
use crate::reasoning::CompletionBackend;
use crate::rule::JsonMap;

/// Preamble sent ahead of every conversation.
pub const SYSTEM_PROMPT: &str = "You are a business rules expert assistant. You help users \
understand and work with business rules across domains such as finance, inventory, compliance \
and customer service. Explain how specific rules work, help identify which rules apply to a \
business scenario, give guidance on rule implementation and answer questions about rule \
priorities and conflicts. Be accurate and give specific examples when possible.";

const SUGGESTIONS: &[(&[&str], &str)] = &[
    (&["scenario", "analyze", "analyse", "check"], "Analyze a business scenario"),
    (&["rule", "rules", "list", "show"], "View available business rules"),
    (&["execute", "run", "apply"], "Execute business rules"),
];

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `user` or `assistant`.
    pub role: String,
    /// Text of the turn.
    pub content: String,
}

impl ChatMessage {
    /// A user turn.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// An assistant turn.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Answer to a chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    /// The backend's answer, trimmed.
    pub message: String,
    /// Context the caller attached, echoed back.
    pub context: Option<JsonMap>,
    /// Follow-ups suggested by the message wording.
    pub suggested_actions: Vec<String>,
}

/// Follow-ups for `message`, in a fixed order, without duplicates.
#[must_use]
pub fn suggested_actions(message: &str) -> Vec<String> {
    let lower = message.to_lowercase();
    let words: BTreeSet<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    SUGGESTIONS
        .iter()
        .filter(|(triggers, _)| triggers.iter().any(|t| words.contains(t)))
        .map(|(_, action)| (*action).to_string())
        .collect()
}

/// Lays out the prompt for one exchange.
#[must_use]
pub fn render_prompt(
    catalog_summary: &str,
    history: &[ChatMessage],
    message: &str,
    context: Option<&JsonMap>,
) -> String {
    let mut prompt = format!("{SYSTEM_PROMPT}\n\n{catalog_summary}\n");
    for turn in history {
        prompt.push_str(&format!("\n{}: {}", turn.role, turn.content));
    }
    prompt.push_str(&format!("\nuser: {message}"));
    if let Some(context) = context.filter(|c| !c.is_empty()) {
        let json = serde_json::to_string(context).unwrap_or_else(|_| "{}".to_string());
        prompt.push_str(&format!("\nContext: {json}"));
    }
    prompt.push_str("\nassistant:");
    prompt
}

/// Sends one message and returns the answer with suggestions.
///
/// # Errors
///
/// Returns the backend's error, or `ProviderError::MalformedResponse` for an empty
/// answer.
pub fn chat<B: CompletionBackend + ?Sized>(
    backend: &B,
    catalog_summary: &str,
    message: &str,
    context: Option<JsonMap>,
    history: &[ChatMessage],
) -> Result<ChatReply, ProviderError> {
    let prompt = render_prompt(catalog_summary, history, message, context.as_ref());
    let answer = backend.complete(&prompt)?;
    let answer = answer.trim();
    if answer.is_empty() {
        return Err(ProviderError::malformed(backend.name(), "empty chat answer"));
    }
    debug!(backend = backend.name(), turns = history.len() + 1, "chat answered");

    Ok(ChatReply {
        message: answer.to_string(),
        context,
        suggested_actions: suggested_actions(message),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use serde_json::json;

    struct Echo {
        prompts: Mutex<Vec<String>>,
        answer: &'static str,
    }

    impl CompletionBackend for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.answer.to_string())
        }
    }

    fn echo(answer: &'static str) -> Echo {
        Echo {
            prompts: Mutex::new(Vec::new()),
            answer,
        }
    }

    #[test]
    fn test_suggestions_follow_wording() {
        assert_eq!(
            suggested_actions("Can you show me the loan rules and run them?"),
            vec!["View available business rules", "Execute business rules"]
        );
        assert_eq!(suggested_actions("Please ANALYZE this scenario"), vec!["Analyze a business scenario"]);
        assert!(suggested_actions("brunch plans").is_empty());
    }

    #[test]
    fn test_prompt_keeps_turn_order() {
        let history = vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")];
        let context = json!({"credit_score": 680}).as_object().cloned().unwrap();
        let prompt = render_prompt("18 rules", &history, "which rule applies?", Some(&context));
        assert!(prompt.starts_with(SYSTEM_PROMPT));
        let hi = prompt.find("user: hi").unwrap();
        let hello = prompt.find("assistant: hello").unwrap();
        let question = prompt.find("user: which rule applies?").unwrap();
        assert!(hi < hello && hello < question);
        assert!(prompt.contains(r#"Context: {"credit_score":680}"#));
        assert!(prompt.ends_with("assistant:"));
    }

    #[test]
    fn test_chat_returns_trimmed_answer() {
        let backend = echo("  LOAN_001 covers fair credit.  \n");
        let context = json!({"credit_score": 680}).as_object().cloned().unwrap();
        let reply = chat(&backend, "summary", "check my loan", Some(context.clone()), &[]).unwrap();
        assert_eq!(reply.message, "LOAN_001 covers fair credit.");
        assert_eq!(reply.context, Some(context));
        assert_eq!(reply.suggested_actions, vec!["Analyze a business scenario"]);
        assert_eq!(backend.prompts.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_answer_is_malformed() {
        let err = chat(&echo("   "), "summary", "hello", None, &[]).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse { .. }));
    }
}
