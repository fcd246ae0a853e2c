//! Retrieval-augmented prompt assembly.
//!
//! Pure functions that turn retrieved matches and a conversation into the
//! message list sent to the chat model, plus the event type streamed back
//! to clients. The async orchestration (embedding, retrieval, generation,
//! persistence) lives in the `docchat` app crate and calls into here.
//!
//! # Prompt modes
//!
//! The assembled context decides the mode once, before generation starts:
//!
//! | Context | Mode | System prompt |
//! |---------|------|---------------|
//! | empty / whitespace | [`PromptMode::Fallback`] | answer from general knowledge |
//! | anything else | [`PromptMode::Grounded`] | answer from the embedded context |

use serde::Serialize;

use crate::index::IndexMatch;
use crate::models::ChatMessage;

/// Default number of trailing history messages forwarded to the model.
pub const DEFAULT_HISTORY_WINDOW: usize = 5;

/// Default number of chunks retrieved per question.
pub const DEFAULT_TOP_K: usize = 5;

const GROUNDED_PREAMBLE: &str =
    "You are a helpful AI assistant that answers questions based on the provided document context.";

const GROUNDED_INSTRUCTIONS: &str = "Instructions:
- Use the context above as your main reference.
- If the answer isn't clearly stated, infer the most likely explanation.
- If absolutely nothing relevant is present, politely say so.
- Be concise and clear.";

const FALLBACK_PROMPT: &str = "You are an expert research assistant.
The user's question could not be answered directly from the document.

Task:
- Provide a thoughtful, general answer based on academic and technical best practices.
- Mention that no relevant passage was found in the document.
- If relevant, suggest possible improvements, additions or analysis approaches.
- Be concise and professional.";

/// Which system prompt a chat request runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    /// Retrieval found text; the prompt embeds it verbatim.
    Grounded,
    /// Retrieval found nothing usable; answer from general knowledge.
    Fallback,
}

/// Concatenate match texts in received order, separated by a blank line.
///
/// Returns an empty string when there are no matches or every text is blank.
pub fn assemble_context(matches: &[IndexMatch]) -> String {
    let context = matches
        .iter()
        .map(|m| m.metadata.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    if context.trim().is_empty() {
        String::new()
    } else {
        context
    }
}

pub fn select_mode(context: &str) -> PromptMode {
    if context.trim().is_empty() {
        PromptMode::Fallback
    } else {
        PromptMode::Grounded
    }
}

/// Render the system prompt for `mode`. `context` is ignored in fallback mode.
pub fn system_prompt(mode: PromptMode, context: &str) -> String {
    match mode {
        PromptMode::Grounded => format!(
            "{}\n\nDocument Context:\n{}\n\n{}",
            GROUNDED_PREAMBLE, context, GROUNDED_INSTRUCTIONS
        ),
        PromptMode::Fallback => FALLBACK_PROMPT.to_string(),
    }
}

/// The fully assembled input for one generation call.
#[derive(Debug, Clone)]
pub struct PromptPlan {
    pub mode: PromptMode,
    pub context: String,
    pub messages: Vec<ChatMessage>,
}

/// Build the model input: system prompt, the last `history_window` history
/// messages (oldest first), then the new user message.
pub fn build_prompt(
    matches: &[IndexMatch],
    history: &[ChatMessage],
    user_message: &str,
    history_window: usize,
) -> PromptPlan {
    let context = assemble_context(matches);
    let mode = select_mode(&context);

    let recent = &history[history.len().saturating_sub(history_window)..];
    let mut messages = Vec::with_capacity(recent.len() + 2);
    messages.push(ChatMessage::system(system_prompt(mode, &context)));
    messages.extend(recent.iter().cloned());
    messages.push(ChatMessage::user(user_message));

    PromptPlan {
        mode,
        context,
        messages,
    }
}

/// The transcript persisted after a completed exchange: the full incoming
/// history, the new user message, and the full assistant response.
pub fn transcript(history: &[ChatMessage], user_message: &str, response: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::user(user_message));
    messages.push(ChatMessage::assistant(response));
    messages
}

/// An event on the chat response stream.
///
/// A stream carries any number of [`Content`](ChatEvent::Content) events
/// followed by exactly one terminal event, either
/// [`Done`](ChatEvent::Done) or [`Error`](ChatEvent::Error).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChatEvent {
    Content { content: String },
    Done { done: bool },
    Error { error: String },
}

impl ChatEvent {
    pub fn content(text: impl Into<String>) -> Self {
        ChatEvent::Content {
            content: text.into(),
        }
    }

    pub fn done() -> Self {
        ChatEvent::Done { done: true }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ChatEvent::Error {
            error: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ChunkMetadata;
    use crate::models::Role;

    fn hit(text: &str) -> IndexMatch {
        IndexMatch {
            id: "d#chunk_0".to_string(),
            score: 0.9,
            metadata: ChunkMetadata {
                document_id: "d".to_string(),
                user_id: "u".to_string(),
                chunk_number: 0,
                text: text.to_string(),
            },
        }
    }

    fn history(n: usize) -> Vec<ChatMessage> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    ChatMessage::user(format!("q{}", i))
                } else {
                    ChatMessage::assistant(format!("a{}", i))
                }
            })
            .collect()
    }

    #[test]
    fn test_no_matches_selects_fallback() {
        let plan = build_prompt(&[], &[], "What is this?", DEFAULT_HISTORY_WINDOW);
        assert_eq!(plan.mode, PromptMode::Fallback);
        assert_eq!(plan.context, "");
        assert_eq!(plan.messages[0].role, Role::System);
        assert_eq!(plan.messages[0].content, FALLBACK_PROMPT);
    }

    #[test]
    fn test_blank_matches_select_fallback() {
        let plan = build_prompt(&[hit("  "), hit("\n")], &[], "q", DEFAULT_HISTORY_WINDOW);
        assert_eq!(plan.mode, PromptMode::Fallback);
        assert_eq!(plan.context, "");
    }

    #[test]
    fn test_matches_select_grounded_with_joined_context() {
        let matches = [hit("first passage"), hit("second passage"), hit("third")];
        let plan = build_prompt(&matches, &[], "q", DEFAULT_HISTORY_WINDOW);
        assert_eq!(plan.mode, PromptMode::Grounded);
        assert_eq!(plan.context, "first passage\n\nsecond passage\n\nthird");
        assert!(plan.messages[0]
            .content
            .contains("Document Context:\nfirst passage\n\nsecond passage\n\nthird"));
    }

    #[test]
    fn test_message_order_and_history_window() {
        let hist = history(8);
        let plan = build_prompt(&[hit("ctx")], &hist, "new question", 5);
        assert_eq!(plan.messages.len(), 7);
        assert_eq!(plan.messages[0].role, Role::System);
        assert_eq!(&plan.messages[1..6], &hist[3..8]);
        assert_eq!(plan.messages[6], ChatMessage::user("new question"));
    }

    #[test]
    fn test_short_history_forwarded_whole() {
        let hist = history(2);
        let plan = build_prompt(&[], &hist, "q", 5);
        assert_eq!(plan.messages.len(), 4);
        assert_eq!(&plan.messages[1..3], &hist[..]);
    }

    #[test]
    fn test_transcript_keeps_full_history() {
        let hist = history(7);
        let t = transcript(&hist, "q", "answer");
        assert_eq!(t.len(), 9);
        assert_eq!(&t[..7], &hist[..]);
        assert_eq!(t[7], ChatMessage::user("q"));
        assert_eq!(t[8], ChatMessage::assistant("answer"));
    }

    #[test]
    fn test_event_wire_shape() {
        let json = |e: &ChatEvent| serde_json::to_string(e).unwrap();
        assert_eq!(json(&ChatEvent::content("hi")), r#"{"content":"hi"}"#);
        assert_eq!(json(&ChatEvent::done()), r#"{"done":true}"#);
        assert_eq!(json(&ChatEvent::error("boom")), r#"{"error":"boom"}"#);
    }
}
