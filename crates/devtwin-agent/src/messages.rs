//! Message history discipline for the tool loop
//!
//! The first message always carries the system instructions, so trimming
//! keeps it plus the most recent turn and drops from the middle. Trimming
//! only ever happens between steps, after the transient plan/turns
//! injections are removed, so a tool result is never separated from the
//! assistant turn that announced it.

use devtwin_llm::{ChatMessage, ContentBlock, MessageContent};

/// First message collapses system + user into one user turn so every
/// provider sees the same conversation shape.
pub fn initialize_messages(
    system_prompt: &str,
    user_input: &str,
    initial_messages: Option<Vec<ChatMessage>>,
    extra_user_message: Option<&str>,
) -> Vec<ChatMessage> {
    if let Some(initial) = initial_messages.filter(|m| !m.is_empty()) {
        let mut messages = initial;
        if let Some(extra) = extra_user_message {
            messages.push(ChatMessage::user(extra));
        }
        return messages;
    }
    vec![ChatMessage::user(format!(
        "<system>\n{system_prompt}\n</system>\n{user_input}"
    ))]
}

/// Keep the first message and the last `keep_last_messages - 1`, then drop
/// oldest non-first messages until the total content length fits the
/// budget (always retaining at least two). -1 keeps all messages.
pub fn trim_messages(
    messages: Vec<ChatMessage>,
    keep_last_messages: i64,
    max_history_chars: usize,
) -> Vec<ChatMessage> {
    if messages.is_empty() {
        return messages;
    }
    let mut kept: Vec<ChatMessage> = if keep_last_messages == -1 {
        messages
    } else {
        let keep_tail = (keep_last_messages.max(1) as usize).saturating_sub(1);
        let mut kept = vec![messages[0].clone()];
        let tail = &messages[1..];
        let skip = tail.len().saturating_sub(keep_tail);
        kept.extend(tail[skip..].iter().cloned());
        kept
    };

    let mut total: usize = kept.iter().map(|m| m.content_len()).sum();
    while total > max_history_chars && kept.len() > 2 {
        let dropped = kept.remove(1);
        total -= dropped.content_len();
    }
    kept
}

pub fn clip_text(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let cut = limit.saturating_sub(20);
    let mut end = cut;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n...[truncated]", &text[..end])
}

fn is_transient(message: &ChatMessage) -> bool {
    if message.role != "user" {
        return false;
    }
    match &message.content {
        MessageContent::Text(text) => {
            let trimmed = text.trim_start();
            trimmed.starts_with("<plan>") || trimmed.starts_with("<turns>")
        }
        MessageContent::Blocks(_) => false,
    }
}

/// Remove the most recent injected `<plan>`/`<turns>` message, if any.
pub fn remove_last_transient(messages: &mut Vec<ChatMessage>) {
    if let Some(pos) = messages.iter().rposition(is_transient) {
        messages.remove(pos);
    }
}

/// Append a tool result, merging into a trailing user message that already
/// carries tool results — strict providers require all results for one
/// assistant turn in a single user message.
pub fn push_tool_result(
    messages: &mut Vec<ChatMessage>,
    tool_use_id: &str,
    content: &str,
    is_error: bool,
) {
    let block = ContentBlock::ToolResult {
        tool_use_id: tool_use_id.to_string(),
        content: content.to_string(),
        is_error: if is_error { Some(true) } else { None },
    };
    if let Some(last) = messages.last_mut() {
        if last.role == "user" && last.has_tool_result() {
            if let MessageContent::Blocks(blocks) = &mut last.content {
                blocks.push(block);
                return;
            }
        }
    }
    messages.push(ChatMessage {
        role: "user".into(),
        content: MessageContent::Blocks(vec![block]),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_message_collapses_system_and_input() {
        let messages = initialize_messages("be helpful", "fix the bug", None, None);
        assert_eq!(messages.len(), 1);
        let text = messages[0].text();
        assert!(text.starts_with("<system>\nbe helpful\n</system>\n"));
        assert!(text.ends_with("fix the bug"));
    }

    #[test]
    fn resume_appends_extra_user_message() {
        let prior = vec![ChatMessage::user("original"), ChatMessage::assistant("ok")];
        let messages = initialize_messages("ignored", "ignored", Some(prior), Some("continue"));
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].text(), "continue");
    }

    #[test]
    fn trim_keeps_first_and_tail() {
        let messages: Vec<ChatMessage> = (0..10)
            .map(|i| ChatMessage::user(format!("message {i}")))
            .collect();
        let trimmed = trim_messages(messages, 4, 1_000_000);
        assert_eq!(trimmed.len(), 4);
        assert_eq!(trimmed[0].text(), "message 0");
        assert_eq!(trimmed[3].text(), "message 9");
    }

    #[test]
    fn trim_enforces_char_budget() {
        let mut messages = vec![ChatMessage::user("first")];
        for i in 0..20 {
            messages.push(ChatMessage::user(format!("{i}-{}", "x".repeat(100))));
        }
        let trimmed = trim_messages(messages, -1, 500);
        let total: usize = trimmed.iter().map(|m| m.content_len()).sum();
        assert!(total <= 500 || trimmed.len() <= 2);
        assert_eq!(trimmed[0].text(), "first");
    }

    #[test]
    fn transient_removal_targets_injected_messages_only() {
        let mut messages = vec![
            ChatMessage::user("real input"),
            ChatMessage::user("<plan>\n{}\n</plan>"),
            ChatMessage::user("<turns>\nstep=1\n</turns>"),
            ChatMessage::assistant("reply"),
        ];
        remove_last_transient(&mut messages);
        remove_last_transient(&mut messages);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text(), "real input");
        assert_eq!(messages[1].text(), "reply");

        // No transient left: removal is a no-op
        remove_last_transient(&mut messages);
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn tool_results_merge_into_single_user_message() {
        let mut messages = vec![ChatMessage::assistant("calling tools")];
        push_tool_result(&mut messages, "c1", "result one", false);
        push_tool_result(&mut messages, "c2", "result two", true);
        assert_eq!(messages.len(), 2);
        match &messages[1].content {
            MessageContent::Blocks(blocks) => assert_eq!(blocks.len(), 2),
            other => panic!("expected blocks, got {other:?}"),
        }
    }
}
