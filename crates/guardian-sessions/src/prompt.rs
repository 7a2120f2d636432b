//! Linear prompt rendering for completion-style backends.

use crate::types::{ConversationContext, Turn};

/// Render the context history as `"<Label>: <content>\n"` lines, in order.
pub fn render(context: &ConversationContext) -> String {
    render_turns(context.history())
}

fn render_turns(turns: &[Turn]) -> String {
    let capacity = turns.iter().map(|t| t.content.len() + 12).sum();
    let mut prompt = String::with_capacity(capacity);
    for turn in turns {
        prompt.push_str(turn.role.label());
        prompt.push_str(": ");
        prompt.push_str(&turn.content);
        prompt.push('\n');
    }
    prompt
}
