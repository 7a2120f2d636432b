//! Chat commands, recognised by a leading `!`.
//!
//! `!help`, `!stats`, `!reset`, `!sticker` match the whole (trimmed) body;
//! `!ia` takes the rest of the message as the question.

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `!ia <text>`: one conversation turn with the AI.
    Ask(String),
    /// `!stats`: context usage for this conversation.
    Stats,
    /// `!reset`: clear this conversation's history.
    Reset,
    /// `!sticker`: send the attached image back as a sticker.
    Sticker,
    /// `!help`
    Help,
}

impl Command {
    /// Parse a message body. `None` for plain text, unknown commands and
    /// `!ia` without a question.
    pub fn parse(body: &str) -> Option<Self> {
        let trimmed = body.trim();
        let rest = trimmed.strip_prefix('!')?;

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        match name.to_ascii_lowercase().as_str() {
            "ia" if !arg.is_empty() => Some(Command::Ask(arg.to_string())),
            "stats" if arg.is_empty() => Some(Command::Stats),
            "reset" if arg.is_empty() => Some(Command::Reset),
            "sticker" if arg.is_empty() => Some(Command::Sticker),
            "help" if arg.is_empty() => Some(Command::Help),
            _ => None,
        }
    }
}

pub fn help_text(message_limit: u32) -> String {
    format!(
        "Guardian commands\n\
         - !ia <question>: ask the AI (history is kept for {message_limit} messages)\n\
         - !stats: show how much of the conversation history is used\n\
         - !reset: clear the conversation history\n\
         - !sticker: send with an image to get it back as a sticker\n\
         - !help: show this help"
    )
}
