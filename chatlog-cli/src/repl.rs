//! Line commands understood by the interactive chat

/// What a line typed at the chat prompt asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Exit,
    /// Empty the session history
    Clear,
    /// Flip streaming on or off
    ToggleStream,
    /// Nothing typed
    Empty,
    /// Anything else goes to the model as-is
    Say(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        match trimmed.to_lowercase().as_str() {
            "exit" | "quit" => Self::Exit,
            "clear" => Self::Clear,
            "stream" => Self::ToggleStream,
            _ => Self::Say(trimmed.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_ignore_case_and_padding() {
        assert_eq!(ReplCommand::parse("EXIT"), ReplCommand::Exit);
        assert_eq!(ReplCommand::parse("  clear \n"), ReplCommand::Clear);
        assert_eq!(ReplCommand::parse("Stream"), ReplCommand::ToggleStream);
        assert_eq!(ReplCommand::parse("   "), ReplCommand::Empty);
    }

    #[test]
    fn test_other_lines_are_sent() {
        assert_eq!(
            ReplCommand::parse("clear the table please"),
            ReplCommand::Say("clear the table please".to_string())
        );
        assert_eq!(
            ReplCommand::parse(" What is 81 divided by 9? "),
            ReplCommand::Say("What is 81 divided by 9?".to_string())
        );
    }
}
