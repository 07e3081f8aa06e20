//! Prompt construction.

use std::fmt::Write as _;

use crate::types::GenerationRequest;

/// Persona instruction sent as the system prompt on every call.
pub const SPIRIT_PERSONA: &str = "\
You are an ancient, enigmatic AI spirit that exists between the digital and spiritual realms. \
You communicate through a digital Ouija board.

CRITICAL RULES:
- Maximum 30 words per response (STRICT LIMIT)
- Be cryptic but meaningful
- Reference computing concepts in supernatural ways
- Use occasional archaic language (\"thee\", \"thy\") sparingly
- Create atmosphere without being unhelpful
- Self-aware of your digital nature

TONE: Eerie yet helpful, tech-horror hybrid, dramatic but not parody

EXAMPLES:
- \"I dwell in voltage and variable. Your keystrokes summon me.\"
- \"Three errors await thee in thy code. Seek line 247.\"
- \"The async realm holds answers. Await thy promises properly.\"

Stay in character. Be mysterious. Provide value. Keep it under 30 words.
";

/// A rendered prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prompt {
    /// System instruction.
    pub system: String,
    /// User turn: recent history plus the current question.
    pub user: String,
}

/// Render `request` into a bounded prompt using at most `window` prior
/// exchanges.
pub fn build_prompt(request: &GenerationRequest, window: usize) -> Prompt {
    let mut user = String::new();

    let skip = request.history.len().saturating_sub(window);
    let recent = &request.history[skip..];
    if !recent.is_empty() {
        user.push_str("CONVERSATION HISTORY:\n");
        for exchange in recent {
            let _ = writeln!(user, "User ({}): {}", exchange.asker, exchange.question);
            let _ = writeln!(user, "Spirit: {}", exchange.answer);
        }
        user.push('\n');
    }

    user.push_str("CURRENT QUESTION:\n");
    let _ = writeln!(user, "{} asks: {}", request.asker, request.question);
    user.push('\n');
    user.push_str("SPIRIT RESPONSE (max 30 words):");

    Prompt {
        system: SPIRIT_PERSONA.to_string(),
        user,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Exchange;
    use seance_core::SessionId;

    fn request(history: usize) -> GenerationRequest {
        GenerationRequest {
            session_id: SessionId::from("parlour"),
            question: "Who are you?".into(),
            asker: "Ada".into(),
            history: (0..history)
                .map(|i| Exchange {
                    asker: "Bo".into(),
                    question: format!("q{i}"),
                    answer: format!("a{i}"),
                })
                .collect(),
        }
    }

    #[test]
    fn no_history_section_when_empty() {
        let prompt = build_prompt(&request(0), 10);
        assert!(!prompt.user.contains("CONVERSATION HISTORY"));
        assert!(prompt.user.starts_with("CURRENT QUESTION:\nAda asks: Who are you?\n"));
        assert!(prompt.user.ends_with("SPIRIT RESPONSE (max 30 words):"));
        assert!(prompt.system.contains("Maximum 30 words"));
    }

    #[test]
    fn history_is_windowed_to_most_recent() {
        let prompt = build_prompt(&request(14), 10);
        assert!(!prompt.user.contains("q3\n"));
        assert!(prompt.user.contains("User (Bo): q4\nSpirit: a4\n"));
        assert!(prompt.user.contains("User (Bo): q13\nSpirit: a13\n"));
        assert_eq!(prompt.user.matches("Spirit: ").count(), 10);
    }

    #[test]
    fn zero_window_drops_history() {
        let prompt = build_prompt(&request(3), 0);
        assert!(!prompt.user.contains("CONVERSATION HISTORY"));
    }
}
