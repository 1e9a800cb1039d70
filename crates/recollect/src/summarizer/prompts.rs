//! Prompts for archive summarization
//!
//! The template is configurable; these are the placeholders it may use.

use crate::summarizer::types::SummaryRequest;

/// Default prompt for rewriting an archived batch as a single memory
///
/// Placeholders:
/// - {agent} - id of the agent whose memories these are
/// - {kind} - event kind shared by the batch
/// - {tier} - tier the summary will live in
/// - {entries} - the archived entries, one per line, oldest first
pub const ARCHIVE_SUMMARY_PROMPT: &str = r#"You maintain the long-term memory of a character ({agent}) in a simulation.

The following {kind} memories are being moved into the {tier} tier. Condense them into ONE short memory, written from the character's point of view.

Keep:
- Names of other characters involved
- Concrete outcomes (injuries, trades, promises, fights, relationships changing)
- Anything repeated often enough to be a habit or pattern

Drop:
- Filler and small talk
- Exact times and tick numbers

Memories (oldest first):
{entries}

Respond with ONLY the condensed memory, at most two sentences, no preamble."#;

/// Fill a prompt template from a request
pub fn render_prompt(request: &SummaryRequest) -> String {
    let entries = request
        .entries
        .iter()
        .map(|e| format!("- {e}"))
        .collect::<Vec<_>>()
        .join("\n");

    request
        .prompt_template
        .replace("{agent}", &request.agent)
        .replace("{kind}", request.kind.as_str())
        .replace("{tier}", request.tier.as_str())
        .replace("{entries}", &entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{MemoryKind, MemoryTier};

    #[test]
    fn test_default_prompt_has_placeholders() {
        for placeholder in ["{agent}", "{kind}", "{tier}", "{entries}"] {
            assert!(ARCHIVE_SUMMARY_PROMPT.contains(placeholder));
        }
    }

    #[test]
    fn test_render_prompt() {
        let request = SummaryRequest {
            agent: "pawn_1".to_string(),
            kind: MemoryKind::Conversation,
            tier: MemoryTier::Archive,
            entries: vec!["Talked to Bob".to_string(), "Argued with Cara".to_string()],
            prompt_template: ARCHIVE_SUMMARY_PROMPT.to_string(),
        };

        let prompt = render_prompt(&request);
        assert!(prompt.contains("(pawn_1)"));
        assert!(prompt.contains("conversation memories"));
        assert!(prompt.contains("archive tier"));
        assert!(prompt.contains("- Talked to Bob\n- Argued with Cara"));
        assert!(!prompt.contains("{entries}"));
    }
}
