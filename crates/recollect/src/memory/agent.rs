//! Agent identifiers
//!
//! Every memory store and every exclusive knowledge entry is keyed by an
//! agent id supplied by the host. Ids must be non-empty, at most 128 chars,
//! and use only ASCII alphanumerics plus `_`, `-` and `.`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length for agent IDs
const MAX_AGENT_ID_LEN: usize = 128;

/// Errors that can occur during agent ID validation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentIdError {
    #[error("Agent ID cannot be empty")]
    Empty,

    #[error("Agent ID contains invalid characters: allowed are a-z, A-Z, 0-9, _, -, .")]
    InvalidChars,

    #[error("Agent ID exceeds maximum length of {MAX_AGENT_ID_LEN} characters")]
    TooLong,
}

/// A validated agent ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentId(String);

impl AgentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), AgentIdError> {
        if s.is_empty() {
            return Err(AgentIdError::Empty);
        }

        if s.len() > MAX_AGENT_ID_LEN {
            return Err(AgentIdError::TooLong);
        }

        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return Err(AgentIdError::InvalidChars);
        }

        Ok(())
    }
}

impl TryFrom<&str> for AgentId {
    type Error = AgentIdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::validate(value)?;
        Ok(AgentId(value.to_string()))
    }
}

impl TryFrom<String> for AgentId {
    type Error = AgentIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::validate(&value)?;
        Ok(AgentId(value))
    }
}

impl From<AgentId> for String {
    fn from(agent_id: AgentId) -> Self {
        agent_id.0
    }
}

impl AsRef<str> for AgentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_agent_ids() {
        assert!(AgentId::try_from("Thing_Human1042").is_ok());
        assert!(AgentId::try_from("colonist-7").is_ok());
        assert!(AgentId::try_from("faction.leader").is_ok());
        assert!(AgentId::try_from("a").is_ok());
    }

    #[test]
    fn test_empty_agent_id() {
        assert!(matches!(AgentId::try_from(""), Err(AgentIdError::Empty)));
    }

    #[test]
    fn test_agent_id_with_spaces() {
        assert!(matches!(
            AgentId::try_from("has spaces"),
            Err(AgentIdError::InvalidChars)
        ));
    }

    #[test]
    fn test_agent_id_too_long() {
        let long_id = "a".repeat(129);
        assert!(matches!(
            AgentId::try_from(long_id.as_str()),
            Err(AgentIdError::TooLong)
        ));
        assert!(AgentId::try_from("a".repeat(128)).is_ok());
    }

    #[test]
    fn test_serde_validates() {
        let id: AgentId = serde_json::from_str("\"pawn_1\"").unwrap();
        assert_eq!(id.as_str(), "pawn_1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"pawn_1\"");

        let bad: Result<AgentId, _> = serde_json::from_str("\"bad id\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_display() {
        let id = AgentId::try_from("pawn_1").unwrap();
        assert_eq!(format!("{id}"), "pawn_1");
    }
}
