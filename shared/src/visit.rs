use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const NOTES_MAX_CHARS: usize = 1000;
pub const OWNER_ID_MAX_LEN: usize = 64;

/// Persisted fact that an owner marked a region visited.
/// At most one exists per (owner, region).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitRecord {
    pub id: i64,
    pub region_id: String,
    pub owner_id: String,
    pub visited_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// One row of `GET /api/owners/{owner}/visits`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitedEntry {
    pub id: i64,
    pub region_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Desired-state mutation keyed by (owner, region).
/// `visited: true` upserts, `visited: false` deletes; both are idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleRequest {
    pub region_id: String,
    pub visited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleAction {
    Added,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleResponse {
    pub action: ToggleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotesUpdate {
    pub notes: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotesTooLong {
    pub chars: usize,
}

impl std::fmt::Display for NotesTooLong {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "notes are {} characters long (limit {NOTES_MAX_CHARS})",
            self.chars
        )
    }
}

impl std::error::Error for NotesTooLong {}

/// Length limits count characters, not bytes.
pub fn validate_notes(notes: &str) -> Result<(), NotesTooLong> {
    let chars = notes.chars().count();
    if chars > NOTES_MAX_CHARS {
        return Err(NotesTooLong { chars });
    }
    Ok(())
}

/// Trimmed owner id, or the reason it cannot be used in a URL path.
pub fn normalize_owner_id(owner: &str) -> Result<&str, &'static str> {
    let trimmed = owner.trim();
    if trimmed.is_empty() || trimmed.len() > OWNER_ID_MAX_LEN {
        return Err("owner id is empty or too long");
    }
    if trimmed
        .chars()
        .any(|ch| ch.is_control() || matches!(ch, '/' | '\\' | '?' | '#'))
    {
        return Err("owner id contains reserved characters");
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_response_wire_shape() {
        let added = ToggleResponse {
            action: ToggleAction::Added,
            id: Some(42),
        };
        assert_eq!(
            serde_json::to_string(&added).unwrap(),
            r#"{"action":"added","id":42}"#
        );

        let removed: ToggleResponse = serde_json::from_str(r#"{"action":"removed"}"#).unwrap();
        assert_eq!(removed.action, ToggleAction::Removed);
        assert_eq!(removed.id, None);
    }

    #[test]
    fn visited_entry_color_is_optional() {
        let entry: VisitedEntry =
            serde_json::from_str(r#"{"id":3,"region_id":"province-3"}"#).unwrap();
        assert_eq!(entry.color, None);
    }

    #[test]
    fn notes_limit_counts_characters() {
        assert!(validate_notes(&"a".repeat(NOTES_MAX_CHARS)).is_ok());
        assert_eq!(
            validate_notes(&"a".repeat(NOTES_MAX_CHARS + 1)),
            Err(NotesTooLong {
                chars: NOTES_MAX_CHARS + 1
            })
        );
        // multi-byte characters still count once each
        assert!(validate_notes(&"é".repeat(NOTES_MAX_CHARS)).is_ok());
    }

    #[test]
    fn owner_ids_are_trimmed_and_checked() {
        assert_eq!(normalize_owner_id("  ana "), Ok("ana"));
        assert!(normalize_owner_id("").is_err());
        assert!(normalize_owner_id("   ").is_err());
        assert!(normalize_owner_id("a/b").is_err());
        assert!(normalize_owner_id("a?b").is_err());
        assert!(normalize_owner_id(&"x".repeat(OWNER_ID_MAX_LEN + 1)).is_err());
    }
}
