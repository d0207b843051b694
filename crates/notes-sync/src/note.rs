//! Note data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifier::Identifier;

/// A note known to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: Identifier,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// Create a note stamped with the current time.
    pub fn new(id: Identifier, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            content: content.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply an edit locally, bumping `updated_at`.
    pub fn apply(&mut self, payload: &NotePayload) {
        self.content = payload.content.clone();
        self.updated_at = Utc::now();
    }
}

/// Body of a create or update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotePayload {
    pub content: String,
}

impl NotePayload {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::ServerId;

    #[test]
    fn test_note_creation() {
        let note = Note::new(ServerId::from(1).into(), "Buy milk");
        assert_eq!(note.content, "Buy milk");
        assert_eq!(note.created_at, note.updated_at);
    }

    #[test]
    fn test_apply_keeps_created_at() {
        let mut note = Note::new(ServerId::from(1).into(), "Buy milk");
        let created = note.created_at;

        note.apply(&NotePayload::new("Buy oat milk"));

        assert_eq!(note.content, "Buy oat milk");
        assert_eq!(note.created_at, created);
        assert!(note.updated_at >= created);
    }

    #[test]
    fn test_camel_case_json() {
        let note = Note::new(ServerId::from(7).into(), "x");
        let json = serde_json::to_value(&note).unwrap();
        assert!(json.get("createdAt").is_some());
        assert!(json.get("updatedAt").is_some());
        assert_eq!(json["id"]["kind"], "permanent");
    }
}
