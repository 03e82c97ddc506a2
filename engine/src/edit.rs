//! Pending local edits awaiting upload.
//!
//! Local changes are journaled as edits rather than applied silently, so the
//! upload pass can drain them in order and the download pass can detect
//! collisions with incoming records.

use crate::{RecordRef, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered journal token, monotonically increasing per store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EditToken(pub i64);

impl fmt::Display for EditToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of local mutation an edit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditKind {
    Insert,
    Update,
    Delete,
}

impl EditKind {
    /// Stable lowercase name, used as the persisted form.
    pub fn as_str(&self) -> &'static str {
        match self {
            EditKind::Insert => "insert",
            EditKind::Update => "update",
            EditKind::Delete => "delete",
        }
    }

    /// Parse the persisted form.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "insert" => Some(EditKind::Insert),
            "update" => Some(EditKind::Update),
            "delete" => Some(EditKind::Delete),
            _ => None,
        }
    }
}

/// One entry of the local edit journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingEdit {
    /// Journal token
    pub token: EditToken,
    /// Record the edit applies to
    pub reference: RecordRef,
    /// Kind of mutation
    pub kind: EditKind,
    /// Full resource body for inserts and updates
    pub payload: Option<serde_json::Value>,
    /// When the edit was made locally
    pub created_at: Timestamp,
}

/// Which journal entries to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditSelector {
    /// Exactly these tokens
    Tokens(Vec<EditToken>),
    /// Every edit for these records
    References(Vec<RecordRef>),
}

impl EditSelector {
    /// Whether `edit` is selected.
    pub fn matches(&self, edit: &PendingEdit) -> bool {
        match self {
            EditSelector::Tokens(tokens) => tokens.contains(&edit.token),
            EditSelector::References(refs) => refs.contains(&edit.reference),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn edit(token: i64, id: &str) -> PendingEdit {
        PendingEdit {
            token: EditToken(token),
            reference: RecordRef::new("Patient", id),
            kind: EditKind::Update,
            payload: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn tokens_are_ordered() {
        assert!(EditToken(1) < EditToken(2));
        assert_eq!(EditToken(4).to_string(), "#4");
    }

    #[test]
    fn kind_persisted_form() {
        for kind in [EditKind::Insert, EditKind::Update, EditKind::Delete] {
            assert_eq!(EditKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EditKind::parse("patch"), None);
    }

    #[test]
    fn selector_matching() {
        let by_token = EditSelector::Tokens(vec![EditToken(2)]);
        assert!(by_token.matches(&edit(2, "a")));
        assert!(!by_token.matches(&edit(3, "a")));

        let by_ref = EditSelector::References(vec![RecordRef::new("Patient", "a")]);
        assert!(by_ref.matches(&edit(2, "a")));
        assert!(by_ref.matches(&edit(9, "a")));
        assert!(!by_ref.matches(&edit(2, "b")));
    }
}
