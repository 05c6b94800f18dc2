//! Sticky visibility tracker for the template-content editor
//!
//! Remembers which optional fields were ever populated during the current
//! edit session so they stay visible after being cleared. Visibility never
//! affects validation; it only decides which inputs the editor exposes.

use std::collections::BTreeSet;
use tracing::debug;
use uuid::Uuid;

use crate::record::SubjectRecord;

/// Per-session visibility state for one content record
#[derive(Debug, Clone, Default)]
pub struct VisibilityTracker {
    /// Identity of the current edit session; rotated on every load
    session_id: Option<Uuid>,
    visible: BTreeSet<String>,
}

impl VisibilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an edit session for a content record. This is the explicit
    /// reset signal: the visible set becomes exactly the fields currently
    /// holding a non-empty value, regardless of any previous session.
    pub fn load(&mut self, content: &SubjectRecord) -> Uuid {
        let session_id = Uuid::new_v4();
        self.session_id = Some(session_id);
        self.visible = content
            .non_empty_fields()
            .into_iter()
            .map(String::from)
            .collect();
        debug!(session = %session_id, fields = self.visible.len(), "Visibility session started");
        session_id
    }

    /// Fold a content change into the session: any field that became
    /// non-empty joins the visible set. Fields already visible stay visible
    /// even when cleared to empty; visibility is monotonic within a session.
    pub fn record_changed(&mut self, content: &SubjectRecord) {
        for field in content.non_empty_fields() {
            self.visible.insert(field.to_string());
        }
    }

    /// Explicitly expose a field (e.g. the editor's "add" button)
    pub fn mark_visible(&mut self, field: impl Into<String>) {
        self.visible.insert(field.into());
    }

    pub fn is_visible(&self, field: &str) -> bool {
        self.visible.contains(field)
    }

    /// The fields currently exposed by the editor
    pub fn visible_fields(&self) -> &BTreeSet<String> {
        &self.visible
    }

    /// Identity of the current edit session, if one was started
    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }
}
