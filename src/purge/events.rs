//! Content change events.
//!
//! Events arrive from the surrounding system's dispatcher as typed values and
//! are matched against the configured action subscriptions.

use serde::Serialize;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::content::ObjectKind;
use crate::options::PurgeOptions;

use super::context::PurgeTarget;

/// A change notification, stamped on receipt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    /// Unique identifier for log correlation (UUIDv4).
    pub id: Uuid,
    pub kind: EventKind,
    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
}

impl ChangeEvent {
    pub fn new(kind: EventKind) -> Self {
        let event = Self {
            id: Uuid::new_v4(),
            kind,
            received_at: OffsetDateTime::now_utc(),
        };
        debug!(
            event_id = %event.id,
            event_kind = ?event.kind,
            "Change event received"
        );
        event
    }

    pub fn post_changed(post_id: u64, action: impl Into<String>) -> Self {
        Self::new(EventKind::PostChanged {
            post_id,
            action: action.into(),
        })
    }

    pub fn term_changed(
        term_id: u64,
        action: impl Into<String>,
        term_taxonomy_id: u64,
        taxonomy: impl Into<String>,
    ) -> Self {
        Self::new(EventKind::TermChanged {
            term_id,
            action: action.into(),
            term_taxonomy_id,
            taxonomy: taxonomy.into(),
        })
    }

    pub fn user_changed(user_id: u64, action: impl Into<String>) -> Self {
        Self::new(EventKind::UserChanged {
            user_id,
            action: action.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    PostChanged {
        post_id: u64,
        action: String,
    },
    TermChanged {
        term_id: u64,
        action: String,
        term_taxonomy_id: u64,
        taxonomy: String,
    },
    /// An author profile changed.
    UserChanged {
        user_id: u64,
        action: String,
    },
}

impl EventKind {
    pub fn action(&self) -> &str {
        match self {
            Self::PostChanged { action, .. }
            | Self::TermChanged { action, .. }
            | Self::UserChanged { action, .. } => action,
        }
    }

    pub fn object_kind(&self) -> ObjectKind {
        match self {
            Self::PostChanged { .. } => ObjectKind::Post,
            Self::TermChanged { .. } => ObjectKind::Term,
            Self::UserChanged { .. } => ObjectKind::User,
        }
    }

    pub fn target(&self) -> PurgeTarget {
        match self {
            Self::PostChanged { post_id, .. } => PurgeTarget::post(*post_id),
            Self::TermChanged {
                term_id,
                term_taxonomy_id,
                taxonomy,
                ..
            } => PurgeTarget::Term {
                id: *term_id,
                taxonomy: Some(taxonomy.clone()).filter(|taxonomy| !taxonomy.is_empty()),
                term_taxonomy_id: Some(*term_taxonomy_id).filter(|id| *id > 0),
            },
            Self::UserChanged { user_id, .. } => PurgeTarget::user(*user_id),
        }
    }
}

/// Actions that trigger a purge, per object kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscriptions {
    pub post_actions: Vec<String>,
    pub term_actions: Vec<String>,
    pub user_actions: Vec<String>,
}

impl Subscriptions {
    pub fn from_options(options: &PurgeOptions) -> Self {
        Self {
            post_actions: options.post_actions.clone(),
            term_actions: options.term_actions.clone(),
            user_actions: options.user_actions.clone(),
        }
    }

    pub fn is_subscribed(&self, kind: &EventKind) -> bool {
        let actions = match kind.object_kind() {
            ObjectKind::Post => &self.post_actions,
            ObjectKind::Term => &self.term_actions,
            ObjectKind::User => &self.user_actions,
        };
        actions.iter().any(|action| action == kind.action())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn term_event_targets_term_with_taxonomy() {
        let event = ChangeEvent::term_changed(3, "edit", 33, "category");
        assert_eq!(event.kind.action(), "edit");
        assert_eq!(
            event.kind.target(),
            PurgeTarget::Term {
                id: 3,
                taxonomy: Some("category".into()),
                term_taxonomy_id: Some(33),
            }
        );
    }

    #[test]
    fn default_subscriptions_cover_documented_actions() {
        let subscriptions = Subscriptions::from_options(&PurgeOptions::default());
        assert!(subscriptions.is_subscribed(&EventKind::PostChanged {
            post_id: 1,
            action: "future-publish".into(),
        }));
        assert!(!subscriptions.is_subscribed(&EventKind::PostChanged {
            post_id: 1,
            action: "edit".into(),
        }));
        assert!(subscriptions.is_subscribed(&EventKind::TermChanged {
            term_id: 1,
            action: "edit".into(),
            term_taxonomy_id: 1,
            taxonomy: "category".into(),
        }));
        assert!(subscriptions.is_subscribed(&EventKind::UserChanged {
            user_id: 7,
            action: "profile-update".into(),
        }));
    }

    #[test]
    fn events_get_unique_ids() {
        let first = ChangeEvent::post_changed(42, "update");
        let second = ChangeEvent::post_changed(42, "update");
        assert_ne!(first.id, second.id);
        assert_eq!(first.kind, second.kind);
    }
}
