//! Tag Model: the broker's only durable state lives on the cloud resource as
//! tags. This module encodes/decodes that state.

use std::collections::HashMap;

/// A single cloud resource tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Tag {
            key: key.into(),
            value: value.into(),
        }
    }
}

// ── provenance tag keys ──────────────────────────────────────────────────
pub const OWNER: &str = "Owner";
pub const CREATED_BY: &str = "Created by";
pub const RESTORED_BY: &str = "Restored by";
pub const UPDATED_BY: &str = "Updated by";
pub const CREATED_AT: &str = "Created at";
pub const RESTORED_AT: &str = "Restored at";
pub const UPDATED_AT: &str = "Updated at";
pub const BROKER_NAME: &str = "Broker Name";
pub const SERVICE_ID: &str = "Service ID";
pub const PLAN_ID: &str = "Plan ID";
pub const ORGANIZATION_ID: &str = "Organization ID";
pub const SPACE_ID: &str = "Space ID";
pub const RESTORED_FROM_SNAPSHOT: &str = "Restored From Snapshot";

// ── control-flag tag keys (drive reconciliation) ─────────────────────────
pub const PENDING_UPDATE_SETTINGS: &str = "PendingUpdateSettings";
pub const PENDING_RESET_USER_PASSWORD: &str = "PendingResetUserPassword";
pub const PENDING_REBOOT: &str = "PendingReboot";
pub const SKIP_FINAL_SNAPSHOT: &str = "SkipFinalSnapshot";
pub const EXTENSIONS: &str = "Extensions";

pub const OWNER_VALUE: &str = "Cloud Foundry";
const EXTENSIONS_SEPARATOR: char = ':';

/// The action that triggered a tag rebuild; selects which `*_by`/`*_at` pair
/// is stamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Created,
    Restored,
    Updated,
}

impl Action {
    fn by_key(self) -> &'static str {
        match self {
            Action::Created => CREATED_BY,
            Action::Restored => RESTORED_BY,
            Action::Updated => UPDATED_BY,
        }
    }

    fn at_key(self) -> &'static str {
        match self {
            Action::Created => CREATED_AT,
            Action::Restored => RESTORED_AT,
            Action::Updated => UPDATED_AT,
        }
    }
}

/// Produce provenance + control tags for a Provision/Restore/Update mutation.
///
/// `extras` are appended last so callers can add/override control-flag tags
/// (e.g. `PendingUpdateSettings`) without this function needing to know
/// every caller's concern.
pub fn build_tags(
    action: Action,
    broker_name: &str,
    service_id: &str,
    plan_id: &str,
    org_id: &str,
    space_id: &str,
    timestamp: &str,
    extras: impl IntoIterator<Item = Tag>,
) -> Vec<Tag> {
    let mut tags = vec![
        Tag::new(OWNER, OWNER_VALUE),
        Tag::new(action.by_key(), broker_name),
        Tag::new(action.at_key(), timestamp),
        Tag::new(BROKER_NAME, broker_name),
        Tag::new(SERVICE_ID, service_id),
        Tag::new(PLAN_ID, plan_id),
        Tag::new(ORGANIZATION_ID, org_id),
        Tag::new(SPACE_ID, space_id),
    ];
    tags.extend(extras);
    tags
}

/// Index a tag list by key for O(1) lookup. Last write wins on duplicate keys.
pub fn index_tags(tags: &[Tag]) -> HashMap<String, String> {
    tags.iter()
        .map(|t| (t.key.clone(), t.value.clone()))
        .collect()
}

/// Encode enabled extension names as the colon-separated `Extensions` tag
/// value. Extension names must not contain `:` (see spec Open Questions).
pub fn extensions_to_tag(extensions: &[String]) -> String {
    extensions.join(&EXTENSIONS_SEPARATOR.to_string())
}

/// Decode the `Extensions` tag value. Empty string decodes to an empty list.
pub fn tag_to_extensions(value: &str) -> Vec<String> {
    if value.is_empty() {
        return Vec::new();
    }
    value.split(EXTENSIONS_SEPARATOR).map(String::from).collect()
}
