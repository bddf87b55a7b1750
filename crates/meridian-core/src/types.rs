//! Core domain types for the Meridian query pipeline.
//!
//! These types cross crate boundaries: the translator produces a
//! `StructuredQuery`, the access gate narrows it, and the executor turns it
//! into one bounded graph read. The JSON shape of `StructuredQuery` is also
//! the wire contract with the completion backend, so field names are fixed
//! to camelCase.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Structured Query ──────────────────────────────────────────────

/// What the caller is asking for, after translation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueryCommand {
    Show,
    ShowRelated,
    Unknown,
}

/// The normalized, schema-validated representation of a natural-language
/// request. `resource_types` is always a subset of the labels known to the
/// schema registry at translation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StructuredQuery {
    pub command: QueryCommand,

    #[serde(default)]
    pub resource_types: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_to: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_entity_name: Option<String>,

    /// Explicit top-N parsed from the raw query ("top 5 deals"). When absent
    /// the executor applies its configured default cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl StructuredQuery {
    /// The fixed fallback when translation cannot produce anything usable.
    pub fn unknown() -> Self {
        Self {
            command: QueryCommand::Unknown,
            resource_types: Vec::new(),
            related_to: Vec::new(),
            filters: BTreeMap::new(),
            relationship_type: None,
            source_entity_name: None,
            limit: None,
        }
    }

    /// A query is actionable when it has a real command and at least one
    /// resource type surviving validation.
    pub fn is_actionable(&self) -> bool {
        self.command != QueryCommand::Unknown && !self.resource_types.is_empty()
    }
}

// ── Conversation Context ──────────────────────────────────────────

/// An entity mentioned in an assistant response, carried as translation
/// context for follow-up questions ("who works there?").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntityRef {
    pub id: String,
    pub name: String,
    pub entity_type: String,
}

/// One prior exchange in the caller's session. Never persisted by the core;
/// the transport owns its lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub user_query: String,
    #[serde(default)]
    pub assistant_response: Vec<EntityRef>,
}

// ── Permission Model ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Query,
    Write,
    Delete,
}

/// One grant: an action on a resource type from the composite schema.
/// Evaluated per resource type, never per instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Permission {
    pub action: Action,
    pub resource: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

/// The authenticated identity a request runs as.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Caller {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl Caller {
    /// Whether any role grants `query` or `read` on the given resource type.
    pub fn may_query(&self, resource: &str) -> bool {
        self.roles.iter().any(|role| {
            role.permissions.iter().any(|p| {
                matches!(p.action, Action::Query | Action::Read) && p.resource == resource
            })
        })
    }
}

// ── Deadline ──────────────────────────────────────────────────────

/// A per-request cancellation budget, threaded through translation,
/// authorization, and graph execution. A disconnecting caller's remaining
/// budget hits zero and in-flight stages abort instead of blocking.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
        }
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_query_wire_shape_is_camel_case() {
        let mut filters = BTreeMap::new();
        filters.insert("name".to_string(), "Blackstone".to_string());

        let q = StructuredQuery {
            command: QueryCommand::ShowRelated,
            resource_types: vec!["Deal".to_string()],
            related_to: vec!["Organization".to_string()],
            filters,
            relationship_type: None,
            source_entity_name: Some("Blackstone".to_string()),
            limit: Some(5),
        };

        let json = serde_json::to_string(&q).unwrap();
        assert!(json.contains("\"command\":\"show_related\""));
        assert!(json.contains("\"resourceTypes\":[\"Deal\"]"));
        assert!(json.contains("\"relatedTo\":[\"Organization\"]"));
        assert!(json.contains("\"sourceEntityName\":\"Blackstone\""));

        let back: StructuredQuery = serde_json::from_str(&json).unwrap();
        assert_eq!(back, q);
    }

    #[test]
    fn structured_query_deserializes_with_missing_optionals() {
        let q: StructuredQuery =
            serde_json::from_str(r#"{"command":"show","resourceTypes":["Contact"]}"#).unwrap();
        assert_eq!(q.command, QueryCommand::Show);
        assert_eq!(q.resource_types, vec!["Contact"]);
        assert!(q.related_to.is_empty());
        assert!(q.filters.is_empty());
        assert!(q.limit.is_none());
    }

    #[test]
    fn unknown_query_is_not_actionable() {
        let q = StructuredQuery::unknown();
        assert_eq!(q.command, QueryCommand::Unknown);
        assert!(!q.is_actionable());
    }

    #[test]
    fn caller_may_query_checks_all_roles() {
        let caller = Caller {
            id: Uuid::new_v4(),
            name: "analyst".to_string(),
            roles: vec![
                Role {
                    name: "crm-reader".to_string(),
                    permissions: vec![Permission {
                        action: Action::Read,
                        resource: "Contact".to_string(),
                    }],
                },
                Role {
                    name: "deal-desk".to_string(),
                    permissions: vec![Permission {
                        action: Action::Query,
                        resource: "Deal".to_string(),
                    }],
                },
            ],
        };

        assert!(caller.may_query("Contact"));
        assert!(caller.may_query("Deal"));
        assert!(!caller.may_query("Invoice"));
    }

    #[test]
    fn write_permission_does_not_grant_query() {
        let caller = Caller {
            id: Uuid::new_v4(),
            name: "ingester".to_string(),
            roles: vec![Role {
                name: "writer".to_string(),
                permissions: vec![Permission {
                    action: Action::Write,
                    resource: "Deal".to_string(),
                }],
            }],
        };
        assert!(!caller.may_query("Deal"));
    }

    #[test]
    fn deadline_expires() {
        let d = Deadline::after(Duration::from_millis(0));
        assert!(d.expired());
        assert_eq!(d.remaining(), Duration::ZERO);

        let d = Deadline::after(Duration::from_secs(60));
        assert!(!d.expired());
        assert!(d.remaining() > Duration::from_secs(50));
    }
}
