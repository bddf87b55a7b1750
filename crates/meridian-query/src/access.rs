//! Authorization gate between translation and execution.
//!
//! The gate never rejects a request outright. It narrows the structured
//! query to the resource types the caller may see and lets the pipeline
//! treat an emptied query the same as one that matched nothing. Callers
//! cannot distinguish "denied" from "no results".

use meridian_core::{Caller, Deadline, QueryCommand, StructuredQuery};

pub struct AccessGate;

impl AccessGate {
    /// Narrow a structured query to the caller's permissions. Returns the
    /// narrowed query; a fully denied query comes back with an empty
    /// `resource_types` list, not an error.
    pub fn authorize(
        caller: &Caller,
        structured: &StructuredQuery,
        deadline: Deadline,
    ) -> StructuredQuery {
        if deadline.expired() {
            tracing::warn!(caller = %caller.name, "deadline exhausted before authorization");
            return StructuredQuery::unknown();
        }

        let mut narrowed = structured.clone();
        narrowed
            .resource_types
            .retain(|label| caller.may_query(label));

        if narrowed.command == QueryCommand::ShowRelated {
            let had_sources = !narrowed.related_to.is_empty();
            narrowed.related_to.retain(|label| caller.may_query(label));
            // A related query whose source side was fully denied must not
            // fall back to an unconstrained scan of the target types.
            if had_sources && narrowed.related_to.is_empty() {
                narrowed.resource_types.clear();
            }
        }

        if narrowed.resource_types.len() != structured.resource_types.len() {
            tracing::info!(
                caller = %caller.name,
                requested = ?structured.resource_types,
                granted = ?narrowed.resource_types,
                "narrowed query to caller permissions"
            );
        }

        narrowed
    }
}
