//! Rendering execution outcomes into user-facing text.
//!
//! Two fixed fallback messages cover the empty and failure cases so the
//! pipeline never leaks internals (denied types, backend errors, Cypher)
//! into the answer.

use meridian_core::EntityRef;
use meridian_graph::{EntityRecord, ExecutionOutcome};

pub const NOTHING_FOUND_MESSAGE: &str = "I couldn't find anything matching that.";
pub const GENERIC_FAILURE_MESSAGE: &str =
    "Something went wrong while answering that. Please try again.";

/// The pipeline's answer: text for the user plus the entities it mentions,
/// kept so the next turn can refer back to them.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapedResponse {
    pub text: String,
    pub entities: Vec<EntityRef>,
}

impl ShapedResponse {
    pub fn nothing_found() -> Self {
        Self {
            text: NOTHING_FOUND_MESSAGE.to_string(),
            entities: Vec::new(),
        }
    }

    pub fn generic_failure() -> Self {
        Self {
            text: GENERIC_FAILURE_MESSAGE.to_string(),
            entities: Vec::new(),
        }
    }

    pub fn render(outcome: &ExecutionOutcome) -> Self {
        match outcome {
            ExecutionOutcome::NothingFound => Self::nothing_found(),
            ExecutionOutcome::Matches { records, source } => {
                if records.is_empty() {
                    return Self::nothing_found();
                }

                let mut text = match source {
                    Some(src) => format!(
                        "Found {} related to {}:\n",
                        count_phrase(records.len()),
                        src.name
                    ),
                    None => format!("Found {}:\n", count_phrase(records.len())),
                };
                for record in records {
                    text.push_str(&render_record(record));
                    text.push('\n');
                }

                let entities = records.iter().map(entity_ref).collect();
                Self {
                    text: text.trim_end().to_string(),
                    entities,
                }
            }
        }
    }
}

fn count_phrase(n: usize) -> String {
    if n == 1 {
        "1 result".to_string()
    } else {
        format!("{n} results")
    }
}

fn render_record(record: &EntityRecord) -> String {
    let mut line = format!("- {} ({})", record.name, primary_label(record));
    if !record.properties.is_empty() {
        let props: Vec<String> = record
            .properties
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect();
        line.push_str(&format!(" [{}]", props.join(", ")));
    }
    line
}

fn primary_label(record: &EntityRecord) -> &str {
    record
        .labels
        .first()
        .map(String::as_str)
        .unwrap_or("Entity")
}

fn entity_ref(record: &EntityRecord) -> EntityRef {
    EntityRef {
        id: record.id.clone(),
        name: record.name.clone(),
        entity_type: primary_label(record).to_string(),
    }
}
