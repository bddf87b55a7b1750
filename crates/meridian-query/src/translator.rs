//! Natural language → `StructuredQuery` translation.
//!
//! One state machine, two paths. The fast path is deterministic keyword and
//! regex matching against the registry's labels plus a small synonym
//! vocabulary; a confident match never touches the network. The assisted
//! path prompts a completion backend with the schema representation and
//! recent conversation turns, then validates whatever comes back against
//! the registry. When both fail, the result is the `unknown` query — this
//! function never errors out.

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;

use meridian_core::{ConversationTurn, Deadline, QueryCommand, StructuredQuery};
use meridian_schema::SchemaRegistry;

use crate::error::TranslationError;
use crate::llm::CompletionBackend;

/// Sentence-leading verbs that must never be captured as entity-name
/// filters ("Show" is not a company).
const FILTER_STOPLIST: [&str; 6] = ["Show", "Find", "Get", "List", "Display", "Search"];

const COMMAND_VERBS: [&str; 6] = ["show", "list", "find", "get", "display", "search"];

#[derive(Debug, Clone)]
pub struct TranslatorConfig {
    /// How many prior turns feed the assisted prompt.
    pub history_window: usize,

    /// Labels tried as the source side of "related to <proper noun>" when
    /// the phrase names an instance rather than a type. Filtered to
    /// registry-valid labels at match time.
    pub related_source_candidates: Vec<String>,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            history_window: 3,
            related_source_candidates: vec![
                "Organization".to_string(),
                "Person".to_string(),
                "Contact".to_string(),
            ],
        }
    }
}

pub struct QueryTranslator {
    registry: Arc<SchemaRegistry>,
    backend: Option<Arc<dyn CompletionBackend>>,
    config: TranslatorConfig,
    synonyms: BTreeMap<&'static str, Vec<&'static str>>,
    related_re: Regex,
    limit_re: Regex,
    proper_noun_re: Regex,
}

impl QueryTranslator {
    pub fn new(
        registry: Arc<SchemaRegistry>,
        backend: Option<Arc<dyn CompletionBackend>>,
        config: TranslatorConfig,
    ) -> Self {
        Self {
            registry,
            backend,
            config,
            synonyms: default_synonyms(),
            related_re: Regex::new(
                r"(?i)\b(?:related to|connected to|associated with|linked to)\b",
            )
            .expect("static regex"),
            limit_re: Regex::new(r"(?i)\b(?:top|first|limit)\s+(\d+)\b").expect("static regex"),
            proper_noun_re: Regex::new(
                r"\b[A-Z][A-Za-z0-9&.'-]*(?:\s+[A-Z][A-Za-z0-9&.'-]*)*",
            )
            .expect("static regex"),
        }
    }

    /// Translate a raw question. Fast path first; assisted path only when
    /// the fast path is not confident; `unknown` when everything fails.
    pub async fn translate(
        &self,
        raw: &str,
        history: &[ConversationTurn],
        deadline: Deadline,
    ) -> StructuredQuery {
        if let Some(structured) = self.fast_path(raw) {
            tracing::debug!(?structured.command, "fast-path translation");
            return structured;
        }

        let Some(backend) = &self.backend else {
            tracing::debug!("no completion backend configured; returning unknown");
            return StructuredQuery::unknown();
        };
        if deadline.expired() {
            tracing::debug!("deadline exhausted before assisted translation");
            return StructuredQuery::unknown();
        }

        match self.assisted_path(backend.as_ref(), raw, history, deadline).await {
            Ok(structured) => structured,
            Err(e) => {
                tracing::warn!(error = %e, "assisted translation failed; returning unknown");
                StructuredQuery::unknown()
            }
        }
    }

    // ── Fast Path ────────────────────────────────────────────────

    fn fast_path(&self, raw: &str) -> Option<StructuredQuery> {
        let lower = raw.to_lowercase();
        let tokens: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
            .collect();

        if !tokens.iter().any(|t| COMMAND_VERBS.contains(t)) {
            return None;
        }

        let limit = self
            .limit_re
            .captures(raw)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .filter(|n| *n > 0);

        if let Some(m) = self.related_re.find(raw) {
            let head = &raw[..m.start()];
            let tail = raw[m.end()..]
                .trim()
                .trim_end_matches(['?', '.', '!'])
                .trim();
            return self.fast_related(head, tail, limit);
        }

        let resource_types = self.match_resource_types(&tokens);
        if resource_types.is_empty() {
            return None;
        }

        let mut filters = BTreeMap::new();
        if let Some(name) = self.extract_name_filter(raw) {
            filters.insert("name".to_string(), name);
        }

        Some(StructuredQuery {
            command: QueryCommand::Show,
            resource_types,
            related_to: Vec::new(),
            filters,
            relationship_type: None,
            source_entity_name: None,
            limit,
        })
    }

    fn fast_related(&self, head: &str, tail: &str, limit: Option<u32>) -> Option<StructuredQuery> {
        if tail.is_empty() {
            return None;
        }

        let head_lower = head.to_lowercase();
        let head_tokens: Vec<&str> = head_lower
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
            .collect();
        let resource_types = self.match_resource_types(&head_tokens);
        if resource_types.is_empty() {
            return None;
        }

        let mut filters = BTreeMap::new();
        let related_to;
        if let Some(label) = self.match_single_type(tail) {
            // "deals related to organizations": the tail names a type.
            related_to = vec![label];
        } else {
            // The tail names an instance ("Blackstone"); try the configured
            // candidate source types.
            related_to = self
                .config
                .related_source_candidates
                .iter()
                .filter_map(|c| self.registry.canonical_label(c).map(str::to_string))
                .collect();
            if related_to.is_empty() {
                return None;
            }
            filters.insert("name".to_string(), tail.to_string());
        }

        Some(StructuredQuery {
            command: QueryCommand::ShowRelated,
            resource_types,
            related_to,
            filters,
            relationship_type: None,
            source_entity_name: None,
            limit,
        })
    }

    /// Every registry label the tokens mention, directly or through the
    /// synonym vocabulary. An ambiguous keyword yields all of its types
    /// rather than a guess.
    fn match_resource_types(&self, tokens: &[&str]) -> Vec<String> {
        let mut matched: Vec<String> = Vec::new();
        let mut push = |label: String| {
            if !matched.contains(&label) {
                matched.push(label);
            }
        };

        for token in tokens {
            if let Some(label) = self.match_single_type(token) {
                push(label);
            }
            if let Some(candidates) = self.synonyms.get(token) {
                for candidate in candidates {
                    if let Some(label) = self.registry.canonical_label(candidate) {
                        push(label.to_string());
                    }
                }
            }
        }
        matched
    }

    /// Case-insensitive singular/plural label match for one word.
    fn match_single_type(&self, word: &str) -> Option<String> {
        let word = word.trim().to_lowercase();
        if word.is_empty() || word.contains(char::is_whitespace) {
            return None;
        }
        if let Some(label) = self.registry.canonical_label(&word) {
            return Some(label.to_string());
        }
        if let Some(stem) = word.strip_suffix("es") {
            if let Some(label) = self.registry.canonical_label(stem) {
                return Some(label.to_string());
            }
        }
        if let Some(stem) = word.strip_suffix('s') {
            if let Some(label) = self.registry.canonical_label(stem) {
                return Some(label.to_string());
            }
        }
        None
    }

    /// Capitalized spans that are neither stoplisted verbs nor type names
    /// become the entity-name filter.
    fn extract_name_filter(&self, raw: &str) -> Option<String> {
        for m in self.proper_noun_re.find_iter(raw) {
            let mut words: Vec<&str> = m.as_str().split_whitespace().collect();
            while let Some(first) = words.first() {
                if FILTER_STOPLIST.iter().any(|s| s.eq_ignore_ascii_case(first)) {
                    words.remove(0);
                } else {
                    break;
                }
            }
            // Drop words that are type references, not names.
            words.retain(|w| self.match_single_type(w).is_none());
            if !words.is_empty() {
                return Some(words.join(" "));
            }
        }
        None
    }

    // ── Assisted Path ────────────────────────────────────────────

    async fn assisted_path(
        &self,
        backend: &dyn CompletionBackend,
        raw: &str,
        history: &[ConversationTurn],
        deadline: Deadline,
    ) -> Result<StructuredQuery, TranslationError> {
        let prompt = self.build_prompt(raw, history);
        let content = backend.complete(&prompt, deadline).await?;
        let json = extract_json_object(&content).ok_or_else(|| {
            TranslationError::MalformedResponse(format!(
                "no JSON object in completion: {content}"
            ))
        })?;
        let mut structured: StructuredQuery = serde_json::from_str(json)
            .map_err(|e| TranslationError::MalformedResponse(e.to_string()))?;

        self.validate(&mut structured);
        Ok(structured)
    }

    fn build_prompt(&self, raw: &str, history: &[ConversationTurn]) -> String {
        let mut prompt = String::from(
            "Translate the user's question about a knowledge graph into a structured query.\n\
             Respond with a single JSON object and nothing else, shaped as:\n\
             {\"command\": \"show\" | \"show_related\" | \"unknown\", \
             \"resourceTypes\": [..], \"relatedTo\": [..], \"filters\": {..}, \
             \"relationshipType\": null, \"sourceEntityName\": null, \"limit\": null}\n\
             Use only entity and relationship types from this schema:\n\n",
        );
        prompt.push_str(&self.registry.schema_representation());

        let recent: Vec<&ConversationTurn> = history
            .iter()
            .rev()
            .take(self.config.history_window)
            .collect();
        if !recent.is_empty() {
            prompt.push_str("\nRecent conversation (most recent first):\n");
            for turn in &recent {
                prompt.push_str(&format!("  user: {}\n", turn.user_query));
                if !turn.assistant_response.is_empty() {
                    let entities: Vec<String> = turn
                        .assistant_response
                        .iter()
                        .map(|e| format!("{} ({})", e.name, e.entity_type))
                        .collect();
                    prompt.push_str(&format!(
                        "  entities shown, usable as sourceEntityName: {}\n",
                        entities.join(", ")
                    ));
                }
            }
        }

        prompt.push_str(&format!("\nQuestion: {raw}\n"));
        prompt
    }

    /// Drop anything the registry does not know; degrade to unknown when
    /// nothing survives.
    fn validate(&self, structured: &mut StructuredQuery) {
        structured.resource_types = self.canonicalize(&structured.resource_types);
        structured.related_to = self.canonicalize(&structured.related_to);

        if structured.resource_types.is_empty() {
            *structured = StructuredQuery::unknown();
        }
    }

    fn canonicalize(&self, labels: &[String]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for label in labels {
            if let Some(canonical) = self.registry.canonical_label(label) {
                if !out.iter().any(|existing| existing == canonical) {
                    out.push(canonical.to_string());
                }
            } else {
                tracing::debug!(label = %label, "dropping resource type unknown to the registry");
            }
        }
        out
    }
}

/// Completion output may wrap the object in code fences or prose; take the
/// outermost braces.
fn extract_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

fn default_synonyms() -> BTreeMap<&'static str, Vec<&'static str>> {
    BTreeMap::from([
        ("companies", vec!["Organization"]),
        ("company", vec!["Organization"]),
        ("organizations", vec!["Organization"]),
        ("firms", vec!["Organization"]),
        ("people", vec!["Person", "Contact"]),
        ("persons", vec!["Person"]),
        ("contacts", vec!["Contact"]),
        ("projects", vec!["Project", "Deal"]),
        ("deals", vec!["Deal"]),
        ("investments", vec!["Deal", "Investment"]),
        ("investors", vec!["Investor"]),
        ("funds", vec!["Fund"]),
        ("suppliers", vec!["Supplier"]),
        ("vendors", vec!["Vendor"]),
        ("invoices", vec!["Invoice"]),
    ])
}
