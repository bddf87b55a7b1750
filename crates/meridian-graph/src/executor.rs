//! Turns an authorized `StructuredQuery` into one bounded Cypher read.
//!
//! `show` matches nodes carrying any of the requested labels, optionally
//! filtered by named properties. `show_related` first resolves a source
//! entity (explicit name filter, translated source name, or the most recent
//! conversation turn), then traverses one hop to nodes carrying the
//! requested labels. Both reads are capped: the caller's explicit top-N if
//! the question named one, the configured default otherwise.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use neo4rs::query;

use meridian_core::{ConversationTurn, Deadline, QueryCommand, StructuredQuery};
use meridian_schema::SchemaRegistry;

use crate::client::{cypher_ident, GraphClient, GraphError};

/// A matched node, shaped for response generation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EntityRecord {
    pub id: String,
    pub name: String,
    pub labels: Vec<String>,
    pub properties: BTreeMap<String, String>,
}

/// What one execution produced. `NothingFound` covers every benign empty
/// case: no matches, unresolvable source entity, nothing authorized.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Matches {
        records: Vec<EntityRecord>,
        /// The resolved source entity for `show_related` queries.
        source: Option<EntityRecord>,
    },
    NothingFound,
}

/// Result caps for graph reads.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub default_result_limit: u32,
    pub max_result_limit: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_result_limit: 10,
            max_result_limit: 100,
        }
    }
}

/// The execution seam between the pipeline and the graph store. The
/// pipeline only sees this trait, so tests can prove that denied queries
/// never reach the graph.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(
        &self,
        structured: &StructuredQuery,
        history: &[ConversationTurn],
        deadline: Deadline,
    ) -> Result<ExecutionOutcome, GraphError>;
}

/// Executes structured queries against Neo4j.
pub struct GraphExecutor {
    client: GraphClient,
    registry: Arc<SchemaRegistry>,
    config: ExecutorConfig,
}

impl GraphExecutor {
    pub fn new(client: GraphClient, registry: Arc<SchemaRegistry>, config: ExecutorConfig) -> Self {
        Self {
            client,
            registry,
            config,
        }
    }

    fn effective_limit(&self, structured: &StructuredQuery) -> u32 {
        match structured.limit {
            Some(n) if n > 0 => n.min(self.config.max_result_limit),
            _ => self.config.default_result_limit,
        }
    }

    async fn run_show(
        &self,
        structured: &StructuredQuery,
        deadline: Deadline,
    ) -> Result<ExecutionOutcome, GraphError> {
        let limit = self.effective_limit(structured);
        let (cypher, params) = build_show_cypher(structured, limit)?;

        let mut q = query(&cypher).param("types", structured.resource_types.clone());
        for (key, value) in params {
            q = q.param(&key, value);
        }

        let rows = with_deadline(deadline, self.client.query_rows(q)).await?;
        let records = self.rows_to_records(rows, "n")?;
        if records.is_empty() {
            return Ok(ExecutionOutcome::NothingFound);
        }
        Ok(ExecutionOutcome::Matches {
            records,
            source: None,
        })
    }

    async fn run_show_related(
        &self,
        structured: &StructuredQuery,
        history: &[ConversationTurn],
        deadline: Deadline,
    ) -> Result<ExecutionOutcome, GraphError> {
        let Some(key) = resolve_source_key(structured, history) else {
            tracing::debug!("show_related without a resolvable source entity");
            return Ok(ExecutionOutcome::NothingFound);
        };

        // Resolve the source node first so the response can name it.
        let (cypher, params) = build_source_lookup_cypher(&key, !structured.related_to.is_empty());
        let mut q = query(&cypher);
        if !structured.related_to.is_empty() {
            q = q.param("sourceTypes", structured.related_to.clone());
        }
        for (k, v) in params {
            q = q.param(&k, v);
        }

        let row = with_deadline(deadline, self.client.query_one(q)).await?;
        let Some(row) = row else {
            return Ok(ExecutionOutcome::NothingFound);
        };
        let source = self.row_to_record(&row, "s")?;

        // Traverse from the resolved source to the requested labels.
        let limit = self.effective_limit(structured);
        let traversal_key = if source.id.is_empty() {
            key
        } else {
            SourceKey::Id(source.id.clone())
        };
        let (cypher, params) = build_traversal_cypher(
            &traversal_key,
            structured.relationship_type.as_deref(),
            limit,
        )?;
        let mut q = query(&cypher).param("types", structured.resource_types.clone());
        for (k, v) in params {
            q = q.param(&k, v);
        }

        let rows = with_deadline(deadline, self.client.query_rows(q)).await?;
        let records = self.rows_to_records(rows, "m")?;
        if records.is_empty() {
            return Ok(ExecutionOutcome::NothingFound);
        }
        Ok(ExecutionOutcome::Matches {
            records,
            source: Some(source),
        })
    }

    fn rows_to_records(
        &self,
        rows: Vec<neo4rs::Row>,
        column: &str,
    ) -> Result<Vec<EntityRecord>, GraphError> {
        rows.iter().map(|row| self.row_to_record(row, column)).collect()
    }

    fn row_to_record(&self, row: &neo4rs::Row, column: &str) -> Result<EntityRecord, GraphError> {
        let node: neo4rs::Node = row.get(column).map_err(|e| {
            GraphError::Serialization(format!("failed to deserialize node column {column}: {e}"))
        })?;
        let labels: Vec<String> = row.get("labels").unwrap_or_default();

        let id: String = node.get("id").unwrap_or_default();
        let name: String = node.get("name").unwrap_or_default();

        // Pull out the properties the schema declares as identifying for
        // any of the node's labels, plus the description if present.
        let mut properties = BTreeMap::new();
        let mut wanted: Vec<String> = vec!["description".to_string()];
        for label in &labels {
            wanted.extend(self.registry.key_properties(label));
        }
        for key in wanted {
            if key == "id" || key == "name" || properties.contains_key(&key) {
                continue;
            }
            if let Some(value) = scalar_property(&node, &key) {
                properties.insert(key, value);
            }
        }

        Ok(EntityRecord {
            id,
            name,
            labels,
            properties,
        })
    }
}

#[async_trait]
impl QueryExecutor for GraphExecutor {
    async fn execute(
        &self,
        structured: &StructuredQuery,
        history: &[ConversationTurn],
        deadline: Deadline,
    ) -> Result<ExecutionOutcome, GraphError> {
        if structured.resource_types.is_empty() {
            return Ok(ExecutionOutcome::NothingFound);
        }
        match structured.command {
            QueryCommand::Show => self.run_show(structured, deadline).await,
            QueryCommand::ShowRelated => {
                self.run_show_related(structured, history, deadline).await
            }
            QueryCommand::Unknown => Ok(ExecutionOutcome::NothingFound),
        }
    }
}

// ── Source Resolution ─────────────────────────────────────────────

/// How the source node of a `show_related` traversal is identified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SourceKey {
    Id(String),
    Name(String),
}

/// Resolution order: explicit name filter, then the translated source
/// entity name, then the most recent conversation turn's entities matching
/// `related_to`.
pub(crate) fn resolve_source_key(
    structured: &StructuredQuery,
    history: &[ConversationTurn],
) -> Option<SourceKey> {
    if let Some(name) = structured.filters.get("name") {
        return Some(SourceKey::Name(name.clone()));
    }
    if let Some(name) = &structured.source_entity_name {
        return Some(SourceKey::Name(name.clone()));
    }
    for turn in history.iter().rev() {
        for entity in &turn.assistant_response {
            let matches_related = structured.related_to.is_empty()
                || structured
                    .related_to
                    .iter()
                    .any(|t| t.eq_ignore_ascii_case(&entity.entity_type));
            if matches_related {
                if !entity.id.is_empty() {
                    return Some(SourceKey::Id(entity.id.clone()));
                }
                return Some(SourceKey::Name(entity.name.clone()));
            }
        }
    }
    None
}

// ── Cypher Builders ───────────────────────────────────────────────

pub(crate) fn build_show_cypher(
    structured: &StructuredQuery,
    limit: u32,
) -> Result<(String, Vec<(String, String)>), GraphError> {
    let mut cypher = String::from(
        "MATCH (n)\n WHERE any(label IN labels(n) WHERE label IN $types)",
    );
    let mut params = Vec::new();

    for (i, (prop, value)) in structured.filters.iter().enumerate() {
        let prop = cypher_ident(prop)?;
        let param = format!("f{i}");
        if prop == "name" {
            // Name filters are substring, case-insensitive: callers write
            // "Blackstone" for "Blackstone Group Inc".
            cypher.push_str(&format!(
                "\n AND toLower(n.{prop}) CONTAINS toLower(${param})"
            ));
        } else {
            cypher.push_str(&format!("\n AND n.{prop} = ${param}"));
        }
        params.push((param, value.clone()));
    }

    cypher.push_str(&format!(
        "\n RETURN n, labels(n) AS labels\n LIMIT {limit}"
    ));
    Ok((cypher, params))
}

pub(crate) fn build_source_lookup_cypher(
    key: &SourceKey,
    constrain_labels: bool,
) -> (String, Vec<(String, String)>) {
    let mut cypher = String::from("MATCH (s)\n WHERE ");
    let mut params = Vec::new();

    match key {
        SourceKey::Id(id) => {
            cypher.push_str("s.id = $sourceId");
            params.push(("sourceId".to_string(), id.clone()));
        }
        SourceKey::Name(name) => {
            cypher.push_str("toLower(s.name) = toLower($sourceName)");
            params.push(("sourceName".to_string(), name.clone()));
        }
    }
    if constrain_labels {
        cypher.push_str("\n AND any(label IN labels(s) WHERE label IN $sourceTypes)");
    }
    cypher.push_str("\n RETURN s, labels(s) AS labels\n LIMIT 1");
    (cypher, params)
}

pub(crate) fn build_traversal_cypher(
    key: &SourceKey,
    relationship_type: Option<&str>,
    limit: u32,
) -> Result<(String, Vec<(String, String)>), GraphError> {
    let rel = match relationship_type {
        Some(rt) => format!("[r:{}]", cypher_ident(rt)?),
        None => "[r]".to_string(),
    };

    let mut cypher = format!("MATCH (s)-{rel}-(m)\n WHERE ");
    let mut params = Vec::new();
    match key {
        SourceKey::Id(id) => {
            cypher.push_str("s.id = $sourceId");
            params.push(("sourceId".to_string(), id.clone()));
        }
        SourceKey::Name(name) => {
            cypher.push_str("toLower(s.name) = toLower($sourceName)");
            params.push(("sourceName".to_string(), name.clone()));
        }
    }
    cypher.push_str(
        "\n AND any(label IN labels(m) WHERE label IN $types)\
         \n RETURN DISTINCT m, labels(m) AS labels",
    );
    cypher.push_str(&format!("\n LIMIT {limit}"));
    Ok((cypher, params))
}

// ── Helpers ───────────────────────────────────────────────────────

async fn with_deadline<T>(
    deadline: Deadline,
    fut: impl Future<Output = Result<T, GraphError>>,
) -> Result<T, GraphError> {
    if deadline.expired() {
        return Err(GraphError::DeadlineExceeded);
    }
    match tokio::time::timeout(deadline.remaining(), fut).await {
        Ok(result) => result,
        Err(_) => Err(GraphError::DeadlineExceeded),
    }
}

/// Read a node property as display text, whatever its storage type.
fn scalar_property(node: &neo4rs::Node, key: &str) -> Option<String> {
    if let Ok(v) = node.get::<String>(key) {
        return Some(v);
    }
    if let Ok(v) = node.get::<i64>(key) {
        return Some(v.to_string());
    }
    if let Ok(v) = node.get::<f64>(key) {
        return Some(v.to_string());
    }
    if let Ok(v) = node.get::<bool>(key) {
        return Some(v.to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::EntityRef;
    use std::collections::BTreeMap;

    fn show_query(types: &[&str]) -> StructuredQuery {
        StructuredQuery {
            command: QueryCommand::Show,
            resource_types: types.iter().map(|s| s.to_string()).collect(),
            ..StructuredQuery::unknown()
        }
    }

    #[test]
    fn show_cypher_matches_any_requested_label() {
        let q = show_query(&["Deal", "Contact"]);
        let (cypher, params) = build_show_cypher(&q, 10).unwrap();
        assert!(cypher.contains("any(label IN labels(n) WHERE label IN $types)"));
        assert!(cypher.contains("LIMIT 10"));
        assert!(params.is_empty());
    }

    #[test]
    fn show_cypher_name_filter_is_substring_others_exact() {
        let mut filters = BTreeMap::new();
        filters.insert("name".to_string(), "Blackstone".to_string());
        filters.insert("status".to_string(), "open".to_string());
        let q = StructuredQuery {
            filters,
            ..show_query(&["Deal"])
        };

        let (cypher, params) = build_show_cypher(&q, 10).unwrap();
        assert!(cypher.contains("toLower(n.name) CONTAINS toLower($f0)"));
        assert!(cypher.contains("n.status = $f1"));
        assert_eq!(
            params,
            vec![
                ("f0".to_string(), "Blackstone".to_string()),
                ("f1".to_string(), "open".to_string())
            ]
        );
    }

    #[test]
    fn show_cypher_rejects_hostile_filter_property() {
        let mut filters = BTreeMap::new();
        filters.insert("x) DETACH DELETE (n".to_string(), "y".to_string());
        let q = StructuredQuery {
            filters,
            ..show_query(&["Deal"])
        };
        assert!(matches!(
            build_show_cypher(&q, 10),
            Err(GraphError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn traversal_cypher_narrows_by_relationship_type() {
        let key = SourceKey::Id("abc".to_string());
        let (cypher, params) = build_traversal_cypher(&key, Some("WORKS_FOR"), 5).unwrap();
        assert!(cypher.contains("[r:WORKS_FOR]"));
        assert!(cypher.contains("s.id = $sourceId"));
        assert!(cypher.contains("LIMIT 5"));
        assert_eq!(params, vec![("sourceId".to_string(), "abc".to_string())]);

        let (cypher, _) = build_traversal_cypher(&key, None, 5).unwrap();
        assert!(cypher.contains("-[r]-"));
    }

    #[test]
    fn traversal_cypher_rejects_hostile_relationship_type() {
        let key = SourceKey::Name("Blackstone".to_string());
        assert!(build_traversal_cypher(&key, Some("X]->() MATCH"), 5).is_err());
    }

    #[test]
    fn source_lookup_by_name_is_case_insensitive() {
        let key = SourceKey::Name("Blackstone".to_string());
        let (cypher, params) = build_source_lookup_cypher(&key, true);
        assert!(cypher.contains("toLower(s.name) = toLower($sourceName)"));
        assert!(cypher.contains("$sourceTypes"));
        assert!(cypher.contains("LIMIT 1"));
        assert_eq!(
            params,
            vec![("sourceName".to_string(), "Blackstone".to_string())]
        );

        let (cypher, _) = build_source_lookup_cypher(&key, false);
        assert!(!cypher.contains("$sourceTypes"));
    }

    #[test]
    fn source_resolution_prefers_filters_then_translation_then_history() {
        let history = vec![ConversationTurn {
            user_query: "show organizations".to_string(),
            assistant_response: vec![EntityRef {
                id: "org-1".to_string(),
                name: "Blackstone".to_string(),
                entity_type: "Organization".to_string(),
            }],
        }];

        let mut q = StructuredQuery {
            command: QueryCommand::ShowRelated,
            resource_types: vec!["Deal".to_string()],
            related_to: vec!["Organization".to_string()],
            ..StructuredQuery::unknown()
        };

        // History only.
        assert_eq!(
            resolve_source_key(&q, &history),
            Some(SourceKey::Id("org-1".to_string()))
        );

        // Translated source name beats history.
        q.source_entity_name = Some("KKR".to_string());
        assert_eq!(
            resolve_source_key(&q, &history),
            Some(SourceKey::Name("KKR".to_string()))
        );

        // Explicit name filter beats both.
        q.filters
            .insert("name".to_string(), "Carlyle".to_string());
        assert_eq!(
            resolve_source_key(&q, &history),
            Some(SourceKey::Name("Carlyle".to_string()))
        );
    }

    #[test]
    fn source_resolution_ignores_history_entities_of_other_types() {
        let history = vec![ConversationTurn {
            user_query: "show deals".to_string(),
            assistant_response: vec![EntityRef {
                id: "deal-1".to_string(),
                name: "Project Neptune".to_string(),
                entity_type: "Deal".to_string(),
            }],
        }];
        let q = StructuredQuery {
            command: QueryCommand::ShowRelated,
            resource_types: vec!["Contact".to_string()],
            related_to: vec!["Organization".to_string()],
            ..StructuredQuery::unknown()
        };
        assert_eq!(resolve_source_key(&q, &history), None);
    }
}
