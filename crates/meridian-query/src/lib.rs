//! Natural-language query pipeline: translate, authorize, execute, shape.
//!
//! Every stage degrades toward "nothing found" rather than an error.
//! A query the caller is not allowed to run never opens a graph session.

pub mod access;
pub mod error;
pub mod llm;
pub mod response;
pub mod translator;

use std::sync::Arc;

use meridian_core::{Caller, ConversationTurn, Deadline};
use meridian_graph::{ExecutionOutcome, QueryExecutor};

pub use access::AccessGate;
pub use error::TranslationError;
pub use llm::{CompletionBackend, HttpCompletionBackend};
pub use response::{ShapedResponse, GENERIC_FAILURE_MESSAGE, NOTHING_FOUND_MESSAGE};
pub use translator::{QueryTranslator, TranslatorConfig};

pub struct QueryPipeline {
    translator: QueryTranslator,
    executor: Arc<dyn QueryExecutor>,
}

impl QueryPipeline {
    pub fn new(translator: QueryTranslator, executor: Arc<dyn QueryExecutor>) -> Self {
        Self { translator, executor }
    }

    /// Answer one question for one caller within one deadline.
    pub async fn answer(
        &self,
        caller: &Caller,
        raw: &str,
        history: &[ConversationTurn],
        deadline: Deadline,
    ) -> ShapedResponse {
        let started = std::time::Instant::now();
        let structured = self.translator.translate(raw, history, deadline).await;
        let translated_at = started.elapsed();
        if !structured.is_actionable() {
            tracing::info!(caller = %caller.name, "query not actionable after translation");
            return ShapedResponse::nothing_found();
        }

        let narrowed = AccessGate::authorize(caller, &structured, deadline);
        if narrowed.resource_types.is_empty() {
            tracing::info!(caller = %caller.name, "no resource types survived authorization");
            return ShapedResponse::nothing_found();
        }

        let result = self.executor.execute(&narrowed, history, deadline).await;
        tracing::debug!(
            caller = %caller.name,
            translate_ms = translated_at.as_millis() as u64,
            total_ms = started.elapsed().as_millis() as u64,
            "pipeline stages complete"
        );

        match result {
            Ok(ExecutionOutcome::NothingFound) => ShapedResponse::nothing_found(),
            Ok(outcome) => ShapedResponse::render(&outcome),
            Err(e) => {
                tracing::warn!(caller = %caller.name, error = %e, "graph execution failed");
                ShapedResponse::generic_failure()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use meridian_core::{Action, Permission, Role, StructuredQuery};
    use meridian_graph::{EntityRecord, GraphError};
    use meridian_schema::{OntologyDefinition, SchemaRegistry};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeExecutor {
        calls: AtomicUsize,
        outcome: fn() -> Result<ExecutionOutcome, GraphError>,
    }

    impl FakeExecutor {
        fn new(outcome: fn() -> Result<ExecutionOutcome, GraphError>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                outcome,
            })
        }
    }

    #[async_trait]
    impl QueryExecutor for FakeExecutor {
        async fn execute(
            &self,
            _structured: &StructuredQuery,
            _history: &[ConversationTurn],
            _deadline: Deadline,
        ) -> Result<ExecutionOutcome, GraphError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)()
        }
    }

    fn registry() -> Arc<SchemaRegistry> {
        let crm = OntologyDefinition::from_json(
            r#"{
            "name": "crm",
            "entities": {
                "Contact": { "description": "A known person" },
                "Deal": { "description": "An investment deal" }
            }
        }"#,
        )
        .unwrap();
        let mut reg = SchemaRegistry::new();
        reg.load(vec![crm]).unwrap();
        Arc::new(reg)
    }

    fn caller_with(resources: &[&str]) -> Caller {
        Caller {
            id: uuid::Uuid::new_v4(),
            name: "tester".to_string(),
            roles: vec![Role {
                name: "analyst".to_string(),
                permissions: resources
                    .iter()
                    .map(|r| Permission {
                        action: Action::Query,
                        resource: r.to_string(),
                    })
                    .collect(),
            }],
        }
    }

    fn pipeline(executor: Arc<FakeExecutor>) -> QueryPipeline {
        let translator = QueryTranslator::new(registry(), None, TranslatorConfig::default());
        QueryPipeline::new(translator, executor)
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn denied_query_never_opens_a_graph_session() {
        let executor = FakeExecutor::new(|| Ok(ExecutionOutcome::NothingFound));
        let p = pipeline(executor.clone());

        let resp = p
            .answer(&caller_with(&["Contact"]), "show deals", &[], deadline())
            .await;
        assert_eq!(resp.text, NOTHING_FOUND_MESSAGE);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_query_never_opens_a_graph_session() {
        let executor = FakeExecutor::new(|| Ok(ExecutionOutcome::NothingFound));
        let p = pipeline(executor.clone());

        let resp = p
            .answer(
                &caller_with(&["Contact", "Deal"]),
                "how is the weather?",
                &[],
                deadline(),
            )
            .await;
        assert_eq!(resp.text, NOTHING_FOUND_MESSAGE);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn authorized_query_executes_and_renders() {
        let executor = FakeExecutor::new(|| {
            Ok(ExecutionOutcome::Matches {
                records: vec![EntityRecord {
                    id: "c-1".to_string(),
                    name: "Ada Price".to_string(),
                    labels: vec!["Contact".to_string()],
                    properties: BTreeMap::new(),
                }],
                source: None,
            })
        });
        let p = pipeline(executor.clone());

        let resp = p
            .answer(&caller_with(&["Contact"]), "show contacts", &[], deadline())
            .await;
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
        assert!(resp.text.contains("Ada Price"));
        assert_eq!(resp.entities.len(), 1);
        assert_eq!(resp.entities[0].entity_type, "Contact");
    }

    #[tokio::test]
    async fn execution_failure_shapes_to_generic_message() {
        let executor = FakeExecutor::new(|| {
            Err(GraphError::Connection("connection refused".to_string()))
        });
        let p = pipeline(executor.clone());

        let resp = p
            .answer(&caller_with(&["Deal"]), "show deals", &[], deadline())
            .await;
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(resp.text, GENERIC_FAILURE_MESSAGE);
        assert!(resp.entities.is_empty());
    }
}
