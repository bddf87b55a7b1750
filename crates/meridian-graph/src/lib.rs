//! meridian-graph: Graph store access for the Meridian query pipeline.
//!
//! Wraps the Neo4j driver behind a thin client, turns authorized
//! `StructuredQuery` values into bounded Cypher reads, writes entities with
//! their bridged cross-ontology labels, and derives advanced relationship
//! patterns (temporal, hierarchical, similarity, complex) from ontology
//! configuration.
//!
//! Every operation acquires its own scoped query execution and releases it
//! on all exit paths; nothing graph-related survives a request.

pub mod client;
pub mod executor;
pub mod mutations;
pub mod patterns;

pub use client::{GraphClient, GraphConfig, GraphError};
pub use executor::{EntityRecord, ExecutionOutcome, ExecutorConfig, GraphExecutor, QueryExecutor};
pub use mutations::GraphEntity;
pub use patterns::{PatternEngine, PatternError, PatternRunReport};
