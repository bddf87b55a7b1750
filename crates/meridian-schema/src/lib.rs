//! meridian-schema: Ontology definitions and the composite schema registry.
//!
//! Independently-authored business domains (CRM, financial, procurement, ...)
//! each ship an ontology: a named bundle of entity and relationship type
//! definitions. This crate parses those definitions into strongly-typed
//! structures, merges them into one inheritance-aware label space, and
//! answers schema questions for the rest of the pipeline.
//!
//! The registry is built once at startup and shared read-only (`Arc`) for the
//! life of the process. Reconfiguration is restricted to a quiescent phase;
//! it is not safe to interleave with in-flight queries.

pub mod bridge;
pub mod error;
pub mod ontology;
pub mod registry;

pub use bridge::LabelBridge;
pub use error::SchemaError;
pub use ontology::{
    EnrichmentSpec, EntitySpec, OneOrMany, OntologyDefinition, PatternConfig, PatternFamily,
    PatternFamilyConfig, RelationSpec,
};
pub use registry::SchemaRegistry;
