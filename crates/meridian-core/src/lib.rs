//! meridian-core: Shared types, configuration, and permission model for the
//! Meridian natural-language graph query platform.
//!
//! This crate provides the foundational types used across all Meridian components:
//! - `StructuredQuery`, the normalized representation of a caller's question
//! - `ConversationTurn`, short-lived per-session translation context
//! - The role/permission model evaluated by the access gate
//! - `Deadline`, the cancellation budget threaded through the pipeline
//! - Configuration loading for all services

pub mod config;
pub mod types;

pub use types::{
    Action, Caller, ConversationTurn, Deadline, EntityRef, Permission, QueryCommand, Role,
    StructuredQuery,
};
