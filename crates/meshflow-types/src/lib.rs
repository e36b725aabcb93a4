//! Shared domain types for meshflow.
//!
//! This crate contains the data model passed between the planner, the
//! validation/execution engine and its callers: service descriptors, candidate
//! graphs, run results, execution traces and engine configuration.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod graph;
pub mod run;
pub mod service;
