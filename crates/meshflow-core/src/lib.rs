//! Workflow validation and execution engine for meshflow.
//!
//! This crate defines the ports (service directory, call dispatcher) that the
//! infrastructure layer implements, and the engine that validates planner
//! graphs and runs them. It depends only on `meshflow-types` -- never on
//! `meshflow-infra` or any network/IO crate.

pub mod directory;
pub mod dispatch;
pub mod workflow;
