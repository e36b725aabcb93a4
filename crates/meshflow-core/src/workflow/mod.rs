//! Workflow engine core: validation, attempt policy and concurrent execution.
//!
//! - `schema` -- structural type checks for bindings and service outputs
//! - `validator` -- graph validation producing a `ValidatedGraph`
//! - `policy` -- retry/fallback attempt plans, cursor and backoff
//! - `context` -- per-run payload, output slots and status table
//! - `tracer` -- append-only attempt and transition log
//! - `scheduler` -- dependency-driven concurrent executor
//! - `engine` -- facade tying directory, dispatcher and config together

pub mod context;
pub mod engine;
pub mod policy;
pub mod scheduler;
pub mod schema;
pub mod tracer;
pub mod validator;

#[cfg(test)]
pub(crate) mod testing;
