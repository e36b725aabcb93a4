//! Infrastructure layer for meshflow.
//!
//! Contains implementations of the ports defined in `meshflow-core`: a
//! reqwest-backed call dispatcher, plus loaders for the service registry,
//! planner graph documents and `config.toml`.

pub mod config;
pub mod graph_loader;
pub mod http_dispatcher;
pub mod registry;
