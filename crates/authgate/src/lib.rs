//! authgate: Envoy external authorization service
//!
//! Authgate answers `ext_authz` check requests from a data-plane proxy. Each
//! protected API is identified by hostname and carries three ordered
//! evaluator lists (identity, metadata, authorization) that the
//! `pipeline-core` engine runs per request. This crate provides everything
//! around the engine: the gRPC transport, the local catalog source with hot
//! reload, the concrete evaluator backends, process configuration, and the
//! logging bootstrap.

pub mod app;
pub mod config;
pub mod evaluators;
pub mod service;
pub mod state_manager;
pub mod telemetry;
pub mod types;

pub use config::Config;
