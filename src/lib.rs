//! # Portal Backend Library
//!
//! Request pipeline of the corporate intranet portal. Every inbound request has its
//! session resolved from a shared store, passes an auth guard, reaches a REST handler
//! or GraphQL resolver (which may call the document gateway or the database), and on
//! failure is shaped by the exception filter. All stages write to one log sink.
//!
//! ## Architecture
//!
//! - **Axum** for HTTP routing and middleware composition
//! - **Redis** for externalized sessions and the sync microservice transport
//! - **SQLx** for PostgreSQL with read replicas
//! - **tracing** for the access, query and application logs
//!
//! ## Core Components
//!
//! - [`config`]: layered configuration with the portal's environment variables
//! - [`logging`]: the process-wide log sink
//! - [`error`]: application errors and the transport-neutral [`error::Fault`]
//! - [`session`]: session records, stores and the session middleware
//! - [`middleware`]: auth guard and exception filter
//! - [`files`]: document gateway and its HTTP backend
//! - [`graphql`]: GraphQL-over-HTTP endpoint with a resolver registry
//! - [`db`] and [`directory`]: PostgreSQL pools and the mirrored user directory
//! - [`sync`]: trigger for the directory synchronization microservice
//! - [`routes`]: HTTP handlers and the router
//! - [`state`]: composition of all collaborators

pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod files;
pub mod graphql;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod session;
pub mod state;
pub mod sync;
pub mod types;

#[cfg(test)]
mod tests;
