//! Integration and unit tests for the portal backend.
//!
//! Most modules drive the full router through `tower::ServiceExt::oneshot` with the
//! in-memory session store and the stand-in collaborators from [`support`].
//!
//! ## Test Modules
//!
//! - **api_tests**: auth guard, login/logout, file routes and the exception filter
//! - **graphql_tests**: the GraphQL endpoint and its error shape
//! - **session_tests**: session stores, cookie signing and regeneration
//! - **files_tests**: document gateway preconditions and the HTTP backend
//! - **error_tests**: error mapping and validation helpers
//! - **config_tests**: configuration loading and validation
//! - **db_tests**: primary/replica pool selection
//! - **health_api_tests**: health, readiness, version and metrics endpoints
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test
//! cargo test graphql_tests
//! ```

pub mod support;

pub mod api_tests;
pub mod db_tests;
