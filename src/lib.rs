//! waypost library interface
//!
//! An embeddable execution engine for API client applications: scoped
//! `{{variable}}` resolution, REST and GraphQL dispatch, sandboxed
//! pre-request/test scripts, and sequential collection runs. Persistence
//! stays behind the collaborator traits in [`stores`].
//!
//! # Module Organization
//!
//! - [`errors`] - Error types (WaypostError, Result)
//! - [`models`] - Data models (requests, responses, results, runs)
//! - [`resolver`] - `{{variable}}` template resolution and dynamic tokens
//! - [`graphql`] - GraphQL request envelope
//! - [`scripting`] - QuickJS sandbox for untrusted scripts
//! - [`request`] - Request building and execution
//! - [`runner`] - Collection run orchestration
//! - [`stores`] - Collaborator traits and in-memory implementations

pub mod errors;
pub mod graphql;
pub mod models;
pub mod request;
pub mod resolver;
pub mod runner;
pub mod scripting;
pub mod stores;
