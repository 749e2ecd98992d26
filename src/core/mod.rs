//! core
//!
//! Core domain types and rules for inkpress.
//!
//! # Modules
//!
//! - [`types`] - Strong types: RepoPath, ContentRoot, BlobHash, CommitHash, ids
//! - [`model`] - Persisted records: projects, documents, ops, branches
//! - [`status`] - Document status state machine
//! - [`frontmatter`] - Front-block codec for file contents
//! - [`naming`] - Publish branch naming
//! - [`config`] - Configuration schema and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Status changes go through one transition table
//! - Nothing here performs I/O except config loading

pub mod config;
pub mod frontmatter;
pub mod model;
pub mod naming;
pub mod status;
pub mod types;
