//! inkpress - stage content edits and publish them as one pull request
//!
//! inkpress keeps draft documents and staged file operations for a content
//! directory inside a git repository, and publishes them to the git host
//! as a single commit on a working branch with one pull request. Merge
//! events from the host promote the published documents.
//!
//! # Architecture
//!
//! The codebase follows a layered architecture:
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to engine)
//! - [`engine`] - Publish reconciliation, tree overlay, conflict checks, webhooks
//! - [`store`] - Transactional persistence for projects, documents, ops and branches
//! - [`core`] - Domain types, status machine, frontmatter codec, configuration
//! - [`forge`] - Abstraction for the remote git host (GitHub v1)
//! - [`telemetry`] - Logging setup
//!
//! # Correctness Invariants
//!
//! 1. No remote write happens while any conflict check fails
//! 2. A project has at most one active publish branch
//! 3. A document's remote hash always names a blob the host reported
//! 4. A merge publishes only documents whose paths its branch carried

pub mod cli;
pub mod core;
pub mod engine;
pub mod forge;
pub mod store;
pub mod telemetry;
