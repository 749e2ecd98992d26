//! forge
//!
//! Abstraction for the remote git host.
//!
//! # Architecture
//!
//! The `Forge` trait defines the primitives a publish needs: read a file,
//! read a tree, create a branch, commit a batch, open a pull request.
//! Callers use the [`create_forge`] factory function rather than importing
//! specific forge implementations directly.
//!
//! # Modules
//!
//! - `traits`: Core `Forge` trait and request/response types
//! - [`github`]: GitHub implementation using the REST API
//! - [`mock`]: In-memory implementation for deterministic testing
//! - `factory`: Forge selection and creation

mod factory;
pub mod github;
pub mod mock;
mod traits;

pub use factory::{create_forge, detect_provider, ForgeProvider};
pub use traits::*;
