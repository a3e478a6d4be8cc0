//! Maven dependency-graph resolution for gavel.
//!
//! Given a project descriptor, this crate computes the transitive closure
//! of its compile/runtime dependencies and emits a flat [`Package`] list
//! with the direct-dependency [`Dependency`] edges between them:
//! - parent inheritance, property expansion, and managed-dependency
//!   overlays (including BOM imports)
//! - nearest-wins conflict resolution with hard-requirement overrides
//! - exclusion propagation and scope/optional filtering
//! - local-repository and ordered remote-repository lookup, with an
//!   optional on-disk response cache and per-host blocklist
//!
//! Resolution degrades gracefully: descriptors that cannot be found or
//! parsed contribute nothing, and the caller still gets the part of the
//! graph that did resolve.

mod analyzer;
mod artifact;
mod cache;
mod error;
mod http_cache;
mod properties;
mod repository;
mod resolver;

pub use artifact::{package_id, Dependency, Location, Package, Relationship, Version};
pub use error::{ResolveError, Result};
pub use http_cache::{HttpCache, HttpCacheError};
pub use resolver::{ResolveOptions, Resolver, DEFAULT_CENTRAL_URL};
