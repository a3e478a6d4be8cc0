//! Maven document models for gavel.
//!
//! This crate reads the documents the resolver consumes and hands back
//! plain trees:
//! - `pom.xml` project descriptors ([`ProjectDoc`])
//! - `maven-metadata.xml` snapshot metadata ([`SnapshotMetadata`])
//! - `~/.m2/settings.xml` user settings ([`Settings`])
//!
//! Nothing here is inherited, interpolated, or merged — effective-model
//! construction is `gavel-resolver`'s job.

mod error;
mod metadata;
mod model;
mod parse;
mod settings;

pub use error::PomError;
pub use metadata::{parse_snapshot_metadata, SnapshotMetadata, SnapshotVersion};
pub use model::{DocDependency, DocParent, DocRepository, LineSpan, ProjectDoc};
pub use parse::parse_project_doc;
pub use settings::{home_dir, Server, Settings};
