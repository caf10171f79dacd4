//! Eventually-consistent verification engine for ingress conformance suites
//!
//! A scenario composes a handful of primitives:
//!
//! - [`descriptor::ResourceDescriptor`] renders a template and submits it, and
//!   tears it down again without caring whether it still exists
//! - [`poll::Poller`] re-reads cluster state until a [`matcher::Matcher`]
//!   accepts it or the deadline passes
//! - [`rollout::GenerationTracker`] ties a mutation to an exact generation
//! - [`snapshot::SnapshotInspector`] pulls proxy config out of a pod and
//!   isolates one block for assertions
//! - [`sample::sample`] repeats a request and tallies outcomes per backend
//!
//! Nothing here talks to a cluster directly. Collaborators are reached through
//! [`client::ClusterClient`], [`client::RemoteExec`] and
//! [`template::TemplateRenderer`]; `routecheck-kube` provides the kube-rs
//! implementations.

#![deny(missing_docs)]

pub mod client;
pub mod context;
pub mod descriptor;
pub mod matcher;
pub mod poll;
pub mod probe;
pub mod rollout;
pub mod sample;
pub mod snapshot;
pub mod template;

pub use client::{ClusterClient, FieldPath, ObjectRef, Patch, PodRef, RemoteExec};
pub use context::TestContext;
pub use descriptor::{Deletion, ResourceDescriptor, ResourceKind};
pub use matcher::{MatchMode, Matcher};
pub use poll::{Check, PollConfig, Poller};
pub use routecheck_common::{Error, Result};
pub use sample::{sample, sample_until, SampleConfig, SampleCounts};
pub use snapshot::{BlockSyntax, ConfigBlock, ConfigSnapshot, SnapshotInspector, SnapshotSource};
pub use template::{TemplateEngine, TemplateRenderer};
