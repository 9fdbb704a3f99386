//! Runtime discovery, compilation and sandboxed loading of capability
//! scripts for scriptor.
//!
//! A scan walks `<workspace>/.scriptor/`, compiles each TypeScript file that
//! opts in, runs it inside a per-module sandbox and registers its default
//! export with a [`CapabilityRegistry`]:
//!
//! - [`resolver`]: specifier → file, across an ordered [`SearchRootList`]
//! - [`CompilerHost`]: full-program compile of one entry, emitted to `out/`
//! - [`LoaderSession`]: the script runtime, the [`DependencyCache`] and the
//!   `require` every module gets
//! - [`Orchestrator`]: discovery, per-file isolation, registration
//!
//! # Host bindings
//!
//! A fixed allow-list of specifiers never touches the disk: `scriptor`
//! resolves to the session's single host API object (see [`HostApi`]), and
//! `fs`, `path`, `process`, `os`, `timers`, `console` resolve to real
//! platform implementations.
//!
//! # Cycles
//!
//! A module is cached before its body runs, so a `require` cycle returns the
//! partially populated `module.exports` of the module still executing.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod bridge;
pub mod cache;
pub mod compiler;
mod dependency;
pub mod discovery;
pub mod error;
pub mod host;
pub mod manifest;
pub mod module_record;
pub mod orchestrator;
mod platform;
pub mod registry;
pub mod resolver;
pub mod sandbox;
pub mod search_roots;
pub mod session;
pub mod transpile;

pub use bridge::{HostModule, host_module};
pub use cache::DependencyCache;
pub use compiler::{CompiledUnit, CompilerHost, CompilerOptions, Diagnostic, Severity};
pub use discovery::{DiscoveryOptions, ScriptFile, discover, is_eligible};
pub use error::{LoaderError, LoaderResult};
pub use host::{DefaultHostApi, HostApi};
pub use manifest::{CapabilityManifest, ManifestEntry};
pub use module_record::ModuleRecord;
pub use orchestrator::{LoaderOptions, Orchestrator, ScanReport};
pub use registry::{Capability, CapabilityRegistry, InMemoryRegistry};
pub use resolver::{Resolved, SpecifierKind, classify, resolve};
pub use sandbox::Trust;
pub use search_roots::SearchRootList;
pub use session::LoaderSession;
pub use transpile::transpile;
