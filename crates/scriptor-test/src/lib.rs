//! Shared test utilities for scriptor.
//!
//! Add as a dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! scriptor-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use scriptor_test::{TestWorkspace, capability_script};
//!
//! #[tokio::test]
//! async fn loads_one() {
//!     let ws = TestWorkspace::new();
//!     ws.script("hello.ts", &capability_script("hello"));
//!     // ... run an Orchestrator against ws.root()
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod fixtures;
pub mod harness;

pub use fixtures::*;
pub use harness::*;
