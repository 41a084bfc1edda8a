//! # Rotation Testing Utils
//!
//! Shared testing utilities for the task rotation service.
//!
//! ## Features
//!
//! - **In-memory store**: one `InMemoryRotationStore` implementing every repository trait
//! - **Recording mailer**: captures outgoing mail and fails on demand
//! - **Fixed clock**: a `TimeProvider` that only moves when told to
//! - **Test Data Builders**: tasks and users with sensible defaults
//!
//! ## Usage
//!
//! ```toml
//! [dev-dependencies]
//! rotation-testing-utils = { path = "../testing-utils" }
//! ```
//!
//! ```rust
//! use rotation_testing_utils::{InMemoryRotationStore, RecordingMailer};
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
