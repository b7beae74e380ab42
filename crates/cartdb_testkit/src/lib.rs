//! # CartDB Testkit
//!
//! Test utilities for CartDB.
//!
//! This crate provides:
//! - Shop entities and context helpers
//! - A recording hook handler and closure-based hooks
//! - Property-based test generators using proptest
//! - Commit pipeline integration checks
//!
//! ## Usage
//!
//! ```rust
//! use cartdb_testkit::prelude::*;
//! use std::sync::Arc;
//!
//! let handler = Arc::new(RecordingHookHandler::new());
//! let ctx = TestContext::with_handler(handler.clone());
//! ctx.add(&Product::shared("kettle", 2_500)).unwrap();
//! assert_eq!(ctx.commit().unwrap(), 1);
//! assert_eq!(handler.calls().len(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod recording;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::recording::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use recording::*;
