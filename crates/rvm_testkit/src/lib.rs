//! # RVM Testkit
//!
//! Test utilities for RVM.
//!
//! This crate provides:
//! - Test fixtures with simulated crash and restart
//! - Crash helpers that damage the commit log the way a crash would
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rvm_testkit::prelude::*;
//!
//! #[test]
//! fn survives_restart() {
//!     let mut t = TestRvm::new();
//!     let seg = t.map("A", 64).unwrap();
//!     commit_write(&t, seg, 0, &[1, 2, 3]);
//!
//!     t.reopen();
//!     let seg = t.map("A", 64).unwrap();
//!     assert_eq!(t.read_range(seg, 0, 3).unwrap(), vec![1, 2, 3]);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
