//! # weave-types
//!
//! Shared wire and data types for the weave agent runtime: content blocks,
//! typed identifiers, the tool contract, compiled-structure types, stream
//! events, and the top-level error enum.
//!
//! This crate has no behavior — every type here is a plain data shape or an
//! object-safe trait (`ExecutableTool`) so it can be depended on by every
//! other `weave-*` crate without creating cycles.

pub mod compiled;
pub mod content;
pub mod error;
pub mod id;
pub mod snapshot;
pub mod stream;
pub mod tool;

pub use compiled::*;
pub use content::*;
pub use error::*;
pub use id::*;
pub use snapshot::*;
pub use stream::*;
pub use tool::*;
