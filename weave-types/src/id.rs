//! Typed identifiers used throughout the runtime.
//!
//! Opaque strings underneath, newtype-wrapped so an `ExecutionId` can never
//! be passed where a `CallId` is expected. No UUID enforcement — callers
//! choose the format.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new typed id from anything that converts to `String`.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

typed_id!(SessionId, "Unique identifier for a session (owns executions and a spawn tree).");
typed_id!(ExecutionId, "Unique identifier for a single render/send call.");
typed_id!(SpawnId, "Unique identifier for a spawned child session.");
typed_id!(CallId, "Unique identifier for a tool call, shared by confirmation and result events.");
