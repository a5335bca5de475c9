//! Branded ID newtypes for type safety.
//!
//! Every identity in the braid system has a distinct ID type implemented as a
//! newtype wrapper around `String`. This prevents accidentally passing an
//! opaque runtime session id where a logical session id is expected, which is
//! the exact confusion the correlation engine exists to resolve.
//!
//! Fresh IDs are UUID v7 (time-ordered) generated via [`uuid::Uuid::now_v7`].

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Generate a new UUID v7 string (time-ordered).
fn new_v7() -> String {
    Uuid::now_v7().to_string()
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random ID (UUID v7, time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(new_v7())
            }

            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Logical session handle owned by the orchestration layer.
    ///
    /// Stable across internal runtime transitions. When identity resolution
    /// fails, a raw runtime id may pass through inside a `SessionId`
    /// unresolved; callers treat that as best-effort attribution.
    SessionId
}

branded_id! {
    /// Opaque session id assigned by the external agent runtime.
    ///
    /// Discovered asynchronously; carries no relationship to [`SessionId`]
    /// other than the binding established by the resolver.
    RuntimeSessionId
}

branded_id! {
    /// Unique identifier for an agent (main or sub-agent).
    AgentId
}

branded_id! {
    /// Unique identifier for a tool invocation.
    ToolCallId
}

/// Numeric run identifier scoping one agent run.
///
/// Runs are numbered by the host; the correlation service uses run-id
/// equality for event ownership checks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RunId {
    fn from(n: u64) -> Self {
        Self(n)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
