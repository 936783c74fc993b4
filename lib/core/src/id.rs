//! Strongly-typed ULID identifiers.
//!
//! Session ids are caller-chosen strings and live in the conversation crate;
//! the ids here are generated by parley itself.

use std::fmt;
use ulid::Ulid;

/// Macro to generate a strongly-typed ID wrapper around ULID.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(Ulid);

        impl $name {
            /// Creates a new ID with a randomly generated ULID.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }
    };
}

define_id!(
    /// Unique identifier for one conversation turn, used to correlate logs.
    TurnId,
    "turn"
);

define_id!(
    /// Identifier assigned to a tool call when the provider does not supply one.
    ToolCallId,
    "call"
);
