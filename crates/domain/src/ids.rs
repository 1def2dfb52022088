use std::fmt;

use serde::{Deserialize, Serialize};

/// Integer-backed identifiers.
///
/// Collaborator modules (users, tasks, projects, work sessions) own these ids
/// in their own relational tables; the engine only ever receives them as
/// already-validated numbers.
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

// Collaborator-owned IDs
define_id!(UserId);
define_id!(ProjectId);
define_id!(TaskId);
define_id!(WorkSessionId);

// Engine-owned IDs
define_id!(BadgeId);
define_id!(QuestId);
define_id!(ChestId);
define_id!(StoryArcId);
