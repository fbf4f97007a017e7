//! The fixed field sequence.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A data item collected from the user.
///
/// Variant order is sequence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    Address,
    Phone,
}

impl Field {
    /// Collection order. No skipping, no back-navigation.
    pub const SEQUENCE: [Field; 3] = [Field::Name, Field::Address, Field::Phone];

    /// Number of fields in one pass.
    pub const COUNT: usize = Self::SEQUENCE.len();

    /// Field at `step_index`, or `None` once the sequence is exhausted.
    pub fn at(step_index: usize) -> Option<Field> {
        Self::SEQUENCE.get(step_index).copied()
    }

    /// Wire name, as used in confirmation payloads and stored records.
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Address => "address",
            Field::Phone => "phone",
        }
    }

    /// Parse a wire name. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Field> {
        Self::SEQUENCE.into_iter().find(|f| f.as_str() == name)
    }

    pub fn is_last(self) -> bool {
        self == Self::SEQUENCE[Self::COUNT - 1]
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
