use serde::{Deserialize, Serialize};
use std::fmt;

/// What happens to a dependent row when the row it references is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CascadeAction {
    /// `ON DELETE CASCADE`: the dependent is soft-deleted in turn.
    Delete,
    /// `ON DELETE SET NULL`: the dependent's foreign key is cleared.
    SetNull,
}

impl CascadeAction {
    /// Recognize a raw `ON DELETE` declaration.
    ///
    /// Only `CASCADE` and `SET NULL` are recognized, in any letter case.
    /// Everything else (`RESTRICT`, `NO ACTION`, `SET DEFAULT`, typos) yields
    /// `None`.
    pub fn from_on_delete(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "CASCADE" => Some(Self::Delete),
            "SET NULL" => Some(Self::SetNull),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::SetNull => "SET_NULL",
        }
    }
}

impl fmt::Display for CascadeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
