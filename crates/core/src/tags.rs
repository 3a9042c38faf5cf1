//! Working-set tags.

use serde::{Deserialize, Serialize};

/// Ordered, immutable sequence of working-set names.
///
/// A defensive copy of the caller's input. Names are opaque: duplicates and
/// blanks are kept as given, and consumers decide what they mean.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingSets(Vec<String>);

impl WorkingSets {
    /// Copy the given names into a tag set.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(names.into_iter().map(|n| n.as_ref().to_string()).collect())
    }

    /// An empty tag set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Iterate over the names in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of names.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the set contains a name.
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|t| t == name)
    }
}
