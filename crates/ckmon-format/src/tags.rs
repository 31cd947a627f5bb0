//! Immutable, interned tag sets.
//!
//! This module provides:
//! - [`TagSet`] — An interned set of string tags with union combination
//! - A process-wide registry so equal sets share one allocation
//!
//! The canonical text form is the sorted, deduplicated tags joined with
//! `|`; that form is what the wire codec stores.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

static REGISTRY: Lazy<RwLock<HashMap<String, TagSet>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

static EMPTY: Lazy<TagSet> = Lazy::new(|| TagSet {
    inner: Arc::new(TagSetInner {
        canonical: String::new(),
        tags: Vec::new(),
    }),
});

#[derive(Debug)]
struct TagSetInner {
    canonical: String,
    tags: Vec<String>,
}

/// An immutable, interned set of string tags.
///
/// Interning makes equal sets share one allocation, so cloning is a
/// reference-count bump and equality checks are usually pointer
/// comparisons. The empty set is a canonical singleton.
#[derive(Clone)]
pub struct TagSet {
    inner: Arc<TagSetInner>,
}

impl TagSet {
    /// Returns the canonical empty set.
    #[must_use]
    pub fn empty() -> Self {
        EMPTY.clone()
    }

    /// Interns a `|`-separated tag expression.
    ///
    /// Tags are trimmed, empty fragments dropped, duplicates removed and
    /// the remainder sorted, so `"b|a|b"` and `"a|b"` intern to the same
    /// set.
    #[must_use]
    pub fn intern(expression: &str) -> Self {
        let mut tags: Vec<String> = expression
            .split('|')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(String::from)
            .collect();
        tags.sort();
        tags.dedup();

        if tags.is_empty() {
            return Self::empty();
        }
        let canonical = tags.join("|");

        if let Some(found) = REGISTRY.read().get(&canonical) {
            return found.clone();
        }

        let mut registry = REGISTRY.write();
        if let Some(found) = registry.get(&canonical) {
            return found.clone();
        }
        let set = Self {
            inner: Arc::new(TagSetInner {
                canonical: canonical.clone(),
                tags,
            }),
        };
        registry.insert(canonical, set.clone());
        set
    }

    /// Interns a set built from individual tags.
    #[must_use]
    pub fn from_tags<'a, I>(tags: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let joined = tags.into_iter().collect::<Vec<_>>().join("|");
        Self::intern(&joined)
    }

    /// Returns the union of this set and another.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() || self.ptr_eq(other) {
            return self.clone();
        }
        Self::intern(&format!("{}|{}", self.as_str(), other.as_str()))
    }

    /// Returns the canonical `|`-joined text form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.inner.canonical
    }

    /// Returns the individual tags, sorted.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.inner.tags
    }

    /// Returns the number of tags in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.tags.len()
    }

    /// Returns true if the set holds no tags.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.tags.is_empty()
    }

    /// Returns true if the set contains the given tag.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.inner.tags.iter().any(|t| t == tag)
    }

    /// Returns true if both handles point at the same interned set.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for TagSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for TagSet {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.inner.canonical == other.inner.canonical
    }
}

impl Eq for TagSet {}

impl Hash for TagSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.canonical.hash(state);
    }
}

impl fmt::Debug for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TagSet").field(&self.inner.canonical).finish()
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.canonical)
    }
}

impl Serialize for TagSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TagSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let expression = String::deserialize(deserializer)?;
        Ok(Self::intern(&expression))
    }
}
