//! Namespaced cache keys.
//!
//! Every entry a [`super::CacheStore`] writes lives under
//! `"{namespace}:{key}"`. The schema version marker lives at
//! `"{namespace}#schema_version"`, outside the entry prefix, so purging a
//! namespace never touches the marker and scanning entries never sees it.
//! Namespaces may not contain `:` or `#` (enforced by config validation).

/// Separator between namespace and caller key.
const SEPARATOR: char = ':';

/// Suffix of the version marker key.
const VERSION_MARKER: &str = "#schema_version";

/// A cache key bound to a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespacedKey {
    /// Private inner data - cannot be constructed externally
    inner: KeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct KeyInner {
    namespace: String,
    key: String,
}

impl NamespacedKey {
    /// Bind `key` to `namespace`.
    pub fn new(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            inner: KeyInner {
                namespace: namespace.into(),
                key: key.into(),
            },
        }
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// The caller-visible key, without the namespace.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Encode to the string stored in the local scope.
    pub fn encode(&self) -> String {
        format!("{}{}{}", self.inner.namespace, SEPARATOR, self.inner.key)
    }

    /// Decode a stored key.
    ///
    /// Returns `None` if the separator is missing or the namespace is empty.
    /// The caller key may itself contain separators; only the first one
    /// splits.
    pub fn decode(encoded: &str) -> Option<Self> {
        let (namespace, key) = encoded.split_once(SEPARATOR)?;
        if namespace.is_empty() || namespace.contains(VERSION_MARKER) {
            return None;
        }
        Some(Self::new(namespace, key))
    }

    /// Prefix shared by every entry of `namespace`.
    pub fn namespace_prefix(namespace: &str) -> String {
        format!("{}{}", namespace, SEPARATOR)
    }

    /// Key of the schema version marker for `namespace`.
    pub fn version_marker(namespace: &str) -> String {
        format!("{}{}", namespace, VERSION_MARKER)
    }
}
