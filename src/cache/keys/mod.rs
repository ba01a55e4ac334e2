//! Cache key derivation.
//!
//! A key is the JSON serialization of the request parameters with the
//! names sorted, so `{a:1,b:2}` and `{b:2,a:1}` land on the same entry.
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds the canonical key from `(name, value)` pairs.
    ///
    /// Pairs whose value is `None` are dropped, so an optional parameter
    /// that was not supplied never changes the key.
    pub fn from_params<I, K, V>(params: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        let sorted: BTreeMap<String, String> = params
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k.into(), v.into())))
            .collect();
        Self::from_sorted(&sorted)
    }

    /// Same as [`CacheKey::from_params`] for an already-present map.
    pub fn from_map(params: &BTreeMap<String, String>) -> Self {
        Self::from_sorted(params)
    }

    fn from_sorted(sorted: &BTreeMap<String, String>) -> Self {
        // BTreeMap<String, String> always serializes.
        CacheKey(serde_json::to_string(sorted).unwrap_or_default())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
