use std::collections::{BTreeMap, HashMap};

use super::ParameterSource;

/// Normalized key → ordered values mapping for one parameter source.
///
/// Keys are normalized on construction:
///
/// - `tags[]` becomes `tags`, keeping every value
/// - `meta[color]=red` becomes `meta → [color, red]`, so map-shaped
///   parameters collect as alternating key/value pairs
///
/// Values of keys that normalize to the same name are appended in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSet {
    source: ParameterSource,
    params: BTreeMap<String, Vec<String>>,
}

impl ParameterSet {
    /// Builds a set from keys already grouped with their values.
    pub fn new<K, V, I>(source: ParameterSource, grouped: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, values) in grouped {
            let values = values.into_iter().map(Into::into).collect();
            let (key, values) = normalize_entry(key.into(), values);
            params.entry(key).or_default().extend(values);
        }

        Self { source, params }
    }

    /// Builds a set from raw `key=value` pairs, as decoded from a query
    /// string or form body.
    ///
    /// Repeated keys are grouped in first-seen order before normalization.
    pub fn from_pairs<K, V, I>(source: ParameterSource, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut order: Vec<(String, Vec<String>)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for (key, value) in pairs {
            let key = key.into();
            match index.get(&key) {
                Some(&i) => order[i].1.push(value.into()),
                None => {
                    index.insert(key.clone(), order.len());
                    order.push((key, vec![value.into()]));
                }
            }
        }
        Self::new(source, order)
    }

    /// Creates an empty set for the given source.
    pub fn empty(source: ParameterSource) -> Self {
        Self {
            source,
            params: BTreeMap::new(),
        }
    }

    /// Returns the source this set was collected from.
    pub fn source(&self) -> ParameterSource {
        self.source
    }

    /// Returns the normalized keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    /// Returns the values for a normalized key.
    pub fn values(&self, key: &str) -> Option<&[String]> {
        self.params.get(key).map(Vec::as_slice)
    }

    /// Returns the number of distinct keys.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns `true` if the set has no keys.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Returns the normalized mapping.
    pub fn as_map(&self) -> &BTreeMap<String, Vec<String>> {
        &self.params
    }

    pub(crate) fn extend(&mut self, other: ParameterSet) {
        for (key, values) in other.params {
            self.params.insert(key, values);
        }
    }
}

/// Splits `name[sub]` at the last `[` and strips a trailing `[]`.
fn normalize_entry(key: String, values: Vec<String>) -> (String, Vec<String>) {
    if key.ends_with("[]") {
        return (key.replace("[]", ""), values);
    }

    if let Some(inner) = key.strip_suffix(']')
        && let Some(open) = inner.rfind('[')
    {
        let name = inner[..open].to_string();
        let sub = inner[open + 1..].to_string();
        let mut pair = vec![sub];
        if let Some(first) = values.into_iter().next() {
            pair.push(first);
        }
        return (name, pair);
    }

    (key, values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_suffix_is_stripped() {
        let set = ParameterSet::from_pairs(ParameterSource::Query, [("tags[]", "a"), ("tags[]", "b")]);
        assert_eq!(set.values("tags"), Some(&["a".to_string(), "b".to_string()][..]));
        assert!(set.values("tags[]").is_none());
    }

    #[test]
    fn test_keyed_entries_become_pairs() {
        let set = ParameterSet::from_pairs(
            ParameterSource::Body,
            [("meta[color]", "red"), ("meta[size]", "L")],
        );
        assert_eq!(
            set.values("meta").unwrap(),
            &["color", "red", "size", "L"].map(String::from)[..]
        );
    }

    #[test]
    fn test_keyed_entry_keeps_first_value_only() {
        let set = ParameterSet::new(ParameterSource::Query, [("meta[color]", vec!["red", "blue"])]);
        assert_eq!(set.values("meta").unwrap(), &["color", "red"].map(String::from)[..]);
    }

    #[test]
    fn test_split_at_last_bracket() {
        let set = ParameterSet::from_pairs(ParameterSource::Query, [("a[b][c]", "v")]);
        assert_eq!(set.values("a[b]").unwrap(), &["c", "v"].map(String::from)[..]);
    }

    #[test]
    fn test_plain_and_array_keys_merge() {
        let set = ParameterSet::from_pairs(ParameterSource::Query, [("id", "1"), ("id[]", "2")]);
        assert_eq!(set.values("id").unwrap(), &["1", "2"].map(String::from)[..]);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_plain_keys_untouched() {
        let set = ParameterSet::from_pairs(ParameterSource::Path, [("id", "42")]);
        assert_eq!(set.source(), ParameterSource::Path);
        assert_eq!(set.values("id").unwrap(), &["42".to_string()][..]);
    }
}
